use anyhow::{anyhow, Context, Result};
use async_nats::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::NatsConfig;

/// JSON request/reply over NATS with a per-request timeout
#[derive(Clone)]
pub struct NatsClient {
    client: Client,
    prefix: String,
    timeout: Duration,
}

impl NatsClient {
    /// Connect to NATS server
    pub async fn connect(config: &NatsConfig) -> Result<Self> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| anyhow!("NATS url is not configured"))?;

        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self {
            client,
            prefix: config.subject_prefix.clone(),
            timeout: config.request_timeout(),
        })
    }

    /// Full subject name for a service endpoint
    pub fn subject(&self, endpoint: &str) -> String {
        subject_for(&self.prefix, endpoint)
    }

    /// Send a JSON request and decode the JSON reply
    pub async fn request_json<Req, Resp>(&self, endpoint: &str, request: &Req) -> Result<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let subject = self.subject(endpoint);
        let payload = serde_json::to_vec(request).context("Failed to encode request")?;

        debug!("Request on {} ({} bytes)", subject, payload.len());

        let message = tokio::time::timeout(
            self.timeout,
            self.client.request(subject.clone(), payload.into()),
        )
        .await
        .with_context(|| format!("Request on {} timed out after {:?}", subject, self.timeout))?
        .with_context(|| format!("Request on {} failed", subject))?;

        serde_json::from_slice(&message.payload)
            .with_context(|| format!("Malformed reply on {}", subject))
    }

    /// Fire-and-forget JSON publish
    pub async fn publish_json<T: Serialize>(&self, endpoint: &str, message: &T) -> Result<()> {
        let subject = self.subject(endpoint);
        let payload = serde_json::to_vec(message)?;

        tokio::time::timeout(self.timeout, self.client.publish(subject.clone(), payload.into()))
            .await
            .with_context(|| format!("Publish on {} timed out", subject))?
            .with_context(|| format!("Failed to publish on {}", subject))?;

        Ok(())
    }
}

pub(crate) fn subject_for(prefix: &str, endpoint: &str) -> String {
    let prefix = prefix.trim_end_matches('.');
    if prefix.is_empty() {
        endpoint.to_string()
    } else {
        format!("{}.{}", prefix, endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_names() {
        assert_eq!(subject_for("rosa", "stt.transcribe"), "rosa.stt.transcribe");
        assert_eq!(subject_for("rosa.", "chat.respond"), "rosa.chat.respond");
        assert_eq!(subject_for("", "diagnostics"), "diagnostics");
    }
}
