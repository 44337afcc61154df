// Conversation turn state machine
//
// One turn: append the user message, classify it, try the primary response
// service unless fallback mode is active, fall back to a canned local reply
// on any failure, append exactly one assistant message, then try to render
// it as voice. Boundary errors never escape a turn.

use chrono::Timelike;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::conversation::{
    classify, contains_greeting, ConversationHistory, ConversationMessage, Scenario,
    SessionContext, Transcript,
};
use crate::error::{FailureSource, VoiceError};
use crate::failure::{FailureState, FailureTracker};
use crate::gateway::{ResponseService, VoiceParams, VoiceRenderer};
use crate::notice::Notice;

/// Where the assistant reply came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyRoute {
    Primary,
    Fallback,
    /// Locally generated opening greeting
    Greeting,
}

/// What happened to the reply after it was added to history
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Spoken(Vec<u8>),
    /// Voice rendering failed on this reply; voice is now off
    RenderFailed,
    /// Voice rendering was already off
    TextOnly,
}

#[derive(Debug, Clone)]
pub struct DeliveredReply {
    pub message: ConversationMessage,
    pub route: ReplyRoute,
    pub delivery: Delivery,
}

impl DeliveredReply {
    pub fn notice(&self) -> Option<Notice> {
        match self.delivery {
            Delivery::RenderFailed => Some(Notice::TextOnly),
            _ => None,
        }
    }
}

/// Result of one user turn
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub user_message: ConversationMessage,
    pub reply: DeliveredReply,
}

pub struct TurnOrchestrator {
    responder: Arc<dyn ResponseService>,
    renderer: Arc<dyn VoiceRenderer>,
    failures: FailureTracker,
    history: ConversationHistory,
    context: SessionContext,
    voice_enabled: bool,
}

impl TurnOrchestrator {
    pub fn new(
        responder: Arc<dyn ResponseService>,
        renderer: Arc<dyn VoiceRenderer>,
        failures: FailureTracker,
        context: SessionContext,
    ) -> Self {
        Self {
            responder,
            renderer,
            failures,
            history: ConversationHistory::new(),
            context,
            voice_enabled: true,
        }
    }

    /// Initialize the primary response path
    ///
    /// A failure here is hard: the assistant goes straight to fallback mode.
    pub async fn initialize(&mut self) -> bool {
        info!("Initializing response service");
        match self.responder.initialize().await {
            Ok(()) => {
                info!("Response service ready");
                true
            }
            Err(e) => {
                let error = match e {
                    VoiceError::ResponsePath { message, .. } => VoiceError::response_init(message),
                    other => other,
                };
                self.failures.record_failure(FailureSource::Response, &error);
                if !self.failures.should_enter_fallback() {
                    self.failures.signal_hard_error(&error.to_string());
                }
                false
            }
        }
    }

    /// User-initiated reconnect: clear failures, re-enable voice, re-initialize
    pub async fn reconnect(&mut self) -> bool {
        info!("Reconnecting");
        self.failures.reset();
        self.voice_enabled = true;
        self.initialize().await
    }

    /// Run one turn for a finished transcript
    ///
    /// Blank transcripts are ignored and return `None`. Otherwise exactly one
    /// user message and one assistant message are appended, in that order.
    pub async fn handle_transcript(&mut self, transcript: &Transcript) -> Option<TurnOutcome> {
        let user_message = self.accept_transcript(transcript)?;
        let reply = self.reply_to(&user_message).await;
        Some(TurnOutcome {
            user_message,
            reply,
        })
    }

    /// First half of a turn: append the user message
    ///
    /// Split out so hosts can show the message before any network round trip.
    pub fn accept_transcript(&mut self, transcript: &Transcript) -> Option<ConversationMessage> {
        if transcript.is_blank() {
            debug!("Ignoring blank transcript");
            return None;
        }

        let text = transcript.text.trim();
        if contains_greeting(text) && !self.context.user_has_greeted() {
            debug!("User greeted");
            self.context.mark_user_greeted();
        }
        Some(self.history.push_user(text))
    }

    /// Second half of a turn: produce, append and deliver exactly one reply
    ///
    /// Call once per message returned by [`TurnOrchestrator::accept_transcript`].
    pub async fn reply_to(&mut self, user_message: &ConversationMessage) -> DeliveredReply {
        let text = user_message.text.as_str();
        let scenario = classify(text);
        info!("Turn {}: scenario={}", user_message.id, scenario);

        let (reply_text, reply_scenario, route) =
            match self.primary_reply(user_message, scenario).await {
                Some((reply_text, reply_scenario)) => {
                    (reply_text, reply_scenario, ReplyRoute::Primary)
                }
                None => {
                    let (reply_text, reply_scenario) = self.fallback_reply(text, scenario);
                    (reply_text, reply_scenario, ReplyRoute::Fallback)
                }
            };

        let message = self.history.push_assistant(reply_text, reply_scenario);
        let delivery = self.deliver(&message).await;

        DeliveredReply {
            message,
            route,
            delivery,
        }
    }

    /// Reply to a spoken message
    ///
    /// The user's first spoken greeting is answered with the opening greeting
    /// instead of a backend reply. Either way exactly one reply is appended.
    pub async fn reply_to_spoken(&mut self, user_message: &ConversationMessage) -> DeliveredReply {
        if self.greeting_due() && contains_greeting(&user_message.text) {
            if let Some(greeting) = self.deliver_initial_greeting().await {
                return greeting;
            }
        }
        self.reply_to(user_message).await
    }

    async fn primary_reply(
        &mut self,
        user_message: &ConversationMessage,
        scenario: Scenario,
    ) -> Option<(String, Scenario)> {
        if self.failures.should_enter_fallback() {
            debug!("Fallback mode active, skipping response service");
            return None;
        }

        // Only the turns before this user message
        let end = self
            .history
            .index_of(user_message.id)
            .unwrap_or(self.history.len());
        let prior = &self.history.messages()[..end];
        let result = match self
            .responder
            .respond(&user_message.text, prior, scenario)
            .await
        {
            Ok(reply) if reply.text.trim().is_empty() => {
                Err(VoiceError::response("response service returned an empty reply"))
            }
            other => other,
        };

        match result {
            Ok(reply) => {
                let reply_text = reply.text.trim().to_string();
                let reply_scenario = classify(&reply_text);
                if let Some(suggested) = reply.scenario {
                    if suggested != reply_scenario {
                        debug!(
                            "Backend suggested scenario {}, reply text classifies as {}",
                            suggested, reply_scenario
                        );
                    }
                }
                Some((reply_text, reply_scenario))
            }
            Err(e) => {
                warn!("Primary response failed: {}", e);
                self.failures.record_failure(FailureSource::Response, &e);
                None
            }
        }
    }

    /// Canned reply used whenever the primary path is unavailable
    ///
    /// A greeting anywhere in the message wins over the classified scenario.
    fn fallback_reply(&self, text: &str, scenario: Scenario) -> (String, Scenario) {
        let name = &self.context.persona().name;
        let scenario = if contains_greeting(text) {
            Scenario::Greeting
        } else {
            scenario
        };
        match scenario {
            Scenario::Greeting => (
                format!(
                    "Halló! Ég heiti {}. Því miður næ ég ekki sambandi við þjónustuna eins og er, en ég geri mitt besta til að aðstoða.",
                    name
                ),
                Scenario::Greeting,
            ),
            Scenario::Farewell => (
                "Takk fyrir spjallið. Bless!".to_string(),
                Scenario::Farewell,
            ),
            _ => (
                "Því miður næ ég ekki sambandi við þjónustuna eins og er. Reyndu aftur eftir smástund eða tengdu aftur."
                    .to_string(),
                Scenario::General,
            ),
        }
    }

    async fn deliver(&mut self, message: &ConversationMessage) -> Delivery {
        if !self.voice_enabled {
            return Delivery::TextOnly;
        }

        let scenario = message.scenario.unwrap_or(Scenario::General);
        let params = VoiceParams::for_persona(self.context.persona(), scenario);
        let result = match self.renderer.synthesize(&message.text, &params).await {
            Ok(audio) if audio.is_empty() => {
                Err(VoiceError::Render("voice backend returned no audio".to_string()))
            }
            other => other,
        };

        match result {
            Ok(audio) => {
                debug!("Rendered {} bytes of voice for message {}", audio.len(), message.id);
                Delivery::Spoken(audio)
            }
            Err(e) => {
                warn!("Voice rendering failed, continuing as text only: {}", e);
                self.voice_enabled = false;
                self.failures.record_failure(FailureSource::Render, &e);
                Delivery::RenderFailed
            }
        }
    }

    /// The user greeted but the opening greeting has not been given yet
    pub fn greeting_due(&self) -> bool {
        self.context.user_has_greeted() && !self.context.initial_greeting_done()
    }

    /// Append the opening greeting once per session
    pub async fn deliver_initial_greeting(&mut self) -> Option<DeliveredReply> {
        if self.context.initial_greeting_done() {
            return None;
        }
        let hour = chrono::Local::now().hour();
        let text = self.context.persona().greeting_for_hour(hour);
        self.context.mark_initial_greeting_done();

        let message = self.history.push_assistant(text, Scenario::Greeting);
        let delivery = self.deliver(&message).await;
        Some(DeliveredReply {
            message,
            route: ReplyRoute::Greeting,
            delivery,
        })
    }

    /// Count a failure from outside the turn (microphone, transcription, ...)
    pub fn record_failure(&mut self, error: &VoiceError) -> bool {
        self.failures.record_failure(error.kind(), error)
    }

    /// Clear history and start a new session; failure state is kept
    pub fn reset_conversation(&mut self) {
        info!("Resetting conversation ({} messages)", self.history.len());
        self.history.clear();
        self.context.reset();
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn failures(&self) -> &FailureTracker {
        &self.failures
    }

    pub fn failure_state(&self) -> FailureState {
        self.failures.state()
    }

    pub fn is_fallback(&self) -> bool {
        self.failures.should_enter_fallback()
    }

    pub fn voice_enabled(&self) -> bool {
        self.voice_enabled
    }
}
