use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use rosa_voice::{
    AssistantCommand, AssistantUpdate, Config, DiagnosticSink, FailureTracker, FileMicrophone,
    MemoryStore, MicrophoneSource, MicrophoneStream, NatsClient, NatsDiagnosticSink,
    NatsResponder, NatsTranscriber, NatsVoiceRenderer, OfflineRenderer, OfflineResponder,
    OfflineTranscriber, Persona, ResponseService, SessionContext, TracingSink, Transcriber,
    TurnOrchestrator, VoiceAssistant, VoiceError, VoiceRenderer,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Frame length used when playing a WAV file as a microphone
const FILE_FRAME_MS: u64 = 100;

#[derive(Parser, Debug)]
#[command(name = "rosa-voice", version, about = "Voice assistant core for Rósa")]
struct Args {
    /// Config file (extension optional)
    #[arg(long, default_value = "config/rosa-voice")]
    config: String,

    /// Play a WAV file as the microphone, with voice detection on
    #[arg(long, value_name = "WAV", conflicts_with = "text")]
    input: Option<String>,

    /// Read typed messages from stdin
    #[arg(long)]
    text: bool,
}

/// Used when no microphone is available to this process
struct NoMicrophone;

#[async_trait]
impl MicrophoneSource for NoMicrophone {
    async fn acquire(&self) -> rosa_voice::Result<MicrophoneStream> {
        Err(VoiceError::Device("no microphone attached".to_string()))
    }

    fn name(&self) -> &str {
        "none"
    }
}

struct Gateways {
    transcriber: Arc<dyn Transcriber>,
    responder: Arc<dyn ResponseService>,
    renderer: Arc<dyn VoiceRenderer>,
    diagnostics: Arc<dyn DiagnosticSink>,
}

impl Gateways {
    fn offline() -> Self {
        Self {
            transcriber: Arc::new(OfflineTranscriber),
            responder: Arc::new(OfflineResponder),
            renderer: Arc::new(OfflineRenderer),
            diagnostics: Arc::new(TracingSink),
        }
    }

    async fn connect(cfg: &Config, session_id: &str) -> Self {
        if cfg.nats.url.is_none() {
            info!("No NATS url configured, running with offline backends");
            return Self::offline();
        }

        match NatsClient::connect(&cfg.nats).await {
            Ok(client) => {
                let client = Arc::new(client);
                Self {
                    transcriber: Arc::new(NatsTranscriber::new(client.clone(), session_id)),
                    responder: Arc::new(NatsResponder::new(client.clone(), session_id)),
                    renderer: Arc::new(NatsVoiceRenderer::new(client.clone())),
                    diagnostics: Arc::new(NatsDiagnosticSink::new(client)),
                }
            }
            Err(e) => {
                warn!("NATS unavailable, running with offline backends: {:#}", e);
                Self::offline()
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut cfg = Config::load(&args.config)?;

    info!("Rósa voice v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Assistant: {} ({:?}), language {}",
        cfg.assistant.name, cfg.assistant.gender, cfg.recording.language
    );

    if args.input.is_none() && !args.text {
        info!("Nothing to do: pass --input <wav> or --text");
        return Ok(());
    }

    let context = SessionContext::init(Arc::new(MemoryStore::new()), Persona::from(&cfg.assistant));
    let gateways = Gateways::connect(&cfg, context.session_id()).await;
    let failures = FailureTracker::new(cfg.assistant.failure_threshold, gateways.diagnostics);
    let orchestrator =
        TurnOrchestrator::new(gateways.responder, gateways.renderer, failures, context);

    let file_microphone = args
        .input
        .as_ref()
        .map(|path| Arc::new(FileMicrophone::new(path.clone(), FILE_FRAME_MS)));
    let microphone: Arc<dyn MicrophoneSource> = match &file_microphone {
        Some(mic) => mic.clone() as Arc<dyn MicrophoneSource>,
        None => Arc::new(NoMicrophone),
    };
    if file_microphone.is_some() {
        cfg.assistant.auto_detect = true;
    }

    let (mut assistant, updates) =
        VoiceAssistant::new(&cfg, microphone, gateways.transcriber, orchestrator);
    assistant.start().await;

    let (commands_tx, commands_rx) = mpsc::channel(32);
    let runner = tokio::spawn(assistant.run(commands_rx));
    let (busy_tx, mut busy_rx) = watch::channel(false);
    let printer = tokio::spawn(print_updates(updates, cfg.assistant.name.clone(), busy_tx));

    match file_microphone {
        Some(mic) => {
            mic.wait_until_finished().await;
            // Let the hangover run out so the last recording is handed off
            let settle = Duration::from_millis(cfg.vad.hangover_ms) + cfg.audio.poll_interval() * 5;
            tokio::time::sleep(settle).await;
        }
        None => {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let command = match line {
                    "/reconnect" => AssistantCommand::Reconnect,
                    "/reset" => AssistantCommand::ResetConversation,
                    "/quit" => break,
                    text => AssistantCommand::SendText(text.to_string()),
                };
                if commands_tx.send(command).await.is_err() {
                    break;
                }
            }
        }
    }

    // Let the last command reach the runner, then wait for its turn to finish
    tokio::time::sleep(cfg.audio.poll_interval() * 2).await;
    // Errors only if the printer already stopped
    let _ = busy_rx.wait_for(|busy| !*busy).await;

    // Runner may already have stopped
    let _ = commands_tx.send(AssistantCommand::Shutdown).await;
    runner.await.context("Assistant task failed")?;
    printer.await.context("Printer task failed")?;

    Ok(())
}

async fn print_updates(
    mut updates: mpsc::UnboundedReceiver<AssistantUpdate>,
    name: String,
    busy: watch::Sender<bool>,
) {
    while let Some(update) = updates.recv().await {
        match update {
            AssistantUpdate::Level(_) => {}
            AssistantUpdate::Listening(listening) => info!("Listening: {}", listening),
            AssistantUpdate::Processing(processing) => {
                busy.send_replace(processing);
            }
            AssistantUpdate::Notice(notice) if notice.is_error() => warn!("{}", notice),
            AssistantUpdate::Notice(notice) => info!("{}", notice),
            AssistantUpdate::UserMessage(message) => println!("> {}", message.text),
            AssistantUpdate::Reply(reply) => {
                println!("{}: {}", name, reply.message.text);
            }
            AssistantUpdate::FallbackMode(true) => warn!("Fallback mode on"),
            AssistantUpdate::FallbackMode(false) => info!("Fallback mode off"),
        }
    }
}
