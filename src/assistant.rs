//! Event-driven assistant driver
//!
//! Wires the pieces together in data-flow order:
//! microphone → level monitor → VAD → recording → transcription → orchestrator.
//!
//! The driver loop owns the microphone side: level polling, VAD and the
//! recording lifecycle. Anything that waits on a backend (transcription,
//! the conversation turn, reconnect) runs on a separate turn worker, one job
//! at a time and in submission order, so ticks and commands keep flowing
//! while a turn is in flight. Inputs are the poll timer and
//! [`AssistantCommand`]s; outputs are [`AssistantUpdate`]s on an unbounded
//! channel. Each step is also callable directly ([`VoiceAssistant::tick`],
//! [`VoiceAssistant::handle_command`], [`VoiceAssistant::settle`]) so tests
//! can drive it with synthetic time.

use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::audio::{AudioLevelMonitor, MicrophoneSource};
use crate::config::{AudioConfig, Config};
use crate::conversation::{ConversationMessage, Transcript};
use crate::error::{Result, VoiceError};
use crate::gateway::Transcriber;
use crate::notice::Notice;
use crate::orchestrator::{DeliveredReply, TurnOrchestrator};
use crate::recording::{RecordedAudio, RecordingSession, RecordingState, StopReason};
use crate::vad::{VadEvent, VadGate, VadState, VoiceActivityDetector};

/// User actions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssistantCommand {
    /// Manual start/stop, regardless of VAD state
    ToggleRecording,
    SetAutoDetect(bool),
    /// Typed message, handled like a transcript
    SendText(String),
    Reconnect,
    ResetConversation,
    /// Stop at once; a turn in flight is abandoned
    Shutdown,
}

/// State changes for the host UI
#[derive(Debug, Clone)]
pub enum AssistantUpdate {
    /// Microphone level in [0, 1]
    Level(f32),
    Listening(bool),
    /// Backend work is in flight
    Processing(bool),
    Notice(Notice),
    UserMessage(ConversationMessage),
    Reply(DeliveredReply),
    FallbackMode(bool),
}

/// Work that needs the orchestrator
enum TurnJob {
    /// Finished recording: transcribe, then run the turn
    Recording(RecordedAudio),
    Text(String),
    Reconnect,
    ResetConversation,
    /// Failure seen by the driver loop
    Failure(VoiceError),
}

/// Reported by the worker after each job
struct JobDone {
    from_recording: bool,
}

/// Runs jobs in order; owns every await on a backend
struct TurnWorker {
    orchestrator: Arc<Mutex<TurnOrchestrator>>,
    transcriber: Arc<dyn Transcriber>,
    language: String,
    updates: mpsc::UnboundedSender<AssistantUpdate>,
}

impl TurnWorker {
    async fn run(
        self,
        mut jobs: mpsc::UnboundedReceiver<TurnJob>,
        done: mpsc::UnboundedSender<JobDone>,
    ) {
        while let Some(job) = jobs.recv().await {
            let from_recording = matches!(job, TurnJob::Recording(_));
            self.handle(job).await;
            if done.send(JobDone { from_recording }).is_err() {
                break;
            }
        }
        debug!("Turn worker stopped");
    }

    async fn handle(&self, job: TurnJob) {
        match job {
            TurnJob::Recording(audio) => self.transcribe(audio).await,
            TurnJob::Text(text) => self.run_turn(Transcript::new(text), false).await,
            TurnJob::Reconnect => {
                self.orchestrator.lock().await.reconnect().await;
            }
            TurnJob::ResetConversation => self.orchestrator.lock().await.reset_conversation(),
            TurnJob::Failure(error) => {
                self.orchestrator.lock().await.record_failure(&error);
            }
        }
    }

    async fn transcribe(&self, audio: RecordedAudio) {
        info!(
            "Transcribing {} bytes ({} chunks, {:.1}s, {:?})",
            audio.blob.len(),
            audio.chunk_count,
            audio.duration.as_secs_f64(),
            audio.reason
        );

        match self.transcriber.transcribe(&audio.blob, &self.language).await {
            Ok(text) if text.trim().is_empty() => {
                info!("Transcription was empty");
                self.emit(AssistantUpdate::Notice(Notice::NothingHeard));
            }
            Ok(text) => self.run_turn(Transcript::new(text), true).await,
            Err(e) => {
                error!("Transcription failed: {}", e);
                self.orchestrator.lock().await.record_failure(&e);
                self.emit(AssistantUpdate::Notice(Notice::TranscriptionFailed));
            }
        }
    }

    async fn run_turn(&self, transcript: Transcript, spoken: bool) {
        let mut orchestrator = self.orchestrator.lock().await;
        let Some(user_message) = orchestrator.accept_transcript(&transcript) else {
            return;
        };
        self.emit(AssistantUpdate::UserMessage(user_message.clone()));

        let reply = if spoken {
            orchestrator.reply_to_spoken(&user_message).await
        } else {
            orchestrator.reply_to(&user_message).await
        };

        if let Some(notice) = reply.notice() {
            self.emit(AssistantUpdate::Notice(notice));
        }
        self.emit(AssistantUpdate::Reply(reply));
    }

    fn emit(&self, update: AssistantUpdate) {
        // Host may have stopped listening
        let _ = self.updates.send(update);
    }
}

pub struct VoiceAssistant {
    audio: AudioConfig,
    auto_detect_on_start: bool,
    microphone: Arc<dyn MicrophoneSource>,
    orchestrator: Arc<Mutex<TurnOrchestrator>>,
    vad: VoiceActivityDetector,
    recording: RecordingSession,
    /// Holds its own stream, never the recording's
    monitor: Option<AudioLevelMonitor>,
    jobs_tx: mpsc::UnboundedSender<TurnJob>,
    done_rx: mpsc::UnboundedReceiver<JobDone>,
    worker: JoinHandle<()>,
    /// Jobs submitted and not yet reported done
    in_flight: usize,
    fallback_rx: watch::Receiver<bool>,
    updates: mpsc::UnboundedSender<AssistantUpdate>,
}

enum Wake {
    Tick,
    Command(Option<AssistantCommand>),
    JobDone(Option<JobDone>),
    ModeChanged,
}

impl VoiceAssistant {
    /// Build the assistant and spawn its turn worker
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(
        config: &Config,
        microphone: Arc<dyn MicrophoneSource>,
        transcriber: Arc<dyn Transcriber>,
        orchestrator: TurnOrchestrator,
    ) -> (Self, mpsc::UnboundedReceiver<AssistantUpdate>) {
        let (updates, updates_rx) = mpsc::unbounded_channel();
        let fallback_rx = orchestrator.failures().subscribe();
        let orchestrator = Arc::new(Mutex::new(orchestrator));

        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let worker = TurnWorker {
            orchestrator: Arc::clone(&orchestrator),
            transcriber,
            language: config.recording.language.clone(),
            updates: updates.clone(),
        };
        let worker = tokio::spawn(worker.run(jobs_rx, done_tx));

        let assistant = Self {
            audio: config.audio.clone(),
            auto_detect_on_start: config.assistant.auto_detect,
            microphone,
            orchestrator,
            vad: VoiceActivityDetector::new(&config.vad),
            recording: RecordingSession::new(config.recording.clone(), &config.audio),
            monitor: None,
            jobs_tx,
            done_rx,
            worker,
            in_flight: 0,
            fallback_rx,
            updates,
        };
        (assistant, updates_rx)
    }

    /// Initialize the response path and, if configured, voice detection
    pub async fn start(&mut self) {
        {
            let mut orchestrator = self.orchestrator.lock().await;
            info!(
                "Starting voice assistant {} (session {})",
                orchestrator.context().persona().name,
                orchestrator.context().session_id()
            );
            orchestrator.initialize().await;
        }
        if self.auto_detect_on_start {
            self.set_auto_detect(true).await;
        }
        self.publish_mode();
    }

    /// Drive the assistant until `Shutdown` or until the command channel closes
    pub async fn run(mut self, mut commands: mpsc::Receiver<AssistantCommand>) {
        let mut ticker = tokio::time::interval(self.audio.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let wake = tokio::select! {
                _ = ticker.tick() => Wake::Tick,
                command = commands.recv() => Wake::Command(command),
                done = self.done_rx.recv(), if self.in_flight > 0 => Wake::JobDone(done),
                Ok(()) = self.fallback_rx.changed() => Wake::ModeChanged,
            };

            match wake {
                Wake::Tick => self.tick(Instant::now()).await,
                Wake::Command(Some(command)) => {
                    if !self.handle_command(command).await {
                        break;
                    }
                }
                Wake::Command(None) => {
                    debug!("Command channel closed");
                    break;
                }
                Wake::JobDone(Some(done)) => self.complete(done),
                Wake::JobDone(None) => self.worker_gone(),
                Wake::ModeChanged => self.publish_mode(),
            }
        }

        self.shutdown();
    }

    /// One poll interval: sample the level, feed the VAD, enforce the cap
    pub async fn tick(&mut self, now: Instant) {
        let level = match self.monitor.as_mut() {
            Some(monitor) => {
                let level = monitor.sample();
                self.emit(AssistantUpdate::Level(level));
                Some(level)
            }
            None => None,
        };

        self.recording.capture_pending();

        if let Some(result) = self.recording.check_timeout(now) {
            self.emit(AssistantUpdate::Notice(Notice::RecordingTimedOut));
            self.emit(AssistantUpdate::Listening(false));
            self.vad.reset();
            self.finalize(result);
        }

        let gate = VadGate {
            recording_active: self.recording.is_active(),
            processing: self.is_processing(),
        };
        let event = match level {
            Some(level) => self.vad.process(level, now, gate),
            None => self.vad.poll_hangover(now),
        };

        match event {
            Some(VadEvent::SpeechStarted) => self.start_recording(now).await,
            Some(VadEvent::SpeechEnded) => self.stop_recording(StopReason::SpeechEnded, now),
            None => {}
        }

        self.publish_mode();
    }

    /// Apply a user command. Returns `false` on shutdown.
    pub async fn handle_command(&mut self, command: AssistantCommand) -> bool {
        let now = Instant::now();
        debug!("Command: {:?}", command);

        match command {
            AssistantCommand::ToggleRecording => {
                if self.recording.is_capturing() {
                    self.vad.reset();
                    self.stop_recording(StopReason::Manual, now);
                } else {
                    self.start_recording(now).await;
                }
            }
            AssistantCommand::SetAutoDetect(enabled) => self.set_auto_detect(enabled).await,
            AssistantCommand::SendText(text) => {
                if text.trim().is_empty() {
                    debug!("Ignoring blank text");
                } else {
                    self.enqueue(TurnJob::Text(text));
                }
            }
            AssistantCommand::Reconnect => {
                self.emit(AssistantUpdate::Notice(Notice::Reconnecting));
                self.enqueue(TurnJob::Reconnect);
            }
            AssistantCommand::ResetConversation => self.enqueue(TurnJob::ResetConversation),
            AssistantCommand::Shutdown => {
                info!("Shutdown requested");
                return false;
            }
        }

        self.publish_mode();
        true
    }

    /// Wait until every submitted job has finished
    pub async fn settle(&mut self) {
        while self.in_flight > 0 {
            match self.done_rx.recv().await {
                Some(done) => self.complete(done),
                None => self.worker_gone(),
            }
        }
        self.publish_mode();
    }

    /// Stop everything: turn in flight, pending recording, monitor stream
    pub fn shutdown(&mut self) {
        info!("Voice assistant shutting down");
        if self.in_flight > 0 {
            warn!("Abandoning {} pending job(s)", self.in_flight);
        }
        self.worker.abort();
        self.in_flight = 0;
        self.recording.teardown();
        if let Some(mut monitor) = self.monitor.take() {
            monitor.detach();
        }
        self.vad.reset();
    }

    fn enqueue(&mut self, job: TurnJob) {
        if self.jobs_tx.send(job).is_err() {
            warn!("Turn worker is gone, dropping job");
            return;
        }
        self.in_flight += 1;
        if self.in_flight == 1 {
            self.emit(AssistantUpdate::Processing(true));
        }
    }

    fn complete(&mut self, done: JobDone) {
        self.in_flight = self.in_flight.saturating_sub(1);
        if done.from_recording {
            self.recording.finish();
        }
        if self.in_flight == 0 {
            self.emit(AssistantUpdate::Processing(false));
        }
        self.publish_mode();
    }

    fn worker_gone(&mut self) {
        error!("Turn worker stopped with {} job(s) pending", self.in_flight);
        self.in_flight = 0;
        self.recording.finish();
        self.emit(AssistantUpdate::Processing(false));
    }

    async fn set_auto_detect(&mut self, enabled: bool) {
        if !enabled {
            self.vad.disable();
            if let Some(mut monitor) = self.monitor.take() {
                monitor.detach();
            }
            self.emit(AssistantUpdate::Notice(Notice::AutoDetectDisabled));
            return;
        }

        if self.monitor.is_none() {
            match self.attach_monitor().await {
                Ok(monitor) => {
                    self.vad.clear_permission_denied();
                    self.monitor = Some(monitor);
                }
                Err(e) => {
                    self.microphone_failed(e);
                    self.emit(AssistantUpdate::Notice(Notice::MicrophoneUnavailable));
                    return;
                }
            }
        }

        match self.vad.set_auto_detect(true) {
            Ok(()) => {
                info!("Automatic voice detection enabled");
                self.emit(AssistantUpdate::Notice(Notice::AutoDetectEnabled));
            }
            Err(e) => {
                warn!("Cannot enable voice detection: {}", e);
                if let Some(mut monitor) = self.monitor.take() {
                    monitor.detach();
                }
                self.emit(AssistantUpdate::Notice(Notice::MicrophoneUnavailable));
            }
        }
    }

    async fn attach_monitor(&self) -> Result<AudioLevelMonitor> {
        let stream = self.microphone.acquire().await?;
        AudioLevelMonitor::attach(stream, &self.audio)
    }

    async fn start_recording(&mut self, now: Instant) {
        match self.recording.start(self.microphone.as_ref(), now).await {
            Ok(()) => {
                self.emit(AssistantUpdate::Listening(true));
                self.emit(AssistantUpdate::Notice(Notice::ListeningStarted));
            }
            Err(VoiceError::RecordingBusy) => {
                debug!("Recording already active, start ignored");
            }
            Err(e) => {
                self.microphone_failed(e);
                self.emit(AssistantUpdate::Notice(Notice::RecordingFailed));
            }
        }
    }

    fn stop_recording(&mut self, reason: StopReason, now: Instant) {
        let result = match self.recording.stop(reason, now) {
            Ok(None) => return,
            Ok(Some(audio)) => Ok(audio),
            Err(e) => Err(e),
        };

        self.emit(AssistantUpdate::Listening(false));
        if reason == StopReason::Manual {
            self.emit(AssistantUpdate::Notice(Notice::ListeningStopped));
        }
        self.finalize(result);
    }

    /// Microphone errors disable voice detection and release the monitor
    fn microphone_failed(&mut self, error: VoiceError) {
        error!("Microphone failure: {}", error);
        match &error {
            VoiceError::Permission(reason) => {
                self.vad.report_permission_denied(reason);
            }
            _ => self.vad.disable(),
        }
        if let Some(mut monitor) = self.monitor.take() {
            monitor.detach();
        }
        self.enqueue(TurnJob::Failure(error));
    }

    /// Hand a finished recording to the turn worker
    ///
    /// The session stays `Finalizing` until the worker reports the job done.
    fn finalize(&mut self, result: Result<RecordedAudio>) {
        match result {
            Ok(audio) => self.enqueue(TurnJob::Recording(audio)),
            Err(VoiceError::EmptyRecording { size, minimum }) => {
                debug!("Discarded recording of {} bytes (minimum {})", size, minimum);
            }
            Err(e) => {
                error!("Recording failed: {}", e);
                self.enqueue(TurnJob::Failure(e));
                self.emit(AssistantUpdate::Notice(Notice::TranscriptionFailed));
            }
        }
    }

    fn publish_mode(&mut self) {
        if self.fallback_rx.has_changed().unwrap_or(false) {
            let fallback = *self.fallback_rx.borrow_and_update();
            info!("Fallback mode: {}", fallback);
            self.emit(AssistantUpdate::FallbackMode(fallback));
        }
    }

    fn emit(&self, update: AssistantUpdate) {
        // Host may have stopped listening
        let _ = self.updates.send(update);
    }

    /// Lock the orchestrator; waits for the job in flight, if any
    pub async fn orchestrator(&self) -> MutexGuard<'_, TurnOrchestrator> {
        self.orchestrator.lock().await
    }

    pub fn vad_state(&self) -> VadState {
        self.vad.state()
    }

    pub fn is_auto_detect(&self) -> bool {
        self.vad.is_auto_detect()
    }

    pub fn recording_state(&self) -> RecordingState {
        self.recording.state()
    }

    /// Backend work submitted and not yet finished
    pub fn is_processing(&self) -> bool {
        self.in_flight > 0
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitor.is_some()
    }
}
