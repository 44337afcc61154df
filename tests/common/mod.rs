// Scripted fakes for the boundary traits, shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use rosa_voice::config::AssistantConfig;
use rosa_voice::{
    AssistantReply, AudioBlob, AudioFrame, ConversationMessage, DiagnosticEvent, DiagnosticSink,
    FailureTracker, MemoryStore, MicrophoneFeed, MicrophoneSource, MicrophoneStream, Persona,
    ResponseService, Scenario, SessionContext, Transcriber, TurnOrchestrator, VoiceError,
    VoiceParams, VoiceRenderer,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const SAMPLE_RATE: u32 = 16000;

/// Deterministic white noise; amplitude is a fraction of full scale
pub fn noise(len: usize, amplitude: f32, seed: u32) -> Vec<i16> {
    let mut state = seed;
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let unit = (state >> 8) as f32 / (1u32 << 24) as f32 * 2.0 - 1.0;
            (unit * amplitude * i16::MAX as f32) as i16
        })
        .collect()
}

/// 100 ms of loud noise
pub fn loud_frame() -> AudioFrame {
    frame(noise(1600, 0.5, 11))
}

/// 100 ms of silence
pub fn quiet_frame() -> AudioFrame {
    frame(vec![0; 1600])
}

pub fn frame(samples: Vec<i16>) -> AudioFrame {
    AudioFrame {
        samples,
        sample_rate: SAMPLE_RATE,
        channels: 1,
        timestamp_ms: 0,
    }
}

/// Microphone whose streams are fed by the test
#[derive(Default)]
pub struct ScriptedMicrophone {
    feeds: Mutex<Vec<MicrophoneFeed>>,
    failure: Mutex<Option<VoiceError>>,
    acquired: AtomicUsize,
}

impl ScriptedMicrophone {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every following `acquire` fail
    pub fn fail_with(&self, error: VoiceError) {
        *self.failure.lock().unwrap() = Some(error);
    }

    pub fn recover(&self) {
        *self.failure.lock().unwrap() = None;
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    /// Streams whose tracks are still running
    pub fn live_streams(&self) -> usize {
        let mut feeds = self.feeds.lock().unwrap();
        feeds.retain_mut(|feed| !feed.is_stopped());
        feeds.len()
    }

    /// Deliver a frame to every live stream
    pub fn push(&self, frame: AudioFrame) -> usize {
        let mut feeds = self.feeds.lock().unwrap();
        feeds.retain_mut(|feed| !feed.is_stopped());
        feeds
            .iter()
            .filter(|feed| feed.try_send(frame.clone()))
            .count()
    }
}

#[async_trait]
impl MicrophoneSource for ScriptedMicrophone {
    async fn acquire(&self) -> rosa_voice::Result<MicrophoneStream> {
        if let Some(error) = self.failure.lock().unwrap().clone() {
            return Err(error);
        }
        let index = self.acquired.fetch_add(1, Ordering::SeqCst);
        let (stream, feed) = MicrophoneStream::channel(format!("scripted-{}", index), 1024);
        self.feeds.lock().unwrap().push(feed);
        Ok(stream)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Returns queued results, then `default_text`
pub struct ScriptedTranscriber {
    results: Mutex<VecDeque<rosa_voice::Result<String>>>,
    default_text: String,
    pub calls: Mutex<Vec<usize>>,
}

impl ScriptedTranscriber {
    pub fn new(default_text: &str) -> Arc<Self> {
        Arc::new(Self {
            results: Mutex::new(VecDeque::new()),
            default_text: default_text.to_string(),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn push(&self, result: rosa_voice::Result<String>) {
        self.results.lock().unwrap().push_back(result);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe(&self, audio: &AudioBlob, _language: &str) -> rosa_voice::Result<String> {
        self.calls.lock().unwrap().push(audio.len());
        match self.results.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Ok(self.default_text.clone()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RespondCall {
    pub text: String,
    pub history_len: usize,
    pub scenario: Scenario,
}

/// Returns queued replies, then echoes the input
#[derive(Default)]
pub struct ScriptedResponder {
    replies: Mutex<VecDeque<rosa_voice::Result<AssistantReply>>>,
    init_failures: AtomicUsize,
    pub calls: Mutex<Vec<RespondCall>>,
}

impl ScriptedResponder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, reply: rosa_voice::Result<AssistantReply>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn fail_next(&self, count: usize) {
        for _ in 0..count {
            self.push(Err(VoiceError::response("503 Service Unavailable")));
        }
    }

    /// Fail the next `count` initializations
    pub fn fail_init(&self, count: usize) {
        self.init_failures.store(count, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ResponseService for ScriptedResponder {
    async fn initialize(&self) -> rosa_voice::Result<()> {
        let remaining = self.init_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.init_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(VoiceError::response_init("assistant could not be created"));
        }
        Ok(())
    }

    async fn respond(
        &self,
        text: &str,
        history: &[ConversationMessage],
        scenario: Scenario,
    ) -> rosa_voice::Result<AssistantReply> {
        self.calls.lock().unwrap().push(RespondCall {
            text: text.to_string(),
            history_len: history.len(),
            scenario,
        });
        match self.replies.lock().unwrap().pop_front() {
            Some(reply) => reply,
            None => Ok(AssistantReply::new(format!("Svar við: {}", text))),
        }
    }
}

/// Renders a fixed payload, or fails every call
pub struct ScriptedRenderer {
    fail: bool,
    pub calls: Mutex<Vec<VoiceParams>>,
}

impl ScriptedRenderer {
    pub fn working() -> Arc<Self> {
        Arc::new(Self {
            fail: false,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl VoiceRenderer for ScriptedRenderer {
    async fn synthesize(&self, _text: &str, params: &VoiceParams) -> rosa_voice::Result<Vec<u8>> {
        self.calls.lock().unwrap().push(params.clone());
        if self.fail {
            return Err(VoiceError::Render("tts returned 500".to_string()));
        }
        Ok(vec![0x49, 0x44, 0x33, 0x04])
    }
}

#[derive(Default)]
pub struct CollectingSink {
    pub events: Mutex<Vec<DiagnosticEvent>>,
}

impl CollectingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

impl DiagnosticSink for CollectingSink {
    fn log(&self, event: DiagnosticEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub fn orchestrator(
    responder: Arc<dyn ResponseService>,
    renderer: Arc<dyn VoiceRenderer>,
    sink: Arc<dyn DiagnosticSink>,
) -> TurnOrchestrator {
    let context = SessionContext::init(
        Arc::new(MemoryStore::new()),
        Persona::from(&AssistantConfig::default()),
    );
    TurnOrchestrator::new(responder, renderer, FailureTracker::new(3, sink), context)
}
