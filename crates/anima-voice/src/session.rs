//! Session protocol: the state machine tying capture, codec, channel, and
//! playback together.
//!
//! Lifecycle: `idle → connecting → streaming → idle` (clean stop), with
//! `error` reachable from any state on capture or transport failure. A
//! generation counter invalidates every callback belonging to a superseded
//! pairing: each spawned task captures the generation it was started under
//! and no-ops when the live counter has moved on. That comparison is the
//! sole cancellation mechanism; `stop()` and `start()` only bump the
//! counter and release resources.

use crate::capture::{merge_chunks, CaptureConfig, CaptureSession, CaptureSource};
use crate::channel::{
    ChannelConfig, ChannelConnector, ChannelEvent, EventChannel, WebSocketConnector,
};
use crate::error::VoiceResult;
use crate::playback::{AudioSink, PlaybackQueue, RodioSink};
use crate::protocol::{decode_audio_field, encode_audio_field, ClientEvent, ServerEvent};
use crate::wav::{encode_wav, WireAudioPayload, WAV_ENCODING};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No live pairing.
    Idle,
    /// Capture is up; waiting for the channel handshake and remote `ready`.
    Connecting,
    /// Remote is accepting audio; push-to-talk is live.
    Streaming,
    /// Capture or transport failed. Resources are released.
    Error,
}

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Event-channel settings (URL, bounded connect attempts).
    pub channel: ChannelConfig,

    /// Microphone settings.
    pub capture: CaptureConfig,

    /// Conversation identity announced in `init`.
    pub chat_id: String,

    /// Voice selector announced in `init`.
    pub voice_id: String,

    /// Delay between `audio_data` and `audio_flush` (default: 200ms).
    /// The data must land before the flush is processed.
    pub flush_delay: Duration,

    /// Bounded wait for the remote `ready` after `init` (default: 15s).
    /// Expiry moves the session to `Error` instead of hanging in
    /// `Connecting` forever.
    pub ready_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            channel: ChannelConfig::default(),
            capture: CaptureConfig::default(),
            chat_id: "0".to_string(),
            voice_id: "default".to_string(),
            flush_delay: Duration::from_millis(200),
            ready_timeout: Duration::from_secs(15),
        }
    }
}

impl SessionConfig {
    /// Build from environment: `ANIMA_BACKEND_URL`, `ANIMA_CHAT_ID`,
    /// `ANIMA_VOICE_ID`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("ANIMA_BACKEND_URL") {
            config.channel.url = url;
        }
        if let Ok(chat_id) = std::env::var("ANIMA_CHAT_ID") {
            config.chat_id = chat_id;
        }
        if let Ok(voice_id) = std::env::var("ANIMA_VOICE_ID") {
            config.voice_id = voice_id;
        }
        config
    }
}

/// State shared with the session's spawned tasks.
struct SessionShared {
    state: Mutex<SessionState>,
    generation: AtomicU64,
    channel: Mutex<Option<Arc<dyn EventChannel>>>,
    expression: Mutex<Option<String>>,
    last_error: Mutex<Option<String>>,
    expression_tx: mpsc::UnboundedSender<String>,
}

impl SessionShared {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn state(&self) -> SessionState {
        self.state.lock().map(|s| *s).unwrap_or(SessionState::Error)
    }

    fn set_state(&self, next: SessionState) {
        if let Ok(mut state) = self.state.lock() {
            *state = next;
        }
    }

    /// Record a failure for the given pairing; stale failures are dropped.
    fn fail(&self, generation: u64, message: String) {
        if !self.is_current(generation) {
            return;
        }
        warn!("Session: {}", message);
        if let Ok(mut err) = self.last_error.lock() {
            *err = Some(message);
        }
        self.set_state(SessionState::Error);
    }

    fn current_channel(&self) -> Option<Arc<dyn EventChannel>> {
        self.channel.lock().ok().and_then(|c| c.clone())
    }
}

/// Builds the output sink inside the playback worker thread.
pub type SinkFactory = Arc<dyn Fn() -> VoiceResult<Box<dyn AudioSink>> + Send + Sync>;

/// Builds the capture source on `start()`.
pub type CaptureFactory =
    Arc<dyn Fn(CaptureConfig) -> VoiceResult<Box<dyn CaptureSource>> + Send + Sync>;

/// Voice session: owns capture, channel, and playback for one pairing.
pub struct VoiceSession {
    config: SessionConfig,
    shared: Arc<SessionShared>,
    connector: Arc<dyn ChannelConnector>,
    capture_factory: CaptureFactory,
    sink_factory: SinkFactory,
    capture: Option<Box<dyn CaptureSource>>,
    playback: Option<Arc<PlaybackQueue>>,
    expression_rx: Option<mpsc::UnboundedReceiver<String>>,
}

impl VoiceSession {
    /// Create a session with the production microphone, transport, and
    /// output device.
    pub fn new(config: SessionConfig) -> Self {
        Self::with_parts(
            config,
            Arc::new(WebSocketConnector),
            Arc::new(|capture_config| {
                Ok(Box::new(CaptureSession::initialize(capture_config)?)
                    as Box<dyn CaptureSource>)
            }),
            Arc::new(|| Ok(Box::new(RodioSink::new()?) as Box<dyn AudioSink>)),
        )
    }

    /// Create a session with explicit collaborator seams (tests,
    /// alternative backends).
    pub fn with_parts(
        config: SessionConfig,
        connector: Arc<dyn ChannelConnector>,
        capture_factory: CaptureFactory,
        sink_factory: SinkFactory,
    ) -> Self {
        let (expression_tx, expression_rx) = mpsc::unbounded_channel();
        Self {
            config,
            shared: Arc::new(SessionShared {
                state: Mutex::new(SessionState::Idle),
                generation: AtomicU64::new(0),
                channel: Mutex::new(None),
                expression: Mutex::new(None),
                last_error: Mutex::new(None),
                expression_tx,
            }),
            connector,
            capture_factory,
            sink_factory,
            capture: None,
            playback: None,
            expression_rx: Some(expression_rx),
        }
    }

    /// Start (or restart) the session. A prior pairing is torn down first;
    /// its pending callbacks become stale through the generation bump.
    ///
    /// Must be called within a tokio runtime: the channel handshake and
    /// event loop run as spawned tasks and report through the state.
    pub fn start(&mut self) -> VoiceResult<()> {
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.release_resources();

        if let Ok(mut err) = self.shared.last_error.lock() {
            *err = None;
        }
        if let Ok(mut expr) = self.shared.expression.lock() {
            *expr = None;
        }
        self.shared.set_state(SessionState::Connecting);
        info!("Session: connecting to {}", self.config.channel.url);

        let capture = match (self.capture_factory)(self.config.capture.clone()) {
            Ok(c) => c,
            Err(e) => {
                self.shared.fail(generation, format!("capture init failed: {}", e));
                return Err(e);
            }
        };
        self.capture = Some(capture);

        let factory = Arc::clone(&self.sink_factory);
        let playback = match PlaybackQueue::spawn(move || factory()) {
            Ok(q) => Arc::new(q),
            Err(e) => {
                self.shared.fail(generation, format!("playback init failed: {}", e));
                return Err(e);
            }
        };
        self.playback = Some(Arc::clone(&playback));

        let shared = Arc::clone(&self.shared);
        let connector = Arc::clone(&self.connector);
        let config = self.config.clone();
        tokio::spawn(async move {
            run_pairing(shared, connector, config, playback, generation).await;
        });

        Ok(())
    }

    /// Open the push-to-talk gate. Accepted only while streaming.
    pub fn press(&self) -> bool {
        if self.shared.state() != SessionState::Streaming {
            debug!("Session: press ignored (not streaming)");
            return false;
        }
        let Some(capture) = &self.capture else {
            return false;
        };
        if !capture.is_recording() {
            capture.start_recording();
            // The avatar drops its last remote expression while the user talks.
            if let Ok(mut expr) = self.shared.expression.lock() {
                *expr = None;
            }
            info!("Session: push-to-talk held, recording");
        }
        true
    }

    /// Close the gate and send the buffered utterance: one complete WAV as
    /// `audio_data`, then `audio_flush` after the configured delay. An
    /// empty buffer sends nothing.
    pub fn release(&self) -> VoiceResult<()> {
        let Some(capture) = &self.capture else {
            return Ok(());
        };
        if !capture.is_recording() {
            return Ok(());
        }
        capture.stop_recording();

        let chunks = capture.take_buffered_chunks();
        let samples = merge_chunks(&chunks);
        if samples.is_empty() {
            debug!("Session: release with empty buffer, nothing to send");
            return Ok(());
        }

        let Some(channel) = self.shared.current_channel() else {
            warn!("Session: channel not connected, dropping utterance");
            return Ok(());
        };

        let sample_rate = capture.sample_rate();
        let payload = encode_wav(&samples, sample_rate)?;
        info!(
            "Session: sending complete WAV: {} samples ({:.2}s)",
            samples.len(),
            samples.len() as f32 / sample_rate as f32
        );
        channel.emit(ClientEvent::AudioData {
            audio: encode_audio_field(&payload.bytes),
            sample_rate,
            encoding: WAV_ENCODING.to_string(),
        })?;

        // Flush trails the data so ordering on the channel is preserved.
        let shared = Arc::clone(&self.shared);
        let generation = self.shared.generation.load(Ordering::SeqCst);
        let delay = self.config.flush_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !shared.is_current(generation) {
                return;
            }
            if let Some(channel) = shared.current_channel() {
                if channel.emit(ClientEvent::AudioFlush).is_ok() {
                    debug!("Session: audio_flush sent");
                }
            }
        });

        Ok(())
    }

    /// Tear the pairing down and return to `Idle`. Idempotent.
    pub fn stop(&mut self) {
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        self.release_resources();
        self.shared.set_state(SessionState::Idle);
        if let Ok(mut expr) = self.shared.expression.lock() {
            *expr = None;
        }
        info!("Session: stopped");
    }

    /// Current lifecycle state.
    pub fn status(&self) -> SessionState {
        self.shared.state()
    }

    /// Whether the push-to-talk gate is open.
    pub fn is_recording(&self) -> bool {
        self.capture.as_ref().is_some_and(|c| c.is_recording())
    }

    /// Last remote expression, cleared when the user starts speaking.
    pub fn current_expression(&self) -> Option<String> {
        self.shared.expression.lock().ok().and_then(|e| e.clone())
    }

    /// Last failure message, if the session is in `Error`.
    pub fn last_error(&self) -> Option<String> {
        self.shared.last_error.lock().ok().and_then(|e| e.clone())
    }

    /// Receiver of remote expression selections. Can be taken once.
    pub fn take_expression_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<String>> {
        self.expression_rx.take()
    }

    fn release_resources(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            capture.cleanup();
        }
        if let Ok(mut slot) = self.shared.channel.lock() {
            if let Some(channel) = slot.take() {
                channel.disconnect();
            }
        }
        if let Some(playback) = self.playback.take() {
            playback.stop_all();
        }
    }
}

impl Drop for VoiceSession {
    fn drop(&mut self) {
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        self.release_resources();
    }
}

/// Connect, announce, and run the event loop for one pairing.
async fn run_pairing(
    shared: Arc<SessionShared>,
    connector: Arc<dyn ChannelConnector>,
    config: SessionConfig,
    playback: Arc<PlaybackQueue>,
    generation: u64,
) {
    let (channel, events) = match connector.connect(&config.channel).await {
        Ok(pair) => pair,
        Err(e) => {
            shared.fail(generation, format!("connect failed: {}", e));
            return;
        }
    };

    if !shared.is_current(generation) {
        // A newer pairing superseded this connect while it was in flight.
        channel.disconnect();
        return;
    }

    if let Ok(mut slot) = shared.channel.lock() {
        *slot = Some(Arc::clone(&channel));
    }

    info!("Session: connected, announcing identity");
    if let Err(e) = channel.emit(ClientEvent::Init {
        chat_id: config.chat_id.clone(),
        voice_id: config.voice_id.clone(),
    }) {
        shared.fail(generation, format!("init failed: {}", e));
        return;
    }

    // Bounded wait for `ready`; without it a silent remote would pin the
    // session in Connecting forever.
    {
        let shared = Arc::clone(&shared);
        let timeout = config.ready_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if shared.is_current(generation) && shared.state() == SessionState::Connecting {
                if let Some(channel) = shared.current_channel() {
                    channel.disconnect();
                }
                shared.fail(
                    generation,
                    format!("remote never signalled ready within {:?}", timeout),
                );
            }
        });
    }

    run_event_loop(shared, events, playback, generation).await;
}

async fn run_event_loop(
    shared: Arc<SessionShared>,
    mut events: mpsc::UnboundedReceiver<ChannelEvent>,
    playback: Arc<PlaybackQueue>,
    generation: u64,
) {
    while let Some(event) = events.recv().await {
        if !shared.is_current(generation) {
            break;
        }
        match event {
            ChannelEvent::Message(ServerEvent::Ready) => {
                info!("Session: backend ready, push-to-talk live");
                shared.set_state(SessionState::Streaming);
            }
            ChannelEvent::Message(ServerEvent::TtsAudio { audio }) => {
                match decode_audio_field(&audio) {
                    Ok(bytes) => playback.enqueue(WireAudioPayload::from_bytes(bytes)),
                    // Malformed reply audio is non-fatal: discard, keep going.
                    Err(e) => warn!("Session: discarding tts_audio: {}", e),
                }
            }
            ChannelEvent::Message(ServerEvent::TtsComplete) => {
                debug!("Session: tts_complete");
            }
            ChannelEvent::Message(ServerEvent::Expression { expression }) => {
                debug!("Session: expression received: {}", expression);
                if let Ok(mut slot) = shared.expression.lock() {
                    *slot = Some(expression.clone());
                }
                let _ = shared.expression_tx.send(expression);
            }
            ChannelEvent::Message(ServerEvent::ConnectError { message }) => {
                shared.fail(generation, format!("remote connect_error: {}", message));
                break;
            }
            ChannelEvent::Message(ServerEvent::Disconnect { reason }) => {
                debug!("Session: remote disconnect: {:?}", reason);
                shared.set_state(SessionState::Idle);
                break;
            }
            ChannelEvent::Closed { reason } => {
                debug!("Session: channel closed: {:?}", reason);
                shared.set_state(SessionState::Idle);
                break;
            }
            ChannelEvent::TransportError(message) => {
                shared.fail(generation, format!("transport failure: {}", message));
                break;
            }
        }
    }
}
