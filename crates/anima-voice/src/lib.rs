//! # anima-voice — push-to-talk voice transport
//!
//! Real-time, bidirectional voice between a user and a remote conversation
//! backend. Hold to talk: captured audio is buffered, merged into one WAV
//! per utterance, and streamed over a duplex event channel; synthesized
//! replies come back the same way and play strictly in order.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       Voice Session                          │
//! │  ┌────────────┐   ┌───────────┐   ┌───────────────────┐     │
//! │  │  Capture   │ → │ WAV codec │ → │  Event Channel    │     │
//! │  │  (cpal)    │   │  (hound)  │   │  (websocket)      │     │
//! │  └────────────┘   └───────────┘   └───────────────────┘     │
//! │        gate            ↑                   ↓ tts_audio       │
//! │   press / release      │           ┌───────────────────┐     │
//! │                        └───────────│  Playback Queue   │     │
//! │                          decode    │     (rodio)       │     │
//! │                                    └───────────────────┘     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Cancellation is generation-based: restarting or stopping the session
//! bumps an epoch counter and every in-flight callback checks it before
//! touching shared state.

pub mod capture;
pub mod channel;
pub mod error;
pub mod playback;
pub mod protocol;
pub mod session;
pub mod wav;

pub use capture::{merge_chunks, AudioChunk, CaptureConfig, CaptureSession, CaptureSource};
pub use channel::{
    ChannelConfig, ChannelConnector, ChannelEvent, EventChannel, WebSocketChannel,
    WebSocketConnector,
};
pub use error::{VoiceError, VoiceResult};
pub use playback::{AudioSink, NullSink, PlaybackItem, PlaybackQueue, RodioSink};
pub use protocol::{decode_audio_field, encode_audio_field, ClientEvent, ServerEvent};
pub use session::{CaptureFactory, SessionConfig, SessionState, SinkFactory, VoiceSession};
pub use wav::{decode_wav, encode_wav, WireAudioPayload, TARGET_SAMPLE_RATE, WAV_ENCODING};
