//! Client for realtime voice sessions over a persistent WebSocket.
//!
//! The crate wraps one bidirectional, low-latency audio conversation:
//! microphone blocks are quantized to PCM16 and streamed up as base64
//! frames, synthesized agent audio streams back down and is scheduled for
//! gapless playback, and a turn-taking engine decides who is speaking —
//! interrupting playback when the user barges in, and committing the turn
//! through two independent fallback timers when the remote voice-activity
//! signals go quiet.
//!
//! ```no_run
//! use realtime_voice_api::RealtimeVoiceClientBuilder;
//!
//! # async fn run() -> Result<(), realtime_voice_api::RealtimeError> {
//! let mut client = RealtimeVoiceClientBuilder::<()>::new("https://chat.example.com")
//!     .voice("Ara")
//!     .instructions("Answer briefly.")
//!     .connect()
//!     .await?;
//! # #[cfg(feature = "audio-io")]
//! client.start_audio_capture().await?;
//! // ... conversation runs; events arrive via the builder's subscribers ...
//! client.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod audio;
pub mod client;
pub mod error;
pub mod types;

pub use client::{
    RealtimeVoiceClient, RealtimeVoiceClientBuilder, ServerEventContext, TranscriptTracker,
    TurnState, VolumeContext,
};
pub use error::RealtimeError;
pub use types::{ClientEvent, ServerEvent, SessionConfig};
