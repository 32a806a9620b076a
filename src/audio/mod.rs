//! Audio pipeline: PCM16 capture encoding, volume metering, and gapless
//! playback scheduling for the realtime session.

pub mod capture;
pub mod playback;

#[cfg(feature = "audio-io")]
pub mod io;

pub use capture::AudioSource;
pub use playback::{MonotonicClock, NullSink, PlaybackClock, PlaybackScheduler, PlaybackSink};

#[cfg(feature = "audio-io")]
pub use io::{MicrophoneSource, SpeakerSink};

/// Sample rate (24 kHz) the realtime service uses in both directions.
pub const SESSION_SAMPLE_RATE_HZ: u32 = 24_000;
/// Number of audio channels (mono) in both directions.
pub const SESSION_CHANNELS: u16 = 1;
