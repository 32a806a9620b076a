use thiserror::Error;

/// Errors surfaced by the realtime voice client.
///
/// Only `connect` and capture start return these directly; failures inside
/// the running session surface as the [`TurnState::Error`] state instead of
/// crossing the event loop as results.
///
/// [`TurnState::Error`]: crate::client::TurnState::Error
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Microphone permission was denied or no usable input device exists.
    /// Capture aborts; transport and playback keep running.
    #[error("audio input device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The socket failed to open, or failed while the session was live.
    #[error("transport failure: {0}")]
    Transport(String),

    /// Inbound text that does not parse as JSON. Logged and dropped by the
    /// connection task; exposed for callers that parse events themselves.
    #[error("malformed inbound event: {0}")]
    MalformedEvent(#[from] serde_json::Error),

    /// An audio delta whose payload is not valid base64 PCM16. The frame is
    /// dropped; playback continues.
    #[error("undecodable audio delta: {0}")]
    PlaybackDecode(String),

    /// The session endpoint could not be derived from the configured origin.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    /// The configured origin uses a scheme with no socket equivalent.
    #[error("unsupported endpoint scheme: {0}")]
    UnsupportedScheme(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for RealtimeError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        RealtimeError::Transport(err.to_string())
    }
}

impl From<base64::DecodeError> for RealtimeError {
    fn from(err: base64::DecodeError) -> Self {
        RealtimeError::PlaybackDecode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_unavailable_display() {
        let e = RealtimeError::DeviceUnavailable("permission denied".into());
        assert_eq!(
            e.to_string(),
            "audio input device unavailable: permission denied"
        );
    }

    #[test]
    fn test_base64_error_maps_to_playback_decode() {
        use base64::Engine as _;
        let err = base64::engine::general_purpose::STANDARD
            .decode("not-base64!!!")
            .unwrap_err();
        let e: RealtimeError = err.into();
        assert!(matches!(e, RealtimeError::PlaybackDecode(_)));
    }
}
