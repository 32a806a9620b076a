pub mod builder;
pub mod handle;
pub mod handlers;
pub mod transcript;
pub mod turn;

mod connection;

pub use builder::RealtimeVoiceClientBuilder;
pub use handle::RealtimeVoiceClient;
pub use handlers::{ServerEventContext, VolumeContext};
pub use transcript::TranscriptTracker;
pub use turn::{TurnAction, TurnEngine, TurnState};

use url::Url;

use crate::error::RealtimeError;

/// Well-known path of the realtime socket on the serving origin.
pub(crate) const REALTIME_ENDPOINT_PATH: &str = "/api/realtime";

/// Derive the socket endpoint from a base origin: the scheme upgrades to its
/// socket equivalent (`http` → `ws`, `https` → `wss`) and the well-known
/// path replaces whatever the origin carried.
pub(crate) fn realtime_endpoint(origin: &str) -> Result<Url, RealtimeError> {
    let mut url = Url::parse(origin)?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(RealtimeError::UnsupportedScheme(other.to_string())),
    };
    url.set_scheme(scheme)
        .map_err(|()| RealtimeError::UnsupportedScheme(scheme.to_string()))?;
    url.set_path(REALTIME_ENDPOINT_PATH);
    Ok(url)
}
