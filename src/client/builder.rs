use std::sync::Arc;

use tokio::sync::Mutex as TokioMutex;
use tokio::sync::{mpsc, oneshot, watch};

use super::handle::RealtimeVoiceClient;
use super::handlers::{EventHandlerSimple, Handlers, ServerEventContext, VolumeContext};
use super::turn::TurnState;
use crate::audio::playback::{NullSink, PlaybackSink};
use crate::error::RealtimeError;
use crate::types::{SessionConfig, ToolConfig, TurnDetectionConfig};

/// Configures and opens one realtime voice session.
///
/// `S` is caller-owned shared state handed to every subscriber callback,
/// mirroring the connection's lifetime.
pub struct RealtimeVoiceClientBuilder<S: Clone + Send + Sync + 'static> {
    pub(crate) origin: String,
    pub(crate) session: SessionConfig,
    pub(crate) handlers: Handlers<S>,
    pub(crate) state: S,
    pub(crate) playback_sink: Arc<dyn PlaybackSink>,
}

impl<S: Clone + Send + Sync + 'static + Default> RealtimeVoiceClientBuilder<S> {
    /// Build against a serving origin such as `https://chat.example.com`;
    /// the socket endpoint is derived from it by upgrading the scheme and
    /// appending the well-known realtime path.
    pub fn new(origin: impl Into<String>) -> Self {
        Self::new_with_state(origin, S::default())
    }
}

impl<S: Clone + Send + Sync + 'static> RealtimeVoiceClientBuilder<S> {
    pub fn new_with_state(origin: impl Into<String>, state: S) -> Self {
        Self {
            origin: origin.into(),
            session: SessionConfig::default(),
            handlers: Handlers::default(),
            state,
            playback_sink: Arc::new(NullSink),
        }
    }

    pub fn voice(mut self, voice: impl Into<String>) -> Self {
        self.session.voice = voice.into();
        self
    }

    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.session.instructions = instructions.into();
        self
    }

    pub fn transcription_model(mut self, model: impl Into<String>) -> Self {
        self.session.input_audio_transcription.model = model.into();
        self
    }

    pub fn turn_detection(mut self, config: TurnDetectionConfig) -> Self {
        self.session.turn_detection = config;
        self
    }

    /// Enable a server-side tool for the session, e.g. `"web_search"`.
    pub fn tool(mut self, kind: impl Into<String>) -> Self {
        self.session.tools.push(ToolConfig::new(kind));
        self
    }

    /// Replace the whole session configuration at once.
    pub fn session_config(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    /// Borrow a pre-warmed playback sink (see `SpeakerSink::warmup`) so the
    /// output device opens before the session does and survives it. Without
    /// this the session schedules audio into a discard sink.
    pub fn playback_sink(mut self, sink: Arc<dyn PlaybackSink>) -> Self {
        self.playback_sink = sink;
        self
    }

    /// Subscribe to every parsed inbound event. The subscriber runs before
    /// any internal reaction to the same event.
    pub fn on_event(
        mut self,
        handler: impl EventHandlerSimple<ServerEventContext, S> + 'static,
    ) -> Self {
        self.handlers.on_event = Some(Arc::new(handler));
        self
    }

    /// Subscribe to per-block capture volume readings.
    pub fn on_volume(
        mut self,
        handler: impl EventHandlerSimple<VolumeContext, S> + 'static,
    ) -> Self {
        self.handlers.on_volume = Some(Arc::new(handler));
        self
    }

    /// Open the session: resolves once the socket is up and the initial
    /// `session.update` is on the wire, or rejects with the connect failure.
    pub async fn connect(self) -> Result<RealtimeVoiceClient<S>, RealtimeError> {
        let endpoint = super::realtime_endpoint(&self.origin)?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (command_tx, command_rx) = mpsc::channel(100);
        let (ready_tx, ready_rx) = oneshot::channel();
        let (turn_tx, turn_rx) = watch::channel(TurnState::Connecting);

        let state_arc = Arc::new(self.state);
        let handlers_arc = Arc::new(self.handlers);

        super::connection::spawn_processing_task(
            endpoint,
            self.session,
            handlers_arc,
            state_arc.clone(),
            turn_tx,
            self.playback_sink,
            ready_tx,
            shutdown_rx,
            command_rx,
        );

        match ready_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(RealtimeError::Transport(
                    "connection task exited before startup completed".to_string(),
                ));
            }
        }

        Ok(RealtimeVoiceClient {
            shutdown_tx: Arc::new(TokioMutex::new(Some(shutdown_tx))),
            command_sender: Some(command_tx),
            state: state_arc,
            turn_state: turn_rx,
            capture: Arc::new(TokioMutex::new(None)),
        })
    }
}
