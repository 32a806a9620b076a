use std::sync::Arc;

use tokio::sync::Mutex as TokioMutex;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use super::RealtimeVoiceClientBuilder;
use super::connection::Command;
use super::turn::TurnState;
use crate::audio::capture::{AudioSource, block_volume, encode_block, quantize_block};
use crate::error::RealtimeError;
use crate::types::ClientEvent;

/// Handle to a live voice session.
///
/// Cloneable; every clone talks to the same connection task. Outbound sends
/// are fire-and-forget: once the session is closed (or the task is gone)
/// they are silently dropped rather than queued or erred — stale control
/// messages after disconnect are meaningless.
#[derive(Clone)]
pub struct RealtimeVoiceClient<S: Clone + Send + Sync + 'static> {
    pub(crate) shutdown_tx: Arc<TokioMutex<Option<oneshot::Sender<()>>>>,
    pub(crate) command_sender: Option<mpsc::Sender<Command>>,
    pub(crate) state: Arc<S>,
    pub(crate) turn_state: watch::Receiver<TurnState>,
    pub(crate) capture: Arc<TokioMutex<Option<CaptureSession>>>,
}

/// A running capture pipeline: the device seam plus the task that encodes
/// and forwards its blocks.
pub(crate) struct CaptureSession {
    source: Box<dyn AudioSource>,
    task: tokio::task::JoinHandle<()>,
}

impl<S: Clone + Send + Sync + 'static> RealtimeVoiceClient<S> {
    pub fn builder_with_state(
        origin: impl Into<String>,
        state: S,
    ) -> RealtimeVoiceClientBuilder<S> {
        RealtimeVoiceClientBuilder::new_with_state(origin, state)
    }

    pub fn state(&self) -> Arc<S> {
        self.state.clone()
    }

    /// Current turn state.
    pub fn turn_state(&self) -> TurnState {
        *self.turn_state.borrow()
    }

    /// A watch receiver that yields every turn-state change, for UIs that
    /// need to render "listening"/"speaking"/"error" live.
    pub fn turn_state_changes(&self) -> watch::Receiver<TurnState> {
        self.turn_state.clone()
    }

    /// Transmit a raw event. Dropped silently when the session is closed.
    pub async fn send(&self, event: ClientEvent) {
        match &self.command_sender {
            Some(sender) => {
                if sender.send(Command::Event(event)).await.is_err() {
                    debug!("[ClientHandle] Session task gone; dropping event.");
                }
            }
            None => debug!("[ClientHandle] Session closed; dropping event."),
        }
    }

    /// End-of-turn trigger: commit the input buffer and request a response.
    /// A no-op once a response for this turn has already started.
    pub async fn commit(&self) {
        match &self.command_sender {
            Some(sender) => {
                if sender.send(Command::Commit).await.is_err() {
                    debug!("[ClientHandle] Session task gone; dropping commit.");
                }
            }
            None => debug!("[ClientHandle] Session closed; dropping commit."),
        }
    }

    /// Start streaming the default microphone into the session.
    #[cfg(feature = "audio-io")]
    pub async fn start_audio_capture(&self) -> Result<(), RealtimeError> {
        self.start_audio_capture_from(Box::new(crate::audio::io::MicrophoneSource::new()))
            .await
    }

    /// Start streaming an arbitrary audio source into the session. Each
    /// block is quantized to PCM16, its volume reported, and the encoded
    /// frame appended to the input buffer — in production order, one block
    /// at a time. Device failure aborts capture only; transport and
    /// playback stay up.
    pub async fn start_audio_capture_from(
        &self,
        mut source: Box<dyn AudioSource>,
    ) -> Result<(), RealtimeError> {
        let mut capture_guard = self.capture.lock().await;
        if capture_guard.is_some() {
            debug!("[ClientHandle] Audio capture already running.");
            return Ok(());
        }
        let command_sender = match &self.command_sender {
            Some(sender) => sender.clone(),
            None => {
                warn!("[ClientHandle] Capture requested after close; ignoring.");
                return Ok(());
            }
        };

        let mut blocks = source.start()?;
        let task = tokio::spawn(async move {
            while let Some(block) = blocks.recv().await {
                if block.is_empty() {
                    continue;
                }
                let pcm = quantize_block(&block);
                let volume = block_volume(&pcm);
                if command_sender.send(Command::Volume(volume)).await.is_err() {
                    break;
                }
                let audio = encode_block(&pcm);
                let event = ClientEvent::InputAudioAppend { audio };
                if command_sender.send(Command::Event(event)).await.is_err() {
                    break;
                }
            }
            debug!("[Capture] Block stream ended.");
        });

        *capture_guard = Some(CaptureSession { source, task });
        info!("[ClientHandle] Audio capture started.");
        Ok(())
    }

    /// Release the capture device and stop the encoding task. Safe when
    /// capture never started.
    pub async fn stop_audio_capture(&self) {
        let mut capture_guard = self.capture.lock().await;
        if let Some(mut session) = capture_guard.take() {
            session.source.stop();
            session.task.abort();
            info!("[ClientHandle] Audio capture stopped.");
        }
    }

    /// Close the session: stop capture, signal the connection task to close
    /// the socket, and drop the outgoing channel. Idempotent — safe to call
    /// repeatedly and safe when startup never finished.
    pub async fn close(&mut self) -> Result<(), RealtimeError> {
        info!("[ClientHandle] Close requested.");
        self.stop_audio_capture().await;
        let mut shutdown_tx_guard = self.shutdown_tx.lock().await;
        if let Some(tx) = shutdown_tx_guard.take() {
            if tx.send(()).is_err() {
                info!("[ClientHandle] Session task already gone.");
            } else {
                info!("[ClientHandle] Shutdown signal sent to session task.");
            }
        }
        self.command_sender.take();
        Ok(())
    }
}

impl<S: Clone + Send + Sync + 'static> Drop for RealtimeVoiceClient<S> {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.shutdown_tx.try_lock() {
            if let Some(tx) = guard.take() {
                warn!("[ClientHandle] Dropped without explicit close(); signalling shutdown.");
                if tx.send(()).is_err() {
                    debug!("[ClientHandle] Drop: session task already gone.");
                }
            }
            self.command_sender.take();
        } else if self.command_sender.is_some() {
            warn!("[ClientHandle] Dropped without close() and shutdown lock busy.");
            self.command_sender.take();
        }
    }
}
