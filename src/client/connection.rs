use std::sync::{Arc, Once};
use std::time::Instant;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use url::Url;

use super::handlers::{Handlers, ServerEventContext, VolumeContext};
use super::turn::{TurnAction, TurnEngine, TurnState};
use crate::audio::playback::{PlaybackScheduler, PlaybackSink};
use crate::error::RealtimeError;
use crate::types::{ClientEvent, ServerEvent, SessionConfig};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Work the facade and capture task hand to the connection task.
#[derive(Debug)]
pub(crate) enum Command {
    /// Serialize and transmit as-is; fire-and-forget.
    Event(ClientEvent),
    /// End-of-turn trigger, guarded by the turn engine.
    Commit,
    /// One capture block's volume reading.
    Volume(f32),
}

static CRYPTO_INIT: Once = Once::new();

fn install_crypto_provider() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    });
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn spawn_processing_task<S: Clone + Send + Sync + 'static>(
    endpoint: Url,
    setup: SessionConfig,
    handlers: Arc<Handlers<S>>,
    state: Arc<S>,
    turn_tx: watch::Sender<TurnState>,
    sink: Arc<dyn PlaybackSink>,
    ready_tx: oneshot::Sender<Result<(), RealtimeError>>,
    shutdown_rx: oneshot::Receiver<()>,
    command_rx: mpsc::Receiver<Command>,
) {
    tokio::spawn(run_session(
        endpoint,
        setup,
        handlers,
        state,
        turn_tx,
        sink,
        ready_tx,
        shutdown_rx,
        command_rx,
    ));
}

async fn open_socket(endpoint: &Url, setup: &SessionConfig) -> Result<WsStream, RealtimeError> {
    install_crypto_provider();
    let (mut ws, _response) = tokio_tungstenite::connect_async(endpoint.as_str()).await?;
    let setup_event = ClientEvent::SessionUpdate {
        session: setup.clone(),
    };
    let text = serde_json::to_string(&setup_event)?;
    ws.send(Message::Text(text.into())).await?;
    Ok(ws)
}

#[allow(clippy::too_many_arguments)]
async fn run_session<S: Clone + Send + Sync + 'static>(
    endpoint: Url,
    setup: SessionConfig,
    handlers: Arc<Handlers<S>>,
    state: Arc<S>,
    turn_tx: watch::Sender<TurnState>,
    sink: Arc<dyn PlaybackSink>,
    ready_tx: oneshot::Sender<Result<(), RealtimeError>>,
    mut shutdown_rx: oneshot::Receiver<()>,
    mut command_rx: mpsc::Receiver<Command>,
) {
    let ws = match open_socket(&endpoint, &setup).await {
        Ok(ws) => {
            let _ = ready_tx.send(Ok(()));
            ws
        }
        Err(e) => {
            error!("[Connection] Failed to open session at {}: {}", endpoint, e);
            let _ = turn_tx.send(TurnState::Error);
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    info!("[Connection] Session open: {}", endpoint);

    let (mut ws_tx, mut ws_rx) = ws.split();
    let mut engine = TurnEngine::new();
    engine.mark_connected();
    let mut scheduler = PlaybackScheduler::new(sink);

    loop {
        sync_turn_state(&turn_tx, engine.state());
        let deadline = engine.next_deadline();
        tokio::select! {
            _ = &mut shutdown_rx => {
                info!("[Connection] Shutdown requested; closing socket.");
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
            command = command_rx.recv() => match command {
                Some(Command::Event(event)) => {
                    if let Err(e) = send_event(&mut ws_tx, &event).await {
                        error!("[Connection] Send failed: {}", e);
                        engine.fail();
                        break;
                    }
                }
                Some(Command::Commit) => {
                    let actions = engine.commit();
                    if let Err(e) = perform_actions(actions, &mut scheduler, &mut ws_tx).await {
                        error!("[Connection] Commit failed: {}", e);
                        engine.fail();
                        break;
                    }
                }
                Some(Command::Volume(volume)) => {
                    if let Some(handler) = &handlers.on_volume {
                        handler.call(VolumeContext { volume }, state.clone()).await;
                    }
                    engine.on_volume(volume, Instant::now());
                }
                // Every handle clone is gone; nothing can reach this session.
                None => {
                    debug!("[Connection] Command channel closed; shutting down.");
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            },
            message = ws_rx.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    if let Err(e) = handle_frame(
                        text.as_str(),
                        &handlers,
                        &state,
                        &mut engine,
                        &mut scheduler,
                        &mut ws_tx,
                    )
                    .await
                    {
                        error!("[Connection] Reaction failed: {}", e);
                        engine.fail();
                        break;
                    }
                }
                Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => {
                        if let Err(e) = handle_frame(
                            text,
                            &handlers,
                            &state,
                            &mut engine,
                            &mut scheduler,
                            &mut ws_tx,
                        )
                        .await
                        {
                            error!("[Connection] Reaction failed: {}", e);
                            engine.fail();
                            break;
                        }
                    }
                    Err(_) => warn!("[Connection] Dropping non-UTF-8 binary frame."),
                },
                Some(Ok(Message::Close(frame))) => {
                    let code = frame.as_ref().map(|f| f.code);
                    let normal = code == Some(CloseCode::Normal);
                    if code == Some(CloseCode::Policy) {
                        error!("[Connection] Closed by server: API key not configured.");
                    } else if !normal {
                        warn!("[Connection] Abnormal close: {:?}", frame);
                    }
                    engine.on_close(normal);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!("[Connection] Socket error: {}", e);
                    engine.fail();
                    break;
                }
                None => {
                    warn!("[Connection] Socket stream ended without a close frame.");
                    engine.on_close(false);
                    break;
                }
            },
            _ = tokio::time::sleep_until(as_tokio_instant(deadline)), if deadline.is_some() => {
                let actions = engine.on_deadline(Instant::now());
                if !actions.is_empty() {
                    info!("[Connection] Fallback window elapsed; committing turn.");
                }
                if let Err(e) = perform_actions(actions, &mut scheduler, &mut ws_tx).await {
                    error!("[Connection] Fallback commit failed: {}", e);
                    engine.fail();
                    break;
                }
            }
        }
    }

    // Teardown: no timer may fire against a closed session, and no buffer
    // may keep playing after the UI reports the session closed.
    scheduler.interrupt();
    sync_turn_state(&turn_tx, engine.state());
    info!("[Connection] Session task finished in state {:?}.", engine.state());
}

fn as_tokio_instant(deadline: Option<Instant>) -> tokio::time::Instant {
    tokio::time::Instant::from_std(deadline.unwrap_or_else(Instant::now))
}

fn sync_turn_state(turn_tx: &watch::Sender<TurnState>, state: TurnState) {
    turn_tx.send_if_modified(|current| {
        if *current == state {
            false
        } else {
            *current = state;
            true
        }
    });
}

async fn send_event(ws_tx: &mut WsSink, event: &ClientEvent) -> Result<(), RealtimeError> {
    let text = serde_json::to_string(event)?;
    ws_tx.send(Message::Text(text.into())).await?;
    Ok(())
}

/// One inbound frame: parse, notify the subscriber, then react internally.
/// The subscriber always observes the event no later than any state change
/// it triggers.
async fn handle_frame<S: Clone + Send + Sync + 'static>(
    text: &str,
    handlers: &Arc<Handlers<S>>,
    state: &Arc<S>,
    engine: &mut TurnEngine,
    scheduler: &mut PlaybackScheduler,
    ws_tx: &mut WsSink,
) -> Result<(), RealtimeError> {
    let event = match ServerEvent::from_json(text) {
        Ok(event) => event,
        Err(e) => {
            warn!("[Connection] Dropping malformed event: {}", e);
            return Ok(());
        }
    };
    debug!("[Connection] <- {}", event.event_type());

    if let Some(handler) = &handlers.on_event {
        handler
            .call(
                ServerEventContext {
                    event: event.clone(),
                },
                state.clone(),
            )
            .await;
    }

    let actions = engine.on_event(&event, Instant::now());
    perform_actions(actions, scheduler, ws_tx).await?;

    if let ServerEvent::OutputAudioDelta { delta } = &event {
        match scheduler.enqueue_delta(delta) {
            Ok(scheduled) => debug!(
                "[Connection] Audio delta scheduled at t={:.3}s (dur {:.3}s)",
                scheduled.start, scheduled.duration
            ),
            Err(e) => warn!("[Connection] Dropping undecodable audio delta: {}", e),
        }
    }
    Ok(())
}

async fn perform_actions(
    actions: Vec<TurnAction>,
    scheduler: &mut PlaybackScheduler,
    ws_tx: &mut WsSink,
) -> Result<(), RealtimeError> {
    for action in actions {
        match action {
            TurnAction::InterruptPlayback => {
                info!("[Connection] Barge-in: interrupting playback.");
                scheduler.interrupt();
            }
            TurnAction::CancelResponse => {
                send_event(ws_tx, &ClientEvent::ResponseCancel).await?;
            }
            TurnAction::Commit => {
                send_event(ws_tx, &ClientEvent::InputAudioCommit).await?;
                send_event(ws_tx, &ClientEvent::ResponseCreate).await?;
            }
        }
    }
    Ok(())
}
