// demos/voice_chat.rs
//
// Hands-free voice chat against a realtime endpoint: microphone up, agent
// audio down, transcripts printed as they stream. Pass the serving origin as
// the first argument (defaults to http://localhost:3000).

use std::env;
use std::io::Write as _;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use crossbeam_channel::{Sender, bounded};
use realtime_voice_api::audio::SpeakerSink;
use realtime_voice_api::{
    RealtimeVoiceClientBuilder, ServerEvent, ServerEventContext, TranscriptTracker, TurnState,
    VolumeContext,
};
use tracing::{info, warn};

#[derive(Clone)]
struct VoiceChatState {
    transcripts: Arc<StdMutex<TranscriptTracker>>,
    volume_sender: Sender<f32>,
}

async fn handle_event(ctx: ServerEventContext, state: Arc<VoiceChatState>) {
    let mut transcripts = state.transcripts.lock().unwrap();
    transcripts.apply(&ctx.event);
    match &ctx.event {
        ServerEvent::SpeechStarted => {
            println!();
            info!("[Demo] Listening...");
        }
        ServerEvent::InputTranscriptionCompleted { .. } => {
            println!("you: {}", transcripts.user());
        }
        ServerEvent::ResponseCreated => {
            print!("agent: ");
            let _ = std::io::stdout().flush();
        }
        ServerEvent::OutputTranscriptDelta { delta } => {
            print!("{delta}");
            let _ = std::io::stdout().flush();
        }
        _ => {}
    }
}

async fn handle_volume(ctx: VolumeContext, state: Arc<VoiceChatState>) {
    // try_send: a stale meter reading is worthless, never block the session.
    let _ = state.volume_sender.try_send(ctx.volume);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let origin = env::args()
        .nth(1)
        .unwrap_or_else(|| "http://localhost:3000".to_string());

    // Open the output device before the session so the first agent syllable
    // is not eaten by device startup; the sink outlives every session.
    let speaker = SpeakerSink::warmup()?;

    let (volume_tx, volume_rx) = bounded::<f32>(16);
    let state = VoiceChatState {
        transcripts: Arc::new(StdMutex::new(TranscriptTracker::new())),
        volume_sender: volume_tx,
    };

    info!("[Main] Connecting to {}", origin);
    let mut client = RealtimeVoiceClientBuilder::new_with_state(origin, state)
        .voice("Ara")
        .instructions("You are a helpful voice assistant. Answer concisely and naturally.")
        .tool("web_search")
        .playback_sink(speaker)
        .on_event(handle_event)
        .on_volume(handle_volume)
        .connect()
        .await?;

    client.start_audio_capture().await?;
    info!("[Main] Microphone live. Speak, or Ctrl+C to exit.");

    let mut state_changes = client.turn_state_changes();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("[Main] Ctrl+C. Shutting down...");
                break;
            }
            changed = state_changes.changed() => {
                if changed.is_err() {
                    break;
                }
                let turn = *state_changes.borrow_and_update();
                info!("[Main] Turn state: {:?}", turn);
                if turn == TurnState::Error {
                    warn!("[Main] Connection error; restart the demo to retry.");
                    break;
                }
            }
            _ = tokio::time::sleep(Duration::from_millis(200)) => {
                if let Some(volume) = volume_rx.try_iter().last() {
                    let bars = (volume * 60.0).min(20.0) as usize;
                    if bars > 0 {
                        print!("\rmic {:<20}", "|".repeat(bars));
                        let _ = std::io::stdout().flush();
                    }
                }
            }
        }
    }

    client.close().await?;
    info!("[Main] Session closed. Exiting.");
    Ok(())
}
