//! cpal-backed microphone source and speaker sink.
//!
//! cpal streams are not `Send`, so each device lives on its own worker
//! thread: the thread opens the stream, reports readiness back to the
//! caller, then parks until told to stop. Stopping drops the stream, which
//! releases the device (no lingering microphone indicator after close).

use std::collections::VecDeque;
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, StreamConfig};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::audio::capture::AudioSource;
use crate::audio::playback::PlaybackSink;
use crate::audio::{SESSION_CHANNELS, SESSION_SAMPLE_RATE_HZ};
use crate::error::RealtimeError;

struct DeviceWorker {
    stop_tx: std_mpsc::Sender<()>,
    handle: thread::JoinHandle<()>,
}

impl DeviceWorker {
    fn stop(self) {
        let _ = self.stop_tx.send(());
        let _ = self.handle.join();
    }
}

/// Spawn a thread that builds a stream, reports the result, and keeps the
/// stream alive until stopped.
fn spawn_device_worker<F>(build: F) -> Result<DeviceWorker, RealtimeError>
where
    F: FnOnce() -> Result<cpal::Stream, RealtimeError> + Send + 'static,
{
    let (ready_tx, ready_rx) = std_mpsc::channel();
    let (stop_tx, stop_rx) = std_mpsc::channel();
    let handle = thread::spawn(move || {
        let stream = match build() {
            Ok(stream) => {
                let _ = ready_tx.send(Ok(()));
                stream
            }
            Err(e) => {
                let _ = ready_tx.send(Err(e));
                return;
            }
        };
        // Parked until stop() or until the worker handle is dropped.
        let _ = stop_rx.recv();
        drop(stream);
    });
    match ready_rx.recv() {
        Ok(Ok(())) => Ok(DeviceWorker { stop_tx, handle }),
        Ok(Err(e)) => {
            let _ = handle.join();
            Err(e)
        }
        Err(_) => Err(RealtimeError::DeviceUnavailable(
            "audio worker thread died during startup".to_string(),
        )),
    }
}

/// Pick an f32 config covering the session rate, preferring the fewest
/// channels. Mirrors the device search the session format requires.
fn find_f32_config<I>(ranges: I) -> Option<(StreamConfig, u16)>
where
    I: Iterator<Item = cpal::SupportedStreamConfigRange>,
{
    let mut best: Option<cpal::SupportedStreamConfigRange> = None;
    for range in ranges {
        if range.sample_format() != SampleFormat::F32 {
            continue;
        }
        if range.min_sample_rate().0 > SESSION_SAMPLE_RATE_HZ
            || range.max_sample_rate().0 < SESSION_SAMPLE_RATE_HZ
        {
            continue;
        }
        let better = match &best {
            None => true,
            Some(current) => range.channels() < current.channels(),
        };
        if better {
            best = Some(range);
        }
    }
    best.map(|range| {
        let channels = range.channels();
        let config = range
            .with_sample_rate(SampleRate(SESSION_SAMPLE_RATE_HZ))
            .into();
        (config, channels)
    })
}

/// Default-host microphone producing mono f32 blocks at the session rate.
///
/// Multi-channel devices are downmixed by averaging each frame. Blocks are
/// delivered through a bounded channel; a full channel drops the block
/// rather than stalling the device callback.
pub struct MicrophoneSource {
    worker: Option<DeviceWorker>,
}

impl MicrophoneSource {
    pub fn new() -> Self {
        Self { worker: None }
    }
}

impl Default for MicrophoneSource {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSource for MicrophoneSource {
    fn start(&mut self) -> Result<mpsc::Receiver<Vec<f32>>, RealtimeError> {
        if let Some(worker) = self.worker.take() {
            worker.stop();
        }
        let (block_tx, block_rx) = mpsc::channel::<Vec<f32>>(32);
        let worker = spawn_device_worker(move || {
            let host = cpal::default_host();
            let device = host.default_input_device().ok_or_else(|| {
                RealtimeError::DeviceUnavailable("no default input device".to_string())
            })?;
            let name = device.name().unwrap_or_else(|_| "<unnamed>".to_string());
            let ranges = device
                .supported_input_configs()
                .map_err(|e| RealtimeError::DeviceUnavailable(e.to_string()))?;
            let (config, channels) = find_f32_config(ranges).ok_or_else(|| {
                RealtimeError::DeviceUnavailable(format!(
                    "input device '{name}' has no f32 config at {SESSION_SAMPLE_RATE_HZ} Hz"
                ))
            })?;
            info!(
                "[AudioInput] Using '{}' at {} Hz, {} ch",
                name, SESSION_SAMPLE_RATE_HZ, channels
            );
            let stream = device
                .build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        if data.is_empty() {
                            return;
                        }
                        let block = if channels == SESSION_CHANNELS {
                            data.to_vec()
                        } else {
                            data.chunks_exact(channels as usize)
                                .map(|frame| {
                                    frame.iter().sum::<f32>() / channels as f32
                                })
                                .collect()
                        };
                        match block_tx.try_send(block) {
                            Ok(()) => {}
                            Err(mpsc::error::TrySendError::Full(_)) => {
                                warn!("[AudioInput] Block channel full; dropping block.");
                            }
                            Err(mpsc::error::TrySendError::Closed(_)) => {}
                        }
                    },
                    |err| error!("[AudioInput] Stream error: {}", err),
                    None,
                )
                .map_err(|e| RealtimeError::DeviceUnavailable(e.to_string()))?;
            stream
                .play()
                .map_err(|e| RealtimeError::DeviceUnavailable(e.to_string()))?;
            Ok(stream)
        })?;
        self.worker = Some(worker);
        Ok(block_rx)
    }

    fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.stop();
            info!("[AudioInput] Capture stream released.");
        }
    }
}

/// Default-host speaker output at the session rate.
///
/// Built once with [`SpeakerSink::warmup`] — typically before any session
/// exists, to hide device-open latency — and shared across sessions via
/// `Arc`. Sessions only push and clear samples; closing a session never
/// tears the device down.
pub struct SpeakerSink {
    queue: Arc<Mutex<VecDeque<f32>>>,
    worker: Mutex<Option<DeviceWorker>>,
}

impl SpeakerSink {
    pub fn warmup() -> Result<Arc<Self>, RealtimeError> {
        let queue: Arc<Mutex<VecDeque<f32>>> = Arc::new(Mutex::new(VecDeque::new()));
        let callback_queue = queue.clone();
        let worker = spawn_device_worker(move || {
            let host = cpal::default_host();
            let device = host.default_output_device().ok_or_else(|| {
                RealtimeError::DeviceUnavailable("no default output device".to_string())
            })?;
            let name = device.name().unwrap_or_else(|_| "<unnamed>".to_string());
            let ranges = device
                .supported_output_configs()
                .map_err(|e| RealtimeError::DeviceUnavailable(e.to_string()))?;
            let (config, channels) = find_f32_config(ranges).ok_or_else(|| {
                RealtimeError::DeviceUnavailable(format!(
                    "output device '{name}' has no f32 config at {SESSION_SAMPLE_RATE_HZ} Hz"
                ))
            })?;
            info!(
                "[AudioOutput] Using '{}' at {} Hz, {} ch",
                name, SESSION_SAMPLE_RATE_HZ, channels
            );
            let stream = device
                .build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let mut queue = match callback_queue.lock() {
                            Ok(queue) => queue,
                            Err(_) => return,
                        };
                        for frame in data.chunks_mut(channels as usize) {
                            // Mono source; duplicate across device channels,
                            // silence when the queue runs dry.
                            let sample = queue.pop_front().unwrap_or(0.0);
                            for slot in frame {
                                *slot = sample;
                            }
                        }
                    },
                    |err| error!("[AudioOutput] Stream error: {}", err),
                    None,
                )
                .map_err(|e| RealtimeError::DeviceUnavailable(e.to_string()))?;
            stream
                .play()
                .map_err(|e| RealtimeError::DeviceUnavailable(e.to_string()))?;
            Ok(stream)
        })?;
        Ok(Arc::new(Self {
            queue,
            worker: Mutex::new(Some(worker)),
        }))
    }
}

impl PlaybackSink for SpeakerSink {
    // The scheduler admits buffers in arrival order; appending to the device
    // queue preserves that order and plays contiguously, so the computed
    // start time needs no further handling here.
    fn play(&self, samples: Vec<f32>, _start_at: f64) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.extend(samples);
        }
    }

    fn stop_all(&self) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.clear();
        }
    }
}

impl Drop for SpeakerSink {
    fn drop(&mut self) {
        if let Ok(mut worker) = self.worker.lock() {
            if let Some(worker) = worker.take() {
                worker.stop();
            }
        }
    }
}
