//! Gapless playback scheduling for inbound agent audio.
//!
//! Deltas arrive as base64 PCM16 blocks and are scheduled back-to-back on a
//! monotonic clock: each buffer starts at `max(now, next_play_time)` and
//! advances the clock by its own duration. A barge-in interrupt stops every
//! tracked buffer, clears the queue, and resets the clock so the next buffer
//! schedules fresh from "now".

use std::sync::Arc;
use std::time::Instant;

#[cfg(test)]
use std::sync::Mutex;

use base64::Engine as _;
use tracing::trace;

use crate::audio::SESSION_SAMPLE_RATE_HZ;
use crate::error::RealtimeError;

/// Decode a base64 PCM16 delta into normalized float samples.
pub fn decode_delta(delta: &str) -> Result<Vec<f32>, RealtimeError> {
    let bytes = base64::engine::general_purpose::STANDARD.decode(delta)?;
    if bytes.len() % 2 != 0 {
        return Err(RealtimeError::PlaybackDecode(format!(
            "odd byte count: {}",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]) as f32 / 32768.0)
        .collect())
}

/// Monotonic time source for the scheduler, in seconds.
pub trait PlaybackClock: Send {
    fn now(&self) -> f64;
}

/// Wall-clock seconds since the clock was created.
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackClock for MonotonicClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Destination for decoded audio.
///
/// `play` receives samples with the start time the scheduler computed;
/// `stop_all` discards everything queued or playing and must tolerate
/// buffers that already finished.
pub trait PlaybackSink: Send + Sync {
    fn play(&self, samples: Vec<f32>, start_at: f64);
    fn stop_all(&self);
}

/// Sink that discards audio. Default for headless sessions and tests.
pub struct NullSink;

impl PlaybackSink for NullSink {
    fn play(&self, _samples: Vec<f32>, _start_at: f64) {}
    fn stop_all(&self) {}
}

/// One scheduled buffer: where it starts and how long it runs, in seconds on
/// the scheduler's clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledBuffer {
    pub start: f64,
    pub duration: f64,
}

impl ScheduledBuffer {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// Orders inbound audio buffers for back-to-back playback.
pub struct PlaybackScheduler {
    clock: Box<dyn PlaybackClock>,
    sink: Arc<dyn PlaybackSink>,
    next_play_time: f64,
    queued: Vec<ScheduledBuffer>,
}

impl PlaybackScheduler {
    pub fn new(sink: Arc<dyn PlaybackSink>) -> Self {
        Self::with_clock(Box::new(MonotonicClock::new()), sink)
    }

    pub fn with_clock(clock: Box<dyn PlaybackClock>, sink: Arc<dyn PlaybackSink>) -> Self {
        Self {
            clock,
            sink,
            next_play_time: 0.0,
            queued: Vec::new(),
        }
    }

    /// Decode one wire delta and schedule it. Undecodable payloads leave the
    /// scheduler untouched.
    pub fn enqueue_delta(&mut self, delta: &str) -> Result<ScheduledBuffer, RealtimeError> {
        let samples = decode_delta(delta)?;
        Ok(self.schedule(samples))
    }

    /// Schedule decoded samples immediately after whatever is already queued.
    pub fn schedule(&mut self, samples: Vec<f32>) -> ScheduledBuffer {
        let now = self.clock.now();
        self.reclaim_finished(now);
        let duration = samples.len() as f64 / SESSION_SAMPLE_RATE_HZ as f64;
        let start = now.max(self.next_play_time);
        self.next_play_time = start + duration;
        let buffer = ScheduledBuffer { start, duration };
        self.queued.push(buffer);
        trace!(
            "[Playback] Scheduled {} samples at t={:.4}s (dur {:.4}s)",
            samples.len(),
            start,
            duration
        );
        self.sink.play(samples, start);
        buffer
    }

    /// Barge-in: stop everything, clear the queue, reset the clock to zero.
    pub fn interrupt(&mut self) {
        self.sink.stop_all();
        self.queued.clear();
        self.next_play_time = 0.0;
    }

    /// Number of buffers still queued or playing right now.
    pub fn active_buffers(&mut self) -> usize {
        let now = self.clock.now();
        self.reclaim_finished(now);
        self.queued.len()
    }

    pub fn next_play_time(&self) -> f64 {
        self.next_play_time
    }

    // Buffers whose end time has passed played out in full; forget them.
    fn reclaim_finished(&mut self, now: f64) {
        self.queued.retain(|buffer| buffer.end() > now);
    }
}

/// Clock driven by hand, shared so tests can advance it mid-scenario.
#[cfg(test)]
#[derive(Clone, Default)]
pub(crate) struct ManualClock(Arc<Mutex<f64>>);

#[cfg(test)]
impl ManualClock {
    pub(crate) fn set(&self, seconds: f64) {
        if let Ok(mut now) = self.0.lock() {
            *now = seconds;
        }
    }
}

#[cfg(test)]
impl PlaybackClock for ManualClock {
    fn now(&self) -> f64 {
        self.0.lock().map(|now| *now).unwrap_or(0.0)
    }
}
