//! Turn-taking state machine.
//!
//! The engine is pure: it consumes server events, volume samples, and
//! deadline expirations — each stamped with an [`Instant`] — and returns the
//! actions the connection task should perform. It owns the two fallback
//! deadlines (remote VAD produced no response; local audio went silent) but
//! never sleeps itself, so every path is testable with synthetic clocks.

use std::time::{Duration, Instant};

use crate::types::ServerEvent;

/// Commit manually if the server VAD signalled end-of-speech but no response
/// was created within this window.
pub const RESPONSE_WAIT_FALLBACK: Duration = Duration::from_millis(1500);

/// Commit manually after this much uninterrupted near-silence while
/// listening. Independent of the remote-signal fallback; either net can
/// catch a dropped turn.
pub const LOCAL_SILENCE_FALLBACK: Duration = Duration::from_millis(3000);

/// Volume at or below this level counts as silence.
pub const SILENCE_VOLUME_FLOOR: f32 = 0.01;

/// Where the session currently stands in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    /// Socket not open yet.
    Connecting,
    /// User's turn; microphone audio is streaming up.
    Listening,
    /// User finished; the agent is (or is about to be) responding.
    Speaking,
    /// Terminal: the transport failed or closed abnormally.
    Error,
}

/// Side effect the connection task must perform for the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnAction {
    /// Send `input_audio_buffer.commit` followed by `response.create`.
    Commit,
    /// Send `response.cancel`.
    CancelResponse,
    /// Stop and clear all scheduled agent audio.
    InterruptPlayback,
}

#[derive(Debug)]
pub struct TurnEngine {
    state: TurnState,
    response_started: bool,
    response_wait_deadline: Option<Instant>,
    local_silence_deadline: Option<Instant>,
}

impl TurnEngine {
    pub fn new() -> Self {
        Self {
            state: TurnState::Connecting,
            response_started: false,
            response_wait_deadline: None,
            local_silence_deadline: None,
        }
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    /// The socket is open; start listening.
    pub fn mark_connected(&mut self) {
        if self.state == TurnState::Connecting {
            self.state = TurnState::Listening;
        }
    }

    /// Terminal failure (connect error, send error, abnormal close).
    pub fn fail(&mut self) {
        self.state = TurnState::Error;
        self.response_wait_deadline = None;
        self.local_silence_deadline = None;
    }

    /// Socket closed; anything but a normal closure is an error.
    pub fn on_close(&mut self, normal: bool) {
        if !normal {
            self.fail();
        }
    }

    /// React to one inbound event.
    pub fn on_event(&mut self, event: &ServerEvent, now: Instant) -> Vec<TurnAction> {
        match event {
            ServerEvent::SpeechStarted => {
                // New user turn: drop any pending commit intent and silence
                // the agent. The user interrupting always wins.
                self.state = TurnState::Listening;
                self.response_started = false;
                self.response_wait_deadline = None;
                self.local_silence_deadline = None;
                vec![TurnAction::InterruptPlayback, TurnAction::CancelResponse]
            }
            ServerEvent::SpeechStopped => {
                self.state = TurnState::Speaking;
                self.response_wait_deadline = Some(now + RESPONSE_WAIT_FALLBACK);
                Vec::new()
            }
            ServerEvent::ResponseCreated => {
                self.response_started = true;
                self.state = TurnState::Speaking;
                self.response_wait_deadline = None;
                self.local_silence_deadline = None;
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    /// Feed one capture-block volume reading. Sound cancels the silence
    /// deadline; sustained near-silence while listening arms it.
    pub fn on_volume(&mut self, volume: f32, now: Instant) {
        if volume > SILENCE_VOLUME_FLOOR {
            self.local_silence_deadline = None;
        } else if self.state == TurnState::Listening && self.local_silence_deadline.is_none() {
            self.local_silence_deadline = Some(now + LOCAL_SILENCE_FALLBACK);
        }
    }

    /// Explicit end-of-turn trigger. A no-op once a response has started;
    /// either way the turn is decided, so both fallback deadlines clear.
    pub fn commit(&mut self) -> Vec<TurnAction> {
        self.response_wait_deadline = None;
        self.local_silence_deadline = None;
        if self.response_started {
            Vec::new()
        } else {
            vec![TurnAction::Commit]
        }
    }

    /// Earliest pending fallback deadline, for the connection task's sleep.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.response_wait_deadline, self.local_silence_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        }
    }

    /// Fire whichever fallback deadline has passed. A fire (even a
    /// suppressed one) clears both deadlines: at most one commit intent is
    /// ever active.
    pub fn on_deadline(&mut self, now: Instant) -> Vec<TurnAction> {
        let due = self
            .response_wait_deadline
            .is_some_and(|deadline| deadline <= now)
            || self
                .local_silence_deadline
                .is_some_and(|deadline| deadline <= now);
        if !due {
            return Vec::new();
        }
        self.commit()
    }
}

impl Default for TurnEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listening_engine() -> TurnEngine {
        let mut engine = TurnEngine::new();
        engine.mark_connected();
        engine
    }

    #[test]
    fn test_connect_transitions_to_listening() {
        let mut engine = TurnEngine::new();
        assert_eq!(engine.state(), TurnState::Connecting);
        engine.mark_connected();
        assert_eq!(engine.state(), TurnState::Listening);
    }

    #[test]
    fn test_speech_started_interrupts_and_cancels() {
        let mut engine = listening_engine();
        let now = Instant::now();
        engine.on_event(&ServerEvent::SpeechStopped, now);
        engine.on_event(&ServerEvent::ResponseCreated, now);
        assert_eq!(engine.state(), TurnState::Speaking);

        let actions = engine.on_event(&ServerEvent::SpeechStarted, now);
        assert_eq!(
            actions,
            vec![TurnAction::InterruptPlayback, TurnAction::CancelResponse]
        );
        assert_eq!(engine.state(), TurnState::Listening);
        assert_eq!(engine.next_deadline(), None);
        // Barge-in reset the response flag: a later commit goes through.
        assert_eq!(engine.commit(), vec![TurnAction::Commit]);
    }

    #[test]
    fn test_speech_stopped_arms_response_fallback() {
        let mut engine = listening_engine();
        let now = Instant::now();
        assert!(engine.on_event(&ServerEvent::SpeechStopped, now).is_empty());
        assert_eq!(engine.state(), TurnState::Speaking);
        assert_eq!(engine.next_deadline(), Some(now + RESPONSE_WAIT_FALLBACK));
    }

    #[test]
    fn test_fallback_fires_exactly_once_without_response() {
        let mut engine = listening_engine();
        let now = Instant::now();
        engine.on_event(&ServerEvent::SpeechStopped, now);

        // Not due yet.
        assert!(engine.on_deadline(now + Duration::from_millis(1499)).is_empty());
        // Due: exactly one commit.
        assert_eq!(
            engine.on_deadline(now + RESPONSE_WAIT_FALLBACK),
            vec![TurnAction::Commit]
        );
        // Single-shot.
        assert_eq!(engine.next_deadline(), None);
        assert!(engine.on_deadline(now + Duration::from_secs(10)).is_empty());
    }

    #[test]
    fn test_response_created_suppresses_fallback() {
        let mut engine = listening_engine();
        let now = Instant::now();
        engine.on_event(&ServerEvent::SpeechStopped, now);
        engine.on_event(
            &ServerEvent::ResponseCreated,
            now + Duration::from_millis(1000),
        );
        assert_eq!(engine.next_deadline(), None);
        assert!(engine.on_deadline(now + Duration::from_secs(10)).is_empty());
    }

    #[test]
    fn test_commit_is_idempotent_once_response_started() {
        let mut engine = listening_engine();
        let now = Instant::now();
        engine.on_event(&ServerEvent::ResponseCreated, now);
        assert!(engine.commit().is_empty());
        assert!(engine.commit().is_empty());
    }

    #[test]
    fn test_silence_arms_and_sound_cancels() {
        let mut engine = listening_engine();
        let now = Instant::now();

        engine.on_volume(0.005, now);
        assert_eq!(engine.next_deadline(), Some(now + LOCAL_SILENCE_FALLBACK));

        // Continued silence does not push the deadline out.
        engine.on_volume(0.0, now + Duration::from_millis(500));
        assert_eq!(engine.next_deadline(), Some(now + LOCAL_SILENCE_FALLBACK));

        // Sound cancels immediately; silence re-arms from the new instant.
        engine.on_volume(0.2, now + Duration::from_millis(600));
        assert_eq!(engine.next_deadline(), None);
        let later = now + Duration::from_millis(700);
        engine.on_volume(0.0, later);
        assert_eq!(engine.next_deadline(), Some(later + LOCAL_SILENCE_FALLBACK));
    }

    #[test]
    fn test_silence_fallback_commits_once() {
        let mut engine = listening_engine();
        let now = Instant::now();
        engine.on_volume(0.0, now);
        assert_eq!(
            engine.on_deadline(now + LOCAL_SILENCE_FALLBACK),
            vec![TurnAction::Commit]
        );
        assert!(engine.on_deadline(now + Duration::from_secs(10)).is_empty());
    }

    #[test]
    fn test_silence_is_ignored_outside_listening() {
        let mut engine = listening_engine();
        let now = Instant::now();
        engine.on_event(&ServerEvent::SpeechStopped, now);
        assert_eq!(engine.state(), TurnState::Speaking);

        engine.on_event(&ServerEvent::ResponseCreated, now);
        engine.on_volume(0.0, now);
        assert_eq!(engine.next_deadline(), None);
    }

    #[test]
    fn test_overlapping_fallbacks_commit_once() {
        let mut engine = listening_engine();
        let now = Instant::now();
        // Silence net armed while listening, then the remote net on top.
        engine.on_volume(0.0, now);
        engine.on_event(&ServerEvent::SpeechStopped, now + Duration::from_millis(100));
        // Remote deadline is the earlier of the two.
        assert_eq!(
            engine.next_deadline(),
            Some(now + Duration::from_millis(1600))
        );

        let actions = engine.on_deadline(now + Duration::from_millis(1600));
        assert_eq!(actions, vec![TurnAction::Commit]);
        // Firing cleared the silence net too.
        assert_eq!(engine.next_deadline(), None);
    }

    #[test]
    fn test_volume_at_floor_counts_as_silence() {
        let mut engine = listening_engine();
        let now = Instant::now();
        engine.on_volume(SILENCE_VOLUME_FLOOR, now);
        assert!(engine.next_deadline().is_some());
    }

    #[test]
    fn test_abnormal_close_is_terminal() {
        let mut engine = listening_engine();
        engine.on_close(false);
        assert_eq!(engine.state(), TurnState::Error);

        let mut clean = listening_engine();
        clean.on_close(true);
        assert_eq!(clean.state(), TurnState::Listening);
    }
}
