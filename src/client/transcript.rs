use crate::types::ServerEvent;

/// Assembles the user and agent transcripts of the current turn from the
/// transcription event stream.
///
/// User deltas accumulate until a completed transcription replaces them;
/// agent transcript deltas only accumulate. A new user turn
/// (`speech_started`) resets both sides.
#[derive(Debug, Default, Clone)]
pub struct TranscriptTracker {
    user: String,
    agent: String,
}

impl TranscriptTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: &ServerEvent) {
        match event {
            ServerEvent::SpeechStarted => {
                self.user.clear();
                self.agent.clear();
            }
            ServerEvent::InputTranscriptionDelta { delta } => self.user.push_str(delta),
            ServerEvent::InputTranscriptionCompleted { transcript, text } => {
                self.user = transcript
                    .clone()
                    .or_else(|| text.clone())
                    .unwrap_or_default();
            }
            ServerEvent::OutputTranscriptDelta { delta } => self.agent.push_str(delta),
            _ => {}
        }
    }

    /// What the user said this turn, as transcribed so far.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// What the agent has said this turn, as transcribed so far.
    pub fn agent(&self) -> &str {
        &self.agent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input_delta(delta: &str) -> ServerEvent {
        ServerEvent::InputTranscriptionDelta {
            delta: delta.to_string(),
        }
    }

    #[test]
    fn test_user_deltas_accumulate() {
        let mut tracker = TranscriptTracker::new();
        tracker.apply(&input_delta("turn on "));
        tracker.apply(&input_delta("the lights"));
        assert_eq!(tracker.user(), "turn on the lights");
    }

    #[test]
    fn test_completed_transcription_replaces_deltas() {
        let mut tracker = TranscriptTracker::new();
        tracker.apply(&input_delta("turn on teh"));
        tracker.apply(&ServerEvent::InputTranscriptionCompleted {
            transcript: Some("Turn on the lights.".to_string()),
            text: None,
        });
        assert_eq!(tracker.user(), "Turn on the lights.");
    }

    #[test]
    fn test_completed_falls_back_to_text_field() {
        let mut tracker = TranscriptTracker::new();
        tracker.apply(&ServerEvent::InputTranscriptionCompleted {
            transcript: None,
            text: Some("hello".to_string()),
        });
        assert_eq!(tracker.user(), "hello");

        tracker.apply(&ServerEvent::InputTranscriptionCompleted {
            transcript: None,
            text: None,
        });
        assert_eq!(tracker.user(), "");
    }

    #[test]
    fn test_agent_transcript_accumulates() {
        let mut tracker = TranscriptTracker::new();
        tracker.apply(&ServerEvent::OutputTranscriptDelta {
            delta: "Sure, ".to_string(),
        });
        tracker.apply(&ServerEvent::OutputTranscriptDelta {
            delta: "done.".to_string(),
        });
        assert_eq!(tracker.agent(), "Sure, done.");
    }

    #[test]
    fn test_new_turn_resets_both_sides() {
        let mut tracker = TranscriptTracker::new();
        tracker.apply(&input_delta("first turn"));
        tracker.apply(&ServerEvent::OutputTranscriptDelta {
            delta: "reply".to_string(),
        });
        tracker.apply(&ServerEvent::SpeechStarted);
        assert_eq!(tracker.user(), "");
        assert_eq!(tracker.agent(), "");
    }

    #[test]
    fn test_unrelated_events_are_ignored() {
        let mut tracker = TranscriptTracker::new();
        tracker.apply(&input_delta("hi"));
        tracker.apply(&ServerEvent::ResponseCreated);
        tracker.apply(&ServerEvent::OutputAudioDelta {
            delta: "AAAA".to_string(),
        });
        assert_eq!(tracker.user(), "hi");
    }
}
