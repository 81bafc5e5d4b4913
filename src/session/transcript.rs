use chrono::{DateTime, Utc};

/// Accumulates one AI turn's streamed text deltas.
///
/// Clients receive every delta verbatim through the broadcast path; this is
/// internal bookkeeping only, cleared when the turn completes or errors.
#[derive(Debug, Default)]
pub struct TranscriptAccumulator {
    text: String,
    turn_started_at: Option<DateTime<Utc>>,
}

impl TranscriptAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a streamed delta to the current turn.
    pub fn push_delta(&mut self, delta: &str) {
        if self.turn_started_at.is_none() {
            self.turn_started_at = Some(Utc::now());
        }
        self.text.push_str(delta);
    }

    /// Accumulated text of the current turn so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// When the current turn's first delta arrived, if any.
    pub fn turn_started_at(&self) -> Option<DateTime<Utc>> {
        self.turn_started_at
    }

    /// Drop the turn's state; called at turn completion or on error.
    pub fn clear(&mut self) {
        self.text.clear();
        self.turn_started_at = None;
    }
}
