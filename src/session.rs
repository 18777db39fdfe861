use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEventKind {
    OpenedFile,
    EditedFile,
    Searched,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub seq: u64,
    pub kind: SessionEventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

/// Persisted form of the tracker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionState {
    pub seq: u64,
    pub events: Vec<SessionEvent>,
}

/// Bounded FIFO of recent workspace events feeding the search boost.
///
/// Append-only with monotonic sequence numbers, so a cancelled query can
/// never corrupt it. There is no process-wide instance; the engine owns one
/// and passes it into the search entry point explicitly.
#[derive(Debug)]
pub struct SessionTracker {
    capacity: usize,
    next_seq: u64,
    events: VecDeque<SessionEvent>,
    last_flush: Option<Instant>,
    dirty: bool,
}

impl SessionTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            next_seq: 0,
            events: VecDeque::new(),
            last_flush: None,
            dirty: false,
        }
    }

    pub fn from_state(capacity: usize, state: SessionState) -> Self {
        let mut tracker = Self::new(capacity);
        tracker.next_seq = state.seq;
        for event in state.events.into_iter().rev().take(tracker.capacity) {
            tracker.events.push_front(event);
        }
        tracker
    }

    pub fn opened_file(&mut self, path: &str) {
        self.push(SessionEventKind::OpenedFile, Some(path), None);
    }

    pub fn edited_file(&mut self, path: &str) {
        self.push(SessionEventKind::EditedFile, Some(path), None);
    }

    pub fn searched(&mut self, query: &str) {
        self.push(SessionEventKind::Searched, None, Some(query));
    }

    fn push(&mut self, kind: SessionEventKind, path: Option<&str>, query: Option<&str>) {
        let event = SessionEvent {
            seq: self.next_seq,
            kind,
            path: path.map(|p| p.to_string()),
            query: query.map(|q| q.to_string()),
        };
        self.next_seq += 1;
        self.events.push_back(event);
        while self.events.len() > self.capacity {
            self.events.pop_front();
        }
        self.dirty = true;
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Per-path recency weight in (0, 1]: the newest event weighs 1, the
    /// oldest in the buffer approaches 1/capacity. A path keeps its best
    /// weight when it appears more than once.
    pub fn boost_weights(&self) -> HashMap<String, f64> {
        let mut weights = HashMap::new();
        let len = self.events.len();
        for (position, event) in self.events.iter().enumerate() {
            let Some(path) = &event.path else {
                continue;
            };
            let weight = (position + 1) as f64 / len as f64;
            let entry = weights.entry(path.clone()).or_insert(0.0);
            if weight > *entry {
                *entry = weight;
            }
        }
        weights
    }

    pub fn state(&self) -> SessionState {
        SessionState {
            seq: self.next_seq,
            events: self.events.iter().cloned().collect(),
        }
    }

    /// Rate-limits flushing to once per second; `force` is for clean
    /// shutdown.
    pub fn should_flush(&mut self, force: bool) -> bool {
        if !self.dirty {
            return false;
        }
        let due = force
            || self
                .last_flush
                .map(|at| at.elapsed().as_secs() >= 1)
                .unwrap_or(true);
        if due {
            self.last_flush = Some(Instant::now());
            self.dirty = false;
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_is_bounded_and_sequences_are_monotonic() {
        let mut tracker = SessionTracker::new(4);
        for i in 0..10 {
            tracker.opened_file(&format!("file{i}.py"));
        }
        assert_eq!(tracker.len(), 4);
        let state = tracker.state();
        assert_eq!(state.seq, 10);
        let seqs: Vec<u64> = state.events.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![6, 7, 8, 9]);
    }

    #[test]
    fn boost_weights_decay_with_age() {
        let mut tracker = SessionTracker::new(8);
        tracker.opened_file("old.py");
        tracker.opened_file("mid.py");
        tracker.opened_file("new.py");
        let weights = tracker.boost_weights();
        assert!(weights["new.py"] > weights["mid.py"]);
        assert!(weights["mid.py"] > weights["old.py"]);
        assert!((weights["new.py"] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn searches_do_not_carry_boost_paths() {
        let mut tracker = SessionTracker::new(8);
        tracker.searched("auth");
        assert!(tracker.boost_weights().is_empty());
    }

    #[test]
    fn flush_rate_limit_and_force() {
        let mut tracker = SessionTracker::new(8);
        assert!(!tracker.should_flush(false));
        tracker.opened_file("a.py");
        assert!(tracker.should_flush(false));
        tracker.opened_file("b.py");
        assert!(!tracker.should_flush(false));
        assert!(tracker.should_flush(true));
        assert!(!tracker.should_flush(true));
    }

    #[test]
    fn state_round_trips_through_from_state() {
        let mut tracker = SessionTracker::new(8);
        tracker.opened_file("a.py");
        tracker.searched("wallet");
        let restored = SessionTracker::from_state(8, tracker.state());
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.state().seq, 2);
    }
}
