//! Append-only transcript of the conversation.
//!
//! # Responsibility
//!
//! - Record every spoken line in arrival order
//! - Surface the most recent window of entries for prompting
//! - Render that window as prompt text
//!
//! Entries are never edited or reordered. When the retained log grows past
//! its capacity the oldest entries are dropped; sequence numbers keep
//! counting so arrival order stays visible.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::persona::{DisplaySnapshot, PersonaId};

/// One line in the transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    /// Arrival order, starting at 1.
    pub seq: u64,
    /// `None` denotes the human participant (or a system announcement).
    pub speaker_id: Option<PersonaId>,
    pub speaker_name: String,
    pub display: Option<DisplaySnapshot>,
    pub text: String,
}

impl TranscriptEntry {
    pub fn is_human(&self) -> bool {
        self.speaker_id.is_none()
    }

    /// Formats this entry for prompt injection.
    pub fn format(&self) -> String {
        match &self.display {
            Some(display) => format!("[{} ({})]: {}", self.speaker_name, display.mood, self.text),
            None => format!("[{}]: {}", self.speaker_name, self.text),
        }
    }
}

/// Bounded, append-only log of transcript entries.
#[derive(Debug, Clone)]
pub struct TranscriptLog {
    entries: VecDeque<TranscriptEntry>,
    window: usize,
    capacity: usize,
    next_seq: u64,
}

impl TranscriptLog {
    /// Creates a log that surfaces `window` entries and retains `capacity`.
    ///
    /// The capacity is never smaller than the window.
    pub fn new(window: usize, capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            window,
            capacity: capacity.max(window),
            next_seq: 1,
        }
    }

    /// Appends a line and returns its sequence number.
    pub fn append(
        &mut self,
        speaker_id: Option<PersonaId>,
        speaker_name: impl Into<String>,
        display: Option<DisplaySnapshot>,
        text: impl Into<String>,
    ) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push_back(TranscriptEntry {
            seq,
            speaker_id,
            speaker_name: speaker_name.into(),
            display,
            text: text.into(),
        });
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
        seq
    }

    /// The most recent `count` entries, oldest first.
    pub fn recent(&self, count: usize) -> Vec<&TranscriptEntry> {
        let start = self.entries.len().saturating_sub(count);
        self.entries.range(start..).collect()
    }

    /// The prompting window (the most recent `window` entries).
    pub fn window(&self) -> Vec<&TranscriptEntry> {
        self.recent(self.window)
    }

    /// Renders the prompting window, one entry per line.
    pub fn render(&self) -> String {
        self.window()
            .iter()
            .map(|entry| entry.format())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn last(&self) -> Option<&TranscriptEntry> {
        self.entries.back()
    }

    pub fn all(&self) -> impl Iterator<Item = &TranscriptEntry> {
        self.entries.iter()
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of entries ever appended.
    pub fn total_appended(&self) -> u64 {
        self.next_seq - 1
    }
}

impl Default for TranscriptLog {
    fn default() -> Self {
        Self::new(20, 500)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona::Mood;

    #[test]
    fn test_append_preserves_order() {
        let mut log = TranscriptLog::default();
        log.append(None, "Phoenix", None, "Hold it!");
        log.append(Some(10), "Judge", None, "Go on.");
        log.append(Some(4), "Larry", None, "Uh...");

        let texts: Vec<&str> = log.all().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["Hold it!", "Go on.", "Uh..."]);
        assert_eq!(log.last().unwrap().seq, 3);
        assert!(log.all().next().unwrap().is_human());
    }

    #[test]
    fn test_window_surfaces_only_recent_entries() {
        let mut log = TranscriptLog::new(20, 500);
        for i in 0..25 {
            log.append(Some(1), "Judge", None, format!("line {i}"));
        }

        let window = log.window();
        assert_eq!(window.len(), 20);
        assert_eq!(window[0].text, "line 5");
        assert_eq!(window[19].text, "line 24");
        assert_eq!(log.len(), 25, "full log is retained");
    }

    #[test]
    fn test_capacity_drops_oldest_but_keeps_sequence() {
        let mut log = TranscriptLog::new(2, 3);
        for i in 0..5 {
            log.append(None, "Phoenix", None, format!("line {i}"));
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.all().next().unwrap().seq, 3);
        assert_eq!(log.total_appended(), 5);
    }

    #[test]
    fn test_render_formats_entries() {
        let mut log = TranscriptLog::default();
        log.append(None, "Phoenix", None, "Objection!");
        log.append(
            Some(10),
            "Judge",
            Some(DisplaySnapshot {
                pose_id: Some(40),
                mood: Mood::Surprised,
            }),
            "Sustained.",
        );
        assert_eq!(
            log.render(),
            "[Phoenix]: Objection!\n[Judge (surprised)]: Sustained."
        );
    }
}
