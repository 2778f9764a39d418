//! Global event-to-record index.
//!
//! Built from the per-record event counts, `FileEventIndex` is a prefix-sum
//! structure answering "which record holds event N, and at what position
//! inside it" in O(log records) by binary search. It also carries the
//! sequential-read cursor shared by `get_next_event` / `get_prev_event` and
//! random access.

use std::fmt;

#[derive(Debug, Default)]
pub struct FileEventIndex {
    /// `boundaries[i]` = number of events in records `0..i`.
    /// Always starts with 0; length = record count + 1.
    boundaries: Vec<u32>,
    current_event: usize,
    current_record: usize,
    current_record_event: usize,
}

impl FileEventIndex {
    pub fn new() -> Self {
        Self {
            boundaries: vec![0],
            current_event: 0,
            current_record: 0,
            current_record_event: 0,
        }
    }

    pub fn clear(&mut self) {
        self.boundaries.clear();
        self.boundaries.push(0);
        self.current_event = 0;
        self.current_record = 0;
        self.current_record_event = 0;
    }

    /// Append the event count of the next record.
    pub fn add_event_count(&mut self, count: u32) {
        let last = *self.boundaries.last().unwrap();
        self.boundaries.push(last + count);
    }

    /// Total number of events across all records.
    pub fn max_events(&self) -> usize {
        *self.boundaries.last().unwrap() as usize
    }

    pub fn record_count(&self) -> usize {
        self.boundaries.len() - 1
    }

    /// Index of the record holding the current event.
    pub fn record_number(&self) -> usize {
        self.current_record
    }

    /// Position of the current event within its record.
    pub fn record_event_number(&self) -> usize {
        self.current_record_event
    }

    pub fn event_number(&self) -> usize {
        self.current_event
    }

    /// Position the cursor on event `event`. Returns `true` when the move
    /// lands in a different record than before (the caller must load it).
    pub fn set_event(&mut self, event: usize) -> bool {
        debug_assert!(event < self.max_events());
        // partition_point gives the first boundary > event; the record is
        // one before it.
        let record = self.boundaries.partition_point(|&b| b as usize <= event) - 1;
        let changed = record != self.current_record;
        self.current_event = event;
        self.current_record = record;
        self.current_record_event = event - self.boundaries[record] as usize;
        changed
    }

    pub fn can_advance(&self) -> bool {
        self.current_event + 1 < self.max_events()
    }

    pub fn can_retreat(&self) -> bool {
        self.current_event > 0
    }

    /// Step forward one event. Returns `true` when the record changed.
    pub fn advance(&mut self) -> bool {
        debug_assert!(self.can_advance());
        let next = self.current_event + 1;
        self.set_event(next)
    }

    /// Step back one event. Returns `true` when the record changed.
    pub fn retreat(&mut self) -> bool {
        debug_assert!(self.can_retreat());
        let prev = self.current_event - 1;
        self.set_event(prev)
    }
}

impl fmt::Display for FileEventIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "event {} of {} (record {}, slot {})",
            self.current_event,
            self.max_events(),
            self.current_record,
            self.current_record_event
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_with(counts: &[u32]) -> FileEventIndex {
        let mut idx = FileEventIndex::new();
        for &c in counts {
            idx.add_event_count(c);
        }
        idx
    }

    #[test]
    fn test_prefix_sums() {
        let idx = index_with(&[3, 5, 2]);
        assert_eq!(idx.max_events(), 10);
        assert_eq!(idx.record_count(), 3);
    }

    #[test]
    fn test_set_event_finds_record() {
        let mut idx = index_with(&[3, 5, 2]);

        assert!(!idx.set_event(0), "already on record 0");
        assert_eq!(idx.record_number(), 0);
        assert_eq!(idx.record_event_number(), 0);

        assert!(!idx.set_event(2));
        assert_eq!((idx.record_number(), idx.record_event_number()), (0, 2));

        assert!(idx.set_event(3), "crossed into record 1");
        assert_eq!((idx.record_number(), idx.record_event_number()), (1, 0));

        assert!(idx.set_event(9));
        assert_eq!((idx.record_number(), idx.record_event_number()), (2, 1));

        assert!(idx.set_event(7), "back into record 1");
        assert_eq!((idx.record_number(), idx.record_event_number()), (1, 4));
    }

    #[test]
    fn test_advance_retreat() {
        let mut idx = index_with(&[2, 2]);
        assert!(idx.can_advance());
        assert!(!idx.can_retreat());

        assert!(!idx.advance(), "0 -> 1 stays in record 0");
        assert!(idx.advance(), "1 -> 2 crosses records");
        assert_eq!(idx.record_number(), 1);
        assert!(idx.advance());
        assert!(!idx.can_advance());

        assert!(idx.retreat(), "3 -> 2 stays in record 1");
        assert_eq!(idx.event_number(), 2);
        assert!(idx.retreat(), "2 -> 1 crosses back");
        assert_eq!(idx.record_number(), 0);
    }

    #[test]
    fn test_empty_records_skipped() {
        let mut idx = index_with(&[2, 0, 3]);
        assert_eq!(idx.max_events(), 5);
        assert!(idx.set_event(2));
        // event 2 is the first event of record 2; record 1 holds nothing
        assert_eq!((idx.record_number(), idx.record_event_number()), (2, 0));
    }

    #[test]
    fn test_clear() {
        let mut idx = index_with(&[4]);
        idx.set_event(3);
        idx.clear();
        assert_eq!(idx.max_events(), 0);
        assert_eq!(idx.record_count(), 0);
        assert_eq!(idx.event_number(), 0);
    }
}
