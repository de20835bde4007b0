//! The browsable batch: ordered records plus the current position.

use crate::record::WordRecord;

/// Ordered records and the index of the one on display.
///
/// Invariant: `current < records.len()` whenever `records` is non-empty.
/// Navigation saturates at both ends instead of failing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchState {
    records: Vec<WordRecord>,
    current: usize,
}

impl BatchState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap in a whole new batch and select its first record.
    pub fn replace(&mut self, records: Vec<WordRecord>) {
        self.records = records;
        self.current = 0;
    }

    pub fn current(&self) -> Option<&WordRecord> {
        self.records.get(self.current)
    }

    /// Index of the displayed record, `None` when the batch is empty.
    pub fn current_index(&self) -> Option<usize> {
        if self.records.is_empty() {
            None
        } else {
            Some(self.current)
        }
    }

    pub fn next(&mut self) {
        if !self.records.is_empty() {
            self.current = (self.current + 1).min(self.records.len() - 1);
        }
    }

    pub fn previous(&mut self) {
        self.current = self.current.saturating_sub(1);
    }

    pub fn records(&self) -> &[WordRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Navigation controls only make sense with two or more records.
    pub fn has_multiple(&self) -> bool {
        self.records.len() > 1
    }

    pub fn at_first(&self) -> bool {
        self.current == 0
    }

    pub fn at_last(&self) -> bool {
        self.records.is_empty() || self.current + 1 >= self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(n: usize) -> BatchState {
        let mut b = BatchState::new();
        b.replace(
            (0..n)
                .map(|i| WordRecord {
                    english_term: format!("w{i}"),
                    ..Default::default()
                })
                .collect(),
        );
        b
    }

    #[test]
    fn empty_batch_has_no_selection() {
        let mut b = BatchState::new();
        assert!(b.current().is_none());
        assert_eq!(b.current_index(), None);
        b.next();
        b.previous();
        assert!(b.current().is_none());
        b.replace(Vec::new());
        assert_eq!(b.current_index(), None);
    }

    #[test]
    fn replace_resets_to_first() {
        let mut b = batch(3);
        b.next();
        b.next();
        b.replace(batch(2).records().to_vec());
        assert_eq!(b.current_index(), Some(0));
        assert_eq!(b.current().unwrap().english_term, "w0");
    }

    #[test]
    fn next_saturates_at_last() {
        for n in 1..=5 {
            let mut b = batch(n);
            for _ in 0..n {
                b.next();
            }
            assert_eq!(b.current_index(), Some(n - 1));
            b.next();
            assert_eq!(b.current_index(), Some(n - 1));
            assert!(b.at_last());
        }
    }

    #[test]
    fn previous_saturates_at_first() {
        let mut b = batch(3);
        b.previous();
        assert_eq!(b.current_index(), Some(0));
        b.next();
        b.previous();
        b.previous();
        assert_eq!(b.current_index(), Some(0));
        assert!(b.at_first());
    }

    #[test]
    fn has_multiple() {
        assert!(!batch(0).has_multiple());
        assert!(!batch(1).has_multiple());
        assert!(batch(2).has_multiple());
    }
}
