/// Sequence number gap detection
///
/// One detector per session. It keeps the highest sequence number seen and
/// the inclusive ranges skipped over on the way. Anything at or below the
/// high-water mark is a duplicate (retransmission, overlapping batch) and
/// leaves the mark where it is.

use std::cmp::Ordering;

#[derive(Debug, Clone, Default)]
pub struct GapDetector {
    high: Option<u64>,
    gaps: Vec<(u64, u64)>,
    total_missing: u64,
    duplicates: u64,
}

impl GapDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one sequence number; returns the range it skipped over, if any.
    pub fn process(&mut self, seq: u64) -> Option<(u64, u64)> {
        let Some(high) = self.high else {
            self.high = Some(seq);
            return None;
        };
        let next = high.saturating_add(1);
        match seq.cmp(&next) {
            Ordering::Equal => {
                self.high = Some(seq);
                None
            }
            Ordering::Less => {
                self.duplicates += 1;
                None
            }
            Ordering::Greater => {
                let skipped = (next, seq - 1);
                self.high = Some(seq);
                self.gaps.push(skipped);
                self.total_missing += skipped.1 - skipped.0 + 1;
                Some(skipped)
            }
        }
    }

    /// Next sequence number announced out of band (login, restart).
    pub fn expect(&mut self, next: u64) {
        self.high = next.checked_sub(1);
    }

    /// Skipped ranges, inclusive, in detection order
    pub fn gaps(&self) -> &[(u64, u64)] {
        &self.gaps
    }

    pub fn total_missing(&self) -> u64 {
        self.total_missing
    }

    pub fn duplicates(&self) -> u64 {
        self.duplicates
    }

    pub fn last_sequence(&self) -> Option<u64> {
        self.high
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contiguous_stream() {
        let mut detector = GapDetector::new();
        assert!((0..100).all(|i| detector.process(i).is_none()));
        assert_eq!(detector.total_missing(), 0);
        assert!(detector.gaps().is_empty());
    }

    #[test]
    fn test_skipped_ranges() {
        let mut detector = GapDetector::new();
        detector.process(1);
        assert_eq!(detector.process(5), Some((2, 4)));
        assert_eq!(detector.process(10), Some((6, 9)));
        assert_eq!(detector.process(11), None);
        assert_eq!(detector.total_missing(), 7);
        assert_eq!(detector.gaps(), &[(2, 4), (6, 9)]);
    }

    #[test]
    fn test_duplicates_do_not_rewind() {
        let mut detector = GapDetector::new();
        detector.process(10);
        detector.process(11);
        assert_eq!(detector.process(10), None);
        assert_eq!(detector.process(12), None);
        assert_eq!(detector.duplicates(), 1);
        assert_eq!(detector.last_sequence(), Some(12));
    }

    #[test]
    fn test_expect_after_login() {
        let mut detector = GapDetector::new();
        detector.expect(100);
        assert_eq!(detector.process(102), Some((100, 101)));

        let mut fresh = GapDetector::new();
        fresh.expect(0);
        assert_eq!(fresh.process(0), None);
    }
}
