use nostr_sdk::Timestamp;
use serde::{Deserialize, Serialize};

/// Inclusive `[since, until]` interval in unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    pub since: u64,
    pub until: u64,
}

impl TimeRange {
    pub fn new(since: u64, until: u64) -> Self {
        Self { since, until }
    }

    /// Window with open ends filled in: `since` defaults to the epoch,
    /// `until` to now.
    pub fn window(since: Option<u64>, until: Option<u64>) -> Self {
        Self {
            since: since.unwrap_or(0),
            until: until.unwrap_or_else(|| Timestamp::now().as_u64()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.since > self.until
    }

    pub fn since_ts(&self) -> Timestamp {
        Timestamp::from(self.since)
    }

    pub fn until_ts(&self) -> Timestamp {
        Timestamp::from(self.until)
    }
}

/// Merge overlapping or adjacent ranges. Output is sorted.
pub fn merge_ranges(mut ranges: Vec<TimeRange>) -> Vec<TimeRange> {
    ranges.retain(|r| !r.is_empty());
    ranges.sort();

    let mut merged: Vec<TimeRange> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match merged.last_mut() {
            Some(last) if range.since <= last.until.saturating_add(1) => {
                last.until = last.until.max(range.until);
            }
            _ => merged.push(range),
        }
    }
    merged
}

/// Sub-ranges of `window` not covered by `covered` (sorted, merged).
pub fn uncovered(covered: &[TimeRange], window: TimeRange) -> Vec<TimeRange> {
    let mut gaps = Vec::new();
    if window.is_empty() {
        return gaps;
    }

    let mut cursor = window.since;
    for range in covered {
        if range.until < cursor {
            continue;
        }
        if range.since > window.until {
            break;
        }
        if range.since > cursor {
            gaps.push(TimeRange::new(cursor, range.since - 1));
        }
        if range.until >= window.until {
            return gaps;
        }
        cursor = range.until + 1;
    }

    gaps.push(TimeRange::new(cursor, window.until));
    gaps
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_defaults() {
        let window = TimeRange::window(None, Some(1000));
        assert_eq!(window, TimeRange::new(0, 1000));

        let open = TimeRange::window(Some(5), None);
        assert!(open.until >= Timestamp::now().as_u64() - 5);
    }

    #[test]
    fn test_merge_ranges_joins_overlapping_and_adjacent() {
        let merged = merge_ranges(vec![
            TimeRange::new(20, 30),
            TimeRange::new(0, 10),
            TimeRange::new(11, 15),
            TimeRange::new(25, 40),
            TimeRange::new(50, 40),
        ]);
        assert_eq!(merged, vec![TimeRange::new(0, 15), TimeRange::new(20, 40)]);
    }

    #[test]
    fn test_uncovered_with_no_coverage_is_whole_window() {
        assert_eq!(
            uncovered(&[], TimeRange::new(0, 1000)),
            vec![TimeRange::new(0, 1000)]
        );
    }

    #[test]
    fn test_uncovered_finds_holes_and_tail() {
        let covered = vec![TimeRange::new(100, 200), TimeRange::new(300, 400)];
        assert_eq!(
            uncovered(&covered, TimeRange::new(0, 1000)),
            vec![
                TimeRange::new(0, 99),
                TimeRange::new(201, 299),
                TimeRange::new(401, 1000),
            ]
        );
    }

    #[test]
    fn test_uncovered_fully_covered_window_is_empty() {
        let covered = vec![TimeRange::new(0, 5000)];
        assert!(uncovered(&covered, TimeRange::new(10, 1000)).is_empty());
    }

    #[test]
    fn test_uncovered_handles_range_ending_at_max() {
        let covered = vec![TimeRange::new(50, u64::MAX)];
        assert_eq!(
            uncovered(&covered, TimeRange::new(0, u64::MAX)),
            vec![TimeRange::new(0, 49)]
        );
    }
}
