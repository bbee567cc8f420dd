use log::warn;

use crate::core::TimeUnit;

/// Passed to [`Clock::set_time`] to return to wall-clock timestamps.
pub const AUTO_TIME: i64 = -1;

/// The three nested start times of the output hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Anchors {
    pub source_start: Option<i64>,
    pub segment_start: Option<i64>,
    pub block_start: Option<i64>,
}

/// Hands out sample timestamps and sets the anchors lazily.
///
/// Anchors are first-write-wins: once set they only change through
/// [`Clock::take_block_start`] and [`Clock::end_segment`].
#[derive(Debug)]
pub struct Clock {
    unit: TimeUnit,
    segmenting: bool,
    manual: Option<i64>,
    batch: Option<i64>,
    anchors: Anchors,
}

impl Clock {
    pub fn new(unit: TimeUnit, segmenting: bool) -> Self {
        Self {
            unit,
            segmenting,
            manual: None,
            batch: None,
            anchors: Anchors::default(),
        }
    }

    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    pub fn segmenting(&self) -> bool {
        self.segmenting
    }

    pub fn anchors(&self) -> Anchors {
        self.anchors
    }

    pub fn manual_time(&self) -> Option<i64> {
        self.manual
    }

    /// Current candidate timestamp without touching the anchors.
    pub fn peek(&self) -> i64 {
        self.batch
            .or(self.manual)
            .unwrap_or_else(|| self.unit.now())
    }

    /// Timestamp for the next sample.
    pub fn next_timestamp(&mut self) -> i64 {
        let t = self.peek();
        self.anchor(t);
        t
    }

    fn anchor(&mut self, t: i64) {
        self.anchors.source_start.get_or_insert(t);
        if self.segmenting {
            self.anchors.segment_start.get_or_insert(t);
        }
        self.anchors.block_start.get_or_insert(t);
    }

    /// Sets a manual time given in milliseconds, or [`AUTO_TIME`] to clear it.
    ///
    /// Other negative values are ignored with a warning. Returns whether the
    /// value was accepted.
    pub fn set_time(&mut self, ms: i64) -> bool {
        if ms == AUTO_TIME {
            self.manual = None;
            return true;
        }
        if ms < 0 {
            warn!("[clock] ignoring negative manual time {}", ms);
            return false;
        }
        self.manual = Some(self.unit.from_millis(ms));
        true
    }

    /// Captures one timestamp for a synchronized batch. Returns `None` if a
    /// batch is already open.
    pub fn begin_batch(&mut self) -> Option<i64> {
        if self.batch.is_some() {
            return None;
        }
        let t = self.manual.unwrap_or_else(|| self.unit.now());
        self.batch = Some(t);
        Some(t)
    }

    pub fn end_batch(&mut self) {
        self.batch = None;
    }

    pub fn take_block_start(&mut self) -> Option<i64> {
        self.anchors.block_start.take()
    }

    pub fn end_segment(&mut self) {
        self.anchors.segment_start = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchors_set_once() {
        let mut clock = Clock::new(TimeUnit::Millis, true);
        clock.set_time(1_000);
        assert_eq!(clock.next_timestamp(), 1_000);
        clock.set_time(2_000);
        assert_eq!(clock.next_timestamp(), 2_000);

        let a = clock.anchors();
        assert_eq!(a.source_start, Some(1_000));
        assert_eq!(a.segment_start, Some(1_000));
        assert_eq!(a.block_start, Some(1_000));
    }

    #[test]
    fn block_and_segment_reset() {
        let mut clock = Clock::new(TimeUnit::Millis, true);
        clock.set_time(1_000);
        clock.next_timestamp();
        assert_eq!(clock.take_block_start(), Some(1_000));
        clock.end_segment();

        clock.set_time(3_000);
        clock.next_timestamp();
        let a = clock.anchors();
        assert_eq!(a.source_start, Some(1_000));
        assert_eq!(a.segment_start, Some(3_000));
        assert_eq!(a.block_start, Some(3_000));
    }

    #[test]
    fn no_segment_anchor_without_segmenting() {
        let mut clock = Clock::new(TimeUnit::Seconds, false);
        clock.next_timestamp();
        assert!(clock.anchors().segment_start.is_none());
        assert!(clock.anchors().block_start.is_some());
    }

    #[test]
    fn manual_time_rules() {
        let mut clock = Clock::new(TimeUnit::Seconds, false);
        assert!(clock.set_time(5_000));
        assert_eq!(clock.manual_time(), Some(5));
        assert!(!clock.set_time(-2));
        assert_eq!(clock.manual_time(), Some(5));
        assert!(clock.set_time(AUTO_TIME));
        assert_eq!(clock.manual_time(), None);
    }

    #[test]
    fn batch_is_not_reentrant() {
        let mut clock = Clock::new(TimeUnit::Millis, false);
        clock.set_time(42);
        assert_eq!(clock.begin_batch(), Some(42));
        assert_eq!(clock.begin_batch(), None);

        clock.set_time(50);
        assert_eq!(clock.next_timestamp(), 42);
        clock.end_batch();
        assert_eq!(clock.next_timestamp(), 50);
    }
}
