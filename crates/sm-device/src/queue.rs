//! Pending updates that share one timetag and leave as one batch.

use sm_core::{MapperError, MapperResult, SignalValue, Timetag};

#[derive(Debug, Clone, PartialEq)]
pub struct Queue {
    timetag: Timetag,
    updates: Vec<(String, SignalValue)>,
}

impl Queue {
    pub fn new(timetag: Timetag) -> Self {
        Self {
            timetag,
            updates: Vec::new(),
        }
    }

    pub fn timetag(&self) -> Timetag {
        self.timetag
    }

    pub fn push(&mut self, signal: impl Into<String>, value: SignalValue) {
        self.updates.push((signal.into(), value));
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    pub fn into_updates(self) -> Vec<(String, SignalValue)> {
        self.updates
    }
}

/// Open a queue at `timetag`. Re-opening at the same timetag is a no-op.
pub fn start(slot: &mut Option<Queue>, timetag: Timetag) -> MapperResult<()> {
    match slot {
        Some(open) if open.timetag == timetag => Ok(()),
        Some(open) => Err(MapperError::QueueAlreadyOpen {
            open: open.timetag,
            requested: timetag,
        }),
        None => {
            *slot = Some(Queue::new(timetag));
            Ok(())
        }
    }
}

/// Close the queue opened at `timetag` and hand back its contents. On a
/// timetag mismatch the queue stays open.
pub fn finish(slot: &mut Option<Queue>, timetag: Timetag) -> MapperResult<Queue> {
    match slot {
        None => Err(MapperError::NoActiveQueue),
        Some(open) if open.timetag != timetag => Err(MapperError::TimestampMismatch {
            open: open.timetag,
            requested: timetag,
        }),
        Some(_) => slot.take().ok_or(MapperError::NoActiveQueue),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_without_start_fails() {
        let mut slot = None;
        assert_eq!(
            finish(&mut slot, Timetag::new(1, 0)),
            Err(MapperError::NoActiveQueue)
        );
    }

    #[test]
    fn restart_same_timetag_keeps_contents() {
        let t = Timetag::new(3, 0);
        let mut slot = None;
        start(&mut slot, t).unwrap();
        slot.as_mut().unwrap().push("/a", SignalValue::from(1));
        start(&mut slot, t).unwrap();
        assert_eq!(slot.as_ref().map(Queue::len), Some(1));
    }

    #[test]
    fn start_different_timetag_fails() {
        let mut slot = None;
        start(&mut slot, Timetag::new(1, 0)).unwrap();
        assert!(matches!(
            start(&mut slot, Timetag::new(2, 0)),
            Err(MapperError::QueueAlreadyOpen { .. })
        ));
    }

    #[test]
    fn mismatch_leaves_queue_open() {
        let t = Timetag::new(1, 0);
        let mut slot = None;
        start(&mut slot, t).unwrap();
        assert!(matches!(
            finish(&mut slot, Timetag::new(9, 0)),
            Err(MapperError::TimestampMismatch { .. })
        ));
        assert!(slot.is_some());
        let queue = finish(&mut slot, t).unwrap();
        assert_eq!(queue.timetag(), t);
        assert!(slot.is_none());
    }
}
