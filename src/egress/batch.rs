//! Batch buffer: size/time-bounded, single-writer/single-reader per the
//! concurrency model in §5.

use crate::event::Event;
use std::time::Instant;

pub struct Batch {
    events: Vec<Event>,
    start_time: Option<Instant>,
    max_size: usize,
    max_wait: std::time::Duration,
}

impl Batch {
    pub fn new(max_size: usize, max_wait: std::time::Duration) -> Self {
        Self {
            events: Vec::new(),
            start_time: None,
            max_size: max_size.clamp(1, 10_000),
            max_wait,
        }
    }

    /// Appends an event, preserving insertion order (§5 ordering
    /// guarantee). Returns `true` if this append should trigger a flush.
    pub fn submit(&mut self, event: Event) -> bool {
        if self.events.is_empty() {
            self.start_time = Some(Instant::now());
        }
        self.events.push(event);
        self.should_flush()
    }

    pub fn should_flush(&self) -> bool {
        if self.events.len() >= self.max_size {
            return true;
        }
        match self.start_time {
            Some(start) => start.elapsed() >= self.max_wait,
            None => false,
        }
    }

    pub fn count(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Takes the buffered events and resets the batch, ready for reuse.
    pub fn take(&mut self) -> Vec<Event> {
        self.start_time = None;
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn batch_size_one_flushes_immediately() {
        let mut batch = Batch::new(1, Duration::from_secs(30));
        assert!(batch.submit(Event::new()));
    }

    #[test]
    fn flush_resets_and_preserves_order() {
        let mut batch = Batch::new(10, Duration::from_secs(30));
        batch.submit(Event::new().with_field("seq", 1));
        batch.submit(Event::new().with_field("seq", 2));
        let taken = batch.take();
        assert_eq!(taken.len(), 2);
        assert_eq!(taken[0].get("seq").unwrap(), 1);
        assert_eq!(taken[1].get("seq").unwrap(), 2);
        assert!(batch.is_empty());
    }

    #[test]
    fn batch_size_is_bounded_to_at_most_10000() {
        let batch = Batch::new(50_000, Duration::from_secs(30));
        assert_eq!(batch.max_size, 10_000);
    }
}
