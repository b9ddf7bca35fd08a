//! Single-flight text turn queue

use std::collections::VecDeque;
use tracing::{debug, warn};

use crate::error::RelayResult;

/// Where dequeued turns go
pub trait TurnSink {
    /// Whether a turn can be transmitted right now
    fn is_ready(&self) -> bool;

    fn send_text(&mut self, text: &str) -> RelayResult<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextSegment {
    pub text: String,
    pub order: u64,
}

/// FIFO of pending segments plus the busy flag. At most one segment is in
/// flight between `try_advance` and the matching completion.
#[derive(Debug, Default)]
pub struct TurnQueue {
    pending: VecDeque<TextSegment>,
    busy: bool,
    last_processed: Option<String>,
    next_order: u64,
}

impl TurnQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `text` unless it repeats the last processed (or last queued)
    /// segment. Returns whether it was queued.
    pub fn enqueue(&mut self, text: impl Into<String>) -> bool {
        let text = text.into();
        if text.trim().is_empty() {
            return false;
        }
        if self.last_processed.as_deref() == Some(text.as_str())
            || self.pending.back().map(|s| s.text.as_str()) == Some(text.as_str())
        {
            debug!("Skipping repeated segment");
            return false;
        }
        self.pending.push_back(TextSegment {
            text,
            order: self.next_order,
        });
        self.next_order += 1;
        true
    }

    /// Send the oldest segment if nothing is in flight.
    ///
    /// A failed send is logged and counts as completed: the segment is not
    /// retried and the next one may go on the following advance.
    pub fn try_advance(&mut self, sink: &mut dyn TurnSink) {
        if self.busy || self.pending.is_empty() || !sink.is_ready() {
            return;
        }
        let Some(segment) = self.pending.pop_front() else {
            return;
        };
        self.busy = true;
        self.last_processed = Some(segment.text.clone());

        debug!("Sending turn #{} ({} chars)", segment.order, segment.text.len());
        if let Err(e) = sink.send_text(&segment.text) {
            warn!("Turn #{} was not sent: {}", segment.order, e);
            self.busy = false;
        }
    }

    /// The in-flight turn finished; move on to the next one.
    pub fn on_turn_complete(&mut self, sink: &mut dyn TurnSink) {
        self.busy = false;
        self.try_advance(sink);
    }

    /// Clear the busy flag without advancing (the channel went away).
    pub fn release(&mut self) {
        self.busy = false;
    }

    /// Drop pending segments. The dedup memory is kept.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.busy = false;
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Nothing queued and nothing in flight
    pub fn is_idle(&self) -> bool {
        !self.busy && self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RelayError;

    #[derive(Default)]
    struct FakeSink {
        offline: bool,
        fail: bool,
        sent: Vec<String>,
    }

    impl TurnSink for FakeSink {
        fn is_ready(&self) -> bool {
            !self.offline
        }

        fn send_text(&mut self, text: &str) -> RelayResult<()> {
            if self.fail {
                return Err(RelayError::NotConnected);
            }
            self.sent.push(text.to_string());
            Ok(())
        }
    }

    #[test]
    fn second_turn_waits_for_the_first_to_complete() {
        let mut queue = TurnQueue::new();
        let mut sink = FakeSink::default();

        queue.enqueue("Hello");
        queue.try_advance(&mut sink);
        queue.enqueue("World");
        queue.try_advance(&mut sink);
        assert_eq!(sink.sent, vec!["Hello"]);
        assert!(queue.is_busy());

        queue.on_turn_complete(&mut sink);
        assert_eq!(sink.sent, vec!["Hello", "World"]);
        queue.on_turn_complete(&mut sink);
        assert!(queue.is_idle());
    }

    #[test]
    fn segments_go_out_in_enqueue_order_one_at_a_time() {
        let mut queue = TurnQueue::new();
        let mut sink = FakeSink::default();
        let texts: Vec<String> = (0..8).map(|i| format!("line {}", i)).collect();
        for text in &texts {
            queue.enqueue(text.clone());
            queue.try_advance(&mut sink);
            queue.try_advance(&mut sink);
        }
        assert_eq!(sink.sent.len(), 1);

        while !queue.is_idle() {
            let before = sink.sent.len();
            queue.on_turn_complete(&mut sink);
            assert!(sink.sent.len() <= before + 1);
        }
        assert_eq!(sink.sent, texts);
    }

    #[test]
    fn repeated_text_is_discarded() {
        let mut queue = TurnQueue::new();
        let mut sink = FakeSink::default();

        assert!(queue.enqueue("same"));
        assert!(!queue.enqueue("same"));
        assert_eq!(queue.len(), 1);

        queue.try_advance(&mut sink);
        assert!(!queue.enqueue("same"));
        assert!(queue.is_empty());

        assert!(queue.enqueue("other"));
        queue.on_turn_complete(&mut sink);
        assert_eq!(sink.sent, vec!["same", "other"]);
        assert!(queue.enqueue("same"));
        assert!(!queue.enqueue("   "));
    }

    #[test]
    fn nothing_is_sent_while_the_sink_is_offline() {
        let mut queue = TurnQueue::new();
        let mut sink = FakeSink {
            offline: true,
            ..FakeSink::default()
        };
        queue.enqueue("early");
        queue.try_advance(&mut sink);
        assert!(sink.sent.is_empty());
        assert!(!queue.is_busy());

        sink.offline = false;
        queue.try_advance(&mut sink);
        assert_eq!(sink.sent, vec!["early"]);
    }

    #[test]
    fn failed_send_is_dropped_and_does_not_stall() {
        let mut queue = TurnQueue::new();
        let mut sink = FakeSink {
            fail: true,
            ..FakeSink::default()
        };
        queue.enqueue("lost");
        queue.enqueue("next");
        queue.try_advance(&mut sink);
        assert!(!queue.is_busy());
        assert_eq!(queue.len(), 1);

        sink.fail = false;
        queue.try_advance(&mut sink);
        assert_eq!(sink.sent, vec!["next"]);
    }

    #[test]
    fn release_unblocks_without_sending() {
        let mut queue = TurnQueue::new();
        let mut sink = FakeSink::default();
        queue.enqueue("a");
        queue.enqueue("b");
        queue.try_advance(&mut sink);

        queue.release();
        assert!(!queue.is_busy());
        assert_eq!(sink.sent, vec!["a"]);

        queue.clear();
        assert!(queue.is_idle());
    }
}
