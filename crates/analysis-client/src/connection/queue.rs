//! Outbound message queue
//!
//! Holds messages sent while the socket is down, flushed FIFO on connect.

use analysis_common::{OverflowPolicy, QueueConfig};
use analysis_protocol::OutboundMessage;
use std::collections::VecDeque;

/// Result of handing a message to the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Written to the socket
    Sent,
    /// Queued until the next connection
    Queued,
    /// Queued, and the oldest queued message was evicted to make room
    QueuedDroppedOldest,
}

/// The queue is at capacity and the policy is `RejectNew`
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Outbound queue full ({capacity} messages)")]
pub struct QueueFullError {
    pub capacity: usize,
}

/// Bounded FIFO of pending outbound messages
#[derive(Debug)]
pub struct OutboundQueue {
    config: QueueConfig,
    messages: VecDeque<OutboundMessage>,
}

impl OutboundQueue {
    #[must_use]
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            messages: VecDeque::new(),
        }
    }

    /// Append `message`, applying the overflow policy when full
    pub fn push(&mut self, message: OutboundMessage) -> Result<SendOutcome, QueueFullError> {
        let capacity = self.config.capacity;
        if capacity == 0 || self.messages.len() < capacity {
            self.messages.push_back(message);
            return Ok(SendOutcome::Queued);
        }

        match self.config.overflow {
            OverflowPolicy::RejectNew => Err(QueueFullError { capacity }),
            OverflowPolicy::DropOldest => {
                if let Some(evicted) = self.messages.pop_front() {
                    tracing::warn!(
                        capacity,
                        evicted_id = %evicted.id,
                        evicted_type = %evicted.kind,
                        "Outbound queue full, dropped oldest message"
                    );
                }
                self.messages.push_back(message);
                Ok(SendOutcome::QueuedDroppedOldest)
            }
        }
    }

    /// Put a message back at the head after a failed write
    pub fn requeue_front(&mut self, message: OutboundMessage) {
        self.messages.push_front(message);
        let capacity = self.config.capacity;
        if capacity > 0 && self.messages.len() > capacity {
            self.messages.pop_back();
        }
    }

    pub fn pop_front(&mut self) -> Option<OutboundMessage> {
        self.messages.pop_front()
    }

    /// Remove every message in insertion order
    pub fn drain(&mut self) -> Vec<OutboundMessage> {
        self.messages.drain(..).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue(capacity: usize, overflow: OverflowPolicy) -> OutboundQueue {
        OutboundQueue::new(QueueConfig { capacity, overflow })
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = queue(10, OverflowPolicy::DropOldest);
        let first = OutboundMessage::ping();
        let second = OutboundMessage::get_progress();
        let (first_id, second_id) = (first.id, second.id);

        assert_eq!(queue.push(first), Ok(SendOutcome::Queued));
        assert_eq!(queue.push(second), Ok(SendOutcome::Queued));

        let drained: Vec<_> = queue.drain().into_iter().map(|m| m.id).collect();
        assert_eq!(drained, vec![first_id, second_id]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_drop_oldest() {
        let mut queue = queue(2, OverflowPolicy::DropOldest);
        let oldest = OutboundMessage::ping();
        let oldest_id = oldest.id;
        queue.push(oldest).unwrap();
        queue.push(OutboundMessage::ping()).unwrap();

        assert_eq!(
            queue.push(OutboundMessage::ping()),
            Ok(SendOutcome::QueuedDroppedOldest)
        );
        assert_eq!(queue.len(), 2);
        assert!(queue.drain().iter().all(|m| m.id != oldest_id));
    }

    #[test]
    fn test_reject_new() {
        let mut queue = queue(1, OverflowPolicy::RejectNew);
        queue.push(OutboundMessage::ping()).unwrap();

        assert_eq!(
            queue.push(OutboundMessage::ping()),
            Err(QueueFullError { capacity: 1 })
        );
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_unbounded() {
        let mut queue = OutboundQueue::new(QueueConfig::unbounded());
        for _ in 0..1_000 {
            assert_eq!(queue.push(OutboundMessage::ping()), Ok(SendOutcome::Queued));
        }
        assert_eq!(queue.len(), 1_000);
    }

    #[test]
    fn test_requeue_front_keeps_order() {
        let mut queue = queue(3, OverflowPolicy::DropOldest);
        let a = OutboundMessage::ping();
        let b = OutboundMessage::ping();
        let (a_id, b_id) = (a.id, b.id);
        queue.push(a).unwrap();
        queue.push(b).unwrap();

        let head = queue.pop_front().unwrap();
        queue.requeue_front(head);

        assert_eq!(queue.pop_front().map(|m| m.id), Some(a_id));
        assert_eq!(queue.pop_front().map(|m| m.id), Some(b_id));
    }
}
