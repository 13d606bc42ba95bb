//! # Coalescing Mailboxes
//!
//! Each worker exclusively reads one mailbox; the orchestrator only
//! enqueues. To bound memory, a pending summary for the same
//! `(sender, direction)` edge is replaced in place by a newer one
//! rather than queued behind it; the caller learns about the
//! replacement so the displaced message can be retired from the
//! in-flight count. Per-edge FIFO order is preserved because a
//! replacement keeps the queue position of the entry it displaces.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::Notify;

use sunder_core::Message;

/// What happened to a pushed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deposit {
    /// Appended as a new entry.
    Enqueued,
    /// Replaced a pending entry for the same edge; the displaced
    /// message counts as consumed.
    Coalesced,
}

pub struct Mailbox {
    queue: Mutex<VecDeque<Message>>,
    notify: Notify,
}

impl Mailbox {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    /// Enqueue a message. Summary-carrying messages coalesce against a
    /// pending entry for the same `(sender, direction)`; everything
    /// else is appended.
    pub fn push(&self, message: Message) -> Deposit {
        let deposit = {
            let mut queue = match self.queue.lock() {
                Ok(q) => q,
                Err(poisoned) => poisoned.into_inner(),
            };
            let slot = if message.carries_summary() {
                queue.iter_mut().find(|m| {
                    m.carries_summary()
                        && m.sender == message.sender
                        && m.direction == message.direction
                })
            } else {
                None
            };
            match slot {
                Some(slot) => {
                    *slot = message;
                    Deposit::Coalesced
                }
                None => {
                    queue.push_back(message);
                    Deposit::Enqueued
                }
            }
        };
        self.notify.notify_one();
        deposit
    }

    /// Wait for the next message.
    pub async fn recv(&self) -> Message {
        loop {
            // Arm the notification before checking the queue so a push
            // between the check and the await is not lost.
            let notified = self.notify.notified();
            if let Some(message) = self.try_pop() {
                return message;
            }
            notified.await;
        }
    }

    pub fn try_pop(&self) -> Option<Message> {
        match self.queue.lock() {
            Ok(mut q) => q.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        }
    }

    pub fn len(&self) -> usize {
        match self.queue.lock() {
            Ok(q) => q.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use sunder_core::Payload;

    fn post(sender: &str, tag: &str) -> Message {
        let mut payload = Payload::new();
        payload.insert("tag".to_string(), tag.to_string());
        Message::postcondition(sender, 10, payload, BTreeSet::new())
    }

    #[test]
    fn test_push_pop_fifo() {
        let mb = Mailbox::new();
        assert_eq!(mb.push(post("B1", "a")), Deposit::Enqueued);
        assert_eq!(mb.push(post("B2", "b")), Deposit::Enqueued);
        assert_eq!(mb.try_pop().unwrap().sender, "B1");
        assert_eq!(mb.try_pop().unwrap().sender, "B2");
        assert!(mb.try_pop().is_none());
    }

    #[test]
    fn test_same_edge_coalesces_to_newest() {
        let mb = Mailbox::new();
        mb.push(post("B1", "old"));
        assert_eq!(mb.push(post("B1", "new")), Deposit::Coalesced);
        assert_eq!(mb.len(), 1);
        let got = mb.try_pop().unwrap();
        assert_eq!(got.payload.get("tag").unwrap(), "new");
    }

    #[test]
    fn test_coalescing_preserves_queue_position() {
        let mb = Mailbox::new();
        mb.push(post("B1", "old"));
        mb.push(post("B2", "x"));
        mb.push(post("B1", "new"));
        assert_eq!(mb.try_pop().unwrap().payload.get("tag").unwrap(), "new");
        assert_eq!(mb.try_pop().unwrap().sender, "B2");
    }

    #[test]
    fn test_shutdown_never_coalesces() {
        let mb = Mailbox::new();
        assert_eq!(mb.push(Message::shutdown()), Deposit::Enqueued);
        assert_eq!(mb.push(Message::shutdown()), Deposit::Enqueued);
        assert_eq!(mb.len(), 2);
    }

    #[tokio::test]
    async fn test_recv_wakes_on_push() {
        use std::sync::Arc;
        let mb = Arc::new(Mailbox::new());
        let reader = {
            let mb = mb.clone();
            tokio::spawn(async move { mb.recv().await })
        };
        tokio::task::yield_now().await;
        mb.push(post("B1", "a"));
        let got = reader.await.unwrap();
        assert_eq!(got.sender, "B1");
    }
}
