//! Ordered, deduplicated holding area for prompts awaiting delivery.
//!
//! The queue keeps a dense ordered sequence plus an id-membership set for
//! O(1) dedup checks. Absent a manual reorder, iteration yields events sorted
//! by `(priority ascending, created_at ascending)`.

use std::collections::HashSet;
use wild_proto::QueuedEvent;

/// Priority queue of pending prompts, deduplicated by event id.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: Vec<QueuedEvent>,
    ids: HashSet<String>,
}

impl EventQueue {
    /// Creates a new empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts the event at its sorted position by `(priority, created_at)`.
    ///
    /// The position is found by binary search against the *current* queue
    /// order, so a manual `reorder` is not undone by later inserts. Returns
    /// false without modifying the queue if an event with the same id is
    /// already present.
    pub fn enqueue(&mut self, event: QueuedEvent) -> bool {
        if !self.ids.insert(event.id.clone()) {
            return false;
        }
        let key = (event.priority, event.created_at);
        let index = self
            .events
            .partition_point(|e| (e.priority, e.created_at) <= key);
        self.events.insert(index, event);
        true
    }

    /// Removes and returns the head of the queue.
    pub fn dequeue(&mut self) -> Option<QueuedEvent> {
        if self.events.is_empty() {
            return None;
        }
        let event = self.events.remove(0);
        self.ids.remove(&event.id);
        Some(event)
    }

    /// Read-only view of the head of the queue.
    pub fn peek(&self) -> Option<&QueuedEvent> {
        self.events.first()
    }

    /// Removes the event with the given id, if present.
    pub fn remove(&mut self, id: &str) -> bool {
        if !self.ids.remove(id) {
            return false;
        }
        self.events.retain(|e| e.id != id);
        true
    }

    /// Overrides the queue order to match `ordered_ids`.
    ///
    /// Members not named in the list are appended afterward in their prior
    /// relative order. Unknown ids are ignored.
    pub fn reorder(&mut self, ordered_ids: &[String]) {
        let mut reordered = Vec::with_capacity(self.events.len());
        for id in ordered_ids {
            if let Some(position) = self.events.iter().position(|e| &e.id == id) {
                reordered.push(self.events.remove(position));
            }
        }
        reordered.append(&mut self.events);
        self.events = reordered;
    }

    /// Positional insert for "insert before/after" affordances.
    ///
    /// Same dedup rule as `enqueue`; the index is clamped to the queue length.
    pub fn insert_at(&mut self, event: QueuedEvent, index: usize) -> bool {
        if !self.ids.insert(event.id.clone()) {
            return false;
        }
        let index = index.min(self.events.len());
        self.events.insert(index, event);
        true
    }

    /// Empties the queue and the id-membership set.
    pub fn clear(&mut self) {
        self.events.clear();
        self.ids.clear();
    }

    /// Returns true if an event with the given id is queued.
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Snapshot of queue contents in delivery order.
    pub fn events(&self) -> &[QueuedEvent] {
        &self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use wild_proto::{priority, EventKind};

    fn event(id: &str, priority: i32, offset_ms: i64) -> QueuedEvent {
        QueuedEvent::new(id, EventKind::Exploring, priority, id, format!("prompt {id}"))
            .with_created_at(Utc::now() + Duration::milliseconds(offset_ms))
    }

    #[test]
    fn test_enqueue_dedup_keeps_first_payload() {
        let mut queue = EventQueue::new();
        assert!(queue.enqueue(event("a", 50, 0)));
        let mut duplicate = event("a", 10, 1);
        duplicate.prompt = "other".to_string();
        assert!(!queue.enqueue(duplicate));

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.peek().unwrap().prompt, "prompt a");
        assert_eq!(queue.peek().unwrap().priority, 50);
    }

    #[test]
    fn test_dequeue_yields_priority_then_created_order() {
        let mut queue = EventQueue::new();
        queue.enqueue(event("explore", priority::EXPLORING, 0));
        queue.enqueue(event("alert", priority::ALERT_CRITICAL, 1));
        queue.enqueue(event("steer", priority::STEER, 2));
        queue.enqueue(event("run-late", priority::RUN_SUCCEEDED, 4));
        queue.enqueue(event("run-early", priority::RUN_SUCCEEDED, 3));

        let drained: Vec<String> = std::iter::from_fn(|| queue.dequeue())
            .map(|e| e.id)
            .collect();
        assert_eq!(drained, ["steer", "alert", "run-early", "run-late", "explore"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_reorder_overrides_priority_order() {
        let mut queue = EventQueue::new();
        queue.enqueue(event("a", 10, 0));
        queue.enqueue(event("b", 20, 1));

        queue.reorder(&["b".to_string(), "a".to_string()]);

        assert_eq!(queue.dequeue().unwrap().id, "b");
        assert_eq!(queue.dequeue().unwrap().id, "a");
    }

    #[test]
    fn test_reorder_appends_unnamed_members_in_prior_order() {
        let mut queue = EventQueue::new();
        queue.enqueue(event("a", 10, 0));
        queue.enqueue(event("b", 20, 1));
        queue.enqueue(event("c", 30, 2));

        queue.reorder(&["c".to_string()]);

        let order: Vec<&str> = queue.events().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(order, ["c", "a", "b"]);
    }

    #[test]
    fn test_remove_by_id() {
        let mut queue = EventQueue::new();
        queue.enqueue(event("a", 10, 0));
        queue.enqueue(event("b", 20, 1));

        assert!(queue.remove("a"));
        assert!(!queue.remove("a"));
        assert_eq!(queue.len(), 1);
        assert!(!queue.contains("a"));

        // The id can be reused after removal.
        assert!(queue.enqueue(event("a", 10, 2)));
    }

    #[test]
    fn test_insert_at_respects_dedup_and_clamps_index() {
        let mut queue = EventQueue::new();
        queue.enqueue(event("a", 10, 0));
        queue.enqueue(event("b", 20, 1));

        assert!(queue.insert_at(event("c", 90, 2), 0));
        assert_eq!(queue.peek().unwrap().id, "c");

        assert!(!queue.insert_at(event("a", 90, 3), 0));

        assert!(queue.insert_at(event("d", 90, 4), 99));
        assert_eq!(queue.events().last().unwrap().id, "d");
    }

    #[test]
    fn test_clear_resets_membership() {
        let mut queue = EventQueue::new();
        queue.enqueue(event("a", 10, 0));
        queue.clear();

        assert!(queue.is_empty());
        assert!(queue.enqueue(event("a", 10, 1)));
    }

    #[test]
    fn test_equal_keys_keep_insertion_order() {
        let mut queue = EventQueue::new();
        let stamp = Utc::now();
        let first = QueuedEvent::new("first", EventKind::Steer, 10, "t", "p")
            .with_created_at(stamp);
        let second = QueuedEvent::new("second", EventKind::Steer, 10, "t", "p")
            .with_created_at(stamp);
        queue.enqueue(first);
        queue.enqueue(second);

        assert_eq!(queue.dequeue().unwrap().id, "first");
        assert_eq!(queue.dequeue().unwrap().id, "second");
    }
}
