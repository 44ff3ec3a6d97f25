//! Bounded ring buffer of recently published events. Oldest evicted first.

use parking_lot::Mutex;
use plugin_types::Event;
use std::collections::VecDeque;
use std::sync::Arc;

pub struct EventHistory {
    capacity: usize,
    events: Mutex<VecDeque<Arc<Event>>>,
}

impl EventHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            events: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    /// Append, evicting the oldest entry when full. Zero capacity keeps nothing.
    pub fn push(&self, event: Arc<Event>) {
        if self.capacity == 0 {
            return;
        }
        let mut events = self.events.lock();
        while events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// Up to `limit` most recent events, oldest first, optionally filtered by
    /// channel.
    pub fn recent(&self, channel: Option<&str>, limit: usize) -> Vec<Arc<Event>> {
        let events = self.events.lock();
        let mut matched: Vec<Arc<Event>> = events
            .iter()
            .rev()
            .filter(|e| channel.map_or(true, |c| e.channel == c))
            .take(limit)
            .cloned()
            .collect();
        matched.reverse();
        matched
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Default for EventHistory {
    fn default() -> Self {
        Self::new(crate::DEFAULT_HISTORY_CAPACITY)
    }
}
