use std::{
    collections::{HashSet, VecDeque},
    sync::{Arc, Mutex, PoisonError},
};

/// The set of thread roots the bot has joined by being mentioned.
///
/// Bounded: once `capacity` threads are tracked, the oldest is forgotten first.
/// Cloning shares the underlying set.
#[derive(Debug, Clone)]
pub struct ThreadTracker {
    inner: Arc<Mutex<TrackedThreads>>,
    capacity: usize,
}

#[derive(Debug, Default)]
struct TrackedThreads {
    order: VecDeque<String>,
    members: HashSet<String>,
}

impl ThreadTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TrackedThreads::default())),
            capacity: capacity.max(1),
        }
    }

    /// Record that the bot participates in the thread rooted at `thread_ts`.
    pub fn mark(&self, thread_ts: &str) {
        let mut threads = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        if !threads.members.insert(thread_ts.to_string()) {
            return;
        }

        threads.order.push_back(thread_ts.to_string());

        while threads.order.len() > self.capacity {
            if let Some(oldest) = threads.order.pop_front() {
                threads.members.remove(&oldest);
            }
        }
    }

    /// Whether the bot participates in the thread rooted at `thread_ts`.
    pub fn owns(&self, thread_ts: &str) -> bool {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).members.contains(thread_ts)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// Tests.

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_and_owns() {
        let threads = ThreadTracker::new(10);

        assert!(!threads.owns("1700000000.000100"));

        threads.mark("1700000000.000100");
        threads.mark("1700000000.000100");

        assert!(threads.owns("1700000000.000100"));
        assert_eq!(threads.len(), 1);
    }

    #[test]
    fn test_oldest_thread_is_evicted() {
        let threads = ThreadTracker::new(2);

        threads.mark("1");
        threads.mark("2");
        threads.mark("3");

        assert!(!threads.owns("1"));
        assert!(threads.owns("2"));
        assert!(threads.owns("3"));
        assert_eq!(threads.len(), 2);
    }

    #[test]
    fn test_clones_share_state() {
        let threads = ThreadTracker::new(2);
        threads.clone().mark("1");

        assert!(threads.owns("1"));
    }
}
