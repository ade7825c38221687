//! All named queues of a daemon
//!
//! The registry is a plain single-writer structure. It does no locking;
//! the scheduler loop is the only code that mutates it.

use std::collections::BTreeMap;

use crate::queue::JobQueue;

/// Named job queues, created on first submit
#[derive(Debug)]
pub struct QueueRegistry<J> {
    queues: BTreeMap<String, JobQueue<J>>,
    created: u64,
}

impl<J> Default for QueueRegistry<J> {
    fn default() -> Self {
        Self::new()
    }
}

impl<J> QueueRegistry<J> {
    pub fn new() -> Self {
        Self {
            queues: BTreeMap::new(),
            created: 0,
        }
    }

    /// Append `job` to the queue called `name`, creating it if needed
    pub fn submit(&mut self, name: &str, job: J) {
        let created = &mut self.created;
        self.queues
            .entry(name.to_string())
            .or_insert_with(|| {
                *created += 1;
                tracing::debug!("Creating queue '{}' (generation {})", name, created);
                JobQueue::new(name).with_generation(*created)
            })
            .append(job);
    }

    /// Generation of the live queue called `name`. A queue created after a
    /// `remove` of the same name gets a new one.
    pub fn generation(&self, name: &str) -> Option<u64> {
        self.queues.get(name).map(JobQueue::generation)
    }

    /// Drop the queue and its backlog. Unknown names are ignored and a job
    /// already dispatched from the queue keeps running.
    pub fn remove(&mut self, name: &str) {
        if let Some(queue) = self.queues.remove(name) {
            tracing::debug!("Removed queue '{}' with {} waiting jobs", name, queue.len());
        }
    }

    /// Busy flag of the queue; false for unknown names
    pub fn is_busy(&self, name: &str) -> bool {
        self.queues.get(name).is_some_and(JobQueue::is_busy)
    }

    /// Set the busy flag. Returns false when the queue does not exist.
    pub fn set_busy(&mut self, name: &str, busy: bool) -> bool {
        match self.queues.get_mut(name) {
            Some(queue) => {
                queue.set_busy(busy);
                true
            }
            None => false,
        }
    }

    /// Pop the head job of the queue.
    ///
    /// The caller checks `is_busy` first and marks the queue busy before
    /// stepping.
    pub fn step(&mut self, name: &str) -> Option<J> {
        self.queues.get_mut(name).and_then(JobQueue::pop)
    }

    pub fn has_next(&self, name: &str) -> bool {
        self.queues.get(name).is_some_and(JobQueue::has_next)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.queues.contains_key(name)
    }

    /// Comma separated queue names, in name order
    pub fn names_snapshot(&self) -> String {
        self.queues.keys().map(String::as_str).collect::<Vec<_>>().join(",")
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_creates_one_queue_in_order() {
        let mut registry = QueueRegistry::new();
        registry.submit("analysis", "J1");
        registry.submit("analysis", "J2");
        registry.submit("analysis", "J3");

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.step("analysis"), Some("J1"));
        assert_eq!(registry.step("analysis"), Some("J2"));
        assert_eq!(registry.step("analysis"), Some("J3"));
        assert_eq!(registry.step("analysis"), None);
    }

    #[test]
    fn test_has_next_after_last_step_and_resubmit() {
        let mut registry = QueueRegistry::new();
        registry.submit("q", 1);

        assert!(registry.has_next("q"));
        registry.step("q");
        assert!(!registry.has_next("q"));

        registry.submit("q", 2);
        assert!(registry.has_next("q"));
        assert!(!registry.has_next("unknown"));
    }

    #[test]
    fn test_names_snapshot() {
        let mut registry = QueueRegistry::new();
        assert_eq!(registry.names_snapshot(), "");

        registry.submit("beta", ());
        registry.submit("alpha", ());
        registry.submit("gamma", ());
        registry.remove("beta");

        assert_eq!(registry.names_snapshot(), "alpha,gamma");
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let mut registry = QueueRegistry::new();
        registry.submit("q", 1);

        registry.remove("nope");

        assert_eq!(registry.len(), 1);
        assert!(registry.has_next("q"));
    }

    #[test]
    fn test_recreated_queue_gets_new_generation() {
        let mut registry = QueueRegistry::new();
        assert_eq!(registry.generation("q"), None);

        registry.submit("q", 1);
        let first = registry.generation("q");
        registry.submit("q", 2);
        assert_eq!(registry.generation("q"), first);

        registry.remove("q");
        registry.submit("q", 3);
        assert!(registry.generation("q").is_some());
        assert_ne!(registry.generation("q"), first);
    }

    #[test]
    fn test_busy_flag() {
        let mut registry = QueueRegistry::new();
        assert!(!registry.is_busy("q"));
        assert!(!registry.set_busy("q", true));

        registry.submit("q", 1);
        assert!(registry.set_busy("q", true));
        assert!(registry.is_busy("q"));

        registry.remove("q");
        assert!(!registry.is_busy("q"));
        assert!(!registry.set_busy("q", false));
    }
}
