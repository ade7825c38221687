//! A single named job queue

use std::collections::VecDeque;

/// FIFO backlog of jobs plus the flag telling whether one of them is
/// currently running.
///
/// The queue never looks at `busy` itself: whoever steps the queue sets
/// the flag before dispatching and clears it when the job ends.
#[derive(Debug)]
pub struct JobQueue<J> {
    name: String,
    /// Tells apart queues that reused a removed queue's name
    generation: u64,
    backlog: VecDeque<J>,
    busy: bool,
}

impl<J> JobQueue<J> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            generation: 0,
            backlog: VecDeque::new(),
            busy: false,
        }
    }

    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Add a job at the tail
    pub fn append(&mut self, job: J) {
        self.backlog.push_back(job);
    }

    /// Take the job at the head
    pub fn pop(&mut self) -> Option<J> {
        self.backlog.pop_front()
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
    }

    pub fn has_next(&self) -> bool {
        !self.backlog.is_empty()
    }

    /// Number of jobs waiting
    pub fn len(&self) -> usize {
        self.backlog.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backlog.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo() {
        let mut queue = JobQueue::new("q");
        queue.append(1);
        queue.append(2);

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), None);
        assert!(!queue.has_next());
    }

    #[test]
    fn test_busy_flag_is_independent_of_backlog() {
        let mut queue: JobQueue<u32> = JobQueue::new("q");
        assert!(!queue.is_busy());

        queue.set_busy(true);
        assert!(queue.is_busy());
        assert!(queue.is_empty());
    }
}
