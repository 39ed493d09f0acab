//! Lock-free work queue for distributing search terms across parallel workers

use std::sync::atomic::{AtomicUsize, Ordering};

/// Lock-free work queue distributing jobs to workers.
///
/// Workers call [`claim()`](WorkQueue::claim) to atomically take the next
/// job. Construction-time filtering supports resume: jobs whose output
/// already exists are dropped before any worker starts.
pub struct WorkQueue<J> {
    jobs: Vec<J>,
    cursor: AtomicUsize,
}

impl<J> WorkQueue<J> {
    /// Queue over all jobs, in order.
    pub fn new(jobs: Vec<J>) -> Self {
        Self {
            jobs,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Queue keeping only jobs that pass the filter (resume support).
    pub fn filtered(jobs: Vec<J>, keep: impl Fn(&J) -> bool) -> Self {
        let kept: Vec<J> = jobs.into_iter().filter(|j| keep(j)).collect();
        log::debug!("{} jobs in work queue after filtering", kept.len());
        Self {
            jobs: kept,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Claim the next job (lock-free).
    pub fn claim(&self) -> Option<&J> {
        let i = self.cursor.fetch_add(1, Ordering::Relaxed);
        self.jobs.get(i)
    }

    /// Total jobs in the queue.
    pub fn total(&self) -> usize {
        self.jobs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claims_in_order() {
        let q = WorkQueue::new(vec!["a", "b", "c"]);
        assert_eq!(q.total(), 3);
        assert_eq!(q.claim(), Some(&"a"));
        assert_eq!(q.claim(), Some(&"b"));
        assert_eq!(q.claim(), Some(&"c"));
        assert_eq!(q.claim(), None);
    }

    #[test]
    fn filtered_drops_completed() {
        let q = WorkQueue::filtered(vec![1, 2, 3, 4], |n| *n % 2 == 0);
        assert_eq!(q.total(), 2);
        assert_eq!(q.claim(), Some(&2));
        assert_eq!(q.claim(), Some(&4));
        assert_eq!(q.claim(), None);
    }

    #[test]
    fn empty_queue() {
        let q: WorkQueue<u32> = WorkQueue::new(vec![]);
        assert_eq!(q.total(), 0);
        assert_eq!(q.claim(), None);
    }
}
