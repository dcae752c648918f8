//! Prioritized fire-and-forget jobs on a rayon pool with a completion barrier.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::BakeResult;

pub type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct Outstanding {
    counts: Mutex<BTreeMap<u32, usize>>,
    done: Condvar,
}

impl Outstanding {
    fn lock(&self) -> MutexGuard<'_, BTreeMap<u32, usize>> {
        self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pending(counts: &BTreeMap<u32, usize>, priority: u32) -> usize {
        counts.range(priority..).map(|(_, n)| *n).sum()
    }
}

/// Decrements the outstanding count when the job ends, even by unwinding.
struct Completion {
    outstanding: Arc<Outstanding>,
    priority: u32,
}

impl Drop for Completion {
    fn drop(&mut self) {
        let mut counts = self.outstanding.lock();
        if let Some(count) = counts.get_mut(&self.priority) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                counts.remove(&self.priority);
            }
        }
        self.outstanding.done.notify_all();
    }
}

pub struct WorkQueue {
    pool: ThreadPool,
    outstanding: Arc<Outstanding>,
}

impl WorkQueue {
    /// Pool with `threads` workers, 0 for rayon's default.
    pub fn new(threads: usize) -> BakeResult<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|index| format!("glint-worker-{}", index))
            .build()?;
        log::debug!("Work queue: {} threads", pool.current_num_threads());
        Ok(Self {
            pool,
            outstanding: Arc::new(Outstanding::default()),
        })
    }

    pub fn thread_count(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn add_work_item<F>(&self, priority: u32, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        *self.outstanding.lock().entry(priority).or_insert(0) += 1;

        let guard = Completion {
            outstanding: Arc::clone(&self.outstanding),
            priority,
        };
        let job: Job = Box::new(job);
        self.pool.spawn(move || {
            let _guard = guard;
            if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                log::error!("Work item with priority {} panicked", priority);
            }
        });
    }

    /// Block until no item with priority `>= priority` is outstanding.
    pub fn complete(&self, priority: u32) {
        let mut counts = self.outstanding.lock();
        while Outstanding::pending(&counts, priority) > 0 {
            counts = self
                .outstanding
                .done
                .wait(counts)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Outstanding items with priority `>= priority`.
    pub fn num_incomplete(&self, priority: u32) -> usize {
        Outstanding::pending(&self.outstanding.lock(), priority)
    }

    pub fn is_completed(&self, priority: u32) -> bool {
        self.num_incomplete(priority) == 0
    }
}
