use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use hive_core::{HiveError, HiveResult};

/// A unit of work handed to a [`TaskPool`].
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Generic parallel task submission.
///
/// Implementations run each submitted job exactly once on some worker
/// thread and mark its handle finished afterwards. No ordering of
/// completions is promised.
pub trait TaskPool: Send + Sync {
    fn submit(&self, job: Job) -> TaskHandle;

    /// Number of worker threads.
    fn size(&self) -> usize;
}

#[derive(Default)]
struct Completion {
    done: Mutex<bool>,
    cv: Condvar,
}

/// Completion notification for one submitted job.
#[derive(Clone)]
pub struct TaskHandle {
    id: u64,
    completion: Arc<Completion>,
}

impl TaskHandle {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            completion: Arc::default(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        *self
            .completion
            .done
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until the job has run.
    pub fn wait(&self) {
        let mut done = self
            .completion
            .done
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while !*done {
            done = self
                .completion
                .cv
                .wait(done)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Block until the job has run or the timeout expires; returns whether
    /// it finished.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let done = self
            .completion
            .done
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let (done, _) = self
            .completion
            .cv
            .wait_timeout_while(done, timeout, |d| !*d)
            .unwrap_or_else(PoisonError::into_inner);
        *done
    }

    /// Mark the job finished and wake waiters. Called by pool implementations.
    pub fn complete(&self) {
        let mut done = self
            .completion
            .done
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *done = true;
        self.completion.cv.notify_all();
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id)
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// [`TaskPool`] backed by a dedicated rayon thread pool.
///
/// Jobs are spawned FIFO, so with a single worker they run in
/// submission order.
pub struct RayonTaskPool {
    pool: rayon::ThreadPool,
    next_id: AtomicU64,
}

impl RayonTaskPool {
    pub fn new(num_threads: usize) -> HiveResult<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("hive-worker-{i}"))
            .build()
            .map_err(|e| HiveError::TaskPool(e.to_string()))?;
        Ok(Self {
            pool,
            next_id: AtomicU64::new(0),
        })
    }
}

impl TaskPool for RayonTaskPool {
    fn submit(&self, job: Job) -> TaskHandle {
        let handle = TaskHandle::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let notify = handle.clone();
        self.pool.spawn_fifo(move || {
            job();
            notify.complete();
        });
        handle
    }

    fn size(&self) -> usize {
        self.pool.current_num_threads()
    }
}
