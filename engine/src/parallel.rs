//! Rayon thread pool sizing for trial fan-out.

use rayon::ThreadPoolBuilder;

use crate::error::SimError;

/// How many worker threads run trials.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerPool {
    /// Number of worker threads. If 0, use the global Rayon pool (all cores).
    pub workers: usize,
}

impl WorkerPool {
    pub fn with_workers(n: usize) -> Self {
        Self { workers: n }
    }

    /// Run `f` on a pool of this size. With `workers == 0` it runs on the global
    /// pool; otherwise a temporary pool is built for the call.
    pub fn install<F, R>(&self, f: F) -> Result<R, SimError>
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        if self.workers == 0 {
            return Ok(f());
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("trial-worker-{}", i))
            .build()
            .map_err(|e| SimError::ThreadPool(e.to_string()))?;
        Ok(pool.install(f))
    }
}
