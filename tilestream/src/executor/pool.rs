//! Fixed-size worker thread pools.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use super::queue::WorkQueue;

/// Upper bound on worker threads per pool.
pub const MAX_POOL_THREADS: usize = 8;

/// Default worker threads for archive (filesystem) providers.
pub const DEFAULT_ARCHIVE_THREADS: usize = 8;

/// Default worker threads for network providers.
pub const DEFAULT_NETWORK_THREADS: usize = 2;

/// Default bound of each provider queue.
pub const DEFAULT_QUEUE_SIZE: usize = 40;

/// Thread count and queue bound of one provider pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub threads: usize,
    pub queue_size: usize,
}

impl PoolConfig {
    /// Build a config, clamping threads to `1..=MAX_POOL_THREADS` and the
    /// queue to at least one slot.
    pub fn new(threads: usize, queue_size: usize) -> Self {
        Self {
            threads: threads.clamp(1, MAX_POOL_THREADS),
            queue_size: queue_size.max(1),
        }
    }

    /// Defaults for filesystem-backed providers.
    pub fn archive() -> Self {
        Self::new(DEFAULT_ARCHIVE_THREADS, DEFAULT_QUEUE_SIZE)
    }

    /// Defaults for network providers.
    pub fn network() -> Self {
        Self::new(DEFAULT_NETWORK_THREADS, DEFAULT_QUEUE_SIZE)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::network()
    }
}

/// Named threads draining one [`WorkQueue`].
///
/// Workers exit when the queue is closed and empty; [`join`](Self::join)
/// waits for them.
pub struct WorkerPool {
    name: String,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `threads` workers that call `handler` for every item popped from
    /// `queue`.
    ///
    /// # Errors
    ///
    /// Returns the OS error if a thread cannot be spawned. The queue is
    /// closed in that case so already started workers exit.
    pub fn spawn<T, F>(
        name: &str,
        threads: usize,
        queue: Arc<WorkQueue<T>>,
        handler: F,
    ) -> std::io::Result<Self>
    where
        T: Send + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        let threads = threads.clamp(1, MAX_POOL_THREADS);
        let mut handles = Vec::with_capacity(threads);

        for index in 0..threads {
            let worker_queue = Arc::clone(&queue);
            let handler = Arc::clone(&handler);
            let spawned = thread::Builder::new()
                .name(format!("{}-{}", name, index))
                .spawn(move || {
                    while let Some(item) = worker_queue.pop_blocking() {
                        handler(item);
                    }
                });

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    queue.close();
                    for handle in handles {
                        let _ = handle.join();
                    }
                    return Err(e);
                }
            }
        }

        debug!(pool = name, threads, "Worker pool started");
        Ok(Self {
            name: name.to_string(),
            handles,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn threads(&self) -> usize {
        self.handles.len()
    }

    /// Wait for every worker to exit. Close the queue first.
    pub fn join(self) {
        for handle in self.handles {
            if handle.join().is_err() {
                warn!(pool = %self.name, "Worker thread panicked");
            }
        }
        debug!(pool = %self.name, "Worker pool stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_pool_config_clamps() {
        assert_eq!(PoolConfig::new(0, 0), PoolConfig { threads: 1, queue_size: 1 });
        assert_eq!(PoolConfig::new(32, 10).threads, MAX_POOL_THREADS);
        assert_eq!(PoolConfig::archive(), PoolConfig { threads: 8, queue_size: 40 });
        assert_eq!(PoolConfig::network(), PoolConfig { threads: 2, queue_size: 40 });
    }

    #[test]
    fn test_pool_processes_all_items() {
        let queue = Arc::new(WorkQueue::new(100));
        let processed = Arc::new(AtomicUsize::new(0));

        let pool = {
            let processed = Arc::clone(&processed);
            WorkerPool::spawn("test", 3, Arc::clone(&queue), move |n: usize| {
                processed.fetch_add(n, Ordering::SeqCst);
            })
            .unwrap()
        };
        assert_eq!(pool.threads(), 3);

        for _ in 0..50 {
            queue.push(1);
        }
        while !queue.is_empty() {
            thread::yield_now();
        }
        queue.close();
        pool.join();

        assert_eq!(processed.load(Ordering::SeqCst), 50);
    }

    #[test]
    fn test_all_workers_drain_the_shared_queue() {
        let queue = Arc::new(WorkQueue::new(8));
        // Every item blocks until four workers hold one at the same time
        let barrier = Arc::new(std::sync::Barrier::new(5));

        let pool = {
            let barrier = Arc::clone(&barrier);
            WorkerPool::spawn("shared", 4, Arc::clone(&queue), move |_: u8| {
                barrier.wait();
            })
            .unwrap()
        };

        for item in 0..4 {
            queue.push(item);
        }
        barrier.wait();

        assert!(queue.close().is_empty());
        pool.join();
    }

    #[test]
    fn test_workers_are_named() {
        let queue = Arc::new(WorkQueue::new(4));
        let (tx, rx) = std::sync::mpsc::channel();

        let pool = WorkerPool::spawn("named", 1, Arc::clone(&queue), move |_: ()| {
            let name = thread::current().name().map(str::to_string);
            let _ = tx.send(name);
        })
        .unwrap();

        queue.push(());
        let name = rx.recv().unwrap();
        assert_eq!(name.as_deref(), Some("named-0"));

        queue.close();
        pool.join();
    }
}
