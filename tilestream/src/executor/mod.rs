//! Provider worker pools.
//!
//! Every provider in the chain owns a bounded [`WorkQueue`] and a
//! [`WorkerPool`] of named threads draining it. Queues drop their oldest
//! entry on overflow, which bounds the amount of queued work no matter how
//! fast the viewport scrolls.

mod pool;
mod queue;

pub use pool::{
    PoolConfig, WorkerPool, DEFAULT_ARCHIVE_THREADS, DEFAULT_NETWORK_THREADS, DEFAULT_QUEUE_SIZE,
    MAX_POOL_THREADS,
};
pub use queue::{PushOutcome, WorkQueue};
