//! Provider chain scheduling.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use super::state::{RequestState, RequestStatus, TileError};
use crate::cache::TileCache;
use crate::coord::TileKey;
use crate::delivery::{DeliverySink, TileCallback, TileOutcome};
use crate::executor::{PoolConfig, PushOutcome, WorkQueue, WorkerPool};
use crate::provider::{FetchError, TileProvider};
use crate::tile::TileImage;

/// One provider with its own bounded queue.
struct Stage {
    provider: Arc<dyn TileProvider>,
    queue: Arc<WorkQueue<TileKey>>,
}

/// How a request ended.
enum Completion {
    Loaded(TileImage),
    /// Every applicable provider was tried.
    Exhausted,
    Failed(TileError),
}

/// State shared between the chain handle and its workers.
struct ChainShared {
    cache: Arc<TileCache>,
    stages: Vec<Stage>,
    in_flight: DashMap<TileKey, RequestState>,
    sink: DeliverySink,
    active: AtomicUsize,
}

/// Ordered list of providers, each drained by its own worker pool.
///
/// A request that misses the cache enters the first provider that supports
/// its zoom. When a provider fails, the key moves on to the next one; the
/// first success is delivered and the request ends. Requests for a key that
/// is already in flight join the existing request instead of fetching again.
///
/// # Queues
///
/// Each provider queue is bounded. When it is full the oldest waiting key is
/// displaced and its consumers receive [`TileError::Dropped`], so the most
/// recent requests win.
///
/// # Example
///
/// ```ignore
/// let (sink, mut receiver) = delivery_channel();
/// let chain = ProviderChain::new(cache, vec![(archive, PoolConfig::archive())], sink)?;
/// chain.request(TileKey::new("osm", 3, 2, 1), Box::new(|outcome| { /* ui thread */ }));
/// receiver.dispatch_blocking();
/// ```
pub struct ProviderChain {
    shared: Arc<ChainShared>,
    pools: Mutex<Vec<WorkerPool>>,
    shut_down: AtomicBool,
}

impl ProviderChain {
    /// Build the chain and start one worker pool per provider.
    ///
    /// # Arguments
    ///
    /// * `cache` - Consulted before any provider is queued
    /// * `providers` - Providers in priority order, each with its pool sizing
    /// * `sink` - Where outcomes and loading notifications are posted
    ///
    /// # Errors
    ///
    /// Returns the OS error if a worker thread cannot be spawned. Pools that
    /// were already started are stopped.
    pub fn new(
        cache: Arc<TileCache>,
        providers: Vec<(Arc<dyn TileProvider>, PoolConfig)>,
        sink: DeliverySink,
    ) -> std::io::Result<Self> {
        let configs: Vec<PoolConfig> = providers.iter().map(|(_, config)| *config).collect();
        let stages = providers
            .into_iter()
            .map(|(provider, config)| Stage {
                provider,
                queue: Arc::new(WorkQueue::new(config.queue_size)),
            })
            .collect();

        let shared = Arc::new(ChainShared {
            cache,
            stages,
            in_flight: DashMap::new(),
            sink,
            active: AtomicUsize::new(0),
        });

        let mut pools = Vec::with_capacity(configs.len());
        for (index, config) in configs.iter().enumerate() {
            let stage = &shared.stages[index];
            let worker = Arc::clone(&shared);
            let name = format!("tilestream-{}", stage.provider.name());
            match WorkerPool::spawn(&name, config.threads, Arc::clone(&stage.queue), move |key: TileKey| {
                worker.run(index, key)
            }) {
                Ok(pool) => pools.push(pool),
                Err(e) => {
                    for stage in &shared.stages {
                        stage.queue.close();
                    }
                    for pool in pools {
                        pool.join();
                    }
                    return Err(e);
                }
            }
        }

        info!(
            providers = shared.stages.len(),
            names = ?shared.stages.iter().map(|s| s.provider.name()).collect::<Vec<_>>(),
            "Provider chain started"
        );

        Ok(Self {
            shared,
            pools: Mutex::new(pools),
            shut_down: AtomicBool::new(false),
        })
    }

    /// Ask for a tile. `callback` runs exactly once, on the delivery thread.
    ///
    /// Cache hits are delivered without touching any provider. Invalid keys,
    /// an empty chain, and requests after shutdown are answered with the
    /// matching [`TileError`].
    pub fn request(&self, key: TileKey, callback: TileCallback) {
        let shared = &self.shared;

        if let Err(e) = key.validate() {
            debug!(tile = %key, error = %e, "Rejecting invalid tile key");
            shared.sink.deliver(key, Err(TileError::InvalidKey(e)), vec![callback]);
            return;
        }
        if self.is_shut_down() {
            shared.sink.deliver(key, Err(TileError::ShuttingDown), vec![callback]);
            return;
        }
        if let Some(hit) = shared.cache.get(&key) {
            trace!(tile = %key, provenance = hit.provenance().as_str(), "Cache hit");
            shared.sink.deliver(key, Ok(hit), vec![callback]);
            return;
        }
        if shared.stages.is_empty() {
            shared.sink.deliver(key, Err(TileError::NoProviders), vec![callback]);
            return;
        }

        let first = match shared.in_flight.entry(key.clone()) {
            Entry::Occupied(mut existing) => {
                trace!(tile = %key, "Joining in-flight request");
                existing.get_mut().consumers.push(callback);
                return;
            }
            Entry::Vacant(slot) => {
                // Counted before the state becomes visible so finish() never
                // sees an uncounted request
                let first = shared.active.fetch_add(1, Ordering::SeqCst) == 0;
                slot.insert(RequestState::new(callback));
                first
            }
        };
        if first {
            shared.sink.loading_started();
        }

        // A fetch may have landed between the cache miss and the insert
        if let Some(hit) = shared.cache.get_from_memory(&key) {
            shared.finish(&key, Completion::Loaded(hit));
            return;
        }

        shared.dispatch(key, 0);
    }

    /// Number of keys currently queued or being fetched.
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.len()
    }

    pub fn is_loading(&self) -> bool {
        self.shared.active.load(Ordering::SeqCst) > 0
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.shared
            .stages
            .iter()
            .map(|s| s.provider.name().to_string())
            .collect()
    }

    pub fn cache(&self) -> &Arc<TileCache> {
        &self.shared.cache
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Stop accepting work, fail everything still waiting with
    /// [`TileError::ShuttingDown`], and join the workers.
    ///
    /// Fetches already running complete and are delivered normally.
    /// Idempotent.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let shared = &self.shared;

        let mut cancelled = 0usize;
        for stage in &shared.stages {
            for key in stage.queue.close() {
                shared.finish(&key, Completion::Failed(TileError::ShuttingDown));
                cancelled += 1;
            }
        }

        let pools = std::mem::take(&mut *self.pools.lock());
        for pool in pools {
            pool.join();
        }

        let stragglers: Vec<TileKey> = shared.in_flight.iter().map(|e| e.key().clone()).collect();
        for key in stragglers {
            shared.finish(&key, Completion::Failed(TileError::ShuttingDown));
            cancelled += 1;
        }

        info!(cancelled, "Provider chain stopped");
    }
}

impl Drop for ProviderChain {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl ChainShared {
    /// Queue `key` on the first provider at or after `from` that supports it,
    /// or finish the request if none is left.
    fn dispatch(&self, key: TileKey, from: usize) {
        let next = self
            .stages
            .iter()
            .enumerate()
            .skip(from)
            .find(|(_, stage)| stage.provider.supports(&key))
            .map(|(index, _)| index);

        let Some(index) = next else {
            self.finish(&key, Completion::Exhausted);
            return;
        };

        {
            let Some(mut state) = self.in_flight.get_mut(&key) else {
                return;
            };
            state.status = RequestStatus::Queued { provider: index };
            state.provider_index = index;
        }

        let stage = &self.stages[index];
        match stage.queue.push(key) {
            PushOutcome::Accepted => {}
            PushOutcome::Displaced(old) => {
                debug!(tile = %old, provider = stage.provider.name(), "Queue full, dropping oldest request");
                self.finish(&old, Completion::Failed(TileError::Dropped));
            }
            PushOutcome::Rejected(key) => {
                self.finish(&key, Completion::Failed(TileError::ShuttingDown));
            }
        }
    }

    /// Worker body for provider `index`.
    fn run(&self, index: usize, key: TileKey) {
        {
            let Some(mut state) = self.in_flight.get_mut(&key) else {
                return;
            };
            state.status = RequestStatus::InProgress { provider: index };
            state.attempts += 1;
        }

        let provider = &self.stages[index].provider;
        // A panicking provider counts as a failed attempt; the worker survives
        let result = panic::catch_unwind(AssertUnwindSafe(|| provider.fetch(&key)))
            .unwrap_or_else(|payload| {
                let message = panic_message(payload.as_ref());
                warn!(tile = %key, provider = provider.name(), message = %message, "Provider panicked");
                Err(FetchError::Panicked {
                    provider: provider.name().to_string(),
                    message,
                })
            });

        match result {
            Ok(tile) => self.finish(&key, Completion::Loaded(tile)),
            Err(e) => {
                debug!(tile = %key, provider = provider.name(), error = %e, "Provider failed, trying next");
                {
                    let Some(mut state) = self.in_flight.get_mut(&key) else {
                        return;
                    };
                    state.last_error = Some(e);
                }
                self.dispatch(key, index + 1);
            }
        }
    }

    /// Retire the request for `key` and post its outcome to every consumer.
    fn finish(&self, key: &TileKey, completion: Completion) {
        let Some((key, mut state)) = self.in_flight.remove(key) else {
            return;
        };

        let outcome: TileOutcome = match completion {
            Completion::Loaded(tile) => Ok(tile),
            Completion::Exhausted => Err(TileError::AllProvidersFailed {
                attempts: state.attempts,
                last: state.last_error.take(),
            }),
            Completion::Failed(e) => Err(e),
        };

        state.status = if outcome.is_ok() {
            RequestStatus::Done
        } else {
            RequestStatus::Failed
        };
        match &outcome {
            Ok(tile) => trace!(
                tile = %key,
                provenance = tile.provenance().as_str(),
                consumers = state.consumers.len(),
                "Request complete"
            ),
            Err(TileError::AllProvidersFailed { .. }) => {
                warn!(tile = %key, attempts = state.attempts, "No provider could load tile")
            }
            Err(e) => debug!(tile = %key, status = ?state.status, error = %e, "Request ended"),
        }

        self.sink.deliver(key, outcome, state.consumers);
        if self.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.sink.loading_finished();
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
