//! Generalized bounded pool of heavyweight resources that each own a fixed
//! set of leaf sub-resources.
//!
//! The canonical instantiation is a browser pool: each heavyweight resource is
//! a browser process bound to a probed egress path, and each leaf is a page.
//! Callers acquire leaves; when every leaf is out, `acquire()` parks the
//! caller in a strictly-FIFO wait queue and suspends until a release (or a
//! respawn) hands a leaf over. A release always prefers the oldest waiter over
//! the free list to minimize hand-off latency.
//!
//! Crash handling is a supervised restart: a disconnection signal removes the
//! resource immediately (its outstanding leaves are void) and a replacement is
//! constructed after a cooldown. Construction walks claimable egress paths,
//! most recently validated first, and commits to the first one that passes a
//! connectivity smoke test; paths that fail the probe are terminally dead.
//! Exhausting the candidates is a logged construction failure left for the
//! next supervision cycle — never an inline retry loop.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::config::PoolConfig;
use crate::core::error::EngineError;
use crate::core::health::{EgressPath, EgressStore};
use crate::core::notify::{build_notice, SharedNotifier};
use crate::core::runner::Spawn;
use crate::util::ids::{PathId, ResourceId};

/// A pooled heavyweight resource owning leaf sub-resources.
pub trait Heavyweight: Send + Sync + 'static {
    /// The unit handed to a single caller (e.g. a page of a browser).
    type Leaf: Send + 'static;

    /// Pool-wide identity of this resource.
    fn id(&self) -> ResourceId;
}

/// Constructs heavyweight resources bound to a validated egress path.
#[async_trait]
pub trait ResourceFactory: Send + Sync + 'static {
    /// The resource type this factory builds.
    type Resource: Heavyweight;

    /// Build a resource over the given path, returning it together with its
    /// full complement of leaves.
    async fn build(
        &self,
        path: &EgressPath,
    ) -> Result<(Self::Resource, Vec<<Self::Resource as Heavyweight>::Leaf>), EngineError>;
}

/// Lightweight connectivity smoke test run against a candidate path before a
/// resource is committed to it.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync + 'static {
    /// `true` when the path answered the probe.
    async fn probe(&self, path: &EgressPath) -> bool;
}

/// A leaf checked out of the pool, tagged with its owning resource.
pub struct LeafGuard<H: Heavyweight> {
    /// The checked-out leaf.
    pub leaf: H::Leaf,
    owner: ResourceId,
}

impl<H: Heavyweight> LeafGuard<H> {
    /// Identity of the resource that owns this leaf.
    #[must_use]
    pub const fn owner(&self) -> ResourceId {
        self.owner
    }
}

struct PoolEntry<H: Heavyweight> {
    resource: Arc<H>,
    free: Vec<H::Leaf>,
    path: PathId,
}

struct PoolState<H: Heavyweight> {
    entries: Vec<PoolEntry<H>>,
    waiters: VecDeque<oneshot::Sender<LeafGuard<H>>>,
    closed: bool,
}

struct PoolInner<F: ResourceFactory, S> {
    cfg: PoolConfig,
    factory: F,
    probe: Arc<dyn ConnectivityProbe>,
    paths: Arc<dyn EgressStore>,
    spawner: S,
    state: Mutex<PoolState<F::Resource>>,
    notifier: Option<SharedNotifier>,
}

impl<F: ResourceFactory, S> PoolInner<F, S> {
    fn notify(&self, name: &str, payload: serde_json::Value) {
        if let Some(notifier) = &self.notifier {
            notifier.lock().notify(build_notice(name, payload));
        }
    }
}

/// Bounded pool of heavyweight resources with queued leaf acquisition and
/// crash-triggered respawn.
pub struct ResourcePool<F: ResourceFactory, S> {
    inner: Arc<PoolInner<F, S>>,
}

impl<F: ResourceFactory, S> Clone for ResourcePool<F, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F, S> ResourcePool<F, S>
where
    F: ResourceFactory,
    S: Spawn + Send + Sync + 'static,
{
    /// Create an empty pool. Call [`Self::init`] to bring resources up.
    pub fn new(
        cfg: PoolConfig,
        factory: F,
        probe: Arc<dyn ConnectivityProbe>,
        paths: Arc<dyn EgressStore>,
        spawner: S,
    ) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                cfg,
                factory,
                probe,
                paths,
                spawner,
                state: Mutex::new(PoolState {
                    entries: Vec::new(),
                    waiters: VecDeque::new(),
                    closed: false,
                }),
                notifier: None,
            }),
        }
    }

    /// Attach a fire-and-forget notification sink. Must be called before the
    /// pool handle is cloned or shared.
    #[must_use]
    pub fn with_notifier(mut self, notifier: SharedNotifier) -> Self {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => inner.notifier = Some(notifier),
            None => warn!("with_notifier called on a shared pool; sink ignored"),
        }
        self
    }

    /// Bring up to the configured number of resources online. Construction
    /// failures are logged and leave their slot empty for a later
    /// [`Self::respawn_missing`] pass. Returns the number built.
    pub async fn init(&self) -> Result<usize, EngineError> {
        self.fill().await
    }

    /// Refill empty slots — the scheduled supervision hook. Stops at the first
    /// construction failure (logged) rather than retrying inline; backend
    /// errors propagate. Returns the number of resources built.
    pub async fn respawn_missing(&self) -> Result<usize, EngineError> {
        self.fill().await
    }

    async fn fill(&self) -> Result<usize, EngineError> {
        let mut built = 0;
        while self.len() < self.inner.cfg.size {
            match Self::construct(&self.inner).await {
                Ok(()) => built += 1,
                Err(EngineError::ResourceCreation(reason)) => {
                    warn!(%reason, "resource construction failed; slot left empty");
                    break;
                }
                Err(err) => return Err(err),
            }
        }
        Ok(built)
    }

    /// Number of live heavyweight resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    /// Whether the pool currently holds no resources.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of leaves sitting in free lists (excludes checked-out leaves).
    #[must_use]
    pub fn free_leaves(&self) -> usize {
        self.inner
            .state
            .lock()
            .entries
            .iter()
            .map(|entry| entry.free.len())
            .sum()
    }

    /// Check a leaf out of the pool.
    ///
    /// Resolves immediately when any resource has a free leaf; otherwise the
    /// caller is parked in a strictly-FIFO wait queue and suspends until a
    /// release or respawn satisfies it.
    ///
    /// # Errors
    ///
    /// [`EngineError::PoolClosed`] when the pool is (or becomes) shut down.
    pub async fn acquire(&self) -> Result<LeafGuard<F::Resource>, EngineError> {
        let rx = {
            let mut st = self.inner.state.lock();
            if st.closed {
                return Err(EngineError::PoolClosed);
            }
            for entry in &mut st.entries {
                if let Some(leaf) = entry.free.pop() {
                    return Ok(LeafGuard {
                        leaf,
                        owner: entry.resource.id(),
                    });
                }
            }
            let (tx, rx) = oneshot::channel();
            st.waiters.push_back(tx);
            rx
        };
        rx.await.map_err(|_| EngineError::PoolClosed)
    }

    /// Check a leaf out without parking.
    ///
    /// # Errors
    ///
    /// [`EngineError::AcquisitionExhausted`] when every leaf is out — backing
    /// off is the caller's decision. [`EngineError::PoolClosed`] when shut
    /// down.
    pub fn try_acquire(&self) -> Result<LeafGuard<F::Resource>, EngineError> {
        let mut st = self.inner.state.lock();
        if st.closed {
            return Err(EngineError::PoolClosed);
        }
        for entry in &mut st.entries {
            if let Some(leaf) = entry.free.pop() {
                return Ok(LeafGuard {
                    leaf,
                    owner: entry.resource.id(),
                });
            }
        }
        Err(EngineError::AcquisitionExhausted)
    }

    /// Return a leaf to the pool.
    ///
    /// The oldest waiter, if any, receives the leaf directly — the free list
    /// is bypassed. A leaf whose owning resource has since crashed is dropped;
    /// the respawned replacement brings its own leaves.
    pub fn release(&self, guard: LeafGuard<F::Resource>) {
        let mut st = self.inner.state.lock();
        if st.closed {
            return;
        }
        let mut guard = guard;
        while let Some(waiter) = st.waiters.pop_front() {
            match waiter.send(guard) {
                Ok(()) => return,
                // Receiver gave up; try the next-oldest waiter.
                Err(returned) => guard = returned,
            }
        }
        if let Some(entry) = st
            .entries
            .iter_mut()
            .find(|entry| entry.resource.id() == guard.owner())
        {
            entry.free.push(guard.leaf);
        } else {
            debug!(owner = %guard.owner(), "released leaf of a removed resource; dropped");
        }
    }

    /// React to a resource's disconnection signal: remove it immediately
    /// (outstanding leaves become void) and schedule a replacement after the
    /// configured cooldown.
    pub fn handle_crash(&self, id: ResourceId) {
        let removed = {
            let mut st = self.inner.state.lock();
            st.entries
                .iter()
                .position(|entry| entry.resource.id() == id)
                .map(|index| st.entries.remove(index))
        };
        let Some(entry) = removed else {
            debug!(resource = %id, "crash signal for unknown resource; ignored");
            return;
        };
        warn!(
            error = %EngineError::ResourceCrash(id),
            path = %entry.path,
            "resource removed from pool; respawn scheduled"
        );
        self.inner
            .notify("resource:crashed", serde_json::json!({ "resource": id }));

        let inner = Arc::clone(&self.inner);
        self.inner.spawner.spawn(async move {
            tokio::time::sleep(inner.cfg.respawn_cooldown).await;
            match Self::construct(&inner).await {
                Ok(()) => {}
                Err(err) => {
                    warn!(error = %err, "respawn failed; slot left for the next supervision cycle");
                }
            }
        });
    }

    /// Shut down the pool: drop every resource and fail parked acquisitions.
    pub fn shutdown(&self) {
        let mut st = self.inner.state.lock();
        st.closed = true;
        st.entries.clear();
        // Dropping the senders resolves every parked `acquire()` with
        // `PoolClosed`.
        st.waiters.clear();
        info!("resource pool shut down");
    }

    /// Build one resource: select and probe an egress path, construct over
    /// the first path that answers, install the resource, and satisfy as many
    /// parked waiters as the fresh leaves allow (oldest first).
    async fn construct(inner: &Arc<PoolInner<F, S>>) -> Result<(), EngineError> {
        let candidates = inner.paths.candidates().await?;
        for candidate in candidates {
            // Another claimant may have raced us to this path.
            let Some(path) = inner.paths.begin_validation(candidate.id).await? else {
                continue;
            };
            if !inner.probe.probe(&path).await {
                inner.paths.finish_validation(path.id, false).await?;
                warn!(path = %path.id, "egress path failed probe; marked dead");
                continue;
            }
            inner.paths.finish_validation(path.id, true).await?;

            let (resource, free) = inner.factory.build(&path).await?;
            let id = resource.id();
            let leaf_count = free.len();
            if leaf_count != inner.cfg.leaves_per_resource {
                warn!(
                    resource = %id,
                    built = leaf_count,
                    configured = inner.cfg.leaves_per_resource,
                    "factory produced an unexpected leaf count"
                );
            }
            {
                let mut st = inner.state.lock();
                if st.closed {
                    return Err(EngineError::PoolClosed);
                }
                let mut entry = PoolEntry {
                    resource: Arc::new(resource),
                    free,
                    path: path.id,
                };
                while let Some(waiter) = st.waiters.pop_front() {
                    let Some(leaf) = entry.free.pop() else {
                        st.waiters.push_front(waiter);
                        break;
                    };
                    if let Err(returned) = waiter.send(LeafGuard { leaf, owner: id }) {
                        entry.free.push(returned.leaf);
                    }
                }
                st.entries.push(entry);
            }
            info!(resource = %id, path = %path.id, leaves = leaf_count, "resource online");
            inner.notify(
                "resource:online",
                serde_json::json!({ "resource": id, "path": path.id }),
            );
            return Ok(());
        }
        Err(EngineError::ResourceCreation(
            "no candidate egress path survived probing".into(),
        ))
    }
}
