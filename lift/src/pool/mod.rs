//! Bounded resource pool with idle, lifetime and health eviction
//!
//! A [`Pool`] owns its idle set exclusively; `get` transfers ownership of a
//! resource to the caller until `put`. Resource creation happens outside the
//! state lock so factory I/O never serializes the pool, and a background
//! cleanup task evicts idle resources that age out or fail their health
//! check.

pub mod manager;

pub use manager::{ManagedPool, PoolManager};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;

use crate::error::{LiftError, Result};

/// Deadline applied to each individual resource health check
const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// A poolable resource
#[async_trait]
pub trait PoolResource: Send + Sync + 'static {
    /// Stable identity used for active-set tracking
    fn id(&self) -> &str;

    /// Cheap local liveness check
    fn is_valid(&self) -> bool;

    /// Release underlying handles
    async fn close(&mut self);
}

/// Creates and checks resources for one pool
#[async_trait]
pub trait ResourceFactory: Send + Sync + 'static {
    type Resource: PoolResource;

    /// Create and initialize a new resource
    async fn create(&self) -> Result<Self::Resource>;

    /// Deeper validity check run on checkout
    async fn validate(&self, resource: &Self::Resource) -> bool;

    /// Health probe run by the background cleanup task
    async fn health_check(&self, resource: &Self::Resource) -> Result<()>;
}

/// Pool tuning
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Idle resources the pre-warmer establishes
    pub min_idle: usize,
    /// Hard cap on checked-out plus in-creation resources
    pub max_active: usize,
    /// Idle resources retained on `put`
    pub max_idle: usize,
    /// Idle age beyond which a resource is evicted
    pub idle_timeout: Duration,
    /// Total age beyond which a resource is evicted
    pub max_lifetime: Duration,
    /// How long `get` may wait for capacity
    pub get_timeout: Duration,
    /// Cleanup task period
    pub health_check_interval: Duration,
    /// Whether the manager pre-warms this pool
    pub pre_warm: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_idle: 2,
            max_active: 10,
            max_idle: 5,
            idle_timeout: Duration::from_secs(300),
            max_lifetime: Duration::from_secs(3600),
            get_timeout: Duration::from_secs(5),
            health_check_interval: Duration::from_secs(30),
            pre_warm: false,
        }
    }
}

/// Aggregate pool counters
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    pub gets: u64,
    pub puts: u64,
    pub hits: u64,
    pub misses: u64,
    pub timeouts: u64,
    pub errors: u64,
    /// Resources created over the pool's lifetime
    pub total: u64,
    pub idle_count: usize,
    pub active_count: usize,
}

struct IdleEntry<R> {
    resource: R,
    created_at: Instant,
    last_used: Instant,
}

struct ActiveMeta {
    created_at: Instant,
}

struct PoolState<R> {
    idle: Vec<IdleEntry<R>>,
    active: HashMap<String, ActiveMeta>,
    /// Creations in flight, counted toward capacity
    creating: usize,
    closed: bool,
    stats: PoolStats,
}

/// Bounded pool of reusable resources
pub struct Pool<F: ResourceFactory> {
    name: String,
    factory: Arc<F>,
    config: PoolConfig,
    state: Mutex<PoolState<F::Resource>>,
    waiters: Notify,
    cancel: CancellationToken,
}

impl<F: ResourceFactory> Pool<F> {
    /// Create the pool and start its background cleanup task
    pub fn new(name: impl Into<String>, factory: F, config: PoolConfig) -> Arc<Self> {
        let pool = Arc::new(Self {
            name: name.into(),
            factory: Arc::new(factory),
            config,
            state: Mutex::new(PoolState {
                idle: Vec::new(),
                active: HashMap::new(),
                creating: 0,
                closed: false,
                stats: PoolStats::default(),
            }),
            waiters: Notify::new(),
            cancel: CancellationToken::new(),
        });

        let cleanup = pool.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(cleanup.config.health_check_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; skip it.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => cleanup.evict_stale().await,
                    _ = cleanup.cancel.cancelled() => break,
                }
            }
        });

        pool
    }

    /// Pool name used in errors and manager reports
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check out a resource
    ///
    /// Tries the idle set first (`hits`), creates under capacity (`misses`,
    /// with the state lock released around factory I/O), and otherwise
    /// waits for a `put` up to `get_timeout` before failing
    /// `POOL_EXHAUSTED` (`timeouts`). Never blocks past the deadline.
    pub async fn get(&self) -> Result<F::Resource> {
        let deadline = Instant::now() + self.config.get_timeout;
        {
            let mut state = self.state.lock().await;
            state.stats.gets += 1;
        }

        loop {
            match self.try_acquire().await? {
                Some(resource) => return Ok(resource),
                None => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        let mut state = self.state.lock().await;
                        state.stats.timeouts += 1;
                        return Err(LiftError::pool_exhausted(&self.name));
                    }
                    let _ = tokio::time::timeout(remaining, self.waiters.notified()).await;
                    let mut state = self.state.lock().await;
                    if state.closed {
                        return Err(LiftError::pool_closed(&self.name));
                    }
                    if deadline.saturating_duration_since(Instant::now()).is_zero() {
                        state.stats.timeouts += 1;
                        return Err(LiftError::pool_exhausted(&self.name));
                    }
                }
            }
        }
    }

    async fn try_acquire(&self) -> Result<Option<F::Resource>> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(LiftError::pool_closed(&self.name));
        }

        while let Some(entry) = state.idle.pop() {
            let stale = self.expired(&entry)
                || !entry.resource.is_valid()
                || !self.factory.validate(&entry.resource).await;
            if stale {
                let mut resource = entry.resource;
                resource.close().await;
                continue;
            }
            let id = entry.resource.id().to_string();
            state.active.insert(
                id,
                ActiveMeta {
                    created_at: entry.created_at,
                },
            );
            state.stats.hits += 1;
            return Ok(Some(entry.resource));
        }

        if state.active.len() + state.creating >= self.config.max_active {
            return Ok(None);
        }

        // Reserve the slot, then create without holding the lock so slow
        // factory I/O cannot serialize other callers.
        state.creating += 1;
        drop(state);

        let created = self.factory.create().await;

        let mut state = self.state.lock().await;
        state.creating -= 1;
        match created {
            Ok(resource) => {
                if state.closed {
                    let mut resource = resource;
                    resource.close().await;
                    return Err(LiftError::pool_closed(&self.name));
                }
                state.active.insert(
                    resource.id().to_string(),
                    ActiveMeta {
                        created_at: Instant::now(),
                    },
                );
                state.stats.misses += 1;
                state.stats.total += 1;
                Ok(Some(resource))
            }
            Err(err) => {
                state.stats.errors += 1;
                Err(err)
            }
        }
    }

    /// Return a checked-out resource
    ///
    /// Valid resources under the idle cap go back to the idle set;
    /// everything else is closed. Waiters are woken either way.
    pub async fn put(&self, resource: F::Resource) {
        let mut state = self.state.lock().await;
        let meta = state.active.remove(resource.id());
        state.stats.puts += 1;

        let created_at = meta.map(|m| m.created_at).unwrap_or_else(Instant::now);
        let over_lifetime = created_at.elapsed() > self.config.max_lifetime;
        let keep = !state.closed
            && resource.is_valid()
            && !over_lifetime
            && state.idle.len() < self.config.max_idle;

        if keep {
            state.idle.push(IdleEntry {
                resource,
                created_at,
                last_used: Instant::now(),
            });
        } else {
            let mut resource = resource;
            resource.close().await;
        }
        drop(state);
        self.waiters.notify_one();
    }

    fn expired(&self, entry: &IdleEntry<F::Resource>) -> bool {
        entry.created_at.elapsed() > self.config.max_lifetime
            || entry.last_used.elapsed() > self.config.idle_timeout
    }

    /// One eviction pass over the idle set
    ///
    /// Drops resources past their lifetime or idle timeout and those that
    /// fail a deadline-bounded health check.
    pub async fn evict_stale(&self) {
        let mut state = self.state.lock().await;
        if state.closed {
            return;
        }
        let entries = std::mem::take(&mut state.idle);
        let mut kept = Vec::with_capacity(entries.len());
        for entry in entries {
            if self.expired(&entry) || !entry.resource.is_valid() {
                let mut resource = entry.resource;
                resource.close().await;
                continue;
            }
            let healthy = matches!(
                tokio::time::timeout(
                    HEALTH_CHECK_TIMEOUT,
                    self.factory.health_check(&entry.resource),
                )
                .await,
                Ok(Ok(()))
            );
            if healthy {
                kept.push(entry);
            } else {
                let mut resource = entry.resource;
                resource.close().await;
            }
        }
        state.idle = kept;
    }

    /// Establish `min_idle` warm resources
    ///
    /// Checks out `min_idle` resources and immediately returns them,
    /// leaving a warm idle set behind.
    pub async fn pre_warm(&self) -> Result<()> {
        if !self.config.pre_warm {
            return Ok(());
        }
        let mut warmed = Vec::with_capacity(self.config.min_idle);
        for _ in 0..self.config.min_idle {
            warmed.push(self.get().await?);
        }
        for resource in warmed {
            self.put(resource).await;
        }
        Ok(())
    }

    /// Verify the pool is open; runs an eviction pass as a side effect
    pub async fn health_check(&self) -> Result<()> {
        {
            let state = self.state.lock().await;
            if state.closed {
                return Err(LiftError::pool_closed(&self.name));
            }
        }
        self.evict_stale().await;
        Ok(())
    }

    /// Close the pool: stop cleanup, close idle resources, wake waiters
    ///
    /// Checked-out resources are owned by their callers; they are closed
    /// when returned to the (now closed) pool.
    pub async fn close(&self) {
        self.cancel.cancel();
        let mut state = self.state.lock().await;
        if state.closed {
            return;
        }
        state.closed = true;
        let entries = std::mem::take(&mut state.idle);
        for entry in entries {
            let mut resource = entry.resource;
            resource.close().await;
        }
        state.active.clear();
        drop(state);
        self.waiters.notify_waiters();
    }

    /// Counter and size snapshot
    pub async fn stats(&self) -> PoolStats {
        let state = self.state.lock().await;
        let mut stats = state.stats.clone();
        stats.idle_count = state.idle.len();
        stats.active_count = state.active.len();
        stats
    }

    /// Whether `close` has run
    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }
}
