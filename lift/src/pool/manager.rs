//! Named-pool aggregation: pre-warming, fleet health checks, shutdown

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;

use crate::error::{LiftError, Result};

use super::{Pool, PoolStats, ResourceFactory};

/// Type-erased pool surface the manager operates on
#[async_trait]
pub trait ManagedPool: Send + Sync {
    fn name(&self) -> &str;
    async fn pre_warm(&self) -> Result<()>;
    async fn health_check(&self) -> Result<()>;
    async fn close(&self);
    async fn stats(&self) -> PoolStats;
}

#[async_trait]
impl<F: ResourceFactory> ManagedPool for Pool<F> {
    fn name(&self) -> &str {
        Pool::name(self)
    }

    async fn pre_warm(&self) -> Result<()> {
        Pool::pre_warm(self).await
    }

    async fn health_check(&self) -> Result<()> {
        Pool::health_check(self).await
    }

    async fn close(&self) {
        Pool::close(self).await
    }

    async fn stats(&self) -> PoolStats {
        Pool::stats(self).await
    }
}

/// Aggregates named pools under one lifecycle
#[derive(Default)]
pub struct PoolManager {
    pools: RwLock<HashMap<String, Arc<dyn ManagedPool>>>,
}

impl PoolManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pool under its own name
    pub fn register(&self, pool: Arc<dyn ManagedPool>) {
        self.pools
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(pool.name().to_string(), pool);
    }

    /// Fetch a pool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn ManagedPool>> {
        self.pools
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    /// Registered pool names
    pub fn names(&self) -> Vec<String> {
        self.pools
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    fn snapshot(&self) -> Vec<Arc<dyn ManagedPool>> {
        self.pools
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    /// Pre-warm every pool that asks for it, in parallel
    ///
    /// The first failure is reported; remaining pools still get their
    /// warm-up attempt.
    pub async fn pre_warm_all(&self) -> Result<()> {
        let pools = self.snapshot();
        let results = join_all(pools.iter().map(|pool| pool.pre_warm())).await;
        for (pool, result) in pools.iter().zip(results) {
            if let Err(err) = result {
                return Err(
                    LiftError::system(format!("pre-warm of pool {} failed", pool.name()))
                        .with_cause(err),
                );
            }
        }
        Ok(())
    }

    /// Health-check every pool in parallel, reporting per-pool outcomes
    pub async fn health_check_all(&self) -> HashMap<String, Result<()>> {
        let pools = self.snapshot();
        let results = join_all(pools.iter().map(|pool| pool.health_check())).await;
        pools
            .iter()
            .map(|pool| pool.name().to_string())
            .zip(results)
            .collect()
    }

    /// Aggregate stats keyed by pool name
    pub async fn stats_all(&self) -> HashMap<String, PoolStats> {
        let pools = self.snapshot();
        let results = join_all(pools.iter().map(|pool| pool.stats())).await;
        pools
            .iter()
            .map(|pool| pool.name().to_string())
            .zip(results)
            .collect()
    }

    /// Close every pool, bounding each close by `per_pool_timeout`
    ///
    /// Pools that fail to close in time are reported in the error; the rest
    /// still shut down.
    pub async fn shutdown(&self, per_pool_timeout: Duration) -> Result<()> {
        let pools = self.snapshot();
        let mut stragglers = Vec::new();
        let closes = pools.iter().map(|pool| async {
            tokio::time::timeout(per_pool_timeout, pool.close())
                .await
                .map_err(|_| pool.name().to_string())
        });
        for result in join_all(closes).await {
            if let Err(name) = result {
                stragglers.push(name);
            }
        }
        if stragglers.is_empty() {
            Ok(())
        } else {
            Err(LiftError::timeout(format!(
                "pools did not close in time: {}",
                stragglers.join(", ")
            )))
        }
    }
}
