// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! TTL-bounded LRU cache of user roles.
//!
//! Sits on the authorization hot path: every `Admin` permission check asks it
//! for the caller's roles.
//!
//! ## Semantics
//!
//! - Entries live for a fixed TTL from the moment they were loaded, whatever
//!   happens to the role store in the meantime. Grant/revoke become visible
//!   once the TTL runs out.
//! - Capacity is bounded; the least recently used user is evicted first.
//! - Concurrent misses for the same user share one store call. The map lock is
//!   never held across a load, so lookups for different users do not wait on
//!   each other's I/O.
//! - Failed loads are not cached.
//! - A lookup dropped mid-load hands the load to the remaining waiters, or
//!   clears the pending slot if there are none.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use tokio::sync::OnceCell;

use super::{Role, RoleSet, UserId};
use crate::storage::StoreResult;

/// Default time-to-live of a cached role set.
pub const DEFAULT_ROLE_TTL: Duration = Duration::from_secs(60);

/// Default number of users kept in the cache.
pub const DEFAULT_ROLE_CAPACITY: usize = 20;

/// External source of truth for role assignments.
#[async_trait]
pub trait RoleStore: Send + Sync {
    /// Current roles of a user. A user without roles yields an empty set.
    async fn roles_for(&self, user_id: &UserId) -> StoreResult<RoleSet>;

    /// Assign a role. Granting a role the user already holds is a no-op.
    async fn grant_role(&self, user_id: &UserId, role: &Role) -> StoreResult<()>;

    /// Remove a role. Returns `false` if the user did not hold it.
    async fn revoke_role(&self, user_id: &UserId, role: &Role) -> StoreResult<bool>;
}

type LoadCell = Arc<OnceCell<Arc<RoleSet>>>;

struct CacheEntry {
    roles: Arc<RoleSet>,
    loaded_at: Instant,
}

struct Inner {
    entries: LruCache<UserId, CacheEntry>,
    in_flight: HashMap<UserId, LoadCell>,
}

/// Clears the pending slot of a lookup dropped while its load was running.
struct PendingLoad<'a> {
    inner: &'a Mutex<Inner>,
    user_id: &'a UserId,
    cell: &'a LoadCell,
    armed: bool,
}

impl Drop for PendingLoad<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        // Held by the map and this lookup only: nobody else will finish it.
        let abandoned = inner.in_flight.get(self.user_id).is_some_and(|current| {
            Arc::ptr_eq(current, self.cell)
                && !current.initialized()
                && Arc::strong_count(current) == 2
        });
        if abandoned {
            inner.in_flight.remove(self.user_id);
        }
    }
}

/// Shared role cache in front of a [`RoleStore`].
pub struct RoleCache {
    inner: Mutex<Inner>,
    store: Arc<dyn RoleStore>,
    ttl: Duration,
}

impl RoleCache {
    /// Create a new cache with the given capacity and TTL.
    ///
    /// - `capacity`: Max number of users to cache (at least 1).
    /// - `ttl`: Time-to-live for each entry.
    pub fn new(store: Arc<dyn RoleStore>, capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
                in_flight: HashMap::new(),
            }),
            store,
            ttl,
        }
    }

    pub fn with_defaults(store: Arc<dyn RoleStore>) -> Self {
        Self::new(store, DEFAULT_ROLE_CAPACITY, DEFAULT_ROLE_TTL)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // The guarded maps stay consistent even if a holder panicked.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Roles of `user_id`, loading them from the store on a miss or after
    /// expiry.
    pub async fn roles(&self, user_id: &UserId) -> StoreResult<Arc<RoleSet>> {
        let cell = {
            let mut inner = self.lock();

            let fresh = match inner.entries.get(user_id) {
                Some(entry) if entry.loaded_at.elapsed() < self.ttl => Some(entry.roles.clone()),
                Some(_) => None,
                None => None,
            };
            if let Some(roles) = fresh {
                return Ok(roles);
            }
            inner.entries.pop(user_id);

            inner.in_flight.entry(user_id.clone()).or_default().clone()
        };

        // Whoever initializes the cell runs the load; everyone else waits on
        // it. If the initializing request is dropped, the next waiter takes
        // over.
        let mut pending = PendingLoad {
            inner: &self.inner,
            user_id,
            cell: &cell,
            armed: true,
        };
        let loaded = cell
            .get_or_try_init(|| async {
                tracing::debug!(user_id = %user_id, "Loading roles");
                self.store.roles_for(user_id).await.map(Arc::new)
            })
            .await
            .map(Arc::clone);
        pending.armed = false;

        let mut inner = self.lock();
        let owns_slot = inner
            .in_flight
            .get(user_id)
            .is_some_and(|current| Arc::ptr_eq(current, &cell));

        match loaded {
            Ok(roles) => {
                if owns_slot {
                    inner.in_flight.remove(user_id);
                    inner.entries.put(
                        user_id.clone(),
                        CacheEntry {
                            roles: roles.clone(),
                            loaded_at: Instant::now(),
                        },
                    );
                }
                Ok(roles)
            }
            Err(e) => {
                if owns_slot {
                    inner.in_flight.remove(user_id);
                }
                Err(e)
            }
        }
    }

    /// Whether `user_id` currently holds the administrator role.
    pub async fn is_admin(&self, user_id: &UserId) -> StoreResult<bool> {
        Ok(self.roles(user_id).await?.is_admin())
    }

    /// Number of cached (possibly expired) entries.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    fn in_flight_len(&self) -> usize {
        self.lock().in_flight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, StoreError};

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    fn admin_store() -> Arc<MemoryStore> {
        let store = MemoryStore::new();
        store.seed_role(&user("root"), Role::admin());
        Arc::new(store)
    }

    #[tokio::test]
    async fn second_lookup_within_ttl_hits_cache() {
        let store = admin_store();
        let cache = RoleCache::new(store.clone(), 10, Duration::from_secs(300));

        assert!(cache.is_admin(&user("root")).await.unwrap());
        assert!(cache.is_admin(&user("root")).await.unwrap());
        assert_eq!(store.role_loads(), 1);
    }

    #[tokio::test]
    async fn lookup_after_ttl_reloads() {
        let store = admin_store();
        let cache = RoleCache::new(store.clone(), 10, Duration::from_millis(20));

        cache.roles(&user("root")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        cache.roles(&user("root")).await.unwrap();

        assert_eq!(store.role_loads(), 2);
    }

    #[tokio::test]
    async fn revoke_is_invisible_until_expiry() {
        let store = admin_store();
        let cache = RoleCache::new(store.clone(), 10, Duration::from_millis(50));

        assert!(cache.is_admin(&user("root")).await.unwrap());
        store.revoke_role(&user("root"), &Role::admin()).await.unwrap();
        assert!(cache.is_admin(&user("root")).await.unwrap());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(!cache.is_admin(&user("root")).await.unwrap());
    }

    #[tokio::test]
    async fn capacity_evicts_least_recently_used() {
        let store = admin_store();
        let cache = RoleCache::new(store.clone(), 2, Duration::from_secs(300));

        cache.roles(&user("a")).await.unwrap();
        cache.roles(&user("b")).await.unwrap();
        cache.roles(&user("a")).await.unwrap();
        cache.roles(&user("c")).await.unwrap(); // evicts b
        assert_eq!(cache.len(), 2);
        assert_eq!(store.role_loads(), 3);

        cache.roles(&user("a")).await.unwrap();
        assert_eq!(store.role_loads(), 3);
        cache.roles(&user("b")).await.unwrap();
        assert_eq!(store.role_loads(), 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_misses_share_one_load() {
        let store = admin_store();
        store.set_role_latency(Duration::from_millis(50));
        let cache = Arc::new(RoleCache::new(store.clone(), 10, Duration::from_secs(300)));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move { cache.is_admin(&user("root")).await }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().unwrap());
        }

        assert_eq!(store.role_loads(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn different_users_load_independently() {
        let store = admin_store();
        store.set_role_latency(Duration::from_millis(50));
        let cache = Arc::new(RoleCache::new(store.clone(), 10, Duration::from_secs(300)));

        let a = tokio::spawn({
            let cache = cache.clone();
            async move { cache.roles(&user("a")).await }
        });
        let b = tokio::spawn({
            let cache = cache.clone();
            async move { cache.roles(&user("b")).await }
        });
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        assert_eq!(store.role_loads(), 2);
    }

    #[tokio::test]
    async fn failed_load_is_not_cached() {
        let store = admin_store();
        let cache = RoleCache::new(store.clone(), 10, Duration::from_secs(300));

        store.set_failing(true);
        let err = cache.roles(&user("root")).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert!(cache.is_empty());

        store.set_failing(false);
        assert!(cache.is_admin(&user("root")).await.unwrap());
    }

    #[tokio::test]
    async fn cancelled_load_leaves_cache_usable() {
        let store = admin_store();
        store.set_role_latency(Duration::from_millis(200));
        let cache = RoleCache::new(store.clone(), 10, Duration::from_secs(300));

        let abandoned =
            tokio::time::timeout(Duration::from_millis(10), cache.roles(&user("root"))).await;
        assert!(abandoned.is_err());

        store.set_role_latency(Duration::ZERO);
        assert!(cache.is_admin(&user("root")).await.unwrap());
    }

    #[tokio::test]
    async fn abandoned_loads_do_not_pile_up() {
        let store = admin_store();
        store.set_role_latency(Duration::from_millis(200));
        let cache = RoleCache::new(store.clone(), 2, Duration::from_secs(300));

        for i in 0..50 {
            let id = user(&format!("user-{i}"));
            let abandoned = tokio::time::timeout(Duration::from_millis(5), cache.roles(&id)).await;
            assert!(abandoned.is_err());
        }
        assert_eq!(cache.in_flight_len(), 0);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn abandoned_load_with_waiter_is_finished_by_waiter() {
        let store = admin_store();
        store.set_role_latency(Duration::from_millis(50));
        let cache = Arc::new(RoleCache::new(store.clone(), 10, Duration::from_secs(300)));

        let waiter = tokio::spawn({
            let cache = cache.clone();
            async move { cache.is_admin(&user("root")).await }
        });
        let abandoned =
            tokio::time::timeout(Duration::from_millis(5), cache.roles(&user("root"))).await;
        assert!(abandoned.is_err());

        assert!(waiter.await.unwrap().unwrap());
        assert_eq!(cache.in_flight_len(), 0);
        assert_eq!(cache.len(), 1);
    }
}
