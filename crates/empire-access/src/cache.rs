//! Role lookups with a TTL cache.
//!
//! The cache is an explicit object with an injected clock rather than
//! module-level state, so expiry is deterministic under test. Role data
//! is eventually consistent: concurrent refreshes for the same user
//! are tolerated and the last write wins.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use empire_core::{Backend, UserId};

use crate::role::Role;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Hand-advanced clock for tests.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now = *now + by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// How long a cached role assignment stays fresh.
pub const DEFAULT_ROLE_TTL_MINUTES: i64 = 5;

/// TTL'd map from user id to role.
pub struct RoleCache {
    entries: Mutex<HashMap<UserId, (Role, DateTime<Utc>)>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl RoleCache {
    /// Cache with the default five-minute TTL on the system clock.
    pub fn new() -> Self {
        Self::with_clock(
            Duration::minutes(DEFAULT_ROLE_TTL_MINUTES),
            Arc::new(SystemClock),
        )
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    /// Fresh entry for the user, if any. Expired entries read as
    /// absent; they are overwritten by the next `put`.
    pub fn get(&self, user_id: &str) -> Option<Role> {
        let entries = self.entries.lock().unwrap();
        let (role, stored_at) = entries.get(user_id)?;
        if self.clock.now() - *stored_at < self.ttl {
            Some(*role)
        } else {
            None
        }
    }

    pub fn put(&self, user_id: impl Into<UserId>, role: Role) {
        let now = self.clock.now();
        self.entries
            .lock()
            .unwrap()
            .insert(user_id.into(), (role, now));
    }

    pub fn invalidate(&self, user_id: &str) {
        self.entries.lock().unwrap().remove(user_id);
    }
}

impl Default for RoleCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Cache-through role lookup against the backend.
///
/// Lookup failures and missing assignments both resolve to
/// [`Role::Member`] and are never surfaced: navigation stays usable at
/// the cost of silently downgrading privilege.
pub struct RoleResolver {
    backend: Arc<dyn Backend>,
    cache: RoleCache,
}

impl RoleResolver {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            cache: RoleCache::new(),
        }
    }

    pub fn with_cache(backend: Arc<dyn Backend>, cache: RoleCache) -> Self {
        Self { backend, cache }
    }

    pub fn cache(&self) -> &RoleCache {
        &self.cache
    }

    /// The user's effective role. Hits the backend only on cache miss
    /// or expiry; the result, including the `Member` default, is
    /// cached.
    pub fn resolve(&self, user_id: &str) -> Role {
        if let Some(role) = self.cache.get(user_id) {
            return role;
        }
        let role = match self.backend.role(user_id) {
            Ok(raw) => Role::from_assignment(raw.as_deref()),
            Err(err) => {
                debug!(user = %user_id, error = %err, "role lookup failed, defaulting to member");
                Role::Member
            }
        };
        self.cache.put(user_id, role);
        role
    }
}
