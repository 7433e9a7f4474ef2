use std::collections::BTreeMap;
use std::sync::Arc;

use crate::event::ChangeEvent;
use crate::query::{Filter, OrderBy, SelectSpec};
use crate::record::{Record, RecordId, UserId, Value};

/// Callback invoked for every change the backend reports on a
/// subscribed table, in delivery order.
pub type ChangeListener = Arc<dyn Fn(ChangeEvent) + Send + Sync>;

/// Callback invoked when the authenticated user changes; `None` means
/// signed out.
pub type AuthListener = Arc<dyn Fn(Option<UserId>) + Send + Sync>;

/// Token identifying an active change subscription.
///
/// Subscriptions are scoped to a whole table and are never narrowed by
/// the filter given to `query` — the feed delivers every row's events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    id: u64,
    table: String,
}

impl Subscription {
    pub fn new(id: u64, table: impl Into<String>) -> Self {
        Self {
            id,
            table: table.into(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

/// Errors from the backend collaborator.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("record not found: {0}")]
    NotFound(RecordId),

    #[error("query failed: {0}")]
    Query(String),

    #[error("subscription failed: {0}")]
    Subscribe(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// The hosted service this suite talks to: row storage, change feeds,
/// authentication, and role assignments.
///
/// The suite never implements storage itself; everything in this trait
/// is a thin, synchronous-looking wrapper the real SDK satisfies.
pub trait Backend: Send + Sync {
    /// One-shot snapshot read of a table, optionally filtered and
    /// ordered. Returns rows in the order the backend chose.
    fn query(
        &self,
        table: &str,
        select: &SelectSpec,
        filter: Option<&Filter>,
        order: Option<&OrderBy>,
    ) -> Result<Vec<Record>, BackendError>;

    /// Register a listener for every insert/update/delete on `table`.
    fn subscribe(&self, table: &str, listener: ChangeListener)
        -> Result<Subscription, BackendError>;

    /// Cancel a subscription. Idempotent; cancelling an unknown or
    /// already-cancelled token is a no-op.
    fn unsubscribe(&self, subscription: &Subscription);

    /// The currently authenticated user, if any.
    fn current_user(&self) -> Option<UserId>;

    /// Register a listener for sign-in/sign-out transitions. Cancelled
    /// through [`unsubscribe`](Backend::unsubscribe) like any other
    /// subscription.
    fn on_auth_change(&self, listener: AuthListener) -> Result<Subscription, BackendError>;

    /// The raw role assignment for a user, if one exists. Role strings
    /// are interpreted by the access layer, not here.
    fn role(&self, user_id: &str) -> Result<Option<String>, BackendError>;

    /// Shallow-merge a patch into an existing record and return the
    /// merged row.
    fn update_record(
        &self,
        table: &str,
        id: &str,
        patch: BTreeMap<String, Value>,
    ) -> Result<Record, BackendError>;
}
