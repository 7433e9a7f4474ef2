use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Mutex;

use uuid::Uuid;

use crate::backend::{AuthListener, Backend, BackendError, ChangeListener, Subscription};
use crate::event::ChangeEvent;
use crate::query::{Filter, OrderBy, SelectSpec};
use crate::record::{Record, UserId, Value};

struct ListenerEntry {
    id: u64,
    table: String,
    listener: ChangeListener,
}

/// In-process [`Backend`] over plain maps.
///
/// This is the reference semantics for the hosted service and the test
/// double for everything downstream: driver methods (`insert`,
/// `update`, `delete`) mutate rows and fan the corresponding event out
/// to every listener on the table, synchronously, in registration
/// order. `emit` publishes an event without touching stored rows so
/// tests can replay arbitrary feed sequences.
pub struct MemoryBackend {
    tables: Mutex<BTreeMap<String, Vec<Record>>>,
    listeners: Mutex<Vec<ListenerEntry>>,
    auth_listeners: Mutex<Vec<(u64, AuthListener)>>,
    next_subscription: AtomicU64,
    user: Mutex<Option<UserId>>,
    roles: Mutex<BTreeMap<UserId, String>>,
    next_query_failure: Mutex<Option<String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(BTreeMap::new()),
            listeners: Mutex::new(Vec::new()),
            auth_listeners: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
            user: Mutex::new(None),
            roles: Mutex::new(BTreeMap::new()),
            next_query_failure: Mutex::new(None),
        }
    }

    /// Store a new row and notify listeners. Records with an empty id
    /// get a minted UUID, matching how the hosted service assigns ids.
    pub fn insert(&self, table: &str, mut record: Record) -> Result<Record, BackendError> {
        if record.id.is_empty() {
            record.id = Uuid::new_v4().to_string();
        }
        {
            let mut tables = self
                .tables
                .lock()
                .map_err(|e| BackendError::Storage(e.to_string()))?;
            let rows = tables.entry(table.to_string()).or_default();
            if rows.iter().any(|r| r.id == record.id) {
                return Err(BackendError::Storage(format!(
                    "duplicate id in {}: {}",
                    table, record.id
                )));
            }
            rows.push(record.clone());
        }
        self.notify(table, ChangeEvent::Inserted(record.clone()));
        Ok(record)
    }

    /// Remove a row if present and notify listeners. Returns whether a
    /// row was removed.
    pub fn delete(&self, table: &str, id: &str) -> bool {
        let removed = {
            let mut tables = self.tables.lock().unwrap();
            match tables.get_mut(table) {
                Some(rows) => {
                    let before = rows.len();
                    rows.retain(|r| r.id != id);
                    rows.len() != before
                }
                None => false,
            }
        };
        if removed {
            self.notify(table, ChangeEvent::Deleted(id.to_string()));
        }
        removed
    }

    /// Publish an event to the table's listeners without touching
    /// stored rows. Lets tests replay exact feed sequences, duplicates
    /// included.
    pub fn emit(&self, table: &str, event: ChangeEvent) {
        self.notify(table, event);
    }

    /// Sign a user in and notify auth listeners.
    pub fn set_user(&self, user_id: impl Into<UserId>) {
        let user = Some(user_id.into());
        *self.user.lock().unwrap() = user.clone();
        self.notify_auth(user);
    }

    /// Sign the current user out and notify auth listeners.
    pub fn clear_user(&self) {
        *self.user.lock().unwrap() = None;
        self.notify_auth(None);
    }

    /// Assign a raw role string to a user.
    pub fn set_role(&self, user_id: impl Into<UserId>, role: impl Into<String>) {
        self.roles
            .lock()
            .unwrap()
            .insert(user_id.into(), role.into());
    }

    /// Make the next `query` call fail with the given message.
    pub fn fail_next_query(&self, message: impl Into<String>) {
        *self.next_query_failure.lock().unwrap() = Some(message.into());
    }

    fn notify(&self, table: &str, event: ChangeEvent) {
        let recipients: Vec<ChangeListener> = {
            let listeners = self.listeners.lock().unwrap();
            listeners
                .iter()
                .filter(|entry| entry.table == table)
                .map(|entry| entry.listener.clone())
                .collect()
        };
        for listener in recipients {
            listener(event.clone());
        }
    }

    fn notify_auth(&self, user: Option<UserId>) {
        let recipients: Vec<AuthListener> = {
            let listeners = self.auth_listeners.lock().unwrap();
            listeners.iter().map(|(_, l)| l.clone()).collect()
        };
        for listener in recipients {
            listener(user.clone());
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for MemoryBackend {
    fn query(
        &self,
        table: &str,
        select: &SelectSpec,
        filter: Option<&Filter>,
        order: Option<&OrderBy>,
    ) -> Result<Vec<Record>, BackendError> {
        if let Some(message) = self.next_query_failure.lock().unwrap().take() {
            return Err(BackendError::Query(message));
        }

        let tables = self
            .tables
            .lock()
            .map_err(|e| BackendError::Storage(e.to_string()))?;
        let mut rows: Vec<Record> = tables.get(table).cloned().unwrap_or_default();

        if let Some(filter) = filter {
            rows.retain(|record| {
                if filter.field == "id" {
                    filter.value.as_str() == Some(record.id.as_str())
                } else {
                    record.get(&filter.field) == Some(&filter.value)
                }
            });
        }

        if let Some(order) = order {
            rows.sort_by(|a, b| {
                let ordering = compare_values(a.get(&order.field), b.get(&order.field));
                if order.ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            });
        }

        if let SelectSpec::Fields(names) = select {
            for record in &mut rows {
                record.fields.retain(|name, _| names.contains(name));
            }
        }

        Ok(rows)
    }

    fn subscribe(
        &self,
        table: &str,
        listener: ChangeListener,
    ) -> Result<Subscription, BackendError> {
        let id = self.next_subscription.fetch_add(1, AtomicOrdering::SeqCst);
        self.listeners.lock().unwrap().push(ListenerEntry {
            id,
            table: table.to_string(),
            listener,
        });
        Ok(Subscription::new(id, table))
    }

    fn unsubscribe(&self, subscription: &Subscription) {
        self.listeners
            .lock()
            .unwrap()
            .retain(|entry| entry.id != subscription.id());
        self.auth_listeners
            .lock()
            .unwrap()
            .retain(|(id, _)| *id != subscription.id());
    }

    fn current_user(&self) -> Option<UserId> {
        self.user.lock().unwrap().clone()
    }

    fn on_auth_change(&self, listener: AuthListener) -> Result<Subscription, BackendError> {
        let id = self.next_subscription.fetch_add(1, AtomicOrdering::SeqCst);
        self.auth_listeners.lock().unwrap().push((id, listener));
        Ok(Subscription::new(id, "auth"))
    }

    fn role(&self, user_id: &str) -> Result<Option<String>, BackendError> {
        Ok(self.roles.lock().unwrap().get(user_id).cloned())
    }

    fn update_record(
        &self,
        table: &str,
        id: &str,
        patch: BTreeMap<String, Value>,
    ) -> Result<Record, BackendError> {
        let merged = {
            let mut tables = self
                .tables
                .lock()
                .map_err(|e| BackendError::Storage(e.to_string()))?;
            let rows = tables
                .get_mut(table)
                .ok_or_else(|| BackendError::NotFound(id.to_string()))?;
            let record = rows
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or_else(|| BackendError::NotFound(id.to_string()))?;
            record.merge(&patch);
            record.clone()
        };
        self.notify(
            table,
            ChangeEvent::Updated {
                id: id.to_string(),
                fields: patch,
            },
        );
        Ok(merged)
    }
}

/// Total order over dynamic values, used for `OrderBy`. Values of
/// different shapes sort by shape; missing fields sort first.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (a, b) {
            (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
            (Value::Int(x), Value::Int(y)) => x.cmp(y),
            (Value::Float(x), Value::Float(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
            (Value::Int(x), Value::Float(y)) => {
                (*x as f64).partial_cmp(y).unwrap_or(Ordering::Equal)
            }
            (Value::Float(x), Value::Int(y)) => {
                x.partial_cmp(&(*y as f64)).unwrap_or(Ordering::Equal)
            }
            (Value::String(x), Value::String(y)) => x.cmp(y),
            _ => shape_rank(a).cmp(&shape_rank(b)),
        },
    }
}

fn shape_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Int(_) | Value::Float(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}
