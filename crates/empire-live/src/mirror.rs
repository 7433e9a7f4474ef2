use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, Weak};

use tracing::debug;

use empire_core::{
    Backend, BackendError, ChangeEvent, Filter, OrderBy, Record, SelectSpec, Subscription,
};

use crate::reconcile;

/// Immutable view of a mirror's state, published to watchers on every
/// change.
#[derive(Debug, Clone, PartialEq)]
pub struct MirrorSnapshot {
    pub items: Vec<Record>,
    pub loading: bool,
    pub error: Option<String>,
}

struct MirrorState {
    items: Vec<Record>,
    loading: bool,
    error: Option<String>,
    /// Notifications that arrived while a snapshot query was pending.
    /// Replayed, in order, once the snapshot settles.
    buffer: Vec<ChangeEvent>,
    closed: bool,
    watchers: Vec<Sender<MirrorSnapshot>>,
}

struct Inner {
    backend: Arc<dyn Backend>,
    table: String,
    select: SelectSpec,
    filter: Option<Filter>,
    order: Option<OrderBy>,
    state: Mutex<MirrorState>,
    subscription: Mutex<Option<Subscription>>,
}

/// A local, incrementally-updated copy of one remote table.
///
/// Opening a mirror registers a change subscription first and then
/// issues the snapshot query, so no notification can be missed:
/// anything delivered before the snapshot settles is buffered and
/// replayed over it. The subscription covers the whole table even when
/// the snapshot is filtered — that is the behavior of the system this
/// mirrors, so a filtered mirror may pick up rows outside its filter
/// from the feed.
///
/// Handles are cheap to clone; `close` tears the subscription down and
/// freezes the state. Dropping the last handle closes implicitly.
#[derive(Clone)]
pub struct CollectionMirror {
    inner: Arc<Inner>,
}

impl CollectionMirror {
    /// Open a mirror of `table`. `select`, `filter`, and `order` apply
    /// to the snapshot query only.
    ///
    /// A snapshot failure is not an open failure: it lands in
    /// [`error`](Self::error) and leaves the mirror empty. Only a
    /// failure to establish the subscription errors here.
    pub fn open(
        backend: Arc<dyn Backend>,
        table: impl Into<String>,
        select: SelectSpec,
        filter: Option<Filter>,
        order: Option<OrderBy>,
    ) -> Result<Self, BackendError> {
        let table = table.into();
        let inner = Arc::new(Inner {
            backend: backend.clone(),
            table: table.clone(),
            select,
            filter,
            order,
            state: Mutex::new(MirrorState {
                items: Vec::new(),
                loading: true,
                error: None,
                buffer: Vec::new(),
                closed: false,
                watchers: Vec::new(),
            }),
            subscription: Mutex::new(None),
        });

        let weak: Weak<Inner> = Arc::downgrade(&inner);
        let listener = Arc::new(move |event: ChangeEvent| {
            if let Some(inner) = weak.upgrade() {
                inner.on_event(event);
            }
        });
        let subscription = backend.subscribe(&table, listener)?;
        *inner.subscription.lock().unwrap() = Some(subscription);
        debug!(table = %table, "mirror opened");

        inner.load_snapshot();
        Ok(Self { inner })
    }

    /// Current rows, in snapshot order with feed inserts appended.
    pub fn items(&self) -> Vec<Record> {
        self.inner.state.lock().unwrap().items.clone()
    }

    /// True from open until the first snapshot settles, and again
    /// during a manual [`refresh`](Self::refresh).
    pub fn loading(&self) -> bool {
        self.inner.state.lock().unwrap().loading
    }

    /// Message of the most recent failed snapshot query, cleared by the
    /// next successful one.
    pub fn error(&self) -> Option<String> {
        self.inner.state.lock().unwrap().error.clone()
    }

    /// The table this mirror reflects.
    pub fn table(&self) -> &str {
        &self.inner.table
    }

    /// Current state as one immutable snapshot.
    pub fn snapshot(&self) -> MirrorSnapshot {
        let state = self.inner.state.lock().unwrap();
        Inner::snapshot_of(&state)
    }

    /// Watch the mirror: the receiver gets the current snapshot
    /// immediately and a fresh one after every state change. Dropped
    /// receivers are pruned on the next publish.
    pub fn watch(&self) -> Receiver<MirrorSnapshot> {
        let (tx, rx) = mpsc::channel();
        let mut state = self.inner.state.lock().unwrap();
        let _ = tx.send(Inner::snapshot_of(&state));
        if !state.closed {
            state.watchers.push(tx);
        }
        rx
    }

    /// Re-run the snapshot query. Never invoked automatically; the
    /// consuming UI offers this as its retry affordance after a failed
    /// load.
    pub fn refresh(&self) {
        self.inner.load_snapshot();
    }

    /// Tear down the subscription and freeze the mirror. Idempotent;
    /// after this returns no notification or late snapshot result can
    /// mutate the state.
    pub fn close(&self) {
        self.inner.close();
    }
}

impl Inner {
    fn snapshot_of(state: &MirrorState) -> MirrorSnapshot {
        MirrorSnapshot {
            items: state.items.clone(),
            loading: state.loading,
            error: state.error.clone(),
        }
    }

    fn publish(state: &mut MirrorState) {
        let snapshot = Self::snapshot_of(state);
        state
            .watchers
            .retain(|watcher| watcher.send(snapshot.clone()).is_ok());
    }

    fn on_event(&self, event: ChangeEvent) {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return;
        }
        if state.loading {
            state.buffer.push(event);
            return;
        }
        if reconcile::apply(&mut state.items, event) {
            Self::publish(&mut state);
        }
    }

    /// Issue the snapshot query and settle the result. Shared by open
    /// and refresh; both outcomes replay the notification buffer, since
    /// dropping feed events is never acceptable.
    fn load_snapshot(&self) {
        {
            let mut state = self.state.lock().unwrap();
            if state.closed {
                return;
            }
            state.loading = true;
            Self::publish(&mut state);
        }

        // No state lock held across the query: the feed may deliver
        // (and buffer) notifications while it runs.
        let result = self.backend.query(
            &self.table,
            &self.select,
            self.filter.as_ref(),
            self.order.as_ref(),
        );

        let mut state = self.state.lock().unwrap();
        if state.closed {
            debug!(table = %self.table, "snapshot resolved after close, discarded");
            return;
        }
        match result {
            Ok(rows) => {
                debug!(table = %self.table, rows = rows.len(), "snapshot applied");
                state.items = rows;
                state.error = None;
            }
            Err(err) => {
                debug!(table = %self.table, error = %err, "snapshot query failed");
                state.error = Some(err.to_string());
            }
        }
        state.loading = false;
        let buffered: Vec<ChangeEvent> = state.buffer.drain(..).collect();
        for event in buffered {
            reconcile::apply(&mut state.items, event);
        }
        Self::publish(&mut state);
    }

    fn close(&self) {
        {
            let mut state = self.state.lock().unwrap();
            if state.closed {
                return;
            }
            state.closed = true;
            state.loading = false;
            state.buffer.clear();
            state.watchers.clear();
        }
        if let Some(subscription) = self.subscription.lock().unwrap().take() {
            self.backend.unsubscribe(&subscription);
        }
        debug!(table = %self.table, "mirror closed");
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        // Last handle gone without an explicit close: release the
        // subscription rather than leak it.
        if let Ok(mut guard) = self.subscription.lock() {
            if let Some(subscription) = guard.take() {
                self.backend.unsubscribe(&subscription);
            }
        }
    }
}
