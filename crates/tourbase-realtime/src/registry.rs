//! Channel registry - single source of truth for table subscriptions
//!
//! Maps each table name to its one open connector and its ordered listener
//! list. Reference counting is the only lifecycle discipline: the first
//! listener for a table opens the channel, the last one out closes it.
//!
//! Fan-out is synchronous and snapshot-stable: every event is delivered to
//! the listeners registered at the moment it arrived, in registration
//! order, and a listener that subscribes or unsubscribes from inside its
//! own callback only affects delivery of the next event.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::connector::Connector;
use crate::event::ChangeEvent;
use crate::source::{ChangeSource, EventSink};
use crate::subscription::Subscription;

/// Callback invoked for every change event on a subscribed table
pub type ChangeCallback = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// One registered listener. Owned by the registry; the consumer holds only
/// the [`Subscription`] capability to remove it.
struct ListenerEntry {
    id: u64,
    callback: ChangeCallback,
}

struct TableChannel {
    connector: Connector,
    listeners: Vec<ListenerEntry>,
}

pub(crate) struct RegistryInner {
    source: Arc<dyn ChangeSource>,
    tables: Mutex<HashMap<String, TableChannel>>,
    next_listener_id: AtomicU64,
}

/// Registry of table subscriptions sharing one channel per table.
///
/// Cheap to clone; all clones share the same underlying state. Construct
/// one per change source and inject it into consumers.
#[derive(Clone)]
pub struct ChannelRegistry {
    inner: Arc<RegistryInner>,
}

impl ChannelRegistry {
    /// Create a registry over the given change source
    pub fn new(source: Arc<dyn ChangeSource>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                source,
                tables: Mutex::new(HashMap::new()),
                next_listener_id: AtomicU64::new(1),
            }),
        }
    }

    /// Subscribe `callback` to all change events on `table`.
    ///
    /// Opens the table's channel when this is its first listener. Always
    /// succeeds synchronously; a transport-open failure surfaces only
    /// through [`connection_states`](Self::connection_states).
    pub fn subscribe(
        &self,
        table: &str,
        callback: impl Fn(&ChangeEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.subscribe_callback(table, Arc::new(callback))
    }

    /// Subscribe one callback to several tables as a single logical
    /// subscription with one combined teardown.
    pub fn subscribe_many(
        &self,
        tables: &[&str],
        callback: impl Fn(&ChangeEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let callback: ChangeCallback = Arc::new(callback);
        let subscriptions = tables
            .iter()
            .map(|table| self.subscribe_callback(table, callback.clone()))
            .collect();
        Subscription::group(subscriptions)
    }

    /// Snapshot of "connector reports Joined" per registered table
    pub fn connection_states(&self) -> HashMap<String, bool> {
        self.inner
            .tables
            .lock()
            .iter()
            .map(|(table, channel)| (table.clone(), channel.connector.is_joined()))
            .collect()
    }

    /// Number of tables with at least one listener
    pub fn table_count(&self) -> usize {
        self.inner.tables.lock().len()
    }

    fn subscribe_callback(&self, table: &str, callback: ChangeCallback) -> Subscription {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed);

        let mut tables = self.inner.tables.lock();
        let channel = tables.entry(table.to_string()).or_insert_with(|| {
            debug!(table, "opening change channel (first listener)");
            let connector =
                Connector::open(self.inner.source.as_ref(), table, self.event_sink(table));
            TableChannel {
                connector,
                listeners: Vec::new(),
            }
        });
        channel.listeners.push(ListenerEntry { id, callback });
        trace!(
            table,
            listener = id,
            total = channel.listeners.len(),
            "listener added"
        );
        drop(tables);

        Subscription::single(Arc::downgrade(&self.inner), table.to_string(), id)
    }

    /// Sink handed to the transport; routes raw events into fan-out.
    ///
    /// Holds only a weak reference so the source does not keep a dropped
    /// registry alive.
    fn event_sink(&self, table: &str) -> EventSink {
        let weak = Arc::downgrade(&self.inner);
        let table = table.to_string();
        Arc::new(move |event: ChangeEvent| {
            if let Some(inner) = weak.upgrade() {
                inner.dispatch(&table, &event);
            }
        })
    }
}

impl RegistryInner {
    /// Deliver one event to every listener currently registered for `table`.
    ///
    /// The listener list is snapshotted under the lock and invoked with the
    /// lock released, so callbacks may freely subscribe and unsubscribe.
    /// A panicking listener is logged and skipped; it stays registered.
    fn dispatch(&self, table: &str, event: &ChangeEvent) {
        let snapshot: Vec<ChangeCallback> = {
            let tables = self.tables.lock();
            match tables.get(table) {
                Some(channel) => channel
                    .listeners
                    .iter()
                    .map(|l| l.callback.clone())
                    .collect(),
                None => return,
            }
        };

        trace!(
            table,
            op = ?event.op,
            record_id = %event.record_id,
            listeners = snapshot.len(),
            "dispatching change event"
        );

        for callback in snapshot {
            if std::panic::catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                warn!(
                    table,
                    record_id = %event.record_id,
                    "change listener panicked; continuing fan-out"
                );
            }
        }
    }

    /// Remove exactly the listener `id` from `table`; closes the channel
    /// when the list empties. Unknown table or listener is a no-op.
    pub(crate) fn remove_listener(&self, table: &str, id: u64) {
        let mut tables = self.tables.lock();
        let emptied = match tables.get_mut(table) {
            Some(channel) => {
                let before = channel.listeners.len();
                channel.listeners.retain(|l| l.id != id);
                if channel.listeners.len() == before {
                    return;
                }
                trace!(table, listener = id, "listener removed");
                channel.listeners.is_empty()
            }
            None => return,
        };

        if emptied {
            if let Some(channel) = tables.remove(table) {
                drop(tables);
                channel.connector.close();
                debug!(table, "closed change channel (last listener removed)");
            }
        }
    }
}

impl Drop for RegistryInner {
    fn drop(&mut self) {
        for (table, channel) in self.tables.get_mut().drain() {
            channel.connector.close();
            debug!(table = %table, "closed change channel (registry dropped)");
        }
    }
}
