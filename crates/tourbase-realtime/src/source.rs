//! Change-feed source capability
//!
//! The multiplexing layer treats the CDC feed as an opaque capability: one
//! channel per table, opened with a sink for decoded events and closed when
//! the last subscriber goes away. [`CdcHub`] is the in-process
//! implementation, used by tests and embedded deployments; networked
//! deployments plug in their own [`ChangeSource`] over the same contract.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use tourbase_common::error::{Error, Result};

use crate::event::{ChangeEvent, RecordSnapshot};

/// Connection state of a single table channel
///
/// Remote transports surface `Connecting` while the join handshake is in
/// flight; the in-process [`CdcHub`] joins synchronously.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Connecting,
    Joined,
    Errored,
    Closed,
}

impl ConnectionState {
    /// True when the channel is live and delivering events
    pub fn is_joined(self) -> bool {
        self == Self::Joined
    }
}

/// Callback receiving decoded change events from a source channel
pub type EventSink = Arc<dyn Fn(ChangeEvent) + Send + Sync>;

/// One live subscription to the change feed for a single table
pub trait SourceChannel: Send + Sync {
    /// Current connection state; sampled, never pushed
    fn state(&self) -> ConnectionState;

    /// Tear the channel down. Fire-and-forget; the transport may complete
    /// the close asynchronously.
    fn close(&self);
}

/// Opaque change-data-capture capability
///
/// Reconnection policy belongs to the implementation; it may recover a
/// dropped channel autonomously and resume delivering into the same sink.
pub trait ChangeSource: Send + Sync {
    /// Open a channel for `table`, delivering decoded events to `sink` in
    /// commit order. Must return before delivering any event. Returns an
    /// error when the backend refuses the subscription.
    fn open(&self, table: &str, sink: EventSink) -> Result<Box<dyn SourceChannel>>;
}

struct HubEntry {
    sink: EventSink,
    state: Arc<RwLock<ConnectionState>>,
}

struct HubInner {
    channels: DashMap<String, HubEntry>,
    refused: RwLock<HashSet<String>>,
}

/// In-process change feed
///
/// Routes emitted events to the single open channel per table. Doubles as
/// the test harness for the layers above: `refuse` simulates a backend that
/// rejects subscriptions, `interrupt`/`restore` simulate a transport drop
/// and its autonomous recovery.
#[derive(Clone)]
pub struct CdcHub {
    inner: Arc<HubInner>,
}

impl CdcHub {
    /// Create a new hub with no open channels
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner {
                channels: DashMap::new(),
                refused: RwLock::new(HashSet::new()),
            }),
        }
    }

    /// Emit a change event to the table's channel, if one is joined
    pub fn emit(&self, event: ChangeEvent) {
        let sink = match self.inner.channels.get(&event.table) {
            Some(entry) => {
                if !entry.state.read().is_joined() {
                    trace!(table = %event.table, "dropping event: channel not joined");
                    return;
                }
                entry.sink.clone()
            }
            None => {
                trace!(table = %event.table, "dropping event: no open channel");
                return;
            }
        };
        sink(event);
    }

    /// Emit an INSERT event
    pub fn emit_insert(&self, table: &str, record: RecordSnapshot) {
        self.emit(ChangeEvent::insert(table, record));
    }

    /// Emit an UPDATE event
    pub fn emit_update(&self, table: &str, previous: RecordSnapshot, record: RecordSnapshot) {
        self.emit(ChangeEvent::update(table, previous, record));
    }

    /// Emit a DELETE event
    pub fn emit_delete(&self, table: &str, record: RecordSnapshot) {
        self.emit(ChangeEvent::delete(table, record));
    }

    /// Refuse future `open` calls for `table`
    pub fn refuse(&self, table: &str) {
        self.inner.refused.write().insert(table.to_string());
    }

    /// Allow `open` calls for `table` again
    pub fn allow(&self, table: &str) {
        self.inner.refused.write().remove(table);
    }

    /// Drop the table's channel into `Errored` without closing it
    pub fn interrupt(&self, table: &str) {
        if let Some(entry) = self.inner.channels.get(table) {
            *entry.state.write() = ConnectionState::Errored;
            debug!(table, "channel interrupted");
        }
    }

    /// Recover an interrupted channel back to `Joined`
    pub fn restore(&self, table: &str) {
        if let Some(entry) = self.inner.channels.get(table) {
            *entry.state.write() = ConnectionState::Joined;
            debug!(table, "channel restored");
        }
    }

    /// Tables with an open channel
    pub fn open_tables(&self) -> Vec<String> {
        let mut tables: Vec<String> = self.inner.channels.iter().map(|e| e.key().clone()).collect();
        tables.sort_unstable();
        tables
    }

    /// True if `table` has an open channel
    pub fn is_open(&self, table: &str) -> bool {
        self.inner.channels.contains_key(table)
    }
}

impl Default for CdcHub {
    fn default() -> Self {
        Self::new()
    }
}

struct HubChannel {
    table: String,
    state: Arc<RwLock<ConnectionState>>,
    hub: Arc<HubInner>,
}

impl SourceChannel for HubChannel {
    fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    fn close(&self) {
        *self.state.write() = ConnectionState::Closed;
        // Only remove the entry this channel created; a stale handle must
        // not tear down a newer channel for the same table.
        self.hub
            .channels
            .remove_if(&self.table, |_, entry| {
                Arc::ptr_eq(&entry.state, &self.state)
            });
        debug!(table = %self.table, "channel closed");
    }
}

impl ChangeSource for CdcHub {
    fn open(&self, table: &str, sink: EventSink) -> Result<Box<dyn SourceChannel>> {
        if self.inner.refused.read().contains(table) {
            return Err(Error::ChannelOpen {
                table: table.to_string(),
                reason: "backend refused subscription".to_string(),
            });
        }

        // In-process join is synchronous: the channel is born Joined.
        let state = Arc::new(RwLock::new(ConnectionState::Joined));
        self.inner.channels.insert(
            table.to_string(),
            HubEntry {
                sink,
                state: state.clone(),
            },
        );
        debug!(table, "channel opened");

        Ok(Box::new(HubChannel {
            table: table.to_string(),
            state,
            hub: self.inner.clone(),
        }))
    }
}
