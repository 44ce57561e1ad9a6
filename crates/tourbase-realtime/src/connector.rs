//! Per-table connector
//!
//! Exactly one [`Connector`] exists per subscribed table, owned by the
//! registry. State machine: `Connecting -> Joined`, `Connecting -> Errored`,
//! `Joined -> Errored` (transport drop), `Joined -> Closed` (registry
//! teardown when the last listener unsubscribes).

use tracing::warn;

use crate::source::{ChangeSource, ConnectionState, EventSink, SourceChannel};

/// One live subscription to the backend for a single table.
///
/// When the transport refuses the open, the connector holds no channel and
/// reports `Errored`; the failure never propagates to subscribe callers.
pub(crate) struct Connector {
    channel: Option<Box<dyn SourceChannel>>,
}

impl Connector {
    pub(crate) fn open(source: &dyn ChangeSource, table: &str, sink: EventSink) -> Self {
        let channel = match source.open(table, sink) {
            Ok(channel) => Some(channel),
            Err(e) => {
                warn!(table, error = %e, code = e.error_code(), "failed to open change channel");
                None
            }
        };
        Self { channel }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.channel
            .as_ref()
            .map_or(ConnectionState::Errored, |c| c.state())
    }

    pub(crate) fn is_joined(&self) -> bool {
        self.state().is_joined()
    }

    pub(crate) fn close(&self) {
        if let Some(channel) = &self.channel {
            channel.close();
        }
    }
}
