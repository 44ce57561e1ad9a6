//! Tourbase Realtime - change-notification multiplexing layer
//!
//! Subscribes to the backend's change-data-capture feed and fans row-change
//! events out to many independent consumers, sharing one underlying channel
//! per table:
//! - One [`SourceChannel`](source::SourceChannel) per table, opened on
//!   first interest and closed when the last listener unsubscribes
//! - Synchronous, snapshot-stable fan-out in registration order
//! - Idempotent [`Subscription`] handles, single-table or multi-table
//! - Poll-based [`LivenessMonitor`] for "live sync active" indicators
//! - Consumer-side [`adapter`] predicates deciding when to refetch
//!
//! ## Example
//! ```
//! use std::sync::Arc;
//! use serde_json::json;
//! use tourbase_realtime::{CdcHub, ChannelRegistry};
//!
//! let hub = CdcHub::new();
//! let registry = ChannelRegistry::new(Arc::new(hub.clone()));
//!
//! let subscription = registry.subscribe("destinations", |event| {
//!     println!("{} changed: {:?}", event.record_id, event.op);
//! });
//!
//! hub.emit_insert("destinations", json!({"id": "d1", "name": "Lisbon"}));
//! subscription.unsubscribe();
//! ```

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod adapter;
pub mod event;
pub mod monitor;
pub mod registry;
pub mod source;
pub mod subscription;

mod connector;

pub use adapter::{ChangePredicate, RefetchAdapter};
pub use event::{ChangeEvent, ChangeOp, RecordSnapshot};
pub use monitor::LivenessMonitor;
pub use registry::{ChangeCallback, ChannelRegistry};
pub use source::{CdcHub, ChangeSource, ConnectionState, EventSink, SourceChannel};
pub use subscription::Subscription;
