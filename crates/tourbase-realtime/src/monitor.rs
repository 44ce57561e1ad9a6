//! Liveness monitor
//!
//! Periodically samples connector states and publishes one aggregate
//! boolean: "every table this consumer asked about is Joined". Advisory
//! only; delivery correctness never depends on it. Polling is deliberate:
//! a cheap snapshot every few seconds beats flooding consumers with
//! transport-internal state ticks.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use tourbase_common::config::RealtimeConfig;

use crate::registry::ChannelRegistry;

/// Polls the registry and exposes an "all requested tables joined" flag.
///
/// The poll loop stops on [`shutdown`](Self::shutdown) or when the monitor
/// is dropped.
pub struct LivenessMonitor {
    live: watch::Receiver<bool>,
    cancel: CancellationToken,
    worker: JoinHandle<()>,
}

impl LivenessMonitor {
    /// Spawn a monitor polling every `interval`.
    ///
    /// The flag starts `false` and is re-evaluated on the first tick, which
    /// fires immediately.
    pub fn spawn(registry: ChannelRegistry, tables: Vec<String>, interval: Duration) -> Self {
        let (tx, rx) = watch::channel(false);
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let worker = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let states = registry.connection_states();
                        let all_joined = tables
                            .iter()
                            .all(|table| states.get(table).copied().unwrap_or(false));
                        let changed = tx.send_if_modified(|live| {
                            if *live == all_joined {
                                false
                            } else {
                                *live = all_joined;
                                true
                            }
                        });
                        if changed {
                            debug!(live = all_joined, "liveness changed");
                        }
                    }
                }
            }
        });

        Self {
            live: rx,
            cancel,
            worker,
        }
    }

    /// Spawn with the interval from [`RealtimeConfig`]
    pub fn spawn_with_config(
        registry: ChannelRegistry,
        tables: Vec<String>,
        config: &RealtimeConfig,
    ) -> Self {
        Self::spawn(registry, tables, config.liveness_interval())
    }

    /// Most recently sampled aggregate value
    pub fn is_live(&self) -> bool {
        *self.live.borrow()
    }

    /// Watch receiver for awaiting liveness transitions
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.live.clone()
    }

    /// Stop the poll loop
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for LivenessMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.worker.abort();
    }
}
