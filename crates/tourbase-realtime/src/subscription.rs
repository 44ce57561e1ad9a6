//! Subscription handles
//!
//! A [`Subscription`] is the capability to remove exactly one listener (or,
//! for the group form, one listener per table). Tearing down is explicit and
//! idempotent; dropping the handle without calling
//! [`unsubscribe`](Subscription::unsubscribe) leaves the listener
//! registered.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Weak;

use crate::registry::RegistryInner;

enum Target {
    Single {
        registry: Weak<RegistryInner>,
        table: String,
        id: u64,
    },
    Group(Vec<Subscription>),
}

/// Handle to one logical subscription.
///
/// Invoking [`unsubscribe`](Self::unsubscribe) more than once is a no-op,
/// as is unsubscribing after the registry has been dropped.
#[must_use = "dropping a Subscription without calling unsubscribe leaves the listener registered"]
pub struct Subscription {
    done: AtomicBool,
    target: Target,
}

impl Subscription {
    pub(crate) fn single(registry: Weak<RegistryInner>, table: String, id: u64) -> Self {
        Self {
            done: AtomicBool::new(false),
            target: Target::Single {
                registry,
                table,
                id,
            },
        }
    }

    pub(crate) fn group(subscriptions: Vec<Subscription>) -> Self {
        Self {
            done: AtomicBool::new(false),
            target: Target::Group(subscriptions),
        }
    }

    /// Remove the listener(s) this handle was issued for.
    ///
    /// Synchronous: once this returns, no further events reach the removed
    /// callback. For group subscriptions every member is unsubscribed
    /// exactly once each.
    pub fn unsubscribe(&self) {
        if self.done.swap(true, Ordering::SeqCst) {
            return;
        }
        match &self.target {
            Target::Single {
                registry,
                table,
                id,
            } => {
                if let Some(inner) = registry.upgrade() {
                    inner.remove_listener(table, *id);
                }
            }
            Target::Group(subscriptions) => {
                for subscription in subscriptions {
                    subscription.unsubscribe();
                }
            }
        }
    }

    /// True until the first `unsubscribe` call
    pub fn is_active(&self) -> bool {
        !self.done.load(Ordering::SeqCst)
    }
}
