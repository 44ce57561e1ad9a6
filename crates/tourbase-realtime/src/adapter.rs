//! Consumer adapter helpers
//!
//! The core guarantees delivery of the full event; deciding whether an
//! event warrants a refetch is consumer business logic, expressed as a pure
//! [`ChangePredicate`]. This module ships the predicates the Tourbase UI
//! consumers actually use and [`RefetchAdapter`], the "watch these tables,
//! refetch when the predicate passes" wiring.

use std::sync::Arc;

use crate::event::{ChangeEvent, ChangeOp};
use crate::registry::ChannelRegistry;
use crate::subscription::Subscription;

/// Pure predicate deciding whether a change event is interesting
pub type ChangePredicate = Arc<dyn Fn(&ChangeEvent) -> bool + Send + Sync>;

/// Matches every event (unconditional refetch)
pub fn any_change() -> ChangePredicate {
    Arc::new(|_| true)
}

/// Matches events with the given operation
pub fn op_is(op: ChangeOp) -> ChangePredicate {
    Arc::new(move |event| event.op == op)
}

/// Matches when any of the named fields differs between the pre- and
/// post-change rows. Inserts and deletes always match.
pub fn fields_changed(fields: &[&str]) -> ChangePredicate {
    let fields: Vec<String> = fields.iter().map(|f| (*f).to_string()).collect();
    Arc::new(move |event| fields.iter().any(|field| event.field_changed(field)))
}

/// Matches when the post-change row has `field` equal to `value`
/// (e.g. "record became inactive")
pub fn field_equals(field: &str, value: serde_json::Value) -> ChangePredicate {
    let field = field.to_string();
    Arc::new(move |event| event.field(&field) == Some(&value))
}

/// Matches when every inner predicate matches
pub fn all_of(predicates: Vec<ChangePredicate>) -> ChangePredicate {
    Arc::new(move |event| predicates.iter().all(|p| p(event)))
}

/// Matches when at least one inner predicate matches
pub fn any_of(predicates: Vec<ChangePredicate>) -> ChangePredicate {
    Arc::new(move |event| predicates.iter().any(|p| p(event)))
}

/// Aggregates N tables behind one subscription and one refetch handler.
///
/// The adapter owns its subscription; call [`stop`](Self::stop) to detach.
/// The refetch handler is fire-and-forget and typically enqueues a reload
/// rather than performing it inline.
pub struct RefetchAdapter {
    subscription: Subscription,
}

impl RefetchAdapter {
    pub fn new(
        registry: &ChannelRegistry,
        tables: &[&str],
        predicate: ChangePredicate,
        refetch: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        let subscription = registry.subscribe_many(tables, move |event| {
            if predicate(event) {
                refetch();
            }
        });
        Self { subscription }
    }

    /// Unsubscribe from every watched table (idempotent)
    pub fn stop(&self) {
        self.subscription.unsubscribe();
    }

    /// Hand back the underlying subscription handle
    pub fn into_subscription(self) -> Subscription {
        self.subscription
    }
}
