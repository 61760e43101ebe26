//! In-memory subscription registry: event names to ordered handler entries.
//!
//! The registry is the single source of truth for what this process consumes.
//! The bus consults it (never a cached copy) whenever it decides to bind,
//! unbind or rebuild broker topology, and walks it to dispatch every inbound
//! message.
//!
//! # Entries
//!
//! Each [`Subscription`] is a *tagged dispatch closure*: at registration time
//! the registry captures, per handler, exactly how to turn raw bytes into a
//! handler invocation:
//!
//! - **Typed**: deserialize the body into the concrete event type (relaxed
//!   field matching, see [`crate::json`]) and call the typed handler.
//! - **Dynamic**: parse the body as JSON and hand the raw structure to the
//!   dynamic handler.
//!
//! The closure also owns the handler *factory*, invoked once per dispatched
//! message so concurrent messages get independent handler instances.
//!
//! # Invariants
//!
//! - An event name is present as a key iff it has at least one subscription.
//! - Within a name, subscriptions run in registration order.
//! - Registering the same `(event name, handler type)` pair twice is an
//!   error ([`EventBusError::DuplicateHandler`]); a handler runs at most once
//!   per message.
//! - Removing the last subscription for a name reports
//!   [`Removal::last_for_event`] exactly once, on the transition from
//!   non-empty to empty; the bus uses it to unbind the broker queue.
//!
//! # Concurrency
//!
//! Reads (dispatch lookups) take a shared lock; subscribe/unsubscribe take
//! the exclusive lock. The lock is never held across an `.await`: dispatch
//! snapshots the subscription list first, then invokes handlers.

use crate::event::IntegrationEvent;
use crate::event_bus::EventBusError;
use crate::handler::{DynamicIntegrationEventHandler, IntegrationEventHandler};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Whether a subscription carries a compile-time payload type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriptionKind {
    /// The body is deserialized into a concrete event type before dispatch.
    Typed,
    /// The handler receives the raw parsed JSON.
    Dynamic,
}

/// What a single dispatch closure did with a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A handler instance was resolved and ran to completion.
    Handled,
    /// The handler factory yielded no instance; the subscription was skipped.
    Skipped,
}

type DispatchFn =
    Arc<dyn Fn(Vec<u8>) -> BoxFuture<'static, anyhow::Result<DispatchOutcome>> + Send + Sync>;

/// One registered handler for one event name.
#[derive(Clone)]
pub struct Subscription {
    kind: SubscriptionKind,
    handler_name: &'static str,
    payload_type: Option<&'static str>,
    dispatch: DispatchFn,
}

impl Subscription {
    /// Whether this subscription is typed or dynamic.
    #[must_use]
    pub const fn kind(&self) -> SubscriptionKind {
        self.kind
    }

    /// The registered handler's type name, used as its identity within an
    /// event name.
    #[must_use]
    pub const fn handler_name(&self) -> &'static str {
        self.handler_name
    }

    /// Run this subscription's dispatch closure against a raw message body.
    ///
    /// # Errors
    ///
    /// Propagates deserialization and handler errors; callers are expected
    /// to isolate them per subscription.
    pub fn dispatch(&self, body: Vec<u8>) -> BoxFuture<'static, anyhow::Result<DispatchOutcome>> {
        (self.dispatch)(body)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("kind", &self.kind)
            .field("handler_name", &self.handler_name)
            .field("payload_type", &self.payload_type)
            .finish_non_exhaustive()
    }
}

/// Result of removing a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Removal {
    /// Whether a matching subscription existed and was removed. Removing an
    /// unknown subscription is a no-op, as in the original bus.
    pub removed: bool,
    /// True exactly once per event name: on the removal that left the name
    /// with no subscriptions. The event-name key is gone afterwards and the
    /// caller should unbind the broker queue for it.
    pub last_for_event: bool,
}

/// Aggregate result of dispatching one message through the registry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Subscriptions registered for the event name when dispatch started.
    pub matched: usize,
    /// Handlers that resolved and completed without error.
    pub handled: usize,
    /// Subscriptions skipped because their factory yielded no instance.
    pub skipped: usize,
    /// Handlers that failed (deserialization or execution); failures are
    /// logged and isolated, never propagated.
    pub failed: usize,
}

/// Maps logical event names to their ordered subscriptions.
///
/// See the [module docs](self) for invariants and concurrency rules.
#[derive(Default)]
pub struct SubscriptionRegistry {
    inner: RwLock<HashMap<String, Vec<Subscription>>>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a typed handler for `E` under `E::event_name()`.
    ///
    /// `factory` is invoked once per dispatched message and may return `None`
    /// to signal that no handler instance is currently available (that
    /// message is then skipped for this subscription).
    ///
    /// # Errors
    ///
    /// [`EventBusError::DuplicateHandler`] if `H` is already registered for
    /// this event name.
    pub fn add_typed<E, H, F>(&self, factory: F) -> Result<(), EventBusError>
    where
        E: IntegrationEvent,
        H: IntegrationEventHandler<E> + 'static,
        F: Fn() -> Option<H> + Send + Sync + 'static,
    {
        let factory = Arc::new(factory);
        let dispatch: DispatchFn = Arc::new(move |body: Vec<u8>| {
            let factory = Arc::clone(&factory);
            async move {
                let Some(handler) = factory() else {
                    return Ok(DispatchOutcome::Skipped);
                };
                let event = E::from_bytes(&body)?;
                handler.handle(event).await?;
                Ok(DispatchOutcome::Handled)
            }
            .boxed()
        });

        self.insert(
            E::event_name(),
            Subscription {
                kind: SubscriptionKind::Typed,
                handler_name: std::any::type_name::<H>(),
                payload_type: Some(std::any::type_name::<E>()),
                dispatch,
            },
        )
    }

    /// Register a dynamic handler under an explicit event name.
    ///
    /// # Errors
    ///
    /// [`EventBusError::DuplicateHandler`] if `H` is already registered for
    /// this event name.
    pub fn add_dynamic<H, F>(&self, event_name: &str, factory: F) -> Result<(), EventBusError>
    where
        H: DynamicIntegrationEventHandler + 'static,
        F: Fn() -> Option<H> + Send + Sync + 'static,
    {
        let factory = Arc::new(factory);
        let dispatch: DispatchFn = Arc::new(move |body: Vec<u8>| {
            let factory = Arc::clone(&factory);
            async move {
                let Some(handler) = factory() else {
                    return Ok(DispatchOutcome::Skipped);
                };
                let payload: serde_json::Value = serde_json::from_slice(&body)?;
                handler.handle(payload).await?;
                Ok(DispatchOutcome::Handled)
            }
            .boxed()
        });

        self.insert(
            event_name,
            Subscription {
                kind: SubscriptionKind::Dynamic,
                handler_name: std::any::type_name::<H>(),
                payload_type: None,
                dispatch,
            },
        )
    }

    fn insert(&self, event_name: &str, subscription: Subscription) -> Result<(), EventBusError> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let entries = inner.entry(event_name.to_string()).or_default();

        if entries
            .iter()
            .any(|existing| existing.handler_name == subscription.handler_name)
        {
            return Err(EventBusError::DuplicateHandler {
                event_name: event_name.to_string(),
                handler: subscription.handler_name,
            });
        }

        tracing::debug!(
            event_name = %event_name,
            handler = %subscription.handler_name,
            kind = ?subscription.kind,
            "registered subscription"
        );
        entries.push(subscription);
        Ok(())
    }

    /// Remove the typed handler `H` from `E::event_name()`.
    pub fn remove_typed<E, H>(&self) -> Removal
    where
        E: IntegrationEvent,
        H: IntegrationEventHandler<E> + 'static,
    {
        self.remove(E::event_name(), std::any::type_name::<H>())
    }

    /// Remove the dynamic handler `H` from an explicit event name.
    pub fn remove_dynamic<H>(&self, event_name: &str) -> Removal
    where
        H: DynamicIntegrationEventHandler + 'static,
    {
        self.remove(event_name, std::any::type_name::<H>())
    }

    fn remove(&self, event_name: &str, handler_name: &str) -> Removal {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        let Some(entries) = inner.get_mut(event_name) else {
            tracing::debug!(
                event_name = %event_name,
                handler = %handler_name,
                "unsubscribe ignored: no subscriptions for event"
            );
            return Removal {
                removed: false,
                last_for_event: false,
            };
        };

        let before = entries.len();
        entries.retain(|s| s.handler_name != handler_name);
        let removed = entries.len() < before;

        let last_for_event = entries.is_empty();
        if last_for_event {
            inner.remove(event_name);
        }

        if removed {
            tracing::debug!(
                event_name = %event_name,
                handler = %handler_name,
                last_for_event,
                "removed subscription"
            );
        }

        Removal {
            removed,
            last_for_event: removed && last_for_event,
        }
    }

    /// Whether any handler is registered for this event name.
    #[must_use]
    pub fn has_subscriptions(&self, event_name: &str) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(event_name)
    }

    /// Snapshot the subscriptions for an event name, in registration order.
    #[must_use]
    pub fn handlers_for(&self, event_name: &str) -> Vec<Subscription> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event_name)
            .cloned()
            .unwrap_or_default()
    }

    /// The Rust type name recorded for this event's typed payload, if any
    /// typed subscription exists. Diagnostic only.
    #[must_use]
    pub fn payload_type_for(&self, event_name: &str) -> Option<&'static str> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event_name)?
            .iter()
            .find_map(|s| s.payload_type)
    }

    /// All event names with at least one subscription. This is the set of
    /// routing keys the consumer queue must be bound to.
    #[must_use]
    pub fn event_names(&self) -> Vec<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Whether no subscriptions exist at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// Drop every subscription.
    pub fn clear(&self) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Dispatch one message body to every subscription for `event_name`.
    ///
    /// Handlers run sequentially in registration order and each invocation is
    /// awaited. A failure in one subscription (deserialization or handler
    /// execution) is logged together with the raw payload and does not stop
    /// the remaining subscriptions: at-least-once delivery is best-effort
    /// per handler.
    pub async fn dispatch(&self, event_name: &str, body: &[u8]) -> DispatchSummary {
        let subscriptions = self.handlers_for(event_name);
        let mut summary = DispatchSummary {
            matched: subscriptions.len(),
            ..DispatchSummary::default()
        };

        for subscription in subscriptions {
            match subscription.dispatch(body.to_vec()).await {
                Ok(DispatchOutcome::Handled) => summary.handled += 1,
                Ok(DispatchOutcome::Skipped) => {
                    summary.skipped += 1;
                    tracing::debug!(
                        event_name = %event_name,
                        handler = %subscription.handler_name(),
                        "no handler instance resolved; skipping subscription"
                    );
                }
                Err(error) => {
                    summary.failed += 1;
                    tracing::warn!(
                        event_name = %event_name,
                        handler = %subscription.handler_name(),
                        error = %error,
                        body = %String::from_utf8_lossy(body),
                        "handler failed; continuing with remaining subscriptions"
                    );
                }
            }
        }

        summary
    }
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("SubscriptionRegistry")
            .field("event_names", &inner.keys().collect::<Vec<_>>())
            .finish()
    }
}
