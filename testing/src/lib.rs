//! # Omnibus Testing
//!
//! Testing utilities for the Omnibus integration event bus.
//!
//! This crate provides:
//! - [`InMemoryEventBus`]: the full [`EventBus`] surface dispatched through
//!   a [`SubscriptionRegistry`] in process, with no broker. Events published
//!   here go through the same serialize → dispatch → deserialize path as the
//!   RabbitMQ bus, so handler and payload behavior can be pinned without
//!   Docker.
//! - Handler fixtures: [`RecordingHandler`], [`FailingHandler`],
//!   [`DynamicRecordingHandler`].
//! - [`init_tracing`]: opt-in log output while debugging a test.
//!
//! # Example
//!
//! ```
//! use omnibus_core::event::{EventEnvelope, IntegrationEvent};
//! use omnibus_core::event_bus::EventBus;
//! use omnibus_testing::{InMemoryEventBus, RecordingHandler};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Clone, Debug, Serialize, Deserialize)]
//! struct OrderStarted {
//!     #[serde(flatten)]
//!     envelope: EventEnvelope,
//!     user_id: String,
//! }
//!
//! impl IntegrationEvent for OrderStarted {
//!     fn event_name() -> &'static str { "OrderStarted" }
//!     fn envelope(&self) -> &EventEnvelope { &self.envelope }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), omnibus_core::event_bus::EventBusError> {
//! let bus = InMemoryEventBus::new();
//! let handler = RecordingHandler::<OrderStarted>::new();
//! let probe = handler.clone();
//!
//! bus.subscribe::<OrderStarted, _, _>(move || Some(handler.clone())).await?;
//! bus.publish(&OrderStarted {
//!     envelope: EventEnvelope::new(),
//!     user_id: "alice".to_string(),
//! })
//! .await?;
//!
//! assert!(probe.was_handled());
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use omnibus_core::event::IntegrationEvent;
use omnibus_core::event_bus::{EventBus, EventBusError};
use omnibus_core::handler::{DynamicIntegrationEventHandler, IntegrationEventHandler};
use omnibus_core::subscriptions::SubscriptionRegistry;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Install a compact tracing subscriber for test debugging.
///
/// Honors `RUST_LOG`; calling it more than once is harmless.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// In-process event bus for tests.
///
/// Publishing serializes the event to its JSON wire form and dispatches it
/// synchronously through the subscription registry, the same code path the
/// broker-backed bus drives from its consume loop. Queue bind/unbind
/// decisions are recorded instead of sent to a broker, so tests can assert
/// topology transitions.
#[derive(Default)]
pub struct InMemoryEventBus {
    registry: SubscriptionRegistry,
    published: Mutex<Vec<(String, Vec<u8>)>>,
    bound: Mutex<Vec<String>>,
    unbound: Mutex<Vec<String>>,
    closed: AtomicBool,
}

impl InMemoryEventBus {
    /// Create an empty in-memory bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The underlying subscription registry, for direct assertions.
    #[must_use]
    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// Whether [`close`](EventBus::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Event names and bodies published so far, in order.
    #[must_use]
    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Event names that transitioned from unsubscribed to subscribed (the
    /// moments the broker bus would bind its queue), in order.
    #[must_use]
    pub fn bind_log(&self) -> Vec<String> {
        self.bound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Event names whose last subscription was removed (the moments the
    /// broker bus would unbind its queue), in order.
    #[must_use]
    pub fn unbind_log(&self) -> Vec<String> {
        self.unbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record_bind_if_first(&self, event_name: &str) {
        if !self.registry.has_subscriptions(event_name) {
            self.bound
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(event_name.to_string());
        }
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish<E: IntegrationEvent>(&self, event: &E) -> Result<(), EventBusError> {
        let event_name = E::event_name();
        let body = event
            .to_bytes()
            .map_err(|error| EventBusError::Serialization(error.to_string()))?;

        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((event_name.to_string(), body.clone()));

        let summary = self.registry.dispatch(event_name, &body).await;
        if summary.matched == 0 {
            tracing::debug!(event_name = %event_name, "no subscription for published event");
        }
        Ok(())
    }

    async fn subscribe<E, H, F>(&self, factory: F) -> Result<(), EventBusError>
    where
        E: IntegrationEvent,
        H: IntegrationEventHandler<E> + 'static,
        F: Fn() -> Option<H> + Send + Sync + 'static,
    {
        self.record_bind_if_first(E::event_name());
        self.registry.add_typed::<E, H, F>(factory)
    }

    async fn subscribe_dynamic<H, F>(
        &self,
        event_name: &str,
        factory: F,
    ) -> Result<(), EventBusError>
    where
        H: DynamicIntegrationEventHandler + 'static,
        F: Fn() -> Option<H> + Send + Sync + 'static,
    {
        self.record_bind_if_first(event_name);
        self.registry.add_dynamic::<H, F>(event_name, factory)
    }

    async fn unsubscribe<E, H>(&self) -> Result<(), EventBusError>
    where
        E: IntegrationEvent,
        H: IntegrationEventHandler<E> + 'static,
    {
        let removal = self.registry.remove_typed::<E, H>();
        if removal.last_for_event {
            self.unbound
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(E::event_name().to_string());
        }
        Ok(())
    }

    async fn unsubscribe_dynamic<H>(&self, event_name: &str) -> Result<(), EventBusError>
    where
        H: DynamicIntegrationEventHandler + 'static,
    {
        let removal = self.registry.remove_dynamic::<H>(event_name);
        if removal.last_for_event {
            self.unbound
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(event_name.to_string());
        }
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.registry.clear();
    }
}

/// Typed handler that records every event it receives.
///
/// Clones share the same recording, so keep one clone in the test and move
/// another into the subscription factory.
pub struct RecordingHandler<E> {
    seen: Arc<Mutex<Vec<E>>>,
}

impl<E> RecordingHandler<E> {
    /// Create a handler with an empty recording.
    #[must_use]
    pub fn new() -> Self {
        Self {
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Whether at least one event was handled.
    #[must_use]
    pub fn was_handled(&self) -> bool {
        !self
            .seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// Number of events handled so far.
    #[must_use]
    pub fn handled_count(&self) -> usize {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl<E: Clone> RecordingHandler<E> {
    /// Snapshot of the events handled so far, in order.
    #[must_use]
    pub fn events(&self) -> Vec<E> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl<E> Default for RecordingHandler<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for RecordingHandler<E> {
    fn clone(&self) -> Self {
        Self {
            seen: Arc::clone(&self.seen),
        }
    }
}

#[async_trait]
impl<E: IntegrationEvent> IntegrationEventHandler<E> for RecordingHandler<E> {
    async fn handle(&self, event: E) -> anyhow::Result<()> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
        Ok(())
    }
}

/// Typed handler that always fails, for failure-isolation tests.
pub struct FailingHandler<E> {
    _event: PhantomData<fn(E)>,
}

impl<E> FailingHandler<E> {
    /// Create a failing handler.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _event: PhantomData,
        }
    }
}

impl<E> Default for FailingHandler<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for FailingHandler<E> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

#[async_trait]
impl<E: IntegrationEvent> IntegrationEventHandler<E> for FailingHandler<E> {
    async fn handle(&self, _event: E) -> anyhow::Result<()> {
        anyhow::bail!("handler failure requested by test")
    }
}

/// Dynamic handler that records every raw payload it receives.
#[derive(Clone, Default)]
pub struct DynamicRecordingHandler {
    payloads: Arc<Mutex<Vec<serde_json::Value>>>,
}

impl DynamicRecordingHandler {
    /// Create a handler with an empty recording.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the payloads handled so far, in order.
    #[must_use]
    pub fn payloads(&self) -> Vec<serde_json::Value> {
        self.payloads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl DynamicIntegrationEventHandler for DynamicRecordingHandler {
    async fn handle(&self, payload: serde_json::Value) -> anyhow::Result<()> {
        self.payloads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use omnibus_core::event::EventEnvelope;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, Serialize, Deserialize)]
    struct Ping {
        #[serde(flatten)]
        envelope: EventEnvelope,
    }

    impl IntegrationEvent for Ping {
        fn event_name() -> &'static str {
            "Ping"
        }

        fn envelope(&self) -> &EventEnvelope {
            &self.envelope
        }
    }

    #[tokio::test]
    #[allow(clippy::expect_used)] // Panics: Test will fail if the bus rejects the fixture
    async fn records_publishes_even_without_subscribers() {
        let bus = InMemoryEventBus::new();
        bus.publish(&Ping {
            envelope: EventEnvelope::new(),
        })
        .await
        .expect("publish succeeds");

        let published = bus.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "Ping");
    }

    #[tokio::test]
    #[allow(clippy::expect_used)] // Panics: Test will fail if the bus rejects the fixture
    async fn close_clears_subscriptions() {
        let bus = InMemoryEventBus::new();
        let handler = RecordingHandler::<Ping>::new();
        bus.subscribe::<Ping, _, _>(move || Some(handler.clone()))
            .await
            .expect("subscribe succeeds");

        bus.close().await;
        assert!(bus.registry().is_empty());
        assert!(bus.is_closed());
    }
}
