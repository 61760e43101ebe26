//! Handler traits for consuming integration events.
//!
//! Two flavors of handler exist, mirroring the two ways a service subscribes:
//!
//! - [`IntegrationEventHandler<E>`]: a *typed* handler. The bus deserializes
//!   the message body into `E` before invoking it.
//! - [`DynamicIntegrationEventHandler`]: a *dynamic* handler registered
//!   against an event name string. It receives the raw parsed JSON and decides
//!   for itself what to do with it. Useful for generic consumers such as audit
//!   logs or webhooks that do not want a compile-time payload type.
//!
//! Handlers return [`anyhow::Result`] so application code can bubble up
//! whatever error type it already uses. A handler error is logged by the bus
//! and never affects other handlers or other messages.
//!
//! # Handler Instances
//!
//! The bus does not hold a handler instance. Subscribing takes a *factory*
//! closure invoked once per dispatched message, giving every message an
//! independent handler instance (and therefore an independent unit-of-work
//! scope if the factory wires one in). A factory returning `None` means "no
//! handler available right now"; the subscription is skipped for that message.

use crate::event::IntegrationEvent;
use async_trait::async_trait;

/// Handles a single concrete integration event type.
///
/// # Example
///
/// ```
/// use omnibus_core::event::{EventEnvelope, IntegrationEvent};
/// use omnibus_core::handler::IntegrationEventHandler;
/// use async_trait::async_trait;
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Clone, Debug, Serialize, Deserialize)]
/// struct OrderStarted {
///     #[serde(flatten)]
///     envelope: EventEnvelope,
///     user_id: String,
/// }
///
/// impl IntegrationEvent for OrderStarted {
///     fn event_name() -> &'static str { "OrderStarted" }
///     fn envelope(&self) -> &EventEnvelope { &self.envelope }
/// }
///
/// struct ClearBasketOnOrderStarted;
///
/// #[async_trait]
/// impl IntegrationEventHandler<OrderStarted> for ClearBasketOnOrderStarted {
///     async fn handle(&self, event: OrderStarted) -> anyhow::Result<()> {
///         tracing::info!(user_id = %event.user_id, "clearing basket");
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait IntegrationEventHandler<E: IntegrationEvent>: Send + Sync {
    /// Apply this event's side effects.
    ///
    /// # Errors
    ///
    /// Any error is caught by the dispatcher, logged with the raw message,
    /// and does not stop delivery to other handlers.
    async fn handle(&self, event: E) -> anyhow::Result<()>;
}

/// Handles events subscribed by name, without a compile-time payload type.
///
/// The handler receives the message body parsed as [`serde_json::Value`],
/// exactly as published.
///
/// # Example
///
/// ```
/// use omnibus_core::handler::DynamicIntegrationEventHandler;
/// use async_trait::async_trait;
///
/// struct AuditLogHandler;
///
/// #[async_trait]
/// impl DynamicIntegrationEventHandler for AuditLogHandler {
///     async fn handle(&self, payload: serde_json::Value) -> anyhow::Result<()> {
///         tracing::info!(payload = %payload, "audit");
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait DynamicIntegrationEventHandler: Send + Sync {
    /// Apply this event's side effects given the raw structured payload.
    ///
    /// # Errors
    ///
    /// Any error is caught by the dispatcher, logged with the raw message,
    /// and does not stop delivery to other handlers.
    async fn handle(&self, payload: serde_json::Value) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventEnvelope;
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicUsize, Ordering};

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

    struct CountingHandler {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl IntegrationEventHandler<Ping> for CountingHandler {
        async fn handle(&self, _event: Ping) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn typed_handler_is_invocable_through_the_trait() {
        let handler = CountingHandler {
            calls: AtomicUsize::new(0),
        };

        let event = Ping {
            envelope: EventEnvelope::new(),
        };
        let result = handler.handle(event).await;

        assert!(result.is_ok());
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    struct RejectEverything;

    #[async_trait]
    impl DynamicIntegrationEventHandler for RejectEverything {
        async fn handle(&self, _payload: serde_json::Value) -> anyhow::Result<()> {
            anyhow::bail!("nope")
        }
    }

    #[tokio::test]
    async fn dynamic_handler_errors_surface_to_the_caller() {
        let handler = RejectEverything;
        let result = handler.handle(serde_json::json!({ "k": 1 })).await;
        assert!(result.is_err());
    }
}
