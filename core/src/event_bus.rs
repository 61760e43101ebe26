//! Event bus abstraction for cross-service communication.
//!
//! This module provides the [`EventBus`] trait: publish integration events and
//! subscribe typed or dynamic handlers to them, without coupling either side
//! to a concrete broker. Implementations:
//!
//! - `RabbitMqEventBus` (in `omnibus-rabbitmq`): production, AMQP direct
//!   exchange with at-least-once delivery.
//! - `InMemoryEventBus` (in `omnibus-testing`): in-process dispatch for
//!   tests.
//!
//! # Delivery Semantics
//!
//! **At-least-once**, per handler, best effort:
//!
//! - A published event may be delivered more than once; handlers must be
//!   idempotent (the envelope id identifies one logical occurrence).
//! - Within a single message, handlers run sequentially in registration
//!   order; one handler's failure never affects the others.
//! - A message is acknowledged to the transport once dispatch completes,
//!   **even if a handler failed**; failures are logged with the raw payload
//!   instead of being redelivered. Consumers that cannot tolerate this should
//!   track the envelope id and reconcile out of band.
//! - Ordering across different event names is not guaranteed.
//!
//! # Example
//!
//! ```ignore
//! use omnibus_core::event_bus::EventBus;
//!
//! async fn wire_up(bus: &impl EventBus) -> Result<(), omnibus_core::event_bus::EventBusError> {
//!     // Typed subscription: the handler receives a deserialized OrderStarted.
//!     bus.subscribe::<OrderStarted, _, _>(|| Some(ClearBasketOnOrderStarted::new())).await?;
//!
//!     // Dynamic subscription: the handler receives the raw parsed JSON.
//!     bus.subscribe_dynamic::<_, _>("OrderCancelled", || Some(AuditLogHandler)).await?;
//!
//!     // Publish a fact for other services.
//!     bus.publish(&OrderStarted::new("alice")).await?;
//!     Ok(())
//! }
//! ```

use crate::event::IntegrationEvent;
use crate::handler::{DynamicIntegrationEventHandler, IntegrationEventHandler};
use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during event bus operations.
#[derive(Error, Debug)]
pub enum EventBusError {
    /// No open broker connection is available to perform the action.
    #[error("No broker connection is available to perform this action")]
    NotConnected,

    /// Establishing or re-establishing the broker connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Publishing an event failed after exhausting retries.
    #[error("Publish failed for event '{event_name}': {reason}")]
    PublishFailed {
        /// The logical event name that failed to publish.
        event_name: String,
        /// The reason for the failure.
        reason: String,
    },

    /// Declaring or (un)binding broker topology failed. Not retried.
    #[error("Topology operation failed ({context}): {reason}")]
    Topology {
        /// What was being declared or bound.
        context: String,
        /// The reason for the failure.
        reason: String,
    },

    /// An event could not be serialized to its wire form.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// The same handler type is already registered for this event name.
    #[error("Handler '{handler}' is already registered for event '{event_name}'")]
    DuplicateHandler {
        /// The event name the duplicate registration targeted.
        event_name: String,
        /// The handler type that was already present.
        handler: &'static str,
    },
}

/// Publish/subscribe surface of the integration event bus.
///
/// # Handler Factories
///
/// Subscriptions take a factory closure instead of a handler instance. The
/// factory is invoked once per dispatched message, so concurrent messages get
/// independent handler instances with independent unit-of-work scopes.
/// Returning `None` signals that no handler is currently available; the
/// message is skipped for that subscription and still acknowledged.
///
/// # Dyn Compatibility
///
/// The subscribe methods are generic over event and handler types, so this
/// trait is used with static dispatch (`&impl EventBus` or concrete types),
/// not as `dyn EventBus`.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish an integration event under its logical event name.
    ///
    /// # Errors
    ///
    /// - [`EventBusError::Serialization`] if the event cannot be encoded.
    /// - [`EventBusError::NotConnected`] if no connection could be
    ///   established.
    /// - [`EventBusError::PublishFailed`] once transient-failure retries are
    ///   exhausted.
    async fn publish<E: IntegrationEvent>(&self, event: &E) -> Result<(), EventBusError>;

    /// Subscribe a typed handler to `E::event_name()`.
    ///
    /// The first subscription for an event name binds the consumer queue to
    /// that routing key; later subscriptions only extend the in-memory
    /// registry.
    ///
    /// # Errors
    ///
    /// - [`EventBusError::DuplicateHandler`] if `H` is already subscribed to
    ///   this event.
    /// - [`EventBusError::Topology`] if queue binding fails.
    async fn subscribe<E, H, F>(&self, factory: F) -> Result<(), EventBusError>
    where
        E: IntegrationEvent,
        H: IntegrationEventHandler<E> + 'static,
        F: Fn() -> Option<H> + Send + Sync + 'static;

    /// Subscribe a dynamic handler to an explicit event name.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`subscribe`](EventBus::subscribe).
    async fn subscribe_dynamic<H, F>(
        &self,
        event_name: &str,
        factory: F,
    ) -> Result<(), EventBusError>
    where
        H: DynamicIntegrationEventHandler + 'static,
        F: Fn() -> Option<H> + Send + Sync + 'static;

    /// Remove the typed handler `H` from `E::event_name()`.
    ///
    /// Removing the last handler for an event name unbinds its routing key;
    /// removing the last handler overall tears the consumer down until the
    /// next subscription.
    ///
    /// # Errors
    ///
    /// [`EventBusError::Topology`] if queue unbinding fails. Removing a
    /// handler that was never subscribed is a no-op.
    async fn unsubscribe<E, H>(&self) -> Result<(), EventBusError>
    where
        E: IntegrationEvent,
        H: IntegrationEventHandler<E> + 'static;

    /// Remove the dynamic handler `H` from an explicit event name.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`unsubscribe`](EventBus::unsubscribe).
    async fn unsubscribe_dynamic<H>(&self, event_name: &str) -> Result<(), EventBusError>
    where
        H: DynamicIntegrationEventHandler + 'static;

    /// Stop consuming and clear every subscription.
    ///
    /// Idempotent. A shared broker connection is left open for other users;
    /// closing it is its owner's responsibility.
    async fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_render_with_context() {
        let error = EventBusError::PublishFailed {
            event_name: "OrderStarted".to_string(),
            reason: "broker unreachable".to_string(),
        };
        let rendered = error.to_string();
        assert!(rendered.contains("OrderStarted"));
        assert!(rendered.contains("broker unreachable"));

        let duplicate = EventBusError::DuplicateHandler {
            event_name: "OrderStarted".to_string(),
            handler: "my_crate::Handler",
        };
        assert!(duplicate.to_string().contains("already registered"));
    }
}
