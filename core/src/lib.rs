//! # Omnibus Core
//!
//! Broker-agnostic building blocks for the Omnibus integration event bus.
//!
//! Services use an integration event bus to publish domain-significant facts
//! ("OrderStarted", "OrderStatusChangedToPaid") and to react to facts
//! published by other services, without direct coupling. This crate defines
//! everything that does not touch a broker:
//!
//! - [`event`]: the [`IntegrationEvent`](event::IntegrationEvent) trait and
//!   the identity/timestamp [`EventEnvelope`](event::EventEnvelope)
//! - [`handler`]: typed and dynamic handler traits
//! - [`subscriptions`]: the in-memory
//!   [`SubscriptionRegistry`](subscriptions::SubscriptionRegistry) mapping
//!   event names to dispatch closures, plus the per-message dispatch walk
//! - [`json`]: relaxed (case-insensitive) decoding of inbound payloads
//! - [`event_bus`]: the [`EventBus`](event_bus::EventBus) trait and error
//!   taxonomy implemented by the broker crates
//!
//! The RabbitMQ transport lives in `omnibus-rabbitmq`; in-memory test doubles
//! live in `omnibus-testing`.
//!
//! # Example
//!
//! ```
//! use omnibus_core::event::{EventEnvelope, IntegrationEvent};
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
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use uuid::Uuid;

pub mod event;
pub mod event_bus;
pub mod handler;
pub mod json;
pub mod subscriptions;
