//! Integration event trait and envelope types.
//!
//! An integration event is a fact broadcast across service boundaries: something
//! that already happened in one service and that other services may react to.
//! Every event carries an [`EventEnvelope`] (a unique identity and a creation
//! timestamp) plus whatever payload fields the concrete event type defines.
//!
//! # Wire Format
//!
//! Events are serialized as UTF-8 JSON. The envelope is flattened into the
//! payload object so the wire form is a single flat JSON document:
//!
//! ```json
//! {
//!   "id": "5c1ed6e7-4f92-4a1a-8c90-1f0e9f6f9a01",
//!   "created_at": "2026-08-07T12:00:00Z",
//!   "order_id": 42,
//!   "buyer_name": "alice"
//! }
//! ```
//!
//! JSON keeps the bus interoperable with services written in other languages,
//! which is the whole point of an *integration* event.
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
//!     order_id: u64,
//! }
//!
//! impl IntegrationEvent for OrderStarted {
//!     fn event_name() -> &'static str {
//!         "OrderStarted"
//!     }
//!
//!     fn envelope(&self) -> &EventEnvelope {
//!         &self.envelope
//!     }
//! }
//!
//! let event = OrderStarted { envelope: EventEnvelope::new(), order_id: 42 };
//! assert_eq!(OrderStarted::event_name(), "OrderStarted");
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use uuid::Uuid;

/// Errors from event serialization and deserialization.
#[derive(Error, Debug)]
pub enum EventError {
    /// Failed to serialize an event to JSON bytes.
    #[error("Failed to serialize event: {0}")]
    Serialization(String),

    /// Failed to deserialize an event from JSON bytes.
    #[error("Failed to deserialize event: {0}")]
    Deserialization(String),
}

/// Identity and timestamp shared by every integration event.
///
/// The `id` is assigned once at construction and never mutated. It identifies
/// one logical occurrence of the event for idempotency checks and tracing on
/// the consumer side; the broker itself does not deduplicate.
///
/// Embed the envelope with `#[serde(flatten)]` so `id` and `created_at`
/// appear as top-level fields of the serialized event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique identity of this logical occurrence.
    pub id: Uuid,
    /// UTC timestamp taken when the event was constructed.
    pub created_at: DateTime<Utc>,
}

impl EventEnvelope {
    /// Create a fresh envelope with a new random id and the current time.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
        }
    }

    /// Reconstruct an envelope from known parts, e.g. when replaying a
    /// captured event.
    #[must_use]
    pub const fn from_parts(id: Uuid, created_at: DateTime<Utc>) -> Self {
        Self { id, created_at }
    }
}

impl Default for EventEnvelope {
    fn default() -> Self {
        Self::new()
    }
}

/// A fact published across service boundaries through the event bus.
///
/// # Event Naming
///
/// [`event_name`](IntegrationEvent::event_name) returns the logical name used
/// as the broker routing key and as the subscription registry key. The name is
/// declared explicitly rather than derived from the Rust type so it stays
/// stable across refactors and process restarts, and so publishers written in
/// other languages can agree on it.
///
/// # Thread Safety
///
/// Events must be `Send + Sync + 'static` so they can cross task boundaries
/// inside the bus.
pub trait IntegrationEvent: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The stable logical name of this event, e.g. `"OrderStarted"`.
    ///
    /// Used as the routing key when publishing and as the registry key when
    /// subscribing. Two types must not share a name within one bus.
    fn event_name() -> &'static str;

    /// Access the identity/timestamp envelope of this event.
    fn envelope(&self) -> &EventEnvelope;

    /// The unique id of this logical occurrence.
    fn id(&self) -> Uuid {
        self.envelope().id
    }

    /// When this event was constructed.
    fn created_at(&self) -> DateTime<Utc> {
        self.envelope().created_at
    }

    /// Serialize this event to its UTF-8 JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Serialization`] if the payload cannot be
    /// represented as JSON (e.g. a map with non-string keys).
    fn to_bytes(&self) -> Result<Vec<u8>, EventError> {
        serde_json::to_vec(self).map_err(|e| EventError::Serialization(e.to_string()))
    }

    /// Deserialize an event from its JSON wire form.
    ///
    /// Field names are matched case-insensitively (see [`crate::json`]) so
    /// events published by services with different casing conventions still
    /// decode.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Deserialization`] if the bytes are not valid
    /// JSON or do not match this event type.
    fn from_bytes(bytes: &[u8]) -> Result<Self, EventError>
    where
        Self: Sized,
    {
        crate::json::from_slice_relaxed(bytes)
            .map_err(|e| EventError::Deserialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, Serialize, Deserialize)]
    struct OrderStatusChangedToPaid {
        #[serde(flatten)]
        envelope: EventEnvelope,
        order_id: u64,
        order_status: String,
    }

    impl IntegrationEvent for OrderStatusChangedToPaid {
        fn event_name() -> &'static str {
            "OrderStatusChangedToPaid"
        }

        fn envelope(&self) -> &EventEnvelope {
            &self.envelope
        }
    }

    #[test]
    fn envelope_assigns_unique_ids() {
        let a = EventEnvelope::new();
        let b = EventEnvelope::new();
        assert_ne!(a.id, b.id);
    }

    #[test]
    #[allow(clippy::expect_used)] // Panics: Test will fail if serialization fails
    fn event_roundtrips_through_json() {
        let event = OrderStatusChangedToPaid {
            envelope: EventEnvelope::new(),
            order_id: 42,
            order_status: "paid".to_string(),
        };

        let bytes = event.to_bytes().expect("serialization should succeed");
        let decoded = OrderStatusChangedToPaid::from_bytes(&bytes)
            .expect("deserialization should succeed");

        assert_eq!(decoded.id(), event.id());
        assert_eq!(decoded.order_id, 42);
        assert_eq!(decoded.order_status, "paid");
    }

    #[test]
    #[allow(clippy::expect_used)] // Panics: Test will fail if serialization fails
    fn envelope_is_flattened_on_the_wire() {
        let event = OrderStatusChangedToPaid {
            envelope: EventEnvelope::new(),
            order_id: 7,
            order_status: "paid".to_string(),
        };

        let value: serde_json::Value =
            serde_json::from_slice(&event.to_bytes().expect("serialize")).expect("valid json");

        // id and created_at sit next to the payload fields, not nested.
        assert!(value.get("id").is_some());
        assert!(value.get("created_at").is_some());
        assert!(value.get("order_id").is_some());
        assert!(value.get("envelope").is_none());
    }

    #[test]
    fn envelope_reconstructs_from_parts() {
        let original = EventEnvelope::new();
        let rebuilt = EventEnvelope::from_parts(original.id, original.created_at);
        assert_eq!(original, rebuilt);
    }
}
