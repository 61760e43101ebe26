//! Relaxed JSON decoding for inbound event payloads.
//!
//! Different services publish JSON with different field-name conventions:
//! `orderId`, `OrderId`, `order_id` all mean the same field. The bus must not
//! force every team onto one convention, so typed payloads are decoded with
//! *relaxed field matching*: an incoming key matches a struct field when the
//! two are equal after lowercasing and ignoring `_`/`-` separators.
//!
//! # How It Works
//!
//! [`from_slice_relaxed`] parses the bytes into a [`serde_json::Value`] and
//! then drives the target type's `Deserialize` impl through an adapter:
//!
//! - When the target is a plain struct, serde announces the expected field
//!   names and incoming keys are remapped onto them by relaxed comparison.
//! - When the target deserializes as a map (which is how structs containing
//!   `#[serde(flatten)]` present themselves), the expected names are not
//!   visible, so incoming keys are normalized to `snake_case` instead.
//!   That is enough to line up idiomatic camelCase/PascalCase wire names with
//!   idiomatic Rust field names.
//! - `serde_json::Value`-typed fields receive the payload verbatim, with
//!   original key spelling preserved.
//!
//! The one observable trade-off: a `HashMap<String, _>` field inside a typed
//! event has its keys normalized too. Events whose map keys carry meaningful
//! casing should use a dynamic subscription and read the raw payload.
//!
//! # Example
//!
//! ```
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct OrderStarted {
//!     order_id: u64,
//!     buyer_name: String,
//! }
//!
//! let body = br#"{"orderId": 42, "BuyerName": "alice"}"#;
//! let event: OrderStarted = omnibus_core::json::from_slice_relaxed(body).unwrap();
//! assert_eq!(event.order_id, 42);
//! assert_eq!(event.buyer_name, "alice");
//! ```

use serde::de::value::StringDeserializer;
use serde::de::{self, DeserializeOwned, Deserializer, IntoDeserializer, MapAccess, SeqAccess, Visitor};
use serde_json::Value;

/// Decode `T` from JSON bytes with relaxed field-name matching.
///
/// # Errors
///
/// Returns the underlying [`serde_json::Error`] when the bytes are not valid
/// JSON or do not structurally match `T`.
pub fn from_slice_relaxed<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, serde_json::Error> {
    let value: Value = serde_json::from_slice(bytes)?;
    from_value_relaxed(value)
}

/// Decode `T` from an already-parsed [`Value`] with relaxed field-name
/// matching.
///
/// # Errors
///
/// Returns a [`serde_json::Error`] when the value does not structurally
/// match `T`.
pub fn from_value_relaxed<T: DeserializeOwned>(value: Value) -> Result<T, serde_json::Error> {
    T::deserialize(Relaxed(value))
}

/// True when two field names are equal ignoring ASCII case and `_`/`-`
/// separators.
fn names_match(expected: &str, actual: &str) -> bool {
    let mut a = expected
        .chars()
        .filter(|c| *c != '_' && *c != '-')
        .map(|c| c.to_ascii_lowercase());
    let mut b = actual
        .chars()
        .filter(|c| *c != '_' && *c != '-')
        .map(|c| c.to_ascii_lowercase());
    loop {
        match (a.next(), b.next()) {
            (None, None) => return true,
            (Some(x), Some(y)) if x == y => {}
            _ => return false,
        }
    }
}

/// Convert an idiomatic camelCase/PascalCase/kebab-case key to `snake_case`.
fn to_snake_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    let mut prev_lower_or_digit = false;
    for c in key.chars() {
        if c == '-' {
            out.push('_');
            prev_lower_or_digit = false;
        } else if c.is_ascii_uppercase() {
            if prev_lower_or_digit {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
            prev_lower_or_digit = false;
        } else {
            prev_lower_or_digit = c.is_ascii_lowercase() || c.is_ascii_digit();
            out.push(c);
        }
    }
    out
}

/// Deserializer adapter applying relaxed key matching over a parsed [`Value`].
struct Relaxed(Value);

/// How map keys should be rewritten while walking an object.
enum KeyPolicy {
    /// Remap onto the given expected field names by relaxed comparison;
    /// unknown keys pass through unchanged.
    Fields(&'static [&'static str]),
    /// Normalize every key to `snake_case`.
    SnakeCase,
}

struct RelaxedMap {
    iter: serde_json::map::IntoIter,
    pending: Option<Value>,
    policy: KeyPolicy,
}

impl RelaxedMap {
    fn new(map: serde_json::Map<String, Value>, policy: KeyPolicy) -> Self {
        Self {
            iter: map.into_iter(),
            pending: None,
            policy,
        }
    }
}

impl<'de> MapAccess<'de> for RelaxedMap {
    type Error = serde_json::Error;

    fn next_key_seed<K>(&mut self, seed: K) -> Result<Option<K::Value>, Self::Error>
    where
        K: de::DeserializeSeed<'de>,
    {
        let Some((key, value)) = self.iter.next() else {
            return Ok(None);
        };
        self.pending = Some(value);

        let rewritten = match self.policy {
            KeyPolicy::Fields(fields) => fields
                .iter()
                .find(|field| names_match(field, &key))
                .map_or(key, |field| (*field).to_string()),
            KeyPolicy::SnakeCase => to_snake_case(&key),
        };

        let key_de: StringDeserializer<serde_json::Error> = rewritten.into_deserializer();
        seed.deserialize(key_de).map(Some)
    }

    fn next_value_seed<V>(&mut self, seed: V) -> Result<V::Value, Self::Error>
    where
        V: de::DeserializeSeed<'de>,
    {
        let value = self
            .pending
            .take()
            .ok_or_else(|| de::Error::custom("next_value_seed called before next_key_seed"))?;
        seed.deserialize(Relaxed(value))
    }
}

struct RelaxedSeq {
    iter: std::vec::IntoIter<Value>,
}

impl<'de> SeqAccess<'de> for RelaxedSeq {
    type Error = serde_json::Error;

    fn next_element_seed<T>(&mut self, seed: T) -> Result<Option<T::Value>, Self::Error>
    where
        T: de::DeserializeSeed<'de>,
    {
        self.iter
            .next()
            .map(|value| seed.deserialize(Relaxed(value)))
            .transpose()
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.iter.len())
    }
}

impl<'de> Deserializer<'de> for Relaxed {
    type Error = serde_json::Error;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        // Self-describing targets (serde_json::Value fields, dynamic payload
        // inspection) get the data verbatim, original key spelling included.
        self.0.deserialize_any(visitor)
    }

    fn deserialize_struct<V>(
        self,
        name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        match self.0 {
            Value::Object(map) => visitor.visit_map(RelaxedMap::new(map, KeyPolicy::Fields(fields))),
            other => other.deserialize_struct(name, fields, visitor),
        }
    }

    fn deserialize_map<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        // Structs containing #[serde(flatten)] deserialize through here, so
        // the expected field names are unknown; snake_case normalization is
        // the best available approximation.
        match self.0 {
            Value::Object(map) => visitor.visit_map(RelaxedMap::new(map, KeyPolicy::SnakeCase)),
            other => other.deserialize_map(visitor),
        }
    }

    fn deserialize_seq<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        match self.0 {
            Value::Array(values) => visitor.visit_seq(RelaxedSeq {
                iter: values.into_iter(),
            }),
            other => other.deserialize_seq(visitor),
        }
    }

    fn deserialize_tuple<V>(self, _len: usize, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.deserialize_seq(visitor)
    }

    fn deserialize_option<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        match self.0 {
            Value::Null => visitor.visit_none(),
            other => visitor.visit_some(Relaxed(other)),
        }
    }

    fn deserialize_newtype_struct<V>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        visitor.visit_newtype_struct(Relaxed(self.0))
    }

    fn deserialize_enum<V>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.0.deserialize_enum(name, variants, visitor)
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf unit unit_struct identifier ignored_any
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Panics: tests fail loudly on malformed fixtures

    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Order {
        order_id: u64,
        buyer_name: String,
    }

    #[test]
    fn camel_case_keys_match_snake_case_fields() {
        let order: Order =
            from_slice_relaxed(br#"{"orderId": 42, "buyerName": "alice"}"#).unwrap();
        assert_eq!(order.order_id, 42);
        assert_eq!(order.buyer_name, "alice");
    }

    #[test]
    fn pascal_case_keys_match_snake_case_fields() {
        let order: Order =
            from_slice_relaxed(br#"{"OrderId": 42, "BuyerName": "alice"}"#).unwrap();
        assert_eq!(order.order_id, 42);
    }

    #[test]
    fn exact_keys_still_match() {
        let order: Order =
            from_slice_relaxed(br#"{"order_id": 1, "buyer_name": "bob"}"#).unwrap();
        assert_eq!(
            order,
            Order {
                order_id: 1,
                buyer_name: "bob".to_string()
            }
        );
    }

    #[test]
    fn fully_uppercased_keys_match_plain_structs() {
        let order: Order = from_slice_relaxed(br#"{"ORDERID": 9, "BUYER_NAME": "eve"}"#).unwrap();
        assert_eq!(order.order_id, 9);
        assert_eq!(order.buyer_name, "eve");
    }

    #[derive(Debug, Deserialize)]
    struct Shipment {
        address: Address,
        items: Vec<LineItem>,
    }

    #[derive(Debug, Deserialize)]
    struct Address {
        zip_code: String,
    }

    #[derive(Debug, Deserialize)]
    struct LineItem {
        product_id: u32,
    }

    #[test]
    fn matching_applies_recursively() {
        let shipment: Shipment = from_slice_relaxed(
            br#"{"Address": {"ZipCode": "10001"}, "Items": [{"productId": 5}, {"ProductId": 6}]}"#,
        )
        .unwrap();
        assert_eq!(shipment.address.zip_code, "10001");
        assert_eq!(shipment.items.len(), 2);
        assert_eq!(shipment.items[1].product_id, 6);
    }

    #[derive(Debug, Deserialize)]
    struct WithFlatten {
        #[serde(flatten)]
        head: Head,
        order_id: u64,
    }

    #[derive(Debug, Deserialize)]
    struct Head {
        created_at: String,
    }

    #[test]
    fn flattened_structs_accept_camel_case_keys() {
        let decoded: WithFlatten =
            from_slice_relaxed(br#"{"CreatedAt": "2026-08-07", "OrderId": 3}"#).unwrap();
        assert_eq!(decoded.head.created_at, "2026-08-07");
        assert_eq!(decoded.order_id, 3);
    }

    #[derive(Debug, Deserialize)]
    struct WithRaw {
        payload: Value,
    }

    #[test]
    fn value_fields_keep_original_key_spelling() {
        let decoded: WithRaw =
            from_slice_relaxed(br#"{"Payload": {"KeepMe": 1}}"#).unwrap();
        assert!(decoded.payload.get("KeepMe").is_some());
    }

    #[derive(Debug, Deserialize)]
    struct WithOption {
        note: Option<String>,
    }

    #[test]
    fn optional_fields_decode_from_null_and_value() {
        let none: WithOption = from_slice_relaxed(br#"{"Note": null}"#).unwrap();
        assert!(none.note.is_none());

        let some: WithOption = from_slice_relaxed(br#"{"Note": "hi"}"#).unwrap();
        assert_eq!(some.note.as_deref(), Some("hi"));
    }

    #[test]
    fn missing_fields_still_error() {
        let result: Result<Order, _> = from_slice_relaxed(br#"{"orderId": 42}"#);
        assert!(result.is_err());
    }

    #[test]
    fn snake_case_conversion_handles_acronym_runs() {
        assert_eq!(to_snake_case("OrderID"), "order_id");
        assert_eq!(to_snake_case("UserId"), "user_id");
        assert_eq!(to_snake_case("kebab-key"), "kebab_key");
        assert_eq!(to_snake_case("already_snake"), "already_snake");
    }

    #[test]
    fn name_matching_ignores_case_and_separators() {
        assert!(names_match("order_id", "orderId"));
        assert!(names_match("order_id", "OrderId"));
        assert!(names_match("order_id", "ORDER-ID"));
        assert!(!names_match("order_id", "order"));
        assert!(!names_match("order_id", "order_idx"));
    }
}
