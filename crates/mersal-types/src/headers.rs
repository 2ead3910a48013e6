//! Message headers: an insertion-ordered map of string keys to primitive values.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Well-known header key carrying the message's unique identifier.
pub const MESSAGE_ID: &str = "message_id";
/// Well-known header key carrying the message's logical type name.
pub const MESSAGE_TYPE: &str = "message_type";
/// Well-known header key carrying the wall-clock send time.
pub const SENT_TIME: &str = "sent_time";
/// Well-known header key correlating a message with a saga or request chain.
pub const CORRELATION_ID: &str = "correlation_id";
/// Well-known header key naming where a reply should be sent.
pub const RETURN_ADDRESS: &str = "return_address";
/// Well-known header key naming where a reply should be sent (source alias).
pub const REPLY_TO: &str = "reply_to";
/// Well-known header key naming the address a message was sent from.
pub const SOURCE_ADDRESS: &str = "source_address";
/// Well-known header key naming the address a message is addressed to.
pub const DESTINATION_ADDRESS: &str = "destination_address";
/// Header set by the idempotency checker step when duplicate-but-not-blocking.
pub const IDEMPOTENCY_CHECK: &str = "idempotency-check";
/// Header populated on a message forwarded to a dead-letter address.
pub const ERROR_DETAILS: &str = "error-details";

/// A primitive value a header may hold.
///
/// Transports and storages serialize every header through this type so
/// wire and on-disk representations stay stable across backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderValue {
    /// A UTF-8 string value.
    String(String),
    /// A signed integer value.
    Integer(i64),
    /// A boolean value.
    Bool(bool),
    /// A UUID value, most commonly `message_id` and `correlation_id`.
    Uuid(Uuid),
}

impl HeaderValue {
    /// Borrow this value as a string, if it holds one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            HeaderValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow this value as a UUID, if it holds one.
    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            HeaderValue::Uuid(u) => Some(*u),
            HeaderValue::String(s) => Uuid::parse_str(s).ok(),
            _ => None,
        }
    }

    /// Borrow this value as a bool, if it holds one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HeaderValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Render this value as a plain string, regardless of variant.
    pub fn to_plain_string(&self) -> String {
        match self {
            HeaderValue::String(s) => s.clone(),
            HeaderValue::Integer(i) => i.to_string(),
            HeaderValue::Bool(b) => b.to_string(),
            HeaderValue::Uuid(u) => u.to_string(),
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        HeaderValue::String(value.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        HeaderValue::String(value)
    }
}

impl From<i64> for HeaderValue {
    fn from(value: i64) -> Self {
        HeaderValue::Integer(value)
    }
}

impl From<bool> for HeaderValue {
    fn from(value: bool) -> Self {
        HeaderValue::Bool(value)
    }
}

impl From<Uuid> for HeaderValue {
    fn from(value: Uuid) -> Self {
        HeaderValue::Uuid(value)
    }
}

/// An insertion-ordered mapping of header keys to [`HeaderValue`]s.
///
/// Order is preserved so that on-disk and wire serialization is
/// deterministic across runs, matching the source's use of a plain `dict`
/// (ordered by insertion since Python 3.7).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageHeaders(IndexMap<String, HeaderValue>);

impl MessageHeaders {
    /// Build an empty header set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a header value, returning the previous value if any.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<HeaderValue>) -> Option<HeaderValue> {
        self.0.insert(key.into(), value.into())
    }

    /// Look up a header by key.
    pub fn get(&self, key: &str) -> Option<&HeaderValue> {
        self.0.get(key)
    }

    /// Remove a header by key, returning its value if present.
    pub fn remove(&mut self, key: &str) -> Option<HeaderValue> {
        self.0.shift_remove(key)
    }

    /// Whether a header is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Iterate headers in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &HeaderValue)> {
        self.0.iter()
    }

    /// Number of headers present.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no headers at all.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The `message_id` header, parsed as a UUID.
    ///
    /// # Panics
    /// Panics if `message_id` is absent or not a valid UUID. Every message
    /// entering the incoming pipeline is required to carry one (§3); callers
    /// outside the pipeline should use [`MessageHeaders::get`] directly.
    pub fn message_id(&self) -> Uuid {
        self.get(MESSAGE_ID)
            .and_then(HeaderValue::as_uuid)
            .expect("message_id header must be present and a valid UUID")
    }

    /// The `message_id` header, parsed as a UUID, without panicking.
    pub fn try_message_id(&self) -> Option<Uuid> {
        self.get(MESSAGE_ID).and_then(HeaderValue::as_uuid)
    }

    /// The `message_type` header, if present.
    pub fn message_type(&self) -> Option<&str> {
        self.get(MESSAGE_TYPE).and_then(HeaderValue::as_str)
    }

    /// The `correlation_id` header, parsed as a UUID, if present.
    pub fn correlation_id(&self) -> Option<Uuid> {
        self.get(CORRELATION_ID).and_then(HeaderValue::as_uuid)
    }
}

impl FromIterator<(String, HeaderValue)> for MessageHeaders {
    fn from_iter<T: IntoIterator<Item = (String, HeaderValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_insertion_order() {
        let mut headers = MessageHeaders::new();
        headers.insert("z", "last");
        headers.insert("a", "first");
        let keys: Vec<&String> = headers.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["z", "a"]);
    }

    #[test]
    fn message_id_round_trips_through_uuid_and_string() {
        let id = Uuid::new_v4();
        let mut headers = MessageHeaders::new();
        headers.insert(MESSAGE_ID, id);
        assert_eq!(headers.message_id(), id);

        let mut headers_as_string = MessageHeaders::new();
        headers_as_string.insert(MESSAGE_ID, id.to_string());
        assert_eq!(headers_as_string.message_id(), id);
    }

    #[test]
    fn serde_round_trip_preserves_values() {
        let mut headers = MessageHeaders::new();
        headers.insert(MESSAGE_ID, Uuid::nil());
        headers.insert("count", 3_i64);
        headers.insert("active", true);

        let json = serde_json::to_string(&headers).unwrap();
        let restored: MessageHeaders = serde_json::from_str(&json).unwrap();
        assert_eq!(headers, restored);
    }
}
