//! The three message shapes that flow through the pipeline: the deserialized
//! [`LogicalMessage`], the wire-level [`TransportMessage`], and the
//! [`OutgoingMessage`] envelope a transport is asked to deliver.

use std::any::{Any, TypeId};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::headers::MessageHeaders;

/// The opaque body of a [`TransportMessage`].
///
/// Transports serialize this directly; which variant is used is recorded
/// alongside it (see the file-system transport's `body_type` discriminator)
/// so a reader can reconstruct the original shape without guessing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "body_type", rename_all = "snake_case")]
pub enum TransportBody {
    /// Raw bytes, base64-encoded on disk/wire.
    Bytes {
        /// The payload bytes.
        #[serde(with = "base64_bytes")]
        body: Vec<u8>,
    },
    /// A UTF-8 string, stored verbatim.
    Str {
        /// The payload string.
        body: String,
    },
    /// An embedded JSON value.
    Json {
        /// The payload, already a JSON value.
        body: serde_json::Value,
    },
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded.as_bytes()).map_err(serde::de::Error::custom)
    }
}

/// A message at the wire level: headers plus an opaque, already-serialized body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportMessage {
    /// The message's headers.
    pub headers: MessageHeaders,
    /// The serialized body.
    pub body: TransportBody,
}

impl TransportMessage {
    /// Build a transport message from headers and a body.
    pub fn new(headers: MessageHeaders, body: TransportBody) -> Self {
        Self { headers, body }
    }
}

/// A message inside the pipeline: headers plus a type-erased, deserialized body.
///
/// Rust has no runtime class hierarchy to inspect, so the body is held as a
/// boxed [`Any`] and downcast by handlers/steps that know the concrete type;
/// [`LogicalMessage::type_id`] is what the handler activator keys dispatch on.
pub struct LogicalMessage {
    headers: MessageHeaders,
    body: Box<dyn Any + Send + Sync>,
    type_id: TypeId,
}

impl LogicalMessage {
    /// Wrap a concrete, already-deserialized body with its headers.
    pub fn new<T: Any + Send + Sync>(headers: MessageHeaders, body: T) -> Self {
        Self {
            headers,
            type_id: TypeId::of::<T>(),
            body: Box::new(body),
        }
    }

    /// The headers carried alongside the body.
    pub fn headers(&self) -> &MessageHeaders {
        &self.headers
    }

    /// Mutable access to the headers, used by outgoing-pipeline steps that
    /// stamp `message_id`/`sent_time`/correlation metadata.
    pub fn headers_mut(&mut self) -> &mut MessageHeaders {
        &mut self.headers
    }

    /// The body's [`TypeId`], used by the handler activator to resolve
    /// registered factories without a runtime type hierarchy.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Borrow the body as a concrete type, if it matches.
    pub fn body<T: Any>(&self) -> Option<&T> {
        self.body.downcast_ref::<T>()
    }

    /// Consume this message, returning the concrete body, or `self` unchanged
    /// if the requested type does not match.
    pub fn into_body<T: Any>(self) -> Result<T, Self> {
        match self.body.downcast::<T>() {
            Ok(boxed) => Ok(*boxed),
            Err(body) => Err(Self {
                headers: self.headers,
                type_id: self.type_id,
                body,
            }),
        }
    }
}

impl fmt::Debug for LogicalMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogicalMessage")
            .field("headers", &self.headers)
            .field("type_id", &self.type_id)
            .finish_non_exhaustive()
    }
}

/// An outbound message paired with the address it should be delivered to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// The address the transport should deliver `transport_message` to.
    pub destination_address: String,
    /// The serialized message to deliver.
    pub transport_message: TransportMessage,
}

impl OutgoingMessage {
    /// Pair a destination address with a transport message.
    pub fn new(destination_address: impl Into<String>, transport_message: TransportMessage) -> Self {
        Self {
            destination_address: destination_address.into(),
            transport_message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::MESSAGE_ID;
    use uuid::Uuid;

    #[derive(Debug, PartialEq)]
    struct AddUser {
        username: String,
    }

    #[test]
    fn logical_message_round_trips_body_by_type() {
        let mut headers = MessageHeaders::new();
        headers.insert(MESSAGE_ID, Uuid::new_v4());
        let msg = LogicalMessage::new(
            headers,
            AddUser {
                username: "J".to_string(),
            },
        );

        assert_eq!(msg.body::<AddUser>().unwrap().username, "J");
        assert!(msg.body::<String>().is_none());
    }

    #[test]
    fn into_body_fails_closed_on_type_mismatch() {
        let msg = LogicalMessage::new(MessageHeaders::new(), 42_i32);
        let msg = msg.into_body::<String>().unwrap_err();
        assert_eq!(*msg.body::<i32>().unwrap(), 42);
    }

    #[test]
    fn transport_body_bytes_round_trip_through_json() {
        let body = TransportBody::Bytes {
            body: vec![1, 2, 3, 255],
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("body_type"));
        let restored: TransportBody = serde_json::from_str(&json).unwrap();
        assert_eq!(body, restored);
    }
}
