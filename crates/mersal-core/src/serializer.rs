//! Converts between in-process [`LogicalMessage`]s and wire-level
//! [`TransportMessage`]s (spec §4.4 steps "deserialize message" /
//! "serialize message body").
//!
//! Rust erases the concrete message type behind `Box<dyn Any>`, so turning
//! a `LogicalMessage` back into JSON (or JSON back into the right concrete
//! type) needs a registry of per-type functions recorded at startup, in
//! place of the source's ability to just call `type(message).__name__` and
//! `json.dumps`/`pydantic` at the point of use.

use std::any::TypeId;
use std::collections::HashMap;

use mersal_types::{LogicalMessage, MessageHeaders, TransportBody};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{Error, Result};

type SerializeFn = Box<dyn Fn(&LogicalMessage) -> Result<serde_json::Value> + Send + Sync>;
type DeserializeFn = Box<dyn Fn(serde_json::Value, MessageHeaders) -> Result<LogicalMessage> + Send + Sync>;

/// A named, registered message type: the bridge between a message's
/// `message_type` header string and its Rust type.
struct Registration {
    name: String,
    serialize: SerializeFn,
    deserialize: DeserializeFn,
}

/// Maps message types to/from JSON by name, so the serializer can go from a
/// `message_type` header string to a concrete Rust type and back.
#[derive(Default)]
pub struct MessageTypeRegistry {
    by_type_id: HashMap<TypeId, usize>,
    by_name: HashMap<String, usize>,
    registrations: Vec<Registration>,
}

impl MessageTypeRegistry {
    /// Start an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a message type under `name`, the value stored in the
    /// `message_type` header for every instance of `T`.
    pub fn register<T>(&mut self, name: impl Into<String>)
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        let name = name.into();
        let index = self.registrations.len();
        self.registrations.push(Registration {
            name: name.clone(),
            serialize: Box::new(|message| {
                let body = message
                    .body::<T>()
                    .ok_or_else(|| Error::Other(anyhow::anyhow!("message body did not match its own registered type")))?;
                Ok(serde_json::to_value(body)?)
            }),
            deserialize: Box::new(|value, headers| {
                let body: T = serde_json::from_value(value)?;
                Ok(LogicalMessage::new(headers, body))
            }),
        });
        self.by_type_id.insert(TypeId::of::<T>(), index);
        self.by_name.insert(name, index);
    }

    fn name_for(&self, type_id: TypeId) -> Option<&str> {
        self.by_type_id.get(&type_id).map(|&i| self.registrations[i].name.as_str())
    }

    /// The full `TypeId` → registered name mapping, for steps that need to
    /// stamp a `message_type` header without going through [`JsonSerializer`].
    pub fn type_names(&self) -> HashMap<TypeId, String> {
        self.by_type_id.iter().map(|(&id, &i)| (id, self.registrations[i].name.clone())).collect()
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Other(anyhow::Error::from(err))
    }
}

/// Serializes [`LogicalMessage`]s to [`TransportBody::Json`] and back,
/// stamping/reading the `message_type` header along the way.
pub struct JsonSerializer {
    registry: MessageTypeRegistry,
}

impl JsonSerializer {
    /// Build a serializer backed by `registry`.
    pub fn new(registry: MessageTypeRegistry) -> Self {
        Self { registry }
    }

    /// Serialize `message`'s body to JSON.
    ///
    /// This only produces the wire body; the `message_type` (and the rest
    /// of the envelope) is stamped onto the message's headers separately by
    /// `AttachHeadersStep`, using [`MessageTypeRegistry::type_names`].
    ///
    /// # Errors
    /// Returns [`Error::MissingDependency`] if `message`'s concrete type was
    /// never registered.
    pub fn serialize(&self, message: &LogicalMessage) -> Result<TransportBody> {
        let type_id = message.type_id();
        let name = self
            .registry
            .name_for(type_id)
            .ok_or(Error::MissingDependency("message type not registered with the serializer"))?;
        let index = self.registry.by_name[name];
        let value = (self.registry.registrations[index].serialize)(message)?;
        Ok(TransportBody::Json { body: value })
    }

    /// Deserialize a transport body back into a [`LogicalMessage`], using
    /// the `message_type` header to pick the registered type.
    ///
    /// # Errors
    /// Returns [`Error::MissingDependency`] if the header names a type that
    /// was never registered, or [`Error::Other`] if the body is not a JSON
    /// body or does not match the registered type's shape.
    pub fn deserialize(&self, headers: MessageHeaders, body: TransportBody) -> Result<LogicalMessage> {
        let message_type = headers
            .message_type()
            .ok_or(Error::MissingDependency("transport message has no message_type header"))?
            .to_string();
        let index = *self
            .registry
            .by_name
            .get(&message_type)
            .ok_or(Error::MissingDependency("message_type header names an unregistered type"))?;
        let value = match body {
            TransportBody::Json { body } => body,
            TransportBody::Str { body } => serde_json::from_str(&body)?,
            TransportBody::Bytes { body } => serde_json::from_slice(&body)?,
        };
        (self.registry.registrations[index].deserialize)(value, headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mersal_types::MESSAGE_TYPE;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct AddUser {
        username: String,
    }

    #[test]
    fn round_trips_a_registered_type_through_json() {
        let mut registry = MessageTypeRegistry::new();
        registry.register::<AddUser>("AddUser");
        let serializer = JsonSerializer::new(registry);

        let mut headers = MessageHeaders::new();
        headers.insert(MESSAGE_TYPE, "AddUser");
        let message = LogicalMessage::new(
            headers.clone(),
            AddUser {
                username: "j".to_string(),
            },
        );

        let body = serializer.serialize(&message).unwrap();
        let restored = serializer.deserialize(headers, body).unwrap();
        assert_eq!(restored.body::<AddUser>().unwrap().username, "j");
    }

    #[test]
    fn unregistered_type_name_fails_closed() {
        let registry = MessageTypeRegistry::new();
        let serializer = JsonSerializer::new(registry);
        let mut headers = MessageHeaders::new();
        headers.insert(MESSAGE_TYPE, "Nope");
        let result = serializer.deserialize(headers, TransportBody::Json { body: serde_json::json!({}) });
        assert!(matches!(result, Err(Error::MissingDependency(_))));
    }
}
