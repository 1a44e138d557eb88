// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Messages
//!
//! Value types exchanged with the client library: the message body, its
//! application properties and the standard header fields.

use crate::destination::Destination;
use std::collections::BTreeMap;

/// Prefix of the message ids assigned by producers
pub const MESSAGE_ID_PREFIX: &str = "ID:";

/// Typed application property or AMQP Open property value.
///
/// Values convert from the matching Rust primitives, so builders accept
/// `"acme"`, `3` or `true` directly.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// AMQP boolean
    Bool(bool),
    /// AMQP int, 32 bits
    Int(i32),
    /// AMQP long, 64 bits. Durations announced to the broker use this type
    Long(i64),
    /// AMQP double
    Double(f64),
    /// AMQP string. Trace context entries are always strings
    String(String),
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

impl From<i32> for PropertyValue {
    fn from(v: i32) -> Self {
        PropertyValue::Int(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Long(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Double(v)
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::String(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::String(v.to_owned())
    }
}

/// Payload of a message.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum MessageBody {
    /// No payload, only headers and properties
    #[default]
    Empty,
    /// UTF-8 text
    Text(String),
    /// Opaque binary payload
    Bytes(Vec<u8>),
    /// Named typed values
    Map(BTreeMap<String, PropertyValue>),
}

/// A message sent by producers and received by consumers.
///
/// This struct implements the builder pattern for the fields set by senders.
/// Fields filled by the broker, like `redelivered`, are plain public fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    /// Unique id, assigned on send when absent. Starts with [`MESSAGE_ID_PREFIX`]
    pub message_id: Option<String>,
    /// Id linking a reply to its request
    pub correlation_id: Option<String>,
    /// Application defined type of the message
    pub message_type: Option<String>,
    /// Destination replies should be sent to
    pub reply_to: Option<Destination>,
    /// Whether the broker delivered this message before
    pub redelivered: bool,
    /// The payload
    pub body: MessageBody,
    /// Application properties, also carrying the propagated trace context
    pub properties: BTreeMap<String, PropertyValue>,
}

impl Message {
    /// Creates a message without payload.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a text message.
    ///
    /// # Parameters
    /// * `text` - The text payload
    ///
    /// # Returns
    /// A message with a [`MessageBody::Text`] body and no headers
    pub fn text(text: impl Into<String>) -> Self {
        Message {
            body: MessageBody::Text(text.into()),
            ..Self::default()
        }
    }

    /// Creates a binary message.
    ///
    /// # Parameters
    /// * `bytes` - The binary payload
    ///
    /// # Returns
    /// A message with a [`MessageBody::Bytes`] body and no headers
    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Message {
            body: MessageBody::Bytes(bytes.into()),
            ..Self::default()
        }
    }

    /// Creates a map message from named typed values.
    pub fn map(entries: BTreeMap<String, PropertyValue>) -> Self {
        Message {
            body: MessageBody::Map(entries),
            ..Self::default()
        }
    }

    /// Sets an application property, replacing any previous value for `key`.
    ///
    /// # Parameters
    /// * `key` - Property name
    /// * `value` - Any value convertible into a [`PropertyValue`]
    ///
    /// # Returns
    /// Self for method chaining
    pub fn property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Sets the correlation id.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Sets the application defined message type.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn message_type(mut self, kind: impl Into<String>) -> Self {
        self.message_type = Some(kind.into());
        self
    }

    /// Sets the destination replies should be sent to.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn reply_to(mut self, destination: Destination) -> Self {
        self.reply_to = Some(destination);
        self
    }

    /// Text body, if any.
    pub fn as_text(&self) -> Option<&str> {
        match &self.body {
            MessageBody::Text(t) => Some(t),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destination::ServiceBusQueue;

    #[test]
    fn test_text_message() {
        let msg = Message::text("hello")
            .property("x-tenant", "acme")
            .property("attempt", 2)
            .correlation_id("c-1")
            .message_type("order.created")
            .reply_to(Destination::Queue(ServiceBusQueue::new("replies")));

        assert_eq!(msg.as_text(), Some("hello"));
        assert_eq!(
            msg.properties.get("x-tenant"),
            Some(&PropertyValue::String("acme".to_owned()))
        );
        assert_eq!(msg.properties.get("attempt"), Some(&PropertyValue::Int(2)));
        assert_eq!(msg.correlation_id.as_deref(), Some("c-1"));
        assert_eq!(msg.message_type.as_deref(), Some("order.created"));
        assert!(msg.message_id.is_none());
        assert!(!msg.redelivered);
    }

    #[test]
    fn test_bytes_message_has_no_text() {
        let msg = Message::bytes(vec![1u8, 2, 3]);
        assert_eq!(msg.body, MessageBody::Bytes(vec![1, 2, 3]));
        assert_eq!(msg.as_text(), None);
        assert_eq!(Message::empty().body, MessageBody::Empty);
    }
}
