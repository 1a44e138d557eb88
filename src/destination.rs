// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Destinations
//!
//! Queues and topics handed out by sessions. `ServiceBusQueue` and
//! `ServiceBusTopic` can be stored in a naming directory; temporary
//! destinations only live as long as the connection that created them.

use crate::{
    errors::ServiceBusError,
    reference::{require_property, Properties, Restorable, Storable},
};
use std::{collections::BTreeMap, fmt};

/// Reference property holding the physical name of a destination
pub const NAME_PROPERTY: &str = "physicalName";

/// A queue, addressed by its physical name.
///
/// Queues can be stored in a naming directory: their reference carries the
/// name under [`NAME_PROPERTY`], which is mandatory when decoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceBusQueue {
    name: String,
}

impl ServiceBusQueue {
    /// Creates a queue handle. No broker call is made.
    ///
    /// # Parameters
    /// * `name` - The physical name of the queue, e.g. `orders`
    ///
    /// # Returns
    /// A queue usable as [`Destination::Queue`]
    pub fn new(name: impl Into<String>) -> Self {
        ServiceBusQueue { name: name.into() }
    }

    /// Physical name of the queue.
    pub fn queue_name(&self) -> &str {
        &self.name
    }
}

impl Storable for ServiceBusQueue {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn properties(&self) -> BTreeMap<String, Option<String>> {
        BTreeMap::from([(NAME_PROPERTY.to_owned(), Some(self.name.clone()))])
    }
}

impl Restorable for ServiceBusQueue {
    const KIND: &'static str = "servicebus_jms::ServiceBusQueue";

    fn from_properties(properties: &Properties) -> Result<Self, ServiceBusError> {
        let name = require_property(Self::KIND, properties, NAME_PROPERTY)?;
        Ok(ServiceBusQueue::new(name))
    }
}

/// A topic, addressed by its physical name.
///
/// Stored and decoded like [`ServiceBusQueue`], under its own kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceBusTopic {
    name: String,
}

impl ServiceBusTopic {
    /// Creates a topic handle. No broker call is made.
    ///
    /// # Parameters
    /// * `name` - The physical name of the topic, e.g. `events`
    ///
    /// # Returns
    /// A topic usable as [`Destination::Topic`]
    pub fn new(name: impl Into<String>) -> Self {
        ServiceBusTopic { name: name.into() }
    }

    /// Physical name of the topic.
    pub fn topic_name(&self) -> &str {
        &self.name
    }
}

impl Storable for ServiceBusTopic {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn properties(&self) -> BTreeMap<String, Option<String>> {
        BTreeMap::from([(NAME_PROPERTY.to_owned(), Some(self.name.clone()))])
    }
}

impl Restorable for ServiceBusTopic {
    const KIND: &'static str = "servicebus_jms::ServiceBusTopic";

    fn from_properties(properties: &Properties) -> Result<Self, ServiceBusError> {
        let name = require_property(Self::KIND, properties, NAME_PROPERTY)?;
        Ok(ServiceBusTopic::new(name))
    }
}

/// Any destination a producer can send to or a consumer can read from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Destination {
    Queue(ServiceBusQueue),
    Topic(ServiceBusTopic),
    /// Queue created by a session, named by the client library
    TemporaryQueue(String),
    /// Topic created by a session, named by the client library
    TemporaryTopic(String),
}

impl Destination {
    /// Physical name of the destination.
    pub fn name(&self) -> &str {
        match self {
            Destination::Queue(q) => q.queue_name(),
            Destination::Topic(t) => t.topic_name(),
            Destination::TemporaryQueue(name) | Destination::TemporaryTopic(name) => name,
        }
    }

    /// Whether the destination is deleted with the connection that created it.
    pub fn is_temporary(&self) -> bool {
        matches!(
            self,
            Destination::TemporaryQueue(_) | Destination::TemporaryTopic(_)
        )
    }
}

impl From<ServiceBusQueue> for Destination {
    fn from(queue: ServiceBusQueue) -> Self {
        Destination::Queue(queue)
    }
}

impl From<ServiceBusTopic> for Destination {
    fn from(topic: ServiceBusTopic) -> Self {
        Destination::Topic(topic)
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::{RefAddr, Reference, ReferenceFactory};

    #[test]
    fn test_queue_reference_round_trip() {
        let queue = ServiceBusQueue::new("orders");
        let reference = queue.reference();

        assert_eq!(reference.class_name(), ServiceBusQueue::KIND);
        assert_eq!(
            reference.addrs(),
            &[RefAddr::new(NAME_PROPERTY, Some("orders".to_owned()))]
        );

        let decoded: ServiceBusQueue = ReferenceFactory::with_defaults()
            .get_instance(&reference)
            .unwrap();
        assert_eq!(decoded.queue_name(), queue.queue_name());
    }

    #[test]
    fn test_topic_reference_round_trip() {
        let topic = ServiceBusTopic::new("events");
        let decoded: ServiceBusTopic = ReferenceFactory::with_defaults()
            .get_instance(&topic.reference())
            .unwrap();

        assert_eq!(decoded, topic);
    }

    #[test]
    fn test_topic_without_name() {
        let reference = Reference::new(ServiceBusTopic::KIND);
        let err = ReferenceFactory::with_defaults().decode(&reference).err();

        assert_eq!(
            err.map(|e| e.to_string()),
            Some(
                "An instance of servicebus_jms::ServiceBusTopic must have a valid value for its 'physicalName' property."
                    .to_owned()
            )
        );
    }

    #[test]
    fn test_queue_with_empty_name() {
        let queue = ServiceBusQueue::new("");
        let err = ReferenceFactory::with_defaults()
            .get_instance::<ServiceBusQueue>(&queue.reference())
            .err();

        assert_eq!(
            err,
            Some(ServiceBusError::RequiredProperty {
                kind: ServiceBusQueue::KIND.to_owned(),
                property: NAME_PROPERTY.to_owned(),
            })
        );
    }

    #[test]
    fn test_destination_names() {
        assert_eq!(Destination::from(ServiceBusQueue::new("q")).name(), "q");
        assert_eq!(Destination::from(ServiceBusTopic::new("t")).to_string(), "t");
        assert!(Destination::TemporaryQueue("tmp".to_owned()).is_temporary());
        assert!(!Destination::from(ServiceBusQueue::new("q")).is_temporary());
    }
}
