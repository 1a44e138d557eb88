// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Sessions, Producers and Consumers
//!
//! Wrappers forwarding every call to the session, producer and consumer
//! objects of the client library. Queues and topics returned by the inner
//! session are handed out as `ServiceBusQueue` / `ServiceBusTopic` so that
//! they can be stored in a naming directory.

use crate::{
    client::{AmqpBrowser, AmqpConsumer, AmqpProducer, AmqpSession, ConsumerSpec, SessionMode},
    destination::{Destination, ServiceBusQueue, ServiceBusTopic},
    errors::{from_client, ServiceBusError},
    message::{Message, MESSAGE_ID_PREFIX},
    otel,
};
use futures_util::{stream, Stream};
use opentelemetry::Context;
use std::{ops::Deref, time::Duration};
use tracing::debug;
use uuid::Uuid;

/// Session wrapper.
///
/// A session is a single threaded context for producing and consuming
/// messages. Every call is forwarded to the session of the client library and
/// its errors are logged and converted into [`ServiceBusError::Client`].
pub struct ServiceBusSession {
    inner: Box<dyn AmqpSession>,
}

impl ServiceBusSession {
    pub(crate) fn new(inner: Box<dyn AmqpSession>) -> Self {
        ServiceBusSession { inner }
    }

    /// Acknowledge mode the session was created with.
    pub fn session_mode(&self) -> SessionMode {
        self.inner.session_mode()
    }

    /// Whether the session is transacted.
    pub fn transacted(&self) -> bool {
        self.inner.session_mode().is_transacted()
    }

    /// Returns the queue identified by `name`.
    ///
    /// # Parameters
    /// * `name` - Name of the queue
    ///
    /// # Returns
    /// The queue, named as resolved by the client library
    pub async fn create_queue(&self, name: &str) -> Result<ServiceBusQueue, ServiceBusError> {
        let name = from_client(
            self.inner.create_queue(name.to_owned()).await,
            "failure to create queue",
        )?;
        Ok(ServiceBusQueue::new(name))
    }

    /// Returns the topic identified by `name`.
    ///
    /// # Parameters
    /// * `name` - Name of the topic
    ///
    /// # Returns
    /// The topic, named as resolved by the client library
    pub async fn create_topic(&self, name: &str) -> Result<ServiceBusTopic, ServiceBusError> {
        let name = from_client(
            self.inner.create_topic(name.to_owned()).await,
            "failure to create topic",
        )?;
        Ok(ServiceBusTopic::new(name))
    }

    /// Creates a queue deleted with the connection of this session.
    pub async fn create_temporary_queue(&self) -> Result<Destination, ServiceBusError> {
        let name = from_client(
            self.inner.create_temporary_queue().await,
            "failure to create temporary queue",
        )?;
        Ok(Destination::TemporaryQueue(name))
    }

    /// Creates a topic deleted with the connection of this session.
    pub async fn create_temporary_topic(&self) -> Result<Destination, ServiceBusError> {
        let name = from_client(
            self.inner.create_temporary_topic().await,
            "failure to create temporary topic",
        )?;
        Ok(Destination::TemporaryTopic(name))
    }

    /// Creates a producer bound to `destination`, or an unbound one when `None`.
    pub async fn create_producer(
        &self,
        destination: Option<Destination>,
    ) -> Result<ServiceBusProducer, ServiceBusError> {
        debug!(destination = ?destination, "creating producer");
        let inner = from_client(
            self.inner.create_producer(destination.clone()).await,
            "failure to create producer",
        )?;
        Ok(ServiceBusProducer::new(inner, destination))
    }

    /// Creates a consumer on a queue or topic.
    ///
    /// # Parameters
    /// * `destination` - Queue or topic to consume from
    /// * `selector` - Optional message selector
    /// * `no_local` - Skip messages published by the same connection
    ///
    /// # Returns
    /// The wrapped consumer, or the error reported by the client library
    pub async fn create_consumer(
        &self,
        destination: Destination,
        selector: Option<&str>,
        no_local: bool,
    ) -> Result<ServiceBusConsumer, ServiceBusError> {
        let spec = ConsumerSpec::new(destination)
            .selector(selector.map(str::to_owned))
            .no_local(no_local);
        self.consume(spec).await
    }

    /// Creates a consumer on an unshared durable subscription, created on
    /// first use.
    ///
    /// # Parameters
    /// * `topic` - The topic the subscription belongs to
    /// * `name` - Subscription name, scoped by the client id
    /// * `selector` - Optional message selector
    /// * `no_local` - Skip messages published by the same connection
    pub async fn create_durable_subscriber(
        &self,
        topic: &ServiceBusTopic,
        name: &str,
        selector: Option<&str>,
        no_local: bool,
    ) -> Result<ServiceBusConsumer, ServiceBusError> {
        let spec = ConsumerSpec::new(topic.clone().into())
            .selector(selector.map(str::to_owned))
            .no_local(no_local)
            .subscription(name, true, false);
        self.consume(spec).await
    }

    /// Creates a consumer on a shared subscription. Consumers of the same
    /// shared subscription compete for its messages.
    ///
    /// # Parameters
    /// * `topic` - The topic the subscription belongs to
    /// * `name` - Subscription name
    /// * `selector` - Optional message selector
    /// * `durable` - Whether the subscription outlives its consumers
    pub async fn create_shared_consumer(
        &self,
        topic: &ServiceBusTopic,
        name: &str,
        selector: Option<&str>,
        durable: bool,
    ) -> Result<ServiceBusConsumer, ServiceBusError> {
        let spec = ConsumerSpec::new(topic.clone().into())
            .selector(selector.map(str::to_owned))
            .subscription(name, durable, true);
        self.consume(spec).await
    }

    pub(crate) async fn consume(
        &self,
        spec: ConsumerSpec,
    ) -> Result<ServiceBusConsumer, ServiceBusError> {
        debug!(destination = %spec.destination, "creating consumer");
        let inner = from_client(
            self.inner.create_consumer(spec).await,
            "failure to create consumer",
        )?;
        Ok(ServiceBusConsumer::new(inner))
    }

    /// Creates a browser over the messages of a queue, without consuming them.
    ///
    /// # Parameters
    /// * `queue` - The queue to browse
    /// * `selector` - Optional message selector
    pub async fn create_browser(
        &self,
        queue: &ServiceBusQueue,
        selector: Option<&str>,
    ) -> Result<ServiceBusBrowser, ServiceBusError> {
        let inner = from_client(
            self.inner
                .create_browser(queue.clone().into(), selector.map(str::to_owned))
                .await,
            "failure to create browser",
        )?;
        Ok(ServiceBusBrowser::new(inner))
    }

    /// Deletes a durable subscription.
    pub async fn unsubscribe(&self, name: &str) -> Result<(), ServiceBusError> {
        from_client(
            self.inner.unsubscribe(name.to_owned()).await,
            "failure to unsubscribe",
        )
    }

    /// Acknowledges every message consumed by the session so far.
    pub async fn acknowledge(&self) -> Result<(), ServiceBusError> {
        from_client(self.inner.acknowledge().await, "failure to ack messages")
    }

    /// Commits the messages sent and received in the current transaction.
    pub async fn commit(&self) -> Result<(), ServiceBusError> {
        from_client(self.inner.commit().await, "failure to commit")
    }

    /// Discards the messages sent and received in the current transaction.
    pub async fn rollback(&self) -> Result<(), ServiceBusError> {
        from_client(self.inner.rollback().await, "failure to rollback")
    }

    /// Stops delivery and restarts it from the oldest unacknowledged message.
    pub async fn recover(&self) -> Result<(), ServiceBusError> {
        from_client(self.inner.recover().await, "failure to recover")
    }

    /// Closes the session together with its producers and consumers.
    pub async fn close(&self) -> Result<(), ServiceBusError> {
        from_client(self.inner.close().await, "failure to close session")
    }
}

/// Session restricted to point-to-point messaging.
pub struct ServiceBusQueueSession(ServiceBusSession);

impl ServiceBusQueueSession {
    pub(crate) fn new(session: ServiceBusSession) -> Self {
        ServiceBusQueueSession(session)
    }

    /// Creates a producer bound to `queue`.
    pub async fn create_sender(
        &self,
        queue: &ServiceBusQueue,
    ) -> Result<ServiceBusProducer, ServiceBusError> {
        self.0.create_producer(Some(queue.clone().into())).await
    }

    /// Creates a consumer on `queue`.
    ///
    /// # Parameters
    /// * `queue` - The queue to receive from
    /// * `selector` - Optional message selector
    pub async fn create_receiver(
        &self,
        queue: &ServiceBusQueue,
        selector: Option<&str>,
    ) -> Result<ServiceBusConsumer, ServiceBusError> {
        self.0
            .create_consumer(queue.clone().into(), selector, false)
            .await
    }
}

impl Deref for ServiceBusQueueSession {
    type Target = ServiceBusSession;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Session restricted to publish/subscribe messaging.
pub struct ServiceBusTopicSession(ServiceBusSession);

impl ServiceBusTopicSession {
    pub(crate) fn new(session: ServiceBusSession) -> Self {
        ServiceBusTopicSession(session)
    }

    /// Creates a producer bound to `topic`.
    pub async fn create_publisher(
        &self,
        topic: &ServiceBusTopic,
    ) -> Result<ServiceBusProducer, ServiceBusError> {
        self.0.create_producer(Some(topic.clone().into())).await
    }

    /// Creates a non durable consumer on `topic`.
    ///
    /// # Parameters
    /// * `topic` - The topic to subscribe to
    /// * `selector` - Optional message selector
    /// * `no_local` - Skip messages published by the same connection
    pub async fn create_subscriber(
        &self,
        topic: &ServiceBusTopic,
        selector: Option<&str>,
        no_local: bool,
    ) -> Result<ServiceBusConsumer, ServiceBusError> {
        self.0
            .create_consumer(topic.clone().into(), selector, no_local)
            .await
    }
}

impl Deref for ServiceBusTopicSession {
    type Target = ServiceBusSession;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Producer wrapper.
///
/// Messages without an id get a random one, and the current trace context is
/// written into their properties before they are handed to the client.
pub struct ServiceBusProducer {
    inner: Box<dyn AmqpProducer>,
    destination: Option<Destination>,
}

impl ServiceBusProducer {
    pub(crate) fn new(inner: Box<dyn AmqpProducer>, destination: Option<Destination>) -> Self {
        ServiceBusProducer { inner, destination }
    }

    /// Destination the producer is bound to, `None` for unbound producers.
    pub fn destination(&self) -> Option<&Destination> {
        self.destination.as_ref()
    }

    /// Sends to the destination the producer was created for.
    ///
    /// # Parameters
    /// * `message` - The message to send
    ///
    /// # Returns
    /// `Ok(())` once the client library accepted the message, or a
    /// configuration error on unbound producers
    pub async fn send(&self, message: Message) -> Result<(), ServiceBusError> {
        if self.destination.is_none() {
            return Err(ServiceBusError::configuration(
                "producer has no destination, use send_to",
            ));
        }

        self.dispatch(None, message).await
    }

    /// Sends to an explicit destination. Only valid on unbound producers.
    ///
    /// # Parameters
    /// * `destination` - Where to send the message
    /// * `message` - The message to send
    pub async fn send_to(
        &self,
        destination: &Destination,
        message: Message,
    ) -> Result<(), ServiceBusError> {
        if self.destination.is_some() {
            return Err(ServiceBusError::configuration(
                "producer is bound to a destination, use send",
            ));
        }

        self.dispatch(Some(destination.clone()), message).await
    }

    async fn dispatch(
        &self,
        destination: Option<Destination>,
        mut message: Message,
    ) -> Result<(), ServiceBusError> {
        if message.message_id.is_none() {
            message.message_id = Some(format!("{}{}", MESSAGE_ID_PREFIX, Uuid::new_v4()));
        }

        otel::inject(&Context::current(), &mut message);

        from_client(
            self.inner.send(destination, message).await,
            "error publishing message",
        )
    }

    /// Closes the producer.
    pub async fn close(&self) -> Result<(), ServiceBusError> {
        from_client(self.inner.close().await, "failure to close producer")
    }
}

/// Consumer wrapper.
///
/// Messages can be pulled one at a time with the `receive` family, or the
/// consumer can be turned into a [`Stream`] with
/// [`into_stream`](Self::into_stream).
pub struct ServiceBusConsumer {
    inner: Box<dyn AmqpConsumer>,
}

impl ServiceBusConsumer {
    pub(crate) fn new(inner: Box<dyn AmqpConsumer>) -> Self {
        ServiceBusConsumer { inner }
    }

    /// Waits for the next message. `Ok(None)` once the consumer is closed.
    pub async fn receive(&self) -> Result<Option<Message>, ServiceBusError> {
        from_client(self.inner.receive(None).await, "failure to consume message")
    }

    /// Waits up to `timeout` for the next message.
    pub async fn receive_timeout(
        &self,
        timeout: Duration,
    ) -> Result<Option<Message>, ServiceBusError> {
        from_client(
            self.inner.receive(Some(timeout)).await,
            "failure to consume message",
        )
    }

    /// Returns a message only if one is immediately available.
    pub async fn receive_no_wait(&self) -> Result<Option<Message>, ServiceBusError> {
        self.receive_timeout(Duration::ZERO).await
    }

    /// Closes the consumer. Pending receives return `Ok(None)`.
    pub async fn close(&self) -> Result<(), ServiceBusError> {
        from_client(self.inner.close().await, "failure to close consumer")
    }

    /// Turns the consumer into a stream of messages.
    ///
    /// The stream ends when the consumer is closed, or right after yielding
    /// the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<Message, ServiceBusError>> {
        stream::unfold(Some(self), |consumer| async move {
            let consumer = consumer?;
            match consumer.receive().await {
                Ok(Some(message)) => Some((Ok(message), Some(consumer))),
                Ok(None) => None,
                Err(err) => Some((Err(err), None)),
            }
        })
    }
}

/// Queue browser wrapper.
///
/// Walks the messages of a queue in order without removing them.
pub struct ServiceBusBrowser {
    inner: Box<dyn AmqpBrowser>,
}

impl ServiceBusBrowser {
    pub(crate) fn new(inner: Box<dyn AmqpBrowser>) -> Self {
        ServiceBusBrowser { inner }
    }

    /// Next message of the queue, `Ok(None)` past the last one.
    pub async fn next(&self) -> Result<Option<Message>, ServiceBusError> {
        from_client(self.inner.next().await, "failure to browse queue")
    }

    /// Closes the browser.
    pub async fn close(&self) -> Result<(), ServiceBusError> {
        from_client(self.inner.close().await, "failure to close browser")
    }
}
