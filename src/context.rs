// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Messaging Context
//!
//! A context bundles a connection and one session behind a single object.
//! Contexts derived with [`ServiceBusContext::create_context`] share the
//! connection of their parent; the connection is closed with the last of them.

use crate::{
    client::{ConsumerSpec, SessionMode},
    connection::ServiceBusConnection,
    destination::{Destination, ServiceBusQueue, ServiceBusTopic},
    errors::ServiceBusError,
    session::{ServiceBusBrowser, ServiceBusConsumer, ServiceBusProducer, ServiceBusSession},
};
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};
use tracing::debug;

/// A connection and a session used together.
///
/// Every context opened on a connection counts as one user of it. Closing a
/// context always closes its session; the connection is closed by the close
/// that releases its last user. Contexts dropped without `close` keep the
/// connection open.
pub struct ServiceBusContext {
    connection: Arc<ServiceBusConnection>,
    session: ServiceBusSession,
    auto_start: AtomicBool,
    started: Arc<AtomicBool>,
    open_contexts: Arc<AtomicUsize>,
}

impl ServiceBusContext {
    pub(crate) async fn open(
        connection: ServiceBusConnection,
        mode: SessionMode,
    ) -> Result<Self, ServiceBusError> {
        let session = connection.create_session_with_mode(mode).await?;

        Ok(ServiceBusContext {
            connection: Arc::new(connection),
            session,
            auto_start: AtomicBool::new(true),
            started: Arc::new(AtomicBool::new(false)),
            open_contexts: Arc::new(AtomicUsize::new(1)),
        })
    }

    /// Creates a context with its own session on the same connection.
    ///
    /// The new context inherits the auto-start flag of this one.
    ///
    /// # Parameters
    /// * `mode` - Acknowledge mode of the new session
    ///
    /// # Returns
    /// A context sharing the connection, or the error of the session creation
    pub async fn create_context(&self, mode: SessionMode) -> Result<Self, ServiceBusError> {
        let session = self.connection.create_session_with_mode(mode).await?;
        self.open_contexts.fetch_add(1, Ordering::AcqRel);

        Ok(ServiceBusContext {
            connection: self.connection.clone(),
            session,
            auto_start: AtomicBool::new(self.auto_start()),
            started: self.started.clone(),
            open_contexts: self.open_contexts.clone(),
        })
    }

    /// Whether the connection is started when the first consumer is created.
    /// Enabled by default.
    pub fn auto_start(&self) -> bool {
        self.auto_start.load(Ordering::SeqCst)
    }

    /// Enables or disables starting the connection on the first consumer.
    pub fn set_auto_start(&self, auto_start: bool) {
        self.auto_start.store(auto_start, Ordering::SeqCst);
    }

    /// Acknowledge mode of the session.
    pub fn session_mode(&self) -> SessionMode {
        self.session.session_mode()
    }

    /// Whether the session is transacted.
    pub fn transacted(&self) -> bool {
        self.session.transacted()
    }

    /// Client id of the shared connection, if any.
    pub fn client_id(&self) -> Option<String> {
        self.connection.client_id()
    }

    /// Sets the client id of the shared connection.
    ///
    /// # Parameters
    /// * `client_id` - The id identifying durable subscriptions of this client
    pub async fn set_client_id(&self, client_id: &str) -> Result<(), ServiceBusError> {
        self.connection.set_client_id(client_id).await
    }

    /// Starts delivery of incoming messages on the shared connection.
    pub async fn start(&self) -> Result<(), ServiceBusError> {
        self.connection.start().await?;
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Pauses delivery of incoming messages on the shared connection.
    pub async fn stop(&self) -> Result<(), ServiceBusError> {
        self.connection.stop().await?;
        self.started.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Unbound producer, destinations are given on every send.
    pub async fn create_producer(&self) -> Result<ServiceBusProducer, ServiceBusError> {
        self.session.create_producer(None).await
    }

    /// Creates a consumer on a queue or topic.
    ///
    /// # Parameters
    /// * `destination` - Queue or topic to consume from
    /// * `selector` - Optional message selector
    /// * `no_local` - Skip messages published by this connection
    ///
    /// # Returns
    /// The consumer, with the connection started when auto-start is enabled
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

    /// Creates a consumer on an unshared durable subscription.
    ///
    /// # Parameters
    /// * `topic` - The topic the subscription belongs to
    /// * `name` - Subscription name, scoped by the client id
    /// * `selector` - Optional message selector
    /// * `no_local` - Skip messages published by this connection
    pub async fn create_durable_consumer(
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

    /// Creates a consumer on a shared, non durable subscription.
    pub async fn create_shared_consumer(
        &self,
        topic: &ServiceBusTopic,
        name: &str,
        selector: Option<&str>,
    ) -> Result<ServiceBusConsumer, ServiceBusError> {
        let spec = ConsumerSpec::new(topic.clone().into())
            .selector(selector.map(str::to_owned))
            .subscription(name, false, true);
        self.consume(spec).await
    }

    /// Creates a consumer on a shared durable subscription.
    pub async fn create_shared_durable_consumer(
        &self,
        topic: &ServiceBusTopic,
        name: &str,
        selector: Option<&str>,
    ) -> Result<ServiceBusConsumer, ServiceBusError> {
        let spec = ConsumerSpec::new(topic.clone().into())
            .selector(selector.map(str::to_owned))
            .subscription(name, true, true);
        self.consume(spec).await
    }

    async fn consume(&self, spec: ConsumerSpec) -> Result<ServiceBusConsumer, ServiceBusError> {
        let consumer = self.session.consume(spec).await?;

        if self.auto_start() && !self.started.load(Ordering::SeqCst) {
            debug!("auto starting connection");
            if let Err(err) = self.start().await {
                // close failures are logged by the consumer
                let _ = consumer.close().await;
                return Err(err);
            }
        }

        Ok(consumer)
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
        self.session.create_browser(queue, selector).await
    }

    /// Returns the queue identified by `name`.
    pub async fn create_queue(&self, name: &str) -> Result<ServiceBusQueue, ServiceBusError> {
        self.session.create_queue(name).await
    }

    /// Returns the topic identified by `name`.
    pub async fn create_topic(&self, name: &str) -> Result<ServiceBusTopic, ServiceBusError> {
        self.session.create_topic(name).await
    }

    /// Creates a queue living as long as the shared connection.
    pub async fn create_temporary_queue(&self) -> Result<Destination, ServiceBusError> {
        self.session.create_temporary_queue().await
    }

    /// Creates a topic living as long as the shared connection.
    pub async fn create_temporary_topic(&self) -> Result<Destination, ServiceBusError> {
        self.session.create_temporary_topic().await
    }

    /// Deletes the durable subscription `name`.
    pub async fn unsubscribe(&self, name: &str) -> Result<(), ServiceBusError> {
        self.session.unsubscribe(name).await
    }

    /// Acknowledges every message consumed by this context so far.
    pub async fn acknowledge(&self) -> Result<(), ServiceBusError> {
        self.session.acknowledge().await
    }

    /// Commits the current transaction of a transacted context.
    pub async fn commit(&self) -> Result<(), ServiceBusError> {
        self.session.commit().await
    }

    /// Rolls back the current transaction of a transacted context.
    pub async fn rollback(&self) -> Result<(), ServiceBusError> {
        self.session.rollback().await
    }

    /// Redelivers every unacknowledged message.
    pub async fn recover(&self) -> Result<(), ServiceBusError> {
        self.session.recover().await
    }

    /// Closes the session, and the connection when no other context uses it.
    ///
    /// The connection is closed by the last context even if closing its
    /// session failed.
    ///
    /// # Returns
    /// The first error among the session and connection closes
    pub async fn close(self) -> Result<(), ServiceBusError> {
        let session = self.session.close().await;

        let connection = if self.open_contexts.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.connection.close().await
        } else {
            Ok(())
        };

        session.and(connection)
    }
}
