// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Client Seam
//!
//! Traits implemented by the wrapped AMQP client library. Everything protocol
//! related (framing, links, flow control, failover) lives behind these traits;
//! the wrappers of this crate only forward calls to them.
//!
//! Implementations receive a [`ConnectRequest`] carrying the remote URI built
//! from the factory settings, the credentials and the AMQP Open properties.

use crate::{destination::Destination, message::{Message, PropertyValue}};
use async_trait::async_trait;
use std::{collections::BTreeMap, error::Error, fmt, sync::Arc, time::Duration};

/// Error type returned by client library implementations.
pub type ClientError = Box<dyn Error + Send + Sync>;

/// Result type returned by client library implementations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Supplies the proxy the transport must tunnel through.
pub trait ProxyHandlerFactory: Send + Sync {
    /// Proxy address, e.g. `http://proxy.contoso.com:3128`.
    fn proxy_address(&self) -> String;
}

/// Acknowledgement mode of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionMode {
    #[default]
    AutoAcknowledge,
    ClientAcknowledge,
    DupsOkAcknowledge,
    Transacted,
}

impl SessionMode {
    /// Maps the `(transacted, mode)` pair of the classic session API to a
    /// single mode. A transacted session ignores the acknowledgement mode.
    pub fn resolve(transacted: bool, mode: SessionMode) -> SessionMode {
        if transacted {
            SessionMode::Transacted
        } else {
            mode
        }
    }

    /// Whether this is [`SessionMode::Transacted`].
    pub fn is_transacted(&self) -> bool {
        *self == SessionMode::Transacted
    }
}

/// Everything the client library needs to open a connection.
#[derive(Clone)]
pub struct ConnectRequest {
    pub remote_uri: String,
    pub username: String,
    pub password: String,
    pub client_id: Option<String>,
    pub open_properties: BTreeMap<String, PropertyValue>,
    pub proxy_handler: Option<Arc<dyn ProxyHandlerFactory>>,
}

impl fmt::Debug for ConnectRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectRequest")
            .field("remote_uri", &self.remote_uri)
            .field("username", &self.username)
            .field("client_id", &self.client_id)
            .field("open_properties", &self.open_properties)
            .field("proxy_handler", &self.proxy_handler.is_some())
            .finish_non_exhaustive()
    }
}

/// Durable and shared subscriptions on a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub name: String,
    pub durable: bool,
    pub shared: bool,
}

/// Parameters of a consumer: its source and optional subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumerSpec {
    pub destination: Destination,
    pub selector: Option<String>,
    pub no_local: bool,
    pub subscription: Option<Subscription>,
}

impl ConsumerSpec {
    /// Creates a request for a plain consumer on `destination`.
    pub fn new(destination: Destination) -> Self {
        ConsumerSpec {
            destination,
            selector: None,
            no_local: false,
            subscription: None,
        }
    }

    /// Sets the message selector.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn selector(mut self, selector: Option<String>) -> Self {
        self.selector = selector;
        self
    }

    /// Skips messages published by the same connection.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn no_local(mut self, no_local: bool) -> Self {
        self.no_local = no_local;
        self
    }

    /// Consumes through a named topic subscription.
    ///
    /// # Parameters
    /// * `name` - Subscription name
    /// * `durable` - Whether the subscription outlives its consumers
    /// * `shared` - Whether several consumers compete on the subscription
    ///
    /// # Returns
    /// Self for method chaining
    pub fn subscription(mut self, name: impl Into<String>, durable: bool, shared: bool) -> Self {
        self.subscription = Some(Subscription {
            name: name.into(),
            durable,
            shared,
        });
        self
    }
}

/// Entry point of the client library.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AmqpClient: Send + Sync {
    async fn connect(&self, request: ConnectRequest) -> ClientResult<Box<dyn AmqpConnection>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AmqpConnection: Send + Sync {
    async fn create_session(&self, mode: SessionMode) -> ClientResult<Box<dyn AmqpSession>>;

    fn client_id(&self) -> Option<String>;

    async fn set_client_id(&self, client_id: String) -> ClientResult<()>;

    async fn start(&self) -> ClientResult<()>;

    async fn stop(&self) -> ClientResult<()>;

    async fn close(&self) -> ClientResult<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AmqpSession: Send + Sync {
    fn session_mode(&self) -> SessionMode;

    /// Resolves a queue name to the physical name used on the wire.
    async fn create_queue(&self, name: String) -> ClientResult<String>;

    /// Resolves a topic name to the physical name used on the wire.
    async fn create_topic(&self, name: String) -> ClientResult<String>;

    async fn create_temporary_queue(&self) -> ClientResult<String>;

    async fn create_temporary_topic(&self) -> ClientResult<String>;

    /// A producer without destination must be given one on every send.
    async fn create_producer(
        &self,
        destination: Option<Destination>,
    ) -> ClientResult<Box<dyn AmqpProducer>>;

    async fn create_consumer(&self, spec: ConsumerSpec) -> ClientResult<Box<dyn AmqpConsumer>>;

    async fn create_browser(
        &self,
        queue: Destination,
        selector: Option<String>,
    ) -> ClientResult<Box<dyn AmqpBrowser>>;

    async fn unsubscribe(&self, name: String) -> ClientResult<()>;

    async fn acknowledge(&self) -> ClientResult<()>;

    async fn commit(&self) -> ClientResult<()>;

    async fn rollback(&self) -> ClientResult<()>;

    async fn recover(&self) -> ClientResult<()>;

    async fn close(&self) -> ClientResult<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AmqpProducer: Send + Sync {
    async fn send(&self, destination: Option<Destination>, message: Message) -> ClientResult<()>;

    async fn close(&self) -> ClientResult<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AmqpConsumer: Send + Sync {
    /// Waits up to `timeout` for a message, forever when `None`.
    /// `Ok(None)` means the timeout elapsed or the consumer was closed.
    async fn receive(&self, timeout: Option<Duration>) -> ClientResult<Option<Message>>;

    async fn close(&self) -> ClientResult<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AmqpBrowser: Send + Sync {
    /// Next message of the browsed queue, `None` once exhausted.
    async fn next(&self) -> ClientResult<Option<Message>>;

    async fn close(&self) -> ClientResult<()>;
}
