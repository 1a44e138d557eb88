// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Connections
//!
//! Wrappers around a connection opened by the client library. Sessions
//! created from a connection are wrapped before being handed out.

use crate::{
    client::{AmqpConnection, SessionMode},
    errors::{from_client, ServiceBusError},
    session::{ServiceBusQueueSession, ServiceBusSession, ServiceBusTopicSession},
};
use std::{ops::Deref, sync::Arc};
use tracing::debug;

/// Connection wrapper.
///
/// Clones share the same underlying connection. Sessions created here are
/// wrapped in [`ServiceBusSession`] so that queues and topics they return can
/// be stored in a naming directory.
#[derive(Clone)]
pub struct ServiceBusConnection {
    inner: Arc<dyn AmqpConnection>,
}

impl ServiceBusConnection {
    pub(crate) fn new(inner: Arc<dyn AmqpConnection>) -> Self {
        ServiceBusConnection { inner }
    }

    /// Creates a session. `mode` is ignored when `transacted` is set.
    ///
    /// # Parameters
    /// * `transacted` - Whether the session is transacted
    /// * `mode` - Acknowledge mode of a non transacted session
    ///
    /// # Returns
    /// The wrapped session, or the error reported by the client library
    pub async fn create_session(
        &self,
        transacted: bool,
        mode: SessionMode,
    ) -> Result<ServiceBusSession, ServiceBusError> {
        self.create_session_with_mode(SessionMode::resolve(transacted, mode))
            .await
    }

    /// Creates a session with an explicit mode, [`SessionMode::Transacted`]
    /// included.
    pub async fn create_session_with_mode(
        &self,
        mode: SessionMode,
    ) -> Result<ServiceBusSession, ServiceBusError> {
        debug!(mode = ?mode, "creating session...");
        let inner = from_client(
            self.inner.create_session(mode).await,
            "failure to create a session",
        )?;
        debug!("session created");
        Ok(ServiceBusSession::new(inner))
    }

    /// Creates a non transacted, auto-acknowledged session.
    pub async fn create_default_session(&self) -> Result<ServiceBusSession, ServiceBusError> {
        self.create_session_with_mode(SessionMode::AutoAcknowledge)
            .await
    }

    /// Client id of the connection, if any.
    pub fn client_id(&self) -> Option<String> {
        self.inner.client_id()
    }

    /// Sets the client id. The client library rejects this once the
    /// connection has been used.
    ///
    /// # Parameters
    /// * `client_id` - The id identifying durable subscriptions of this client
    pub async fn set_client_id(&self, client_id: &str) -> Result<(), ServiceBusError> {
        from_client(
            self.inner.set_client_id(client_id.to_owned()).await,
            "failure to set client id",
        )
    }

    /// Starts delivery of incoming messages to consumers.
    pub async fn start(&self) -> Result<(), ServiceBusError> {
        from_client(self.inner.start().await, "failure to start connection")
    }

    /// Pauses delivery of incoming messages. Sending is not affected.
    pub async fn stop(&self) -> Result<(), ServiceBusError> {
        from_client(self.inner.stop().await, "failure to stop connection")
    }

    /// Closes the connection and every session created from it.
    pub async fn close(&self) -> Result<(), ServiceBusError> {
        debug!("closing connection");
        from_client(self.inner.close().await, "failure to close connection")
    }
}

/// Connection restricted to point-to-point messaging.
#[derive(Clone)]
pub struct ServiceBusQueueConnection(ServiceBusConnection);

impl ServiceBusQueueConnection {
    pub(crate) fn new(connection: ServiceBusConnection) -> Self {
        ServiceBusQueueConnection(connection)
    }

    /// Creates a session for queue senders and receivers.
    ///
    /// # Parameters
    /// * `transacted` - Whether the session is transacted
    /// * `mode` - Acknowledge mode of a non transacted session
    pub async fn create_queue_session(
        &self,
        transacted: bool,
        mode: SessionMode,
    ) -> Result<ServiceBusQueueSession, ServiceBusError> {
        let session = self.0.create_session(transacted, mode).await?;
        Ok(ServiceBusQueueSession::new(session))
    }
}

impl Deref for ServiceBusQueueConnection {
    type Target = ServiceBusConnection;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Connection restricted to publish/subscribe messaging.
#[derive(Clone)]
pub struct ServiceBusTopicConnection(ServiceBusConnection);

impl ServiceBusTopicConnection {
    pub(crate) fn new(connection: ServiceBusConnection) -> Self {
        ServiceBusTopicConnection(connection)
    }

    /// Creates a session for topic publishers and subscribers.
    ///
    /// # Parameters
    /// * `transacted` - Whether the session is transacted
    /// * `mode` - Acknowledge mode of a non transacted session
    pub async fn create_topic_session(
        &self,
        transacted: bool,
        mode: SessionMode,
    ) -> Result<ServiceBusTopicSession, ServiceBusError> {
        let session = self.0.create_session(transacted, mode).await?;
        Ok(ServiceBusTopicSession::new(session))
    }
}

impl Deref for ServiceBusTopicConnection {
    type Target = ServiceBusConnection;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{MockAmqpConnection, MockAmqpSession};

    fn session_for(mode: SessionMode) -> MockAmqpConnection {
        let mut inner = MockAmqpConnection::new();
        inner
            .expect_create_session()
            .withf(move |m| *m == mode)
            .times(1)
            .returning(|m| {
                let mut session = MockAmqpSession::new();
                session.expect_session_mode().return_const(m);
                Ok(Box::new(session))
            });
        inner
    }

    #[tokio::test]
    async fn test_transacted_session() {
        let connection = ServiceBusConnection::new(Arc::new(session_for(SessionMode::Transacted)));
        let session = connection
            .create_session(true, SessionMode::ClientAcknowledge)
            .await
            .unwrap();

        assert!(session.transacted());
    }

    #[tokio::test]
    async fn test_default_session() {
        let connection =
            ServiceBusConnection::new(Arc::new(session_for(SessionMode::AutoAcknowledge)));
        let session = connection.create_default_session().await.unwrap();

        assert_eq!(session.session_mode(), SessionMode::AutoAcknowledge);
    }

    #[tokio::test]
    async fn test_lifecycle_is_forwarded() {
        let mut inner = MockAmqpConnection::new();
        inner
            .expect_client_id()
            .return_const(Some("client-1".to_owned()));
        inner
            .expect_set_client_id()
            .withf(|id| id == "client-2")
            .returning(|_| Ok(()));
        inner.expect_start().times(1).returning(|| Ok(()));
        inner.expect_stop().times(1).returning(|| Ok(()));
        inner.expect_close().times(1).returning(|| Ok(()));

        let connection = ServiceBusConnection::new(Arc::new(inner));

        assert_eq!(connection.client_id().as_deref(), Some("client-1"));
        connection.set_client_id("client-2").await.unwrap();
        connection.start().await.unwrap();
        connection.stop().await.unwrap();
        connection.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_failure() {
        let mut inner = MockAmqpConnection::new();
        inner
            .expect_start()
            .returning(|| Err("broker unreachable".into()));

        let connection = ServiceBusConnection::new(Arc::new(inner));
        assert_eq!(
            connection.start().await,
            Err(ServiceBusError::Client("broker unreachable".to_owned()))
        );
    }

    #[tokio::test]
    async fn test_queue_and_topic_sessions() {
        let queue_connection = ServiceBusQueueConnection::new(ServiceBusConnection::new(
            Arc::new(session_for(SessionMode::ClientAcknowledge)),
        ));
        let session = queue_connection
            .create_queue_session(false, SessionMode::ClientAcknowledge)
            .await
            .unwrap();
        assert_eq!(session.session_mode(), SessionMode::ClientAcknowledge);

        let topic_connection = ServiceBusTopicConnection::new(ServiceBusConnection::new(
            Arc::new(session_for(SessionMode::DupsOkAcknowledge)),
        ));
        let session = topic_connection
            .create_topic_session(false, SessionMode::DupsOkAcknowledge)
            .await
            .unwrap();
        assert_eq!(session.session_mode(), SessionMode::DupsOkAcknowledge);
    }
}
