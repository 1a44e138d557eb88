// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Connection Factory
//!
//! Entry point of the crate. A [`ServiceBusConnectionFactoryBuilder`] gathers
//! the host, the credentials and the settings; only a successful
//! [`build`](ServiceBusConnectionFactoryBuilder::build) yields a
//! [`ServiceBusConnectionFactory`], which is the only type able to open
//! connections and contexts.
//!
//! The remote URI is computed once at build time from the settings.

use crate::{
    client::{AmqpClient, ConnectRequest, SessionMode},
    connection::{ServiceBusConnection, ServiceBusQueueConnection, ServiceBusTopicConnection},
    connection_string::ConnectionStringBuilder,
    context::ServiceBusContext,
    credential::{Credentials, TokenCredential},
    errors::{from_client, ServiceBusError},
    message::PropertyValue,
    reference::{find_property, require_property, Properties, ReferenceFactory, Storable},
    settings::ConnectionFactorySettings,
    uri::build_remote_connection_uri,
};
use std::{collections::BTreeMap, fmt, sync::Arc};
use tracing::{debug, error};

/// Maximum length of a custom user agent
pub const MAX_CUSTOM_USER_AGENT_LENGTH: usize = 128;

/// Open property flagging the connection as opened by this client
pub const IS_CLIENT_PROVIDER_PROPERTY: &str = "com.microsoft:is-client-provider";
/// Open property carrying the user agent
pub const USER_AGENT_PROPERTY: &str = "user-agent";
/// Open properties carrying the auto-delete durations, in seconds
pub const QUEUE_AUTO_DELETE_PROPERTY: &str = "com.microsoft:queue-auto-delete-on-idle-duration-in-seconds";
pub const TOPIC_AUTO_DELETE_PROPERTY: &str = "com.microsoft:topic-auto-delete-on-idle-duration-in-seconds";
pub const SUBSCRIBER_AUTO_DELETE_PROPERTY: &str =
    "com.microsoft:subscriber-auto-delete-on-idle-duration-in-seconds";

const USER_AGENT_PREFIX: &str = "ServiceBusJms";

// reference properties
const CONNECTION_STRING_PROPERTY: &str = "connectionString";
const CLIENT_ID_PROPERTY: &str = "clientId";
const SETTINGS_PROPERTY: &str = "settings";
const CUSTOM_USER_AGENT_PROPERTY: &str = "customUserAgent";

/// Version announced in the user agent.
fn client_version() -> &'static str {
    option_env!("CARGO_PKG_VERSION").unwrap_or("unknown")
}

/// Gathers the configuration of a connection factory.
///
/// The builder exposes no messaging operation: validation happens in
/// [`build`](Self::build), which either fails or returns a usable factory.
#[derive(Debug, Default)]
pub struct ServiceBusConnectionFactoryBuilder {
    host: Option<String>,
    credentials: Option<Credentials>,
    settings: Option<ConnectionFactorySettings>,
    connection_string: Option<ConnectionStringBuilder>,
    custom_user_agent: Option<String>,
    client_id: Option<String>,
}

impl ServiceBusConnectionFactoryBuilder {
    /// Creates an empty builder. Host and credentials must be set before `build`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from a Service Bus connection string carrying the endpoint and
    /// the shared access key pair.
    pub fn from_connection_string(connection_string: &str) -> Result<Self, ServiceBusError> {
        Ok(Self::from_connection_string_builder(
            ConnectionStringBuilder::parse(connection_string)?,
        ))
    }

    /// Starts from an already parsed connection string.
    ///
    /// The shared access key pair of the string becomes the credentials.
    pub fn from_connection_string_builder(builder: ConnectionStringBuilder) -> Self {
        let credentials = match (builder.sas_key_name(), builder.sas_key()) {
            (Some(name), Some(key)) => Some(Credentials::shared_access_key(name, key)),
            _ => None,
        };

        ServiceBusConnectionFactoryBuilder {
            host: Some(builder.host().to_owned()),
            credentials,
            connection_string: Some(builder),
            ..Self::default()
        }
    }

    /// Starts from a shared access key pair and a namespace host such as
    /// `contoso.servicebus.windows.net`.
    pub fn with_shared_access_key(
        key_name: impl Into<String>,
        key: impl Into<String>,
        host: impl Into<String>,
    ) -> Self {
        Self::new()
            .host(host)
            .credentials(Credentials::shared_access_key(key_name, key))
    }

    /// Starts from a token credential and a namespace host.
    pub fn with_token_credential(
        credential: Arc<dyn TokenCredential>,
        host: impl Into<String>,
    ) -> Self {
        Self::new()
            .host(host)
            .credentials(Credentials::token(credential))
    }

    /// Sets the namespace host, e.g. `contoso.servicebus.windows.net`.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the credentials presented on connect.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Settings of the factory. Defaults apply when never called.
    pub fn settings(mut self, settings: ConnectionFactorySettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Suffix appended to the user agent announced to the broker.
    pub fn custom_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.custom_user_agent = Some(user_agent.into());
        self
    }

    /// Client id given to every connection of the factory.
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Validates the configuration and builds the factory on top of `client`.
    ///
    /// # Parameters
    /// * `client` - The AMQP client library connections are opened with
    ///
    /// # Returns
    /// The ready factory, or a configuration error when the host or the
    /// credentials are missing or the custom user agent is too long
    pub fn build(
        self,
        client: Arc<dyn AmqpClient>,
    ) -> Result<ServiceBusConnectionFactory, ServiceBusError> {
        let host = self.host.filter(|h| !h.is_empty()).ok_or_else(|| {
            ServiceBusError::configuration(
                "host cannot be empty for a service bus connection factory",
            )
        })?;

        let credentials = self.credentials.ok_or_else(|| {
            ServiceBusError::configuration(
                "authentication settings cannot be empty for a service bus connection factory",
            )
        })?;

        if let Credentials::SharedAccessKey { key_name, key } = &credentials {
            if key_name.is_empty() || key.is_empty() {
                return Err(ServiceBusError::configuration(
                    "shared access key name and key cannot be empty",
                ));
            }
        }

        if let Some(user_agent) = &self.custom_user_agent {
            if user_agent.chars().count() > MAX_CUSTOM_USER_AGENT_LENGTH {
                return Err(ServiceBusError::UserAgentTooLong {
                    max: MAX_CUSTOM_USER_AGENT_LENGTH,
                });
            }
        }

        let settings = self.settings.unwrap_or_default();
        let remote_uri = build_remote_connection_uri(&host, &settings);

        let connection_string = match (self.connection_string, &credentials) {
            (Some(cs), _) => Some(cs),
            (None, Credentials::SharedAccessKey { key_name, key }) => {
                Some(ConnectionStringBuilder::new(&host, key_name, key))
            }
            (None, Credentials::Token(_)) => None,
        };

        debug!(host = host, uri = remote_uri, "connection factory created");

        Ok(ServiceBusConnectionFactory {
            client,
            host,
            credentials,
            settings,
            remote_uri,
            connection_string,
            custom_user_agent: self.custom_user_agent.filter(|ua| !ua.is_empty()),
            client_id: self.client_id.filter(|id| !id.is_empty()),
        })
    }
}

/// Opens connections and contexts to a Service Bus namespace.
pub struct ServiceBusConnectionFactory {
    client: Arc<dyn AmqpClient>,
    host: String,
    credentials: Credentials,
    settings: ConnectionFactorySettings,
    remote_uri: String,
    connection_string: Option<ConnectionStringBuilder>,
    custom_user_agent: Option<String>,
    client_id: Option<String>,
}

impl fmt::Debug for ServiceBusConnectionFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceBusConnectionFactory")
            .field("host", &self.host)
            .field("credentials", &self.credentials)
            .field("remote_uri", &self.remote_uri)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl ServiceBusConnectionFactory {
    /// Kind under which factories are stored in a naming directory
    pub const KIND: &'static str = "servicebus_jms::ServiceBusConnectionFactory";

    /// Rebuilds a factory from its reference properties.
    ///
    /// `connectionString` is mandatory. `settings` (JSON), `customUserAgent`
    /// and `clientId` are applied when present.
    pub fn from_properties(
        client: Arc<dyn AmqpClient>,
        properties: &Properties,
    ) -> Result<Self, ServiceBusError> {
        let connection_string =
            require_property(Self::KIND, properties, CONNECTION_STRING_PROPERTY)?;

        let mut builder = ServiceBusConnectionFactoryBuilder::from_connection_string(&connection_string)?;

        if let Some(settings) = find_property(properties, SETTINGS_PROPERTY).filter(|s| !s.is_empty()) {
            builder = builder.settings(ConnectionFactorySettings::from_json(settings)?);
        }

        if let Some(user_agent) =
            find_property(properties, CUSTOM_USER_AGENT_PROPERTY).filter(|ua| !ua.is_empty())
        {
            builder = builder.custom_user_agent(user_agent);
        }

        if let Some(client_id) = find_property(properties, CLIENT_ID_PROPERTY) {
            builder = builder.client_id(client_id);
        }

        builder.build(client)
    }

    /// Namespace host of the primary endpoint.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// URI handed to the client library, computed once at build time.
    pub fn remote_connection_uri(&self) -> &str {
        &self.remote_uri
    }

    /// Settings the factory was built with.
    pub fn settings(&self) -> &ConnectionFactorySettings {
        &self.settings
    }

    /// Connection string of the factory, absent for token credentials.
    pub fn connection_string_builder(&self) -> Option<&ConnectionStringBuilder> {
        self.connection_string.as_ref()
    }

    /// Custom suffix of the user agent, if any.
    pub fn custom_user_agent(&self) -> Option<&str> {
        self.custom_user_agent.as_deref()
    }

    /// Client id given to new connections, if any.
    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    /// Sets the client id of connections created from now on. An empty id
    /// clears it.
    pub fn set_client_id(&mut self, client_id: impl Into<String>) {
        self.client_id = Some(client_id.into()).filter(|id| !id.is_empty());
    }

    /// Properties sent in the AMQP Open frame of every connection.
    pub fn open_properties(&self) -> BTreeMap<String, PropertyValue> {
        let mut properties = BTreeMap::new();

        properties.insert(IS_CLIENT_PROVIDER_PROPERTY.to_owned(), PropertyValue::Bool(true));

        let mut user_agent = format!("{}-{}", USER_AGENT_PREFIX, client_version());
        if let Some(custom) = &self.custom_user_agent {
            user_agent.push('/');
            user_agent.push_str(custom);
        }
        properties.insert(USER_AGENT_PROPERTY.to_owned(), PropertyValue::String(user_agent));

        let auto_delete = [
            (
                QUEUE_AUTO_DELETE_PROPERTY,
                self.settings.queue_auto_delete_on_idle_seconds(),
            ),
            (
                TOPIC_AUTO_DELETE_PROPERTY,
                self.settings.topic_auto_delete_on_idle_seconds(),
            ),
            (
                SUBSCRIBER_AUTO_DELETE_PROPERTY,
                self.settings.subscriber_auto_delete_on_idle_seconds(),
            ),
        ];

        for (key, seconds) in auto_delete {
            if seconds > 0 {
                let seconds = i64::try_from(seconds).unwrap_or(i64::MAX);
                properties.insert(key.to_owned(), PropertyValue::Long(seconds));
            }
        }

        properties
    }

    /// Opens a connection with the credentials of the factory.
    pub async fn create_connection(&self) -> Result<ServiceBusConnection, ServiceBusError> {
        self.connect(None).await
    }

    /// Opens a connection with explicit credentials. Factories built on a
    /// token credential always authenticate with a token.
    pub async fn create_connection_with(
        &self,
        username: &str,
        password: &str,
    ) -> Result<ServiceBusConnection, ServiceBusError> {
        self.connect(Some((username, password))).await
    }

    /// Opens a connection restricted to queues, with the factory credentials.
    pub async fn create_queue_connection(
        &self,
    ) -> Result<ServiceBusQueueConnection, ServiceBusError> {
        Ok(ServiceBusQueueConnection::new(self.connect(None).await?))
    }

    /// Opens a connection restricted to queues, with explicit credentials.
    pub async fn create_queue_connection_with(
        &self,
        username: &str,
        password: &str,
    ) -> Result<ServiceBusQueueConnection, ServiceBusError> {
        let connection = self.connect(Some((username, password))).await?;
        Ok(ServiceBusQueueConnection::new(connection))
    }

    /// Opens a connection restricted to topics, with the factory credentials.
    pub async fn create_topic_connection(
        &self,
    ) -> Result<ServiceBusTopicConnection, ServiceBusError> {
        Ok(ServiceBusTopicConnection::new(self.connect(None).await?))
    }

    /// Opens a connection restricted to topics, with explicit credentials.
    pub async fn create_topic_connection_with(
        &self,
        username: &str,
        password: &str,
    ) -> Result<ServiceBusTopicConnection, ServiceBusError> {
        let connection = self.connect(Some((username, password))).await?;
        Ok(ServiceBusTopicConnection::new(connection))
    }

    /// Opens a context with an auto-acknowledged session.
    pub async fn create_context(&self) -> Result<ServiceBusContext, ServiceBusError> {
        self.create_context_with_mode(SessionMode::AutoAcknowledge)
            .await
    }

    /// Opens a context whose session uses `mode`.
    ///
    /// # Parameters
    /// * `mode` - Acknowledge mode of the session
    ///
    /// # Returns
    /// A context owning a new connection
    pub async fn create_context_with_mode(
        &self,
        mode: SessionMode,
    ) -> Result<ServiceBusContext, ServiceBusError> {
        ServiceBusContext::open(self.connect(None).await?, mode).await
    }

    /// Opens a context with explicit credentials.
    ///
    /// # Parameters
    /// * `username` - Shared access policy name
    /// * `password` - Shared access key
    /// * `mode` - Acknowledge mode of the session
    pub async fn create_context_with(
        &self,
        username: &str,
        password: &str,
        mode: SessionMode,
    ) -> Result<ServiceBusContext, ServiceBusError> {
        let connection = self.connect(Some((username, password))).await?;
        ServiceBusContext::open(connection, mode).await
    }

    async fn connect(
        &self,
        explicit: Option<(&str, &str)>,
    ) -> Result<ServiceBusConnection, ServiceBusError> {
        let (username, password) = match (&self.credentials, explicit) {
            (Credentials::SharedAccessKey { .. }, Some((user, pass))) => {
                (user.to_owned(), pass.to_owned())
            }
            (credentials, _) => (
                credentials.username().to_owned(),
                credentials.password().await?,
            ),
        };

        let request = ConnectRequest {
            remote_uri: self.remote_uri.clone(),
            username,
            password,
            client_id: self.client_id.clone(),
            open_properties: self.open_properties(),
            proxy_handler: self.settings.proxy_handler_factory().cloned(),
        };

        debug!(uri = self.remote_uri, "creating amqp connection...");
        let inner = from_client(self.client.connect(request).await, "failure to connect")?;
        debug!("amqp connected");

        Ok(ServiceBusConnection::new(Arc::from(inner)))
    }
}

impl Storable for ServiceBusConnectionFactory {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn properties(&self) -> BTreeMap<String, Option<String>> {
        let mut properties = BTreeMap::new();
        properties.insert(
            CONNECTION_STRING_PROPERTY.to_owned(),
            self.connection_string.as_ref().map(ToString::to_string),
        );

        match self.settings.to_json() {
            Ok(settings) => {
                properties.insert(SETTINGS_PROPERTY.to_owned(), Some(settings));
            }
            Err(err) => error!(error = err.to_string(), "failure to encode factory settings"),
        }

        if let Some(user_agent) = &self.custom_user_agent {
            properties.insert(CUSTOM_USER_AGENT_PROPERTY.to_owned(), Some(user_agent.clone()));
        }

        if let Some(client_id) = &self.client_id {
            properties.insert(CLIENT_ID_PROPERTY.to_owned(), Some(client_id.clone()));
        }

        properties
    }
}

impl ReferenceFactory {
    /// Registers the connection factory kind. Factories need the client
    /// library to be rebuilt, so it is captured here.
    pub fn register_connection_factory(self, client: Arc<dyn AmqpClient>) -> Self {
        self.register_with(ServiceBusConnectionFactory::KIND, move |properties| {
            ServiceBusConnectionFactory::from_properties(client.clone(), properties)
                .map(|f| Box::new(f) as Box<dyn Storable>)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        client::{MockAmqpClient, MockAmqpConnection, MockAmqpSession, ProxyHandlerFactory},
        credential::{AccessToken, MockTokenCredential, TOKEN_USERNAME},
        reference::{RefAddr, Reference},
    };
    use std::time::{Duration, SystemTime};

    const HOST: &str = "foo.servicebus.windows.net";
    const CONNECTION_STRING: &str =
        "Endpoint=sb://foo.servicebus.windows.net/;SharedAccessKeyName=user;SharedAccessKey=pass";

    fn idle_client() -> Arc<dyn AmqpClient> {
        Arc::new(MockAmqpClient::new())
    }

    fn connecting_client<F>(check: F) -> Arc<dyn AmqpClient>
    where
        F: Fn(&ConnectRequest) -> bool + Send + Sync + 'static,
    {
        let mut client = MockAmqpClient::new();
        client
            .expect_connect()
            .withf(check)
            .returning(|_| Ok(Box::new(MockAmqpConnection::new())));
        Arc::new(client)
    }

    struct Proxy;

    impl ProxyHandlerFactory for Proxy {
        fn proxy_address(&self) -> String {
            "http://proxy:3128".to_owned()
        }
    }

    #[test]
    fn test_build_with_shared_access_key() {
        let factory = ServiceBusConnectionFactoryBuilder::with_shared_access_key("user", "pass", HOST)
            .build(idle_client())
            .unwrap();

        assert_eq!(
            factory.remote_connection_uri(),
            "failover:(amqps://foo.servicebus.windows.net)?jms.prefetchPolicy.all=0"
        );
        assert_eq!(
            factory.connection_string_builder().map(ToString::to_string),
            Some(CONNECTION_STRING.to_owned())
        );
        assert_eq!(factory.host(), HOST);
    }

    #[test]
    fn test_build_from_connection_string_with_settings() {
        let settings = ConnectionFactorySettings::new()
            .with_should_reconnect(false)
            .with_connection_idle_timeout_ms(20000);

        let factory = ServiceBusConnectionFactoryBuilder::from_connection_string(CONNECTION_STRING)
            .unwrap()
            .settings(settings)
            .build(idle_client())
            .unwrap();

        assert_eq!(
            factory.remote_connection_uri(),
            "amqps://foo.servicebus.windows.net?amqp.idleTimeout=20000&jms.prefetchPolicy.all=0"
        );
        assert_eq!(factory.settings().connection_idle_timeout_ms(), 20000);
    }

    #[test]
    fn test_build_requires_host_and_credentials() {
        let no_host = ServiceBusConnectionFactoryBuilder::new()
            .credentials(Credentials::shared_access_key("user", "pass"))
            .build(idle_client());
        assert!(matches!(no_host, Err(ServiceBusError::Configuration(_))));

        let empty_host = ServiceBusConnectionFactoryBuilder::with_shared_access_key("user", "pass", "")
            .build(idle_client());
        assert!(matches!(empty_host, Err(ServiceBusError::Configuration(_))));

        let no_credentials = ServiceBusConnectionFactoryBuilder::new()
            .host(HOST)
            .build(idle_client());
        assert!(matches!(no_credentials, Err(ServiceBusError::Configuration(_))));

        let empty_key = ServiceBusConnectionFactoryBuilder::with_shared_access_key("user", "", HOST)
            .build(idle_client());
        assert!(matches!(empty_key, Err(ServiceBusError::Configuration(_))));

        let no_key_in_string = ServiceBusConnectionFactoryBuilder::from_connection_string(
            "Endpoint=sb://foo.servicebus.windows.net/",
        )
        .unwrap()
        .build(idle_client());
        assert!(matches!(no_key_in_string, Err(ServiceBusError::Configuration(_))));
    }

    #[test]
    fn test_custom_user_agent_length() {
        let too_long = ServiceBusConnectionFactoryBuilder::with_shared_access_key("user", "pass", HOST)
            .custom_user_agent("a".repeat(MAX_CUSTOM_USER_AGENT_LENGTH + 1))
            .build(idle_client());
        assert_eq!(
            too_long.err(),
            Some(ServiceBusError::UserAgentTooLong {
                max: MAX_CUSTOM_USER_AGENT_LENGTH
            })
        );

        let at_limit = ServiceBusConnectionFactoryBuilder::with_shared_access_key("user", "pass", HOST)
            .custom_user_agent("a".repeat(MAX_CUSTOM_USER_AGENT_LENGTH))
            .build(idle_client());
        assert!(at_limit.is_ok());
    }

    #[test]
    fn test_open_properties() {
        let settings = ConnectionFactorySettings::new()
            .with_queue_auto_delete_on_idle_seconds(300)
            .with_subscriber_auto_delete_on_idle_seconds(600);

        let factory = ServiceBusConnectionFactoryBuilder::with_shared_access_key("user", "pass", HOST)
            .settings(settings)
            .custom_user_agent("orders-service")
            .build(idle_client())
            .unwrap();

        let properties = factory.open_properties();

        assert_eq!(
            properties.get(IS_CLIENT_PROVIDER_PROPERTY),
            Some(&PropertyValue::Bool(true))
        );
        assert_eq!(
            properties.get(USER_AGENT_PROPERTY),
            Some(&PropertyValue::String(format!(
                "ServiceBusJms-{}/orders-service",
                env!("CARGO_PKG_VERSION")
            )))
        );
        assert_eq!(
            properties.get(QUEUE_AUTO_DELETE_PROPERTY),
            Some(&PropertyValue::Long(300))
        );
        assert_eq!(properties.get(TOPIC_AUTO_DELETE_PROPERTY), None);
        assert_eq!(
            properties.get(SUBSCRIBER_AUTO_DELETE_PROPERTY),
            Some(&PropertyValue::Long(600))
        );
    }

    #[tokio::test]
    async fn test_create_connection_sends_request() {
        let client = connecting_client(|request| {
            request.remote_uri == "failover:(amqps://foo.servicebus.windows.net)?jms.prefetchPolicy.all=0"
                && request.username == "user"
                && request.password == "pass"
                && request.client_id.as_deref() == Some("client-1")
                && request.proxy_handler.as_ref().map(|p| p.proxy_address())
                    == Some("http://proxy:3128".to_owned())
        });

        let factory = ServiceBusConnectionFactoryBuilder::with_shared_access_key("user", "pass", HOST)
            .settings(ConnectionFactorySettings::new().with_proxy_handler_factory(Arc::new(Proxy)))
            .client_id("client-1")
            .build(client)
            .unwrap();

        factory.create_connection().await.unwrap();
    }

    #[tokio::test]
    async fn test_create_connection_with_explicit_credentials() {
        let client = connecting_client(|request| {
            request.username == "other" && request.password == "secret"
        });

        let factory = ServiceBusConnectionFactoryBuilder::with_shared_access_key("user", "pass", HOST)
            .build(client)
            .unwrap();

        factory
            .create_queue_connection_with("other", "secret")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_token_credential_overrides_explicit_credentials() {
        let mut credential = MockTokenCredential::new();
        credential.expect_get_token().times(1).returning(|_| {
            Ok(AccessToken::new(
                "jwt-token",
                SystemTime::now() + Duration::from_secs(3600),
            ))
        });

        let client = connecting_client(|request| {
            request.username == TOKEN_USERNAME && request.password == "jwt-token"
        });

        let factory = ServiceBusConnectionFactoryBuilder::with_token_credential(Arc::new(credential), HOST)
            .build(client)
            .unwrap();

        assert!(factory.connection_string_builder().is_none());
        factory.create_topic_connection().await.unwrap();
        factory
            .create_connection_with("ignored", "ignored")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let mut client = MockAmqpClient::new();
        client
            .expect_connect()
            .returning(|_| Err("amqp:unauthorized-access".into()));

        let factory = ServiceBusConnectionFactoryBuilder::with_shared_access_key("user", "pass", HOST)
            .build(Arc::new(client))
            .unwrap();

        assert_eq!(
            factory.create_connection().await.err(),
            Some(ServiceBusError::Client("amqp:unauthorized-access".to_owned()))
        );
    }

    #[tokio::test]
    async fn test_create_context_opens_session() {
        let mut client = MockAmqpClient::new();
        client.expect_connect().returning(|_| {
            let mut connection = MockAmqpConnection::new();
            connection
                .expect_create_session()
                .withf(|mode| *mode == SessionMode::ClientAcknowledge)
                .returning(|mode| {
                    let mut session = MockAmqpSession::new();
                    session.expect_session_mode().return_const(mode);
                    Ok(Box::new(session))
                });
            Ok(Box::new(connection))
        });

        let factory = ServiceBusConnectionFactoryBuilder::with_shared_access_key("user", "pass", HOST)
            .build(Arc::new(client))
            .unwrap();

        let context = factory
            .create_context_with_mode(SessionMode::ClientAcknowledge)
            .await
            .unwrap();
        assert_eq!(context.session_mode(), SessionMode::ClientAcknowledge);
    }

    #[test]
    fn test_reference_round_trip() {
        let mut factory = ServiceBusConnectionFactoryBuilder::from_connection_string(CONNECTION_STRING)
            .unwrap()
            .build(idle_client())
            .unwrap();
        factory.set_client_id("client-1");

        let reference = factory.reference();
        assert_eq!(reference.class_name(), ServiceBusConnectionFactory::KIND);

        let decoded: ServiceBusConnectionFactory = ReferenceFactory::with_defaults()
            .register_connection_factory(idle_client())
            .get_instance(&reference)
            .unwrap();

        assert_eq!(decoded.remote_connection_uri(), factory.remote_connection_uri());
        assert_eq!(decoded.client_id(), Some("client-1"));
        assert_eq!(decoded.host(), factory.host());
        assert_eq!(
            decoded.connection_string_builder(),
            factory.connection_string_builder()
        );
    }

    #[test]
    fn test_reference_round_trip_keeps_settings_and_user_agent() {
        let settings = ConnectionFactorySettings::new()
            .with_should_reconnect(false)
            .with_connection_idle_timeout_ms(20000)
            .with_topic_auto_delete_on_idle_seconds(900)
            .with_option("jms.prefetchPolicy.all", "20");

        let factory = ServiceBusConnectionFactoryBuilder::from_connection_string(CONNECTION_STRING)
            .unwrap()
            .settings(settings)
            .custom_user_agent("orders")
            .build(idle_client())
            .unwrap();

        let decoded: ServiceBusConnectionFactory = ReferenceFactory::new()
            .register_connection_factory(idle_client())
            .get_instance(&factory.reference())
            .unwrap();

        assert_eq!(
            decoded.remote_connection_uri(),
            "amqps://foo.servicebus.windows.net?amqp.idleTimeout=20000&jms.prefetchPolicy.all=20"
        );
        assert_eq!(decoded.remote_connection_uri(), factory.remote_connection_uri());
        assert_eq!(decoded.custom_user_agent(), Some("orders"));
        assert!(!decoded.settings().should_reconnect());
        assert_eq!(decoded.settings().topic_auto_delete_on_idle_seconds(), 900);
        assert_eq!(decoded.open_properties(), factory.open_properties());
    }

    #[test]
    fn test_invalid_settings_property_fails_decoding() {
        let mut reference = Reference::new(ServiceBusConnectionFactory::KIND);
        reference.add(RefAddr::new(CONNECTION_STRING_PROPERTY, Some(CONNECTION_STRING.to_owned())));
        reference.add(RefAddr::new(SETTINGS_PROPERTY, Some("{ \"idleTimeout\": 1 }".to_owned())));

        let err = ReferenceFactory::new()
            .register_connection_factory(idle_client())
            .decode(&reference)
            .err();
        assert!(matches!(err, Some(ServiceBusError::Configuration(_))));
    }

    #[test]
    fn test_empty_client_id_is_not_stored() {
        let mut factory = ServiceBusConnectionFactoryBuilder::from_connection_string(CONNECTION_STRING)
            .unwrap()
            .build(idle_client())
            .unwrap();
        factory.set_client_id("");

        assert_eq!(factory.client_id(), None);
        assert!(factory.reference().get(CLIENT_ID_PROPERTY).is_none());
    }

    #[test]
    fn test_token_factory_reference_cannot_be_decoded() {
        let mut credential = MockTokenCredential::new();
        credential.expect_get_token().never();

        let factory = ServiceBusConnectionFactoryBuilder::with_token_credential(Arc::new(credential), HOST)
            .build(idle_client())
            .unwrap();

        let reference = factory.reference();
        assert_eq!(
            reference.get(CONNECTION_STRING_PROPERTY),
            Some(&RefAddr::new(CONNECTION_STRING_PROPERTY, Some(String::new())))
        );

        let err = ReferenceFactory::new()
            .register_connection_factory(idle_client())
            .decode(&reference)
            .err();
        assert_eq!(
            err,
            Some(ServiceBusError::RequiredProperty {
                kind: ServiceBusConnectionFactory::KIND.to_owned(),
                property: CONNECTION_STRING_PROPERTY.to_owned(),
            })
        );
    }

    #[test]
    fn test_decode_is_case_insensitive() {
        let mut reference = Reference::new(ServiceBusConnectionFactory::KIND);
        reference.add(RefAddr::new("CONNECTIONSTRING", Some(CONNECTION_STRING.to_owned())));
        reference.add(RefAddr::new("clientid", None));

        let decoded: ServiceBusConnectionFactory = ReferenceFactory::new()
            .register_connection_factory(idle_client())
            .get_instance(&reference)
            .unwrap();

        assert_eq!(decoded.host(), HOST);
        assert_eq!(decoded.client_id(), None);
    }
}
