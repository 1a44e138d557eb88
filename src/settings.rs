// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Connection Factory Settings
//!
//! This module holds every tunable value of a connection factory: AMQP transport
//! options, auto-delete durations announced to the broker, free-form provider
//! options and the failover (reconnect) parameters understood by the wrapped
//! client library.
//!
//! Optional failover fields are `Option`s so that an unset value contributes
//! nothing to the derived queries, while an explicit zero or `false` does.

use crate::{client::ProxyHandlerFactory, connection_string::ConnectionStringBuilder, errors::ServiceBusError};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, sync::Arc};

/// Options applied when the caller does not supply a value for the same key.
pub const DEFAULT_CONFIGURATION_OPTIONS: &[(&str, &str)] = &[("jms.prefetchPolicy.all", "0")];

/// Option key prefixes that belong to each host of the URI rather than to the
/// global query.
const PER_HOST_OPTION_PREFIXES: &[&str] = &["amqp.", "transport."];
const FAILOVER_OPTION_PREFIX: &str = "failover.";

const AMQP_IDLE_TIMEOUT: &str = "amqp.idleTimeout";
const AMQP_TRACE_FRAMES: &str = "amqp.traceFrames";

/// How the failover transport treats the server list announced by the remote
/// peer in its AMQP Open frame.
///
/// - Replace: every reconnect host except the current one is replaced by the remote list
/// - Add: the remote hosts are added to the existing set, without duplicates
/// - Ignore: the remote list is dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ServerListMergeAction {
    Replace,
    Add,
    Ignore,
}

impl fmt::Display for ServerListMergeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServerListMergeAction::Replace => "REPLACE",
            ServerListMergeAction::Add => "ADD",
            ServerListMergeAction::Ignore => "IGNORE",
        };
        f.write_str(name)
    }
}

/// Settings used by a connection factory to build its remote URI and the
/// properties it announces when opening a connection.
///
/// Settings can be assembled with the `with_*` builder methods or
/// deserialized from JSON with [`ConnectionFactorySettings::from_json`].
#[derive(Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct ConnectionFactorySettings {
    connection_idle_timeout_ms: u64,
    trace_frames: bool,
    #[serde(skip)]
    proxy_handler_factory: Option<Arc<dyn ProxyHandlerFactory>>,
    queue_auto_delete_on_idle_seconds: u64,
    topic_auto_delete_on_idle_seconds: u64,
    subscriber_auto_delete_on_idle_seconds: u64,
    configuration_options: BTreeMap<String, String>,

    should_reconnect: bool,
    reconnect_hosts: Option<Vec<String>>,
    initial_reconnect_delay: Option<u64>,
    reconnect_delay: Option<u64>,
    max_reconnect_delay: Option<u64>,
    use_reconnect_back_off: Option<bool>,
    reconnect_back_off_multiplier: Option<f64>,
    max_reconnect_attempts: Option<i32>,
    startup_max_reconnect_attempts: Option<i32>,
    warn_after_reconnect_attempts: Option<i32>,
    randomize: Option<bool>,
    server_list_merge_action: Option<ServerListMergeAction>,
}

impl Default for ConnectionFactorySettings {
    fn default() -> Self {
        ConnectionFactorySettings {
            connection_idle_timeout_ms: 0,
            trace_frames: false,
            proxy_handler_factory: None,
            queue_auto_delete_on_idle_seconds: 0,
            topic_auto_delete_on_idle_seconds: 0,
            subscriber_auto_delete_on_idle_seconds: 0,
            configuration_options: BTreeMap::default(),
            should_reconnect: true,
            reconnect_hosts: None,
            initial_reconnect_delay: None,
            reconnect_delay: None,
            max_reconnect_delay: None,
            use_reconnect_back_off: None,
            reconnect_back_off_multiplier: None,
            max_reconnect_attempts: None,
            startup_max_reconnect_attempts: None,
            warn_after_reconnect_attempts: None,
            randomize: None,
            server_list_merge_action: None,
        }
    }
}

impl fmt::Debug for ConnectionFactorySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionFactorySettings")
            .field("connection_idle_timeout_ms", &self.connection_idle_timeout_ms)
            .field("trace_frames", &self.trace_frames)
            .field("proxy_handler_factory", &self.proxy_handler_factory.is_some())
            .field("configuration_options", &self.configuration_options)
            .field("should_reconnect", &self.should_reconnect)
            .field("reconnect_hosts", &self.reconnect_hosts)
            .field("failover_query", &self.failover_query())
            .finish_non_exhaustive()
    }
}

impl ConnectionFactorySettings {
    /// Creates settings with every value at its default: reconnect enabled,
    /// no transport options and the default provider options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates settings with caller-supplied provider options.
    ///
    /// Keys are case-sensitive and passed to the client library as-is.
    /// A default option is only applied when its key is absent from `options`.
    pub fn with_options(options: BTreeMap<String, String>) -> Self {
        ConnectionFactorySettings {
            configuration_options: options,
            ..Self::default()
        }
    }

    /// Deserializes settings from a JSON document using camelCase keys,
    /// e.g. `{"connectionIdleTimeoutMs": 20000, "reconnectHosts": ["h2"]}`.
    pub fn from_json(json: &str) -> Result<Self, ServiceBusError> {
        serde_json::from_str(json)
            .map_err(|err| ServiceBusError::configuration(format!("invalid settings: {}", err)))
    }

    /// Serializes the settings to JSON, the format read by [`Self::from_json`].
    ///
    /// The proxy handler factory is not serializable and is left out.
    pub fn to_json(&self) -> Result<String, ServiceBusError> {
        serde_json::to_string(self)
            .map_err(|err| ServiceBusError::configuration(format!("invalid settings: {}", err)))
    }

    /// Sets the AMQP idle timeout. Zero leaves the client default.
    ///
    /// # Parameters
    /// * `timeout` - Idle timeout in milliseconds
    ///
    /// # Returns
    /// Self for method chaining
    pub fn with_connection_idle_timeout_ms(mut self, timeout: u64) -> Self {
        self.connection_idle_timeout_ms = timeout;
        self
    }

    /// Enables logging of AMQP frames by the client library.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn with_trace_frames(mut self, trace: bool) -> Self {
        self.trace_frames = trace;
        self
    }

    /// Sets the factory used by the transport to tunnel through a proxy.
    pub fn with_proxy_handler_factory(mut self, factory: Arc<dyn ProxyHandlerFactory>) -> Self {
        self.proxy_handler_factory = Some(factory);
        self
    }

    /// Deletes queues created by the client after `seconds` of inactivity.
    /// Zero disables it.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn with_queue_auto_delete_on_idle_seconds(mut self, seconds: u64) -> Self {
        self.queue_auto_delete_on_idle_seconds = seconds;
        self
    }

    /// Deletes topics created by the client after `seconds` of inactivity.
    /// Zero disables it.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn with_topic_auto_delete_on_idle_seconds(mut self, seconds: u64) -> Self {
        self.topic_auto_delete_on_idle_seconds = seconds;
        self
    }

    /// Deletes subscriptions created by the client after `seconds` of
    /// inactivity. Zero disables it.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn with_subscriber_auto_delete_on_idle_seconds(mut self, seconds: u64) -> Self {
        self.subscriber_auto_delete_on_idle_seconds = seconds;
        self
    }

    /// Adds a single provider option, overriding any default for the same key.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.configuration_options.insert(key.into(), value.into());
        self
    }

    /// Enables or disables the failover transport. Enabled by default.
    pub fn with_should_reconnect(mut self, reconnect: bool) -> Self {
        self.should_reconnect = reconnect;
        self
    }

    /// Sets the hosts the client fails over to, e.g. `contoso2.servicebus.windows.net`.
    pub fn with_reconnect_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reconnect_hosts = Some(hosts.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the reconnect hosts from the endpoints of Service Bus connection strings.
    pub fn with_reconnect_hosts_from_connection_strings(
        self,
        connection_strings: &[&str],
    ) -> Result<Self, ServiceBusError> {
        let hosts = connection_strings
            .iter()
            .map(|cs| ConnectionStringBuilder::parse(cs).map(|b| b.host().to_owned()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(self.with_reconnect_hosts(hosts))
    }

    /// Delay before the first reconnect attempt, in milliseconds.
    pub fn with_initial_reconnect_delay(mut self, delay: u64) -> Self {
        self.initial_reconnect_delay = Some(delay);
        self
    }

    /// Delay between successive reconnect attempts, in milliseconds.
    pub fn with_reconnect_delay(mut self, delay: u64) -> Self {
        self.reconnect_delay = Some(delay);
        self
    }

    /// Upper bound of the reconnect delay, in milliseconds.
    pub fn with_max_reconnect_delay(mut self, delay: u64) -> Self {
        self.max_reconnect_delay = Some(delay);
        self
    }

    /// Grows the delay between reconnect attempts.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn with_use_reconnect_back_off(mut self, back_off: bool) -> Self {
        self.use_reconnect_back_off = Some(back_off);
        self
    }

    /// Factor applied to the reconnect delay after each attempt.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn with_reconnect_back_off_multiplier(mut self, multiplier: f64) -> Self {
        self.reconnect_back_off_multiplier = Some(multiplier);
        self
    }

    /// Number of attempts before reporting the connection as failed. `-1` means no limit.
    pub fn with_max_reconnect_attempts(mut self, attempts: i32) -> Self {
        self.max_reconnect_attempts = Some(attempts);
        self
    }

    /// Limits the attempts made before the first successful connect.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn with_startup_max_reconnect_attempts(mut self, attempts: i32) -> Self {
        self.startup_max_reconnect_attempts = Some(attempts);
        self
    }

    /// Number of failed attempts after which the client library logs a warning.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn with_warn_after_reconnect_attempts(mut self, attempts: i32) -> Self {
        self.warn_after_reconnect_attempts = Some(attempts);
        self
    }

    /// Shuffles the failover hosts before connecting. This makes the URI
    /// consumer non-deterministic, the URI itself stays stable.
    pub fn with_randomize(mut self, randomize: bool) -> Self {
        self.randomize = Some(randomize);
        self
    }

    /// Sets how the server list announced by the broker is merged.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn with_server_list_merge_action(mut self, action: ServerListMergeAction) -> Self {
        self.server_list_merge_action = Some(action);
        self
    }

    /// AMQP idle timeout in milliseconds, zero when unset.
    pub fn connection_idle_timeout_ms(&self) -> u64 {
        self.connection_idle_timeout_ms
    }

    /// Whether AMQP frames are logged.
    pub fn trace_frames(&self) -> bool {
        self.trace_frames
    }

    /// Proxy used to reach the broker, if any.
    pub fn proxy_handler_factory(&self) -> Option<&Arc<dyn ProxyHandlerFactory>> {
        self.proxy_handler_factory.as_ref()
    }

    /// Idle seconds before a client created queue is deleted.
    pub fn queue_auto_delete_on_idle_seconds(&self) -> u64 {
        self.queue_auto_delete_on_idle_seconds
    }

    pub fn topic_auto_delete_on_idle_seconds(&self) -> u64 {
        self.topic_auto_delete_on_idle_seconds
    }

    pub fn subscriber_auto_delete_on_idle_seconds(&self) -> u64 {
        self.subscriber_auto_delete_on_idle_seconds
    }

    /// Whether the URI uses the failover transport.
    pub fn should_reconnect(&self) -> bool {
        self.should_reconnect
    }

    /// Hosts tried after the primary one.
    pub fn reconnect_hosts(&self) -> Option<&[String]> {
        self.reconnect_hosts.as_deref()
    }

    pub fn initial_reconnect_delay(&self) -> Option<u64> {
        self.initial_reconnect_delay
    }

    pub fn reconnect_delay(&self) -> Option<u64> {
        self.reconnect_delay
    }

    pub fn max_reconnect_delay(&self) -> Option<u64> {
        self.max_reconnect_delay
    }

    pub fn use_reconnect_back_off(&self) -> Option<bool> {
        self.use_reconnect_back_off
    }

    pub fn reconnect_back_off_multiplier(&self) -> Option<f64> {
        self.reconnect_back_off_multiplier
    }

    pub fn max_reconnect_attempts(&self) -> Option<i32> {
        self.max_reconnect_attempts
    }

    pub fn startup_max_reconnect_attempts(&self) -> Option<i32> {
        self.startup_max_reconnect_attempts
    }

    pub fn warn_after_reconnect_attempts(&self) -> Option<i32> {
        self.warn_after_reconnect_attempts
    }

    pub fn randomize(&self) -> Option<bool> {
        self.randomize
    }

    pub fn server_list_merge_action(&self) -> Option<ServerListMergeAction> {
        self.server_list_merge_action
    }

    /// Returns the caller-supplied options merged over the defaults.
    pub fn configuration_options(&self) -> BTreeMap<String, String> {
        let mut options: BTreeMap<String, String> = DEFAULT_CONFIGURATION_OPTIONS
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();

        options.extend(
            self.configuration_options
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );

        options
    }

    /// Query appended to every host of the URI: transport level options.
    pub fn per_host_amqp_query(&self) -> String {
        let mut query = Query::default();

        if self.connection_idle_timeout_ms > 0 {
            query.append(AMQP_IDLE_TIMEOUT, self.connection_idle_timeout_ms);
        }

        if self.trace_frames {
            query.append(AMQP_TRACE_FRAMES, true);
        }

        for (key, value) in self.configuration_options() {
            if is_per_host_option(&key) {
                query.append(&key, value);
            }
        }

        query.finish()
    }

    /// Query of the failover transport. Only present tuning fields are rendered.
    pub fn failover_query(&self) -> String {
        let mut query = Query::default();

        query.append_opt("failover.initialReconnectDelay", self.initial_reconnect_delay);
        query.append_opt("failover.reconnectDelay", self.reconnect_delay);
        query.append_opt("failover.maxReconnectDelay", self.max_reconnect_delay);
        query.append_opt("failover.useReconnectBackOff", self.use_reconnect_back_off);
        query.append_opt(
            "failover.reconnectBackOffMultiplier",
            // `{:?}` keeps the fraction on whole numbers: 2.0, not 2
            self.reconnect_back_off_multiplier.map(|m| format!("{:?}", m)),
        );
        query.append_opt("failover.maxReconnectAttempts", self.max_reconnect_attempts);
        query.append_opt(
            "failover.startupMaxReconnectAttempts",
            self.startup_max_reconnect_attempts,
        );
        query.append_opt(
            "failover.warnAfterReconnectAttempts",
            self.warn_after_reconnect_attempts,
        );
        query.append_opt("failover.randomize", self.randomize);
        query.append_opt(
            "failover.amqpOpenServerListAction",
            self.server_list_merge_action,
        );

        for (key, value) in self.configuration_options() {
            if key.starts_with(FAILOVER_OPTION_PREFIX) {
                query.append(&key, value);
            }
        }

        query.finish()
    }

    /// Query applied once to the whole URI: every option that is neither a
    /// per-host nor a failover option, e.g. `jms.prefetchPolicy.all`.
    pub fn provider_query(&self) -> String {
        let mut query = Query::default();

        for (key, value) in self.configuration_options() {
            if !is_per_host_option(&key) && !key.starts_with(FAILOVER_OPTION_PREFIX) {
                query.append(&key, value);
            }
        }

        query.finish()
    }
}

fn is_per_host_option(key: &str) -> bool {
    PER_HOST_OPTION_PREFIXES
        .iter()
        .any(|prefix| key.starts_with(prefix))
}

/// `&` separated `key=value` pairs, without the leading `?`.
#[derive(Default)]
struct Query {
    buf: String,
}

impl Query {
    fn append(&mut self, key: &str, value: impl fmt::Display) {
        if !self.buf.is_empty() {
            self.buf.push('&');
        }
        self.buf.push_str(key);
        self.buf.push('=');
        self.buf.push_str(&value.to_string());
    }

    fn append_opt<T: fmt::Display>(&mut self, key: &str, value: Option<T>) {
        if let Some(value) = value {
            self.append(key, value);
        }
    }

    fn finish(self) -> String {
        self.buf
    }
}
