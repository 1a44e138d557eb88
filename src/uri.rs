// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Remote Connection URI
//!
//! Builds the connection string consumed by the wrapped AMQP client library.
//! Two shapes are produced:
//!
//! ```text
//! amqps://<host>[?<per-host>][(?|&)<provider>]
//! failover:(amqps://<host>[?<per-host>]{,amqps://<h>[?<per-host>]})[?<failover>][(&|?)<provider>]
//! ```

use crate::settings::ConnectionFactorySettings;

const AMQPS_SCHEME: &str = "amqps://";
const FAILOVER_SCHEME: &str = "failover:";

/// Builds the remote URI for `host` from `settings`.
///
/// The result only depends on its inputs, two calls with identical settings
/// return identical strings.
pub fn build_remote_connection_uri(host: &str, settings: &ConnectionFactorySettings) -> String {
    let per_host_query = settings.per_host_amqp_query();
    let provider_query = settings.provider_query();
    let primary = host_uri(host, &per_host_query);

    if !settings.should_reconnect() {
        if provider_query.is_empty() {
            return primary;
        }

        let separator = if per_host_query.is_empty() { '?' } else { '&' };
        return format!("{}{}{}", primary, separator, provider_query);
    }

    let mut uri = failover_uri(&primary, &per_host_query, settings);

    let failover_query = settings.failover_query();
    if !failover_query.is_empty() {
        uri.push('?');
        uri.push_str(&failover_query);
    }

    if !provider_query.is_empty() {
        uri.push(if failover_query.is_empty() { '?' } else { '&' });
        uri.push_str(&provider_query);
    }

    uri
}

fn host_uri(host: &str, per_host_query: &str) -> String {
    if per_host_query.is_empty() {
        format!("{}{}", AMQPS_SCHEME, host)
    } else {
        format!("{}{}?{}", AMQPS_SCHEME, host, per_host_query)
    }
}

/// `failover:(<primary>,<reconnect host>...)`, every host carrying the same
/// per-host query.
fn failover_uri(
    primary: &str,
    per_host_query: &str,
    settings: &ConnectionFactorySettings,
) -> String {
    let mut uri = String::from(FAILOVER_SCHEME);
    uri.push('(');
    uri.push_str(primary);

    for host in settings.reconnect_hosts().unwrap_or_default() {
        uri.push(',');
        uri.push_str(&host_uri(host, per_host_query));
    }

    uri.push(')');
    uri
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    const HOST: &str = "foo.servicebus.windows.net";

    fn prefetch(value: &str) -> ConnectionFactorySettings {
        let mut options = BTreeMap::new();
        options.insert("jms.prefetchPolicy.all".to_owned(), value.to_owned());
        ConnectionFactorySettings::with_options(options)
    }

    #[test]
    fn test_single_host_default_settings() {
        let uri = build_remote_connection_uri(HOST, &ConnectionFactorySettings::new());
        assert_eq!(
            uri,
            "failover:(amqps://foo.servicebus.windows.net)?jms.prefetchPolicy.all=0"
        );
    }

    #[test]
    fn test_single_host_with_prefetch() {
        let uri = build_remote_connection_uri(HOST, &prefetch("20"));
        assert_eq!(
            uri,
            "failover:(amqps://foo.servicebus.windows.net)?jms.prefetchPolicy.all=20"
        );
    }

    #[test]
    fn test_single_host_without_reconnect() {
        let settings = ConnectionFactorySettings::new().with_should_reconnect(false);
        assert_eq!(
            build_remote_connection_uri(HOST, &settings),
            "amqps://foo.servicebus.windows.net?jms.prefetchPolicy.all=0"
        );

        let settings = prefetch("20").with_should_reconnect(false);
        assert_eq!(
            build_remote_connection_uri(HOST, &settings),
            "amqps://foo.servicebus.windows.net?jms.prefetchPolicy.all=20"
        );
    }

    #[test]
    fn test_single_host_with_idle_timeout() {
        let settings = ConnectionFactorySettings::new().with_connection_idle_timeout_ms(20000);
        assert_eq!(
            build_remote_connection_uri(HOST, &settings),
            "failover:(amqps://foo.servicebus.windows.net?amqp.idleTimeout=20000)?jms.prefetchPolicy.all=0"
        );

        let settings = settings.with_should_reconnect(false);
        assert_eq!(
            build_remote_connection_uri(HOST, &settings),
            "amqps://foo.servicebus.windows.net?amqp.idleTimeout=20000&jms.prefetchPolicy.all=0"
        );
    }

    #[test]
    fn test_single_host_with_failover_options() {
        let settings = ConnectionFactorySettings::new()
            .with_connection_idle_timeout_ms(20000)
            .with_max_reconnect_attempts(3);

        assert_eq!(
            build_remote_connection_uri(HOST, &settings),
            "failover:(amqps://foo.servicebus.windows.net?amqp.idleTimeout=20000)?failover.maxReconnectAttempts=3&jms.prefetchPolicy.all=0"
        );
    }

    #[test]
    fn test_multiple_hosts_with_failover_options() {
        let settings = ConnectionFactorySettings::new()
            .with_max_reconnect_attempts(3)
            .with_connection_idle_timeout_ms(20000)
            .with_reconnect_hosts(["bar.servicebus.windows.net"]);

        assert_eq!(
            build_remote_connection_uri(HOST, &settings),
            "failover:(amqps://foo.servicebus.windows.net?amqp.idleTimeout=20000,amqps://bar.servicebus.windows.net?amqp.idleTimeout=20000)?failover.maxReconnectAttempts=3&jms.prefetchPolicy.all=0"
        );
    }

    #[test]
    fn test_multiple_hosts_with_prefetch_only() {
        let settings = prefetch("20").with_reconnect_hosts(["bar.servicebus.windows.net"]);

        assert_eq!(
            build_remote_connection_uri(HOST, &settings),
            "failover:(amqps://foo.servicebus.windows.net,amqps://bar.servicebus.windows.net)?jms.prefetchPolicy.all=20"
        );
    }

    #[test]
    fn test_reconnect_disabled_ignores_failover_settings() {
        let settings = prefetch("20")
            .with_should_reconnect(false)
            .with_connection_idle_timeout_ms(20000)
            .with_max_reconnect_attempts(3)
            .with_reconnect_hosts(["bar.servicebus.windows.net"]);

        assert_eq!(
            build_remote_connection_uri(HOST, &settings),
            "amqps://foo.servicebus.windows.net?amqp.idleTimeout=20000&jms.prefetchPolicy.all=20"
        );
    }

    #[test]
    fn test_empty_reconnect_hosts_keep_failover_grammar() {
        let settings = ConnectionFactorySettings::new().with_reconnect_hosts(Vec::<String>::new());

        assert_eq!(
            build_remote_connection_uri(HOST, &settings),
            "failover:(amqps://foo.servicebus.windows.net)?jms.prefetchPolicy.all=0"
        );
    }

    #[test]
    fn test_failover_only_query() {
        let settings = prefetch("20")
            .with_option("failover.nested.amqp.vhost", "bar")
            .with_randomize(true);

        assert_eq!(
            build_remote_connection_uri(HOST, &settings),
            "failover:(amqps://foo.servicebus.windows.net)?failover.randomize=true&failover.nested.amqp.vhost=bar&jms.prefetchPolicy.all=20"
        );
    }

    #[test]
    fn test_build_is_deterministic() {
        let settings = ConnectionFactorySettings::new()
            .with_connection_idle_timeout_ms(30000)
            .with_trace_frames(true)
            .with_reconnect_hosts(["a.servicebus.windows.net", "b.servicebus.windows.net"])
            .with_reconnect_back_off_multiplier(2.0)
            .with_option("jms.clientIDPrefix", "app")
            .with_option("amqp.vhost", "foo");

        let first = build_remote_connection_uri(HOST, &settings);
        let second = build_remote_connection_uri(HOST, &settings.clone());

        assert_eq!(first, second);
        assert!(first.contains("failover.reconnectBackOffMultiplier=2.0"));
    }
}
