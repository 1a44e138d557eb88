// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Service Bus Connection Strings
//!
//! Parsing and rendering of the connection strings handed out by the Azure
//! portal, for example:
//!
//! ```text
//! Endpoint=sb://contoso.servicebus.windows.net/;SharedAccessKeyName=RootManageSharedAccessKey;SharedAccessKey=secret
//! ```

use crate::errors::ServiceBusError;
use std::{fmt, str::FromStr};
use url::Url;

const ENDPOINT_KEY: &str = "Endpoint";
const SAS_KEY_NAME_KEY: &str = "SharedAccessKeyName";
const SAS_KEY_KEY: &str = "SharedAccessKey";
const ENTITY_PATH_KEY: &str = "EntityPath";

const ENDPOINT_SCHEME: &str = "sb://";

/// Parsed form of a Service Bus connection string.
///
/// Only the endpoint host is kept from the endpoint, which is all the
/// connection factory needs to build its remote URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStringBuilder {
    host: String,
    sas_key_name: Option<String>,
    sas_key: Option<String>,
    entity_path: Option<String>,
}

impl ConnectionStringBuilder {
    /// Creates a builder for a namespace host and a shared access key pair.
    pub fn new(
        host: impl Into<String>,
        sas_key_name: impl Into<String>,
        sas_key: impl Into<String>,
    ) -> Self {
        ConnectionStringBuilder {
            host: host.into(),
            sas_key_name: Some(sas_key_name.into()),
            sas_key: Some(sas_key.into()),
            entity_path: None,
        }
    }

    /// Sets the entity path (queue or topic name) carried by the string.
    pub fn entity_path(mut self, path: impl Into<String>) -> Self {
        self.entity_path = Some(path.into());
        self
    }

    /// Parses a connection string.
    ///
    /// Keys are matched case-insensitively and unknown keys are ignored.
    /// The `Endpoint` key is mandatory.
    pub fn parse(connection_string: &str) -> Result<Self, ServiceBusError> {
        let mut host = None;
        let mut sas_key_name = None;
        let mut sas_key = None;
        let mut entity_path = None;

        for part in connection_string.split(';').map(str::trim) {
            if part.is_empty() {
                continue;
            }

            let Some((key, value)) = part.split_once('=') else {
                return Err(ServiceBusError::configuration(format!(
                    "malformed connection string segment `{}`",
                    part
                )));
            };

            let value = value.trim().to_owned();
            match key.trim() {
                k if k.eq_ignore_ascii_case(ENDPOINT_KEY) => host = Some(endpoint_host(&value)?),
                k if k.eq_ignore_ascii_case(SAS_KEY_NAME_KEY) => sas_key_name = Some(value),
                k if k.eq_ignore_ascii_case(SAS_KEY_KEY) => sas_key = Some(value),
                k if k.eq_ignore_ascii_case(ENTITY_PATH_KEY) => entity_path = Some(value),
                _ => {}
            }
        }

        let host = host.ok_or_else(|| {
            ServiceBusError::configuration("connection string does not contain an Endpoint")
        })?;

        Ok(ConnectionStringBuilder {
            host,
            sas_key_name,
            sas_key,
            entity_path,
        })
    }

    /// Host name of the namespace endpoint.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Name of the shared access policy.
    pub fn sas_key_name(&self) -> Option<&str> {
        self.sas_key_name.as_deref()
    }

    /// Key of the shared access policy.
    pub fn sas_key(&self) -> Option<&str> {
        self.sas_key.as_deref()
    }

    /// Queue or topic the string is scoped to, if any.
    pub fn get_entity_path(&self) -> Option<&str> {
        self.entity_path.as_deref()
    }
}

impl FromStr for ConnectionStringBuilder {
    type Err = ServiceBusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConnectionStringBuilder::parse(s)
    }
}

impl fmt::Display for ConnectionStringBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}{}/", ENDPOINT_KEY, ENDPOINT_SCHEME, self.host)?;

        if let Some(name) = &self.sas_key_name {
            write!(f, ";{}={}", SAS_KEY_NAME_KEY, name)?;
        }

        if let Some(key) = &self.sas_key {
            write!(f, ";{}={}", SAS_KEY_KEY, key)?;
        }

        if let Some(path) = &self.entity_path {
            write!(f, ";{}={}", ENTITY_PATH_KEY, path)?;
        }

        Ok(())
    }
}

/// Extracts the host from an endpoint such as `sb://contoso.servicebus.windows.net/`.
fn endpoint_host(endpoint: &str) -> Result<String, ServiceBusError> {
    let url = Url::parse(endpoint).map_err(|err| {
        ServiceBusError::configuration(format!("invalid endpoint `{}`: {}", endpoint, err))
    })?;

    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(host.to_owned()),
        _ => Err(ServiceBusError::configuration(format!(
            "endpoint `{}` has no host",
            endpoint
        ))),
    }
}
