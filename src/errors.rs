// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the Service Bus Adapter
//!
//! This module provides the error type shared by every operation of the crate.
//! Configuration problems, reference (de)serialization failures and errors
//! surfaced by the wrapped AMQP client library all end up in `ServiceBusError`.

use crate::client::ClientResult;
use thiserror::Error;
use tracing::error;

/// Represents errors that can occur while configuring or using the adapter.
///
/// None of these errors are retried by the crate. Retries, when they exist,
/// belong to the failover machinery of the wrapped client library.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceBusError {
    /// A mandatory setting is missing or malformed
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The custom user agent exceeds the allowed length
    #[error("the length of the custom user agent cannot exceed {max}")]
    UserAgentTooLong { max: usize },

    /// A reference was decoded without one of its mandatory properties
    #[error("An instance of {kind} must have a valid value for its '{property}' property.")]
    RequiredProperty { kind: String, property: String },

    /// The object handed to the reference factory is not a `Reference`
    #[error("object is not a reference")]
    NotAReference,

    /// No constructor is registered for the reference class name
    #[error("no storable kind registered for `{0}`")]
    UnknownKind(String),

    /// The decoded instance is not of the requested type
    #[error("reference `{0}` does not decode to the requested type")]
    KindMismatch(String),

    /// Error reported by the wrapped AMQP client library
    #[error("client error: {0}")]
    Client(String),

    /// Error acquiring a token from a credential
    #[error("failure to acquire token: {0}")]
    Credential(String),
}

impl ServiceBusError {
    pub(crate) fn configuration(msg: impl Into<String>) -> Self {
        ServiceBusError::Configuration(msg.into())
    }

    pub(crate) fn client(msg: impl ToString) -> Self {
        ServiceBusError::Client(msg.to_string())
    }
}

/// Logs and converts an error reported by the client library.
pub(crate) fn from_client<T>(result: ClientResult<T>, msg: &str) -> Result<T, ServiceBusError> {
    result.map_err(|err| {
        error!(error = err.to_string(), "{}", msg);
        ServiceBusError::client(err)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_property_message() {
        let err = ServiceBusError::RequiredProperty {
            kind: "servicebus_jms::ServiceBusQueue".to_owned(),
            property: "physicalName".to_owned(),
        };

        assert_eq!(
            err.to_string(),
            "An instance of servicebus_jms::ServiceBusQueue must have a valid value for its 'physicalName' property."
        );
    }

    #[test]
    fn test_user_agent_message() {
        let err = ServiceBusError::UserAgentTooLong { max: 128 };
        assert!(err.to_string().contains("128"));
    }

    #[test]
    fn test_from_client() {
        let ok: ClientResult<u8> = Ok(1);
        assert_eq!(from_client(ok, "unused"), Ok(1));

        let failed: ClientResult<u8> = Err("link detached".into());
        assert_eq!(
            from_client(failed, "failure to attach link"),
            Err(ServiceBusError::Client("link detached".to_owned()))
        );
    }
}
