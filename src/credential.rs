// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Credentials
//!
//! A connection factory authenticates either with a shared access key pair or
//! with a bearer token obtained from a [`TokenCredential`]. Tokens are cached
//! and only regenerated once expired.

use crate::errors::ServiceBusError;
use async_trait::async_trait;
use std::{fmt, sync::Arc, time::SystemTime};
use tokio::sync::Mutex;
use tracing::{debug, error};

/// Scope requested for Service Bus tokens
pub const SERVICE_BUS_AUDIENCE: &str = "https://servicebus.azure.net/.default";

/// User name announced when authenticating with a token
pub const TOKEN_USERNAME: &str = "$jwt";

/// A bearer token and the instant it stops being valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expires_on: SystemTime,
}

impl AccessToken {
    /// Creates a token valid until `expires_on`.
    pub fn new(token: impl Into<String>, expires_on: SystemTime) -> Self {
        AccessToken {
            token: token.into(),
            expires_on,
        }
    }

    /// Whether the token can no longer be presented.
    pub fn is_expired(&self) -> bool {
        SystemTime::now() >= self.expires_on
    }
}

/// Source of bearer tokens, e.g. a managed identity or a client secret.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenCredential: Send + Sync {
    async fn get_token(&self, scopes: &[String]) -> Result<AccessToken, ServiceBusError>;
}

/// Identity presented by a connection factory.
#[derive(Clone)]
pub enum Credentials {
    SharedAccessKey { key_name: String, key: String },
    Token(Arc<TokenCache>),
}

impl Credentials {
    /// Authenticates with a shared access policy name and key.
    pub fn shared_access_key(key_name: impl Into<String>, key: impl Into<String>) -> Self {
        Credentials::SharedAccessKey {
            key_name: key_name.into(),
            key: key.into(),
        }
    }

    /// Authenticates with tokens from `credential`, cached until they expire.
    pub fn token(credential: Arc<dyn TokenCredential>) -> Self {
        Credentials::Token(Arc::new(TokenCache::new(credential)))
    }

    pub(crate) fn username(&self) -> &str {
        match self {
            Credentials::SharedAccessKey { key_name, .. } => key_name,
            Credentials::Token(_) => TOKEN_USERNAME,
        }
    }

    /// Key, or a token that is valid at the time of the call.
    pub(crate) async fn password(&self) -> Result<String, ServiceBusError> {
        match self {
            Credentials::SharedAccessKey { key, .. } => Ok(key.clone()),
            Credentials::Token(cache) => cache.token().await,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::SharedAccessKey { key_name, .. } => f
                .debug_struct("SharedAccessKey")
                .field("key_name", key_name)
                .finish_non_exhaustive(),
            Credentials::Token(_) => f.write_str("Token"),
        }
    }
}

/// Caches the last token of a credential.
///
/// Concurrent callers that find the token expired are serialized on the
/// mutex: the first one regenerates, the others observe its result.
pub struct TokenCache {
    credential: Arc<dyn TokenCredential>,
    cached: Mutex<Option<AccessToken>>,
}

impl TokenCache {
    /// Creates an empty cache over `credential`.
    pub fn new(credential: Arc<dyn TokenCredential>) -> Self {
        TokenCache {
            credential,
            cached: Mutex::new(None),
        }
    }

    /// Returns the cached token, requesting a new one when none is cached or
    /// the cached one expired.
    ///
    /// # Returns
    /// The raw token, or the error of the credential
    pub async fn token(&self) -> Result<String, ServiceBusError> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref().filter(|t| !t.is_expired()) {
            return Ok(token.token.clone());
        }

        debug!("acquiring a new service bus token...");
        let fresh = match self
            .credential
            .get_token(&[SERVICE_BUS_AUDIENCE.to_owned()])
            .await
        {
            Ok(t) => t,
            Err(err) => {
                error!(error = err.to_string(), "failure to acquire token");
                return Err(err);
            }
        };
        debug!("token acquired");

        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn valid_for(token: &str, secs: u64) -> AccessToken {
        AccessToken::new(token, SystemTime::now() + Duration::from_secs(secs))
    }

    #[tokio::test]
    async fn test_token_is_cached_until_expired() {
        let mut credential = MockTokenCredential::new();
        credential
            .expect_get_token()
            .withf(|scopes| scopes.len() == 1 && scopes[0] == SERVICE_BUS_AUDIENCE)
            .times(1)
            .returning(|_| Ok(valid_for("first", 3600)));

        let cache = TokenCache::new(Arc::new(credential));

        assert_eq!(cache.token().await.unwrap(), "first");
        assert_eq!(cache.token().await.unwrap(), "first");
    }

    #[tokio::test]
    async fn test_expired_token_is_regenerated() {
        let mut credential = MockTokenCredential::new();
        let mut seq = mockall::Sequence::new();
        credential
            .expect_get_token()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(AccessToken::new("stale", SystemTime::UNIX_EPOCH)));
        credential
            .expect_get_token()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(valid_for("fresh", 3600)));

        let cache = TokenCache::new(Arc::new(credential));

        assert_eq!(cache.token().await.unwrap(), "stale");
        assert_eq!(cache.token().await.unwrap(), "fresh");
        assert_eq!(cache.token().await.unwrap(), "fresh");
    }

    #[tokio::test]
    async fn test_concurrent_callers_regenerate_once() {
        let mut credential = MockTokenCredential::new();
        credential
            .expect_get_token()
            .times(1)
            .returning(|_| Ok(valid_for("shared", 3600)));

        let cache = Arc::new(TokenCache::new(Arc::new(credential)));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.token().await })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "shared");
        }
    }

    #[tokio::test]
    async fn test_credential_failure_is_propagated() {
        let mut credential = MockTokenCredential::new();
        credential
            .expect_get_token()
            .returning(|_| Err(ServiceBusError::Credential("denied".to_owned())));

        let credentials = Credentials::token(Arc::new(credential));

        assert_eq!(credentials.username(), TOKEN_USERNAME);
        assert_eq!(
            credentials.password().await,
            Err(ServiceBusError::Credential("denied".to_owned()))
        );
    }
}
