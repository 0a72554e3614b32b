//! Alpaca WebSocket Authentication
//!
//! Credentials and the handshake frames built from them.
//!
//! # Authentication Flow
//!
//! ## Market Data Streams (stocks, crypto)
//! 1. Connect to WebSocket endpoint
//! 2. Receive `{"T":"success","msg":"connected"}` from server
//! 3. Send `{"action":"auth","key":"...","secret":"..."}`
//! 4. Receive `{"T":"success","msg":"authenticated"}` or error
//!
//! ## Trade Updates Stream
//! 1. Connect to WebSocket endpoint
//! 2. Send `{"action":"authenticate","data":{"key_id":"...","secret_key":"..."}}`
//! 3. Receive `{"stream":"authorization","data":{"status":"authorized",...}}`
//!
//! # Error Codes
//!
//! 401 (not authenticated), 402 (auth failed) and 403 (already
//! authenticated) reject the handshake. Other codes, including 404 (auth
//! timeout), are ordinary server errors and do not stop reconnection.
//!
//! # References
//!
//! - [Stock Streaming Auth](https://docs.alpaca.markets/docs/streaming-market-data)
//! - [Trade Updates Auth](https://docs.alpaca.markets/docs/websocket-streaming)

use thiserror::Error;

use super::messages::{AuthRequest, OutboundMessage, TradeAuthRequest};

/// Errors building credentials.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// API key is empty.
    #[error("API key cannot be empty")]
    EmptyKey,

    /// API secret is empty.
    #[error("API secret cannot be empty")]
    EmptySecret,
}

/// Alpaca API credentials.
///
/// `Debug` and `Display` never print the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    key: String,
    secret: String,
}

impl Credentials {
    /// Create new credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if either key or secret is empty.
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Result<Self, AuthError> {
        let key = key.into();
        let secret = secret.into();

        if key.trim().is_empty() {
            return Err(AuthError::EmptyKey);
        }
        if secret.trim().is_empty() {
            return Err(AuthError::EmptySecret);
        }

        Ok(Self { key, secret })
    }

    /// Get the API key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Get the API secret.
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Handshake frame for market data streams.
    #[must_use]
    pub fn market_data_auth(&self) -> OutboundMessage {
        OutboundMessage::Auth(AuthRequest::new(self.key.clone(), self.secret.clone()))
    }

    /// Handshake frame for the trade updates stream.
    #[must_use]
    pub fn trade_updates_auth(&self) -> OutboundMessage {
        OutboundMessage::TradeAuth(TradeAuthRequest::new(
            self.key.clone(),
            self.secret.clone(),
        ))
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("key", &self.key)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl std::fmt::Display for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Credentials(key={})", self.key)
    }
}
