//! Alpaca WebSocket Message Types
//!
//! Wire format types for the control frames every stream exchanges and for
//! everything the client sends. Market data payloads live in the domain layer
//! ([`crate::domain::streaming`]) because listeners consume them directly.
//!
//! # Message Types
//!
//! ## Control Messages (market data streams)
//! - `{"T":"success","msg":"connected"}`: socket accepted
//! - `{"T":"success","msg":"authenticated"}`: handshake complete
//! - `{"T":"error","code":402,"msg":"auth failed"}`: server error
//! - `{"T":"subscription",...}`: subscription acknowledgment
//!
//! ## Control Messages (trade updates stream)
//! - `{"stream":"authorization","data":{...}}`: handshake result
//! - `{"stream":"listening","data":{"streams":[...]}}`: listen acknowledgment
//!
//! # References
//!
//! - [Stock Streaming](https://docs.alpaca.markets/docs/real-time-stock-pricing-data)
//! - [Crypto Streaming](https://docs.alpaca.markets/docs/real-time-crypto-pricing-data)
//! - [Trade Updates](https://docs.alpaca.markets/docs/websocket-streaming)

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::streaming::TradeUpdate;
use crate::domain::subscription::{ChannelKind, SubscriptionAction, SubscriptionChange};

// =============================================================================
// Control Messages (market data streams)
// =============================================================================

/// Error message with code and description.
///
/// # Wire Format (JSON)
/// ```json
/// {"T": "error", "code": 401, "msg": "not authenticated"}
/// ```
///
/// # Error Codes
/// - 400: Invalid syntax
/// - 401: Not authenticated
/// - 402: Auth failed
/// - 403: Already authenticated
/// - 404: Auth timeout
/// - 405: Symbol limit exceeded
/// - 406: Connection limit exceeded
/// - 407: Slow client
/// - 409: Insufficient subscription
/// - 500: Internal error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    /// Error code
    #[serde(default)]
    pub code: i32,

    /// Error message
    #[serde(default)]
    pub msg: String,
}

impl ErrorMessage {
    /// Check if the code rejects the credentials (401, 402, 403).
    #[must_use]
    pub const fn is_auth_error(&self) -> bool {
        matches!(self.code, 401..=403)
    }
}

/// Control frames the connection handles itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    /// `{"T":"success","msg":"connected"}`
    Connected,
    /// `{"T":"success","msg":"authenticated"}`
    Authenticated,
    /// `{"T":"error",...}`
    Error(ErrorMessage),
}

impl ControlMessage {
    /// Recognize a control frame. Anything else is left to the adapter.
    #[must_use]
    pub fn parse(value: &Value) -> Option<Self> {
        match value.get("T").and_then(Value::as_str)? {
            "success" => match value.get("msg").and_then(Value::as_str)? {
                "connected" => Some(Self::Connected),
                "authenticated" => Some(Self::Authenticated),
                _ => None,
            },
            "error" => Some(Self::Error(ErrorMessage {
                code: value
                    .get("code")
                    .and_then(Value::as_i64)
                    .and_then(|code| i32::try_from(code).ok())
                    .unwrap_or_default(),
                msg: value
                    .get("msg")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            })),
            _ => None,
        }
    }
}

/// Subscription acknowledgment listing every active subscription.
///
/// # Wire Format (JSON)
/// ```json
/// {"T": "subscription", "trades": ["AAPL"], "quotes": ["AMD", "CLDR"], "bars": ["*"]}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionMessage {
    /// Subscribed trade symbols
    #[serde(default)]
    pub trades: Vec<String>,

    /// Subscribed quote symbols
    #[serde(default)]
    pub quotes: Vec<String>,

    /// Subscribed bar symbols
    #[serde(default)]
    pub bars: Vec<String>,
}

// =============================================================================
// Control Messages (trade updates stream)
// =============================================================================

/// Authorization response from the trade updates stream.
///
/// # Wire Format (JSON)
/// ```json
/// {"stream": "authorization", "data": {"status": "authorized", "action": "authenticate"}}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationData {
    /// Status: "authorized" or "unauthorized"
    #[serde(default)]
    pub status: String,

    /// Action: "authenticate"
    #[serde(default)]
    pub action: String,
}

impl AuthorizationData {
    /// Check if the handshake was accepted.
    #[must_use]
    pub fn is_authorized(&self) -> bool {
        self.status == "authorized" && self.action == "authenticate"
    }

    /// Check if the credentials were rejected.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.status == "unauthorized"
    }
}

/// Listening confirmation data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListeningData {
    /// Active streams
    #[serde(default)]
    pub streams: Vec<String>,
}

/// Frames received on the trade updates stream, keyed by `stream`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "stream", content = "data", rename_all = "snake_case")]
pub enum TradingMessage {
    /// Handshake result
    Authorization(AuthorizationData),
    /// Listen acknowledgment
    Listening(ListeningData),
    /// Order event
    TradeUpdates(Box<TradeUpdate>),
}

// =============================================================================
// Outbound Messages (Client -> Server)
// =============================================================================

/// Authentication request for market data streams.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthRequest {
    /// Action: "auth"
    pub action: &'static str,

    /// API key
    pub key: String,

    /// API secret
    pub secret: String,
}

impl AuthRequest {
    /// Create a new authentication request.
    #[must_use]
    pub const fn new(key: String, secret: String) -> Self {
        Self {
            action: "auth",
            key,
            secret,
        }
    }
}

/// Authentication request for the trade updates stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TradeAuthRequest {
    /// Action: "authenticate"
    pub action: &'static str,

    /// Authentication data
    pub data: TradeAuthData,
}

/// Authentication data for the trade updates stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TradeAuthData {
    /// API key
    pub key_id: String,

    /// API secret
    pub secret_key: String,
}

impl TradeAuthRequest {
    /// Create a new trade authentication request.
    #[must_use]
    pub const fn new(key: String, secret: String) -> Self {
        Self {
            action: "authenticate",
            data: TradeAuthData {
                key_id: key,
                secret_key: secret,
            },
        }
    }
}

/// Subscribe or unsubscribe request for market data streams.
///
/// Empty channel lists are left out of the frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SubscriptionRequest {
    /// Action: "subscribe" or "unsubscribe"
    pub action: String,

    /// Trade symbols
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub trades: Vec<String>,

    /// Quote symbols
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub quotes: Vec<String>,

    /// Bar symbols
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub bars: Vec<String>,
}

impl From<&SubscriptionChange> for SubscriptionRequest {
    fn from(change: &SubscriptionChange) -> Self {
        let symbols = change.symbols.clone();
        let mut request = Self {
            action: match change.action {
                SubscriptionAction::Subscribe => "subscribe",
                SubscriptionAction::Unsubscribe => "unsubscribe",
            }
            .to_string(),
            ..Self::default()
        };
        match change.kind {
            ChannelKind::Trades => request.trades = symbols,
            ChannelKind::Quotes => request.quotes = symbols,
            ChannelKind::Bars => request.bars = symbols,
        }
        request
    }
}

/// Listen request for the trade updates stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListenRequest {
    /// Action: "listen"
    pub action: &'static str,

    /// Listen data
    pub data: ListenData,
}

/// Listen data for the trade updates stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListenData {
    /// Streams to listen to
    pub streams: Vec<String>,
}

impl ListenRequest {
    /// Start listening to trade updates.
    #[must_use]
    pub fn trade_updates() -> Self {
        Self {
            action: "listen",
            data: ListenData {
                streams: vec!["trade_updates".to_string()],
            },
        }
    }

    /// Stop listening to every stream.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            action: "listen",
            data: ListenData {
                streams: Vec::new(),
            },
        }
    }
}

/// Everything the client sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum OutboundMessage {
    /// Market data handshake
    Auth(AuthRequest),
    /// Trade updates handshake
    TradeAuth(TradeAuthRequest),
    /// Market data subscribe/unsubscribe
    Subscription(SubscriptionRequest),
    /// Trade updates listen
    Listen(ListenRequest),
}

impl OutboundMessage {
    /// Action name, for logs.
    #[must_use]
    pub fn action(&self) -> &str {
        match self {
            Self::Auth(m) => m.action,
            Self::TradeAuth(m) => m.action,
            Self::Subscription(m) => &m.action,
            Self::Listen(m) => m.action,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::domain::subscription::SubscriptionLedger;
    use crate::domain::streaming::OrderEventType;

    #[test]
    fn parse_success_frames() {
        assert_eq!(
            ControlMessage::parse(&json!({"T": "success", "msg": "connected"})),
            Some(ControlMessage::Connected)
        );
        assert_eq!(
            ControlMessage::parse(&json!({"T": "success", "msg": "authenticated"})),
            Some(ControlMessage::Authenticated)
        );
        assert_eq!(
            ControlMessage::parse(&json!({"T": "success", "msg": "something else"})),
            None
        );
    }

    #[test]
    fn parse_error_frame() {
        let control =
            ControlMessage::parse(&json!({"T": "error", "code": 402, "msg": "auth failed"}));
        let Some(ControlMessage::Error(err)) = control else {
            panic!("expected error frame, got {control:?}");
        };
        assert_eq!(err.code, 402);
        assert_eq!(err.msg, "auth failed");
        assert!(err.is_auth_error());
    }

    #[test]
    fn auth_error_codes() {
        for code in [401, 402, 403] {
            assert!(ErrorMessage { code, msg: String::new() }.is_auth_error());
        }
        for code in [400, 404, 405, 406, 500] {
            assert!(!ErrorMessage { code, msg: String::new() }.is_auth_error());
        }
    }

    #[test]
    fn data_frames_are_not_control() {
        assert_eq!(ControlMessage::parse(&json!({"T": "t", "S": "AAPL", "p": 1})), None);
        assert_eq!(ControlMessage::parse(&json!({"stream": "listening"})), None);
    }

    #[test]
    fn serialize_auth_requests() {
        let json = serde_json::to_value(OutboundMessage::Auth(AuthRequest::new(
            "key".to_string(),
            "secret".to_string(),
        )))
        .unwrap();
        assert_eq!(json, json!({"action": "auth", "key": "key", "secret": "secret"}));

        let json = serde_json::to_value(OutboundMessage::TradeAuth(TradeAuthRequest::new(
            "key".to_string(),
            "secret".to_string(),
        )))
        .unwrap();
        assert_eq!(
            json,
            json!({"action": "authenticate", "data": {"key_id": "key", "secret_key": "secret"}})
        );
    }

    #[test]
    fn subscription_request_omits_empty_channels() {
        let mut ledger = SubscriptionLedger::new();
        let change = ledger.subscribe(ChannelKind::Quotes, ["AAPL", "MSFT"]).unwrap();

        let json = serde_json::to_value(SubscriptionRequest::from(&change)).unwrap();

        assert_eq!(json, json!({"action": "subscribe", "quotes": ["AAPL", "MSFT"]}));
    }

    #[test]
    fn serialize_listen_requests() {
        assert_eq!(
            serde_json::to_value(ListenRequest::trade_updates()).unwrap(),
            json!({"action": "listen", "data": {"streams": ["trade_updates"]}})
        );
        assert_eq!(
            serde_json::to_value(ListenRequest::none()).unwrap(),
            json!({"action": "listen", "data": {"streams": []}})
        );
    }

    #[test]
    fn parse_trading_messages() {
        let msg: TradingMessage = serde_json::from_value(json!({
            "stream": "authorization",
            "data": {"status": "authorized", "action": "authenticate"}
        }))
        .unwrap();
        assert!(matches!(msg, TradingMessage::Authorization(ref d) if d.is_authorized()));

        let msg: TradingMessage = serde_json::from_value(json!({
            "stream": "listening",
            "data": {"streams": ["trade_updates"]}
        }))
        .unwrap();
        assert_eq!(
            msg,
            TradingMessage::Listening(ListeningData {
                streams: vec!["trade_updates".to_string()]
            })
        );

        let msg: TradingMessage = serde_json::from_value(json!({
            "stream": "trade_updates",
            "data": {
                "event": "new",
                "order": {"id": "o-1", "symbol": "AAPL", "side": "sell"}
            }
        }))
        .unwrap();
        let TradingMessage::TradeUpdates(update) = msg else {
            panic!("expected trade update");
        };
        assert_eq!(update.event, OrderEventType::New);
        assert_eq!(update.order.symbol, "AAPL");
    }

    #[test]
    fn unauthorized_status() {
        let data = AuthorizationData {
            status: "unauthorized".to_string(),
            action: "authenticate".to_string(),
        };
        assert!(data.is_unauthorized());
        assert!(!data.is_authorized());
    }
}
