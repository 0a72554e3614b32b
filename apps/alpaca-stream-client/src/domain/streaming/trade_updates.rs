//! Order lifecycle records delivered by the trade updates stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Order event types from the trade updates stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderEventType {
    /// Order routed to the exchange
    New,
    /// Order completely filled
    Fill,
    /// Order partially filled
    PartialFill,
    /// Order canceled
    Canceled,
    /// Order expired
    Expired,
    /// Order done for the day
    DoneForDay,
    /// Order replaced by another order
    Replaced,
    /// Order rejected
    Rejected,
    /// Order received but not yet routed
    PendingNew,
    /// Order stopped
    Stopped,
    /// Cancel requested, awaiting confirmation
    PendingCancel,
    /// Replace requested, awaiting confirmation
    PendingReplace,
    /// Order completed for the day, settlement pending
    Calculated,
    /// Order suspended
    Suspended,
    /// Replace request rejected
    OrderReplaceRejected,
    /// Cancel request rejected
    OrderCancelRejected,
    /// Earlier execution was busted
    TradeBust,
    /// Earlier execution was corrected
    TradeCorrect,
    /// Order held by the broker
    Held,
    /// Event type this client does not know yet
    #[serde(other)]
    Unknown,
}

impl OrderEventType {
    /// Check if the event reports an execution.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Fill | Self::PartialFill)
    }

    /// Check if the order can no longer change after this event.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Fill | Self::Canceled | Self::Expired | Self::Replaced | Self::Rejected
        )
    }
}

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    /// Buy order
    Buy,
    /// Sell order
    Sell,
}

/// Order snapshot carried by a trade update.
///
/// Quantities and prices stay strings, as Alpaca sends them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Order ID
    pub id: String,

    /// Client-provided order ID
    #[serde(default)]
    pub client_order_id: String,

    /// Creation timestamp
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,

    /// Last update timestamp
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,

    /// Fully filled at
    #[serde(default)]
    pub filled_at: Option<DateTime<Utc>>,

    /// Canceled at
    #[serde(default)]
    pub canceled_at: Option<DateTime<Utc>>,

    /// Symbol
    pub symbol: String,

    /// Asset class (`us_equity`, `us_option`, `crypto`)
    #[serde(default)]
    pub asset_class: Option<String>,

    /// Order quantity (absent for notional orders)
    #[serde(default)]
    pub qty: Option<String>,

    /// Notional value for fractional orders
    #[serde(default)]
    pub notional: Option<String>,

    /// Filled quantity
    #[serde(default)]
    pub filled_qty: Option<String>,

    /// Average fill price
    #[serde(default)]
    pub filled_avg_price: Option<String>,

    /// Order class (empty string for simple orders)
    #[serde(default)]
    pub order_class: Option<String>,

    /// Order type (`market`, `limit`, `stop`, `stop_limit`, `trailing_stop`)
    #[serde(rename = "type", default)]
    pub order_type: Option<String>,

    /// Order side
    pub side: OrderSide,

    /// Time in force
    #[serde(default)]
    pub time_in_force: Option<String>,

    /// Limit price
    #[serde(default)]
    pub limit_price: Option<String>,

    /// Stop price
    #[serde(default)]
    pub stop_price: Option<String>,

    /// Current order status
    #[serde(default)]
    pub status: String,

    /// Extended hours eligibility
    #[serde(default)]
    pub extended_hours: bool,
}

/// One event from the `trade_updates` stream.
///
/// # Wire Format (JSON)
/// ```json
/// {
///   "stream": "trade_updates",
///   "data": {
///     "event": "fill",
///     "order": { ... },
///     "timestamp": "2021-09-17T22:19:33Z",
///     "price": "150.50",
///     "qty": "10",
///     "position_qty": "10"
///   }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeUpdate {
    /// What happened to the order
    pub event: OrderEventType,

    /// Order state after the event
    pub order: Order,

    /// Event timestamp
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,

    /// Position quantity after a fill
    #[serde(default)]
    pub position_qty: Option<String>,

    /// Fill price (fill events)
    #[serde(default)]
    pub price: Option<String>,

    /// Fill quantity (fill events)
    #[serde(default)]
    pub qty: Option<String>,

    /// Execution ID (fill events)
    #[serde(default)]
    pub execution_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_fill_update() {
        let json = r#"{
            "event": "fill",
            "execution_id": "exec-1",
            "price": "179.08",
            "qty": "1",
            "position_qty": "1",
            "timestamp": "2024-01-15T15:30:00.123Z",
            "order": {
                "id": "61e69015-8549-4bfd-b9c3-01e75843f47d",
                "client_order_id": "eb9e2aaa-f71a-4f51-b5b4-52a6c565dad4",
                "created_at": "2024-01-15T15:29:59.000Z",
                "updated_at": "2024-01-15T15:30:00.123Z",
                "symbol": "AAPL",
                "asset_class": "us_equity",
                "qty": "1",
                "filled_qty": "1",
                "filled_avg_price": "179.08",
                "order_class": "",
                "type": "market",
                "side": "buy",
                "time_in_force": "day",
                "status": "filled",
                "extended_hours": false
            }
        }"#;
        let update: TradeUpdate = serde_json::from_str(json).unwrap();
        assert_eq!(update.event, OrderEventType::Fill);
        assert!(update.event.is_execution());
        assert!(update.event.is_terminal());
        assert_eq!(update.order.side, OrderSide::Buy);
        assert_eq!(update.order.order_class.as_deref(), Some(""));
        assert_eq!(update.price.as_deref(), Some("179.08"));
    }

    #[test]
    fn unrecognized_event_still_parses() {
        let json = r#"{
            "event": "margin_call_liquidation",
            "timestamp": "2024-01-15T15:30:00.123Z",
            "order": {
                "id": "61e69015-8549-4bfd-b9c3-01e75843f47d",
                "client_order_id": "eb9e2aaa-f71a-4f51-b5b4-52a6c565dad4",
                "created_at": "2024-01-15T15:29:59.000Z",
                "updated_at": "2024-01-15T15:30:00.123Z",
                "symbol": "TSLA",
                "asset_class": "us_equity",
                "qty": "3",
                "filled_qty": "0",
                "type": "limit",
                "side": "sell",
                "time_in_force": "gtc",
                "status": "new",
                "extended_hours": false
            }
        }"#;
        let update: TradeUpdate = serde_json::from_str(json).unwrap();
        assert_eq!(update.event, OrderEventType::Unknown);
        assert!(!update.event.is_execution());
        assert!(!update.event.is_terminal());
        assert_eq!(update.order.symbol, "TSLA");
    }

    #[test]
    fn pending_new_is_not_terminal() {
        assert!(!OrderEventType::PendingNew.is_terminal());
        assert!(!OrderEventType::PartialFill.is_terminal());
        assert!(OrderEventType::PartialFill.is_execution());
    }
}
