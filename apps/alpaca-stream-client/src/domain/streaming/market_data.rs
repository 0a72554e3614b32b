//! Market data records delivered by the stock and crypto streams.
//!
//! Stock and crypto frames share the `T`-tagged flat envelope and differ only
//! in a few fields, so one record per channel covers both: fields that only
//! one venue sends are optional.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A trade print.
///
/// # Wire Format (JSON)
/// ```json
/// {"T":"t","S":"AAPL","i":96921,"x":"D","p":126.55,"s":1,"t":"2021-02-22T15:51:44.208Z","c":["@","I"],"z":"C"}
/// {"T":"t","S":"BTC/USD","p":61254.7,"s":0.0021,"t":"2024-03-12T10:27:48.858228144Z","i":4237,"tks":"B"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    /// Message type (always "t")
    #[serde(rename = "T", default)]
    pub msg_type: String,

    /// Symbol (ticker or crypto pair)
    #[serde(rename = "S")]
    pub symbol: String,

    /// Trade ID
    #[serde(rename = "i", default)]
    pub trade_id: Option<i64>,

    /// Exchange code where the trade executed (stocks)
    #[serde(rename = "x", default)]
    pub exchange: Option<String>,

    /// Trade price
    #[serde(rename = "p")]
    pub price: Decimal,

    /// Trade size (shares, or fractional coin for crypto)
    #[serde(rename = "s", default)]
    pub size: Decimal,

    /// Trade timestamp (RFC-3339 with nanosecond precision)
    #[serde(rename = "t", default)]
    pub timestamp: Option<DateTime<Utc>>,

    /// Trade condition codes (stocks)
    #[serde(rename = "c", default)]
    pub conditions: Vec<String>,

    /// Tape (stocks)
    #[serde(rename = "z", default)]
    pub tape: Option<String>,

    /// Taker side, "B" or "S" (crypto)
    #[serde(rename = "tks", default)]
    pub taker_side: Option<String>,
}

/// A top-of-book quote.
///
/// # Wire Format (JSON)
/// ```json
/// {"T":"q","S":"AMD","bx":"U","bp":87.66,"bs":1,"ax":"Q","ap":87.68,"as":4,"t":"2021-02-22T15:51:45.335689322Z","c":["R"],"z":"C"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    /// Message type (always "q")
    #[serde(rename = "T", default)]
    pub msg_type: String,

    /// Symbol
    #[serde(rename = "S")]
    pub symbol: String,

    /// Bid exchange code (stocks)
    #[serde(rename = "bx", default)]
    pub bid_exchange: Option<String>,

    /// Bid price
    #[serde(rename = "bp")]
    pub bid_price: Decimal,

    /// Bid size
    #[serde(rename = "bs", default)]
    pub bid_size: Decimal,

    /// Ask exchange code (stocks)
    #[serde(rename = "ax", default)]
    pub ask_exchange: Option<String>,

    /// Ask price
    #[serde(rename = "ap")]
    pub ask_price: Decimal,

    /// Ask size
    #[serde(rename = "as", default)]
    pub ask_size: Decimal,

    /// Quote timestamp
    #[serde(rename = "t", default)]
    pub timestamp: Option<DateTime<Utc>>,

    /// Quote condition codes (stocks)
    #[serde(rename = "c", default)]
    pub conditions: Vec<String>,

    /// Tape (stocks)
    #[serde(rename = "z", default)]
    pub tape: Option<String>,
}

impl Quote {
    /// Midpoint between bid and ask.
    #[must_use]
    pub fn mid_price(&self) -> Decimal {
        (self.bid_price + self.ask_price) / Decimal::TWO
    }

    /// Ask minus bid.
    #[must_use]
    pub fn spread(&self) -> Decimal {
        self.ask_price - self.bid_price
    }
}

/// An OHLCV bar.
///
/// `msg_type` is "b" for minute bars, "d" for daily bars and "u" for
/// corrections to an already published bar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    /// Message type: "b", "d" or "u"
    #[serde(rename = "T", default)]
    pub msg_type: String,

    /// Symbol
    #[serde(rename = "S")]
    pub symbol: String,

    /// Open price
    #[serde(rename = "o")]
    pub open: Decimal,

    /// High price
    #[serde(rename = "h")]
    pub high: Decimal,

    /// Low price
    #[serde(rename = "l")]
    pub low: Decimal,

    /// Close price
    #[serde(rename = "c")]
    pub close: Decimal,

    /// Volume
    #[serde(rename = "v", default)]
    pub volume: Decimal,

    /// Number of trades in the bar
    #[serde(rename = "n", default)]
    pub trade_count: u64,

    /// Volume-weighted average price
    #[serde(rename = "vw", default)]
    pub vwap: Option<Decimal>,

    /// Start of the bar period
    #[serde(rename = "t", default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Bar {
    /// Check if this bar corrects a previously published one.
    #[must_use]
    pub fn is_correction(&self) -> bool {
        self.msg_type == "u"
    }
}
