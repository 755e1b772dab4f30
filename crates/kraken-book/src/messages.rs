//! Decoded stream message shapes.
//!
//! The transport hands the engine raw JSON text; [`StreamMessage::parse`]
//! classifies it into tagged variants up front so the ingest path
//! pattern-matches typed records instead of traversing untyped maps.
//! Field names mirror the wire format exactly — they are in the hot
//! path.

use kraken_decimal::Decimal;
use serde::Deserialize;

/// Channels that drive the order-book engine.
pub const BOOK_CHANNELS: [&str; 3] = ["book", "book_snapshot", "level3"];

/// One aggregated price level on the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct PriceQty {
    /// Level price.
    pub price: Decimal,
    /// Aggregate quantity at the price.
    pub qty: Decimal,
}

/// Subscription acknowledgement:
/// `{method: "subscribe", params: {channel, symbol, depth?}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscribeAck {
    /// Channel being subscribed.
    pub channel: String,
    /// Symbols covered by the subscription.
    #[serde(default)]
    pub symbol: Vec<String>,
    /// Book depth, for book channels.
    #[serde(default)]
    pub depth: Option<usize>,
}

/// Spot L2 envelope: `{channel, type, data: [..]}`.
#[derive(Debug, Clone, Deserialize)]
pub struct BookEnvelope {
    /// `book` or `book_snapshot`.
    pub channel: String,
    /// `snapshot` or `update`.
    #[serde(rename = "type", default)]
    pub msg_type: Option<String>,
    /// One record per symbol.
    pub data: Vec<BookRecord>,
}

/// One symbol's L2 snapshot or delta.
#[derive(Debug, Clone, Deserialize)]
pub struct BookRecord {
    /// Trading pair symbol.
    pub symbol: String,
    /// Bid levels.
    #[serde(default)]
    pub bids: Vec<PriceQty>,
    /// Ask levels.
    #[serde(default)]
    pub asks: Vec<PriceQty>,
    /// Server CRC32, when the message carries one.
    #[serde(default)]
    pub checksum: Option<u32>,
    /// RFC 3339 timestamp.
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Spot L3 envelope: `{channel: "level3", type, data: [..]}`.
#[derive(Debug, Clone, Deserialize)]
pub struct Level3Envelope {
    /// Always `level3`.
    pub channel: String,
    /// `snapshot` or `update`.
    #[serde(rename = "type", default)]
    pub msg_type: Option<String>,
    /// One record per symbol.
    pub data: Vec<Level3Record>,
}

/// One symbol's L3 snapshot or delta.
#[derive(Debug, Clone, Deserialize)]
pub struct Level3Record {
    /// Trading pair symbol.
    pub symbol: String,
    /// Bid-side order events.
    #[serde(default)]
    pub bids: Vec<OrderRecord>,
    /// Ask-side order events.
    #[serde(default)]
    pub asks: Vec<OrderRecord>,
    /// Server CRC32, when the message carries one.
    #[serde(default)]
    pub checksum: Option<u32>,
}

/// One order event inside an L3 record.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderRecord {
    /// Exchange-assigned order identifier.
    pub order_id: String,
    /// Order limit price.
    pub limit_price: Decimal,
    /// Remaining order quantity.
    pub order_qty: Decimal,
    /// RFC 3339 timestamp.
    pub timestamp: String,
    /// `add`, `modify`, or `delete`. A delete zeroes the order
    /// regardless of the transmitted quantity.
    #[serde(default)]
    pub event: Option<String>,
}

/// Derivatives whole-book snapshot:
/// `{feed: "book_snapshot", product_id, bids, asks, timestamp}`.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedSnapshot {
    /// Instrument identifier.
    pub product_id: String,
    /// Milliseconds since epoch.
    #[serde(default)]
    pub timestamp: Option<i64>,
    /// Feed sequence number.
    #[serde(default)]
    pub seq: Option<u64>,
    /// Bid levels.
    #[serde(default)]
    pub bids: Vec<PriceQty>,
    /// Ask levels.
    #[serde(default)]
    pub asks: Vec<PriceQty>,
}

/// Derivatives single-level delta:
/// `{feed: "book", product_id, side, price, qty, timestamp}`.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedDelta {
    /// Instrument identifier.
    pub product_id: String,
    /// Milliseconds since epoch.
    pub timestamp: i64,
    /// `buy` or `sell`.
    pub side: String,
    /// Level price.
    pub price: Decimal,
    /// New aggregate quantity; zero removes the level.
    pub qty: Decimal,
    /// Feed sequence number.
    #[serde(default)]
    pub seq: Option<u64>,
}

/// A classified stream message.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum StreamMessage {
    /// Subscription acknowledgement.
    SubscribeAck(SubscribeAck),
    /// Spot L2 snapshot or delta.
    Book(BookEnvelope),
    /// Spot L3 snapshot or delta.
    Level3(Level3Envelope),
    /// Derivatives whole-book snapshot.
    FeedSnapshot(FeedSnapshot),
    /// Derivatives single-level delta.
    FeedDelta(FeedDelta),
    /// Anything the book engine does not consume.
    Other(serde_json::Value),
}

impl StreamMessage {
    /// Parses and classifies one raw JSON message.
    pub fn parse(json: &str) -> Result<Self, serde_json::Error> {
        Self::classify(serde_json::from_str(json)?)
    }

    /// Classifies an already-decoded JSON value.
    pub fn classify(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        if value.get("method").and_then(|m| m.as_str()) == Some("subscribe") {
            if let Some(params) = value.get("params") {
                return Ok(Self::SubscribeAck(SubscribeAck::deserialize(params)?));
            }
            return Ok(Self::Other(value));
        }

        let channel = value
            .get("channel")
            .and_then(|c| c.as_str())
            .map(str::to_owned);
        if let Some(channel) = channel {
            return match channel.as_str() {
                "book" | "book_snapshot" => Ok(Self::Book(BookEnvelope::deserialize(value)?)),
                "level3" => Ok(Self::Level3(Level3Envelope::deserialize(value)?)),
                _ => Ok(Self::Other(value)),
            };
        }

        let feed = value
            .get("feed")
            .and_then(|f| f.as_str())
            .map(str::to_owned);
        if let Some(feed) = feed {
            return match feed.as_str() {
                "book_snapshot" => Ok(Self::FeedSnapshot(FeedSnapshot::deserialize(value)?)),
                "book" => Ok(Self::FeedDelta(FeedDelta::deserialize(value)?)),
                _ => Ok(Self::Other(value)),
            };
        }

        Ok(Self::Other(value))
    }

    /// Whether this is a spot book snapshot.
    pub fn is_snapshot(&self) -> bool {
        match self {
            Self::Book(envelope) => {
                envelope.channel == "book_snapshot"
                    || envelope.msg_type.as_deref() == Some("snapshot")
            }
            Self::Level3(envelope) => envelope.msg_type.as_deref() == Some("snapshot"),
            Self::FeedSnapshot(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_subscribe_ack() {
        let json = r#"{
            "method": "subscribe",
            "params": {"channel": "book", "symbol": ["BTC/USD", "ETH/USD"], "depth": 25}
        }"#;
        match StreamMessage::parse(json).unwrap() {
            StreamMessage::SubscribeAck(ack) => {
                assert_eq!(ack.channel, "book");
                assert_eq!(ack.symbol, ["BTC/USD", "ETH/USD"]);
                assert_eq!(ack.depth, Some(25));
            }
            other => panic!("unexpected classification: {other:?}"),
        }
    }

    #[test]
    fn test_parse_book_snapshot() {
        let json = r#"{
            "channel": "book",
            "type": "snapshot",
            "data": [{
                "symbol": "BTC/USD",
                "bids": [{"price": 88812.1, "qty": 0.5}],
                "asks": [{"price": "88813.5", "qty": "0.00460208"}],
                "checksum": 123456789
            }]
        }"#;
        let message = StreamMessage::parse(json).unwrap();
        assert!(message.is_snapshot());
        match message {
            StreamMessage::Book(envelope) => {
                let record = &envelope.data[0];
                assert_eq!(record.symbol, "BTC/USD");
                assert_eq!(record.bids[0].price.canonical(), "88812.1");
                assert_eq!(record.asks[0].qty.canonical(), "0.00460208");
                assert_eq!(record.checksum, Some(123456789));
            }
            other => panic!("unexpected classification: {other:?}"),
        }
    }

    #[test]
    fn test_parse_level3_update() {
        let json = r#"{
            "channel": "level3",
            "type": "update",
            "data": [{
                "symbol": "BTC/USD",
                "bids": [{
                    "order_id": "O1",
                    "limit_price": 100.0,
                    "order_qty": 1.5,
                    "timestamp": "2024-05-01T10:00:00.000000Z",
                    "event": "delete"
                }],
                "checksum": 42
            }]
        }"#;
        match StreamMessage::parse(json).unwrap() {
            StreamMessage::Level3(envelope) => {
                let order = &envelope.data[0].bids[0];
                assert_eq!(order.order_id, "O1");
                assert_eq!(order.event.as_deref(), Some("delete"));
                assert_eq!(envelope.data[0].checksum, Some(42));
            }
            other => panic!("unexpected classification: {other:?}"),
        }
    }

    #[test]
    fn test_parse_feed_messages() {
        let snapshot = r#"{
            "feed": "book_snapshot",
            "product_id": "PI_XBTUSD",
            "timestamp": 1612269825817,
            "seq": 326072249,
            "bids": [{"price": 34892.5, "qty": 6385}],
            "asks": [{"price": 34911.5, "qty": 20598}]
        }"#;
        assert!(matches!(
            StreamMessage::parse(snapshot).unwrap(),
            StreamMessage::FeedSnapshot(_)
        ));

        let delta = r#"{
            "feed": "book",
            "product_id": "PI_XBTUSD",
            "side": "sell",
            "seq": 326094134,
            "price": 34981,
            "qty": 0,
            "timestamp": 1612269953629
        }"#;
        match StreamMessage::parse(delta).unwrap() {
            StreamMessage::FeedDelta(delta) => {
                assert_eq!(delta.side, "sell");
                assert!(delta.qty.is_zero());
            }
            other => panic!("unexpected classification: {other:?}"),
        }
    }

    #[test]
    fn test_unrelated_messages_classify_as_other() {
        for json in [
            r#"{"channel": "heartbeat"}"#,
            r#"{"channel": "ticker", "data": []}"#,
            r#"{"method": "pong"}"#,
            r#"{"event": "info"}"#,
        ] {
            assert!(matches!(
                StreamMessage::parse(json).unwrap(),
                StreamMessage::Other(_)
            ));
        }
    }

    #[test]
    fn test_malformed_payload_is_an_error() {
        let json = r#"{"channel": "book", "data": [{"bids": []}]}"#;
        assert!(StreamMessage::parse(json).is_err());
    }
}
