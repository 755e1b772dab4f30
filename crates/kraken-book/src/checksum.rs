//! CRC32 synchronization checks against the exchange.
//!
//! The exchange periodically publishes a CRC32 of its own top-of-book;
//! computing the same value locally proves the replica has not
//! diverged. The serialisation is canonical decimal text with the
//! point removed and leading zeros stripped, concatenated price then
//! quantity, asks before bids, at most [`CHECKSUM_DEPTH`] levels per
//! side, hashed with the IEEE polynomial and compared as decimal
//! strings byte for byte.

use crate::book::Book;
use crate::level::{Level, Order};
use serde::Serialize;

/// Number of levels per side that enter the checksum.
pub const CHECKSUM_DEPTH: usize = 10;

/// One price level's (or order's) contribution to the checksum.
#[derive(Debug, Clone, Serialize)]
pub struct ChecksumPart {
    /// Order identifier, for L3 parts.
    pub order_id: Option<String>,
    /// Price digits after canonicalisation.
    pub price: String,
    /// Quantity digits after canonicalisation.
    pub quantity: String,
    /// Price digits followed by quantity digits.
    pub concatenated: String,
}

impl ChecksumPart {
    fn from_level(level: &Level) -> Self {
        let price = checksum_digits(&level.price_string());
        let quantity = checksum_digits(&level.quantity_string());
        let concatenated = format!("{price}{quantity}");
        Self {
            order_id: None,
            price,
            quantity,
            concatenated,
        }
    }

    fn from_order(order: &Order) -> Self {
        let price = checksum_digits(&order.limit_price.canonical());
        let quantity = checksum_digits(&order.quantity.canonical());
        let concatenated = format!("{price}{quantity}");
        Self {
            order_id: Some(order.id.clone()),
            price,
            quantity,
            concatenated,
        }
    }
}

/// Outcome of one checksum validation, carried by the `Checksummed`
/// event. The per-level parts and assembled buffers make a divergent
/// book diagnosable without replaying the stream.
#[derive(Debug, Clone, Serialize)]
pub struct ChecksumResult {
    /// Book granularity the checksum covered: 2 or 3.
    pub level: u8,
    /// Checksum the exchange reported.
    pub server_checksum: String,
    /// Checksum computed over the local replica.
    pub local_checksum: String,
    /// Whether the two are byte-equal.
    pub matched: bool,
    /// Ask-side contributions, best to worst.
    pub ask_parts: Vec<ChecksumPart>,
    /// Bid-side contributions, best to worst.
    pub bid_parts: Vec<ChecksumPart>,
    /// Concatenated ask buffer.
    pub asks: String,
    /// Concatenated bid buffer.
    pub bids: String,
}

impl ChecksumResult {
    fn new(level: u8, server_checksum: &str) -> Self {
        Self {
            level,
            server_checksum: server_checksum.to_string(),
            local_checksum: String::new(),
            matched: false,
            ask_parts: Vec::new(),
            bid_parts: Vec::new(),
            asks: String::new(),
            bids: String::new(),
        }
    }

    fn finalize(&mut self) {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(self.asks.as_bytes());
        hasher.update(self.bids.as_bytes());
        self.local_checksum = hasher.finalize().to_string();
        self.matched = self.local_checksum == self.server_checksum;
    }
}

/// Removes the decimal point and strips leading zeros from a
/// canonical decimal string.
fn checksum_digits(canonical: &str) -> String {
    canonical
        .replace('.', "")
        .trim_start_matches('0')
        .to_string()
}

impl Book {
    /// Validates the aggregated (L2) top-of-book against the server's
    /// checksum: one price+quantity pair per level.
    pub fn l2_checksum(&self, server_checksum: &str) -> ChecksumResult {
        let mut result = ChecksumResult::new(2, server_checksum);
        for level in self.asks.iter().take(CHECKSUM_DEPTH) {
            let part = ChecksumPart::from_level(level);
            result.asks.push_str(&part.concatenated);
            result.ask_parts.push(part);
        }
        for level in self.bids.iter_desc().take(CHECKSUM_DEPTH) {
            let part = ChecksumPart::from_level(level);
            result.bids.push_str(&part.concatenated);
            result.bid_parts.push(part);
        }
        result.finalize();
        self.on_checksummed.call(&result);
        result
    }

    /// Validates the per-order (L3) top-of-book: one price+quantity
    /// pair per queued order, in time priority within each level.
    pub fn l3_checksum(&mut self, server_checksum: &str) -> ChecksumResult {
        let mut result = ChecksumResult::new(3, server_checksum);

        let mut cursor = self.asks.low_handle();
        let mut visited = 0;
        while let Some(handle) = cursor {
            if visited == CHECKSUM_DEPTH {
                break;
            }
            visited += 1;
            let parts: Vec<ChecksumPart> = self
                .asks
                .level_mut(handle)
                .queue()
                .into_iter()
                .map(ChecksumPart::from_order)
                .collect();
            for part in parts {
                result.asks.push_str(&part.concatenated);
                result.ask_parts.push(part);
            }
            cursor = self.asks.higher_of(handle);
        }

        let mut cursor = self.bids.high_handle();
        let mut visited = 0;
        while let Some(handle) = cursor {
            if visited == CHECKSUM_DEPTH {
                break;
            }
            visited += 1;
            let parts: Vec<ChecksumPart> = self
                .bids
                .level_mut(handle)
                .queue()
                .into_iter()
                .map(ChecksumPart::from_order)
                .collect();
            for part in parts {
                result.bids.push_str(&part.concatenated);
                result.bid_parts.push(part);
            }
            cursor = self.bids.lower_of(handle);
        }

        result.finalize();
        self.on_checksummed.call(&result);
        result
    }
}
