//! Live order-book maintenance for exchange market-data streams.
//!
//! The engine ingests decoded snapshot and delta messages and keeps
//! per-symbol replicas of the exchange's limit order book at two
//! granularities: aggregated by price (L2) and per-order (L3). Book
//! integrity — sorted sides, no crossings, bounded depth — is enforced
//! through self-corrective updates, and synchronization with the
//! exchange is validated with a CRC32 checksum over the canonical
//! top-of-book serialisation.
//!
//! Data flow:
//!
//! ```text
//! decoded message -> BookManager -> Book -> Side -> Level
//!                      |              |
//!                      CreateBook     Updated / BookCrossed /
//!                                     MaxDepthExceeded / Checksummed
//! ```
//!
//! Events fire synchronously on the ingest path; handlers that may
//! block must hand off to their own workers.
//!
//! # Example
//!
//! ```
//! use kraken_book::BookManager;
//!
//! let manager = BookManager::new();
//! manager.update_raw(r#"{
//!     "channel": "book",
//!     "type": "snapshot",
//!     "data": [{
//!         "symbol": "BTC/USD",
//!         "bids": [{"price": "99.9", "qty": "1.5"}],
//!         "asks": [{"price": "100.1", "qty": "2.0"}]
//!     }]
//! }"#).unwrap();
//!
//! let book = manager.get_book("BTC/USD").unwrap();
//! assert_eq!(book.read().midpoint().canonical(), "100.0");
//! ```

pub mod book;
pub mod checksum;
pub mod error;
pub mod level;
pub mod manager;
pub mod messages;
pub mod side;

pub use book::{Book, CrossedLevels, DepthExceeded, Direction, LevelSnapshot, UpdateOp};
pub use checksum::{ChecksumPart, ChecksumResult, CHECKSUM_DEPTH};
pub use error::BookError;
pub use level::{Level, Order};
pub use manager::{BookHandle, BookManager};
pub use messages::{
    BookEnvelope, BookRecord, FeedDelta, FeedSnapshot, Level3Envelope, Level3Record, OrderRecord,
    PriceQty, StreamMessage, SubscribeAck, BOOK_CHANNELS,
};
pub use side::{Levels, Side};

// Re-export the decimal type; every price and quantity in the public
// API is one.
pub use kraken_decimal::Decimal;
