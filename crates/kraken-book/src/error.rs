//! Error types for stream ingestion.

use thiserror::Error;

/// Errors surfaced by [`BookManager::update`](crate::BookManager::update).
///
/// A failed message is skipped and leaves book state unchanged; the
/// caller decides whether to log, drop, or resubscribe. A checksum
/// mismatch is deliberately *not* an error — it is reported through
/// the `Checksummed` event.
#[derive(Debug, Error)]
pub enum BookError {
    /// The decoded message does not match the expected shape.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A book envelope named a channel the engine does not consume.
    #[error("unknown channel \"{0}\"")]
    UnknownChannel(String),

    /// A derivatives delta carried a side other than buy/sell.
    #[error("unknown direction \"{0}\"")]
    UnknownDirection(String),

    /// A delta referenced a symbol with no managed book.
    #[error("book \"{symbol}\" not found in library ({known})")]
    UnknownSymbol { symbol: String, known: String },

    /// An RFC 3339 timestamp failed to parse.
    #[error("timestamp parse: {0}")]
    Timestamp(#[from] chrono::ParseError),

    /// A millisecond epoch timestamp is out of range.
    #[error("invalid timestamp {0}")]
    InvalidTimestamp(i64),
}
