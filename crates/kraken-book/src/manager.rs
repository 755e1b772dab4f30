//! Per-symbol book registry and stream ingestion.

use crate::book::{Book, Direction, UpdateOp};
use crate::error::BookError;
use crate::messages::{
    BookEnvelope, FeedDelta, FeedSnapshot, Level3Envelope, StreamMessage, SubscribeAck,
    BOOK_CHANNELS,
};
use chrono::{DateTime, Utc};
use kraken_decimal::Decimal;
use kraken_events::Manager;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Shared handle to a managed book.
///
/// Ingestion holds the write lock for one op plus its enforcement
/// cascade; consumers take the read lock between updates or work from
/// event payload snapshots.
pub type BookHandle = Arc<RwLock<Book>>;

/// Depth for books created from a snapshot that was not preceded by a
/// subscription acknowledgement.
const DEFAULT_DEPTH: usize = 10;

/// Registry of books keyed by upper-cased symbol, fed by decoded
/// stream messages.
///
/// One logical ingest path calls [`BookManager::update`]; each failed
/// message is skipped without touching book state. Checksum
/// mismatches are informational — reported through the book's
/// `Checksummed` event and a warning, never an error return — so the
/// caller decides whether to resubscribe.
pub struct BookManager {
    books: RwLock<HashMap<String, BookHandle>>,
    /// Fires whenever a book is created.
    pub on_create_book: Manager<BookHandle>,
}

impl Default for BookManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BookManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BookManager")
            .field("books", &self.symbols())
            .finish()
    }
}

impl BookManager {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            books: RwLock::new(HashMap::new()),
            on_create_book: Manager::new(),
        }
    }

    /// Creates (or replaces) a managed book.
    ///
    /// `depth` bounds the book to that many levels per side; `None`
    /// mirrors the whole feed with depth trimming disabled.
    pub fn create_book(&self, symbol: &str, depth: Option<usize>) -> BookHandle {
        let name = symbol.to_uppercase();
        let mut book = Book::new(name.clone());
        match depth {
            Some(depth) => book.set_max_depth(depth),
            None => book.set_enforce_max_depth(false),
        }
        let handle: BookHandle = Arc::new(RwLock::new(book));
        self.books.write().insert(name.clone(), handle.clone());
        debug!(symbol = %name, ?depth, "created book");
        self.on_create_book.call(&handle);
        handle
    }

    /// Looks up a managed book. Symbols are case-insensitive.
    pub fn get_book(&self, symbol: &str) -> Option<BookHandle> {
        self.books.read().get(&symbol.to_uppercase()).cloned()
    }

    /// The managed symbols.
    pub fn symbols(&self) -> Vec<String> {
        self.books.read().keys().cloned().collect()
    }

    /// Parses and ingests one raw JSON message.
    pub fn update_raw(&self, json: &str) -> Result<(), BookError> {
        self.update(&StreamMessage::parse(json)?)
    }

    /// Ingests one classified stream message.
    pub fn update(&self, message: &StreamMessage) -> Result<(), BookError> {
        match message {
            StreamMessage::SubscribeAck(ack) => self.apply_subscribe_ack(ack),
            StreamMessage::Book(envelope) => self.apply_book(envelope),
            StreamMessage::Level3(envelope) => self.apply_level3(envelope),
            StreamMessage::FeedSnapshot(snapshot) => self.apply_feed_snapshot(snapshot),
            StreamMessage::FeedDelta(delta) => self.apply_feed_delta(delta),
            StreamMessage::Other(_) => Ok(()),
        }
    }

    /// A subscription acknowledgement on a book channel creates one
    /// book per symbol at the declared depth.
    fn apply_subscribe_ack(&self, ack: &SubscribeAck) -> Result<(), BookError> {
        if !BOOK_CHANNELS.contains(&ack.channel.as_str()) {
            return Ok(());
        }
        let depth = ack.depth.unwrap_or(DEFAULT_DEPTH);
        for symbol in &ack.symbol {
            self.create_book(symbol, Some(depth));
        }
        Ok(())
    }

    fn apply_book(&self, envelope: &BookEnvelope) -> Result<(), BookError> {
        if !matches!(envelope.channel.as_str(), "book" | "book_snapshot") {
            return Err(BookError::UnknownChannel(envelope.channel.clone()));
        }
        let snapshot = envelope.channel == "book_snapshot"
            || envelope.msg_type.as_deref() == Some("snapshot");
        for record in &envelope.data {
            let book = self.resolve_book(&record.symbol, snapshot)?;
            let timestamp = match &record.timestamp {
                Some(text) => DateTime::parse_from_rfc3339(text)?.with_timezone(&Utc),
                None => Utc::now(),
            };
            let mut book = book.write();
            for (direction, levels) in
                [(Direction::Bid, &record.bids), (Direction::Ask, &record.asks)]
            {
                for level in levels {
                    book.update(UpdateOp::level(
                        direction,
                        level.price.clone(),
                        level.qty.clone(),
                        timestamp,
                    ));
                }
            }
            if let Some(server) = record.checksum {
                let result = book.l2_checksum(&server.to_string());
                if !result.matched {
                    warn!(
                        symbol = %record.symbol,
                        server = %result.server_checksum,
                        local = %result.local_checksum,
                        "L2 checksum mismatch"
                    );
                }
            }
        }
        Ok(())
    }

    fn apply_level3(&self, envelope: &Level3Envelope) -> Result<(), BookError> {
        if envelope.channel != "level3" {
            return Err(BookError::UnknownChannel(envelope.channel.clone()));
        }
        let snapshot = envelope.msg_type.as_deref() == Some("snapshot");
        for record in &envelope.data {
            let book = self.resolve_book(&record.symbol, snapshot)?;
            // Validate every order before touching the book, so a bad
            // record leaves it untouched.
            let mut ops = Vec::with_capacity(record.bids.len() + record.asks.len());
            for (direction, orders) in
                [(Direction::Bid, &record.bids), (Direction::Ask, &record.asks)]
            {
                for order in orders {
                    let timestamp =
                        DateTime::parse_from_rfc3339(&order.timestamp)?.with_timezone(&Utc);
                    let quantity = if order.event.as_deref() == Some("delete") {
                        Decimal::from_i64(0)
                    } else {
                        order.order_qty.clone()
                    };
                    ops.push(UpdateOp::order(
                        direction,
                        order.order_id.clone(),
                        order.limit_price.clone(),
                        quantity,
                        timestamp,
                    ));
                }
            }
            let mut book = book.write();
            for op in ops {
                book.update(op);
            }
            if let Some(server) = record.checksum {
                let result = book.l3_checksum(&server.to_string());
                if !result.matched {
                    warn!(
                        symbol = %record.symbol,
                        server = %result.server_checksum,
                        local = %result.local_checksum,
                        "L3 checksum mismatch"
                    );
                }
            }
        }
        Ok(())
    }

    /// Derivatives snapshots mirror the whole book; depth trimming
    /// stays off for books they create.
    fn apply_feed_snapshot(&self, snapshot: &FeedSnapshot) -> Result<(), BookError> {
        let book = match self.get_book(&snapshot.product_id) {
            Some(book) => book,
            None => self.create_book(&snapshot.product_id, None),
        };
        let timestamp = match snapshot.timestamp {
            Some(millis) => DateTime::from_timestamp_millis(millis)
                .ok_or(BookError::InvalidTimestamp(millis))?,
            None => Utc::now(),
        };
        let mut book = book.write();
        for (direction, levels) in
            [(Direction::Bid, &snapshot.bids), (Direction::Ask, &snapshot.asks)]
        {
            for level in levels {
                book.update(UpdateOp::level(
                    direction,
                    level.price.clone(),
                    level.qty.clone(),
                    timestamp,
                ));
            }
        }
        debug!(product = %snapshot.product_id, "applied futures book snapshot");
        Ok(())
    }

    fn apply_feed_delta(&self, delta: &FeedDelta) -> Result<(), BookError> {
        let direction = match delta.side.as_str() {
            "buy" => Direction::Bid,
            "sell" => Direction::Ask,
            other => return Err(BookError::UnknownDirection(other.to_string())),
        };
        let timestamp = DateTime::from_timestamp_millis(delta.timestamp)
            .ok_or(BookError::InvalidTimestamp(delta.timestamp))?;
        let book = match self.get_book(&delta.product_id) {
            Some(book) => book,
            None => self.create_book(&delta.product_id, None),
        };
        book.write().update(UpdateOp::level(
            direction,
            delta.price.clone(),
            delta.qty.clone(),
            timestamp,
        ));
        Ok(())
    }

    /// A snapshot creates the book lazily; a delta for an unseen
    /// symbol is an error.
    fn resolve_book(&self, symbol: &str, snapshot: bool) -> Result<BookHandle, BookError> {
        match self.get_book(symbol) {
            Some(book) => Ok(book),
            None if snapshot => Ok(self.create_book(symbol, Some(DEFAULT_DEPTH))),
            None => Err(BookError::UnknownSymbol {
                symbol: symbol.to_uppercase(),
                known: self.symbols().join(","),
            }),
        }
    }
}
