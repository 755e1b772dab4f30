//! Order book composition and integrity enforcement.

use crate::checksum::ChecksumResult;
use crate::level::Level;
use crate::side::Side;
use chrono::{DateTime, Utc};
use kraken_decimal::{Decimal, DEFAULT_SCALE};
use kraken_events::Manager;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether an update targets the buy or the sell side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Buy side.
    Bid,
    /// Sell side.
    Ask,
}

impl Direction {
    /// The direction name as used in wire messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bid => "bid",
            Self::Ask => "ask",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One update for a [`Book`] to consume.
///
/// An empty `order_id` sets the level's aggregate quantity directly
/// (deleting the level when the quantity is zero or below); a
/// non-empty id inserts, adjusts, or removes that specific order.
#[derive(Debug, Clone)]
pub struct UpdateOp {
    /// Which side the update targets.
    pub direction: Direction,
    /// Order identifier; empty for L2 updates.
    pub order_id: String,
    /// Price level the update applies to.
    pub price: Decimal,
    /// New quantity; zero or below removes.
    pub quantity: Decimal,
    /// Exchange timestamp of the update.
    pub timestamp: DateTime<Utc>,
    /// Suppresses the `Updated` event for this op.
    pub silent: bool,
}

impl UpdateOp {
    /// An L2 update: set the aggregate at `price` directly.
    pub fn level(
        direction: Direction,
        price: Decimal,
        quantity: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            direction,
            order_id: String::new(),
            price,
            quantity,
            timestamp,
            silent: false,
        }
    }

    /// An L3 update: insert, adjust, or remove one order.
    pub fn order(
        direction: Direction,
        order_id: impl Into<String>,
        price: Decimal,
        quantity: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            direction,
            order_id: order_id.into(),
            price,
            quantity,
            timestamp,
            silent: false,
        }
    }

    /// Marks the op silent: it is applied but fires no `Updated` event.
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }
}

/// Owned copy of a level's observable state, carried by events so
/// handlers never need to reach back into a locked book.
#[derive(Debug, Clone, Serialize)]
pub struct LevelSnapshot {
    /// The level's price.
    pub price: Decimal,
    /// Aggregate quantity at the time of the event.
    pub quantity: Decimal,
    /// Time of the level's most recent update.
    pub timestamp: DateTime<Utc>,
}

impl From<&Level> for LevelSnapshot {
    fn from(level: &Level) -> Self {
        Self {
            price: level.price().clone(),
            quantity: level.quantity().clone(),
            timestamp: level.timestamp(),
        }
    }
}

/// Payload of the `BookCrossed` event.
#[derive(Debug, Clone, Serialize)]
pub struct CrossedLevels {
    /// The offending bid level.
    pub bid: LevelSnapshot,
    /// The offending ask level.
    pub ask: LevelSnapshot,
}

/// Payload of the `MaxDepthExceeded` event.
#[derive(Debug, Clone, Serialize)]
pub struct DepthExceeded {
    /// The side that overflowed.
    pub side: Direction,
    /// Level count at the time of the event.
    pub current_depth: usize,
    /// Configured limit.
    pub max_depth: usize,
    /// The level about to be trimmed.
    pub worst: LevelSnapshot,
}

/// Depth assigned to books that mirror the whole feed.
const UNBOUNDED_DEPTH: usize = usize::MAX;

/// Local replica of one symbol's limit order book, L2 and L3.
///
/// The book is a passive mirror: it consumes [`UpdateOp`]s decoded
/// from the stream, keeps both sides sorted, and corrects integrity
/// violations (crossed book, excess depth) by issuing further internal
/// updates. Mutations never fail; malformed input is the caller's
/// problem.
pub struct Book {
    symbol: String,
    max_depth: usize,
    no_crossing: bool,
    enforce_max_depth: bool,
    pub(crate) bids: Side,
    pub(crate) asks: Side,
    /// Fires after each non-silent update, once enforcement settles.
    pub on_updated: Manager<UpdateOp>,
    /// Fires once per crossed-book correction.
    pub on_book_crossed: Manager<CrossedLevels>,
    /// Fires once per depth-limit correction.
    pub on_max_depth_exceeded: Manager<DepthExceeded>,
    /// Fires on every checksum computation.
    pub on_checksummed: Manager<ChecksumResult>,
}

impl fmt::Debug for Book {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Book")
            .field("symbol", &self.symbol)
            .field("bids", &self.bids.len())
            .field("asks", &self.asks.len())
            .field("max_depth", &self.max_depth)
            .finish()
    }
}

impl Book {
    /// Creates an empty book with crossing elimination on and no
    /// effective depth limit.
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            max_depth: UNBOUNDED_DEPTH,
            no_crossing: true,
            enforce_max_depth: true,
            bids: Side::new(Direction::Bid),
            asks: Side::new(Direction::Ask),
            on_updated: Manager::new(),
            on_book_crossed: Manager::new(),
            on_max_depth_exceeded: Manager::new(),
            on_checksummed: Manager::new(),
        }
    }

    /// Creates a book trimmed to `depth` levels per side.
    pub fn with_depth(symbol: impl Into<String>, depth: usize) -> Self {
        let mut book = Self::new(symbol);
        book.max_depth = depth;
        book
    }

    /// The book's symbol.
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// The bid side.
    pub fn bids(&self) -> &Side {
        &self.bids
    }

    /// The ask side.
    pub fn asks(&self) -> &Side {
        &self.asks
    }

    /// Configured depth limit.
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Sets the per-side depth limit.
    pub fn set_max_depth(&mut self, depth: usize) {
        self.max_depth = depth;
    }

    /// Enables or disables crossed-book elimination.
    pub fn set_no_crossing(&mut self, enabled: bool) {
        self.no_crossing = enabled;
    }

    /// Enables or disables depth trimming. Must be off for books that
    /// mirror the whole feed.
    pub fn set_enforce_max_depth(&mut self, enabled: bool) {
        self.enforce_max_depth = enabled;
    }

    /// The highest bid level.
    pub fn best_bid(&self) -> Option<&Level> {
        self.bids.high()
    }

    /// The lowest ask level.
    pub fn best_ask(&self) -> Option<&Level> {
        self.asks.low()
    }

    /// The lowest bid level.
    pub fn worst_bid(&self) -> Option<&Level> {
        self.bids.low()
    }

    /// The highest ask level.
    pub fn worst_ask(&self) -> Option<&Level> {
        self.asks.high()
    }

    /// Routes the update to its side, then enforces book integrity.
    ///
    /// Enforcement may issue further internal updates recursively;
    /// the `Updated` event for this op fires only after the whole
    /// cascade settles, and not at all when the op is silent.
    pub fn update(&mut self, op: UpdateOp) {
        match op.direction {
            Direction::Ask => self.asks.update(&op),
            Direction::Bid => self.bids.update(&op),
        }
        if self.no_crossing {
            self.enforce_order();
        }
        if self.enforce_max_depth {
            self.enforce_depth();
        }
        if !op.silent {
            self.on_updated.call(&op);
        }
    }

    /// Removes crossings: while best bid >= best ask, reports the pair
    /// and cancels whichever level is newer. Equal timestamps drop the
    /// bid.
    pub fn enforce_order(&mut self) {
        loop {
            let correction = match (self.best_bid(), self.best_ask()) {
                (Some(bid), Some(ask)) if bid.price() >= ask.price() => {
                    let crossed = CrossedLevels {
                        bid: LevelSnapshot::from(bid),
                        ask: LevelSnapshot::from(ask),
                    };
                    let zero = if bid.timestamp() >= ask.timestamp() {
                        UpdateOp::level(
                            Direction::Bid,
                            bid.price().clone(),
                            Decimal::from_i64(0),
                            Utc::now(),
                        )
                    } else {
                        UpdateOp::level(
                            Direction::Ask,
                            ask.price().clone(),
                            Decimal::from_i64(0),
                            Utc::now(),
                        )
                    };
                    (crossed, zero)
                }
                _ => break,
            };
            let (crossed, zero) = correction;
            self.on_book_crossed.call(&crossed);
            self.update(zero);
        }
    }

    /// Trims each side back to the configured depth, reporting and
    /// zeroing the worst level until the limit holds.
    pub fn enforce_depth(&mut self) {
        while self.bids.len() > self.max_depth {
            let worst = match self.worst_bid() {
                Some(level) => LevelSnapshot::from(level),
                None => break,
            };
            self.on_max_depth_exceeded.call(&DepthExceeded {
                side: Direction::Bid,
                current_depth: self.bids.len(),
                max_depth: self.max_depth,
                worst: worst.clone(),
            });
            self.update(UpdateOp::level(
                Direction::Bid,
                worst.price,
                Decimal::from_i64(0),
                Utc::now(),
            ));
        }
        while self.asks.len() > self.max_depth {
            let worst = match self.worst_ask() {
                Some(level) => LevelSnapshot::from(level),
                None => break,
            };
            self.on_max_depth_exceeded.call(&DepthExceeded {
                side: Direction::Ask,
                current_depth: self.asks.len(),
                max_depth: self.max_depth,
                worst: worst.clone(),
            });
            self.update(UpdateOp::level(
                Direction::Ask,
                worst.price,
                Decimal::from_i64(0),
                Utc::now(),
            ));
        }
    }

    /// Midpoint of the book: the average of the best prices, the
    /// one-sided price when only one side exists, zero otherwise.
    pub fn midpoint(&self) -> Decimal {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => {
                // Promote past scale zero so integer prices average
                // exactly.
                let scale = bid.price().scale().max(ask.price().scale()).max(1);
                bid.price()
                    .set_scale(scale)
                    .add(ask.price())
                    .mul(&Decimal::from_f64(0.5).unwrap_or_default())
            }
            (Some(bid), None) => bid.price().clone(),
            (None, Some(ask)) => ask.price().clone(),
            (None, None) => Decimal::from_i64(0),
        }
    }

    /// Relative bid-ask spread in percent:
    /// `(ask - bid) / ask * 100`, zero when either side is empty.
    pub fn spread(&self) -> Decimal {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => ask
                .price()
                .set_scale(ask.price().scale().max(DEFAULT_SCALE))
                .sub(bid.price())
                .div(ask.price())
                .map(|ratio| ratio.mul(&Decimal::from_i64(100)))
                .unwrap_or_default(),
            _ => Decimal::from_i64(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn ts(seconds: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(seconds, 0).unwrap()
    }

    fn level_op(direction: Direction, price: &str, quantity: &str, at: i64) -> UpdateOp {
        UpdateOp::level(direction, dec(price), dec(quantity), ts(at))
    }

    #[test]
    fn test_best_and_worst() {
        let mut book = Book::new("BTC/USD");
        book.update(level_op(Direction::Ask, "100", "2", 1));
        book.update(level_op(Direction::Ask, "101", "3", 2));
        book.update(level_op(Direction::Bid, "99", "1", 3));
        book.update(level_op(Direction::Bid, "98", "1", 4));

        assert_eq!(book.best_ask().unwrap().price_string(), "100");
        assert_eq!(book.worst_ask().unwrap().price_string(), "101");
        assert_eq!(book.best_bid().unwrap().price_string(), "99");
        assert_eq!(book.worst_bid().unwrap().price_string(), "98");
    }

    #[test]
    fn test_midpoint() {
        let mut book = Book::new("BTC/USD");
        assert!(book.midpoint().is_zero());

        book.update(level_op(Direction::Ask, "100", "2", 1));
        assert_eq!(book.midpoint(), dec("100"));

        book.update(level_op(Direction::Bid, "99", "1", 2));
        assert_eq!(book.midpoint(), dec("99.5"));
    }

    #[test]
    fn test_spread() {
        let mut book = Book::new("BTC/USD");
        assert!(book.spread().is_zero());

        book.update(level_op(Direction::Ask, "100", "2", 1));
        book.update(level_op(Direction::Bid, "99", "1", 2));
        assert_eq!(book.spread(), dec("1"));
    }

    #[test]
    fn test_crossed_book_zeroes_newer_level() {
        let mut book = Book::new("BTC/USD");
        let crossings = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&crossings);
        book.on_book_crossed.recurring(move |event| {
            assert_eq!(event.data.bid.price, dec("100"));
            assert_eq!(event.data.ask.price, dec("100"));
            counter.fetch_add(1, Ordering::SeqCst);
        });

        book.update(level_op(Direction::Ask, "100", "2", 1));
        book.update(level_op(Direction::Ask, "101", "3", 2));
        book.update(level_op(Direction::Bid, "99", "1", 3));
        assert_eq!(crossings.load(Ordering::SeqCst), 0);

        // The bid at 100 is newer than the resting ask, so it loses.
        book.update(level_op(Direction::Bid, "100", "5", 4));
        assert_eq!(crossings.load(Ordering::SeqCst), 1);
        assert_eq!(book.best_bid().unwrap().price_string(), "99");
        assert_eq!(book.best_ask().unwrap().price_string(), "100");
    }

    #[test]
    fn test_crossed_book_zeroes_older_side_when_ask_newer() {
        let mut book = Book::new("BTC/USD");
        book.update(level_op(Direction::Bid, "100", "1", 5));
        // An ask below the resting bid, but newer: the ask is dropped.
        book.update(level_op(Direction::Ask, "99", "1", 6));
        assert_eq!(book.best_bid().unwrap().price_string(), "100");
        assert!(book.best_ask().is_none());
    }

    #[test]
    fn test_crossed_book_equal_timestamps_drop_bid() {
        let mut book = Book::new("BTC/USD");
        book.update(level_op(Direction::Ask, "100", "1", 7));
        book.update(level_op(Direction::Bid, "100", "1", 7));
        assert!(book.best_bid().is_none());
        assert_eq!(book.best_ask().unwrap().price_string(), "100");
    }

    #[test]
    fn test_crossing_cascades_until_uncrossed() {
        let mut book = Book::new("BTC/USD");
        book.update(level_op(Direction::Ask, "100", "1", 1));
        book.update(level_op(Direction::Ask, "101", "1", 2));
        book.update(level_op(Direction::Ask, "102", "1", 3));
        // A late bid above every ask eats through all three.
        book.update(level_op(Direction::Bid, "103", "1", 9));
        assert!(book.best_bid().is_none() || book.asks.is_empty());
        // Enforcement kept zeroing the newer side (the bid) first.
        assert_eq!(book.bids.len(), 0);
        assert_eq!(book.asks.len(), 3);
    }

    #[test]
    fn test_max_depth_trims_worst() {
        let mut book = Book::with_depth("BTC/USD", 2);
        let exceeded = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&exceeded);
        book.on_max_depth_exceeded.recurring(move |event| {
            assert_eq!(event.data.side, Direction::Ask);
            assert_eq!(event.data.current_depth, 3);
            assert_eq!(event.data.max_depth, 2);
            assert_eq!(event.data.worst.price, dec("102"));
            counter.fetch_add(1, Ordering::SeqCst);
        });

        book.update(level_op(Direction::Ask, "100", "1", 1));
        book.update(level_op(Direction::Ask, "101", "1", 2));
        book.update(level_op(Direction::Ask, "102", "1", 3));

        assert_eq!(exceeded.load(Ordering::SeqCst), 1);
        assert_eq!(book.asks.len(), 2);
        assert_eq!(book.worst_ask().unwrap().price_string(), "101");
    }

    #[test]
    fn test_updated_fires_after_enforcement() {
        let mut book = Book::new("BTC/USD");
        let updates = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&updates);
        book.on_updated.recurring(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        book.update(level_op(Direction::Ask, "100", "1", 1));
        assert_eq!(updates.load(Ordering::SeqCst), 1);

        // The crossing correction issues an internal update, so the
        // crossed insert fires twice in total.
        book.update(level_op(Direction::Bid, "100", "1", 2));
        assert_eq!(updates.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_silent_update_fires_no_event() {
        let mut book = Book::new("BTC/USD");
        let updates = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&updates);
        book.on_updated.recurring(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        book.update(level_op(Direction::Ask, "100", "1", 1).silent());
        assert_eq!(updates.load(Ordering::SeqCst), 0);
        assert_eq!(book.asks.len(), 1);
    }
}
