//! One side (bids or asks) of an order book.

use crate::book::{Direction, UpdateOp};
use crate::level::{Level, LevelHandle};
use kraken_decimal::Decimal;
use slab::Slab;
use std::collections::HashMap;

/// All price levels on one side of a book.
///
/// Levels live in a slab arena and link to their neighbours through
/// stable handles, forming a doubly-linked list sorted strictly
/// ascending from [`Side::low`] to [`Side::high`]. A map from
/// canonical price text to handle gives O(1) lookup.
#[derive(Debug)]
pub struct Side {
    direction: Direction,
    arena: Slab<Level>,
    by_price: HashMap<String, LevelHandle>,
    high: Option<LevelHandle>,
    low: Option<LevelHandle>,
}

impl Side {
    pub(crate) fn new(direction: Direction) -> Self {
        Self {
            direction,
            arena: Slab::new(),
            by_price: HashMap::new(),
            high: None,
            low: None,
        }
    }

    /// Whether this side holds bids or asks.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// The highest-priced level.
    pub fn high(&self) -> Option<&Level> {
        self.high.map(|handle| &self.arena[handle])
    }

    /// The lowest-priced level.
    pub fn low(&self) -> Option<&Level> {
        self.low.map(|handle| &self.arena[handle])
    }

    /// Number of levels on the side.
    pub fn len(&self) -> usize {
        self.by_price.len()
    }

    /// Whether the side has no levels.
    pub fn is_empty(&self) -> bool {
        self.by_price.is_empty()
    }

    /// Looks up the level at an exact price.
    pub fn get(&self, price: &Decimal) -> Option<&Level> {
        self.by_price
            .get(&price.canonical())
            .map(|&handle| &self.arena[handle])
    }

    /// Levels in ascending price order, low to high.
    pub fn iter(&self) -> Levels<'_> {
        Levels {
            side: self,
            cursor: self.low,
            ascending: true,
        }
    }

    /// Levels in descending price order, high to low.
    pub fn iter_desc(&self) -> Levels<'_> {
        Levels {
            side: self,
            cursor: self.high,
            ascending: false,
        }
    }

    /// Finds the level nearest to `price` without strictly passing it,
    /// approaching from whichever endpoint is closer. `None` when the
    /// side is empty.
    pub fn find_adjacent(&self, price: &Decimal) -> Option<&Level> {
        self.find_adjacent_handle(price)
            .map(|handle| &self.arena[handle])
    }

    /// Interprets an update: insert a new level, update an existing
    /// one, or delete it once its aggregate is depleted.
    pub(crate) fn update(&mut self, op: &UpdateOp) {
        match self.by_price.get(&op.price.canonical()).copied() {
            Some(handle) => {
                let depleted = {
                    let level = &mut self.arena[handle];
                    level.apply(op);
                    level.quantity().sign() <= 0
                };
                if depleted {
                    self.remove(handle);
                }
            }
            None if op.quantity.sign() > 0 => self.insert(op),
            // A zero-quantity update at an absent price is a no-op.
            None => {}
        }
    }

    pub(crate) fn level_mut(&mut self, handle: LevelHandle) -> &mut Level {
        &mut self.arena[handle]
    }

    pub(crate) fn high_handle(&self) -> Option<LevelHandle> {
        self.high
    }

    pub(crate) fn low_handle(&self) -> Option<LevelHandle> {
        self.low
    }

    pub(crate) fn higher_of(&self, handle: LevelHandle) -> Option<LevelHandle> {
        self.arena[handle].higher
    }

    pub(crate) fn lower_of(&self, handle: LevelHandle) -> Option<LevelHandle> {
        self.arena[handle].lower
    }

    /// Creates the level and splices it into the chain next to its
    /// adjacent neighbour.
    fn insert(&mut self, op: &UpdateOp) {
        let mut level = Level::new(op.price.clone(), op.timestamp);
        level.apply(op);
        let nearest = self.find_adjacent_handle(&op.price);
        let handle = self.arena.insert(level);

        if nearest.is_none() || self.high.map_or(true, |h| op.price > *self.arena[h].price()) {
            self.high = Some(handle);
        }
        if nearest.is_none() || self.low.map_or(true, |l| op.price < *self.arena[l].price()) {
            self.low = Some(handle);
        }
        if let Some(near) = nearest {
            if op.price > *self.arena[near].price() {
                let old_higher = self.arena[near].higher;
                self.arena[handle].lower = Some(near);
                self.arena[handle].higher = old_higher;
                self.arena[near].higher = Some(handle);
                if let Some(above) = old_higher {
                    self.arena[above].lower = Some(handle);
                }
            } else {
                let old_lower = self.arena[near].lower;
                self.arena[handle].higher = Some(near);
                self.arena[handle].lower = old_lower;
                self.arena[near].lower = Some(handle);
                if let Some(below) = old_lower {
                    self.arena[below].higher = Some(handle);
                }
            }
        }
        self.by_price.insert(op.price.canonical(), handle);
    }

    /// Unlinks the level, fixes the endpoints, and frees its slot.
    fn remove(&mut self, handle: LevelHandle) {
        let (lower, higher, key) = {
            let level = &self.arena[handle];
            (level.lower, level.higher, level.price_string())
        };
        if self.high == Some(handle) {
            self.high = lower;
        }
        if self.low == Some(handle) {
            self.low = higher;
        }
        if let Some(below) = lower {
            self.arena[below].higher = higher;
        }
        if let Some(above) = higher {
            self.arena[above].lower = lower;
        }
        self.by_price.remove(&key);
        self.arena.remove(handle);
    }

    fn find_adjacent_handle(&self, price: &Decimal) -> Option<LevelHandle> {
        let high = self.high?;
        let low = self.low?;
        if price > self.arena[high].price() {
            return Some(high);
        }
        if price < self.arena[low].price() {
            return Some(low);
        }
        let high_distance = self.arena[high].price().sub(price);
        let low_distance = price.sub(self.arena[low].price());
        if high_distance > low_distance {
            self.find_adjacent_below(price)
        } else {
            self.find_adjacent_above(price)
        }
    }

    /// Walks up from the low end towards `price`.
    fn find_adjacent_below(&self, price: &Decimal) -> Option<LevelHandle> {
        let low = self.low?;
        if price <= self.arena[low].price() {
            return None;
        }
        let mut nearest = low;
        while let Some(next) = self.arena[nearest].higher {
            let nearest_diff = self.arena[nearest].price().sub(price).abs();
            let next_diff = self.arena[next].price().sub(price).abs();
            if nearest_diff < next_diff || self.arena[next].price() >= price {
                break;
            }
            nearest = next;
        }
        Some(nearest)
    }

    /// Walks down from the high end towards `price`.
    fn find_adjacent_above(&self, price: &Decimal) -> Option<LevelHandle> {
        let high = self.high?;
        if price >= self.arena[high].price() {
            return None;
        }
        let mut nearest = high;
        while let Some(next) = self.arena[nearest].lower {
            let nearest_diff = self.arena[nearest].price().sub(price).abs();
            let next_diff = self.arena[next].price().sub(price).abs();
            if nearest_diff < next_diff || self.arena[next].price() <= price {
                break;
            }
            nearest = next;
        }
        Some(nearest)
    }
}

/// Iterator over a side's levels following the neighbour chain.
pub struct Levels<'a> {
    side: &'a Side,
    cursor: Option<LevelHandle>,
    ascending: bool,
}

impl<'a> Iterator for Levels<'a> {
    type Item = &'a Level;

    fn next(&mut self) -> Option<Self::Item> {
        let handle = self.cursor?;
        let level = &self.side.arena[handle];
        self.cursor = if self.ascending {
            level.higher
        } else {
            level.lower
        };
        Some(level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn ts(seconds: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(seconds, 0).unwrap()
    }

    fn op(price: &str, quantity: &str) -> UpdateOp {
        UpdateOp::level(Direction::Ask, dec(price), dec(quantity), ts(0))
    }

    /// Walks the chain both ways and checks it is sorted and complete.
    fn assert_chain(side: &Side) {
        let ascending: Vec<String> = side.iter().map(|l| l.price_string()).collect();
        assert_eq!(ascending.len(), side.len(), "chain misses levels");
        for pair in ascending.windows(2) {
            assert!(
                dec(&pair[0]) < dec(&pair[1]),
                "chain out of order: {pair:?}"
            );
        }
        let mut descending: Vec<String> = side.iter_desc().map(|l| l.price_string()).collect();
        descending.reverse();
        assert_eq!(ascending, descending);
    }

    #[test]
    fn test_insert_sorted_any_order() {
        let mut side = Side::new(Direction::Ask);
        for price in ["100", "98", "103", "101", "99", "102"] {
            side.update(&op(price, "1"));
            assert_chain(&side);
        }
        assert_eq!(side.len(), 6);
        assert_eq!(side.low().unwrap().price_string(), "98");
        assert_eq!(side.high().unwrap().price_string(), "103");
    }

    #[test]
    fn test_update_existing_does_not_duplicate() {
        let mut side = Side::new(Direction::Bid);
        side.update(&op("100", "1"));
        side.update(&op("100", "3"));
        assert_eq!(side.len(), 1);
        assert_eq!(side.get(&dec("100")).unwrap().quantity_string(), "3");
    }

    #[test]
    fn test_zero_quantity_deletes() {
        let mut side = Side::new(Direction::Bid);
        side.update(&op("100", "1"));
        side.update(&op("101", "1"));
        side.update(&op("100", "0"));
        assert_eq!(side.len(), 1);
        assert!(side.get(&dec("100")).is_none());
        assert_chain(&side);
    }

    #[test]
    fn test_delete_only_level_clears_endpoints() {
        let mut side = Side::new(Direction::Ask);
        side.update(&op("100", "1"));
        side.update(&op("100", "0"));
        assert!(side.is_empty());
        assert!(side.high().is_none());
        assert!(side.low().is_none());
    }

    #[test]
    fn test_delete_endpoint_moves_pointers() {
        let mut side = Side::new(Direction::Ask);
        for price in ["100", "101", "102"] {
            side.update(&op(price, "1"));
        }
        side.update(&op("102", "0"));
        assert_eq!(side.high().unwrap().price_string(), "101");
        side.update(&op("100", "0"));
        assert_eq!(side.low().unwrap().price_string(), "101");
        assert_chain(&side);
    }

    #[test]
    fn test_zero_quantity_at_absent_price_is_noop() {
        let mut side = Side::new(Direction::Ask);
        side.update(&op("100", "1"));
        side.update(&op("50", "0"));
        assert_eq!(side.len(), 1);
        assert_chain(&side);
    }

    #[test]
    fn test_find_adjacent() {
        let mut side = Side::new(Direction::Ask);
        assert!(side.find_adjacent(&dec("100")).is_none());
        for price in ["10", "20", "30", "40"] {
            side.update(&op(price, "1"));
        }
        // Outside the range: the nearer endpoint.
        assert_eq!(side.find_adjacent(&dec("5")).unwrap().price_string(), "10");
        assert_eq!(
            side.find_adjacent(&dec("50")).unwrap().price_string(),
            "40"
        );
        // Between levels: the neighbour it would splice against.
        assert_eq!(
            side.find_adjacent(&dec("12")).unwrap().price_string(),
            "10"
        );
        assert_eq!(
            side.find_adjacent(&dec("38")).unwrap().price_string(),
            "40"
        );
    }

    #[test]
    fn test_slot_reuse_keeps_chain_consistent() {
        let mut side = Side::new(Direction::Bid);
        for price in ["1", "2", "3", "4", "5"] {
            side.update(&op(price, "1"));
        }
        side.update(&op("3", "0"));
        side.update(&op("2.5", "1"));
        side.update(&op("6", "1"));
        assert_chain(&side);
        assert_eq!(side.len(), 6);
    }
}
