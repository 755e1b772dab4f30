//! One price point on one side of a book.

use crate::book::UpdateOp;
use chrono::{DateTime, Utc};
use kraken_decimal::Decimal;
use std::collections::HashMap;

/// Stable index of a [`Level`] inside its side's arena.
pub(crate) type LevelHandle = usize;

/// A resting limit order inside an L3 level.
#[derive(Debug, Clone)]
pub struct Order {
    /// Exchange-assigned order identifier.
    pub id: String,
    /// Limit price; always equals the containing level's price.
    pub limit_price: Decimal,
    /// Remaining quantity.
    pub quantity: Decimal,
    /// Most recent update time.
    pub timestamp: DateTime<Utc>,
    /// Arrival counter, breaks timestamp ties in the queue.
    seq: u64,
}

/// Price level information.
///
/// A level with no orders carries its aggregate quantity directly (L2
/// mode); once per-order updates arrive, the aggregate is the sum of
/// the order quantities (L3 mode).
#[derive(Debug)]
pub struct Level {
    price: Decimal,
    quantity: Decimal,
    timestamp: DateTime<Utc>,
    /// Neighbour with the next lower price.
    pub(crate) lower: Option<LevelHandle>,
    /// Neighbour with the next higher price.
    pub(crate) higher: Option<LevelHandle>,
    orders: HashMap<String, Order>,
    queue: Vec<String>,
    queue_dirty: bool,
    next_seq: u64,
}

impl Level {
    pub(crate) fn new(price: Decimal, timestamp: DateTime<Utc>) -> Self {
        Self {
            price,
            quantity: Decimal::default(),
            timestamp,
            lower: None,
            higher: None,
            orders: HashMap::new(),
            queue: Vec::new(),
            queue_dirty: false,
            next_seq: 0,
        }
    }

    /// The level's price. Immutable after creation.
    pub fn price(&self) -> &Decimal {
        &self.price
    }

    /// Aggregate quantity across the level.
    pub fn quantity(&self) -> &Decimal {
        &self.quantity
    }

    /// Time of the most recent update.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Number of tracked orders (zero in L2 mode).
    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    /// Looks up a tracked order by identifier.
    pub fn order(&self, id: &str) -> Option<&Order> {
        self.orders.get(id)
    }

    /// Canonical price text, used for book keys and checksum input.
    pub fn price_string(&self) -> String {
        self.price.canonical()
    }

    /// Canonical aggregate-quantity text.
    pub fn quantity_string(&self) -> String {
        self.quantity.canonical()
    }

    /// Applies one update to the level.
    ///
    /// An empty order id is an L2 update: the per-order map is wiped
    /// and the aggregate set directly. A non-empty id inserts,
    /// adjusts, or (quantity <= 0) removes that order, after which the
    /// aggregate is recomputed by summation over the survivors at the
    /// widest scale present.
    pub(crate) fn apply(&mut self, op: &UpdateOp) {
        if op.order_id.is_empty() {
            self.orders.clear();
            self.queue.clear();
            self.quantity = op.quantity.clone();
        } else {
            match self.orders.get_mut(&op.order_id) {
                Some(order) => {
                    order.quantity = op.quantity.clone();
                    order.timestamp = op.timestamp;
                }
                None if op.quantity.sign() > 0 => {
                    self.orders.insert(
                        op.order_id.clone(),
                        Order {
                            id: op.order_id.clone(),
                            limit_price: self.price.clone(),
                            quantity: op.quantity.clone(),
                            timestamp: op.timestamp,
                            seq: self.next_seq,
                        },
                    );
                    self.next_seq += 1;
                }
                None => {}
            }
            if op.quantity.sign() <= 0 {
                self.orders.remove(&op.order_id);
            }
            // Seeding with the scale-zero zero keeps the aggregate at
            // exactly the widest order scale.
            let mut total = Decimal::default();
            for order in self.orders.values() {
                total = total
                    .set_scale(total.scale().max(order.quantity.scale()))
                    .add(&order.quantity);
            }
            self.quantity = total;
        }
        self.timestamp = op.timestamp;
        self.queue_dirty = true;
    }

    /// The level's orders in time priority: ascending timestamp, with
    /// arrival order breaking ties. Rebuilt on demand after an update,
    /// cached otherwise.
    pub fn queue(&mut self) -> Vec<&Order> {
        if self.queue_dirty {
            let mut entries: Vec<(DateTime<Utc>, u64, String)> = self
                .orders
                .values()
                .map(|order| (order.timestamp, order.seq, order.id.clone()))
                .collect();
            entries.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
            self.queue = entries.into_iter().map(|(_, _, id)| id).collect();
            self.queue_dirty = false;
        }
        self.queue
            .iter()
            .filter_map(|id| self.orders.get(id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::Direction;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn ts(seconds: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(seconds, 0).unwrap()
    }

    fn level_op(quantity: &str, at: i64) -> UpdateOp {
        UpdateOp::level(Direction::Ask, dec("100"), dec(quantity), ts(at))
    }

    fn order_op(id: &str, quantity: &str, at: i64) -> UpdateOp {
        UpdateOp::order(Direction::Ask, id, dec("100"), dec(quantity), ts(at))
    }

    #[test]
    fn test_l2_update_sets_aggregate() {
        let mut level = Level::new(dec("100"), ts(0));
        level.apply(&level_op("2.5", 1));
        assert_eq!(level.quantity_string(), "2.5");
        assert_eq!(level.timestamp(), ts(1));
        level.apply(&level_op("1.0", 2));
        assert_eq!(level.quantity_string(), "1.0");
    }

    #[test]
    fn test_l2_update_wipes_orders() {
        let mut level = Level::new(dec("100"), ts(0));
        level.apply(&order_op("a", "1", 1));
        assert_eq!(level.order_count(), 1);
        level.apply(&level_op("5", 2));
        assert_eq!(level.order_count(), 0);
        assert_eq!(level.quantity_string(), "5");
    }

    #[test]
    fn test_l3_insert_update_delete() {
        let mut level = Level::new(dec("100"), ts(0));
        level.apply(&order_op("a", "1", 1));
        level.apply(&order_op("b", "2", 2));
        assert_eq!(level.quantity(), &dec("3"));

        level.apply(&order_op("a", "4", 3));
        assert_eq!(level.quantity(), &dec("6"));
        assert_eq!(level.order("a").unwrap().timestamp, ts(3));

        level.apply(&order_op("b", "0", 4));
        assert_eq!(level.order_count(), 1);
        assert_eq!(level.quantity(), &dec("4"));
    }

    #[test]
    fn test_l3_delete_absent_is_noop() {
        let mut level = Level::new(dec("100"), ts(0));
        level.apply(&order_op("a", "1", 1));
        level.apply(&order_op("ghost", "0", 2));
        assert_eq!(level.order_count(), 1);
        assert_eq!(level.quantity(), &dec("1"));
    }

    #[test]
    fn test_aggregate_uses_widest_scale() {
        let mut level = Level::new(dec("100"), ts(0));
        level.apply(&order_op("a", "1.5", 1));
        level.apply(&order_op("b", "0.00000001", 2));
        assert_eq!(level.quantity_string(), "1.50000001");
    }

    #[test]
    fn test_queue_time_priority() {
        let mut level = Level::new(dec("100"), ts(0));
        level.apply(&order_op("a", "1", 1));
        level.apply(&order_op("b", "1", 3));
        level.apply(&order_op("c", "1", 2));

        let ids: Vec<&str> = level.queue().iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, ["a", "c", "b"]);

        level.apply(&order_op("a", "0", 4));
        let ids: Vec<&str> = level.queue().iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, ["c", "b"]);
        assert_eq!(level.quantity(), &dec("2"));
    }

    #[test]
    fn test_queue_ties_break_by_arrival() {
        let mut level = Level::new(dec("100"), ts(0));
        level.apply(&order_op("later", "1", 5));
        level.apply(&order_op("x", "1", 1));
        level.apply(&order_op("y", "1", 1));
        let ids: Vec<&str> = level.queue().iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, ["x", "y", "later"]);
    }
}
