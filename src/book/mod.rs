//! Two-sided price-level book (C2) and its mutation primitives.
//!
//! Price levels are keyed by a float projection of the wire price string
//! (`OrderedFloat<f64>`) so the level map can live in a `BTreeMap` and
//! iterate in price order; the orders themselves keep their original
//! wire strings for size arithmetic (`rust_decimal::Decimal`, parsed on
//! demand) and for verbatim re-emission in L2 views.

use std::collections::BTreeMap;

use ordered_float::OrderedFloat;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::warn;

use crate::model::BookSide;

/// A single resting order within a price level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub price: String,
    pub size: String,
    pub order_id: String,
}

/// Orders resting at one price, in arrival order.
pub type PriceLevel = Vec<Order>;

/// One side of the book: price (as an orderable float) to the orders
/// resting there.
pub type Side = BTreeMap<OrderedFloat<f64>, PriceLevel>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BookError {
    #[error("match not on book for order {order_id} at price {price}")]
    MatchNotOnBook { price: String, order_id: String },
    #[error("done order {order_id} not on book at price {price}")]
    DoneNotOnBook { price: String, order_id: String },
    #[error("snapshot sequence {snapshot_seq} is not after current snapshot sequence {current}")]
    SnapshotStale { snapshot_seq: i64, current: i64 },
}

/// The live order book for one product.
pub struct Book {
    pub product_id: String,
    pub bids: Side,
    pub asks: Side,
    /// Highest sequence number applied so far.
    pub curr_seq: i64,
    /// Sequence number of the last snapshot this book was rebuilt from.
    pub snapshot_seq: i64,
    /// Sequence number of the last event an L2 view was emitted for.
    pub last_output_seq: i64,
    /// Errors observed since the last successful rebuild; reset to zero
    /// whenever a rebuild is attempted, whatever its outcome.
    pub error_count: u32,
}

fn price_key(price: &str) -> Option<OrderedFloat<f64>> {
    price.parse::<f64>().ok().map(OrderedFloat)
}

impl Book {
    pub fn new(product_id: impl Into<String>) -> Book {
        Book {
            product_id: product_id.into(),
            bids: Side::new(),
            asks: Side::new(),
            curr_seq: 0,
            snapshot_seq: -1,
            last_output_seq: -1,
            error_count: 0,
        }
    }

    pub fn side(&self, side: BookSide) -> &Side {
        match side {
            BookSide::Bid => &self.bids,
            BookSide::Ask => &self.asks,
        }
    }

    pub fn side_mut(&mut self, side: BookSide) -> &mut Side {
        match side {
            BookSide::Bid => &mut self.bids,
            BookSide::Ask => &mut self.asks,
        }
    }

    /// `open`: appends a resting order at its price level, creating the
    /// level if this is the first order there.
    pub fn apply_open(&mut self, side: BookSide, price: &str, size: &str, order_id: &str) {
        let Some(key) = price_key(price) else {
            return;
        };
        self.side_mut(side).entry(key).or_default().push(Order {
            price: price.to_string(),
            size: size.to_string(),
            order_id: order_id.to_string(),
        });
    }

    /// `match`: decrements the resting order's size by the traded size,
    /// clamped at zero. A trade larger than the resting size is a
    /// warning, not an error; the source clamps rather than rejects.
    /// Returns `Err` if the order can't be found, which the caller
    /// reports as `BOOK_INCONSISTENT`.
    pub fn apply_match(
        &mut self,
        side: BookSide,
        price: &str,
        order_id: &str,
        trade_size: &str,
    ) -> Result<bool, BookError> {
        let key = price_key(price).ok_or_else(|| BookError::MatchNotOnBook {
            price: price.to_string(),
            order_id: order_id.to_string(),
        })?;
        let trade_size: Decimal = trade_size.parse().map_err(|_| BookError::MatchNotOnBook {
            price: price.to_string(),
            order_id: order_id.to_string(),
        })?;
        let level = self
            .side_mut(side)
            .get_mut(&key)
            .ok_or_else(|| BookError::MatchNotOnBook {
                price: price.to_string(),
                order_id: order_id.to_string(),
            })?;
        let order = level
            .iter_mut()
            .find(|o| o.order_id == order_id)
            .ok_or_else(|| BookError::MatchNotOnBook {
                price: price.to_string(),
                order_id: order_id.to_string(),
            })?;
        let current: Decimal = order.size.parse().map_err(|_| BookError::MatchNotOnBook {
            price: price.to_string(),
            order_id: order_id.to_string(),
        })?;
        let new_size = current - trade_size;
        let oversized = new_size < Decimal::ZERO;
        if oversized {
            warn!(
                product_id = %self.product_id,
                %order_id,
                %price,
                "match size larger than resting order size"
            );
        }
        order.size = new_size.max(Decimal::ZERO).to_string();
        Ok(oversized)
    }

    /// `done`: removes the resting order. `canceled` always requires the
    /// order to be present (absence is `BOOK_INCONSISTENT`); `filled`
    /// only attempts removal if the price level exists at all, and is a
    /// silent no-op otherwise (the source's `orders is not None` guard).
    pub fn apply_cancel(
        &mut self,
        side: BookSide,
        price: &str,
        order_id: &str,
    ) -> Result<(), BookError> {
        let key = price_key(price).ok_or_else(|| BookError::DoneNotOnBook {
            price: price.to_string(),
            order_id: order_id.to_string(),
        })?;
        self.remove_order(side, key, price, order_id)
    }

    /// `done` with `reason == filled`. Returns `Ok(true)` if the level
    /// existed (and the removal was attempted, possibly erroring if the
    /// specific order wasn't in it), `Ok(false)` if there was no level
    /// at that price at all (silent no-op, matches the source).
    pub fn apply_fill(
        &mut self,
        side: BookSide,
        price: &str,
        order_id: &str,
    ) -> Result<bool, BookError> {
        let Some(key) = price_key(price) else {
            return Ok(false);
        };
        if !self.side(side).contains_key(&key) {
            return Ok(false);
        }
        self.remove_order(side, key, price, order_id)?;
        Ok(true)
    }

    fn remove_order(
        &mut self,
        side: BookSide,
        key: OrderedFloat<f64>,
        price: &str,
        order_id: &str,
    ) -> Result<(), BookError> {
        let orders = self
            .side_mut(side)
            .get_mut(&key)
            .ok_or_else(|| BookError::DoneNotOnBook {
                price: price.to_string(),
                order_id: order_id.to_string(),
            })?;
        let index = orders
            .iter()
            .position(|o| o.order_id == order_id)
            .ok_or_else(|| BookError::DoneNotOnBook {
                price: price.to_string(),
                order_id: order_id.to_string(),
            })?;
        orders.remove(index);
        if orders.is_empty() {
            self.side_mut(side).remove(&key);
        }
        Ok(())
    }

    /// Replaces both sides atomically from a snapshot, requiring a
    /// strictly-increasing snapshot sequence (I5). Malformed individual
    /// entries are warned about and skipped rather than failing the
    /// whole rebuild.
    pub fn rebuild_from_snapshot(
        &mut self,
        snapshot_seq: i64,
        bids: Option<&[Vec<String>]>,
        asks: Option<&[Vec<String>]>,
    ) -> Result<(), BookError> {
        if snapshot_seq <= self.snapshot_seq {
            return Err(BookError::SnapshotStale {
                snapshot_seq,
                current: self.snapshot_seq,
            });
        }
        let mut new_bids = Side::new();
        let mut new_asks = Side::new();
        load_side(&self.product_id, "bids", snapshot_seq, bids, &mut new_bids);
        load_side(&self.product_id, "asks", snapshot_seq, asks, &mut new_asks);
        self.bids = new_bids;
        self.asks = new_asks;
        self.curr_seq = snapshot_seq;
        self.snapshot_seq = snapshot_seq;
        Ok(())
    }
}

fn load_side(
    product_id: &str,
    side_name: &str,
    snapshot_seq: i64,
    entries: Option<&[Vec<String>]>,
    into: &mut Side,
) {
    match entries {
        None => {
            warn!(%product_id, snapshot_seq, side_name, "snapshot has no orders for side");
        }
        Some(entries) => {
            for (index, entry) in entries.iter().enumerate() {
                if entry.len() != 3 {
                    warn!(%product_id, snapshot_seq, side_name, index, "snapshot order entry is malformed");
                    continue;
                }
                let Some(key) = price_key(&entry[0]) else {
                    warn!(%product_id, snapshot_seq, side_name, index, "snapshot order price is not numeric");
                    continue;
                };
                into.entry(key).or_default().push(Order {
                    price: entry[0].clone(),
                    size: entry[1].clone(),
                    order_id: entry[2].clone(),
                });
            }
        }
    }
}
