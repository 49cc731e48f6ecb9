//! Depth-limited L2 view emission (C5).

use serde::Serialize;

use crate::book::Book;
use crate::model::BookSide;

/// A flattened depth-limited view of one product's book: the top
/// `num_output_levels` on each side, each order rendered as its
/// original `[price, size, order_id]` triple.
#[derive(Debug, Clone, Serialize)]
pub struct L2View {
    pub product_id: String,
    pub sequence: i64,
    pub bids: Vec<[String; 3]>,
    pub asks: Vec<[String; 3]>,
}

/// Decides whether an event touching `side` at `price` could have
/// changed the visible top `num_output_levels`, so callers can skip
/// formatting (and emitting) a view when it couldn't possibly differ
/// from the last one. Bounds are checked defensively even though the
/// preceding length comparison makes out-of-range access unreachable in
/// practice.
pub fn should_output(book: &Book, side: BookSide, price: &str, num_output_levels: usize) -> bool {
    let Ok(price) = price.parse::<f64>() else {
        return false;
    };
    match side {
        BookSide::Ask => {
            let levels = book.asks.len();
            if levels < num_output_levels + 1 {
                return true;
            }
            match book.asks.keys().nth(num_output_levels) {
                Some(boundary) => price < boundary.0,
                None => false,
            }
        }
        BookSide::Bid => {
            let levels = book.bids.len();
            if levels < num_output_levels + 1 {
                return true;
            }
            match levels
                .checked_sub(num_output_levels + 1)
                .and_then(|idx| book.bids.keys().nth(idx))
            {
                Some(boundary) => price > boundary.0,
                None => false,
            }
        }
    }
}

/// Flattens the top `num_output_levels` of each side into an `L2View`.
/// Bids are walked from the highest price down (`BTreeMap` iterates
/// ascending, so bids are reversed); asks are walked from the lowest up.
pub fn format(book: &Book, num_output_levels: usize) -> L2View {
    let bids = book
        .bids
        .values()
        .rev()
        .take(num_output_levels)
        .flatten()
        .map(|order| [order.price.clone(), order.size.clone(), order.order_id.clone()])
        .collect();
    let asks = book
        .asks
        .values()
        .take(num_output_levels)
        .flatten()
        .map(|order| [order.price.clone(), order.size.clone(), order.order_id.clone()])
        .collect();
    L2View {
        product_id: book.product_id.clone(),
        sequence: book.curr_seq,
        bids,
        asks,
    }
}
