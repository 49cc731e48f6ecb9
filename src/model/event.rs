//! Dynamic event shape parsed at ingress.
//!
//! Events arrive as loosely-typed JSON objects. `RawEvent` captures the
//! wire fields without committing to any one event's required set;
//! `ParsedEvent` is the total sum type the engine actually switches on,
//! built only after the validator has confirmed the event is eligible
//! and well-formed.

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

/// Loosely-typed inbound event. Every field is optional because the
/// feed's wire shape varies by event type; presence/absence is exactly
/// what the validator inspects.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEvent {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub side: Option<String>,
    pub price: Option<Value>,
    pub size: Option<Value>,
    pub remaining_size: Option<Value>,
    pub order_id: Option<String>,
    pub maker_order_id: Option<String>,
    #[serde(default)]
    pub taker_order_id: Option<String>,
    pub reason: Option<String>,
    pub sequence: Option<Value>,
    pub product_id: Option<String>,
}

/// Book side an event applies to. `buy` maps to `Bid`, `sell` to `Ask`,
/// preserved from the source regardless of maker/taker terminology (see
/// the source-ambiguity note on match-side routing).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookSide {
    Bid,
    Ask,
}

impl RawEvent {
    pub fn book_side(&self) -> Option<BookSide> {
        match self.side.as_deref() {
            Some("buy") => Some(BookSide::Bid),
            Some("sell") => Some(BookSide::Ask),
            _ => None,
        }
    }

    /// The size field feeding `open`/book population: `remaining_size`
    /// falls back to `size`. Never mix the two fields.
    pub fn resolved_size(&self) -> Option<&Value> {
        self.remaining_size.as_ref().or(self.size.as_ref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoneReason {
    Canceled,
    Filled,
}

/// The event, fully classified. Built only for events that passed
/// `should_process` and `format_errors`.
///
/// `Unhandled` covers event types the book never mutates for (`change`)
/// and `done` events whose `reason` isn't `canceled`/`filled`, matching
/// the source's final `else: return False`, not an error.
#[derive(Debug, Clone)]
pub enum ParsedEvent {
    Open {
        side: BookSide,
        price: String,
        size: String,
        order_id: String,
    },
    Match {
        side: BookSide,
        price: String,
        maker_order_id: String,
        size: String,
    },
    Done {
        side: BookSide,
        price: String,
        order_id: String,
        reason: Option<DoneReason>,
    },
    Unhandled,
}

impl ParsedEvent {
    /// Build the sum type from a raw event that has already passed
    /// validation. Falls back to `Unhandled` for shapes the validator
    /// let through but that carry no defined mutation (`change`, and
    /// `done` with an unrecognized reason).
    pub fn from_raw(raw: &RawEvent) -> ParsedEvent {
        let Some(side) = raw.book_side() else {
            return ParsedEvent::Unhandled;
        };
        match raw.kind.as_deref() {
            Some("open") => {
                let (Some(price), Some(size), Some(order_id)) = (
                    value_to_string(raw.price.as_ref()),
                    value_to_string(raw.resolved_size()),
                    raw.order_id.clone(),
                ) else {
                    return ParsedEvent::Unhandled;
                };
                ParsedEvent::Open {
                    side,
                    price,
                    size,
                    order_id,
                }
            }
            Some("match") => {
                let (Some(price), Some(size), Some(maker_order_id)) = (
                    value_to_string(raw.price.as_ref()),
                    value_to_string(raw.size.as_ref()),
                    raw.maker_order_id.clone(),
                ) else {
                    return ParsedEvent::Unhandled;
                };
                ParsedEvent::Match {
                    side,
                    price,
                    maker_order_id,
                    size,
                }
            }
            Some("done") => {
                let (Some(price), Some(order_id)) =
                    (value_to_string(raw.price.as_ref()), raw.order_id.clone())
                else {
                    return ParsedEvent::Unhandled;
                };
                let reason = match raw.reason.as_deref() {
                    Some("canceled") => Some(DoneReason::Canceled),
                    Some("filled") => Some(DoneReason::Filled),
                    _ => None,
                };
                ParsedEvent::Done {
                    side,
                    price,
                    order_id,
                    reason,
                }
            }
            _ => ParsedEvent::Unhandled,
        }
    }
}

/// Renders a JSON string or number as its source string representation.
pub fn value_to_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parses a JSON string or number as a decimal, for numeric-format checks.
pub fn value_to_decimal(value: Option<&Value>) -> Option<Decimal> {
    value_to_string(value)?.parse::<Decimal>().ok()
}

/// Parses the `sequence` field strictly: present and an integer.
pub fn value_to_sequence(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse::<i64>().ok(),
        _ => None,
    }
}
