//! Event eligibility and format checks (C1).
//!
//! Mirrors the source's two-stage gate: `should_process` first decides
//! whether an event is even a candidate for processing (unknown type,
//! `received`, or a `done` with no `price` are silently skipped), then
//! runs the full format check and turns any failure into an error the
//! caller surfaces as `EVENT_FORMAT`.

use super::event::{value_to_decimal, RawEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatError {
    SideInvalid,
    PriceNotNumeric,
    NegativePrice,
    SizeNotNumeric,
    NegativeSize,
    NoReason,
}

impl std::fmt::Display for FormatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            FormatError::SideInvalid => "event has side which is not buy/sell",
            FormatError::PriceNotNumeric => "price is not numeric",
            FormatError::NegativePrice => "price is negative",
            FormatError::SizeNotNumeric => "size is not numeric",
            FormatError::NegativeSize => "size is negative",
            FormatError::NoReason => "done event has no reason",
        };
        f.write_str(msg)
    }
}

/// Gates an event: `Ok(false)` means "skip silently, not an error"
/// (unknown/missing type, `received`, or `done` with no price). `Ok(true)`
/// means the event passed format validation and is ready for
/// `ParsedEvent::from_raw`. `Err(errors)` means the event is malformed
/// and should be counted as `EVENT_FORMAT`.
pub fn should_process(raw: &RawEvent) -> Result<bool, Vec<FormatError>> {
    match raw.kind.as_deref() {
        None => return Ok(false),
        Some("received") => return Ok(false),
        Some("done") if raw.price.is_none() => return Ok(false),
        _ => {}
    }
    let errors = format_errors(raw);
    if !errors.is_empty() {
        return Err(errors);
    }
    Ok(true)
}

/// Full field-format check, independent of `should_process`'s early-exit
/// gate, so tests can inspect exactly which checks fail.
pub fn format_errors(raw: &RawEvent) -> Vec<FormatError> {
    let mut errors = Vec::new();

    if raw.book_side().is_none() {
        errors.push(FormatError::SideInvalid);
    }

    match value_to_decimal(raw.price.as_ref()) {
        Some(price) if price.is_sign_negative() => errors.push(FormatError::NegativePrice),
        Some(_) => {}
        None => errors.push(FormatError::PriceNotNumeric),
    }

    match value_to_decimal(raw.resolved_size()) {
        Some(size) if size.is_sign_negative() => errors.push(FormatError::NegativeSize),
        Some(_) => {}
        None => errors.push(FormatError::SizeNotNumeric),
    }

    if raw.kind.as_deref() == Some("done") && raw.reason.is_none() {
        errors.push(FormatError::NoReason);
    }

    errors
}
