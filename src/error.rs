//! Shared error taxonomy for the order book engine.
//!
//! One variant per row of the error-handling design: each is counted
//! against a product's `error_count` and logged at the severity the
//! component raising it decides, but the taxonomy itself lives in one
//! place so metrics and logging agree on names.

use std::fmt;

/// Coarse error classification used for metrics and rebuild bookkeeping.
///
/// This mirrors the component design's error table rather than any one
/// Rust error type: several concrete errors (`BookError`,
/// `SnapshotError`, ...) map onto the same `ErrorKind` when recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    EventFormat,
    EventMalformed,
    BookInconsistent,
    SnapshotStale,
    SnapshotUnavailable,
    DispatchUnknownProduct,
    SocketError,
    /// A sequence gap still applies the event (it is not dropped), but it
    /// counts toward `error_count` the same as a dropped/failed event, so
    /// it gets its own metrics bucket rather than folding into another
    /// kind's count.
    SequenceGap,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::EventFormat => "EVENT_FORMAT",
            ErrorKind::EventMalformed => "EVENT_MALFORMED",
            ErrorKind::BookInconsistent => "BOOK_INCONSISTENT",
            ErrorKind::SnapshotStale => "SNAPSHOT_STALE",
            ErrorKind::SnapshotUnavailable => "SNAPSHOT_UNAVAILABLE",
            ErrorKind::DispatchUnknownProduct => "DISPATCH_UNKNOWN_PRODUCT",
            ErrorKind::SocketError => "SOCKET_ERROR",
            ErrorKind::SequenceGap => "SEQUENCE_GAP",
        };
        f.write_str(label)
    }
}
