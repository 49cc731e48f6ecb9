//! Per-product order book engine (C3): the consume loop that turns
//! dispatched events into book mutations and, when warranted, an L2
//! view pushed to the output writer.

use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::book::{Book, BookError};
use crate::dispatcher::{PipelineMessage, PipelineState, PipelineStateCell};
use crate::error::ErrorKind;
use crate::formatter::{format, should_output, L2View};
use crate::metrics::ProductMetrics;
use crate::model::{should_process, DoneReason, ParsedEvent, RawEvent};
use crate::snapshot::SnapshotClient;

use std::sync::Arc;

pub struct EngineConfig {
    pub num_output_levels: usize,
    pub error_threshold: u32,
}

/// Drives one product's book to completion: startup rebuild, then the
/// event-by-event consume loop, until the pipeline is closed or the
/// feed stops sending.
pub struct OrderBookEngine {
    book: Book,
    config: EngineConfig,
    state: Arc<PipelineStateCell>,
    inbox: mpsc::Receiver<PipelineMessage>,
    outbox: mpsc::Sender<L2View>,
    snapshot_client: Arc<SnapshotClient>,
    metrics: ProductMetrics,
}

impl OrderBookEngine {
    pub fn new(
        product_id: impl Into<String>,
        config: EngineConfig,
        state: Arc<PipelineStateCell>,
        inbox: mpsc::Receiver<PipelineMessage>,
        outbox: mpsc::Sender<L2View>,
        snapshot_client: Arc<SnapshotClient>,
        metrics: ProductMetrics,
    ) -> OrderBookEngine {
        OrderBookEngine {
            book: Book::new(product_id),
            config,
            state,
            inbox,
            outbox,
            snapshot_client,
            metrics,
        }
    }

    /// Waits for the dispatcher's `Started` sentinel, rebuilds from a
    /// snapshot, and runs the consume loop. A snapshot failure at
    /// startup is fatal for this pipeline: the dispatcher is told to
    /// stop sending and the task returns.
    pub async fn run(mut self) {
        match self.inbox.recv().await {
            Some(PipelineMessage::Started) => {}
            Some(PipelineMessage::ClosingPipe) | None => return,
            Some(PipelineMessage::Event(_)) => {
                warn!(product_id = %self.book.product_id, "event arrived before start sentinel, dropping");
            }
        }

        if let Err(err) = self.rebuild().await {
            error!(product_id = %self.book.product_id, %err, "unable to get snapshot, closing feed for product");
            self.metrics.record_error(ErrorKind::SnapshotUnavailable);
            self.state.set(PipelineState::StopSending);
            return;
        }

        self.consume().await;
    }

    async fn consume(&mut self) {
        loop {
            let message = match self.inbox.recv().await {
                Some(message) => message,
                None => break,
            };
            let event = match message {
                PipelineMessage::ClosingPipe => break,
                PipelineMessage::Started => continue,
                PipelineMessage::Event(event) => event,
            };

            let raw: RawEvent = match serde_json::from_value(event) {
                Ok(raw) => raw,
                Err(err) => {
                    warn!(product_id = %self.book.product_id, %err, "event did not match the expected shape");
                    self.record_error(ErrorKind::EventFormat);
                    self.maybe_rebuild().await;
                    continue;
                }
            };

            self.metrics.record_processed();
            match self.process_event(&raw) {
                Ok(true) => {
                    if self.should_emit(&raw) {
                        self.book.last_output_seq = self.book.curr_seq;
                        let view = format(&self.book, self.config.num_output_levels);
                        let _ = self.outbox.send(view).await;
                    }
                }
                Ok(false) => {}
                Err(kind) => {
                    self.record_error(kind);
                }
            }

            self.maybe_rebuild().await;
        }
    }

    /// Validates sequencing and format, then applies the parsed event.
    /// Returns `Ok(true)` if the book was mutated by an event that is
    /// potentially output-worthy, `Ok(false)` for a no-op (stale
    /// sequence, ineligible type, or silently-unhandled shape), and
    /// `Err` for a classified failure.
    fn process_event(&mut self, raw: &RawEvent) -> Result<bool, ErrorKind> {
        if !self.is_valid_sequence(raw)? {
            return Ok(false);
        }

        let eligible = match should_process(raw) {
            Ok(eligible) => eligible,
            Err(errors) => {
                warn!(product_id = %self.book.product_id, ?errors, "event failed format validation");
                return Err(ErrorKind::EventFormat);
            }
        };
        if !eligible {
            return Ok(false);
        }

        match ParsedEvent::from_raw(raw) {
            ParsedEvent::Open {
                side,
                price,
                size,
                order_id,
            } => {
                self.book.apply_open(side, &price, &size, &order_id);
                Ok(true)
            }
            ParsedEvent::Match {
                side,
                price,
                maker_order_id,
                size,
            } => match self.book.apply_match(side, &price, &maker_order_id, &size) {
                Ok(_) => Ok(true),
                Err(BookError::MatchNotOnBook { .. }) => Err(ErrorKind::BookInconsistent),
                Err(other) => {
                    error!(product_id = %self.book.product_id, %other, "unexpected book error applying match");
                    Err(ErrorKind::BookInconsistent)
                }
            },
            ParsedEvent::Done {
                side,
                price,
                order_id,
                reason,
            } => match reason {
                Some(DoneReason::Canceled) => match self.book.apply_cancel(side, &price, &order_id) {
                    Ok(()) => Ok(true),
                    Err(_) => Err(ErrorKind::BookInconsistent),
                },
                Some(DoneReason::Filled) => match self.book.apply_fill(side, &price, &order_id) {
                    Ok(existed) => Ok(existed),
                    Err(_) => Err(ErrorKind::BookInconsistent),
                },
                None => Ok(false),
            },
            ParsedEvent::Unhandled => Ok(false),
        }
    }

    /// Sequence gate (I3): events at or below the current sequence are
    /// stale and silently dropped. A gap ahead of the current sequence
    /// is a warning, not a rejection; the event is still applied.
    fn is_valid_sequence(&mut self, raw: &RawEvent) -> Result<bool, ErrorKind> {
        let Some(seq) = crate::model::value_to_sequence(raw.sequence.as_ref()) else {
            return Err(ErrorKind::EventMalformed);
        };
        if seq <= self.book.curr_seq {
            return Ok(false);
        }
        if self.book.curr_seq + 1 < seq {
            warn!(
                product_id = %self.book.product_id,
                current = self.book.curr_seq,
                event_seq = seq,
                "jump in sequence number"
            );
            self.record_error(ErrorKind::SequenceGap);
        }
        self.book.curr_seq = seq;
        Ok(true)
    }

    fn should_emit(&self, raw: &RawEvent) -> bool {
        let Some(side) = raw.book_side() else {
            return false;
        };
        let Some(price) = crate::model::value_to_string(raw.price.as_ref()) else {
            return false;
        };
        should_output(&self.book, side, &price, self.config.num_output_levels)
            && self.book.last_output_seq < self.book.curr_seq
    }

    fn record_error(&mut self, kind: ErrorKind) {
        self.book.error_count += 1;
        self.metrics.record_error(kind);
    }

    /// Rebuilds once `error_count` exceeds the threshold, resetting the
    /// counter regardless of outcome so a persistently failing snapshot
    /// endpoint doesn't trigger a rebuild attempt on every single event.
    async fn maybe_rebuild(&mut self) {
        if self.book.error_count <= self.config.error_threshold {
            return;
        }
        if let Err(err) = self.rebuild().await {
            error!(product_id = %self.book.product_id, %err, "unable to get snapshot during threshold rebuild");
            self.metrics.record_error(ErrorKind::SnapshotUnavailable);
        }
        self.book.error_count = 0;
    }

    async fn rebuild(&mut self) -> Result<(), crate::snapshot::SnapshotError> {
        let snapshot = self
            .snapshot_client
            .get_orderbook_snapshot(&self.book.product_id)
            .await?;
        self.metrics.record_rebuild();
        if let Err(err) = self.book.rebuild_from_snapshot(
            snapshot.sequence,
            snapshot.bids.as_deref(),
            snapshot.asks.as_deref(),
        ) {
            warn!(product_id = %self.book.product_id, %err, "snapshot rejected as stale");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn test_engine() -> (OrderBookEngine, mpsc::Receiver<L2View>) {
        let (_inbox_tx, inbox_rx) = mpsc::channel(16);
        let (outbox_tx, outbox_rx) = mpsc::channel(16);
        let engine = OrderBookEngine::new(
            "BTC-USD",
            EngineConfig {
                num_output_levels: 10,
                error_threshold: 10,
            },
            Arc::new(PipelineStateCell::new(PipelineState::Started)),
            inbox_rx,
            outbox_tx,
            Arc::new(SnapshotClient::new(
                "https://example.invalid/{}/book",
                1,
                Duration::from_secs(1),
            )),
            ProductMetrics::new("BTC-USD"),
        );
        (engine, outbox_rx)
    }

    fn open_event(seq: i64, side: &str, price: &str, size: &str, order_id: &str) -> RawEvent {
        serde_json::from_value(json!({
            "type": "open",
            "sequence": seq,
            "side": side,
            "price": price,
            "remaining_size": size,
            "order_id": order_id,
            "product_id": "BTC-USD",
        }))
        .unwrap()
    }

    #[test]
    fn stale_sequence_is_silently_dropped() {
        let (mut engine, _rx) = test_engine();
        engine.book.curr_seq = 5;
        let event = open_event(3, "buy", "100.0", "1.0", "o1");
        assert_eq!(engine.process_event(&event), Ok(false));
    }

    #[test]
    fn sequence_gap_is_still_applied() {
        let (mut engine, _rx) = test_engine();
        engine.book.curr_seq = 5;
        let event = open_event(10, "buy", "100.0", "1.0", "o1");
        assert_eq!(engine.process_event(&event), Ok(true));
        assert_eq!(engine.book.curr_seq, 10);
    }

    #[test]
    fn sequence_gap_increments_error_count() {
        let (mut engine, _rx) = test_engine();
        engine.book.curr_seq = 0;
        let event = open_event(2, "buy", "100.0", "1.0", "o1");
        assert_eq!(engine.process_event(&event), Ok(true));
        assert_eq!(engine.book.curr_seq, 2);
        assert_eq!(engine.book.error_count, 1);
    }

    #[test]
    fn open_then_match_then_done_round_trip() {
        let (mut engine, _rx) = test_engine();
        let open = open_event(1, "buy", "100.0", "2.0", "o1");
        assert_eq!(engine.process_event(&open), Ok(true));

        let matched: RawEvent = serde_json::from_value(json!({
            "type": "match",
            "sequence": 2,
            "side": "buy",
            "price": "100.0",
            "size": "1.0",
            "maker_order_id": "o1",
            "product_id": "BTC-USD",
        }))
        .unwrap();
        assert_eq!(engine.process_event(&matched), Ok(true));
        assert_eq!(engine.book.bids.values().next().unwrap()[0].size, "1.0");

        let done: RawEvent = serde_json::from_value(json!({
            "type": "done",
            "sequence": 3,
            "side": "buy",
            "price": "100.0",
            "order_id": "o1",
            "reason": "canceled",
            "product_id": "BTC-USD",
        }))
        .unwrap();
        assert_eq!(engine.process_event(&done), Ok(true));
        assert!(engine.book.bids.is_empty());
    }

    #[test]
    fn done_unknown_order_is_book_inconsistent() {
        let (mut engine, _rx) = test_engine();
        let done: RawEvent = serde_json::from_value(json!({
            "type": "done",
            "sequence": 1,
            "side": "buy",
            "price": "100.0",
            "order_id": "ghost",
            "reason": "canceled",
            "product_id": "BTC-USD",
        }))
        .unwrap();
        assert_eq!(engine.process_event(&done), Err(ErrorKind::BookInconsistent));
    }

    #[test]
    fn match_larger_than_resting_size_clamps_at_zero() {
        let (mut engine, _rx) = test_engine();
        let open = open_event(1, "sell", "100.0", "1.0", "o1");
        engine.process_event(&open).unwrap();

        let matched: RawEvent = serde_json::from_value(json!({
            "type": "match",
            "sequence": 2,
            "side": "sell",
            "price": "100.0",
            "size": "5.0",
            "maker_order_id": "o1",
            "product_id": "BTC-USD",
        }))
        .unwrap();
        assert_eq!(engine.process_event(&matched), Ok(true));
        assert_eq!(engine.book.asks.values().next().unwrap()[0].size, "0");
    }
}
