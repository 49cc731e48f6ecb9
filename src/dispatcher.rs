//! Routes decoded feed frames to the per-product engine pipelines (C6).
//!
//! Each pipeline's state is shared between three writers: the
//! dispatcher (`NotStarted` -> `Started`), the engine itself on a fatal
//! snapshot failure (`Started` -> `StopSending`), and shutdown
//! (`-> ClosingPipe`). It's modeled as an atomic rather than guarded by
//! a lock any one of them would have to take to read.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PipelineState {
    NotStarted = 0,
    Started = 1,
    StopSending = 2,
    ClosingPipe = 3,
}

impl PipelineState {
    fn from_u8(value: u8) -> PipelineState {
        match value {
            0 => PipelineState::NotStarted,
            1 => PipelineState::Started,
            2 => PipelineState::StopSending,
            _ => PipelineState::ClosingPipe,
        }
    }
}

/// Atomic cell holding a `PipelineState`, shared across the dispatcher,
/// the owning engine task, and shutdown coordination.
#[derive(Debug, Default)]
pub struct PipelineStateCell(AtomicU8);

impl PipelineStateCell {
    pub fn new(state: PipelineState) -> PipelineStateCell {
        PipelineStateCell(AtomicU8::new(state as u8))
    }

    pub fn get(&self) -> PipelineState {
        PipelineState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub fn set(&self, state: PipelineState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }
}

impl Default for PipelineState {
    fn default() -> PipelineState {
        PipelineState::NotStarted
    }
}

/// A message on a per-product pipeline. `Started` is the sentinel the
/// dispatcher enqueues exactly once, before the first real event, so the
/// engine knows to run its startup snapshot rebuild before consuming.
#[derive(Debug, Clone)]
pub enum PipelineMessage {
    Started,
    Event(Value),
    ClosingPipe,
}

/// The dispatcher's handle to one product's engine task: its shared
/// state plus the channel feeding its inbox.
pub struct Pipeline {
    pub state: Arc<PipelineStateCell>,
    pub sender: mpsc::Sender<PipelineMessage>,
}

impl Pipeline {
    pub fn new(sender: mpsc::Sender<PipelineMessage>) -> Pipeline {
        Pipeline {
            state: Arc::new(PipelineStateCell::new(PipelineState::NotStarted)),
            sender,
        }
    }
}

/// Fans decoded feed frames out to the pipeline whose product_id they
/// carry, lazily transitioning each pipeline from `NotStarted` to
/// `Started` on its first frame.
pub struct EventDispatcher {
    pipelines: HashMap<String, Pipeline>,
}

impl EventDispatcher {
    pub fn new(pipelines: HashMap<String, Pipeline>) -> EventDispatcher {
        EventDispatcher { pipelines }
    }

    pub async fn dispatch(&self, event: Value) {
        let product_id = event.get("product_id").and_then(Value::as_str);
        let Some(pipeline) = product_id.and_then(|id| self.pipelines.get(id)) else {
            error!(?event, "no pipeline registered for product");
            return;
        };
        match pipeline.state.get() {
            PipelineState::NotStarted => {
                pipeline.state.set(PipelineState::Started);
                let _ = pipeline.sender.send(PipelineMessage::Started).await;
                let _ = pipeline.sender.send(PipelineMessage::Event(event)).await;
            }
            PipelineState::Started => {
                let _ = pipeline.sender.send(PipelineMessage::Event(event)).await;
            }
            PipelineState::StopSending | PipelineState::ClosingPipe => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dispatch_starts_pipeline_then_forwards_events() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut pipelines = HashMap::new();
        pipelines.insert("BTC-USD".to_string(), Pipeline::new(tx));
        let dispatcher = EventDispatcher::new(pipelines);

        dispatcher
            .dispatch(serde_json::json!({"product_id": "BTC-USD", "type": "open"}))
            .await;

        match rx.recv().await {
            Some(PipelineMessage::Started) => {}
            other => panic!("expected Started sentinel first, got {other:?}"),
        }
        match rx.recv().await {
            Some(PipelineMessage::Event(_)) => {}
            other => panic!("expected forwarded event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn dispatch_drops_events_for_unknown_product() {
        let dispatcher = EventDispatcher::new(HashMap::new());
        dispatcher
            .dispatch(serde_json::json!({"product_id": "UNKNOWN", "type": "open"}))
            .await;
    }

    #[tokio::test]
    async fn dispatch_stops_sending_once_stopped() {
        let (tx, mut rx) = mpsc::channel(8);
        let pipeline = Pipeline::new(tx);
        pipeline.state.set(PipelineState::StopSending);
        let mut pipelines = HashMap::new();
        pipelines.insert("BTC-USD".to_string(), pipeline);
        let dispatcher = EventDispatcher::new(pipelines);

        dispatcher
            .dispatch(serde_json::json!({"product_id": "BTC-USD", "type": "open"}))
            .await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn dispatch_drops_events_once_pipe_is_closing() {
        let (tx, mut rx) = mpsc::channel(8);
        let pipeline = Pipeline::new(tx);
        pipeline.state.set(PipelineState::ClosingPipe);
        let mut pipelines = HashMap::new();
        pipelines.insert("BTC-USD".to_string(), pipeline);
        let dispatcher = EventDispatcher::new(pipelines);

        dispatcher
            .dispatch(serde_json::json!({"product_id": "BTC-USD", "type": "open"}))
            .await;

        assert!(rx.try_recv().is_err());
    }
}
