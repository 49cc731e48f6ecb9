//! Cross-product isolation: the dispatcher fans events out to
//! independent per-product engines, and one product's divergence can't
//! affect another's book.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use marketbook::dispatcher::{EventDispatcher, Pipeline, PipelineState, PipelineStateCell};
use marketbook::engine::{EngineConfig, OrderBookEngine};
use marketbook::formatter::L2View;
use marketbook::metrics::ProductMetrics;
use marketbook::snapshot::SnapshotClient;

#[tokio::test]
async fn two_products_are_driven_by_independent_engines() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sequence": 1,
            "bids": [],
            "asks": [],
        })))
        .mount(&server)
        .await;

    let snapshot_client = Arc::new(SnapshotClient::new(
        format!("{}/products/{{}}/book?level=3", server.uri()),
        3,
        Duration::from_secs(5),
    ));

    let (outbox_tx, mut outbox_rx) = mpsc::channel::<L2View>(32);
    let mut pipelines = HashMap::new();

    for product_id in ["BTC-USD", "ETH-USD"] {
        let (inbox_tx, inbox_rx) = mpsc::channel(32);
        let state = Arc::new(PipelineStateCell::new(PipelineState::NotStarted));
        pipelines.insert(
            product_id.to_string(),
            Pipeline {
                state: state.clone(),
                sender: inbox_tx,
            },
        );
        let engine = OrderBookEngine::new(
            product_id,
            EngineConfig {
                num_output_levels: 10,
                error_threshold: 10,
            },
            state,
            inbox_rx,
            outbox_tx.clone(),
            snapshot_client.clone(),
            ProductMetrics::new(product_id),
        );
        tokio::spawn(engine.run());
    }
    drop(outbox_tx);

    let dispatcher = EventDispatcher::new(pipelines);

    // BTC-USD gets a format error (bad side) and should not affect
    // ETH-USD, which gets a clean open.
    dispatcher
        .dispatch(json!({
            "type": "open",
            "sequence": 1,
            "side": "sideways",
            "price": "100.0",
            "remaining_size": "1.0",
            "order_id": "bad",
            "product_id": "BTC-USD",
        }))
        .await;
    dispatcher
        .dispatch(json!({
            "type": "open",
            "sequence": 1,
            "side": "buy",
            "price": "200.0",
            "remaining_size": "1.0",
            "order_id": "good",
            "product_id": "ETH-USD",
        }))
        .await;

    let view = outbox_rx.recv().await.expect("ETH-USD should have emitted");
    assert_eq!(view.product_id, "ETH-USD");
    assert_eq!(view.bids[0][2], "good");
}

#[tokio::test]
async fn dispatcher_drops_events_for_products_with_no_pipeline() {
    let dispatcher = EventDispatcher::new(HashMap::new());
    dispatcher
        .dispatch(json!({"type": "open", "product_id": "UNKNOWN-USD"}))
        .await;
    // No panic, no pipeline to route to: this is the whole assertion.
}
