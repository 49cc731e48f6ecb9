//! REST snapshot loader (C4): fetches a full L3 book snapshot used for
//! startup seeding and for rebuilds once a pipeline's `error_count`
//! exceeds its threshold.

use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

/// The REST book snapshot shape. Each side is `None` when absent from
/// the response (warned about, not an error) and each entry is a raw
/// `[price, size, order_id]` triple so malformed entries can be
/// detected and skipped individually rather than failing the fetch.
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotResponse {
    pub sequence: i64,
    pub bids: Option<Vec<Vec<String>>>,
    pub asks: Option<Vec<Vec<String>>>,
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("snapshot endpoint returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("exhausted {attempts} attempts fetching snapshot for {product_id}")]
    RetriesExhausted { product_id: String, attempts: u32 },
}

/// Fetches book snapshots over HTTP, retrying transient failures with
/// capped exponential backoff up to a configured attempt count.
pub struct SnapshotClient {
    client: reqwest::Client,
    url_template: String,
    attempts: u32,
    timeout: Duration,
}

impl SnapshotClient {
    pub fn new(url_template: impl Into<String>, attempts: u32, timeout: Duration) -> SnapshotClient {
        SnapshotClient {
            client: reqwest::Client::new(),
            url_template: url_template.into(),
            attempts,
            timeout,
        }
    }

    fn url_for(&self, product_id: &str) -> String {
        self.url_template.replace("{}", product_id)
    }

    pub async fn get_orderbook_snapshot(
        &self,
        product_id: &str,
    ) -> Result<SnapshotResponse, SnapshotError> {
        let url = self.url_for(product_id);
        let max_attempts = self.attempts.max(1);

        let mut backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(250),
            max_interval: Duration::from_secs(10),
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        };

        for attempt in 1..=max_attempts {
            match fetch_once(&self.client, &url, self.timeout).await {
                Ok(snapshot) => return Ok(snapshot),
                Err(err) if attempt < max_attempts => {
                    let wait = backoff.next_backoff().unwrap_or(Duration::from_secs(1));
                    warn!(product_id, attempt, ?wait, error = %err, "retrying snapshot fetch");
                    tokio::time::sleep(wait).await;
                }
                Err(err) => {
                    warn!(product_id, attempt, error = %err, "snapshot fetch exhausted retries");
                }
            }
        }

        Err(SnapshotError::RetriesExhausted {
            product_id: product_id.to_string(),
            attempts: max_attempts,
        })
    }
}

async fn fetch_once(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<SnapshotResponse, SnapshotError> {
    let response = client.get(url).timeout(timeout).send().await?;
    if !response.status().is_success() {
        return Err(SnapshotError::Status(response.status()));
    }
    let snapshot = response.json::<SnapshotResponse>().await?;
    Ok(snapshot)
}
