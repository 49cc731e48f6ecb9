//! Sequence-ordered limit order book engine.
//!
//! Maintains one live L2/L3-derived book per subscribed trading pair by
//! consuming a streaming full-depth market data feed, reseeding from
//! REST snapshots on divergence, and emitting depth-limited L2 views.

pub mod book;
pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod feed;
pub mod formatter;
pub mod metrics;
pub mod model;
pub mod snapshot;
pub mod writer;

use anyhow::Result;

pub type AppResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Initializes the `tracing` subscriber used by every binary entry
/// point, honoring `RUST_LOG` if set and falling back to `level`
/// scoped to this crate.
pub fn init_logging(level: &str) -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("marketbook={}", level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}
