//! Per-product metrics (C11): running counters exposed through a plain
//! snapshot struct, logged periodically at DEBUG. No external sink,
//! this crate doesn't ship a Prometheus/StatsD exporter.

use std::collections::HashMap;

use crate::error::ErrorKind;

/// Running counters for one product's engine task.
pub struct ProductMetrics {
    product_id: String,
    events_processed: u64,
    errors_by_kind: HashMap<ErrorKind, u64>,
    rebuild_count: u64,
}

#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub product_id: String,
    pub events_processed: u64,
    pub errors_by_kind: HashMap<ErrorKind, u64>,
    pub rebuild_count: u64,
}

impl ProductMetrics {
    pub fn new(product_id: impl Into<String>) -> ProductMetrics {
        ProductMetrics {
            product_id: product_id.into(),
            events_processed: 0,
            errors_by_kind: HashMap::new(),
            rebuild_count: 0,
        }
    }

    pub fn record_processed(&mut self) {
        self.events_processed += 1;
    }

    pub fn record_error(&mut self, kind: ErrorKind) {
        *self.errors_by_kind.entry(kind).or_insert(0) += 1;
    }

    pub fn record_rebuild(&mut self) {
        self.rebuild_count += 1;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            product_id: self.product_id.clone(),
            events_processed: self.events_processed,
            errors_by_kind: self.errors_by_kind.clone(),
            rebuild_count: self.rebuild_count,
        }
    }
}
