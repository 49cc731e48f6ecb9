//! Output writer (C8): drains the shared L2 outbox and serializes each
//! view as one JSON line.

use std::path::PathBuf;

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::error;

use crate::formatter::L2View;

/// Where the writer sends formatted views. `File` appends.
#[derive(Debug, Clone)]
pub enum OutputSink {
    Stdout,
    File(PathBuf),
}

impl OutputSink {
    /// Parses the `output.sink` config value: `"stdout"` or
    /// `"file:<path>"`.
    pub fn parse(value: &str) -> OutputSink {
        match value.strip_prefix("file:") {
            Some(path) => OutputSink::File(PathBuf::from(path)),
            None => OutputSink::Stdout,
        }
    }
}

/// Drains `outbox` until the channel closes, writing one JSON line per
/// view. A write error is logged and the loop keeps consuming; a
/// stalled sink must not block the engines feeding this queue, beyond
/// whatever backpressure the bounded channel itself applies.
pub async fn run(mut outbox: mpsc::Receiver<L2View>, sink: OutputSink) {
    let mut file = match &sink {
        OutputSink::Stdout => None,
        OutputSink::File(path) => match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
        {
            Ok(file) => Some(file),
            Err(err) => {
                error!(%err, path = %path.display(), "unable to open output sink file");
                None
            }
        },
    };

    while let Some(view) = outbox.recv().await {
        let line = match serde_json::to_string(&view) {
            Ok(line) => line,
            Err(err) => {
                error!(%err, "failed to serialize L2 view");
                continue;
            }
        };
        match (&sink, file.as_mut()) {
            (OutputSink::Stdout, _) => println!("{line}"),
            (OutputSink::File(path), Some(handle)) => {
                if let Err(err) = handle.write_all(format!("{line}\n").as_bytes()).await {
                    error!(%err, path = %path.display(), "failed to write L2 view to sink");
                }
            }
            (OutputSink::File(_), None) => println!("{line}"),
        }
    }
}
