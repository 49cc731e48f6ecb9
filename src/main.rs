use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use tokio::sync::mpsc;

use marketbook::cli::{Cli, Commands, ConfigAction};
use marketbook::config::Config;
use marketbook::dispatcher::{
    EventDispatcher, Pipeline, PipelineMessage, PipelineState, PipelineStateCell,
};
use marketbook::engine::{EngineConfig, OrderBookEngine};
use marketbook::metrics::ProductMetrics;
use marketbook::snapshot::SnapshotClient;
use marketbook::writer::{self, OutputSink};
use marketbook::{init_logging, AppResult};

#[tokio::main]
async fn main() -> AppResult<()> {
    let cli = Cli::parse_args();
    init_logging(&cli.effective_log_level())?;

    match cli.command_or_default() {
        Commands::Run => run(&cli.config_file).await,
        Commands::Config { action } => handle_config(action.as_ref(), &cli.config_file),
        Commands::ValidateConfig => validate_config(&cli.config_file),
    }
}

/// Wires C1-C11 together: one `OrderBookEngine` task per subscribed
/// product, one feed task performing the subscribe handshake and
/// dispatching decoded frames, and one output-writer task draining the
/// shared L2 outbox. Runs until ctrl-c or the feed task exits fatally.
async fn run(config_file: &str) -> AppResult<()> {
    let config = Config::load_from_file(config_file)?;
    tracing::info!(subscribed = ?config.products.subscribed, "starting order book engine");

    let snapshot_client = Arc::new(SnapshotClient::new(
        config.feed.snapshot_url_template.clone(),
        config.http.attempts,
        Duration::from_secs(config.http.timeout_seconds),
    ));

    let (outbox_tx, outbox_rx) = mpsc::channel(config.engine.inbox_capacity);
    let writer_task = tokio::spawn(writer::run(
        outbox_rx,
        OutputSink::parse(&config.output.sink),
    ));

    let mut pipelines = HashMap::new();
    let mut engine_tasks = Vec::new();
    let mut shutdown_senders = Vec::new();
    for product_id in &config.products.subscribed {
        let (inbox_tx, inbox_rx) = mpsc::channel(config.engine.inbox_capacity);
        shutdown_senders.push(inbox_tx.clone());
        let state = Arc::new(PipelineStateCell::new(PipelineState::NotStarted));
        pipelines.insert(
            product_id.clone(),
            Pipeline {
                state: state.clone(),
                sender: inbox_tx,
            },
        );

        let engine = OrderBookEngine::new(
            product_id.clone(),
            EngineConfig {
                num_output_levels: config.engine.num_output_levels,
                error_threshold: config.engine.error_threshold,
            },
            state,
            inbox_rx,
            outbox_tx.clone(),
            snapshot_client.clone(),
            ProductMetrics::new(product_id.clone()),
        );
        engine_tasks.push(tokio::spawn(engine.run()));
    }
    drop(outbox_tx);

    let dispatcher = Arc::new(EventDispatcher::new(pipelines));
    let feed_task = tokio::spawn(marketbook::feed::run(
        config.feed.ws_endpoint.clone(),
        config.products.subscribed.clone(),
        dispatcher,
        Duration::from_secs(config.feed.reconnect_deadline_seconds),
    ));
    let feed_abort = feed_task.abort_handle();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown requested");
            feed_abort.abort();
        }
        result = feed_task => {
            if let Ok(Err(err)) = result {
                tracing::error!(%err, "feed task exited fatally");
            }
        }
    }

    // Close each pipeline's inbox with the terminal sentinel and let the
    // engines drain queued events instead of cutting them off mid-book.
    for sender in shutdown_senders {
        let _ = sender.send(PipelineMessage::ClosingPipe).await;
    }
    for task in engine_tasks {
        let _ = task.await;
    }
    // All per-engine outbox senders are now dropped, so the writer's
    // recv() loop ends on its own once the queue drains.
    let _ = writer_task.await;
    Ok(())
}

fn validate_config(config_file: &str) -> AppResult<()> {
    match Config::load_from_file(config_file) {
        Ok(_) => {
            println!("{} {}", "valid:".green().bold(), config_file);
            Ok(())
        }
        Err(err) => {
            eprintln!("{} {err}", "invalid:".red().bold());
            std::process::exit(1);
        }
    }
}

fn handle_config(action: Option<&ConfigAction>, config_file: &str) -> AppResult<()> {
    match action {
        Some(ConfigAction::Show) => {
            let config = Config::load_or_default(config_file);
            println!("{} {}", "configuration from".bold(), config_file);
            config.display()?;
        }
        Some(ConfigAction::Reset) => {
            let default_config = Config::default();
            default_config.save_to_file(config_file)?;
            println!(
                "{} {}",
                "configuration reset and saved to".green(),
                config_file
            );
        }
        None => {
            println!("use 'marketbook config show' or 'marketbook config reset'");
        }
    }
    Ok(())
}
