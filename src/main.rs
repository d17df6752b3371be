// Main entry point - Dependency injection, pipeline and server setup
mod domain;
mod application;
mod infrastructure;
mod presentation;

use std::sync::Arc;
use axum::{routing::{delete, get, post, put}, Router};
use tokio::sync::{broadcast, mpsc};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::application::activity_aggregator::ActivityAggregator;
use crate::application::clock::{Clock, SystemClock};
use crate::application::frame_decoder::FrameDecoder;
use crate::application::motion_analyzer::MotionAnalyzer;
use crate::application::pipeline::{Pipeline, PipelineCommand, PipelineExit};
use crate::application::report_store::ReportStore;
use crate::domain::event::ConnectionState;
use crate::infrastructure::config::{load_app_config, StoreKind};
use crate::infrastructure::influx_store::InfluxReportStore;
use crate::infrastructure::memory_store::MemoryReportStore;
use crate::infrastructure::transport;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    activity, buckets, delete_all_reports, delete_report, health_check, history, latest_frames,
    reports, reset_totals, set_body_weight, stream_events,
};
use crate::presentation::live_view::LiveView;

const EVENT_CHANNEL_CAPACITY: usize = 256;
const COMMAND_CHANNEL_CAPACITY: usize = 16;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let app_config = load_app_config()?;

    // Initialize tracing; RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&app_config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Create store (infrastructure layer)
    let store: Arc<dyn ReportStore> = match (app_config.store.kind, app_config.store.influx.clone()) {
        (StoreKind::Influx, Some(influx)) => {
            tracing::info!("Using InfluxDB report store at {}", influx.host);
            Arc::new(InfluxReportStore::new(influx))
        }
        _ => {
            tracing::info!("Using in-memory report store");
            Arc::new(MemoryReportStore::new())
        }
    };

    // Create pipeline components (application layer)
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let aggregator = Arc::new(ActivityAggregator::new(store, clock.clone()));
    if let Err(e) = aggregator.restore().await {
        tracing::warn!("Starting with empty buckets, restore failed: {}", e);
    }

    let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    let (commands, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);

    let live = Arc::new(LiveView::new());
    let mut live_rx = events.subscribe();
    let live_updater = live.clone();
    tokio::spawn(async move {
        loop {
            match live_rx.recv().await {
                Ok(event) => live_updater.observe(&event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!("Live view skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Create application state
    let state = Arc::new(AppState {
        aggregator: aggregator.clone(),
        live,
        events: events.clone(),
        commands: commands.clone(),
    });

    // Build router (presentation layer)
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/activity", get(activity))
        .route("/frames/latest", get(latest_frames))
        .route("/buckets/:kind", get(buckets))
        .route("/reports", get(reports).delete(delete_all_reports))
        .route("/reports/:id", delete(delete_report))
        .route("/history/:kind", get(history))
        .route("/settings/body-weight", put(set_body_weight))
        .route("/totals/reset", post(reset_totals))
        .route("/events", get(stream_events))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr = app_config.http.bind;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Starting retroband-telemetry service on {}", addr);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!("HTTP server stopped: {}", e);
        }
    });

    // Ctrl-C stops the pipeline, which flushes open buckets on its way out
    let shutdown = commands.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown.send(PipelineCommand::Shutdown).await;
        }
    });

    let mut pipeline = Pipeline::new(
        FrameDecoder::new(clock.clone()),
        MotionAnalyzer::new(app_config.analysis.clone(), clock),
        aggregator.clone(),
        events,
    );

    pipeline.connection_changed(ConnectionState::Connecting);
    let source = match transport::open(&app_config.transport).await {
        Ok(source) => source,
        Err(e) => {
            pipeline.connection_changed(ConnectionState::Disconnected);
            aggregator.flush_all().await;
            return Err(e);
        }
    };
    pipeline.connection_changed(ConnectionState::Connected);

    if pipeline.run(source, command_rx).await == PipelineExit::SourceClosed {
        tracing::info!("Wristband stream ended, serving stored reports until interrupted");
        tokio::signal::ctrl_c().await?;
    }

    tracing::info!("Shutting down");
    Ok(())
}
