// HTTP request handlers
use crate::application::pipeline::PipelineCommand;
use crate::application::report_store::StoreError;
use crate::domain::report::{BucketKind, ReportQuery, ReportType, StoredReport};
use crate::domain::sample::ContentBuffer;
use crate::infrastructure::config::validate_body_weight;
use crate::presentation::app_state::AppState;
use crate::presentation::live_view::ActivitySnapshot;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json,
    },
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

#[derive(Debug, Deserialize)]
pub struct ReportsParams {
    #[serde(rename = "type")]
    pub report_type: String,
    pub year: i32,
    pub month: Option<u32>,
    pub day: Option<u32>,
    pub hour: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub year: i32,
    pub month: Option<u32>,
    pub day: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct BucketsResponse {
    pub kind: BucketKind,
    pub slots: Vec<i32>,
}

#[derive(Debug, Deserialize)]
pub struct BodyWeightRequest {
    pub body_weight_kg: f64,
}

fn store_status(e: StoreError) -> StatusCode {
    match e {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::Rejected(_) | StoreError::Backend(_) => {
            tracing::error!("Report store request failed: {}", e);
            StatusCode::BAD_GATEWAY
        }
    }
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// Latest report and link state
pub async fn activity(State(state): State<Arc<AppState>>) -> Json<ActivitySnapshot> {
    Json(state.live.activity())
}

/// Most recently sealed sample buffer
pub async fn latest_frames(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ContentBuffer>, StatusCode> {
    state.live.latest_frames().map(Json).ok_or(StatusCode::NOT_FOUND)
}

/// Live bucket array for one granularity
pub async fn buckets(
    Path(kind): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<BucketsResponse>, StatusCode> {
    let kind: BucketKind = kind.parse().map_err(|_| StatusCode::BAD_REQUEST)?;
    Ok(Json(BucketsResponse {
        kind,
        slots: state.aggregator.snapshot(kind),
    }))
}

/// Stored report rows
pub async fn reports(
    Query(params): Query<ReportsParams>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<StoredReport>>, StatusCode> {
    let report_type: ReportType = params
        .report_type
        .parse()
        .map_err(|_| StatusCode::BAD_REQUEST)?;
    let mut query = ReportQuery::new(report_type, params.year);
    if let Some(month) = params.month {
        query = query.month(month);
    }
    if let Some(day) = params.day {
        query = query.day(day);
    }
    if let Some(hour) = params.hour {
        query = query.hour(hour);
    }

    state
        .aggregator
        .reports(&query)
        .await
        .map(Json)
        .map_err(store_status)
}

/// Bucket array for a past period, rebuilt from stored rows
pub async fn history(
    Path(kind): Path<String>,
    Query(params): Query<HistoryParams>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<i32>>, StatusCode> {
    let report_type: ReportType = kind.parse().map_err(|_| StatusCode::BAD_REQUEST)?;
    state
        .aggregator
        .history(report_type, params.year, params.month, params.day)
        .await
        .map(Json)
        .map_err(store_status)
}

pub async fn delete_report(
    Path(id): Path<i64>,
    State(state): State<Arc<AppState>>,
) -> StatusCode {
    match state.aggregator.delete_report(id).await {
        Ok(()) => StatusCode::NO_CONTENT,
        Err(e) => store_status(e),
    }
}

pub async fn delete_all_reports(State(state): State<Arc<AppState>>) -> StatusCode {
    match state.aggregator.delete_all_reports().await {
        Ok(()) => StatusCode::NO_CONTENT,
        Err(e) => store_status(e),
    }
}

/// Validate and forward a body weight change to the pipeline
pub async fn set_body_weight(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BodyWeightRequest>,
) -> impl IntoResponse {
    if let Err(e) = validate_body_weight(request.body_weight_kg) {
        return (StatusCode::UNPROCESSABLE_ENTITY, e.to_string());
    }

    match state
        .commands
        .send(PipelineCommand::SetBodyWeight(request.body_weight_kg))
        .await
    {
        Ok(()) => (StatusCode::ACCEPTED, String::new()),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "pipeline is not running".to_string(),
        ),
    }
}

/// Zero the running step and calorie totals
pub async fn reset_totals(State(state): State<Arc<AppState>>) -> StatusCode {
    match state.commands.send(PipelineCommand::ResetTotals).await {
        Ok(()) => StatusCode::ACCEPTED,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Server-sent stream of pipeline events as JSON
pub async fn stream_events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.events.subscribe();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => match Event::default().json_data(&event) {
                    Ok(sse) => yield Ok::<Event, Infallible>(sse),
                    Err(e) => tracing::warn!("Failed to encode pipeline event: {}", e),
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event subscriber lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::activity_aggregator::ActivityAggregator;
    use crate::application::clock::ManualClock;
    use crate::domain::event::{ConnectionState, PipelineEvent};
    use crate::infrastructure::memory_store::MemoryReportStore;
    use crate::presentation::live_view::LiveView;
    use tokio::sync::{broadcast, mpsc};

    fn state() -> (Arc<AppState>, mpsc::Receiver<PipelineCommand>) {
        let clock = Arc::new(ManualClock::at(2024, 5, 1, 12, 0));
        let store = Arc::new(MemoryReportStore::new());
        let (events, _) = broadcast::channel(16);
        let (commands, rx) = mpsc::channel(4);
        let state = Arc::new(AppState {
            aggregator: Arc::new(ActivityAggregator::new(store, clock)),
            live: Arc::new(LiveView::new()),
            events,
            commands,
        });
        (state, rx)
    }

    #[tokio::test]
    async fn test_unknown_bucket_kind_is_bad_request() {
        let (state, _rx) = state();
        let result = buckets(Path("week".to_string()), State(state)).await;
        assert_eq!(result.err(), Some(StatusCode::BAD_REQUEST));
    }

    #[tokio::test]
    async fn test_buckets_returns_full_array() {
        let (state, _rx) = state();
        let Json(response) = buckets(Path("minute".to_string()), State(state)).await.unwrap();
        assert_eq!(response.kind, BucketKind::Minute);
        assert_eq!(response.slots.len(), 60);
    }

    #[tokio::test]
    async fn test_minute_history_is_rejected() {
        let (state, _rx) = state();
        let params = HistoryParams {
            year: 2024,
            month: None,
            day: None,
        };
        let result = history(Path("minute".to_string()), Query(params), State(state)).await;
        assert_eq!(result.err(), Some(StatusCode::BAD_REQUEST));
    }

    #[tokio::test]
    async fn test_body_weight_is_validated_before_forwarding() {
        let (state, mut rx) = state();

        let response = set_body_weight(
            State(state.clone()),
            Json(BodyWeightRequest {
                body_weight_kg: 1500.0,
            }),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(rx.try_recv().is_err());

        let response = set_body_weight(
            State(state),
            Json(BodyWeightRequest {
                body_weight_kg: 75.0,
            }),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(rx.try_recv().ok(), Some(PipelineCommand::SetBodyWeight(75.0)));
    }

    #[tokio::test]
    async fn test_delete_unknown_report_is_not_found() {
        let (state, _rx) = state();
        assert_eq!(delete_report(Path(42), State(state)).await, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_latest_frames_missing_until_observed() {
        let (state, _rx) = state();
        assert_eq!(
            latest_frames(State(state.clone())).await.err(),
            Some(StatusCode::NOT_FOUND)
        );

        state
            .live
            .observe(&PipelineEvent::Connection(ConnectionState::Connected));
        let Json(snapshot) = activity(State(state)).await;
        assert_eq!(snapshot.connection, ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_reset_totals_forwards_command() {
        let (state, mut rx) = state();
        assert_eq!(reset_totals(State(state.clone())).await, StatusCode::ACCEPTED);
        assert_eq!(rx.try_recv().ok(), Some(PipelineCommand::ResetTotals));

        drop(rx);
        assert_eq!(reset_totals(State(state)).await, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_reports_filters_by_hour() {
        let (state, _rx) = state();
        let params = ReportsParams {
            report_type: "hour".to_string(),
            year: 2024,
            month: Some(4),
            day: Some(0),
            hour: Some(12),
        };
        let Json(rows) = reports(Query(params), State(state.clone())).await.unwrap();
        assert!(rows.is_empty());

        let params = ReportsParams {
            report_type: "week".to_string(),
            year: 2024,
            month: None,
            day: None,
            hour: None,
        };
        assert_eq!(
            reports(Query(params), State(state)).await.err(),
            Some(StatusCode::BAD_REQUEST)
        );
    }
}
