// Application state for HTTP handlers
use crate::application::activity_aggregator::ActivityAggregator;
use crate::application::pipeline::PipelineCommand;
use crate::domain::event::PipelineEvent;
use crate::presentation::live_view::LiveView;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<ActivityAggregator>,
    pub live: Arc<LiveView>,
    pub events: broadcast::Sender<PipelineEvent>,
    pub commands: mpsc::Sender<PipelineCommand>,
}
