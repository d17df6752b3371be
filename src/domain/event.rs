// Pipeline event domain models
use super::activity::ActivityReport;
use super::sample::ContentBuffer;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
}

/// Everything the pipeline publishes to display subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum PipelineEvent {
    Connection(ConnectionState),
    Frames(ContentBuffer),
    Report(ActivityReport),
}
