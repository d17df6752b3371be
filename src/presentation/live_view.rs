// Latest pipeline output, kept for HTTP readers
use crate::domain::activity::ActivityReport;
use crate::domain::event::{ConnectionState, PipelineEvent};
use crate::domain::sample::ContentBuffer;
use parking_lot::RwLock;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct ActivitySnapshot {
    pub connection: ConnectionState,
    pub latest_report: Option<ActivityReport>,
}

#[derive(Debug)]
struct LiveState {
    connection: ConnectionState,
    latest_report: Option<ActivityReport>,
    latest_frames: Option<ContentBuffer>,
}

#[derive(Debug)]
pub struct LiveView {
    state: RwLock<LiveState>,
}

impl Default for LiveView {
    fn default() -> Self {
        Self {
            state: RwLock::new(LiveState {
                connection: ConnectionState::Disconnected,
                latest_report: None,
                latest_frames: None,
            }),
        }
    }
}

impl LiveView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&self, event: &PipelineEvent) {
        let mut state = self.state.write();
        match event {
            PipelineEvent::Connection(connection) => state.connection = *connection,
            PipelineEvent::Frames(buffer) => state.latest_frames = Some(buffer.clone()),
            PipelineEvent::Report(report) => state.latest_report = Some(report.clone()),
        }
    }

    pub fn activity(&self) -> ActivitySnapshot {
        let state = self.state.read();
        ActivitySnapshot {
            connection: state.connection,
            latest_report: state.latest_report.clone(),
        }
    }

    pub fn latest_frames(&self) -> Option<ContentBuffer> {
        self.state.read().latest_frames.clone()
    }
}
