// Pipeline driver - Transport bytes in, frames and activity reports out
use crate::application::activity_aggregator::ActivityAggregator;
use crate::application::frame_decoder::FrameDecoder;
use crate::application::motion_analyzer::MotionAnalyzer;
use crate::domain::activity::ActivityReport;
use crate::domain::event::{ConnectionState, PipelineEvent};
use crate::domain::sample::ContentBuffer;
use bytes::BytesMut;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;

const READ_CHUNK: usize = 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineCommand {
    SetBodyWeight(f64),
    ResetTotals,
    Shutdown,
}

/// Why `Pipeline::run` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineExit {
    Shutdown,
    SourceClosed,
}

/// Single writer for the decoder, analyzer and aggregator.
///
/// Sealed buffers are cached between cadence ticks; each tick analyses the
/// cache and clears it.
pub struct Pipeline {
    decoder: FrameDecoder,
    analyzer: MotionAnalyzer,
    aggregator: Arc<ActivityAggregator>,
    events: broadcast::Sender<PipelineEvent>,
    pending: Vec<ContentBuffer>,
}

impl Pipeline {
    pub fn new(
        decoder: FrameDecoder,
        analyzer: MotionAnalyzer,
        aggregator: Arc<ActivityAggregator>,
        events: broadcast::Sender<PipelineEvent>,
    ) -> Self {
        Self {
            decoder,
            analyzer,
            aggregator,
            events,
            pending: Vec::new(),
        }
    }

    /// Decode a chunk from the transport, publishing every buffer it seals.
    pub fn ingest(&mut self, bytes: &[u8]) {
        self.decoder.feed(bytes);
        while let Some(buffer) = self.decoder.take_ready() {
            self.publish(PipelineEvent::Frames(buffer.clone()));
            self.pending.push(buffer);
        }
    }

    /// Analyse the cached buffers and hand any report to the aggregator.
    pub async fn tick(&mut self) -> Option<ActivityReport> {
        let report = self.analyzer.analyze(&self.pending);
        self.pending.clear();

        let report = report?;
        self.aggregator.record(&report).await;
        self.publish(PipelineEvent::Report(report.clone()));
        Some(report)
    }

    pub fn connection_changed(&mut self, state: ConnectionState) {
        tracing::info!("Wristband connection {:?}", state);
        if state == ConnectionState::Disconnected {
            self.decoder.reset();
        }
        self.publish(PipelineEvent::Connection(state));
    }

    #[cfg(test)]
    pub fn analyzer(&self) -> &MotionAnalyzer {
        &self.analyzer
    }

    #[cfg(test)]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Drive the pipeline until the source closes or `Shutdown` arrives.
    ///
    /// Either way the cached buffers get a last analysis and the open buckets
    /// are flushed before returning.
    pub async fn run<R>(
        &mut self,
        mut source: R,
        mut commands: mpsc::Receiver<PipelineCommand>,
    ) -> PipelineExit
    where
        R: AsyncRead + Unpin,
    {
        let window = Duration::from_millis(self.analyzer.settings().window_duration_ms);
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + window, window);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut buf = BytesMut::with_capacity(READ_CHUNK);
        let mut commands_open = true;

        let exit = loop {
            tokio::select! {
                read = source.read_buf(&mut buf) => match read {
                    Ok(0) => {
                        tracing::info!("Wristband stream closed");
                        break PipelineExit::SourceClosed;
                    }
                    Ok(_) => {
                        self.ingest(&buf);
                        buf.clear();
                    }
                    Err(e) => {
                        tracing::warn!("Wristband read failed: {}", e);
                        break PipelineExit::SourceClosed;
                    }
                },
                _ = ticker.tick() => {
                    self.tick().await;
                }
                command = commands.recv(), if commands_open => match command {
                    Some(PipelineCommand::Shutdown) => break PipelineExit::Shutdown,
                    Some(command) => self.apply(command),
                    None => commands_open = false,
                },
            }
        };

        self.connection_changed(ConnectionState::Disconnected);
        self.tick().await;
        self.aggregator.flush_all().await;
        tracing::info!(
            "Pipeline stopped ({:?}) at {} steps, {:.1} cal",
            exit,
            self.analyzer.step_count_total(),
            self.analyzer.calorie_total()
        );
        exit
    }

    fn apply(&mut self, command: PipelineCommand) {
        match command {
            PipelineCommand::SetBodyWeight(kg) => match self.analyzer.set_body_weight(kg) {
                Ok(()) => tracing::info!("Body weight set to {} kg", kg),
                Err(e) => tracing::warn!("Ignoring body weight update: {}", e),
            },
            PipelineCommand::ResetTotals => {
                tracing::info!(
                    "Resetting totals at {} steps, {:.1} cal",
                    self.analyzer.step_count_total(),
                    self.analyzer.calorie_total()
                );
                self.analyzer.reset();
            }
            PipelineCommand::Shutdown => {}
        }
    }

    fn publish(&self, event: PipelineEvent) {
        // No subscribers is fine; the display side may not be attached yet.
        let _ = self.events.send(event);
    }
}
