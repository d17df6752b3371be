// Motion analyzer - Step count and calorie estimate per analysis window
use crate::application::clock::Clock;
use crate::application::peak_detector::PeakDetector;
use crate::domain::activity::ActivityReport;
use crate::domain::sample::{ContentBuffer, SampleFrame};
use crate::infrastructure::config::{AnalysisSettings, ConfigError};
use std::sync::Arc;

const PEAK_WINDOW: usize = 3;
const PEAK_STRINGENCY: f32 = 1.5;

/// Distance covered by one step, in metres.
const STEP_LENGTH_M: f32 = 0.5;
const MPS_TO_KMH: f32 = 3.6;

const AXIS_OFFSET: f32 = 32768.0;
const AXIS_RANGE: f32 = 65535.0;

/// Turns sealed buffers into activity reports.
///
/// Holds the running step and calorie totals, plus the index of the last peak
/// of the previous window: the first step of a window is timed from that peak,
/// so consecutive calls are not independent.
pub struct MotionAnalyzer {
    settings: AnalysisSettings,
    detector: PeakDetector,
    clock: Arc<dyn Clock>,
    step_count_total: u32,
    calorie_total: f64,
    last_peak_offset: usize,
}

impl MotionAnalyzer {
    pub fn new(settings: AnalysisSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            settings,
            detector: PeakDetector::new(PEAK_WINDOW, PEAK_STRINGENCY),
            clock,
            step_count_total: 0,
            calorie_total: 0.0,
            last_peak_offset: 0,
        }
    }

    /// Analyze the first buffer of a window. `None` when the window holds no
    /// buffer or shows no step.
    pub fn analyze(&mut self, buffers: &[ContentBuffer]) -> Option<ActivityReport> {
        let buffer = buffers.first()?;
        let frames = buffer.frames();
        let magnitudes: Vec<f32> = frames.iter().map(magnitude).collect();

        let peaks = self.detector.process(&magnitudes);
        let Some(&last_peak) = peaks.last() else {
            tracing::debug!("No steps in window opened at {}", buffer.created_at());
            return None;
        };

        let speed_kmh = self.average_speed(&peaks, frames.len()) * MPS_TO_KMH;
        let met = met_for_speed(speed_kmh);
        let calorie_increment = met * self.settings.body_weight_kg * (1.0 / 3600.0) * 1000.0;

        let step_count_delta = peaks.len() as u32;
        self.last_peak_offset = last_peak;
        self.step_count_total = self.step_count_total.saturating_add(step_count_delta);
        self.calorie_total += calorie_increment;

        tracing::info!(
            "Detected {} steps at {:.2} km/h (MET {}), +{:.2} cal, total {} steps",
            step_count_delta,
            speed_kmh,
            met,
            calorie_increment,
            self.step_count_total
        );

        Some(ActivityReport {
            sampling_interval_ms: self.settings.sample_period_ms,
            window_duration_ms: self.settings.window_duration_ms,
            step_count_delta,
            step_count_total: self.step_count_total,
            calorie_increment,
            calorie_total: self.calorie_total,
            created_at: self.clock.now(),
        })
    }

    /// Mean step speed in m/s. The first step is timed from the last peak of
    /// the previous window, later ones from the peak before them.
    fn average_speed(&self, peaks: &[usize], frame_count: usize) -> f32 {
        let period = self.settings.sample_period_secs();
        let carried = frame_count as f32 - self.last_peak_offset as f32;

        let first = (peaks[0] as f32 + carried) * period;
        let intervals = std::iter::once(first)
            .chain(peaks.windows(2).map(|pair| (pair[1] - pair[0]) as f32 * period));

        let total: f32 = intervals.map(|seconds| STEP_LENGTH_M / seconds).sum();
        total / peaks.len() as f32
    }

    /// Reject weights outside 1..=999 kg, keeping the previous value.
    pub fn set_body_weight(&mut self, kg: f64) -> Result<(), ConfigError> {
        self.settings.set_body_weight(kg)
    }

    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    pub fn step_count_total(&self) -> u32 {
        self.step_count_total
    }

    pub fn calorie_total(&self) -> f64 {
        self.calorie_total
    }

    /// Zero the running totals and the carried peak offset.
    pub fn reset(&mut self) {
        self.step_count_total = 0;
        self.calorie_total = 0.0;
        self.last_peak_offset = 0;
    }
}

fn normalize(raw: i32) -> f32 {
    (raw as f32 + AXIS_OFFSET) / AXIS_RANGE
}

fn magnitude(frame: &SampleFrame) -> f32 {
    frame
        .axes
        .iter()
        .map(|&raw| normalize(raw).powi(2))
        .sum::<f32>()
        .sqrt()
}

/// Metabolic equivalent for a walking/running speed in km/h.
pub fn met_for_speed(speed_kmh: f32) -> f64 {
    match speed_kmh {
        s if s < 2.7 => 2.3,
        s if s < 4.0 => 2.9,
        s if s < 4.8 => 3.3,
        s if s < 5.5 => 3.6,
        s if s < 10.0 => 3.8,
        s if s < 16.0 => 4.0,
        _ => 1.0,
    }
}
