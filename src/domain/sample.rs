// Accelerometer sample domain models
use chrono::NaiveDateTime;
use serde::Serialize;

/// Number of frames the band sends per transaction.
pub const FRAMES_PER_BUFFER: usize = 20;
pub const AXES_PER_FRAME: usize = 3;

/// One 3-axis accelerometer reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SampleFrame {
    pub axes: [i32; AXES_PER_FRAME],
    pub captured_at: NaiveDateTime,
}

impl SampleFrame {
    pub fn new(axes: [i32; AXES_PER_FRAME], captured_at: NaiveDateTime) -> Self {
        Self { axes, captured_at }
    }
}

/// A group of exactly [`FRAMES_PER_BUFFER`] frames forming one analysis window.
///
/// A buffer is open while the decoder is still writing into it and sealed once
/// the last axis of the last frame has been written. Only sealed buffers leave
/// the decoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentBuffer {
    created_at: NaiveDateTime,
    frames: [SampleFrame; FRAMES_PER_BUFFER],
    #[serde(skip)]
    fill_index: usize,
    #[serde(skip)]
    axis_cursor: usize,
}

impl ContentBuffer {
    pub fn open(created_at: NaiveDateTime) -> Self {
        Self {
            created_at,
            frames: [SampleFrame::new([0; AXES_PER_FRAME], created_at); FRAMES_PER_BUFFER],
            fill_index: 0,
            axis_cursor: 0,
        }
    }

    /// Write the next axis value. Writes past the last frame are ignored.
    pub(crate) fn push_axis(&mut self, value: i32) {
        if self.is_sealed() {
            return;
        }

        self.frames[self.fill_index].axes[self.axis_cursor] = value;
        self.axis_cursor += 1;
        if self.axis_cursor == AXES_PER_FRAME {
            self.axis_cursor = 0;
            self.fill_index += 1;
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.fill_index == FRAMES_PER_BUFFER
    }

    pub fn created_at(&self) -> NaiveDateTime {
        self.created_at
    }

    /// Completed frames, in arrival order.
    pub fn frames(&self) -> &[SampleFrame] {
        &self.frames[..self.fill_index]
    }

    #[cfg(test)]
    pub(crate) fn from_axes(created_at: NaiveDateTime, axes: &[[i32; AXES_PER_FRAME]]) -> Self {
        let mut buffer = Self::open(created_at);
        for frame in axes {
            for &value in frame {
                buffer.push_axis(value);
            }
        }
        buffer
    }
}
