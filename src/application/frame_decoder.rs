// Frame decoder - Recovers accelerometer buffers from the band's byte stream
//
// Wire format: a two-byte start marker (0xFE 0xFD) followed by 20 frames of
// three 2-byte axis values. The band also appends an end marker (0xFD 0xFE),
// but payload bytes can take the same values, so completion is count-based and
// the end marker is never looked for.
use crate::application::clock::Clock;
use crate::domain::sample::ContentBuffer;
use std::collections::VecDeque;
use std::sync::Arc;

const START_BYTE: u8 = 0xFE;
const START_BYTE_2: u8 = 0xFD;

// The band never sends NUL bytes: 0x00 is replaced by these on the wire.
const HIGH_BYTE_NUL: u8 = 0x7F;
const LOW_BYTE_NUL: u8 = 0x01;

const SIGN_BIT: u8 = 0x80;
const MAGNITUDE_MASK: u32 = 0x7FFF;
const SIGN_EXTENSION: u32 = 0xFFFF_8000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    WaitStartByte,
    WaitData,
    Completed,
}

/// Stateful parser turning an arbitrary byte stream into sealed buffers.
///
/// Frames may span any number of `feed` calls. Malformed input never errors:
/// bytes outside a frame are skipped until the next start marker.
pub struct FrameDecoder {
    clock: Arc<dyn Clock>,
    state: ParseState,
    start_cache: u8,
    high_byte: Option<u8>,
    current: Option<ContentBuffer>,
    ready: VecDeque<ContentBuffer>,
}

impl FrameDecoder {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: ParseState::WaitStartByte,
            start_cache: 0x00,
            high_byte: None,
            current: None,
            ready: VecDeque::new(),
        }
    }

    /// Process a chunk of bytes in full.
    pub fn feed(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.step(byte);
        }
    }

    /// Pop the oldest sealed buffer, if any.
    pub fn take_ready(&mut self) -> Option<ContentBuffer> {
        self.ready.pop_front()
    }

    /// Drop any partially filled buffer and wait for the next start marker.
    pub fn reset(&mut self) {
        self.state = ParseState::WaitStartByte;
        self.start_cache = 0x00;
        self.high_byte = None;
        self.current = None;
    }

    #[cfg(test)]
    pub fn ready_len(&self) -> usize {
        self.ready.len()
    }

    fn step(&mut self, byte: u8) {
        match self.state {
            ParseState::WaitStartByte => {
                if byte == START_BYTE_2 && self.start_cache == START_BYTE {
                    self.state = ParseState::WaitData;
                    self.current = Some(ContentBuffer::open(self.clock.now()));
                } else {
                    self.start_cache = byte;
                }
            }
            ParseState::WaitData => match self.high_byte.take() {
                None => self.high_byte = Some(byte),
                Some(high) => {
                    if let Some(buffer) = self.current.as_mut() {
                        buffer.push_axis(decode_value(high, byte));
                        if buffer.is_sealed() {
                            self.state = ParseState::Completed;
                        }
                    }
                }
            },
            ParseState::Completed => {}
        }

        if self.state == ParseState::Completed {
            if let Some(buffer) = self.current.take() {
                tracing::debug!("Sealed accelerometer buffer created at {}", buffer.created_at());
                self.ready.push_back(buffer);
            }
            self.reset();
        }
    }
}

/// Rebuild one signed axis value from its two wire bytes.
pub(crate) fn decode_value(high: u8, low: u8) -> i32 {
    let high = if high == HIGH_BYTE_NUL { 0x00 } else { high };
    let low = if low == LOW_BYTE_NUL { 0x00 } else { low };

    let magnitude = ((u32::from(high) << 8) | u32::from(low)) & MAGNITUDE_MASK;
    if high & SIGN_BIT == SIGN_BIT {
        (magnitude | SIGN_EXTENSION) as i32
    } else {
        magnitude as i32
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{encode_value, encode_window};
    use super::*;
    use crate::application::clock::ManualClock;
    use crate::domain::sample::FRAMES_PER_BUFFER;
    use chrono::TimeDelta;

    fn decoder() -> (FrameDecoder, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at(2024, 5, 1, 12, 0));
        (FrameDecoder::new(clock.clone()), clock)
    }

    fn sample_frames() -> Vec<[i32; 3]> {
        (0..FRAMES_PER_BUFFER as i32)
            .map(|i| [i * 100, -(i * 37), 1000 - i * 512])
            .collect()
    }

    fn axes(buffer: &ContentBuffer) -> Vec<[i32; 3]> {
        buffer.frames().iter().map(|f| f.axes).collect()
    }

    #[test]
    fn test_single_chunk_decodes_window() {
        let (mut decoder, _) = decoder();
        decoder.feed(&encode_window(&sample_frames()));

        let buffer = decoder.take_ready().expect("sealed buffer");
        assert!(buffer.is_sealed());
        assert_eq!(axes(&buffer), sample_frames());
        assert!(decoder.take_ready().is_none());
    }

    #[test]
    fn test_byte_by_byte_matches_single_chunk() {
        let wire = encode_window(&sample_frames());

        let (mut whole, _) = decoder();
        whole.feed(&wire);

        let (mut split, _) = decoder();
        for byte in &wire {
            split.feed(std::slice::from_ref(byte));
        }

        assert_eq!(whole.take_ready(), split.take_ready());
    }

    #[test]
    fn test_window_spanning_uneven_chunks() {
        let (mut decoder, _) = decoder();
        let wire = encode_window(&sample_frames());
        for chunk in wire.chunks(7) {
            decoder.feed(chunk);
        }

        let buffer = decoder.take_ready().expect("sealed buffer");
        assert_eq!(axes(&buffer), sample_frames());
    }

    #[test]
    fn test_sign_extension_of_most_negative_value() {
        let (mut decoder, _) = decoder();
        let mut wire = vec![0xFE, 0xFD, 0x80, 0x00];
        for _ in 1..(FRAMES_PER_BUFFER * 3) {
            wire.extend_from_slice(&encode_value(0));
        }
        decoder.feed(&wire);

        let buffer = decoder.take_ready().expect("sealed buffer");
        assert_eq!(buffer.frames()[0].axes, [-32768, 0, 0]);
    }

    #[test]
    fn test_escaped_nul_bytes_decode_to_zero() {
        assert_eq!(decode_value(0x7F, 0x01), 0);
        assert_eq!(decode_value(0x7F, 0x05), 5);
        assert_eq!(decode_value(0x12, 0x01), 0x1200);
        assert_eq!(encode_value(0), [0x7F, 0x01]);
    }

    #[test]
    fn test_escape_round_trip() {
        for value in -16384..=16383 {
            // A genuine 0x01 low byte is indistinguishable from an escaped NUL.
            if value as u16 & 0xFF == 0x01 {
                continue;
            }
            let [high, low] = encode_value(value);
            assert_eq!(decode_value(high, low), value, "value {}", value);
        }
    }

    #[test]
    fn test_low_byte_sentinel_collides_with_genuine_one() {
        let [high, low] = encode_value(1);
        assert_eq!(decode_value(high, low), 0);
    }

    #[test]
    fn test_noise_before_start_marker_is_skipped() {
        let (mut decoder, _) = decoder();
        let mut wire = vec![0x00, 0xFD, 0x13, 0xFE, 0xFE];
        wire.extend_from_slice(&encode_window(&sample_frames())[1..]);
        decoder.feed(&wire);

        let buffer = decoder.take_ready().expect("sealed buffer");
        assert_eq!(axes(&buffer), sample_frames());
    }

    #[test]
    fn test_end_marker_bytes_inside_payload_do_not_end_frame() {
        let mut frames = sample_frames();
        // 0xFDFE: high byte 0xFD, low byte 0xFE
        frames[3] = [0xFDFE_u16 as i16 as i32, 0, 0];
        let (mut decoder, _) = decoder();
        decoder.feed(&encode_window(&frames));

        let buffer = decoder.take_ready().expect("sealed buffer");
        assert_eq!(buffer.frames().len(), FRAMES_PER_BUFFER);
        assert_eq!(buffer.frames()[3].axes[0], 0xFDFE_u16 as i16 as i32);
    }

    #[test]
    fn test_reset_discards_partial_buffer() {
        let (mut decoder, _) = decoder();
        let wire = encode_window(&sample_frames());
        decoder.feed(&wire[..50]);
        decoder.reset();
        decoder.feed(&wire[50..]);
        assert!(decoder.take_ready().is_none());

        decoder.feed(&wire);
        assert_eq!(axes(&decoder.take_ready().expect("sealed buffer")), sample_frames());
    }

    #[test]
    fn test_completed_buffers_come_out_in_order() {
        let (mut decoder, clock) = decoder();
        let first = sample_frames();
        let second: Vec<[i32; 3]> = first.iter().map(|f| [f[2], f[1], f[0]]).collect();

        decoder.feed(&encode_window(&first));
        clock.advance(TimeDelta::seconds(1));
        decoder.feed(&encode_window(&second));
        assert_eq!(decoder.ready_len(), 2);

        let a = decoder.take_ready().expect("first buffer");
        let b = decoder.take_ready().expect("second buffer");
        assert_eq!(axes(&a), first);
        assert_eq!(axes(&b), second);
        assert!(b.created_at() > a.created_at());
    }

    #[test]
    fn test_buffer_stamped_when_start_marker_arrives() {
        let (mut decoder, clock) = decoder();
        let wire = encode_window(&sample_frames());
        let opened_at = clock.now();

        decoder.feed(&wire[..2]);
        clock.advance(TimeDelta::seconds(5));
        decoder.feed(&wire[2..]);

        let buffer = decoder.take_ready().expect("sealed buffer");
        assert_eq!(buffer.created_at(), opened_at);
        assert!(buffer.frames().iter().all(|f| f.captured_at == opened_at));
    }
}
