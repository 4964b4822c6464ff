//! Frame Codec
//!
//! Byte layout of one message on the wire:
//!
//! ```text
//! [0x02] [4 bytes LE: sequence] [8 bytes LE: body length N] [N bytes: UTF-8 body] [0x03]
//! ```
//!
//! [`FrameCodec`] encodes and decodes whole frames. [`FrameDecoder`] is the
//! incremental form used by the receiver: it accepts bytes as they arrive,
//! in pieces of any size, and keeps its position across calls.

use crate::protocol::error::{Result, WirecallError};

pub const START_DELIMITER: u8 = 0x02;
pub const END_DELIMITER: u8 = 0x03;

/// Single byte written back by the receiver for every complete frame.
pub const ACK: u8 = 0x06;

const SEQUENCE_LEN: usize = 4;
const LENGTH_LEN: usize = 8;

/// Start delimiter, sequence and length.
pub const HEADER_LEN: usize = 1 + SEQUENCE_LEN + LENGTH_LEN;

/// Default upper bound on a frame body (100 MB).
pub const MAX_BODY_LEN: u64 = 100 * 1024 * 1024;

/// Most the decoder reserves up front; the body buffer grows as bytes arrive.
const INITIAL_BODY_CAPACITY: u64 = 64 * 1024;

/// One decoded message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub sequence: u32,
    pub body: String,
}

/// Whole-frame encoding and decoding.
pub struct FrameCodec;

impl FrameCodec {
    /// Encodes `body` under `sequence`. Integers are always little-endian.
    pub fn encode(sequence: u32, body: &str) -> Vec<u8> {
        let body = body.as_bytes();
        let mut frame = Vec::with_capacity(HEADER_LEN + body.len() + 1);
        frame.push(START_DELIMITER);
        frame.extend_from_slice(&sequence.to_le_bytes());
        frame.extend_from_slice(&(body.len() as u64).to_le_bytes());
        frame.extend_from_slice(body);
        frame.push(END_DELIMITER);
        frame
    }

    /// Decodes exactly one frame; trailing or missing bytes are an error.
    pub fn decode(bytes: &[u8]) -> Result<Frame> {
        let mut decoder = FrameDecoder::new();
        let (consumed, frame) = decoder.step(bytes)?;
        match frame {
            Some(frame) if consumed == bytes.len() => Ok(frame),
            Some(_) => Err(WirecallError::ProtocolFraming(format!(
                "{} trailing bytes after frame",
                bytes.len() - consumed
            ))),
            None => Err(WirecallError::ProtocolFraming(format!(
                "incomplete frame: stopped in {:?} after {} bytes",
                decoder.state(),
                bytes.len()
            ))),
        }
    }
}

/// Position of a [`FrameDecoder`] within the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeState {
    AwaitStart,
    ReadingSequence,
    ReadingLength,
    ReadingBody,
    AwaitEnd,
    /// A frame was just returned; the next step starts a new one.
    Complete,
}

/// Incremental frame parser.
///
/// # Example
///
/// ```
/// use wirecall_common::transport::{FrameCodec, FrameDecoder};
///
/// let bytes = FrameCodec::encode(7, "hello");
/// let mut decoder = FrameDecoder::new();
///
/// let (consumed, frame) = decoder.step(&bytes[..5]).unwrap();
/// assert_eq!((consumed, frame), (5, None));
///
/// let (_, frame) = decoder.step(&bytes[5..]).unwrap();
/// let frame = frame.unwrap();
/// assert_eq!((frame.sequence, frame.body.as_str()), (7, "hello"));
/// ```
#[derive(Debug)]
pub struct FrameDecoder {
    state: DecodeState,
    sequence: [u8; SEQUENCE_LEN],
    sequence_read: usize,
    length: [u8; LENGTH_LEN],
    length_read: usize,
    body: Vec<u8>,
    body_len: u64,
    body_read: u64,
    max_body_len: u64,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_max_body_len(MAX_BODY_LEN)
    }

    pub fn with_max_body_len(max_body_len: u64) -> Self {
        Self {
            state: DecodeState::AwaitStart,
            sequence: [0; SEQUENCE_LEN],
            sequence_read: 0,
            length: [0; LENGTH_LEN],
            length_read: 0,
            body: Vec::new(),
            body_len: 0,
            body_read: 0,
            max_body_len,
        }
    }

    pub fn state(&self) -> DecodeState {
        self.state
    }

    /// Whether a frame is partially read.
    pub fn in_frame(&self) -> bool {
        !matches!(self.state, DecodeState::AwaitStart | DecodeState::Complete)
    }

    /// Discards any partial frame.
    pub fn reset(&mut self) {
        self.state = DecodeState::AwaitStart;
        self.sequence_read = 0;
        self.length_read = 0;
        self.body = Vec::new();
        self.body_len = 0;
        self.body_read = 0;
    }

    /// Consumes bytes from `input` until one frame completes or the input is
    /// exhausted.
    ///
    /// Returns the number of bytes consumed and the completed frame, if any.
    /// Bytes after a completed frame are left unconsumed for the next call.
    ///
    /// # Errors
    ///
    /// `ProtocolFraming` for a wrong delimiter, an oversized body or a body
    /// that is not UTF-8. The decoder is reset; the stream it was reading is
    /// out of sync and should be dropped.
    pub fn step(&mut self, input: &[u8]) -> Result<(usize, Option<Frame>)> {
        let result = self.advance(input);
        if result.is_err() {
            self.reset();
        }
        result
    }

    /// Feeds all of `input`, returning every frame it completes.
    pub fn push(&mut self, mut input: &[u8]) -> Result<Vec<Frame>> {
        let mut frames = Vec::new();
        while !input.is_empty() {
            let (consumed, frame) = self.step(input)?;
            frames.extend(frame);
            input = &input[consumed..];
        }
        Ok(frames)
    }

    fn advance(&mut self, input: &[u8]) -> Result<(usize, Option<Frame>)> {
        let mut pos = 0;

        while pos < input.len() {
            match self.state {
                DecodeState::AwaitStart => {
                    let byte = input[pos];
                    pos += 1;
                    if byte != START_DELIMITER {
                        return Err(WirecallError::ProtocolFraming(format!(
                            "expected start delimiter 0x{:02x}, found 0x{:02x}",
                            START_DELIMITER, byte
                        )));
                    }
                    self.state = DecodeState::ReadingSequence;
                }
                DecodeState::ReadingSequence => {
                    self.sequence[self.sequence_read] = input[pos];
                    self.sequence_read += 1;
                    pos += 1;
                    if self.sequence_read == SEQUENCE_LEN {
                        self.state = DecodeState::ReadingLength;
                    }
                }
                DecodeState::ReadingLength => {
                    self.length[self.length_read] = input[pos];
                    self.length_read += 1;
                    pos += 1;
                    if self.length_read == LENGTH_LEN {
                        self.begin_body()?;
                    }
                }
                DecodeState::ReadingBody => {
                    let remaining =
                        usize::try_from(self.body_len - self.body_read).unwrap_or(usize::MAX);
                    let take = remaining.min(input.len() - pos);
                    self.body.extend_from_slice(&input[pos..pos + take]);
                    self.body_read += take as u64;
                    pos += take;
                    if self.body_read == self.body_len {
                        self.state = DecodeState::AwaitEnd;
                    }
                }
                DecodeState::AwaitEnd => {
                    let byte = input[pos];
                    pos += 1;
                    if byte != END_DELIMITER {
                        return Err(WirecallError::ProtocolFraming(format!(
                            "expected end delimiter 0x{:02x}, found 0x{:02x}",
                            END_DELIMITER, byte
                        )));
                    }
                    self.state = DecodeState::Complete;
                    return self.finish_frame().map(|frame| (pos, Some(frame)));
                }
                // A frame was returned by the previous step.
                DecodeState::Complete => self.reset(),
            }
        }

        Ok((pos, None))
    }

    fn begin_body(&mut self) -> Result<()> {
        let body_len = u64::from_le_bytes(self.length);
        if body_len > self.max_body_len {
            return Err(WirecallError::ProtocolFraming(format!(
                "frame body of {} bytes exceeds maximum {}",
                body_len, self.max_body_len
            )));
        }

        self.body_len = body_len;
        self.body = Vec::with_capacity(body_len.min(INITIAL_BODY_CAPACITY) as usize);
        self.state = if body_len == 0 {
            DecodeState::AwaitEnd
        } else {
            DecodeState::ReadingBody
        };
        Ok(())
    }

    fn finish_frame(&mut self) -> Result<Frame> {
        let sequence = u32::from_le_bytes(self.sequence);
        let body = String::from_utf8(std::mem::take(&mut self.body)).map_err(|e| {
            WirecallError::ProtocolFraming(format!(
                "frame {} body is not valid UTF-8: {}",
                sequence, e
            ))
        })?;
        Ok(Frame { sequence, body })
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let bytes = FrameCodec::encode(0x0102_0304, "hi");
        assert_eq!(
            bytes,
            vec![0x02, 0x04, 0x03, 0x02, 0x01, 2, 0, 0, 0, 0, 0, 0, 0, b'h', b'i', 0x03]
        );
    }

    #[test]
    fn test_round_trip_sequence_extremes() {
        for sequence in [0, 1, i32::MAX as u32, u32::MAX] {
            for body in ["", "x", "héllo wörld"] {
                let frame = FrameCodec::decode(&FrameCodec::encode(sequence, body)).unwrap();
                assert_eq!(frame.sequence, sequence);
                assert_eq!(frame.body, body);
            }
        }
    }

    #[test]
    fn test_large_body_round_trip() {
        let body = "abcdefgh".repeat(128 * 1024);
        let frame = FrameCodec::decode(&FrameCodec::encode(42, &body)).unwrap();
        assert_eq!(frame.body.len(), body.len());
        assert_eq!(frame.body, body);
    }

    #[test]
    fn test_every_split_position() {
        let bytes = FrameCodec::encode(99, "split me ✂ anywhere");
        let expected = FrameCodec::decode(&bytes).unwrap();

        for split in 0..=bytes.len() {
            let mut decoder = FrameDecoder::new();
            let mut frames = decoder.push(&bytes[..split]).unwrap();
            frames.extend(decoder.push(&bytes[split..]).unwrap());
            assert_eq!(frames, vec![expected.clone()], "split at {}", split);
        }
    }

    #[test]
    fn test_byte_at_a_time() {
        let bytes = FrameCodec::encode(5, "one byte per read");
        let mut decoder = FrameDecoder::new();
        let mut frames = Vec::new();
        for byte in &bytes {
            let (consumed, frame) = decoder.step(std::slice::from_ref(byte)).unwrap();
            assert_eq!(consumed, 1);
            frames.extend(frame);
        }
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].body, "one byte per read");
        assert_eq!(decoder.state(), DecodeState::Complete);
    }

    #[test]
    fn test_step_stops_after_one_frame() {
        let mut bytes = FrameCodec::encode(1, "first");
        let first_len = bytes.len();
        bytes.extend(FrameCodec::encode(2, "second"));

        let mut decoder = FrameDecoder::new();
        let (consumed, frame) = decoder.step(&bytes).unwrap();
        assert_eq!(consumed, first_len);
        assert_eq!(frame.unwrap().sequence, 1);

        let (consumed, frame) = decoder.step(&bytes[first_len..]).unwrap();
        assert_eq!(consumed, bytes.len() - first_len);
        assert_eq!(frame.unwrap().body, "second");
    }

    #[test]
    fn test_bad_start_delimiter() {
        let mut decoder = FrameDecoder::new();
        let err = decoder.step(&[0x41, 0x02]).unwrap_err();
        assert!(matches!(err, WirecallError::ProtocolFraming(_)));
        assert_eq!(decoder.state(), DecodeState::AwaitStart);
    }

    #[test]
    fn test_bad_end_delimiter() {
        let mut bytes = FrameCodec::encode(3, "abc");
        let last = bytes.len() - 1;
        bytes[last] = 0x04;
        assert!(matches!(
            FrameCodec::decode(&bytes),
            Err(WirecallError::ProtocolFraming(_))
        ));
    }

    #[test]
    fn test_length_mismatch_detected() {
        // Declares 5 bytes but carries 3 before the end delimiter.
        let mut bytes = vec![START_DELIMITER, 1, 0, 0, 0];
        bytes.extend_from_slice(&5u64.to_le_bytes());
        bytes.extend_from_slice(b"abc");
        bytes.push(END_DELIMITER);
        bytes.push(START_DELIMITER);

        assert!(matches!(
            FrameCodec::decode(&bytes),
            Err(WirecallError::ProtocolFraming(_))
        ));
    }

    #[test]
    fn test_oversized_body_rejected_before_allocation() {
        let mut bytes = vec![START_DELIMITER, 0, 0, 0, 0];
        bytes.extend_from_slice(&u64::MAX.to_le_bytes());

        let mut decoder = FrameDecoder::with_max_body_len(1024);
        assert!(matches!(
            decoder.step(&bytes),
            Err(WirecallError::ProtocolFraming(_))
        ));
    }

    #[test]
    fn test_huge_announced_length_reserves_little() {
        let mut bytes = vec![START_DELIMITER, 9, 0, 0, 0];
        bytes.extend_from_slice(&(1u64 << 62).to_le_bytes());
        bytes.extend_from_slice(b"abc");

        let mut decoder = FrameDecoder::with_max_body_len(u64::MAX);
        let (consumed, frame) = decoder.step(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert!(frame.is_none());
        assert_eq!(decoder.state(), DecodeState::ReadingBody);
        assert!(decoder.body.capacity() <= INITIAL_BODY_CAPACITY as usize);
    }

    #[test]
    fn test_complete_state_survives_empty_step() {
        let bytes = FrameCodec::encode(1, "a");
        let mut decoder = FrameDecoder::new();
        decoder.push(&bytes).unwrap();
        assert_eq!(decoder.state(), DecodeState::Complete);

        assert_eq!(decoder.step(&[]).unwrap(), (0, None));
        assert_eq!(decoder.state(), DecodeState::Complete);

        let frames = decoder.push(&FrameCodec::encode(2, "b")).unwrap();
        assert_eq!(frames[0].sequence, 2);
    }

    #[test]
    fn test_invalid_utf8_body() {
        let mut bytes = vec![START_DELIMITER, 0, 0, 0, 0];
        bytes.extend_from_slice(&2u64.to_le_bytes());
        bytes.extend_from_slice(&[0xff, 0xfe]);
        bytes.push(END_DELIMITER);

        assert!(matches!(
            FrameCodec::decode(&bytes),
            Err(WirecallError::ProtocolFraming(_))
        ));
    }

    #[test]
    fn test_incomplete_frame() {
        let bytes = FrameCodec::encode(8, "cut short");
        let err = FrameCodec::decode(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, WirecallError::ProtocolFraming(_)));
    }

    #[test]
    fn test_reset_discards_partial_frame() {
        let bytes = FrameCodec::encode(4, "partial");
        let mut decoder = FrameDecoder::new();
        decoder.step(&bytes[..8]).unwrap();
        assert!(decoder.in_frame());

        decoder.reset();
        assert!(!decoder.in_frame());
        let frames = decoder.push(&bytes).unwrap();
        assert_eq!(frames[0].body, "partial");
    }
}
