//! H.264 Annex-B reassembly
//!
//! H264 producers write raw encoder output. The length prefix on the wire
//! only frames socket writes, not NAL units, so the payloads are concatenated
//! and re-split on the 4-byte Annex-B start code:
//!
//! ```text
//!  payload 1            payload 2               payload 3
//! +---------------------+-----------------------+-------------+
//! |00 00 00 01 67 .. 00 | 00 00 01 68 .. 00 00  | 00 01 65 .. |
//! +---------------------+-----------------------+-------------+
//!  \________ SPS ___________/\______ PPS ___________/\__ IDR ...
//! ```
//!
//! Each emitted unit is `00 00 00 01 + NAL`. A unit is only emitted once the
//! next start code has been seen (or the producer ends the stream cleanly),
//! so a start code split across two payloads is handled.
//!
//! A unit still growing past the assembler's limit is thrown away and the
//! assembler re-aligns on the next start code, so a producer that never sends
//! one cannot make the server buffer without bound.

use bytes::{Buf, Bytes, BytesMut};

use crate::protocol::constants::DEFAULT_MAX_FRAME_SIZE;

/// Annex-B start code
pub const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// NAL unit type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NaluType {
    /// Non-IDR slice
    Slice = 1,
    /// Slice data partition A
    SlicePartA = 2,
    /// Slice data partition B
    SlicePartB = 3,
    /// Slice data partition C
    SlicePartC = 4,
    /// IDR slice (keyframe)
    Idr = 5,
    /// Supplemental enhancement information
    Sei = 6,
    /// Sequence parameter set
    Sps = 7,
    /// Picture parameter set
    Pps = 8,
    /// Access unit delimiter
    Aud = 9,
    /// End of sequence
    EndSeq = 10,
    /// End of stream
    EndStream = 11,
    /// Filler data
    Filler = 12,
}

impl NaluType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b & 0x1F {
            1 => Some(NaluType::Slice),
            2 => Some(NaluType::SlicePartA),
            3 => Some(NaluType::SlicePartB),
            4 => Some(NaluType::SlicePartC),
            5 => Some(NaluType::Idr),
            6 => Some(NaluType::Sei),
            7 => Some(NaluType::Sps),
            8 => Some(NaluType::Pps),
            9 => Some(NaluType::Aud),
            10 => Some(NaluType::EndSeq),
            11 => Some(NaluType::EndStream),
            12 => Some(NaluType::Filler),
            _ => None,
        }
    }

    /// Type of a start-code-prefixed unit as emitted by [`NalAssembler`]
    pub fn of_unit(unit: &[u8]) -> Option<Self> {
        unit.get(START_CODE.len()).copied().and_then(Self::from_byte)
    }

    pub fn is_keyframe(&self) -> bool {
        matches!(self, NaluType::Idr)
    }

    pub fn is_parameter_set(&self) -> bool {
        matches!(self, NaluType::Sps | NaluType::Pps)
    }
}

/// Splits a byte stream into start-code-prefixed NAL units
#[derive(Debug)]
pub struct NalAssembler {
    /// Unconsumed bytes; starts with a start code once `aligned` is set
    buffer: BytesMut,
    /// Whether the first start code has been found
    aligned: bool,
    /// Offset from which to resume the start code search
    scan_from: usize,
    /// Largest unit held back before it is dropped
    max_unit: usize,
    /// Bytes thrown away while not aligned or as part of an oversized unit
    discarded: usize,
    /// Units dropped for exceeding `max_unit`
    oversized: u64,
}

impl Default for NalAssembler {
    fn default() -> Self {
        Self::with_max_unit(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl NalAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an assembler that drops units larger than `max_unit` bytes
    pub fn with_max_unit(max_unit: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            aligned: false,
            scan_from: 0,
            max_unit: max_unit.max(START_CODE.len()),
            discarded: 0,
            oversized: 0,
        }
    }

    pub fn max_unit(&self) -> usize {
        self.max_unit
    }

    /// Append `chunk` and push every unit whose end is now known onto `out`
    pub fn push(&mut self, chunk: &[u8], out: &mut Vec<Bytes>) {
        self.buffer.extend_from_slice(chunk);

        if !self.aligned && !self.align() {
            return;
        }

        loop {
            match find_start_code(&self.buffer, self.scan_from) {
                Some(end) => {
                    let unit = self.buffer.split_to(end).freeze();
                    self.scan_from = START_CODE.len();
                    // Back-to-back start codes carry no NAL
                    if unit.len() > START_CODE.len() {
                        out.push(unit);
                    }
                }
                None => {
                    if self.buffer.len() > self.max_unit {
                        self.drop_oversized();
                        return;
                    }
                    // A start code may begin in the last 3 bytes
                    self.scan_from = self
                        .buffer
                        .len()
                        .saturating_sub(START_CODE.len() - 1)
                        .max(START_CODE.len());
                    return;
                }
            }
        }
    }

    /// Emit the pending unit; used when the producer ends the stream cleanly
    pub fn finish(&mut self, out: &mut Vec<Bytes>) {
        if self.aligned && self.buffer.len() > START_CODE.len() {
            out.push(self.buffer.split().freeze());
        }
        self.buffer.clear();
        self.aligned = false;
        self.scan_from = 0;
    }

    /// Number of bytes held back waiting for the next start code
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Number of bytes dropped outside a deliverable unit
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    /// Number of units dropped for exceeding the size limit
    pub fn oversized(&self) -> u64 {
        self.oversized
    }

    /// Throw the partial unit away and wait for the next start code
    ///
    /// The last 3 bytes are kept since a start code may begin there.
    fn drop_oversized(&mut self) {
        let keep = START_CODE.len() - 1;
        let drop = self.buffer.len() - keep;
        self.buffer.advance(drop);
        self.discarded += drop;
        self.oversized += 1;
        self.aligned = false;
        self.scan_from = 0;
    }

    fn align(&mut self) -> bool {
        match find_start_code(&self.buffer, 0) {
            Some(pos) => {
                self.buffer.advance(pos);
                self.discarded += pos;
                self.aligned = true;
                self.scan_from = START_CODE.len();
                true
            }
            None => {
                let keep = START_CODE.len() - 1;
                if self.buffer.len() > keep {
                    let drop = self.buffer.len() - keep;
                    self.buffer.advance(drop);
                    self.discarded += drop;
                }
                false
            }
        }
    }
}

fn find_start_code(data: &[u8], from: usize) -> Option<usize> {
    if from >= data.len() {
        return None;
    }
    data[from..]
        .windows(START_CODE.len())
        .position(|w| w == START_CODE)
        .map(|pos| pos + from)
}
