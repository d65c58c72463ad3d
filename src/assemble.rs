//! Frame reassembly.
//!
//! Bulk chunks and frames have independent sizes: one pull rarely delivers a whole picture.
//! [`FrameAssembler`] accumulates chunks until the declared frame byte count is reached, or,
//! when the stream carries UVC payload headers, until a payload flags the end of the frame.

use bitflags::bitflags;

bitflags! {
    /// `bmHeaderInfo` bits of the UVC payload header (2.4.3.3).
    pub struct HeaderFlags: u8 {
        const FRAME_ID        = 1 << 0;
        const END_OF_FRAME    = 1 << 1;
        const PRESENTATION_TIME = 1 << 2;
        const SOURCE_CLOCK    = 1 << 3;
        const PAYLOAD_SPECIFIC = 1 << 4;
        const STILL_IMAGE     = 1 << 5;
        const ERROR           = 1 << 6;
        const END_OF_HEADER   = 1 << 7;
    }
}

/// A parsed UVC payload header: the flag byte plus the offset where payload data begins.
#[derive(Debug, Clone, Copy)]
pub struct PayloadHeader {
    pub flags: HeaderFlags,
    pub data_offset: usize,
}

impl PayloadHeader {
    /// Parses the header at the start of `chunk`.
    ///
    /// Returns `None` when the bytes cannot be a valid header (too short, length field out of
    /// range, or shorter than the fields its flags claim are present).
    pub fn parse(chunk: &[u8]) -> Option<Self> {
        if chunk.len() < 2 {
            return None;
        }
        let len = chunk[0] as usize;
        if len < 2 || len > chunk.len() {
            return None;
        }

        let flags = HeaderFlags::from_bits_truncate(chunk[1]);
        let mut required = 2;
        if flags.contains(HeaderFlags::PRESENTATION_TIME) {
            required += 4;
        }
        if flags.contains(HeaderFlags::SOURCE_CLOCK) {
            required += 6;
        }
        if len < required {
            return None;
        }

        Some(PayloadHeader {
            flags,
            data_offset: len,
        })
    }
}

/// Assembly progress, observable for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyState {
    /// No bytes accumulated for the current frame.
    Empty,
    /// A frame is in flight and incomplete.
    Accumulating,
}

pub struct FrameAssembler {
    expected_len: usize,
    strip_headers: bool,
    buf: Vec<u8>,
    state: AssemblyState,
}

impl FrameAssembler {
    /// `expected_len` is the declared byte count of one complete frame payload.
    pub fn new(expected_len: usize, strip_headers: bool) -> Self {
        Self {
            expected_len,
            strip_headers,
            buf: Vec::with_capacity(expected_len),
            state: AssemblyState::Empty,
        }
    }

    pub fn state(&self) -> AssemblyState {
        self.state
    }

    /// Feeds one chunk; returns a complete frame payload when the chunk finishes it.
    ///
    /// A frame is complete when the accumulated bytes reach the declared length, or when
    /// header stripping is on and the payload carries the end-of-frame flag. Accumulating past
    /// the declared length means the stream lost sync, so the partial frame is discarded and
    /// assembly restarts with the next chunk.
    pub fn push(&mut self, chunk: &[u8]) -> Option<Vec<u8>> {
        let (data, end_of_frame) = if self.strip_headers {
            match PayloadHeader::parse(chunk) {
                Some(header) => {
                    if header.flags.contains(HeaderFlags::ERROR) {
                        log::warn!("payload flagged with stream error, dropping partial frame");
                        self.reset();
                        return None;
                    }
                    (
                        &chunk[header.data_offset..],
                        header.flags.contains(HeaderFlags::END_OF_FRAME),
                    )
                }
                None => {
                    log::warn!("chunk without a valid payload header, dropping partial frame");
                    self.reset();
                    return None;
                }
            }
        } else {
            (chunk, false)
        };

        self.buf.extend_from_slice(data);

        if self.buf.len() > self.expected_len {
            log::warn!(
                "accumulated {} bytes, expected {}; resynchronizing",
                self.buf.len(),
                self.expected_len
            );
            self.reset();
            return None;
        }

        // A header-only end-of-frame payload with nothing accumulated is the idle marker
        // devices emit between frames; there is no frame to hand on.
        if !self.buf.is_empty() && (self.buf.len() == self.expected_len || end_of_frame) {
            let payload = std::mem::replace(&mut self.buf, Vec::with_capacity(self.expected_len));
            self.state = AssemblyState::Empty;
            return Some(payload);
        }

        self.state = if self.buf.is_empty() {
            AssemblyState::Empty
        } else {
            AssemblyState::Accumulating
        };
        None
    }

    fn reset(&mut self) {
        self.buf.clear();
        self.state = AssemblyState::Empty;
    }
}
