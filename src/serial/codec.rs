//! Framing of the UART link to the BLE co-processor.
//!
//! Wire format:
//! ```text
//! ┌─────┬─────┬─────┬───────────────┬──────────────┬─────┐
//! │ STX │ LEN │ CMD │ PAYLOAD       │ CRC16 (LE)   │ ETX │
//! │0x02 │ 1 B │ 1 B │ LEN - 1 bytes │ over LEN..   │0x03 │
//! └─────┴─────┴─────┴───────────────┴──────────────┴─────┘
//! ```
//!
//! `LEN` counts `CMD` plus payload.  The CRC is CRC-16/CCITT-FALSE over
//! `LEN`, `CMD` and the payload.  The decoder accumulates bytes across
//! reads: a single UART read may hold part of a frame or several frames.
//! Anything that fails to frame is skipped up to the next `STX`.

use crc::{CRC_16_IBM_3740, Crc};

pub const STX: u8 = 0x02;
pub const ETX: u8 = 0x03;

/// Largest `LEN` value; the body is at most this many bytes.
pub const MAX_BODY_LEN: usize = u8::MAX as usize;

/// STX + LEN + CRC16 + ETX around the body.
pub const FRAME_OVERHEAD: usize = 5;

/// CRC-16/CCITT-FALSE (poly 0x1021, init 0xFFFF, no reflection).
const LINK_CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

pub fn crc16(data: &[u8]) -> u16 {
    LINK_CRC.checksum(data)
}

/// Decoder state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderState {
    /// Skipping bytes until `STX`.
    Hunting,
    /// `STX` seen, next byte is `LEN`.
    ReadingLen,
    /// Collecting `CMD` + payload.
    ReadingBody { expected: usize, collected: usize },
    /// Collecting the two CRC bytes.
    ReadingCrc { collected: usize },
    /// Expecting `ETX`.
    ReadingEtx,
}

/// Why a frame was dropped.  Counted, never returned to the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    pub frames: u32,
    pub crc_errors: u32,
    pub framing_errors: u32,
}

/// Streaming frame decoder.
pub struct FrameDecoder {
    state: DecoderState,
    len_byte: u8,
    body: [u8; MAX_BODY_LEN],
    crc_buf: [u8; 2],
    stats: DecoderStats,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            state: DecoderState::Hunting,
            len_byte: 0,
            body: [0; MAX_BODY_LEN],
            crc_buf: [0; 2],
            stats: DecoderStats::default(),
        }
    }

    /// Feed bytes, calling `on_frame` with the body (`CMD` + payload) of
    /// every complete, CRC-valid frame.
    pub fn feed(&mut self, data: &[u8], mut on_frame: impl FnMut(&[u8])) {
        for &byte in data {
            if let Some(len) = self.push(byte) {
                on_frame(&self.body[..len]);
            }
        }
    }

    /// Advance by one byte.  Returns the body length when a frame completes.
    fn push(&mut self, byte: u8) -> Option<usize> {
        match self.state {
            DecoderState::Hunting => {
                if byte == STX {
                    self.state = DecoderState::ReadingLen;
                }
            }
            DecoderState::ReadingLen => {
                if byte == 0 {
                    self.stats.framing_errors += 1;
                    self.state = DecoderState::Hunting;
                } else {
                    self.len_byte = byte;
                    self.state = DecoderState::ReadingBody {
                        expected: usize::from(byte),
                        collected: 0,
                    };
                }
            }
            DecoderState::ReadingBody {
                expected,
                collected,
            } => {
                self.body[collected] = byte;
                let collected = collected + 1;
                self.state = if collected == expected {
                    DecoderState::ReadingCrc { collected: 0 }
                } else {
                    DecoderState::ReadingBody {
                        expected,
                        collected,
                    }
                };
            }
            DecoderState::ReadingCrc { collected } => {
                self.crc_buf[collected] = byte;
                self.state = if collected == 0 {
                    DecoderState::ReadingCrc { collected: 1 }
                } else {
                    DecoderState::ReadingEtx
                };
            }
            DecoderState::ReadingEtx => {
                self.state = DecoderState::Hunting;
                let len = usize::from(self.len_byte);
                if byte != ETX {
                    self.stats.framing_errors += 1;
                    // The stray byte may itself open the next frame.
                    if byte == STX {
                        self.state = DecoderState::ReadingLen;
                    }
                    return None;
                }
                if u16::from_le_bytes(self.crc_buf) != self.body_crc(len) {
                    self.stats.crc_errors += 1;
                    return None;
                }
                self.stats.frames += 1;
                return Some(len);
            }
        }
        None
    }

    fn body_crc(&self, len: usize) -> u16 {
        let mut covered = [0u8; MAX_BODY_LEN + 1];
        covered[0] = self.len_byte;
        covered[1..=len].copy_from_slice(&self.body[..len]);
        crc16(&covered[..=len])
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Drop any partial frame (e.g. after the UART was reconfigured).
    pub fn reset(&mut self) {
        self.state = DecoderState::Hunting;
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode `cmd` + `payload` into a frame.
///
/// Returns the number of bytes written to `out`, or `None` if the body is
/// too long or `out` is too small.
pub fn encode_frame(cmd: u8, payload: &[u8], out: &mut [u8]) -> Option<usize> {
    let body_len = payload.len() + 1;
    if body_len > MAX_BODY_LEN {
        return None;
    }
    let total = body_len + FRAME_OVERHEAD;
    if total > out.len() {
        return None;
    }

    out[0] = STX;
    out[1] = body_len as u8;
    out[2] = cmd;
    out[3..2 + body_len].copy_from_slice(payload);
    let crc = crc16(&out[1..2 + body_len]);
    out[2 + body_len..4 + body_len].copy_from_slice(&crc.to_le_bytes());
    out[4 + body_len] = ETX;
    Some(total)
}
