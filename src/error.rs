//! Unified error types for the gateway firmware.
//!
//! Every subsystem converts into [`Error`] so the task loops can log
//! failures the same way.  All variants are `Copy`; nothing here allocates.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The advertisement table refused an operation.
    Table(TableError),
    /// A frame from the BLE co-processor was rejected.
    Frame(FrameError),
    /// A network transport failed.
    Comms(CommsError),
    /// Peripheral or task initialisation failed.
    Init(&'static str),
    /// Configuration is invalid or could not be loaded.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Table(e) => write!(f, "adv table: {e}"),
            Self::Frame(e) => write!(f, "frame: {e}"),
            Self::Comms(e) => write!(f, "comms: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl core::error::Error for Error {}

// ---------------------------------------------------------------------------
// Advertisement table errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableError {
    /// The least-recently-touched slot still holds data that was never
    /// drained for retransmission.
    Full,
}

impl fmt::Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "table full, pending retransmission"),
        }
    }
}

impl From<TableError> for Error {
    fn from(e: TableError) -> Self {
        Self::Table(e)
    }
}

// ---------------------------------------------------------------------------
// Serial frame errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// No frame, or a frame with no bytes at all.
    Null,
    /// The command byte is not the one this consumer handles.
    WrongCommand(u8),
    /// The frame ends before the fields it declares.
    Truncated { len: usize, need: usize },
    /// Declared advertisement payload does not fit the record buffer.
    PayloadTooLong { len: usize, max: usize },
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null frame"),
            Self::WrongCommand(cmd) => write!(f, "unexpected command 0x{cmd:02X}"),
            Self::Truncated { len, need } => {
                write!(f, "truncated frame ({len} bytes, need {need})")
            }
            Self::PayloadTooLong { len, max } => {
                write!(f, "payload too long ({len} bytes, max {max})")
            }
        }
    }
}

impl From<FrameError> for Error {
    fn from(e: FrameError) -> Self {
        Self::Frame(e)
    }
}

// ---------------------------------------------------------------------------
// Communications errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommsError {
    NotConnected,
    HttpSendFailed,
    HttpStatus(u16),
    MqttPublishFailed,
    SerialFailed,
    PayloadTooLarge,
}

impl fmt::Display for CommsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "no network connection"),
            Self::HttpSendFailed => write!(f, "HTTP POST failed"),
            Self::HttpStatus(code) => write!(f, "HTTP status {code}"),
            Self::MqttPublishFailed => write!(f, "MQTT publish failed"),
            Self::SerialFailed => write!(f, "serial link failed"),
            Self::PayloadTooLarge => write!(f, "payload too large"),
        }
    }
}

impl From<CommsError> for Error {
    fn from(e: CommsError) -> Self {
        Self::Comms(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
