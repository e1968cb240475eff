// src/error.rs

use std::io;
use thiserror::Error;

/// The primary error type for the `roomba-oi` library.
#[derive(Error, Debug)]
pub enum OiError {
    #[error("Invalid argument `{name}`: {value} is outside {min}..={max}")]
    InvalidArgument {
        name: &'static str,
        value: i32,
        min: i32,
        max: i32,
    },

    #[error("Unknown sensor packet id: {0}")]
    UnknownSensorId(u8),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Timeout waiting for the device: {0}")]
    Timeout(#[from] tokio::time::error::Elapsed),

    #[error("Incomplete packet {id}: expected {expected} bytes, got {actual} before the channel closed")]
    IncompletePacket { id: u8, expected: usize, actual: usize },

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("A sensor stream is active; pause it before issuing other commands")]
    StreamActive,

    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl OiError {
    pub(crate) fn out_of_range(name: &'static str, value: i32, min: i32, max: i32) -> Self {
        OiError::InvalidArgument { name, value, min, max }
    }

    /// Argument and sensor id errors, raised before anything is written.
    pub fn is_validation(&self) -> bool {
        matches!(self, OiError::InvalidArgument { .. } | OiError::UnknownSensorId(_))
    }

    pub fn is_protocol(&self) -> bool {
        matches!(self, OiError::Protocol(_))
    }
}

/// Violations found while decoding a stream frame.
///
/// These are recoverable: the stream worker reports them and keeps reading.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Frame does not start with the 0x13 marker (found {found:#04x})")]
    FrameSync { found: u8 },

    #[error("Frame length byte is {found}, expected {expected}")]
    LengthMismatch { expected: u8, found: u8 },

    #[error("Frame checksum failed: byte sum is {sum:#04x}, expected 0x00")]
    Checksum { sum: u8 },

    #[error("Frame carries unknown packet id {0}")]
    UnknownPacketInFrame(u8),

    #[error("Packet {id} at offset {offset} runs past the checksum byte")]
    PacketOverrun { id: u8, offset: usize },

    #[error("Frame packet #{index} is id {found}, requested id {expected}")]
    UnexpectedPacket { index: usize, expected: u8, found: u8 },

    #[error("Frame carries {found} packets, requested {expected}")]
    PacketCount { expected: usize, found: usize },
}
