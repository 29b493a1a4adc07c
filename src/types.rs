//! Core types for the DataStream protocol: commands, frames, poses and errors.

use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default DataStream port.
pub const DEFAULT_PORT: u16 = 801;

/// Size of the length prefix on every frame.
pub const LENGTH_FIELD_SIZE: usize = 4;

/// Size of the command id field that follows the length prefix.
pub const COMMAND_ID_SIZE: usize = 4;

/// Smallest legal value of the length field (command id, empty payload).
pub const MIN_FRAME_LENGTH: u32 = COMMAND_ID_SIZE as u32;

/// Default upper bound on a declared frame length (1 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 1024 * 1024;

/// Commands understood by the server in ClientPull mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum CommandId {
    GetFrame = 1,
    GetSubjectCount = 2,
    GetSubjectName = 3,
    GetSegmentCount = 4,
    GetSegmentGlobalTranslation = 6,
    EnableSegmentData = 9,
    GetSegmentGlobalRotationQuaternion = 12,
}

impl CommandId {
    /// Raw wire value.
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Whether the client waits for a response after sending this command.
    ///
    /// GetFrame and EnableSegmentData are fire-and-forget: the server may
    /// answer them or not, and the client never blocks on it.
    pub fn expects_response(self) -> bool {
        !matches!(self, CommandId::GetFrame | CommandId::EnableSegmentData)
    }
}

impl TryFrom<u32> for CommandId {
    type Error = u32;

    fn try_from(value: u32) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(CommandId::GetFrame),
            2 => Ok(CommandId::GetSubjectCount),
            3 => Ok(CommandId::GetSubjectName),
            4 => Ok(CommandId::GetSegmentCount),
            6 => Ok(CommandId::GetSegmentGlobalTranslation),
            9 => Ok(CommandId::EnableSegmentData),
            12 => Ok(CommandId::GetSegmentGlobalRotationQuaternion),
            other => Err(other),
        }
    }
}

/// One length-prefixed unit on the byte stream, in either direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command_id: u32,
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame with an empty payload
    pub fn new(command: CommandId) -> Self {
        Self {
            command_id: command.as_u32(),
            payload: Bytes::new(),
        }
    }

    /// Attach a payload
    pub fn with_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Decoded command id, if it is one this client knows.
    pub fn command(&self) -> Option<CommandId> {
        CommandId::try_from(self.command_id).ok()
    }

    /// Value of the length field for this frame.
    pub fn wire_length(&self) -> usize {
        COMMAND_ID_SIZE + self.payload.len()
    }
}

/// Global position of a segment, in the server's units (millimetres for Vicon).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Translation {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl From<[f64; 3]> for Translation {
    fn from([x, y, z]: [f64; 3]) -> Self {
        Self { x, y, z }
    }
}

/// Global orientation of a segment as a unit quaternion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rotation {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl From<[f64; 4]> for Rotation {
    fn from([x, y, z, w]: [f64; 4]) -> Self {
        Self { x, y, z, w }
    }
}

/// Pose of one segment in the current capture frame.
///
/// Either half is `None` when the server has no data for it: the object is
/// outside the capture volume, the name is unknown, or no frame has been
/// captured yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub translation: Option<Translation>,
    pub rotation: Option<Rotation>,
}

impl Pose {
    /// True when the segment has a position this frame.
    pub fn is_visible(&self) -> bool {
        self.translation.is_some()
    }
}

/// Errors produced by the client, transport and framing layers
#[derive(Debug, Error)]
pub enum ViconError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("send failed: {0}")]
    Send(#[source] std::io::Error),

    #[error("receive failed: {0}")]
    Receive(#[source] std::io::Error),

    #[error("malformed frame: declared length {0} is below the minimum of 4")]
    MalformedFrame(u32),

    #[error("frame too large: declared length {size} exceeds maximum {max}")]
    FrameTooLarge { size: u32, max: u32 },

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("name {0:?} contains a NUL byte")]
    InvalidName(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ViconError {
    /// Whether the connection is no longer usable after this error.
    ///
    /// A polling loop stops issuing commands when this returns true.
    pub fn is_connection_level(&self) -> bool {
        !matches!(self, ViconError::InvalidName(_) | ViconError::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, ViconError>;
