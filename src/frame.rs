//! Frame encoding and incremental decoding.
//!
//! ```text
//! ┌──────────────┬──────────────┬─────────────────────┐
//! │ Length       │ Command ID   │ Payload             │
//! │ 4 bytes      │ 4 bytes      │ Length - 4 bytes    │
//! │ uint32 LE    │ uint32 LE    │                     │
//! └──────────────┴──────────────┴─────────────────────┘
//! ```
//!
//! The length field counts the command id and the payload, never itself.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::types::{
    Frame, Result, ViconError, COMMAND_ID_SIZE, LENGTH_FIELD_SIZE, MIN_FRAME_LENGTH,
};

/// Encode a frame into a freshly allocated buffer.
pub fn encode_frame(frame: &Frame) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(LENGTH_FIELD_SIZE + frame.wire_length());
    encode_frame_into(frame, &mut buf)?;
    Ok(buf.freeze())
}

/// Append the encoded frame to `dst`.
pub fn encode_frame_into(frame: &Frame, dst: &mut BytesMut) -> Result<()> {
    let length = u32::try_from(frame.wire_length()).map_err(|_| ViconError::FrameTooLarge {
        size: u32::MAX,
        max: u32::MAX,
    })?;

    dst.reserve(LENGTH_FIELD_SIZE + length as usize);
    dst.put_u32_le(length);
    dst.put_u32_le(frame.command_id);
    dst.put_slice(&frame.payload);
    Ok(())
}

/// Validate a declared length field.
pub fn check_length(length: u32, max_frame_size: u32) -> Result<()> {
    if length < MIN_FRAME_LENGTH {
        return Err(ViconError::MalformedFrame(length));
    }
    if length > max_frame_size {
        return Err(ViconError::FrameTooLarge {
            size: length,
            max: max_frame_size,
        });
    }
    Ok(())
}

/// Try to decode one frame from the front of `buf`.
///
/// Returns `Ok(None)` when more bytes are needed. On a bad length field the
/// buffer is left untouched.
pub fn try_decode_frame(buf: &mut BytesMut, max_frame_size: u32) -> Result<Option<Frame>> {
    if buf.len() < LENGTH_FIELD_SIZE {
        return Ok(None);
    }

    let length = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    check_length(length, max_frame_size)?;

    let total = LENGTH_FIELD_SIZE + length as usize;
    if buf.len() < total {
        buf.reserve(total - buf.len());
        return Ok(None);
    }

    buf.advance(LENGTH_FIELD_SIZE);
    let command_id = buf.get_u32_le();
    let payload = buf
        .split_to(length as usize - COMMAND_ID_SIZE)
        .freeze();

    Ok(Some(Frame {
        command_id,
        payload,
    }))
}
