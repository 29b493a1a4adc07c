//! tokio-util codec over the DataStream framing, for `Framed` streams.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::frame::{encode_frame_into, try_decode_frame};
use crate::types::{Frame, ViconError, DEFAULT_MAX_FRAME_SIZE};

#[derive(Debug, Clone)]
pub struct ViconFrameCodec {
    max_frame_size: u32,
}

impl ViconFrameCodec {
    pub fn new(max_frame_size: u32) -> Self {
        Self { max_frame_size }
    }

    pub fn max_frame_size(&self) -> u32 {
        self.max_frame_size
    }
}

impl Default for ViconFrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl Decoder for ViconFrameCodec {
    type Item = Frame;
    type Error = ViconError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        try_decode_frame(src, self.max_frame_size)
    }
}

impl Encoder<Frame> for ViconFrameCodec {
    type Error = ViconError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_frame_into(&item, dst)
    }
}
