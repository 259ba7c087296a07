//! `tokio_util` codec for bus frames.
//!
//! Decoding yields the raw payload and never looks inside it; splitting off the
//! service field is [`Frame::from_payload`]'s job.

use super::{parse_length, Frame, LENGTH_FIELD_LEN, MAX_PAYLOAD_LEN};
use crate::utils::errors::FrameError;
use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

#[derive(Debug, Default, Clone, Copy)]
pub struct FrameCodec;

impl FrameCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, FrameError> {
        if src.len() < LENGTH_FIELD_LEN {
            return Ok(None);
        }

        let payload_len = parse_length(&src[..LENGTH_FIELD_LEN])?;
        let frame_len = LENGTH_FIELD_LEN + payload_len;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_FIELD_LEN);
        Ok(Some(src.split_to(payload_len).freeze()))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, FrameError> {
        match self.decode(src)? {
            Some(payload) => Ok(Some(payload)),
            None if src.is_empty() => Ok(None),
            None => Err(FrameError::ConnectionClosed),
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), FrameError> {
        if frame.payload_len() > MAX_PAYLOAD_LEN {
            return Err(FrameError::FrameTooLarge(frame.payload_len()));
        }
        frame.write_to(dst);
        Ok(())
    }
}
