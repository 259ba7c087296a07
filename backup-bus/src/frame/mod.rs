//! Wire frames shared by every bus participant.
//!
//! A frame on the wire is five ASCII decimal digits holding the zero-padded
//! byte length of the payload, followed by the payload itself. The payload
//! starts with a fixed-width, space-padded service field:
//!
//! ```text
//! 00011bkpsvhello!
//! ^^^^^            byte length of "bkpsvhello!"
//!      ^^^^^       service field
//!           ^^^^^^ data
//! ```

pub mod codec;

pub use codec::FrameCodec;

use crate::utils::errors::FrameError;
use bytes::{BufMut, Bytes, BytesMut};
use std::borrow::Cow;

/// Width of the decimal length prefix.
pub const LENGTH_FIELD_LEN: usize = 5;

/// Width of the service field at the start of every payload.
pub const SERVICE_FIELD_LEN: usize = 5;

/// Largest payload the five-digit length field can describe.
pub const MAX_PAYLOAD_LEN: usize = 99_999;

/// Reserved target a service addresses when registering with the bus.
pub const REGISTRATION_TARGET: &str = "sinit";

/// One addressed unit of bus traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    service: String,
    data: Bytes,
}

impl Frame {
    /// Build a frame, enforcing the service name and payload size limits.
    pub fn new(service: impl Into<String>, data: impl Into<Bytes>) -> Result<Self, FrameError> {
        let service = service.into();
        validate_service_name(&service)?;
        let data = data.into();
        let payload_len = SERVICE_FIELD_LEN + data.len();
        if payload_len > MAX_PAYLOAD_LEN {
            return Err(FrameError::FrameTooLarge(payload_len));
        }
        Ok(Self { service, data })
    }

    /// Split a raw payload (as produced by [`FrameCodec`]) into its service
    /// field and data section.
    pub fn from_payload(payload: Bytes) -> Result<Self, FrameError> {
        if payload.len() < SERVICE_FIELD_LEN {
            return Err(FrameError::MissingServiceField(payload.len()));
        }
        let service = String::from_utf8_lossy(&payload[..SERVICE_FIELD_LEN])
            .trim_end_matches(' ')
            .to_string();
        let data = payload.slice(SERVICE_FIELD_LEN..);
        Ok(Self { service, data })
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Data section as text; invalid UTF-8 sequences are replaced.
    pub fn data_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.data)
    }

    pub fn into_data(self) -> Bytes {
        self.data
    }

    /// Byte length of the payload (service field plus data).
    pub fn payload_len(&self) -> usize {
        SERVICE_FIELD_LEN + self.data.len()
    }

    /// Append the full wire form (length prefix included) to `dst`.
    pub fn write_to(&self, dst: &mut BytesMut) {
        let payload_len = self.payload_len();
        dst.reserve(LENGTH_FIELD_LEN + payload_len);
        dst.put_slice(format!("{:05}", payload_len).as_bytes());
        dst.put_slice(format!("{:<5}", self.service).as_bytes());
        dst.put_slice(&self.data);
    }
}

/// Encode `data` addressed to `service` into its complete wire form.
///
/// Fails without touching any connection when the name or size is invalid.
pub fn encode(service: &str, data: &[u8]) -> Result<Bytes, FrameError> {
    let frame = Frame::new(service, Bytes::copy_from_slice(data))?;
    let mut buf = BytesMut::new();
    frame.write_to(&mut buf);
    Ok(buf.freeze())
}

/// Parse a five byte length field.
pub fn parse_length(field: &[u8]) -> Result<usize, FrameError> {
    if field.len() != LENGTH_FIELD_LEN || !field.iter().all(u8::is_ascii_digit) {
        return Err(FrameError::MalformedLength(
            String::from_utf8_lossy(field).into_owned(),
        ));
    }
    Ok(field
        .iter()
        .fold(0usize, |acc, digit| acc * 10 + usize::from(digit - b'0')))
}

fn validate_service_name(name: &str) -> Result<(), FrameError> {
    if name.len() > SERVICE_FIELD_LEN || !name.is_ascii() || name.chars().any(|c| c.is_ascii_control()) {
        return Err(FrameError::InvalidServiceName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_pads_service_and_prefixes_length() {
        let wire = encode("bkps", b"hello").unwrap();
        assert_eq!(&wire[..], b"00010bkps hello");
    }

    #[test]
    fn test_encode_full_width_service_name() {
        let wire = encode("bkpsv", b"hello!").unwrap();
        assert_eq!(&wire[..], b"00011bkpsvhello!");
    }

    #[test]
    fn test_encode_empty_data() {
        let wire = encode("sinit", b"").unwrap();
        assert_eq!(&wire[..], b"00005sinit");
    }

    #[test]
    fn test_encode_rejects_long_service_name() {
        assert!(matches!(
            encode("toolong", b"x"),
            Err(FrameError::InvalidServiceName(_))
        ));
        assert!(matches!(
            encode("ñame", b"x"),
            Err(FrameError::InvalidServiceName(_))
        ));
    }

    #[test]
    fn test_encode_payload_limit() {
        let fits = vec![b'a'; MAX_PAYLOAD_LEN - SERVICE_FIELD_LEN];
        let wire = encode("bkpsv", &fits).unwrap();
        assert_eq!(&wire[..5], b"99999");

        let too_big = vec![b'a'; MAX_PAYLOAD_LEN - SERVICE_FIELD_LEN + 1];
        assert!(matches!(
            encode("bkpsv", &too_big),
            Err(FrameError::FrameTooLarge(100_000))
        ));
    }

    #[test]
    fn test_length_counts_utf8_bytes() {
        // "é" is two bytes in UTF-8
        let wire = encode("rstrv", "é".as_bytes()).unwrap();
        assert_eq!(&wire[..5], b"00007");
    }

    #[test]
    fn test_parse_length() {
        assert_eq!(parse_length(b"00042").unwrap(), 42);
        assert_eq!(parse_length(b"99999").unwrap(), 99_999);
        assert!(matches!(parse_length(b"00a42"), Err(FrameError::MalformedLength(_))));
        assert!(matches!(parse_length(b"-0042"), Err(FrameError::MalformedLength(_))));
        assert!(matches!(parse_length(b" 0042"), Err(FrameError::MalformedLength(_))));
    }

    #[test]
    fn test_from_payload_splits_service_field() {
        let frame = Frame::from_payload(Bytes::from_static(b"clc  OKdone")).unwrap();
        assert_eq!(frame.service(), "clc");
        assert_eq!(&frame.data()[..], b"OKdone");

        assert!(matches!(
            Frame::from_payload(Bytes::from_static(b"abc")),
            Err(FrameError::MissingServiceField(3))
        ));
    }
}
