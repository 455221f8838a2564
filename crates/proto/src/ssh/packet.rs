//! SSH binary packet protocol (RFC 4253 Section 6).
//!
//! # Packet Format
//!
//! ```text
//! uint32    packet_length
//! byte      padding_length
//! byte[n1]  payload (n1 = packet_length - padding_length - 1)
//! byte[n2]  random padding (n2 = padding_length)
//! ```
//!
//! # Constraints
//!
//! - `packet_length` does not include the length field itself
//! - padding is 4..=255 bytes; total size is a multiple of 8
//! - maximum packet size: 35000 bytes (RFC 4253 Section 6.1)
//!
//! # Example
//!
//! ```rust
//! use warden_proto::ssh::Packet;
//!
//! let packet = Packet::new(b"payload".to_vec());
//! let bytes = packet.to_bytes();
//! let parsed = Packet::from_bytes(&bytes).unwrap();
//! assert_eq!(parsed.payload(), b"payload");
//! ```

use bytes::{Buf, BufMut, BytesMut};
use rand::RngCore;
use warden_platform::{WardenError, WardenResult};

/// Maximum packet size in bytes (RFC 4253 Section 6.1).
pub const MAX_PACKET_SIZE: usize = 35000;

/// Minimum total packet size once aligned to the 8-byte block boundary.
pub const MIN_PACKET_SIZE: usize = 16;

/// Minimum padding length in bytes (RFC 4253 Section 6).
pub const MIN_PADDING_LEN: u8 = 4;

/// Maximum padding length in bytes.
pub const MAX_PADDING_LEN: u8 = 255;

/// An SSH binary packet: a payload plus its random padding.
///
/// The interposer relays packets in the pre-handoff "None" keying posture,
/// so no MAC trailer is carried here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    payload: Vec<u8>,
    padding: Vec<u8>,
}

impl Packet {
    /// Creates a packet with the given payload, padded to meet RFC 4253
    /// requirements (minimum 4 bytes, total size a multiple of 8, padding
    /// filled from a cryptographically secure RNG).
    ///
    /// # Panics
    ///
    /// Panics if the payload cannot fit within [`MAX_PACKET_SIZE`].
    pub fn new(payload: Vec<u8>) -> Self {
        // total = 4 (length field) + 1 (padding_length) + payload + padding,
        // and must be a multiple of the 8-byte block size.
        let header_len = 5;
        let unpadded_len = header_len + payload.len();
        let block_size = 8;

        let mut padding_len = MIN_PADDING_LEN as usize;
        while (unpadded_len + padding_len) % block_size != 0 {
            padding_len += 1;
        }

        assert!(
            padding_len <= MAX_PADDING_LEN as usize,
            "Payload too large, cannot add sufficient padding"
        );

        let mut padding = vec![0u8; padding_len];
        rand::thread_rng().fill_bytes(&mut padding);

        let total_size = unpadded_len + padding_len;
        assert!(
            total_size <= MAX_PACKET_SIZE,
            "Packet size {} exceeds maximum {}",
            total_size,
            MAX_PACKET_SIZE
        );

        Self { payload, padding }
    }

    /// Returns the payload.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Returns the padding.
    pub fn padding(&self) -> &[u8] {
        &self.padding
    }

    /// Returns the SSH message number (first payload byte), if any.
    pub fn message_number(&self) -> Option<u8> {
        self.payload.first().copied()
    }

    /// Serializes to wire format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let packet_length = 1 + self.payload.len() + self.padding.len();
        let mut buf = BytesMut::with_capacity(4 + packet_length);

        buf.put_u32(packet_length as u32);
        buf.put_u8(self.padding.len() as u8);
        buf.put_slice(&self.payload);
        buf.put_slice(&self.padding);

        buf.to_vec()
    }

    /// Parses a packet from wire format.
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::Protocol`] if the data is shorter than the
    /// declared length, the length exceeds [`MAX_PACKET_SIZE`], or the
    /// padding length is out of range.
    pub fn from_bytes(data: &[u8]) -> WardenResult<Self> {
        if data.len() < 5 {
            return Err(WardenError::Protocol(format!(
                "Packet too short: {} bytes (minimum 5)",
                data.len()
            )));
        }

        let mut buf = data;
        let packet_length = buf.get_u32() as usize;

        if packet_length > MAX_PACKET_SIZE {
            return Err(WardenError::Protocol(format!(
                "Packet too large: {} bytes (maximum {})",
                packet_length, MAX_PACKET_SIZE
            )));
        }

        if packet_length < 5 {
            return Err(WardenError::Protocol(format!(
                "Packet too small: {} bytes declared",
                packet_length
            )));
        }

        if buf.len() < packet_length {
            return Err(WardenError::Protocol(format!(
                "Incomplete packet: expected {} bytes, got {} bytes",
                packet_length,
                buf.len()
            )));
        }

        let padding_length = buf.get_u8() as usize;

        if padding_length < MIN_PADDING_LEN as usize {
            return Err(WardenError::Protocol(format!(
                "Padding too short: {} bytes (minimum {})",
                padding_length, MIN_PADDING_LEN
            )));
        }

        if packet_length < 1 + padding_length {
            return Err(WardenError::Protocol(format!(
                "Invalid packet: declared length {} too small for padding {}",
                packet_length, padding_length
            )));
        }

        let payload_length = packet_length - 1 - padding_length;

        if buf.len() < payload_length + padding_length {
            return Err(WardenError::Protocol(format!(
                "Truncated packet body: expected {} bytes, got {}",
                payload_length + padding_length,
                buf.len()
            )));
        }

        let payload = buf[..payload_length].to_vec();
        buf.advance(payload_length);
        let padding = buf[..padding_length].to_vec();

        Ok(Self { payload, padding })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_new() {
        let payload = b"Hello, SSH!".to_vec();
        let packet = Packet::new(payload.clone());

        assert_eq!(packet.payload(), &payload[..]);
        assert!(packet.padding().len() >= MIN_PADDING_LEN as usize);
        assert!(packet.padding().len() <= MAX_PADDING_LEN as usize);
    }

    #[test]
    fn test_packet_alignment() {
        let packet = Packet::new(b"test".to_vec());

        let total_size = 4 + 1 + packet.payload().len() + packet.padding().len();
        assert_eq!(total_size % 8, 0, "Packet not aligned to 8-byte boundary");
    }

    #[test]
    fn test_packet_round_trip() {
        let payload = b"Warden packet payload".to_vec();
        let packet = Packet::new(payload.clone());

        let bytes = packet.to_bytes();
        let parsed = Packet::from_bytes(&bytes).unwrap();

        assert_eq!(parsed.payload(), &payload[..]);
        assert_eq!(parsed.padding().len(), packet.padding().len());
    }

    #[test]
    fn test_packet_message_number() {
        let packet = Packet::new(vec![80, 0, 0, 0, 0]);
        assert_eq!(packet.message_number(), Some(80));

        let empty = Packet::new(Vec::new());
        assert_eq!(empty.message_number(), None);
    }

    #[test]
    fn test_packet_minimum_size() {
        let packet = Packet::new(b"x".to_vec());
        let bytes = packet.to_bytes();

        assert!(bytes.len() >= MIN_PACKET_SIZE);
    }

    #[test]
    fn test_packet_invalid_too_short() {
        let data = vec![0, 0, 0, 10];
        let result = Packet::from_bytes(&data);

        assert!(matches!(result, Err(WardenError::Protocol(_))));
    }

    #[test]
    fn test_packet_invalid_padding_too_short() {
        let data = vec![
            0, 0, 0, 8, // packet_length = 8
            2, // padding_length = 2 (< MIN_PADDING_LEN)
            0x48, 0x65, 0x6c, 0x6c, 0x6f, // payload "Hello"
            0x00, 0x00, // padding
        ];
        let result = Packet::from_bytes(&data);

        match result {
            Err(WardenError::Protocol(msg)) => {
                assert!(msg.contains("Padding too short"));
            }
            _ => panic!("Expected Protocol error"),
        }
    }

    #[test]
    fn test_packet_invalid_incomplete() {
        let data = vec![
            0, 0, 0, 20, // packet_length = 20
            4,  // padding_length = 4
            0x48, 0x65, // truncated payload
        ];
        let result = Packet::from_bytes(&data);

        assert!(matches!(result, Err(WardenError::Protocol(_))));
    }

    #[test]
    fn test_packet_declared_too_large() {
        let mut data = vec![0u8; 16];
        data[0] = 0xff;
        data[1] = 0xff;
        let result = Packet::from_bytes(&data);

        assert!(matches!(result, Err(WardenError::Protocol(_))));
    }
}
