//! SSH connection protocol messages (RFC 4254).
//!
//! This module carries exactly the connection-layer vocabulary the
//! interposer must understand and re-emit: channel opens and their failures,
//! channel requests and their failures, global requests and their replies,
//! plus the transport-generic `disconnect` and `ignore` messages it
//! synthesizes.
//!
//! Unknown channel types and request subtypes decode into `Other` variants
//! rather than failing: the filter's job is to classify and block them, and a
//! parse error would tear the connection down instead.
//!
//! # Example
//!
//! ```rust
//! use warden_proto::ssh::connection::{ChannelOpen, ChannelType};
//!
//! let open = ChannelOpen::new(ChannelType::Session, 0, 1048576, 32768);
//! let parsed = ChannelOpen::from_bytes(&open.to_bytes()).unwrap();
//! assert_eq!(parsed.channel_type(), &ChannelType::Session);
//! ```

use bytes::{BufMut, BytesMut};
use warden_platform::{WardenError, WardenResult};

/// The `no-more-sessions@openssh.com` global request name.
///
/// Once a server acknowledges it, it refuses further session-channel opens,
/// which is the contract the handoff relies on.
pub const NO_MORE_SESSIONS_REQUEST: &str = "no-more-sessions@openssh.com";

/// Maximum window size accepted when parsing (16 MB).
pub const MAX_WINDOW_SIZE: u32 = 16 * 1024 * 1024;

/// Maximum channel packet size accepted when parsing (256 KB).
pub const MAX_CHANNEL_PACKET_SIZE: u32 = 256 * 1024;

/// Channel type carried by SSH_MSG_CHANNEL_OPEN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelType {
    /// Session channel - the only type the interposer permits.
    Session,
    /// Any other channel type (direct-tcpip, x11, ...); always blocked.
    Other(String),
}

impl ChannelType {
    /// Returns the wire name of the channel type.
    pub fn name(&self) -> &str {
        match self {
            ChannelType::Session => "session",
            ChannelType::Other(name) => name,
        }
    }
}

/// SSH_MSG_CHANNEL_OPEN message (RFC 4254 Section 5.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelOpen {
    /// Channel type
    channel_type: ChannelType,
    /// Sender channel number
    sender_channel: u32,
    /// Initial window size
    initial_window_size: u32,
    /// Maximum packet size
    maximum_packet_size: u32,
    /// Type-specific trailing data, preserved verbatim
    type_specific: Vec<u8>,
}

impl ChannelOpen {
    /// Creates a new channel open message with no type-specific data.
    pub fn new(
        channel_type: ChannelType,
        sender_channel: u32,
        initial_window_size: u32,
        maximum_packet_size: u32,
    ) -> Self {
        Self {
            channel_type,
            sender_channel,
            initial_window_size,
            maximum_packet_size,
            type_specific: Vec::new(),
        }
    }

    /// Returns the channel type.
    pub fn channel_type(&self) -> &ChannelType {
        &self.channel_type
    }

    /// Returns the sender channel number.
    pub fn sender_channel(&self) -> u32 {
        self.sender_channel
    }

    /// Returns the initial window size.
    pub fn initial_window_size(&self) -> u32 {
        self.initial_window_size
    }

    /// Returns the maximum packet size.
    pub fn maximum_packet_size(&self) -> u32 {
        self.maximum_packet_size
    }

    /// Serializes to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();

        buf.put_u8(90);
        write_string(&mut buf, self.channel_type.name());
        buf.put_u32(self.sender_channel);
        buf.put_u32(self.initial_window_size);
        buf.put_u32(self.maximum_packet_size);
        buf.put_slice(&self.type_specific);

        buf.to_vec()
    }

    /// Parses from bytes.
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::Protocol`] on truncation or out-of-range window
    /// and packet sizes. Unknown channel types parse as
    /// [`ChannelType::Other`].
    pub fn from_bytes(data: &[u8]) -> WardenResult<Self> {
        expect_message(data, 90, "SSH_MSG_CHANNEL_OPEN")?;

        let mut offset = 1;

        let type_name = read_string(data, &mut offset)?;
        let sender_channel = read_u32(data, &mut offset)?;
        let initial_window_size = read_u32(data, &mut offset)?;
        let maximum_packet_size = read_u32(data, &mut offset)?;

        if initial_window_size > MAX_WINDOW_SIZE {
            return Err(WardenError::Protocol(format!(
                "Window size {} exceeds maximum {}",
                initial_window_size, MAX_WINDOW_SIZE
            )));
        }
        if maximum_packet_size > MAX_CHANNEL_PACKET_SIZE {
            return Err(WardenError::Protocol(format!(
                "Channel packet size {} exceeds maximum {}",
                maximum_packet_size, MAX_CHANNEL_PACKET_SIZE
            )));
        }

        let channel_type = match type_name.as_str() {
            "session" => ChannelType::Session,
            _ => ChannelType::Other(type_name),
        };

        Ok(Self {
            channel_type,
            sender_channel,
            initial_window_size,
            maximum_packet_size,
            type_specific: data[offset..].to_vec(),
        })
    }
}

/// Channel open failure reason codes (RFC 4254 Section 5.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ChannelOpenFailureReason {
    /// Administratively prohibited
    AdministrativelyProhibited = 1,
    /// Connect failed
    ConnectFailed = 2,
    /// Unknown channel type
    UnknownChannelType = 3,
    /// Resource shortage
    ResourceShortage = 4,
}

impl ChannelOpenFailureReason {
    /// Converts from u32.
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::AdministrativelyProhibited),
            2 => Some(Self::ConnectFailed),
            3 => Some(Self::UnknownChannelType),
            4 => Some(Self::ResourceShortage),
            _ => None,
        }
    }

    /// Returns the reason as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AdministrativelyProhibited => "Administratively prohibited",
            Self::ConnectFailed => "Connect failed",
            Self::UnknownChannelType => "Unknown channel type",
            Self::ResourceShortage => "Resource shortage",
        }
    }
}

/// SSH_MSG_CHANNEL_OPEN_FAILURE message (RFC 4254 Section 5.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelOpenFailure {
    /// Recipient channel number
    recipient_channel: u32,
    /// Reason code
    reason_code: ChannelOpenFailureReason,
    /// Description
    description: String,
    /// Language tag
    language_tag: String,
}

impl ChannelOpenFailure {
    /// Creates a new channel open failure message.
    pub fn new(recipient_channel: u32, reason_code: ChannelOpenFailureReason) -> Self {
        Self {
            recipient_channel,
            reason_code,
            description: reason_code.as_str().to_string(),
            language_tag: String::new(),
        }
    }

    /// Returns the recipient channel number.
    pub fn recipient_channel(&self) -> u32 {
        self.recipient_channel
    }

    /// Returns the reason code.
    pub fn reason_code(&self) -> ChannelOpenFailureReason {
        self.reason_code
    }

    /// Returns the description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Serializes to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();

        buf.put_u8(92);
        buf.put_u32(self.recipient_channel);
        buf.put_u32(self.reason_code as u32);
        write_string(&mut buf, &self.description);
        write_string(&mut buf, &self.language_tag);

        buf.to_vec()
    }

    /// Parses from bytes.
    pub fn from_bytes(data: &[u8]) -> WardenResult<Self> {
        expect_message(data, 92, "SSH_MSG_CHANNEL_OPEN_FAILURE")?;

        let mut offset = 1;

        let recipient_channel = read_u32(data, &mut offset)?;
        let reason_code_u32 = read_u32(data, &mut offset)?;
        let description = read_string(data, &mut offset)?;
        let language_tag = read_string(data, &mut offset)?;

        let reason_code = ChannelOpenFailureReason::from_u32(reason_code_u32).ok_or_else(|| {
            WardenError::Protocol(format!("Invalid failure reason code: {}", reason_code_u32))
        })?;

        Ok(Self {
            recipient_channel,
            reason_code,
            description,
            language_tag,
        })
    }
}

/// Channel request subtype (RFC 4254 Section 6).
///
/// Only `exec` is ever allowed through; everything else decodes as `Other`
/// so the filter can name it in the rejection log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelRequestType {
    /// Execute command
    Exec {
        /// Command to execute
        command: String,
    },
    /// Any other request subtype (shell, pty-req, subsystem, env, ...)
    Other {
        /// Request name
        name: String,
        /// Request-specific trailing data, preserved verbatim
        data: Vec<u8>,
    },
}

impl ChannelRequestType {
    /// Returns the request subtype name.
    pub fn name(&self) -> &str {
        match self {
            ChannelRequestType::Exec { .. } => "exec",
            ChannelRequestType::Other { name, .. } => name,
        }
    }
}

/// SSH_MSG_CHANNEL_REQUEST message (RFC 4254 Section 6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRequest {
    /// Recipient channel number
    recipient_channel: u32,
    /// Request subtype
    request_type: ChannelRequestType,
    /// Want reply flag
    want_reply: bool,
}

impl ChannelRequest {
    /// Creates a new channel request.
    pub fn new(recipient_channel: u32, request_type: ChannelRequestType, want_reply: bool) -> Self {
        Self {
            recipient_channel,
            request_type,
            want_reply,
        }
    }

    /// Returns the recipient channel number.
    pub fn recipient_channel(&self) -> u32 {
        self.recipient_channel
    }

    /// Returns the request subtype.
    pub fn request_type(&self) -> &ChannelRequestType {
        &self.request_type
    }

    /// Returns whether a reply is wanted.
    pub fn want_reply(&self) -> bool {
        self.want_reply
    }

    /// Serializes to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();

        buf.put_u8(98);
        buf.put_u32(self.recipient_channel);
        write_string(&mut buf, self.request_type.name());
        buf.put_u8(if self.want_reply { 1 } else { 0 });

        match &self.request_type {
            ChannelRequestType::Exec { command } => {
                write_string(&mut buf, command);
            }
            ChannelRequestType::Other { data, .. } => {
                buf.put_slice(data);
            }
        }

        buf.to_vec()
    }

    /// Parses from bytes. Unknown subtypes parse as
    /// [`ChannelRequestType::Other`].
    pub fn from_bytes(data: &[u8]) -> WardenResult<Self> {
        expect_message(data, 98, "SSH_MSG_CHANNEL_REQUEST")?;

        let mut offset = 1;

        let recipient_channel = read_u32(data, &mut offset)?;
        let request_name = read_string(data, &mut offset)?;

        if offset >= data.len() {
            return Err(WardenError::Protocol(
                "CHANNEL_REQUEST truncated (missing want_reply flag)".to_string(),
            ));
        }
        let want_reply = data[offset] != 0;
        offset += 1;

        let request_type = match request_name.as_str() {
            "exec" => {
                let command = read_string(data, &mut offset)?;
                ChannelRequestType::Exec { command }
            }
            _ => ChannelRequestType::Other {
                name: request_name,
                data: data[offset..].to_vec(),
            },
        };

        Ok(Self {
            recipient_channel,
            request_type,
            want_reply,
        })
    }
}

/// SSH_MSG_CHANNEL_FAILURE message (RFC 4254 Section 6.4).
///
/// Sent back to the client when a channel request is blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelFailure {
    /// Recipient channel number
    recipient_channel: u32,
}

impl ChannelFailure {
    /// Creates a new channel failure message.
    pub fn new(recipient_channel: u32) -> Self {
        Self { recipient_channel }
    }

    /// Returns the recipient channel number.
    pub fn recipient_channel(&self) -> u32 {
        self.recipient_channel
    }

    /// Serializes to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u8(100);
        buf.put_u32(self.recipient_channel);
        buf.to_vec()
    }

    /// Parses from bytes.
    pub fn from_bytes(data: &[u8]) -> WardenResult<Self> {
        expect_message(data, 100, "SSH_MSG_CHANNEL_FAILURE")?;

        let mut offset = 1;
        let recipient_channel = read_u32(data, &mut offset)?;

        Ok(Self { recipient_channel })
    }
}

/// SSH_MSG_GLOBAL_REQUEST message (RFC 4254 Section 4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalRequest {
    /// Request name (e.g., "no-more-sessions@openssh.com")
    name: String,
    /// Want reply flag
    want_reply: bool,
    /// Request-specific data, preserved verbatim
    data: Vec<u8>,
}

impl GlobalRequest {
    /// Creates a new global request with no request-specific data.
    pub fn new(name: &str, want_reply: bool) -> Self {
        Self {
            name: name.to_string(),
            want_reply,
            data: Vec::new(),
        }
    }

    /// Creates the `no-more-sessions@openssh.com` request.
    pub fn no_more_sessions() -> Self {
        Self::new(NO_MORE_SESSIONS_REQUEST, true)
    }

    /// Returns the request name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns whether a reply is wanted.
    pub fn want_reply(&self) -> bool {
        self.want_reply
    }

    /// Serializes to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();

        buf.put_u8(80);
        write_string(&mut buf, &self.name);
        buf.put_u8(if self.want_reply { 1 } else { 0 });
        buf.put_slice(&self.data);

        buf.to_vec()
    }

    /// Parses from bytes.
    pub fn from_bytes(data: &[u8]) -> WardenResult<Self> {
        expect_message(data, 80, "SSH_MSG_GLOBAL_REQUEST")?;

        let mut offset = 1;
        let name = read_string(data, &mut offset)?;

        if offset >= data.len() {
            return Err(WardenError::Protocol(
                "GLOBAL_REQUEST truncated (missing want_reply flag)".to_string(),
            ));
        }
        let want_reply = data[offset] != 0;
        offset += 1;

        Ok(Self {
            name,
            want_reply,
            data: data[offset..].to_vec(),
        })
    }
}

/// SSH_MSG_REQUEST_SUCCESS message (RFC 4254 Section 4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSuccess {
    /// Response-specific data
    data: Vec<u8>,
}

impl RequestSuccess {
    /// Creates a new request success message with no response data.
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Serializes to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u8(81);
        buf.put_slice(&self.data);
        buf.to_vec()
    }

    /// Parses from bytes.
    pub fn from_bytes(data: &[u8]) -> WardenResult<Self> {
        expect_message(data, 81, "SSH_MSG_REQUEST_SUCCESS")?;
        Ok(Self {
            data: data[1..].to_vec(),
        })
    }
}

impl Default for RequestSuccess {
    fn default() -> Self {
        Self::new()
    }
}

/// SSH_MSG_REQUEST_FAILURE message (RFC 4254 Section 4).
///
/// Also the response the filter sends back for blocked global requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestFailure;

impl RequestFailure {
    /// Creates a new request failure message.
    pub const fn new() -> Self {
        Self
    }

    /// Serializes to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        vec![82]
    }

    /// Parses from bytes.
    pub fn from_bytes(data: &[u8]) -> WardenResult<Self> {
        expect_message(data, 82, "SSH_MSG_REQUEST_FAILURE")?;
        Ok(Self)
    }
}

impl Default for RequestFailure {
    fn default() -> Self {
        Self::new()
    }
}

/// SSH_MSG_DISCONNECT message (RFC 4253 Section 11.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disconnect {
    /// Reason code
    reason_code: u32,
    /// Human-readable description
    description: String,
    /// Language tag
    language_tag: String,
}

impl Disconnect {
    /// Creates a new disconnect message.
    pub fn new(reason_code: u32, description: &str) -> Self {
        Self {
            reason_code,
            description: description.to_string(),
            language_tag: String::new(),
        }
    }

    /// Returns the reason code.
    pub fn reason_code(&self) -> u32 {
        self.reason_code
    }

    /// Returns the description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Serializes to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();

        buf.put_u8(1);
        buf.put_u32(self.reason_code);
        write_string(&mut buf, &self.description);
        write_string(&mut buf, &self.language_tag);

        buf.to_vec()
    }

    /// Parses from bytes.
    pub fn from_bytes(data: &[u8]) -> WardenResult<Self> {
        expect_message(data, 1, "SSH_MSG_DISCONNECT")?;

        let mut offset = 1;
        let reason_code = read_u32(data, &mut offset)?;
        let description = read_string(data, &mut offset)?;
        let language_tag = read_string(data, &mut offset)?;

        Ok(Self {
            reason_code,
            description,
            language_tag,
        })
    }
}

/// SSH_MSG_IGNORE message (RFC 4253 Section 11.2).
///
/// The proxy writes one toward the server for every blocked client packet so
/// the sequence numbers on both links stay aligned for the handoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ignore {
    /// Opaque data (ignored by the receiver)
    data: Vec<u8>,
}

impl Ignore {
    /// Creates an ignore message with empty data.
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Serializes to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u8(2);
        write_bytes(&mut buf, &self.data);
        buf.to_vec()
    }

    /// Parses from bytes.
    pub fn from_bytes(data: &[u8]) -> WardenResult<Self> {
        expect_message(data, 2, "SSH_MSG_IGNORE")?;

        let mut offset = 1;
        let payload = if data.len() > 1 {
            read_bytes(data, &mut offset)?
        } else {
            Vec::new()
        };

        Ok(Self { data: payload })
    }
}

impl Default for Ignore {
    fn default() -> Self {
        Self::new()
    }
}

// Helper functions for encoding/decoding

fn expect_message(data: &[u8], number: u8, name: &str) -> WardenResult<()> {
    if data.is_empty() {
        return Err(WardenError::Protocol(format!("{} message is empty", name)));
    }
    if data[0] != number {
        return Err(WardenError::Protocol(format!(
            "Invalid message type: expected {} ({}), got {}",
            number, name, data[0]
        )));
    }
    Ok(())
}

pub(crate) fn write_string(buf: &mut BytesMut, s: &str) {
    let bytes = s.as_bytes();
    buf.put_u32(bytes.len() as u32);
    buf.put_slice(bytes);
}

pub(crate) fn write_bytes(buf: &mut BytesMut, bytes: &[u8]) {
    buf.put_u32(bytes.len() as u32);
    buf.put_slice(bytes);
}

pub(crate) fn read_string(data: &[u8], offset: &mut usize) -> WardenResult<String> {
    let bytes = read_bytes(data, offset)?;
    String::from_utf8(bytes)
        .map_err(|_| WardenError::Protocol("String contains invalid UTF-8".to_string()))
}

pub(crate) fn read_bytes(data: &[u8], offset: &mut usize) -> WardenResult<Vec<u8>> {
    if *offset + 4 > data.len() {
        return Err(WardenError::Protocol(format!(
            "Cannot read length at offset {}",
            offset
        )));
    }

    let length = u32::from_be_bytes([
        data[*offset],
        data[*offset + 1],
        data[*offset + 2],
        data[*offset + 3],
    ]) as usize;
    *offset += 4;

    if *offset + length > data.len() {
        return Err(WardenError::Protocol(format!(
            "Data truncated: expected {} bytes at offset {}",
            length, offset
        )));
    }

    let bytes = data[*offset..*offset + length].to_vec();
    *offset += length;

    Ok(bytes)
}

pub(crate) fn read_u32(data: &[u8], offset: &mut usize) -> WardenResult<u32> {
    if *offset + 4 > data.len() {
        return Err(WardenError::Protocol(format!(
            "Cannot read u32 at offset {}",
            offset
        )));
    }

    let value = u32::from_be_bytes([
        data[*offset],
        data[*offset + 1],
        data[*offset + 2],
        data[*offset + 3],
    ]);
    *offset += 4;

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_open_session() {
        let open = ChannelOpen::new(ChannelType::Session, 0, 1048576, 32768);

        let bytes = open.to_bytes();
        let parsed = ChannelOpen::from_bytes(&bytes).unwrap();

        assert_eq!(parsed.channel_type(), &ChannelType::Session);
        assert_eq!(parsed.sender_channel(), 0);
        assert_eq!(parsed.initial_window_size(), 1048576);
        assert_eq!(parsed.maximum_packet_size(), 32768);
    }

    #[test]
    fn test_channel_open_unknown_type_classifies() {
        let open = ChannelOpen::new(
            ChannelType::Other("direct-tcpip".to_string()),
            3,
            1048576,
            32768,
        );

        let parsed = ChannelOpen::from_bytes(&open.to_bytes()).unwrap();
        assert_eq!(parsed.channel_type().name(), "direct-tcpip");
        assert_eq!(parsed.sender_channel(), 3);
    }

    #[test]
    fn test_channel_open_window_validation() {
        let mut data = ChannelOpen::new(ChannelType::Session, 0, 0, 32768).to_bytes();
        // Window size sits after type(90), string "session", sender channel.
        let window_offset = 1 + 4 + 7 + 4;
        data[window_offset] = 0xff;
        data[window_offset + 1] = 0xff;
        data[window_offset + 2] = 0xff;
        data[window_offset + 3] = 0xff;

        assert!(ChannelOpen::from_bytes(&data).is_err());
    }

    #[test]
    fn test_channel_open_failure_round_trip() {
        let failure =
            ChannelOpenFailure::new(7, ChannelOpenFailureReason::AdministrativelyProhibited);

        let parsed = ChannelOpenFailure::from_bytes(&failure.to_bytes()).unwrap();
        assert_eq!(parsed.recipient_channel(), 7);
        assert_eq!(
            parsed.reason_code(),
            ChannelOpenFailureReason::AdministrativelyProhibited
        );
        assert_eq!(parsed.description(), "Administratively prohibited");
    }

    #[test]
    fn test_channel_request_exec() {
        let request = ChannelRequest::new(
            0,
            ChannelRequestType::Exec {
                command: "ls -la".to_string(),
            },
            true,
        );

        let parsed = ChannelRequest::from_bytes(&request.to_bytes()).unwrap();
        assert!(parsed.want_reply());

        if let ChannelRequestType::Exec { command } = parsed.request_type() {
            assert_eq!(command, "ls -la");
        } else {
            panic!("Expected Exec request type");
        }
    }

    #[test]
    fn test_channel_request_unknown_subtype_classifies() {
        let request = ChannelRequest::new(
            2,
            ChannelRequestType::Other {
                name: "shell".to_string(),
                data: Vec::new(),
            },
            true,
        );

        let parsed = ChannelRequest::from_bytes(&request.to_bytes()).unwrap();
        assert_eq!(parsed.request_type().name(), "shell");
        assert_eq!(parsed.recipient_channel(), 2);
    }

    #[test]
    fn test_channel_request_truncated() {
        let bytes = ChannelRequest::new(
            0,
            ChannelRequestType::Exec {
                command: "x".to_string(),
            },
            true,
        )
        .to_bytes();

        let result = ChannelRequest::from_bytes(&bytes[..6]);
        assert!(matches!(result, Err(WardenError::Protocol(_))));
    }

    #[test]
    fn test_channel_failure_round_trip() {
        let failure = ChannelFailure::new(0);
        let parsed = ChannelFailure::from_bytes(&failure.to_bytes()).unwrap();
        assert_eq!(parsed.recipient_channel(), 0);
    }

    #[test]
    fn test_global_request_nms() {
        let request = GlobalRequest::no_more_sessions();
        assert_eq!(request.name(), NO_MORE_SESSIONS_REQUEST);
        assert!(request.want_reply());

        let parsed = GlobalRequest::from_bytes(&request.to_bytes()).unwrap();
        assert_eq!(parsed.name(), NO_MORE_SESSIONS_REQUEST);
    }

    #[test]
    fn test_global_request_other() {
        let request = GlobalRequest::new("tcpip-forward", true);
        let parsed = GlobalRequest::from_bytes(&request.to_bytes()).unwrap();
        assert_eq!(parsed.name(), "tcpip-forward");
    }

    #[test]
    fn test_request_replies_round_trip() {
        let success = RequestSuccess::new();
        assert_eq!(success.to_bytes()[0], 81);
        assert!(RequestSuccess::from_bytes(&success.to_bytes()).is_ok());

        let failure = RequestFailure::new();
        assert_eq!(failure.to_bytes(), vec![82]);
        assert!(RequestFailure::from_bytes(&failure.to_bytes()).is_ok());
    }

    #[test]
    fn test_disconnect_round_trip() {
        let disconnect = Disconnect::new(2, "Must issue no-more-sessions before handoff");

        let parsed = Disconnect::from_bytes(&disconnect.to_bytes()).unwrap();
        assert_eq!(parsed.reason_code(), 2);
        assert_eq!(
            parsed.description(),
            "Must issue no-more-sessions before handoff"
        );
    }

    #[test]
    fn test_ignore_round_trip() {
        let ignore = Ignore::new();
        let bytes = ignore.to_bytes();
        assert_eq!(bytes[0], 2);
        assert!(Ignore::from_bytes(&bytes).is_ok());
    }
}
