//! SSH protocol version exchange (RFC 4253 Section 4.2).
//!
//! Connections begin with an identification line:
//!
//! ```text
//! SSH-protoversion-softwareversion SP comments CR LF
//! ```
//!
//! The interposer performs a *transparent version echo*: the server's banner
//! is read first and re-sent to the client verbatim, and the client's banner
//! is written onward to the server, so each peer observes the other's
//! identification unchanged.
//!
//! # Example
//!
//! ```rust
//! use warden_proto::ssh::version::Version;
//!
//! let parsed = Version::parse("SSH-2.0-OpenSSH_8.9").unwrap();
//! assert_eq!(parsed.software(), "OpenSSH_8.9");
//! ```

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use warden_platform::{WardenError, WardenResult};

/// Maximum length of an SSH identification line (RFC 4253 Section 4.2).
pub const MAX_VERSION_LENGTH: usize = 255;

/// SSH protocol identification string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    /// Protocol version (e.g., "2.0")
    proto_version: String,
    /// Software version (e.g., "Warden_0.1.0")
    software_version: String,
    /// Optional comments
    comments: Option<String>,
}

impl Version {
    /// Creates a new version string with protocol version "2.0".
    pub fn new(software: &str, comments: Option<&str>) -> Self {
        Self {
            proto_version: "2.0".to_string(),
            software_version: software.to_string(),
            comments: comments.map(String::from),
        }
    }

    /// Returns the default Warden identification.
    pub fn default_warden() -> Self {
        Self::new(&format!("Warden_{}", env!("CARGO_PKG_VERSION")), None)
    }

    /// Parses an SSH identification line (with or without CR LF).
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::Protocol`] if the line is too long, contains a
    /// null byte, does not start with `SSH-`, or carries an unsupported
    /// protocol version.
    pub fn parse(line: &str) -> WardenResult<Self> {
        let line = line.trim_end_matches("\r\n").trim_end_matches('\n');

        if line.len() > MAX_VERSION_LENGTH {
            return Err(WardenError::Protocol(format!(
                "Version string too long: {} bytes (max {})",
                line.len(),
                MAX_VERSION_LENGTH
            )));
        }

        if line.contains('\0') {
            return Err(WardenError::Protocol(
                "Version string contains null byte".to_string(),
            ));
        }

        if !line.starts_with("SSH-") {
            return Err(WardenError::Protocol(format!(
                "Invalid version string: must start with 'SSH-', got '{}'",
                line
            )));
        }

        let parts: Vec<&str> = line.splitn(3, '-').collect();
        if parts.len() < 3 {
            return Err(WardenError::Protocol(format!(
                "Invalid version string format: '{}'",
                line
            )));
        }

        let proto_version = parts[1];
        let rest = parts[2];

        if proto_version != "2.0" && proto_version != "1.99" {
            return Err(WardenError::Protocol(format!(
                "Unsupported protocol version: '{}' (expected '2.0' or '1.99')",
                proto_version
            )));
        }

        let (software_version, comments) = if let Some(space_pos) = rest.find(' ') {
            let software = rest[..space_pos].to_string();
            let comments = rest[space_pos + 1..].trim().to_string();
            (software, Some(comments))
        } else {
            (rest.to_string(), None)
        };

        Ok(Self {
            proto_version: proto_version.to_string(),
            software_version,
            comments,
        })
    }

    /// Returns the protocol version (e.g., "2.0").
    pub fn proto_version(&self) -> &str {
        &self.proto_version
    }

    /// Returns the software version.
    pub fn software(&self) -> &str {
        &self.software_version
    }

    /// Returns the comments, if any.
    pub fn comments(&self) -> Option<&str> {
        self.comments.as_deref()
    }

    /// Converts to wire format (with CR LF).
    pub fn to_wire_format(&self) -> Vec<u8> {
        format!("{}\r\n", self).into_bytes()
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SSH-{}-{}", self.proto_version, self.software_version)?;
        if let Some(comments) = &self.comments {
            write!(f, " {}", comments)?;
        }
        Ok(())
    }
}

/// Reads one identification line from the stream.
///
/// Reads byte-by-byte until LF, bounding the line at [`MAX_VERSION_LENGTH`].
pub async fn read_version<R>(stream: &mut R) -> WardenResult<Version>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = Vec::new();
    let mut byte = [0u8; 1];

    loop {
        stream.read_exact(&mut byte).await.map_err(WardenError::Io)?;
        buffer.push(byte[0]);

        if byte[0] == b'\n' {
            break;
        }

        if buffer.len() > MAX_VERSION_LENGTH {
            return Err(WardenError::Protocol("Version string too long".to_string()));
        }
    }

    Version::parse(&String::from_utf8_lossy(&buffer))
}

/// Writes an identification line to the stream.
pub async fn write_version<W>(stream: &mut W, version: &Version) -> WardenResult<()>
where
    W: AsyncWrite + Unpin,
{
    stream
        .write_all(&version.to_wire_format())
        .await
        .map_err(WardenError::Io)?;
    stream.flush().await.map_err(WardenError::Io)?;
    Ok(())
}

/// Sends `ours` and reads the peer's identification line.
///
/// The interposer calls this toward the client with the *server's* banner as
/// `ours`, which is what makes the version echo transparent.
pub async fn exchange_versions<S>(stream: &mut S, ours: &Version) -> WardenResult<Version>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    write_version(stream, ours).await?;
    read_version(stream).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_new() {
        let version = Version::new("Warden_0.1.0", None);
        assert_eq!(version.proto_version(), "2.0");
        assert_eq!(version.software(), "Warden_0.1.0");
        assert_eq!(version.comments(), None);
    }

    #[test]
    fn test_version_display() {
        let version = Version::new("Warden_0.1.0", None);
        assert_eq!(version.to_string(), "SSH-2.0-Warden_0.1.0");

        let with_comments = Version::new("Warden_0.1.0", Some("interposer"));
        assert_eq!(with_comments.to_string(), "SSH-2.0-Warden_0.1.0 interposer");
    }

    #[test]
    fn test_version_parse() {
        let version = Version::parse("SSH-2.0-OpenSSH_8.9").unwrap();
        assert_eq!(version.proto_version(), "2.0");
        assert_eq!(version.software(), "OpenSSH_8.9");
        assert_eq!(version.comments(), None);
    }

    #[test]
    fn test_version_parse_with_comments() {
        let version = Version::parse("SSH-2.0-OpenSSH_8.9 Ubuntu-3ubuntu0.1").unwrap();
        assert_eq!(version.software(), "OpenSSH_8.9");
        assert_eq!(version.comments(), Some("Ubuntu-3ubuntu0.1"));
    }

    #[test]
    fn test_version_parse_with_crlf() {
        let version = Version::parse("SSH-2.0-OpenSSH_8.9\r\n").unwrap();
        assert_eq!(version.software(), "OpenSSH_8.9");
    }

    #[test]
    fn test_version_parse_invalid_prefix() {
        let result = Version::parse("INVALID-2.0-Test");
        assert!(matches!(result, Err(WardenError::Protocol(_))));
    }

    #[test]
    fn test_version_parse_unsupported_protocol() {
        let result = Version::parse("SSH-1.0-OldClient");
        match result {
            Err(WardenError::Protocol(msg)) => {
                assert!(msg.contains("Unsupported protocol version"));
            }
            _ => panic!("Expected Protocol error"),
        }
    }

    #[test]
    fn test_version_parse_too_long() {
        let long_string = format!("SSH-2.0-{}", "A".repeat(300));
        assert!(Version::parse(&long_string).is_err());
    }

    #[test]
    fn test_version_wire_format() {
        let version = Version::new("Warden_0.1.0", None);
        assert_eq!(version.to_wire_format(), b"SSH-2.0-Warden_0.1.0\r\n");
    }

    #[tokio::test]
    async fn test_version_echo_over_duplex() {
        let (mut near, mut far) = tokio::io::duplex(256);

        let server_banner = Version::new("OpenSSH_9.6", None);
        let peer = tokio::spawn(async move {
            // The far end plays the client: reads the echoed banner, sends
            // its own.
            let echoed = read_version(&mut far).await.unwrap();
            write_version(&mut far, &Version::new("OpenSSH_8.9", None))
                .await
                .unwrap();
            echoed
        });

        let client_version = exchange_versions(&mut near, &server_banner).await.unwrap();
        assert_eq!(client_version.software(), "OpenSSH_8.9");

        let echoed = peer.await.unwrap();
        assert_eq!(echoed.software(), "OpenSSH_9.6");
    }
}
