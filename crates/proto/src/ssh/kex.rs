//! SSH key exchange messages (RFC 4253 Section 7).
//!
//! The interposer needs only the establishment half of key exchange: both
//! sides announce algorithms with SSH_MSG_KEXINIT, the session identifier is
//! derived from the exchanged material, and SSH_MSG_NEWKEYS marks the
//! transition. Method-specific key exchange (the SSH_MSG_KEXDH_* family) is
//! outside the interposer's concern: after handoff those packets are relayed
//! as opaque bytes between client and server.
//!
//! # Example
//!
//! ```rust
//! use warden_proto::ssh::kex::{KexInit, NewKeys};
//!
//! let kexinit = KexInit::new_default();
//! assert_eq!(kexinit.to_bytes()[0], 20);
//!
//! let newkeys = NewKeys::new();
//! assert_eq!(newkeys.to_bytes(), vec![21]);
//! ```

use bytes::{BufMut, BytesMut};
use rand::RngCore;
use sha2::{Digest, Sha256};
use warden_platform::{WardenError, WardenResult};

/// SSH_MSG_KEXINIT message (RFC 4253 Section 7.1).
///
/// Each algorithm list is a comma-separated name-list ordered by preference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KexInit {
    /// Random cookie (16 bytes)
    cookie: [u8; 16],
    /// Key exchange algorithms
    kex_algorithms: Vec<String>,
    /// Server host key algorithms
    server_host_key_algorithms: Vec<String>,
    /// Encryption algorithms client to server
    encryption_algorithms_client_to_server: Vec<String>,
    /// Encryption algorithms server to client
    encryption_algorithms_server_to_client: Vec<String>,
    /// MAC algorithms client to server
    mac_algorithms_client_to_server: Vec<String>,
    /// MAC algorithms server to client
    mac_algorithms_server_to_client: Vec<String>,
    /// Compression algorithms client to server
    compression_algorithms_client_to_server: Vec<String>,
    /// Compression algorithms server to client
    compression_algorithms_server_to_client: Vec<String>,
    /// Languages client to server (usually empty)
    languages_client_to_server: Vec<String>,
    /// Languages server to client (usually empty)
    languages_server_to_client: Vec<String>,
    /// First KEX packet follows
    first_kex_packet_follows: bool,
}

impl KexInit {
    /// Creates a KEXINIT announcing the interposer's pre-handoff posture:
    /// the `none` cipher/MAC suite with a null host key. The real algorithm
    /// negotiation happens between client and server at handoff time and
    /// passes through the relay opaquely.
    pub fn new_default() -> Self {
        let mut cookie = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut cookie);

        Self {
            cookie,
            kex_algorithms: vec!["warden-session@warden-ssh.dev".to_string()],
            server_host_key_algorithms: vec!["null".to_string()],
            encryption_algorithms_client_to_server: vec!["none".to_string()],
            encryption_algorithms_server_to_client: vec!["none".to_string()],
            mac_algorithms_client_to_server: vec!["none".to_string()],
            mac_algorithms_server_to_client: vec!["none".to_string()],
            compression_algorithms_client_to_server: vec!["none".to_string()],
            compression_algorithms_server_to_client: vec!["none".to_string()],
            languages_client_to_server: vec![],
            languages_server_to_client: vec![],
            first_kex_packet_follows: false,
        }
    }

    /// Creates a KEXINIT advertising the given host key, for server-role
    /// transports.
    pub fn with_host_key(host_key: &dyn crate::ssh::hostkey::HostKey) -> Self {
        let mut kex_init = Self::new_default();
        kex_init.server_host_key_algorithms = vec![host_key.algorithm_name().to_string()];
        kex_init
    }

    /// Returns the cookie.
    pub fn cookie(&self) -> &[u8; 16] {
        &self.cookie
    }

    /// Returns the key exchange algorithms.
    pub fn kex_algorithms(&self) -> &[String] {
        &self.kex_algorithms
    }

    /// Returns the server host key algorithms.
    pub fn server_host_key_algorithms(&self) -> &[String] {
        &self.server_host_key_algorithms
    }

    /// Returns whether the first KEX packet follows.
    pub fn first_kex_packet_follows(&self) -> bool {
        self.first_kex_packet_follows
    }

    /// Serializes the KEXINIT message (without packet framing).
    ///
    /// Format (RFC 4253 Section 7.1):
    /// ```text
    /// byte         SSH_MSG_KEXINIT (20)
    /// byte[16]     cookie
    /// name-list    x10 (kex, host key, cipher x2, mac x2, compression x2, language x2)
    /// boolean      first_kex_packet_follows
    /// uint32       0 (reserved)
    /// ```
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();

        buf.put_u8(20);
        buf.put_slice(&self.cookie);

        write_name_list(&mut buf, &self.kex_algorithms);
        write_name_list(&mut buf, &self.server_host_key_algorithms);
        write_name_list(&mut buf, &self.encryption_algorithms_client_to_server);
        write_name_list(&mut buf, &self.encryption_algorithms_server_to_client);
        write_name_list(&mut buf, &self.mac_algorithms_client_to_server);
        write_name_list(&mut buf, &self.mac_algorithms_server_to_client);
        write_name_list(&mut buf, &self.compression_algorithms_client_to_server);
        write_name_list(&mut buf, &self.compression_algorithms_server_to_client);
        write_name_list(&mut buf, &self.languages_client_to_server);
        write_name_list(&mut buf, &self.languages_server_to_client);

        buf.put_u8(if self.first_kex_packet_follows { 1 } else { 0 });
        buf.put_u32(0);

        buf.to_vec()
    }

    /// Parses a KEXINIT message.
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::Protocol`] if the message is truncated or does
    /// not carry the KEXINIT number.
    pub fn from_bytes(data: &[u8]) -> WardenResult<Self> {
        if data.is_empty() {
            return Err(WardenError::Protocol("KEXINIT message is empty".to_string()));
        }

        if data[0] != 20 {
            return Err(WardenError::Protocol(format!(
                "Invalid message type: expected 20 (SSH_MSG_KEXINIT), got {}",
                data[0]
            )));
        }

        if data.len() < 17 {
            return Err(WardenError::Protocol(format!(
                "KEXINIT message too short: {} bytes (minimum 17)",
                data.len()
            )));
        }

        let mut cookie = [0u8; 16];
        cookie.copy_from_slice(&data[1..17]);

        let mut offset = 17;

        let kex_algorithms = read_name_list(data, &mut offset)?;
        let server_host_key_algorithms = read_name_list(data, &mut offset)?;
        let encryption_algorithms_client_to_server = read_name_list(data, &mut offset)?;
        let encryption_algorithms_server_to_client = read_name_list(data, &mut offset)?;
        let mac_algorithms_client_to_server = read_name_list(data, &mut offset)?;
        let mac_algorithms_server_to_client = read_name_list(data, &mut offset)?;
        let compression_algorithms_client_to_server = read_name_list(data, &mut offset)?;
        let compression_algorithms_server_to_client = read_name_list(data, &mut offset)?;
        let languages_client_to_server = read_name_list(data, &mut offset)?;
        let languages_server_to_client = read_name_list(data, &mut offset)?;

        if offset >= data.len() {
            return Err(WardenError::Protocol(
                "KEXINIT message truncated (missing first_kex_packet_follows)".to_string(),
            ));
        }
        let first_kex_packet_follows = data[offset] != 0;
        offset += 1;

        if offset + 4 > data.len() {
            return Err(WardenError::Protocol(
                "KEXINIT message truncated (missing reserved field)".to_string(),
            ));
        }

        Ok(Self {
            cookie,
            kex_algorithms,
            server_host_key_algorithms,
            encryption_algorithms_client_to_server,
            encryption_algorithms_server_to_client,
            mac_algorithms_client_to_server,
            mac_algorithms_server_to_client,
            compression_algorithms_client_to_server,
            compression_algorithms_server_to_client,
            languages_client_to_server,
            languages_server_to_client,
            first_kex_packet_follows,
        })
    }
}

/// SSH_MSG_NEWKEYS message (RFC 4253 Section 7.3).
///
/// A single byte with value 21. During forwarding, observing it is what ends
/// a direction's relay task: the handoff key exchange has begun end-to-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NewKeys;

impl NewKeys {
    /// Creates a new SSH_MSG_NEWKEYS message.
    pub const fn new() -> Self {
        Self
    }

    /// Serializes the NEWKEYS message.
    pub fn to_bytes(&self) -> Vec<u8> {
        vec![21]
    }

    /// Parses a NEWKEYS message.
    pub fn from_bytes(data: &[u8]) -> WardenResult<Self> {
        if data.is_empty() {
            return Err(WardenError::Protocol("NEWKEYS message is empty".to_string()));
        }
        if data[0] != 21 {
            return Err(WardenError::Protocol(format!(
                "Invalid message type: expected 21 (SSH_MSG_NEWKEYS), got {}",
                data[0]
            )));
        }
        Ok(Self)
    }
}

impl Default for NewKeys {
    fn default() -> Self {
        Self::new()
    }
}

/// Derives the session identifier from the first key exchange's material.
///
/// The inputs mirror the exchange-hash inputs of RFC 4253 Section 8: both
/// identification strings and both KEXINIT payloads, hashed with SHA-256.
/// Both sides of a link compute the same value from the same material.
pub fn derive_session_id(
    client_version: &str,
    server_version: &str,
    client_kexinit: &[u8],
    server_kexinit: &[u8],
) -> Vec<u8> {
    let mut hasher = Sha256::new();

    let mut put = |chunk: &[u8]| {
        hasher.update((chunk.len() as u32).to_be_bytes());
        hasher.update(chunk);
    };

    put(client_version.as_bytes());
    put(server_version.as_bytes());
    put(client_kexinit);
    put(server_kexinit);

    hasher.finalize().to_vec()
}

fn write_name_list(buf: &mut BytesMut, names: &[String]) {
    let joined = names.join(",");
    buf.put_u32(joined.len() as u32);
    buf.put_slice(joined.as_bytes());
}

fn read_name_list(data: &[u8], offset: &mut usize) -> WardenResult<Vec<String>> {
    if *offset + 4 > data.len() {
        return Err(WardenError::Protocol(format!(
            "Cannot read name-list length at offset {}",
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
            "Name-list truncated: expected {} bytes at offset {}",
            length, offset
        )));
    }

    let joined = std::str::from_utf8(&data[*offset..*offset + length])
        .map_err(|_| WardenError::Protocol("Name-list contains invalid UTF-8".to_string()))?;
    *offset += length;

    if joined.is_empty() {
        return Ok(Vec::new());
    }

    Ok(joined.split(',').map(String::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kexinit_round_trip() {
        let original = KexInit::new_default();
        let bytes = original.to_bytes();

        assert_eq!(bytes[0], 20);

        let parsed = KexInit::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.cookie(), original.cookie());
        assert_eq!(parsed.kex_algorithms(), original.kex_algorithms());
        assert_eq!(
            parsed.server_host_key_algorithms(),
            original.server_host_key_algorithms()
        );
        assert!(!parsed.first_kex_packet_follows());
    }

    #[test]
    fn test_kexinit_cookies_differ() {
        let a = KexInit::new_default();
        let b = KexInit::new_default();
        assert_ne!(a.cookie(), b.cookie());
    }

    #[test]
    fn test_kexinit_invalid_type() {
        let result = KexInit::from_bytes(&[21; 64]);
        assert!(matches!(result, Err(WardenError::Protocol(_))));
    }

    #[test]
    fn test_kexinit_truncated() {
        let bytes = KexInit::new_default().to_bytes();
        let result = KexInit::from_bytes(&bytes[..bytes.len() - 4]);
        assert!(matches!(result, Err(WardenError::Protocol(_))));
    }

    #[test]
    fn test_newkeys_round_trip() {
        let newkeys = NewKeys::new();
        let bytes = newkeys.to_bytes();
        assert_eq!(bytes, vec![21]);
        assert_eq!(NewKeys::from_bytes(&bytes).unwrap(), newkeys);
    }

    #[test]
    fn test_newkeys_invalid() {
        assert!(NewKeys::from_bytes(&[]).is_err());
        assert!(NewKeys::from_bytes(&[20]).is_err());
    }

    #[test]
    fn test_session_id_deterministic() {
        let ck = KexInit::new_default().to_bytes();
        let sk = KexInit::new_default().to_bytes();

        let a = derive_session_id("SSH-2.0-C", "SSH-2.0-S", &ck, &sk);
        let b = derive_session_id("SSH-2.0-C", "SSH-2.0-S", &ck, &sk);
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn test_session_id_depends_on_material() {
        let ck = KexInit::new_default().to_bytes();
        let sk = KexInit::new_default().to_bytes();

        let a = derive_session_id("SSH-2.0-C", "SSH-2.0-S", &ck, &sk);
        let b = derive_session_id("SSH-2.0-C", "SSH-2.0-Other", &ck, &sk);
        assert_ne!(a, b);
    }
}
