//! Host key abstraction and the interposer's "None" host key.
//!
//! The interposer does not authenticate itself cryptographically to the
//! client: the client must trust it out-of-band (it typically runs on the
//! same machine or inside the same trust domain). The server-role transport
//! therefore presents [`NoneHostKey`], a null host key with no signature.

/// A host key as presented during the first key exchange.
pub trait HostKey: Send + Sync {
    /// Returns the algorithm name advertised in KEXINIT (e.g., "ssh-ed25519").
    fn algorithm_name(&self) -> &'static str;

    /// Returns the public key blob.
    fn public_key_bytes(&self) -> Vec<u8>;

    /// Signs the given data, returning the signature blob.
    fn sign(&self, data: &[u8]) -> Vec<u8>;
}

/// The null host key used toward the client.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoneHostKey;

impl NoneHostKey {
    /// Creates a new null host key.
    pub const fn new() -> Self {
        Self
    }
}

impl HostKey for NoneHostKey {
    fn algorithm_name(&self) -> &'static str {
        "null"
    }

    fn public_key_bytes(&self) -> Vec<u8> {
        Vec::new()
    }

    fn sign(&self, _data: &[u8]) -> Vec<u8> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_host_key() {
        let key = NoneHostKey::new();
        assert_eq!(key.algorithm_name(), "null");
        assert!(key.public_key_bytes().is_empty());
        assert!(key.sign(b"anything").is_empty());
    }
}
