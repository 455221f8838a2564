//! SSH user authentication (RFC 4252) and the interposer's auth bridge.
//!
//! The interposer authenticates *itself* to the target server with the
//! client's configured credentials, then accepts the client's authentication
//! vacuously (`no_client_auth`). When upstream authentication fails, the
//! bridge instead installs a public-key callback that always returns the
//! same error and drives the client side to an observable rejection, so the
//! client sees an SSH-native authentication failure rather than a dropped
//! connection.
//!
//! # Security
//!
//! - Passwords are zeroized on drop.
//! - Password callbacks should compare with [`constant_time_compare`].

use crate::ssh::connection::{read_string, write_string};
use crate::ssh::message::MessageType;
use crate::ssh::transport::Transport;
use bytes::{BufMut, BytesMut};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;
use warden_platform::{WardenError, WardenResult};
use zeroize::Zeroize;

/// The service name requested before user authentication.
pub const USERAUTH_SERVICE: &str = "ssh-userauth";

/// The service requested once authentication succeeds.
pub const CONNECTION_SERVICE: &str = "ssh-connection";

/// Compares two byte strings in constant time.
pub fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

/// SSH authentication method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMethod {
    /// No authentication.
    None,
    /// Password authentication.
    Password(String),
    /// Public key authentication.
    PublicKey {
        /// Algorithm name (e.g., "ssh-ed25519")
        algorithm: String,
        /// Public key blob
        public_key: Vec<u8>,
        /// Signature (if present)
        signature: Option<Vec<u8>>,
    },
}

impl AuthMethod {
    /// Returns the method name.
    pub fn name(&self) -> &str {
        match self {
            AuthMethod::None => "none",
            AuthMethod::Password(_) => "password",
            AuthMethod::PublicKey { .. } => "publickey",
        }
    }
}

impl Drop for AuthMethod {
    fn drop(&mut self) {
        if let AuthMethod::Password(password) = self {
            password.zeroize();
        }
    }
}

/// SSH_MSG_SERVICE_REQUEST message (RFC 4253 Section 10).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRequest {
    service_name: String,
}

impl ServiceRequest {
    /// Creates a new service request.
    pub fn new(service_name: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
        }
    }

    /// Returns the service name.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Serializes to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u8(5);
        write_string(&mut buf, &self.service_name);
        buf.to_vec()
    }

    /// Parses from bytes.
    pub fn from_bytes(data: &[u8]) -> WardenResult<Self> {
        if data.first() != Some(&5) {
            return Err(WardenError::Protocol(
                "Expected SSH_MSG_SERVICE_REQUEST".to_string(),
            ));
        }
        let mut offset = 1;
        let service_name = read_string(data, &mut offset)?;
        Ok(Self { service_name })
    }
}

/// SSH_MSG_SERVICE_ACCEPT message (RFC 4253 Section 10).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceAccept {
    service_name: String,
}

impl ServiceAccept {
    /// Creates a new service accept.
    pub fn new(service_name: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
        }
    }

    /// Returns the service name.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Serializes to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u8(6);
        write_string(&mut buf, &self.service_name);
        buf.to_vec()
    }

    /// Parses from bytes.
    pub fn from_bytes(data: &[u8]) -> WardenResult<Self> {
        if data.first() != Some(&6) {
            return Err(WardenError::Protocol(
                "Expected SSH_MSG_SERVICE_ACCEPT".to_string(),
            ));
        }
        let mut offset = 1;
        let service_name = read_string(data, &mut offset)?;
        Ok(Self { service_name })
    }
}

/// SSH_MSG_USERAUTH_REQUEST message (RFC 4252 Section 5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequest {
    user_name: String,
    service_name: String,
    method: AuthMethod,
}

impl AuthRequest {
    /// Creates a new authentication request.
    pub fn new(user_name: &str, service_name: &str, method: AuthMethod) -> Self {
        Self {
            user_name: user_name.to_string(),
            service_name: service_name.to_string(),
            method,
        }
    }

    /// Returns the user name.
    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    /// Returns the service name.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Returns the authentication method.
    pub fn method(&self) -> &AuthMethod {
        &self.method
    }

    /// Serializes to bytes.
    ///
    /// Format (RFC 4252 Section 5, method-specific fields per Sections 7-8):
    /// ```text
    /// byte      SSH_MSG_USERAUTH_REQUEST (50)
    /// string    user name
    /// string    service name
    /// string    method name
    /// ....      method specific fields
    /// ```
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();

        buf.put_u8(50);
        write_string(&mut buf, &self.user_name);
        write_string(&mut buf, &self.service_name);
        write_string(&mut buf, self.method.name());

        match &self.method {
            AuthMethod::None => {}
            AuthMethod::Password(password) => {
                // boolean FALSE: not a password change request
                buf.put_u8(0);
                write_string(&mut buf, password);
            }
            AuthMethod::PublicKey {
                algorithm,
                public_key,
                signature,
            } => {
                buf.put_u8(if signature.is_some() { 1 } else { 0 });
                write_string(&mut buf, algorithm);
                buf.put_u32(public_key.len() as u32);
                buf.put_slice(public_key);
                if let Some(sig) = signature {
                    buf.put_u32(sig.len() as u32);
                    buf.put_slice(sig);
                }
            }
        }

        buf.to_vec()
    }

    /// Parses from bytes.
    pub fn from_bytes(data: &[u8]) -> WardenResult<Self> {
        if data.first() != Some(&50) {
            return Err(WardenError::Protocol(
                "Expected SSH_MSG_USERAUTH_REQUEST".to_string(),
            ));
        }

        let mut offset = 1;
        let user_name = read_string(data, &mut offset)?;
        let service_name = read_string(data, &mut offset)?;
        let method_name = read_string(data, &mut offset)?;

        let method = match method_name.as_str() {
            "none" => AuthMethod::None,
            "password" => {
                if offset >= data.len() {
                    return Err(WardenError::Protocol(
                        "USERAUTH_REQUEST password truncated".to_string(),
                    ));
                }
                offset += 1; // boolean: password change request, not supported
                let password = read_string(data, &mut offset)?;
                AuthMethod::Password(password)
            }
            "publickey" => {
                if offset >= data.len() {
                    return Err(WardenError::Protocol(
                        "USERAUTH_REQUEST publickey truncated".to_string(),
                    ));
                }
                let has_signature = data[offset] != 0;
                offset += 1;
                let algorithm = read_string(data, &mut offset)?;
                let public_key = crate::ssh::connection::read_bytes(data, &mut offset)?;
                let signature = if has_signature {
                    Some(crate::ssh::connection::read_bytes(data, &mut offset)?)
                } else {
                    None
                };
                AuthMethod::PublicKey {
                    algorithm,
                    public_key,
                    signature,
                }
            }
            other => {
                return Err(WardenError::Protocol(format!(
                    "Unsupported authentication method: '{}'",
                    other
                )))
            }
        };

        Ok(Self {
            user_name,
            service_name,
            method,
        })
    }
}

/// SSH_MSG_USERAUTH_FAILURE message (RFC 4252 Section 5.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthFailure {
    methods_that_can_continue: Vec<String>,
    partial_success: bool,
}

impl AuthFailure {
    /// Creates a new authentication failure message.
    pub fn new(methods: Vec<String>, partial_success: bool) -> Self {
        Self {
            methods_that_can_continue: methods,
            partial_success,
        }
    }

    /// Returns the methods that can continue.
    pub fn methods(&self) -> &[String] {
        &self.methods_that_can_continue
    }

    /// Serializes to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u8(51);
        write_string(&mut buf, &self.methods_that_can_continue.join(","));
        buf.put_u8(if self.partial_success { 1 } else { 0 });
        buf.to_vec()
    }

    /// Parses from bytes.
    pub fn from_bytes(data: &[u8]) -> WardenResult<Self> {
        if data.first() != Some(&51) {
            return Err(WardenError::Protocol(
                "Expected SSH_MSG_USERAUTH_FAILURE".to_string(),
            ));
        }
        let mut offset = 1;
        let joined = read_string(data, &mut offset)?;
        let methods = if joined.is_empty() {
            Vec::new()
        } else {
            joined.split(',').map(String::from).collect()
        };
        let partial_success = data.get(offset).copied().unwrap_or(0) != 0;
        Ok(Self {
            methods_that_can_continue: methods,
            partial_success,
        })
    }
}

/// SSH_MSG_USERAUTH_SUCCESS message (RFC 4252 Section 5.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthSuccess;

impl AuthSuccess {
    /// Serializes to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        vec![52]
    }
}

/// Public key verification callback: `(username, key_blob) -> Ok` to accept.
///
/// The auth bridge installs a callback that always returns the upstream
/// error, which is how a failed upstream authentication is made observable
/// on the client side.
pub type PublicKeyCallback = Arc<dyn Fn(&str, &[u8]) -> WardenResult<()> + Send + Sync>;

/// Password verification callback: `(username, password) -> bool`.
pub type PasswordCallback = Arc<dyn Fn(&str, &str) -> bool + Send + Sync>;

/// Client-side configuration: the credentials used toward the target server.
#[derive(Clone)]
pub struct ClientConfig {
    /// User to authenticate as.
    pub username: String,
    /// Authentication method with its credentials.
    pub auth: AuthMethod,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("username", &self.username)
            .field("auth", &self.auth.name())
            .finish()
    }
}

/// Server-side configuration: how the client's authentication is judged.
#[derive(Clone, Default)]
pub struct ServerConfig {
    /// Accept any authentication request without checking credentials.
    /// The auth bridge sets this once upstream authentication succeeded.
    pub no_client_auth: bool,
    /// Password verification callback.
    pub password_callback: Option<PasswordCallback>,
    /// Public key verification callback.
    pub public_key_callback: Option<PublicKeyCallback>,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("no_client_auth", &self.no_client_auth)
            .field(
                "password_callback",
                &self.password_callback.as_ref().map(|_| "<callback>"),
            )
            .field(
                "public_key_callback",
                &self.public_key_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

/// Maximum client authentication attempts before the server side gives up.
const MAX_AUTH_ATTEMPTS: u32 = 3;

/// Drives user authentication toward the server with the given credentials.
///
/// # Errors
///
/// Returns [`WardenError::AuthFailed`] if the server rejects the
/// credentials, [`WardenError::Protocol`] on unexpected messages.
pub async fn authenticate_client<S>(
    transport: &mut Transport<S>,
    config: &ClientConfig,
) -> WardenResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    transport
        .write_packet(&ServiceRequest::new(USERAUTH_SERVICE).to_bytes())
        .await?;

    let reply = transport.read_packet().await?;
    let accept = ServiceAccept::from_bytes(&reply)?;
    if accept.service_name() != USERAUTH_SERVICE {
        return Err(WardenError::Protocol(format!(
            "Unexpected service accepted: '{}'",
            accept.service_name()
        )));
    }

    let request = AuthRequest::new(&config.username, CONNECTION_SERVICE, config.auth.clone());
    transport.write_packet(&request.to_bytes()).await?;

    loop {
        let reply = transport.read_packet().await?;
        match reply.first().copied().and_then(MessageType::from_u8) {
            Some(MessageType::UserauthBanner) => continue,
            Some(MessageType::UserauthSuccess) => {
                debug!(user = %config.username, "authenticated to server");
                return Ok(());
            }
            Some(MessageType::UserauthFailure) => {
                return Err(WardenError::AuthFailed {
                    user: config.username.clone(),
                    reason: "server rejected the credentials".to_string(),
                });
            }
            other => {
                return Err(WardenError::Protocol(format!(
                    "Unexpected message during authentication: {:?}",
                    other
                )));
            }
        }
    }
}

/// Judges the client's authentication according to the server configuration.
///
/// Returns the authenticated user name.
///
/// # Errors
///
/// Returns the callback's error for rejected public keys, or
/// [`WardenError::AuthFailed`] once the attempt limit is exhausted.
pub async fn authenticate_server<S>(
    transport: &mut Transport<S>,
    config: &ServerConfig,
) -> WardenResult<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = transport.read_packet().await?;
    let service = ServiceRequest::from_bytes(&request)?;
    if service.service_name() != USERAUTH_SERVICE {
        return Err(WardenError::Protocol(format!(
            "Unexpected service requested: '{}'",
            service.service_name()
        )));
    }
    transport
        .write_packet(&ServiceAccept::new(USERAUTH_SERVICE).to_bytes())
        .await?;

    let mut attempts = 0;
    loop {
        let packet = transport.read_packet().await?;
        let auth_request = AuthRequest::from_bytes(&packet)?;
        let username = auth_request.user_name().to_string();

        if config.no_client_auth {
            transport.write_packet(&AuthSuccess.to_bytes()).await?;
            debug!(user = %username, "client accepted without authentication");
            return Ok(username);
        }

        match auth_request.method() {
            AuthMethod::Password(password) => {
                if let Some(callback) = &config.password_callback {
                    if callback(&username, password) {
                        transport.write_packet(&AuthSuccess.to_bytes()).await?;
                        return Ok(username);
                    }
                }
            }
            AuthMethod::PublicKey { public_key, .. } => {
                if let Some(callback) = &config.public_key_callback {
                    match callback(&username, public_key) {
                        Ok(()) => {
                            transport.write_packet(&AuthSuccess.to_bytes()).await?;
                            return Ok(username);
                        }
                        Err(e) => {
                            // The auth bridge path: surface the rejection to
                            // the client, then report the callback's error.
                            transport
                                .write_packet(&auth_failure_reply().to_bytes())
                                .await?;
                            return Err(e);
                        }
                    }
                }
            }
            AuthMethod::None => {}
        }

        attempts += 1;
        transport
            .write_packet(&auth_failure_reply().to_bytes())
            .await?;

        if attempts >= MAX_AUTH_ATTEMPTS {
            return Err(WardenError::AuthFailed {
                user: username,
                reason: format!("{} attempts exhausted", attempts),
            });
        }
    }
}

fn auth_failure_reply() -> AuthFailure {
    AuthFailure::new(vec!["publickey".to_string(), "password".to_string()], false)
}
