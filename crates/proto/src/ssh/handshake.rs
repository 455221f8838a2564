//! First-session establishment on a transport.
//!
//! Both sides of a link announce themselves with SSH_MSG_KEXINIT, the
//! session identifier is derived from the identification strings and the two
//! KEXINIT payloads, and SSH_MSG_NEWKEYS marks the session as established.
//! The proxy waits for this on its server-facing link first, then on its
//! client-facing link, before bridging authentication.

use crate::ssh::hostkey::HostKey;
use crate::ssh::kex::{derive_session_id, KexInit, NewKeys};
use crate::ssh::transport::{Role, Transport};
use crate::ssh::version::Version;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;
use warden_platform::{WardenError, WardenResult};

/// Establishes the first session on the transport, leaving it with a session
/// identifier.
///
/// `client_version` and `server_version` are the identification strings of
/// the link's client and server ends; the transport's [`Role`] decides which
/// end we are and therefore the order the KEXINIT payloads enter the session
/// identifier derivation. A server-role caller passes its host key so the
/// KEXINIT advertises it; the interposer presents
/// [`NoneHostKey`](crate::ssh::hostkey::NoneHostKey) here.
///
/// # Errors
///
/// Returns [`WardenError::Protocol`] if the peer's first packets are not
/// KEXINIT and NEWKEYS.
pub async fn establish_session<S>(
    transport: &mut Transport<S>,
    host_key: Option<&dyn HostKey>,
    client_version: &Version,
    server_version: &Version,
) -> WardenResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let ours = match host_key {
        Some(key) => KexInit::with_host_key(key),
        None => KexInit::new_default(),
    };
    let our_bytes = ours.to_bytes();

    transport.write_packet(&our_bytes).await?;

    let peer_bytes = transport.read_packet().await?;
    KexInit::from_bytes(&peer_bytes)?;

    let (client_kexinit, server_kexinit) = match transport.role() {
        Role::Client => (&our_bytes, &peer_bytes),
        Role::Server => (&peer_bytes, &our_bytes),
    };

    let session_id = derive_session_id(
        &client_version.to_string(),
        &server_version.to_string(),
        client_kexinit,
        server_kexinit,
    );

    transport.write_packet(&NewKeys::new().to_bytes()).await?;
    let reply = transport.read_packet().await?;
    NewKeys::from_bytes(&reply)?;

    debug!(role = ?transport.role(), "session established");
    transport.set_session_id(session_id);

    Ok(())
}
