//! Glue: one accepted client connection, end to end.
//!
//! Wires the pieces in order: scope → filter → up-front approval → proxy
//! establishment → session-parameter alignment → filtered forwarding. The
//! enclosing binary owns the sockets, the policy store, and the prompt; this
//! module owns the sequencing.

use crate::policy::{PolicyStore, Scope};
use crate::prompt::PromptFn;
use crate::ssh::auth::ClientConfig;
use crate::ssh::filter::Filter;
use crate::ssh::proxy::{ClientFilterCallback, Proxy, ServerFilterCallback};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{info, warn};
use warden_platform::WardenResult;

/// Builds the approval scope for one connection: the client end from the
/// accepted peer address, the service end from the dial target and the
/// configured service user.
pub fn connection_scope(
    client_username: &str,
    client_addr: &SocketAddr,
    service_username: &str,
    dial_address: &str,
) -> Scope {
    let service_hostname = dial_address
        .rsplit_once(':')
        .map(|(host, _port)| host)
        .unwrap_or(dial_address);

    Scope {
        client_username: client_username.to_string(),
        client_hostname: client_addr.ip().to_string(),
        client_port: client_addr.port(),
        service_username: service_username.to_string(),
        service_hostname: service_hostname.to_string(),
    }
}

/// Serves one client connection to completion.
///
/// The expected `command` is the one exec the client has announced out of
/// band. Approval runs before any proxy work: a rejection never touches the
/// server.
///
/// # Errors
///
/// Surfaces the first error from approval, setup, or forwarding; a clean
/// handoff returns Ok.
pub async fn serve_connection<C, S>(
    client_stream: C,
    server_stream: S,
    dial_address: &str,
    scope: Scope,
    client_config: ClientConfig,
    command: &str,
    store: Arc<PolicyStore>,
    prompt: PromptFn,
) -> WardenResult<()>
where
    C: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let filter = Arc::new(Filter::new(scope, store, command, prompt));

    if let Err(e) = filter.is_approved() {
        if e.is_denial() {
            warn!(scope = %filter.scope(), command, "approval rejected");
        } else {
            warn!(scope = %filter.scope(), command, error = %e, "approval check failed");
        }
        return Err(e);
    }

    let filter_client: ClientFilterCallback = {
        let filter = Arc::clone(&filter);
        Box::new(move |packet| filter.filter_client_packet(packet))
    };
    let filter_server: ServerFilterCallback = {
        let filter = Arc::clone(&filter);
        Box::new(move |packet| filter.filter_server_packet(packet))
    };

    let mut proxy = Proxy::establish(
        dial_address,
        client_stream,
        server_stream,
        client_config,
        filter_client,
        filter_server,
    )
    .await?;

    proxy.update_client_session_params()?;

    let handoff = match proxy.run().await {
        Ok(handoff) => handoff,
        Err(e) => {
            warn!(scope = %filter.scope(), error = %e, "connection ended with error");
            return Err(e);
        }
    };

    info!(scope = %filter.scope(), "connection handed off, relaying bytes");
    let (client_to_server, server_to_client) = handoff.splice().await?;
    info!(client_to_server, server_to_client, "relay finished");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_scope() {
        let addr: SocketAddr = "192.0.2.7:22000".parse().unwrap();
        let scope = connection_scope("alice", &addr, "bob", "srv.example.com:22");

        assert_eq!(scope.client_username, "alice");
        assert_eq!(scope.client_hostname, "192.0.2.7");
        assert_eq!(scope.client_port, 22000);
        assert_eq!(scope.service_username, "bob");
        assert_eq!(scope.service_hostname, "srv.example.com");
    }

    #[test]
    fn test_connection_scope_without_port() {
        let addr: SocketAddr = "[2001:db8::1]:4242".parse().unwrap();
        let scope = connection_scope("alice", &addr, "bob", "srv");

        assert_eq!(scope.client_hostname, "2001:db8::1");
        assert_eq!(scope.service_hostname, "srv");
    }
}
