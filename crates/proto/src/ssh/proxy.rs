//! The proxy engine: dual handshake, auth bridge, filtered forwarding, and
//! handoff.
//!
//! [`Proxy::establish`] terminates the client's connection and dials the
//! target server under the client's credentials:
//!
//! 1. Version echo: the server's banner is read first and re-sent to the
//!    client verbatim; the client's banner is written onward to the server.
//! 2. A client-role transport faces the server; a server-role transport
//!    faces the client, presenting the in-repo null host key.
//! 3. The first session is established on the server link, then on the
//!    client link.
//! 4. The auth bridge authenticates to the server with the client's
//!    configuration; on success the client is accepted vacuously, on failure
//!    the client side is driven to an observable rejection.
//! 5. Both transports stop honoring peer key exchange: from here on, KEXINIT
//!    is a packet for the filter, not a transport event.
//!
//! [`Proxy::run`] then relays packets through the per-direction filter
//! callbacks until each direction observes SSH_MSG_NEWKEYS: the client and
//! server are key-exchanging directly and the interposer is a dumb byte
//! relay.

use crate::ssh::auth::{self, ClientConfig, ServerConfig};
use crate::ssh::connection::{Disconnect, Ignore};
use crate::ssh::filter::{ClientVerdict, FilterFailure, ServerVerdict};
use crate::ssh::handshake::establish_session;
use crate::ssh::hostkey::NoneHostKey;
use crate::ssh::message::MessageType;
use crate::ssh::transport::{Role, Transport, TransportReader, TransportWriter};
use crate::ssh::version;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use warden_platform::{WardenError, WardenResult};

/// Per-direction filter callback over client packets.
pub type ClientFilterCallback =
    Box<dyn Fn(&[u8]) -> Result<ClientVerdict, FilterFailure> + Send + Sync>;

/// Per-direction filter callback over server packets.
pub type ServerFilterCallback =
    Box<dyn Fn(&[u8]) -> Result<ServerVerdict, FilterFailure> + Send + Sync>;

/// One link of the proxy: its transport and the session identifier its
/// first key exchange produced.
#[derive(Debug)]
struct Side<S> {
    transport: Transport<S>,
    session_id: Vec<u8>,
}

/// A proxied connection between one client and one server.
pub struct Proxy<C, S> {
    to_client: Side<C>,
    to_server: Side<S>,
    client_config: ClientConfig,
    server_config: ServerConfig,
    filter_client: ClientFilterCallback,
    filter_server: ServerFilterCallback,
}

impl<C, S> Proxy<C, S>
where
    C: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Performs setup: version echo, both first sessions, the auth bridge,
    /// and the kex stop.
    ///
    /// `dial_address` names the target for logging; `client_stream` and
    /// `server_stream` are the two connected sockets.
    ///
    /// # Errors
    ///
    /// Any setup failure closes both sides; a partially established client
    /// transport is sent a disconnect carrying the error string first.
    pub async fn establish(
        dial_address: &str,
        mut client_stream: C,
        mut server_stream: S,
        client_config: ClientConfig,
        filter_client: ClientFilterCallback,
        filter_server: ServerFilterCallback,
    ) -> WardenResult<Self> {
        let server_version = version::read_version(&mut server_stream).await?;
        debug!(%server_version, %dial_address, "read version from server");

        let client_version =
            version::exchange_versions(&mut client_stream, &server_version).await?;
        debug!(%client_version, "read version from client");

        version::write_version(&mut server_stream, &client_version).await?;

        let mut to_server = Transport::new(server_stream, Role::Client);
        let mut to_client = Transport::new(client_stream, Role::Server);

        // The server link first: its session identifier is the one the
        // client side is later aligned to.
        if let Err(e) = establish_session(&mut to_server, None, &client_version, &server_version)
            .await
        {
            let disconnect = Disconnect::new(2, &e.to_string());
            let _ = to_client.write_packet(&disconnect.to_bytes()).await;
            to_client.close().await;
            to_server.close().await;
            return Err(e);
        }

        let host_key = NoneHostKey::new();
        if let Err(e) = establish_session(
            &mut to_client,
            Some(&host_key),
            &client_version,
            &server_version,
        )
        .await
        {
            to_client.close().await;
            to_server.close().await;
            return Err(e);
        }

        // Auth bridge.
        let mut server_config = ServerConfig::default();
        match auth::authenticate_client(&mut to_server, &client_config).await {
            Ok(()) => {
                server_config.no_client_auth = true;
                if let Err(e) = auth::authenticate_server(&mut to_client, &server_config).await {
                    to_client.close().await;
                    to_server.close().await;
                    return Err(e);
                }
            }
            Err(e) => {
                // Drive the client side to the same observable rejection,
                // then report the original error.
                warn!(%dial_address, error = %e, "upstream authentication failed");
                let reason = e.to_string();
                server_config.public_key_callback = Some(Arc::new(move |user: &str, _key: &[u8]| {
                    Err(WardenError::AuthFailed {
                        user: user.to_string(),
                        reason: reason.clone(),
                    })
                }));
                let _ = auth::authenticate_server(&mut to_client, &server_config).await;
                to_client.close().await;
                to_server.close().await;
                return Err(e);
            }
        }

        to_server.stop_kex_handling();
        to_client.stop_kex_handling();

        let server_session_id = session_id_of(&to_server)?;
        let client_session_id = session_id_of(&to_client)?;

        info!(%dial_address, "proxy established");

        Ok(Self {
            to_client: Side {
                transport: to_client,
                session_id: client_session_id,
            },
            to_server: Side {
                transport: to_server,
                session_id: server_session_id,
            },
            client_config,
            server_config,
            filter_client,
            filter_server,
        })
    }

    /// Returns the session identifier of the server-facing link.
    pub fn server_session_id(&self) -> &[u8] {
        &self.to_server.session_id
    }

    /// Returns the session identifier of the client-facing link.
    pub fn client_session_id(&self) -> &[u8] {
        &self.to_client.session_id
    }

    /// Returns the credentials used toward the server.
    pub fn client_config(&self) -> &ClientConfig {
        &self.client_config
    }

    /// Returns how the client's own authentication was judged.
    pub fn server_config(&self) -> &ServerConfig {
        &self.server_config
    }

    /// Aligns the client-facing transport with the server link: the server's
    /// session identifier and the matched sequence numbers. After this, the
    /// client's next key exchange on this link is seamless from the server's
    /// point of view.
    ///
    /// Call after [`Proxy::establish`], before [`Proxy::run`].
    pub fn update_client_session_params(&mut self) -> WardenResult<()> {
        let session_id = self.to_server.session_id.clone();
        let (p2s, s2p) = self.to_server.transport.sequence_numbers();

        // What the proxy wrote to the server is what the client must count
        // as read, and vice versa.
        self.to_client
            .transport
            .update_session_params(session_id, s2p, p2s);

        Ok(())
    }

    /// Runs the two forwarding tasks until the handoff.
    ///
    /// Each direction reads, consults its filter, and forwards; a blocked
    /// client packet is answered toward the client and replaced by one
    /// `ignore` toward the server to preserve sequence-number parity.
    /// Observing SSH_MSG_NEWKEYS ends a direction successfully. The first
    /// error from either task is surfaced; clean completion of both yields
    /// the [`Handoff`] relay over the raw streams.
    pub async fn run(self) -> WardenResult<Handoff<C, S>> {
        let (client_reader, client_writer) = self.to_client.transport.split();
        let (server_reader, server_writer) = self.to_server.transport.split();

        let client_writer = Arc::new(Mutex::new(client_writer));
        let server_writer = Arc::new(Mutex::new(server_writer));

        let (done_tx, mut done_rx) = mpsc::channel::<WardenResult<ForwardOutcome<C, S>>>(2);

        let tx = done_tx.clone();
        let cw = Arc::clone(&client_writer);
        let sw = Arc::clone(&server_writer);
        let filter_client = self.filter_client;
        tokio::spawn(async move {
            let result = forward_client_to_server(client_reader, &cw, &sw, filter_client).await;
            if result.is_err() {
                // I/O faults are fatal to both directions.
                cw.lock().await.close().await;
                sw.lock().await.close().await;
            }
            drop(cw);
            drop(sw);
            let _ = tx.send(result.map(ForwardOutcome::ClientToServer)).await;
        });

        let cw = Arc::clone(&client_writer);
        let sw = Arc::clone(&server_writer);
        let filter_server = self.filter_server;
        tokio::spawn(async move {
            let result = forward_server_to_client(server_reader, &cw, filter_server).await;
            if result.is_err() {
                cw.lock().await.close().await;
                sw.lock().await.close().await;
            }
            drop(cw);
            drop(sw);
            let _ = done_tx.send(result.map(ForwardOutcome::ServerToClient)).await;
        });

        // Supervisor: the first error wins; both clean exits yield the
        // post-handoff relay.
        let mut client_reader = None;
        let mut server_reader = None;
        for _ in 0..2 {
            match done_rx.recv().await {
                Some(Ok(ForwardOutcome::ClientToServer(reader))) => client_reader = Some(reader),
                Some(Ok(ForwardOutcome::ServerToClient(reader))) => server_reader = Some(reader),
                Some(Err(e)) => return Err(e),
                None => break,
            }
        }

        match (client_reader, server_reader) {
            (Some(client_reader), Some(server_reader)) => Ok(Handoff {
                client_reader,
                client_writer: unwrap_writer(client_writer)?,
                server_reader,
                server_writer: unwrap_writer(server_writer)?,
            }),
            _ => Err(WardenError::Protocol(
                "Forwarding ended without completing the handoff".to_string(),
            )),
        }
    }
}

/// The transparent relay left once both directions observed
/// SSH_MSG_NEWKEYS: client and server are key-exchanging directly and the
/// interposer only copies bytes.
#[derive(Debug)]
pub struct Handoff<C, S> {
    client_reader: TransportReader<C>,
    client_writer: TransportWriter<C>,
    server_reader: TransportReader<S>,
    server_writer: TransportWriter<S>,
}

impl<C, S> Handoff<C, S>
where
    C: AsyncRead + AsyncWrite + Unpin + Send,
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Copies raw bytes in both directions until both peers hang up.
    /// Returns the byte counts relayed (client-to-server, server-to-client).
    ///
    /// No inspection happens here; the post-handoff traffic is protected by
    /// keys the interposer never saw.
    pub async fn splice(self) -> WardenResult<(u64, u64)> {
        let mut client_read = self.client_reader.into_inner();
        let mut client_write = self.client_writer.into_inner();
        let mut server_read = self.server_reader.into_inner();
        let mut server_write = self.server_writer.into_inner();

        let client_to_server = async {
            let copied = tokio::io::copy(&mut client_read, &mut server_write).await;
            let _ = server_write.shutdown().await;
            copied
        };
        let server_to_client = async {
            let copied = tokio::io::copy(&mut server_read, &mut client_write).await;
            let _ = client_write.shutdown().await;
            copied
        };

        let (c2s, s2c) = tokio::join!(client_to_server, server_to_client);
        Ok((c2s.map_err(WardenError::Io)?, s2c.map_err(WardenError::Io)?))
    }
}

enum ForwardOutcome<C, S> {
    ClientToServer(TransportReader<C>),
    ServerToClient(TransportReader<S>),
}

fn unwrap_writer<S>(writer: Arc<Mutex<TransportWriter<S>>>) -> WardenResult<TransportWriter<S>> {
    Arc::try_unwrap(writer)
        .map(Mutex::into_inner)
        .map_err(|_| WardenError::Protocol("Forwarding task still holds a writer".to_string()))
}

fn session_id_of<S>(transport: &Transport<S>) -> WardenResult<Vec<u8>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    transport
        .session_id()
        .map(|id| id.to_vec())
        .ok_or_else(|| WardenError::Protocol("Transport has no session identifier".to_string()))
}

async fn forward_client_to_server<C, S>(
    mut client_reader: TransportReader<C>,
    client_writer: &Arc<Mutex<TransportWriter<C>>>,
    server_writer: &Arc<Mutex<TransportWriter<S>>>,
    filter: ClientFilterCallback,
) -> WardenResult<TransportReader<C>>
where
    C: AsyncRead + AsyncWrite + Unpin,
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let packet = client_reader.read_packet().await?;
        let msg_num = packet.first().copied();

        match filter(&packet) {
            Err(FilterFailure { response, error }) => {
                warn!(error = %error, "client packet filter failed");
                if let Some(response) = response {
                    let _ = client_writer.lock().await.write_packet(&response).await;
                }
                server_writer.lock().await.close().await;
                return Err(error);
            }
            Ok(ClientVerdict::Block { response }) => {
                debug!(msg_num, "packet from client to server blocked");
                client_writer.lock().await.write_packet(&response).await?;
                // One ignore toward the server keeps the sequence numbers
                // aligned for the handoff.
                server_writer
                    .lock()
                    .await
                    .write_packet(&Ignore::new().to_bytes())
                    .await?;
            }
            Ok(ClientVerdict::Forward) => {
                server_writer.lock().await.write_packet(&packet).await?;

                if msg_num == Some(MessageType::NewKeys as u8) {
                    debug!("new_keys from client, client-to-server forwarding done");
                    return Ok(client_reader);
                }
            }
        }
    }
}

async fn forward_server_to_client<C, S>(
    mut server_reader: TransportReader<S>,
    client_writer: &Arc<Mutex<TransportWriter<C>>>,
    filter: ServerFilterCallback,
) -> WardenResult<TransportReader<S>>
where
    C: AsyncRead + AsyncWrite + Unpin,
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let packet = server_reader.read_packet().await?;
        let msg_num = packet.first().copied();

        match filter(&packet) {
            Err(FilterFailure { response, error }) => {
                warn!(error = %error, "server packet filter failed");
                if let Some(response) = response {
                    let _ = client_writer.lock().await.write_packet(&response).await;
                }
                return Err(error);
            }
            Ok(ServerVerdict::Terminate { response }) => {
                warn!("packet from server ends the connection");
                client_writer.lock().await.write_packet(&response).await?;
                return Err(WardenError::Protocol(
                    "Server packet ended the connection".to_string(),
                ));
            }
            Ok(ServerVerdict::Forward) => {
                client_writer.lock().await.write_packet(&packet).await?;

                if msg_num == Some(MessageType::NewKeys as u8) {
                    debug!("new_keys from server, server-to-client forwarding done");
                    return Ok(server_reader);
                }
            }
        }
    }
}
