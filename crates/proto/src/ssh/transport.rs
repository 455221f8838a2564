//! The packet transport the proxy engine consumes.
//!
//! A [`Transport`] frames SSH binary packets over any async byte stream and
//! tracks the per-direction sequence numbers the SSH protocol assigns to
//! every packet. The interposer operates in the pre-handoff "None" keying
//! posture: packets are framed and counted but not enciphered; record
//! protection is re-established end-to-end by the client and server at
//! handoff, outside the interposer.
//!
//! Three pieces of transport state make the handoff seamless:
//!
//! - the **session identifier** established by the first key exchange,
//! - the two **sequence numbers**, which must stay aligned across the
//!   interposer's links (the proxy substitutes `ignore` messages for blocked
//!   packets to preserve parity),
//! - the **kex handling** flag: once the proxy stops kex handling, key
//!   exchange messages are surfaced to the forwarding loop instead of being
//!   treated as transport events.
//!
//! [`Transport::split`] produces an exclusive [`TransportReader`] and a
//! [`TransportWriter`] so the two forwarding tasks can read their own side
//! while sharing the opposite writer behind a lock.

use crate::ssh::message::MessageType;
use crate::ssh::packet::{Packet, MAX_PACKET_SIZE};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tracing::{debug, trace};
use warden_platform::{WardenError, WardenResult};

/// The role a transport plays on its link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Client role: the interposer dialing the target server.
    Client,
    /// Server role: the interposer terminating the client's connection.
    Server,
}

/// A framed SSH packet transport over an async byte stream.
#[derive(Debug)]
pub struct Transport<S> {
    stream: S,
    role: Role,
    session_id: Option<Vec<u8>>,
    read_seq: u32,
    write_seq: u32,
    session_established: bool,
    kex_handling: bool,
}

impl<S> Transport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a transport over the given stream.
    pub fn new(stream: S, role: Role) -> Self {
        Self {
            stream,
            role,
            session_id: None,
            read_seq: 0,
            write_seq: 0,
            session_established: false,
            kex_handling: true,
        }
    }

    /// Returns the transport's role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Returns the session identifier, once the first session is established.
    pub fn session_id(&self) -> Option<&[u8]> {
        self.session_id.as_deref()
    }

    /// Installs the session identifier. Called by the handshake drivers.
    pub(crate) fn set_session_id(&mut self, session_id: Vec<u8>) {
        self.session_id = Some(session_id);
        self.session_established = true;
    }

    /// Returns `(write_seq, read_seq)`: the sequence numbers the next
    /// outgoing and incoming packets will be assigned.
    pub fn sequence_numbers(&self) -> (u32, u32) {
        (self.write_seq, self.read_seq)
    }

    /// Aligns this transport's session parameters with the opposite link so
    /// the peer's next key exchange is seamless from the far side's point of
    /// view.
    pub fn update_session_params(&mut self, session_id: Vec<u8>, write_seq: u32, read_seq: u32) {
        debug!(
            role = ?self.role,
            write_seq, read_seq, "updating session parameters for handoff"
        );
        self.session_id = Some(session_id);
        self.write_seq = write_seq;
        self.read_seq = read_seq;
    }

    /// Stops honoring key-exchange messages from the peer.
    ///
    /// After this call a KEXINIT read off the wire is surfaced to the caller
    /// as an ordinary packet instead of being treated as a transport event.
    /// The plain transport drives key exchange only inside the handshake, so
    /// the stop completes as soon as the flag is published.
    pub fn stop_kex_handling(&mut self) {
        debug!(role = ?self.role, "kex handling stopped");
        self.kex_handling = false;
    }

    /// Reads one packet, returning its payload.
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::Io`] on stream failure and
    /// [`WardenError::Protocol`] on framing violations, or if the peer
    /// attempts to rekey while kex handling is still active.
    pub async fn read_packet(&mut self) -> WardenResult<Vec<u8>> {
        let payload = read_packet_from(&mut self.stream, &mut self.read_seq).await?;

        if self.session_established
            && self.kex_handling
            && payload.first() == Some(&(MessageType::KexInit as u8))
        {
            return Err(WardenError::Protocol(
                "Peer-initiated rekeying is not supported before handoff".to_string(),
            ));
        }

        Ok(payload)
    }

    /// Writes one packet with the given payload.
    pub async fn write_packet(&mut self, payload: &[u8]) -> WardenResult<()> {
        write_packet_to(&mut self.stream, &mut self.write_seq, payload).await
    }

    /// Shuts down the write side of the stream.
    pub async fn close(&mut self) {
        let _ = self.stream.shutdown().await;
    }

    /// Splits the transport into an exclusive reader and a writer.
    ///
    /// Each half inherits its sequence counter; the reader inherits the kex
    /// handling flag. The proxy takes the reader into one forwarding task and
    /// shares the writer behind a lock.
    pub fn split(self) -> (TransportReader<S>, TransportWriter<S>)
    where
        S: Send,
    {
        let (read_half, write_half) = tokio::io::split(self.stream);

        (
            TransportReader {
                stream: read_half,
                role: self.role,
                read_seq: self.read_seq,
                kex_handling: self.kex_handling,
                session_established: self.session_established,
            },
            TransportWriter {
                stream: write_half,
                role: self.role,
                write_seq: self.write_seq,
            },
        )
    }
}

/// The read half of a split [`Transport`].
#[derive(Debug)]
pub struct TransportReader<S> {
    stream: ReadHalf<S>,
    role: Role,
    read_seq: u32,
    kex_handling: bool,
    session_established: bool,
}

impl<S> TransportReader<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Reads one packet, returning its payload.
    pub async fn read_packet(&mut self) -> WardenResult<Vec<u8>> {
        let payload = read_packet_from(&mut self.stream, &mut self.read_seq).await?;

        if self.session_established
            && self.kex_handling
            && payload.first() == Some(&(MessageType::KexInit as u8))
        {
            return Err(WardenError::Protocol(
                "Peer-initiated rekeying is not supported before handoff".to_string(),
            ));
        }

        Ok(payload)
    }

    /// Returns the sequence number the next incoming packet will be assigned.
    pub fn read_seq(&self) -> u32 {
        self.read_seq
    }

    /// Returns the transport's role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Gives back the raw read half for post-handoff byte relaying.
    pub fn into_inner(self) -> ReadHalf<S> {
        self.stream
    }
}

/// The write half of a split [`Transport`].
#[derive(Debug)]
pub struct TransportWriter<S> {
    stream: WriteHalf<S>,
    role: Role,
    write_seq: u32,
}

impl<S> TransportWriter<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Writes one packet with the given payload.
    pub async fn write_packet(&mut self, payload: &[u8]) -> WardenResult<()> {
        write_packet_to(&mut self.stream, &mut self.write_seq, payload).await
    }

    /// Returns the sequence number the next outgoing packet will be assigned.
    pub fn write_seq(&self) -> u32 {
        self.write_seq
    }

    /// Returns the transport's role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Shuts down the write side of the stream.
    pub async fn close(&mut self) {
        let _ = self.stream.shutdown().await;
    }

    /// Gives back the raw write half for post-handoff byte relaying.
    pub fn into_inner(self) -> WriteHalf<S> {
        self.stream
    }
}

async fn read_packet_from<R>(stream: &mut R, read_seq: &mut u32) -> WardenResult<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut length_bytes = [0u8; 4];
    stream
        .read_exact(&mut length_bytes)
        .await
        .map_err(WardenError::Io)?;

    let packet_length = u32::from_be_bytes(length_bytes) as usize;
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

    let mut wire = vec![0u8; 4 + packet_length];
    wire[..4].copy_from_slice(&length_bytes);
    stream
        .read_exact(&mut wire[4..])
        .await
        .map_err(WardenError::Io)?;

    let packet = Packet::from_bytes(&wire)?;
    let seq = *read_seq;
    *read_seq = read_seq.wrapping_add(1);

    trace!(seq, len = packet.payload().len(), "packet read");
    Ok(packet.payload().to_vec())
}

async fn write_packet_to<W>(stream: &mut W, write_seq: &mut u32, payload: &[u8]) -> WardenResult<()>
where
    W: AsyncWrite + Unpin,
{
    let wire = Packet::new(payload.to_vec()).to_bytes();

    stream.write_all(&wire).await.map_err(WardenError::Io)?;
    stream.flush().await.map_err(WardenError::Io)?;

    let seq = *write_seq;
    *write_seq = write_seq.wrapping_add(1);

    trace!(seq, len = payload.len(), "packet written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_packet_round_trip_over_duplex() {
        let (near, far) = tokio::io::duplex(4096);
        let mut a = Transport::new(near, Role::Client);
        let mut b = Transport::new(far, Role::Server);

        a.write_packet(&[80, 1, 2, 3]).await.unwrap();
        let payload = b.read_packet().await.unwrap();
        assert_eq!(payload, vec![80, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_sequence_numbers_advance() {
        let (near, far) = tokio::io::duplex(4096);
        let mut a = Transport::new(near, Role::Client);
        let mut b = Transport::new(far, Role::Server);

        assert_eq!(a.sequence_numbers(), (0, 0));

        for _ in 0..3 {
            a.write_packet(&[2]).await.unwrap();
            b.read_packet().await.unwrap();
        }

        assert_eq!(a.sequence_numbers(), (3, 0));
        assert_eq!(b.sequence_numbers(), (0, 3));
    }

    #[tokio::test]
    async fn test_update_session_params() {
        let (near, _far) = tokio::io::duplex(64);
        let mut t = Transport::new(near, Role::Server);

        t.update_session_params(vec![0xab; 32], 17, 23);

        assert_eq!(t.session_id(), Some(&[0xab; 32][..]));
        assert_eq!(t.sequence_numbers(), (17, 23));
    }

    #[tokio::test]
    async fn test_rekey_rejected_before_stop() {
        let (near, far) = tokio::io::duplex(4096);
        let mut a = Transport::new(near, Role::Client);
        let mut b = Transport::new(far, Role::Server);
        b.set_session_id(vec![0; 32]);

        a.write_packet(&crate::ssh::kex::KexInit::new_default().to_bytes())
            .await
            .unwrap();

        let result = b.read_packet().await;
        assert!(matches!(result, Err(WardenError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_kexinit_passes_through_after_stop() {
        let (near, far) = tokio::io::duplex(4096);
        let mut a = Transport::new(near, Role::Client);
        let mut b = Transport::new(far, Role::Server);
        b.set_session_id(vec![0; 32]);
        b.stop_kex_handling();

        let kexinit = crate::ssh::kex::KexInit::new_default().to_bytes();
        a.write_packet(&kexinit).await.unwrap();

        let payload = b.read_packet().await.unwrap();
        assert_eq!(payload, kexinit);
    }

    #[tokio::test]
    async fn test_split_halves_keep_counters() {
        let (near, far) = tokio::io::duplex(4096);
        let mut a = Transport::new(near, Role::Client);
        let mut b = Transport::new(far, Role::Server);

        a.write_packet(&[2]).await.unwrap();
        b.read_packet().await.unwrap();

        let (mut b_reader, b_writer) = b.split();
        assert_eq!(b_reader.read_seq(), 1);
        assert_eq!(b_writer.write_seq(), 0);

        a.write_packet(&[2]).await.unwrap();
        b_reader.read_packet().await.unwrap();
        assert_eq!(b_reader.read_seq(), 2);
    }

    #[tokio::test]
    async fn test_oversized_length_rejected() {
        let (mut near, far) = tokio::io::duplex(4096);
        let mut b = Transport::new(far, Role::Server);

        near.write_all(&[0xff, 0xff, 0xff, 0xff]).await.unwrap();
        let result = b.read_packet().await;
        assert!(matches!(result, Err(WardenError::Protocol(_))));
    }
}
