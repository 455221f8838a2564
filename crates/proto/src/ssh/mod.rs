//! SSH protocol layers of the Warden interposer.
//!
//! # Architecture
//!
//! The interposer sits between an SSH client and an SSH server with one
//! transport per link:
//!
//! 1. **Packet Layer** ([`packet`]) - Binary packet protocol (RFC 4253 Section 6)
//! 2. **Transport** ([`transport`]) - Framing, sequence numbers, session parameters
//! 3. **Handshake** ([`handshake`]) - First-session establishment and session identifiers
//! 4. **Authentication** ([`auth`]) - User authentication (RFC 4252) and the auth bridge
//! 5. **Connection messages** ([`connection`]) - The channel/global-request vocabulary (RFC 4254)
//! 6. **Filter** ([`filter`]) - The per-connection policy state machine
//! 7. **Proxy** ([`proxy`]) - Dual handshake, filtered forwarding, handoff
//!
//! # Security Considerations
//!
//! - **Input Validation**: packet parsing enforces the 35000-byte RFC limit
//! - **Constant-Time Comparison**: password checks use constant-time equality
//! - **Memory Safety**: credentials are zeroized on drop; no `unsafe`
//! - **Least Privilege**: one session channel, one exec, no handoff without
//!   the no-more-sessions contract or an explicit escalation
//!
//! # References
//!
//! - [RFC 4251](https://datatracker.ietf.org/doc/html/rfc4251) - SSH Protocol Architecture
//! - [RFC 4252](https://datatracker.ietf.org/doc/html/rfc4252) - SSH Authentication Protocol
//! - [RFC 4253](https://datatracker.ietf.org/doc/html/rfc4253) - SSH Transport Layer Protocol
//! - [RFC 4254](https://datatracker.ietf.org/doc/html/rfc4254) - SSH Connection Protocol
//! - [OpenSSH protocol extensions](https://cvsweb.openbsd.org/src/usr.bin/ssh/PROTOCOL) -
//!   the `no-more-sessions@openssh.com` global request

pub mod auth;
pub mod connection;
pub mod filter;
pub mod handshake;
pub mod hostkey;
pub mod kex;
pub mod message;
pub mod packet;
pub mod proxy;
pub mod transport;
pub mod version;

// Re-export main types
pub use auth::{
    authenticate_client, authenticate_server, constant_time_compare, AuthFailure, AuthMethod,
    AuthRequest, ClientConfig, ServerConfig,
};
pub use connection::{
    ChannelFailure, ChannelOpen, ChannelOpenFailure, ChannelOpenFailureReason, ChannelRequest,
    ChannelRequestType, ChannelType, Disconnect, GlobalRequest, Ignore, RequestFailure,
    RequestSuccess, NO_MORE_SESSIONS_REQUEST,
};
pub use filter::{ClientVerdict, Filter, FilterFailure, NmsStatus, ServerVerdict};
pub use handshake::establish_session;
pub use hostkey::{HostKey, NoneHostKey};
pub use kex::{derive_session_id, KexInit, NewKeys};
pub use message::MessageType;
pub use packet::Packet;
pub use proxy::{ClientFilterCallback, Handoff, Proxy, ServerFilterCallback};
pub use transport::{Role, Transport, TransportReader, TransportWriter};
pub use version::Version;
