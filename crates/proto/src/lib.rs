//! # Warden Proto
//!
//! A policy-enforcing SSH interposer.
//!
//! Warden terminates an incoming SSH connection, opens an outgoing
//! connection to the target server under the client's credentials, and
//! relays packets in both directions while enforcing a per-(client, service)
//! authorization policy: one `session` channel, one approved `exec`, and no
//! direct key exchange until the server has acknowledged
//! `no-more-sessions@openssh.com`. After the handoff the client and server
//! key-exchange directly and the interposer is a transparent byte relay.
//!
//! # Modules
//!
//! - [`ssh`] - protocol layers: packets, transports, handshake, auth,
//!   connection messages, the filter, and the proxy engine
//! - [`policy`] - the durable scope-to-rule authorization store
//! - [`prompt`] - the question/choices approval interaction
//! - [`interpose`] - glue wiring one accepted connection end to end

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod interpose;
pub mod policy;
pub mod prompt;
pub mod ssh;

pub use policy::{PolicyStore, Rule, Scope};
pub use prompt::{Prompt, PromptFn};
