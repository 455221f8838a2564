//! Per-connection packet classifier and no-more-sessions state machine.
//!
//! The filter is consulted once per packet per direction by the proxy
//! engine. On the client side it enforces the policy: exactly one `session`
//! channel, exactly one `exec` with the announced command, and no key
//! exchange until the server has acknowledged `no-more-sessions` (or the
//! user escalates). On the server side it only observes, tracking the NMS
//! reply.
//!
//! The filter is shared by the two forwarding tasks but the tasks touch
//! disjoint state: the client→server task writes `session_opened` and arms
//! `nms_status`, the server→client task resolves `nms_status`. Two atomics
//! publish those writes across tasks; no lock is held while prompting.

use crate::policy::{PolicyStore, Scope};
use crate::prompt::{Prompt, PromptFn};
use crate::ssh::connection::{
    ChannelFailure, ChannelOpen, ChannelOpenFailure, ChannelOpenFailureReason, ChannelRequest,
    ChannelRequestType, ChannelType, Disconnect, GlobalRequest, RequestFailure,
    NO_MORE_SESSIONS_REQUEST,
};
use crate::ssh::message::MessageType;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use warden_platform::{WardenError, WardenResult};

/// Disconnect reason sent when a handoff is attempted without allowance.
pub const DISCONNECT_REASON_HANDOFF_DENIED: u32 = 2;

/// Disconnect reason reserved for an NMS failure with no allowance.
pub const DISCONNECT_REASON_NMS_FAILED: u32 = 3;

/// State of the no-more-sessions sub-protocol.
///
/// Transitions form a DAG: `Inactive` → `AwaitingReply` (on the client's NMS
/// global request) → `Success` or `Failure` (on the server's reply). No
/// other transition occurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NmsStatus {
    /// The client has not issued no-more-sessions.
    Inactive = 0,
    /// The client's request is in flight; the server has not replied.
    AwaitingReply = 1,
    /// The server acknowledged: no further sessions will be granted.
    Success = 2,
    /// The server refused the request.
    Failure = 3,
}

impl NmsStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => NmsStatus::AwaitingReply,
            2 => NmsStatus::Success,
            3 => NmsStatus::Failure,
            _ => NmsStatus::Inactive,
        }
    }
}

/// The filter's decision for a client packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientVerdict {
    /// Forward the packet to the server unchanged.
    Forward,
    /// Do not forward; write `response` back toward the client.
    Block {
        /// The SSH-native failure payload for the client.
        response: Vec<u8>,
    },
}

/// The filter's decision for a server packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerVerdict {
    /// Forward the packet to the client unchanged.
    Forward,
    /// Terminal condition: write `response` to the client and end the
    /// connection. The shipped filter never emits this; the engine honors it
    /// regardless.
    Terminate {
        /// The SSH-native failure payload for the client.
        response: Vec<u8>,
    },
}

/// A terminal filter fault: the forwarding task must exit with `error`,
/// writing `response` toward the client first if present.
#[derive(Debug)]
pub struct FilterFailure {
    /// Payload to write toward the client before exiting, if any.
    pub response: Option<Vec<u8>>,
    /// The fault to surface through the completion channel.
    pub error: WardenError,
}

impl From<WardenError> for FilterFailure {
    fn from(error: WardenError) -> Self {
        Self {
            response: None,
            error,
        }
    }
}

/// The decoded view of a client packet: a closed sum over the messages the
/// filter inspects, with everything else opaque.
#[derive(Debug)]
enum ClientMessage {
    ChannelOpen(ChannelOpen),
    GlobalRequest(GlobalRequest),
    ChannelRequest(ChannelRequest),
    KexInit,
    Opaque,
}

fn decode_client_message(packet: &[u8]) -> WardenResult<ClientMessage> {
    match packet.first().copied().and_then(MessageType::from_u8) {
        Some(MessageType::ChannelOpen) => Ok(ClientMessage::ChannelOpen(ChannelOpen::from_bytes(
            packet,
        )?)),
        Some(MessageType::GlobalRequest) => Ok(ClientMessage::GlobalRequest(
            GlobalRequest::from_bytes(packet)?,
        )),
        Some(MessageType::ChannelRequest) => Ok(ClientMessage::ChannelRequest(
            ChannelRequest::from_bytes(packet)?,
        )),
        Some(MessageType::KexInit) => Ok(ClientMessage::KexInit),
        _ => Ok(ClientMessage::Opaque),
    }
}

/// The per-connection policy enforcer.
pub struct Filter {
    scope: Scope,
    command: String,
    store: Arc<PolicyStore>,
    prompt: PromptFn,
    session_opened: AtomicBool,
    nms_status: AtomicU8,
}

impl Filter {
    /// Creates a filter for one connection: the scope, the one command the
    /// client has announced, the shared store, and the prompt adapter.
    pub fn new(scope: Scope, store: Arc<PolicyStore>, command: &str, prompt: PromptFn) -> Self {
        Self {
            scope,
            command: command.to_string(),
            store,
            prompt,
            session_opened: AtomicBool::new(false),
            nms_status: AtomicU8::new(NmsStatus::Inactive as u8),
        }
    }

    /// Returns the scope this filter enforces.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Returns the expected command.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Returns the current NMS status.
    pub fn nms_status(&self) -> NmsStatus {
        NmsStatus::from_u8(self.nms_status.load(Ordering::SeqCst))
    }

    /// Returns whether the one permitted session channel has been opened.
    pub fn session_opened(&self) -> bool {
        self.session_opened.load(Ordering::SeqCst)
    }

    /// Checks that the expected command is approved for the scope, asking
    /// the user if the store does not already grant it.
    ///
    /// # Errors
    ///
    /// [`WardenError::ApprovalRejected`] when the user disallows,
    /// [`WardenError::Store`] when a forever-grant cannot be persisted.
    pub fn is_approved(&self) -> WardenResult<()> {
        let rule = self.store.get_rule(&self.scope);
        if rule.is_approved(&self.command) {
            return Ok(());
        }
        self.ask_for_approval()
    }

    fn ask_for_approval(&self) -> WardenResult<()> {
        let question = format!(
            "Allow {} to run '{}' on {}?",
            self.scope.client_label(),
            self.command,
            self.scope.service_label()
        );

        let prompt = Prompt {
            question,
            choices: vec![
                "Disallow".to_string(),
                "Allow once".to_string(),
                "Allow forever".to_string(),
                format!(
                    "Allow {} to run any command on {} forever",
                    self.scope.client_label(),
                    self.scope.service_label()
                ),
            ],
        };

        match (self.prompt)(&prompt)? {
            1 => Err(WardenError::ApprovalRejected {
                request: format!(
                    "{} running '{}' on {}",
                    self.scope.client_label(),
                    self.command,
                    self.scope.service_label()
                ),
            }),
            2 => Ok(()),
            3 => self.store.set_command_allowed(&self.scope, &self.command),
            4 => self.store.set_all_allowed(&self.scope),
            other => Err(WardenError::ApprovalRejected {
                request: format!("prompt returned out-of-range choice {}", other),
            }),
        }
    }

    /// Asks the user to allow a handoff the single-command approval cannot
    /// cover: once the client key-exchanges without no-more-sessions, it can
    /// run anything on the server.
    ///
    /// # Errors
    ///
    /// [`WardenError::ApprovalRejected`] when disallowed,
    /// [`WardenError::Store`] when the forever-grant cannot be persisted.
    pub fn escalate_approval(&self) -> WardenResult<()> {
        let question = format!(
            "Can't enforce permission for a single command. Allow {} to run any command on {}?",
            self.scope.client_label(),
            self.scope.service_label()
        );

        let prompt = Prompt {
            question,
            choices: vec![
                "Disallow".to_string(),
                "Allow for session".to_string(),
                "Allow forever".to_string(),
            ],
        };

        match (self.prompt)(&prompt)? {
            1 => Err(WardenError::ApprovalRejected {
                request: format!(
                    "handoff letting {} run any command on {}",
                    self.scope.client_label(),
                    self.scope.service_label()
                ),
            }),
            2 => Ok(()),
            3 => self.store.set_all_allowed(&self.scope),
            other => Err(WardenError::ApprovalRejected {
                request: format!("prompt returned out-of-range choice {}", other),
            }),
        }
    }

    /// Classifies one client packet.
    ///
    /// # Errors
    ///
    /// A decode failure or a rejected escalation is terminal for the
    /// connection; the returned [`FilterFailure`] carries any response the
    /// engine must write toward the client first.
    pub fn filter_client_packet(&self, packet: &[u8]) -> Result<ClientVerdict, FilterFailure> {
        match decode_client_message(packet)? {
            ClientMessage::ChannelOpen(open) => {
                if open.channel_type() != &ChannelType::Session || self.session_opened() {
                    warn!(
                        channel_type = open.channel_type().name(),
                        already_open = self.session_opened(),
                        "channel open blocked"
                    );
                    let response = ChannelOpenFailure::new(
                        open.sender_channel(),
                        ChannelOpenFailureReason::AdministrativelyProhibited,
                    );
                    return Ok(ClientVerdict::Block {
                        response: response.to_bytes(),
                    });
                }
                self.session_opened.store(true, Ordering::SeqCst);
                Ok(ClientVerdict::Forward)
            }
            ClientMessage::GlobalRequest(request) => {
                if request.name() != NO_MORE_SESSIONS_REQUEST {
                    warn!(name = request.name(), "global request blocked");
                    return Ok(ClientVerdict::Block {
                        response: RequestFailure::new().to_bytes(),
                    });
                }
                debug!("client sent no-more-sessions");
                let _ = self.nms_status.compare_exchange(
                    NmsStatus::Inactive as u8,
                    NmsStatus::AwaitingReply as u8,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                );
                Ok(ClientVerdict::Forward)
            }
            ClientMessage::ChannelRequest(request) => match request.request_type() {
                ChannelRequestType::Exec { command } if command == &self.command => {
                    Ok(ClientVerdict::Forward)
                }
                ChannelRequestType::Exec { command } => {
                    warn!(
                        got = %command,
                        expected = %self.command,
                        "exec with unexpected command blocked"
                    );
                    Ok(ClientVerdict::Block {
                        response: ChannelFailure::new(request.recipient_channel()).to_bytes(),
                    })
                }
                ChannelRequestType::Other { name, .. } => {
                    warn!(request = %name, "channel request blocked (only 'exec' is allowed)");
                    Ok(ClientVerdict::Block {
                        response: ChannelFailure::new(request.recipient_channel()).to_bytes(),
                    })
                }
            },
            ClientMessage::KexInit => {
                if self.nms_status() != NmsStatus::Success
                    && !self.store.get_rule(&self.scope).all_commands
                {
                    warn!("attempting handoff without successful no-more-sessions");
                    if let Err(error) = self.escalate_approval() {
                        let disconnect = Disconnect::new(
                            DISCONNECT_REASON_HANDOFF_DENIED,
                            "Must issue no-more-sessions before handoff",
                        );
                        return Err(FilterFailure {
                            response: Some(disconnect.to_bytes()),
                            error,
                        });
                    }
                }
                Ok(ClientVerdict::Forward)
            }
            ClientMessage::Opaque => Ok(ClientVerdict::Forward),
        }
    }

    /// Observes one server packet, resolving the NMS reply if one is
    /// pending. The server side never blocks or rewrites in this design.
    pub fn filter_server_packet(&self, packet: &[u8]) -> Result<ServerVerdict, FilterFailure> {
        if self.nms_status() != NmsStatus::AwaitingReply {
            return Ok(ServerVerdict::Forward);
        }

        match packet.first().copied().and_then(MessageType::from_u8) {
            Some(MessageType::RequestSuccess) => {
                debug!("server approved no-more-sessions");
                let _ = self.nms_status.compare_exchange(
                    NmsStatus::AwaitingReply as u8,
                    NmsStatus::Success as u8,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                );
            }
            Some(MessageType::RequestFailure) => {
                debug!("server sent no-more-sessions failure");
                let _ = self.nms_status.compare_exchange(
                    NmsStatus::AwaitingReply as u8,
                    NmsStatus::Failure as u8,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                );
            }
            _ => {}
        }

        Ok(ServerVerdict::Forward)
    }
}

impl std::fmt::Debug for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Filter")
            .field("scope", &self.scope)
            .field("command", &self.command)
            .field("session_opened", &self.session_opened())
            .field("nms_status", &self.nms_status())
            .finish()
    }
}
