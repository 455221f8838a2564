//! The error vocabulary of the interposer.
//!
//! Variants follow the fault lines of the system rather than generic error
//! categories: wire faults ([`WardenError::Protocol`], [`WardenError::Io`])
//! are fatal to a connection, denials ([`WardenError::ApprovalRejected`],
//! [`WardenError::AuthFailed`]) mean a person or a policy said no, and
//! [`WardenError::Store`] means an approval could not be made durable. The
//! glue distinguishes denials from machinery faults with
//! [`WardenError::is_denial`] when deciding what to log.

use std::fmt;
use std::path::PathBuf;

/// Unified error type for all Warden operations
#[derive(Debug)]
pub enum WardenError {
    /// Malformed or unexpected data on the wire. Fatal to the connection.
    Protocol(String),

    /// Transport read/write failure. The peer is gone; fatal to both
    /// forwarding directions.
    Io(std::io::Error),

    /// The user or the policy declined an approval.
    ApprovalRejected {
        /// What was being asked for, phrased for the rejection line.
        request: String,
    },

    /// Authentication was refused, on either side of the bridge.
    AuthFailed {
        /// The user name the attempt was for.
        user: String,
        /// Why the attempt was refused.
        reason: String,
    },

    /// A policy mutation could not be made durable. Approval paths treat
    /// this the same as a rejection: nothing is granted.
    Store {
        /// The store location, when file-backed.
        path: Option<PathBuf>,
        /// The underlying failure.
        reason: String,
    },

    /// Invalid configuration.
    Config(String),

    /// Any other error.
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl WardenError {
    /// Returns true when the error means someone said no, as opposed to the
    /// machinery failing.
    pub fn is_denial(&self) -> bool {
        matches!(
            self,
            WardenError::ApprovalRejected { .. } | WardenError::AuthFailed { .. }
        )
    }
}

impl fmt::Display for WardenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WardenError::Protocol(msg) => write!(f, "protocol violation: {}", msg),
            WardenError::Io(e) => write!(f, "transport failure: {}", e),
            WardenError::ApprovalRejected { request } => {
                write!(f, "approval rejected: {}", request)
            }
            WardenError::AuthFailed { user, reason } => {
                write!(f, "authentication failed for '{}': {}", user, reason)
            }
            WardenError::Store { path: Some(path), reason } => {
                write!(f, "policy store failure ({}): {}", path.display(), reason)
            }
            WardenError::Store { path: None, reason } => {
                write!(f, "policy store failure: {}", reason)
            }
            WardenError::Config(msg) => write!(f, "invalid configuration: {}", msg),
            WardenError::Other(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for WardenError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WardenError::Io(e) => Some(e),
            WardenError::Other(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for WardenError {
    fn from(err: std::io::Error) -> Self {
        WardenError::Io(err)
    }
}

/// Result type for Warden operations
pub type WardenResult<T> = Result<T, WardenError>;
