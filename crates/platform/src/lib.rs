//! # Warden Platform
//!
//! Core platform types for the Warden SSH interposer.
//!
//! This crate provides the unified error types (`WardenError`, `WardenResult`)
//! shared by every crate in the workspace.
//!
//! # Examples
//!
//! ```
//! use warden_platform::{WardenError, WardenResult};
//!
//! fn example_function() -> WardenResult<String> {
//!     Ok("Hello, Warden!".to_string())
//! }
//!
//! # fn main() -> WardenResult<()> {
//! let result = example_function()?;
//! assert_eq!(result, "Hello, Warden!");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod error;

pub use error::{WardenError, WardenResult};

/// Platform version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
