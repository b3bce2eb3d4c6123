//! Async exchange adapters for the PASE handshake.
//!
//! The handshake engine in pase-core is transport-agnostic. This crate
//! carries its messages:
//! - [`Exchange`] trait implemented by every adapter
//! - In-memory loopback pair ([`MemoryExchange`])
//! - Length-prefixed TCP ([`tcp::TcpExchange`])
//! - [`establish`] drives a session over any exchange with a per-message
//!   timeout

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod driver;
pub mod error;
pub mod exchange;

#[cfg(feature = "tcp")]
pub mod tcp;

pub use driver::establish;
pub use error::{Error, Result};
pub use exchange::{Exchange, MemoryExchange};
