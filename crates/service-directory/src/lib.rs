//! Endpoint addressing and the role-name service directory
//!
//! This crate carries the data model of the service wiring engine: canonical
//! endpoint addresses, per-endpoint connection state, and the authoritative
//! directory mapping each service slot to its server and clients.
//!
//! The directory performs all matching, but it is policy-free: operations
//! return the records whose state changed and the caller decides what to
//! notify. The connection manager owns the single dispatcher that mutates it.

#![warn(missing_docs)]

pub mod addr;
pub mod directory;
pub mod error;
pub mod info;

pub use addr::{
    Channel, Cookie, ProxyAddress, ServiceAddress, ServiceKind, Source, StubAddress, COOKIE_ANY,
    COOKIE_LOCAL, COOKIE_UNKNOWN, SOURCE_UNKNOWN,
};
pub use directory::{ServiceDirectory, ServiceRecord};
pub use error::{Error, Result};
pub use info::{ClientInfo, ConnectionStatus, ServerInfo};
