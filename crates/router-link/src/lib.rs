//! TCP adapter mirroring public service registrations to a router
//!
//! The router is a separate broker process relaying registrations between
//! nodes. This crate gives the connection manager its view of that broker: a
//! [`TcpRouterLink`] implementing the manager's `RemoteChannel` seam, the
//! key=value configuration it is set up from, and the line protocol it speaks.

#![warn(missing_docs)]

pub mod config;
pub mod link;
pub mod protocol;

pub use config::{parse_file, parse_str, ConfigError, RouterConfig};
pub use link::TcpRouterLink;
pub use protocol::RouterMessage;
