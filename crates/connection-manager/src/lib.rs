//! Single-threaded manager actor wiring service clients to servers
//!
//! The connection manager owns the process-wide [`ServiceDirectory`] and turns
//! registration requests into state transitions plus connect/disconnect
//! notifications. It runs as a cooperative actor: all mutations happen on one
//! dispatcher, fed by a command queue, so no caller ever holds a manager lock.
//!
//! Remote endpoints enter through the [`remote::RemoteChannel`] seam and are
//! folded into the same registration paths as local ones, which is what makes
//! a stub behind a socket indistinguishable from a stub in a sibling thread.

#![warn(missing_docs)]

pub mod command;
pub mod hub;
pub mod manager;
pub mod remote;

pub use command::Command;
pub use hub::{ConnectEvent, DispatcherHub, EventTarget};
pub use manager::{ManagerDriver, ServiceManager};
pub use remote::{NullLink, RemoteChannel, RouterEvent};
pub use service_directory::ServiceDirectory;
