//! Command set of the manager dispatcher

use service_directory::{Channel, ProxyAddress, StubAddress};
use std::path::PathBuf;

/// A unit of work for the manager dispatcher.
///
/// The set is closed: every public operation of the manager and every router
/// callback maps to exactly one of these, and the dispatcher matches
/// exhaustively.
#[derive(Debug, Clone)]
pub enum Command {
    /// A stub came up and claims its role.
    RegisterStub(StubAddress),
    /// A stub goes down.
    UnregisterStub(StubAddress),
    /// A proxy came up and looks for its role.
    RegisterProxy(ProxyAddress),
    /// A proxy goes down.
    UnregisterProxy(ProxyAddress),
    /// Load the router configuration and enable remote servicing.
    ConfigureConnection(Option<PathBuf>),
    /// Configure if necessary, then connect to the router.
    StartConnection(Option<PathBuf>),
    /// Connect to the router at an explicit endpoint.
    StartNetConnection(String, u16),
    /// Tear down the router link, local state untouched.
    StopConnection,
    /// Toggle the remote-mirror behavior.
    SetEnableService(bool),
    /// The router channel is up; re-publish local public endpoints.
    RegisterConnection(Channel),
    /// The router channel closed gracefully; withdraw remote endpoints.
    UnregisterConnection(Channel),
    /// The router channel was lost; withdraw remote endpoints.
    LostConnection(Channel),
    /// Disconnect every client, drop all state, keep the dispatcher alive.
    StopRoutingClient,
    /// Drop all state, stop the router link and exit the dispatcher.
    ShutdownService,
}

impl Command {
    /// Stable name for trace output.
    pub fn name(&self) -> &'static str {
        match self {
            Command::RegisterStub(_) => "register-stub",
            Command::UnregisterStub(_) => "unregister-stub",
            Command::RegisterProxy(_) => "register-proxy",
            Command::UnregisterProxy(_) => "unregister-proxy",
            Command::ConfigureConnection(_) => "configure-connection",
            Command::StartConnection(_) => "start-connection",
            Command::StartNetConnection(_, _) => "start-net-connection",
            Command::StopConnection => "stop-connection",
            Command::SetEnableService(_) => "set-enable-service",
            Command::RegisterConnection(_) => "register-connection",
            Command::UnregisterConnection(_) => "unregister-connection",
            Command::LostConnection(_) => "lost-connection",
            Command::StopRoutingClient => "stop-routing-client",
            Command::ShutdownService => "shutdown-service",
        }
    }
}
