//! Per-endpoint connection state records

use crate::addr::{ProxyAddress, ServiceAddress, StubAddress};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection state of a registered endpoint.
///
/// `Unknown` and `Pending` are kept distinct: a record is `Pending` while it
/// waits for its counterpart, `Unknown` only once the endpoint itself has
/// unregistered. Trace output relies on the difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// The endpoint is not tracked.
    Unknown,
    /// Registered and waiting for its counterpart.
    Pending,
    /// Matched with a usable counterpart.
    Connected,
    /// The counterpart withdrew while this endpoint is still registered.
    Disconnected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionStatus::Unknown => "unknown",
            ConnectionStatus::Pending => "pending",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

/// State record of the server side of a service slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    address: StubAddress,
    status: ConnectionStatus,
}

impl ServerInfo {
    /// Record for a slot sighted through a client registration: no stub yet.
    pub fn vacant(service: ServiceAddress) -> Self {
        Self {
            address: StubAddress::vacant(service),
            status: ConnectionStatus::Pending,
        }
    }

    /// The stored stub address.
    pub fn address(&self) -> &StubAddress {
        &self.address
    }

    /// Current connection state of the slot.
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// True when a usable stub occupies the slot.
    pub fn is_valid(&self) -> bool {
        self.address.is_valid()
    }

    /// True when the slot is serving.
    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    /// Occupy the slot with a registered stub.
    pub(crate) fn set_connected(&mut self, stub: StubAddress) {
        self.address = stub;
        self.status = ConnectionStatus::Connected;
    }

    /// Clear the stub while clients remain registered.
    pub(crate) fn set_disconnected(&mut self) {
        self.address = StubAddress::vacant(self.address.service.clone());
        self.status = ConnectionStatus::Disconnected;
    }
}

/// State record of one registered client of a service slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    address: ProxyAddress,
    status: ConnectionStatus,
}

impl ClientInfo {
    /// Record for a freshly registered proxy.
    pub fn new(proxy: ProxyAddress) -> Self {
        Self {
            address: proxy,
            status: ConnectionStatus::Pending,
        }
    }

    /// The stored proxy address.
    pub fn address(&self) -> &ProxyAddress {
        &self.address
    }

    /// Current connection state of the client.
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// True when the client is matched to a serving stub.
    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    /// True while the client expects a connection: registered and either
    /// waiting or already matched.
    pub fn is_waiting_connection(&self) -> bool {
        matches!(
            self.status,
            ConnectionStatus::Pending | ConnectionStatus::Connected
        )
    }

    /// Transition to `Connected`. Returns whether the status changed.
    pub(crate) fn connect(&mut self) -> bool {
        if self.status == ConnectionStatus::Connected {
            false
        } else {
            self.status = ConnectionStatus::Connected;
            true
        }
    }

    /// Transition to `Disconnected` when a connection was expected.
    pub(crate) fn disconnect(&mut self) {
        if self.is_waiting_connection() {
            self.status = ConnectionStatus::Disconnected;
        }
    }

    /// Refresh the runtime-assigned routing metadata of the stored address.
    pub(crate) fn refresh(&mut self, proxy: ProxyAddress) {
        debug_assert!(self.address == proxy);
        self.address = proxy;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addr::{ServiceKind, StubAddress};

    fn slot() -> ServiceAddress {
        ServiceAddress::new("Echo", ServiceKind::Public, "main")
    }

    #[test]
    fn vacant_server_is_pending_and_invalid() {
        let server = ServerInfo::vacant(slot());
        assert_eq!(server.status(), ConnectionStatus::Pending);
        assert!(!server.is_valid());
        assert!(!server.is_connected());
    }

    #[test]
    fn client_transitions_follow_the_state_machine() {
        let proxy = ProxyAddress::new(slot(), "ui", 17, 200);
        let mut client = ClientInfo::new(proxy);
        assert!(client.is_waiting_connection());
        assert!(!client.is_connected());

        assert!(client.connect());
        assert!(!client.connect());
        assert!(client.is_connected());

        client.disconnect();
        assert_eq!(client.status(), ConnectionStatus::Disconnected);
        assert!(!client.is_waiting_connection());

        // A new stub for the same slot reconnects the client.
        assert!(client.connect());
        assert!(client.is_connected());
    }

    #[test]
    fn disconnect_only_touches_waiting_clients() {
        let proxy = ProxyAddress::new(slot(), "ui", 17, 200);
        let mut client = ClientInfo::new(proxy);
        client.connect();
        client.disconnect();
        client.disconnect();
        assert_eq!(client.status(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn server_clears_its_stub_on_disconnect() {
        let mut server = ServerInfo::vacant(slot());
        server.set_connected(StubAddress::new(slot(), "worker", 17, 100));
        assert!(server.is_valid());
        assert!(server.is_connected());

        server.set_disconnected();
        assert!(!server.is_valid());
        assert_eq!(server.status(), ConnectionStatus::Disconnected);
        assert_eq!(server.address().service, slot());
    }
}
