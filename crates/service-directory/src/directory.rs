//! The authoritative mapping from service slots to their endpoints
//!
//! One [`ServiceRecord`] per sighted [`ServiceAddress`]: the server side of the
//! slot plus every client registered for it. All matching decisions happen
//! here; the directory itself never emits notifications, it only reports which
//! records changed state so the caller can.

use crate::addr::{Cookie, ProxyAddress, ServiceAddress, Source, StubAddress, COOKIE_ANY};
use crate::error::{Error, Result};
use crate::info::{ClientInfo, ServerInfo};
use tracing::debug;

/// One service slot: the serving stub (when present) and its clients.
#[derive(Debug, Clone)]
pub struct ServiceRecord {
    server: ServerInfo,
    clients: Vec<ClientInfo>,
}

impl ServiceRecord {
    fn new(service: ServiceAddress) -> Self {
        Self {
            server: ServerInfo::vacant(service),
            clients: Vec::new(),
        }
    }

    /// The server side of the slot.
    pub fn server(&self) -> &ServerInfo {
        &self.server
    }

    /// Clients registered for the slot, in registration order.
    pub fn clients(&self) -> &[ClientInfo] {
        &self.clients
    }

    fn service(&self) -> &ServiceAddress {
        &self.server.address().service
    }
}

/// Insertion-ordered registry of service slots.
///
/// Mutated only by the connection manager's dispatcher; shared read access is
/// limited to short-lived snapshots.
#[derive(Debug, Default)]
pub struct ServiceDirectory {
    records: Vec<ServiceRecord>,
}

impl ServiceDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked service slots.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no slot is tracked.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate records in insertion order.
    pub fn records(&self) -> impl Iterator<Item = &ServiceRecord> {
        self.records.iter()
    }

    /// Drop every record.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Register the server side of a slot.
    ///
    /// Returns the updated server record together with the clients whose
    /// status just transitioned to connected. Registering the exact same
    /// endpoint again is idempotent; a different stub claiming an occupied
    /// slot is a role-name collision.
    pub fn register_server(
        &mut self,
        stub: StubAddress,
    ) -> Result<(ServerInfo, Vec<ClientInfo>)> {
        if !stub.is_valid() {
            return Err(Error::InvalidAddress(stub.to_string()));
        }

        let record = self.find_or_insert(&stub.service);
        if record.server.is_valid() && !record.server.address().same_endpoint(&stub) {
            return Err(Error::DuplicateServer {
                existing: record.server.address().clone(),
                rejected: stub,
            });
        }

        record.server.set_connected(stub);
        let mut connected = Vec::with_capacity(record.clients.len());
        for client in &mut record.clients {
            if client.connect() {
                connected.push(client.clone());
            }
        }

        debug!(server = %record.server.address(), waiting = connected.len(), "server occupies slot");
        Ok((record.server.clone(), connected))
    }

    /// Withdraw the server side of a slot.
    ///
    /// Returns a snapshot of the server taken before the stub is cleared plus
    /// snapshots of the clients that were expecting the connection, taken
    /// before their transition to disconnected. The record is removed when no
    /// clients remain.
    pub fn unregister_server(
        &mut self,
        stub: &StubAddress,
    ) -> Option<(ServerInfo, Vec<ClientInfo>)> {
        let index = self.find_index(&stub.service)?;
        let record = &mut self.records[index];
        if !record.server.is_valid() || record.server.address() != stub {
            return None;
        }

        let server = record.server.clone();
        let affected: Vec<ClientInfo> = record
            .clients
            .iter()
            .filter(|client| client.is_waiting_connection())
            .cloned()
            .collect();

        record.server.set_disconnected();
        for client in &mut record.clients {
            client.disconnect();
        }

        if record.clients.is_empty() {
            self.records.remove(index);
        }

        Some((server, affected))
    }

    /// Register a client for a slot, creating the record when absent.
    ///
    /// The returned flag reports whether this registration transitioned the
    /// client to connected. Registering an already present proxy is
    /// idempotent: it refreshes the runtime-assigned routing metadata of the
    /// stored address and never reports a transition.
    pub fn register_client(
        &mut self,
        proxy: ProxyAddress,
    ) -> Result<(ServerInfo, ClientInfo, bool)> {
        if !proxy.is_valid() {
            return Err(Error::InvalidAddress(proxy.to_string()));
        }

        let record = self.find_or_insert(&proxy.service);
        if let Some(existing) = record.clients.iter_mut().find(|c| c.address() == &proxy) {
            existing.refresh(proxy);
            return Ok((record.server.clone(), existing.clone(), false));
        }

        let mut client = ClientInfo::new(proxy);
        let connected_now = record.server.is_valid() && client.connect();
        record.clients.push(client.clone());

        debug!(client = %client.address(), server = %record.server.address(), status = %client.status(), "client joined slot");
        Ok((record.server.clone(), client, connected_now))
    }

    /// Remove a client from its slot.
    ///
    /// Returns the server record and the removed client carrying its last
    /// status. An unoccupied record with no remaining clients is removed.
    pub fn unregister_client(&mut self, proxy: &ProxyAddress) -> Option<(ServerInfo, ClientInfo)> {
        let index = self.find_index(&proxy.service)?;
        let record = &mut self.records[index];
        let position = record.clients.iter().position(|c| c.address() == proxy)?;
        let client = record.clients.remove(position);
        let server = record.server.clone();

        if !record.server.is_valid() && record.clients.is_empty() {
            self.records.remove(index);
        }

        Some((server, client))
    }

    /// Snapshot of all valid endpoints whose process cookie matches.
    ///
    /// [`COOKIE_ANY`] matches every process.
    pub fn service_list(&self, cookie: Cookie) -> (Vec<StubAddress>, Vec<ProxyAddress>) {
        let mut stubs = Vec::new();
        let mut proxies = Vec::new();

        for record in &self.records {
            let server = record.server.address();
            if server.is_valid() && (cookie == COOKIE_ANY || server.cookie == cookie) {
                stubs.push(server.clone());
            }
            for client in &record.clients {
                let proxy = client.address();
                if proxy.is_valid() && (cookie == COOKIE_ANY || proxy.cookie == cookie) {
                    proxies.push(proxy.clone());
                }
            }
        }

        (stubs, proxies)
    }

    /// Snapshot of all valid endpoints registered from one source.
    pub fn service_sources(&self, source: Source) -> (Vec<StubAddress>, Vec<ProxyAddress>) {
        let mut stubs = Vec::new();
        let mut proxies = Vec::new();

        for record in &self.records {
            let server = record.server.address();
            if server.is_valid() && server.source == source {
                stubs.push(server.clone());
            }
            for client in &record.clients {
                let proxy = client.address();
                if proxy.is_valid() && proxy.source == source {
                    proxies.push(proxy.clone());
                }
            }
        }

        (stubs, proxies)
    }

    fn find_index(&self, service: &ServiceAddress) -> Option<usize> {
        self.records.iter().position(|r| r.service() == service)
    }

    fn find_or_insert(&mut self, service: &ServiceAddress) -> &mut ServiceRecord {
        match self.find_index(service) {
            Some(index) => &mut self.records[index],
            None => {
                self.records.push(ServiceRecord::new(service.clone()));
                self.records.last_mut().expect("record was just inserted")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addr::{ServiceKind, COOKIE_ANY};
    use crate::info::ConnectionStatus;

    fn slot(role: &str) -> ServiceAddress {
        ServiceAddress::new("Echo", ServiceKind::Public, role)
    }

    fn stub(role: &str, source: Source) -> StubAddress {
        StubAddress::new(slot(role), "worker", 17, source)
    }

    fn proxy(role: &str, thread: &str, source: Source) -> ProxyAddress {
        ProxyAddress::new(slot(role), thread, 17, source)
    }

    /// Matching symmetry: a client is connected exactly when its record holds
    /// a valid stub for the same slot.
    fn assert_matching_symmetry(directory: &ServiceDirectory) {
        for record in directory.records() {
            for client in record.clients() {
                assert_eq!(
                    client.is_connected(),
                    record.server().is_valid(),
                    "client {} out of sync with its slot",
                    client.address()
                );
                assert_eq!(&client.address().service, &record.server().address().service);
            }
        }
    }

    /// No record may linger without a server and without clients.
    fn assert_no_orphan_record(directory: &ServiceDirectory) {
        for record in directory.records() {
            assert!(
                record.server().is_valid() || !record.clients().is_empty(),
                "orphan record for {}",
                record.server().address()
            );
        }
    }

    #[test]
    fn server_first_then_client_connects() {
        let mut directory = ServiceDirectory::new();
        let (server, waiting) = directory.register_server(stub("r1", 100)).unwrap();
        assert!(server.is_connected());
        assert!(waiting.is_empty());

        let (server, client, connected_now) =
            directory.register_client(proxy("r1", "ui", 200)).unwrap();
        assert!(server.is_valid());
        assert!(client.is_connected());
        assert!(connected_now);
        assert_eq!(directory.len(), 1);
        assert_matching_symmetry(&directory);
    }

    #[test]
    fn client_first_waits_for_the_server() {
        let mut directory = ServiceDirectory::new();
        let (server, client, connected_now) =
            directory.register_client(proxy("r1", "ui", 200)).unwrap();
        assert!(!server.is_valid());
        assert_eq!(client.status(), ConnectionStatus::Pending);
        assert!(!connected_now);

        let (server, connected) = directory.register_server(stub("r1", 100)).unwrap();
        assert!(server.is_connected());
        assert_eq!(connected.len(), 1);
        assert!(connected[0].is_connected());
        assert_matching_symmetry(&directory);
    }

    #[test]
    fn duplicate_server_is_rejected_and_state_kept() {
        let mut directory = ServiceDirectory::new();
        directory.register_server(stub("r1", 100)).unwrap();
        directory.register_client(proxy("r1", "ui", 200)).unwrap();

        let err = directory.register_server(stub("r1", 101)).unwrap_err();
        assert!(matches!(err, Error::DuplicateServer { .. }));

        let (stubs, _) = directory.service_list(COOKIE_ANY);
        assert_eq!(stubs.len(), 1);
        assert_eq!(stubs[0].source, 100);
        assert_matching_symmetry(&directory);
    }

    #[test]
    fn reregistering_the_same_endpoint_is_idempotent() {
        let mut directory = ServiceDirectory::new();
        directory.register_server(stub("r1", 100)).unwrap();
        let (server, connected) = directory.register_server(stub("r1", 100)).unwrap();
        assert!(server.is_connected());
        assert!(connected.is_empty());
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn server_withdrawal_disconnects_clients_and_keeps_them() {
        let mut directory = ServiceDirectory::new();
        directory.register_server(stub("r1", 100)).unwrap();
        directory.register_client(proxy("r1", "ui", 200)).unwrap();

        let (server, affected) = directory.unregister_server(&stub("r1", 100)).unwrap();
        assert!(server.is_valid(), "snapshot is taken before the clear");
        assert_eq!(affected.len(), 1);
        assert!(affected[0].is_connected(), "snapshot carries the prior status");

        let record = directory.records().next().unwrap();
        assert!(!record.server().is_valid());
        assert_eq!(record.server().status(), ConnectionStatus::Disconnected);
        assert_eq!(record.clients()[0].status(), ConnectionStatus::Disconnected);
        assert_no_orphan_record(&directory);
    }

    #[test]
    fn server_withdrawal_without_clients_drops_the_record() {
        let mut directory = ServiceDirectory::new();
        directory.register_server(stub("r1", 100)).unwrap();
        directory.unregister_server(&stub("r1", 100)).unwrap();
        assert!(directory.is_empty());
    }

    #[test]
    fn unregistering_the_last_client_of_a_vacant_slot_drops_the_record() {
        let mut directory = ServiceDirectory::new();
        directory.register_server(stub("r1", 100)).unwrap();
        directory.register_client(proxy("r1", "ui", 200)).unwrap();
        directory.unregister_server(&stub("r1", 100)).unwrap();

        let (server, client) = directory.unregister_client(&proxy("r1", "ui", 200)).unwrap();
        assert!(!server.is_valid());
        assert_eq!(client.status(), ConnectionStatus::Disconnected);
        assert!(directory.is_empty());
        assert_no_orphan_record(&directory);
    }

    #[test]
    fn client_registration_is_idempotent_per_logical_address() {
        let mut directory = ServiceDirectory::new();
        directory.register_server(stub("r1", 100)).unwrap();
        directory.register_client(proxy("r1", "ui", 200)).unwrap();

        // Same proxy re-registers with a fresh source: no second entry and
        // no reported transition.
        let (_, client, connected_now) = directory.register_client(proxy("r1", "ui", 300)).unwrap();
        assert!(client.is_connected());
        assert!(!connected_now);
        assert_eq!(directory.records().next().unwrap().clients().len(), 1);
        assert_eq!(
            directory.records().next().unwrap().clients()[0].address().source,
            300
        );

        // A proxy on another thread is a distinct client.
        directory.register_client(proxy("r1", "render", 400)).unwrap();
        assert_eq!(directory.records().next().unwrap().clients().len(), 2);
    }

    #[test]
    fn reconnect_transitions_disconnected_clients_back() {
        let mut directory = ServiceDirectory::new();
        directory.register_server(stub("r1", 100)).unwrap();
        directory.register_client(proxy("r1", "ui", 200)).unwrap();
        directory.unregister_server(&stub("r1", 100)).unwrap();

        let (_, connected) = directory.register_server(stub("r1", 500)).unwrap();
        assert_eq!(connected.len(), 1);
        assert!(connected[0].is_connected());
        assert_matching_symmetry(&directory);
    }

    #[test]
    fn unregister_without_matching_server_is_ignored() {
        let mut directory = ServiceDirectory::new();
        directory.register_client(proxy("r1", "ui", 200)).unwrap();
        // The slot exists but is vacant; there is nothing to withdraw.
        assert!(directory.unregister_server(&stub("r1", 100)).is_none());
        assert!(directory.unregister_server(&stub("r2", 100)).is_none());
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn invalid_addresses_are_rejected() {
        let mut directory = ServiceDirectory::new();
        let err = directory
            .register_server(StubAddress::vacant(slot("r1")))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidAddress(_)));

        let unsourced = ProxyAddress::new(slot("r1"), "ui", 17, crate::addr::SOURCE_UNKNOWN);
        assert!(directory.register_client(unsourced).is_err());
        assert!(directory.is_empty());
    }

    #[test]
    fn records_iterate_in_insertion_order() {
        let mut directory = ServiceDirectory::new();
        directory.register_client(proxy("r2", "ui", 200)).unwrap();
        directory.register_server(stub("r1", 100)).unwrap();
        directory.register_server(stub("r3", 101)).unwrap();

        let roles: Vec<&str> = directory
            .records()
            .map(|r| r.server().address().service.role_name.as_str())
            .collect();
        assert_eq!(roles, ["r2", "r1", "r3"]);
    }

    #[test]
    fn snapshots_filter_by_cookie_and_source() {
        let mut directory = ServiceDirectory::new();
        directory.register_server(stub("r1", 100)).unwrap();
        directory
            .register_server(StubAddress::new(slot("r2"), "net", 42, 700))
            .unwrap();
        directory.register_client(proxy("r1", "ui", 200)).unwrap();

        let (stubs, proxies) = directory.service_list(COOKIE_ANY);
        assert_eq!((stubs.len(), proxies.len()), (2, 1));

        let (stubs, proxies) = directory.service_list(42);
        assert_eq!((stubs.len(), proxies.len()), (1, 0));
        assert_eq!(stubs[0].cookie, 42);

        let (stubs, proxies) = directory.service_sources(700);
        assert_eq!((stubs.len(), proxies.len()), (1, 0));
        let (stubs, proxies) = directory.service_sources(200);
        assert_eq!((stubs.len(), proxies.len()), (0, 1));
    }
}
