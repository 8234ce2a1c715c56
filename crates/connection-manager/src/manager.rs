//! The service connection manager
//!
//! A single-threaded actor owning the [`ServiceDirectory`]. Every public
//! operation is a non-blocking enqueue of a [`Command`]; the [`ManagerDriver`]
//! processes commands to completion, one at a time, on one dispatcher. Remote
//! router traffic joins the same loop through [`RouterEvent`]s, so local and
//! remote endpoints flow through identical registration paths.

use crate::command::Command;
use crate::hub::{ConnectEvent, DispatcherHub};
use crate::remote::{RemoteChannel, RouterEvent};
use futures::FutureExt;
use service_directory::{
    Channel, ClientInfo, ConnectionStatus, Cookie, Error, ProxyAddress, Result, ServiceDirectory,
    StubAddress, SOURCE_UNKNOWN,
};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use tracing::{debug, info, warn};

/// Router link state mirrored for lock-free reads from any thread.
#[derive(Debug, Default)]
struct RoutingState {
    configured: AtomicBool,
    enabled: AtomicBool,
    started: AtomicBool,
}

/// Cloneable handle onto the manager dispatcher.
///
/// All mutating calls enqueue and return immediately; their effect is
/// observable only through later connect/disconnect notifications. Calls made
/// after [`ServiceManager::shutdown`] are silently dropped.
#[derive(Clone)]
pub struct ServiceManager {
    commands: async_channel::Sender<Command>,
    directory: Arc<Mutex<ServiceDirectory>>,
    routing: Arc<RoutingState>,
    worker: Arc<Mutex<Option<thread::JoinHandle<()>>>>,
    local_cookie: Cookie,
}

impl ServiceManager {
    /// Create a manager and the driver that must run its dispatch loop.
    ///
    /// The caller decides how to drive the returned [`ManagerDriver`]; use
    /// [`ServiceManager::start`] to run it on a dedicated thread.
    pub fn new(
        hub: Arc<DispatcherHub>,
        link: Box<dyn RemoteChannel>,
        local_cookie: Cookie,
    ) -> (Self, ManagerDriver) {
        let (command_tx, command_rx) = async_channel::unbounded();
        let (router_tx, router_rx) = async_channel::unbounded();
        let directory = Arc::new(Mutex::new(ServiceDirectory::new()));
        let routing = Arc::new(RoutingState::default());

        let manager = Self {
            commands: command_tx,
            directory: directory.clone(),
            routing: routing.clone(),
            worker: Arc::new(Mutex::new(None)),
            local_cookie,
        };
        let driver = ManagerDriver {
            commands: command_rx,
            router_events: router_rx,
            router_feed: router_tx,
            directory,
            hub,
            link,
            routing,
            local_cookie,
        };
        (manager, driver)
    }

    /// Create a manager running on its own `service-manager` thread.
    pub fn start(
        hub: Arc<DispatcherHub>,
        link: Box<dyn RemoteChannel>,
        local_cookie: Cookie,
    ) -> Self {
        let (manager, driver) = Self::new(hub, link, local_cookie);
        let worker = thread::Builder::new()
            .name("service-manager".into())
            .spawn(move || futures_lite::future::block_on(driver.run()))
            .expect("failed to spawn the service-manager thread");
        *manager.worker.lock().unwrap() = Some(worker);
        manager
    }

    /// Cookie identifying the hosting process.
    pub fn local_cookie(&self) -> Cookie {
        self.local_cookie
    }

    /// Announce a stub that claims its role.
    pub fn request_register_server(&self, stub: StubAddress) -> Result<()> {
        if !stub.is_valid() {
            return Err(Error::InvalidAddress(stub.to_string()));
        }
        self.send(Command::RegisterStub(stub));
        Ok(())
    }

    /// Withdraw a stub.
    pub fn request_unregister_server(&self, stub: StubAddress) -> Result<()> {
        if !stub.is_valid() {
            return Err(Error::InvalidAddress(stub.to_string()));
        }
        self.send(Command::UnregisterStub(stub));
        Ok(())
    }

    /// Announce a proxy looking for its role.
    pub fn request_register_client(&self, proxy: ProxyAddress) -> Result<()> {
        if !proxy.is_valid() {
            return Err(Error::InvalidAddress(proxy.to_string()));
        }
        self.send(Command::RegisterProxy(proxy));
        Ok(())
    }

    /// Withdraw a proxy.
    pub fn request_unregister_client(&self, proxy: ProxyAddress) -> Result<()> {
        if !proxy.is_valid() {
            return Err(Error::InvalidAddress(proxy.to_string()));
        }
        self.send(Command::UnregisterProxy(proxy));
        Ok(())
    }

    /// Load router configuration and enable remote servicing.
    pub fn configure_routing(&self, config: Option<&Path>) {
        self.send(Command::ConfigureConnection(config.map(Path::to_path_buf)));
    }

    /// Configure if necessary, then connect to the router.
    pub fn start_routing(&self, config: Option<&Path>) {
        self.send(Command::StartConnection(config.map(Path::to_path_buf)));
    }

    /// Connect to the router at an explicit endpoint.
    pub fn start_routing_at(&self, host: &str, port: u16) -> Result<()> {
        if host.is_empty() || port == 0 {
            return Err(Error::InvalidAddress(format!("{host}:{port}")));
        }
        self.send(Command::StartNetConnection(host.to_string(), port));
        Ok(())
    }

    /// Tear down the router link without touching local state.
    pub fn stop_routing(&self) {
        self.send(Command::StopConnection);
    }

    /// Toggle the remote-mirror behavior.
    pub fn enable_routing(&self, enable: bool) {
        self.send(Command::SetEnableService(enable));
    }

    /// Disconnect every client, drop all state, keep the dispatcher alive.
    pub fn stop_routing_client(&self) {
        self.send(Command::StopRoutingClient);
    }

    /// Drop all state, stop the router link and terminate the dispatcher.
    ///
    /// Queued commands are processed first; the dispatcher thread, when one
    /// was started, is joined.
    pub fn shutdown(&self) {
        self.send(Command::ShutdownService);
        if let Some(worker) = self.worker.lock().unwrap().take() {
            let _ = worker.join();
        }
    }

    /// Snapshot of all valid endpoints whose process cookie matches.
    ///
    /// The only read path shared with other threads; it briefly locks the
    /// directory and does not order against queued commands.
    pub fn service_list(&self, cookie: Cookie) -> (Vec<StubAddress>, Vec<ProxyAddress>) {
        self.directory.lock().unwrap().service_list(cookie)
    }

    /// True while the router channel is up.
    pub fn is_routing_started(&self) -> bool {
        self.routing.started.load(Ordering::SeqCst)
    }

    /// True once router configuration is loaded.
    pub fn is_routing_configured(&self) -> bool {
        self.routing.configured.load(Ordering::SeqCst)
    }

    /// True while remote servicing is allowed.
    pub fn is_routing_enabled(&self) -> bool {
        self.routing.enabled.load(Ordering::SeqCst)
    }

    fn send(&self, command: Command) {
        // A closed queue means the dispatcher is gone; the command is dropped.
        if let Err(err) = self.commands.try_send(command) {
            debug!(
                command = err.into_inner().name(),
                "manager is down, dropping command"
            );
        }
    }
}

enum Advert {
    Stub(StubAddress),
    Proxy(ProxyAddress),
}

/// The dispatch loop of a [`ServiceManager`].
pub struct ManagerDriver {
    commands: async_channel::Receiver<Command>,
    router_events: async_channel::Receiver<RouterEvent>,
    router_feed: async_channel::Sender<RouterEvent>,
    directory: Arc<Mutex<ServiceDirectory>>,
    hub: Arc<DispatcherHub>,
    link: Box<dyn RemoteChannel>,
    routing: Arc<RoutingState>,
    local_cookie: Cookie,
}

impl ManagerDriver {
    /// Run the dispatch loop until shutdown.
    pub async fn run(mut self) {
        debug!(cookie = self.local_cookie, "service manager dispatcher running");
        while self.process_next().await {}
        debug!("service manager dispatcher stopped");
    }

    /// Wait for one command or router event and process it to completion.
    ///
    /// Returns `false` once the manager shut down.
    pub async fn process_next(&mut self) -> bool {
        enum Item {
            Command(Command),
            Router(RouterEvent),
            Closed,
        }

        let item = {
            let recv_command = self.commands.recv().fuse();
            let recv_event = self.router_events.recv().fuse();
            futures::pin_mut!(recv_command, recv_event);

            futures::select! {
                command = recv_command => match command {
                    Ok(command) => Item::Command(command),
                    Err(_) => Item::Closed,
                },
                event = recv_event => match event {
                    Ok(event) => Item::Router(event),
                    Err(_) => Item::Closed,
                },
            }
        };

        match item {
            Item::Command(command) => self.process_command(command).await,
            Item::Router(event) => self.process_router_event(event).await,
            Item::Closed => false,
        }
    }

    /// Process everything already queued without waiting for more.
    ///
    /// Returns `false` once the manager shut down.
    pub async fn process_pending(&mut self) -> bool {
        loop {
            if let Ok(command) = self.commands.try_recv() {
                if !self.process_command(command).await {
                    return false;
                }
                continue;
            }
            if let Ok(event) = self.router_events.try_recv() {
                if !self.process_router_event(event).await {
                    return false;
                }
                continue;
            }
            return true;
        }
    }

    async fn process_command(&mut self, command: Command) -> bool {
        debug!(command = command.name(), "processing command");
        match command {
            Command::RegisterStub(stub) => self.register_server(stub).await,
            Command::UnregisterStub(stub) => self.unregister_server(stub).await,
            Command::RegisterProxy(proxy) => self.register_client(proxy).await,
            Command::UnregisterProxy(proxy) => self.unregister_client(proxy).await,
            Command::ConfigureConnection(config) => {
                self.configure_connection(config.as_deref()).await;
            }
            Command::StartConnection(config) => self.start_connection(config.as_deref()).await,
            Command::StartNetConnection(host, port) => {
                self.start_net_connection(&host, port).await;
            }
            Command::StopConnection => self.link.stop().await,
            Command::SetEnableService(enable) => self.set_enable_service(enable).await,
            Command::RegisterConnection(channel) => self.register_connection(channel).await,
            Command::UnregisterConnection(channel) => self.drop_connection(channel, false).await,
            Command::LostConnection(channel) => self.drop_connection(channel, true).await,
            Command::StopRoutingClient => self.stop_routing_client().await,
            Command::ShutdownService => {
                self.shutdown_service().await;
                self.sync_routing_state();
                return false;
            }
        }
        self.sync_routing_state();
        true
    }

    async fn process_router_event(&mut self, event: RouterEvent) -> bool {
        match event {
            RouterEvent::Started(channel) => self.register_connection(channel).await,
            RouterEvent::Stopped(channel) => self.drop_connection(channel, false).await,
            RouterEvent::Lost(channel) => self.drop_connection(channel, true).await,
            RouterEvent::RemoteStubRegistered(stub) => self.register_server(stub).await,
            RouterEvent::RemoteStubUnregistered(stub) => self.unregister_server(stub).await,
            RouterEvent::RemoteProxyRegistered(proxy) => self.register_client(proxy).await,
            RouterEvent::RemoteProxyUnregistered(proxy) => self.unregister_client(proxy).await,
        }
        self.sync_routing_state();
        true
    }

    async fn register_server(&mut self, stub: StubAddress) {
        let outcome = self.directory.lock().unwrap().register_server(stub.clone());
        match outcome {
            Ok((server, connected)) => {
                debug!(
                    server = %server.address(),
                    status = %server.status(),
                    waiting = connected.len(),
                    "server registered"
                );
                if stub.is_public() && stub.is_local_to(self.local_cookie) {
                    self.link.advertise_stub(&stub).await;
                }
                for client in &connected {
                    self.notify_connected(client, &stub);
                }
            }
            Err(err) => warn!(%err, "server registration rejected"),
        }
    }

    async fn unregister_server(&mut self, stub: StubAddress) {
        if stub.is_public() && stub.is_local_to(self.local_cookie) {
            self.link.withdraw_stub(&stub, stub.cookie).await;
        }
        match self.directory.lock().unwrap().unregister_server(&stub) {
            Some((server, affected)) => {
                debug!(
                    server = %server.address(),
                    affected = affected.len(),
                    "server unregistered"
                );
                for client in &affected {
                    self.notify_disconnected(client, &stub);
                }
            }
            None => debug!(stub = %stub, "no matching server entry, nothing to withdraw"),
        }
    }

    async fn register_client(&mut self, proxy: ProxyAddress) {
        if proxy.is_public() && proxy.is_local_to(self.local_cookie) {
            self.link.advertise_proxy(&proxy).await;
        }
        let outcome = self.directory.lock().unwrap().register_client(proxy);
        match outcome {
            Ok((server, client, connected_now)) => {
                debug!(
                    client = %client.address(),
                    server = %server.address(),
                    status = %client.status(),
                    "client registered"
                );
                if connected_now {
                    self.notify_connected(&client, server.address());
                }
            }
            Err(err) => warn!(%err, "client registration rejected"),
        }
    }

    async fn unregister_client(&mut self, proxy: ProxyAddress) {
        if proxy.is_public() && proxy.is_local_to(self.local_cookie) {
            self.link.withdraw_proxy(&proxy, proxy.cookie).await;
        }
        match self.directory.lock().unwrap().unregister_client(&proxy) {
            Some((server, client)) => {
                debug!(
                    client = %client.address(),
                    status = %client.status(),
                    "client unregistered"
                );
                // The record is gone; the stub still learns its client left.
                self.notify_disconnected(&client, server.address());
            }
            None => debug!(proxy = %proxy, "no matching client entry, nothing to remove"),
        }
    }

    async fn configure_connection(&mut self, config: Option<&Path>) -> bool {
        self.link.set_enabled(true);
        let configured = match config {
            Some(path) => self.link.configure(Some(path)),
            None => self.link.is_configured() || self.link.configure(None),
        };
        if !configured {
            warn!("router configuration failed, remote servicing stays down");
        }
        configured
    }

    async fn start_connection(&mut self, config: Option<&Path>) {
        if self.configure_connection(config).await
            && !self.link.start(self.router_feed.clone()).await
        {
            warn!("router link refused to start, remote servicing stays down");
        }
    }

    async fn start_net_connection(&mut self, host: &str, port: u16) {
        self.link.set_enabled(true);
        self.link.set_address(host, port);
        if self.link.is_configured() && !self.link.start(self.router_feed.clone()).await {
            warn!(host, port, "router link refused to start, remote servicing stays down");
        }
    }

    async fn set_enable_service(&mut self, enable: bool) {
        self.link.set_enabled(enable);
        if !enable && self.link.is_started() {
            self.link.stop().await;
        }
    }

    async fn register_connection(&mut self, channel: Channel) {
        info!(%channel, "router channel is up, publishing local public endpoints");
        let adverts: Vec<Advert> = {
            let directory = self.directory.lock().unwrap();
            let mut adverts = Vec::new();
            for record in directory.records() {
                let server = record.server().address();
                if server.is_public() && server.is_local_to(self.local_cookie) && server.is_valid()
                {
                    adverts.push(Advert::Stub(server.clone()));
                }
                for client in record.clients() {
                    let proxy = client.address();
                    if proxy.is_public() && proxy.is_local_to(self.local_cookie) && proxy.is_valid()
                    {
                        adverts.push(Advert::Proxy(proxy.clone()));
                    }
                }
            }
            adverts
        };

        for advert in adverts {
            match advert {
                Advert::Stub(stub) => self.link.advertise_stub(&stub).await,
                Advert::Proxy(proxy) => self.link.advertise_proxy(&proxy).await,
            }
        }
    }

    async fn drop_connection(&mut self, channel: Channel, lost: bool) {
        if lost {
            warn!(%channel, "router connection lost, withdrawing remote endpoints");
        } else {
            info!(%channel, "router channel closed, withdrawing remote endpoints");
        }

        let (stubs, proxies) = {
            let directory = self.directory.lock().unwrap();
            let mut stubs = Vec::new();
            let mut proxies = Vec::new();
            for record in directory.records() {
                let server = record.server().address();
                if server.is_public() && server.is_remote_to(self.local_cookie) {
                    stubs.push(server.clone());
                }
                for client in record.clients() {
                    let proxy = client.address();
                    if proxy.is_public() && proxy.is_remote_to(self.local_cookie) {
                        proxies.push(proxy.clone());
                    }
                }
            }
            (stubs, proxies)
        };

        // The common unregistration paths emit the disconnect notifications
        // to the local peers that were matched with the remote endpoints.
        for stub in stubs {
            self.unregister_server(stub).await;
        }
        for proxy in proxies {
            self.unregister_client(proxy).await;
        }
    }

    async fn stop_routing_client(&mut self) {
        info!("stopping routing client, disconnecting every registered endpoint");
        let snapshot: Vec<(StubAddress, Vec<ClientInfo>)> = {
            let directory = self.directory.lock().unwrap();
            directory
                .records()
                .map(|record| (record.server().address().clone(), record.clients().to_vec()))
                .collect()
        };

        for (stub, clients) in &snapshot {
            for client in clients {
                self.notify_disconnected(client, stub);
            }
        }

        self.directory.lock().unwrap().clear();
        self.link.stop().await;
    }

    async fn shutdown_service(&mut self) {
        info!("service manager is shutting down");
        self.directory.lock().unwrap().clear();
        self.link.stop().await;
    }

    /// Notify both sides of a pair that just became connected.
    fn notify_connected(&self, client: &ClientInfo, stub: &StubAddress) {
        if !client.is_connected() {
            debug!(client = %client.address(), "client has no connection yet, nothing to notify");
            return;
        }

        let proxy = client.address();
        if stub.is_local_to(self.local_cookie) && stub.source != SOURCE_UNKNOWN {
            self.hub.post(
                &stub.thread_name,
                ConnectEvent::for_stub(proxy.clone(), stub.clone(), ConnectionStatus::Connected),
            );
        }
        if proxy.is_local_to(self.local_cookie) && proxy.source != SOURCE_UNKNOWN {
            self.hub.post(
                &proxy.thread_name,
                ConnectEvent::for_proxy(proxy.clone(), stub.clone(), ConnectionStatus::Connected),
            );
        }
    }

    /// Notify both sides of a pair whose connection just closed.
    ///
    /// `client` carries its status from immediately before the withdrawal; a
    /// pair that never reached connected yields no event.
    fn notify_disconnected(&self, client: &ClientInfo, stub: &StubAddress) {
        if !client.is_connected() {
            return;
        }

        let proxy = client.address();
        if stub.is_local_to(self.local_cookie) && stub.source != SOURCE_UNKNOWN {
            self.hub.post(
                &stub.thread_name,
                ConnectEvent::for_stub(proxy.clone(), stub.clone(), ConnectionStatus::Disconnected),
            );
        }
        if proxy.is_local_to(self.local_cookie) && proxy.source != SOURCE_UNKNOWN {
            self.hub.post(
                &proxy.thread_name,
                ConnectEvent::for_proxy(
                    proxy.clone(),
                    stub.clone(),
                    ConnectionStatus::Disconnected,
                ),
            );
        }
    }

    fn sync_routing_state(&self) {
        self.routing
            .configured
            .store(self.link.is_configured(), Ordering::SeqCst);
        self.routing
            .enabled
            .store(self.link.is_enabled(), Ordering::SeqCst);
        self.routing
            .started
            .store(self.link.is_started(), Ordering::SeqCst);
    }
}
