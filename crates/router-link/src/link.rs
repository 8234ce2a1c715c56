//! TCP implementation of the manager's remote channel
//!
//! Starting the link only launches a dedicated `router-link` thread; that
//! thread connects, performs the hello/welcome handshake and then pumps
//! frames: advertisements flow out of an internal queue, inbound
//! registrations surface as [`RouterEvent`]s. The manager's dispatcher never
//! waits on the transport. Failures are never fatal; an attempt that cannot
//! connect, or a pump that dies, reports [`RouterEvent::Lost`] and the
//! manager decides what that means.

use crate::config::{self, RouterConfig};
use crate::protocol::{self, RouterMessage};
use async_net::TcpStream;
use async_trait::async_trait;
use connection_manager::remote::{RemoteChannel, RouterEvent};
use futures::io::BufReader;
use futures::{AsyncBufReadExt, FutureExt, StreamExt};
use service_directory::{Channel, Cookie, ProxyAddress, StubAddress};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, info, warn};

/// State of one connection attempt, shared with its worker thread.
#[derive(Debug, Default)]
struct LinkAttempt {
    /// Handshake completed, the pump is running.
    started: AtomicBool,
    /// The worker thread exited.
    finished: AtomicBool,
    /// `stop` was requested; a worker still connecting exits silently.
    cancelled: AtomicBool,
}

/// Remote channel of a node that mirrors registrations over TCP.
pub struct TcpRouterLink {
    local_cookie: Cookie,
    config: Option<RouterConfig>,
    enabled: bool,
    attempt: Option<Arc<LinkAttempt>>,
    outbound: Option<async_channel::Sender<RouterMessage>>,
    pump: Option<thread::JoinHandle<()>>,
}

impl TcpRouterLink {
    /// Create an unconfigured link for the process identified by `cookie`.
    pub fn new(local_cookie: Cookie) -> Self {
        Self {
            local_cookie,
            config: None,
            enabled: false,
            attempt: None,
            outbound: None,
            pump: None,
        }
    }

    async fn send_frame(&self, message: RouterMessage) {
        if !self.is_started() {
            debug!("router link inactive, dropping frame");
            return;
        }
        if let Some(outbound) = &self.outbound {
            // A closed queue means the pump died; the loss event is on its way.
            let _ = outbound.send(message).await;
        }
    }
}

#[async_trait]
impl RemoteChannel for TcpRouterLink {
    fn configure(&mut self, path: Option<&Path>) -> bool {
        let loaded = match path {
            Some(path) => match config::parse_file(path) {
                Ok(loaded) => loaded,
                Err(err) => {
                    error!(%err, path = %path.display(), "cannot load router configuration");
                    return false;
                }
            },
            None => RouterConfig::default(),
        };

        if !loaded.is_remote_enabled() {
            info!("router configuration keeps remote servicing off");
        }
        self.config = Some(loaded);
        true
    }

    fn is_configured(&self) -> bool {
        self.config.is_some()
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_address(&mut self, host: &str, port: u16) {
        let config = self.config.get_or_insert_with(RouterConfig::default);
        config.address = host.to_string();
        config.port = port;
    }

    async fn start(&mut self, events: async_channel::Sender<RouterEvent>) -> bool {
        if let Some(attempt) = &self.attempt {
            // An attempt is still connecting or already up.
            if !attempt.finished.load(Ordering::SeqCst) {
                return true;
            }
        }
        if !self.enabled {
            debug!("remote servicing is disabled, not connecting");
            return false;
        }
        let Some(config) = self.config.clone() else {
            debug!("router link is not configured, not connecting");
            return false;
        };
        if !config.is_remote_enabled() {
            info!("configuration keeps remote servicing off, not connecting");
            return false;
        }

        let endpoint = config.endpoint();
        let cookie = self.local_cookie;
        let attempt = Arc::new(LinkAttempt::default());
        let (outbound_tx, outbound_rx) = async_channel::unbounded();

        let worker = {
            let attempt = attempt.clone();
            thread::Builder::new().name("router-link".into()).spawn(move || {
                futures_lite::future::block_on(connect_and_pump(
                    endpoint, cookie, outbound_rx, events, attempt,
                ))
            })
        };
        match worker {
            Ok(worker) => {
                self.attempt = Some(attempt);
                self.outbound = Some(outbound_tx);
                self.pump = Some(worker);
                true
            }
            Err(err) => {
                error!(%err, "cannot spawn the router link thread");
                false
            }
        }
    }

    async fn stop(&mut self) {
        let Some(attempt) = self.attempt.take() else {
            return;
        };
        attempt.cancelled.store(true, Ordering::SeqCst);
        if let Some(outbound) = self.outbound.take() {
            let _ = outbound.send(RouterMessage::Bye).await;
        }
        if let Some(pump) = self.pump.take() {
            // Join only a pump that is up or already gone; a worker stuck
            // connecting exits on its own once it notices the cancellation.
            if attempt.started.load(Ordering::SeqCst) || attempt.finished.load(Ordering::SeqCst) {
                let _ = pump.join();
            }
        }
    }

    fn is_started(&self) -> bool {
        self.attempt
            .as_ref()
            .is_some_and(|attempt| attempt.started.load(Ordering::SeqCst))
    }

    async fn advertise_stub(&mut self, stub: &StubAddress) {
        self.send_frame(RouterMessage::RegisterStub { stub: stub.clone() })
            .await;
    }

    async fn withdraw_stub(&mut self, stub: &StubAddress, cookie: Cookie) {
        self.send_frame(RouterMessage::UnregisterStub {
            stub: stub.clone(),
            cookie,
        })
        .await;
    }

    async fn advertise_proxy(&mut self, proxy: &ProxyAddress) {
        self.send_frame(RouterMessage::RegisterProxy {
            proxy: proxy.clone(),
        })
        .await;
    }

    async fn withdraw_proxy(&mut self, proxy: &ProxyAddress, cookie: Cookie) {
        self.send_frame(RouterMessage::UnregisterProxy {
            proxy: proxy.clone(),
            cookie,
        })
        .await;
    }
}

/// Body of the `router-link` thread: handshake, then the frame loop.
async fn connect_and_pump(
    endpoint: String,
    cookie: Cookie,
    outbound: async_channel::Receiver<RouterMessage>,
    events: async_channel::Sender<RouterEvent>,
    attempt: Arc<LinkAttempt>,
) {
    match handshake(&endpoint, cookie).await {
        Some((reader, writer, channel)) if !attempt.cancelled.load(Ordering::SeqCst) => {
            attempt.started.store(true, Ordering::SeqCst);
            info!(%channel, %endpoint, "connected to the router");
            let _ = events.send(RouterEvent::Started(channel)).await;
            let farewell = pump(reader, writer, outbound, &events, channel).await;
            // The flag drops before the farewell so that an observer of the
            // event never reads a stale started state.
            attempt.started.store(false, Ordering::SeqCst);
            if let Some(event) = farewell {
                let _ = events.send(event).await;
            }
        }
        Some(_) => debug!("link was stopped while connecting"),
        None => {
            if !attempt.cancelled.load(Ordering::SeqCst) {
                let _ = events.send(RouterEvent::Lost(Channel::NONE)).await;
            }
        }
    }
    attempt.finished.store(true, Ordering::SeqCst);
    debug!("router link worker stopped");
}

/// Connect and exchange the hello/welcome frames.
async fn handshake(
    endpoint: &str,
    cookie: Cookie,
) -> Option<(BufReader<TcpStream>, TcpStream, Channel)> {
    let stream = match TcpStream::connect(endpoint).await {
        Ok(stream) => stream,
        Err(err) => {
            error!(%err, %endpoint, "cannot reach the router");
            return None;
        }
    };

    let mut writer = stream.clone();
    let mut reader = BufReader::new(stream);
    let hello = RouterMessage::Hello { cookie };
    if let Err(err) = protocol::write_message(&mut writer, &hello).await {
        error!(%err, "router handshake failed");
        return None;
    }

    let mut line = String::new();
    match reader.read_line(&mut line).await {
        Ok(0) => {
            error!(%endpoint, "router closed the stream during the handshake");
            return None;
        }
        Ok(_) => {}
        Err(err) => {
            error!(%err, "router handshake failed");
            return None;
        }
    }
    match protocol::decode_line(&line) {
        Ok(RouterMessage::Welcome { channel }) => Some((reader, writer, channel)),
        Ok(frame) => {
            error!(?frame, "unexpected handshake frame from the router");
            None
        }
        Err(err) => {
            error!(%err, "malformed handshake frame from the router");
            None
        }
    }
}

/// Frame loop of a connected link.
///
/// Returns the farewell event closing this connection, or `None` when the
/// link was simply dropped.
async fn pump(
    reader: BufReader<TcpStream>,
    mut writer: TcpStream,
    outbound: async_channel::Receiver<RouterMessage>,
    events: &async_channel::Sender<RouterEvent>,
    channel: Channel,
) -> Option<RouterEvent> {
    let mut lines = reader.lines();
    loop {
        let next_line = lines.next().fuse();
        let next_out = outbound.recv().fuse();
        futures::pin_mut!(next_line, next_out);

        futures::select! {
            line = next_line => match line {
                Some(Ok(line)) => match protocol::decode_line(&line) {
                    Ok(message) => {
                        if !forward_inbound(message, events).await {
                            return Some(RouterEvent::Stopped(channel));
                        }
                    }
                    Err(err) => {
                        warn!(%err, "malformed router frame, dropping the link");
                        return Some(RouterEvent::Lost(channel));
                    }
                },
                Some(Err(err)) => {
                    warn!(%err, "router stream failed");
                    return Some(RouterEvent::Lost(channel));
                }
                None => {
                    warn!("router closed the stream");
                    return Some(RouterEvent::Lost(channel));
                }
            },
            message = next_out => match message {
                Ok(RouterMessage::Bye) => {
                    let _ = protocol::write_message(&mut writer, &RouterMessage::Bye).await;
                    return Some(RouterEvent::Stopped(channel));
                }
                Ok(message) => {
                    if let Err(err) = protocol::write_message(&mut writer, &message).await {
                        warn!(%err, "cannot talk to the router");
                        return Some(RouterEvent::Lost(channel));
                    }
                }
                Err(_) => return None,
            },
        }
    }
}

/// Turn an inbound frame into a router event.
///
/// Returns `false` once the router says goodbye.
async fn forward_inbound(
    message: RouterMessage,
    events: &async_channel::Sender<RouterEvent>,
) -> bool {
    let event = match message {
        RouterMessage::Bye => return false,
        RouterMessage::RegisterStub { stub } => RouterEvent::RemoteStubRegistered(stub),
        RouterMessage::UnregisterStub { stub, .. } => RouterEvent::RemoteStubUnregistered(stub),
        RouterMessage::RegisterProxy { proxy } => RouterEvent::RemoteProxyRegistered(proxy),
        RouterMessage::UnregisterProxy { proxy, .. } => RouterEvent::RemoteProxyUnregistered(proxy),
        RouterMessage::Hello { .. } | RouterMessage::Welcome { .. } => {
            debug!("ignoring stray handshake frame");
            return true;
        }
    };
    let _ = events.send(event).await;
    true
}
