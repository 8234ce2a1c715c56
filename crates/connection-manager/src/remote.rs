//! The seam between the manager and a remote router transport
//!
//! The manager mirrors local public endpoints over whatever implements
//! [`RemoteChannel`] and consumes [`RouterEvent`]s the implementation feeds
//! back. Transport failures never surface as errors on this interface; an
//! implementation reports them as [`RouterEvent::Lost`] and the manager turns
//! that into local disconnect notifications.

use async_trait::async_trait;
use service_directory::{Channel, Cookie, ProxyAddress, StubAddress};
use std::path::Path;
use tracing::debug;

/// Lifecycle and registration traffic reported by a router link.
#[derive(Debug, Clone)]
pub enum RouterEvent {
    /// The router channel is up.
    Started(Channel),
    /// The router channel closed gracefully.
    Stopped(Channel),
    /// The router channel was lost abruptly.
    Lost(Channel),
    /// A stub in another process came up.
    RemoteStubRegistered(StubAddress),
    /// A stub in another process went down.
    RemoteStubUnregistered(StubAddress),
    /// A proxy in another process came up.
    RemoteProxyRegistered(ProxyAddress),
    /// A proxy in another process went down.
    RemoteProxyUnregistered(ProxyAddress),
}

/// Interface of the remote router adapter consumed by the manager.
///
/// All registration methods are fire-and-forget: an inactive link ignores
/// them, and the manager re-publishes everything when the link reports
/// [`RouterEvent::Started`].
#[async_trait]
pub trait RemoteChannel: Send {
    /// Load the routing configuration, from `path` or from defaults.
    fn configure(&mut self, path: Option<&Path>) -> bool;

    /// True once a configuration is loaded.
    fn is_configured(&self) -> bool;

    /// Allow or forbid remote servicing.
    fn set_enabled(&mut self, enabled: bool);

    /// True while remote servicing is allowed.
    fn is_enabled(&self) -> bool;

    /// Override the router endpoint; this counts as configuration.
    fn set_address(&mut self, host: &str, port: u16);

    /// Connect to the router and report lifecycle through `events`.
    async fn start(&mut self, events: async_channel::Sender<RouterEvent>) -> bool;

    /// Disconnect from the router.
    async fn stop(&mut self);

    /// True while the router channel is up.
    fn is_started(&self) -> bool;

    /// Advertise a local public stub.
    async fn advertise_stub(&mut self, stub: &StubAddress);

    /// Withdraw a local public stub.
    async fn withdraw_stub(&mut self, stub: &StubAddress, cookie: Cookie);

    /// Advertise a local public proxy.
    async fn advertise_proxy(&mut self, proxy: &ProxyAddress);

    /// Withdraw a local public proxy.
    async fn withdraw_proxy(&mut self, proxy: &ProxyAddress, cookie: Cookie);
}

/// Router adapter of a node that never leaves its process.
#[derive(Debug, Default)]
pub struct NullLink {
    configured: bool,
    enabled: bool,
}

impl NullLink {
    /// Create a link that ignores all routing requests.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RemoteChannel for NullLink {
    fn configure(&mut self, _path: Option<&Path>) -> bool {
        self.configured = true;
        true
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_address(&mut self, _host: &str, _port: u16) {
        self.configured = true;
    }

    async fn start(&mut self, _events: async_channel::Sender<RouterEvent>) -> bool {
        debug!("remote servicing is not available on this node");
        false
    }

    async fn stop(&mut self) {}

    fn is_started(&self) -> bool {
        false
    }

    async fn advertise_stub(&mut self, _stub: &StubAddress) {}

    async fn withdraw_stub(&mut self, _stub: &StubAddress, _cookie: Cookie) {}

    async fn advertise_proxy(&mut self, _proxy: &ProxyAddress) {}

    async fn withdraw_proxy(&mut self, _proxy: &ProxyAddress, _cookie: Cookie) {}
}

#[cfg(any(test, feature = "test-utils"))]
pub mod testing {
    //! Recording router link for driving the manager in tests.

    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    /// One registration call observed by the recording link.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum LinkCall {
        /// `advertise_stub` was called while the link was up.
        AdvertiseStub(StubAddress),
        /// `withdraw_stub` was called while the link was up.
        WithdrawStub(StubAddress, Cookie),
        /// `advertise_proxy` was called while the link was up.
        AdvertiseProxy(ProxyAddress),
        /// `withdraw_proxy` was called while the link was up.
        WithdrawProxy(ProxyAddress, Cookie),
    }

    #[derive(Debug, Default)]
    struct Shared {
        calls: Mutex<Vec<LinkCall>>,
        feed: Mutex<Option<async_channel::Sender<RouterEvent>>>,
        configured: AtomicBool,
        enabled: AtomicBool,
        started: AtomicBool,
    }

    /// Channel to the router of the tests: records mirror traffic, lets the
    /// test inject router events.
    #[derive(Debug)]
    pub struct RecordingLink {
        shared: Arc<Shared>,
    }

    /// Test-side handle onto a [`RecordingLink`].
    #[derive(Debug, Clone)]
    pub struct LinkProbe {
        shared: Arc<Shared>,
    }

    impl RecordingLink {
        /// Create a link plus the probe observing it.
        pub fn new() -> (Self, LinkProbe) {
            let shared = Arc::new(Shared::default());
            (
                Self {
                    shared: shared.clone(),
                },
                LinkProbe { shared },
            )
        }

        fn record(&self, call: LinkCall) {
            if self.shared.started.load(Ordering::SeqCst) {
                self.shared.calls.lock().unwrap().push(call);
            }
        }
    }

    impl LinkProbe {
        /// Calls recorded since the last [`LinkProbe::clear`].
        pub fn calls(&self) -> Vec<LinkCall> {
            self.shared.calls.lock().unwrap().clone()
        }

        /// Forget recorded calls.
        pub fn clear(&self) {
            self.shared.calls.lock().unwrap().clear();
        }

        /// Inject a router event as if the transport produced it.
        pub async fn emit(&self, event: RouterEvent) {
            let feed = self.shared.feed.lock().unwrap().clone();
            let feed = feed.expect("link was never started");
            feed.send(event)
                .await
                .expect("manager dropped the router event queue");
        }
    }

    #[async_trait]
    impl RemoteChannel for RecordingLink {
        fn configure(&mut self, _path: Option<&Path>) -> bool {
            self.shared.configured.store(true, Ordering::SeqCst);
            true
        }

        fn is_configured(&self) -> bool {
            self.shared.configured.load(Ordering::SeqCst)
        }

        fn set_enabled(&mut self, enabled: bool) {
            self.shared.enabled.store(enabled, Ordering::SeqCst);
        }

        fn is_enabled(&self) -> bool {
            self.shared.enabled.load(Ordering::SeqCst)
        }

        fn set_address(&mut self, _host: &str, _port: u16) {
            self.shared.configured.store(true, Ordering::SeqCst);
        }

        async fn start(&mut self, events: async_channel::Sender<RouterEvent>) -> bool {
            *self.shared.feed.lock().unwrap() = Some(events);
            self.shared.started.store(true, Ordering::SeqCst);
            true
        }

        async fn stop(&mut self) {
            self.shared.started.store(false, Ordering::SeqCst);
        }

        fn is_started(&self) -> bool {
            self.shared.started.load(Ordering::SeqCst)
        }

        async fn advertise_stub(&mut self, stub: &StubAddress) {
            self.record(LinkCall::AdvertiseStub(stub.clone()));
        }

        async fn withdraw_stub(&mut self, stub: &StubAddress, cookie: Cookie) {
            self.record(LinkCall::WithdrawStub(stub.clone(), cookie));
        }

        async fn advertise_proxy(&mut self, proxy: &ProxyAddress) {
            self.record(LinkCall::AdvertiseProxy(proxy.clone()));
        }

        async fn withdraw_proxy(&mut self, proxy: &ProxyAddress, cookie: Cookie) {
            self.record(LinkCall::WithdrawProxy(proxy.clone(), cookie));
        }
    }
}
