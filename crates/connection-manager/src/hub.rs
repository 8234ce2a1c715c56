//! Connection notification fan-out
//!
//! Stubs and proxies live on named dispatcher threads. The hub keeps one
//! queue per attached dispatcher and posts connect/disconnect events to the
//! queue owning the notified endpoint. Once an event is queued the receiving
//! dispatcher owns it; events posted to a detached dispatcher are dropped by
//! the posting path.

use service_directory::{ConnectionStatus, ProxyAddress, StubAddress};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

/// Which side of a matched pair an event notifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTarget {
    /// Delivered to the dispatcher hosting the stub.
    Stub,
    /// Delivered to the dispatcher hosting the proxy.
    Proxy,
}

/// Notification that a proxy-stub pair changed connection state.
#[derive(Debug, Clone)]
pub struct ConnectEvent {
    /// Side of the pair this event notifies.
    pub target: EventTarget,
    /// Client side of the pair.
    pub proxy: ProxyAddress,
    /// Server side of the pair.
    pub stub: StubAddress,
    /// New state of the pair.
    pub status: ConnectionStatus,
}

impl ConnectEvent {
    /// Event for the dispatcher hosting the stub.
    pub fn for_stub(proxy: ProxyAddress, stub: StubAddress, status: ConnectionStatus) -> Self {
        Self {
            target: EventTarget::Stub,
            proxy,
            stub,
            status,
        }
    }

    /// Event for the dispatcher hosting the proxy.
    pub fn for_proxy(proxy: ProxyAddress, stub: StubAddress, status: ConnectionStatus) -> Self {
        Self {
            target: EventTarget::Proxy,
            proxy,
            stub,
            status,
        }
    }
}

/// Registry of named dispatcher queues.
#[derive(Debug, Default)]
pub struct DispatcherHub {
    dispatchers: Mutex<HashMap<String, async_channel::Sender<ConnectEvent>>>,
}

impl DispatcherHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a dispatcher under its thread name.
    ///
    /// Re-attaching a name replaces the previous queue; events already posted
    /// to the replaced queue are lost with it.
    pub fn attach(&self, thread_name: impl Into<String>) -> async_channel::Receiver<ConnectEvent> {
        let (tx, rx) = async_channel::unbounded();
        self.dispatchers
            .lock()
            .unwrap()
            .insert(thread_name.into(), tx);
        rx
    }

    /// Detach a dispatcher; later posts to this name are dropped.
    pub fn detach(&self, thread_name: &str) {
        self.dispatchers.lock().unwrap().remove(thread_name);
    }

    /// Post an event to the named dispatcher. Returns whether it was queued.
    pub fn post(&self, thread_name: &str, event: ConnectEvent) -> bool {
        let dispatchers = self.dispatchers.lock().unwrap();
        match dispatchers.get(thread_name) {
            Some(queue) => queue.try_send(event).is_ok(),
            None => {
                debug!(
                    thread = thread_name,
                    stub = %event.stub,
                    "no dispatcher attached, dropping connection event"
                );
                false
            }
        }
    }
}
