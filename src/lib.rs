//! Crosswire - role-name service wiring
//!
//! Application logic is factored into components exposing service interfaces
//! through stubs and consuming them through proxies. Crosswire auto-wires the
//! two by role name, whether the counterpart lives in the same thread, a
//! sibling thread, or another process reached through a router.
//!
//! The workspace splits along its seams:
//!
//! - [`service_directory`] - endpoint addresses, state records and the
//!   directory all matching decisions come from
//! - [`connection_manager`] - the single-threaded manager actor plus the
//!   notification fan-out to dispatcher threads
//! - [`router_link`] - the TCP adapter mirroring public registrations to an
//!   external router process

pub use connection_manager;
pub use router_link;
pub use service_directory;

/// Re-export of the types most nodes touch.
pub mod prelude {
    pub use connection_manager::{
        ConnectEvent, DispatcherHub, EventTarget, NullLink, RemoteChannel, ServiceManager,
    };
    pub use router_link::{RouterConfig, TcpRouterLink};
    pub use service_directory::{
        Channel, ConnectionStatus, Cookie, ProxyAddress, ServiceAddress, ServiceKind,
        StubAddress, COOKIE_ANY, COOKIE_LOCAL,
    };
}
