//! Canonical identity of service endpoints
//!
//! An endpoint that lives in this process and an endpoint that lives behind a
//! socket carry the same logical identity. Runtime-assigned routing metadata
//! (the `source` of a stub or proxy, the `channel` of a proxy) is deliberately
//! excluded from equality and hashing so that an address still compares equal
//! after round-tripping through the router.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Opaque endpoint identifier assigned by the local runtime.
pub type Source = u64;

/// Opaque identifier of a hosting process.
pub type Cookie = u64;

/// Source value of an endpoint that has not been assigned yet.
pub const SOURCE_UNKNOWN: Source = 0;

/// Cookie of a process that has not been identified.
pub const COOKIE_UNKNOWN: Cookie = 0;

/// Default cookie of the hosting process itself.
pub const COOKIE_LOCAL: Cookie = 1;

/// Wildcard cookie accepted by snapshot filters.
pub const COOKIE_ANY: Cookie = u64::MAX;

/// Visibility of a service slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    /// Visible inside the hosting process only.
    Local,
    /// Advertised to the router and reachable from other processes.
    Public,
}

/// Identity of a service slot: interface name, visibility and role name.
///
/// Equality and hashing cover all three fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceAddress {
    /// Name of the service interface contract.
    pub service_name: String,
    /// Visibility of the slot.
    pub kind: ServiceKind,
    /// Per-instance role name distinguishing implementations of the same
    /// interface.
    pub role_name: String,
}

impl ServiceAddress {
    /// Create a service slot identity.
    pub fn new(
        service_name: impl Into<String>,
        kind: ServiceKind,
        role_name: impl Into<String>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            kind,
            role_name: role_name.into(),
        }
    }

    /// True when both the interface name and the role name are set.
    pub fn is_complete(&self) -> bool {
        !self.service_name.is_empty() && !self.role_name.is_empty()
    }

    /// True when the slot participates in remote routing.
    pub fn is_public(&self) -> bool {
        self.kind == ServiceKind::Public
    }
}

impl fmt::Display for ServiceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service_name, self.role_name)
    }
}

/// Routing handle used when dispatching events to an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// Source endpoint of the route.
    pub source: Source,
    /// Cookie of the process owning the route.
    pub cookie: Cookie,
    /// Target endpoint of the route.
    pub target: Source,
}

impl Channel {
    /// A channel with no routing information.
    pub const NONE: Channel = Channel {
        source: SOURCE_UNKNOWN,
        cookie: COOKIE_UNKNOWN,
        target: SOURCE_UNKNOWN,
    };

    /// Create a routing handle.
    pub fn new(source: Source, cookie: Cookie, target: Source) -> Self {
        Self {
            source,
            cookie,
            target,
        }
    }

    /// True when the channel routes from a known source.
    pub fn is_valid(&self) -> bool {
        self.source != SOURCE_UNKNOWN
    }
}

impl Default for Channel {
    fn default() -> Self {
        Channel::NONE
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.source, self.cookie, self.target)
    }
}

/// Address of the server side of a service: the stub.
///
/// Equality and hashing ignore `source`, which is assigned anew by the local
/// runtime on every registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StubAddress {
    /// Identity of the served slot.
    pub service: ServiceAddress,
    /// Name of the dispatcher thread hosting the stub.
    pub thread_name: String,
    /// Cookie of the hosting process.
    pub cookie: Cookie,
    /// Runtime-assigned endpoint identifier.
    pub source: Source,
}

impl StubAddress {
    /// Create a stub address.
    pub fn new(
        service: ServiceAddress,
        thread_name: impl Into<String>,
        cookie: Cookie,
        source: Source,
    ) -> Self {
        Self {
            service,
            thread_name: thread_name.into(),
            cookie,
            source,
        }
    }

    /// Placeholder for a slot that has no server yet.
    pub fn vacant(service: ServiceAddress) -> Self {
        Self {
            service,
            thread_name: String::new(),
            cookie: COOKIE_UNKNOWN,
            source: SOURCE_UNKNOWN,
        }
    }

    /// A stub is usable when its names are set and the runtime assigned it a
    /// source.
    pub fn is_valid(&self) -> bool {
        self.service.is_complete() && !self.thread_name.is_empty() && self.source != SOURCE_UNKNOWN
    }

    /// True when the stub lives in the process identified by `cookie`.
    pub fn is_local_to(&self, cookie: Cookie) -> bool {
        self.cookie == cookie
    }

    /// True when the stub is valid and lives in another process.
    pub fn is_remote_to(&self, cookie: Cookie) -> bool {
        self.is_valid() && self.cookie != cookie
    }

    /// True when the served slot participates in remote routing.
    pub fn is_public(&self) -> bool {
        self.service.is_public()
    }

    /// True when this names the exact same endpoint, source included.
    pub fn same_endpoint(&self, other: &StubAddress) -> bool {
        self == other && self.source == other.source
    }
}

impl PartialEq for StubAddress {
    fn eq(&self, other: &Self) -> bool {
        self.service == other.service
            && self.thread_name == other.thread_name
            && self.cookie == other.cookie
    }
}

impl Eq for StubAddress {}

impl Hash for StubAddress {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.service.hash(state);
        self.thread_name.hash(state);
        self.cookie.hash(state);
    }
}

impl fmt::Display for StubAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.service.service_name, self.service.role_name, self.thread_name
        )?;
        if self.cookie != COOKIE_UNKNOWN {
            write!(f, "/{}", self.cookie)?;
        }
        Ok(())
    }
}

/// Address of the client side of a service: the proxy.
///
/// Equality and hashing ignore `source` and `channel`; both are routing
/// metadata assigned by the runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyAddress {
    /// Identity of the consumed slot.
    pub service: ServiceAddress,
    /// Name of the dispatcher thread hosting the proxy.
    pub thread_name: String,
    /// Cookie of the hosting process.
    pub cookie: Cookie,
    /// Runtime-assigned endpoint identifier.
    pub source: Source,
    /// Routing handle used when dispatching events back to this proxy.
    pub channel: Channel,
}

impl ProxyAddress {
    /// Create a proxy address with no routing channel yet.
    pub fn new(
        service: ServiceAddress,
        thread_name: impl Into<String>,
        cookie: Cookie,
        source: Source,
    ) -> Self {
        Self {
            service,
            thread_name: thread_name.into(),
            cookie,
            source,
            channel: Channel::NONE,
        }
    }

    /// Attach the routing channel assigned to this proxy.
    pub fn with_channel(mut self, channel: Channel) -> Self {
        self.channel = channel;
        self
    }

    /// A proxy is usable when its names are set and the runtime assigned it a
    /// source.
    pub fn is_valid(&self) -> bool {
        self.service.is_complete() && !self.thread_name.is_empty() && self.source != SOURCE_UNKNOWN
    }

    /// True when the proxy lives in the process identified by `cookie`.
    pub fn is_local_to(&self, cookie: Cookie) -> bool {
        self.cookie == cookie
    }

    /// True when the proxy is valid and lives in another process.
    pub fn is_remote_to(&self, cookie: Cookie) -> bool {
        self.is_valid() && self.cookie != cookie
    }

    /// True when the consumed slot participates in remote routing.
    pub fn is_public(&self) -> bool {
        self.service.is_public()
    }
}

impl PartialEq for ProxyAddress {
    fn eq(&self, other: &Self) -> bool {
        self.service == other.service
            && self.thread_name == other.thread_name
            && self.cookie == other.cookie
    }
}

impl Eq for ProxyAddress {}

impl Hash for ProxyAddress {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.service.hash(state);
        self.thread_name.hash(state);
        self.cookie.hash(state);
    }
}

impl fmt::Display for ProxyAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.service.service_name, self.service.role_name, self.thread_name
        )?;
        if self.cookie != COOKIE_UNKNOWN {
            write!(f, "/{}", self.cookie)?;
        }
        Ok(())
    }
}
