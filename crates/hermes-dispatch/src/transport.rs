//! Message transports.
//!
//! A [`Transport`] carries a request message to the runtime bound at an
//! address and hands back its response. [`LocalTransport`] keeps everything
//! in process: addresses of the form `local://host/path` map to
//! [`ServerRuntime`]s registered with [`LocalTransport::bind`].

use std::fmt;
use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use futures_util::future::BoxFuture;
use hermes_core::{Fault, Message, TransportError};
use tracing::debug;

use crate::server::ServerRuntime;

/// Scheme accepted by [`LocalTransport`].
pub const LOCAL_SCHEME: &str = "local://";

/// Carries messages between a dispatcher and a server runtime.
pub trait Transport: Send + Sync + 'static {
    /// Checks that `address` can be reached.
    fn resolve(&self, address: &str) -> Result<(), TransportError>;

    /// Sends `message` to `address`.
    ///
    /// Returns the response message, or `None` for one-way messages. Fault
    /// responses are returned as messages, not as errors.
    fn send<'a>(
        &'a self,
        address: &'a str,
        message: Message,
        one_way: bool,
    ) -> BoxFuture<'a, Result<Option<Message>, Fault>>;
}

/// A parsed `local://host/path` address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalAddress {
    host: String,
    path: String,
}

impl LocalAddress {
    /// Parses an address.
    pub fn parse(address: &str) -> Result<Self, TransportError> {
        let rest = address
            .strip_prefix(LOCAL_SCHEME)
            .ok_or_else(|| TransportError::invalid_address(address))?;
        let (host, path) = match rest.find('/') {
            Some(index) => (&rest[..index], &rest[index..]),
            None => (rest, "/"),
        };
        if host.is_empty() {
            return Err(TransportError::invalid_address(address));
        }
        Ok(Self {
            host: host.to_ascii_lowercase(),
            path: path.to_string(),
        })
    }

    /// Host component.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Path component, always starting with `/`.
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for LocalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{LOCAL_SCHEME}{}{}", self.host, self.path)
    }
}

/// In-process transport.
///
/// Cloning shares the bindings.
#[derive(Clone, Default)]
pub struct LocalTransport {
    bindings: Arc<DashMap<LocalAddress, Arc<ServerRuntime>>>,
    hosts: Arc<DashMap<String, usize>>,
    refusing: Arc<DashSet<String>>,
}

impl LocalTransport {
    /// Creates a transport with no bindings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a runtime at `address`, replacing any previous binding.
    pub fn bind(&self, address: &str, runtime: ServerRuntime) -> Result<(), TransportError> {
        self.bind_shared(address, Arc::new(runtime))
    }

    /// Binds a shared runtime at `address`.
    pub fn bind_shared(&self, address: &str, runtime: Arc<ServerRuntime>) -> Result<(), TransportError> {
        let address = LocalAddress::parse(address)?;
        debug!(address = %address, "binding server runtime");
        let host = address.host.clone();
        if self.bindings.insert(address, runtime).is_none() {
            *self.hosts.entry(host).or_insert(0) += 1;
        }
        Ok(())
    }

    /// Removes the binding at `address`.
    pub fn unbind(&self, address: &str) -> Option<Arc<ServerRuntime>> {
        let address = LocalAddress::parse(address).ok()?;
        let (address, runtime) = self.bindings.remove(&address)?;
        if let Some(mut count) = self.hosts.get_mut(&address.host) {
            *count = count.saturating_sub(1);
        }
        self.hosts.remove_if(&address.host, |_, count| *count == 0);
        Some(runtime)
    }

    /// Makes every connection to `host` fail with a refused connection.
    pub fn refuse(&self, host: &str) {
        self.refusing.insert(host.to_ascii_lowercase());
    }

    /// Accepts connections to `host` again.
    pub fn accept(&self, host: &str) {
        self.refusing.remove(&host.to_ascii_lowercase());
    }

    fn route(&self, address: &str) -> Result<Arc<ServerRuntime>, TransportError> {
        let parsed = LocalAddress::parse(address)?;
        if self.refusing.contains(&parsed.host) {
            return Err(TransportError::connection_refused(address));
        }
        if !self.hosts.contains_key(&parsed.host) {
            return Err(TransportError::unknown_host(parsed.host));
        }
        self.bindings
            .get(&parsed)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| TransportError::not_found(address))
    }
}

impl Transport for LocalTransport {
    fn resolve(&self, address: &str) -> Result<(), TransportError> {
        let parsed = LocalAddress::parse(address)?;
        if self.hosts.contains_key(&parsed.host) || self.refusing.contains(&parsed.host) {
            Ok(())
        } else {
            Err(TransportError::unknown_host(parsed.host))
        }
    }

    fn send<'a>(
        &'a self,
        address: &'a str,
        message: Message,
        one_way: bool,
    ) -> BoxFuture<'a, Result<Option<Message>, Fault>> {
        Box::pin(async move {
            let runtime = self.route(address).map_err(Fault::connection)?;
            runtime.handle(message, one_way).await
        })
    }
}

impl fmt::Debug for LocalTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let addresses: Vec<String> = self.bindings.iter().map(|e| e.key().to_string()).collect();
        f.debug_struct("LocalTransport")
            .field("bindings", &addresses)
            .finish()
    }
}
