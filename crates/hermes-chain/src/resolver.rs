//! Handler resolution.
//!
//! A [`HandlerResolver`] turns port metadata into a fresh, ordered
//! [`HandlerChain`]. Clients usually hand over an explicit list through
//! [`StaticResolver`]; servers resolve per exchange through
//! [`ConfiguredResolver`], which matches declared chains against the port and
//! builds handlers from a [`HandlerRegistry`].

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use hermes_core::{BoxedHandler, Fault, Handler, Protocol, QName};
use regex::Regex;
use tracing::{debug, warn};

use crate::chain::HandlerChain;
use crate::descriptor::HandlerChainDescriptor;

/// Metadata identifying the port an exchange runs on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortInfo {
    /// Qualified service name.
    pub service_name: QName,
    /// Qualified port name.
    pub port_name: QName,
    /// Binding protocol.
    pub binding: Protocol,
}

impl PortInfo {
    /// Creates port metadata.
    pub fn new(service_name: QName, port_name: QName, binding: Protocol) -> Self {
        Self {
            service_name,
            port_name,
            binding,
        }
    }
}

/// Strategy returning the ordered handlers for a port.
pub trait HandlerResolver: Send + Sync + 'static {
    /// Builds the handler chain for `port`.
    fn resolve(&self, port: &PortInfo) -> Result<HandlerChain, Fault>;

    /// SOAP roles played by the handlers of `port`.
    fn roles(&self, port: &PortInfo) -> Vec<String> {
        let _ = port;
        Vec::new()
    }

    /// Whether [`resolve`](Self::resolve) builds fresh, initialised handlers.
    ///
    /// When `true` the caller owns the returned handlers and destroys them
    /// after use. When `false` every call hands back the same shared
    /// instances, which the caller initialises once and destroys once.
    fn owns_instances(&self) -> bool {
        true
    }
}

/// Resolver returning the same chain for every port.
///
/// The handlers are shared by every exchange. They are neither initialised
/// nor destroyed by the resolver.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    chain: HandlerChain,
}

impl StaticResolver {
    /// Creates a resolver over a fixed chain.
    pub fn new(chain: HandlerChain) -> Self {
        Self { chain }
    }
}

impl HandlerResolver for StaticResolver {
    fn resolve(&self, _port: &PortInfo) -> Result<HandlerChain, Fault> {
        Ok(self.chain.clone())
    }

    fn owns_instances(&self) -> bool {
        false
    }
}

/// Resolver backed by a closure.
pub struct FnResolver<F>(F);

impl<F> FnResolver<F>
where
    F: Fn(&PortInfo) -> Result<HandlerChain, Fault> + Send + Sync + 'static,
{
    /// Wraps a closure.
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> HandlerResolver for FnResolver<F>
where
    F: Fn(&PortInfo) -> Result<HandlerChain, Fault> + Send + Sync + 'static,
{
    fn resolve(&self, port: &PortInfo) -> Result<HandlerChain, Fault> {
        (self.0)(port)
    }
}

/// Builds a fresh handler instance.
pub type HandlerFactory = Arc<dyn Fn() -> BoxedHandler + Send + Sync>;

/// Named handler factories.
///
/// Cloning a registry shares its factories.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    factories: Arc<DashMap<String, HandlerFactory>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under `name`, replacing any previous one.
    pub fn register<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> BoxedHandler + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Registers a handler that is cloned for every instance.
    pub fn register_prototype<H>(&self, name: impl Into<String>, prototype: H)
    where
        H: Handler + Clone,
    {
        self.register(name, move || Arc::new(prototype.clone()) as BoxedHandler);
    }

    /// Builds a handler, or `None` if nothing is registered under `name`.
    pub fn create(&self, name: &str) -> Option<BoxedHandler> {
        let factory = self.factories.get(name).map(|f| Arc::clone(f.value()))?;
        Some(factory())
    }

    /// Returns `true` if a factory is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Number of registered factories.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Returns `true` if no factory is registered.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("factories", &self.names())
            .finish()
    }
}

#[derive(Debug, Default)]
struct ResolvedPort {
    factories: Vec<String>,
    roles: Vec<String>,
}

/// Resolver over declared handler chains.
///
/// Every chain applying to the port contributes its handlers, in declaration
/// order. Which factories apply to a port is computed once and cached; the
/// handlers themselves are built and initialised on every call.
#[derive(Debug)]
pub struct ConfiguredResolver {
    chains: Vec<HandlerChainDescriptor>,
    registry: HandlerRegistry,
    cache: DashMap<PortInfo, Arc<ResolvedPort>>,
}

impl ConfiguredResolver {
    /// Creates a resolver.
    pub fn new(chains: Vec<HandlerChainDescriptor>, registry: HandlerRegistry) -> Self {
        Self {
            chains,
            registry,
            cache: DashMap::new(),
        }
    }

    /// The declared chains.
    pub fn chains(&self) -> &[HandlerChainDescriptor] {
        &self.chains
    }

    /// The handler registry.
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Number of ports resolved so far.
    pub fn cached_ports(&self) -> usize {
        self.cache.len()
    }

    fn resolved(&self, port: &PortInfo) -> Arc<ResolvedPort> {
        if let Some(hit) = self.cache.get(port) {
            return Arc::clone(hit.value());
        }

        let mut resolved = ResolvedPort::default();
        for chain in self.chains.iter().filter(|c| chain_applies(c, port)) {
            for handler in &chain.handlers {
                resolved.factories.push(handler.factory_key().to_string());
                resolved.roles.extend(handler.soap_roles.iter().cloned());
            }
        }
        debug!(
            port = %port.port_name,
            handlers = ?resolved.factories,
            roles = ?resolved.roles,
            "resolved handler chain"
        );

        let resolved = Arc::new(resolved);
        self.cache.insert(port.clone(), Arc::clone(&resolved));
        resolved
    }
}

impl HandlerResolver for ConfiguredResolver {
    fn resolve(&self, port: &PortInfo) -> Result<HandlerChain, Fault> {
        let resolved = self.resolved(port);
        // Nothing is initialised until every factory is known.
        if let Some(missing) = resolved.factories.iter().find(|key| !self.registry.contains(key)) {
            return Err(Fault::handler_chain(missing.as_str(), "no handler factory registered"));
        }

        let mut handlers = Vec::with_capacity(resolved.factories.len());
        for key in &resolved.factories {
            let handler = self
                .registry
                .create(key)
                .ok_or_else(|| Fault::handler_chain(key.as_str(), "no handler factory registered"))?;
            handlers.push(handler);
        }
        for handler in &handlers {
            debug!(handler = handler.name(), "post construct");
            handler.init();
        }
        Ok(HandlerChain::new(handlers))
    }

    fn roles(&self, port: &PortInfo) -> Vec<String> {
        self.resolved(port).roles.clone()
    }
}

fn chain_applies(chain: &HandlerChainDescriptor, port: &PortInfo) -> bool {
    if !chain.protocol_bindings.is_empty() {
        let bound = chain
            .protocol_bindings
            .iter()
            .flat_map(|tokens| tokens.split_whitespace())
            .filter_map(Protocol::from_token)
            .any(|p| p == port.binding);
        if !bound {
            return false;
        }
    }

    pattern_applies(chain.service_name_pattern.as_deref(), &port.service_name)
        && pattern_applies(chain.port_name_pattern.as_deref(), &port.port_name)
}

fn pattern_applies(pattern: Option<&str>, name: &QName) -> bool {
    match pattern {
        None => true,
        Some(raw) => match raw.parse::<QName>() {
            Ok(pattern) => does_pattern_match(name, Some(&pattern)),
            Err(err) => {
                warn!(pattern = raw, error = %err, "ignoring malformed name pattern");
                false
            }
        },
    }
}

/// Matches a qualified name against a pattern.
///
/// The pattern's local part may contain `*` wildcards. An empty pattern
/// namespace matches any namespace. A missing pattern matches everything.
pub fn does_pattern_match(name: &QName, pattern: Option<&QName>) -> bool {
    let Some(pattern) = pattern else {
        return true;
    };

    if !pattern.namespace().is_empty() && pattern.namespace() != name.namespace() {
        return false;
    }

    let local = pattern.local_part();
    if !local.contains('*') {
        return local == name.local_part();
    }

    let expr = format!(
        "^{}$",
        local
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*")
    );
    Regex::new(&expr).is_ok_and(|re| re.is_match(name.local_part()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::HandlerDescriptor;
    use hermes_core::{FnHandler, HandlerKind, HandlerOutcome, MessageContext};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample() -> QName {
        QName::with_prefix("http://mysample", "MyName", "prefix")
    }

    fn matches(namespace: &str, local: &str) -> bool {
        does_pattern_match(&sample(), Some(&QName::new(namespace, local)))
    }

    #[test]
    fn test_pattern_exact_and_wildcards() {
        assert!(matches("http://mysample", "MyName"));
        assert!(matches("http://mysample", "My*"));
        assert!(matches("http://mysample", "*Name"));
        assert!(matches("http://mysample", "M*e"));
        assert!(matches("http://mysample", "*"));
        assert!(!matches("http://mysample", "Other*"));
    }

    #[test]
    fn test_pattern_empty_namespace_is_wildcard() {
        assert!(matches("", "*"));
        assert!(matches("", "*Name"));
        assert!(matches("", "M*e"));
    }

    #[test]
    fn test_pattern_prefix_is_not_namespace() {
        assert!(!matches("prefix", "*"));
    }

    #[test]
    fn test_missing_pattern_matches_everything() {
        assert!(does_pattern_match(&sample(), None));
    }

    #[test]
    fn test_pattern_escapes_regex_metacharacters() {
        let name = QName::new("urn:a", "Port.v1");
        assert!(does_pattern_match(&name, Some(&QName::new("urn:a", "Port.*"))));
        let other = QName::new("urn:a", "PortXv1");
        assert!(!does_pattern_match(&other, Some(&QName::new("urn:a", "Port.v*"))));
    }

    fn port(binding: Protocol) -> PortInfo {
        PortInfo::new(
            QName::new("urn:addnumbers", "AddNumbersService"),
            QName::new("urn:addnumbers", "AddNumbersPort"),
            binding,
        )
    }

    fn registry(constructed: &Arc<AtomicUsize>) -> HandlerRegistry {
        let registry = HandlerRegistry::new();
        for (name, kind) in [
            ("Logical", HandlerKind::Logical),
            ("Protocol", HandlerKind::Protocol),
            ("Xml", HandlerKind::Logical),
        ] {
            let constructed = Arc::clone(constructed);
            registry.register(name, move || {
                constructed.fetch_add(1, Ordering::SeqCst);
                Arc::new(FnHandler::new(name, kind, |_: &mut MessageContext| {
                    HandlerOutcome::Continue
                })) as BoxedHandler
            });
        }
        registry
    }

    fn descriptors() -> Vec<HandlerChainDescriptor> {
        vec![
            HandlerChainDescriptor::new()
                .port_name_pattern("{urn:addnumbers}AddNumbers*")
                .handler(HandlerDescriptor::new("Protocol").with_role("urn:role:a"))
                .handler(HandlerDescriptor::new("Logical")),
            HandlerChainDescriptor::new()
                .protocol_binding("##XML_HTTP")
                .handler(HandlerDescriptor::new("Xml")),
            HandlerChainDescriptor::new()
                .service_name_pattern("{urn:other}*")
                .handler(HandlerDescriptor::new("Xml")),
        ]
    }

    #[test]
    fn test_configured_resolver_filters_and_sorts() {
        let constructed = Arc::new(AtomicUsize::new(0));
        let resolver = ConfiguredResolver::new(descriptors(), registry(&constructed));

        let chain = resolver.resolve(&port(Protocol::Soap11)).unwrap();
        assert_eq!(chain.names(), vec!["Logical", "Protocol"]);
        assert_eq!(resolver.roles(&port(Protocol::Soap11)), vec!["urn:role:a".to_string()]);

        let chain = resolver.resolve(&port(Protocol::Http)).unwrap();
        assert_eq!(chain.names(), vec!["Logical", "Xml", "Protocol"]);
    }

    #[test]
    fn test_configured_resolver_builds_fresh_instances() {
        let constructed = Arc::new(AtomicUsize::new(0));
        let resolver = ConfiguredResolver::new(descriptors(), registry(&constructed));

        let first = resolver.resolve(&port(Protocol::Soap11)).unwrap();
        let second = resolver.resolve(&port(Protocol::Soap11)).unwrap();
        assert_eq!(constructed.load(Ordering::SeqCst), 4);
        assert!(!Arc::ptr_eq(first.get(0).unwrap(), second.get(0).unwrap()));
        assert_eq!(resolver.cached_ports(), 1);
    }

    #[test]
    fn test_missing_factory_is_handler_chain_fault() {
        let chains = vec![HandlerChainDescriptor::new().handler(HandlerDescriptor::new("Ghost"))];
        let resolver = ConfiguredResolver::new(chains, HandlerRegistry::new());
        let err = resolver.resolve(&port(Protocol::Soap11)).unwrap_err();
        assert!(err.is_handler_chain());
        assert!(err.to_string().contains("Ghost"));
    }

    #[derive(Clone)]
    struct Counted {
        inits: Arc<AtomicUsize>,
        destroys: Arc<AtomicUsize>,
    }

    impl Handler for Counted {
        fn name(&self) -> &str {
            "Counted"
        }

        fn kind(&self) -> HandlerKind {
            HandlerKind::Logical
        }

        fn init(&self) {
            self.inits.fetch_add(1, Ordering::SeqCst);
        }

        fn handle_message(&self, _ctx: &mut MessageContext) -> HandlerOutcome {
            HandlerOutcome::Continue
        }

        fn destroy(&self) {
            self.destroys.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_missing_factory_initialises_nothing() {
        let inits = Arc::new(AtomicUsize::new(0));
        let destroys = Arc::new(AtomicUsize::new(0));
        let registry = HandlerRegistry::new();
        registry.register_prototype(
            "Counted",
            Counted {
                inits: Arc::clone(&inits),
                destroys: Arc::clone(&destroys),
            },
        );
        let chains = vec![HandlerChainDescriptor::new()
            .handler(HandlerDescriptor::new("Counted"))
            .handler(HandlerDescriptor::new("Missing"))];
        let resolver = ConfiguredResolver::new(chains, registry);

        let err = resolver.resolve(&port(Protocol::Soap11)).unwrap_err();
        assert!(err.to_string().contains("Missing"));
        assert_eq!(inits.load(Ordering::SeqCst), 0);
        assert_eq!(destroys.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_resolver_instance_ownership() {
        let constructed = Arc::new(AtomicUsize::new(0));
        assert!(ConfiguredResolver::new(descriptors(), registry(&constructed)).owns_instances());
        assert!(!StaticResolver::default().owns_instances());
    }

    #[test]
    fn test_malformed_pattern_never_matches() {
        let chains = vec![HandlerChainDescriptor::new()
            .port_name_pattern("{urn:broken")
            .handler(HandlerDescriptor::new("Logical"))];
        let constructed = Arc::new(AtomicUsize::new(0));
        let resolver = ConfiguredResolver::new(chains, registry(&constructed));
        assert!(resolver.resolve(&port(Protocol::Soap11)).unwrap().is_empty());
    }

    #[test]
    fn test_static_resolver_returns_shared_chain() {
        let chain = HandlerChain::builder()
            .handler(FnHandler::logical("L", |_: &mut MessageContext| HandlerOutcome::Continue))
            .build();
        let resolver = StaticResolver::new(chain.clone());
        let resolved = resolver.resolve(&port(Protocol::Soap12)).unwrap();
        assert!(Arc::ptr_eq(chain.get(0).unwrap(), resolved.get(0).unwrap()));
        assert!(resolver.roles(&port(Protocol::Soap12)).is_empty());
    }

    #[test]
    fn test_fn_resolver() {
        let resolver = FnResolver::new(|port: &PortInfo| {
            if port.binding == Protocol::Http {
                Err(Fault::runtime("http not supported"))
            } else {
                Ok(HandlerChain::empty())
            }
        });
        assert!(resolver.resolve(&port(Protocol::Soap11)).is_ok());
        assert!(resolver.resolve(&port(Protocol::Http)).is_err());
    }

    #[test]
    fn test_registry_prototype() {
        #[derive(Clone)]
        struct Proto;

        impl Handler for Proto {
            fn name(&self) -> &str {
                "Proto"
            }

            fn kind(&self) -> HandlerKind {
                HandlerKind::Protocol
            }

            fn handle_message(&self, _ctx: &mut MessageContext) -> HandlerOutcome {
                HandlerOutcome::Continue
            }
        }

        let registry = HandlerRegistry::new();
        registry.register_prototype("proto", Proto);
        assert!(registry.contains("proto"));
        assert_eq!(registry.create("proto").unwrap().name(), "Proto");
        assert!(registry.create("missing").is_none());
        assert_eq!(registry.names(), vec!["proto".to_string()]);
    }
}
