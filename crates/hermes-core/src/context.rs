//! Per-exchange message context.
//!
//! A [`MessageContext`] is created for every message exchange and is owned
//! exclusively by that exchange. Handlers read and mutate it in sequence.
//!
//! ## Property scopes
//!
//! Every property carries a [`Scope`]:
//!
//! - [`Scope::Application`] properties are copied into the
//!   [`ApplicationContext`] the caller sees once dispatch completes.
//! - [`Scope::Handler`] properties are visible to handlers only. Looking one up
//!   through the application view yields `None`, never an error.
//!
//! Properties seeded from an application request context are APPLICATION
//! scoped. Properties a handler sets without naming a scope are HANDLER scoped.

use std::fmt;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::message::Message;

/// Property under which the server exposes an endpoint failure to its handlers.
pub const WEBMETHOD_EXCEPTION: &str = "hermes.webmethod.exception";

/// Unique identifier for a message exchange (UUID v7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExchangeId(Uuid);

impl ExchangeId {
    /// Generates a new exchange ID.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ExchangeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Direction a message is travelling relative to the local chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Arriving at this side.
    Inbound,
    /// Leaving this side.
    Outbound,
}

impl Direction {
    /// Returns the opposite direction.
    pub fn reverse(self) -> Self {
        match self {
            Self::Inbound => Self::Outbound,
            Self::Outbound => Self::Inbound,
        }
    }

    /// Returns `true` for [`Direction::Outbound`].
    pub fn is_outbound(self) -> bool {
        matches!(self, Self::Outbound)
    }

    /// Upper-case label used in lifecycle event names.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inbound => "INBOUND",
            Self::Outbound => "OUTBOUND",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the context is on the normal or the fault path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Regular message processing.
    #[default]
    Normal,
    /// Fault processing.
    Fault,
}

/// Visibility of a context property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Visible to handlers and to the application.
    Application,
    /// Visible to handlers only.
    Handler,
}

#[derive(Debug, Clone, PartialEq)]
struct Property {
    value: Value,
    scope: Scope,
}

/// Per-exchange mutable state shared by the handlers of one chain traversal.
#[derive(Debug)]
pub struct MessageContext {
    id: ExchangeId,
    direction: Direction,
    phase: Phase,
    message: Message,
    properties: IndexMap<String, Property>,
    roles: Vec<String>,
    started_at: Instant,
}

impl MessageContext {
    /// Creates a context for a message travelling in `direction`.
    pub fn new(direction: Direction, message: Message) -> Self {
        Self {
            id: ExchangeId::new(),
            direction,
            phase: Phase::Normal,
            message,
            properties: IndexMap::new(),
            roles: Vec::new(),
            started_at: Instant::now(),
        }
    }

    /// Creates a context for an outbound message.
    pub fn outbound(message: Message) -> Self {
        Self::new(Direction::Outbound, message)
    }

    /// Creates a context for an inbound message.
    pub fn inbound(message: Message) -> Self {
        Self::new(Direction::Inbound, message)
    }

    /// Seeds the context with application properties, all APPLICATION scoped.
    #[must_use]
    pub fn with_application_context(mut self, context: &ApplicationContext) -> Self {
        for (key, value) in context.iter() {
            self.set_property_scoped(key.clone(), value.clone(), Scope::Application);
        }
        self
    }

    /// The exchange ID.
    pub fn id(&self) -> ExchangeId {
        self.id
    }

    /// Time elapsed since the exchange started.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Current message direction.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Returns `true` if the message is outbound.
    pub fn is_outbound(&self) -> bool {
        self.direction.is_outbound()
    }

    /// Sets the message direction.
    pub fn set_direction(&mut self, direction: Direction) {
        self.direction = direction;
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Sets the phase.
    pub fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    /// The current message.
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Mutable access to the current message.
    pub fn message_mut(&mut self) -> &mut Message {
        &mut self.message
    }

    /// Replaces the current message, returning the previous one.
    pub fn set_message(&mut self, message: Message) -> Message {
        std::mem::replace(&mut self.message, message)
    }

    /// Consumes the context, returning the message.
    pub fn into_message(self) -> Message {
        self.message
    }

    /// The current payload.
    pub fn payload(&self) -> &Value {
        self.message.payload()
    }

    /// Replaces the current payload.
    pub fn set_payload(&mut self, payload: impl Into<Value>) {
        self.message.set_payload(payload);
    }

    /// Looks up a property regardless of scope.
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key).map(|p| &p.value)
    }

    /// Looks up a property and deserializes it.
    pub fn property_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.property(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Sets a property.
    ///
    /// New keys are HANDLER scoped; existing keys keep their scope.
    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        match self.properties.get_mut(&key) {
            Some(existing) => Some(std::mem::replace(&mut existing.value, value)),
            None => {
                self.properties.insert(
                    key,
                    Property {
                        value,
                        scope: Scope::Handler,
                    },
                );
                None
            }
        }
    }

    /// Sets a property with an explicit scope.
    pub fn set_property_scoped(
        &mut self,
        key: impl Into<String>,
        value: impl Into<Value>,
        scope: Scope,
    ) -> Option<Value> {
        self.properties
            .insert(
                key.into(),
                Property {
                    value: value.into(),
                    scope,
                },
            )
            .map(|p| p.value)
    }

    /// Removes a property.
    pub fn remove_property(&mut self, key: &str) -> Option<Value> {
        self.properties.shift_remove(key).map(|p| p.value)
    }

    /// Returns `true` if the property exists in any scope.
    pub fn contains_property(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    /// Returns the scope of a property.
    pub fn scope(&self, key: &str) -> Option<Scope> {
        self.properties.get(key).map(|p| p.scope)
    }

    /// Changes the scope of an existing property. Returns `false` if the key is absent.
    pub fn set_scope(&mut self, key: &str, scope: Scope) -> bool {
        match self.properties.get_mut(key) {
            Some(property) => {
                property.scope = scope;
                true
            }
            None => false,
        }
    }

    /// Iterates over property keys in insertion order.
    pub fn property_keys(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    /// The application-visible view: APPLICATION-scoped properties only.
    pub fn application_context(&self) -> ApplicationContext {
        let properties = self
            .properties
            .iter()
            .filter(|(_, p)| p.scope == Scope::Application)
            .map(|(k, p)| (k.clone(), p.value.clone()))
            .collect();
        ApplicationContext { properties }
    }

    /// SOAP roles this side acts in.
    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    /// Sets the SOAP roles this side acts in.
    pub fn set_roles(&mut self, roles: Vec<String>) {
        self.roles = roles;
    }
}

/// Properties visible to application code.
///
/// Used both as the request context a caller seeds an exchange with and as the
/// response context it reads afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationContext {
    properties: IndexMap<String, Value>,
}

/// Context the application passes into an invocation.
pub type RequestContext = ApplicationContext;

/// Context the application reads after an invocation.
pub type ResponseContext = ApplicationContext;

impl ApplicationContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a property, builder style.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Inserts a property.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.properties.insert(key.into(), value.into())
    }

    /// Looks up a property. HANDLER-scoped keys are never present.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Looks up a property and deserializes it.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Removes a property.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.properties.shift_remove(key)
    }

    /// Returns `true` if the key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    /// Number of properties.
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Returns `true` if there are no properties.
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Iterates over properties in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.properties.iter()
    }
}
