//! Recorded handler callbacks.

use std::fmt;
use std::sync::Arc;

use hermes_core::Direction;
use parking_lot::Mutex;

/// Which callback ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// `init`.
    PostConstruct,
    /// `headers`.
    GetHeaders,
    /// `handle_message` in a direction.
    HandleMessage(Direction),
    /// `handle_fault` in a direction.
    HandleFault(Direction),
    /// `close`.
    Close,
    /// `destroy`.
    PreDestroy,
    /// An endpoint was invoked.
    Invoke,
}

impl EventKind {
    /// Upper-case label, e.g. `HANDLE_MESSAGE_OUTBOUND`.
    pub fn label(&self) -> String {
        match self {
            Self::PostConstruct => "POST_CONSTRUCT".to_string(),
            Self::GetHeaders => "GET_HEADERS".to_string(),
            Self::HandleMessage(direction) => format!("HANDLE_MESSAGE_{}", direction.as_str()),
            Self::HandleFault(direction) => format!("HANDLE_FAULT_{}", direction.as_str()),
            Self::Close => "CLOSE".to_string(),
            Self::PreDestroy => "PRE_DESTROY".to_string(),
            Self::Invoke => "INVOKE".to_string(),
        }
    }

    fn code(&self) -> Option<char> {
        match self {
            Self::HandleMessage(_) => Some('m'),
            Self::HandleFault(_) => Some('f'),
            Self::Close => Some('c'),
            _ => None,
        }
    }
}

/// One recorded callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Handler (or endpoint) name.
    pub handler: String,
    /// Callback.
    pub kind: EventKind,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.handler, self.kind.label())
    }
}

/// Ordered, shareable log of callbacks.
///
/// Clones append to the same log.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<Event>>>,
}

impl EventLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event.
    pub fn record(&self, handler: impl Into<String>, kind: EventKind) {
        self.events.lock().push(Event {
            handler: handler.into(),
            kind,
        });
    }

    /// Every event so far.
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Every event as `"<handler> <LABEL>"`.
    pub fn lines(&self) -> Vec<String> {
        self.events.lock().iter().map(ToString::to_string).collect()
    }

    /// Message, fault and close callbacks in compact form, e.g. `S2m:S1m:L1c:`.
    pub fn compact(&self) -> String {
        self.events
            .lock()
            .iter()
            .filter_map(|e| e.kind.code().map(|code| format!("{}{code}:", e.handler)))
            .collect()
    }

    /// Events of one handler, as labels.
    pub fn for_handler(&self, handler: &str) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.handler == handler)
            .map(|e| e.kind.label())
            .collect()
    }

    /// Returns `true` if a line equal to `line` was recorded.
    pub fn contains(&self, line: &str) -> bool {
        self.events.lock().iter().any(|e| e.to_string() == line)
    }

    /// Number of events.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Returns `true` if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Forgets every event.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}
