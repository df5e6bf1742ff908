/// Event names the control publishes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventKind {
    LayerAdd,
    LayerRemove,
    Error,
    Status,
}

/// UI-facing state at the moment of emission.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StateSnapshot {
    pub loading: bool,
    pub error: Option<String>,
    pub status: Option<String>,
    pub dataset_count: usize,
}

/// Payload delivered to subscribers: a snapshot of current state plus the
/// event-specific extras (url, layer id, error text).
#[derive(Debug, Clone, PartialEq)]
pub struct ControlEvent {
    pub kind: EventKind,
    pub snapshot: StateSnapshot,
    pub url: Option<String>,
    pub layer_id: Option<String>,
    pub message: Option<String>,
}

impl ControlEvent {
    pub fn new(kind: EventKind, snapshot: StateSnapshot) -> Self {
        Self {
            kind,
            snapshot,
            url: None,
            layer_id: None,
            message: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_layer_id(mut self, layer_id: impl Into<String>) -> Self {
        self.layer_id = Some(layer_id.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}
