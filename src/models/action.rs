use crate::constants::{GLOBAL_SYNC_ID, SYNC_ID_SEPARATOR};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// A named command driving a device's flow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub originates_from_device: bool,
    #[serde(default)]
    pub do_not_block_for_response: bool,
    #[serde(default)]
    pub caused_by: Option<Box<Action>>,
    #[serde(default)]
    pub last_known_queue_size: usize,
    pub issued_at: DateTime<Utc>,
}

impl Action {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            data: Value::Null,
            originates_from_device: false,
            do_not_block_for_response: false,
            caused_by: None,
            last_known_queue_size: 0,
            issued_at: Utc::now(),
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// Mark the action as user input from the device itself
    pub fn from_device(mut self) -> Self {
        self.originates_from_device = true;
        self
    }

    pub fn without_blocking(mut self) -> Self {
        self.do_not_block_for_response = true;
        self
    }

    pub fn caused_by(mut self, cause: &Action) -> Self {
        self.caused_by = Some(Box::new(cause.clone()));
        self
    }

    /// Follow-up action that keeps this one's payload and records it as the cause
    pub fn follow_up(&self, name: impl Into<String>) -> Self {
        Action::new(name).with_data(self.data.clone()).caused_by(self)
    }

    /// The innermost action of the `caused_by` chain
    pub fn root_cause(&self) -> &Action {
        let mut current = self;
        while let Some(cause) = current.caused_by.as_deref() {
            current = cause;
        }
        current
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Identifies which state an action was issued against
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SyncId {
    /// Accepted regardless of the current state
    Global,
    /// Accepted only while the named state is current
    State(String),
}

impl SyncId {
    pub fn parse(raw: &str) -> Self {
        if raw == GLOBAL_SYNC_ID {
            Self::Global
        } else {
            Self::State(raw.to_string())
        }
    }

    pub fn matches(&self, current_state: Option<&str>) -> bool {
        match self {
            Self::Global => true,
            Self::State(expected) => current_state == Some(expected.as_str()),
        }
    }
}

impl fmt::Display for SyncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => write!(f, "{GLOBAL_SYNC_ID}"),
            Self::State(state) => write!(f, "{state}"),
        }
    }
}

/// Split `Pay@Tender` into `("Pay", Some(State("Tender")))`. Only the last
/// `@` separates the sync id, since state names never contain one; an empty
/// suffix is treated as no sync id.
pub fn split_sync_id(name: &str) -> (&str, Option<SyncId>) {
    match name.rsplit_once(SYNC_ID_SEPARATOR) {
        Some((base, raw)) if !raw.is_empty() => (base, Some(SyncId::parse(raw))),
        Some((base, _)) => (base, None),
        None => (name, None),
    }
}

/// Which kind of handler an id refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    Global,
    State,
    AnyAction,
}

/// Identity of a handler that may be executing on the actor thread
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HandlerId {
    pub kind: HandlerKind,
    /// Type name of the state or global handler owning the handler
    pub owner: &'static str,
    /// Action name for state-specific handlers
    pub action: Option<String>,
}

impl HandlerId {
    pub fn global(owner: &'static str) -> Self {
        Self {
            kind: HandlerKind::Global,
            owner,
            action: None,
        }
    }

    pub fn state(owner: &'static str, action: impl Into<String>) -> Self {
        Self {
            kind: HandlerKind::State,
            owner,
            action: Some(action.into()),
        }
    }

    pub fn any_action(owner: &'static str) -> Self {
        Self {
            kind: HandlerKind::AnyAction,
            owner,
            action: None,
        }
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.kind, &self.action) {
            (HandlerKind::State, Some(action)) => write!(f, "{}::on_{}", self.owner, action),
            (HandlerKind::AnyAction, _) => write!(f, "{}::on_any_action", self.owner),
            _ => write!(f, "{}", self.owner),
        }
    }
}

/// Where an enqueue came from. Only enqueues made on the actor's own thread
/// while a handler runs carry a handler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum HandlerOrigin {
    #[default]
    None,
    Handler(HandlerId),
}

/// Per-dispatch metadata for one queued action
#[derive(Debug, Clone)]
pub struct ActionContext {
    pub action: Action,
    pub origin: HandlerOrigin,
    pub sync_id: Option<SyncId>,
}

impl ActionContext {
    /// Strip any sync id suffix from the action name and record it
    pub fn new(mut action: Action, origin: HandlerOrigin) -> Self {
        let (base, sync_id) = {
            let (base, sync_id) = split_sync_id(&action.name);
            (base.to_string(), sync_id)
        };
        action.name = base;
        Self {
            action,
            origin,
            sync_id,
        }
    }

    /// Stale actions issued against another state are not valid
    pub fn is_sync_valid(&self, current_state: Option<&str>) -> bool {
        self.sync_id
            .as_ref()
            .map_or(true, |sync_id| sync_id.matches(current_state))
    }

    /// Global handlers guard at class level
    pub fn is_inside_global_handler(&self, owner: &'static str) -> bool {
        matches!(&self.origin, HandlerOrigin::Handler(id) if id.kind == HandlerKind::Global && id.owner == owner)
    }

    /// State handlers guard at method level; `id` is the handler about to run
    pub fn is_inside(&self, id: &HandlerId) -> bool {
        matches!(&self.origin, HandlerOrigin::Handler(current) if current == id)
    }
}
