use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a device within an application (`{app_id, device_id}`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceKey {
    pub app_id: String,
    pub device_id: String,
}

impl DeviceKey {
    pub fn new(app_id: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            device_id: device_id.into(),
        }
    }
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.app_id, self.device_id)
    }
}

/// How an event source relates to the device receiving the event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceRelation {
    /// The event came from the device's own flow
    SelfDevice,
    /// The event came from the device's parent
    Parent,
    /// The event came from one of the device's children
    Paired,
}

impl DeviceRelation {
    pub const ALL: [DeviceRelation; 3] = [Self::SelfDevice, Self::Parent, Self::Paired];
}

impl fmt::Display for DeviceRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SelfDevice => write!(f, "self"),
            Self::Parent => write!(f, "parent"),
            Self::Paired => write!(f, "paired"),
        }
    }
}

/// Two-level device topology. Only identities are stored; live actors are
/// resolved through the registry on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceTopology {
    pub device: DeviceKey,
    pub parent: Option<DeviceKey>,
    pub children: Vec<DeviceKey>,
}

impl DeviceTopology {
    pub fn standalone(device: DeviceKey) -> Self {
        Self {
            device,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn with_parent(mut self, parent: DeviceKey) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_child(mut self, child: DeviceKey) -> Self {
        if !self.children.contains(&child) {
            self.children.push(child);
        }
        self
    }

    /// Every relationship `source` has to this device. A source can match
    /// more than one relation only through a misconfigured topology.
    pub fn classify(&self, source: &DeviceKey) -> Vec<DeviceRelation> {
        let mut relations = Vec::with_capacity(1);
        if &self.device == source {
            relations.push(DeviceRelation::SelfDevice);
        }
        if self.parent.as_ref() == Some(source) {
            relations.push(DeviceRelation::Parent);
        }
        if self.children.iter().any(|child| child == source) {
            relations.push(DeviceRelation::Paired);
        }
        relations
    }
}
