//! # Models
//!
//! Device identity and the action command model.

pub mod action;
pub mod device;

pub use action::{
    split_sync_id, Action, ActionContext, HandlerId, HandlerKind, HandlerOrigin, SyncId,
};
pub use device::{DeviceKey, DeviceRelation, DeviceTopology};
