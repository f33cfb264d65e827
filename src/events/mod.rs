//! # Device Events
//!
//! Domain events raised by a device, its parent or its paired children are
//! delivered to the current state's declared event handlers. Each handler
//! lists the [`DeviceRelation`](crate::models::DeviceRelation)s it listens
//! to; the [`EventBroadcaster`] classifies the event's source against the
//! receiving actor's topology and invokes every matching handler once.

pub mod broadcaster;
pub mod handlers;

use crate::models::DeviceKey;
use crate::utils::AsAny;
use std::fmt;

pub use broadcaster::{EventBroadcaster, EventTarget};
pub use handlers::{EventHandlerTable, EventHandlers};

/// A domain event raised by some device
pub trait DeviceEvent: AsAny + fmt::Debug + Send + Sync {
    /// Device that raised the event
    fn source(&self) -> &DeviceKey;

    fn event_name(&self) -> &'static str {
        crate::utils::simplify(std::any::type_name::<Self>())
    }
}
