//! Proptest strategies for action names and scope contents.

use proptest::prelude::*;

/// Plain action names: never empty, never carrying a sync id
pub fn action_name_strategy() -> impl Strategy<Value = String> {
    "[A-Z][A-Za-z0-9]{0,15}"
}

/// State names usable as sync ids, excluding the global marker
pub fn state_name_strategy() -> impl Strategy<Value = String> {
    "[A-Z][a-z]{2,12}".prop_filter("global marker", |name| name != "Global")
}

/// Scope entry names
pub fn scope_name_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z_]{0,11}"
}

/// Which of the three store layers an entry is written to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerMask {
    pub device: bool,
    pub session: bool,
    pub conversation: bool,
}

pub fn layer_mask_strategy() -> impl Strategy<Value = LayerMask> {
    (any::<bool>(), any::<bool>(), any::<bool>()).prop_map(|(device, session, conversation)| {
        LayerMask {
            device,
            session,
            conversation,
        }
    })
}
