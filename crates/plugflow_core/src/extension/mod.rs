//! Extension host.
//!
//! Discovery and loading of native units and workflow documents, the live
//! registry that owns their lifecycle, and the hook bus shared by all of them.

pub mod context;
pub mod contract;
pub mod discovery;
pub mod hook;
pub mod loader;
pub mod native;
pub mod registry;

use std::any::Any;

const MAX_PANIC_PAYLOAD_CHARS: usize = 160;

/// Human-readable summary of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    let message = if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    };
    crate::logging::sanitize_message(&message, MAX_PANIC_PAYLOAD_CHARS)
}
