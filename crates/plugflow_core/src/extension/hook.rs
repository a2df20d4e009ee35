//! Hook bus: named events fanned out to ordered subscribers.
//!
//! # Invariants
//! - Registration order is call order.
//! - One failing subscriber (error or panic) never prevents the others from
//!   running; its result is dropped from the returned list.
//! - No lock is held while subscribers run, so a callback may subscribe or
//!   unsubscribe without deadlocking.

use crate::extension::contract::{CallArgs, ExtensionError};
use crate::extension::panic_message;
use log::{debug, error};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Subscriber callback. Identity (for unsubscribe) is the `Arc` pointer.
pub type HookCallback = Arc<dyn Fn(&CallArgs) -> Result<Value, ExtensionError> + Send + Sync>;

/// Wraps a closure into a [`HookCallback`].
pub fn hook_callback<F>(callback: F) -> HookCallback
where
    F: Fn(&CallArgs) -> Result<Value, ExtensionError> + Send + Sync + 'static,
{
    Arc::new(callback)
}

#[derive(Default)]
pub struct HookBus {
    hooks: Mutex<BTreeMap<String, Vec<HookCallback>>>,
}

impl HookBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, hook_name: &str, callback: HookCallback) {
        self.hooks
            .lock()
            .entry(hook_name.to_string())
            .or_default()
            .push(callback);
        debug!("event=hook_register module=hook status=ok hook={hook_name}");
    }

    /// Removes the first registration of `callback`. Returns `false` when the
    /// hook or the callback is unknown.
    pub fn unregister(&self, hook_name: &str, callback: &HookCallback) -> bool {
        let mut hooks = self.hooks.lock();
        let Some(subscribers) = hooks.get_mut(hook_name) else {
            return false;
        };
        let Some(index) = subscribers.iter().position(|cb| Arc::ptr_eq(cb, callback)) else {
            return false;
        };
        subscribers.remove(index);
        if subscribers.is_empty() {
            hooks.remove(hook_name);
        }
        debug!("event=hook_unregister module=hook status=ok hook={hook_name}");
        true
    }

    /// Calls every subscriber in order and collects the successful results.
    pub fn trigger(&self, hook_name: &str, call: &CallArgs) -> Vec<Value> {
        let subscribers = match self.hooks.lock().get(hook_name) {
            Some(subscribers) => subscribers.clone(),
            None => return Vec::new(),
        };

        let mut results = Vec::with_capacity(subscribers.len());
        for (index, callback) in subscribers.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| callback(call))) {
                Ok(Ok(value)) => results.push(value),
                Ok(Err(err)) => error!(
                    "event=hook_callback module=hook status=error hook={hook_name} index={index} error={err}"
                ),
                Err(payload) => error!(
                    "event=hook_callback module=hook status=panic hook={hook_name} index={index} payload={}",
                    panic_message(payload.as_ref())
                ),
            }
        }
        results
    }

    pub fn subscriber_count(&self, hook_name: &str) -> usize {
        self.hooks.lock().get(hook_name).map_or(0, Vec::len)
    }

    /// Sorted names of hooks with at least one subscriber.
    pub fn hook_names(&self) -> Vec<String> {
        self.hooks.lock().keys().cloned().collect()
    }
}
