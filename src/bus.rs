//! Typed synchronous publish/subscribe
//!
//! Delivery is synchronous and follows registration order. A failing or
//! panicking subscriber is logged and skipped; the remaining subscribers still
//! receive the event. Subscribing again with an existing listener id replaces
//! that listener's callback in place, keeping its position.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use tracing::{debug, warn};

use crate::error::{Result, SignalError};

/// Subscriber callback.
pub type Callback<E> = Arc<dyn Fn(&E) -> Result<()> + Send + Sync>;

struct Listener<E> {
    id: String,
    token: u64,
    callback: Callback<E>,
}

struct BusInner<E> {
    listeners: RwLock<Vec<Listener<E>>>,
    next_token: AtomicU64,
}

/// A publish/subscribe channel for events of type `E`.
pub struct EventBus<E> {
    inner: Arc<BusInner<E>>,
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: 'static> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: 'static> EventBus<E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                listeners: RwLock::new(Vec::new()),
                next_token: AtomicU64::new(1),
            }),
        }
    }

    /// Register `callback` under `listener_id`.
    pub fn subscribe<F>(&self, listener_id: impl Into<String>, callback: F) -> Subscription<E>
    where
        F: Fn(&E) -> Result<()> + Send + Sync + 'static,
    {
        self.subscribe_callback(listener_id, Arc::new(callback))
    }

    /// Register an already shared callback under `listener_id`.
    pub fn subscribe_callback(
        &self,
        listener_id: impl Into<String>,
        callback: Callback<E>,
    ) -> Subscription<E> {
        let id = listener_id.into();
        let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);
        let mut listeners = self
            .inner
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        match listeners.iter_mut().find(|l| l.id == id) {
            Some(existing) => {
                debug!(listener_id = %id, "replacing subscriber");
                existing.token = token;
                existing.callback = callback;
            }
            None => listeners.push(Listener {
                id: id.clone(),
                token,
                callback,
            }),
        }

        Subscription {
            bus: Arc::downgrade(&self.inner),
            listener_id: id,
            token,
        }
    }

    /// Deliver `event` to every subscriber in registration order.
    ///
    /// Returns the failures; they have already been logged.
    pub fn publish(&self, event: &E) -> Vec<SignalError> {
        // Snapshot so callbacks may subscribe or publish re-entrantly.
        let snapshot: Vec<(String, Callback<E>)> = self
            .inner
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|l| (l.id.clone(), Arc::clone(&l.callback)))
            .collect();

        let mut failures = Vec::new();
        for (listener_id, callback) in snapshot {
            let outcome = catch_unwind(AssertUnwindSafe(|| callback(event)));
            let reason = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err.to_string(),
                Err(panic) => panic_message(panic.as_ref()),
            };
            warn!(listener_id = %listener_id, %reason, "subscriber failed");
            failures.push(SignalError::SubscriberFailed {
                listener_id,
                reason,
            });
        }
        failures
    }

    pub fn listener_count(&self) -> usize {
        self.inner
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Listener ids in delivery order.
    pub fn listener_ids(&self) -> Vec<String> {
        self.inner
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|l| l.id.clone())
            .collect()
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}

/// Handle returned by [`EventBus::subscribe`].
///
/// Dropping the handle does not unsubscribe.
pub struct Subscription<E> {
    bus: Weak<BusInner<E>>,
    listener_id: String,
    token: u64,
}

impl<E> Subscription<E> {
    pub fn listener_id(&self) -> &str {
        &self.listener_id
    }

    /// Remove the listener. A handle superseded by a later subscription with
    /// the same listener id leaves the newer callback in place.
    pub fn unsubscribe(self) {
        let Some(bus) = self.bus.upgrade() else {
            return;
        };
        let mut listeners = bus.listeners.write().unwrap_or_else(PoisonError::into_inner);
        listeners.retain(|l| !(l.id == self.listener_id && l.token == self.token));
    }
}
