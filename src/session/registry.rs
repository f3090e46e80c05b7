//! Listener registry.
//!
//! Maps event names (`Domain.event`) and bare domain names to listeners.
//! A notification is delivered to its event listener and, independently,
//! to its domain listener.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::error::{Error, Result};
use crate::protocol::{Notification, domain_of};

use super::listener::{SharedListener, same_listener};

// ============================================================================
// ListenerRegistry
// ============================================================================

/// Event and domain listener maps of one session.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    /// Listeners keyed by `Domain.event`.
    events: FxHashMap<String, SharedListener>,
    /// Listeners keyed by `Domain`.
    domains: FxHashMap<String, SharedListener>,
}

impl ListenerRegistry {
    /// Registers `listener` under `name` and returns the owning domain.
    ///
    /// A name containing `.` is an event name; anything else is a domain.
    /// Registering a key again replaces its listener.
    pub(crate) fn register(&mut self, name: &str, listener: SharedListener) -> String {
        let domain = domain_of(name).to_string();

        if name.contains('.') {
            self.events.insert(name.to_string(), listener);
        } else {
            self.domains.insert(name.to_string(), listener);
        }

        domain
    }

    /// Removes every key mapped to `listener`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownListener`] if no key maps to it.
    pub(crate) fn unregister<L: ?Sized>(&mut self, listener: &Arc<Mutex<L>>) -> Result<()> {
        let before = self.len();

        self.events.retain(|_, l| !same_listener(l, listener));
        self.domains.retain(|_, l| !same_listener(l, listener));

        if self.len() == before {
            return Err(Error::UnknownListener);
        }

        Ok(())
    }

    /// Delivers a notification to its event and domain listeners.
    ///
    /// Returns `true` if at least one listener received it.
    pub(crate) fn deliver(&self, notification: &Notification) -> bool {
        let method = notification.method.as_str();
        let event_listener = self.events.get(method);
        let domain_listener = self.domains.get(notification.domain());

        if event_listener.is_none() && domain_listener.is_none() {
            trace!(method, "No listener");
            return false;
        }

        if let Some(listener) = event_listener {
            listener.lock().handle(method, notification);
        }
        if let Some(listener) = domain_listener {
            listener.lock().handle(method, notification);
        }

        true
    }

    /// Returns the number of registered keys.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.events.len() + self.domains.len()
    }

    /// Returns `true` if no key is registered.
    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every key.
    pub(crate) fn clear(&mut self) {
        self.events.clear();
        self.domains.clear();
    }
}

// ============================================================================
// Tests
// ============================================================================
