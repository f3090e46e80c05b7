//! Listener capability and stop control.
//!
//! A [`Listener`] receives the notifications it registered for, one at a
//! time, on the dispatch loop. Listeners are shared as [`SharedListener`]
//! so the caller keeps a handle to read back what was collected; identity
//! (the `Arc` allocation) is what [`crate::Session::unregister_listener`]
//! matches on.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde_json::{Value, json};

use crate::error::{Error, Result};
use crate::protocol::Notification;

// ============================================================================
// Listener
// ============================================================================

/// Receives notifications forwarded by a session.
pub trait Listener: Send {
    /// Handles a notification this listener registered for.
    ///
    /// `method` is the full `Domain.event` name.
    fn handle(&mut self, method: &str, notification: &Notification);
}

/// A listener shared between the caller and the session.
pub type SharedListener = Arc<Mutex<dyn Listener>>;

/// Wraps a listener for registration.
///
/// The returned handle coerces to [`SharedListener`] and still gives typed
/// access to the listener afterwards.
#[inline]
#[must_use]
pub fn shared<L: Listener + 'static>(listener: L) -> Arc<Mutex<L>> {
    Arc::new(Mutex::new(listener))
}

/// Returns `true` if both handles point to the same listener.
#[inline]
#[must_use]
pub(crate) fn same_listener<L: ?Sized>(a: &SharedListener, b: &Arc<Mutex<L>>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

// ============================================================================
// Track
// ============================================================================

/// A listener that collects data and can be serialized.
pub trait Track: Listener {
    /// Returns the collected events.
    fn events(&self) -> Vec<Value>;

    /// Serializes the track to a JSON value.
    fn to_json(&self) -> Value;
}

// ============================================================================
// StopHandle
// ============================================================================

/// Cooperative stop flag of a session's dispatch loop.
///
/// Setting it does not interrupt a wait in progress; the loop observes it
/// after the current batch or wait completes.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Requests the dispatch loop to stop.
    #[inline]
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns `true` if stop was requested.
    #[inline]
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clears the flag before a dispatch loop starts.
    #[inline]
    pub(crate) fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// ============================================================================
// NotificationRecorder
// ============================================================================

/// A [`Track`] recording every notification it receives.
///
/// Optionally stops monitoring when a given event is seen.
#[derive(Debug, Default)]
pub struct NotificationRecorder {
    notifications: Vec<Notification>,
    stop_on: Option<(String, StopHandle)>,
}

impl NotificationRecorder {
    /// Creates an empty recorder.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stops monitoring through `handle` once `method` is recorded.
    #[inline]
    #[must_use]
    pub fn stop_on(mut self, method: impl Into<String>, handle: StopHandle) -> Self {
        self.stop_on = Some((method.into(), handle));
        self
    }

    /// Returns the recorded notifications.
    #[inline]
    #[must_use]
    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    /// Returns the recorded methods, in order.
    #[must_use]
    pub fn methods(&self) -> Vec<&str> {
        self.notifications.iter().map(|n| n.method.as_str()).collect()
    }

    /// Rebuilds a recorder from [`Track::to_json`] output.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if `events` is missing or malformed.
    pub fn from_json(value: &Value) -> Result<Self> {
        let events = value
            .get("events")
            .cloned()
            .ok_or_else(|| Error::protocol("Recorder JSON has no events"))?;
        let notifications: Vec<Notification> = serde_json::from_value(events)
            .map_err(|e| Error::protocol(format!("Malformed recorder events: {e}")))?;

        Ok(Self {
            notifications,
            stop_on: None,
        })
    }
}

impl Listener for NotificationRecorder {
    fn handle(&mut self, method: &str, notification: &Notification) {
        self.notifications.push(notification.clone());

        if let Some((stop_method, handle)) = &self.stop_on
            && stop_method == method
        {
            handle.stop();
        }
    }
}

impl Track for NotificationRecorder {
    fn events(&self) -> Vec<Value> {
        self.notifications.iter().map(Notification::to_value).collect()
    }

    fn to_json(&self) -> Value {
        json!({ "events": self.events() })
    }
}

// ============================================================================
// Tests
// ============================================================================
