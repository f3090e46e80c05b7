//! Notification and inbound message types.
//!
//! Notifications are unsolicited messages sent by the DevTools server when
//! activity occurs in an enabled domain. Every inbound frame is classified
//! once, at the transport boundary, into an [`Inbound`] variant.
//!
//! # Inbound Classification
//!
//! | Shape | Variant |
//! |-------|---------|
//! | `{"method": "...", "params": {...}}` | [`Inbound::Notification`] |
//! | `{"id": N, "result" \| "error": ...}` | [`Inbound::Response`] |
//! | anything else | [`Inbound::Malformed`] |

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::Result;

use super::Response;

// ============================================================================
// Notification
// ============================================================================

/// A notification from the DevTools server.
///
/// # Format
///
/// ```json
/// {
///   "method": "Domain.eventName",
///   "params": { ... }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Event name in `Domain.eventName` format.
    pub method: String,

    /// Event-specific data.
    #[serde(default)]
    pub params: Value,
}

impl Notification {
    /// Creates a notification.
    #[inline]
    #[must_use]
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }

    /// Returns the domain name from the method.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let n = Notification::new("Network.requestWillBeSent", Value::Null);
    /// assert_eq!(n.domain(), "Network");
    /// ```
    #[inline]
    #[must_use]
    pub fn domain(&self) -> &str {
        domain_of(&self.method)
    }

    /// Returns the event name from the method.
    #[inline]
    #[must_use]
    pub fn event_name(&self) -> &str {
        self.method.split_once('.').map(|(_, e)| e).unwrap_or_default()
    }

    /// Gets a string param.
    ///
    /// Returns `None` if the key is missing, not a string, or empty.
    #[inline]
    #[must_use]
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Returns the notification as a JSON value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        json!({ "method": self.method, "params": self.params })
    }
}

/// Returns the domain part of a `Domain.member` name.
///
/// A name without separator is a domain name itself.
#[inline]
#[must_use]
pub fn domain_of(name: &str) -> &str {
    name.split_once('.').map_or(name, |(domain, _)| domain)
}

// ============================================================================
// Inbound
// ============================================================================

/// A classified inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Response to a request.
    Response(Response),
    /// Server notification.
    Notification(Notification),
    /// Message matching neither shape.
    Malformed(Value),
}

impl Inbound {
    /// Parses and classifies one text frame.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Json`] if the text is not JSON.
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Ok(Self::classify(value))
    }

    /// Classifies a parsed JSON message.
    #[must_use]
    pub fn classify(value: Value) -> Self {
        if value.get("method").is_some() {
            return match serde_json::from_value::<Notification>(value.clone()) {
                Ok(notification) => Self::Notification(notification),
                Err(_) => Self::Malformed(value),
            };
        }

        if value.get("id").is_some() {
            return match serde_json::from_value::<Response>(value.clone()) {
                Ok(response) => Self::Response(response),
                Err(_) => Self::Malformed(value),
            };
        }

        Self::Malformed(value)
    }

    /// Returns the domain of a notification.
    #[inline]
    #[must_use]
    pub fn notification_domain(&self) -> Option<&str> {
        match self {
            Self::Notification(n) => Some(n.domain()),
            _ => None,
        }
    }
}

impl From<Notification> for Inbound {
    fn from(notification: Notification) -> Self {
        Self::Notification(notification)
    }
}

impl From<Response> for Inbound {
    fn from(response: Response) -> Self {
        Self::Response(response)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifiers::RequestId;

    #[test]
    fn test_notification_domain_and_name() {
        let n = Notification::new("Network.requestWillBeSent", Value::Null);
        assert_eq!(n.domain(), "Network");
        assert_eq!(n.event_name(), "requestWillBeSent");
    }

    #[test]
    fn test_domain_of_bare_name() {
        assert_eq!(domain_of("Tracing"), "Tracing");
        assert_eq!(domain_of("Tracing.end"), "Tracing");
    }

    #[test]
    fn test_param_str_filters_empty() {
        let n = Notification::new("Tracing.tracingComplete", json!({"stream": ""}));
        assert_eq!(n.param_str("stream"), None);

        let n = Notification::new("Tracing.tracingComplete", json!({"stream": "3"}));
        assert_eq!(n.param_str("stream"), Some("3"));
    }

    #[test]
    fn test_classify_notification() {
        let inbound = Inbound::parse(r#"{"method": "Page.loadEventFired", "params": {"timestamp": 1.5}}"#)
            .expect("parse");
        assert_eq!(inbound.notification_domain(), Some("Page"));
    }

    #[test]
    fn test_classify_notification_without_params() {
        let inbound = Inbound::parse(r#"{"method": "Inspector.detached"}"#).expect("parse");
        match inbound {
            Inbound::Notification(n) => assert_eq!(n.params, Value::Null),
            other => panic!("Expected notification, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_response() {
        let inbound = Inbound::parse(r#"{"id": 9, "result": {}}"#).expect("parse");
        match inbound {
            Inbound::Response(r) => assert_eq!(r.id, Some(RequestId::new(9))),
            other => panic!("Expected response, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_malformed() {
        let inbound = Inbound::parse(r#"{"params": {}}"#).expect("parse");
        assert!(matches!(inbound, Inbound::Malformed(_)));

        let inbound = Inbound::parse(r#"{"method": 12}"#).expect("parse");
        assert!(matches!(inbound, Inbound::Malformed(_)));
    }

    #[test]
    fn test_parse_invalid_json() {
        assert!(Inbound::parse("not json").is_err());
    }
}
