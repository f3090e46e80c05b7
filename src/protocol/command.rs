//! Command definitions organized by domain.
//!
//! Commands follow the `Domain.method` format of the DevTools protocol.
//! Only the commands the session issues itself are typed; anything else
//! (domain enable/disable, scoped state methods, caller requests) goes
//! through [`CustomCommand`].
//!
//! # Command Domains
//!
//! | Domain | Commands |
//! |--------|----------|
//! | `Page` | `navigate` |
//! | `IO` | `read`, `close` |
//! | `Tracing` | `end` |
//! | `Runtime` | `evaluate` |
//! | `Network` | `canClearBrowserCache`, `clearBrowserCache` |

// ============================================================================
// Imports
// ============================================================================

use serde::Serialize;
use serde_json::Value;

use crate::identifiers::StreamHandle;

// ============================================================================
// Command Wrapper
// ============================================================================

/// All protocol commands organized by domain.
///
/// This enum wraps domain-specific command enums for unified serialization.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Command {
    /// Page domain commands.
    Page(PageCommand),
    /// IO domain commands.
    Io(IoCommand),
    /// Tracing domain commands.
    Tracing(TracingCommand),
    /// Runtime domain commands.
    Runtime(RuntimeCommand),
    /// Network domain commands.
    Network(NetworkCommand),
    /// Any other method, with free-form params.
    Custom(CustomCommand),
}

impl Command {
    /// Creates a command for an arbitrary method.
    ///
    /// `null` and empty-object params are dropped from the wire message.
    #[must_use]
    pub fn custom(method: impl Into<String>, params: Option<Value>) -> Self {
        let params = params.filter(|p| match p {
            Value::Null => false,
            Value::Object(map) => !map.is_empty(),
            _ => true,
        });
        Self::Custom(CustomCommand {
            method: method.into(),
            params,
        })
    }

    /// Creates a `<domain>.enable` command.
    #[inline]
    #[must_use]
    pub fn enable(domain: &str) -> Self {
        Self::custom(format!("{domain}.enable"), None)
    }

    /// Creates a `<domain>.disable` command.
    #[inline]
    #[must_use]
    pub fn disable(domain: &str) -> Self {
        Self::custom(format!("{domain}.disable"), None)
    }

    /// Returns the wire method name.
    #[must_use]
    pub fn method(&self) -> &str {
        match self {
            Self::Page(PageCommand::Navigate { .. }) => "Page.navigate",
            Self::Io(IoCommand::Read { .. }) => "IO.read",
            Self::Io(IoCommand::Close { .. }) => "IO.close",
            Self::Tracing(TracingCommand::End) => "Tracing.end",
            Self::Runtime(RuntimeCommand::Evaluate { .. }) => "Runtime.evaluate",
            Self::Network(NetworkCommand::CanClearBrowserCache) => "Network.canClearBrowserCache",
            Self::Network(NetworkCommand::ClearBrowserCache) => "Network.clearBrowserCache",
            Self::Custom(custom) => &custom.method,
        }
    }

    /// Returns the serialized params, or `Value::Null` when there are none.
    #[must_use]
    pub fn params(&self) -> Value {
        serde_json::to_value(self)
            .ok()
            .and_then(|mut v| v.get_mut("params").map(Value::take))
            .unwrap_or(Value::Null)
    }
}

// ============================================================================
// Page Commands
// ============================================================================

/// Page domain commands.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "method", content = "params")]
pub enum PageCommand {
    /// Navigate the target to a URL.
    #[serde(rename = "Page.navigate")]
    Navigate {
        /// URL to navigate to.
        url: String,
    },
}

// ============================================================================
// IO Commands
// ============================================================================

/// IO domain commands for server-side streams.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "method", content = "params")]
pub enum IoCommand {
    /// Read one chunk from a stream.
    #[serde(rename = "IO.read")]
    Read {
        /// Stream to read from.
        handle: StreamHandle,
        /// Maximum number of bytes to read.
        size: usize,
    },

    /// Release a stream.
    #[serde(rename = "IO.close")]
    Close {
        /// Stream to close.
        handle: StreamHandle,
    },
}

// ============================================================================
// Tracing Commands
// ============================================================================

/// Tracing domain commands.
///
/// `Tracing.start` is issued by callers since its filtering and output
/// configuration is theirs to decide.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "method", content = "params")]
pub enum TracingCommand {
    /// Stop trace collection and flush.
    #[serde(rename = "Tracing.end")]
    End,
}

// ============================================================================
// Runtime Commands
// ============================================================================

/// Runtime domain commands.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "method", content = "params")]
pub enum RuntimeCommand {
    /// Evaluate a JavaScript expression in the page.
    #[serde(rename = "Runtime.evaluate")]
    Evaluate {
        /// Expression to evaluate.
        expression: String,
        /// Return the result by value instead of a remote object.
        #[serde(rename = "returnByValue")]
        return_by_value: bool,
    },
}

// ============================================================================
// Network Commands
// ============================================================================

/// Network domain commands.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "method", content = "params")]
pub enum NetworkCommand {
    /// Ask whether the browser cache can be cleared.
    #[serde(rename = "Network.canClearBrowserCache")]
    CanClearBrowserCache,

    /// Clear the browser cache.
    #[serde(rename = "Network.clearBrowserCache")]
    ClearBrowserCache,
}

// ============================================================================
// CustomCommand
// ============================================================================

/// A command for a method without a typed variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomCommand {
    /// Method name in `Domain.method` format.
    pub method: String,
    /// Optional params object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_page_navigate() {
        let cmd = Command::Page(PageCommand::Navigate {
            url: "http://example.test".to_string(),
        });
        let value = serde_json::to_value(&cmd).expect("serialize");
        assert_eq!(
            value,
            json!({"method": "Page.navigate", "params": {"url": "http://example.test"}})
        );
        assert_eq!(cmd.method(), "Page.navigate");
    }

    #[test]
    fn test_tracing_end_has_no_params() {
        let cmd = Command::Tracing(TracingCommand::End);
        let value = serde_json::to_value(&cmd).expect("serialize");
        assert_eq!(value, json!({"method": "Tracing.end"}));
        assert_eq!(cmd.params(), Value::Null);
    }

    #[test]
    fn test_io_read() {
        let cmd = Command::Io(IoCommand::Read {
            handle: StreamHandle::new("5"),
            size: 32768,
        });
        assert_eq!(cmd.params(), json!({"handle": "5", "size": 32768}));
        assert_eq!(cmd.method(), "IO.read");
    }

    #[test]
    fn test_runtime_evaluate() {
        let cmd = Command::Runtime(RuntimeCommand::Evaluate {
            expression: "1 + 1".to_string(),
            return_by_value: true,
        });
        let json = serde_json::to_string(&cmd).expect("serialize");
        assert!(json.contains("Runtime.evaluate"));
        assert!(json.contains("returnByValue"));
    }

    #[test]
    fn test_custom_drops_empty_params() {
        let cmd = Command::custom("Emulation.clearDeviceMetricsOverride", Some(json!({})));
        let value = serde_json::to_value(&cmd).expect("serialize");
        assert_eq!(
            value,
            json!({"method": "Emulation.clearDeviceMetricsOverride"})
        );
    }

    #[test]
    fn test_enable_disable() {
        assert_eq!(Command::enable("Network").method(), "Network.enable");
        assert_eq!(Command::disable("Page").method(), "Page.disable");
    }
}
