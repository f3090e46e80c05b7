//! Builder pattern for session configuration.
//!
//! Provides a fluent API for configuring and connecting a [`Session`].
//!
//! # Example
//!
//! ```no_run
//! use devtools_monitor::Session;
//!
//! # async fn example() -> devtools_monitor::Result<()> {
//! let session = Session::builder()
//!     .host("127.0.0.1")
//!     .port(9222)
//!     .connect()
//!     .await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::Result;
use crate::transport::WebSocketTransport;

use super::core::Session;
use super::options::SessionOptions;

// ============================================================================
// SessionBuilder
// ============================================================================

/// Builder for configuring a [`Session`].
///
/// Use [`Session::builder()`] to create a new builder.
#[derive(Debug, Default, Clone)]
pub struct SessionBuilder {
    options: SessionOptions,
}

impl SessionBuilder {
    /// Creates a builder with default options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the DevTools host.
    #[inline]
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.options.host = host.into();
        self
    }

    /// Sets the DevTools port.
    #[inline]
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.options.port = port;
        self
    }

    /// Sets the default monitoring timeout.
    #[inline]
    #[must_use]
    pub fn monitor_timeout(mut self, timeout: Duration) -> Self {
        self.options.monitor_timeout = timeout;
        self
    }

    /// Sets the trace drain timeout.
    #[inline]
    #[must_use]
    pub fn tracing_timeout(mut self, timeout: Duration) -> Self {
        self.options.tracing_timeout = timeout;
        self
    }

    /// Sets the request timeout.
    #[inline]
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.options.request_timeout = timeout;
        self
    }

    /// Replaces all options.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    /// Returns the validated options.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] if the options are invalid.
    pub fn build_options(self) -> Result<SessionOptions> {
        self.options.validate()?;
        Ok(self.options)
    }

    /// Discovers the target and connects.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::Config`] if the options are invalid
    /// - [`crate::Error::Connection`] if bootstrap fails
    pub async fn connect(self) -> Result<Session<WebSocketTransport>> {
        Session::connect(self.build_options()?).await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_has_defaults() {
        let options = SessionBuilder::new().build_options().expect("valid");
        assert_eq!(options, SessionOptions::default());
    }

    #[test]
    fn test_setters() {
        let options = SessionBuilder::new()
            .host("localhost")
            .port(9333)
            .monitor_timeout(Duration::from_secs(5))
            .tracing_timeout(Duration::from_secs(20))
            .request_timeout(Duration::from_secs(2))
            .build_options()
            .expect("valid");

        assert_eq!(options.host, "localhost");
        assert_eq!(options.port, 9333);
        assert_eq!(options.monitor_timeout.as_secs(), 5);
        assert_eq!(options.tracing_timeout.as_secs(), 20);
        assert_eq!(options.request_timeout.as_secs(), 2);
    }

    #[test]
    fn test_invalid_options_rejected() {
        let result = SessionBuilder::new().port(0).build_options();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_connect_fails_fast_on_invalid_options() {
        let err = SessionBuilder::new()
            .host("")
            .connect()
            .await
            .expect_err("invalid");
        assert!(err.is_usage_error());
    }
}
