//! Session configuration.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use devtools_monitor::SessionOptions;
//!
//! let options = SessionOptions::new()
//!     .with_port(9333)
//!     .with_monitor_timeout(Duration::from_secs(30));
//!
//! assert_eq!(options.port, 9333);
//! assert!(options.validate().is_ok());
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::{Error, Result};
use crate::session::stream::DEFAULT_CHUNK_SIZE;
use crate::transport::connection::DEFAULT_REQUEST_TIMEOUT;

// ============================================================================
// Constants
// ============================================================================

/// Default DevTools host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default DevTools port.
pub const DEFAULT_PORT: u16 = 9222;

/// Default monitoring timeout.
pub const DEFAULT_MONITOR_TIMEOUT: Duration = Duration::from_secs(10);

/// Default trace drain timeout. Flushing a trace can take minutes.
pub const DEFAULT_TRACING_TIMEOUT: Duration = Duration::from_secs(300);

/// URL of a freshly created target.
pub const BLANK_URL: &str = "about:blank";

// ============================================================================
// SessionOptions
// ============================================================================

/// Configuration of a [`crate::Session`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// DevTools HTTP host.
    pub host: String,

    /// DevTools HTTP port.
    pub port: u16,

    /// Silence after which monitoring ends.
    pub monitor_timeout: Duration,

    /// Silence after which trace draining ends.
    pub tracing_timeout: Duration,

    /// Timeout of one synchronous request.
    pub request_timeout: Duration,

    /// Bytes requested per `IO.read`.
    pub stream_chunk_size: usize,

    /// URL the target must be at when connecting.
    pub blank_url: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            monitor_timeout: DEFAULT_MONITOR_TIMEOUT,
            tracing_timeout: DEFAULT_TRACING_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            stream_chunk_size: DEFAULT_CHUNK_SIZE,
            blank_url: BLANK_URL.to_string(),
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl SessionOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the host.
    #[inline]
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the port.
    #[inline]
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the monitoring timeout.
    #[inline]
    #[must_use]
    pub fn with_monitor_timeout(mut self, timeout: Duration) -> Self {
        self.monitor_timeout = timeout;
        self
    }

    /// Sets the trace drain timeout.
    #[inline]
    #[must_use]
    pub fn with_tracing_timeout(mut self, timeout: Duration) -> Self {
        self.tracing_timeout = timeout;
        self
    }

    /// Sets the request timeout.
    #[inline]
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the `IO.read` chunk size.
    #[inline]
    #[must_use]
    pub fn with_stream_chunk_size(mut self, size: usize) -> Self {
        self.stream_chunk_size = size;
        self
    }

    /// Sets the expected initial URL of the target.
    #[inline]
    #[must_use]
    pub fn with_blank_url(mut self, url: impl Into<String>) -> Self {
        self.blank_url = url.into();
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl SessionOptions {
    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::config("host must not be empty"));
        }
        if self.port == 0 {
            return Err(Error::config("port must not be 0"));
        }
        if self.stream_chunk_size == 0 {
            return Err(Error::config("stream_chunk_size must be positive"));
        }
        if self.monitor_timeout.is_zero() || self.tracing_timeout.is_zero() {
            return Err(Error::config("timeouts must be positive"));
        }
        if self.request_timeout.is_zero() {
            return Err(Error::config("request_timeout must be positive"));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = SessionOptions::default();
        assert_eq!(options.host, "127.0.0.1");
        assert_eq!(options.port, 9222);
        assert_eq!(options.monitor_timeout.as_secs(), 10);
        assert_eq!(options.tracing_timeout.as_secs(), 300);
        assert_eq!(options.stream_chunk_size, 32768);
        assert_eq!(options.blank_url, "about:blank");
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_builder_methods() {
        let options = SessionOptions::new()
            .with_host("10.0.0.2")
            .with_port(9333)
            .with_tracing_timeout(Duration::from_secs(60))
            .with_stream_chunk_size(1024)
            .with_blank_url("chrome://newtab/");

        assert_eq!(options.host, "10.0.0.2");
        assert_eq!(options.port, 9333);
        assert_eq!(options.tracing_timeout.as_secs(), 60);
        assert_eq!(options.stream_chunk_size, 1024);
        assert_eq!(options.blank_url, "chrome://newtab/");
    }

    #[test]
    fn test_validate_rejects_zero_port() {
        let err = SessionOptions::new().with_port(0).validate().expect_err("invalid");
        assert!(err.to_string().contains("port"));
    }

    #[test]
    fn test_validate_rejects_zero_chunk() {
        assert!(SessionOptions::new().with_stream_chunk_size(0).validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_host() {
        assert!(SessionOptions::new().with_host(" ").validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let options = SessionOptions::new().with_monitor_timeout(Duration::ZERO);
        assert!(options.validate().is_err());
    }
}
