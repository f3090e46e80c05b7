//! HTTP discovery of inspectable targets.
//!
//! The DevTools HTTP endpoint lists targets under `/json/list` and closes
//! them under `/json/close/{id}`.
//!
//! # Target Selection
//!
//! 1. `GET /json/list` must answer 200 with a JSON array of descriptors
//! 2. The first descriptor of type `page` is selected
//! 3. Its URL must be the blank sentinel (a fresh, not-yet-navigated tab)

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::TargetId;

// ============================================================================
// Constants
// ============================================================================

/// Prefix of every discovery path.
const JSON_PREFIX: &str = "/json";

/// Body returned by a successful close request.
const CLOSE_CONFIRMATION: &str = "Target is closing";

/// Target type selected at bootstrap.
const PAGE_TARGET_TYPE: &str = "page";

// ============================================================================
// TargetDescriptor
// ============================================================================

/// An inspectable target as listed by the discovery endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TargetDescriptor {
    /// Target identifier.
    pub id: TargetId,

    /// Target type (`page`, `service_worker`, ...).
    #[serde(rename = "type")]
    pub target_type: String,

    /// Current URL.
    #[serde(default)]
    pub url: String,

    /// Page title.
    #[serde(default)]
    pub title: String,

    /// Debugger WebSocket address. Absent when another client is attached.
    #[serde(rename = "webSocketDebuggerUrl", default)]
    pub web_socket_debugger_url: Option<String>,
}

impl TargetDescriptor {
    /// Returns `true` if this target is a page.
    #[inline]
    #[must_use]
    pub fn is_page(&self) -> bool {
        self.target_type == PAGE_TARGET_TYPE
    }
}

/// Selects the first page target and checks it sits on `blank_url`.
///
/// # Errors
///
/// - [`Error::Connection`] if there is no page target
/// - [`Error::Connection`] if the page was already navigated
/// - [`Error::Connection`] if the page has no debugger URL
pub fn select_page_target(
    targets: Vec<TargetDescriptor>,
    blank_url: &str,
) -> Result<TargetDescriptor> {
    let target = targets
        .into_iter()
        .find(TargetDescriptor::is_page)
        .ok_or_else(|| Error::connection("No page target found"))?;

    if target.url != blank_url {
        return Err(Error::connection(format!(
            "Target {} is at {}, expected {}",
            target.id, target.url, blank_url
        )));
    }

    if target.web_socket_debugger_url.is_none() {
        return Err(Error::connection(format!(
            "Target {} has no debugger URL (already attached?)",
            target.id
        )));
    }

    Ok(target)
}

// ============================================================================
// DiscoveryClient
// ============================================================================

/// Client for the DevTools HTTP endpoint.
#[derive(Debug, Clone)]
pub struct DiscoveryClient {
    /// `http://host:port/`.
    base: Url,
    /// HTTP client.
    http: reqwest::Client,
}

impl DiscoveryClient {
    /// Creates a client for `host:port`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the host does not form a valid URL.
    pub fn new(host: &str, port: u16) -> Result<Self> {
        let base = Url::parse(&format!("http://{host}:{port}/"))
            .map_err(|e| Error::config(format!("Invalid DevTools address {host}:{port}: {e}")))?;

        Ok(Self {
            base,
            http: reqwest::Client::new(),
        })
    }

    /// Returns the base URL.
    #[inline]
    #[must_use]
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Builds the URL of a discovery path such as `/list`.
    fn endpoint(&self, path: &str) -> Result<Url> {
        if !path.starts_with('/') {
            return Err(Error::config(format!("Discovery path must be absolute: {path}")));
        }

        self.base
            .join(&format!("{JSON_PREFIX}{path}"))
            .map_err(|e| Error::config(format!("Invalid discovery path {path}: {e}")))
    }

    /// Issues a GET and returns the body.
    ///
    /// # Errors
    ///
    /// - [`Error::Http`] if the request fails
    /// - [`Error::Connection`] if the status is not 200
    async fn get(&self, path: &str) -> Result<String> {
        let url = self.endpoint(path)?;
        debug!(url = %url, "DevTools HTTP request");

        let response = self.http.get(url).send().await?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(Error::connection(format!(
                "Cannot connect to DevTools, response code {}",
                status.as_u16()
            )));
        }

        Ok(response.text().await?)
    }

    /// Lists the inspectable targets.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the endpoint fails or the list is malformed.
    pub async fn list_targets(&self) -> Result<Vec<TargetDescriptor>> {
        let body = self.get("/list").await?;
        parse_target_list(&body)
    }

    /// Requests a target to close.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the server does not confirm.
    pub async fn close_target(&self, id: &TargetId) -> Result<()> {
        let path = format!("/close/{}", urlencoding::encode(id.as_str()));
        let body = self.get(&path).await?;

        if body.trim() != CLOSE_CONFIRMATION {
            return Err(Error::connection(format!(
                "Unexpected close response for {id}: {body}"
            )));
        }

        info!(target_id = %id, "Target closing");
        Ok(())
    }
}

/// Parses a `/json/list` body.
fn parse_target_list(body: &str) -> Result<Vec<TargetDescriptor>> {
    serde_json::from_str(body).map_err(|e| Error::connection(format!("Malformed target list: {e}")))
}

// ============================================================================
// Tests
// ============================================================================
