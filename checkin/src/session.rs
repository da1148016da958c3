//! Authenticated browser session abstraction.
//!
//! Every console call is issued "from inside" a session that already carries the account's
//! cookies, so any anti-automation challenge solved for that session stays valid. The
//! [`BrowserSession`] trait is the seam: it takes a relative request, attaches the session
//! credential and the account-identity header, and hands back the raw response.
//!
//! [`ReqwestSession`] is the production implementation. Tests use
//! [`MockSession`](crate::test_utils::MockSession), which returns canned responses and records
//! every call.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, COOKIE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, instrument};
use url::Url;

use crate::config::ConsoleConfig;
use crate::errors::{Error, Result};
use crate::types::AccountIdentity;

/// A request relative to the console origin.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    pub method: Method,
    /// Path and query, e.g. `/api/token/?p=0&size=100`
    pub path: String,
    pub body: Option<Value>,
}

impl PageRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            body: Some(body),
        }
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::PUT,
            path: path.into(),
            body: Some(body),
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            method: Method::DELETE,
            path: path.into(),
            body: None,
        }
    }

    /// `"{METHOD} {path}"`, used for logging and mock lookups.
    pub fn key(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

/// Raw response seen by the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageResponse {
    pub status: u16,
    pub body: String,
}

impl PageResponse {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// A live, authenticated session for one account.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Issue one request with the session's credentials and identity header.
    ///
    /// # Errors
    /// Returns an error if the session is closed or the request fails in transport. HTTP error
    /// statuses are not errors; they are returned in the response.
    async fn fetch(&self, request: PageRequest) -> Result<PageResponse>;

    /// Release the session. Safe to call more than once.
    async fn close(&self);
}

/// Opens one independent session per account.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn open(&self, identity: &AccountIdentity) -> Result<Box<dyn BrowserSession>>;
}

/// Makes sure a url has a trailing slash.
///
/// Joining `/hello` with `world` gives `/world`, but `/hello/` with `world` gives
/// `/hello/world`. Call this before calling `.join`.
pub(crate) fn ensure_slash(url: &Url) -> Url {
    if url.path().ends_with('/') {
        url.clone()
    } else {
        let mut new_url = url.clone();
        let mut path = new_url.path().to_string();
        path.push('/');
        new_url.set_path(&path);
        new_url
    }
}

// ============================================================================
// Production Implementation using reqwest
// ============================================================================

/// Session backed by a dedicated `reqwest` client.
///
/// The credential is sent as a cookie and the account identifier as a header on every call.
pub struct ReqwestSession {
    client: Client,
    base_url: Url,
    account_id: String,
    closed: AtomicBool,
}

impl ReqwestSession {
    pub fn new(config: &ConsoleConfig, identity: &AccountIdentity) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/plain, */*"));

        let cookie = format!("{}={}", config.session_cookie, identity.credential().expose());
        let mut cookie = HeaderValue::from_str(&cookie).map_err(|e| Error::Session {
            message: format!("invalid session credential: {}", e),
        })?;
        cookie.set_sensitive(true);
        headers.insert(COOKIE, cookie);

        let header_name = HeaderName::from_bytes(config.identity_header.as_bytes()).map_err(|e| Error::Session {
            message: format!("invalid identity header name '{}': {}", config.identity_header, e),
        })?;
        let header_value = HeaderValue::from_str(identity.account_id()).map_err(|e| Error::Session {
            message: format!("invalid account id: {}", e),
        })?;
        headers.insert(header_name, header_value);

        let client = Client::builder()
            .default_headers(headers)
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Session {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: ensure_slash(&config.base_url),
            account_id: identity.account_id().to_string(),
            closed: AtomicBool::new(false),
        })
    }

    fn url_for(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| Error::InvalidRequest {
                message: format!("Failed to construct URL for {}: {}", path, e),
            })
    }
}

#[async_trait]
impl BrowserSession for ReqwestSession {
    #[instrument(skip(self, request), fields(account = %self.account_id, method = %request.method, path = %request.path))]
    async fn fetch(&self, request: PageRequest) -> Result<PageResponse> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Session {
                message: "session is closed".to_string(),
            });
        }

        let url = self.url_for(&request.path)?;
        let mut builder = self.client.request(request.method.clone(), url);
        if let Some(body) = &request.body {
            builder = builder.header(CONTENT_TYPE, "application/json").json(body);
        }

        let response = builder.send().await.map_err(|e| {
            tracing::warn!(error = %e, "Console request failed");
            Error::from(e)
        })?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!(status, response_len = body.len(), "Console request completed");

        Ok(PageResponse { status, body })
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(account = %self.account_id, "Session closed");
        }
    }
}

/// Opens a [`ReqwestSession`] per account from the console configuration.
pub struct ReqwestSessionProvider {
    config: ConsoleConfig,
}

impl ReqwestSessionProvider {
    pub fn new(config: ConsoleConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SessionProvider for ReqwestSessionProvider {
    async fn open(&self, identity: &AccountIdentity) -> Result<Box<dyn BrowserSession>> {
        Ok(Box::new(ReqwestSession::new(&self.config, identity)?))
    }
}
