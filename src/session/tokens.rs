//! Token scraping from the server-rendered page.
//!
//! The LiveView handshake needs four values that only exist in the HTML of
//! the page hosting the view:
//!
//! | Token | Source |
//! |-------|--------|
//! | CSRF | `<meta name="csrf-token" content="...">` |
//! | session | `data-phx-session="..."` |
//! | static | `data-phx-static="..."` |
//! | element id | first `id="..."` containing `phx-` |
//!
//! Each value is extracted independently; a missing one never blocks the
//! others.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use reqwest::header::{ACCEPT, COOKIE, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::redirect::Policy;
use tracing::{debug, warn};

use crate::error::{Error, Result};

use super::SessionConfig;

// ============================================================================
// Patterns
// ============================================================================

static CSRF_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<meta\s+name="csrf-token"\s+content="([^"]+)""#).expect("valid CSRF pattern")
});

static SESSION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"data-phx-session="([^"]+)""#).expect("valid session pattern"));

static STATIC_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"data-phx-static="([^"]+)""#).expect("valid static pattern"));

static ELEMENT_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\sid="([^"]*phx-[^"]*)""#).expect("valid element id pattern"));

/// Accept header of a browser navigation.
const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

// ============================================================================
// Tokens
// ============================================================================

/// Tokens scraped from the LiveView page.
///
/// Every field is optional; the session decides which ones are required.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Tokens {
    /// CSRF token.
    pub csrf: Option<String>,
    /// Signed session token.
    pub session: Option<String>,
    /// Signed static token.
    pub static_token: Option<String>,
    /// DOM id of the LiveView root element.
    pub element_id: Option<String>,
}

impl fmt::Debug for Tokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tokens")
            .field("csrf", &self.csrf.is_some())
            .field("session", &self.session.is_some())
            .field("static_token", &self.static_token.is_some())
            .field("element_id", &self.element_id)
            .finish()
    }
}

impl Tokens {
    /// Extracts all tokens from an HTML document.
    #[must_use]
    pub fn from_html(html: &str) -> Self {
        Self {
            csrf: capture(&CSRF_PATTERN, html),
            session: capture(&SESSION_PATTERN, html),
            static_token: capture(&STATIC_PATTERN, html),
            element_id: capture(&ELEMENT_ID_PATTERN, html),
        }
    }

    /// Returns the session token or an empty string.
    #[inline]
    #[must_use]
    pub fn session_or_empty(&self) -> &str {
        self.session.as_deref().unwrap_or_default()
    }

    /// Returns the static token or an empty string.
    #[inline]
    #[must_use]
    pub fn static_or_empty(&self) -> &str {
        self.static_token.as_deref().unwrap_or_default()
    }
}

fn capture(pattern: &Regex, html: &str) -> Option<String> {
    pattern
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

// ============================================================================
// TokenScraper
// ============================================================================

/// Fetches the LiveView page and scrapes its tokens.
#[derive(Debug, Clone)]
pub struct TokenScraper {
    client: reqwest::Client,
    page_url: String,
    user_agent: String,
}

impl TokenScraper {
    /// Creates a scraper for the configured page.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Network`] if the HTTP client cannot be built.
    pub fn new(config: &SessionConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .timeout(config.http_timeout())
            .build()
            .map_err(|e| Error::network(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            page_url: config.page_url(),
            user_agent: config.user_agent().to_string(),
        })
    }

    /// Fetches the page with `cookie` and extracts its tokens.
    ///
    /// A redirect yields empty [`Tokens`] and a warning; the caller decides
    /// whether that is fatal.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Network`] on transport failure only.
    pub async fn fetch_tokens(&self, cookie: &str) -> Result<Tokens> {
        let headers = self.headers(cookie)?;

        let response = self
            .client
            .get(&self.page_url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| Error::network(format!("GET {} failed: {e}", self.page_url)))?;

        let status = response.status();
        debug!(status = status.as_u16(), url = %self.page_url, "Token page fetched");

        if status.is_redirection() {
            warn!(
                status = status.as_u16(),
                "Token page redirected; authentication may have expired"
            );
            return Ok(Tokens::default());
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::network(format!("Failed to read token page: {e}")))?;

        let tokens = Tokens::from_html(&body);
        debug!(?tokens, "Tokens scraped");

        Ok(tokens)
    }

    fn headers(&self, cookie: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_str(cookie)
                .map_err(|_| Error::config("Cookie contains invalid header characters"))?,
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&self.user_agent)
                .map_err(|_| Error::config("User agent contains invalid header characters"))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
        Ok(headers)
    }
}

// ============================================================================
// Tests
// ============================================================================
