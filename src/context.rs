//! Caller-supplied execution context.
//!
//! The context carries injected dependencies for handlers: the HTTP client,
//! per-plugin base-URL overrides (used by tests to point a plugin at a mock
//! server), and an optional SQL connector. It has no lifecycle of its own; it
//! is passed through dispatch and never stored.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::{Result, TransportError, TransportErrorKind};
use crate::plugins::postgres::SqlConnector;
use crate::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};

#[derive(Clone)]
pub struct ExecutionContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    http: reqwest::Client,
    base_urls: HashMap<String, String>,
    sql: Option<Arc<dyn SqlConnector>>,
    request_timeout: Duration,
}

impl ExecutionContext {
    /// Context with default HTTP client and no overrides.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    pub fn builder() -> ExecutionContextBuilder {
        ExecutionContextBuilder::default()
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }

    /// Base URL for a plugin: the override registered for `plugin_id`, or
    /// `default_url`.
    pub fn base_url<'a>(&'a self, plugin_id: &str, default_url: &'a str) -> &'a str {
        self.base_override(plugin_id).unwrap_or(default_url)
    }

    /// The override registered for `plugin_id`, if any.
    pub fn base_override(&self, plugin_id: &str) -> Option<&str> {
        self.inner.base_urls.get(plugin_id).map(String::as_str)
    }

    pub fn request_timeout(&self) -> Duration {
        self.inner.request_timeout
    }

    pub fn sql_connector(&self) -> Option<Arc<dyn SqlConnector>> {
        self.inner.sql.clone()
    }
}

#[derive(Default)]
pub struct ExecutionContextBuilder {
    http: Option<reqwest::Client>,
    base_urls: HashMap<String, String>,
    sql: Option<Arc<dyn SqlConnector>>,
    connect_timeout: Option<Duration>,
    request_timeout: Option<Duration>,
}

impl ExecutionContextBuilder {
    /// Inject a pre-configured HTTP client (proxies, TLS, test transports).
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http = Some(client);
        self
    }

    /// Point one plugin at a different base URL. Trailing slashes are
    /// stripped so plugins can join paths uniformly.
    pub fn override_base_url(
        mut self,
        plugin_id: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        self.base_urls
            .insert(plugin_id.into(), url.into().trim_end_matches('/').to_string());
        self
    }

    pub fn sql_connector(mut self, connector: Arc<dyn SqlConnector>) -> Self {
        self.sql = Some(connector);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<ExecutionContext> {
        let request_timeout = self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        let http = match self.http {
            Some(client) => client,
            None => reqwest::Client::builder()
                .connect_timeout(self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT))
                .timeout(request_timeout)
                .build()
                .map_err(|err| TransportError {
                    kind: TransportErrorKind::Connect,
                    message: "failed to build http client".to_string(),
                    source: Some(err),
                })?,
        };
        Ok(ExecutionContext {
            inner: Arc::new(ContextInner {
                http,
                base_urls: self.base_urls,
                sql: self.sql,
                request_timeout,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_falls_back_to_default() {
        let ctx = ExecutionContext::builder()
            .override_base_url("github", "http://127.0.0.1:9999/")
            .build()
            .unwrap();
        assert_eq!(ctx.base_url("github", "https://api.github.com"), "http://127.0.0.1:9999");
        assert_eq!(ctx.base_url("s3", "https://example.com"), "https://example.com");
        assert!(ctx.base_override("s3").is_none());
    }
}
