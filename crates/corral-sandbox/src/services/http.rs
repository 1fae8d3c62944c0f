//! Authenticated HTTP API client service.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Url};
use serde_json::Value;
use tracing::debug;

use super::Service;
use crate::error::{SandboxError, SandboxResult, ServiceError};

const METHODS: &[&str] = &["get", "post", "put", "patch", "delete"];

/// Longest error body kept in a [`ServiceError::Status`].
const MAX_ERROR_BODY: usize = 512;

/// Settings for an [`HttpService`].
#[derive(Debug, Clone)]
pub struct HttpServiceConfig {
    /// Every request path is resolved against, and confined to, this URL.
    pub base_url: String,
    /// Sent as `Authorization: Bearer <token>`.
    pub token: Option<String>,
    /// Extra headers sent with every request.
    pub headers: BTreeMap<String, String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl HttpServiceConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            headers: BTreeMap::new(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Client for one HTTP API, credentials pre-applied.
///
/// Scripts pass either a path (`api.get("/items")`) or a map
/// `#{ path, query, body }`. Paths are resolved against the base URL and
/// anything that would leave it (another host, another scheme, `..` above
/// the base path) is refused. Successful responses come back as parsed JSON,
/// or as a string when the body is not JSON.
#[derive(Debug, Clone)]
pub struct HttpService {
    base: Url,
    client: reqwest::Client,
}

impl HttpService {
    /// Build the client. `name` is only used in error messages.
    pub fn new(name: &str, config: HttpServiceConfig) -> SandboxResult<Self> {
        let init_error = |reason: String| SandboxError::ServiceInit {
            name: name.to_string(),
            reason,
        };

        let mut base = Url::parse(&config.base_url)
            .map_err(|e| init_error(format!("invalid base_url '{}': {e}", config.base_url)))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(init_error(format!("unsupported scheme '{}'", base.scheme())));
        }
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (key, value) in &config.headers {
            let header_name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|_| init_error(format!("invalid header name '{key}'")))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|_| init_error(format!("invalid value for header '{key}'")))?;
            headers.insert(header_name, header_value);
        }
        if let Some(token) = &config.token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| init_error("invalid token".to_string()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(format!("corral/{}", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(|e| init_error(e.to_string()))?;

        Ok(Self { base, client })
    }

    /// The normalized base URL (always ending in `/`).
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Resolve a script-supplied path, refusing anything outside the base.
    pub fn resolve(&self, method: &str, path: &str) -> Result<Url, ServiceError> {
        if path.contains("://") || path.starts_with("//") {
            return Err(ServiceError::invalid_arguments(
                method,
                "absolute URLs are not allowed; pass a path",
            ));
        }

        let url = self
            .base
            .join(path.trim_start_matches('/'))
            .map_err(|e| ServiceError::invalid_arguments(method, format!("bad path '{path}': {e}")))?;

        if url.origin() != self.base.origin() || !url.path().starts_with(self.base.path()) {
            return Err(ServiceError::invalid_arguments(
                method,
                format!("path '{path}' escapes the service base URL"),
            ));
        }
        Ok(url)
    }

    fn build_request(&self, method: &str, args: Value) -> Result<reqwest::RequestBuilder, ServiceError> {
        let verb = match method {
            "get" => Method::GET,
            "post" => Method::POST,
            "put" => Method::PUT,
            "patch" => Method::PATCH,
            "delete" => Method::DELETE,
            other => {
                return Err(ServiceError::UnknownMethod {
                    service: "http".to_string(),
                    method: other.to_string(),
                });
            }
        };

        let (path, query, body) = match args {
            Value::Null => (String::new(), None, None),
            Value::String(path) => (path, None, None),
            Value::Object(mut map) => {
                let path = match map.remove("path") {
                    Some(Value::String(path)) => path,
                    None => String::new(),
                    Some(_) => {
                        return Err(ServiceError::invalid_arguments(method, "'path' must be a string"));
                    }
                };
                (path, map.remove("query"), map.remove("body"))
            }
            _ => {
                return Err(ServiceError::invalid_arguments(
                    method,
                    "expected a path string or a map with path/query/body",
                ));
            }
        };

        let url = self.resolve(method, &path)?;
        let mut request = self.client.request(verb, url);

        match query {
            None | Some(Value::Null) => {}
            Some(Value::Object(pairs)) => {
                let pairs: Vec<(String, String)> = pairs
                    .into_iter()
                    .map(|(k, v)| {
                        let v = match v {
                            Value::String(s) => s,
                            other => other.to_string(),
                        };
                        (k, v)
                    })
                    .collect();
                request = request.query(&pairs);
            }
            Some(_) => return Err(ServiceError::invalid_arguments(method, "'query' must be a map")),
        }

        if let Some(body) = body {
            request = request.json(&body);
        }
        Ok(request)
    }
}

impl Service for HttpService {
    fn kind(&self) -> &str {
        "http"
    }

    fn methods(&self) -> &[&'static str] {
        METHODS
    }

    fn call(&self, method: &str, args: Value) -> Result<Value, ServiceError> {
        let request = self.build_request(method, args)?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| ServiceError::Request("no async runtime available".to_string()))?;

        let (status, text) = runtime.block_on(async move {
            let response = request
                .send()
                .await
                .map_err(|e| ServiceError::Request(e.to_string()))?;
            let status = response.status();
            let text = response
                .text()
                .await
                .map_err(|e| ServiceError::Request(e.to_string()))?;
            Ok::<_, ServiceError>((status, text))
        })?;

        debug!(method, status = status.as_u16(), bytes = text.len(), "http service response");

        if !status.is_success() {
            let mut body = text;
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        if text.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(base: &str) -> HttpService {
        HttpService::new("api", HttpServiceConfig::new(base)).unwrap()
    }

    #[test]
    fn test_base_url_normalized() {
        let api = service("https://api.example.com/v1");
        assert_eq!(api.base_url().as_str(), "https://api.example.com/v1/");
    }

    #[test]
    fn test_resolve_within_base() {
        let api = service("https://api.example.com/v1/");
        assert_eq!(
            api.resolve("get", "/items/7").unwrap().as_str(),
            "https://api.example.com/v1/items/7"
        );
        assert_eq!(
            api.resolve("get", "items?page=2").unwrap().as_str(),
            "https://api.example.com/v1/items?page=2"
        );
    }

    #[test]
    fn test_resolve_refuses_escapes() {
        let api = service("https://api.example.com/v1/");
        for path in [
            "https://evil.example.com/x",
            "//evil.example.com/x",
            "../admin",
            "/../../admin",
        ] {
            assert!(
                matches!(api.resolve("get", path), Err(ServiceError::InvalidArguments { .. })),
                "{path} should be refused"
            );
        }
    }

    #[test]
    fn test_construction_errors() {
        let err = HttpService::new("api", HttpServiceConfig::new("not a url")).unwrap_err();
        assert!(matches!(err, SandboxError::ServiceInit { ref name, .. } if name == "api"));

        let err = HttpService::new("api", HttpServiceConfig::new("ftp://example.com")).unwrap_err();
        assert!(err.to_string().contains("unsupported scheme"));

        let config = HttpServiceConfig::new("https://example.com").with_header("bad header", "x");
        assert!(HttpService::new("api", config).is_err());
    }

    #[test]
    fn test_request_argument_shapes() {
        let api = service("https://api.example.com/");
        assert!(api.build_request("get", Value::Null).is_ok());
        assert!(api.build_request("post", serde_json::json!({"path": "/x", "body": {"a": 1}})).is_ok());
        assert!(matches!(
            api.build_request("get", serde_json::json!({"path": 3})),
            Err(ServiceError::InvalidArguments { .. })
        ));
        assert!(matches!(
            api.build_request("get", serde_json::json!({"query": [1]})),
            Err(ServiceError::InvalidArguments { .. })
        ));
        assert!(matches!(
            api.build_request("head", Value::Null),
            Err(ServiceError::UnknownMethod { .. })
        ));
    }

    #[test]
    fn test_call_without_runtime_fails_cleanly() {
        let api = service("https://api.example.com/");
        let err = api.call("get", Value::String("/x".into())).unwrap_err();
        assert!(matches!(err, ServiceError::Request(_)));
    }
}
