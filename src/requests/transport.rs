//! The remote-call seam: requests go out through a [`Transport`], responses come
//! back with their rate-limit metadata attached.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use super::route::{CompiledRoute, Method};
use crate::config::ClientConfig;
use crate::error::{ClientError, RemoteError, Result};

/// A request ready to be dispatched
#[derive(Debug, Clone)]
pub struct Request {
    pub id: Uuid,
    pub route: CompiledRoute,
    pub body: Option<Value>,
    /// Audit log reason
    pub reason: Option<String>,
}

/// Rate-limit metadata reported with a response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateLimitInfo {
    pub remaining: Option<u32>,
    pub reset_after: Option<Duration>,
    /// Opaque bucket hash assigned by the remote side
    pub bucket: Option<String>,
    pub global: bool,
    pub retry_after: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub body: Value,
    pub rate_limit: RateLimitInfo,
}

impl Response {
    pub fn new(status: u16, body: Value) -> Self {
        Self {
            status,
            body,
            rate_limit: RateLimitInfo::default(),
        }
    }

    pub fn ok(body: Value) -> Self {
        Self::new(200, body)
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimitInfo) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status == 429
    }

    /// How long the remote side asked us to back off after a 429
    pub fn retry_after(&self) -> Option<Duration> {
        self.rate_limit.retry_after.or_else(|| {
            self.body
                .get("retry_after")
                .and_then(Value::as_f64)
                .filter(|s| s.is_finite() && *s >= 0.0)
                .map(Duration::from_secs_f64)
        })
    }

    pub fn is_global(&self) -> bool {
        self.rate_limit.global
            || self
                .body
                .get("global")
                .and_then(Value::as_bool)
                .unwrap_or(false)
    }

    /// Classify the response into a payload or a remote error
    pub fn into_result(self) -> Result<Value> {
        if self.is_success() {
            return Ok(self.body);
        }

        let message = self
            .body
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("status {}", self.status));

        let err = match self.status {
            403 => RemoteError::PermissionDenied { message },
            404 => RemoteError::NotFound { message },
            409 => RemoteError::Conflict { message },
            429 => RemoteError::RateLimited {
                retry_after: self.retry_after().unwrap_or_default(),
                global: self.is_global(),
            },
            status => RemoteError::Http { status, message },
        };
        Err(err.into())
    }
}

/// Opaque remote-call capability
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: &Request) -> Result<Response>;
}

/// [`Transport`] over HTTPS using `reqwest`
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(token: &str, config: &ClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bot {}", token))
            .map_err(|_| ClientError::invalid_parameter("token", "contains invalid characters"))?;
        headers.insert(AUTHORIZATION, auth);
        let agent = HeaderValue::from_str(&config.user_agent)
            .map_err(|_| ClientError::invalid_parameter("user_agent", "contains invalid characters"))?;
        headers.insert(USER_AGENT, agent);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: &Request) -> Result<Response> {
        let url = format!("{}{}", self.base_url, request.route.path());
        let method = match request.route.method() {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self.client.request(method, &url);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(reason) = &request.reason {
            builder = builder.header("X-Audit-Log-Reason", urlencoding::encode(reason).into_owned());
        }

        debug!("[{}] {}", request.id, request.route);
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let rate_limit = parse_rate_limit(response.headers());
        let bytes = response.bytes().await?;

        Ok(Response {
            status,
            body: decode_body(status, &bytes)?,
            rate_limit,
        })
    }
}

/// Successful bodies must be JSON. Error bodies from proxies may be text or
/// HTML, and are kept as the message so the status still classifies.
fn decode_body(status: u16, bytes: &[u8]) -> Result<Value> {
    if bytes.is_empty() {
        return Ok(Value::Null);
    }
    if (200..300).contains(&status) {
        return Ok(serde_json::from_slice(bytes)?);
    }
    Ok(serde_json::from_slice(bytes).unwrap_or_else(|_| {
        let text = String::from_utf8_lossy(bytes);
        serde_json::json!({ "message": text.trim() })
    }))
}

fn parse_rate_limit(headers: &HeaderMap) -> RateLimitInfo {
    let text = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let seconds = |name: &str| {
        text(name)
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|s| s.is_finite() && *s >= 0.0)
            .map(Duration::from_secs_f64)
    };

    RateLimitInfo {
        remaining: text("x-ratelimit-remaining").and_then(|v| v.parse().ok()),
        reset_after: seconds("x-ratelimit-reset-after"),
        bucket: text("x-ratelimit-bucket").map(str::to_string),
        global: text("x-ratelimit-global").map(|v| v == "true").unwrap_or(false),
        retry_after: seconds("retry-after"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_classify_statuses() {
        assert!(Response::ok(json!({})).into_result().is_ok());
        assert!(Response::new(204, Value::Null).into_result().is_ok());

        let not_found = Response::new(404, json!({ "message": "Unknown Message", "code": 10008 }));
        assert!(matches!(
            not_found.into_result(),
            Err(ClientError::Remote(RemoteError::NotFound { ref message })) if message == "Unknown Message"
        ));
        assert!(matches!(
            Response::new(403, json!({})).into_result(),
            Err(ClientError::Remote(RemoteError::PermissionDenied { .. }))
        ));
        assert!(matches!(
            Response::new(409, json!({})).into_result(),
            Err(ClientError::Remote(RemoteError::Conflict { .. }))
        ));
        assert!(matches!(
            Response::new(502, json!({})).into_result(),
            Err(ClientError::Remote(RemoteError::Http { status: 502, .. }))
        ));
    }

    #[test]
    fn test_retry_after_from_body() {
        let limited = Response::new(429, json!({ "retry_after": 0.5, "global": true }));
        assert_eq!(limited.retry_after(), Some(Duration::from_millis(500)));
        assert!(limited.is_global());
    }

    #[test]
    fn test_non_json_error_body_keeps_status() {
        let body = decode_body(429, b"rate limited").unwrap();
        assert_eq!(body, json!({ "message": "rate limited" }));
        assert!(Response::new(429, body).is_rate_limited());

        let html = decode_body(403, b"<html>Forbidden</html>").unwrap();
        assert!(matches!(
            Response::new(403, html).into_result(),
            Err(ClientError::Remote(RemoteError::PermissionDenied { ref message })) if message == "<html>Forbidden</html>"
        ));

        assert!(matches!(
            decode_body(200, b"not json"),
            Err(ClientError::Deserialization { .. })
        ));
        assert_eq!(decode_body(204, b"").unwrap(), Value::Null);
    }

    /// Serves one canned HTTP response per connection, in order
    async fn serve(responses: Vec<&'static str>) -> std::net::SocketAddr {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            for response in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = socket.read(&mut buf).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    request.extend_from_slice(&buf[..n]);
                }
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.unwrap();
            }
        });
        addr
    }

    #[tokio::test]
    async fn test_http_transport_retries_plain_text_rate_limit() {
        let addr = serve(vec![
            "HTTP/1.1 429 Too Many Requests\r\nContent-Type: text/plain\r\nRetry-After: 0\r\nContent-Length: 12\r\nConnection: close\r\n\r\nrate limited",
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 10\r\nConnection: close\r\n\r\n{\"id\":\"1\"}",
        ])
        .await;

        let config = ClientConfig {
            api_base_url: format!("http://{}", addr),
            global_backoff_ms: 10,
            ..ClientConfig::default()
        };
        let transport = Arc::new(HttpTransport::new("token", &config).unwrap());
        let validator = crate::permissions::AccessValidator::new(crate::testing::fixture_registry());
        let requester = crate::requests::create_shared_requester(transport, validator, &config);

        let route = crate::requests::route::channels::CROSSPOST_MESSAGE
            .compile(&[("channel_id", "100"), ("message_id", "1")])
            .unwrap();
        let value = requester.action(route, Ok).complete().await.unwrap();
        assert_eq!(value, json!({ "id": "1" }));
    }

    #[test]
    fn test_parse_rate_limit_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
        headers.insert("x-ratelimit-reset-after", HeaderValue::from_static("1.250"));
        headers.insert("x-ratelimit-bucket", HeaderValue::from_static("abcd1234"));

        let info = parse_rate_limit(&headers);
        assert_eq!(info.remaining, Some(0));
        assert_eq!(info.reset_after, Some(Duration::from_millis(1250)));
        assert_eq!(info.bucket.as_deref(), Some("abcd1234"));
        assert!(!info.global);
    }
}
