//! HTTP transport for the Twingate API.
//!
//! [`HttpTransport`] posts JSON bodies with the API key, user agent and
//! correlation headers attached, and retries transient failures with
//! exponential backoff. The [`Transport`] trait is the seam the API client
//! talks to, so tests can swap in a scripted transport.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::error::TransportError;

/// Header carrying the API token.
pub const HEADER_API_KEY: &str = "X-Api-Key";
/// Header carrying the per-client correlation id.
pub const HEADER_CORRELATION_ID: &str = "X-Correlation-Id";
/// Header carrying the per-attempt request id.
pub const HEADER_REQUEST_ID: &str = "X-Twingate-Request-Id";

/// Agent name used in the user agent string.
pub const DEFAULT_AGENT: &str = "TF";

/// Concurrent requests allowed per client unless configured otherwise.
pub const DEFAULT_CONCURRENCY: usize = 3;

/// A JSON POST request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// Absolute URL.
    pub url: String,
    /// Extra headers for this request only.
    pub headers: Vec<(String, String)>,
    /// JSON body.
    pub body: Value,
}

impl HttpRequest {
    /// Create a request with no extra headers.
    pub fn new(url: impl Into<String>, body: Value) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            body,
        }
    }

    /// Add a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Sends requests to the Twingate API and returns the raw response body.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// POST the request and return the body of a `200 OK` response.
    async fn post(&self, request: HttpRequest) -> Result<String, TransportError>;
}

/// Retry settings for [`HttpTransport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one. Zero disables retries.
    pub max_retries: u32,
    /// Wait before the first retry.
    pub min_wait: Duration,
    /// Upper bound for any single wait.
    pub max_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 10,
            min_wait: Duration::from_secs(1),
            max_wait: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Policy with the default waits and the given retry count.
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Exponential backoff: `min_wait * 2^attempt`, capped at `max_wait`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1_u32 << attempt.min(20);
        self.min_wait
            .checked_mul(factor)
            .unwrap_or(self.max_wait)
            .min(self.max_wait)
    }

    /// Wait before the next attempt, preferring the server's `Retry-After`.
    pub fn delay(&self, attempt: u32, retry_after: Option<u64>) -> Duration {
        match retry_after {
            Some(secs) => Duration::from_secs(secs).min(self.max_wait),
            None => self.backoff(attempt),
        }
    }
}

/// reqwest-backed [`Transport`].
pub struct HttpTransport {
    client: reqwest::Client,
    api_token: String,
    user_agent: String,
    correlation_id: String,
    retry: RetryPolicy,
    limiter: Arc<Semaphore>,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("user_agent", &self.user_agent)
            .field("correlation_id", &self.correlation_id)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    /// Build a transport with a per-request timeout and retry policy.
    pub fn new(
        api_token: impl Into<String>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;

        Ok(Self {
            client,
            api_token: api_token.into(),
            user_agent: user_agent(DEFAULT_AGENT, env!("CARGO_PKG_VERSION")),
            correlation_id: uuid::Uuid::new_v4().to_string(),
            retry,
            limiter: Arc::new(Semaphore::new(DEFAULT_CONCURRENCY)),
        })
    }

    /// Override the agent and version reported in the user agent.
    pub fn with_agent(mut self, agent: &str, version: &str) -> Self {
        self.user_agent = user_agent(agent, version);
        self
    }

    /// Limit the number of requests in flight at once.
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.limiter = Arc::new(Semaphore::new(limit.max(1)));
        self
    }

    /// The correlation id sent with every request from this transport.
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    async fn send_once(&self, request: &HttpRequest, request_id: &str) -> Result<String, Failure> {
        let mut builder = self
            .client
            .post(&request.url)
            .header(HEADER_API_KEY, &self.api_token)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .header(HEADER_CORRELATION_ID, &self.correlation_id)
            .header(HEADER_REQUEST_ID, request_id)
            .json(&request.body);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Failure::from(classify(&request.url, &e)))?;

        let status = response.status().as_u16();
        let retry_after = if status == 429 || status == 503 {
            response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after)
        } else {
            None
        };

        let body = response
            .text()
            .await
            .map_err(|e| Failure::from(classify(&request.url, &e)))?;

        if status != 200 {
            return Err(Failure {
                error: TransportError::Http {
                    url: request.url.clone(),
                    status,
                    body,
                },
                retry_after,
            });
        }

        Ok(body)
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn post(&self, request: HttpRequest) -> Result<String, TransportError> {
        if self.api_token.is_empty() {
            return Err(TransportError::ApiTokenNotSet);
        }

        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let mut attempt = 0;
        loop {
            let request_id = uuid::Uuid::new_v4().to_string();
            if attempt > 0 {
                warn!(
                    "[id:{}] Failed to call {} (retry {})",
                    request_id, request.url, attempt
                );
            }
            debug!(request_id = %request_id, url = %request.url, "Sending request");

            match self.send_once(&request, &request_id).await {
                Ok(body) => return Ok(body),
                Err(failure)
                    if attempt < self.retry.max_retries && failure.error.is_retryable() =>
                {
                    let delay = self.retry.delay(attempt, failure.retry_after);
                    warn!(
                        request_id = %request_id,
                        error = %failure.error,
                        delay_ms = delay.as_millis() as u64,
                        "Request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(failure) => return Err(failure.error),
            }
        }
    }
}

struct Failure {
    error: TransportError,
    retry_after: Option<u64>,
}

impl From<TransportError> for Failure {
    fn from(error: TransportError) -> Self {
        Self {
            error,
            retry_after: None,
        }
    }
}

/// `Twingate{agent}/{version}`
pub fn user_agent(agent: &str, version: &str) -> String {
    format!("Twingate{}/{}", agent, version)
}

fn parse_retry_after(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok()
}

fn classify(url: &str, err: &reqwest::Error) -> TransportError {
    if err.is_timeout() {
        return TransportError::Timeout {
            url: url.to_string(),
        };
    }

    let detail = error_chain(err);
    if is_certificate_mismatch(&detail) {
        TransportError::Certificate {
            url: url.to_string(),
            detail,
        }
    } else {
        TransportError::Request(detail)
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut detail = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        detail.push_str(": ");
        detail.push_str(&inner.to_string());
        source = inner.source();
    }
    detail
}

// The TLS stacks report a name mismatch only through their error text.
fn is_certificate_mismatch(detail: &str) -> bool {
    const PATTERNS: [&str; 3] = [
        "certificate name does not match input",
        "certificate is valid for",
        "NotValidForName",
    ];
    PATTERNS.iter().any(|p| detail.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn fast_retry(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            min_wait: Duration::from_millis(1),
            max_wait: Duration::from_millis(5),
        }
    }

    /// Serve the given responses in order, one per connection, and record
    /// the raw requests.
    async fn serve_responses(responses: Vec<(u16, &'static str)>) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&seen);

        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let request = read_request(&mut socket).await;
                recorded.lock().unwrap().push(request);
                let response = format!(
                    "HTTP/1.1 {} Status\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });

        (format!("http://{}/api/graphql/", addr), seen)
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0_u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).to_string();
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .find_map(|line| {
                        let lower = line.to_ascii_lowercase();
                        lower
                            .strip_prefix("content-length:")
                            .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                    })
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    return text;
                }
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    #[test]
    fn test_backoff() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_secs(1));
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(8));
        assert_eq!(policy.backoff(5), Duration::from_secs(30));
        assert_eq!(policy.backoff(40), Duration::from_secs(30));
    }

    #[test]
    fn test_delay_prefers_retry_after() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(0, Some(7)), Duration::from_secs(7));
        assert_eq!(policy.delay(0, Some(600)), Duration::from_secs(30));
        assert_eq!(policy.delay(2, None), Duration::from_secs(4));
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("12"), Some(12));
        assert_eq!(parse_retry_after(" 3 "), Some(3));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    #[test]
    fn test_certificate_mismatch_detection() {
        assert!(is_certificate_mismatch(
            "x509: certificate is valid for *.example.com, not acme.twingate.com"
        ));
        assert!(is_certificate_mismatch(
            "invalid peer certificate: NotValidForName"
        ));
        assert!(!is_certificate_mismatch("connection refused"));
    }

    #[test]
    fn test_user_agent() {
        assert_eq!(user_agent("TF", "1.2.3"), "TwingateTF/1.2.3");
    }

    #[tokio::test]
    async fn test_post_sends_headers() {
        let (url, seen) = serve_responses(vec![(200, r#"{"data":{}}"#)]).await;
        let transport = HttpTransport::new("secret-token", Duration::from_secs(5), fast_retry(0))
            .unwrap()
            .with_agent("TF", "0.9.0");

        let body = transport
            .post(HttpRequest::new(&url, serde_json::json!({"query": "{ ping }"})))
            .await
            .unwrap();
        assert_eq!(body, r#"{"data":{}}"#);

        let requests = seen.lock().unwrap();
        let raw = requests[0].to_ascii_lowercase();
        assert!(raw.starts_with("post /api/graphql/"));
        assert!(raw.contains("x-api-key: secret-token"));
        assert!(raw.contains("user-agent: twingatetf/0.9.0"));
        assert!(raw.contains(&format!(
            "x-correlation-id: {}",
            transport.correlation_id()
        )));
        assert!(raw.contains("x-twingate-request-id: "));
        assert!(raw.contains(r#"{"query":"{ ping }"}"#));
    }

    #[tokio::test]
    async fn test_post_retries_transient_status() {
        let (url, seen) = serve_responses(vec![
            (503, "unavailable"),
            (429, "slow down"),
            (200, r#"{"data":{"ok":true}}"#),
        ])
        .await;
        let transport =
            HttpTransport::new("token", Duration::from_secs(5), fast_retry(3)).unwrap();

        let body = transport
            .post(HttpRequest::new(&url, serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(body, r#"{"data":{"ok":true}}"#);
        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_post_gives_up_after_max_retries() {
        let (url, seen) = serve_responses(vec![(502, "bad gateway"), (502, "bad gateway")]).await;
        let transport =
            HttpTransport::new("token", Duration::from_secs(5), fast_retry(1)).unwrap();

        let err = transport
            .post(HttpRequest::new(&url, serde_json::json!({})))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            TransportError::Http {
                url: url.clone(),
                status: 502,
                body: "bad gateway".into()
            }
        );
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_post_does_not_retry_client_errors() {
        let (url, seen) = serve_responses(vec![(401, "unauthorized")]).await;
        let transport =
            HttpTransport::new("token", Duration::from_secs(5), fast_retry(5)).unwrap();

        let err = transport
            .post(HttpRequest::new(&url, serde_json::json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Http { status: 401, .. }));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_post_without_token() {
        let transport = HttpTransport::new("", Duration::from_secs(1), fast_retry(5)).unwrap();
        let err = transport
            .post(HttpRequest::new("http://127.0.0.1:1/", serde_json::json!({})))
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::ApiTokenNotSet);
        assert_eq!(err.to_string(), "api_token not set");
    }
}
