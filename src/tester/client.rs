use anyhow::{Context, Result};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A request the user wants fired at their API from the test console.
#[derive(Debug, Clone, Deserialize)]
pub struct TestRequest {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, Value>,
    #[serde(default)]
    pub body: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: BTreeMap<String, String>,
    /// Parsed JSON when the payload is JSON, raw text otherwise.
    pub body: Value,
    pub response_time_ms: u64,
}

#[derive(Debug)]
pub enum TestOutcome {
    Completed(TestResponse),
    Failed { error: String },
}

pub struct RequestTester {
    client: reqwest::Client,
}

impl RequestTester {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self::from_client(client))
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Issue the request once. Failures are returned as [`TestOutcome::Failed`], never retried.
    pub async fn execute(&self, request: &TestRequest) -> TestOutcome {
        match self.send(request).await {
            Ok(response) => {
                debug!(
                    url = %request.url,
                    status = response.status,
                    elapsed_ms = response.response_time_ms,
                    "test request completed"
                );
                TestOutcome::Completed(response)
            }
            Err(err) => {
                warn!(url = %request.url, error = %format!("{err:#}"), "test request failed");
                TestOutcome::Failed {
                    error: format!("{err:#}"),
                }
            }
        }
    }

    async fn send(&self, request: &TestRequest) -> Result<TestResponse> {
        let method = Method::from_bytes(request.method.trim().to_uppercase().as_bytes())
            .with_context(|| format!("invalid HTTP method {:?}", request.method))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (name, value) in &request.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .with_context(|| format!("invalid header name {name:?}"))?;
            let header_value = HeaderValue::from_str(&value_text(value))
                .with_context(|| format!("invalid value for header {name}"))?;
            headers.insert(header_name, header_value);
        }

        let mut builder = self
            .client
            .request(method.clone(), request.url.as_str())
            .headers(headers);
        if method != Method::GET {
            if let Some(body) = request.body.as_ref().filter(|body| has_content(body)) {
                builder = builder.body(value_text(body));
            }
        }

        let started = Instant::now();
        let response = builder.send().await?;
        let elapsed = started.elapsed();

        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let text = response.text().await?;
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));

        Ok(TestResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
            response_time_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        })
    }
}

fn default_method() -> String {
    "GET".to_string()
}

fn has_content(body: &Value) -> bool {
    match body {
        Value::Null => false,
        Value::String(text) => !text.is_empty(),
        _ => true,
    }
}

/// Strings go out verbatim, everything else as JSON text.
fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
