//! Analyzer served over HTTP.
//!
//! Operations are posted as JSON to `<endpoint>/defs`, `<endpoint>/refs`
//! and `<endpoint>/toks`; the response body is the JSON result envelope.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::Analyzer;
use crate::config::RemoteSettings;
use crate::context::RequestContext;
use crate::error::{Result, XrefError};
use crate::model::{DefsOp, DefsResult, RefsOp, RefsResult, ToksOp, ToksResult};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct RemoteAnalyzer {
    name: String,
    endpoint: String,
    extensions: Vec<String>,
    timeout: Duration,
    http: reqwest::blocking::Client,
}

impl RemoteAnalyzer {
    pub fn new(name: &str, settings: &RemoteSettings) -> Result<Self> {
        let endpoint = settings.endpoint.trim().trim_end_matches('/').to_string();
        if endpoint.is_empty() {
            return Err(XrefError::Config(format!("remote analyzer {} has no endpoint", name)));
        }
        let timeout = settings
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_TIMEOUT);
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| XrefError::Remote(format!("failed to build http client for {}: {}", name, e)))?;

        Ok(Self {
            name: name.to_string(),
            endpoint,
            extensions: settings.extensions.clone(),
            timeout,
            http,
        })
    }

    fn operation_url(&self, operation: &str) -> String {
        format!("{}/{}", self.endpoint, operation)
    }

    /// The configured timeout, shortened to what is left of the request deadline.
    fn request_timeout(&self, ctx: &RequestContext) -> Duration {
        match ctx.remaining() {
            Some(remaining) => remaining.min(self.timeout),
            None => self.timeout,
        }
    }

    fn call<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        ctx: &RequestContext,
        operation: &str,
        payload: &Req,
    ) -> Result<Resp> {
        if ctx.is_done() {
            return Err(XrefError::Remote(format!(
                "{} {}: deadline exceeded before request",
                self.name, operation
            )));
        }

        let url = self.operation_url(operation);
        let timeout = self.request_timeout(ctx);
        tracing::debug!("{} {} -> {}", self.name, operation, url);

        let response = self
            .http
            .post(&url)
            .timeout(timeout)
            .json(payload)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    XrefError::Remote(format!(
                        "{} {} timed out after {:?}",
                        self.name, operation, timeout
                    ))
                } else {
                    XrefError::Remote(format!("{} {} failed: {}", self.name, operation, e))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| XrefError::Remote(format!("failed to read {} response body: {}", self.name, e)))?;

        if !status.is_success() {
            return Err(XrefError::Remote(format!(
                "{} {} returned HTTP {}: {}",
                self.name,
                operation,
                status,
                truncate_for_error(&body)
            )));
        }

        serde_json::from_str(&body).map_err(|e| {
            XrefError::Remote(format!(
                "invalid JSON from {} {}: {} (body={})",
                self.name,
                operation,
                e,
                truncate_for_error(&body)
            ))
        })
    }
}

impl Analyzer for RemoteAnalyzer {
    fn name(&self) -> &str {
        &self.name
    }

    fn file_extensions(&self) -> &[String] {
        &self.extensions
    }

    fn defs(&self, ctx: &RequestContext, op: &DefsOp) -> Result<DefsResult> {
        self.call(ctx, "defs", op)
    }

    fn refs(&self, ctx: &RequestContext, op: &RefsOp) -> Result<RefsResult> {
        self.call(ctx, "refs", op)
    }

    fn toks(&self, ctx: &RequestContext, op: &ToksOp) -> Result<ToksResult> {
        self.call(ctx, "toks", op)
    }
}

fn truncate_for_error(value: &str) -> String {
    const LIMIT: usize = 400;
    if value.len() <= LIMIT {
        return value.to_string();
    }
    let mut end = LIMIT;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &value[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn settings(endpoint: &str) -> RemoteSettings {
        RemoteSettings {
            endpoint: endpoint.to_string(),
            extensions: vec!["py".to_string()],
            timeout_ms: Some(500),
        }
    }

    #[test]
    fn test_operation_urls() {
        let analyzer = RemoteAnalyzer::new("python", &settings(" http://localhost:9000/ ")).unwrap();
        assert_eq!(analyzer.operation_url("refs"), "http://localhost:9000/refs");
    }

    #[test]
    fn test_empty_endpoint_rejected() {
        assert!(matches!(
            RemoteAnalyzer::new("python", &settings("  ")),
            Err(XrefError::Config(_))
        ));
    }

    #[test]
    fn test_timeout_bounded_by_deadline() {
        let analyzer = RemoteAnalyzer::new("python", &settings("http://localhost:9000")).unwrap();
        assert_eq!(analyzer.request_timeout(&RequestContext::new()), Duration::from_millis(500));

        let ctx = RequestContext::with_timeout(Duration::from_millis(50));
        assert!(analyzer.request_timeout(&ctx) <= Duration::from_millis(50));
    }

    #[test]
    fn test_expired_deadline_skips_request() {
        let analyzer = RemoteAnalyzer::new("python", &settings("http://127.0.0.1:9")).unwrap();
        let ctx = RequestContext::new().with_deadline(Instant::now());
        let err = analyzer.toks(&ctx, &ToksOp::default()).err().unwrap();
        assert!(err.to_string().contains("deadline exceeded"));
    }

    #[test]
    fn test_truncate_for_error() {
        assert_eq!(truncate_for_error("short"), "short");
        let long = "é".repeat(300);
        let truncated = truncate_for_error(&long);
        assert!(truncated.ends_with("..."));
        assert!(truncated.len() <= 403);
    }
}
