//! HTTP collector client

use anyhow::{Context, Result};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use super::ReportTransport;
use crate::models::{ReconcilePayload, ReportEnvelope};

#[derive(Clone)]
pub struct HttpReportTransport {
    client: Client,
    endpoint: String,
}

impl HttpReportTransport {
    pub fn new(endpoint: impl Into<String>, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder()
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .context("Failed to build HttpReportTransport")?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Collector bodies are either empty or a reconcile payload
pub(crate) fn parse_reconcile_body(body: &str) -> Result<Option<ReconcilePayload>> {
    if body.trim().is_empty() {
        return Ok(None);
    }
    let payload = serde_json::from_str::<ReconcilePayload>(body)
        .context("Failed to parse collector response")?;
    Ok(Some(payload))
}

#[async_trait::async_trait]
impl ReportTransport for HttpReportTransport {
    async fn send(&self, report: &ReportEnvelope) -> Result<Option<ReconcilePayload>> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(report)
            .send()
            .await
            .with_context(|| format!("POST {} failed", self.endpoint))?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(anyhow::anyhow!("POST {} {}: {}", self.endpoint, status, text));
        }

        debug!(
            status = %status,
            bytes = text.len(),
            events = report.events.len(),
            "Report delivered"
        );
        parse_reconcile_body(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_body_means_no_update() {
        assert!(parse_reconcile_body("").unwrap().is_none());
        assert!(parse_reconcile_body("  \n").unwrap().is_none());
    }

    #[test]
    fn test_reconcile_body_parsed() {
        let payload = parse_reconcile_body(
            r#"{"infoString":"abc","config":{"p1":{"x":{"key":"floor","value":1.0,"usesRemaining":2}}}}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(payload.info_string.as_deref(), Some("abc"));
        assert_eq!(payload.config.unwrap()["p1"]["x"].uses_remaining, 2);
    }

    #[test]
    fn test_malformed_body_is_error() {
        assert!(parse_reconcile_body("<html>oops</html>").is_err());
    }

    #[test]
    fn test_builds_with_and_without_timeout() {
        assert!(HttpReportTransport::new("http://127.0.0.1:1", None).is_ok());
        let t = HttpReportTransport::new("http://127.0.0.1:1", Some(Duration::from_millis(50)))
            .unwrap();
        assert_eq!(t.endpoint(), "http://127.0.0.1:1");
    }
}
