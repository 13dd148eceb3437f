//! Incident detection client
//!
//! Reads the metrics service's incident report so an operator can watch
//! whether an injected scenario was noticed. Fails open: an unreachable
//! or malformed endpoint reads as "no incidents detected".

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

/// One incident reported by the detection endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedIncident {
    /// Incident type, e.g. `high_memory`, `crash_loop`, `pod_not_running`
    #[serde(rename = "type")]
    pub incident_type: String,
    /// Human-readable description
    #[serde(default)]
    pub message: String,
    /// `warning` or `critical`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    /// Affected pod
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod: Option<String>,
    /// Affected container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    /// Pod phase, for `pod_not_running`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    /// Measured value behind the incident
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl DetectedIncident {
    /// Whether the endpoint marked the incident critical
    #[inline]
    #[must_use]
    pub fn is_critical(&self) -> bool {
        self.severity.as_deref() == Some("critical")
    }
}

impl fmt::Display for DetectedIncident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}",
            self.severity.as_deref().unwrap_or("unknown"),
            self.incident_type
        )?;
        if let Some(pod) = &self.pod {
            write!(f, " pod={pod}")?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        Ok(())
    }
}

/// Detection endpoint response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    /// When the endpoint evaluated its rules
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Detected incidents
    #[serde(default)]
    pub incidents: Vec<DetectedIncident>,
    /// Whether any incident is critical
    #[serde(default)]
    pub has_critical: bool,
}

impl DetectionReport {
    /// Whether nothing was detected
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.incidents.is_empty()
    }

    /// Critical flag from the endpoint, or derived from the incidents
    #[must_use]
    pub fn any_critical(&self) -> bool {
        self.has_critical || self.incidents.iter().any(DetectedIncident::is_critical)
    }
}

/// HTTP client for the detection endpoint
#[derive(Debug, Clone)]
pub struct DetectionClient {
    http: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl DetectionClient {
    /// Client for `url`, each request bounded by `timeout`
    #[must_use]
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
            timeout,
        }
    }

    /// Endpoint URL
    #[inline]
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch the current report, treating any failure as "no incidents"
    pub async fn fetch(&self) -> DetectionReport {
        match self.try_fetch().await {
            Ok(report) => {
                debug!(incidents = report.incidents.len(), "detection report fetched");
                report
            }
            Err(e) => {
                warn!(url = %self.url, error = %e, "detection endpoint unavailable, assuming no incidents");
                DetectionReport::default()
            }
        }
    }

    /// Fetch the current report
    ///
    /// # Errors
    /// Returns the transport, status or decode error.
    pub async fn try_fetch(&self) -> Result<DetectionReport, reqwest::Error> {
        self.http
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?
            .json::<DetectionReport>()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_endpoint_payload() {
        let raw = r#"{
            "timestamp": "2026-01-12T10:00:00",
            "incidents": [
                {"type": "high_memory", "severity": "warning", "pod": "incident-memory-hog",
                 "container": "stress", "value": 91.5, "message": "Memory usage at 91.5%"},
                {"type": "pod_not_running", "severity": "critical", "pod": "sample-app-7d9f",
                 "phase": "Pending", "message": "Pod in Pending state"}
            ],
            "count": 2,
            "has_critical": true
        }"#;

        let report: DetectionReport = serde_json::from_str(raw).unwrap();
        assert_eq!(report.incidents.len(), 2);
        assert!(report.any_critical());
        assert_eq!(report.incidents[0].value, Some(91.5));
        assert_eq!(report.incidents[1].phase.as_deref(), Some("Pending"));
        assert_eq!(
            report.incidents[1].to_string(),
            "[critical] pod_not_running pod=sample-app-7d9f: Pod in Pending state"
        );
    }

    #[test]
    fn optional_fields_may_be_absent() {
        let report: DetectionReport =
            serde_json::from_str(r#"{"incidents": [{"type": "crash_loop", "message": "restarting"}]}"#)
                .unwrap();

        let incident = &report.incidents[0];
        assert_eq!(incident.severity, None);
        assert_eq!(incident.pod, None);
        assert!(!report.any_critical());
    }

    #[tokio::test]
    async fn unreachable_endpoint_reads_as_empty() {
        // Port 9 (discard) is not expected to serve HTTP
        let client = DetectionClient::new("http://127.0.0.1:9/api/incidents/detect", Duration::from_millis(500));
        let report = client.fetch().await;
        assert!(report.is_empty());
    }
}
