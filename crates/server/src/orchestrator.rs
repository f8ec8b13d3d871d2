//! Service orchestrator (C13, §4.13): a read-only registry of named services
//! translated into HTTP calls against each service's control URL.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use voice_agent_core::{Error, GpuSnapshot, Result};

use crate::gpu_hub::GpuHub;

const CONTROL_TIMEOUT: Duration = Duration::from_secs(30);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceEntry {
    pub category: String,
    pub health_url: String,
    pub control_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Stopped,
    Healthy,
    Running,
}

pub struct Orchestrator {
    registry: HashMap<String, ServiceEntry>,
    client: reqwest::Client,
    gpu_hub: Arc<GpuHub>,
}

impl Orchestrator {
    pub fn new(
        registry: HashMap<String, ServiceEntry>,
        client: reqwest::Client,
        gpu_hub: Arc<GpuHub>,
    ) -> Self {
        Self { registry, client, gpu_hub }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.registry.keys().map(String::as_str)
    }

    pub fn entry(&self, name: &str) -> Option<&ServiceEntry> {
        self.registry.get(name)
    }

    /// Status order: not-running per the control endpoint beats everything
    /// else; otherwise a 200 from the health URL is `healthy`, else `running`
    /// (§4.13).
    pub async fn status(&self, name: &str) -> Result<ServiceStatus> {
        let entry = self.require(name)?;
        self.status_of(entry).await
    }

    pub async fn status_all(&self) -> Vec<(String, Result<ServiceStatus>)> {
        let mut out = Vec::with_capacity(self.registry.len());
        for (name, entry) in &self.registry {
            out.push((name.clone(), self.status_of(entry).await));
        }
        out
    }

    async fn status_of(&self, entry: &ServiceEntry) -> Result<ServiceStatus> {
        let control = self.get_json(&entry.control_url).await?;
        let running = control.get("running").and_then(|v| v.as_bool()).unwrap_or(false);
        if !running {
            return Ok(ServiceStatus::Stopped);
        }

        let healthy = tokio::time::timeout(HEALTH_TIMEOUT, self.client.get(&entry.health_url).send())
            .await
            .ok()
            .and_then(|r| r.ok())
            .map(|r| r.status().is_success())
            .unwrap_or(false);

        Ok(if healthy { ServiceStatus::Healthy } else { ServiceStatus::Running })
    }

    pub async fn start(&self, name: &str, params: Option<serde_json::Value>) -> Result<serde_json::Value> {
        let entry = self.require(name)?;
        let body = self.control_call(&entry.control_url, "start", params.unwrap_or_else(|| serde_json::json!({}))).await?;
        self.forward_gpu_envelope(&body).await;
        Ok(body)
    }

    pub async fn stop(&self, name: &str) -> Result<serde_json::Value> {
        let entry = self.require(name)?;
        let body = self.control_call(&entry.control_url, "stop", serde_json::json!({})).await?;
        self.forward_gpu_envelope(&body).await;
        Ok(body)
    }

    fn require(&self, name: &str) -> Result<&ServiceEntry> {
        self.registry
            .get(name)
            .ok_or_else(|| Error::BadRequest(format!("unknown service: {name}")))
    }

    async fn control_call(&self, base_url: &str, action: &str, body: serde_json::Value) -> Result<serde_json::Value> {
        let url = format!("{}/{}", base_url.trim_end_matches('/'), action);
        let response = tokio::time::timeout(CONTROL_TIMEOUT, self.client.post(&url).json(&body).send())
            .await
            .map_err(|_| Error::Transport(format!("control call to {url} timed out")))?
            .map_err(|e| Error::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::RemoteStatus { status, body: body.chars().take(512).collect() });
        }
        response.json().await.map_err(|e| Error::Decode(e.to_string()))
    }

    async fn get_json(&self, url: &str) -> Result<serde_json::Value> {
        let response = tokio::time::timeout(CONTROL_TIMEOUT, self.client.get(url).send())
            .await
            .map_err(|_| Error::Transport(format!("control status at {url} timed out")))?
            .map_err(|e| Error::Transport(e.to_string()))?;
        response.json().await.map_err(|e| Error::Decode(e.to_string()))
    }

    async fn forward_gpu_envelope(&self, body: &serde_json::Value) {
        let Some(gpu) = body.get("gpu") else { return };
        match serde_json::from_value::<GpuSnapshot>(gpu.clone()) {
            Ok(snapshot) => {
                self.gpu_hub.publish(snapshot).await;
            }
            Err(err) => tracing::warn!(error = %err, "failed to parse gpu envelope from orchestrator response"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn orchestrator_with(server: &MockServer, name: &str) -> Orchestrator {
        let mut registry = HashMap::new();
        registry.insert(
            name.to_string(),
            ServiceEntry {
                category: "asr".to_string(),
                health_url: format!("{}/health", server.uri()),
                control_url: format!("{}/control", server.uri()),
            },
        );
        let gpu_hub = Arc::new(GpuHub::new(reqwest::Client::new(), None));
        Orchestrator::new(registry, reqwest::Client::new(), gpu_hub)
    }

    #[tokio::test]
    async fn unknown_service_is_a_bad_request() {
        let server = MockServer::start().await;
        let orchestrator = orchestrator_with(&server, "whisper").await;
        let err = orchestrator.status("unknown").await.unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }

    #[tokio::test]
    async fn not_running_beats_a_healthy_health_check() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/control"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "running": false })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let orchestrator = orchestrator_with(&server, "whisper").await;
        let status = orchestrator.status("whisper").await.unwrap();
        assert_eq!(status, ServiceStatus::Stopped);
    }

    #[tokio::test]
    async fn running_and_healthy_reports_healthy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/control"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "running": true })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let orchestrator = orchestrator_with(&server, "whisper").await;
        let status = orchestrator.status("whisper").await.unwrap();
        assert_eq!(status, ServiceStatus::Healthy);
    }

    #[tokio::test]
    async fn running_but_unhealthy_reports_running() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/control"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "running": true })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let orchestrator = orchestrator_with(&server, "whisper").await;
        let status = orchestrator.status("whisper").await.unwrap();
        assert_eq!(status, ServiceStatus::Running);
    }

    #[tokio::test]
    async fn start_forwards_an_embedded_gpu_envelope_to_the_hub() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/control/start"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "running": true,
                "gpu": { "vram_total_mb": 8000, "vram_used_mb": 500, "processes": [] },
            })))
            .mount(&server)
            .await;

        let mut registry = HashMap::new();
        registry.insert(
            "whisper".to_string(),
            ServiceEntry {
                category: "asr".to_string(),
                health_url: format!("{}/health", server.uri()),
                control_url: format!("{}/control", server.uri()),
            },
        );
        let gpu_hub = Arc::new(GpuHub::new(reqwest::Client::new(), None));
        let mut gpu_rx = gpu_hub.subscribe().await;
        let orchestrator = Orchestrator::new(registry, reqwest::Client::new(), gpu_hub);

        orchestrator.start("whisper", None).await.unwrap();
        let snapshot = gpu_rx.recv().await.unwrap();
        assert_eq!(snapshot.vram_used_mb, 500);
    }
}
