//! Kling image-to-video adapter.

use std::path::Path;

use async_trait::async_trait;
use scenegen_models::JobKind;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::adapter::{PollOutcome, ProviderAdapter, VideoRequest};
use crate::error::{ProviderError, ProviderResult};
use crate::http::{envelope_code, error_message, json_id, read_json, HttpTimeouts, HttpTransport};

pub const PROVIDER_NAME: &str = "kling";

/// Kling endpoint configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct KlingConfig {
    /// Image-to-video endpoint; task status lives at `{url}/{task_id}`.
    pub url: String,
    pub key: String,
    pub model_name: String,
    pub mode: String,
    pub duration: String,
    pub cfg_scale: f64,
    pub sound: String,
}

impl KlingConfig {
    pub fn new(url: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            key: key.into(),
            model_name: "kling-v2-6".to_string(),
            mode: "pro".to_string(),
            duration: "10".to_string(),
            cfg_scale: 0.5,
            sound: "off".to_string(),
        }
    }

    fn task_url(&self, task_id: &str) -> String {
        format!("{}/{}", self.url.trim_end_matches('/'), task_id)
    }
}

pub struct KlingAdapter {
    config: KlingConfig,
    http: HttpTransport,
}

impl KlingAdapter {
    pub fn new(config: KlingConfig, timeouts: HttpTimeouts) -> ProviderResult<Self> {
        Ok(Self {
            config,
            http: HttpTransport::new(PROVIDER_NAME, timeouts)?,
        })
    }

    fn submit_body(&self, request: &VideoRequest) -> Value {
        json!({
            "model_name": self.config.model_name,
            "prompt": request.prompt,
            "mode": self.config.mode,
            "duration": request.duration.as_deref().unwrap_or(&self.config.duration),
            "cfg_scale": self.config.cfg_scale,
            "sound": self.config.sound,
            "image": request.reference_image_url,
        })
    }

    async fn try_submit(&self, request: &VideoRequest) -> ProviderResult<String> {
        if request.reference_image_url.trim().is_empty() {
            return Err(ProviderError::Unsupported(
                "kling requires a reference image".to_string(),
            ));
        }

        let response = self
            .http
            .client()
            .post(&self.config.url)
            .bearer_auth(&self.config.key)
            .json(&self.submit_body(request))
            .timeout(self.http.timeouts().submit)
            .send()
            .await?;
        let result = read_json(response).await?;

        match envelope_code(&result) {
            Some(0) => json_id(result.get("data").and_then(|d| d.get("task_id"))).ok_or_else(|| {
                ProviderError::invalid_response("submit succeeded without data.task_id")
            }),
            code => Err(ProviderError::rejected(
                code.unwrap_or(-1),
                error_message(&result).unwrap_or_else(|| "no message".to_string()),
            )),
        }
    }

    async fn try_poll(&self, task_id: &str) -> ProviderResult<PollOutcome> {
        let response = self
            .http
            .client()
            .get(self.config.task_url(task_id))
            .bearer_auth(&self.config.key)
            .timeout(self.http.timeouts().query)
            .send()
            .await?;
        let result = read_json(response).await?;

        if envelope_code(&result) != Some(0) {
            return Err(ProviderError::rejected(
                envelope_code(&result).unwrap_or(-1),
                error_message(&result).unwrap_or_else(|| "no message".to_string()),
            ));
        }

        let data = result.get("data").cloned().unwrap_or(Value::Null);
        let status = data.get("task_status").and_then(Value::as_str).unwrap_or("");

        let outcome = match status {
            "submitted" => PollOutcome::queued(),
            "processing" => PollOutcome::processing(),
            "succeed" => PollOutcome::succeeded(
                data.pointer("/task_result/videos/0/url")
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            ),
            "failed" => PollOutcome::failed(
                data.get("task_status_msg")
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .unwrap_or("generation failed")
                    .to_string(),
            ),
            other => PollOutcome::unknown(format!("unrecognized task_status {:?}", other)),
        };

        Ok(outcome)
    }
}

#[async_trait]
impl ProviderAdapter for KlingAdapter {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn submit_video(&self, request: &VideoRequest) -> Option<String> {
        match self.http.observe("submit_video", self.try_submit(request)).await {
            Ok(task_id) => {
                info!(provider = PROVIDER_NAME, job_id = %task_id, "Video task submitted");
                Some(task_id)
            }
            Err(e) => {
                warn!(provider = PROVIDER_NAME, "Video submission failed: {}", e);
                None
            }
        }
    }

    async fn poll(&self, job_id: &str, kind: JobKind) -> PollOutcome {
        match self.http.observe("poll", self.try_poll(job_id)).await {
            Ok(outcome) => outcome,
            Err(e) => {
                debug!(
                    provider = PROVIDER_NAME,
                    job_id = job_id,
                    kind = %kind,
                    "Poll failed: {}",
                    e
                );
                PollOutcome::unknown(e.to_string())
            }
        }
    }

    async fn download(&self, url: &str, dest: &Path) -> bool {
        self.http.download(url, dest).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::PollStatus;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(server: &MockServer) -> KlingAdapter {
        let config = KlingConfig::new(format!("{}/v1/videos/image2video", server.uri()), "kl-key");
        KlingAdapter::new(config, HttpTimeouts::default()).unwrap()
    }

    #[tokio::test]
    async fn test_submit_sends_defaults() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/videos/image2video"))
            .and(header("authorization", "Bearer kl-key"))
            .and(body_partial_json(json!({
                "model_name": "kling-v2-6",
                "mode": "pro",
                "duration": "10",
                "sound": "off",
                "image": "https://cdn/frame.png"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0, "data": {"task_id": "t-1"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let id = adapter(&server)
            .submit_video(&VideoRequest::new("pan left", "https://cdn/frame.png"))
            .await;
        assert_eq!(id.as_deref(), Some("t-1"));
    }

    #[tokio::test]
    async fn test_submit_without_image_is_refused() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let id = adapter(&server)
            .submit_video(&VideoRequest::new("pan left", ""))
            .await;
        assert!(id.is_none());
    }

    #[tokio::test]
    async fn test_poll_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/videos/image2video/t-ok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "data": {
                    "task_status": "succeed",
                    "task_result": {"videos": [{"url": "https://cdn/k.mp4"}]}
                }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/videos/image2video/t-bad"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "data": {"task_status": "failed", "task_status_msg": "risk control"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/videos/image2video/t-run"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0, "data": {"task_status": "processing"}
            })))
            .mount(&server)
            .await;

        let adapter = adapter(&server);

        let ok = adapter.poll("t-ok", JobKind::Video).await;
        assert_eq!(ok.status, PollStatus::Succeeded);
        assert_eq!(ok.artifact_url.as_deref(), Some("https://cdn/k.mp4"));

        let bad = adapter.poll("t-bad", JobKind::Video).await;
        assert_eq!(bad.status, PollStatus::Failed);
        assert_eq!(bad.error.as_deref(), Some("risk control"));

        assert_eq!(
            adapter.poll("t-run", JobKind::Video).await.status,
            PollStatus::Processing
        );
    }
}
