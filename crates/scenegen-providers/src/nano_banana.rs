//! NanoBanana image adapter.
//!
//! Asynchronous API: submit returns an image id, a separate detail endpoint
//! reports progress. Status codes on the detail endpoint:
//! `0` queued, `1` generating, `2` done, `3` failed.

use std::path::Path;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use scenegen_models::JobKind;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::adapter::{ImageRequest, PollOutcome, ProviderAdapter};
use crate::error::{ProviderError, ProviderResult};
use crate::http::{
    envelope_code, error_message, json_id, json_int, read_json, HttpTimeouts, HttpTransport,
};

pub const PROVIDER_NAME: &str = "nano_banana";

/// NanoBanana endpoint configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct NanoBananaConfig {
    /// Submit endpoint, e.g. `https://api.wuyinkeji.com/api/img/nanoBanana-pro`
    pub url: String,
    /// Detail endpoint, e.g. `https://api.wuyinkeji.com/api/img/drawDetail`
    pub query_url: String,
    pub key: String,
    pub aspect_ratio: String,
    pub image_size: String,
}

impl NanoBananaConfig {
    pub fn new(
        url: impl Into<String>,
        query_url: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            query_url: query_url.into(),
            key: key.into(),
            aspect_ratio: "16:9".to_string(),
            image_size: "1K".to_string(),
        }
    }

    /// The pro endpoint takes `imageSize`; the plain one takes a model name.
    pub fn is_pro(&self) -> bool {
        self.url.contains("nanoBanana-pro")
    }
}

pub struct NanoBananaAdapter {
    config: NanoBananaConfig,
    http: HttpTransport,
}

impl NanoBananaAdapter {
    pub fn new(config: NanoBananaConfig, timeouts: HttpTimeouts) -> ProviderResult<Self> {
        Ok(Self {
            config,
            http: HttpTransport::new(PROVIDER_NAME, timeouts)?,
        })
    }

    fn submit_body(&self, request: &ImageRequest) -> Value {
        let aspect_ratio = request
            .aspect_ratio
            .as_deref()
            .unwrap_or(&self.config.aspect_ratio);

        let mut body = json!({
            "prompt": request.prompt,
            "aspectRatio": aspect_ratio,
        });

        if self.config.is_pro() {
            let size = request.size.as_deref().unwrap_or(&self.config.image_size);
            body["imageSize"] = json!(size);
        } else {
            body["model"] = json!("nano-banana");
        }

        if !request.reference_image_urls.is_empty() {
            body["img_url"] = json!(request.reference_image_urls);
        }

        body
    }

    async fn try_submit(&self, request: &ImageRequest) -> ProviderResult<String> {
        let body = self.submit_body(request);

        let response = self
            .http
            .client()
            .post(&self.config.url)
            .query(&[("key", self.config.key.as_str())])
            .header(AUTHORIZATION, &self.config.key)
            .json(&body)
            .timeout(self.http.timeouts().submit)
            .send()
            .await?;
        let result = read_json(response).await?;

        match envelope_code(&result) {
            Some(200) => json_id(result.get("data").and_then(|d| d.get("id")))
                .ok_or_else(|| ProviderError::invalid_response("submit succeeded without data.id")),
            code => Err(ProviderError::rejected(
                code.unwrap_or(-1),
                error_message(&result).unwrap_or_else(|| "no message".to_string()),
            )),
        }
    }

    async fn try_poll(&self, job_id: &str) -> ProviderResult<PollOutcome> {
        let response = self
            .http
            .client()
            .get(&self.config.query_url)
            .query(&[("key", self.config.key.as_str()), ("id", job_id)])
            .header(AUTHORIZATION, &self.config.key)
            .timeout(self.http.timeouts().query)
            .send()
            .await?;
        let result = read_json(response).await?;

        if envelope_code(&result) != Some(200) {
            return Err(ProviderError::rejected(
                envelope_code(&result).unwrap_or(-1),
                error_message(&result).unwrap_or_else(|| "no message".to_string()),
            ));
        }

        let data = result.get("data").cloned().unwrap_or(Value::Null);
        let outcome = match json_int(data.get("status")) {
            Some(0) => PollOutcome::queued(),
            Some(1) => PollOutcome::processing(),
            Some(2) => PollOutcome::succeeded(
                data.get("image_url")
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            ),
            Some(3) => PollOutcome::failed(
                error_message(&data).unwrap_or_else(|| format!("failed without message: {}", data)),
            ),
            other => PollOutcome::unknown(format!("unrecognized status {:?}", other)),
        };

        Ok(outcome)
    }
}

#[async_trait]
impl ProviderAdapter for NanoBananaAdapter {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn submit_image(&self, request: &ImageRequest) -> Option<String> {
        match self.http.observe("submit_image", self.try_submit(request)).await {
            Ok(id) => {
                info!(
                    provider = PROVIDER_NAME,
                    job_id = %id,
                    references = request.reference_image_urls.len(),
                    "Image job submitted"
                );
                Some(id)
            }
            Err(e) => {
                warn!(provider = PROVIDER_NAME, "Image submission failed: {}", e);
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
