//! Seedream image adapter.
//!
//! Seedream answers the generation request synchronously with the finished
//! image URL. To fit the submit/poll contract the adapter hands out a
//! synthetic `seedream-<uuid>` job id and remembers the URL under it.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use scenegen_models::JobKind;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::adapter::{ImageRequest, PollOutcome, ProviderAdapter};
use crate::error::{ProviderError, ProviderResult};
use crate::http::{error_message, read_json, HttpTimeouts, HttpTransport};

pub const PROVIDER_NAME: &str = "seedream";

const JOB_PREFIX: &str = "seedream-";

/// Seedream endpoint configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SeedreamConfig {
    /// API base, e.g. `https://ark.cn-beijing.volces.com/api/v3`
    pub url: String,
    pub key: String,
    pub model: String,
    /// `1K`, `2K` or `4K`
    pub size: String,
    pub sequential_image_generation: String,
    pub watermark: bool,
}

impl SeedreamConfig {
    pub fn new(url: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            key: key.into(),
            model: "doubao-seedream-4-5-251128".to_string(),
            size: "2K".to_string(),
            sequential_image_generation: "disabled".to_string(),
            watermark: false,
        }
    }

    fn generations_url(&self) -> String {
        format!("{}/images/generations", self.url.trim_end_matches('/'))
    }
}

/// Map a size class to the pixel size the API expects.
pub fn map_size(size: &str) -> &'static str {
    match size.trim().to_ascii_uppercase().as_str() {
        "4K" => "3840x2160",
        _ => "2048x2048",
    }
}

pub struct SeedreamAdapter {
    config: SeedreamConfig,
    http: HttpTransport,
    completed: Mutex<HashMap<String, String>>,
}

impl SeedreamAdapter {
    pub fn new(config: SeedreamConfig, timeouts: HttpTimeouts) -> ProviderResult<Self> {
        Ok(Self {
            config,
            http: HttpTransport::new(PROVIDER_NAME, timeouts)?,
            completed: Mutex::new(HashMap::new()),
        })
    }

    fn submit_body(&self, request: &ImageRequest) -> Value {
        let size = request.size.as_deref().unwrap_or(&self.config.size);

        let mut body = json!({
            "model": self.config.model,
            "prompt": request.prompt,
            "size": map_size(size),
            "sequential_image_generation": self.config.sequential_image_generation,
            "response_format": "url",
            "watermark": self.config.watermark,
        });

        match request.reference_image_urls.as_slice() {
            [] => {}
            [single] => body["image"] = json!(single),
            many => body["image"] = json!(many),
        }

        body
    }

    async fn generate(&self, request: &ImageRequest) -> ProviderResult<String> {
        let response = self
            .http
            .client()
            .post(self.config.generations_url())
            .bearer_auth(&self.config.key)
            .json(&self.submit_body(request))
            .timeout(self.http.timeouts().submit)
            .send()
            .await?;
        let result = read_json(response).await?;

        result
            .get("data")
            .and_then(Value::as_array)
            .and_then(|items| items.first())
            .and_then(|item| item.get("url"))
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                ProviderError::invalid_response(
                    error_message(&result)
                        .unwrap_or_else(|| "response without data[0].url".to_string()),
                )
            })
    }

    fn remember(&self, url: String) -> String {
        let job_id = format!("{}{}", JOB_PREFIX, Uuid::new_v4());
        match self.completed.lock() {
            Ok(mut completed) => {
                completed.insert(job_id.clone(), url);
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(job_id.clone(), url);
            }
        }
        job_id
    }

    fn lookup(&self, job_id: &str) -> Option<String> {
        match self.completed.lock() {
            Ok(completed) => completed.get(job_id).cloned(),
            Err(poisoned) => poisoned.into_inner().get(job_id).cloned(),
        }
    }
}

#[async_trait]
impl ProviderAdapter for SeedreamAdapter {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn submit_image(&self, request: &ImageRequest) -> Option<String> {
        match self.http.observe("submit_image", self.generate(request)).await {
            Ok(url) => {
                let job_id = self.remember(url);
                info!(provider = PROVIDER_NAME, job_id = %job_id, "Image generated");
                Some(job_id)
            }
            Err(e) => {
                warn!(provider = PROVIDER_NAME, "Image generation failed: {}", e);
                None
            }
        }
    }

    async fn poll(&self, job_id: &str, _kind: JobKind) -> PollOutcome {
        match self.lookup(job_id) {
            Some(url) => PollOutcome::succeeded(Some(url)),
            None => PollOutcome::failed(format!("unknown job id {}", job_id)),
        }
    }

    async fn download(&self, url: &str, dest: &Path) -> bool {
        self.http.download(url, dest).await
    }
}
