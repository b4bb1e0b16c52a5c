//! Sora2 video adapter.
//!
//! Submission is a form post. The status endpoint depends on which model
//! accepted the job, so polling walks the configured detail endpoints and
//! takes the first one that recognizes the id.
//!
//! Detail status codes: `0` queued, `1` done, `2` failed, `3` processing.

use std::path::Path;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use scenegen_models::JobKind;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::adapter::{PollOutcome, ProviderAdapter, VideoRequest};
use crate::error::{ProviderError, ProviderResult};
use crate::http::{
    envelope_code, error_message, json_id, json_int, read_json, HttpTimeouts, HttpTransport,
};

pub const PROVIDER_NAME: &str = "sora2";

pub const DEFAULT_QUERY_URLS: [&str; 2] = [
    "https://api.wuyinkeji.com/api/sora2/detail",
    "https://api.wuyinkeji.com/api/sora2pro/detail",
];

/// Sora2 endpoint configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Sora2Config {
    pub url: String,
    /// Detail endpoints tried in order.
    pub query_urls: Vec<String>,
    pub key: String,
    pub aspect_ratio: String,
    pub duration: String,
    pub size: String,
}

impl Sora2Config {
    pub fn new(url: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            query_urls: DEFAULT_QUERY_URLS.iter().map(|u| u.to_string()).collect(),
            key: key.into(),
            aspect_ratio: "16:9".to_string(),
            duration: "10".to_string(),
            size: "small".to_string(),
        }
    }

    pub fn with_query_urls(mut self, query_urls: Vec<String>) -> Self {
        if !query_urls.is_empty() {
            self.query_urls = query_urls;
        }
        self
    }

    /// The pro endpoint rejects the `size` field.
    pub fn is_pro(&self) -> bool {
        self.url.to_lowercase().contains("sora2pro")
    }
}

pub struct Sora2Adapter {
    config: Sora2Config,
    http: HttpTransport,
}

impl Sora2Adapter {
    pub fn new(config: Sora2Config, timeouts: HttpTimeouts) -> ProviderResult<Self> {
        Ok(Self {
            config,
            http: HttpTransport::new(PROVIDER_NAME, timeouts)?,
        })
    }

    fn form_fields(&self, request: &VideoRequest) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("prompt", request.prompt.clone()),
            (
                "aspectRatio",
                request
                    .aspect_ratio
                    .clone()
                    .unwrap_or_else(|| self.config.aspect_ratio.clone()),
            ),
            (
                "duration",
                request
                    .duration
                    .clone()
                    .unwrap_or_else(|| self.config.duration.clone()),
            ),
        ];

        if !self.config.is_pro() {
            fields.push((
                "size",
                request.size.clone().unwrap_or_else(|| self.config.size.clone()),
            ));
        }

        fields.push(("url", request.reference_image_url.clone()));
        fields
    }

    async fn try_submit(&self, request: &VideoRequest) -> ProviderResult<String> {
        let response = self
            .http
            .client()
            .post(&self.config.url)
            .query(&[("key", self.config.key.as_str())])
            .header(AUTHORIZATION, &self.config.key)
            .form(&self.form_fields(request))
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

    /// Query one detail endpoint. `Ok(None)` means this endpoint did not
    /// recognize the job.
    async fn query_endpoint(&self, query_url: &str, job_id: &str) -> ProviderResult<Option<Value>> {
        let response = self
            .http
            .client()
            .get(query_url)
            .query(&[("key", self.config.key.as_str()), ("id", job_id)])
            .header(AUTHORIZATION, &self.config.key)
            .timeout(self.http.timeouts().query)
            .send()
            .await?;
        let result = read_json(response).await?;

        if envelope_code(&result) != Some(200) {
            return Ok(None);
        }

        Ok(result.get("data").filter(|d| d.is_object()).cloned())
    }

    fn interpret(data: &Value) -> PollOutcome {
        match json_int(data.get("status")) {
            Some(0) => PollOutcome::queued(),
            Some(3) => PollOutcome::processing(),
            Some(1) => PollOutcome::succeeded(
                data.get("remote_url")
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            ),
            Some(2) => PollOutcome::failed(
                error_message(data).unwrap_or_else(|| "generation failed".to_string()),
            ),
            other => PollOutcome::unknown(format!("unrecognized status {:?}", other)),
        }
    }
}

#[async_trait]
impl ProviderAdapter for Sora2Adapter {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn submit_video(&self, request: &VideoRequest) -> Option<String> {
        match self.http.observe("submit_video", self.try_submit(request)).await {
            Ok(id) => {
                info!(provider = PROVIDER_NAME, job_id = %id, "Video job submitted");
                Some(id)
            }
            Err(e) => {
                warn!(provider = PROVIDER_NAME, "Video submission failed: {}", e);
                None
            }
        }
    }

    async fn poll(&self, job_id: &str, kind: JobKind) -> PollOutcome {
        let mut last_error = None;

        for query_url in &self.config.query_urls {
            match self
                .http
                .observe("poll", self.query_endpoint(query_url, job_id))
                .await
            {
                Ok(Some(data)) => return Self::interpret(&data),
                Ok(None) => {
                    debug!(
                        provider = PROVIDER_NAME,
                        job_id = job_id,
                        "{} does not know this job",
                        query_url
                    );
                }
                Err(e) => {
                    debug!(
                        provider = PROVIDER_NAME,
                        job_id = job_id,
                        kind = %kind,
                        "Poll of {} failed: {}",
                        query_url,
                        e
                    );
                    last_error = Some(e.to_string());
                }
            }
        }

        PollOutcome::unknown(
            last_error.unwrap_or_else(|| "no detail endpoint recognized the job".to_string()),
        )
    }

    async fn download(&self, url: &str, dest: &Path) -> bool {
        self.http.download(url, dest).await
    }
}
