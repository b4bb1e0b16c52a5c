//! Test doubles shared by unit tests.

use std::path::Path;

use async_trait::async_trait;
use mockall::mock;
use scenegen_models::JobKind;
use scenegen_providers::{ImageRequest, PollOutcome, ProviderAdapter, VideoRequest};

mock! {
    pub Provider {}

    #[async_trait]
    impl ProviderAdapter for Provider {
        fn name(&self) -> &str;
        async fn submit_image(&self, request: &ImageRequest) -> Option<String>;
        async fn submit_video(&self, request: &VideoRequest) -> Option<String>;
        async fn poll(&self, job_id: &str, kind: JobKind) -> PollOutcome;
        async fn download(&self, url: &str, dest: &Path) -> bool;
    }
}
