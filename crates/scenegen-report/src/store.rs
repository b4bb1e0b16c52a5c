//! Report persistence.
//!
//! Both files are written atomically (sibling temp file, then rename) and
//! every load-merge-save cycle runs under one async mutex, so writers in
//! the same process never interleave.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{ReportError, ReportResult};
use crate::interactive::InteractiveIndex;
use crate::report::GenerationReport;

pub const REPORT_FILE: &str = "generation_report.json";
pub const INTERACTIVE_FILE: &str = "interactive_data.json";

/// Report files of one output directory.
#[derive(Debug)]
pub struct ReportStore {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl ReportStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn report_path(&self) -> PathBuf {
        self.dir.join(REPORT_FILE)
    }

    pub fn interactive_path(&self) -> PathBuf {
        self.dir.join(INTERACTIVE_FILE)
    }

    pub async fn load_report(&self) -> ReportResult<Option<GenerationReport>> {
        read_json(&self.report_path()).await
    }

    pub async fn load_interactive(&self) -> ReportResult<Option<InteractiveIndex>> {
        read_json(&self.interactive_path()).await
    }

    /// Persist a run.
    ///
    /// A full run replaces both files. A partial run (restricted time slots
    /// or a resumed query) is merged into whatever is already on disk.
    /// Returns the report as written.
    pub async fn save_run(
        &self,
        report: &GenerationReport,
        partial: bool,
    ) -> ReportResult<GenerationReport> {
        let _guard = self.lock.lock().await;

        let mut report = report.clone();
        report.normalize();

        let mut index = InteractiveIndex::build(&report);

        if partial {
            if let Some(mut existing) = self.load_report().await? {
                existing.merge(report);
                report = existing;
            }
            if let Some(mut existing) = self.load_interactive().await? {
                existing.merge(index);
                index = existing;
            }
        }

        write_json_atomic(&self.report_path(), &report).await?;
        write_json_atomic(&self.interactive_path(), &index).await?;

        info!(
            dir = %self.dir.display(),
            partial = partial,
            scenes = report.scene_count(),
            images = report.summary().total.images,
            videos = report.summary().total.videos,
            "Report saved"
        );

        Ok(report)
    }

    /// Rebuild `interactive_data.json` from the saved report.
    pub async fn regenerate_interactive(&self) -> ReportResult<InteractiveIndex> {
        let _guard = self.lock.lock().await;

        let report = self
            .load_report()
            .await?
            .ok_or_else(|| ReportError::not_found(self.report_path().display().to_string()))?;

        let index = InteractiveIndex::build(&report);
        write_json_atomic(&self.interactive_path(), &index).await?;

        info!(events = index.events.len(), "Interactive index regenerated");
        Ok(index)
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> ReportResult<Option<T>> {
    let text = match fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    serde_json::from_str(&text)
        .map(Some)
        .map_err(|e| ReportError::invalid(format!("{}: {}", path.display(), e)))
}

/// Serialize `value` as pretty JSON and move it over `path` atomically.
pub async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> ReportResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).await?;
        }
    }

    let mut body = serde_json::to_vec_pretty(value)?;
    body.push(b'\n');

    let tmp = path.with_extension("json.tmp");
    let written: std::io::Result<()> = async {
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(&body).await?;
        file.sync_all().await?;
        fs::rename(&tmp, path).await
    }
    .await;

    if let Err(e) = written {
        if let Err(cleanup) = fs::remove_file(&tmp).await {
            warn!("Failed to remove {}: {}", tmp.display(), cleanup);
        }
        return Err(e.into());
    }

    debug!(bytes = body.len(), "Wrote {}", path.display());
    Ok(())
}
