//! Report serialization with bounded-retry writes

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::outcome::{Outcome, RunReport};

/// Columns of the tabular report, in order
const CSV_HEADER: &str = "target,action,success,message,started_at,finished_at";

/// Report serialization format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    /// Header row plus one escaped row per outcome
    #[default]
    Csv,
    /// One JSON object per line
    JsonLines,
}

/// Writes outcomes to a destination path.
///
/// Destinations can be contended, a shared network mount written by several
/// independent runs is the normal case, so every write goes through a
/// bounded retry loop with a fixed delay between attempts. Once retries are
/// exhausted the failure surfaces to the caller; data is never silently
/// dropped.
///
/// Two modes are supported and produce the same final content:
/// - [`ReportWriter::write`] serializes the whole report and atomically
///   replaces the destination (write temp file, rename over).
/// - [`ReportWriter::append`] appends rows as they arrive, writing the CSV
///   header only when the file is new or empty.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    path: PathBuf,
    format: ReportFormat,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl ReportWriter {
    /// Create a writer with the default retry policy (5 attempts, 2s apart)
    pub fn new(path: impl Into<PathBuf>, format: ReportFormat) -> Self {
        Self {
            path: path.into(),
            format,
            retry_attempts: 5,
            retry_delay: Duration::from_secs(2),
        }
    }

    /// Override the retry policy
    #[must_use]
    pub fn with_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.retry_attempts = attempts;
        self.retry_delay = delay;
        self
    }

    /// Destination path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialize the full report and atomically replace the destination.
    ///
    /// The report body lands in `<dest>.tmp` first and is renamed over the
    /// destination only when complete, so a failed write never leaves a
    /// partial file behind.
    ///
    /// # Errors
    /// Returns `CoreError::WriteFailed` once retries are exhausted.
    pub async fn write(&self, report: &RunReport) -> Result<(), CoreError> {
        let body = self.render(&report.outcomes, true)?;
        self.with_retries(|| self.write_atomic(&body)).await?;
        debug!(path = %self.path.display(), rows = report.outcomes.len(), "report written");
        Ok(())
    }

    /// Append outcomes to the destination.
    ///
    /// Opens the file in append mode and writes the batch with a single
    /// write call. The CSV header is added only when the file is absent or
    /// empty, so repeated appends stay strictly additive.
    ///
    /// # Errors
    /// Returns `CoreError::WriteFailed` once retries are exhausted.
    pub async fn append(&self, outcomes: &[Outcome]) -> Result<(), CoreError> {
        if outcomes.is_empty() {
            return Ok(());
        }
        let rows = self.render(outcomes, false)?;
        self.with_retries(|| self.append_rows(&rows)).await
    }

    fn render(&self, outcomes: &[Outcome], with_header: bool) -> Result<String, CoreError> {
        let mut out = String::new();
        match self.format {
            ReportFormat::Csv => {
                if with_header {
                    out.push_str(CSV_HEADER);
                    out.push('\n');
                }
                for outcome in outcomes {
                    out.push_str(&csv_row(outcome));
                    out.push('\n');
                }
            }
            ReportFormat::JsonLines => {
                for outcome in outcomes {
                    let line = serde_json::to_string(outcome)
                        .map_err(|e| CoreError::Serialize(e.to_string()))?;
                    out.push_str(&line);
                    out.push('\n');
                }
            }
        }
        Ok(out)
    }

    async fn with_retries<F, Fut>(&self, mut op: F) -> Result<(), CoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::io::Result<()>>,
    {
        let mut attempt: u32 = 1;
        loop {
            match op().await {
                Ok(()) => {
                    if attempt > 1 {
                        debug!(
                            attempt = attempt,
                            path = %self.path.display(),
                            "report write succeeded after retry"
                        );
                    }
                    return Ok(());
                }
                Err(e) if attempt < self.retry_attempts => {
                    warn!(
                        attempt = attempt,
                        max_attempts = self.retry_attempts,
                        error = %e,
                        path = %self.path.display(),
                        "report write failed, retrying"
                    );
                    tokio::time::sleep(self.retry_delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(CoreError::WriteFailed {
                        path: self.path.display().to_string(),
                        attempts: self.retry_attempts,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    async fn write_atomic(&self, body: &str) -> std::io::Result<()> {
        let tmp = self.tmp_path();
        if let Err(e) = tokio::fs::write(&tmp, body).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }
        Ok(())
    }

    async fn append_rows(&self, rows: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        let mut buf = String::new();
        if self.format == ReportFormat::Csv && file.metadata().await?.len() == 0 {
            buf.push_str(CSV_HEADER);
            buf.push('\n');
        }
        buf.push_str(rows);

        file.write_all(buf.as_bytes()).await?;
        file.flush().await
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

fn csv_row(outcome: &Outcome) -> String {
    format!(
        "{},{},{},{},{},{}",
        csv_escape(&outcome.target),
        csv_escape(&outcome.action),
        outcome.success(),
        csv_escape(&outcome.message),
        outcome.started_at.to_rfc3339(),
        outcome.finished_at.to_rfc3339(),
    )
}

fn csv_escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
