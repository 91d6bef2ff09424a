//! Report downloads: one workbook per study, fetched on a worker pool.

use crate::fetch::{HttpClient, fetch_bytes};
use crate::portal::catalog::StudyRef;
use crate::portal::validation::ExistingFileValidator;
use anyhow::{Context, Result, bail};
use chrono::Utc;
use reqwest::Url;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{Instrument, error, info};

/// Bin size of the downloaded report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeInterval {
    OneMinute,
    FiveMinutes,
    TenMinutes,
    ThirtyMinutes,
    OneHour,
}

impl TimeInterval {
    pub const ALL: [TimeInterval; 5] = [
        TimeInterval::OneMinute,
        TimeInterval::FiveMinutes,
        TimeInterval::TenMinutes,
        TimeInterval::ThirtyMinutes,
        TimeInterval::OneHour,
    ];

    pub fn seconds(self) -> u32 {
        match self {
            TimeInterval::OneMinute => 60,
            TimeInterval::FiveMinutes => 300,
            TimeInterval::TenMinutes => 600,
            TimeInterval::ThirtyMinutes => 1800,
            TimeInterval::OneHour => 3600,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TimeInterval::OneMinute => "1 minute",
            TimeInterval::FiveMinutes => "5 minutes",
            TimeInterval::TenMinutes => "10 minutes",
            TimeInterval::ThirtyMinutes => "30 minutes",
            TimeInterval::OneHour => "1 hour",
        }
    }
}

impl fmt::Display for TimeInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TimeInterval {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match TimeInterval::ALL.into_iter().find(|i| i.label() == s.trim()) {
            Some(interval) => Ok(interval),
            None => {
                let options: Vec<&str> = TimeInterval::ALL.iter().map(|i| i.label()).collect();
                bail!("time_interval must be one of {options:?}, got {s:?}")
            }
        }
    }
}

/// Report endpoint for one study at the given bin size.
pub fn report_url(base: &Url, study_id: &str, interval: TimeInterval) -> Result<Url> {
    let mut url = base.join(&format!("studies/{study_id}/report"))?;
    url.query_pairs_mut()
        .append_pair("download_token", &Utc::now().timestamp().to_string())
        .append_pair("report[format]", "xlsx")
        .append_pair("report[bin_size]", &interval.seconds().to_string())
        .append_pair("report[worksheet_grouping]", "by_direction")
        .append_pair("report[approach_order]", "n_ne_e_se_s_sw_w_nw")
        .append_pair("report[include_raw_data]", "false")
        .append_pair("report[forced_peak_enabled]", "false");
    Ok(url)
}

/// `<folder>/<type>-<id>.xlsx`
pub fn report_path(folder: &Path, study: &StudyRef) -> PathBuf {
    folder.join(format!("{}-{}.xlsx", study.study_type, study.id))
}

/// Downloads report workbooks into a folder, unconditionally.
pub struct DownloadsProvider<C> {
    client: C,
    base_url: Url,
    folder: PathBuf,
    interval: TimeInterval,
}

impl<C: HttpClient> DownloadsProvider<C> {
    pub fn new(client: C, base_url: Url, folder: PathBuf, interval: TimeInterval) -> Self {
        Self {
            client,
            base_url,
            folder,
            interval,
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn target_path(&self, study: &StudyRef) -> PathBuf {
        report_path(&self.folder, study)
    }

    /// Fetches one report and writes it to [`Self::target_path`].
    pub async fn download(&self, study: &StudyRef) -> Result<PathBuf> {
        let url = report_url(&self.base_url, &study.id, self.interval)?;
        let bytes = fetch_bytes(&self.client, url.as_str()).await?;

        let path = self.target_path(study);
        tokio::fs::create_dir_all(&self.folder).await?;
        tokio::fs::write(&path, &bytes)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;

        info!(study_id = %study.id, bytes = bytes.len(), "Report downloaded");
        Ok(path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Downloaded(PathBuf),
    Skipped(PathBuf),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: Vec<String>,
}

/// Wraps a [`DownloadsProvider`] with an existence check and a fixed-size
/// worker pool.
pub struct ValidatingDownloader<C, V> {
    provider: Arc<DownloadsProvider<C>>,
    validator: Arc<V>,
    concurrency: usize,
}

impl<C, V> ValidatingDownloader<C, V>
where
    C: HttpClient + 'static,
    V: ExistingFileValidator + 'static,
{
    pub fn new(provider: DownloadsProvider<C>, validator: V, concurrency: usize) -> Self {
        Self {
            provider: Arc::new(provider),
            validator: Arc::new(validator),
            concurrency: concurrency.max(1),
        }
    }

    pub fn provider(&self) -> &DownloadsProvider<C> {
        &self.provider
    }

    /// Downloads one study unless its target already exists.
    pub async fn download_one(&self, study: &StudyRef) -> Result<DownloadOutcome> {
        fetch_unless_present(&self.provider, self.validator.as_ref(), study).await
    }

    /// Downloads every study, at most `concurrency` at a time. Failures are
    /// logged per study and do not stop the others.
    pub async fn download_all(&self, studies: &[StudyRef]) -> DownloadSummary {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = Vec::with_capacity(studies.len());

        for study in studies {
            let sem = semaphore.clone();
            let provider = self.provider.clone();
            let validator = self.validator.clone();
            let study = study.clone();
            let study_id = study.id.clone();

            let span = tracing::info_span!(
                "download_study",
                study_id = %study.id,
                study_type = %study.study_type,
            );

            let task = tokio::spawn(
                async move {
                    let _permit = sem.acquire_owned().await?;
                    fetch_unless_present(&provider, validator.as_ref(), &study).await
                }
                .instrument(span),
            );
            tasks.push((study_id, task));
        }

        let mut summary = DownloadSummary::default();
        for (study_id, task) in tasks {
            match task.await {
                Ok(Ok(DownloadOutcome::Downloaded(_))) => summary.downloaded += 1,
                Ok(Ok(DownloadOutcome::Skipped(_))) => summary.skipped += 1,
                Ok(Err(e)) => {
                    error!(study_id = %study_id, error = ?e, "Error occurred for study");
                    summary.failed.push(study_id);
                }
                Err(e) => {
                    error!(study_id = %study_id, error = %e, "Download task panicked");
                    summary.failed.push(study_id);
                }
            }
        }

        info!(
            downloaded = summary.downloaded,
            skipped = summary.skipped,
            failed = summary.failed.len(),
            "Downloads finished"
        );
        summary
    }
}

async fn fetch_unless_present<C: HttpClient, V: ExistingFileValidator + ?Sized>(
    provider: &DownloadsProvider<C>,
    validator: &V,
    study: &StudyRef,
) -> Result<DownloadOutcome> {
    let target = provider.target_path(study);
    if validator.is_existing_file(&target) {
        info!(study_id = %study.id, path = %target.display(), "Report already present, skipping");
        return Ok(DownloadOutcome::Skipped(target));
    }
    provider.download(study).await.map(DownloadOutcome::Downloaded)
}
