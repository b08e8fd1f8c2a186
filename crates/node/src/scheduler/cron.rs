use super::SchedulerError;
use crate::process::{to_args, ProcessRunner};
use log::{debug, info};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::NamedTempFile;

const CRONTAB_BINARY: &str = "crontab";

/// Reads and rewrites the current user's crontab.
pub(crate) struct CronScheduler {
    runner: Arc<dyn ProcessRunner>,
    work_dir: PathBuf,
}

impl CronScheduler {
    /// `work_dir` holds the temporary job table handed to `crontab`.
    pub(crate) fn new(runner: Arc<dyn ProcessRunner>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            work_dir: work_dir.into(),
        }
    }

    /// Current job lines. A user without a crontab has no jobs.
    pub(crate) async fn jobs(&self) -> Result<Vec<String>, SchedulerError> {
        let output = self
            .runner
            .output(CRONTAB_BINARY, &to_args(&["-l"]))
            .await?;
        if !output.success() {
            debug!("crontab -l: {}", output.stderr.trim());
            return Ok(Vec::new());
        }

        Ok(output
            .stdout
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Appends `line` to the job table unless an identical line is present.
    /// Returns whether the table changed.
    pub(crate) async fn schedule(&self, line: &str) -> Result<bool, SchedulerError> {
        let mut jobs = self.jobs().await?;
        if jobs.iter().any(|job| job.trim() == line.trim()) {
            debug!("Job already scheduled: {line}");
            return Ok(false);
        }

        jobs.push(line.trim().to_string());
        self.install(&jobs).await?;
        info!("Scheduled job: {line}");
        Ok(true)
    }

    async fn install(&self, jobs: &[String]) -> Result<(), SchedulerError> {
        let io_error = |source| SchedulerError::Io {
            path: self.work_dir.clone(),
            source,
        };

        let mut table = NamedTempFile::new_in(&self.work_dir).map_err(io_error)?;
        for job in jobs {
            writeln!(table, "{job}").map_err(io_error)?;
        }
        table.flush().map_err(io_error)?;

        let path = table.path().to_string_lossy().into_owned();
        self.runner.run(CRONTAB_BINARY, &[path]).await?;
        Ok(())
    }
}
