// Submitting the distributed map-only job

use std::path::PathBuf;
use anyhow::Result;
use crate::config::defs::LAUNCHER_TAG;
use crate::utils::command::{check_status, launcher, run_tool};

/// How the manifest is cut into work units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitPolicy {
    OneLinePerWorker,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub manifest: String,
    pub worker_program: PathBuf,
    /// Options placed before the worker's two positional arguments (manifest, output directory).
    pub worker_options: Vec<String>,
    pub output_dir: String,
    pub num_workers: usize,
    pub num_reducers: usize,
    pub split: SplitPolicy,
}

impl JobSpec {
    /// One worker per manifest line and no reduce phase.
    pub fn map_only(manifest: &str, worker_program: PathBuf, output_dir: &str, num_lines: usize) -> Self {
        JobSpec {
            manifest: manifest.to_string(),
            worker_program,
            worker_options: Vec::new(),
            output_dir: output_dir.to_string(),
            num_workers: num_lines,
            num_reducers: 0,
            split: SplitPolicy::OneLinePerWorker,
        }
    }

    pub fn with_worker_options(mut self, options: Vec<String>) -> Self {
        self.worker_options = options;
        self
    }
}

#[allow(async_fn_in_trait)]
pub trait JobSubmitter {
    /// Blocks until the job has finished. An abnormal end is an error.
    async fn submit(&self, job: &JobSpec) -> Result<()>;
}

/// Runs the job through `hadoop jar <streaming jar>`.
#[derive(Debug, Clone)]
pub struct StreamingSubmitter {
    launcher: PathBuf,
    streaming_jar: String,
}

impl StreamingSubmitter {
    pub fn new(launcher: PathBuf, streaming_jar: impl Into<String>) -> Self {
        StreamingSubmitter { launcher, streaming_jar: streaming_jar.into() }
    }

    pub fn command_line(&self, job: &JobSpec) -> Result<Vec<String>> {
        let mut cmd = vec![self.launcher.to_string_lossy().to_string()];
        cmd.extend(launcher::arg_generator(&self.streaming_jar, job)?);
        Ok(cmd)
    }
}

impl JobSubmitter for StreamingSubmitter {
    async fn submit(&self, job: &JobSpec) -> Result<()> {
        let args = launcher::arg_generator(&self.streaming_jar, job)?;
        let output = run_tool(LAUNCHER_TAG, &self.launcher, &args).await?;
        check_status(LAUNCHER_TAG, &output)
    }
}
