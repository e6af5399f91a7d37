//! Driver for a distributed BCL to Qseq conversion.
//!
//! Needs direct access to the sequencer's run directory. It writes a manifest
//! with one conversion task per tile, publishes it next to the output
//! directory on the shared filesystem and launches a map-only job in which
//! every manifest line is handled by exactly one worker.

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use crate::config::defs::{DriverConfig, DriverError};
use crate::utils::command::ExecutableResolver;
use crate::utils::dfs::DistFs;
use crate::utils::diagnostics::Diagnostics;
use crate::utils::file::{local_run_dir, remote_manifest_path, unique_suffix};
use crate::utils::job::{JobSpec, JobSubmitter};
use crate::utils::manifest::write_manifest;
use crate::utils::run_dir::RunDescriptor;
use crate::utils::tasks::{TaskEnumerator, TaskParams};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Init,
    Staged,
    Submitted,
    Done,
    Failed,
}

/// A manifest that has been uploaded. The local copy lives as long as this does.
#[derive(Debug)]
pub struct StagedManifest {
    pub remote_path: String,
    pub records: usize,
    local: NamedTempFile,
}

impl StagedManifest {
    pub fn local_path(&self) -> &Path {
        self.local.path()
    }
}

pub struct DistBcl2QseqDriver<R, F, D>
where
    R: RunDescriptor,
    F: DistFs,
    D: Diagnostics,
{
    config: DriverConfig,
    run: R,
    fs: F,
    diag: D,
    launcher: PathBuf,
    worker: PathBuf,
    state: DriverState,
}

impl<R, F, D> DistBcl2QseqDriver<R, F, D>
where
    R: RunDescriptor,
    F: DistFs,
    D: Diagnostics,
{
    /// Validates everything that can be validated before touching the shared
    /// filesystem, then checks that the output directory does not exist yet.
    ///
    /// # Arguments
    ///
    /// * `config` - Settings from the command line.
    /// * `open_run` - Reads the run directory once its path has been accepted.
    /// * `fs` - Shared filesystem client.
    /// * `resolver` - Locates the job launcher and the worker program.
    /// * `diag` - Where progress and problems are reported.
    ///
    /// # Returns
    /// A driver in the `Init` state, or a `DriverError::Configuration`.
    pub async fn init<O, X>(
        config: DriverConfig,
        open_run: O,
        fs: F,
        resolver: &X,
        diag: D,
    ) -> Result<Self, DriverError>
    where
        O: FnOnce(&Path) -> anyhow::Result<R>,
        X: ExecutableResolver,
    {
        let run_path = local_run_dir(&config.run_dir)?;
        if !run_path.is_dir() {
            return Err(DriverError::Configuration(format!(
                "Run directory {} does not exist or is not a directory",
                run_path.display()
            )));
        }
        let run = open_run(&run_path).map_err(|e| DriverError::Configuration(e.to_string()))?;
        diag.debug(&format!(
            "Run {} on {}: {} lanes, {} reads, {} tiles",
            run.run_id(),
            run.instrument(),
            run.lanes().len(),
            run.reads().len(),
            run.tiles().len()
        ));

        let launcher = resolver.resolve(&config.launcher).ok_or_else(|| {
            DriverError::Configuration(format!("Can't find {} executable in PATH", config.launcher))
        })?;
        let worker = resolver.resolve(&config.worker).ok_or_else(|| {
            DriverError::Configuration(format!("Can't find {} executable in PATH", config.worker))
        })?;

        let output_exists = fs.exists(&config.output_dir).await.map_err(|e| {
            DriverError::Configuration(format!("Could not check output path {}: {}", config.output_dir, e))
        })?;
        if output_exists {
            return Err(DriverError::Configuration(format!(
                "output path {} already exists.",
                config.output_dir
            )));
        }

        Ok(DistBcl2QseqDriver {
            config,
            run,
            fs,
            diag,
            launcher,
            worker,
            state: DriverState::Init,
        })
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn launcher(&self) -> &Path {
        &self.launcher
    }

    pub fn task_params(&self) -> TaskParams {
        TaskParams {
            converter: self.config.bcl_to_qseq.clone(),
            module: self.config.module.clone(),
            output_dir: self.config.output_dir.clone(),
        }
    }

    /// Stages the manifest, runs the job and removes the manifest again,
    /// whatever the job's outcome.
    pub async fn run<J: JobSubmitter>(&mut self, submitter: &J) -> Result<(), DriverError> {
        let staged = match self.stage().await {
            Ok(staged) => staged,
            Err(e) => {
                self.state = DriverState::Failed;
                return Err(e);
            }
        };
        self.state = DriverState::Staged;

        let outcome = self.launch(submitter, &staged).await;
        self.cleanup(&staged.remote_path).await;
        drop(staged);

        self.state = match outcome {
            Ok(()) => DriverState::Done,
            Err(_) => DriverState::Failed,
        };
        outcome
    }

    /// Writes the manifest to a local temporary file and uploads it.
    pub async fn stage(&self) -> Result<StagedManifest, DriverError> {
        let params = self.task_params();
        let enumerator = TaskEnumerator::new(&self.run, &params);
        let expected = enumerator.task_count();

        let mut local = tempfile::Builder::new()
            .prefix("dist_bcl2qseq")
            .tempfile()
            .map_err(|e| DriverError::Staging(format!("Failed to create temporary manifest: {}", e)))?;
        let records = {
            let mut writer = BufWriter::new(local.as_file_mut());
            let records = write_manifest(&mut writer, enumerator.tasks())?;
            writer
                .flush()
                .map_err(|e| DriverError::Staging(format!("Failed to flush temporary manifest: {}", e)))?;
            records
        };
        local
            .as_file()
            .sync_all()
            .map_err(|e| DriverError::Staging(format!("Failed to sync temporary manifest: {}", e)))?;
        if records != expected {
            return Err(DriverError::Staging(format!(
                "Wrote {} manifest records but the run has {} tasks",
                records, expected
            )));
        }
        self.diag.debug(&format!("Wrote temp input file {} ({} records)", local.path().display(), records));

        let remote_path = remote_manifest_path(&self.config.output_dir, &unique_suffix());
        self.diag.debug(&format!("copying input from {} to {}", local.path().display(), remote_path));
        if let Err(e) = self.fs.copy(local.path(), &remote_path).await {
            // a failed upload may still have left a partial file behind
            self.cleanup(&remote_path).await;
            return Err(DriverError::Staging(format!(
                "Failed to copy manifest to {}: {}",
                remote_path, e
            )));
        }

        Ok(StagedManifest { remote_path, records, local })
    }

    async fn launch<J: JobSubmitter>(&mut self, submitter: &J, staged: &StagedManifest) -> Result<(), DriverError> {
        let job = JobSpec::map_only(&staged.remote_path, self.worker.clone(), &self.config.output_dir, staged.records)
            .with_worker_options(vec!["--fs".to_string(), self.config.fs.label().to_string()]);
        self.diag.info("Run analyzed.  Launching distributed job");
        self.diag.debug(&format!("{:?}", job));
        self.state = DriverState::Submitted;
        submitter
            .submit(&job)
            .await
            .map_err(|e| DriverError::JobExecution(e.to_string()))?;
        self.diag.info("Distributed job complete");
        Ok(())
    }

    /// Best effort: a failure here is reported and otherwise ignored.
    async fn cleanup(&self, remote_path: &str) {
        if let Err(e) = self.fs.recursive_remove(remote_path).await {
            let err = DriverError::Cleanup(format!("Error deleting temporary input file {}: {}", remote_path, e));
            self.diag.error(&err.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use anyhow::{anyhow, Result};
    use log::Level;
    use tempfile::TempDir;
    use crate::cli::FsBackend;
    use crate::utils::diagnostics::MemorySink;
    use crate::utils::run_dir::ReadDefinition;

    struct FakeRun {
        reads: Vec<ReadDefinition>,
    }

    impl RunDescriptor for FakeRun {
        fn instrument(&self) -> &str { "M00123" }
        fn run_id(&self) -> &str { "42" }
        fn lanes(&self) -> &[u32] { &[1] }
        fn reads(&self) -> &[ReadDefinition] { &self.reads }
        fn tiles(&self) -> &[u32] { &[1101, 1102] }
        fn base_calls_dir(&self) -> PathBuf { PathBuf::from("/run/Data/Intensities/BaseCalls") }
        fn filter_path(&self, lane: u32, tile: u32) -> PathBuf { PathBuf::from(format!("/run/s_{}_{}.filter", lane, tile)) }
        fn control_path(&self, lane: u32, tile: u32) -> PathBuf { PathBuf::from(format!("/run/s_{}_{}.control", lane, tile)) }
        fn positions_path(&self, lane: u32, tile: u32) -> PathBuf { PathBuf::from(format!("/run/s_{}_{}.clocs", lane, tile)) }
        fn qseq_name(&self, lane: u32, tile: u32, read: u32) -> String { format!("s_{}_{}_{:04}_qseq.txt", lane, read, tile) }
    }

    #[derive(Default)]
    struct RecordingFs {
        existing: Vec<String>,
        uploaded: RefCell<Vec<(String, String)>>,
        removed: RefCell<Vec<String>>,
    }

    impl DistFs for RecordingFs {
        async fn exists(&self, path: &str) -> Result<bool> {
            Ok(self.existing.iter().any(|p| p == path))
        }
        async fn copy(&self, local: &Path, remote: &str) -> Result<()> {
            let text = std::fs::read_to_string(local)?;
            self.uploaded.borrow_mut().push((remote.to_string(), text));
            Ok(())
        }
        async fn recursive_remove(&self, path: &str) -> Result<()> {
            self.removed.borrow_mut().push(path.to_string());
            Ok(())
        }
    }

    struct AnyResolver;

    impl ExecutableResolver for AnyResolver {
        fn resolve(&self, name: &str) -> Option<PathBuf> {
            Some(PathBuf::from("/usr/bin").join(name))
        }
    }

    struct OkSubmitter;

    impl JobSubmitter for OkSubmitter {
        async fn submit(&self, _job: &JobSpec) -> Result<()> {
            Ok(())
        }
    }

    struct FailingSubmitter;

    impl JobSubmitter for FailingSubmitter {
        async fn submit(&self, _job: &JobSpec) -> Result<()> {
            Err(anyhow!("hadoop exited with 1"))
        }
    }

    fn config(run_dir: &Path) -> DriverConfig {
        DriverConfig {
            run_dir: run_dir.to_string_lossy().to_string(),
            output_dir: "/user/seq/out".to_string(),
            module: None,
            bcl_to_qseq: "bclToQseq".to_string(),
            launcher: "hadoop".to_string(),
            streaming_jar: "hadoop-streaming.jar".to_string(),
            worker: "bcl2qseq_map".to_string(),
            fs: FsBackend::Hdfs,
        }
    }

    fn open_fake(_: &Path) -> Result<FakeRun> {
        Ok(FakeRun { reads: vec![ReadDefinition::new(1, 1, 100)?] })
    }

    #[tokio::test]
    async fn test_stage_uploads_one_line_per_tile() -> Result<()> {
        let run_dir = TempDir::new()?;
        let fs = RecordingFs::default();
        let sink = MemorySink::new();
        let driver = DistBcl2QseqDriver::init(config(run_dir.path()), open_fake, &fs, &AnyResolver, &sink).await?;

        let staged = driver.stage().await?;
        assert_eq!(staged.records, 2);
        assert!(staged.remote_path.starts_with("/user/seq/dist_bcl2qseq_input"));
        assert!(staged.local_path().exists());

        let uploaded = fs.uploaded.borrow();
        assert_eq!(uploaded.len(), 1);
        let (remote, text) = &uploaded[0];
        assert_eq!(remote, &staged.remote_path);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        for (line, tile) in lines.iter().zip(["1101", "1102"]) {
            assert!(line.contains("--lane:1;"));
            assert!(line.contains("--read:1;"));
            assert!(line.contains("--first-cycle:1;"));
            assert!(line.contains("--number-of-cycles:100;"));
            assert!(line.contains(&format!("--tile:{};", tile)));
        }

        let local = staged.local_path().to_path_buf();
        drop(staged);
        assert!(!local.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_run_cleans_up_after_success() -> Result<()> {
        let run_dir = TempDir::new()?;
        let fs = RecordingFs::default();
        let sink = MemorySink::new();
        let mut driver = DistBcl2QseqDriver::init(config(run_dir.path()), open_fake, &fs, &AnyResolver, &sink).await?;
        assert_eq!(driver.state(), DriverState::Init);

        driver.run(&OkSubmitter).await?;
        assert_eq!(driver.state(), DriverState::Done);
        let uploaded = fs.uploaded.borrow()[0].0.clone();
        assert_eq!(*fs.removed.borrow(), vec![uploaded]);
        assert!(sink.contains(Level::Info, "Distributed job complete"));
        Ok(())
    }

    #[tokio::test]
    async fn test_run_cleans_up_after_job_failure() -> Result<()> {
        let run_dir = TempDir::new()?;
        let fs = RecordingFs::default();
        let sink = MemorySink::new();
        let mut driver = DistBcl2QseqDriver::init(config(run_dir.path()), open_fake, &fs, &AnyResolver, &sink).await?;

        let err = driver.run(&FailingSubmitter).await.unwrap_err();
        assert!(matches!(err, DriverError::JobExecution(_)));
        assert!(!err.is_setup_rejection());
        assert_eq!(driver.state(), DriverState::Failed);
        assert_eq!(fs.removed.borrow().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_existing_output_is_rejected() -> Result<()> {
        let run_dir = TempDir::new()?;
        let fs = RecordingFs { existing: vec!["/user/seq/out".to_string()], ..Default::default() };
        let result = DistBcl2QseqDriver::init(config(run_dir.path()), open_fake, &fs, &AnyResolver, MemorySink::new()).await;
        match result {
            Err(DriverError::Configuration(msg)) => assert!(msg.contains("already exists")),
            Err(e) => panic!("unexpected error {:?}", e),
            Ok(_) => panic!("pre-existing output accepted"),
        }
        assert!(fs.uploaded.borrow().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_launcher_is_rejected() -> Result<()> {
        struct NoResolver;
        impl ExecutableResolver for NoResolver {
            fn resolve(&self, _name: &str) -> Option<PathBuf> {
                None
            }
        }
        let run_dir = TempDir::new()?;
        let fs = RecordingFs::default();
        let result = DistBcl2QseqDriver::init(config(run_dir.path()), open_fake, &fs, &NoResolver, MemorySink::new()).await;
        assert!(matches!(result, Err(DriverError::Configuration(ref msg)) if msg.contains("hadoop")));
        Ok(())
    }
}
