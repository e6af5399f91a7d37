// Clients for the shared filesystem holding manifests and job output

use std::io::ErrorKind;
use std::path::Path;
use anyhow::{anyhow, Result};
use crate::config::defs::HDFS_TAG;
use crate::utils::command::{check_status, hdfs, run_tool};
use crate::utils::file::{remote_parent, strip_file_scheme};

/// The three operations the driver and the map workers need from the distributed filesystem.
#[allow(async_fn_in_trait)]
pub trait DistFs {
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Uploads a local file to `remote`, creating missing parent directories.
    async fn copy(&self, local: &Path, remote: &str) -> Result<()>;

    /// Removes `path` and anything below it. A path that is already gone is not an error.
    async fn recursive_remove(&self, path: &str) -> Result<()>;
}

impl<F: DistFs + ?Sized> DistFs for &F {
    async fn exists(&self, path: &str) -> Result<bool> {
        (**self).exists(path).await
    }

    async fn copy(&self, local: &Path, remote: &str) -> Result<()> {
        (**self).copy(local, remote).await
    }

    async fn recursive_remove(&self, path: &str) -> Result<()> {
        (**self).recursive_remove(path).await
    }
}


/// Drives the `hdfs dfs` command line client.
#[derive(Debug, Clone)]
pub struct HdfsCli {
    program: String,
}

impl HdfsCli {
    pub fn new(program: impl Into<String>) -> Self {
        HdfsCli { program: program.into() }
    }
}

impl Default for HdfsCli {
    fn default() -> Self {
        HdfsCli::new(HDFS_TAG)
    }
}

impl DistFs for HdfsCli {
    async fn exists(&self, path: &str) -> Result<bool> {
        let output = run_tool(HDFS_TAG, &self.program, &hdfs::exists_args(path)).await?;
        // -test -e answers through the exit status: 0 present, 1 absent.
        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => {
                check_status(HDFS_TAG, &output)?;
                Err(anyhow!("{} -test -e {} ended abnormally", HDFS_TAG, path))
            }
        }
    }

    async fn copy(&self, local: &Path, remote: &str) -> Result<()> {
        let parent = remote_parent(remote);
        if !parent.is_empty() && parent != "/" {
            let output = run_tool(HDFS_TAG, &self.program, &hdfs::mkdir_args(&parent)).await?;
            check_status(HDFS_TAG, &output)?;
        }
        let output = run_tool(HDFS_TAG, &self.program, &hdfs::put_args(local, remote)).await?;
        check_status(HDFS_TAG, &output)
    }

    async fn recursive_remove(&self, path: &str) -> Result<()> {
        let output = run_tool(HDFS_TAG, &self.program, &hdfs::rmr_args(path)).await?;
        check_status(HDFS_TAG, &output)
    }
}


/// A shared filesystem mounted locally (NFS, Lustre, ...), or a single machine setup.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl DistFs for LocalFs {
    async fn exists(&self, path: &str) -> Result<bool> {
        let path = strip_file_scheme(path);
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| anyhow!("Failed to check {}: {}", path.display(), e))
    }

    async fn copy(&self, local: &Path, remote: &str) -> Result<()> {
        let remote = strip_file_scheme(remote);
        if let Some(parent) = remote.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| anyhow!("Failed to create {}: {}", parent.display(), e))?;
        }
        tokio::fs::copy(local, &remote)
            .await
            .map_err(|e| anyhow!("Failed to copy {} to {}: {}", local.display(), remote.display(), e))?;
        Ok(())
    }

    async fn recursive_remove(&self, path: &str) -> Result<()> {
        let path = strip_file_scheme(path);
        let meta = match tokio::fs::symlink_metadata(&path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(anyhow!("Failed to stat {}: {}", path.display(), e)),
        };
        let removed = if meta.is_dir() {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };
        match removed {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(anyhow!("Failed to remove {}: {}", path.display(), e)),
        }
    }
}
