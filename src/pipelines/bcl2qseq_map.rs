//! The per-line map step of a distributed bcl2qseq job.
//!
//! Each input line is one manifest record. The record is turned back into a
//! bclToQseq command line, the converter writes its qseq file into a local
//! scratch directory and the result is uploaded to the job's output directory.

use std::path::Path;
use std::process::Stdio;
use anyhow::{anyhow, Result};
use log::{debug, info};
use shell_escape::escape;
use tokio::io::AsyncBufRead;
use tokio::io::AsyncBufReadExt;
use tokio::process::Command;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::LinesStream;
use crate::config::defs::{DriverError, BCL_TO_QSEQ_TAG, KEY_CONVERTER, KEY_MODULE, KEY_QSEQ_FILE, SH_TAG, STATUS_PREFIX};
use crate::utils::dfs::DistFs;
use crate::utils::file::{file_name, remote_join};
use crate::utils::manifest::parse_manifest_line;

/// A converter command line rebuilt from one manifest record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConverterInvocation {
    pub converter: String,
    pub module: Option<String>,
    /// Converter flags in manifest order; an empty value is a bare switch.
    pub flags: Vec<(String, String)>,
}

impl ConverterInvocation {
    pub fn from_entries(entries: Vec<(String, String)>) -> Result<Self, DriverError> {
        let mut converter = None;
        let mut module = None;
        let mut flags = Vec::new();
        for (key, value) in entries {
            match key.as_str() {
                KEY_CONVERTER => converter = Some(value),
                KEY_MODULE => module = Some(value).filter(|m| !m.is_empty()),
                k if k.starts_with("--") => flags.push((key, value)),
                other => {
                    return Err(DriverError::MalformedManifest(format!("unexpected key '{}'", other)));
                }
            }
        }
        let converter = converter
            .filter(|c| !c.is_empty())
            .ok_or_else(|| DriverError::MalformedManifest(format!("no '{}' entry", KEY_CONVERTER)))?;
        Ok(ConverterInvocation { converter, module, flags })
    }

    pub fn from_line(line: &str) -> Result<Self, DriverError> {
        Self::from_entries(parse_manifest_line(line)?)
    }

    pub fn qseq_file(&self) -> Option<&str> {
        self.flag(KEY_QSEQ_FILE)
    }

    pub fn flag(&self, key: &str) -> Option<&str> {
        self.flags.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// Points the converter at a different output file.
    pub fn set_qseq_file(&mut self, path: &str) {
        match self.flags.iter_mut().find(|(k, _)| k == KEY_QSEQ_FILE) {
            Some((_, value)) => *value = path.to_string(),
            None => self.flags.push((KEY_QSEQ_FILE.to_string(), path.to_string())),
        }
    }

    pub fn arg_generator(&self) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        for (key, value) in &self.flags {
            args_vec.push(key.clone());
            if !value.is_empty() {
                args_vec.push(value.clone());
            }
        }
        args_vec
    }

    /// `module load <MOD> && <converter> <args>`, every word quoted for `sh`.
    pub fn shell_command(&self) -> String {
        let converter_cmd: Vec<String> = std::iter::once(self.converter.clone())
            .chain(self.arg_generator())
            .map(|word| escape(word.into()).into_owned())
            .collect();
        match &self.module {
            Some(module) => format!("module load {} && {}", escape(module.as_str().into()), converter_cmd.join(" ")),
            None => converter_cmd.join(" "),
        }
    }

    /// Runs the converter and waits for it.
    pub async fn execute(&self) -> Result<()> {
        let mut cmd = match self.module {
            Some(_) => {
                let mut cmd = Command::new(SH_TAG);
                cmd.arg("-c").arg(self.shell_command());
                cmd
            }
            None => {
                let mut cmd = Command::new(&self.converter);
                cmd.args(self.arg_generator());
                cmd
            }
        };
        debug!("Running {}", self.shell_command());
        let output = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| anyhow!("Failed to spawn {}: {}. Is {} installed?", self.converter, e, BCL_TO_QSEQ_TAG))?;
        if !output.status.success() {
            let err = DriverError::ToolExecution {
                tool: BCL_TO_QSEQ_TAG.to_string(),
                error: format!(
                    "exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            };
            return Err(err.into());
        }
        Ok(())
    }
}

/// Hadoop streaming hands NLineInputFormat records over as `<offset>\t<line>`.
fn strip_record_key(line: &str) -> &str {
    match line.split_once('\t') {
        Some((_, record)) => record,
        None => line,
    }
}

/// Converts every task read from `input`, in order, stopping at the first failure.
///
/// # Arguments
///
/// * `input` - Manifest lines, one task per line.
/// * `output_dir` - Output directory on the shared filesystem.
/// * `fs` - Shared filesystem client used for the upload.
/// * `scratch` - Local directory where the converter writes.
///
/// # Returns
/// Number of tasks converted.
pub async fn run_map<I, F>(input: I, output_dir: &str, fs: &F, scratch: &Path) -> Result<usize>
where
    I: AsyncBufRead + Unpin,
    F: DistFs,
{
    let mut lines = LinesStream::new(input.lines());
    let mut converted = 0usize;
    while let Some(line) = lines.next().await {
        let line = line?;
        let record = strip_record_key(&line).trim();
        if record.is_empty() {
            continue;
        }
        let mut invocation = ConverterInvocation::from_line(record)?;

        let name = invocation
            .qseq_file()
            .and_then(file_name)
            .map(|n| n.to_string())
            .unwrap_or_else(|| format!("task_{:05}_qseq.txt", converted));
        let local = scratch.join(&name);
        let local_str = local
            .to_str()
            .ok_or_else(|| anyhow!("Scratch path {} is not valid UTF-8", local.display()))?;
        invocation.set_qseq_file(local_str);

        eprintln!("{}converting {}", STATUS_PREFIX, name);
        invocation.execute().await?;

        if !local.exists() {
            return Err(anyhow!("{} finished without writing {}", BCL_TO_QSEQ_TAG, local.display()));
        }
        let remote = remote_join(output_dir, &name);
        fs.copy(&local, &remote)
            .await
            .map_err(|e| anyhow!("Failed to upload {} to {}: {}", local.display(), remote, e))?;
        tokio::fs::remove_file(&local).await?;
        info!("Converted {} to {}", record, remote);
        eprintln!("{}uploaded {}", STATUS_PREFIX, name);
        converted += 1;
    }
    Ok(converted)
}
