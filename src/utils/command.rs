/// Functions and structs for locating external tools and building their command lines

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use anyhow::{anyhow, Result};
use tokio::process::Command;

/// Finds executables by name.
pub trait ExecutableResolver {
    fn resolve(&self, name: &str) -> Option<PathBuf>;
}

/// Searches a `PATH`-style list of directories, the way a shell would.
#[derive(Debug, Clone, Default)]
pub struct PathResolver {
    search_path: Option<OsString>,
}

impl PathResolver {
    pub fn from_env() -> Self {
        PathResolver { search_path: std::env::var_os("PATH") }
    }

    pub fn with_search_path(search_path: impl Into<OsString>) -> Self {
        PathResolver { search_path: Some(search_path.into()) }
    }
}

impl ExecutableResolver for PathResolver {
    fn resolve(&self, name: &str) -> Option<PathBuf> {
        if name.is_empty() {
            return None;
        }
        // Anything with a separator is a path, not a name to search for.
        if name.contains(std::path::MAIN_SEPARATOR) || name.contains('/') {
            let path = PathBuf::from(name);
            return is_executable(&path).then_some(path);
        }
        let search_path = self.search_path.as_deref()?;
        std::env::split_paths(search_path)
            .map(|dir| dir.join(name))
            .find(|candidate| is_executable(candidate))
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}


/// Runs a tool to completion, capturing its output.
///
/// # Arguments
///
/// * `tag` - Name used in error messages.
/// * `program` - Executable to spawn.
/// * `args` - Command line arguments.
///
/// # Returns
/// The finished process' output, whatever its exit status.
pub async fn run_tool<S: AsRef<OsStr>>(tag: &str, program: impl AsRef<OsStr>, args: &[S]) -> Result<Output> {
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| anyhow!("Failed to spawn {}: {}. Is {} installed?", tag, e, tag))
}

/// Converts a non-zero exit into an error carrying the tail of stderr.
pub fn check_status(tag: &str, output: &Output) -> Result<()> {
    if output.status.success() {
        return Ok(());
    }
    Err(anyhow!("{} exited with {}: {}", tag, output.status, stderr_tail(output)))
}

fn stderr_tail(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(5);
    lines[start..].join(" | ")
}

pub mod hdfs {
    use std::path::Path;

    pub fn exists_args(path: &str) -> Vec<String> {
        vec!["dfs".to_string(), "-test".to_string(), "-e".to_string(), path.to_string()]
    }

    pub fn mkdir_args(path: &str) -> Vec<String> {
        vec!["dfs".to_string(), "-mkdir".to_string(), "-p".to_string(), path.to_string()]
    }

    pub fn put_args(local: &Path, remote: &str) -> Vec<String> {
        vec![
            "dfs".to_string(),
            "-put".to_string(),
            local.to_string_lossy().to_string(),
            remote.to_string(),
        ]
    }

    /// `-f` keeps an already removed path from being an error.
    pub fn rmr_args(path: &str) -> Vec<String> {
        vec!["dfs".to_string(), "-rm".to_string(), "-r".to_string(), "-f".to_string(), path.to_string()]
    }
}

pub mod launcher {
    use crate::config::defs::{
        JOB_NAME, JOB_NAME_PROP, LINES_PER_MAP_PROP, MAP_SPECULATIVE_PROP, MAP_TASKS_PROP, NLINE_INPUT_FORMAT,
        REDUCE_TASKS_PROP,
    };
    use anyhow::{anyhow, Result};
    use crate::utils::job::{JobSpec, SplitPolicy};

    /// Streaming splits the mapper command on whitespace and strips one level of
    /// single or double quotes; it is not run through a shell.
    fn quote_word(word: &str) -> Result<String> {
        if word.is_empty() {
            return Ok("\"\"".to_string());
        }
        let needs_quotes = word.chars().any(|c| c.is_whitespace() || c == '"' || c == '\'');
        if !needs_quotes {
            Ok(word.to_string())
        } else if !word.contains('"') {
            Ok(format!("\"{}\"", word))
        } else if !word.contains('\'') {
            Ok(format!("'{}'", word))
        } else {
            Err(anyhow!("Can't pass '{}' to the mapper: it contains both quote characters", word))
        }
    }

    /// The worker is shipped with `-files`, so tasks invoke it by its file name.
    pub fn mapper_command(job: &JobSpec) -> Result<String> {
        let program = job
            .worker_program
            .file_name()
            .ok_or_else(|| anyhow!("Worker path {} has no file name", job.worker_program.display()))?;
        let mut words = vec![quote_word(&program.to_string_lossy())?];
        for option in &job.worker_options {
            words.push(quote_word(option)?);
        }
        words.push(quote_word(&job.manifest)?);
        words.push(quote_word(&job.output_dir)?);
        Ok(words.join(" "))
    }

    /// Map-only streaming job: one map task per manifest line, no reducers.
    pub fn arg_generator(streaming_jar: &str, job: &JobSpec) -> Result<Vec<String>> {
        let mapper = mapper_command(job)?;
        let mut args_vec: Vec<String> = Vec::new();
        args_vec.push("jar".to_string());
        args_vec.push(streaming_jar.to_string());
        // generic options go before the streaming ones
        args_vec.push("-files".to_string());
        args_vec.push(job.worker_program.to_string_lossy().to_string());
        args_vec.push("-D".to_string());
        args_vec.push(format!("{}={}", JOB_NAME_PROP, JOB_NAME));
        args_vec.push("-D".to_string());
        args_vec.push(format!("{}={}", REDUCE_TASKS_PROP, job.num_reducers));
        args_vec.push("-D".to_string());
        args_vec.push(format!("{}={}", MAP_TASKS_PROP, job.num_workers));
        match job.split {
            SplitPolicy::OneLinePerWorker => {
                // a speculative duplicate would convert the same tile twice
                args_vec.push("-D".to_string());
                args_vec.push(format!("{}=false", MAP_SPECULATIVE_PROP));
                args_vec.push("-D".to_string());
                args_vec.push(format!("{}=1", LINES_PER_MAP_PROP));
                args_vec.push("-inputformat".to_string());
                args_vec.push(NLINE_INPUT_FORMAT.to_string());
            }
        }
        args_vec.push("-input".to_string());
        args_vec.push(job.manifest.clone());
        args_vec.push("-output".to_string());
        args_vec.push(job.output_dir.clone());
        args_vec.push("-mapper".to_string());
        args_vec.push(mapper);
        Ok(args_vec)
    }
}
