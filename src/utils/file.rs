use std::path::{Path, PathBuf};
use lazy_static::lazy_static;
use rand::distr::{Alphanumeric, SampleString};
use regex::Regex;
use crate::config::defs::{DriverError, LOCAL_FILE_SCHEME, MANIFEST_PREFIX, MANIFEST_SUFFIX_LEN};

lazy_static! {
    // Two characters minimum so a Windows drive letter is not taken for a scheme.
    static ref URI_SCHEME: Regex = Regex::new(r"^([A-Za-z][A-Za-z0-9+.\-]+):").expect("valid scheme regex");
}

/// Returns the URI scheme of `path`, lowercased, if it has one.
pub fn uri_scheme(path: &str) -> Option<String> {
    URI_SCHEME
        .captures(path)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_ascii_lowercase())
}

/// Turns the run directory argument into a path on a mounted filesystem.
/// Plain paths and `file:` URIs are accepted; any other scheme is rejected
/// since the driver reads the run's raw data directly.
///
/// # Arguments
///
/// * `run_dir` - Run directory as given on the command line.
///
/// # Returns
/// Local path to the run directory.
pub fn local_run_dir(run_dir: &str) -> Result<PathBuf, DriverError> {
    let scheme = match uri_scheme(run_dir) {
        None => return Ok(PathBuf::from(run_dir)),
        Some(scheme) => scheme,
    };
    if scheme != LOCAL_FILE_SCHEME {
        return Err(DriverError::Configuration(format!(
            "Sorry! Current implementation requires that the run directory be on a mounted file system (scheme {} not supported)",
            scheme
        )));
    }

    let rest = &run_dir[scheme.len() + 1..];
    let path = match rest.strip_prefix("//") {
        Some(authority_and_path) => {
            let (host, path) = match authority_and_path.find('/') {
                Some(idx) => authority_and_path.split_at(idx),
                None => (authority_and_path, ""),
            };
            if !host.is_empty() && host != "localhost" {
                return Err(DriverError::Configuration(format!(
                    "Run directory {} is on host {}; it must be on a locally mounted file system",
                    run_dir, host
                )));
            }
            path
        }
        None => rest,
    };
    if path.is_empty() {
        return Err(DriverError::Configuration(format!("Run directory URI {} has no path", run_dir)));
    }
    Ok(PathBuf::from(path))
}

/// Parent of a path on the distributed filesystem. A bare relative name has
/// an empty parent (the filesystem's working directory).
pub fn remote_parent(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => "/".to_string(),
        Some(idx) => trimmed[..idx].to_string(),
        None if path.starts_with('/') => "/".to_string(),
        None => String::new(),
    }
}

/// Joins `name` onto a distributed filesystem directory.
pub fn remote_join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        return name.to_string();
    }
    format!("{}/{}", dir.trim_end_matches('/'), name)
}

/// Where the manifest for a job writing into `output_dir` is published: a
/// sibling of the output directory, never inside it.
pub fn remote_manifest_path(output_dir: &str, suffix: &str) -> String {
    remote_join(&remote_parent(output_dir), &format!("{}{}", MANIFEST_PREFIX, suffix))
}

pub fn unique_suffix() -> String {
    Alphanumeric.sample_string(&mut rand::rng(), MANIFEST_SUFFIX_LEN)
}

/// Strips a `file:` scheme from a path handled by the local filesystem client.
pub fn strip_file_scheme(path: &str) -> PathBuf {
    let rest = path
        .strip_prefix("file://")
        .or_else(|| path.strip_prefix("file:"))
        .unwrap_or(path);
    PathBuf::from(rest)
}

/// Last component of a `/`-separated path, ignoring trailing separators.
pub fn file_name(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    let name = match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    };
    if name.is_empty() { None } else { Some(name) }
}

pub fn path_to_str<'a>(key: &str, path: &'a Path) -> Result<&'a str, DriverError> {
    path.to_str().ok_or_else(|| DriverError::Serialization {
        key: key.to_string(),
        value: path.to_string_lossy().into_owned(),
    })
}
