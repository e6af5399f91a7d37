// Manifest line format shared by the driver and the map workers
//
// One task per line, each entry rendered `key:value;`. There is no escaping:
// keys and values containing either delimiter or a line break are refused outright.

use std::io::Write;
use std::path::PathBuf;
use crate::config::defs::{
    DriverError, ENTRY_TERMINATOR, KV_SEPARATOR, CONVERTER_REPEAT, KEY_CONTROL_FILE, KEY_CONVERTER,
    KEY_EXCLUDE_CONTROLS, KEY_FILTER_FILE, KEY_FIRST_CYCLE, KEY_INPUT_DIR, KEY_INSTRUMENT, KEY_LANE,
    KEY_MODULE, KEY_NUM_CYCLES, KEY_POSITIONS_FILE, KEY_QSEQ_FILE, KEY_READ, KEY_REPEAT, KEY_RUN_ID,
    KEY_TILE,
};
use crate::utils::file::path_to_str;

fn has_delimiter(s: &str) -> bool {
    s.contains([KV_SEPARATOR, ENTRY_TERMINATOR, '\n', '\r'])
}

/// Serializes a set of named parameters into one manifest line, newline included.
///
/// # Arguments
///
/// * `params` - (name, value) pairs, emitted in the given order. `None` values are written as empty strings.
///
/// # Returns
/// The line, or `DriverError::Serialization` naming the first pair containing a delimiter
/// or a line break.
pub fn serialize_params<K, V>(params: &[(K, Option<V>)]) -> Result<String, DriverError>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut line = String::new();
    for (key, value) in params {
        let key: &str = key.as_ref();
        let value: &str = match value {
            Some(v) => v.as_ref(),
            None => "",
        };
        if has_delimiter(key) || has_delimiter(value) {
            return Err(DriverError::Serialization {
                key: key.to_string(),
                value: value.to_string(),
            });
        }
        line.push_str(key);
        line.push(KV_SEPARATOR);
        line.push_str(value);
        line.push(ENTRY_TERMINATOR);
    }
    line.push('\n');
    Ok(line)
}

/// Inverse of [`serialize_params`]. Values that were absent come back as empty strings.
pub fn parse_manifest_line(line: &str) -> Result<Vec<(String, String)>, DriverError> {
    let line = line.trim_end_matches(['\n', '\r']);
    let mut entries = Vec::new();
    let mut rest = line;
    while !rest.is_empty() {
        let end = rest.find(ENTRY_TERMINATOR).ok_or_else(|| {
            DriverError::MalformedManifest(format!("unterminated entry '{}' in '{}'", rest, line))
        })?;
        let entry = &rest[..end];
        let (key, value) = entry.split_once(KV_SEPARATOR).ok_or_else(|| {
            DriverError::MalformedManifest(format!("entry '{}' has no key separator in '{}'", entry, line))
        })?;
        if key.is_empty() {
            return Err(DriverError::MalformedManifest(format!("empty key in '{}'", line)));
        }
        entries.push((key.to_string(), value.to_string()));
        rest = &rest[end + 1..];
    }
    Ok(entries)
}


/// Everything one bclToQseq invocation needs to convert a single tile of a single read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDescriptor {
    pub converter: String,
    pub module: Option<String>,
    pub instrument: String,
    pub run_id: String,
    pub input_dir: PathBuf,
    pub lane: u32,
    pub read: u32,
    pub first_cycle: u32,
    pub cycle_count: u32,
    pub tile: u32,
    pub filter_file: PathBuf,
    pub control_file: PathBuf,
    pub positions_file: PathBuf,
    /// Suggested destination on the shared filesystem. Workers may write elsewhere.
    pub qseq_file: String,
}

impl TaskDescriptor {
    /// The descriptor's fields as manifest parameters, in a fixed order.
    pub fn params(&self) -> Result<Vec<(&'static str, Option<String>)>, DriverError> {
        Ok(vec![
            (KEY_CONVERTER, Some(self.converter.clone())),
            (KEY_MODULE, self.module.clone()),
            (KEY_EXCLUDE_CONTROLS, None),
            (KEY_REPEAT, Some(CONVERTER_REPEAT.to_string())),
            (KEY_INSTRUMENT, Some(self.instrument.clone())),
            (KEY_RUN_ID, Some(self.run_id.clone())),
            (KEY_INPUT_DIR, Some(path_to_str(KEY_INPUT_DIR, &self.input_dir)?.to_string())),
            (KEY_LANE, Some(self.lane.to_string())),
            (KEY_READ, Some(self.read.to_string())),
            (KEY_FIRST_CYCLE, Some(self.first_cycle.to_string())),
            (KEY_NUM_CYCLES, Some(self.cycle_count.to_string())),
            (KEY_TILE, Some(self.tile.to_string())),
            (KEY_FILTER_FILE, Some(path_to_str(KEY_FILTER_FILE, &self.filter_file)?.to_string())),
            (KEY_CONTROL_FILE, Some(path_to_str(KEY_CONTROL_FILE, &self.control_file)?.to_string())),
            (KEY_POSITIONS_FILE, Some(path_to_str(KEY_POSITIONS_FILE, &self.positions_file)?.to_string())),
            (KEY_QSEQ_FILE, Some(self.qseq_file.clone())),
        ])
    }

    pub fn to_manifest_line(&self) -> Result<String, DriverError> {
        serialize_params(&self.params()?)
    }
}

/// Writes one line per task to `out`.
///
/// # Arguments
///
/// * `out` - Destination, normally the local temporary manifest.
/// * `tasks` - Tasks in manifest order.
///
/// # Returns
/// Number of lines written. A task that fails to serialize stops the write before its line.
pub fn write_manifest<W, I>(out: &mut W, tasks: I) -> Result<usize, DriverError>
where
    W: Write,
    I: IntoIterator<Item = TaskDescriptor>,
{
    let mut count = 0usize;
    for task in tasks {
        let line = task.to_manifest_line()?;
        out.write_all(line.as_bytes())
            .map_err(|e| DriverError::Staging(format!("Failed to write manifest record {}: {}", count + 1, e)))?;
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_task(tile: u32) -> TaskDescriptor {
        TaskDescriptor {
            converter: "bclToQseq".to_string(),
            module: None,
            instrument: "M00123".to_string(),
            run_id: "42".to_string(),
            input_dir: PathBuf::from("/data/run/Data/Intensities/BaseCalls"),
            lane: 1,
            read: 1,
            first_cycle: 1,
            cycle_count: 100,
            tile,
            filter_file: PathBuf::from(format!("/data/run/Data/Intensities/BaseCalls/L001/s_1_{}.filter", tile)),
            control_file: PathBuf::from(format!("/data/run/Data/Intensities/BaseCalls/L001/s_1_{}.control", tile)),
            positions_file: PathBuf::from(format!("/data/run/Data/Intensities/L001/s_1_{}.clocs", tile)),
            qseq_file: format!("/user/seq/out/s_1_1_{:04}_qseq.txt", tile),
        }
    }

    #[test]
    fn test_serialize_params() -> anyhow::Result<()> {
        let line = serialize_params(&[("--lane", Some("1")), ("module", None), ("--tile", Some("1101"))])?;
        assert_eq!(line, "--lane:1;module:;--tile:1101;\n");
        Ok(())
    }

    #[test]
    fn test_serialize_empty_params() -> anyhow::Result<()> {
        let params: [(&str, Option<&str>); 0] = [];
        assert_eq!(serialize_params(&params)?, "\n");
        Ok(())
    }

    #[test]
    fn test_serialize_rejects_delimiters() {
        let cases: [(&str, Option<&str>); 7] = [
            ("--instrument", Some("HWI:ST1")),
            ("--instrument", Some("HWI;ST1")),
            ("--bad:key", None),
            ("--bad;key", Some("x")),
            ("module", Some("bcl/1.8\nevil")),
            ("module", Some("bcl/1.8\r")),
            ("--bad\nkey", Some("x")),
        ];
        for (key, value) in cases {
            match serialize_params(&[(key, value)]) {
                Err(DriverError::Serialization { key: k, value: v }) => {
                    assert_eq!(k, key);
                    assert_eq!(v, value.unwrap_or(""));
                }
                other => panic!("expected serialization error for {}, got {:?}", key, other),
            }
        }
    }

    #[test]
    fn test_serialization_is_stable() -> anyhow::Result<()> {
        let task = sample_task(1101);
        let first = task.to_manifest_line()?;
        let second = task.clone().to_manifest_line()?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn test_parse_recovers_params() -> anyhow::Result<()> {
        let task = sample_task(1102);
        let params = task.params()?;
        let parsed = parse_manifest_line(&task.to_manifest_line()?)?;

        let expected: Vec<(String, String)> = params
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.unwrap_or_default()))
            .collect();
        assert_eq!(parsed, expected);
        assert!(parsed.contains(&(KEY_MODULE.to_string(), String::new())));
        assert!(parsed.contains(&(KEY_EXCLUDE_CONTROLS.to_string(), String::new())));
        Ok(())
    }

    #[test]
    fn test_parse_malformed_lines() {
        assert!(matches!(parse_manifest_line("--lane:1"), Err(DriverError::MalformedManifest(_))));
        assert!(matches!(parse_manifest_line("--lane1;"), Err(DriverError::MalformedManifest(_))));
        assert!(matches!(parse_manifest_line(":1;"), Err(DriverError::MalformedManifest(_))));
        assert!(matches!(parse_manifest_line(""), Ok(ref v) if v.is_empty()));
    }

    #[test]
    fn test_write_manifest_counts_lines() -> anyhow::Result<()> {
        let mut out = Vec::new();
        let count = write_manifest(&mut out, vec![sample_task(1101), sample_task(1102)])?;
        assert_eq!(count, 2);
        let text = String::from_utf8(out)?;
        assert_eq!(text.lines().count(), 2);
        assert!(text.lines().next().is_some_and(|l| l.contains("--tile:1101;")));
        Ok(())
    }

    #[test]
    fn test_write_manifest_stops_before_bad_task() {
        let mut bad = sample_task(1102);
        bad.instrument = "HWI:ST1".to_string();
        let mut out = Vec::new();
        let result = write_manifest(&mut out, vec![sample_task(1101), bad, sample_task(1103)]);
        assert!(matches!(result, Err(DriverError::Serialization { .. })));
        let text = String::from_utf8(out).unwrap_or_default();
        assert_eq!(text.lines().count(), 1);
        assert!(!text.contains("HWI"));
    }

    #[test]
    fn test_write_manifest_one_line_per_record() {
        let mut bad = sample_task(1102);
        bad.module = Some("bcl/1.8\nevil".to_string());
        let mut out = Vec::new();
        let result = write_manifest(&mut out, vec![sample_task(1101), bad]);
        match result {
            Err(DriverError::Serialization { key, value }) => {
                assert_eq!(key, KEY_MODULE);
                assert_eq!(value, "bcl/1.8\nevil");
            }
            other => panic!("expected serialization error, got {:?}", other),
        }
        let text = String::from_utf8(out).unwrap_or_default();
        assert_eq!(text.lines().count(), 1);
        assert!(!text.contains("evil"));
    }
}
