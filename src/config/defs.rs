use thiserror::Error;
use crate::cli::{Arguments, FsBackend};

// External software
pub const BCL_TO_QSEQ_TAG: &str = "bclToQseq";
pub const LAUNCHER_TAG: &str = "hadoop";
pub const STREAMING_JAR: &str = "hadoop-streaming.jar";
pub const WORKER_TAG: &str = "bcl2qseq_map";
pub const HDFS_TAG: &str = "hdfs";
pub const SH_TAG: &str = "sh";

// Manifest line format
pub const KV_SEPARATOR: char = ':';
pub const ENTRY_TERMINATOR: char = ';';
pub const MANIFEST_PREFIX: &str = "dist_bcl2qseq_input";
pub const MANIFEST_SUFFIX_LEN: usize = 8;

// Manifest keys. Everything starting with "--" is handed to the converter verbatim.
pub const KEY_CONVERTER: &str = "bclToQseq";
pub const KEY_MODULE: &str = "module";
pub const KEY_EXCLUDE_CONTROLS: &str = "--exclude-controls";
pub const KEY_REPEAT: &str = "--repeat";
pub const KEY_INSTRUMENT: &str = "--instrument";
pub const KEY_RUN_ID: &str = "--run-id";
pub const KEY_INPUT_DIR: &str = "--input-directory";
pub const KEY_LANE: &str = "--lane";
pub const KEY_READ: &str = "--read";
pub const KEY_FIRST_CYCLE: &str = "--first-cycle";
pub const KEY_NUM_CYCLES: &str = "--number-of-cycles";
pub const KEY_TILE: &str = "--tile";
pub const KEY_FILTER_FILE: &str = "--filter-file";
pub const KEY_CONTROL_FILE: &str = "--control-file";
pub const KEY_POSITIONS_FILE: &str = "--positions-file";
pub const KEY_QSEQ_FILE: &str = "--qseq-file";
pub const CONVERTER_REPEAT: &str = "1";

// Job submission
pub const JOB_NAME: &str = "dist_bcl2qseq";
pub const JOB_NAME_PROP: &str = "mapreduce.job.name";
pub const MAP_TASKS_PROP: &str = "mapreduce.job.maps";
pub const REDUCE_TASKS_PROP: &str = "mapreduce.job.reduces";
pub const MAP_SPECULATIVE_PROP: &str = "mapreduce.map.speculative";
pub const LINES_PER_MAP_PROP: &str = "mapreduce.input.lineinputformat.linespermap";
pub const NLINE_INPUT_FORMAT: &str = "org.apache.hadoop.mapred.lib.NLineInputFormat";
pub const STATUS_PREFIX: &str = "reporter:status:";

// Illumina run directory layout
pub const RUN_INFO_FILE: &str = "RunInfo.xml";
pub const INTENSITIES_DIR: &str = "Data/Intensities";
pub const BASECALLS_DIR: &str = "Data/Intensities/BaseCalls";
pub const LOCAL_FILE_SCHEME: &str = "file";


#[derive(Debug, Error)]
pub enum DriverError {
    #[error("{0}")]
    Configuration(String),

    #[error("datum '{key} {value}' contains ':', ';' or a line break. Can't serialize!")]
    Serialization { key: String, value: String },

    #[error("Malformed manifest line: {0}")]
    MalformedManifest(String),

    #[error("Staging failed: {0}")]
    Staging(String),

    #[error("Tool {tool} failed: {error}")]
    ToolExecution { tool: String, error: String },

    #[error("Distributed job failed: {0}")]
    JobExecution(String),

    #[error("Problem cleaning up: {0}")]
    Cleanup(String),
}

impl DriverError {
    /// True when the run was rejected before anything on the distributed
    /// filesystem was created.
    pub fn is_setup_rejection(&self) -> bool {
        matches!(self, DriverError::Configuration(_) | DriverError::Serialization { .. })
    }
}


/// Per-invocation settings for the driver, built once from the command line.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverConfig {
    pub run_dir: String,
    pub output_dir: String,
    pub module: Option<String>,
    pub bcl_to_qseq: String,
    pub launcher: String,
    pub streaming_jar: String,
    pub worker: String,
    /// Filesystem client the workers should use, passed on to them.
    pub fs: FsBackend,
}

impl DriverConfig {
    pub fn from_args(args: &Arguments) -> Self {
        DriverConfig {
            run_dir: args.run_dir.clone(),
            output_dir: args.output_dir.clone(),
            module: args.module.clone().filter(|m| !m.is_empty()),
            // default is to call bclToQseq assuming it's in the workers' PATH
            bcl_to_qseq: args
                .bcl_to_qseq_path
                .clone()
                .unwrap_or_else(|| BCL_TO_QSEQ_TAG.to_string()),
            launcher: args.launcher.clone().unwrap_or_else(|| LAUNCHER_TAG.to_string()),
            streaming_jar: args.streaming_jar.clone(),
            worker: args.worker.clone().unwrap_or_else(|| WORKER_TAG.to_string()),
            fs: args.fs,
        }
    }
}
