use clap::{Parser, ValueEnum};
use crate::config::defs::STREAMING_JAR;

/// Which client is used to reach the shared filesystem holding the manifest and the output.
#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq)]
pub enum FsBackend {
    #[default]
    Hdfs,
    Local,
}

impl FsBackend {
    pub fn label(self) -> &'static str {
        match self {
            FsBackend::Hdfs => "hdfs",
            FsBackend::Local => "local",
        }
    }
}

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "dist_bcl2qseq", version, about = "Distributed bcl2qseq.")]
pub struct Arguments {

    #[arg(help = "Illumina run directory to process")]
    pub run_dir: String,

    #[arg(help = "Path where the output qseq files should be created")]
    pub output_dir: String,

    #[arg(short = 'l', long = "logfile", value_name = "FILE", help = "Write log output to a file")]
    pub logfile: Option<String>,

    #[arg(short = 'm', long = "module", value_name = "MOD", help = "Optional module to load before running bclToQseq")]
    pub module: Option<String>,

    #[arg(long = "bclToQseq-path", value_name = "PATH", help = "Full path to the bclToQseq binary. Needed only if it's not in the PATH")]
    pub bcl_to_qseq_path: Option<String>,

    #[arg(short = 'v', long = "verbose", action)]
    pub verbose: bool,

    #[arg(long = "fs", default_value = "hdfs", value_enum)]
    pub fs: FsBackend,

    #[arg(long, value_name = "PATH", help = "Job submission executable (default: hadoop from the PATH)")]
    pub launcher: Option<String>,

    #[arg(long = "streaming-jar", value_name = "JAR", env = "HADOOP_STREAMING_JAR", default_value = STREAMING_JAR, help = "Hadoop streaming jar used to run the map-only job")]
    pub streaming_jar: String,

    #[arg(long, value_name = "PATH", help = "Per-line map program run by each worker (default: bcl2qseq_map from the PATH)")]
    pub worker: Option<String>,
}

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "bcl2qseq_map", version, about = "Runs bclToQseq for each manifest line read from stdin.")]
pub struct MapArguments {

    #[arg(help = "Manifest the job was launched with")]
    pub manifest: String,

    #[arg(help = "Directory on the shared filesystem receiving the qseq files")]
    pub output_dir: String,

    #[arg(short = 'v', long = "verbose", action)]
    pub verbose: bool,

    #[arg(long = "fs", default_value = "hdfs", value_enum)]
    pub fs: FsBackend,
}
