use anyhow::Result;
use log::{error, info};
use tokio::io::BufReader;

use dist_bcl2qseq::cli::{parse_map, FsBackend};
use dist_bcl2qseq::pipelines::bcl2qseq_map::run_map;
use dist_bcl2qseq::utils::dfs::{HdfsCli, LocalFs};
use dist_bcl2qseq::utils::system::init_logger;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = parse_map();
    init_logger(args.verbose, None)?;
    info!("Map step for manifest {} writing to {}", args.manifest, args.output_dir);

    let scratch = tempfile::Builder::new().prefix("bcl2qseq_map").tempdir()?;
    let input = BufReader::new(tokio::io::stdin());
    let outcome = match args.fs {
        FsBackend::Hdfs => run_map(input, &args.output_dir, &HdfsCli::default(), scratch.path()).await,
        FsBackend::Local => run_map(input, &args.output_dir, &LocalFs, scratch.path()).await,
    };

    match outcome {
        Ok(converted) => {
            info!("Converted {} tiles", converted);
            Ok(())
        }
        Err(e) => {
            error!("Map step failed: {}", e);
            drop(scratch);
            std::process::exit(1);
        }
    }
}
