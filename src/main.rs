use std::time::Instant;

use anyhow::Result;
use log::{error, info};

use dist_bcl2qseq::cli::{parse, FsBackend};
use dist_bcl2qseq::config::defs::{DriverConfig, DriverError};
use dist_bcl2qseq::pipelines::dist_bcl2qseq::DistBcl2QseqDriver;
use dist_bcl2qseq::utils::command::PathResolver;
use dist_bcl2qseq::utils::dfs::{DistFs, HdfsCli, LocalFs};
use dist_bcl2qseq::utils::diagnostics::LogSink;
use dist_bcl2qseq::utils::job::StreamingSubmitter;
use dist_bcl2qseq::utils::run_dir::IlluminaRunDir;
use dist_bcl2qseq::utils::system::init_logger;


#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let run_start = Instant::now();
    let args = parse();
    init_logger(args.verbose, args.logfile.as_deref())?;

    let config = DriverConfig::from_args(&args);
    let resolver = PathResolver::from_env();

    let outcome = match args.fs {
        FsBackend::Hdfs => drive(config, HdfsCli::default(), &resolver).await,
        FsBackend::Local => drive(config, LocalFs, &resolver).await,
    };

    if let Err(e) = outcome {
        if e.is_setup_rejection() {
            error!("Error initializing: {}", e);
            error!("Setup rejected; nothing was created on the shared filesystem.");
        } else {
            error!("{}", e);
            error!(
                "Job failed after {} milliseconds; the staged manifest was removed (or its removal was attempted).",
                run_start.elapsed().as_millis()
            );
        }
        std::process::exit(1);
    }

    info!("Run complete: {} milliseconds.", run_start.elapsed().as_millis());
    Ok(())
}

async fn drive<F: DistFs>(config: DriverConfig, fs: F, resolver: &PathResolver) -> Result<(), DriverError> {
    let mut driver = DistBcl2QseqDriver::init(config, IlluminaRunDir::open, fs, resolver, LogSink::default()).await?;
    let submitter = StreamingSubmitter::new(driver.launcher().to_path_buf(), driver.config().streaming_jar.clone());
    driver.run(&submitter).await
}
