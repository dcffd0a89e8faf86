use std::collections::HashMap;
use std::env;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use env_logger::Builder;
use log::{debug, error, info, LevelFilter};

use resistome_pipelines::cli::parse;
use resistome_pipelines::config::defs::{PipelineError, RunConfig, MODULES};
use resistome_pipelines::pipelines::{
    amr, classify, extract_reads, fetch_reads, make_files, make_lists, qc_host, sync_reads,
};
use resistome_pipelines::utils::info::load_pairs;
use resistome_pipelines::utils::report::Reporter;

#[tokio::main]
async fn main() -> Result<()> {
    let run_start = Instant::now();
    let args = parse();

    let log_level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    Builder::new()
        .filter_level(log_level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .init();

    let cwd = env::current_dir()?;
    let study_name = cwd
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unknown".to_string());
    info!("The current directory is {:?}", cwd);

    // Read once per run; stages that need a missing key fail lazily.
    let utility_paths_file = cwd.join(&args.utility_paths);
    let utility_paths: HashMap<String, String> = if utility_paths_file.is_file() {
        let pairs = load_pairs(&utility_paths_file)?;
        info!(
            "Found {} utility paths in {}",
            pairs.len(),
            args.utility_paths
        );
        pairs
    } else {
        debug!("No utility paths file at {}", utility_paths_file.display());
        HashMap::new()
    };

    let reporter = Reporter::stdout();
    let module = args.module.clone();
    let config = Arc::new(RunConfig {
        cwd,
        study_name,
        utility_paths,
        args,
    });

    if let Err(e) = run_module(&module, config, reporter).await {
        error!(
            "Pipeline failed: {} at {} milliseconds.",
            e,
            run_start.elapsed().as_millis()
        );
        std::process::exit(1);
    }

    println!("Run complete: {} milliseconds.", run_start.elapsed().as_millis());
    Ok(())
}

async fn run_module(
    module: &str,
    config: Arc<RunConfig>,
    reporter: Reporter,
) -> Result<(), PipelineError> {
    match module {
        "fetch_reads" => fetch_reads::run(config, reporter).await,
        "sync_reads" => sync_reads::run(config, reporter).await,
        "make_lists" => make_lists::run(config, reporter).await,
        "make_files" => make_files::run(config, reporter).await,
        "qc_host" => qc_host::run(config, reporter).await,
        "classify" => classify::run(config, reporter).await,
        "extract_reads" => extract_reads::run(config, reporter).await,
        "amr" => amr::run(config, reporter).await,
        other => {
            let mut known: Vec<&str> = MODULES.keys().copied().collect();
            known.sort_unstable();
            Err(PipelineError::InvalidConfig(format!(
                "Invalid module: {} (available: {})",
                other,
                known.join(", ")
            )))
        }
    }
}
