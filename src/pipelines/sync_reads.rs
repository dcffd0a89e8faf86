/// Raw read sync: rsync from aliased source study directories into
/// each study's raw_reads. Sequential per study; rsync saturates the
/// link on its own.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use log::{error, info, warn};

use crate::config::defs::{PipelineError, RunConfig, RAW_READS_DIR, RSYNC_TAG};
use crate::utils::command::{run_command, CommandSpec};
use crate::utils::file::{base_name, files_with_prefix};
use crate::utils::info::{load_pairs, names_list, resolve_base_dirs};
use crate::utils::report::Reporter;

pub async fn run(config: Arc<RunConfig>, reporter: Reporter) -> Result<(), PipelineError> {
    reporter.banner(&config.study_name, "Copying raw reads...");

    let source_root = config.args.source_dir.as_ref().ok_or_else(|| {
        PipelineError::InvalidConfig("--source_dir is required for sync_reads".to_string())
    })?;
    let aliases = load_pairs(&config.cwd.join(&config.args.aliases))?;

    let base_dirs = resolve_base_dirs(&config)?;

    for base in &base_dirs {
        reporter.rule(&format!("Copying files of {}", base_name(base)));
        let studies = names_list(&base.join(&config.args.projects))?;
        info!("Found {} studies in {}", studies.len(), base_name(base));

        for study in &studies {
            reporter.rule(&format!("Running rsync on {}", study));
            let alias = aliases.get(study).ok_or_else(|| {
                PipelineError::InvalidConfig(format!("No alias for study {}", study))
            })?;
            let source_dir = Path::new(source_root).join(alias).join(RAW_READS_DIR);
            if !source_dir.is_dir() {
                warn!(
                    "Source directory {} does not exist; skipping {}",
                    source_dir.display(),
                    study
                );
                continue;
            }

            let study_dir = base.join(study);
            let raw_reads = study_dir.join(RAW_READS_DIR);
            fs::create_dir_all(&raw_reads)?;

            let samples = names_list(&study_dir.join(&config.args.samples))?;
            info!("Project {} has {} samples...", study, samples.len());

            for sample in &samples {
                let sources = files_with_prefix(&source_dir, sample)?;
                if sources.is_empty() {
                    warn!(
                        "No files for {} in {}; skipping",
                        sample,
                        source_dir.display()
                    );
                    continue;
                }
                let mut spec = CommandSpec::new(RSYNC_TAG).arg("-avrP");
                for source in &sources {
                    spec = spec.arg(source.display().to_string());
                }
                let spec = spec.arg(format!("{}/", raw_reads.display()));
                let result = run_command(
                    &reporter,
                    &spec,
                    Some(&format!("Syncing {} reads", sample)),
                )
                .await?;
                if !result.success() {
                    error!(
                        "{}",
                        PipelineError::ToolExecution {
                            tool: RSYNC_TAG.to_string(),
                            context: format!("{} > {}", study, sample),
                            status: result.status,
                        }
                    );
                }
            }

            reporter.rule(&format!("Completed syncing raw reads of {}", study));
        }
    }
    Ok(())
}
