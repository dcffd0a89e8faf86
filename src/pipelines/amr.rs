/// AMR gene quantification with AMR++: one Nextflow run per study,
/// executed from the AMR++ checkout, with the work directory cleared
/// after each study to keep the scratch space bounded.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use log::{error, info};

use crate::config::defs::{
    PipelineError, RunConfig, AMRPP_RESULT_COUNT, AMR_OUT_DIR, HOSTILE_OUT_DIR, NEXTFLOW_TAG,
    UTIL_AMRPP_PATH,
};
use crate::utils::command::{run_command, CommandSpec};
use crate::utils::dispatch::ErrorPolicy;
use crate::utils::file::{base_name, clear_dir, dir_entry_count};
use crate::utils::info::{names_list, resolve_base_dirs, tool_path};
use crate::utils::report::Reporter;

pub async fn run(config: Arc<RunConfig>, reporter: Reporter) -> Result<(), PipelineError> {
    reporter.banner(&config.study_name, "Quantifying AMR genes with AMR++...");
    let base_dirs = resolve_base_dirs(&config)?;
    let amrpp_dir = tool_path(&config.utility_paths, UTIL_AMRPP_PATH)?.to_string();
    info!("AMR++ checkout: {}", amrpp_dir);

    for base in &base_dirs {
        reporter.rule(&format!("Running AMR++ on all studies in {}", base_name(base)));
        let studies = names_list(&base.join(&config.args.projects))?;
        info!("Found {} studies in {}", studies.len(), base_name(base));

        for study in &studies {
            let study_dir = base.join(study);
            let hq_reads = study_dir.join(HOSTILE_OUT_DIR);
            let amr_out = study_dir.join(AMR_OUT_DIR);
            fs::create_dir_all(&amr_out)?;

            let results_dir = amr_out.join("Results");
            if results_dir.is_dir() && dir_entry_count(&results_dir) == AMRPP_RESULT_COUNT {
                info!("AMR++ already run for {}. Skipping...", study);
                continue;
            }

            // Nextflow expands the read-pair pattern itself
            let reads_pattern = format!(
                "{}/*_R{{1,2}}.clean_{{1,2}}.fastq.gz",
                hq_reads.display()
            );
            let spec = CommandSpec::new(NEXTFLOW_TAG)
                .args(["run", "main_AMR++.nf", "--pipeline", "resistome", "--reads"])
                .arg(reads_pattern)
                .arg("--output")
                .arg(amr_out.display().to_string())
                .args(["--snp", "Y", "--deduped", "Y", "--threads"])
                .arg(config.args.threads.to_string())
                .arg("-resume")
                .current_dir(&amrpp_dir);
            let result = run_command(
                &reporter,
                &spec,
                Some(&format!("Running AMR++ on {}", study)),
            )
            .await?;
            if !result.success() {
                let failure = PipelineError::ToolExecution {
                    tool: NEXTFLOW_TAG.to_string(),
                    context: study.clone(),
                    status: result.status,
                };
                if config.policy() == ErrorPolicy::Halt {
                    return Err(failure);
                }
                error!("{}", failure);
            }

            info!("Clearing the work directory...");
            clear_dir(&Path::new(&amrpp_dir).join("work"))?;

            reporter.rule(&format!("Generated AMR gene abundance tables for {}", study));
        }
    }
    Ok(())
}
