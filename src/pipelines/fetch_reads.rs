/// SRA retrieval: prefetch + fasterq-dump per sample (dispatched),
/// then pigz compression and sra_files cleanup per study.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use log::{error, info};

use crate::config::defs::{
    PipelineError, RunConfig, FASTERQ_DUMP_TAG, PIGZ_TAG, PREFETCH_TAG, RAW_READS_DIR,
    SRA_FILES_DIR, UTIL_SRA_TOOLS,
};
use crate::utils::command::{run_command, CommandSpec};
use crate::utils::dispatch::{dispatch, WorkerSlot};
use crate::utils::file::{base_name, dir_has_any, files_with_suffix};
use crate::utils::info::{names_list, resolve_base_dirs, tool_path};
use crate::utils::report::Reporter;

pub async fn run(config: Arc<RunConfig>, reporter: Reporter) -> Result<(), PipelineError> {
    reporter.banner(&config.study_name, "Downloading FASTQ files...");
    let base_dirs = resolve_base_dirs(&config)?;

    for base in &base_dirs {
        reporter.rule(&format!(
            "Fetching FASTQ files for all studies in {}",
            base_name(base)
        ));
        let studies = names_list(&base.join(&config.args.projects))?;
        info!("Found {} studies in {}", studies.len(), base_name(base));

        for study in &studies {
            reporter.rule(&format!("Obtaining FASTQ files for {}", study));
            let study_dir = base.join(study);
            let sra_files = study_dir.join(SRA_FILES_DIR);
            let raw_reads = study_dir.join(RAW_READS_DIR);
            fs::create_dir_all(&raw_reads)?;
            fs::create_dir_all(&sra_files)?;

            let samples = names_list(&study_dir.join(&config.args.samples))?;
            info!("Project {} has {} samples...", study, samples.len());

            dispatch(
                &reporter,
                config.args.split_size,
                &samples,
                config.stagger(),
                config.policy(),
                |partition, slot| {
                    fetch_partition(
                        config.clone(),
                        study.clone(),
                        sra_files.clone(),
                        raw_reads.clone(),
                        partition,
                        slot,
                    )
                },
            )
            .await?;

            info!("Compressing FASTQ files of {}...", study);
            let fastqs = files_with_suffix(&raw_reads, ".fastq")?;
            if fastqs.is_empty() {
                info!("No uncompressed FASTQ files left in {}", study);
            } else {
                let mut spec = CommandSpec::new(PIGZ_TAG)
                    .arg("-v")
                    .arg("-p")
                    .arg(config.args.threads.to_string());
                for fastq in &fastqs {
                    spec = spec.arg(fastq.display().to_string());
                }
                let result = run_command(
                    &reporter,
                    &spec,
                    Some(&format!("Compressing fastq files of {}", study)),
                )
                .await?;
                if !result.success() {
                    error!(
                        "{}",
                        PipelineError::ToolExecution {
                            tool: PIGZ_TAG.to_string(),
                            context: study.clone(),
                            status: result.status,
                        }
                    );
                }
            }

            info!("Removing SRA files of {}...", study);
            if sra_files.is_dir() {
                fs::remove_dir_all(&sra_files)?;
            }

            reporter.rule(&format!("Completed fetching FASTQ files for {}", study));
        }
        reporter.rule(&format!(
            "Completed downloading FASTQ files for all studies in {}",
            base_name(base)
        ));
    }
    Ok(())
}

async fn fetch_partition(
    config: Arc<RunConfig>,
    study: String,
    sra_files: PathBuf,
    raw_reads: PathBuf,
    partition: Vec<String>,
    slot: WorkerSlot,
) -> Result<(), PipelineError> {
    let sra_env = tool_path(&config.utility_paths, UTIL_SRA_TOOLS)?.to_string();
    let total = partition.len();

    for (i, sample) in partition.iter().enumerate() {
        slot.update(&format!(
            "Retrieving data for {} > {} ({}/{})",
            study,
            sample,
            i + 1,
            total
        ));

        let markers = [
            format!("{}_2.fastq", sample),
            format!("{}_2.fastq.gz", sample),
            format!("{}.fastq.gz", sample),
        ];
        if dir_has_any(&raw_reads, &markers) {
            info!("{} already downloaded. Skipping...", sample);
            slot.item_done();
            continue;
        }

        info!("Downloading {}.sra from NCBI's SRA...", sample);
        let spec = CommandSpec::mamba_run(&sra_env, PREFETCH_TAG)
            .arg(sample.as_str())
            .arg("-O")
            .arg(sra_files.display().to_string())
            .args(["-X", "150G"]);
        let result = run_command(
            slot.reporter(),
            &spec,
            Some(&format!("Fetching {}", sample)),
        )
        .await?;
        if !result.success() {
            error!(
                "{}",
                PipelineError::ToolExecution {
                    tool: PREFETCH_TAG.to_string(),
                    context: format!("{} > {}", study, sample),
                    status: result.status,
                }
            );
        }

        info!("Extracting FASTQ files from {}.sra...", sample);
        let spec = CommandSpec::mamba_run(&sra_env, FASTERQ_DUMP_TAG)
            .arg(sra_files.join(sample).display().to_string())
            .arg("-3")
            .arg("-O")
            .arg(raw_reads.display().to_string())
            .arg("-e")
            .arg(config.args.threads.to_string());
        let result = run_command(
            slot.reporter(),
            &spec,
            Some(&format!("Extracting {}.fastq files", sample)),
        )
        .await?;
        if !result.success() {
            error!(
                "{}",
                PipelineError::ToolExecution {
                    tool: FASTERQ_DUMP_TAG.to_string(),
                    context: format!("{} > {}", study, sample),
                    status: result.status,
                }
            );
        }
        slot.item_done();
    }
    Ok(())
}
