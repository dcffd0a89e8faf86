/// Quality control and host removal: FastQC/MultiQC reports, BBDuk
/// adapter/quality trimming, fastp deduplication, Hostile host-read
/// scrubbing. Trimming and host removal are paired-end only.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::config::defs::{
    PipelineError, RunConfig, BBDUK_TAG, BB_MQC_DIR, BB_OUT_DIR, BB_QC_DIR, FASTP_TAG,
    FASTQC_TAG, FP_MQC_DIR, FP_OUT_DIR, FP_QC_DIR, HOSTILE_OUT_DIR, HOSTILE_TAG, MULTIQC_TAG,
    RAW_MQC_DIR, RAW_QC_DIR, RAW_READS_DIR, UTIL_BBDUK, UTIL_BB_ADAPTERS, UTIL_FASTP,
    UTIL_FASTQC, UTIL_HOSTILE, UTIL_HOSTILE_DB, UTIL_MULTIQC,
};
use crate::utils::command::{run_command, run_command_logged, CommandSpec};
use crate::utils::dispatch::{dispatch, WorkerSlot};
use crate::utils::file::{
    append_matching_lines, base_name, dir_entry_count, dir_has_any, files_with_prefix,
    files_with_suffix,
};
use crate::utils::info::{names_list, resolve_base_dirs, tool_path};
use crate::utils::report::Reporter;

pub async fn run(config: Arc<RunConfig>, reporter: Reporter) -> Result<(), PipelineError> {
    reporter.banner(&config.study_name, "Performing QC...");
    let base_dirs = resolve_base_dirs(&config)?;

    for base in &base_dirs {
        reporter.rule(&format!("Performing QC on all studies in {}", base_name(base)));
        let studies = names_list(&base.join(&config.args.projects))?;
        info!("Found {} studies in {}", studies.len(), base_name(base));

        for study in &studies {
            reporter.rule(&format!("Running QC on {}", study));
            let study_dir = base.join(study);
            let raw_reads = study_dir.join(RAW_READS_DIR);
            let raw_qc = study_dir.join(RAW_QC_DIR);
            let raw_mqc = study_dir.join(RAW_MQC_DIR);
            let bb_out = study_dir.join(BB_OUT_DIR);
            let bb_qc = study_dir.join(BB_QC_DIR);
            let bb_mqc = study_dir.join(BB_MQC_DIR);
            let fp_out = study_dir.join(FP_OUT_DIR);
            let fp_qc = study_dir.join(FP_QC_DIR);
            let fp_mqc = study_dir.join(FP_MQC_DIR);
            let hostile_out = study_dir.join(HOSTILE_OUT_DIR);

            for dir in [
                &raw_qc, &raw_mqc, &bb_out, &bb_qc, &bb_mqc, &fp_out, &fp_qc, &fp_mqc,
                &hostile_out,
            ] {
                fs::create_dir_all(dir)?;
            }

            let samples = names_list(&study_dir.join(&config.args.samples))?;
            info!("Project {} has {} samples...", study, samples.len());

            generate_qc_reports(&config, &reporter, study, &raw_reads, &raw_qc, &raw_mqc).await?;

            let reports = dispatch(
                &reporter,
                config.args.split_size,
                &samples,
                config.stagger(),
                config.policy(),
                |partition, slot| {
                    trim_partition(config.clone(), study.clone(), study_dir.clone(), partition, slot)
                },
            )
            .await?;
            let trimmed: usize = reports.iter().map(|r| r.processed).sum();
            debug!("Workers trimmed {} samples of {}", trimmed, study);

            generate_qc_reports(&config, &reporter, study, &bb_out, &bb_qc, &bb_mqc).await?;
            generate_qc_reports(&config, &reporter, study, &fp_out, &fp_qc, &fp_mqc).await?;

            dispatch(
                &reporter,
                config.args.split_size,
                &samples,
                config.stagger(),
                config.policy(),
                |partition, slot| {
                    host_partition(config.clone(), study.clone(), study_dir.clone(), partition, slot)
                },
            )
            .await?;

            reporter.rule(&format!("Completed quality trimming for {}", study));
        }
        reporter.rule(&format!(
            "Completed quality trimming for all studies in {}",
            base_name(base)
        ));
    }
    Ok(())
}

/// FastQC over every compressed FASTQ in `in_dir`, then one MultiQC
/// roll-up. FastQC emits an .html and a .zip per input, so a report
/// count of exactly 2x the inputs marks the directory as done.
async fn generate_qc_reports(
    config: &RunConfig,
    reporter: &Reporter,
    study: &str,
    in_dir: &Path,
    qc_out: &Path,
    mqc_out: &Path,
) -> Result<(), PipelineError> {
    info!("Running FastQC on {} > {}...", study, base_name(in_dir));
    let inputs = files_with_suffix(in_dir, ".gz")?;
    if inputs.is_empty() {
        warn!("No compressed reads in {}; skipping FastQC", in_dir.display());
    } else if dir_entry_count(qc_out) == inputs.len() * 2 {
        info!("FastQC reports already generated for {}. Skipping...", study);
    } else {
        let fastqc_env = tool_path(&config.utility_paths, UTIL_FASTQC)?;
        let mut spec = CommandSpec::mamba_run(fastqc_env, FASTQC_TAG);
        for input in &inputs {
            spec = spec.arg(input.display().to_string());
        }
        let spec = spec
            .arg("-o")
            .arg(qc_out.display().to_string())
            .arg("-t")
            .arg((config.args.threads * config.args.split_size).to_string());
        let result = run_command(
            reporter,
            &spec,
            Some(&format!("Generating FastQC reports for {}", study)),
        )
        .await?;
        if !result.success() {
            error!(
                "{}",
                PipelineError::ToolExecution {
                    tool: FASTQC_TAG.to_string(),
                    context: format!("{} > {}", study, base_name(in_dir)),
                    status: result.status,
                }
            );
        }
    }

    info!("Running MultiQC on {} > {} reports...", study, base_name(qc_out));
    if dir_entry_count(mqc_out) > 0 {
        info!("MultiQC report already generated for {}. Skipping...", study);
    } else {
        let multiqc_env = tool_path(&config.utility_paths, UTIL_MULTIQC)?;
        let spec = CommandSpec::mamba_run(multiqc_env, MULTIQC_TAG)
            .arg(qc_out.display().to_string())
            .arg("-o")
            .arg(mqc_out.display().to_string())
            .arg("--interactive");
        let result = run_command(
            reporter,
            &spec,
            Some(&format!("Generating cumulative reports for {}", study)),
        )
        .await?;
        if !result.success() {
            error!(
                "{}",
                PipelineError::ToolExecution {
                    tool: MULTIQC_TAG.to_string(),
                    context: format!("{} > {}", study, base_name(qc_out)),
                    status: result.status,
                }
            );
        }
    }

    reporter.rule(&format!("Generated QC reports for {}", study));
    Ok(())
}

/// Locates the paired raw read files for one sample by the _1./_2.
/// run-accession naming of fasterq-dump output.
fn paired_reads(raw_reads: &Path, sample: &str) -> Result<(PathBuf, PathBuf), PipelineError> {
    let mut read1 = None;
    let mut read2 = None;
    for read in files_with_prefix(raw_reads, sample)? {
        let name = base_name(&read);
        if name.contains("_1.") {
            read1 = Some(read);
        } else if name.contains("_2.") {
            read2 = Some(read);
        }
    }
    match (read1, read2) {
        (Some(r1), Some(r2)) => Ok((r1, r2)),
        _ => Err(PipelineError::MissingInput(format!(
            "Paired reads for {} not found in {}",
            sample,
            raw_reads.display()
        ))),
    }
}

async fn trim_partition(
    config: Arc<RunConfig>,
    study: String,
    study_dir: PathBuf,
    partition: Vec<String>,
    slot: WorkerSlot,
) -> Result<(), PipelineError> {
    let bbduk_env = tool_path(&config.utility_paths, UTIL_BBDUK)?.to_string();
    let adapters = tool_path(&config.utility_paths, UTIL_BB_ADAPTERS)?.to_string();
    let fastp_env = tool_path(&config.utility_paths, UTIL_FASTP)?.to_string();
    let raw_reads = study_dir.join(RAW_READS_DIR);
    let bb_out = study_dir.join(BB_OUT_DIR);
    let fp_out = study_dir.join(FP_OUT_DIR);
    let total = partition.len();

    for (i, sample) in partition.iter().enumerate() {
        slot.update(&format!(
            "Filtering reads of {} > {} ({}/{})",
            study,
            sample,
            i + 1,
            total
        ));

        let bb_markers = [format!("{}_R2.fq.gz", sample), format!("{}.fq.gz", sample)];
        if dir_has_any(&bb_out, &bb_markers) {
            info!("BBDuk already processed {} > {}. Skipping...", study, sample);
        } else {
            info!("Processing {} > {} with BBDuk...", study, sample);
            let (read1, read2) = paired_reads(&raw_reads, sample)?;
            let spec = CommandSpec::mamba_run(&bbduk_env, BBDUK_TAG)
                .arg(format!("in1={}", read1.display()))
                .arg(format!("in2={}", read2.display()))
                .arg(format!("out1={}/{}_R1.fq.gz", bb_out.display(), sample))
                .arg(format!("out2={}/{}_R2.fq.gz", bb_out.display(), sample))
                .arg(format!("ref={}", adapters))
                .args(["k=19", "mink=7", "ktrim=r", "trimq=20", "qtrim=r", "hdist=1", "tpe", "tbo"])
                .arg(format!("threads={}", config.args.threads));
            let result = run_command_logged(
                slot.reporter(),
                &spec,
                Some(&format!("Trimming {} reads", sample)),
                &bb_out.join(format!("{}.log", sample)),
            )
            .await?;
            if !result.success() {
                error!(
                    "{}",
                    PipelineError::ToolExecution {
                        tool: BBDUK_TAG.to_string(),
                        context: format!("{} > {}", study, sample),
                        status: result.status,
                    }
                );
            }
        }

        // BBDuk prints surviving-read totals on its "Result" lines
        let bb_log = bb_out.join(format!("{}.log", sample));
        if bb_log.is_file() {
            append_matching_lines(&bb_log, "Result", &study_dir.join("bb_out_count.txt"))?;
        }

        slot.update(&format!(
            "Deduplicating reads of {} > {} ({}/{})",
            study,
            sample,
            i + 1,
            total
        ));
        let fp_markers = [format!("{}_R2.fq.gz", sample)];
        if dir_has_any(&fp_out, &fp_markers) {
            info!("fastp already processed {} > {}. Skipping...", study, sample);
        } else {
            info!("Processing {} > {} with fastp...", study, sample);
            let spec = CommandSpec::mamba_run(&fastp_env, FASTP_TAG)
                .arg("-i")
                .arg(format!("{}/{}_R1.fq.gz", bb_out.display(), sample))
                .arg("-o")
                .arg(format!("{}/{}_R1.fq.gz", fp_out.display(), sample))
                .arg("-I")
                .arg(format!("{}/{}_R2.fq.gz", bb_out.display(), sample))
                .arg("-O")
                .arg(format!("{}/{}_R2.fq.gz", fp_out.display(), sample))
                .args(["-D", "-A"])
                .arg("-h")
                .arg(format!("{}/{}.html", fp_out.display(), sample))
                .arg("-j")
                .arg(format!("{}/{}.json", fp_out.display(), sample))
                .arg("-w")
                .arg(config.args.threads.to_string());
            let result = run_command(
                slot.reporter(),
                &spec,
                Some(&format!("Performing deduplication of {} reads", sample)),
            )
            .await?;
            if !result.success() {
                error!(
                    "{}",
                    PipelineError::ToolExecution {
                        tool: FASTP_TAG.to_string(),
                        context: format!("{} > {}", study, sample),
                        status: result.status,
                    }
                );
            }
        }

        slot.item_done();
    }
    Ok(())
}

async fn host_partition(
    config: Arc<RunConfig>,
    study: String,
    study_dir: PathBuf,
    partition: Vec<String>,
    slot: WorkerSlot,
) -> Result<(), PipelineError> {
    let hostile_env = tool_path(&config.utility_paths, UTIL_HOSTILE)?.to_string();
    let hostile_db = tool_path(&config.utility_paths, UTIL_HOSTILE_DB)?.to_string();
    let fp_out = study_dir.join(FP_OUT_DIR);
    let hostile_out = study_dir.join(HOSTILE_OUT_DIR);
    let total = partition.len();

    for (i, sample) in partition.iter().enumerate() {
        slot.update(&format!(
            "Removing host reads from {} > {} ({}/{})",
            study,
            sample,
            i + 1,
            total
        ));

        let markers = [format!("{}_R2.clean_2.fastq.gz", sample)];
        if dir_has_any(&hostile_out, &markers) {
            info!(
                "Host reads already removed from {} > {}. Skipping...",
                study, sample
            );
            slot.item_done();
            continue;
        }

        info!("Processing {} > {} with Hostile...", study, sample);
        let spec = CommandSpec::mamba_run(&hostile_env, HOSTILE_TAG)
            .arg("clean")
            .arg("--fastq1")
            .arg(format!("{}/{}_R1.fq.gz", fp_out.display(), sample))
            .arg("--fastq2")
            .arg(format!("{}/{}_R2.fq.gz", fp_out.display(), sample))
            .arg("--output")
            .arg(hostile_out.display().to_string())
            .arg("--index")
            .arg(hostile_db.as_str())
            .arg("--threads")
            .arg(config.args.threads.to_string());
        let result = run_command_logged(
            slot.reporter(),
            &spec,
            Some(&format!("Removing host reads from {}", sample)),
            &hostile_out.join(format!("{}.log", sample)),
        )
        .await?;
        if !result.success() {
            error!(
                "{}",
                PipelineError::ToolExecution {
                    tool: HOSTILE_TAG.to_string(),
                    context: format!("{} > {}", study, sample),
                    status: result.status,
                }
            );
        }
        slot.item_done();
    }
    Ok(())
}
