/// Read classification: Kraken2 per sample (dispatched), Bracken
/// abundance estimation and MPA conversion per sample (sequential).

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, error, info};

use crate::config::defs::{
    PipelineError, RunConfig, BRACKEN_TAG, HOSTILE_OUT_DIR, KRAKEN2_TAG, KRAKEN_OUT_DIR,
    KREPORT2MPA_TAG, UTIL_BRACKEN, UTIL_KRAKENTOOLS, UTIL_KRAKEN2, UTIL_KRAKEN_DB,
};
use crate::utils::command::{run_command, CommandSpec};
use crate::utils::dispatch::{dispatch, WorkerSlot};
use crate::utils::file::base_name;
use crate::utils::info::{names_list, resolve_base_dirs, tool_path};
use crate::utils::report::Reporter;

pub async fn run(config: Arc<RunConfig>, reporter: Reporter) -> Result<(), PipelineError> {
    reporter.banner(&config.study_name, "Classifying reads with the Kraken2 suite...");
    let base_dirs = resolve_base_dirs(&config)?;

    for base in &base_dirs {
        reporter.rule(&format!(
            "Classifying reads of all studies in {}",
            base_name(base)
        ));
        let studies = names_list(&base.join(&config.args.projects))?;
        info!("Found {} studies in {}", studies.len(), base_name(base));

        for study in &studies {
            reporter.rule(&format!("Running Kraken2 on {}", study));
            let study_dir = base.join(study);
            let hostile_out = study_dir.join(HOSTILE_OUT_DIR);
            let kraken_out = study_dir.join(KRAKEN_OUT_DIR);
            fs::create_dir_all(&kraken_out)?;

            let samples = names_list(&study_dir.join(&config.args.samples))?;
            info!("Project {} has {} samples...", study, samples.len());

            let reports = dispatch(
                &reporter,
                config.args.split_size,
                &samples,
                config.stagger(),
                config.policy(),
                |partition, slot| {
                    classify_partition(
                        config.clone(),
                        study.clone(),
                        hostile_out.clone(),
                        kraken_out.clone(),
                        partition,
                        slot,
                    )
                },
            )
            .await?;
            let classified: usize = reports.iter().map(|r| r.processed).sum();
            debug!("Workers classified {} samples of {}", classified, study);

            run_bracken(&config, &reporter, study, &kraken_out, &samples).await?;
            convert_to_mpa(&config, &reporter, study, &kraken_out, &samples).await?;

            reporter.rule(&format!("Completed read classification for {}", study));
        }
        reporter.rule(&format!(
            "Completed read classification for all studies in {}",
            base_name(base)
        ));
    }
    Ok(())
}

async fn classify_partition(
    config: Arc<RunConfig>,
    study: String,
    hostile_out: PathBuf,
    kraken_out: PathBuf,
    partition: Vec<String>,
    slot: WorkerSlot,
) -> Result<(), PipelineError> {
    let kraken_env = tool_path(&config.utility_paths, UTIL_KRAKEN2)?.to_string();
    let kraken_db = tool_path(&config.utility_paths, UTIL_KRAKEN_DB)?.to_string();
    let total = partition.len();

    for (i, sample) in partition.iter().enumerate() {
        slot.update(&format!(
            "Classifying reads of {} > {} ({}/{})",
            study,
            sample,
            i + 1,
            total
        ));

        let sample_out = kraken_out.join(sample);
        fs::create_dir_all(&sample_out)?;
        if sample_out.join(format!("{}.report", sample)).is_file() {
            info!("Already classified the reads of {}. Skipping...", sample);
            slot.item_done();
            continue;
        }

        info!("Running Kraken2 on {}...", sample);
        let spec = CommandSpec::mamba_run(&kraken_env, KRAKEN2_TAG)
            .args(["classify", "--db"])
            .arg(kraken_db.as_str())
            .arg("--memory-mapping")
            .arg("--threads")
            .arg(config.args.threads.to_string())
            .arg("--paired")
            .arg("--output")
            .arg(sample_out.join(format!("{}.out", sample)).display().to_string())
            .arg("--report")
            .arg(
                sample_out
                    .join(format!("{}.report", sample))
                    .display()
                    .to_string(),
            )
            .arg("--use-names")
            .arg(
                hostile_out
                    .join(format!("{}_R1.clean_1.fastq.gz", sample))
                    .display()
                    .to_string(),
            )
            .arg(
                hostile_out
                    .join(format!("{}_R2.clean_2.fastq.gz", sample))
                    .display()
                    .to_string(),
            );
        let result = run_command(
            slot.reporter(),
            &spec,
            Some(&format!("Running Kraken2 on {}", sample)),
        )
        .await?;
        if !result.success() {
            error!(
                "{}",
                PipelineError::ToolExecution {
                    tool: KRAKEN2_TAG.to_string(),
                    context: format!("{} > {}", study, sample),
                    status: result.status,
                }
            );
        }
        slot.item_done();
    }
    Ok(())
}

async fn run_bracken(
    config: &RunConfig,
    reporter: &Reporter,
    study: &str,
    kraken_out: &Path,
    samples: &[String],
) -> Result<(), PipelineError> {
    let bracken_env = tool_path(&config.utility_paths, UTIL_BRACKEN)?;
    let kraken_db = tool_path(&config.utility_paths, UTIL_KRAKEN_DB)?;

    for sample in samples {
        let sample_out = kraken_out.join(sample);
        if sample_out.join(format!("{}.bracken", sample)).is_file() {
            info!("Already estimated the abundance of {}. Skipping...", sample);
            continue;
        }
        info!("Running Bracken on {}...", sample);
        let spec = CommandSpec::mamba_run(bracken_env, BRACKEN_TAG)
            .arg("-d")
            .arg(kraken_db)
            .arg("-i")
            .arg(
                sample_out
                    .join(format!("{}.report", sample))
                    .display()
                    .to_string(),
            )
            .arg("-o")
            .arg(
                sample_out
                    .join(format!("{}.bracken", sample))
                    .display()
                    .to_string(),
            );
        let result = run_command(reporter, &spec, Some("Calculating abundances with Bracken")).await?;
        if !result.success() {
            error!(
                "{}",
                PipelineError::ToolExecution {
                    tool: BRACKEN_TAG.to_string(),
                    context: format!("{} > {}", study, sample),
                    status: result.status,
                }
            );
        }
    }
    reporter.rule(&format!("Generated abundance tables for {}", study));
    Ok(())
}

async fn convert_to_mpa(
    config: &RunConfig,
    reporter: &Reporter,
    study: &str,
    kraken_out: &Path,
    samples: &[String],
) -> Result<(), PipelineError> {
    let krakentools_env = tool_path(&config.utility_paths, UTIL_KRAKENTOOLS)?;

    for sample in samples {
        let sample_out = kraken_out.join(sample);
        if sample_out.join(format!("{}_mpa.txt", sample)).is_file() {
            info!("MPA file already exists for {}. Skipping...", sample);
            continue;
        }
        info!("Converting {}'s Bracken report to MPA format...", sample);
        let spec = CommandSpec::mamba_run(krakentools_env, KREPORT2MPA_TAG)
            .arg("-r")
            .arg(
                sample_out
                    .join(format!("{}_bracken_species.report", sample))
                    .display()
                    .to_string(),
            )
            .arg("-o")
            .arg(
                sample_out
                    .join(format!("{}_mpa.txt", sample))
                    .display()
                    .to_string(),
            );
        let result = run_command(reporter, &spec, None).await?;
        if !result.success() {
            error!(
                "{}",
                PipelineError::ToolExecution {
                    tool: KREPORT2MPA_TAG.to_string(),
                    context: format!("{} > {}", study, sample),
                    status: result.status,
                }
            );
        }
    }
    reporter.rule(&format!("Converted {}'s Bracken reports to MPA format", study));
    Ok(())
}
