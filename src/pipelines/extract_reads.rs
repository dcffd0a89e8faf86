/// Per-species read extraction with KrakenTools: the work items are
/// species, each worker walking every sample of the study for its
/// assigned species and compressing the extracted pairs.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{error, info};

use crate::config::defs::{
    PipelineError, RunConfig, EXTRACT_READS_TAG, HOSTILE_OUT_DIR, KRAKEN_OUT_DIR, PIGZ_TAG,
    SP_READS_DIR, UTIL_KRAKENTOOLS,
};
use crate::utils::command::{run_command, CommandSpec};
use crate::utils::dispatch::{dispatch, WorkerSlot};
use crate::utils::file::{base_name, dir_has_any, files_with_prefix};
use crate::utils::info::{load_pairs, names_list, resolve_base_dirs, tool_path};
use crate::utils::report::Reporter;

pub async fn run(config: Arc<RunConfig>, reporter: Reporter) -> Result<(), PipelineError> {
    reporter.banner(&config.study_name, "Extracting reads with KrakenTools...");

    let species_map = load_pairs(&config.cwd.join(&config.args.species))?;
    info!("Found {} species in {}", species_map.len(), config.args.species);
    let mut species: Vec<String> = species_map.keys().cloned().collect();
    species.sort();

    let base_dirs = resolve_base_dirs(&config)?;

    for base in &base_dirs {
        reporter.rule(&format!(
            "Extracting species reads for all studies in {}",
            base_name(base)
        ));
        let studies = names_list(&base.join(&config.args.projects))?;
        info!("Found {} studies in {}", studies.len(), base_name(base));

        for study in &studies {
            reporter.rule(&format!("Extracting species reads from {}", study));
            let study_dir = base.join(study);
            let sp_reads = study_dir.join(SP_READS_DIR);
            fs::create_dir_all(&sp_reads)?;

            let samples = names_list(&study_dir.join(&config.args.samples))?;
            info!("Project {} has {} samples...", study, samples.len());

            dispatch(
                &reporter,
                config.args.split_size,
                &species,
                config.stagger(),
                config.policy(),
                |partition, slot| {
                    extract_partition(
                        config.clone(),
                        study.clone(),
                        study_dir.clone(),
                        samples.clone(),
                        species_map.clone(),
                        partition,
                        slot,
                    )
                },
            )
            .await?;

            reporter.rule(&format!(
                "Completed extracting reads for all species from {}",
                study
            ));
        }
    }
    Ok(())
}

async fn extract_partition(
    config: Arc<RunConfig>,
    study: String,
    study_dir: PathBuf,
    samples: Vec<String>,
    species_map: HashMap<String, String>,
    partition: Vec<String>,
    slot: WorkerSlot,
) -> Result<(), PipelineError> {
    let krakentools_env = tool_path(&config.utility_paths, UTIL_KRAKENTOOLS)?.to_string();
    let kraken_out = study_dir.join(KRAKEN_OUT_DIR);
    let hostile_out = study_dir.join(HOSTILE_OUT_DIR);
    let sp_reads = study_dir.join(SP_READS_DIR);
    let total = partition.len();

    for (i, species) in partition.iter().enumerate() {
        let sp_dir = sp_reads.join(species);
        fs::create_dir_all(&sp_dir)?;
        let tax_id = species_map.get(species).ok_or_else(|| {
            PipelineError::InvalidConfig(format!("No taxid for species {}", species))
        })?;

        for (j, sample) in samples.iter().enumerate() {
            slot.update(&format!(
                "Extracting reads of {} > {} ({}/{}) for species {} ({}/{})",
                study,
                sample,
                j + 1,
                samples.len(),
                species,
                i + 1,
                total
            ));

            let compressed = [format!("{}_2.fq.gz", sample), format!("{}.fq.gz", sample)];
            if dir_has_any(&sp_dir, &compressed) {
                continue;
            }

            let uncompressed = [format!("{}_2.fq", sample), format!("{}.fq", sample)];
            if dir_has_any(&sp_dir, &uncompressed) {
                compress_extracted(&slot, &sp_dir, sample, species).await?;
                continue;
            }

            info!("Extracting reads of {} from {}...", species, sample);
            let spec = CommandSpec::mamba_run(&krakentools_env, EXTRACT_READS_TAG)
                .arg("-k")
                .arg(
                    kraken_out
                        .join(sample)
                        .join(format!("{}.out", sample))
                        .display()
                        .to_string(),
                )
                .arg("-r")
                .arg(
                    kraken_out
                        .join(sample)
                        .join(format!("{}.report", sample))
                        .display()
                        .to_string(),
                )
                .arg("-1")
                .arg(
                    hostile_out
                        .join(format!("{}_R1.clean_1.fastq.gz", sample))
                        .display()
                        .to_string(),
                )
                .arg("-2")
                .arg(
                    hostile_out
                        .join(format!("{}_R2.clean_2.fastq.gz", sample))
                        .display()
                        .to_string(),
                )
                .arg("-o")
                .arg(sp_dir.join(format!("{}_1.fq", sample)).display().to_string())
                .arg("-o2")
                .arg(sp_dir.join(format!("{}_2.fq", sample)).display().to_string())
                .arg("--fastq-output")
                .arg("-t")
                .arg(tax_id.as_str())
                .arg("--include-children");
            let result = run_command(
                slot.reporter(),
                &spec,
                Some(&format!("Extracting {} reads from {}", species, sample)),
            )
            .await?;
            if !result.success() {
                error!(
                    "{}",
                    PipelineError::ToolExecution {
                        tool: EXTRACT_READS_TAG.to_string(),
                        context: format!("{} > {} ({})", study, sample, species),
                        status: result.status,
                    }
                );
                continue;
            }

            compress_extracted(&slot, &sp_dir, sample, species).await?;
        }

        slot.item_done();
    }
    Ok(())
}

async fn compress_extracted(
    slot: &WorkerSlot,
    sp_dir: &Path,
    sample: &str,
    species: &str,
) -> Result<(), PipelineError> {
    let extracted: Vec<PathBuf> = files_with_prefix(sp_dir, &format!("{}_", sample))?
        .into_iter()
        .filter(|path| base_name(path).ends_with(".fq"))
        .collect();
    if extracted.is_empty() {
        return Ok(());
    }

    let mut spec = CommandSpec::new(PIGZ_TAG);
    for path in &extracted {
        spec = spec.arg(path.display().to_string());
    }
    let result = run_command(
        slot.reporter(),
        &spec,
        Some(&format!("Compressing {} - {} reads", species, sample)),
    )
    .await?;
    if !result.success() {
        error!(
            "{}",
            PipelineError::ToolExecution {
                tool: PIGZ_TAG.to_string(),
                context: format!("{} ({})", sample, species),
                status: result.status,
            }
        );
    }
    Ok(())
}
