/// Sample list generation: one samples_list.txt per study, derived
/// from the unique stems of its raw_reads entries.

use std::collections::BTreeSet;
use std::fs;
use std::sync::Arc;

use log::{info, warn};

use crate::config::defs::{PipelineError, RunConfig, RAW_READS_DIR};
use crate::utils::file::write_lines;
use crate::utils::info::names_list;
use crate::utils::report::Reporter;

pub async fn run(config: Arc<RunConfig>, reporter: Reporter) -> Result<(), PipelineError> {
    reporter.banner(
        &config.study_name,
        "Generating list of samples for each project...",
    );

    let input = config
        .args
        .input
        .clone()
        .unwrap_or_else(|| config.args.projects.clone());
    let studies = names_list(&config.cwd.join(&input))?;

    for study in &studies {
        let study_dir = config.cwd.join(study);
        let raw_reads = study_dir.join(RAW_READS_DIR);
        if !raw_reads.is_dir() {
            warn!("{} has no {} directory; skipping", study, RAW_READS_DIR);
            continue;
        }

        // Run accession is everything before the first underscore
        let mut stems = BTreeSet::new();
        for entry in fs::read_dir(&raw_reads)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let stem = name.split('_').next().unwrap_or(&name).to_string();
            stems.insert(stem);
        }

        let samples: Vec<String> = stems.into_iter().collect();
        write_lines(&study_dir.join(&config.args.samples), &samples)?;
        info!(
            "List of {} samples generated for {}.",
            samples.len(),
            study
        );
    }

    reporter.rule("Sample lists created successfully");
    Ok(())
}
