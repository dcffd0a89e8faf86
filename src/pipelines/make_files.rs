/// Study scaffolding from a run metadata CSV: one directory plus
/// samples_list.txt per study alias, and a studies_list.txt covering
/// all of them.

use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;

use log::info;

use crate::config::defs::{PipelineError, RunConfig};
use crate::utils::file::write_lines;
use crate::utils::report::Reporter;

const STUDY_COLUMN: &str = "Study_Alias";
const RUN_COLUMN: &str = "Run";

pub async fn run(config: Arc<RunConfig>, reporter: Reporter) -> Result<(), PipelineError> {
    reporter.banner(&config.study_name, "Generating files and directories...");

    let input = config.args.input.as_ref().ok_or_else(|| {
        PipelineError::InvalidConfig("--input CSV is required for make_files".to_string())
    })?;
    let path = config.cwd.join(input);
    let text = fs::read_to_string(&path)
        .map_err(|e| PipelineError::MissingInput(format!("{}: {}", path.display(), e)))?;

    let mut lines = text.lines();
    let header = lines
        .next()
        .ok_or_else(|| PipelineError::InvalidConfig(format!("{} is empty", input)))?;
    let columns: Vec<&str> = header.split(',').map(str::trim).collect();
    let study_idx = column_index(&columns, STUDY_COLUMN, input)?;
    let run_idx = column_index(&columns, RUN_COLUMN, input)?;

    let mut runs_by_study: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let study = fields.get(study_idx).copied().unwrap_or_default();
        let run = fields.get(run_idx).copied().unwrap_or_default();
        if study.is_empty() || run.is_empty() {
            return Err(PipelineError::InvalidConfig(format!(
                "Malformed row in {}: '{}'",
                input, line
            )));
        }
        runs_by_study
            .entry(study.to_string())
            .or_default()
            .push(run.to_string());
    }
    info!("Found {} unique studies in the CSV file.", runs_by_study.len());

    let base = config.cwd.join(&config.args.base_dir);
    for (study, runs) in &runs_by_study {
        let study_dir = base.join(study);
        fs::create_dir_all(&study_dir)?;
        info!("Created directory for study: {} at {}", study, study_dir.display());
        write_lines(&study_dir.join(&config.args.samples), runs)?;
        info!(
            "Created text file at: {} with {} entries.",
            study_dir.join(&config.args.samples).display(),
            runs.len()
        );
    }

    let studies: Vec<String> = runs_by_study.keys().cloned().collect();
    write_lines(&base.join(&config.args.projects), &studies)?;

    reporter.rule("Finished generating files and directories");
    Ok(())
}

fn column_index(columns: &[&str], name: &str, input: &str) -> Result<usize, PipelineError> {
    columns
        .iter()
        .position(|c| *c == name)
        .ok_or_else(|| PipelineError::InvalidConfig(format!("No '{}' column in {}", name, input)))
}
