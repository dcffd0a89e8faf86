/// Readers for the small list and lookup files every driver consumes

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::info;

use crate::config::defs::{PipelineError, RunConfig};

/// Reads IDs or names from a text file, one per line, skipping blanks.
pub fn names_list(path: &Path) -> Result<Vec<String>, PipelineError> {
    let text = fs::read_to_string(path)
        .map_err(|e| PipelineError::MissingInput(format!("{}: {}", path.display(), e)))?;
    let parent = path
        .parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let names: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    info!("Read {} IDs from {} > {}", names.len(), parent, file_name);
    Ok(names)
}

/// Parses a two-column CSV (header row skipped) into key/value pairs.
/// Used for the utility paths, species taxids and study aliases.
pub fn load_pairs(path: &Path) -> Result<HashMap<String, String>, PipelineError> {
    let text = fs::read_to_string(path)
        .map_err(|e| PipelineError::MissingInput(format!("{}: {}", path.display(), e)))?;
    let mut pairs = HashMap::new();
    for line in text.lines().skip(1) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.splitn(2, ',');
        let key = fields.next().unwrap_or_default().trim();
        let value = fields.next().unwrap_or_default().trim();
        if key.is_empty() || value.is_empty() {
            return Err(PipelineError::InvalidConfig(format!(
                "Malformed row in {}: '{}'",
                path.display(),
                line
            )));
        }
        pairs.insert(key.to_string(), value.to_string());
    }
    info!("Generated {} pairs from {}", pairs.len(), path.display());
    Ok(pairs)
}

/// Looks up a tool env or DB path loaded from the utility paths CSV.
pub fn tool_path<'a>(
    paths: &'a HashMap<String, String>,
    key: &str,
) -> Result<&'a str, PipelineError> {
    paths
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| PipelineError::InvalidConfig(format!("No '{}' entry in the utility paths file", key)))
}

/// Resolves the directories holding study sets: the base directory
/// itself when it contains the projects file, otherwise every direct
/// subdirectory that does. An empty result is a precondition failure
/// that stops the stage before any dispatch.
pub fn resolve_base_dirs(config: &RunConfig) -> Result<Vec<PathBuf>, PipelineError> {
    let base = if config.args.base_dir == "." || config.args.base_dir == "./" {
        config.cwd.clone()
    } else {
        config.cwd.join(&config.args.base_dir)
    };

    if base.join(&config.args.projects).is_file() {
        info!(
            "Found project file {} in {}",
            config.args.projects, config.args.base_dir
        );
        return Ok(vec![base]);
    }

    info!(
        "{} not in {}, searching subdirectories.",
        config.args.projects, config.args.base_dir
    );
    let mut dirs = Vec::new();
    let entries = fs::read_dir(&base)
        .map_err(|e| PipelineError::MissingInput(format!("{}: {}", base.display(), e)))?;
    for entry in entries {
        let entry = entry.map_err(|e| PipelineError::IOError(e.to_string()))?;
        let path = entry.path();
        if path.is_dir() && path.join(&config.args.projects).is_file() {
            dirs.push(path);
        }
    }
    dirs.sort();

    if dirs.is_empty() {
        return Err(PipelineError::StudiesNotFound {
            base: config.args.base_dir.clone(),
            projects: config.args.projects.clone(),
        });
    }
    Ok(dirs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn names_list_trims_and_skips_blanks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("samples_list.txt");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "SRR001\n  SRR002  \n\nSRR003").unwrap();
        let names = names_list(&path).unwrap();
        assert_eq!(names, vec!["SRR001", "SRR002", "SRR003"]);
    }

    #[test]
    fn names_list_missing_file_is_missing_input() {
        let err = names_list(Path::new("/no/such/list.txt")).unwrap_err();
        assert!(matches!(err, PipelineError::MissingInput(_)));
    }

    #[test]
    fn load_pairs_skips_header_and_maps_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("utility_paths.csv");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "tool,env\nKraken2,kraken_env\nkraken_DB,/db/k2").unwrap();
        let pairs = load_pairs(&path).unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs["Kraken2"], "kraken_env");
        assert_eq!(tool_path(&pairs, "kraken_DB").unwrap(), "/db/k2");
        assert!(tool_path(&pairs, "Bracken").is_err());
    }
}
