use clap::Parser;

use crate::config::defs::{DEFAULT_STAGGER_MS, SPLIT_CHOICES};

fn parse_split_size(value: &str) -> Result<usize, String> {
    let parsed: usize = value
        .parse()
        .map_err(|_| format!("'{}' is not a number", value))?;
    if SPLIT_CHOICES.contains(&parsed) {
        Ok(parsed)
    } else {
        Err(format!(
            "split_size must be one of {:?}, got {}",
            SPLIT_CHOICES, parsed
        ))
    }
}

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "resistome-pipelines", version, about = "Drivers for a multi-study metagenomic AMR surveillance pipeline")]
pub struct Arguments {
    #[arg(short, long, help = "Pipeline stage to run (see --help for the list)")]
    pub module: String,

    #[arg(short = 'v', long = "verbose", action)]
    pub verbose: bool,

    #[arg(
        short = 'b',
        long = "base_dir",
        default_value = "all_data",
        help = "Base directory with all data"
    )]
    pub base_dir: String,

    #[arg(
        short = 's',
        long = "samples",
        default_value = "samples_list.txt",
        help = "List of sample IDs as a text file, one per study directory"
    )]
    pub samples: String,

    #[arg(
        short = 'p',
        long = "projects",
        default_value = "studies_list.txt",
        help = "List of project names as a text file"
    )]
    pub projects: String,

    #[arg(
        short = 'u',
        long = "utility_paths",
        default_value = "utility_paths.csv",
        help = "Envs or paths for tools and DBs as a CSV file"
    )]
    pub utility_paths: String,

    #[arg(
        short = 'c',
        long = "species",
        default_value = "species_list.csv",
        help = "Species name to taxid pairs as a CSV file (extract_reads)"
    )]
    pub species: String,

    #[arg(
        short = 'a',
        long = "aliases",
        default_value = "st_aliases.csv",
        help = "Study alias pairs as a CSV file (sync_reads)"
    )]
    pub aliases: String,

    #[arg(short = 'i', long, help = "Input CSV or text file (make_files, make_lists)")]
    pub input: Option<String>,

    #[arg(long = "source_dir", help = "Source root holding aliased study directories (sync_reads)")]
    pub source_dir: Option<String>,

    #[arg(short = 't', long, default_value_t = 1, help = "Threads passed to each external tool")]
    pub threads: usize,

    #[arg(
        short = 'l',
        long = "split_size",
        default_value_t = 1,
        value_parser = parse_split_size,
        help = "Number of sub-lists to make and run concurrently (default: no splitting)"
    )]
    pub split_size: usize,

    #[arg(
        long = "stagger_ms",
        default_value_t = DEFAULT_STAGGER_MS,
        help = "Delay in ms between launching successive workers"
    )]
    pub stagger_ms: u64,

    #[arg(
        long = "fail_fast",
        action,
        help = "Abort the stage when any worker fails instead of continuing"
    )]
    pub fail_fast: bool,
}
