use std::collections::HashMap;
use std::path::PathBuf;

use lazy_static::lazy_static;
use thiserror::Error;
use tokio::time::Duration;

use crate::cli::Arguments;
use crate::utils::dispatch::ErrorPolicy;

// External software
pub const FASTQC_TAG: &str = "fastqc";
pub const MULTIQC_TAG: &str = "multiqc";
pub const BBDUK_TAG: &str = "bbduk.sh";
pub const FASTP_TAG: &str = "fastp";
pub const HOSTILE_TAG: &str = "hostile";
pub const KRAKEN2_TAG: &str = "k2";
pub const BRACKEN_TAG: &str = "bracken";
pub const KREPORT2MPA_TAG: &str = "kreport2mpa.py";
pub const EXTRACT_READS_TAG: &str = "extract_kraken_reads.py";
pub const NEXTFLOW_TAG: &str = "nextflow";
pub const PREFETCH_TAG: &str = "prefetch";
pub const FASTERQ_DUMP_TAG: &str = "fasterq-dump";
pub const PIGZ_TAG: &str = "pigz";
pub const RSYNC_TAG: &str = "rsync";
pub const MAMBA_TAG: &str = "mamba";

// Keys expected in the utility paths CSV (tool env names and DB paths)
pub const UTIL_FASTQC: &str = "FastQC";
pub const UTIL_MULTIQC: &str = "MultiQC";
pub const UTIL_BBDUK: &str = "BBDuk";
pub const UTIL_BB_ADAPTERS: &str = "bb_adapters";
pub const UTIL_FASTP: &str = "fastp";
pub const UTIL_HOSTILE: &str = "Hostile";
pub const UTIL_HOSTILE_DB: &str = "Hostile_DB";
pub const UTIL_KRAKEN2: &str = "Kraken2";
pub const UTIL_KRAKEN_DB: &str = "kraken_DB";
pub const UTIL_BRACKEN: &str = "Bracken";
pub const UTIL_KRAKENTOOLS: &str = "krakentools";
pub const UTIL_AMRPP_PATH: &str = "AMR++_path";
pub const UTIL_SRA_TOOLS: &str = "sra-tools";

// Per-study output directories
pub const SRA_FILES_DIR: &str = "sra_files";
pub const RAW_READS_DIR: &str = "raw_reads";
pub const RAW_QC_DIR: &str = "raw_qc";
pub const RAW_MQC_DIR: &str = "raw_mqc";
pub const BB_OUT_DIR: &str = "bb_out";
pub const BB_QC_DIR: &str = "bb_qc";
pub const BB_MQC_DIR: &str = "bb_mqc";
pub const FP_OUT_DIR: &str = "fp_out";
pub const FP_QC_DIR: &str = "fp_qc";
pub const FP_MQC_DIR: &str = "fp_mqc";
pub const HOSTILE_OUT_DIR: &str = "hostile_out";
pub const KRAKEN_OUT_DIR: &str = "kraken_out";
pub const AMR_OUT_DIR: &str = "amr_out";
pub const SP_READS_DIR: &str = "amrk2_sp_reads";

// AMR++ writes exactly these four entries under Results when complete
pub const AMRPP_RESULT_COUNT: usize = 4;

// Allowed -l/--split_size values; 1 means no splitting
pub const SPLIT_CHOICES: &[usize] = &[1, 2, 3, 4, 5, 10, 20, 50];

// Pause between launching successive workers, so concurrent tool
// startups do not all hit the disk and DB memory-mapping at once
pub const DEFAULT_STAGGER_MS: u64 = 1_000;

lazy_static! {
    pub static ref MODULES: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("fetch_reads", "Download FASTQ files from the SRA and compress them");
        m.insert("sync_reads", "Copy raw reads from aliased source directories with rsync");
        m.insert("make_lists", "Generate a samples_list.txt for each study from raw_reads");
        m.insert("make_files", "Create study directories and sample lists from a metadata CSV");
        m.insert("qc_host", "Run FastQC/MultiQC, BBDuk, fastp and Hostile host removal");
        m.insert("classify", "Classify reads with Kraken2, Bracken and MPA conversion");
        m.insert("extract_reads", "Extract per-species reads with KrakenTools");
        m.insert("amr", "Quantify AMR genes with AMR++ (Nextflow)");
        m
    };
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    IOError(String),

    #[error("Missing input: {0}")]
    MissingInput(String),

    #[error("No study directories with {projects} found under {base}")]
    StudiesNotFound { base: String, projects: String },

    #[error("Failed to launch {tool}: {error}")]
    ToolLaunch { tool: String, error: String },

    #[error("{tool} failed on {context} (exit code {status})")]
    ToolExecution {
        tool: String,
        context: String,
        status: i32,
    },

    #[error("Worker {slot} panicked: {error}")]
    WorkerPanic { slot: usize, error: String },

    #[error("Aborting run: worker {slot} failed")]
    WorkerAborted { slot: usize },
}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        PipelineError::IOError(e.to_string())
    }
}

pub struct RunConfig {
    pub cwd: PathBuf,
    pub study_name: String,
    pub utility_paths: HashMap<String, String>,
    pub args: Arguments,
}

impl RunConfig {
    pub fn stagger(&self) -> Duration {
        Duration::from_millis(self.args.stagger_ms)
    }

    pub fn policy(&self) -> ErrorPolicy {
        if self.args.fail_fast {
            ErrorPolicy::Halt
        } else {
            ErrorPolicy::Proceed
        }
    }
}
