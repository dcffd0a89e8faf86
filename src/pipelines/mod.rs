pub mod amr;
pub mod classify;
pub mod extract_reads;
pub mod fetch_reads;
pub mod make_files;
pub mod make_lists;
pub mod qc_host;
pub mod sync_reads;
