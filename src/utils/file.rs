/// Directory helpers behind the idempotent skip checks

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Final path component as an owned string, for log lines.
pub fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// True when `dir` contains any of `names`. Mirrors the skip checks
/// the drivers run before expensive work (a missing directory counts
/// as "nothing done yet").
pub fn dir_has_any(dir: &Path, names: &[String]) -> bool {
    names.iter().any(|name| dir.join(name).is_file())
}

pub fn dir_entry_count(dir: &Path) -> usize {
    fs::read_dir(dir).map(|rd| rd.count()).unwrap_or(0)
}

/// Sorted regular files in `dir` whose names end with `suffix`.
pub fn files_with_suffix(dir: &Path, suffix: &str) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let matches = path
            .file_name()
            .map(|n| n.to_string_lossy().ends_with(suffix))
            .unwrap_or(false);
        if matches && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Sorted regular files in `dir` whose names start with `prefix`.
pub fn files_with_prefix(dir: &Path, prefix: &str) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let matches = path
            .file_name()
            .map(|n| n.to_string_lossy().starts_with(prefix))
            .unwrap_or(false);
        if matches && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Appends every line of `src` containing `needle` to `dest`. Used to
/// collect per-sample tool totals into one counts file per study.
pub fn append_matching_lines(src: &Path, needle: &str, dest: &Path) -> io::Result<usize> {
    let reader = BufReader::new(File::open(src)?);
    let mut out = OpenOptions::new().create(true).append(true).open(dest)?;
    let mut appended = 0;
    for line in reader.lines() {
        let line = line?;
        if line.contains(needle) {
            writeln!(out, "{}", line)?;
            appended += 1;
        }
    }
    Ok(appended)
}

/// Removes everything inside `dir`, leaving the directory itself.
pub fn clear_dir(dir: &Path) -> io::Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

pub fn write_lines(path: &Path, items: &[String]) -> io::Result<()> {
    let mut file = File::create(path)?;
    for item in items {
        writeln!(file, "{}", item)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dir_has_any_matches_present_files() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("S1_R2.fq.gz")).unwrap();
        let markers = vec!["S1_R2.fq.gz".to_string(), "S1.fq.gz".to_string()];
        assert!(dir_has_any(dir.path(), &markers));
        let absent = vec!["S2.fq.gz".to_string()];
        assert!(!dir_has_any(dir.path(), &absent));
        assert!(!dir_has_any(&dir.path().join("missing"), &markers));
    }

    #[test]
    fn suffix_and_prefix_listings_are_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b_2.fastq", "a_1.fastq", "a_1.txt"] {
            File::create(dir.path().join(name)).unwrap();
        }
        let fastqs = files_with_suffix(dir.path(), ".fastq").unwrap();
        let names: Vec<_> = fastqs
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a_1.fastq", "b_2.fastq"]);

        let a_files = files_with_prefix(dir.path(), "a_").unwrap();
        assert_eq!(a_files.len(), 2);
    }

    #[test]
    fn matching_lines_are_appended() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("sample.log");
        let counts = dir.path().join("counts.txt");
        fs::write(&log, "Input: 100 reads\nResult: 90 reads\nother\n").unwrap();
        let n = append_matching_lines(&log, "Result", &counts).unwrap();
        assert_eq!(n, 1);
        let body = fs::read_to_string(&counts).unwrap();
        assert_eq!(body, "Result: 90 reads\n");
    }

    #[test]
    fn clear_dir_empties_but_keeps_the_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("work")).unwrap();
        File::create(dir.path().join("work/trace.txt")).unwrap();
        File::create(dir.path().join("stray.txt")).unwrap();
        clear_dir(dir.path()).unwrap();
        assert!(dir.path().is_dir());
        assert_eq!(dir_entry_count(dir.path()), 0);
    }
}
