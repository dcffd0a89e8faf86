/// Structured construction and supervised execution of external commands

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use log::{debug, error};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::config::defs::{PipelineError, MAMBA_TAG};
use crate::utils::report::Reporter;

/// One external command: executable plus ordered arguments. No shell
/// is involved at any point.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        CommandSpec {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    /// Tools living in mamba environments are invoked as
    /// `mamba run -n <env> <tool> ...`.
    pub fn mamba_run(env: &str, tool: &str) -> Self {
        CommandSpec::new(MAMBA_TAG).args(["run", "-n", env, tool])
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Human-readable form for the process sink and logs.
    pub fn rendered(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Exit status and wall-clock duration of one finished command.
#[derive(Debug, Clone, Copy)]
pub struct CommandResult {
    pub status: i32,
    pub elapsed: Duration,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineLevel {
    Info,
    Warning,
    Error,
}

/// Advisory, case-insensitive classification of one output line.
/// Highlighting only; never changes control flow or the exit code.
pub fn classify_line(line: &str) -> LineLevel {
    let lower = line.to_ascii_lowercase();
    if lower.contains("error") {
        LineLevel::Error
    } else if lower.contains("warning") {
        LineLevel::Warning
    } else {
        LineLevel::Info
    }
}

fn forward_lines<R>(reader: R, tx: mpsc::Sender<String>) -> tokio::task::JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).await.is_err() {
                break;
            }
        }
    })
}

/// Runs one external command, streaming its merged stdout/stderr
/// through the reporter line by line.
///
/// # Arguments
///
/// * `reporter` - Shared output sink.
/// * `spec` - Program and arguments to execute.
/// * `desc` - Optional human-readable label for the sink.
///
/// # Returns
///
/// CommandResult with the exit code and elapsed time. A non-zero exit
/// is reported but not returned as an error; failure to launch is.
pub async fn run_command(
    reporter: &Reporter,
    spec: &CommandSpec,
    desc: Option<&str>,
) -> Result<CommandResult, PipelineError> {
    run_command_inner(reporter, spec, desc, None).await
}

/// Same as [`run_command`], additionally teeing every output line into
/// `log_path` so per-sample tool logs survive next to their outputs.
pub async fn run_command_logged(
    reporter: &Reporter,
    spec: &CommandSpec,
    desc: Option<&str>,
    log_path: &Path,
) -> Result<CommandResult, PipelineError> {
    run_command_inner(reporter, spec, desc, Some(log_path)).await
}

async fn run_command_inner(
    reporter: &Reporter,
    spec: &CommandSpec,
    desc: Option<&str>,
    log_path: Option<&Path>,
) -> Result<CommandResult, PipelineError> {
    reporter.command_start(&spec.rendered(), desc);
    debug!("Spawning: {}", spec.rendered());

    let mut command = Command::new(spec.program());
    command
        .args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = &spec.cwd {
        command.current_dir(dir);
    }

    let start = Instant::now();
    let mut child = command.spawn().map_err(|e| PipelineError::ToolLaunch {
        tool: spec.program().to_string(),
        error: e.to_string(),
    })?;

    let stdout = child.stdout.take().ok_or_else(|| PipelineError::ToolLaunch {
        tool: spec.program().to_string(),
        error: "no stdout handle on child".to_string(),
    })?;
    let stderr = child.stderr.take().ok_or_else(|| PipelineError::ToolLaunch {
        tool: spec.program().to_string(),
        error: "no stderr handle on child".to_string(),
    })?;

    // Both pipes feed one channel, so a single consumer owns the sink
    // and the optional log file.
    let (tx, mut rx) = mpsc::channel::<String>(256);
    let stdout_task = forward_lines(stdout, tx.clone());
    let stderr_task = forward_lines(stderr, tx);

    let mut log_file = match log_path {
        Some(path) => Some(std::fs::File::create(path)?),
        None => None,
    };

    while let Some(line) = rx.recv().await {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        reporter.child_line(classify_line(trimmed), trimmed);
        if let Some(file) = log_file.as_mut() {
            let _ = writeln!(file, "{}", trimmed);
        }
    }

    let status = child
        .wait()
        .await
        .map_err(|e| PipelineError::IOError(e.to_string()))?;
    let _ = stdout_task.await;
    let _ = stderr_task.await;

    let result = CommandResult {
        status: status.code().unwrap_or(-1),
        elapsed: start.elapsed(),
    };
    reporter.command_done(&result);
    if !result.success() {
        error!(
            "{} exited with code {} after {:.2} minutes",
            spec.program(),
            result.status,
            result.elapsed.as_secs_f64() / 60.0
        );
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_error_lines_any_case() {
        assert_eq!(classify_line("ERROR: no database"), LineLevel::Error);
        assert_eq!(classify_line("fatal error in step 2"), LineLevel::Error);
        assert_eq!(classify_line("ErRoR"), LineLevel::Error);
    }

    #[test]
    fn classifies_warning_lines_without_error() {
        assert_eq!(classify_line("WARNING: low disk space"), LineLevel::Warning);
        assert_eq!(classify_line("a warning about an error"), LineLevel::Error);
    }

    #[test]
    fn plain_lines_are_informational() {
        assert_eq!(classify_line("processed 1000 reads"), LineLevel::Info);
        assert_eq!(classify_line(""), LineLevel::Info);
    }

    #[test]
    fn spec_renders_program_and_args_in_order() {
        let spec = CommandSpec::new("bracken")
            .arg("-d")
            .arg("/db")
            .args(["-i", "in.report"]);
        assert_eq!(spec.rendered(), "bracken -d /db -i in.report");
        assert_eq!(spec.program(), "bracken");
    }

    #[test]
    fn mamba_run_prefixes_the_tool() {
        let spec = CommandSpec::mamba_run("kraken_env", "k2").arg("classify");
        assert_eq!(spec.rendered(), "mamba run -n kraken_env k2 classify");
    }
}
