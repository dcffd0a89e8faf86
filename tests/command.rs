use anyhow::Result;

use resistome_pipelines::config::defs::PipelineError;
use resistome_pipelines::utils::command::{run_command, run_command_logged, CommandSpec};
use resistome_pipelines::utils::report::Reporter;

#[tokio::test]
async fn zero_exit_is_never_an_error_outcome() -> Result<()> {
    let (reporter, buf) = Reporter::buffer();
    let spec = CommandSpec::new("true");
    let result = run_command(&reporter, &spec, None).await?;
    assert_eq!(result.status, 0);
    assert!(result.success());
    assert!(buf.contents().contains("Command finished"));
    assert!(!buf.contents().contains("exit code"));
    Ok(())
}

#[tokio::test]
async fn nonzero_exit_is_reported_not_raised() -> Result<()> {
    let (reporter, buf) = Reporter::buffer();
    let spec = CommandSpec::new("false");
    let result = run_command(&reporter, &spec, Some("expected to fail")).await?;
    assert_eq!(result.status, 1);
    assert!(!result.success());
    assert!(buf.contents().contains("exit code 1"));
    Ok(())
}

#[tokio::test]
async fn exit_code_is_surfaced_unchanged() -> Result<()> {
    let (reporter, _buf) = Reporter::buffer();
    let spec = CommandSpec::new("sh").args(["-c", "exit 7"]);
    let result = run_command(&reporter, &spec, None).await?;
    assert_eq!(result.status, 7);
    Ok(())
}

#[tokio::test]
async fn missing_executable_is_a_launch_error() {
    let (reporter, _buf) = Reporter::buffer();
    let spec = CommandSpec::new("definitely-not-an-installed-tool-2199");
    let outcome = run_command(&reporter, &spec, None).await;
    assert!(matches!(outcome, Err(PipelineError::ToolLaunch { .. })));
}

#[tokio::test]
async fn output_lines_are_streamed_and_classified() -> Result<()> {
    let (reporter, buf) = Reporter::buffer();
    let spec = CommandSpec::new("sh").args([
        "-c",
        "echo 'ERROR: db not found'; echo 'WARNING: low disk' >&2; echo 'all good'",
    ]);
    let result = run_command(&reporter, &spec, Some("classification probe")).await?;

    // Classification is advisory; the zero exit code is untouched
    assert_eq!(result.status, 0);
    let out = buf.contents();
    assert!(out.contains("  ! ERROR: db not found"));
    assert!(out.contains("  ~ WARNING: low disk"));
    assert!(out.contains("    all good"));
    assert!(out.contains("[classification probe] $ sh -c"));
    Ok(())
}

#[tokio::test]
async fn repeated_runs_yield_independent_results() -> Result<()> {
    let (reporter, _buf) = Reporter::buffer();
    let spec = CommandSpec::new("true");
    let first = run_command(&reporter, &spec, None).await?;
    let second = run_command(&reporter, &spec, None).await?;
    assert!(first.success());
    assert!(second.success());
    Ok(())
}

#[tokio::test]
async fn logged_run_tees_merged_output_to_file() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let log_path = dir.path().join("sample.log");
    let (reporter, buf) = Reporter::buffer();
    let spec = CommandSpec::new("sh").args(["-c", "echo trimmed; echo 'Result: 90 reads' >&2"]);
    let result = run_command_logged(&reporter, &spec, None, &log_path).await?;

    assert!(result.success());
    let body = std::fs::read_to_string(&log_path)?;
    assert!(body.contains("trimmed"));
    assert!(body.contains("Result: 90 reads"));
    assert!(buf.contents().contains("trimmed"));
    Ok(())
}
