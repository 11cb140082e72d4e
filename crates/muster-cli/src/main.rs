//! muster CLI
//!
//! Runs one action across a fleet of targets with bounded concurrency and
//! writes a per-target report.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use color_eyre::Result;
use tokio::io::AsyncReadExt;
use tokio::sync::broadcast;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use muster_core::{
    AlwaysReachable, Dispatcher, LogProgress, ReportFormat, ReportWriter, RunConfig, RunEvent,
    RunReport, Target, parse_targets, targets_from_file,
};

mod config;
mod factory;

use config::FileConfig;

#[derive(Parser)]
#[command(name = "muster")]
#[command(about = "Run one action across a fleet of targets, with bounded concurrency and a per-target report", long_about = None)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an action against every target and write a report
    Run(RunArgs),
    /// Probe every target and report what is reachable
    Check(CheckArgs),
}

#[derive(Args)]
struct TargetArgs {
    /// Targets given inline
    #[arg(value_name = "TARGETS")]
    inline: Vec<String>,

    /// File with one target per line, `-` for stdin
    #[arg(long = "targets", value_name = "FILE")]
    file: Option<PathBuf>,
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    targets: TargetArgs,

    /// Local shell command template; {target} and {key} placeholders are
    /// filled per target
    #[arg(long, value_name = "TEMPLATE", conflicts_with = "ssh")]
    command: Option<String>,

    /// Command template run on each target over SSH
    #[arg(long, value_name = "TEMPLATE")]
    ssh: Option<String>,

    /// SSH user (default root)
    #[arg(long)]
    user: Option<String>,

    /// SSH port (default 22)
    #[arg(long)]
    port: Option<u16>,

    /// SSH private key path (default: base64 key in $MUSTER_SSH_KEY)
    #[arg(long, value_name = "FILE")]
    key: Option<PathBuf>,

    /// TCP port probed before dispatch (default: the SSH port for SSH runs,
    /// off for local runs)
    #[arg(long, value_name = "PORT")]
    probe_port: Option<u16>,

    /// Probe timeout in seconds
    #[arg(long, value_name = "SECS")]
    probe_timeout: Option<u64>,

    /// Skip the reachability probe
    #[arg(long)]
    no_probe: bool,

    /// Maximum actions in flight at once
    #[arg(long, value_name = "N")]
    max_concurrent: Option<usize>,

    /// Per-action timeout in seconds
    #[arg(long, value_name = "SECS")]
    task_timeout: Option<u64>,

    /// Whole-run deadline in seconds
    #[arg(long, value_name = "SECS")]
    run_timeout: Option<u64>,

    /// Report destination (default: muster-report-<timestamp> in the
    /// current directory)
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Report format
    #[arg(long, value_enum)]
    format: Option<FormatArg>,

    /// Append each outcome as it completes instead of one final write
    #[arg(long)]
    stream: bool,

    /// Report write attempts before giving up
    #[arg(long, value_name = "N")]
    retry_attempts: Option<u32>,

    /// Delay between report write attempts in seconds
    #[arg(long, value_name = "SECS")]
    retry_delay: Option<u64>,

    /// Action parameter as key=value (repeatable)
    #[arg(long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,
}

#[derive(Args)]
struct CheckArgs {
    #[command(flatten)]
    targets: TargetArgs,

    /// TCP port to probe (default 22)
    #[arg(long, value_name = "PORT")]
    probe_port: Option<u16>,

    /// Probe timeout in seconds
    #[arg(long, value_name = "SECS")]
    probe_timeout: Option<u64>,

    /// Maximum probes in flight at once
    #[arg(long, value_name = "N")]
    max_concurrent: Option<usize>,

    /// Optional report destination
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Report format
    #[arg(long, value_enum)]
    format: Option<FormatArg>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum FormatArg {
    Csv,
    Jsonl,
}

impl From<FormatArg> for ReportFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Csv => ReportFormat::Csv,
            FormatArg::Jsonl => ReportFormat::JsonLines,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = color_eyre::install() {
        eprintln!("error: {e}");
        return ExitCode::from(2);
    }
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match execute(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("error: {e:?}");
            ExitCode::from(2)
        }
    }
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn execute(cli: Cli) -> Result<u8> {
    let file = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::load_default()?,
    };

    match cli.command {
        Commands::Run(args) => cmd_run(args, file).await,
        Commands::Check(args) => cmd_check(args, file).await,
    }
}

async fn cmd_run(args: RunArgs, file: FileConfig) -> Result<u8> {
    let targets = collect_targets(&args.targets).await?;
    let run_config = run_config_for(&args, &file);
    run_config.validate()?;

    // Config file parameters first, --param flags override
    let mut params = file.action_params()?;
    for raw in &args.params {
        let (key, value) = factory::parse_param(raw)?;
        params.insert(key, value);
    }

    let (action, default_probe_port) = if let Some(template) = &args.command {
        (factory::local_action(template), None)
    } else if let Some(template) = &args.ssh {
        let user = args
            .user
            .clone()
            .or(file.ssh.user.clone())
            .unwrap_or_else(|| "root".to_string());
        let port = args.port.or(file.ssh.port).unwrap_or(22);
        let key = args.key.clone().or(file.ssh.key.clone());
        let action = factory::ssh_action(&user, port, key.as_deref(), template)?;
        (action, Some(port))
    } else {
        eyre::bail!("one of --command or --ssh is required");
    };

    let probe_port = args.probe_port.or(file.run.probe_port).or(default_probe_port);
    let probe = factory::probe(probe_port, run_config.probe_timeout, args.no_probe);

    let format = report_format(args.format, &file)?;
    let path = args
        .report
        .clone()
        .or(file.report.path.clone())
        .unwrap_or_else(|| default_report_path(format));
    let writer = ReportWriter::new(&path, format)
        .with_retry(run_config.retry_attempts, run_config.retry_delay);

    let dispatcher = Dispatcher::new(action, probe, run_config)
        .with_params(params)
        .with_progress(Arc::new(LogProgress));

    let stream = args.stream || file.report.stream.unwrap_or(false);
    let report = if stream {
        run_streaming(&dispatcher, &writer, targets).await?
    } else {
        let report = dispatcher.run(targets).await?;
        writer.write(&report).await?;
        report
    };

    print_summary(&report, writer.path());
    Ok(exit_code(&report))
}

async fn cmd_check(args: CheckArgs, file: FileConfig) -> Result<u8> {
    let targets = collect_targets(&args.targets).await?;

    let defaults = RunConfig::default();
    let probe_timeout = args
        .probe_timeout
        .or(file.run.probe_timeout)
        .map_or(defaults.probe_timeout, Duration::from_secs);
    let run_config = RunConfig {
        max_concurrent: args
            .max_concurrent
            .or(file.run.max_concurrent)
            .unwrap_or(defaults.max_concurrent),
        probe_timeout,
        ..defaults
    };

    let port = args.probe_port.or(file.run.probe_port).unwrap_or(22);
    let action = Arc::new(factory::ProbeAction::new(factory::probe(
        Some(port),
        probe_timeout,
        false,
    )));

    // The probe is the action here, so skip the pre-dispatch probe
    let dispatcher = Dispatcher::new(action, Arc::new(AlwaysReachable), run_config)
        .with_progress(Arc::new(LogProgress));
    let report = dispatcher.run(targets).await?;

    if let Some(path) = &args.report {
        let format = report_format(args.format, &file)?;
        ReportWriter::new(path, format).write(&report).await?;
        println!("report: {}", path.display());
    }

    println!(
        "{} targets: {} reachable, {} unreachable",
        report.summary.total,
        report.summary.succeeded,
        report.summary.failures()
    );
    Ok(exit_code(&report))
}

/// Stream outcomes to the report as they complete, then fall back to one
/// full write if any row went missing.
async fn run_streaming(
    dispatcher: &Dispatcher,
    writer: &ReportWriter,
    targets: Vec<Target>,
) -> Result<RunReport> {
    let mut events = dispatcher.subscribe();
    let stream_writer = writer.clone();
    let appender = tokio::spawn(async move {
        let mut written = 0usize;
        loop {
            match events.recv().await {
                Ok(RunEvent::TaskCompleted { outcome }) => {
                    match stream_writer.append(std::slice::from_ref(&outcome)).await {
                        Ok(()) => written += 1,
                        Err(e) => warn!(error = %e, "streaming append failed"),
                    }
                }
                Ok(RunEvent::RunCompleted { .. })
                | Err(broadcast::error::RecvError::Closed) => break,
                Ok(RunEvent::TaskStarted { .. }) => {}
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "event stream lagged, rows were not appended");
                }
            }
        }
        written
    });

    let report = dispatcher.run(targets).await?;

    let written = appender.await.unwrap_or(0);
    if written != report.outcomes.len() {
        warn!(
            written,
            total = report.outcomes.len(),
            "streamed report incomplete, rewriting in full"
        );
        writer.write(&report).await?;
    }
    Ok(report)
}

async fn collect_targets(args: &TargetArgs) -> Result<Vec<Target>> {
    let mut targets = match &args.file {
        Some(path) if path.as_os_str() == "-" => {
            let mut text = String::new();
            tokio::io::stdin().read_to_string(&mut text).await?;
            parse_targets(&text)
        }
        Some(path) => targets_from_file(path).await?,
        None => Vec::new(),
    };

    let mut seen: HashSet<String> = targets.iter().map(|t| t.host.clone()).collect();
    for host in &args.inline {
        let host = host.trim();
        if !host.is_empty() && seen.insert(host.to_string()) {
            targets.push(Target::new(host));
        }
    }

    if targets.is_empty() {
        eyre::bail!("no targets given; pass them inline or via --targets FILE");
    }
    Ok(targets)
}

fn run_config_for(args: &RunArgs, file: &FileConfig) -> RunConfig {
    let defaults = RunConfig::default();
    RunConfig {
        max_concurrent: args
            .max_concurrent
            .or(file.run.max_concurrent)
            .unwrap_or(defaults.max_concurrent),
        probe_timeout: args
            .probe_timeout
            .or(file.run.probe_timeout)
            .map_or(defaults.probe_timeout, Duration::from_secs),
        per_task_timeout: args
            .task_timeout
            .or(file.run.task_timeout)
            .map_or(defaults.per_task_timeout, Duration::from_secs),
        overall_timeout: args
            .run_timeout
            .or(file.run.run_timeout)
            .map(Duration::from_secs),
        retry_attempts: args
            .retry_attempts
            .or(file.report.retry_attempts)
            .unwrap_or(defaults.retry_attempts),
        retry_delay: args
            .retry_delay
            .or(file.report.retry_delay)
            .map_or(defaults.retry_delay, Duration::from_secs),
    }
}

fn report_format(flag: Option<FormatArg>, file: &FileConfig) -> Result<ReportFormat> {
    if let Some(format) = flag {
        return Ok(format.into());
    }
    match file.report.format.as_deref() {
        None | Some("csv") => Ok(ReportFormat::Csv),
        Some("jsonl") => Ok(ReportFormat::JsonLines),
        Some(other) => eyre::bail!("unknown report format {other:?}, expected csv or jsonl"),
    }
}

fn default_report_path(format: ReportFormat) -> PathBuf {
    let ext = match format {
        ReportFormat::Csv => "csv",
        ReportFormat::JsonLines => "jsonl",
    };
    let stamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
    PathBuf::from(format!("muster-report-{stamp}.{ext}"))
}

fn print_summary(report: &RunReport, path: &Path) {
    let summary = &report.summary;
    let elapsed = report.finished_at - report.started_at;
    let secs = elapsed.num_milliseconds() as f64 / 1000.0;
    println!(
        "{} targets: {} succeeded, {} failed, {} unreachable, {} timed out, {} panicked in {secs:.1}s",
        summary.total,
        summary.succeeded,
        summary.failed,
        summary.unreachable,
        summary.timed_out,
        summary.panicked,
    );
    if report.degraded {
        println!("run degraded: outcome or slot accounting failed, see logs");
    }
    println!("report: {}", path.display());
}

fn exit_code(report: &RunReport) -> u8 {
    if report.degraded {
        2
    } else if report.has_failures() {
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use muster_core::{Outcome, RunSummary, TaskStatus};

    fn report_with(status: TaskStatus, degraded: bool) -> RunReport {
        let now = Utc::now();
        let outcomes = vec![Outcome {
            target: "a".to_string(),
            action: "test".to_string(),
            status,
            message: String::new(),
            started_at: now,
            finished_at: now,
        }];
        let summary = RunSummary::tally(&outcomes);
        RunReport {
            outcomes,
            summary,
            started_at: now,
            finished_at: now,
            degraded,
        }
    }

    #[test]
    fn run_args_parse() {
        let cli = Cli::parse_from([
            "muster",
            "run",
            "web1",
            "web2",
            "--command",
            "echo {target}",
            "--max-concurrent",
            "4",
            "--param",
            "channel=stable",
            "--stream",
        ]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run subcommand");
        };
        assert_eq!(args.targets.inline, vec!["web1", "web2"]);
        assert_eq!(args.command.as_deref(), Some("echo {target}"));
        assert_eq!(args.max_concurrent, Some(4));
        assert_eq!(args.params, vec!["channel=stable"]);
        assert!(args.stream);
    }

    #[test]
    fn command_and_ssh_conflict() {
        let result = Cli::try_parse_from([
            "muster", "run", "web1", "--command", "true", "--ssh", "uptime",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn flags_override_file_config() {
        let cli = Cli::parse_from([
            "muster",
            "run",
            "web1",
            "--command",
            "true",
            "--task-timeout",
            "30",
        ]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run subcommand");
        };
        let file = FileConfig {
            run: config::RunSection {
                max_concurrent: Some(10),
                task_timeout: Some(120),
                ..config::RunSection::default()
            },
            ..FileConfig::default()
        };

        let run_config = run_config_for(&args, &file);
        assert_eq!(run_config.max_concurrent, 10, "file fills the gap");
        assert_eq!(
            run_config.per_task_timeout,
            Duration::from_secs(30),
            "flag wins over file"
        );
        assert_eq!(run_config.retry_attempts, 5, "defaults fill the rest");
    }

    #[test]
    fn exit_codes_follow_the_report() {
        assert_eq!(exit_code(&report_with(TaskStatus::Succeeded, false)), 0);
        assert_eq!(exit_code(&report_with(TaskStatus::Failed, false)), 1);
        assert_eq!(exit_code(&report_with(TaskStatus::Unreachable, false)), 1);
        assert_eq!(exit_code(&report_with(TaskStatus::Succeeded, true)), 2);
    }

    #[test]
    fn unknown_report_format_is_rejected() {
        let file = FileConfig {
            report: config::ReportSection {
                format: Some("xml".to_string()),
                ..config::ReportSection::default()
            },
            ..FileConfig::default()
        };
        assert!(report_format(None, &file).is_err());
        assert_eq!(
            report_format(Some(FormatArg::Jsonl), &file).unwrap(),
            ReportFormat::JsonLines,
            "explicit flag bypasses the file value"
        );
    }

    #[test]
    fn default_report_path_carries_the_extension() {
        let path = default_report_path(ReportFormat::JsonLines);
        assert_eq!(path.extension().unwrap(), "jsonl");
        assert!(path.to_string_lossy().starts_with("muster-report-"));
    }

    #[tokio::test]
    async fn inline_targets_are_deduplicated() {
        let args = TargetArgs {
            inline: vec![
                "web1".to_string(),
                "web2".to_string(),
                "web1".to_string(),
                "  ".to_string(),
            ],
            file: None,
        };
        let targets = collect_targets(&args).await.unwrap();
        let hosts: Vec<&str> = targets.iter().map(|t| t.host.as_str()).collect();
        assert_eq!(hosts, vec!["web1", "web2"]);
    }

    #[tokio::test]
    async fn no_targets_is_an_error() {
        let args = TargetArgs {
            inline: vec![],
            file: None,
        };
        assert!(collect_targets(&args).await.is_err());
    }
}
