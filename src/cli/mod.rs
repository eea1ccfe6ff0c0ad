use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::EffectiveConfig;
use crate::core::{CheckResult, CheckStatus};
use crate::engine::{BarProgress, CancelToken, ScanOptions, Scanner};
use crate::export::{self, ExportFormat};
use crate::probes::{self, ProbeContext};
use crate::scoring::ScanStats;
use crate::ui::UiConfig;

#[derive(Debug, Parser)]
#[command(
    name = "complianceguard",
    version,
    about = "Audit a macOS workstation against CIS security controls and report a compliance score"
)]
pub struct Cli {
    #[arg(long, global = true)]
    pub json: bool,
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,
    #[arg(long, global = true)]
    pub verbose: bool,
    #[arg(long, global = true)]
    pub quiet: bool,
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Upper bound in seconds for any single external command (default: scan.probe_timeout_secs).
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the selected checks and print grouped results with the score.
    Scan(ScanArgs),
    /// Run a single check and print its full result.
    Check(CheckArgs),
    /// List the registered checks.
    List,
    /// Run the checks and export a report.
    Report(ReportArgs),
    /// Interactive terminal dashboard.
    Ui(UiArgs),
    Completion(CompletionArgs),
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Probe key or control id; repeatable. Defaults to every check.
    #[arg(long = "probe")]
    pub probes: Vec<String>,
    #[arg(long)]
    pub parallel: bool,
    #[arg(long)]
    pub workers: Option<usize>,
    /// Exit with status 1 when any control fails.
    #[arg(long)]
    pub strict: bool,
}

#[derive(Debug, Args)]
pub struct CheckArgs {
    pub probe: String,
}

#[derive(Debug, Args)]
pub struct ReportArgs {
    #[arg(long = "probe")]
    pub probes: Vec<String>,
    #[arg(long, value_enum)]
    pub format: Option<ExportFormat>,
    /// Write to this file, or into this directory with a timestamped name.
    #[arg(long)]
    pub output: Option<PathBuf>,
    #[arg(long)]
    pub include_evidence: bool,
}

#[derive(Debug, Args)]
pub struct UiArgs {
    #[arg(long = "probe")]
    pub probes: Vec<String>,
}

#[derive(Debug, Args)]
pub struct CompletionArgs {
    pub shell: String,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[arg(long)]
    pub show: bool,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let stdin_is_tty = io::stdin().is_terminal();
    let stdout_is_tty = io::stdout().is_terminal();
    let stderr_is_tty = io::stderr().is_terminal();

    let home_dir = crate::platform::effective_home_dir()?;

    let env_config_path = std::env::var_os("COMPLIANCEGUARD_CONFIG").map(PathBuf::from);
    let cfg = crate::config::load(
        cli.config.as_deref().or(env_config_path.as_deref()),
        &home_dir,
    )
    .map_err(crate::exit::invalid_args_err)?;
    debug!(config_path = ?cfg.config_path, "configuration loaded");

    let color = stdout_is_tty && cfg.ui.color && !cli.no_color;

    let ui_cfg = UiConfig {
        color,
        stdin_is_tty,
        stdout_is_tty,
        stderr_is_tty,
        max_table_rows: cfg.ui.max_table_rows,
        quiet: cli.quiet,
        verbose: cli.verbose,
    };

    let timeout_secs = cli.timeout.unwrap_or(cfg.scan.probe_timeout_secs);
    if timeout_secs == 0 {
        return Err(crate::exit::invalid_args("--timeout must be at least 1 second"));
    }
    let timeout = Duration::from_secs(timeout_secs);
    let ctx = ProbeContext::from_config(&cfg, timeout);
    let show_progress = ui_cfg.stderr_is_tty && !cli.quiet && !cli.json;

    match cli.command {
        Commands::Scan(args) => {
            let keys = probe_keys(&args.probes, &cfg);
            let opts = ScanOptions {
                parallel: args.parallel || cfg.scan.parallel,
                workers: args.workers.unwrap_or(cfg.scan.workers),
            };
            let results = run_scan(&keys, &ctx, opts, show_progress)?;
            let failed = results
                .iter()
                .filter(|r| r.status == CheckStatus::Fail)
                .count();

            if cli.json {
                let report = crate::engine::build_report(
                    results,
                    cfg.scoring.not_applicable,
                    cfg.report.include_evidence,
                    timeout,
                );
                write_json(&report)?;
            } else {
                let stats = ScanStats::from_results(&results, cfg.scoring.not_applicable);
                crate::ui::print_scan(&results, &stats, &ui_cfg);
            }

            if args.strict && failed > 0 {
                return Err(crate::exit::non_compliant(failed));
            }
        }
        Commands::Check(args) => {
            let results = run_scan(
                std::slice::from_ref(&args.probe),
                &ctx,
                ScanOptions::default(),
                false,
            )?;
            let Some(result) = results.into_iter().next() else {
                return Err(anyhow::anyhow!("check produced no result: {}", args.probe));
            };
            if cli.json {
                write_json(&result)?;
            } else {
                crate::ui::print_result(&result, &ui_cfg);
            }
        }
        Commands::List => {
            let registered = probes::builtin(&ctx);
            if cli.json {
                let defs: Vec<_> = registered.iter().map(|p| p.definition()).collect();
                write_json(&defs)?;
            } else {
                let rows: Vec<(&str, &crate::core::ProbeDefinition)> = probes::KEYS
                    .iter()
                    .copied()
                    .zip(registered.iter().map(|p| p.definition()))
                    .collect();
                crate::ui::print_probe_list(&rows, &ui_cfg);
            }
        }
        Commands::Report(args) => {
            let format = match (args.format, cli.json) {
                (Some(format), _) => format,
                (None, true) => ExportFormat::Json,
                (None, false) => ExportFormat::Markdown,
            };
            let include_evidence = args.include_evidence || cfg.report.include_evidence;
            let keys = probe_keys(&args.probes, &cfg);
            let opts = ScanOptions {
                parallel: cfg.scan.parallel,
                workers: cfg.scan.workers,
            };
            let results = run_scan(&keys, &ctx, opts, show_progress)?;
            let report = crate::engine::build_report(
                results,
                cfg.scoring.not_applicable,
                include_evidence,
                timeout,
            );
            let content = export::render(&report, format, include_evidence)
                .map_err(crate::exit::export_failed_err)?;

            match args.output {
                Some(output) => {
                    let path = if output.is_dir() {
                        export::timestamped_path(
                            &output,
                            format,
                            time::OffsetDateTime::now_utc(),
                        )
                    } else {
                        output
                    };
                    export::write_file(&path, &content).map_err(crate::exit::export_failed_err)?;
                    if !ui_cfg.quiet {
                        eprintln!("Report written to {}", path.display());
                    }
                }
                None => write_stdout(content.as_bytes())?,
            }
        }
        Commands::Ui(args) => {
            if cli.json {
                return Err(crate::exit::invalid_args("ui cannot be combined with --json"));
            }
            if !(ui_cfg.stdin_is_tty && ui_cfg.stdout_is_tty) {
                return Err(crate::exit::invalid_args(
                    "ui requires a terminal (stdin and stdout)",
                ));
            }
            let keys = probe_keys(&args.probes, &cfg);
            // Resolve keys up front so a typo fails before the terminal is taken over.
            probes::select(&keys, &ctx)?;
            crate::tui::run(crate::tui::DashboardSettings {
                probe_keys: keys,
                ctx,
                scan: ScanOptions {
                    parallel: cfg.scan.parallel,
                    workers: cfg.scan.workers,
                },
                policy: cfg.scoring.not_applicable,
                export_dir: std::env::current_dir()?,
                color: ui_cfg.color,
            })?;
        }
        Commands::Completion(args) => {
            let shell = parse_shell(&args.shell)?;
            let mut cmd = Cli::command();
            let mut out = io::stdout().lock();
            clap_complete::generate(shell, &mut cmd, "complianceguard", &mut out);
        }
        Commands::Config(args) => {
            if args.show {
                if cli.json {
                    write_json(&cfg)?;
                } else {
                    write_stdout(render_config_toml(&cfg)?.as_bytes())?;
                }
            } else if !ui_cfg.quiet {
                eprintln!("config: use `complianceguard config --show`");
            }
        }
    }

    Ok(())
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match (verbose, quiet) {
            (true, _) => "debug",
            (false, true) => "error",
            (false, false) => "warn",
        })
    });

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .with(filter)
        .try_init();
}

/// Command-line selection wins over `scan.probes`.
fn probe_keys(cli_keys: &[String], cfg: &EffectiveConfig) -> Vec<String> {
    if cli_keys.is_empty() {
        cfg.scan.probes.clone()
    } else {
        cli_keys.to_vec()
    }
}

fn run_scan(
    keys: &[String],
    ctx: &ProbeContext,
    opts: ScanOptions,
    show_progress: bool,
) -> Result<Vec<CheckResult>> {
    let selected = probes::select(keys, ctx)?;
    let scanner = Scanner::new(selected, opts)?;
    let progress = BarProgress::new(scanner.len(), show_progress);
    let results = scanner.run(&progress, &CancelToken::new());
    progress.finish();
    Ok(results)
}

fn render_config_toml(cfg: &EffectiveConfig) -> Result<String> {
    let mut s = toml::to_string_pretty(cfg)?;
    if !s.ends_with('\n') {
        s.push('\n');
    }
    Ok(s)
}

fn write_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    let mut buf = serde_json::to_vec_pretty(value)?;
    buf.push(b'\n');
    write_stdout(&buf)
}

fn write_stdout(buf: &[u8]) -> Result<()> {
    let mut stdout = io::stdout().lock();
    match stdout.write_all(buf).and_then(|()| stdout.flush()) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn parse_shell(s: &str) -> Result<clap_complete::Shell> {
    let s = s.trim().to_ascii_lowercase();
    match s.as_str() {
        "bash" => Ok(clap_complete::Shell::Bash),
        "zsh" => Ok(clap_complete::Shell::Zsh),
        "fish" => Ok(clap_complete::Shell::Fish),
        other => Err(crate::exit::invalid_args(format!(
            "unsupported shell: {other} (expected bash|zsh|fish)"
        ))),
    }
}
