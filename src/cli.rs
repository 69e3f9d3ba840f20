//! CLI definition and dispatch.

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};

use crate::adapters::csv_adapter::CsvTradeAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::file_log_adapter::FileLogAdapter;
use crate::adapters::markdown_report_adapter::MarkdownReportAdapter;
use crate::domain::config_validation::analysis_config_from;
use crate::domain::correlation::{MAX_SIGNAL_LOOKBACK_SECS, PairingMode};
use crate::domain::decoder;
use crate::domain::error::TradelogError;
use crate::domain::event::EventKind;
use crate::domain::extractor;
use crate::domain::pipeline::{self, Analysis, AnalysisConfig};
use crate::ports::config_port::ConfigPort;
use crate::ports::log_port::LogPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "tradelog", about = "Strategy tester log analyzer")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Reconstruct trades from a log and report performance
    Analyze {
        log: PathBuf,
        #[command(flatten)]
        analysis: AnalysisArgs,
        /// Markdown report path
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Per-trade CSV path
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Print the classified events of a log
    Events {
        log: PathBuf,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Analyze several independent logs in parallel
    Batch {
        #[arg(required = true)]
        logs: Vec<PathBuf>,
        #[command(flatten)]
        analysis: AnalysisArgs,
    },
}

/// Analysis settings shared by `analyze` and `batch`. Flags override the
/// `[analysis]` section of the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct AnalysisArgs {
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Starting balance (otherwise taken from the log)
    #[arg(long)]
    pub balance: Option<f64>,
    /// Maximum age of a signal attributed to a trade
    #[arg(long)]
    pub lookback_secs: Option<i64>,
    /// fifo or ticket
    #[arg(long)]
    pub pairing: Option<PairingMode>,
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Analyze {
            log,
            analysis,
            output,
            csv,
        } => run_analyze(&log, &analysis, output.as_deref(), csv.as_deref()),
        Command::Events { log, limit } => run_events(&log, limit),
        Command::Batch { logs, analysis } => run_batch(&logs, &analysis),
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|err| {
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

/// Merges config file values with command-line overrides.
pub fn build_analysis_config(
    config: Option<&dyn ConfigPort>,
    args: &AnalysisArgs,
) -> Result<AnalysisConfig, TradelogError> {
    let mut analysis = match config {
        Some(config) => analysis_config_from(config)?,
        None => AnalysisConfig::default(),
    };

    if let Some(balance) = args.balance {
        if !balance.is_finite() || balance < 0.0 {
            return Err(TradelogError::invalid(
                "cli",
                "balance",
                "balance must be non-negative",
            ));
        }
        analysis.starting_balance = Some(balance);
    }
    if let Some(lookback) = args.lookback_secs {
        if !(0..=MAX_SIGNAL_LOOKBACK_SECS).contains(&lookback) {
            return Err(TradelogError::invalid(
                "cli",
                "lookback-secs",
                format!("lookback must be between 0 and {MAX_SIGNAL_LOOKBACK_SECS}"),
            ));
        }
        analysis.signal_lookback_secs = lookback;
    }
    if let Some(pairing) = args.pairing {
        analysis.pairing = pairing;
    }
    Ok(analysis)
}

pub fn analyze_file(
    log_port: &dyn LogPort,
    path: &Path,
    config: &AnalysisConfig,
) -> Result<Analysis, TradelogError> {
    let bytes = log_port.read_log(path)?;
    info!(path = %path.display(), bytes = bytes.len(), "read log");
    Ok(pipeline::analyze_bytes(&bytes, config))
}

/// Loads the optional config file and resolves the analysis settings.
fn resolve_settings(
    args: &AnalysisArgs,
) -> Result<(Option<FileConfigAdapter>, AnalysisConfig), ExitCode> {
    let adapter = match &args.config {
        Some(path) => {
            eprintln!("Loading config from {}", path.display());
            Some(load_config(path)?)
        }
        None => None,
    };
    let config = build_analysis_config(adapter.as_ref().map(|a| a as &dyn ConfigPort), args)
        .map_err(|e| {
            eprintln!("error: {e}");
            ExitCode::from(&e)
        })?;
    Ok((adapter, config))
}

fn run_analyze(
    log_path: &Path,
    args: &AnalysisArgs,
    output_path: Option<&Path>,
    csv_path: Option<&Path>,
) -> ExitCode {
    // Stage 1: settings
    let (adapter, config) = match resolve_settings(args) {
        Ok(settings) => settings,
        Err(code) => return code,
    };

    // Stage 2: read and analyze
    eprintln!("Analyzing {}", log_path.display());
    let analysis = match analyze_file(&FileLogAdapter, log_path, &config) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    // Stage 3: console summary
    print_summary(log_path, &analysis, config.risk_warn_pct);

    // Stage 4: reports
    let from_config = |key: &str| adapter.as_ref().and_then(|a| a.get_path("report", key));
    let markdown = output_path.map(Path::to_path_buf).or_else(|| from_config("markdown"));
    let csv = csv_path.map(Path::to_path_buf).or_else(|| from_config("csv"));

    let markdown_adapter = MarkdownReportAdapter::new(config.risk_warn_pct);
    let reports: [(Option<PathBuf>, &dyn ReportPort); 2] =
        [(markdown, &markdown_adapter), (csv, &CsvTradeAdapter)];
    for (path, reporter) in reports {
        let Some(path) = path else { continue };
        if let Err(e) = reporter.write(&analysis, log_path, &path) {
            eprintln!("error: {e}");
            return (&e).into();
        }
        eprintln!("Report written to: {}", path.display());
    }

    ExitCode::SUCCESS
}

fn run_events(log_path: &Path, limit: Option<usize>) -> ExitCode {
    let bytes = match FileLogAdapter.read_log(log_path) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    let decoded = decoder::decode(&bytes);
    let extraction = extractor::extract_events(&decoded.lines);

    let shown = limit.unwrap_or(usize::MAX);
    for event in extraction.events.iter().take(shown) {
        println!("{event}");
    }

    let stats = &extraction.stats;
    eprintln!();
    eprintln!("Encoding:         {}", decoded.encoding);
    eprintln!("Lines:            {}", stats.lines_total);
    eprintln!(
        "Dropped:          {} ({} with unparsable numbers)",
        stats.lines_dropped, stats.lines_malformed
    );
    for kind in EventKind::ALL {
        eprintln!("  {:<18}{}", kind.as_str(), stats.count(kind));
    }
    ExitCode::SUCCESS
}

fn run_batch(logs: &[PathBuf], args: &AnalysisArgs) -> ExitCode {
    let (_adapter, config) = match resolve_settings(args) {
        Ok(settings) => settings,
        Err(code) => return code,
    };

    eprintln!("Analyzing {} logs", logs.len());
    let results = analyze_many(&FileLogAdapter, logs, &config);

    let mut exit = ExitCode::SUCCESS;
    println!(
        "{:<32} {:>7} {:>8} {:>12} {:>12} {:>8}",
        "log", "trades", "win %", "net", "max dd", "dropped"
    );
    for (path, result) in logs.iter().zip(&results) {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        match result {
            Ok(analysis) => {
                let s = &analysis.summary;
                println!(
                    "{:<32} {:>7} {:>7.1}% {:>+12.2} {:>12.2} {:>8}",
                    name,
                    s.total_trades,
                    s.win_rate,
                    s.net_profit,
                    s.max_drawdown_abs,
                    analysis.diagnostics.lines_dropped
                );
            }
            Err(e) => {
                error!(log = %path.display(), "{e}");
                println!("{:<32} error: {}", name, e);
                exit = ExitCode::from(e);
            }
        }
    }
    exit
}

/// Runs each log on its own scoped thread. Results keep the input order.
pub fn analyze_many<L: LogPort + Sync>(
    log_port: &L,
    logs: &[PathBuf],
    config: &AnalysisConfig,
) -> Vec<Result<Analysis, TradelogError>> {
    std::thread::scope(|scope| {
        let handles: Vec<_> = logs
            .iter()
            .map(|path| scope.spawn(move || analyze_file(log_port, path, config)))
            .collect();
        handles
            .into_iter()
            .zip(logs)
            .map(|(handle, path)| {
                handle.join().unwrap_or_else(|_| {
                    Err(TradelogError::Io(std::io::Error::other(format!(
                        "analysis of {} panicked",
                        path.display()
                    ))))
                })
            })
            .collect()
    })
}

fn print_summary(log_path: &Path, analysis: &Analysis, risk_warn_pct: f64) {
    let s = &analysis.summary;
    let d = &analysis.diagnostics;

    println!("=== {} ===", log_path.display());
    println!(
        "Starting Balance: {:.2} ({})",
        s.starting_balance, analysis.balance_source
    );
    println!("Final Balance:    {:.2}", s.final_balance);
    println!("Net Profit:       {:+.2}", s.net_profit);
    println!(
        "Trades:           {} ({} wins, {} losses, {} breakeven)",
        s.total_trades, s.wins, s.losses, s.breakevens
    );
    println!("Win Rate:         {:.1}%", s.win_rate);
    if s.profit_factor.is_infinite() {
        println!("Profit Factor:    inf");
    } else {
        println!("Profit Factor:    {:.2}", s.profit_factor);
    }
    println!("Expectancy:       {:+.2}", s.expectancy);
    if let Some(rr) = s.risk_reward {
        println!("Risk/Reward:      {:.2}", rr);
    }
    if let Some(kelly) = s.kelly_fraction {
        println!("Kelly:            {:.1}%", kelly * 100.0);
    }
    println!(
        "Max Drawdown:     {:.2} ({:.2}%)",
        s.max_drawdown_abs, s.max_drawdown_pct
    );
    println!(
        "Streaks:          {} wins, {} losses, {} stop losses",
        s.max_consecutive_wins, s.max_consecutive_losses, s.max_consecutive_stop_losses
    );

    if let Some(best) = s
        .by_confluence
        .iter()
        .filter(|b| b.count > 0)
        .max_by(|a, b| a.win_rate.total_cmp(&b.win_rate))
    {
        println!(
            "Best Confluence:  {} ({:.1}% over {} trades)",
            best.key, best.win_rate, best.count
        );
    }

    println!(
        "Diagnostics:      {} lines, {} dropped, {} unmatched opens, {} unmatched closes",
        d.lines_total, d.lines_dropped, d.unmatched_opens, d.unmatched_closes
    );
    if d.ordering_anomalies > 0 {
        println!(
            "                  {} pairings close before they open",
            d.ordering_anomalies
        );
    }
    if d.oversized_losses > 0 {
        println!(
            "                  {} losses exceed {:.1}% of balance",
            d.oversized_losses, risk_warn_pct
        );
    }
}
