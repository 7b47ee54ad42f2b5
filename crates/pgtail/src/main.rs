//! pgtail - PostgreSQL instance discovery and live log viewer.
//!
//! `pgtail list` shows every instance found on this machine;
//! `pgtail tail` follows the server log of one of them.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::{Parser, Subcommand};
use crossbeam_channel::select;
use serde::Serialize;
use tracing::{Level, debug, info, warn};
use tracing_subscriber::EnvFilter;

use pgtail_core::discovery::normalize_path;
use pgtail_core::{
    DetectionResult, EntryGate, Filter, Instance, LogEntry, LogLevel, Tailer, TailerConfig,
};

/// PostgreSQL instance discovery and log tailing.
#[derive(Parser)]
#[command(name = "pgtail", about = "Find local PostgreSQL instances and tail their logs", version)]
struct Args {
    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List detected instances.
    List {
        /// Print instances as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Follow the log of one instance.
    Tail(TailArgs),
}

#[derive(clap::Args)]
struct TailArgs {
    /// Data directory of the instance to tail.
    #[arg(long, value_name = "PATH", conflicts_with = "index")]
    data_dir: Option<PathBuf>,

    /// Position of the instance in `pgtail list` output.
    #[arg(long)]
    index: Option<usize>,

    /// Show only these levels (comma-separated, e.g. "error,fatal").
    #[arg(long, value_delimiter = ',', conflicts_with = "min_level")]
    level: Vec<LogLevel>,

    /// Show this level and everything more severe.
    #[arg(long, value_name = "LEVEL")]
    min_level: Option<LogLevel>,

    /// Poll for changes instead of using native file notifications.
    #[arg(long)]
    poll: bool,

    /// Polling interval in milliseconds.
    #[arg(long, default_value = "500")]
    poll_interval_ms: u64,

    /// Print entries as JSON lines.
    #[arg(long)]
    json: bool,
}

/// Initializes the tracing subscriber. Diagnostics go to stderr so stdout
/// carries only log output.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("pgtail={level},pgtail_core={level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

#[derive(Serialize)]
struct ListOutput<'a> {
    instances: &'a [Instance],
    errors: Vec<String>,
    skipped_sources: &'a [String],
}

fn run_list(result: &DetectionResult, json: bool) -> io::Result<()> {
    let mut out = io::stdout().lock();

    if json {
        let output = ListOutput {
            instances: &result.instances,
            errors: result.errors.iter().map(|e| e.to_string()).collect(),
            skipped_sources: &result.skipped_sources,
        };
        serde_json::to_writer_pretty(&mut out, &output)?;
        writeln!(out)?;
        return Ok(());
    }

    if result.is_empty() {
        writeln!(out, "No PostgreSQL instances found.")?;
    }
    for (i, instance) in result.instances.iter().enumerate() {
        writeln!(out, "[{}] {}", i, instance.summary())?;
        writeln!(out, "    logs: {}", instance.log_dir.display())?;
    }
    report_problems(result);
    Ok(())
}

fn report_problems(result: &DetectionResult) {
    for e in &result.errors {
        eprintln!("warning: {}", e);
    }
    if !result.skipped_sources.is_empty() {
        eprintln!("skipped sources: {}", result.skipped_sources.join(", "));
    }
}

fn pick_instance<'a>(result: &'a DetectionResult, args: &TailArgs) -> Result<&'a Instance, String> {
    if let Some(ref data_dir) = args.data_dir {
        let wanted = normalize_path(data_dir);
        return result
            .instances
            .iter()
            .find(|i| normalize_path(&i.data_dir) == wanted)
            .ok_or_else(|| format!("no instance with data directory {}", data_dir.display()));
    }

    let index = args.index.unwrap_or(0);
    match result.instances.get(index) {
        Some(instance) => Ok(instance),
        None if result.is_empty() => Err("no PostgreSQL instances found".to_string()),
        None => Err(format!(
            "index {} out of range ({} instances found)",
            index,
            result.instances.len()
        )),
    }
}

fn build_filter(args: &TailArgs) -> Filter {
    let mut filter = Filter::new();
    if let Some(min) = args.min_level {
        filter.set_min_level(min);
    } else {
        filter.set(args.level.iter().copied());
    }
    filter
}

fn print_entry(out: &mut impl Write, entry: &LogEntry, json: bool) -> io::Result<()> {
    if json {
        serde_json::to_writer(&mut *out, entry)?;
        writeln!(out)
    } else {
        writeln!(out, "{}", entry.raw)
    }
}

fn run_tail(instance: &Instance, args: &TailArgs) -> Result<(), String> {
    let config = TailerConfig {
        poll_interval: Duration::from_millis(args.poll_interval_ms.max(1)),
        force_polling: args.poll,
        ..TailerConfig::default()
    };

    let mut tailer = Tailer::for_instance(instance, config);
    tailer.start().map_err(|e| e.to_string())?;
    info!(
        data_dir = %instance.data_dir.display(),
        mode = ?tailer.mode(),
        "tailing"
    );

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    let entries = tailer.entries();
    let errors = tailer.errors();
    let mut gate = EntryGate::new(build_filter(args));
    let mut out = io::stdout().lock();

    while running.load(Ordering::SeqCst) {
        select! {
            recv(entries) -> msg => match msg {
                Ok(entry) => {
                    if gate.admit(&entry) && print_entry(&mut out, &entry, args.json).is_err() {
                        // stdout closed (e.g. piped into head)
                        break;
                    }
                }
                Err(_) => break,
            },
            recv(errors) -> msg => {
                if let Ok(e) = msg {
                    warn!("{}", e);
                }
            },
            default(Duration::from_millis(200)) => {}
        }
    }

    debug!("shutting down");
    tailer.stop();
    let _ = out.flush();
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let result = pgtail_core::discovery::detect();

    match args.command {
        Command::List { json } => match run_list(&result, json) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("error: {}", e);
                ExitCode::FAILURE
            }
        },
        Command::Tail(ref tail_args) => {
            report_problems(&result);
            let outcome = pick_instance(&result, tail_args)
                .and_then(|instance| run_tail(instance, tail_args));
            match outcome {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("error: {}", e);
                    ExitCode::FAILURE
                }
            }
        }
    }
}
