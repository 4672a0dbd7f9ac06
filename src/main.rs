// LogDeck - main.rs
//
// Command-line front-end. Handles:
// 1. CLI argument parsing
// 2. Config loading and logging initialisation (debug mode support)
// 3. Settings store selection
// 4. Dispatching one engine operation and printing its result as JSON

use clap::{Args, Parser, Subcommand};
use logdeck::app::engine::LogEngine;
use logdeck::app::scan::ScanProgress;
use logdeck::core::model::{LogKind, ScanMode, StreamEvent, StreamStatus};
use logdeck::core::source::SourceType;
use logdeck::platform::config::{self, EngineConfig, PlatformPaths};
use logdeck::platform::settings::{JsonFileSettingsStore, SettingsStore};
use logdeck::util::{self, error::EngineError};
use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// LogDeck - log source discovery and live tail engine.
///
/// Discovers and classifies log files for a source, resolves the regex used
/// to parse each file, and follows files live. Results are printed as JSON.
#[derive(Parser, Debug)]
#[command(name = "logdeck", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file (defaults to the platform config directory).
    #[arg(short = 'c', long = "config", global = true)]
    config: Option<PathBuf>,

    /// Directory of the per-source JSON settings store.
    #[arg(short = 's', long = "settings-dir", global = true)]
    settings_dir: Option<PathBuf>,

    /// Root of the host filesystem to inspect (e.g. a mounted container root).
    #[arg(long = "host-root", global = true)]
    host_root: Option<PathBuf>,

    /// Enable debug logging (equivalent to RUST_LOG=debug).
    #[arg(short = 'd', long = "debug", global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the well-known files of a source.
    Defaults {
        #[arg(value_parser = parse_source)]
        source: SourceType,
    },

    /// Detect logging services, rotation setup and host log files.
    Detect,

    /// Scan and classify a source's log files.
    Files {
        #[arg(value_parser = parse_source)]
        source: SourceType,

        /// Scan this directory instead of the configured base path.
        #[arg(short = 'b', long = "base")]
        base: Option<PathBuf>,

        /// Deep scan that samples each file's header.
        #[arg(long = "full")]
        full: bool,
    },

    /// Inspect or change regex overrides.
    Regex {
        #[command(subcommand)]
        action: RegexAction,
    },

    /// Propose a regex for a sample log line (reads stdin when omitted).
    Suggest { line: Option<String> },

    /// Follow a log file and print each event as one JSON line.
    Tail {
        #[arg(value_parser = parse_source)]
        source: SourceType,
        path: PathBuf,

        /// Stop after this many seconds (follow until the session ends when
        /// omitted).
        #[arg(long = "for")]
        duration_secs: Option<u64>,
    },
}

#[derive(Subcommand, Debug)]
enum RegexAction {
    /// Show the effective regex for a file.
    Get(RegexTarget),

    /// Save an override for a file.
    Set {
        #[command(flatten)]
        target: RegexTarget,
        regex: String,

        /// Log type stored with the override.
        #[arg(short = 't', long = "type", default_value = "custom")]
        log_type: LogKind,
    },

    /// Remove a file's override.
    Delete(RegexTarget),

    /// List every override of every source.
    List,
}

#[derive(Args, Debug)]
struct RegexTarget {
    #[arg(value_parser = parse_source)]
    source: SourceType,
    path: PathBuf,
}

fn parse_source(s: &str) -> Result<SourceType, String> {
    s.parse::<SourceType>().map_err(|e| {
        let ids: Vec<&str> = SourceType::all().iter().map(|t| t.id()).collect();
        format!("{e} (expected one of: {})", ids.join(", "))
    })
}

fn main() {
    let cli = Cli::parse();

    let platform_paths = PlatformPaths::resolve();
    let (mut engine_config, config_warnings) = match &cli.config {
        Some(path) => match config::load_config_strict(path) {
            Ok(loaded) => loaded,
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(2);
            }
        },
        None => config::load_config(&platform_paths.config_file()),
    };

    util::logging::init(cli.debug, engine_config.log_level.as_deref());
    for warning in &config_warnings {
        tracing::warn!(warning = %warning, "Config warning");
    }

    if let Some(root) = &cli.host_root {
        engine_config.host_root = root.clone();
    }

    tracing::info!(
        version = util::constants::APP_VERSION,
        debug = cli.debug,
        host_root = %engine_config.host_root.display(),
        "LogDeck starting"
    );

    if let Err(e) = run(cli, engine_config, &platform_paths) {
        tracing::error!(error = %e, kind = ?e.kind(), "Command failed");
        let body = serde_json::json!({ "error": e.to_string(), "kind": e.kind() });
        eprintln!("{body}");
        std::process::exit(1);
    }
}

fn run(cli: Cli, config: EngineConfig, paths: &PlatformPaths) -> Result<(), EngineError> {
    let settings_dir = cli
        .settings_dir
        .clone()
        .or_else(|| config.settings_dir.clone())
        .unwrap_or_else(|| paths.default_settings_dir());
    tracing::debug!(dir = %settings_dir.display(), "Using settings store");
    let settings: Arc<dyn SettingsStore> = Arc::new(JsonFileSettingsStore::new(settings_dir));
    let engine = LogEngine::new(config, settings)?;

    match cli.command {
        Command::Defaults { source } => print_json(&engine.list_default_files(source)?),
        Command::Detect => print_json(&engine.detect_logging_services(None)?),
        Command::Files { source, base, full } => {
            if full {
                full_scan(&engine, source, base.as_deref())
            } else {
                print_json(&engine.detected_files(source, base.as_deref(), ScanMode::Quick)?)
            }
        }
        Command::Regex { action } => match action {
            RegexAction::Get(t) => print_json(&engine.regex_config(t.source, &t.path)?),
            RegexAction::Set {
                target,
                regex,
                log_type,
            } => print_json(&engine.put_regex_config(
                target.source,
                &target.path,
                &regex,
                log_type,
            )?),
            RegexAction::Delete(t) => print_json(&engine.delete_regex_config(t.source, &t.path)?),
            RegexAction::List => print_json(&engine.list_custom_regexes()),
        },
        Command::Suggest { line } => {
            let sample = match line {
                Some(l) => l,
                None => read_stdin_line(),
            };
            print_json(&engine.generate_regex(&sample))
        }
        Command::Tail {
            source,
            path,
            duration_secs,
        } => tail(&engine, source, &path, duration_secs.map(Duration::from_secs)),
    }
}

/// Run a background full scan, logging progress, and print the result.
fn full_scan(
    engine: &LogEngine,
    source: SourceType,
    base: Option<&Path>,
) -> Result<(), EngineError> {
    let manager = engine.start_full_scan(source, base)?;
    loop {
        for msg in manager.poll_progress() {
            match msg {
                ScanProgress::Started { source, base } => {
                    tracing::info!(source = %source, base = %base.display(), "Full scan running");
                }
                ScanProgress::Completed {
                    files,
                    warnings,
                    truncated,
                } => {
                    return print_json(&serde_json::json!({
                        "mode": ScanMode::Full,
                        "files": files,
                        "warnings": warnings,
                        "truncated": truncated,
                    }));
                }
                ScanProgress::Failed { error } => {
                    eprintln!("{}", serde_json::json!({ "error": error }));
                    std::process::exit(1);
                }
                ScanProgress::Cancelled => return Ok(()),
            }
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}

fn tail(
    engine: &LogEngine,
    source: SourceType,
    path: &Path,
    limit: Option<Duration>,
) -> Result<(), EngineError> {
    let subscription = engine.open_stream(source, path)?;
    tracing::info!(session = %subscription.id(), path = %path.display(), "Tailing");

    let started = Instant::now();
    let tick = Duration::from_millis(200);
    loop {
        if limit.is_some_and(|l| started.elapsed() >= l) {
            break;
        }
        match subscription.events().recv_timeout(tick) {
            Ok(event) => {
                let closed = matches!(event, StreamEvent::Status(StreamStatus::Closed));
                match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(e) => tracing::warn!(error = %e, "Cannot serialise stream event"),
                }
                if closed {
                    break;
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
    }

    engine.close_stream(subscription.id());
    engine.shutdown();
    Ok(())
}

fn read_stdin_line() -> String {
    let mut input = String::new();
    if let Err(e) = std::io::stdin().read_to_string(&mut input) {
        tracing::warn!(error = %e, "Cannot read sample from stdin");
    }
    input.lines().next().unwrap_or("").to_string()
}

fn print_json<T: Serialize>(value: &T) -> Result<(), EngineError> {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => {
            tracing::error!(error = %e, "Cannot serialise result");
            std::process::exit(1);
        }
    }
    Ok(())
}
