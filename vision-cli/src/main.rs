//! Vision CLI
//!
//! Checks and lists Vision acceptance-test scripts without a browser.
//!
//! Usage from workspace root:
//!   cargo run --bin vision -- check login.vision checkout.vision
//!   cargo run --bin vision -- check --json tests/*.vision
//!   cargo run --bin vision -- show login.vision
//!   cargo run --bin vision -- config --maximum-time 30s

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, Level};
use tracing_subscriber::EnvFilter;
use vision::duration::parse_duration;
use vision::{FsScriptStore, InterpreterConfig, ScriptBuffer, ScriptStore};

#[derive(Parser)]
#[command(name = "vision")]
#[command(about = "Vision - English-like acceptance tests for web pages")]
#[command(
    long_about = "Vision CLI validates and lists test scripts written in the Vision command language."
)]
struct Cli {
    #[command(flatten)]
    settings: SettingsArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Default)]
struct SettingsArgs {
    /// JSON file with interpreter settings; flags override it
    #[arg(long, global = true, env = "VISION_CONFIG")]
    config: Option<PathBuf>,

    /// How long to keep looking for an element, e.g. "15s" or "500ms"
    #[arg(long, global = true)]
    maximum_time: Option<String>,

    /// Commands slower than this are reported as slow
    #[arg(long, global = true)]
    acceptable_time: Option<String>,

    /// Where file literals live
    #[arg(long, global = true)]
    upload_directory: Option<String>,

    /// Directory scripts are read from and saved to
    #[arg(long, global = true, visible_alias = "test-directory")]
    root_test_directory: Option<String>,

    /// Start in Finish mode: no pauses and no prompts
    #[arg(long, global = true)]
    batch: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse scripts and report every line that does not parse or nest
    Check {
        #[arg(required = true)]
        files: Vec<String>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the parsed commands of a script with their line and depth
    Show {
        file: String,
        /// Print the commands as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the effective settings as JSON
    Config,
}

#[derive(Debug, Serialize)]
struct LineProblem {
    line: usize,
    text: String,
    error: String,
}

#[derive(Debug, Serialize)]
struct FileReport {
    file: String,
    commands: usize,
    problems: Vec<LineProblem>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;
    let cli = Cli::parse();
    let config = build_config(&cli.settings)?;
    debug!("Effective settings: {config:?}");
    let store = Arc::new(FsScriptStore::new(
        &config.test_dir,
        PathBuf::from(&config.test_dir).join(&config.upload_dir),
    ));

    match cli.command {
        Commands::Check { files, json } => {
            let reports = check_files(store.as_ref(), &files).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&reports)?);
            } else {
                for report in &reports {
                    print!("{}", render_report(report));
                }
            }
            let failed = reports.iter().filter(|r| !r.problems.is_empty()).count();
            if failed > 0 {
                bail!("{failed} of {} file(s) have errors", reports.len());
            }
            info!("{} file(s) checked", reports.len());
        }
        Commands::Show { file, json } => {
            let buffer = load(store.as_ref(), &file).await?;
            if json {
                let commands: Vec<_> = buffer
                    .entries()
                    .iter()
                    .filter_map(|e| e.parsed.as_ref().ok())
                    .collect();
                println!("{}", serde_json::to_string_pretty(&commands)?);
            } else {
                for line in show_lines(&buffer) {
                    println!("{line}");
                }
            }
        }
        Commands::Config => println!("{}", serde_json::to_string_pretty(&config)?),
    }
    Ok(())
}

pub fn init_logging() -> Result<()> {
    let log_level = env::var("LOG_LEVEL")
        .map(|level| match level.to_lowercase().as_str() {
            "error" => Level::ERROR,
            "warn" => Level::WARN,
            "info" => Level::INFO,
            "debug" => Level::DEBUG,
            "trace" => Level::TRACE,
            _ => Level::INFO,
        })
        .unwrap_or(Level::INFO);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    Ok(())
}

/// Settings from `--config`, then overridden by individual flags.
fn build_config(args: &SettingsArgs) -> Result<InterpreterConfig> {
    let mut config = match &args.config {
        Some(path) => InterpreterConfig::from_file(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => InterpreterConfig::default(),
    };
    if let Some(time) = &args.maximum_time {
        config.default_within_ms = millis(time).context("Invalid --maximum-time")?;
    }
    if let Some(time) = &args.acceptable_time {
        config.acceptable_wait_ms = millis(time).context("Invalid --acceptable-time")?;
    }
    if let Some(dir) = &args.upload_directory {
        config.upload_dir = dir.clone();
    }
    if let Some(dir) = &args.root_test_directory {
        config.test_dir = dir.clone();
    }
    if args.batch {
        config.interactive = false;
    }
    Ok(config)
}

fn millis(time: &str) -> Result<u64> {
    Ok(parse_duration(time)?.as_millis() as u64)
}

async fn load(store: &dyn ScriptStore, file: &str) -> Result<ScriptBuffer> {
    let source = store
        .read_script(file)
        .await
        .with_context(|| format!("Failed to read {file}"))?;
    Ok(ScriptBuffer::from_source(file, &source))
}

async fn check_files(store: &dyn ScriptStore, files: &[String]) -> Result<Vec<FileReport>> {
    let mut reports = Vec::with_capacity(files.len());
    for file in files {
        let buffer = load(store, file).await?;
        reports.push(report(&buffer));
    }
    Ok(reports)
}

fn report(buffer: &ScriptBuffer) -> FileReport {
    let problems = buffer
        .entries()
        .iter()
        .filter_map(|entry| {
            entry.parsed.as_ref().err().map(|e| LineProblem {
                line: entry.line,
                text: entry.text.clone(),
                error: e.to_string(),
            })
        })
        .collect();
    FileReport {
        file: buffer.name().to_string(),
        commands: buffer.entries().len(),
        problems,
    }
}

fn render_report(report: &FileReport) -> String {
    if report.problems.is_empty() {
        return format!("{}: ok ({} commands)\n", report.file, report.commands);
    }
    let mut text = format!(
        "{}: {} error(s) in {} commands\n",
        report.file,
        report.problems.len(),
        report.commands
    );
    for problem in &report.problems {
        text.push_str(&format!("  {}: {}\n", problem.text, problem.error));
    }
    text
}

fn show_lines(buffer: &ScriptBuffer) -> Vec<String> {
    let width = buffer
        .entries()
        .last()
        .map_or(1, |e| e.line.to_string().len());
    buffer
        .entries()
        .iter()
        .map(|entry| {
            let mark = if entry.parsed.is_ok() { ' ' } else { '!' };
            format!(
                "{mark}{:>width$} [{}] {}{}",
                entry.line,
                entry.depth(),
                "    ".repeat(entry.depth()),
                entry.text
            )
        })
        .collect()
}
