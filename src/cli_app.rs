//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use telemetry_hub::core::config::{Config, LoggingConfig, StorageBackend};
use telemetry_hub::core::errors::ThError;
use telemetry_hub::parser::log_parser::{DiagnosticKind, LogParser, SensorLogResult};
use telemetry_hub::server::{self, AppState};
use telemetry_hub::store::open_store;

/// Telemetry Hub: sensor log dashboard and JSON ingestion service.
#[derive(Debug, Parser)]
#[command(
    name = "telemetry-hub",
    author,
    version,
    about = "Telemetry Hub - sensor log parsing and ingestion service",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Increase verbosity.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Quiet mode (errors only).
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Run the HTTP ingestion service and dashboard.
    Serve(ServeArgs),
    /// Parse one sensor log file and print its records.
    Parse(ParseArgs),
    /// Inspect configuration.
    Config(ConfigArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args, Default)]
struct ServeArgs {
    /// Address to bind (overrides `server.bind`).
    #[arg(long, value_name = "ADDR")]
    bind: Option<String>,
    /// Port to listen on (overrides `server.port`).
    #[arg(long, value_name = "PORT")]
    port: Option<u16>,
    /// Keep ingested data in memory instead of SQLite.
    #[arg(long)]
    memory: bool,
}

#[derive(Debug, Clone, Args)]
struct ParseArgs {
    /// Log file to parse.
    #[arg(value_name = "PATH")]
    path: PathBuf,
    /// Sensor label used in diagnostics.
    #[arg(long, value_name = "NAME")]
    sensor: Option<String>,
}

#[derive(Debug, Clone, Args, Default)]
struct ConfigArgs {
    /// Config operation to run.
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Print resolved config file path.
    Path,
    /// Print effective merged configuration.
    Show,
    /// Validate configuration and exit.
    Validate,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Shell to generate completion script for.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input at runtime.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Json(_) => 3,
        }
    }
}

impl From<ThError> for CliError {
    fn from(err: ThError) -> Self {
        match err {
            ThError::InvalidConfig { .. }
            | ThError::MissingConfig { .. }
            | ThError::ConfigParse { .. }
            | ThError::SourceUnavailable { .. } => Self::User(err.to_string()),
            other => Self::Runtime(other.to_string()),
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Serve(args) => run_serve(cli, args),
        Command::Parse(args) => run_parse(cli, args),
        Command::Config(args) => run_config(cli, args),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

fn filter_directive<'a>(cli: &Cli, env: Option<&'a str>, configured: &'a str) -> &'a str {
    if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        env.filter(|raw| !raw.trim().is_empty()).unwrap_or(configured)
    }
}

fn init_tracing(cli: &Cli, logging: &LoggingConfig) {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let directive = filter_directive(cli, env.as_deref(), &logging.level);
    let filter = EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info"));
    let ansi = logging.ansi && !cli.no_color && io::stderr().is_terminal();

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(ansi)
        .with_writer(io::stderr)
        .try_init();
}

// ---------------------------------------------------------------------------
// serve
// ---------------------------------------------------------------------------

fn run_serve(cli: &Cli, args: &ServeArgs) -> Result<(), CliError> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(bind) = &args.bind {
        config.server.bind.clone_from(bind);
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if args.memory {
        config.storage.backend = StorageBackend::Memory;
    }
    let addr = config.listen_addr()?;

    init_tracing(cli, &config.logging);
    let hash = config.stable_hash()?;
    info!(source = %config_source(&config), %hash, "configuration loaded");

    let store = open_store(&config.storage)?;
    let state = Arc::new(AppState::new(&config, store)?);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::Runtime(format!("failed to start async runtime: {e}")))?;
    runtime.block_on(server::serve(state, addr))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// parse
// ---------------------------------------------------------------------------

fn run_parse(cli: &Cli, args: &ParseArgs) -> Result<(), CliError> {
    let config = Config::load(cli.config.as_deref())?;
    init_tracing(cli, &config.logging);

    let parser = LogParser::new(config.dashboard.timestamp_merge)?;
    let result = parser.parse_file(&args.path, args.sensor.as_deref())?;
    if let Some(reason) = &result.source_unavailable {
        return Err(CliError::User(format!(
            "log source unavailable at {}: {reason}",
            args.path.display()
        )));
    }

    match output_mode(cli) {
        OutputMode::Human => print_parse_human(&result),
        OutputMode::Json => {
            for record in &result.records {
                write_json_line(&serde_json::to_value(record)?)?;
            }
            write_json_line(&parse_summary(&result)?)?;
        }
    }
    Ok(())
}

fn parse_summary(result: &SensorLogResult) -> Result<Value, CliError> {
    Ok(json!({
        "command": "parse",
        "sensor": result.sensor,
        "source": result.source.to_string_lossy(),
        "records": result.records.len(),
        "skipped": result.skipped_lines(),
        "diagnostics": serde_json::to_value(&result.diagnostics)?,
    }))
}

fn diagnostic_label(kind: &DiagnosticKind) -> &'static str {
    match kind {
        DiagnosticKind::MalformedLine => "malformed line",
        DiagnosticKind::InvalidUtf8 => "invalid UTF-8",
        DiagnosticKind::PayloadDecode { .. } => "JSON decode error",
        DiagnosticKind::TimestampCollision { .. } => "timestamp collision",
    }
}

fn print_parse_human(result: &SensorLogResult) {
    println!(
        "{} ({}): {} records, {} skipped",
        result.sensor.bold(),
        result.source.display(),
        result.records.len(),
        result.skipped_lines()
    );
    for record in &result.records {
        let fields = Value::Object(record.fields().clone());
        println!("  {:<24} {fields}", record.timestamp_prefix());
    }
    for diagnostic in &result.diagnostics {
        let label = diagnostic_label(&diagnostic.kind);
        let line = format!("  line {}: {label}: {}", diagnostic.line_number, diagnostic.excerpt);
        if diagnostic.kind.is_skip() {
            println!("{}", line.yellow());
        } else {
            println!("{}", line.dimmed());
        }
    }
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    match &args.command {
        None | Some(ConfigCommand::Path) => {
            let path = cli.config.clone().unwrap_or_else(Config::default_path);
            let exists = path.exists();

            match output_mode(cli) {
                OutputMode::Human => {
                    println!("{}", path.display());
                    if !exists {
                        println!("  (file does not exist; defaults will be used)");
                    }
                }
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config path",
                        "path": path.to_string_lossy(),
                        "exists": exists,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Show) => {
            let config = Config::load(cli.config.as_deref())?;

            match output_mode(cli) {
                OutputMode::Human => {
                    println!("{}", config.to_toml_string()?);
                }
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config show",
                        "config": serde_json::to_value(&config)?,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Validate) => match Config::load(cli.config.as_deref()) {
            Ok(config) => {
                let hash = config.stable_hash()?;
                let source = config_source(&config);

                match output_mode(cli) {
                    OutputMode::Human => {
                        println!("{}", "Configuration is valid.".green());
                        println!("  Source: {source}");
                        println!("  Sensors: {}", config.sensors.len());
                        println!("  Hash: {hash}");
                    }
                    OutputMode::Json => {
                        let payload = json!({
                            "command": "config validate",
                            "valid": true,
                            "path": source,
                            "hash": hash,
                        });
                        write_json_line(&payload)?;
                    }
                }
                Ok(())
            }
            Err(e) => {
                match output_mode(cli) {
                    OutputMode::Human => {
                        eprintln!("{} {e}", "Configuration is INVALID:".red());
                    }
                    OutputMode::Json => {
                        let payload = json!({
                            "command": "config validate",
                            "valid": false,
                            "error": e.to_string(),
                        });
                        write_json_line(&payload)?;
                    }
                }
                Err(CliError::User(format!("invalid config: {e}")))
            }
        },
    }
}

// ---------------------------------------------------------------------------
// Output helpers
// ---------------------------------------------------------------------------

fn config_source(config: &Config) -> String {
    config
        .config_file
        .as_ref()
        .map_or_else(|| "defaults".to_string(), |p| p.display().to_string())
}

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("TH_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}
