use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use cloudinv::config::Config;
use cloudinv::engine::{Engine, JsonLinesSink, RowSink, SyncSummary};
use cloudinv::provider::{format_api_error, Credentials, ProviderClient};
use cloudinv::schema::TableDef;
use cloudinv::tables;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Version injected at compile time via CLOUDINV_VERSION env var (set by
/// CI/CD), or "dev" for local builds.
pub const VERSION: &str = match option_env!("CLOUDINV_VERSION") {
    Some(v) => v,
    None => "dev",
};

/// Extract cloud inventory into relational rows
#[derive(Parser, Debug)]
#[command(name = "cloudinv", version, about, long_about = None)]
struct Args {
    /// Configuration file (JSON, or YAML by extension)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Provider gateway endpoint
    #[arg(long)]
    endpoint: Option<String>,

    /// Account to sync (repeatable)
    #[arg(short, long = "account")]
    accounts: Vec<String>,

    /// Region to sync (repeatable)
    #[arg(short, long = "region")]
    regions: Vec<String>,

    /// Table to sync (repeatable); all tables when omitted
    #[arg(short, long = "table")]
    tables: Vec<String>,

    /// Output file for rows, or "-" for stdout
    #[arg(short, long, default_value = "-")]
    output: String,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off")]
    log_level: LogLevel,

    /// Log file (defaults to the config directory)
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// List table trees and exit
    #[arg(long)]
    list_tables: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(
    level: LogLevel,
    log_file: Option<PathBuf>,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let log_path = log_file.unwrap_or_else(get_log_path);

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {:?}", log_path))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("cloudinv {} started with log level: {:?}", VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("cloudinv").join("cloudinv.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".cloudinv").join("cloudinv.log");
    }
    PathBuf::from("cloudinv.log")
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level, args.log_file.clone())?;

    tables::validate_registry()?;

    if args.list_tables {
        print_tables();
        return Ok(ExitCode::SUCCESS);
    }

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(endpoint) = &args.endpoint {
        config.endpoint = Some(endpoint.clone());
    }
    config.apply_overrides(&args.accounts, &args.regions);

    let selected = select_tables(&args.tables)?;
    let accounts = config.account_regions();
    if accounts.is_empty() {
        bail!("No accounts configured. Add accounts to the config file or use --account");
    }

    tracing::info!(
        "Syncing {} table(s) across {} account(s) via {}",
        selected.len(),
        accounts.len(),
        config.effective_endpoint()
    );

    let credentials = Credentials::resolve(config.token_file.as_deref());
    let client = ProviderClient::new(
        config.effective_endpoint(),
        credentials,
        config.request_timeout(),
    )?;

    let sink = Arc::new(if args.output == "-" {
        JsonLinesSink::stdout()
    } else {
        JsonLinesSink::create(std::path::Path::new(&args.output)).await?
    });

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling sync");
            ctrl_c.cancel();
        }
    });

    let engine = Engine::new(
        Arc::new(client),
        Arc::clone(&sink) as Arc<dyn RowSink>,
        accounts,
    )
    .with_settings(config.exec_settings())
    .with_cancellation(cancel);

    let summary = engine.sync(&selected).await;
    sink.flush().await?;

    print_summary(&summary);

    // The log guard must drop before the process exits to flush the writer
    if summary.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn select_tables(names: &[String]) -> Result<Vec<&'static dyn TableDef>> {
    if names.is_empty() {
        return Ok(tables::registry().iter().map(|t| &**t).collect());
    }

    names
        .iter()
        .map(|name| {
            tables::get_table(name).with_context(|| {
                format!(
                    "Unknown table: {} (available: {})",
                    name,
                    tables::table_names().join(", ")
                )
            })
        })
        .collect()
}

fn print_tables() {
    for info in tables::table_infos() {
        for name in info.table_names() {
            let depth = if name == info.name { "" } else { "  " };
            println!("{}{}", depth, name);
        }
    }
}

fn print_summary(summary: &SyncSummary) {
    for table in &summary.tables {
        eprintln!(
            "{}: {} rows across {} scope(s), {} ignored, {} failed",
            table.table,
            table.report.rows,
            table.scopes,
            table.report.ignored,
            table.report.failures.len()
        );
    }

    for failure in summary.failures() {
        eprintln!(
            "  {} [{}] {}: {}",
            failure.table,
            failure.scope,
            failure.kind,
            format_api_error(&failure.error)
        );
    }

    let warnings = summary.diagnostic_counts.warnings;
    if warnings > 0 {
        eprintln!("{} warning(s) recorded; see the log for details", warnings);
    }

    if summary.cancelled {
        eprintln!("Sync cancelled");
    }
    eprintln!("Total: {} rows", summary.rows());
}
