use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fabriclink_auth::TokenAuthenticator;
use fabriclink_connection::{login_fields, ControlPlaneConnector, LiveControlPlane, DEFAULT_APPLICATION_NAME};
use fabriclink_core::{
    Credentials, DriverPreference, RunResults, RunStatus, ThreadSleeper, RUN_RESULTS_PATH,
};
use fabriclink_driver::{effective_preference, mask_secret, BackendKind, ConnectionStringParams};

/// fabriclink - warehouse connectivity checks
#[derive(Parser)]
#[command(name = "fabriclink")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the connection profile (default: fabriclink.toml)
    #[arg(short, long, global = true)]
    profile: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show connection settings and the masked connection string
    Debug {
        /// Backend to build the connection string for (default: effective preference)
        #[arg(short, long, value_enum)]
        backend: Option<BackendArg>,
    },

    /// Create or update the profile's warehouse snapshot
    Snapshot {
        /// Warehouse display name (default: the profile's database)
        #[arg(short, long)]
        warehouse: Option<String>,

        /// Snapshot display name (default: warehouse_snapshot_name)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Summarize a run-results artifact
    RunStatus {
        /// Path to run_results.json
        #[arg(short = 'f', long, default_value = RUN_RESULTS_PATH)]
        run_results: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendArg {
    Native,
    Odbc,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Native => BackendKind::Native,
            BackendArg::Odbc => BackendKind::Odbc,
        }
    }
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Debug { backend } => {
            let creds = load_profile(cli.profile.as_deref(), cli.verbose)?;
            debug_command(&creds, backend.map(BackendKind::from))
        }
        Commands::Snapshot { warehouse, name } => {
            let creds = load_profile(cli.profile.as_deref(), cli.verbose)?;
            snapshot_command(&creds, warehouse, name, cli.verbose)
        }
        Commands::RunStatus { run_results } => run_status_command(&run_results),
    }
}

fn load_profile(path: Option<&Path>, verbose: bool) -> Result<Credentials> {
    let path = path.unwrap_or_else(|| Path::new("fabriclink.toml"));
    if verbose {
        eprintln!("{} {}", "Loading profile from:".cyan(), path.display());
    }
    tracing::debug!(path = %path.display(), "Loading profile");
    Credentials::from_file(path).with_context(|| format!("Failed to load profile {}", path.display()))
}

/// Debug command - print connection keys and the masked connection string
fn debug_command(creds: &Credentials, backend: Option<BackendKind>) -> Result<()> {
    let preference = effective_preference(creds.driver_backend)?;
    let kind = backend.unwrap_or(match preference {
        DriverPreference::Odbc => BackendKind::Odbc,
        DriverPreference::Native | DriverPreference::Auto => BackendKind::Native,
    });

    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", "Connection Settings".bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    println!("  {:<24} {}", "type", creds.type_name());
    for key in Credentials::connection_keys() {
        let value = creds.connection_value(key).unwrap_or_else(|| "-".to_string());
        println!("  {:<24} {}", key, value);
    }
    println!();

    println!("  {:<24} {} (configured: {})", "driver_backend", preference, creds.driver_backend);
    println!("  {:<24} {}", "backend", kind.name().cyan());

    let (uid, pwd) = login_fields(creds);
    let params = ConnectionStringParams::from_credentials(creds, DEFAULT_APPLICATION_NAME, uid, pwd);
    match kind.build_connection_string(&params) {
        Ok(connection_string) => {
            println!("  {:<24} {}", "connection_string", mask_secret(&connection_string, pwd));
        }
        Err(e) => {
            println!("  {:<24} {}", "connection_string", e.to_string().red());
        }
    }

    println!();
    println!("{}", "=".repeat(60).bright_blue());
    Ok(())
}

/// Snapshot command - orchestrate against the live control plane
fn snapshot_command(
    creds: &Credentials,
    warehouse: Option<String>,
    name: Option<String>,
    verbose: bool,
) -> Result<()> {
    let workspace_id = creds
        .workspace_id
        .as_deref()
        .context("workspace_id must be set to manage warehouse snapshots")?;
    let snapshot_name = name
        .or_else(|| creds.warehouse_snapshot_name.clone())
        .context("no snapshot name given and warehouse_snapshot_name is not set")?;
    let warehouse = warehouse.unwrap_or_else(|| creds.database.clone());

    if verbose {
        eprintln!(
            "{} {} / {} in workspace {}",
            "Managing snapshot".cyan(),
            warehouse,
            snapshot_name,
            workspace_id
        );
    }

    let connector = LiveControlPlane::new(Arc::new(TokenAuthenticator::new()), Arc::new(ThreadSleeper));
    let orchestrator = connector.connect(creds, workspace_id)?;
    let record = orchestrator.orchestrate(&warehouse, &snapshot_name)?;

    println!("{}", serde_json::to_string_pretty(&record)?);
    eprintln!(
        "{} {} ({})",
        "✓ Snapshot".green().bold(),
        record.snapshot_id.as_deref().unwrap_or("<pending>"),
        record.operation_type
    );
    Ok(())
}

/// Run status command - summarize run_results.json
fn run_status_command(path: &Path) -> Result<()> {
    let status = RunResults::status_from_file(path);
    let label = match status {
        RunStatus::Success => status.as_str().green().bold(),
        RunStatus::Error => status.as_str().red().bold(),
        RunStatus::Unknown => status.as_str().yellow(),
    };
    println!("{}: {}", path.display(), label);
    Ok(())
}
