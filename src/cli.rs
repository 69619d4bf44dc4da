//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::adapters::csv_adapter::CsvCatalogAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::config_validation::validate_database_config;
use crate::domain::enrollment::{EnrollmentStatus, ProgressSnapshot};
use crate::domain::error::SportfundError;
use crate::ports::config_port::ConfigPort;
use crate::ports::store_port::{AccountStore, ChallengeStore, EnrollmentStore, StorePort};

#[derive(Parser, Debug)]
#[command(
    name = "sportfund",
    about = "Funded sports trading challenges: web site and back office"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the web server
    Serve {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Create the database tables if they do not exist
    InitDb {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Load challenge tiers from a CSV catalog, replacing tiers by name
    ImportChallenges {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Print the challenge catalog
    ListChallenges {
        #[arg(short, long)]
        config: PathBuf,
        /// Include inactive tiers
        #[arg(long)]
        all: bool,
    },
    /// Record an evaluation snapshot for an enrollment
    RecordProgress {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        enrollment: i64,
        #[arg(long)]
        profit: f64,
        #[arg(long)]
        trades: u32,
        #[arg(long)]
        wins: u32,
        /// Defaults to the enrollment's current phase
        #[arg(long)]
        phase: Option<u8>,
        /// Defaults to the enrollment's current status
        #[arg(long)]
        status: Option<String>,
    },
    /// Grant (or with --revoke, remove) admin access for an account
    GrantAdmin {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        email: String,
        #[arg(long)]
        revoke: bool,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Serve { config } => run_serve(&config),
        Command::InitDb { config } => run_init_db(&config),
        Command::ImportChallenges { config, file } => run_import(&config, &file),
        Command::ListChallenges { config, all } => run_list_challenges(&config, all),
        Command::RecordProgress {
            config,
            enrollment,
            profit,
            trades,
            wins,
            phase,
            status,
        } => run_record_progress(
            &config,
            enrollment,
            profit,
            trades,
            wins,
            phase,
            status.as_deref(),
        ),
        Command::GrantAdmin {
            config,
            email,
            revoke,
        } => run_grant_admin(&config, &email, !revoke),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

/// Loads the config file and installs the log subscriber. `RUST_LOG`
/// overrides `[log] filter`.
pub fn load_config(path: &Path) -> Result<FileConfigAdapter, SportfundError> {
    let config = FileConfigAdapter::from_file(path)?;
    init_tracing(&config);
    info!(path = %path.display(), "loaded config");
    Ok(config)
}

fn init_tracing(config: &dyn ConfigPort) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let configured = config
            .get_string("log", "filter")
            .unwrap_or_else(|| "info".to_string());
        EnvFilter::try_new(&configured).unwrap_or_else(|_| EnvFilter::new("info"))
    });
    // A second call (tests, repeated runs in one process) keeps the first.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Opens the configured store and makes sure its schema exists. PostgreSQL
/// wins when both backends are configured.
pub fn open_store(config: &dyn ConfigPort) -> Result<Arc<dyn StorePort + Send + Sync>, SportfundError> {
    validate_database_config(config)?;

    #[cfg(feature = "postgres")]
    if config
        .get_string("postgres", "connection_string")
        .is_some_and(|s| !s.trim().is_empty())
    {
        let store = crate::adapters::postgres_adapter::PostgresAdapter::from_config(config)?;
        store.initialize_schema()?;
        return Ok(Arc::new(store));
    }

    #[cfg(feature = "sqlite")]
    {
        let store = crate::adapters::sqlite_adapter::SqliteAdapter::from_config(config)?;
        store.initialize_schema()?;
        Ok(Arc::new(store))
    }

    #[cfg(not(feature = "sqlite"))]
    {
        Err(SportfundError::ConfigInvalid {
            section: "database".to_string(),
            key: "sqlite_path".to_string(),
            reason: "this build has no SQLite support; configure [postgres]".to_string(),
        })
    }
}

fn run_serve(config_path: &Path) -> Result<(), SportfundError> {
    #[cfg(feature = "web")]
    {
        use crate::adapters::web::{AppState, serve};
        use crate::domain::config_validation::{listen_addr, validate_web_config};

        let config = load_config(config_path)?;
        validate_web_config(&config)?;
        let addr = listen_addr(&config)?;
        let store = open_store(&config)?;

        let state = AppState {
            store,
            config: Arc::new(config),
        };
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(serve(state, addr))
    }

    #[cfg(not(feature = "web"))]
    {
        let _ = config_path;
        Err(SportfundError::ConfigInvalid {
            section: "web".to_string(),
            key: "listen".to_string(),
            reason: "this build has no web server; rebuild with the `web` feature".to_string(),
        })
    }
}

fn run_init_db(config_path: &Path) -> Result<(), SportfundError> {
    let config = load_config(config_path)?;
    open_store(&config)?;
    println!("database ready");
    Ok(())
}

fn run_import(config_path: &Path, file: &Path) -> Result<(), SportfundError> {
    let config = load_config(config_path)?;
    let tiers = CsvCatalogAdapter::new(file).load()?;
    let store = open_store(&config)?;

    for tier in &tiers {
        let id = store.upsert_challenge(tier)?;
        info!(id, name = %tier.name, "imported challenge");
    }
    println!("imported {} challenge(s) from {}", tiers.len(), file.display());
    Ok(())
}

fn run_list_challenges(config_path: &Path, all: bool) -> Result<(), SportfundError> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;
    let tiers = if all {
        store.list_all_challenges()?
    } else {
        store.list_active_challenges()?
    };

    if tiers.is_empty() {
        println!("no challenges");
        return Ok(());
    }
    println!(
        "{:>4}  {:<8}  {:>12}  {:>10}  {:>5}  {:>6}  NAME",
        "ID", "PLAN", "BALANCE", "PRICE", "STEPS", "ACTIVE"
    );
    for c in &tiers {
        println!(
            "{:>4}  {:<8}  {:>12}  {:>10}  {:>5}  {:>6}  {}",
            c.id,
            c.plan_type.as_str(),
            c.balance_display(),
            c.price_display(),
            c.steps,
            if c.is_active { "yes" } else { "no" },
            c.name
        );
    }
    Ok(())
}

fn run_record_progress(
    config_path: &Path,
    enrollment_id: i64,
    profit: f64,
    trades: u32,
    wins: u32,
    phase: Option<u8>,
    status: Option<&str>,
) -> Result<(), SportfundError> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;

    let view = store
        .get_enrollment(enrollment_id)?
        .ok_or_else(|| SportfundError::not_found("enrollment", enrollment_id))?;

    let status = match status {
        Some(raw) => raw.parse::<EnrollmentStatus>()?,
        None => view.enrollment.status,
    };
    let snapshot = ProgressSnapshot {
        status,
        current_phase: phase.unwrap_or(view.enrollment.current_phase),
        current_profit: profit,
        total_trades: trades,
        winning_trades: wins,
    };
    snapshot.validate(&view.challenge)?;

    let (current_balance, max_balance) =
        snapshot.balances(&view.challenge, view.enrollment.max_balance);
    store.record_progress(enrollment_id, &snapshot, current_balance, max_balance)?;

    info!(
        enrollment_id,
        phase = snapshot.current_phase,
        %status,
        profit,
        "recorded progress"
    );
    println!(
        "enrollment {enrollment_id}: phase {} {status}, balance {current_balance:.2}",
        snapshot.current_phase
    );
    Ok(())
}

fn run_grant_admin(config_path: &Path, email: &str, is_admin: bool) -> Result<(), SportfundError> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;
    let email = crate::domain::account::normalize_email(email)?;
    store.set_admin(&email, is_admin)?;
    if is_admin {
        println!("{email} is now an admin");
    } else {
        println!("{email} is no longer an admin");
    }
    Ok(())
}
