//! unibio CLI - drive the biometric dispatcher from the command line
//!
//! Runs scripted authentication scenarios against simulated vendor
//! services, and inspects or resets the persisted lockout state.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use unibio_core::BiometricType;
use unibio_dispatch::DispatchConfig;

#[derive(Parser)]
#[command(name = "unibio")]
#[command(about = "Multi-vendor biometric authentication dispatcher", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to $UNIBIO_CONFIG, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Lockout store passphrase. Discouraged: it shows up in process listings
    /// and shell history. Prefer $UNIBIO_STORE_PASSPHRASE, or pipe it on stdin
    #[arg(long, global = true)]
    passphrase: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scripted authentication scenario
    Simulate {
        /// Scenario JSON file
        #[arg(short, long)]
        scenario: PathBuf,

        /// Only authenticate modules of this biometric type
        #[arg(short = 't', long = "type")]
        biometric_type: Option<BiometricType>,

        /// Cancel every probe after this many milliseconds
        #[arg(long, default_value_t = 10_000)]
        timeout_ms: u64,

        /// Keep lockout state in memory instead of the encrypted store
        #[arg(long)]
        ephemeral: bool,
    },

    /// Lockout state commands
    #[command(subcommand)]
    Lockout(LockoutCommands),

    /// Configuration commands
    #[command(subcommand)]
    Config(ConfigCommands),

    /// List supported biometric methods
    Methods,
}

#[derive(Subcommand)]
enum LockoutCommands {
    /// Show lockout state of every method
    Status,

    /// Clear lockout state
    Clear {
        /// Method tag or name; all methods when omitted
        #[arg(short, long)]
        method: Option<String>,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}

fn config_path(cli_path: Option<PathBuf>) -> PathBuf {
    cli_path
        .or_else(|| std::env::var_os("UNIBIO_CONFIG").map(PathBuf::from))
        .unwrap_or_else(|| {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("/etc"))
                .join("unibio")
                .join("config.json")
        })
}

fn load_config(path: &std::path::Path) -> anyhow::Result<DispatchConfig> {
    let config = if path.exists() {
        DispatchConfig::load(path)?
    } else {
        let config = DispatchConfig::default();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        config.save(path)?;
        info!("Created default config at {:?}", path);
        config
    };
    config.ensure_directories()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "unibio=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let path = config_path(cli.config);
    let passphrase = cli.passphrase;

    match cli.command {
        Commands::Simulate {
            scenario,
            biometric_type,
            timeout_ms,
            ephemeral,
        } => {
            let config = load_config(&path)?;
            let store = if ephemeral {
                commands::memory_store()
            } else {
                let passphrase = commands::store_passphrase(passphrase)?;
                commands::open_store(&config, &passphrase)?
            };
            commands::simulate(&config, store, &scenario, biometric_type, timeout_ms).await?;
        }

        Commands::Lockout(LockoutCommands::Status) => {
            let config = load_config(&path)?;
            let passphrase = commands::store_passphrase(passphrase)?;
            let store = commands::open_store(&config, &passphrase)?;
            commands::lockout_status(&config, store);
        }

        Commands::Lockout(LockoutCommands::Clear { method }) => {
            let config = load_config(&path)?;
            let passphrase = commands::store_passphrase(passphrase)?;
            let store = commands::open_store(&config, &passphrase)?;
            commands::lockout_clear(&config, store, method.as_deref())?;
        }

        Commands::Config(ConfigCommands::Init { force }) => {
            if path.exists() && !force {
                anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
            }
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            DispatchConfig::default().save(&path)?;
            println!("✓ Wrote default configuration to {}", path.display());
        }

        Commands::Config(ConfigCommands::Show) => {
            let config = load_config(&path)?;
            println!("# {}", path.display());
            println!("{}", serde_json::to_string_pretty(&config)?);
        }

        Commands::Methods => commands::list_methods(),
    }

    Ok(())
}
