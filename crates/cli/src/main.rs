mod config;
mod notify;
mod runner;

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};

use refrain_backend::backend_for;
use refrain_core::{Family, Policy};
use refrain_fleet::{Directory, FetchConfig, HttpDirectory, ServiceRecord};
use refrain_state::{CachedConnection, RunLog, TokenCache};

use config::AppConfig;
use notify::{format_summary, Notifier};
use runner::{RunOptions, Runner, FRESHNESS_WINDOW, FRESH_CREDENTIAL_DELAY};

/// Directory calls get the longest timeout; a slow listing page is normal.
const DIRECTORY_TIMEOUT: Duration = Duration::from_secs(30);

/// Fleet media-server configuration reconciler.
#[derive(Parser)]
#[command(name = "refrain", version, about = "Fleet media-server configuration reconciler")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true, default_value = "refrain.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile fleet configuration against the standard policy
    Run {
        /// Only servers not previously reconciled (or created recently)
        #[arg(long, conflicts_with = "all_servers")]
        new_only: bool,

        /// Reconcile every server (the default mode)
        #[arg(long)]
        all_servers: bool,

        /// Restrict the run to one backend family
        #[arg(long, value_enum)]
        family: Option<FamilyArg>,

        /// Evaluate and report without writing or recording anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Restart a managed server via the directory service
    Restart {
        /// Directory service id of the server
        service_id: String,

        /// Backend family of the server
        #[arg(long, value_enum)]
        family: FamilyArg,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FamilyArg {
    Emby,
    Plex,
}

impl From<FamilyArg> for Family {
    fn from(arg: FamilyArg) -> Family {
        match arg {
            FamilyArg::Emby => Family::Emby,
            FamilyArg::Plex => Family::Plex,
        }
    }
}

fn main() {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            new_only,
            all_servers: _,
            family,
            dry_run,
        } => cmd_run(&cli.config, new_only, family.map(Family::from), dry_run),
        Commands::Restart { service_id, family } => {
            cmd_restart(&cli.config, &service_id, family.into())
        }
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(path: &PathBuf) -> (AppConfig, String) {
    let config = match AppConfig::load(path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            process::exit(1);
        }
    };
    let token = match config.directory_token() {
        Ok(token) => token,
        Err(err) => {
            eprintln!("{err}");
            process::exit(1);
        }
    };
    (config, token)
}

fn cmd_run(config_path: &PathBuf, new_only: bool, family: Option<Family>, dry_run: bool) {
    let (config, token) = load_config(config_path);

    let policy = match Policy::standard() {
        Ok(policy) => policy,
        Err(err) => {
            eprintln!("error: built-in policy is invalid: {err}");
            process::exit(1);
        }
    };

    let directory = HttpDirectory::new(&config.directory.base_url, &token, DIRECTORY_TIMEOUT);
    let notifier = Notifier::new(config.notify.webhook_url.clone());

    let factory = |record: &ServiceRecord, conn: &CachedConnection| {
        backend_for(record.family, &conn.host, conn.port, &conn.token)
    };

    let families = match family {
        Some(family) => vec![family],
        None => vec![Family::Emby, Family::Plex],
    };

    for family in families {
        let runner = Runner {
            directory: &directory,
            backend_factory: &factory,
            policy: &policy,
            run_log: RunLog::new(config.run_log_path(family)),
            token_cache: TokenCache::new(config.token_cache_path(family)),
            options: RunOptions { new_only, dry_run },
            fetch: FetchConfig::default(),
            fresh_delay: FRESH_CREDENTIAL_DELAY,
            freshness_window: FRESHNESS_WINDOW,
        };

        let summary = runner.run(family);
        print!("{}", format_summary(&summary));

        if !dry_run {
            notifier.send(&summary);
        }
    }
}

fn cmd_restart(config_path: &PathBuf, service_id: &str, family: Family) {
    let (config, token) = load_config(config_path);
    let directory = HttpDirectory::new(&config.directory.base_url, &token, DIRECTORY_TIMEOUT);

    match directory.restart(service_id, family) {
        Ok(()) => println!("restart initiated for service {service_id}"),
        Err(err) => {
            eprintln!("error: restart failed for service {service_id}: {err}");
            process::exit(1);
        }
    }
}
