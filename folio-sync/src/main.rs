use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dialoguer::theme::ColorfulTheme;
use dialoguer::Password;
use folio_env::{initial_setup, query_user_for_initial_config, read_config, Config};
use folio_fingerprint::{AlgorithmVersion, Fingerprint};
use folio_sync::trace::{init_tracing, Format as LogFormat};
use folio_sync::{
    hash_password, record_checksum_with_algorithm, run_server, AccessMode, ChecksumLedger,
    DirectoryCatalog, DocumentId, Format, ReconcileMode, Reconciler, SqliteDatabase,
};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::filter::LevelFilter;

#[derive(Parser)]
#[command(name = "folio-sync")]
#[command(about = "Reading-progress sync server and checksum ledger for e-book libraries")]
#[command(version)]
struct Args {
    #[arg(long, global = true, help = "Path to the configuration file")]
    config: Option<PathBuf>,

    #[arg(long, global = true, help = "Override the data directory from the configuration")]
    data_dir: Option<PathBuf>,

    #[arg(long, global = true, help = "Enable debug logging")]
    debug: bool,

    #[arg(long, global = true, help = "Log in JSON format")]
    json: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Interactively create the configuration file.
    Init,
    /// Serve the sync protocol.
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Print the fingerprint of a file without recording it.
    Fingerprint { path: PathBuf },
    /// Fingerprint a file and append it to the ledger.
    Checksum {
        #[arg(long)]
        document: DocumentId,
        #[arg(long)]
        format: Format,
        #[arg(long)]
        path: PathBuf,
        #[arg(long, default_value = "koreader")]
        algorithm: AlgorithmVersion,
    },
    /// Show the newest checksum of a document format.
    Latest {
        #[arg(long)]
        document: DocumentId,
        #[arg(long)]
        format: Format,
    },
    /// Show every checksum of a document format, newest first.
    History {
        #[arg(long)]
        document: DocumentId,
        #[arg(long)]
        format: Format,
    },
    /// Show the document a fingerprint belongs to.
    Resolve { fingerprint: Fingerprint },
    /// Fingerprint library files that have no checksum yet.
    Reconcile {
        #[arg(long, help = "Library directory, defaults to the configured one")]
        library: Option<PathBuf>,
        #[arg(long, help = "Append a fresh checksum for every file")]
        all: bool,
    },
    /// Print the hash to put in the `users` section of the configuration.
    HashPassword,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let format = if args.json {
        LogFormat::Json
    } else {
        LogFormat::Raw
    };
    init_tracing(level, format)?;

    let config_path = match args.config {
        Some(path) => path,
        None => folio_fs::default_config_path()?,
    };

    match args.cmd {
        Command::Init => {
            if config_path.exists() {
                bail!("Config file already exists at {}", config_path.display());
            }
            initial_setup(config_path, || {
                query_user_for_initial_config(|password| Ok(hash_password(password)?))
            })?;
        }
        Command::Serve { host, port } => {
            let mut config = load_config(config_path, args.data_dir)?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            run_server(config).await?;
        }
        Command::Fingerprint { path } => {
            let fingerprint = folio_fingerprint::fingerprint(&path)
                .with_context(|| format!("Failed to fingerprint {}", path.display()))?;
            println!("{fingerprint}");
        }
        Command::Checksum {
            document,
            format,
            path,
            algorithm,
        } => {
            let db = open_database(config_path, args.data_dir, AccessMode::ReadWrite).await?;
            let fingerprint =
                record_checksum_with_algorithm(&db, document, format, &path, algorithm).await?;
            println!("{fingerprint}");
        }
        Command::Latest { document, format } => {
            let db = open_database(config_path, args.data_dir, AccessMode::ReadOnly).await?;
            match db.latest(&document, &format).await? {
                Some(record) => print_json(&record)?,
                None => bail!("No checksum recorded for {document} {format}"),
            }
        }
        Command::History { document, format } => {
            let db = open_database(config_path, args.data_dir, AccessMode::ReadOnly).await?;
            print_json(&db.history(&document, &format).await?)?;
        }
        Command::Resolve { fingerprint } => {
            let db = open_database(config_path, args.data_dir, AccessMode::ReadOnly).await?;
            match db.resolve(&fingerprint).await? {
                Some(resolution) => print_json(&resolution)?,
                None => bail!("Fingerprint {fingerprint} is not in the ledger"),
            }
        }
        Command::Reconcile { library, all } => {
            let config = load_config(config_path, args.data_dir)?;
            let library = library
                .or_else(|| config.reconcile.library.clone())
                .context("No library directory given or configured")?;
            let db = SqliteDatabase::open(config.database_path(), AccessMode::ReadWrite).await?;

            let reconciler = Reconciler::new(
                Arc::new(db.clone()),
                Arc::new(DirectoryCatalog::new(library)),
                config.reconcile.concurrency,
            );
            let mode = if all {
                ReconcileMode::All
            } else {
                ReconcileMode::Missing
            };
            let report = reconciler.run(mode).await?;
            db.close().await;

            print_json(&report)?;
        }
        Command::HashPassword => {
            let password = Password::with_theme(&ColorfulTheme::default())
                .with_prompt("Password")
                .with_confirmation("Repeat password", "Passwords do not match")
                .interact()?;
            println!("{}", hash_password(&password)?);
        }
    }

    Ok(())
}

fn load_config(config_path: PathBuf, data_dir: Option<PathBuf>) -> Result<Config> {
    let mut config = match read_config(config_path.clone())? {
        Ok(config) => config,
        Err(_) => {
            warn!(
                "No config file at {}, using defaults. Run `folio-sync init` to create one",
                config_path.display()
            );
            Config::with_data_dir(folio_fs::system_data_dir()?)
        }
    };

    if let Some(data_dir) = data_dir {
        info!("Using data directory {}", data_dir.display());
        config.data.dir = data_dir;
    }

    Ok(config)
}

async fn open_database(
    config_path: PathBuf,
    data_dir: Option<PathBuf>,
    access_mode: AccessMode,
) -> Result<SqliteDatabase> {
    let config = load_config(config_path, data_dir)?;
    let path = config.database_path();

    SqliteDatabase::open(&path, access_mode)
        .await
        .with_context(|| format!("Failed to open database at {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
