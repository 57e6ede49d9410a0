use anyhow::{Context, Result};
use config::ConfigError;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Input, Password};
use folio_fs::{ensure_directory_exists, system_data_dir};
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8787;
pub const DEFAULT_RECONCILE_CONCURRENCY: usize = 4;

/// Prefix of environment variables overriding file values, e.g.
/// `FOLIO_SERVER__PORT=9000`.
const ENV_PREFIX: &str = "FOLIO";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub data: Data,
    pub server: Server,
    #[serde(default)]
    pub sync: SyncOptions,
    #[serde(default)]
    pub reconcile: Reconcile,
    #[serde(default)]
    pub users: Vec<User>,
}

impl Config {
    pub fn read<D>(config_file: D) -> Result<Self, ConfigError>
    where
        D: AsRef<OsStr>,
    {
        let config_file = Path::new(&config_file);

        config::Config::builder()
            .add_source(config::File::from(config_file))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()
    }

    pub fn with_data_dir(dir: PathBuf) -> Self {
        Self {
            data: Data { dir },
            server: Server::default(),
            sync: SyncOptions::default(),
            reconcile: Reconcile::default(),
            users: Vec::new(),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        folio_fs::default_database_path(&self.data.dir)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Data {
    pub dir: PathBuf,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Server {
    pub host: String,
    pub port: u16,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SyncOptions {
    /// Answer progress reads only for fingerprints the checksum ledger knows.
    #[serde(default)]
    pub require_known_document: bool,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Reconcile {
    /// Library root scanned by the reconciliation task.
    #[serde(default)]
    pub library: Option<PathBuf>,
    /// Run reconciliation periodically while serving. Disabled when absent.
    #[serde(default)]
    pub interval_secs: Option<u64>,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for Reconcile {
    fn default() -> Self {
        Self {
            library: None,
            interval_secs: None,
            concurrency: DEFAULT_RECONCILE_CONCURRENCY,
        }
    }
}

fn default_concurrency() -> usize {
    DEFAULT_RECONCILE_CONCURRENCY
}

/// A sync account: user name plus an Argon2 PHC password hash.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct User {
    pub name: String,
    pub password_hash: String,
}

#[derive(thiserror::Error, Debug, Clone, Copy)]
#[error("config not initialized")]
pub struct ConfigNotInitialized {}

pub fn read_config(config_path: PathBuf) -> Result<Result<Config, ConfigNotInitialized>> {
    if config_path.exists() {
        info!("Using config file at {}", config_path.display());
    } else {
        return Ok(Err(ConfigNotInitialized {}));
    }

    let file = Config::read(&config_path)
        .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;

    Ok(Ok(file))
}

pub fn initial_setup<F>(config_path: PathBuf, config_file: F) -> Result<()>
where
    F: FnOnce() -> Result<Config>,
{
    info!("Config file not found, running initial setup...");
    ensure_directory_exists(config_path.as_path())?;
    let initial_config = config_file()?;

    let toml = toml::to_string(&initial_config)?;
    fs::write(&config_path, toml)?;

    info!(
        "Initial setup complete, config file created at {} ",
        config_path.as_path().display()
    );
    Ok(())
}

/// Ask for the initial configuration on the terminal.
///
/// `hash_password` turns the entered password into the stored hash.
pub fn query_user_for_initial_config<H>(hash_password: H) -> Result<Config>
where
    H: Fn(&str) -> Result<String>,
{
    let theme = ColorfulTheme::default();

    println!();
    let data_dir: String = Input::with_theme(&theme)
        .with_prompt("Enter data directory or hit return to use default")
        .default(
            system_data_dir()
                .context("No default data dir value for this system")?
                .to_str()
                .context("Unsupported characters in default path")?
                .to_string(),
        )
        .interact_text()?;
    let data_dir = PathBuf::from(data_dir);

    let host: String = Input::with_theme(&theme)
        .with_prompt("Enter the address the sync server should listen on")
        .default(DEFAULT_HOST.to_owned())
        .interact_text()?;

    let port: u16 = Input::with_theme(&theme)
        .with_prompt("Enter the port the sync server should listen on")
        .default(DEFAULT_PORT)
        .interact_text()?;

    let library: String = Input::with_theme(&theme)
        .with_prompt("Enter the library directory to reconcile (leave empty to skip)")
        .allow_empty(true)
        .interact_text()?;
    let library = (!library.trim().is_empty()).then(|| PathBuf::from(library.trim()));

    let name: String = Input::with_theme(&theme)
        .with_prompt("Enter a user name for device sync")
        .interact_text()?;
    let password = Password::with_theme(&theme)
        .with_prompt("Enter the password for that user")
        .with_confirmation("Repeat password", "Passwords do not match")
        .interact()?;
    println!();

    Ok(Config {
        data: Data { dir: data_dir },
        server: Server { host, port },
        sync: SyncOptions::default(),
        reconcile: Reconcile {
            library,
            ..Reconcile::default()
        },
        users: vec![User {
            name,
            password_hash: hash_password(&password)?,
        }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_config() -> Config {
        Config {
            data: Data {
                dir: PathBuf::from("/var/lib/folio"),
            },
            server: Server {
                host: "0.0.0.0".to_owned(),
                port: 9000,
            },
            sync: SyncOptions {
                require_known_document: true,
            },
            reconcile: Reconcile {
                library: Some(PathBuf::from("/srv/books")),
                interval_secs: Some(3600),
                concurrency: 2,
            },
            users: vec![User {
                name: "reader".to_owned(),
                password_hash: "$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA".to_owned(),
            }],
        }
    }

    #[test]
    fn config_roundtrip() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let expected = sample_config();

        initial_setup(config_path.clone(), || Ok(expected.clone())).unwrap();
        let actual = read_config(config_path).unwrap().unwrap();

        assert_eq!(expected, actual);
    }

    #[test]
    fn optional_sections_fall_back_to_defaults() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(
            &config_path,
            "[data]\ndir = \"/tmp/folio\"\n\n[server]\nhost = \"127.0.0.1\"\nport = 8787\n",
        )
        .unwrap();

        let config = read_config(config_path).unwrap().unwrap();

        assert_eq!(config, Config::with_data_dir(PathBuf::from("/tmp/folio")));
        assert_eq!(config.reconcile.concurrency, DEFAULT_RECONCILE_CONCURRENCY);
        assert!(config.users.is_empty());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(
            &config_path,
            "[data]\ndir = \"/tmp/folio\"\n\n[server]\nhost = \"127.0.0.1\"\nport = 8787\nworkers = 3\n",
        )
        .unwrap();

        assert!(read_config(config_path).is_err());
    }

    #[test]
    fn missing_file_is_not_initialized() {
        let temp_dir = tempdir().unwrap();

        let result = read_config(temp_dir.path().join("nope.toml")).unwrap();

        assert!(result.is_err());
    }

    #[test]
    fn database_path_is_inside_data_dir() {
        let config = Config::with_data_dir(PathBuf::from("/data"));
        assert_eq!(config.database_path(), PathBuf::from("/data/folio.sqlite"));
    }
}
