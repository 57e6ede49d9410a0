use anyhow::{Context, Result};
use directories_next::ProjectDirs;
use std::path::{Path, PathBuf};

const APPLICATION: &str = "folio";

/// Name of the SQLite file holding the checksum ledger and progress store.
pub const DATABASE_FILE: &str = "folio.sqlite";

/// Name of the configuration file inside the system config directory.
pub const CONFIG_FILE: &str = "config.toml";

// Linux: /home/<user>/.local/share/folio/
// OSX: /Users/<user>/Library/Application Support/folio/
pub fn system_data_dir() -> Result<PathBuf> {
    ProjectDirs::from("", "", APPLICATION)
        .map(|proj_dirs| proj_dirs.data_dir().to_path_buf())
        .context("Could not generate default system data-dir dir path")
}

// Linux: /home/<user>/.config/folio/
// OSX: /Users/<user>/Library/Preferences/folio/
pub fn system_config_dir() -> Result<PathBuf> {
    ProjectDirs::from("", "", APPLICATION)
        .map(|proj_dirs| proj_dirs.config_dir().to_path_buf())
        .context("Could not generate default system configuration dir path")
}

pub fn default_config_path() -> Result<PathBuf> {
    system_config_dir().map(|dir| dir.join(CONFIG_FILE))
}

pub fn default_database_path(data_dir: &Path) -> PathBuf {
    data_dir.join(DATABASE_FILE)
}

pub fn ensure_directory_exists(file: &Path) -> Result<(), std::io::Error> {
    if let Some(path) = file.parent() {
        if !path.exists() {
            tracing::info!(
                "Parent directory does not exist, creating recursively: {}",
                file.display()
            );
            return std::fs::create_dir_all(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn creates_missing_parent_directories() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a").join("b").join(CONFIG_FILE);

        ensure_directory_exists(&file).unwrap();

        assert!(file.parent().unwrap().is_dir());
        assert!(!file.exists());
    }

    #[test]
    fn database_lives_in_data_dir() {
        let path = default_database_path(Path::new("/srv/folio"));
        assert_eq!(path, Path::new("/srv/folio/folio.sqlite"));
    }
}
