use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_MEDIA_EXTENSIONS: &[&str] = &["gif", "heic", "jpeg", "jpg", "mov", "mp4", "png"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed config file {path}: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("home directory is unavailable")]
    MissingHomeDir,
}

/// Layout of the per-user state directory (`~/.smugcli`).
#[derive(Debug, Clone)]
pub struct ConfigDir {
    root: PathBuf,
}

impl ConfigDir {
    pub fn locate() -> Result<Self, ConfigError> {
        let mut root = dirs::home_dir().ok_or(ConfigError::MissingHomeDir)?;
        root.push(".smugcli");
        Ok(Self { root })
    }

    pub fn at(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.root.join("credentials.json")
    }

    pub fn defaults_path(&self) -> PathBuf {
        self.root.join("defaults.json")
    }

    pub fn ignore_path(&self) -> PathBuf {
        self.root.join("ignore")
    }

    pub fn fingerprints_path(&self, user: &str) -> PathBuf {
        self.root.join(format!("fingerprints-{user}.json"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
    pub access_token: String,
    pub token_secret: String,
}

pub fn load_credentials(dir: &ConfigDir) -> Result<Option<Credentials>, ConfigError> {
    read_json(&dir.credentials_path())
}

pub fn save_credentials(dir: &ConfigDir, credentials: &Credentials) -> Result<(), ConfigError> {
    let path = dir.credentials_path();
    let bytes = serde_json::to_vec_pretty(credentials).expect("credentials serialize");
    atomic_write_with_mode(&path, &bytes, Some(0o600))?;
    Ok(())
}

pub fn delete_credentials(dir: &ConfigDir) -> Result<bool, ConfigError> {
    match fs::remove_file(dir.credentials_path()) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err.into()),
    }
}

/// Defaults applied when the matching `sync` flags are absent; written by
/// `sync --set_defaults`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Defaults {
    pub folder_threads: usize,
    pub file_threads: usize,
    pub upload_threads: usize,
    pub media_extensions: Vec<String>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            folder_threads: 4,
            file_threads: 8,
            upload_threads: 2,
            media_extensions: DEFAULT_MEDIA_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        }
    }
}

pub fn load_defaults(dir: &ConfigDir) -> Result<Defaults, ConfigError> {
    Ok(read_json(&dir.defaults_path())?.unwrap_or_default())
}

pub fn save_defaults(dir: &ConfigDir, defaults: &Defaults) -> Result<(), ConfigError> {
    let bytes = serde_json::to_vec_pretty(defaults).expect("defaults serialize");
    atomic_write(&dir.defaults_path(), &bytes)?;
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, ConfigError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| ConfigError::Malformed {
            path: path.to_path_buf(),
            source,
        })
}

/// Writes a file atomically: the content lands in a `.partial` sibling
/// first and is renamed into place.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> io::Result<()> {
    atomic_write_with_mode(path, bytes, None)
}

fn atomic_write_with_mode(path: &Path, bytes: &[u8], mode: Option<u32>) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let partial = partial_path(path);
    fs::write(&partial, bytes)?;
    #[cfg(unix)]
    if let Some(mode) = mode {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&partial, fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    let _ = mode;
    fs::rename(partial, path)
}

fn partial_path(target: &Path) -> PathBuf {
    target.with_extension(format!(
        "{}partial",
        target
            .extension()
            .map(|ext| format!("{}.", ext.to_string_lossy()))
            .unwrap_or_default()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn credentials_round_trip() {
        let dir = tempdir().unwrap();
        let config = ConfigDir::at(dir.path().to_path_buf());
        assert!(load_credentials(&config).unwrap().is_none());

        let credentials = Credentials {
            api_key: "k".into(),
            api_secret: "s".into(),
            access_token: "t".into(),
            token_secret: "ts".into(),
        };
        save_credentials(&config, &credentials).unwrap();
        let loaded = load_credentials(&config).unwrap().unwrap();
        assert_eq!(loaded.api_key, "k");
        assert_eq!(loaded.token_secret, "ts");

        assert!(delete_credentials(&config).unwrap());
        assert!(!delete_credentials(&config).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn credentials_are_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let config = ConfigDir::at(dir.path().to_path_buf());
        save_credentials(
            &config,
            &Credentials {
                api_key: "k".into(),
                api_secret: "s".into(),
                access_token: "t".into(),
                token_secret: "ts".into(),
            },
        )
        .unwrap();
        let mode = fs::metadata(config.credentials_path())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn defaults_fall_back_when_missing() {
        let dir = tempdir().unwrap();
        let config = ConfigDir::at(dir.path().to_path_buf());
        let defaults = load_defaults(&config).unwrap();
        assert_eq!(defaults.folder_threads, 4);
        assert_eq!(defaults.file_threads, 8);
        assert_eq!(defaults.upload_threads, 2);
        assert!(defaults.media_extensions.iter().any(|e| e == "jpg"));
    }

    #[test]
    fn defaults_round_trip() {
        let dir = tempdir().unwrap();
        let config = ConfigDir::at(dir.path().to_path_buf());
        let mut defaults = Defaults::default();
        defaults.folder_threads = 2;
        save_defaults(&config, &defaults).unwrap();
        assert_eq!(load_defaults(&config).unwrap().folder_threads, 2);
    }

    #[test]
    fn partial_path_appends_suffix() {
        assert_eq!(
            partial_path(Path::new("/tmp/defaults.json")),
            PathBuf::from("/tmp/defaults.json.partial")
        );
        assert_eq!(
            partial_path(Path::new("/tmp/ignore")),
            PathBuf::from("/tmp/ignore.partial")
        );
    }
}
