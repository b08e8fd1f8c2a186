use crate::models::{NodeConfiguration, UserConfiguration};
use directories::BaseDirs;
use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const CONFIG_DIR_ENV: &str = "CTX_CONFIG_DIR";

const USER_CONFIG_FILENAME: &str = "user_config.json";
const NODE_CONFIG_FILENAME: &str = "node_config.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine the home directory")]
    NoHomeDir,
    #[error("Failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid configuration file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

fn home_dir() -> Result<PathBuf, ConfigError> {
    BaseDirs::new()
        .map(|dirs| dirs.home_dir().to_path_buf())
        .ok_or(ConfigError::NoHomeDir)
}

/// Host directory used for node storage when nothing else is configured.
pub fn default_storage_path() -> Result<PathBuf, ConfigError> {
    Ok(home_dir()?.join(".coretex"))
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

/// Persisted configuration: the user and node documents live side by side in
/// one directory and are read and written independently.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    dir: PathBuf,
}

impl ConfigStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `$CTX_CONFIG_DIR`, falling back to `~/.config/coretex`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let dir = match env_var(CONFIG_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => home_dir()?.join(".config").join("coretex"),
        };
        debug!("Configuration directory: {dir:?}");
        Ok(Self::new(dir))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ensure_dir(&self) -> Result<(), ConfigError> {
        fs::create_dir_all(&self.dir).map_err(|source| ConfigError::Io {
            path: self.dir.clone(),
            source,
        })
    }

    /// Loads the user document, or defaults when none was saved yet.
    /// Environment variables take precedence over stored values.
    pub fn load_user(&self) -> Result<UserConfiguration, ConfigError> {
        let mut user: UserConfiguration = self.read_json(USER_CONFIG_FILENAME)?.unwrap_or_default();

        if let Some(url) = env_var("CTX_API_URL") {
            user.server_url = url;
        }
        if let Some(username) = env_var("CTX_USERNAME") {
            user.username = Some(username);
        }
        if let Some(password) = env_var("CTX_PASSWORD") {
            user.password = Some(password);
        }
        if let Some(project_id) = env_var("CTX_PROJECT_ID").and_then(|id| id.parse().ok()) {
            user.project_id = Some(project_id);
        }
        Ok(user)
    }

    pub fn save_user(&self, user: &UserConfiguration) -> Result<(), ConfigError> {
        self.write_json(USER_CONFIG_FILENAME, user)
    }

    pub fn load_node(&self) -> Result<Option<NodeConfiguration>, ConfigError> {
        let Some(mut node) = self.read_json::<NodeConfiguration>(NODE_CONFIG_FILENAME)? else {
            return Ok(None);
        };

        if let Some(path) = env_var("CTX_STORAGE_PATH") {
            node.storage_path = PathBuf::from(path);
        }
        if let Some(token) = env_var("CTX_NODE_ACCESS_TOKEN") {
            node.node_access_token = Some(token);
        }
        Ok(Some(node))
    }

    pub fn save_node(&self, node: &NodeConfiguration) -> Result<(), ConfigError> {
        self.write_json(NODE_CONFIG_FILENAME, node)
    }

    pub fn node_config_path(&self) -> PathBuf {
        self.dir.join(NODE_CONFIG_FILENAME)
    }

    fn read_json<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, ConfigError> {
        let path = self.dir.join(name);
        if !path.exists() {
            debug!("No configuration found at {path:?}");
            return Ok(None);
        }

        let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|source| ConfigError::Parse { path, source })
    }

    /// Writes to a temporary file in the same directory and renames it over
    /// the target so readers never observe a half-written document.
    fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<(), ConfigError> {
        self.ensure_dir()?;
        let path = self.dir.join(name);
        let io_err = |source| ConfigError::Io {
            path: path.clone(),
            source,
        };

        let json = serde_json::to_string_pretty(value).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir).map_err(io_err)?;
        tmp.write_all(json.as_bytes()).map_err(io_err)?;
        tmp.persist(&path).map_err(|e| io_err(e.error))?;
        debug!("Saved configuration to {path:?}");
        Ok(())
    }
}
