use std::fs;
use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("can't locate the home directory")]
    NoHomeDir,
    #[error("can't write default configuration to {path}: {source}")]
    WriteDefault {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Config(#[from] config::ConfigError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientSettings {
    pub api_url: String,
    pub editor: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    pub filter: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Configuration {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub client: ClientSettings,
    pub log: LogSettings,
}

const ENV_PREFIX: &str = "TASKBOARD";

const DEFAULT_CONFIG: &str = r#"
[server]
host = "127.0.0.1"
port = 5019
# Origins allowed to call the API from a browser.
allowed_origins = ["http://localhost:4200"]

[database]
url = "sqlite:taskboard.db"
max_connections = 5

[client]
api_url = "http://localhost:5019/api/tasks"
editor = "vim"

[log]
# Used when RUST_LOG is not set.
filter = "taskboard=info,tower_http=info"
"#;

impl Configuration {
    /// Loads `~/.config/taskboard/taskboard.toml`, writing the defaults
    /// there first if the file doesn't exist yet.
    pub fn load() -> Result<Self, SettingsError> {
        let home_dir = dirs::home_dir().ok_or(SettingsError::NoHomeDir)?;
        let config_path = home_dir.join(".config/taskboard/taskboard.toml");

        if !config_path.exists() {
            let write_default = || -> std::io::Result<()> {
                if let Some(parent) = config_path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&config_path, DEFAULT_CONFIG.trim())
            };
            write_default().map_err(|source| SettingsError::WriteDefault {
                path: config_path.clone(),
                source,
            })?;
        }

        Self::load_from(&config_path)
    }

    /// Layers the built-in defaults, the file at `path` and `TASKBOARD_*`
    /// environment variables, in that order.
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        Self::load_layers(path, environment())
    }

    fn load_layers(path: &Path, environment: Environment) -> Result<Self, SettingsError> {
        let settings = Config::builder()
            .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
            .add_source(File::from(path).required(true))
            .add_source(environment)
            .build()?;

        Ok(settings.try_deserialize::<Configuration>()?)
    }
}

/// `TASKBOARD_SERVER__PORT=8080`, `TASKBOARD_SERVER__ALLOWED_ORIGINS=a,b`.
fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("server.allowed_origins")
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{Configuration, environment};

    #[test]
    fn test_defaults_fill_missing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taskboard.toml");
        fs::write(&path, "[server]\nport = 8080\n").unwrap();

        let cfg = Configuration::load_from(&path).unwrap();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.server.host, "127.0.0.1");
        assert_eq!(cfg.server.allowed_origins, vec!["http://localhost:4200"]);
        assert_eq!(cfg.database.url, "sqlite:taskboard.db");
        assert_eq!(cfg.client.editor, "vim");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let res = Configuration::load_from(&dir.path().join("nope.toml"));
        assert!(res.is_err());
    }

    #[test]
    fn test_wrong_type_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taskboard.toml");
        fs::write(&path, "[server]\nport = \"not a port\"\n").unwrap();
        assert!(Configuration::load_from(&path).is_err());
    }

    #[test]
    fn test_environment_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taskboard.toml");
        fs::write(&path, "[server]\nport = 8080\n\n[client]\neditor = \"nano\"\n").unwrap();

        let vars = [
            ("TASKBOARD_SERVER__PORT", "9090"),
            (
                "TASKBOARD_SERVER__ALLOWED_ORIGINS",
                "http://localhost:4200,https://tasks.example.com",
            ),
            ("TASKBOARD_DATABASE__URL", "sqlite::memory:"),
            ("OTHERAPP_SERVER__PORT", "1"),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect::<::config::Map<String, String>>();

        let cfg = Configuration::load_layers(&path, environment().source(Some(vars))).unwrap();
        assert_eq!(cfg.server.port, 9090);
        assert_eq!(
            cfg.server.allowed_origins,
            vec!["http://localhost:4200", "https://tasks.example.com"]
        );
        assert_eq!(cfg.database.url, "sqlite::memory:");
        assert_eq!(cfg.client.editor, "nano");
        assert_eq!(cfg.server.host, "127.0.0.1");
    }
}
