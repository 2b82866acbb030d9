//! Configuration management for Bestie using the prefer crate.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::repository::util::{is_postgres_url, validate_database_url};

/// Default database filename.
pub const DEFAULT_DATABASE_FILENAME: &str = "bestie.db";

/// Default HTTP port when neither `--port` nor `$PORT` is set.
pub const DEFAULT_PORT: u16 = 8000;

/// Default Redis URL for the job queue.
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Read an environment variable, treating empty and whitespace-only values
/// as unset.
pub fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Truthy environment flag: `1`, `true`, or `yes`, case-insensitive.
pub fn env_flag(key: &str) -> bool {
    env_nonempty(key)
        .map(|v| {
            let v = v.to_lowercase();
            v == "1" || v == "true" || v == "yes"
        })
        .unwrap_or(false)
}

/// Parse an environment variable, falling back to `default` when unset or
/// malformed.
pub fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env_nonempty(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Database filename.
    pub database_filename: String,
    /// Database URL (overrides data_dir/database_filename if set).
    /// Supports sqlite: URLs. Set via DATABASE_URL env var.
    pub database_url: Option<String>,
    /// Redis URL for the job queue.
    pub redis_url: String,
    /// HTTP listen port.
    pub port: u16,
    /// Database pool size (PostgreSQL only).
    pub db_pool_size: usize,
    /// Seconds to wait for a pooled connection.
    pub db_pool_timeout: u64,
}

impl Default for Settings {
    fn default() -> Self {
        // Falls back gracefully: platform data dir -> home dir -> current dir
        let data_dir = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bestie");

        Self {
            data_dir,
            database_filename: DEFAULT_DATABASE_FILENAME.to_string(),
            database_url: None,
            redis_url: DEFAULT_REDIS_URL.to_string(),
            port: DEFAULT_PORT,
            db_pool_size: 5,
            db_pool_timeout: 10,
        }
    }
}

impl Settings {
    /// Create settings with a custom data directory.
    #[allow(dead_code)]
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            ..Default::default()
        }
    }

    /// Get the database URL, constructing from path if not explicitly set.
    pub fn database_url(&self) -> String {
        if let Some(ref url) = self.database_url {
            url.clone()
        } else {
            let path = self.data_dir.join(&self.database_filename);
            format!("sqlite:{}", path.display())
        }
    }

    /// Check if using an explicit database URL (vs file path).
    pub fn has_database_url(&self) -> bool {
        self.database_url.is_some()
    }

    /// Check if using PostgreSQL (vs SQLite).
    #[allow(dead_code)]
    pub fn is_postgres(&self) -> bool {
        self.database_url
            .as_ref()
            .is_some_and(|url| is_postgres_url(url))
    }

    /// Get the full path to the database (for SQLite file-based databases).
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_filename)
    }

    /// Check if the database appears to be initialized.
    /// For SQLite: checks if the database file exists.
    /// For PostgreSQL: always returns true (connection errors surface later).
    pub fn database_exists(&self) -> bool {
        if self.has_database_url() {
            true
        } else {
            self.database_path().exists()
        }
    }

    /// Ensure the data directory exists.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir).map_err(|e| {
            std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to create data directory '{}': {}",
                    self.data_dir.display(),
                    e
                ),
            )
        })
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, prefer::FromValue)]
pub struct Config {
    /// Data directory path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    /// Database filename.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Redis URL for the job queue.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redis_url: Option<String>,
    /// HTTP listen port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Database pool size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_pool_size: Option<usize>,
    /// Seconds to wait for a pooled connection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_pool_timeout: Option<u64>,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    #[prefer(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    /// Automatically discovers bestie config files in standard locations.
    pub async fn load() -> Self {
        match prefer::load("bestie").await {
            Ok(pref_config) => {
                if let Some(path) = pref_config.source_path() {
                    match Self::load_from_path(path).await {
                        Ok(config) => config,
                        Err(_) => Self::default(),
                    }
                } else {
                    Self::default()
                }
            }
            Err(_) => Self::default(),
        }
    }

    /// Load configuration from a specific file path.
    /// Supports JSON, TOML, and YAML based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

        let mut config: Config = match ext {
            "toml" => {
                toml::from_str(&contents).map_err(|e| format!("Failed to parse TOML config: {}", e))?
            }
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .map_err(|e| format!("Failed to parse YAML config: {}", e))?,
            _ => serde_json::from_str(&contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e))?,
        };

        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Get the base directory for resolving relative paths.
    /// Returns the config file's parent directory if available, otherwise None.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// - Absolute paths are returned as-is
    /// - Paths starting with ~ are expanded
    /// - Relative paths are resolved relative to `base_dir`
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings.
    /// `base_dir` is used to resolve relative paths (typically config file dir or CWD).
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref data_dir) = self.data_dir {
            settings.data_dir = self.resolve_path(data_dir, base_dir);
        }
        if let Some(ref database) = self.database {
            settings.database_filename = database.clone();
        }
        if let Some(ref redis_url) = self.redis_url {
            settings.redis_url = redis_url.clone();
        }
        if let Some(port) = self.port {
            settings.port = port;
        }
        if let Some(size) = self.db_pool_size {
            settings.db_pool_size = size;
        }
        if let Some(timeout) = self.db_pool_timeout {
            settings.db_pool_timeout = timeout;
        }
    }
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
    /// Use CWD for relative paths instead of config file directory.
    pub use_cwd: bool,
    /// Data directory or database file (--data flag).
    /// Can be a directory containing bestie.db or a .db file directly.
    pub data: Option<PathBuf>,
}

/// Resolved data path information for SQLite databases.
/// Only used when DATABASE_URL is NOT set to postgres.
#[derive(Debug, Clone)]
pub struct ResolvedData {
    /// The database filename.
    pub database_filename: String,
    /// Full path to the database.
    pub database_path: PathBuf,
}

impl ResolvedData {
    /// Resolve a data path to database filename and path.
    /// - If path is a .db file, extract filename and use as path
    /// - If path is a directory, look for bestie.db inside
    pub fn from_path(path: &Path) -> Self {
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join(path)
        };

        let is_db_file = path
            .extension()
            .is_some_and(|ext| ext == "db" || ext == "sqlite" || ext == "sqlite3")
            || (path.exists() && path.is_file());

        if is_db_file {
            let database_filename = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or(DEFAULT_DATABASE_FILENAME)
                .to_string();
            Self {
                database_filename,
                database_path: path,
            }
        } else {
            let database_filename = DEFAULT_DATABASE_FILENAME.to_string();
            let database_path = path.join(&database_filename);
            Self {
                database_filename,
                database_path,
            }
        }
    }
}

/// Look for a config file next to the database.
/// Checks bestie.{ext} and config.{ext} for all formats prefer supports.
fn find_config_next_to_db(data_dir: &Path) -> Option<PathBuf> {
    let extensions = ["json", "json5", "yaml", "yml", "toml", "ini", "xml"];
    let basenames = ["bestie", "config"];

    for basename in basenames {
        for ext in extensions {
            let path = data_dir.join(format!("{}.{}", basename, ext));
            if path.exists() {
                return Some(path);
            }
        }
    }
    None
}

/// Database URL from environment, if set and valid.
struct DatabaseUrlEnv {
    url: Option<String>,
    is_postgres: bool,
}

impl DatabaseUrlEnv {
    /// Check DATABASE_URL environment variable.
    /// Panics if URL is postgres but the feature is not enabled.
    fn from_env() -> Self {
        let url = std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty());
        let is_postgres = url.as_ref().is_some_and(|u| is_postgres_url(u));

        if let Some(ref u) = url {
            if let Err(e) = validate_database_url(u) {
                panic!(
                    "{}\n\nEither:\n  \
                     - Use a build with the 'postgres' feature enabled\n  \
                     - Use a sqlite: URL instead\n  \
                     - Remove DATABASE_URL to use the default SQLite database",
                    e
                );
            }
        }

        Self { url, is_postgres }
    }
}

/// Resolve data path to a directory.
/// If path points to a .db file, returns its parent directory.
fn resolve_data_path_to_dir(path: &Path) -> PathBuf {
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };

    if path
        .extension()
        .is_some_and(|ext| ext == "db" || ext == "sqlite" || ext == "sqlite3")
    {
        path.parent().unwrap_or(Path::new(".")).to_path_buf()
    } else {
        path
    }
}

/// Load config from file sources.
async fn load_file_config(options: &LoadOptions, data_dir_override: Option<&PathBuf>) -> Config {
    // Priority 1: Explicit --config flag
    if let Some(ref config_path) = options.config_path {
        return Config::load_from_path(config_path)
            .await
            .unwrap_or_default();
    }

    // Priority 2: Config next to data dir
    if let Some(data_dir) = data_dir_override {
        if let Some(config_path) = find_config_next_to_db(data_dir) {
            tracing::debug!("Found config next to data dir: {}", config_path.display());
            return Config::load_from_path(&config_path)
                .await
                .unwrap_or_default();
        }
    }

    // Priority 3: Auto-discover via prefer
    Config::load().await
}

/// Load settings with explicit options.
/// Returns (Settings, Config) tuple.
pub async fn load_settings_with_options(options: LoadOptions) -> (Settings, Config) {
    let db_env = DatabaseUrlEnv::from_env();

    let data_dir_override = options.data.as_ref().map(|d| resolve_data_path_to_dir(d));

    // Only resolve SQLite database paths when NOT using postgres
    let resolved_data = if !db_env.is_postgres {
        options.data.as_ref().map(|d| ResolvedData::from_path(d))
    } else {
        None
    };

    let config = load_file_config(&options, data_dir_override.as_ref()).await;

    let mut settings = Settings::default();

    let base_dir = if options.use_cwd {
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    } else {
        config
            .base_dir()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    };

    config.apply_to_settings(&mut settings, &base_dir);

    // --data override takes precedence for the data dir
    if let Some(data_dir) = data_dir_override {
        settings.data_dir = data_dir;
    }

    if let Some(resolved) = resolved_data {
        settings.database_filename = resolved.database_filename;
    }

    // DATABASE_URL environment variable takes highest precedence
    if let Some(database_url) = db_env.url {
        tracing::debug!("Using DATABASE_URL from environment: {}", database_url);
        settings.database_url = Some(database_url);
    }

    if let Some(redis_url) = env_nonempty("REDIS_URL") {
        settings.redis_url = redis_url;
    }

    // $PORT wins over config; malformed values keep the current port
    settings.port = env_parse("PORT", settings.port);
    settings.db_pool_size = env_parse("DB_POOL_SIZE", settings.db_pool_size);
    settings.db_pool_timeout = env_parse("DB_POOL_TIMEOUT", settings.db_pool_timeout);

    (settings, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.port, DEFAULT_PORT);
        assert_eq!(settings.database_filename, DEFAULT_DATABASE_FILENAME);
        assert_eq!(settings.redis_url, DEFAULT_REDIS_URL);
        assert_eq!(settings.db_pool_size, 5);
    }

    #[test]
    fn test_database_url_from_path() {
        let settings = Settings::with_data_dir(PathBuf::from("/tmp/bestie-test"));
        assert_eq!(
            settings.database_url(),
            "sqlite:/tmp/bestie-test/bestie.db"
        );
        assert!(!settings.has_database_url());
    }

    #[test]
    fn test_explicit_database_url_wins() {
        let mut settings = Settings::default();
        settings.database_url = Some("sqlite:/custom/app.db".to_string());
        assert_eq!(settings.database_url(), "sqlite:/custom/app.db");
    }

    #[test]
    fn test_resolved_data_file_vs_dir() {
        let file = ResolvedData::from_path(Path::new("/data/custom.sqlite3"));
        assert_eq!(file.database_filename, "custom.sqlite3");
        assert_eq!(file.database_path, PathBuf::from("/data/custom.sqlite3"));

        let dir = ResolvedData::from_path(Path::new("/data/bestie"));
        assert_eq!(dir.database_filename, DEFAULT_DATABASE_FILENAME);
        assert_eq!(dir.database_path, PathBuf::from("/data/bestie/bestie.db"));
    }

    #[test]
    fn test_config_applies_to_settings() {
        let config = Config {
            data_dir: Some("/srv/bestie".to_string()),
            database: Some("prod.db".to_string()),
            port: Some(9000),
            ..Config::default()
        };
        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings, Path::new("/"));
        assert_eq!(settings.data_dir, PathBuf::from("/srv/bestie"));
        assert_eq!(settings.database_filename, "prod.db");
        assert_eq!(settings.port, 9000);
    }

    #[test]
    fn test_resolve_path_relative_and_absolute() {
        let config = Config::default();
        assert_eq!(
            config.resolve_path("/abs/path", Path::new("/base")),
            PathBuf::from("/abs/path")
        );
        assert_eq!(
            config.resolve_path("rel/path", Path::new("/base")),
            PathBuf::from("/base/rel/path")
        );
    }
}
