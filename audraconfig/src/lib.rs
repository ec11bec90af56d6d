//! # Audra Configuration Module
//!
//! This module provides configuration management for Audra, including:
//! - Loading configuration from YAML files
//! - Merging with the embedded default configuration
//! - Environment variable overrides
//! - Typed getters and setters for configuration values
//! - Thread-safe singleton access pattern
//!
//! ## Usage
//!
//! ```no_run
//! use audraconfig::get_config;
//!
//! let config = get_config();
//! let port = config.get_http_port();
//! let instances = config.get_piped_instances()?;
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Environment overrides
//!
//! Any variable named `AUDRA_CONFIG__SECTION__KEY` overrides the value at
//! `section.key`. Values are parsed as YAML scalars, so
//! `AUDRA_CONFIG__HOST__HTTP_PORT=9000` yields a number.

use anyhow::{anyhow, Result};
use dirs::home_dir;
use lazy_static::lazy_static;
use serde_yaml::{Mapping, Number, Value};
use std::{
    env, fs,
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
};
use tracing::{info, warn};

// Configuration par défaut intégrée
const DEFAULT_CONFIG: &str = include_str!("audra.yaml");

lazy_static! {
    static ref CONFIG: Arc<Config> =
        Arc::new(Config::load_config("").expect("Failed to load Audra configuration"));
}

const ENV_CONFIG_DIR: &str = "AUDRA_CONFIG";
const ENV_PREFIX: &str = "AUDRA_CONFIG__";
const CONFIG_DIR_NAME: &str = ".audra";

// Plain variables honoured for the durable store, as deployed on R2.
const ENV_R2_ACCOUNT_ID: &str = "R2_ACCOUNT_ID";
const ENV_R2_ACCESS_KEY_ID: &str = "R2_ACCESS_KEY_ID";
const ENV_R2_SECRET_ACCESS_KEY: &str = "R2_SECRET_ACCESS_KEY";
const ENV_R2_BUCKET_NAME: &str = "R2_BUCKET_NAME";

// Default values for configuration
const DEFAULT_HTTP_PORT: u16 = 8080;
const DEFAULT_BASE_URL: &str = "localhost";
const DEFAULT_LOG_BUFFER_CAPACITY: usize = 1000;
const DEFAULT_LOG_MIN_LEVEL: &str = "INFO";
const DEFAULT_LOG_ENABLE_CONSOLE: bool = true;

const DEFAULT_RESOLVER_KIND: &str = "piped";
const DEFAULT_PIPED_TIMEOUT_SECS: u64 = 15;
const DEFAULT_PIPED_CACHE_TTL_SECS: u64 = 4 * 3600;
const DEFAULT_EXTRACTOR_PROGRAM: &str = "yt-dlp";
const DEFAULT_EXTRACTOR_URL_TEMPLATE: &str = "https://music.youtube.com/watch?v={id}";
const DEFAULT_EXTRACTOR_TIMEOUT_SECS: u64 = 20;
const DEFAULT_EXTRACTOR_CACHE_TTL_SECS: u64 = 5 * 3600;
const DEFAULT_EXTRACTOR_MAX_RENDITIONS: usize = 3;

const DEFAULT_RESOLUTION_CACHE_ENABLED: bool = true;
const DEFAULT_RESOLUTION_CACHE_MAX_ENTRIES: usize = 10_000;

const DEFAULT_STORE_KIND: &str = "s3";
const DEFAULT_STORE_BUCKET: &str = "audramusic";
const DEFAULT_STORE_REGION: &str = "auto";
const DEFAULT_STORE_PREFIX: &str = "audio";
const DEFAULT_STORE_EXTENSION: &str = "webm";
const DEFAULT_STORE_PRESIGN_TTL_SECS: u64 = 86_400;

const DEFAULT_RELAY_CHUNK_SIZE: usize = 64 * 1024;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 300;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 30;

/// Macro to generate getter/setter for usize values with default
macro_rules! impl_usize_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<usize> {
            match self.get_value($path) {
                Ok(Value::Number(n)) => Ok(n.as_u64().map(|v| v as usize).unwrap_or($default)),
                _ => Ok($default),
            }
        }

        pub fn $setter(&self, value: usize) -> Result<()> {
            self.set_value($path, Value::Number(Number::from(value)))
        }
    };
}

/// Macro to generate getter/setter for u64 values with default
macro_rules! impl_u64_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<u64> {
            match self.get_value($path) {
                Ok(Value::Number(n)) => Ok(n.as_u64().unwrap_or($default)),
                Ok(Value::String(s)) => Ok(s.trim().parse::<u64>().unwrap_or_else(|_| {
                    warn!(path = %$path.join("."), value = %s, "Invalid integer, using default");
                    $default
                })),
                _ => Ok($default),
            }
        }

        pub fn $setter(&self, value: u64) -> Result<()> {
            self.set_value($path, Value::Number(Number::from(value)))
        }
    };
}

/// Macro to generate getter/setter for bool values with default
macro_rules! impl_bool_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<bool> {
            match self.get_value($path) {
                Ok(Value::Bool(b)) => Ok(b),
                _ => Ok($default),
            }
        }

        pub fn $setter(&self, value: bool) -> Result<()> {
            self.set_value($path, Value::Bool(value))
        }
    };
}

/// Macro to generate getter/setter for string values with default
macro_rules! impl_string_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<String> {
            match self.get_value($path) {
                Ok(Value::String(s)) if !s.trim().is_empty() => Ok(s),
                _ => Ok($default.to_string()),
            }
        }

        pub fn $setter(&self, value: String) -> Result<()> {
            self.set_value($path, Value::String(value))
        }
    };
}

/// Configuration manager for Audra
///
/// The configuration is a YAML tree kept behind a mutex. Every setter
/// persists the tree to `config.yaml` in the configuration directory.
#[derive(Debug)]
pub struct Config {
    config_dir: String,
    path: String,
    data: Mutex<Value>,
}

impl Config {
    /// Finds a config directory by trying different locations in order
    fn find_config_dir(directory: &str) -> String {
        if !directory.is_empty() {
            return directory.to_string();
        }

        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var = ENV_CONFIG_DIR, path = %env_path, "Trying to load config from env");
            return env_path;
        }

        if Path::new(CONFIG_DIR_NAME).exists() {
            return CONFIG_DIR_NAME.to_string();
        }

        if let Some(home) = home_dir() {
            let home_config = home.join(CONFIG_DIR_NAME);
            if home_config.exists() {
                return home_config.to_string_lossy().to_string();
            }
        }

        CONFIG_DIR_NAME.to_string()
    }

    /// Creates the directory if needed and checks it is a writable directory
    fn validate_config_dir(path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }

        if !path.is_dir() {
            return Err(anyhow!("{} is not a directory", path.display()));
        }

        let test_file = path.join(".write_test");
        fs::write(&test_file, b"test")?;
        fs::remove_file(&test_file)?;

        Ok(())
    }

    /// Loads the configuration from the specified directory
    ///
    /// The directory is searched in the following order:
    /// 1. The provided `directory` parameter if not empty
    /// 2. The `AUDRA_CONFIG` environment variable
    /// 3. `.audra` in the current directory
    /// 4. `.audra` in the user's home directory
    ///
    /// The embedded defaults are merged with `config.yaml` when present, the
    /// merged tree is written back, then `AUDRA_CONFIG__*` overrides are
    /// applied in memory only so that secrets passed through the environment
    /// never land on disk.
    pub fn load_config(directory: &str) -> Result<Self> {
        let config_dir = Self::find_config_dir(directory);
        Self::validate_config_dir(Path::new(&config_dir))?;
        info!(config_dir = %config_dir, "Using config directory");

        let config_file_path = Path::new(&config_dir).join("config.yaml");
        let path = config_file_path.to_string_lossy().to_string();

        let mut merged: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;

        match fs::read(&path) {
            Ok(data) => {
                info!(config_file = %path, "Loaded config file");
                let external: Value = serde_yaml::from_slice(&data)?;
                merge_yaml(&mut merged, &external);
            }
            Err(_) => {
                info!(config_file = %path, "Config file not found, using default embedded config");
            }
        }

        let config = Config {
            config_dir,
            path,
            data: Mutex::new(Self::lower_keys_value(merged)),
        };
        config.save()?;

        {
            let mut data = config.data()?;
            Self::apply_env_overrides(&mut data);
        }

        Ok(config)
    }

    /// Returns the directory holding `config.yaml`
    pub fn directory(&self) -> &str {
        &self.config_dir
    }

    fn data(&self) -> Result<MutexGuard<'_, Value>> {
        self.data
            .lock()
            .map_err(|_| anyhow!("Configuration lock poisoned"))
    }

    /// Saves the current configuration to the config.yaml file
    pub fn save(&self) -> Result<()> {
        let yaml = serde_yaml::to_string(&*self.data()?)?;
        fs::write(&self.path, yaml)?;
        Ok(())
    }

    /// Sets a configuration value at the specified path and saves it
    ///
    /// # Arguments
    ///
    /// * `path` - Array of keys representing the path (e.g., `&["host", "http_port"]`)
    /// * `value` - The YAML value to set
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        {
            let mut data = self.data()?;
            Self::set_value_internal(&mut data, path, value)?;
        }
        self.save()
    }

    fn set_value_internal(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
        if path.is_empty() {
            *data = value;
            return Ok(());
        }
        if let Value::Mapping(map) = data {
            let key_value = Value::String(path[0].to_lowercase());
            if path.len() == 1 {
                map.insert(key_value, value);
            } else {
                let entry = map
                    .entry(key_value)
                    .or_insert(Value::Mapping(Mapping::new()));
                Self::set_value_internal(entry, &path[1..], value)?;
            }
            Ok(())
        } else {
            Err(anyhow!("Current node is not a map"))
        }
    }

    /// Gets a configuration value at the specified path
    ///
    /// Returns an error if the path doesn't exist.
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let data = self.data()?;
        let mut current = &*data;
        for (i, key) in path.iter().enumerate() {
            match current {
                Value::Mapping(map) => match map.get(&Value::String(key.to_lowercase())) {
                    Some(next) => current = next,
                    None => return Err(anyhow!("Path {} does not exist", path[..=i].join("."))),
                },
                _ => return Err(anyhow!("Path {} is not a mapping", path[..i].join("."))),
            }
        }
        Ok(current.clone())
    }

    fn apply_env_overrides(config: &mut Value) {
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                let key_path = stripped.split("__").collect::<Vec<_>>();
                let yaml_value = Self::convert_env_value(&value);
                if let Err(e) = Self::set_value_internal(config, &key_path, yaml_value) {
                    warn!(variable = %key, error = %e, "Ignoring environment override");
                }
            }
        }
    }

    fn convert_env_value(value: &str) -> Value {
        serde_yaml::from_str::<Value>(value).unwrap_or_else(|_| Value::String(value.to_string()))
    }

    fn lower_keys_value(value: Value) -> Value {
        match value {
            Value::Mapping(map) => {
                let mut new_map = Mapping::new();
                for (k, v) in map {
                    let key = match k {
                        Value::String(s) => Value::String(s.to_lowercase()),
                        other => other,
                    };
                    new_map.insert(key, Self::lower_keys_value(v));
                }
                Value::Mapping(new_map)
            }
            Value::Sequence(seq) => {
                Value::Sequence(seq.into_iter().map(Self::lower_keys_value).collect())
            }
            _ => value,
        }
    }

    fn get_string_list(&self, path: &[&str]) -> Result<Vec<String>> {
        match self.get_value(path)? {
            Value::Sequence(seq) => Ok(seq
                .into_iter()
                .filter_map(|v| match v {
                    Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                    _ => None,
                })
                .collect()),
            // Une seule valeur, éventuellement séparée par des virgules (override d'env)
            Value::String(s) => Ok(s
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()),
            _ => Ok(Vec::new()),
        }
    }

    /// Value from the configuration tree, or from a plain environment variable
    /// when the configured value is empty
    fn get_string_or_env(&self, path: &[&str], var: &str) -> Option<String> {
        match self.get_value(path) {
            Ok(Value::String(s)) if !s.trim().is_empty() => Some(s),
            _ => env::var(var).ok().filter(|v| !v.trim().is_empty()),
        }
    }

    // ============ Host ============

    /// Gets the host name used in the server banner
    pub fn get_base_url(&self) -> String {
        match self.get_value(&["host", "base_url"]) {
            Ok(Value::String(s)) if !s.is_empty() => s,
            _ => DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Gets the HTTP port from configuration
    ///
    /// Returns the configured HTTP port, or the default port (8080) if not
    /// configured or invalid.
    pub fn get_http_port(&self) -> u16 {
        match self.get_value(&["host", "http_port"]) {
            Ok(Value::Number(n)) => match n.as_u64().and_then(|p| u16::try_from(p).ok()) {
                Some(port) => port,
                None => {
                    warn!("HTTP port {} out of range, using default {}", n, DEFAULT_HTTP_PORT);
                    DEFAULT_HTTP_PORT
                }
            },
            Ok(Value::String(s)) => s.parse::<u16>().unwrap_or_else(|_| {
                warn!("Invalid HTTP port '{}', using default {}", s, DEFAULT_HTTP_PORT);
                DEFAULT_HTTP_PORT
            }),
            Ok(_) => {
                warn!(
                    "HTTP port not a number or string, using default {}",
                    DEFAULT_HTTP_PORT
                );
                DEFAULT_HTTP_PORT
            }
            Err(err) => {
                warn!(
                    "Failed to get HTTP port: {}, using default {}",
                    err, DEFAULT_HTTP_PORT
                );
                DEFAULT_HTTP_PORT
            }
        }
    }

    /// Sets the HTTP port in configuration
    pub fn set_http_port(&self, port: u16) -> Result<()> {
        self.set_value(&["host", "http_port"], Value::Number(Number::from(port)))
    }

    impl_usize_config!(
        get_log_cache_size,
        set_log_cache_size,
        &["host", "logger", "buffer_capacity"],
        DEFAULT_LOG_BUFFER_CAPACITY
    );

    impl_bool_config!(
        get_log_enable_console,
        set_log_enable_console,
        &["host", "logger", "enable_console"],
        DEFAULT_LOG_ENABLE_CONSOLE
    );

    impl_string_config!(
        get_log_min_level,
        set_log_min_level,
        &["host", "logger", "min_level"],
        DEFAULT_LOG_MIN_LEVEL
    );

    // ============ Resolver ============

    impl_string_config!(
        get_resolver_kind,
        set_resolver_kind,
        &["resolver", "kind"],
        DEFAULT_RESOLVER_KIND
    );

    /// Ordered list of Piped instance base URLs
    pub fn get_piped_instances(&self) -> Result<Vec<String>> {
        self.get_string_list(&["resolver", "piped", "instances"])
    }

    impl_u64_config!(
        get_piped_timeout_secs,
        set_piped_timeout_secs,
        &["resolver", "piped", "timeout_secs"],
        DEFAULT_PIPED_TIMEOUT_SECS
    );

    impl_u64_config!(
        get_piped_cache_ttl_secs,
        set_piped_cache_ttl_secs,
        &["resolver", "piped", "cache_ttl_secs"],
        DEFAULT_PIPED_CACHE_TTL_SECS
    );

    impl_string_config!(
        get_extractor_program,
        set_extractor_program,
        &["resolver", "extractor", "program"],
        DEFAULT_EXTRACTOR_PROGRAM
    );

    /// Arguments passed to the extraction tool, before the watch URL
    pub fn get_extractor_args(&self) -> Result<Vec<String>> {
        self.get_string_list(&["resolver", "extractor", "args"])
    }

    impl_string_config!(
        get_extractor_url_template,
        set_extractor_url_template,
        &["resolver", "extractor", "url_template"],
        DEFAULT_EXTRACTOR_URL_TEMPLATE
    );

    impl_u64_config!(
        get_extractor_timeout_secs,
        set_extractor_timeout_secs,
        &["resolver", "extractor", "timeout_secs"],
        DEFAULT_EXTRACTOR_TIMEOUT_SECS
    );

    impl_u64_config!(
        get_extractor_cache_ttl_secs,
        set_extractor_cache_ttl_secs,
        &["resolver", "extractor", "cache_ttl_secs"],
        DEFAULT_EXTRACTOR_CACHE_TTL_SECS
    );

    impl_usize_config!(
        get_extractor_max_renditions,
        set_extractor_max_renditions,
        &["resolver", "extractor", "max_renditions"],
        DEFAULT_EXTRACTOR_MAX_RENDITIONS
    );

    // ============ Resolution cache ============

    impl_bool_config!(
        get_resolution_cache_enabled,
        set_resolution_cache_enabled,
        &["resolution_cache", "enabled"],
        DEFAULT_RESOLUTION_CACHE_ENABLED
    );

    impl_usize_config!(
        get_resolution_cache_max_entries,
        set_resolution_cache_max_entries,
        &["resolution_cache", "max_entries"],
        DEFAULT_RESOLUTION_CACHE_MAX_ENTRIES
    );

    // ============ Durable store ============

    impl_string_config!(
        get_store_kind,
        set_store_kind,
        &["store", "kind"],
        DEFAULT_STORE_KIND
    );

    impl_string_config!(
        get_store_region,
        set_store_region,
        &["store", "region"],
        DEFAULT_STORE_REGION
    );

    impl_string_config!(
        get_store_prefix,
        set_store_prefix,
        &["store", "prefix"],
        DEFAULT_STORE_PREFIX
    );

    impl_string_config!(
        get_store_extension,
        set_store_extension,
        &["store", "extension"],
        DEFAULT_STORE_EXTENSION
    );

    impl_u64_config!(
        get_store_presign_ttl_secs,
        set_store_presign_ttl_secs,
        &["store", "presign_ttl_secs"],
        DEFAULT_STORE_PRESIGN_TTL_SECS
    );

    /// S3 endpoint; derived from `R2_ACCOUNT_ID` when not configured
    pub fn get_store_endpoint(&self) -> Option<String> {
        match self.get_value(&["store", "endpoint"]) {
            Ok(Value::String(s)) if !s.trim().is_empty() => Some(s),
            _ => env::var(ENV_R2_ACCOUNT_ID)
                .ok()
                .filter(|id| !id.trim().is_empty())
                .map(|id| format!("https://{}.r2.cloudflarestorage.com", id.trim())),
        }
    }

    /// Bucket name, falling back to `R2_BUCKET_NAME` then to `audramusic`
    pub fn get_store_bucket(&self) -> String {
        self.get_string_or_env(&["store", "bucket"], ENV_R2_BUCKET_NAME)
            .unwrap_or_else(|| DEFAULT_STORE_BUCKET.to_string())
    }

    /// Access key pair for the store
    ///
    /// Fails when either half is missing from both the configuration and the
    /// `R2_ACCESS_KEY_ID` / `R2_SECRET_ACCESS_KEY` variables.
    pub fn get_store_credentials(&self) -> Result<(String, String)> {
        let access_key = self
            .get_string_or_env(&["store", "access_key_id"], ENV_R2_ACCESS_KEY_ID)
            .ok_or_else(|| anyhow!("store.access_key_id is not configured"))?;
        let secret_key = self
            .get_string_or_env(&["store", "secret_access_key"], ENV_R2_SECRET_ACCESS_KEY)
            .ok_or_else(|| anyhow!("store.secret_access_key is not configured"))?;
        Ok((access_key, secret_key))
    }

    // ============ Delivery ============

    impl_usize_config!(
        get_relay_chunk_size,
        set_relay_chunk_size,
        &["delivery", "relay_chunk_size"],
        DEFAULT_RELAY_CHUNK_SIZE
    );

    impl_u64_config!(
        get_fetch_timeout_secs,
        set_fetch_timeout_secs,
        &["delivery", "fetch_timeout_secs"],
        DEFAULT_FETCH_TIMEOUT_SECS
    );

    impl_u64_config!(
        get_connect_timeout_secs,
        set_connect_timeout_secs,
        &["delivery", "connect_timeout_secs"],
        DEFAULT_CONNECT_TIMEOUT_SECS
    );

    impl_u64_config!(
        get_shutdown_grace_secs,
        set_shutdown_grace_secs,
        &["delivery", "shutdown_grace_secs"],
        DEFAULT_SHUTDOWN_GRACE_SECS
    );
}

/// Returns the global configuration instance
///
/// The instance is lazily loaded on first access.
///
/// # Panics
///
/// Panics on first access if the configuration directory cannot be created
/// or the YAML cannot be parsed.
pub fn get_config() -> Arc<Config> {
    CONFIG.clone()
}

/// Merges external YAML configuration into default configuration
///
/// Mappings are merged key by key; scalars and sequences from `external`
/// replace the default value.
fn merge_yaml(default: &mut Value, external: &Value) {
    match (default, external) {
        (Value::Mapping(dmap), Value::Mapping(emap)) => {
            for (k, v) in emap {
                match dmap.get_mut(k) {
                    Some(dv) => merge_yaml(dv, v),
                    None => {
                        dmap.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (d, e) => *d = e.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_replaces_scalars_and_keeps_missing_keys() {
        let mut default: Value = serde_yaml::from_str("a: 1\nb:\n  c: 2\n  d: 3\n").unwrap();
        let external: Value = serde_yaml::from_str("b:\n  c: 20\n").unwrap();

        merge_yaml(&mut default, &external);

        assert_eq!(default["a"], Value::Number(1.into()));
        assert_eq!(default["b"]["c"], Value::Number(20.into()));
        assert_eq!(default["b"]["d"], Value::Number(3.into()));
    }

    #[test]
    fn test_merge_replaces_sequences() {
        let mut default: Value = serde_yaml::from_str("list: [a, b, c]").unwrap();
        let external: Value = serde_yaml::from_str("list: [z]").unwrap();

        merge_yaml(&mut default, &external);

        assert_eq!(default["list"].as_sequence().map(|s| s.len()), Some(1));
    }

    #[test]
    fn test_lower_keys() {
        let value: Value = serde_yaml::from_str("Host:\n  HTTP_Port: 1").unwrap();
        let lowered = Config::lower_keys_value(value);
        assert_eq!(lowered["host"]["http_port"], Value::Number(1.into()));
    }

    #[test]
    fn test_env_value_conversion() {
        assert_eq!(Config::convert_env_value("42"), Value::Number(42.into()));
        assert_eq!(Config::convert_env_value("true"), Value::Bool(true));
        assert_eq!(
            Config::convert_env_value("hello"),
            Value::String("hello".to_string())
        );
    }
}
