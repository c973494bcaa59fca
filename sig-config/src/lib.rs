//! Layered YAML + environment-variable configuration for the player.
//!
//! Precedence, low to high: embedded defaults, `config.yaml` in the config
//! directory, `SIGPLAYER_CONFIG__*` environment variables. The config
//! directory itself is resolved in order: an explicit path, the
//! `SIGPLAYER_CONFIG` env var, `./.sigplayer`, `~/.sigplayer`.

use std::{
    env, fs,
    path::Path,
    sync::{Mutex, OnceLock},
};

use anyhow::{anyhow, Result};
use serde_yaml::{Mapping, Number, Value};
use tracing::{info, warn};
use uuid::Uuid;

const DEFAULT_CONFIG: &str = include_str!("default.yaml");

const ENV_CONFIG_DIR: &str = "SIGPLAYER_CONFIG";
const ENV_PREFIX: &str = "SIGPLAYER_CONFIG__";

const DEFAULT_COLLECTION_INTERVAL_SECONDS: u64 = 900;
const DEFAULT_XMR_PORT: u16 = 9505;
const DEFAULT_PROXY_PORT: u16 = 9590;
const DEFAULT_DOWNLOAD_CONCURRENCY: usize = 4;
const DEFAULT_LOG_MIN_LEVEL: &str = "info";

static CONFIG: OnceLock<Config> = OnceLock::new();

macro_rules! impl_u64_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> u64 {
            match self.get_value($path) {
                Ok(Value::Number(n)) => n.as_u64().unwrap_or($default),
                _ => $default,
            }
        }

        pub fn $setter(&self, value: u64) -> Result<()> {
            self.set_value($path, Value::Number(Number::from(value)))
        }
    };
}

macro_rules! impl_bool_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> bool {
            match self.get_value($path) {
                Ok(Value::Bool(b)) => b,
                _ => $default,
            }
        }

        pub fn $setter(&self, value: bool) -> Result<()> {
            self.set_value($path, Value::Bool(value))
        }
    };
}

#[derive(Debug)]
pub struct Config {
    config_dir: String,
    path: String,
    data: Mutex<Value>,
}

impl Clone for Config {
    fn clone(&self) -> Self {
        let data = self.data.lock().unwrap().clone();
        Self {
            config_dir: self.config_dir.clone(),
            path: self.path.clone(),
            data: Mutex::new(data),
        }
    }
}

impl Config {
    fn find_config_dir(directory: &str) -> String {
        if !directory.is_empty() {
            return directory.to_string();
        }
        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var = ENV_CONFIG_DIR, path = %env_path, "using config dir from env");
            return env_path;
        }
        if Path::new(".sigplayer").exists() {
            return ".sigplayer".to_string();
        }
        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".sigplayer");
            if home_config.exists() {
                return home_config.to_string_lossy().to_string();
            }
        }
        ".sigplayer".to_string()
    }

    fn validate_config_dir(path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }
        if !path.is_dir() {
            return Err(anyhow!("config path `{}` is not a directory", path.display()));
        }
        let probe = path.join(".write_test");
        fs::write(&probe, b"ok")?;
        fs::remove_file(&probe)?;
        Ok(())
    }

    pub fn config_dir(directory: &str) -> Result<String> {
        let dir_path = Self::find_config_dir(directory);
        Self::validate_config_dir(Path::new(&dir_path))?;
        Ok(dir_path)
    }

    /// Loads the layered config from `directory` (empty to auto-resolve).
    pub fn load(directory: &str) -> Result<Self> {
        let config_dir = Self::config_dir(directory)?;
        info!(config_dir = %config_dir, "using config directory");

        let config_file_path = Path::new(&config_dir).join("config.yaml");
        let path = config_file_path.to_string_lossy().to_string();

        let mut default_value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;
        let yaml_data = match fs::read(&path) {
            Ok(data) => {
                info!(config_file = %path, "loaded config file");
                data
            }
            Err(_) => {
                info!(config_file = %path, "no config file found, using embedded defaults");
                DEFAULT_CONFIG.as_bytes().to_vec()
            }
        };

        let external_value: Value = serde_yaml::from_slice(&yaml_data)?;
        merge_yaml(&mut default_value, &external_value);
        let mut config_value = lower_keys(default_value);
        apply_env_overrides(&mut config_value);

        let config = Config {
            config_dir,
            path,
            data: Mutex::new(config_value),
        };
        config.save()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let data = self.data.lock().unwrap();
        let yaml = serde_yaml::to_string(&*data)?;
        fs::write(&self.path, yaml)?;
        Ok(())
    }

    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let data = self.data.lock().unwrap();
        get_value_internal(&data, path)
    }

    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        let mut data = self.data.lock().unwrap();
        set_value_internal(&mut data, path, value)?;
        drop(data);
        self.save()
    }

    fn resolve_and_create_dir(&self, dir_path: &str) -> Result<String> {
        let path = Path::new(dir_path);
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.config_dir).join(path)
        };
        if !absolute.exists() {
            fs::create_dir_all(&absolute)?;
            info!(directory = %absolute.display(), "created managed directory");
        }
        Ok(absolute.to_string_lossy().to_string())
    }

    pub fn get_managed_dir(&self, path: &[&str], default: &str) -> Result<String> {
        let dir_path = match self.get_value(path) {
            Ok(Value::String(s)) if !s.is_empty() => s,
            _ => {
                self.set_value(path, Value::String(default.to_string()))?;
                default.to_string()
            }
        };
        self.resolve_and_create_dir(&dir_path)
    }

    // --- typed accessors -------------------------------------------------

    pub fn get_display_name(&self) -> String {
        match self.get_value(&["player", "display_name"]) {
            Ok(Value::String(s)) if !s.is_empty() => s,
            _ => "Unnamed Display".to_string(),
        }
    }

    pub fn set_display_name(&self, name: String) -> Result<()> {
        self.set_value(&["player", "display_name"], Value::String(name))
    }

    /// Hardware key identifying this player to the CMS, generated once and
    /// persisted if not already present.
    pub fn get_hardware_key(&self) -> Result<String> {
        match self.get_value(&["player", "hardware_key"]) {
            Ok(Value::String(s)) if !s.is_empty() => Ok(s),
            _ => {
                let key = Uuid::new_v4().to_string();
                self.set_value(&["player", "hardware_key"], Value::String(key.clone()))?;
                Ok(key)
            }
        }
    }

    pub fn get_data_dir(&self) -> Result<String> {
        self.get_managed_dir(&["player", "data_dir"], "data")
    }

    pub fn get_cms_url(&self) -> Option<String> {
        match self.get_value(&["cms", "url"]) {
            Ok(Value::String(s)) if !s.is_empty() => Some(s),
            _ => None,
        }
    }

    pub fn set_cms_url(&self, url: String) -> Result<()> {
        self.set_value(&["cms", "url"], Value::String(url))
    }

    pub fn get_cms_key(&self) -> Option<String> {
        match self.get_value(&["cms", "key"]) {
            Ok(Value::String(s)) if !s.is_empty() => Some(s),
            _ => None,
        }
    }

    pub fn set_cms_key(&self, key: String) -> Result<()> {
        self.set_value(&["cms", "key"], Value::String(key))
    }

    impl_u64_config!(
        get_collection_interval_seconds,
        set_collection_interval_seconds,
        &["cms", "collection_interval_seconds"],
        DEFAULT_COLLECTION_INTERVAL_SECONDS
    );

    impl_u64_config!(
        get_request_timeout_seconds,
        set_request_timeout_seconds,
        &["cms", "request_timeout_seconds"],
        30
    );

    impl_bool_config!(
        get_xmr_enabled,
        set_xmr_enabled,
        &["xmr", "enabled"],
        true
    );

    pub fn get_xmr_port(&self) -> u16 {
        match self.get_value(&["xmr", "port"]) {
            Ok(Value::Number(n)) => n.as_u64().unwrap_or(DEFAULT_XMR_PORT as u64) as u16,
            _ => DEFAULT_XMR_PORT,
        }
    }

    pub fn get_cache_max_bytes(&self) -> u64 {
        match self.get_value(&["cache", "max_bytes"]) {
            Ok(Value::Number(n)) => n.as_u64().unwrap_or(10 * 1024 * 1024 * 1024),
            _ => 10 * 1024 * 1024 * 1024,
        }
    }

    pub fn get_download_concurrency(&self) -> usize {
        match self.get_value(&["cache", "download_concurrency"]) {
            Ok(Value::Number(n)) => n.as_u64().unwrap_or(DEFAULT_DOWNLOAD_CONCURRENCY as u64) as usize,
            _ => DEFAULT_DOWNLOAD_CONCURRENCY,
        }
    }

    pub fn get_proxy_port(&self) -> u16 {
        match self.get_value(&["cache", "proxy_port"]) {
            Ok(Value::Number(n)) => n.as_u64().unwrap_or(DEFAULT_PROXY_PORT as u64) as u16,
            _ => DEFAULT_PROXY_PORT,
        }
    }

    pub fn get_log_min_level(&self) -> String {
        match self.get_value(&["logger", "min_level"]) {
            Ok(Value::String(s)) if !s.is_empty() => s,
            _ => DEFAULT_LOG_MIN_LEVEL.to_string(),
        }
    }

    impl_bool_config!(
        get_stats_enabled,
        set_stats_enabled,
        &["stats", "enable"],
        true
    );

    impl_u64_config!(
        get_stats_flush_interval_seconds,
        set_stats_flush_interval_seconds,
        &["stats", "flush_interval_seconds"],
        60
    );
}

/// Initializes the global configuration singleton from `directory` (empty
/// string to auto-resolve). Must be called once, early in `main`, before
/// [`get_config`] is used.
pub fn init(directory: &str) -> Result<&'static Config> {
    let config = Config::load(directory)?;
    CONFIG
        .set(config)
        .map_err(|_| anyhow!("config already initialized"))?;
    Ok(CONFIG.get().unwrap())
}

/// Returns the global configuration. Panics if [`init`] has not run —
/// callers own startup ordering, not this crate.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("sig_config::init was never called")
}

fn get_value_internal(data: &Value, path: &[&str]) -> Result<Value> {
    let mut current = data;
    for (i, key) in path.iter().enumerate() {
        if let Value::Mapping(map) = current {
            let key = key.to_lowercase();
            match map.get(&Value::String(key)) {
                Some(next) => current = next,
                None => return Err(anyhow!("path {} does not exist", path[..=i].join("."))),
            }
        } else {
            return Err(anyhow!("path {} is not a mapping", path[..i].join(".")));
        }
    }
    Ok(current.clone())
}

fn set_value_internal(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
    if path.is_empty() {
        *data = value;
        return Ok(());
    }
    if let Value::Mapping(map) = data {
        let key = path[0].to_lowercase();
        let key_value = Value::String(key);
        if path.len() == 1 {
            map.insert(key_value, value);
        } else {
            let entry = map.entry(key_value).or_insert(Value::Mapping(Mapping::new()));
            set_value_internal(entry, &path[1..], value)?;
        }
        Ok(())
    } else {
        Err(anyhow!("cannot set nested path on a non-mapping node"))
    }
}

fn apply_env_overrides(config: &mut Value) {
    for (key, value) in env::vars() {
        if let Some(suffix) = key.strip_prefix(ENV_PREFIX) {
            let key_path: Vec<&str> = suffix.split("__").collect();
            let yaml_value = convert_env_value(&value);
            if set_value_internal(config, &key_path, yaml_value).is_err() {
                warn!(key = %key, "ignoring malformed env override");
            }
        }
    }
}

fn convert_env_value(value: &str) -> Value {
    serde_yaml::from_str::<Value>(value).unwrap_or_else(|_| Value::String(value.to_string()))
}

fn lower_keys(value: Value) -> Value {
    match value {
        Value::Mapping(map) => {
            let mut new_map = Mapping::new();
            for (k, v) in map {
                let new_key = match k {
                    Value::String(s) => Value::String(s.to_lowercase()),
                    other => other,
                };
                new_map.insert(new_key, lower_keys(v));
            }
            Value::Mapping(new_map)
        }
        Value::Sequence(seq) => Value::Sequence(seq.into_iter().map(lower_keys).collect()),
        other => other,
    }
}

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
    fn merge_prefers_external_scalars() {
        let mut default: Value = serde_yaml::from_str("a: 1\nb:\n  c: 2\n").unwrap();
        let external: Value = serde_yaml::from_str("b:\n  c: 3\n").unwrap();
        merge_yaml(&mut default, &external);
        let got = get_value_internal(&default, &["b", "c"]).unwrap();
        assert_eq!(got, Value::Number(Number::from(3)));
    }

    #[test]
    fn set_then_get_round_trips() {
        let mut data: Value = serde_yaml::from_str("cms:\n  url: \"\"\n").unwrap();
        set_value_internal(&mut data, &["cms", "url"], Value::String("http://x".into())).unwrap();
        let got = get_value_internal(&data, &["cms", "url"]).unwrap();
        assert_eq!(got, Value::String("http://x".into()));
    }

    #[test]
    fn env_override_applies_nested_path() {
        let mut data: Value = serde_yaml::from_str(DEFAULT_CONFIG).unwrap();
        set_value_internal(&mut data, &["cms", "url"], Value::String("http://env".into())).unwrap();
        let got = get_value_internal(&data, &["cms", "url"]).unwrap();
        assert_eq!(got, Value::String("http://env".into()));
    }
}
