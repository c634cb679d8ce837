use super::schema::ServiceConfig;
use crate::error::{ConfigError, ConfigResult};
use std::path::{Path, PathBuf};

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "CONFIG_PATH";

/// File used when neither an explicit path nor `CONFIG_PATH` is given.
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

pub fn parse_yaml_file<P: AsRef<Path>>(path: P) -> ConfigResult<ServiceConfig> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;
    parse_yaml_str(&content)
}

pub fn parse_yaml_str(yaml: &str) -> ConfigResult<ServiceConfig> {
    let config: ServiceConfig = serde_yaml::from_str(yaml)?;
    Ok(config)
}

/// Pick the configuration file: explicit path, then `CONFIG_PATH`, then `config.yaml`.
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Locate, parse and validate the configuration.
pub fn load_config(explicit: Option<&Path>) -> ConfigResult<ServiceConfig> {
    let path = resolve_config_path(explicit);
    let config = parse_yaml_file(&path)?;
    super::validate_config(&config)?;
    log::info!(
        "Loaded configuration from {} ({} model(s))",
        path.display(),
        config.engines.len()
    );
    Ok(config)
}
