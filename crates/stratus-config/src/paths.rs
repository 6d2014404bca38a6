//! Config path resolution
//!
//! Precedence for every config file: explicit argument, then the file's
//! dedicated env var, then `{config_dir}/{default_name}` where the config
//! directory comes from `DIGITAL_EARTH_CONFIG_DIR` or the nearest `config/`
//! directory above the working directory.

use std::path::{Path, PathBuf};

/// Env var overriding the base config directory.
pub const CONFIG_DIR_ENV: &str = "DIGITAL_EARTH_CONFIG_DIR";

/// Absolutize a path against the current working directory.
fn absolutize(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path.clone()))
            .unwrap_or(path)
    }
}

/// Resolve the config directory using a custom env lookup.
pub fn resolve_config_dir_with(env: &dyn Fn(&str) -> Option<String>) -> PathBuf {
    if let Some(explicit) = env(CONFIG_DIR_ENV) {
        if !explicit.trim().is_empty() {
            return absolutize(PathBuf::from(explicit));
        }
    }
    if let Ok(cwd) = std::env::current_dir() {
        for candidate_root in cwd.ancestors() {
            let config_dir = candidate_root.join("config");
            if config_dir.is_dir() {
                return config_dir;
            }
        }
        return cwd.join("config");
    }
    PathBuf::from("config")
}

/// Resolve the config directory from the process environment.
pub fn resolve_config_dir() -> PathBuf {
    resolve_config_dir_with(&|name| std::env::var(name).ok())
}

/// Resolve a config file path using a custom env lookup.
pub fn resolve_config_path_with(
    explicit: Option<&Path>,
    env_var: &str,
    default_name: &str,
    env: &dyn Fn(&str) -> Option<String>,
) -> PathBuf {
    if let Some(path) = explicit {
        return absolutize(path.to_path_buf());
    }
    if let Some(from_env) = env(env_var) {
        if !from_env.trim().is_empty() {
            return absolutize(PathBuf::from(from_env));
        }
    }
    resolve_config_dir_with(env).join(default_name)
}

/// Resolve a config file path: explicit arg → env var → config-dir default.
pub fn resolve_config_path(explicit: Option<&Path>, env_var: &str, default_name: &str) -> PathBuf {
    resolve_config_path_with(explicit, env_var, default_name, &|name| {
        std::env::var(name).ok()
    })
}
