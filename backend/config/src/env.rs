//! Environment handling for config values.
//!
//! Two mechanisms:
//! - `${VAR_NAME}` references inside string values, resolved at load time
//!   (uppercase `[A-Z_][A-Z0-9_]*` names only; `$${VAR}` stays literal).
//! - `DESKFORGE_*` variables that override individual settings.

use std::collections::HashMap;

use anyhow::{bail, Result};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;
use tracing::debug;

use crate::schema::{HostConfig, LoggingConfig, ServerConfig};

pub const ENV_BIND: &str = "DESKFORGE_BIND";
pub const ENV_PORT: &str = "DESKFORGE_PORT";
pub const ENV_LOG: &str = "DESKFORGE_LOG";
pub const ENV_RUST_LOG: &str = "RUST_LOG";

/// `$${NAME}` (escaped) or `${NAME}`.
static ENV_VAR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$?\$\{([A-Z_][A-Z0-9_]*)\}").unwrap());

#[derive(Debug, thiserror::Error)]
#[error("Missing env var \"{var_name}\" referenced at config path: {config_path}")]
pub struct MissingEnvVarError {
    pub var_name: String,
    pub config_path: String,
}

/// Substitute `${VAR}` references using the process environment.
pub fn resolve_env_vars(value: &Value) -> Result<Value> {
    resolve_env_vars_with(value, &std::env::vars().collect())
}

/// Substitute `${VAR}` references using `env`.
pub fn resolve_env_vars_with(value: &Value, env: &HashMap<String, String>) -> Result<Value> {
    substitute_value(value, env, "")
}

fn substitute_value(value: &Value, env: &HashMap<String, String>, path: &str) -> Result<Value> {
    match value {
        Value::String(s) => Ok(Value::String(substitute_string(s, env, path)?)),
        Value::Array(arr) => {
            let items: Result<Vec<_>> = arr
                .iter()
                .enumerate()
                .map(|(i, v)| substitute_value(v, env, &format!("{path}[{i}]")))
                .collect();
            Ok(Value::Array(items?))
        }
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (k, v) in map {
                let child = if path.is_empty() {
                    k.clone()
                } else {
                    format!("{path}.{k}")
                };
                out.insert(k.clone(), substitute_value(v, env, &child)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

fn substitute_string(s: &str, env: &HashMap<String, String>, path: &str) -> Result<String> {
    if !s.contains('$') {
        return Ok(s.to_string());
    }

    let mut missing: Option<MissingEnvVarError> = None;
    let out = ENV_VAR_PATTERN.replace_all(s, |caps: &Captures| {
        let whole = &caps[0];
        let name = &caps[1];
        if whole.starts_with("$$") {
            return format!("${{{name}}}");
        }
        match env.get(name) {
            Some(val) if !val.is_empty() => val.clone(),
            _ => {
                missing.get_or_insert_with(|| MissingEnvVarError {
                    var_name: name.to_string(),
                    config_path: path.to_string(),
                });
                String::new()
            }
        }
    });

    if let Some(err) = missing {
        bail!(err);
    }
    Ok(out.into_owned())
}

/// Apply `DESKFORGE_*` overrides from the process environment.
pub fn apply_env_overrides(config: HostConfig) -> Result<HostConfig> {
    apply_env_overrides_with(config, &std::env::vars().collect())
}

/// Apply overrides from `env`. `DESKFORGE_LOG` wins over `RUST_LOG`.
pub fn apply_env_overrides_with(
    mut config: HostConfig,
    env: &HashMap<String, String>,
) -> Result<HostConfig> {
    let get = |key: &str| env.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

    if let Some(bind) = get(ENV_BIND) {
        debug!(bind, "Bind address overridden from environment");
        config
            .server
            .get_or_insert_with(ServerConfig::default)
            .bind_address = Some(bind.to_string());
    }

    if let Some(port) = get(ENV_PORT) {
        let Ok(port) = port.parse::<u16>() else {
            bail!("{ENV_PORT} must be a port number, got '{port}'");
        };
        debug!(port, "Port overridden from environment");
        config.server.get_or_insert_with(ServerConfig::default).port = Some(port);
    }

    if let Some(level) = get(ENV_LOG).or_else(|| get(ENV_RUST_LOG)) {
        config.logging.get_or_insert_with(LoggingConfig::default).level = Some(level.to_string());
    }

    Ok(config)
}
