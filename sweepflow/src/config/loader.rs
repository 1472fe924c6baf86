//! Configuration YAML parsing with environment variable substitution.

use super::SweepflowConfig;
use crate::errors::ConfigError;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;

#[allow(clippy::expect_used)]
fn env_var_re() -> &'static Regex {
    static ENV_VAR_RE: OnceLock<Regex> = OnceLock::new();
    ENV_VAR_RE.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var regex")
    })
}

/// Substitute `${VAR_NAME}` patterns with environment variable values.
///
/// # Errors
///
/// Returns [`ConfigError::MissingEnvVars`] naming every unset variable.
pub fn substitute_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut missing = Vec::new();
    let result = env_var_re().replace_all(input, |caps: &regex::Captures<'_>| {
        std::env::var(&caps[1]).unwrap_or_else(|_| {
            missing.push(caps[1].to_string());
            String::new()
        })
    });

    if !missing.is_empty() {
        missing.sort_unstable();
        missing.dedup();
        return Err(ConfigError::MissingEnvVars(missing));
    }
    Ok(result.into_owned())
}

/// Parse and validate a configuration string.
///
/// # Errors
///
/// Returns an error if substitution fails, the YAML is invalid, or
/// validation rejects the result.
pub fn parse_config_str(yaml: &str) -> Result<SweepflowConfig, ConfigError> {
    let substituted = substitute_env_vars(yaml)?;
    let config: SweepflowConfig = serde_yaml::from_str(&substituted)?;
    config.validate()?;
    Ok(config)
}

/// Load, parse and validate a configuration file.
///
/// Relative `scripts_dir` and `status_log` paths are resolved against the
/// directory containing the file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or its contents are invalid.
pub fn load_config(path: &Path) -> Result<SweepflowConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut config = parse_config_str(&content)?;

    if let Some(base) = path.parent() {
        if config.scripts_dir.is_relative() {
            config.scripts_dir = base.join(&config.scripts_dir);
        }
        if let Some(log) = config.status_log.as_mut() {
            if log.is_relative() {
                *log = base.join(&*log);
            }
        }
    }

    debug!(
        path = %path.display(),
        scripts_dir = %config.scripts_dir.display(),
        "Loaded configuration"
    );
    Ok(config)
}
