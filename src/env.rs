//! Environment variable substitution for configuration files
//!
//! Values such as credentials are usually kept out of the YAML file and
//! referenced as `${VAR_NAME}` instead.

use std::collections::BTreeSet;
use std::env;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::config::ConfigError;

/// Matches `${VAR_NAME}` references
static ENV_VAR_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("env var pattern is a valid regex")
});

/// Replace every `${VAR_NAME}` in `input` with the variable's value.
///
/// Fails with a single error naming every unset variable.
///
/// # Examples
///
/// ```ignore
/// use us3_adapter::env::substitute_env_vars;
///
/// std::env::set_var("US3_SECRET", "secret_value");
/// let result = substitute_env_vars("credential: hmac:ak:${US3_SECRET}").unwrap();
/// assert_eq!(result, "credential: hmac:ak:secret_value");
/// ```
pub fn substitute_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut missing = BTreeSet::new();

    let output = ENV_VAR_PATTERN.replace_all(input, |caps: &Captures| {
        let name = &caps[1];
        env::var(name).unwrap_or_else(|_| {
            missing.insert(name.to_string());
            String::new()
        })
    });

    if !missing.is_empty() {
        return Err(ConfigError::ValidationError(format!(
            "Missing environment variables: {}",
            missing.into_iter().collect::<Vec<_>>().join(", ")
        )));
    }

    Ok(output.into_owned())
}
