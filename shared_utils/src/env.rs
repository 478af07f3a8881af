use thiserror::Error;

/// An environment variable required by the application is not set.
#[derive(Debug, Error)]
#[error("Missing environment variable: {0}")]
pub struct MissingEnvVarError(pub String);

/// Reads an environment variable, returning a structured error if it's missing
/// or blank.
///
/// # Arguments
/// * `name` - The name of the environment variable to read.
pub fn get_env_var(name: &str) -> Result<String, MissingEnvVarError> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(MissingEnvVarError(name.to_string())),
    }
}

/// Reads an optional environment variable. Blank values count as unset.
pub fn get_env_var_opt(name: &str) -> Option<String> {
    get_env_var(name).ok()
}
