use crate::domain::error::{AppError, Result};
use keyring::Entry;

/// Keychain user under which sqlchat secrets are stored.
const KEYCHAIN_USER: &str = "sqlchat";

pub struct KeyringManager {
    user: String,
}

impl KeyringManager {
    pub fn new(user: &str) -> Self {
        Self {
            user: user.to_string(),
        }
    }

    pub fn get_secret(&self, key: &str) -> Result<String> {
        let entry = Entry::new(key, &self.user)
            .map_err(|e| AppError::SecurityError(format!("Failed to create entry: {}", e)))?;

        entry
            .get_password()
            .map_err(|e| AppError::SecurityError(format!("Failed to get password: {}", e)))
    }
}

impl Default for KeyringManager {
    fn default() -> Self {
        Self::new(KEYCHAIN_USER)
    }
}

/// Resolve a secret reference from configuration.
///
/// * `env:NAME` reads the environment variable `NAME`
/// * `keychain:NAME` reads the OS keychain entry `NAME`
/// * `plain:VALUE` returns `VALUE` (development only)
/// * anything else is taken literally
pub fn resolve_secret(reference: &str) -> Result<String> {
    if let Some(env_key) = reference.strip_prefix("env:") {
        std::env::var(env_key).map_err(|_| {
            AppError::ConfigError(format!(
                "Environment variable '{}' not found for secret",
                env_key
            ))
        })
    } else if let Some(key_name) = reference.strip_prefix("keychain:") {
        KeyringManager::default().get_secret(key_name)
    } else if let Some(value) = reference.strip_prefix("plain:") {
        Ok(value.to_string())
    } else {
        Ok(reference.to_string())
    }
}
