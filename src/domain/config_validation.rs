//! Configuration validation.
//!
//! Checks config fields before the server starts so a bad file fails fast
//! with the section and key named.

use std::net::SocketAddr;

use crate::domain::error::SportfundError;
use crate::ports::config_port::ConfigPort;

pub const DEFAULT_LISTEN: &str = "127.0.0.1:3000";
pub const DEFAULT_SESSION_LIFETIME: i64 = 86_400;

pub fn validate_web_config(config: &dyn ConfigPort) -> Result<(), SportfundError> {
    validate_listen(config)?;
    validate_session_lifetime(config)?;
    validate_session_secret(config)?;
    Ok(())
}

pub fn validate_database_config(config: &dyn ConfigPort) -> Result<(), SportfundError> {
    let has_sqlite = config
        .get_string("database", "sqlite_path")
        .is_some_and(|s| !s.trim().is_empty());
    let has_postgres = config
        .get_string("postgres", "connection_string")
        .is_some_and(|s| !s.trim().is_empty());
    if !has_sqlite && !has_postgres {
        return Err(SportfundError::ConfigMissing {
            section: "database".to_string(),
            key: "sqlite_path".to_string(),
        });
    }
    let pool_size = config.get_int("database", "pool_size", 4);
    if !(1..=64).contains(&pool_size) {
        return Err(SportfundError::ConfigInvalid {
            section: "database".to_string(),
            key: "pool_size".to_string(),
            reason: "pool_size must be between 1 and 64".to_string(),
        });
    }
    Ok(())
}

pub fn listen_addr(config: &dyn ConfigPort) -> Result<SocketAddr, SportfundError> {
    let raw = config
        .get_string("web", "listen")
        .unwrap_or_else(|| DEFAULT_LISTEN.to_string());
    raw.trim()
        .parse()
        .map_err(|_| SportfundError::ConfigInvalid {
            section: "web".to_string(),
            key: "listen".to_string(),
            reason: format!("'{raw}' is not a socket address"),
        })
}

fn validate_listen(config: &dyn ConfigPort) -> Result<(), SportfundError> {
    listen_addr(config).map(|_| ())
}

fn validate_session_lifetime(config: &dyn ConfigPort) -> Result<(), SportfundError> {
    let value = config.get_int("auth", "session_lifetime", DEFAULT_SESSION_LIFETIME);
    if value <= 0 {
        return Err(SportfundError::ConfigInvalid {
            section: "auth".to_string(),
            key: "session_lifetime".to_string(),
            reason: "session_lifetime must be positive".to_string(),
        });
    }
    Ok(())
}

/// The signing key is optional; when present it must be 64 bytes of hex.
fn validate_session_secret(config: &dyn ConfigPort) -> Result<(), SportfundError> {
    match config.get_string("auth", "session_secret") {
        None => Ok(()),
        Some(secret) => {
            let secret = secret.trim();
            if secret.len() == 128 && secret.chars().all(|c| c.is_ascii_hexdigit()) {
                Ok(())
            } else {
                Err(SportfundError::ConfigInvalid {
                    section: "auth".to_string(),
                    key: "session_secret".to_string(),
                    reason: "session_secret must be 128 hex characters".to_string(),
                })
            }
        }
    }
}
