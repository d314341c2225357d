//! Process configuration read from the environment.

use std::net::SocketAddr;

use thiserror::Error;

pub const BIND_ENV: &str = "BORROWDESK_BIND";
pub const JWT_SECRET_ENV: &str = "JWT_SECRET";

const DEFAULT_BIND: &str = "0.0.0.0:8080";
const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid BORROWDESK_BIND `{0}`: expected host:port")]
    InvalidBind(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub bind: SocketAddr,
    pub jwt_secret: String,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let raw_bind = lookup(BIND_ENV).unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = raw_bind
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidBind(raw_bind.clone()))?;

        let jwt_secret = match lookup(JWT_SECRET_ENV).filter(|s| !s.is_empty()) {
            Some(secret) => secret,
            None => {
                tracing::warn!("JWT_SECRET not set; using insecure dev default");
                DEV_JWT_SECRET.to_string()
            }
        };

        Ok(Self { bind, jwt_secret })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = ApiConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.bind, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.jwt_secret, DEV_JWT_SECRET);
    }

    #[test]
    fn values_are_read_from_the_environment() {
        let config = ApiConfig::from_lookup(lookup(&[
            (BIND_ENV, "127.0.0.1:9000"),
            (JWT_SECRET_ENV, "s3cret"),
        ]))
        .unwrap();
        assert_eq!(config.bind.port(), 9000);
        assert_eq!(config.jwt_secret, "s3cret");
    }

    #[test]
    fn invalid_bind_is_an_error() {
        let err = ApiConfig::from_lookup(lookup(&[(BIND_ENV, "localhost")])).unwrap_err();
        assert_eq!(err, ConfigError::InvalidBind("localhost".to_string()));
    }
}
