use std::str::FromStr;
use std::time::Duration;

const DEFAULT_HTTP_ADDRESS: &str = "127.0.0.1:8000";
const DEFAULT_EVENTS_EXCHANGE: &str = "friendship.events";
const DEFAULT_STATUS_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_FRIEND_REQUEST_TTL_DAYS: u32 = 30;
pub const DEFAULT_SUGGESTIONS_LIMIT: usize = 10;
pub const MAX_SUGGESTIONS_LIMIT: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },

    #[error("{0} must be set together with {1}")]
    Incomplete(&'static str, &'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Postgres,
    Memory,
}

impl FromStr for StorageKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" => Ok(StorageKind::Postgres),
            "memory" => Ok(StorageKind::Memory),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    pub cert_file: String,
    pub key_file: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    pub pool_max_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RabbitmqConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub exchange: String,
}

/// Process configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub http_address: String,
    pub tls: Option<TlsConfig>,
    pub storage: StorageKind,
    pub postgres: PostgresConfig,
    pub status_cache_redis_url: Option<String>,
    pub status_cache_ttl: Duration,
    pub rabbitmq: Option<RabbitmqConfig>,
    pub friend_request_ttl_days: u32,
    pub suggestions_limit: usize,
}

impl Config {
    pub fn from_env() -> Result<Config, ConfigError> {
        Config::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let tls = match (var("TLS_CERT_FILE"), var("TLS_KEY_FILE")) {
            (Some(cert_file), Some(key_file)) => Some(TlsConfig { cert_file, key_file }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Incomplete("TLS_CERT_FILE", "TLS_KEY_FILE")),
            (None, Some(_)) => return Err(ConfigError::Incomplete("TLS_KEY_FILE", "TLS_CERT_FILE")),
        };

        let postgres = PostgresConfig {
            host: var("PG_HOST").unwrap_or_else(|| String::from("postgres")),
            port: parse(&var, "PG_PORT", 5432)?,
            dbname: var("PG_DBNAME").unwrap_or_else(|| String::from("postgres")),
            user: var("PG_USER").unwrap_or_else(|| String::from("postgres")),
            password: var("PG_PASSWORD").unwrap_or_default(),
            pool_max_size: parse(&var, "PG_POOL_MAX_SIZE", 100)?,
        };

        let rabbitmq = match var("RABBITMQ_CONNECTION_HOST") {
            Some(host) => Some(RabbitmqConfig {
                host,
                port: parse(&var, "RABBITMQ_CONNECTION_PORT", 5672)?,
                username: var("RABBITMQ_CONNECTION_USERNAME").unwrap_or_else(|| String::from("guest")),
                password: var("RABBITMQ_CONNECTION_PASSWORD").unwrap_or_else(|| String::from("guest")),
                exchange: var("FRIENDSHIP_EVENTS_EXCHANGE")
                    .unwrap_or_else(|| String::from(DEFAULT_EVENTS_EXCHANGE)),
            }),
            None => None,
        };

        let suggestions_limit: usize = parse(&var, "FRIEND_SUGGESTIONS_LIMIT", DEFAULT_SUGGESTIONS_LIMIT)?;
        if suggestions_limit == 0 || suggestions_limit > MAX_SUGGESTIONS_LIMIT {
            return Err(ConfigError::Invalid {
                name: "FRIEND_SUGGESTIONS_LIMIT",
                value: suggestions_limit.to_string(),
            });
        }

        Ok(Config {
            http_address: var("HTTP_SERVER_ADDRESS").unwrap_or_else(|| String::from(DEFAULT_HTTP_ADDRESS)),
            tls,
            storage: parse(&var, "FRIENDSHIP_STORAGE", StorageKind::Postgres)?,
            postgres,
            status_cache_redis_url: var("STATUS_CACHE_REDIS_URL"),
            status_cache_ttl: Duration::from_secs(parse(
                &var,
                "STATUS_CACHE_TTL_SECS",
                DEFAULT_STATUS_CACHE_TTL_SECS,
            )?),
            rabbitmq,
            friend_request_ttl_days: parse(&var, "FRIEND_REQUEST_TTL_DAYS", DEFAULT_FRIEND_REQUEST_TTL_DAYS)?,
            suggestions_limit,
        })
    }
}

fn parse<T, F>(var: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let config = config(&[]).unwrap();
        assert_eq!(config.http_address, DEFAULT_HTTP_ADDRESS);
        assert_eq!(config.storage, StorageKind::Postgres);
        assert_eq!(config.postgres.port, 5432);
        assert_eq!(config.status_cache_ttl, Duration::from_secs(300));
        assert_eq!(config.friend_request_ttl_days, 30);
        assert_eq!(config.suggestions_limit, 10);
        assert!(config.tls.is_none());
        assert!(config.rabbitmq.is_none());
        assert!(config.status_cache_redis_url.is_none());
    }

    #[test]
    fn rabbitmq_is_enabled_by_host() {
        let config = config(&[
            ("RABBITMQ_CONNECTION_HOST", "rabbitmq"),
            ("RABBITMQ_CONNECTION_PORT", "5673"),
            ("FRIENDSHIP_STORAGE", "memory"),
        ])
        .unwrap();
        let rabbitmq = config.rabbitmq.unwrap();
        assert_eq!(rabbitmq.port, 5673);
        assert_eq!(rabbitmq.username, "guest");
        assert_eq!(rabbitmq.exchange, DEFAULT_EVENTS_EXCHANGE);
        assert_eq!(config.storage, StorageKind::Memory);
    }

    #[test]
    fn invalid_values_are_reported() {
        assert!(matches!(
            config(&[("PG_PORT", "not-a-port")]),
            Err(ConfigError::Invalid { name: "PG_PORT", .. })
        ));
        assert!(matches!(
            config(&[("FRIENDSHIP_STORAGE", "tarantool")]),
            Err(ConfigError::Invalid { name: "FRIENDSHIP_STORAGE", .. })
        ));
        assert!(config(&[("FRIEND_SUGGESTIONS_LIMIT", "500")]).is_err());
        assert!(matches!(
            config(&[("TLS_CERT_FILE", "cert.pem")]),
            Err(ConfigError::Incomplete("TLS_CERT_FILE", "TLS_KEY_FILE"))
        ));
    }
}
