//! Runtime configuration.
//!
//! Values come from `POLYSTORE_*` environment variables, after an optional `.env` file
//! in the working directory has been loaded. Connection strings are kept opaque.

use std::sync::OnceLock;
use std::time::Duration;

pub const ENV_SQL_DSN: &str = "POLYSTORE_SQL_DSN";
pub const ENV_DOCUMENT_URI: &str = "POLYSTORE_DOCUMENT_URI";
pub const ENV_CACHE_URI: &str = "POLYSTORE_CACHE_URI";
pub const ENV_SEARCH_URI: &str = "POLYSTORE_SEARCH_URI";
pub const ENV_SQL_MAX_CONNECTIONS: &str = "POLYSTORE_SQL_MAX_CONNECTIONS";
pub const ENV_CACHE_TTL_SECS: &str = "POLYSTORE_CACHE_TTL_SECS";

pub const DEFAULT_SQL_MAX_CONNECTIONS: u32 = 10;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid value `{value}` for {var}")]
    InvalidValue { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configurables {
    pub sql_dsn: Option<String>,
    pub document_uri: Option<String>,
    pub cache_uri: Option<String>,
    pub search_uri: Option<String>,
    pub sql_max_connections: u32,
    /// Applied to cache entries stored without an explicit TTL. `None` keeps them forever.
    pub cache_default_ttl: Option<Duration>,
}

impl Default for Configurables {
    fn default() -> Self {
        Self {
            sql_dsn: None,
            document_uri: None,
            cache_uri: None,
            search_uri: None,
            sql_max_connections: DEFAULT_SQL_MAX_CONNECTIONS,
            cache_default_ttl: None,
        }
    }
}

impl Configurables {
    /// Loads `.env` (if any) and reads the process environment.
    pub fn from_env() -> Result<Self, Error> {
        dotenv::dotenv().ok();
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Reads every setting through `lookup`. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let mut config = Self {
            sql_dsn: get(ENV_SQL_DSN),
            document_uri: get(ENV_DOCUMENT_URI),
            cache_uri: get(ENV_CACHE_URI),
            search_uri: get(ENV_SEARCH_URI),
            ..Self::default()
        };

        if let Some(v) = get(ENV_SQL_MAX_CONNECTIONS) {
            config.sql_max_connections = parse(ENV_SQL_MAX_CONNECTIONS, &v)?;
            if config.sql_max_connections == 0 {
                return Err(Error::InvalidValue {
                    var: ENV_SQL_MAX_CONNECTIONS,
                    value: v,
                });
            }
        }

        if let Some(v) = get(ENV_CACHE_TTL_SECS) {
            let secs: u64 = parse(ENV_CACHE_TTL_SECS, &v)?;
            config.cache_default_ttl = (secs > 0).then(|| Duration::from_secs(secs));
        }

        Ok(config)
    }
}

fn parse<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, Error> {
    value.trim().parse().map_err(|_| Error::InvalidValue {
        var,
        value: value.to_owned(),
    })
}

static CONFIGURABLES: OnceLock<Configurables> = OnceLock::new();

/// Process-wide configuration, read on first access.
///
/// Invalid values are reported once through `log` and replaced by defaults.
pub fn configurables() -> &'static Configurables {
    CONFIGURABLES.get_or_init(|| {
        Configurables::from_env().unwrap_or_else(|e| {
            log::error!("unable to load configuration :: {e}");
            Configurables::default()
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| vars.get(k).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = Configurables::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Configurables::default());
    }

    #[test]
    fn reads_every_setting() {
        let config = Configurables::from_lookup(lookup(&[
            (ENV_SQL_DSN, "postgres://localhost/app"),
            (ENV_DOCUMENT_URI, "mongodb://localhost"),
            (ENV_CACHE_URI, "redis://localhost"),
            (ENV_SEARCH_URI, " "),
            (ENV_SQL_MAX_CONNECTIONS, "4"),
            (ENV_CACHE_TTL_SECS, "300"),
        ]))
        .unwrap();

        assert_eq!(config.sql_dsn.as_deref(), Some("postgres://localhost/app"));
        assert_eq!(config.document_uri.as_deref(), Some("mongodb://localhost"));
        assert_eq!(config.cache_uri.as_deref(), Some("redis://localhost"));
        assert_eq!(config.search_uri, None);
        assert_eq!(config.sql_max_connections, 4);
        assert_eq!(config.cache_default_ttl, Some(Duration::from_secs(300)));
    }

    #[test]
    fn rejects_bad_numbers() {
        assert!(matches!(
            Configurables::from_lookup(lookup(&[(ENV_SQL_MAX_CONNECTIONS, "many")])),
            Err(Error::InvalidValue { .. })
        ));
        assert!(matches!(
            Configurables::from_lookup(lookup(&[(ENV_SQL_MAX_CONNECTIONS, "0")])),
            Err(Error::InvalidValue { .. })
        ));
        assert!(matches!(
            Configurables::from_lookup(lookup(&[(ENV_CACHE_TTL_SECS, "-5")])),
            Err(Error::InvalidValue { .. })
        ));
    }

    #[test]
    fn zero_ttl_means_no_expiry() {
        let config = Configurables::from_lookup(lookup(&[(ENV_CACHE_TTL_SECS, "0")])).unwrap();
        assert_eq!(config.cache_default_ttl, None);
    }
}
