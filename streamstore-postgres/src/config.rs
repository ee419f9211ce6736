use std::env;
use std::num::NonZeroU32;
use std::time::Duration;

use nutype::nutype;

use crate::PostgresPersistenceError;

/// Environment variable overriding [`PostgresConfig::max_connections`].
pub const MAX_CONNECTIONS_VAR: &str = "STREAMSTORE_PG_MAX_CONNECTIONS";
/// Environment variable overriding [`PostgresConfig::acquire_timeout`], in seconds.
pub const ACQUIRE_TIMEOUT_VAR: &str = "STREAMSTORE_PG_ACQUIRE_TIMEOUT_SECS";
/// Environment variable overriding [`PostgresConfig::idle_timeout`], in seconds.
pub const IDLE_TIMEOUT_VAR: &str = "STREAMSTORE_PG_IDLE_TIMEOUT_SECS";

/// Maximum number of database connections in the pool.
///
/// MaxConnections represents the connection pool size limit. It must be at least 1,
/// enforced by using NonZeroU32 as the underlying type.
///
/// # Examples
///
/// ```ignore
/// use streamstore_postgres::MaxConnections;
/// use std::num::NonZeroU32;
///
/// let small_pool = MaxConnections::new(NonZeroU32::new(5).expect("5 is non-zero"));
/// let large_pool = MaxConnections::new(NonZeroU32::new(50).expect("50 is non-zero"));
/// ```
#[nutype(derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRef, Into))]
pub struct MaxConnections(NonZeroU32);

/// Configuration for the PostgresPersistence connection pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostgresConfig {
    /// Maximum number of connections in the pool (default: 10)
    pub max_connections: MaxConnections,
    /// Timeout for acquiring a connection from the pool (default: 30 seconds)
    pub acquire_timeout: Duration,
    /// Idle timeout for connections in the pool (default: 10 minutes)
    pub idle_timeout: Duration,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        const DEFAULT_MAX_CONNECTIONS: NonZeroU32 = match NonZeroU32::new(10) {
            Some(v) => v,
            None => unreachable!(),
        };

        Self {
            max_connections: MaxConnections::new(DEFAULT_MAX_CONNECTIONS),
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600), // 10 minutes
        }
    }
}

impl PostgresConfig {
    /// Builds a configuration from the `STREAMSTORE_PG_*` environment variables,
    /// falling back to the defaults for unset ones.
    ///
    /// # Errors
    ///
    /// `PostgresPersistenceError::InvalidConfig` when a variable is set but not a
    /// valid value (zero connections or a non-numeric duration).
    pub fn from_env() -> Result<Self, PostgresPersistenceError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup<L>(lookup: L) -> Result<Self, PostgresPersistenceError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let max_connections = match lookup(MAX_CONNECTIONS_VAR) {
            Some(raw) => raw
                .trim()
                .parse::<NonZeroU32>()
                .map(MaxConnections::new)
                .map_err(|_| invalid(MAX_CONNECTIONS_VAR, raw))?,
            None => defaults.max_connections,
        };

        Ok(Self {
            max_connections,
            acquire_timeout: seconds(&lookup, ACQUIRE_TIMEOUT_VAR)?
                .unwrap_or(defaults.acquire_timeout),
            idle_timeout: seconds(&lookup, IDLE_TIMEOUT_VAR)?.unwrap_or(defaults.idle_timeout),
        })
    }
}

fn seconds<L>(lookup: &L, variable: &'static str) -> Result<Option<Duration>, PostgresPersistenceError>
where
    L: Fn(&str) -> Option<String>,
{
    lookup(variable)
        .map(|raw| {
            raw.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| invalid(variable, raw))
        })
        .transpose()
}

fn invalid(variable: &'static str, value: String) -> PostgresPersistenceError {
    PostgresPersistenceError::InvalidConfig { variable, value }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = PostgresConfig::default();

        assert_eq!(u32::from(NonZeroU32::from(config.max_connections)), 10);
        assert_eq!(config.acquire_timeout, Duration::from_secs(30));
        assert_eq!(config.idle_timeout, Duration::from_secs(600));
    }

    #[test]
    fn unset_variables_fall_back_to_defaults() {
        let config = PostgresConfig::from_lookup(lookup_from(&[])).unwrap();

        assert_eq!(config, PostgresConfig::default());
    }

    #[test]
    fn set_variables_override_defaults() {
        let config = PostgresConfig::from_lookup(lookup_from(&[
            (MAX_CONNECTIONS_VAR, "25"),
            (ACQUIRE_TIMEOUT_VAR, " 5 "),
            (IDLE_TIMEOUT_VAR, "60"),
        ]))
        .unwrap();

        assert_eq!(u32::from(NonZeroU32::from(config.max_connections)), 25);
        assert_eq!(config.acquire_timeout, Duration::from_secs(5));
        assert_eq!(config.idle_timeout, Duration::from_secs(60));
    }

    #[test]
    fn zero_connections_are_rejected() {
        let error = PostgresConfig::from_lookup(lookup_from(&[(MAX_CONNECTIONS_VAR, "0")]))
            .unwrap_err();

        insta::assert_snapshot!(error.to_string(), @r#"invalid value "0" for STREAMSTORE_PG_MAX_CONNECTIONS"#);
    }

    #[test]
    fn non_numeric_timeout_is_rejected() {
        let error = PostgresConfig::from_lookup(lookup_from(&[(IDLE_TIMEOUT_VAR, "ten")]))
            .unwrap_err();

        assert!(matches!(
            error,
            PostgresPersistenceError::InvalidConfig { variable, .. } if variable == IDLE_TIMEOUT_VAR
        ));
    }
}
