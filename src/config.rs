//! Configuration for building the production client

use std::time::Duration;

use crate::{Error, Result};

/// Default connection timeout for the API server connection
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for API server responses
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

pub const ENV_CONNECT_TIMEOUT: &str = "OBJECT_CLIENT_CONNECT_TIMEOUT_SECS";
pub const ENV_READ_TIMEOUT: &str = "OBJECT_CLIENT_READ_TIMEOUT_SECS";

/// Overrides applied on top of the inferred kube config
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Read overrides from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read overrides through `lookup`, falling back to defaults for unset keys
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(secs) = lookup(ENV_CONNECT_TIMEOUT) {
            config.connect_timeout = parse_secs(ENV_CONNECT_TIMEOUT, &secs)?;
        }
        if let Some(secs) = lookup(ENV_READ_TIMEOUT) {
            config.read_timeout = parse_secs(ENV_READ_TIMEOUT, &secs)?;
        }

        Ok(config)
    }

    /// Apply the overrides to a kube config
    pub fn apply(&self, config: &mut kube::Config) {
        config.connect_timeout = Some(self.connect_timeout);
        config.read_timeout = Some(self.read_timeout);
    }
}

fn parse_secs(key: &str, value: &str) -> Result<Duration> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| Error::Config(format!("{} must be a whole number of seconds: {}", key, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn unset_environment_uses_defaults() {
        let config = ClientConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            (ENV_CONNECT_TIMEOUT, "2"),
            (ENV_READ_TIMEOUT, " 90 "),
        ]))
        .unwrap();

        assert_eq!(config.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.read_timeout, Duration::from_secs(90));
    }

    #[test]
    fn non_numeric_timeout_is_rejected() {
        let err = ClientConfig::from_lookup(lookup_from(&[(ENV_READ_TIMEOUT, "soon")]))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains(ENV_READ_TIMEOUT));
    }

    #[test]
    fn apply_overrides_kube_config() {
        let mut kube_config = kube::Config::new("https://127.0.0.1:6443".parse().unwrap());
        let config = ClientConfig {
            connect_timeout: Duration::from_secs(1),
            read_timeout: Duration::from_secs(7),
        };

        config.apply(&mut kube_config);

        assert_eq!(kube_config.connect_timeout, Some(Duration::from_secs(1)));
        assert_eq!(kube_config.read_timeout, Some(Duration::from_secs(7)));
        // Namespaces always come from the key or object, never the config
        assert_eq!(kube_config.default_namespace, "default");
    }
}
