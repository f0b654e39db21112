//! Bridge configuration

use std::env;

use thiserror::Error;

/// Environment variable enabling exception marshalling
pub const ENV_MARSHAL_EXCEPTIONS: &str = "HOSTBRIDGE_MARSHAL_EXCEPTIONS";
/// Environment variable toggling the legacy verb table
pub const ENV_LEGACY_METHODS: &str = "HOSTBRIDGE_LEGACY_METHODS";
/// Environment variable overriding the `$version` property
pub const ENV_VERSION: &str = "HOSTBRIDGE_VERSION";

/// Configuration errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: expected a boolean, got {value:?}")]
    InvalidBool { var: &'static str, value: String },

    #[error("{var}: value is not valid unicode")]
    NotUnicode { var: &'static str },
}

/// Per-session bridge settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Report failed outbound calls to the host as script exceptions
    pub marshal_exceptions: bool,
    /// Register the fixed-result legacy verbs
    pub legacy_methods: bool,
    /// Value of the `$version` property
    pub version: String,
    /// Copy `id` and `name` from the host's element object
    pub expose_element_ids: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            marshal_exceptions: false,
            legacy_methods: true,
            version: format!("10,0,r{}", env!("CARGO_PKG_VERSION")),
            expose_element_ids: true,
        }
    }
}

impl BridgeConfig {
    /// Defaults, overridden by `HOSTBRIDGE_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var))
    }

    /// Defaults, overridden by whatever `lookup` returns
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Result<String, env::VarError>,
    {
        let read = |var: &'static str| match lookup(var) {
            Ok(value) => Ok(Some(value)),
            Err(env::VarError::NotPresent) => Ok(None),
            Err(env::VarError::NotUnicode(_)) => Err(ConfigError::NotUnicode { var }),
        };

        let mut config = BridgeConfig::default();
        if let Some(value) = read(ENV_MARSHAL_EXCEPTIONS)? {
            config.marshal_exceptions = parse_bool(ENV_MARSHAL_EXCEPTIONS, &value)?;
        }
        if let Some(value) = read(ENV_LEGACY_METHODS)? {
            config.legacy_methods = parse_bool(ENV_LEGACY_METHODS, &value)?;
        }
        if let Some(value) = read(ENV_VERSION)? {
            config.version = value;
        }
        Ok(config)
    }

    /// Set exception marshalling
    pub fn marshal_exceptions(mut self, enabled: bool) -> Self {
        self.marshal_exceptions = enabled;
        self
    }

    /// Set legacy verb registration
    pub fn legacy_methods(mut self, enabled: bool) -> Self {
        self.legacy_methods = enabled;
        self
    }

    /// Set the `$version` property value
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Set whether element `id`/`name` are copied into the registry
    pub fn expose_element_ids(mut self, enabled: bool) -> Self {
        self.expose_element_ids = enabled;
        self
    }
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            var,
            value: value.to_owned(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&'static str, &str)]) -> impl Fn(&'static str) -> Result<String, env::VarError> {
        let vars: HashMap<&'static str, String> =
            vars.iter().map(|(k, v)| (*k, v.to_string())).collect();
        move |var| vars.get(var).cloned().ok_or(env::VarError::NotPresent)
    }

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert!(!config.marshal_exceptions);
        assert!(config.legacy_methods);
        assert!(config.expose_element_ids);
        assert!(config.version.starts_with("10,0,r"));
    }

    #[test]
    fn test_lookup_overrides() {
        let config = BridgeConfig::from_lookup(lookup(&[
            (ENV_MARSHAL_EXCEPTIONS, "yes"),
            (ENV_LEGACY_METHODS, "0"),
            (ENV_VERSION, "11,2,r9"),
        ]))
        .unwrap();

        assert!(config.marshal_exceptions);
        assert!(!config.legacy_methods);
        assert_eq!(config.version, "11,2,r9");
    }

    #[test]
    fn test_invalid_bool() {
        let err = BridgeConfig::from_lookup(lookup(&[(ENV_LEGACY_METHODS, "maybe")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidBool {
                var: ENV_LEGACY_METHODS,
                value: "maybe".to_string()
            }
        );
    }

    #[test]
    fn test_builder() {
        let config = BridgeConfig::default()
            .marshal_exceptions(true)
            .legacy_methods(false)
            .version("1,0,r0")
            .expose_element_ids(false);

        assert!(config.marshal_exceptions);
        assert!(!config.legacy_methods);
        assert!(!config.expose_element_ids);
        assert_eq!(config.version, "1,0,r0");
    }
}
