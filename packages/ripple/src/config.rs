//! Engine configuration.

use serde::Deserialize;

/// Configuration for an engine.
///
/// Deserializable so applications can embed it in their own config files:
///
/// ```ignore
/// #[derive(Deserialize)]
/// struct AppConfig {
///     cart_engine: ripple::EngineConfig,
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Identity key used in logs and listener calls.
    ///
    /// `EngineBuilder::with_key` takes precedence. When neither is set the key
    /// is derived from the reducer's type name.
    pub key: Option<String>,
}

impl EngineConfig {
    /// Create a config with a specific identity key.
    pub fn with_key(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        assert_eq!(EngineConfig::default().key, None);
    }

    #[test]
    fn test_deserialize() {
        let config: EngineConfig = serde_json::from_str(r#"{ "key": "cart" }"#).unwrap();
        assert_eq!(config, EngineConfig::with_key("cart"));

        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
    }
}
