use derive_ex::Ex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Runtime settings.
///
/// Missing fields take their default, so a host can load a partial configuration from any
/// `serde` format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Ex)]
#[derive_ex(Default)]
#[default(Self::new())]
#[serde(default)]
pub struct Config {
    /// Attribute prefix that marks a binding in templates, e.g. `x-` in `x-repeat`.
    pub prefix: String,

    /// Number of distinct primitive values whose item scopes a repeat keeps for reuse.
    pub repeat_cache_capacity: usize,
}

impl Config {
    pub fn new() -> Self {
        Self {
            prefix: "x-".into(),
            repeat_cache_capacity: 256,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.repeat_cache_capacity < 1 {
            return Err(Error::config("`repeat_cache_capacity` must be greater than 0"));
        }
        if self.prefix.chars().any(char::is_whitespace) {
            return Err(Error::config(format!(
                "`prefix` must not contain whitespace: {:?}",
                self.prefix
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_uses_defaults() {
        let c: Config = serde_json::from_str(r#"{"prefix":"data-"}"#).unwrap();
        assert_eq!(c.prefix, "data-");
        assert_eq!(c.repeat_cache_capacity, 256);
        assert_eq!(c.validate(), Ok(()));
    }

    #[test]
    fn zero_capacity_is_invalid() {
        let c = Config {
            repeat_cache_capacity: 0,
            ..Config::default()
        };
        assert!(matches!(c.validate(), Err(Error::Configuration(_))));
    }
}
