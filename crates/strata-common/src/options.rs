//! Driver option parsing.
//!
//! Drivers are configured with a list of `key=value` strings, e.g.
//! `["copy=false", "overlay.mountopt=nodev"]`. Keys are case-insensitive and
//! a repeated key overrides the earlier value.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{StrataError, StrataResult};

/// Parsed driver options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DriverOptions(BTreeMap<String, String>);

impl DriverOptions {
    /// Parse a list of `key=value` strings.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::InvalidOption`] if an entry has no `=` or an
    /// empty key.
    pub fn parse<S: AsRef<str>>(options: &[S]) -> StrataResult<Self> {
        let mut map = BTreeMap::new();

        for option in options {
            let raw = option.as_ref();
            let (key, value) = raw
                .split_once('=')
                .ok_or_else(|| StrataError::InvalidOption {
                    option: raw.to_string(),
                })?;

            let key = key.trim().to_ascii_lowercase();
            if key.is_empty() {
                return Err(StrataError::InvalidOption {
                    option: raw.to_string(),
                });
            }

            map.insert(key, value.trim().to_string());
        }

        Ok(Self(map))
    }

    /// Raw value for a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(&key.to_ascii_lowercase()).map(String::as_str)
    }

    /// Boolean value for a key, or `default` when the key is absent.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::InvalidOption`] if the value is not a boolean.
    pub fn get_bool(&self, key: &str, default: bool) -> StrataResult<bool> {
        match self.get(key) {
            None => Ok(default),
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(StrataError::InvalidOption {
                    option: format!("{key}={value}"),
                }),
            },
        }
    }

    /// Number of distinct keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no options were given.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromStr for DriverOptions {
    type Err = StrataError;

    /// Parse a comma-separated option list.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').filter(|p| !p.trim().is_empty()).collect();
        Self::parse(&parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parse_key_values() {
        let opts = DriverOptions::parse(&["copy=false", " Size = 10G "]).unwrap();
        assert_eq!(opts.get("copy"), Some("false"));
        assert_eq!(opts.get("size"), Some("10G"));
        assert_eq!(opts.get("SIZE"), Some("10G"));
        assert_eq!(opts.len(), 2);
    }

    #[test]
    fn value_may_contain_equals() {
        let opts = DriverOptions::parse(&["mountopt=a=b"]).unwrap();
        assert_eq!(opts.get("mountopt"), Some("a=b"));
    }

    #[test]
    fn last_value_wins() {
        let opts = DriverOptions::parse(&["copy=true", "COPY=false"]).unwrap();
        assert_eq!(opts.get("copy"), Some("false"));
        assert_eq!(opts.len(), 1);
    }

    #[test]
    fn rejects_malformed() {
        assert!(DriverOptions::parse(&["novalue"]).is_err());
        assert!(DriverOptions::parse(&["=value"]).is_err());
    }

    #[test]
    fn bool_values() {
        let opts = DriverOptions::parse(&["a=yes", "b=0", "c=maybe"]).unwrap();
        assert!(opts.get_bool("a", false).unwrap());
        assert!(!opts.get_bool("b", true).unwrap());
        assert!(opts.get_bool("c", true).is_err());
        assert!(opts.get_bool("missing", true).unwrap());
    }

    #[test]
    fn from_comma_list() {
        let opts: DriverOptions = "copy=false,,size=1G".parse().unwrap();
        assert_eq!(opts.len(), 2);
        let empty: DriverOptions = "".parse().unwrap();
        assert!(empty.is_empty());
    }

    proptest! {
        #[test]
        fn well_formed_options_always_parse(
            key in "[a-z][a-z0-9.]{0,12}",
            value in "[a-zA-Z0-9=/]{0,16}",
        ) {
            let opts = DriverOptions::parse(&[format!("{key}={value}")]).unwrap();
            prop_assert_eq!(opts.get(&key), Some(value.as_str()));
        }

        #[test]
        fn options_without_separator_are_rejected(raw in "[a-z0-9]{1,16}") {
            prop_assert!(DriverOptions::parse(&[raw]).is_err());
        }
    }
}
