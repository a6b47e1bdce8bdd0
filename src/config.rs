//! Namespace rule configuration.
//!
//! The rules file is a small JSON document loaded once at startup:
//!
//! ```json
//! {
//!   "defaultselector": "tier=standard",
//!   "rules": {
//!     "team-a": "tier=gpu",
//!     "team-b": "tier=batch,zone=eu-west-1a"
//!   }
//! }
//! ```
//!
//! Once loaded the configuration is never mutated; it is shared read-only
//! across all admission requests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::mutation::selector::{SelectorError, parse_selector};

/// Errors that can occur when loading the rules file
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The rules file could not be read
    #[error("failed to read rules file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The rules file is not valid JSON for [`RuleConfig`]
    #[error("failed to parse rules file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Namespace to node selector rules
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Selector applied to namespaces without an explicit rule
    #[serde(rename = "defaultselector", alias = "defaultSelector", default)]
    pub default_selector: String,

    /// Per-namespace selectors
    #[serde(default)]
    pub rules: BTreeMap<String, String>,
}

impl RuleConfig {
    /// Create a configuration from a default selector and a set of rules
    pub fn new<I, K, V>(default_selector: impl Into<String>, rules: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            default_selector: default_selector.into(),
            rules: rules
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Parse a configuration from JSON bytes
    pub fn from_slice(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }

    /// Load the configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_slice(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        info!(
            path = %path.display(),
            rules = config.rules.len(),
            default_selector = %config.default_selector,
            "Loaded namespace rules"
        );
        Ok(config)
    }

    /// Check every configured selector.
    ///
    /// Returns the entries that fail to parse, keyed by namespace. The
    /// default selector is reported under `None`. Invalid selectors are not
    /// fatal: requests that resolve to them are denied.
    pub fn validate(&self) -> Vec<(Option<&str>, SelectorError)> {
        let mut invalid = Vec::new();

        if let Err(e) = parse_selector(&self.default_selector) {
            warn!(selector = %self.default_selector, error = %e, "Invalid default selector");
            invalid.push((None, e));
        }

        for (namespace, selector) in &self.rules {
            if let Err(e) = parse_selector(selector) {
                warn!(
                    namespace = %namespace,
                    selector = %selector,
                    error = %e,
                    "Invalid selector in namespace rule"
                );
                invalid.push((Some(namespace.as_str()), e));
            }
        }

        invalid
    }
}
