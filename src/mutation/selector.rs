//! Selector lookup and parsing.
//!
//! Selectors use the Kubernetes equality-based label selector syntax
//! restricted to `key=value` terms separated by commas, e.g.
//! `tier=gpu,topology.kubernetes.io/zone=eu-west-1a`. Keys and values follow
//! the label syntax rules so the resulting map is always a valid
//! `spec.nodeSelector`.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::config::RuleConfig;

/// Maximum length of a label name or value
pub const MAX_LABEL_LENGTH: usize = 63;

/// Maximum length of a label key prefix (DNS subdomain)
pub const MAX_PREFIX_LENGTH: usize = 253;

/// Node selector labels produced from a selector string
pub type Labels = BTreeMap<String, String>;

/// Errors produced while parsing a selector string
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectorError {
    /// A term is not of the form `key=value`
    #[error("invalid selector term {term:?}: expected key=value")]
    MalformedTerm { term: String },

    /// The key of a term is not a valid label key
    #[error("invalid label key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    /// The value of a term is not a valid label value
    #[error("invalid label value {value:?} for key {key:?}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    /// The same key appears twice with different values
    #[error("conflicting values for label key {key:?}")]
    ConflictingKey { key: String },
}

/// Find the selector for a namespace, falling back to the default selector
pub fn resolve<'a>(namespace: &str, config: &'a RuleConfig) -> &'a str {
    config
        .rules
        .get(namespace)
        .map_or(config.default_selector.as_str(), String::as_str)
}

/// Parse a selector string into a label map.
///
/// An empty selector yields an empty map.
pub fn parse_selector(selector: &str) -> Result<Labels, SelectorError> {
    let mut labels = Labels::new();
    if selector.is_empty() {
        return Ok(labels);
    }

    for term in selector.split(',') {
        let (key, value) = match term.split_once('=') {
            Some((key, value)) if !value.contains('=') => (key.trim(), value.trim()),
            _ => {
                return Err(SelectorError::MalformedTerm {
                    term: term.to_string(),
                });
            }
        };

        validate_key(key)?;
        validate_value(key, value)?;

        match labels.entry(key.to_string()) {
            Entry::Vacant(entry) => {
                entry.insert(value.to_string());
            }
            Entry::Occupied(entry) if entry.get() == value => {}
            Entry::Occupied(_) => {
                return Err(SelectorError::ConflictingKey {
                    key: key.to_string(),
                });
            }
        }
    }

    Ok(labels)
}

/// Check if a string is a valid label name (the part of a key after the prefix)
fn is_qualified_name(name: &str) -> bool {
    // Pattern: ^([A-Za-z0-9][-A-Za-z0-9_.]*)?[A-Za-z0-9]$
    static NAME_RE: LazyLock<Option<Regex>> =
        LazyLock::new(|| Regex::new(r"^([A-Za-z0-9][-A-Za-z0-9_.]*)?[A-Za-z0-9]$").ok());
    NAME_RE.as_ref().is_some_and(|re| re.is_match(name))
}

/// Check if a string is a valid DNS-1123 subdomain
fn is_dns_subdomain(prefix: &str) -> bool {
    static SUBDOMAIN_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
        Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$").ok()
    });
    SUBDOMAIN_RE.as_ref().is_some_and(|re| re.is_match(prefix))
}

fn invalid_key(key: &str, reason: impl Into<String>) -> SelectorError {
    SelectorError::InvalidKey {
        key: key.to_string(),
        reason: reason.into(),
    }
}

/// Validate a label key of the form `[prefix/]name`
fn validate_key(key: &str) -> Result<(), SelectorError> {
    let name = match key.split_once('/') {
        None => key,
        Some((prefix, name)) => {
            if prefix.is_empty() {
                return Err(invalid_key(key, "prefix part must be non-empty"));
            }
            if prefix.len() > MAX_PREFIX_LENGTH {
                return Err(invalid_key(
                    key,
                    format!("prefix part must be no more than {MAX_PREFIX_LENGTH} characters"),
                ));
            }
            if !is_dns_subdomain(prefix) {
                return Err(invalid_key(
                    key,
                    "prefix part must be a lowercase DNS subdomain",
                ));
            }
            name
        }
    };

    if name.is_empty() {
        return Err(invalid_key(key, "name part must be non-empty"));
    }
    if name.len() > MAX_LABEL_LENGTH {
        return Err(invalid_key(
            key,
            format!("name part must be no more than {MAX_LABEL_LENGTH} characters"),
        ));
    }
    if !is_qualified_name(name) {
        return Err(invalid_key(
            key,
            "name part must consist of alphanumeric characters, '-', '_' or '.', \
             and must start and end with an alphanumeric character",
        ));
    }
    Ok(())
}

/// Validate a label value; empty values are allowed
fn validate_value(key: &str, value: &str) -> Result<(), SelectorError> {
    let reason = if value.len() > MAX_LABEL_LENGTH {
        format!("must be no more than {MAX_LABEL_LENGTH} characters")
    } else if !value.is_empty() && !is_qualified_name(value) {
        "must consist of alphanumeric characters, '-', '_' or '.', \
         and must start and end with an alphanumeric character"
            .to_string()
    } else {
        return Ok(());
    };

    Err(SelectorError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason,
    })
}
