//! Named configuration variables and `${name}` substitution.

use crate::errors::ConfigurationError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Prefix of environment variables read by [`Variables::from_env`].
pub const ENV_PREFIX: &str = "TIDEMARK_VAR_";

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_.]*)\}").unwrap_or_else(|e| unreachable!("static pattern: {e}"))
    })
}

/// A named string map resolved at run start.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Variables(BTreeMap<String, String>);

impl Variables {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a variable.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    /// Sets a variable, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// Returns a variable's value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Returns true if no variables are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Overlays another set; its values win.
    pub fn extend(&mut self, other: Self) {
        self.0.extend(other.0);
    }

    /// Collects `TIDEMARK_VAR_<NAME>` environment variables.
    ///
    /// Names are lowercased, so `TIDEMARK_VAR_SOURCE` sets `source`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_pairs(std::env::vars())
    }

    fn from_pairs(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        Self(
            pairs
                .into_iter()
                .filter_map(|(key, value)| {
                    key.strip_prefix(ENV_PREFIX)
                        .filter(|name| !name.is_empty())
                        .map(|name| (name.to_ascii_lowercase(), value))
                })
                .collect(),
        )
    }

    /// Parses a `name=value` assignment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` when there is no `=` or the name is empty.
    pub fn parse_assignment(text: &str) -> Result<(String, String), ConfigurationError> {
        match text.split_once('=') {
            Some((name, value)) if !name.trim().is_empty() => Ok((name.trim().to_string(), value.to_string())),
            _ => Err(ConfigurationError::new(format!(
                "invalid variable assignment '{text}', expected name=value"
            ))),
        }
    }

    /// Replaces every `${name}` in `text`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` naming the first unresolved variable;
    /// `context` says where the text came from.
    pub fn substitute(&self, text: &str, context: &str) -> Result<String, ConfigurationError> {
        if let Some(missing) = placeholder()
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .find(|name| !self.0.contains_key(name.as_str()))
        {
            return Err(ConfigurationError::unresolved_variable(missing.as_str(), context));
        }
        Ok(placeholder()
            .replace_all(text, |caps: &regex::Captures<'_>| {
                self.0.get(&caps[1]).cloned().unwrap_or_default()
            })
            .into_owned())
    }
}
