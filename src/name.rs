//! Cursor name generation.

use crate::config::CursorConfig;
use rand::Rng;
use rand::distr::Alphanumeric;

/// An opaque server-side cursor identifier.
///
/// Always a plain unquoted identifier: a letter or underscore followed by
/// ASCII alphanumerics and underscores.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CursorName(String);

impl CursorName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CursorName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CursorName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Produces `<prefix><random alphanumeric suffix>` names.
#[derive(Debug, Clone)]
pub struct CursorNameGenerator {
    prefix: String,
    suffix_len: usize,
}

impl CursorNameGenerator {
    /// Build a generator from an already validated config.
    pub fn new(config: &CursorConfig) -> Self {
        Self {
            prefix: config.name_prefix.clone(),
            suffix_len: config.name_suffix_len,
        }
    }

    pub fn new_name(&self) -> CursorName {
        let suffix: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(self.suffix_len)
            .map(char::from)
            .collect();
        CursorName(format!("{}{}", self.prefix, suffix))
    }
}

impl Default for CursorNameGenerator {
    fn default() -> Self {
        Self::new(&CursorConfig::default())
    }
}
