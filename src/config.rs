//! Cursor configuration.
//!
//! Read from the `[cursor]` table of `pgcursors.toml`:
//!
//! ```toml
//! [cursor]
//! batch_size = 500
//! name_prefix = "cursor_"
//! name_suffix_len = 16
//! ```

use crate::error::{CursorError, CursorResult};
use serde::Deserialize;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

/// Longest identifier PostgreSQL keeps without truncation.
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Shortest random suffix accepted for cursor names.
pub const MIN_SUFFIX_LEN: usize = 16;

pub const CONFIG_FILE: &str = "pgcursors.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CursorConfig {
    /// Rows per `fetch forward`. Signed so that bad input is reported
    /// as `InvalidBatchSize` rather than a parse failure.
    pub batch_size: i64,
    pub name_prefix: String,
    pub name_suffix_len: usize,
}

impl Default for CursorConfig {
    fn default() -> Self {
        Self {
            batch_size: 1,
            name_prefix: "cursor_".to_string(),
            name_suffix_len: MIN_SUFFIX_LEN,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    cursor: CursorConfig,
}

impl CursorConfig {
    pub fn batch_size(mut self, size: i64) -> Self {
        self.batch_size = size;
        self
    }

    pub fn name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    pub fn name_suffix_len(mut self, len: usize) -> Self {
        self.name_suffix_len = len;
        self
    }

    /// Check every option. Called by sessions before any SQL is issued.
    pub fn validate(&self) -> CursorResult<()> {
        validate_batch_size(self.batch_size)?;

        let mut chars = self.name_prefix.chars();
        let valid_start = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(CursorError::Config(format!(
                "name_prefix '{}' is not a plain SQL identifier",
                self.name_prefix
            )));
        }

        if self.name_suffix_len < MIN_SUFFIX_LEN {
            return Err(CursorError::Config(format!(
                "name_suffix_len {} is below the minimum of {}",
                self.name_suffix_len, MIN_SUFFIX_LEN
            )));
        }

        if self.name_prefix.len() + self.name_suffix_len > MAX_IDENTIFIER_LEN {
            return Err(CursorError::Config(format!(
                "cursor names would be {} bytes, PostgreSQL truncates identifiers at {}",
                self.name_prefix.len() + self.name_suffix_len,
                MAX_IDENTIFIER_LEN
            )));
        }

        Ok(())
    }

    /// Parse the `[cursor]` table from TOML text.
    pub fn from_toml_str(content: &str) -> CursorResult<Self> {
        let file: ConfigFile =
            toml::from_str(content).map_err(|e| CursorError::Config(e.to_string()))?;
        file.cursor.validate()?;
        Ok(file.cursor)
    }

    /// Load and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> CursorResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Look for `./pgcursors.toml`, then `<config dir>/pgcursors/config.toml`.
    /// Falls back to defaults when neither exists.
    pub fn discover() -> CursorResult<Self> {
        match Self::search_paths().into_iter().find(|p| p.exists()) {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading cursor config");
                Self::load(path)
            }
            None => Ok(Self::default()),
        }
    }

    fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(CONFIG_FILE)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("pgcursors").join("config.toml"));
        }
        paths
    }
}

/// Reject sizes below 1.
pub fn validate_batch_size(size: i64) -> CursorResult<NonZeroUsize> {
    usize::try_from(size)
        .ok()
        .and_then(NonZeroUsize::new)
        .ok_or(CursorError::InvalidBatchSize(size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_are_valid() {
        let config = CursorConfig::default();
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.name_prefix, "cursor_");
        assert_eq!(config.name_suffix_len, 16);
        config.validate().unwrap();
    }

    #[test]
    fn test_from_toml() {
        let config = CursorConfig::from_toml_str(
            r#"
            [cursor]
            batch_size = 500
            name_prefix = "export_"
            "#,
        )
        .unwrap();
        assert_eq!(
            config,
            CursorConfig::default()
                .batch_size(500)
                .name_prefix("export_")
        );
    }

    #[test]
    fn test_missing_table_uses_defaults() {
        let config = CursorConfig::from_toml_str("").unwrap();
        assert_eq!(config, CursorConfig::default());
    }

    #[test]
    fn test_rejects_bad_batch_size() {
        let err = CursorConfig::from_toml_str("[cursor]\nbatch_size = 0").unwrap_err();
        assert!(matches!(err, CursorError::InvalidBatchSize(0)));
        assert!(matches!(
            validate_batch_size(-1),
            Err(CursorError::InvalidBatchSize(-1))
        ));
        assert_eq!(validate_batch_size(3).unwrap().get(), 3);
    }

    #[test]
    fn test_rejects_bad_names() {
        for prefix in ["", "1cursor", "cur sor", "cur;sor"] {
            let err = CursorConfig::default().name_prefix(prefix).validate();
            assert!(matches!(err, Err(CursorError::Config(_))), "{prefix:?}");
        }
        assert!(CursorConfig::default().name_suffix_len(8).validate().is_err());
        assert!(CursorConfig::default().name_suffix_len(60).validate().is_err());
    }
}
