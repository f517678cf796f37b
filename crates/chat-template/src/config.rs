/*
 * config.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Engine configuration.
//!
//! Callers typically store these settings next to model metadata and load
//! them from JSON. Every field has a default, so a partial (or empty) object
//! is accepted.

use serde::{Deserialize, Serialize};

/// Whitespace-control switches applied while preprocessing template source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LexerOptions {
    /// Remove the first newline after a block or comment tag.
    pub trim_blocks: bool,

    /// Strip spaces and tabs from the start of a line up to a block or
    /// comment tag.
    pub lstrip_blocks: bool,
}

/// Compatibility behaviors that real chat templates depend on but that
/// strict Jinja2 does not provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Workarounds {
    /// `none` answers `list`, `selectattr`, `rejectattr`, `default`,
    /// `tojson` and `string` instead of raising on member access.
    pub none_has_builtins: bool,

    /// `"text" + undefined` yields `"text"` instead of a type error.
    pub string_plus_undefined_is_string: bool,
}

impl Default for Workarounds {
    fn default() -> Self {
        Self {
            none_has_builtins: true,
            string_plus_undefined_is_string: true,
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub lexer: LexerOptions,
    pub workarounds: Workarounds,
}

impl EngineConfig {
    /// Configuration with both `trim_blocks` and `lstrip_blocks` enabled,
    /// which is what most chat template hosts use.
    pub fn chat() -> Self {
        Self {
            lexer: LexerOptions {
                trim_blocks: true,
                lstrip_blocks: true,
            },
            workarounds: Workarounds::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(!config.lexer.trim_blocks);
        assert!(!config.lexer.lstrip_blocks);
        assert!(config.workarounds.none_has_builtins);
        assert!(config.workarounds.string_plus_undefined_is_string);
    }

    #[test]
    fn test_partial_json() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"lexer": {"trim_blocks": true}}"#).unwrap();
        assert!(config.lexer.trim_blocks);
        assert!(!config.lexer.lstrip_blocks);
        assert_eq!(config.workarounds, Workarounds::default());
    }

    #[test]
    fn test_empty_json() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_disable_workaround() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"workarounds": {"none_has_builtins": false}}"#).unwrap();
        assert!(!config.workarounds.none_has_builtins);
        assert!(config.workarounds.string_plus_undefined_is_string);
    }
}
