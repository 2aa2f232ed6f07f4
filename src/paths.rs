//! Output directory resolution and evaluation of static-or-computed fields.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::config::{DynamicValue, SessionConfig};

/// Raw shape of a flags field before normalization.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum FlagSource {
    /// Already tokenized.
    Tokens(Vec<String>),
    /// Space-delimited command-line fragment.
    Line(String),
}

/// Normalize a flags field into an ordered token sequence.
///
/// Token sequences pass through unchanged, strings are split on single
/// spaces, and an absent value yields no tokens. Feeding the output back in
/// as [`FlagSource::Tokens`] returns it unchanged.
#[must_use]
pub fn parse_flags(value: Option<&FlagSource>) -> Vec<String> {
    match value {
        Some(FlagSource::Tokens(tokens)) => tokens.clone(),
        Some(FlagSource::Line(line)) if line.is_empty() => Vec::new(),
        Some(FlagSource::Line(line)) => line.split(' ').map(str::to_owned).collect(),
        None => Vec::new(),
    }
}

/// Evaluate a dynamic field, or `None` when the field is absent.
#[must_use]
pub fn evaluate_opt(value: Option<&DynamicValue>, config: &SessionConfig) -> Option<String> {
    match value? {
        DynamicValue::Literal(literal) => Some(literal.clone()),
        DynamicValue::Computed(compute) => Some(compute(config)),
    }
}

/// Evaluate a dynamic field, falling back to `default` when absent.
#[must_use]
pub fn evaluate(value: Option<&DynamicValue>, config: &SessionConfig, default: &str) -> String {
    evaluate_opt(value, config).unwrap_or_else(|| default.to_owned())
}

/// Resolve the session output directory.
///
/// A computed directory is used verbatim; a literal directory is joined with
/// the stream name; otherwise the directory is `mediaroot/app/stream`.
#[must_use]
pub fn resolve_directory(config: &SessionConfig) -> PathBuf {
    match &config.directory {
        Some(DynamicValue::Computed(compute)) => PathBuf::from(compute(config)),
        Some(DynamicValue::Literal(root)) => Path::new(root).join(&config.stream),
        None => Path::new(&config.mediaroot)
            .join(&config.app)
            .join(&config.stream),
    }
}

/// Absolute output filename for `filename` inside `directory`.
#[must_use]
pub fn output_file(directory: &Path, filename: &str) -> String {
    format!("{}/{filename}", directory.display())
}
