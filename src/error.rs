//! Error types for lowering and module loading.
//!
//! Every error here is `Clone`: a single in-flight load may be awaited by
//! several importers, and each of them receives the same outcome.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Parsing or lowering failed on otherwise-available source text.
#[derive(Debug, Clone, Error)]
pub enum TranspileError {
    #[error("{}", .messages.join("\n"))]
    Syntax { messages: Vec<String> },

    #[error("invalid data document: {0}")]
    InvalidData(String),

    #[error("internal lowering error: {0}")]
    Internal(String),
}

impl TranspileError {
    pub fn syntax<I, S>(messages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        TranspileError::Syntax {
            messages: messages.into_iter().map(|m| m.to_string()).collect(),
        }
    }
}

/// A fault raised by the host while running a module body.
///
/// Displayed verbatim: the loader neither classifies nor wraps it.
#[derive(Clone)]
pub struct EvalError(Arc<dyn std::error::Error + Send + Sync>);

impl EvalError {
    pub fn new<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        EvalError(Arc::new(error))
    }

    pub fn msg(message: impl Into<String>) -> Self {
        #[derive(Debug, Error)]
        #[error("{0}")]
        struct Message(String);

        EvalError(Arc::new(Message(message.into())))
    }

    pub fn inner(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self.0.as_ref()
    }
}

impl fmt::Debug for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for EvalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

/// Result type for loader operations.
pub type LoadResult<T> = Result<T, LoadError>;

/// Failures surfaced by the module loader.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum LoadError {
    /// Inline source could not be lowered.
    #[error(transparent)]
    Transpile(#[from] TranspileError),

    /// The fetch capability reported the resource as missing.
    #[error("Can't find package file: {key}")]
    ModuleNotFound { key: String },

    /// A fetched module could not be lowered or decoded.
    #[error("Can't parse package: {key}\n{source}")]
    ModuleParse {
        key: String,
        #[source]
        source: TranspileError,
    },

    /// The fetch itself failed for a reason other than "not found".
    #[error("failed to fetch {key}: {message}")]
    Fetch { key: String, message: String },

    #[error("invalid module specifier `{specifier}` (base `{base}`): {reason}")]
    InvalidSpecifier {
        specifier: String,
        base: String,
        reason: String,
    },

    /// The module is already being evaluated further up the same import chain.
    #[error("circular import of {key} (via {})", .chain.join(" -> "))]
    Cycle { key: String, chain: Vec<String> },

    #[error(transparent)]
    Evaluation(#[from] EvalError),
}

impl LoadError {
    /// The absolute key the failure refers to, when it has one.
    pub fn key(&self) -> Option<&str> {
        match self {
            LoadError::ModuleNotFound { key }
            | LoadError::ModuleParse { key, .. }
            | LoadError::Fetch { key, .. }
            | LoadError::Cycle { key, .. } => Some(key),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syntax_messages_display_one_per_line() {
        let err = TranspileError::syntax(["Unexpected token", "Expected `}`"]);
        assert_eq!(err.to_string(), "Unexpected token\nExpected `}`");
    }

    #[test]
    fn test_parse_failure_text_includes_cause() {
        let err = LoadError::ModuleParse {
            key: "http://h/a.js".to_string(),
            source: TranspileError::syntax(["Unexpected token"]),
        };
        assert_eq!(err.to_string(), "Can't parse package: http://h/a.js\nUnexpected token");
        assert_eq!(err.key(), Some("http://h/a.js"));
    }
}
