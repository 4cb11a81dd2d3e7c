//! Specifier normalization and resolution to absolute module keys.

use lazy_static::lazy_static;
use regex::Regex;
use std::borrow::Cow;
use url::Url;

use crate::error::{LoadError, LoadResult};
use crate::options::LoaderOptions;

lazy_static! {
    /// Trailing extension token (`.js`, `.json`, `.jsx`, ...).
    static ref EXTENSION_RE: Regex = Regex::new(r"\.([a-zA-Z0-9]+)$").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    /// Lowered and evaluated.
    Script,
    /// Parsed as a literal value and exposed as `default`.
    Data,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSpecifier {
    /// Canonical location; the module cache key.
    pub key: String,
    /// Everything before the key's final path segment.
    pub base: String,
    pub kind: ModuleKind,
}

pub fn extension_of(specifier: &str) -> Option<&str> {
    EXTENSION_RE
        .captures(specifier)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Appends `.<default_extension>` when the specifier has no extension.
pub fn normalize_specifier<'s>(specifier: &'s str, default_extension: &str) -> Cow<'s, str> {
    if extension_of(specifier).is_some() {
        Cow::Borrowed(specifier)
    } else {
        Cow::Owned(format!(
            "{}.{}",
            specifier,
            default_extension.trim_start_matches('.')
        ))
    }
}

/// Strips the final path segment: `http://h/a/b.js` -> `http://h/a`.
pub fn base_of(key: &str) -> &str {
    key.rsplit_once('/').map(|(base, _)| base).unwrap_or(key)
}

/// Resolves `specifier` against `base`, which names a directory (no
/// trailing slash required).
pub fn resolve_specifier(
    specifier: &str,
    base: &str,
    options: &LoaderOptions,
) -> LoadResult<ResolvedSpecifier> {
    let invalid = |reason: String| LoadError::InvalidSpecifier {
        specifier: specifier.to_string(),
        base: base.to_string(),
        reason,
    };

    let normalized = normalize_specifier(specifier, &options.default_extension);

    let directory = if base.ends_with('/') {
        Cow::Borrowed(base)
    } else {
        Cow::Owned(format!("{}/", base))
    };
    let base_url = Url::parse(&directory).map_err(|e| invalid(e.to_string()))?;
    let resolved = base_url
        .join(&normalized)
        .map_err(|e| invalid(e.to_string()))?;

    let key = resolved.to_string();
    let kind = match extension_of(&normalized) {
        Some(ext) if options.is_data_extension(ext) => ModuleKind::Data,
        _ => ModuleKind::Script,
    };

    tracing::debug!(specifier, base, key = %key, "resolved module specifier");

    Ok(ResolvedSpecifier {
        base: base_of(&key).to_string(),
        key,
        kind,
    })
}
