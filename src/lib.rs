//! # JSX Loader Ground Truth
//!
//! ## Lowering Invariants
//!
//! 1. **Element Calls**: `<tag attrs>children</tag>` becomes
//!    `React.createElement(tag, attrs|null, ...children)`. Lowercase tags are
//!    string literals, tags starting with an uppercase letter are identifier
//!    references.
//!
//! 2. **Whitespace**: JSX text is trimmed; whitespace-only text produces no
//!    child. Non-blank text is emitted as an escaped string literal.
//!
//! 3. **Linkage**: every `import` becomes an awaited `___require(specifier)`
//!    and every `export` an assignment into `__export`. Lowered output contains
//!    no `import`/`export` statements.
//!
//! ## Loader Invariants
//!
//! 1. **Keys**: a specifier is normalized (default extension appended) and
//!    resolved against the referencing module's base. The absolute result is
//!    the cache key.
//!
//! 2. **Single Flight**: at most one fetch and one evaluation per key. Callers
//!    that arrive while a load is in flight join it and observe the same
//!    export container.
//!
//! 3. **Failure**: failed loads are never cached; the next request retries.

#[cfg(feature = "napi")]
use napi_derive::napi;

mod document;
mod error;
mod eval;
mod fetch;
mod jsx_lowerer;
mod linkage;
mod loader;
mod options;
mod resolve;
mod static_eval;
mod transpile;
mod value;

#[cfg(test)]
mod loader_tests;

pub use document::{bootstrap, discover_scripts, ScriptSource, JSX_SCRIPT_TYPE};
pub use error::{EvalError, LoadError, LoadResult, TranspileError};
pub use eval::{Evaluator, ExecutableUnit};
#[cfg(feature = "http")]
pub use fetch::HttpFetcher;
pub use fetch::{FetchResponse, Fetcher, FileFetcher, MemoryFetcher};
pub use jsx_lowerer::JsxLowerer;
pub use linkage::ModuleLinker;
pub use loader::{Loader, LoaderBuilder, ModuleCache, ModuleRecord, Require, INLINE_ORIGIN};
pub use options::{LoaderOptions, TranspileOptions};
pub use resolve::{
    base_of, extension_of, normalize_specifier, resolve_specifier, ModuleKind, ResolvedSpecifier,
};
pub use static_eval::{Plan, StaticEvaluator};
pub use transpile::{transpile, Transpiler};
pub use value::{Exports, FunctionRef, Value};

// ═══════════════════════════════════════════════════════════════════════════════
// NAPI EXPORTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(feature = "napi")]
#[napi]
pub fn transpile_jsx(code: String) -> napi::Result<String> {
    transpile(&code).map_err(|e| napi::Error::from_reason(e.to_string()))
}
