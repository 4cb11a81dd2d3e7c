//! Execution seam between the loader and the hosting runtime.

use async_trait::async_trait;

use crate::error::LoadResult;
use crate::loader::Require;
use crate::value::Exports;

/// Lowered source ready to run as the body of
/// `async function (<require_name>, <exports_name>) { ... }`.
#[derive(Debug, Clone)]
pub struct ExecutableUnit {
    /// Absolute key of the module, or `"inline"`.
    pub origin: String,
    /// Directory the unit's own specifiers resolve against.
    pub base: String,
    pub source: String,
    pub require_name: String,
    pub exports_name: String,
}

/// Runs executable units. Implemented by the hosting runtime.
///
/// An implementation must call `require` for each awaited reference the body
/// makes and write the body's exports into `exports`. Failures of nested
/// `require` calls are returned as they are; the host's own faults are
/// reported as [`LoadError::Evaluation`](crate::LoadError::Evaluation).
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(
        &self,
        unit: &ExecutableUnit,
        require: Require,
        exports: Exports,
    ) -> LoadResult<()>;
}
