//! Module Loader
//!
//! Turns specifiers into resolved, compiled, cached export containers and
//! hands each executing module a [`Require`] bound to its own base.
//!
//! ## Cache states per absolute key
//!
//! ```text
//! Unrequested --miss--> Loading --ok--> Resolved (permanent)
//!                          |
//!                          +--err--> (entry removed, next request starts over)
//! ```
//!
//! The first miss stores the in-flight load as a shared future *before*
//! fetching, so concurrent requests for the same key join it instead of
//! fetching and compiling a second time. The cache only holds a weak handle
//! to that future: a load whose every caller went away is dropped, and its
//! slot counts as empty.

use futures::future::{self, BoxFuture, FutureExt, Shared, WeakShared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use url::Url;

use crate::error::{LoadError, LoadResult, TranspileError};
use crate::eval::{Evaluator, ExecutableUnit};
use crate::fetch::{FetchResponse, Fetcher};
use crate::options::LoaderOptions;
use crate::resolve::{base_of, resolve_specifier, ModuleKind, ResolvedSpecifier};
use crate::transpile::Transpiler;
use crate::value::{Exports, Value};

pub const INLINE_ORIGIN: &str = "inline";

type PendingLoad = Shared<BoxFuture<'static, LoadResult<Exports>>>;
type WeakPendingLoad = WeakShared<BoxFuture<'static, LoadResult<Exports>>>;

// ═══════════════════════════════════════════════════════════════════════════════
// MODULE CACHE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct ModuleRecord {
    pub key: String,
    pub exports: Exports,
}

enum CacheSlot {
    Loading(WeakPendingLoad),
    Resolved(ModuleRecord),
}

/// Absolute key -> module record. Entries are never evicted.
#[derive(Default)]
pub struct ModuleCache {
    slots: Mutex<HashMap<String, CacheSlot>>,
}

impl ModuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The resolved record for `key`; in-flight loads are not visible here.
    pub fn get(&self, key: &str) -> Option<ModuleRecord> {
        match self.slots.lock().get(key) {
            Some(CacheSlot::Resolved(record)) => Some(record.clone()),
            _ => None,
        }
    }

    pub fn is_loading(&self, key: &str) -> bool {
        match self.slots.lock().get(key) {
            Some(CacheSlot::Loading(pending)) => pending.upgrade().is_some(),
            _ => false,
        }
    }

    /// Keys of resolved modules.
    pub fn keys(&self) -> Vec<String> {
        self.slots
            .lock()
            .iter()
            .filter(|(_, slot)| matches!(slot, CacheSlot::Resolved(_)))
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.keys().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn settle(&self, key: &str, result: &LoadResult<Exports>) {
        let mut slots = self.slots.lock();
        match result {
            Ok(exports) => {
                slots.insert(
                    key.to_string(),
                    CacheSlot::Resolved(ModuleRecord {
                        key: key.to_string(),
                        exports: exports.clone(),
                    }),
                );
            }
            Err(_) => {
                slots.remove(key);
            }
        }
    }
}

impl fmt::Debug for ModuleCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.slots.lock();
        let mut map = f.debug_map();
        for (key, slot) in slots.iter() {
            let state = match slot {
                CacheSlot::Loading(_) => "loading",
                CacheSlot::Resolved(_) => "resolved",
            };
            map.entry(key, &state);
        }
        map.finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOADER
// ═══════════════════════════════════════════════════════════════════════════════

pub struct LoaderBuilder {
    document_url: String,
    fetcher: Arc<dyn Fetcher>,
    evaluator: Arc<dyn Evaluator>,
    options: LoaderOptions,
    cache: Option<Arc<ModuleCache>>,
}

impl LoaderBuilder {
    pub fn options(mut self, options: LoaderOptions) -> Self {
        self.options = options;
        self
    }

    /// Shares an existing cache instead of creating a fresh one.
    pub fn cache(mut self, cache: Arc<ModuleCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn build(self) -> LoadResult<Loader> {
        let document = Url::parse(&self.document_url).map_err(|e| LoadError::InvalidSpecifier {
            specifier: self.document_url.clone(),
            base: String::new(),
            reason: e.to_string(),
        })?;

        Ok(Loader {
            inner: Arc::new(LoaderInner {
                document_base: base_of(document.as_str()).to_string(),
                transpiler: Transpiler::new(self.options.transpile.clone()),
                options: self.options,
                fetcher: self.fetcher,
                evaluator: self.evaluator,
                cache: self.cache.unwrap_or_default(),
            }),
        })
    }
}

struct LoaderInner {
    options: LoaderOptions,
    transpiler: Transpiler,
    /// Directory of the hosting document; root loads resolve against it.
    document_base: String,
    fetcher: Arc<dyn Fetcher>,
    evaluator: Arc<dyn Evaluator>,
    cache: Arc<ModuleCache>,
}

/// Cheap-to-clone handle; clones share one cache.
#[derive(Clone)]
pub struct Loader {
    inner: Arc<LoaderInner>,
}

impl Loader {
    /// `document_url` is the hosting document's own location
    /// (e.g. `http://localhost:3000/index.html`).
    pub fn builder(
        document_url: impl Into<String>,
        fetcher: Arc<dyn Fetcher>,
        evaluator: Arc<dyn Evaluator>,
    ) -> LoaderBuilder {
        LoaderBuilder {
            document_url: document_url.into(),
            fetcher,
            evaluator,
            options: LoaderOptions::default(),
            cache: None,
        }
    }

    pub fn new(
        document_url: impl Into<String>,
        fetcher: Arc<dyn Fetcher>,
        evaluator: Arc<dyn Evaluator>,
    ) -> LoadResult<Self> {
        Self::builder(document_url, fetcher, evaluator).build()
    }

    pub fn options(&self) -> &LoaderOptions {
        &self.inner.options
    }

    pub fn document_base(&self) -> &str {
        &self.inner.document_base
    }

    pub fn cache(&self) -> &ModuleCache {
        &self.inner.cache
    }

    /// Loads a root module relative to the hosting document.
    pub async fn load_module(&self, specifier: &str) -> LoadResult<Exports> {
        self.load_from(specifier, &self.inner.document_base, Arc::from(Vec::new()))
            .await
    }

    /// Lowers and runs `source` with specifiers resolving against `base`.
    /// The result is not cached.
    pub async fn compile_package(&self, source: &str, base: &str) -> LoadResult<Exports> {
        let lowered = self.inner.transpiler.transpile(source)?;
        self.evaluate(
            INLINE_ORIGIN.to_string(),
            base.trim_end_matches('/').to_string(),
            lowered,
            Arc::from(Vec::new()),
        )
        .await
    }

    /// [`compile_package`](Self::compile_package) against the document's directory.
    pub async fn compile_inline(&self, source: &str) -> LoadResult<Exports> {
        let base = self.inner.document_base.clone();
        self.compile_package(source, &base).await
    }

    fn load_from(
        &self,
        specifier: &str,
        base: &str,
        chain: Arc<[String]>,
    ) -> BoxFuture<'static, LoadResult<Exports>> {
        let resolved = match resolve_specifier(specifier, base, &self.inner.options) {
            Ok(resolved) => resolved,
            Err(e) => return future::ready(Err(e)).boxed(),
        };

        if chain.iter().any(|key| *key == resolved.key) {
            let mut chain = chain.to_vec();
            chain.push(resolved.key.clone());
            return future::ready(Err(LoadError::Cycle {
                key: resolved.key,
                chain,
            }))
            .boxed();
        }

        let pending = {
            let mut slots = self.inner.cache.slots.lock();
            let joined: Option<PendingLoad> = match slots.get(&resolved.key) {
                Some(CacheSlot::Resolved(record)) => {
                    tracing::debug!(key = %record.key, "module cache hit");
                    return future::ready(Ok(record.exports.clone())).boxed();
                }
                // None once every caller of that load has gone away
                Some(CacheSlot::Loading(weak)) => weak.upgrade(),
                None => None,
            };
            match joined {
                Some(pending) => {
                    tracing::debug!(key = %resolved.key, "joining in-flight module load");
                    pending
                }
                None => {
                    let key = resolved.key.clone();
                    let pending = self.clone().instantiate(resolved, chain).boxed().shared();
                    if let Some(weak) = pending.downgrade() {
                        slots.insert(key, CacheSlot::Loading(weak));
                    }
                    pending
                }
            }
        };

        pending.boxed()
    }

    async fn instantiate(self, resolved: ResolvedSpecifier, chain: Arc<[String]>) -> LoadResult<Exports> {
        let result = self.fetch_and_compile(&resolved, chain).await;
        self.inner.cache.settle(&resolved.key, &result);

        match &result {
            Ok(exports) => {
                tracing::info!(key = %resolved.key, exports = exports.len(), "module loaded")
            }
            Err(e) => tracing::warn!(key = %resolved.key, error = %e, "module load failed"),
        }
        result
    }

    async fn fetch_and_compile(
        &self,
        resolved: &ResolvedSpecifier,
        chain: Arc<[String]>,
    ) -> LoadResult<Exports> {
        let key = &resolved.key;
        let url = Url::parse(key).map_err(|e| LoadError::Fetch {
            key: key.clone(),
            message: e.to_string(),
        })?;

        let text = match self.inner.fetcher.fetch(&url).await? {
            FetchResponse::Found(text) => text,
            FetchResponse::NotFound => return Err(LoadError::ModuleNotFound { key: key.clone() }),
        };

        match resolved.kind {
            ModuleKind::Data => {
                let value: serde_json::Value =
                    serde_json::from_str(&text).map_err(|e| LoadError::ModuleParse {
                        key: key.clone(),
                        source: TranspileError::InvalidData(e.to_string()),
                    })?;
                Ok(Exports::with_default(Value::from(value)))
            }
            ModuleKind::Script => {
                let lowered = self
                    .inner
                    .transpiler
                    .transpile(&text)
                    .map_err(|source| LoadError::ModuleParse {
                        key: key.clone(),
                        source,
                    })?;

                let mut chain = chain.to_vec();
                chain.push(key.clone());
                self.evaluate(key.clone(), resolved.base.clone(), lowered, chain.into())
                    .await
            }
        }
    }

    async fn evaluate(
        &self,
        origin: String,
        base: String,
        source: String,
        chain: Arc<[String]>,
    ) -> LoadResult<Exports> {
        let options = &self.inner.options.transpile;
        let unit = ExecutableUnit {
            origin,
            base: base.clone(),
            source,
            require_name: options.require_name.clone(),
            exports_name: options.exports_name.clone(),
        };

        let exports = Exports::new();
        let require = Require {
            loader: self.clone(),
            base,
            chain,
        };
        self.inner
            .evaluator
            .evaluate(&unit, require, exports.clone())
            .await?;
        Ok(exports)
    }
}

impl fmt::Debug for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loader")
            .field("document_base", &self.inner.document_base)
            .field("options", &self.inner.options)
            .field("cache", &self.inner.cache)
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REFERENCE RESOLUTION
// ═══════════════════════════════════════════════════════════════════════════════

/// The `___require` capability handed to an executing module, bound to that
/// module's base.
#[derive(Clone)]
pub struct Require {
    loader: Loader,
    base: String,
    /// Keys of the modules currently evaluating along this import chain.
    chain: Arc<[String]>,
}

impl Require {
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Resolves `specifier` against this module's base and loads it.
    pub fn call(&self, specifier: &str) -> BoxFuture<'static, LoadResult<Exports>> {
        self.loader
            .load_from(specifier, &self.base, Arc::clone(&self.chain))
    }
}

impl fmt::Debug for Require {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Require")
            .field("base", &self.base)
            .field("chain", &self.chain)
            .finish()
    }
}
