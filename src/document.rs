//! # Host Document Bootstrap
//!
//! Finds the `<script type="text/jsx">` blocks of a hosting HTML document and
//! runs them through the loader. Inline blocks are compiled as uncached
//! packages against the document's directory; `src` blocks are loaded as
//! root modules and land in the module cache.

use futures::future::{self, BoxFuture, FutureExt};
use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData, RcDom};

use crate::error::{LoadResult, TranspileError};
use crate::loader::Loader;
use crate::value::Exports;

pub const JSX_SCRIPT_TYPE: &str = "text/jsx";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptSource {
    /// Trimmed body of an inline block.
    Inline(String),
    /// The block's `src` attribute, unresolved.
    External(String),
}

/// Collects JSX script blocks in document order. Empty inline blocks are
/// skipped.
pub fn discover_scripts(html: &str) -> Result<Vec<ScriptSource>, TranspileError> {
    let dom = parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut html.as_bytes())
        .map_err(|e| TranspileError::InvalidData(format!("Failed to parse HTML: {}", e)))?;

    let mut scripts = Vec::new();
    collect_scripts(&dom.document, &mut scripts);
    Ok(scripts)
}

fn collect_scripts(handle: &Handle, scripts: &mut Vec<ScriptSource>) {
    if let NodeData::Element { name, attrs, .. } = &handle.data {
        if &*name.local == "script" {
            let attrs = attrs.borrow();
            let attr = |wanted: &str| {
                attrs
                    .iter()
                    .find(|a| &*a.name.local == wanted)
                    .map(|a| a.value.to_string())
            };

            let is_jsx = attr("type")
                .is_some_and(|t| t.trim().eq_ignore_ascii_case(JSX_SCRIPT_TYPE));
            if !is_jsx {
                return;
            }

            match attr("src") {
                Some(src) => scripts.push(ScriptSource::External(src)),
                None => {
                    let mut code = String::new();
                    for child in handle.children.borrow().iter() {
                        if let NodeData::Text { contents } = &child.data {
                            code.push_str(&contents.borrow());
                        }
                    }
                    let code = code.trim();
                    if !code.is_empty() {
                        scripts.push(ScriptSource::Inline(code.to_string()));
                    }
                }
            }
            return;
        }
    }

    for child in handle.children.borrow().iter() {
        collect_scripts(child, scripts);
    }
}

/// Runs every JSX script of `html` concurrently. One result per script, in
/// document order; a failing script does not stop the others.
pub async fn bootstrap(loader: &Loader, html: &str) -> LoadResult<Vec<LoadResult<Exports>>> {
    let scripts = discover_scripts(html)?;
    tracing::debug!(scripts = scripts.len(), "bootstrapping host document");

    let runs: Vec<BoxFuture<'_, LoadResult<Exports>>> = scripts
        .iter()
        .map(|script| match script {
            ScriptSource::Inline(code) => loader.compile_inline(code).boxed(),
            ScriptSource::External(src) => loader.load_module(src).boxed(),
        })
        .collect();

    Ok(future::join_all(runs).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovers_jsx_scripts_in_document_order() {
        let html = r#"<!DOCTYPE html>
<html>
  <head>
    <script type="text/jsx" src="./app.jsx"></script>
    <script>console.log("plain")</script>
  </head>
  <body>
    <script type="text/jsx">
      const a = 1;
    </script>
    <script type="text/jsx">   </script>
    <script type="TEXT/JSX" src="/lib/b"></script>
  </body>
</html>"#;

        assert_eq!(
            discover_scripts(html).unwrap(),
            vec![
                ScriptSource::External("./app.jsx".into()),
                ScriptSource::Inline("const a = 1;".into()),
                ScriptSource::External("/lib/b".into()),
            ]
        );
    }

    #[test]
    fn test_document_without_jsx_scripts() {
        assert!(discover_scripts("<p>hello</p>").unwrap().is_empty());
    }
}
