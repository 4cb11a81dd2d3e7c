#[cfg(test)]
mod tests {
    use crate::document::bootstrap;
    use crate::error::{EvalError, LoadError, LoadResult};
    use crate::eval::{Evaluator, ExecutableUnit};
    use crate::fetch::{FetchResponse, Fetcher, MemoryFetcher};
    use crate::loader::{Loader, Require};
    use crate::options::LoaderOptions;
    use crate::static_eval::StaticEvaluator;
    use crate::value::{Exports, Value};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;
    use url::Url;

    const DOCUMENT: &str = "http://localhost:3000/index.html";

    /// Memory fetcher that records every fetch and yields once before
    /// answering, so concurrent loads interleave.
    #[derive(Default)]
    struct CountingFetcher {
        files: MemoryFetcher,
        fetches: Mutex<HashMap<String, usize>>,
    }

    impl CountingFetcher {
        fn with_file(self, url: &str, text: &str) -> Self {
            self.files.insert(url, text);
            self
        }

        fn fetches(&self, url: &str) -> usize {
            self.fetches.lock().get(url).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl Fetcher for CountingFetcher {
        async fn fetch(&self, url: &Url) -> LoadResult<FetchResponse> {
            *self.fetches.lock().entry(url.to_string()).or_default() += 1;
            tokio::task::yield_now().await;
            self.files.fetch(url).await
        }
    }

    /// Static evaluation plus a per-origin evaluation count.
    #[derive(Default)]
    struct CountingEvaluator {
        runs: Mutex<HashMap<String, usize>>,
    }

    impl CountingEvaluator {
        fn runs(&self, origin: &str) -> usize {
            self.runs.lock().get(origin).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl Evaluator for CountingEvaluator {
        async fn evaluate(
            &self,
            unit: &ExecutableUnit,
            require: Require,
            exports: Exports,
        ) -> LoadResult<()> {
            *self.runs.lock().entry(unit.origin.clone()).or_default() += 1;
            StaticEvaluator.evaluate(unit, require, exports).await
        }
    }

    /// Rejects any unit whose source mentions `throw`.
    struct FailingEvaluator;

    #[async_trait]
    impl Evaluator for FailingEvaluator {
        async fn evaluate(
            &self,
            unit: &ExecutableUnit,
            require: Require,
            exports: Exports,
        ) -> LoadResult<()> {
            if unit.source.contains("throw") {
                return Err(EvalError::msg(format!("boom in {}", unit.origin)).into());
            }
            StaticEvaluator.evaluate(unit, require, exports).await
        }
    }

    /// Never answers.
    struct StallingFetcher;

    #[async_trait]
    impl Fetcher for StallingFetcher {
        async fn fetch(&self, _url: &Url) -> LoadResult<FetchResponse> {
            futures::future::pending().await
        }
    }

    fn setup(
        files: &[(&str, &str)],
    ) -> (Loader, Arc<CountingFetcher>, Arc<CountingEvaluator>) {
        let fetcher = Arc::new(
            files
                .iter()
                .fold(CountingFetcher::default(), |f, (url, text)| f.with_file(url, text)),
        );
        let evaluator = Arc::new(CountingEvaluator::default());
        let loader = Loader::new(DOCUMENT, fetcher.clone(), evaluator.clone()).unwrap();
        (loader, fetcher, evaluator)
    }

    #[test]
    fn test_document_base_is_directory_of_document() {
        let (loader, _, _) = setup(&[]);
        assert_eq!(loader.document_base(), "http://localhost:3000");
    }

    #[tokio::test]
    async fn test_repeated_loads_share_one_container() {
        let (loader, fetcher, evaluator) = setup(&[(
            "http://localhost:3000/util.js",
            "export const answer = 42;",
        )]);

        let first = loader.load_module("./util.js").await.unwrap();
        let second = loader.load_module("./util.js").await.unwrap();

        assert!(first.same_instance(&second));
        assert_eq!(first.get("answer"), Some(Value::Number(42.0)));
        assert_eq!(fetcher.fetches("http://localhost:3000/util.js"), 1);
        assert_eq!(evaluator.runs("http://localhost:3000/util.js"), 1);
        assert_eq!(loader.cache().keys(), vec!["http://localhost:3000/util.js".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_extension_uses_default() {
        let (loader, fetcher, _) = setup(&[(
            "http://localhost:3000/util.js",
            "export default 'u';",
        )]);

        let bare = loader.load_module("./util").await.unwrap();
        let explicit = loader.load_module("./util.js").await.unwrap();

        assert!(bare.same_instance(&explicit));
        assert_eq!(fetcher.fetches("http://localhost:3000/util.js"), 1);
    }

    #[tokio::test]
    async fn test_not_found_is_not_cached() {
        let (loader, fetcher, _) = setup(&[]);

        let err = loader.load_module("./missing").await.unwrap_err();
        assert!(matches!(&err, LoadError::ModuleNotFound { key } if key == "http://localhost:3000/missing.js"));
        assert_eq!(
            err.to_string(),
            "Can't find package file: http://localhost:3000/missing.js"
        );
        assert!(loader.cache().is_empty());
        assert!(!loader.cache().is_loading("http://localhost:3000/missing.js"));

        // A retry fetches again and succeeds once the file exists.
        fetcher
            .files
            .insert("http://localhost:3000/missing.js", "export default 1;");
        let exports = loader.load_module("./missing").await.unwrap();
        assert_eq!(exports.get("default"), Some(Value::Number(1.0)));
        assert_eq!(fetcher.fetches("http://localhost:3000/missing.js"), 2);
    }

    #[tokio::test]
    async fn test_parse_failure_is_not_cached() {
        let (loader, _, evaluator) = setup(&[(
            "http://localhost:3000/broken.js",
            "export const = ;",
        )]);

        let err = loader.load_module("./broken").await.unwrap_err();
        assert!(matches!(err, LoadError::ModuleParse { .. }));
        assert!(err
            .to_string()
            .starts_with("Can't parse package: http://localhost:3000/broken.js\n"));
        assert!(loader.cache().get("http://localhost:3000/broken.js").is_none());
        assert_eq!(evaluator.runs("http://localhost:3000/broken.js"), 0);
    }

    #[tokio::test]
    async fn test_concurrent_loads_coalesce() {
        let (loader, fetcher, evaluator) = setup(&[
            (
                "http://localhost:3000/shared.js",
                "export const items = [1, 2, 3];",
            ),
            (
                "http://localhost:3000/a.js",
                "import { items } from './shared'; export const a = items;",
            ),
            (
                "http://localhost:3000/b.js",
                "import * as shared from './shared'; export default shared;",
            ),
        ]);

        let (a, b, direct) = tokio::join!(
            loader.load_module("./a"),
            loader.load_module("./b"),
            loader.load_module("./shared"),
        );
        let (a, b, direct) = (a.unwrap(), b.unwrap(), direct.unwrap());

        assert_eq!(fetcher.fetches("http://localhost:3000/shared.js"), 1);
        assert_eq!(evaluator.runs("http://localhost:3000/shared.js"), 1);

        let namespace = b.get("default").unwrap();
        assert!(namespace.as_module().unwrap().same_instance(&direct));
        assert_eq!(
            a.get("a"),
            Some(Value::Array(vec![
                Value::Number(1.0),
                Value::Number(2.0),
                Value::Number(3.0)
            ]))
        );
    }

    #[tokio::test]
    async fn test_nested_imports_resolve_against_importer() {
        let (loader, fetcher, _) = setup(&[
            (
                "http://localhost:3000/app/pages/home.jsx",
                r#"
                import Button from "../components/button.jsx";
                import { label } from "./strings";
                export default function Home() { return <Button text={label} />; }
                export const parts = { button: Button, label };
                "#,
            ),
            (
                "http://localhost:3000/app/components/button.jsx",
                "export default function Button(props) { return <button>{props.text}</button>; }",
            ),
            (
                "http://localhost:3000/app/pages/strings.js",
                "export const label = 'Go';",
            ),
        ]);

        let home = loader.load_module("./app/pages/home.jsx").await.unwrap();

        let default = home.get("default").unwrap();
        assert_eq!(default.as_function().unwrap().name.as_deref(), Some("Home"));

        let parts = home.get("parts").unwrap();
        assert_eq!(parts.get("label"), Value::from("Go"));
        assert_eq!(
            parts.get("button").as_function().unwrap().name.as_deref(),
            Some("Button")
        );
        assert_eq!(
            fetcher.fetches("http://localhost:3000/app/components/button.jsx"),
            1
        );
        assert_eq!(loader.cache().len(), 3);
    }

    #[tokio::test]
    async fn test_data_modules_expose_default() {
        let (loader, _, evaluator) = setup(&[(
            "http://localhost:3000/config.json",
            r#"{ "name": "demo", "ports": [80, 443] }"#,
        )]);

        let config = loader.load_module("./config.json").await.unwrap();
        let value = config.get("default").unwrap();
        assert_eq!(value.get("name"), Value::from("demo"));
        assert_eq!(value.get("ports").get("1"), Value::Number(443.0));
        assert_eq!(evaluator.runs("http://localhost:3000/config.json"), 0);
    }

    #[tokio::test]
    async fn test_invalid_data_module() {
        let (loader, _, _) = setup(&[("http://localhost:3000/bad.json", "{ nope")]);
        let err = loader.load_module("./bad.json").await.unwrap_err();
        assert!(matches!(err, LoadError::ModuleParse { .. }));
    }

    #[tokio::test]
    async fn test_reexports() {
        let (loader, _, _) = setup(&[
            (
                "http://localhost:3000/lib/index.js",
                r#"
                export * from "./colors";
                export * as sizes from "./sizes";
                export { small as tiny } from "./sizes";
                "#,
            ),
            (
                "http://localhost:3000/lib/colors.js",
                "export const red = '#f00'; export const blue = '#00f';",
            ),
            (
                "http://localhost:3000/lib/sizes.js",
                "export const small = 4;",
            ),
        ]);

        let lib = loader.load_module("./lib/index").await.unwrap();
        assert_eq!(lib.names(), vec!["red", "blue", "sizes", "tiny"]);
        assert_eq!(lib.get("tiny"), Some(Value::Number(4.0)));
        assert_eq!(lib.get("sizes").unwrap().get("small"), Value::Number(4.0));
    }

    #[tokio::test]
    async fn test_circular_import_is_an_error() {
        let (loader, _, _) = setup(&[
            (
                "http://localhost:3000/a.js",
                "import b from './b'; export default b;",
            ),
            (
                "http://localhost:3000/b.js",
                "import a from './a'; export default a;",
            ),
        ]);

        let err = loader.load_module("./a").await.unwrap_err();
        match err {
            LoadError::Cycle { key, chain } => {
                assert_eq!(key, "http://localhost:3000/a.js");
                assert_eq!(
                    chain,
                    vec![
                        "http://localhost:3000/a.js",
                        "http://localhost:3000/b.js",
                        "http://localhost:3000/a.js",
                    ]
                );
            }
            other => panic!("expected a cycle, got {:?}", other),
        }
        assert!(loader.cache().is_empty());
    }

    #[tokio::test]
    async fn test_evaluation_errors_propagate_to_importers() {
        let fetcher = Arc::new(
            CountingFetcher::default()
                .with_file(
                    "http://localhost:3000/main.js",
                    "import x from './faulty'; export default x;",
                )
                .with_file("http://localhost:3000/faulty.js", "throw new Error('x');"),
        );
        let loader = Loader::new(DOCUMENT, fetcher, Arc::new(FailingEvaluator)).unwrap();

        let err = loader.load_module("./main").await.unwrap_err();
        assert!(matches!(err, LoadError::Evaluation(_)));
        assert_eq!(err.to_string(), "boom in http://localhost:3000/faulty.js");
        assert!(loader.cache().is_empty());
    }

    #[tokio::test]
    async fn test_compile_package_is_uncached() {
        let (loader, fetcher, evaluator) = setup(&[(
            "http://localhost:3000/lib/util.js",
            "export const twice = (x) => x * 2;",
        )]);

        let source = "import { twice } from './util'; export default <App run={twice} />;";
        let first = loader
            .compile_package(source, "http://localhost:3000/lib/")
            .await
            .unwrap();
        let second = loader
            .compile_package(source, "http://localhost:3000/lib")
            .await
            .unwrap();

        assert!(!first.same_instance(&second));
        assert!(matches!(first.get("default"), Some(Value::Opaque(_))));
        assert_eq!(evaluator.runs("inline"), 2);
        assert_eq!(fetcher.fetches("http://localhost:3000/lib/util.js"), 1);
        assert_eq!(loader.cache().keys(), vec!["http://localhost:3000/lib/util.js".to_string()]);
    }

    #[tokio::test]
    async fn test_abandoned_load_releases_loader() {
        let fetcher = Arc::new(StallingFetcher);
        let loader = Loader::new(DOCUMENT, fetcher.clone(), Arc::new(StaticEvaluator)).unwrap();

        let attempt =
            tokio::time::timeout(Duration::from_millis(20), loader.load_module("./slow")).await;
        assert!(attempt.is_err());
        assert!(!loader.cache().is_loading("http://localhost:3000/slow.js"));

        drop(loader);
        assert_eq!(Arc::strong_count(&fetcher), 1);
    }

    #[tokio::test]
    async fn test_abandoned_load_is_restarted() {
        let (loader, fetcher, _) = setup(&[(
            "http://localhost:3000/later.js",
            "export default 'ok';",
        )]);

        // CountingFetcher yields once, so the first poll leaves the load in flight.
        let mut first = Box::pin(loader.load_module("./later"));
        assert!(futures::poll!(first.as_mut()).is_pending());
        assert!(loader.cache().is_loading("http://localhost:3000/later.js"));
        drop(first);

        let exports = loader.load_module("./later").await.unwrap();
        assert_eq!(exports.get("default"), Some(Value::from("ok")));
        assert_eq!(fetcher.fetches("http://localhost:3000/later.js"), 2);
    }

    #[tokio::test]
    async fn test_compile_inline_reports_syntax_errors() {
        let (loader, _, _) = setup(&[]);
        let err = loader.compile_inline("<div").await.unwrap_err();
        assert!(matches!(err, LoadError::Transpile(_)));
    }

    #[tokio::test]
    async fn test_loader_options_change_resolution() {
        let fetcher = Arc::new(CountingFetcher::default().with_file(
            "http://localhost:3000/view.jsx",
            "export default 'v';",
        ));
        let options = LoaderOptions::from_json(r#"{ "defaultExtension": "jsx" }"#).unwrap();
        let loader = Loader::builder(DOCUMENT, fetcher, Arc::new(StaticEvaluator))
            .options(options)
            .build()
            .unwrap();

        let view = loader.load_module("./view").await.unwrap();
        assert_eq!(view.get("default"), Some(Value::from("v")));
    }

    #[tokio::test]
    async fn test_bootstrap_runs_every_script() {
        let (loader, fetcher, evaluator) = setup(&[(
            "http://localhost:3000/app.jsx",
            "export default function App() { return <div />; }",
        )]);
        let html = r#"
            <html><body>
              <script type="text/jsx" src="./app.jsx"></script>
              <script type="text/jsx">
                import App from "./app.jsx";
                export const root = <App />;
              </script>
              <script type="text/jsx" src="./missing.jsx"></script>
            </body></html>
        "#;

        let results = bootstrap(&loader, html).await.unwrap();
        assert_eq!(results.len(), 3);

        let app = results[0].as_ref().unwrap();
        let inline = results[1].as_ref().unwrap();
        assert!(app.contains("default"));
        assert!(inline.contains("root"));
        assert!(matches!(results[2], Err(LoadError::ModuleNotFound { .. })));

        assert_eq!(fetcher.fetches("http://localhost:3000/app.jsx"), 1);
        assert_eq!(evaluator.runs("http://localhost:3000/app.jsx"), 1);
        assert_eq!(evaluator.runs("inline"), 1);
    }
}
