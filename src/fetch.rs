//! Fetch capability used by the loader.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::io::ErrorKind;
use url::Url;

use crate::error::{LoadError, LoadResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResponse {
    Found(String),
    NotFound,
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> LoadResult<FetchResponse>;
}

fn fetch_error(url: &Url, message: impl ToString) -> LoadError {
    LoadError::Fetch {
        key: url.to_string(),
        message: message.to_string(),
    }
}

/// Serves `file:` URLs from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileFetcher;

#[async_trait]
impl Fetcher for FileFetcher {
    async fn fetch(&self, url: &Url) -> LoadResult<FetchResponse> {
        let path = url
            .to_file_path()
            .map_err(|_| fetch_error(url, "not a file URL"))?;

        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(FetchResponse::Found(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(FetchResponse::NotFound),
            Err(e) => Err(fetch_error(url, e)),
        }
    }
}

/// In-memory source table keyed by absolute URL.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    files: RwLock<HashMap<String, String>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, url: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(url, text);
        self
    }

    pub fn insert(&self, url: impl Into<String>, text: impl Into<String>) {
        self.files.write().insert(url.into(), text.into());
    }

    pub fn remove(&self, url: &str) -> Option<String> {
        self.files.write().remove(url)
    }
}

#[async_trait]
impl Fetcher for MemoryFetcher {
    async fn fetch(&self, url: &Url) -> LoadResult<FetchResponse> {
        Ok(match self.files.read().get(url.as_str()) {
            Some(text) => FetchResponse::Found(text.clone()),
            None => FetchResponse::NotFound,
        })
    }
}

/// HTTP(S) fetcher; a 404 status means "not found".
#[cfg(feature = "http")]
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

#[cfg(feature = "http")]
impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> LoadResult<FetchResponse> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| fetch_error(url, e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(FetchResponse::NotFound);
        }
        if !response.status().is_success() {
            return Err(fetch_error(url, format!("HTTP {}", response.status())));
        }

        let text = response.text().await.map_err(|e| fetch_error(url, e))?;
        Ok(FetchResponse::Found(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_fetcher_reads_and_reports_missing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.jsx"), "export default 1;").unwrap();

        let found = Url::from_file_path(dir.path().join("app.jsx")).unwrap();
        let missing = Url::from_file_path(dir.path().join("nope.jsx")).unwrap();

        assert_eq!(
            FileFetcher.fetch(&found).await.unwrap(),
            FetchResponse::Found("export default 1;".to_string())
        );
        assert_eq!(FileFetcher.fetch(&missing).await.unwrap(), FetchResponse::NotFound);
    }

    #[tokio::test]
    async fn test_file_fetcher_rejects_non_file_urls() {
        let url = Url::parse("http://localhost/app.js").unwrap();
        assert!(matches!(
            FileFetcher.fetch(&url).await,
            Err(LoadError::Fetch { .. })
        ));
    }

    #[tokio::test]
    async fn test_memory_fetcher_lookup() {
        let fetcher = MemoryFetcher::new().with_file("http://h/a.js", "1");
        let hit = Url::parse("http://h/a.js").unwrap();
        let miss = Url::parse("http://h/b.js").unwrap();
        assert_eq!(fetcher.fetch(&hit).await.unwrap(), FetchResponse::Found("1".into()));
        assert_eq!(fetcher.fetch(&miss).await.unwrap(), FetchResponse::NotFound);
    }
}
