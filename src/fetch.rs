//! External document fetching
//!
//! The resolver only sees [`SchemaFetcher`]: give it a URL, get text back.
//! Timeouts belong to the implementation; [`HttpFetcher`] applies the
//! configured per-request timeout.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;
use url::Url;

use crate::config::FetchConfig;
use crate::error::FetchError;

/// Opaque `fetch(url) -> text` capability
pub trait SchemaFetcher {
    fn fetch_text(&self, url: &str) -> Result<String, FetchError>;
}

impl<F> SchemaFetcher for F
where
    F: Fn(&str) -> Result<String, FetchError>,
{
    fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        self(url)
    }
}

// =============================================================================
// Local files
// =============================================================================

/// Reads `file://` URLs and plain paths, relative paths against `root`
#[derive(Debug, Clone, Default)]
pub struct FileFetcher {
    root: Option<PathBuf>,
}

impl FileFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn path_for(&self, url: &str) -> Result<PathBuf, FetchError> {
        if let Ok(parsed) = Url::parse(url) {
            if parsed.scheme() != "file" {
                return Err(FetchError::UnsupportedUrl(url.to_string()));
            }
            return parsed
                .to_file_path()
                .map_err(|_| FetchError::UnsupportedUrl(url.to_string()));
        }
        let path = Path::new(url);
        Ok(match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        })
    }
}

impl SchemaFetcher for FileFetcher {
    fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        let path = self.path_for(url)?;
        debug!(path = %path.display(), "reading schema file");
        fs::read_to_string(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => FetchError::NotFound(path.display().to_string()),
            _ => FetchError::Io(e),
        })
    }
}

// =============================================================================
// HTTP
// =============================================================================

/// Blocking HTTP(S) fetcher with a per-request timeout
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| FetchError::Request {
                url: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }

    pub fn from_config(config: &FetchConfig) -> Result<Self, FetchError> {
        Self::new(config.timeout(), &config.user_agent)
    }
}

impl SchemaFetcher for HttpFetcher {
    fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        debug!(url, "fetching schema over HTTP");
        let request_error = |e: reqwest::Error| FetchError::Request {
            url: url.to_string(),
            message: e.to_string(),
        };
        let response = self.client.get(url).send().map_err(request_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        response.text().map_err(request_error)
    }
}

// =============================================================================
// Scheme dispatch
// =============================================================================

/// Routes `http(s)://` to [`HttpFetcher`] and everything else to [`FileFetcher`]
#[derive(Debug, Clone)]
pub struct DefaultFetcher {
    http: HttpFetcher,
    files: FileFetcher,
}

impl DefaultFetcher {
    pub fn new(http: HttpFetcher, files: FileFetcher) -> Self {
        Self { http, files }
    }

    pub fn from_config(config: &FetchConfig) -> Result<Self, FetchError> {
        Ok(Self::new(HttpFetcher::from_config(config)?, FileFetcher::new()))
    }
}

impl SchemaFetcher for DefaultFetcher {
    fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        match Url::parse(url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => self.http.fetch_text(url),
            _ => self.files.fetch_text(url),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_fetcher_reads_relative_to_root() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.json"), r#"{"type":"string"}"#).unwrap();

        let fetcher = FileFetcher::with_root(dir.path());
        assert_eq!(fetcher.fetch_text("a.json").unwrap(), r#"{"type":"string"}"#);
    }

    #[test]
    fn test_file_fetcher_reads_file_urls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.json");
        fs::write(&path, "{}").unwrap();

        let url = Url::from_file_path(&path).unwrap();
        assert_eq!(FileFetcher::new().fetch_text(url.as_str()).unwrap(), "{}");
    }

    #[test]
    fn test_file_fetcher_errors() {
        let fetcher = FileFetcher::new();
        assert!(matches!(
            fetcher.fetch_text("https://example.com/a.json"),
            Err(FetchError::UnsupportedUrl(_))
        ));
        assert!(matches!(
            fetcher.fetch_text("/definitely/not/here.json"),
            Err(FetchError::NotFound(_))
        ));
    }

    #[test]
    fn test_closure_fetcher() {
        let fetcher = |url: &str| -> Result<String, FetchError> { Ok(format!("\"{}\"", url)) };
        assert_eq!(fetcher.fetch_text("x").unwrap(), "\"x\"");
    }
}
