use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use super::Catalog;

/// Failure to obtain the catalog. Fatal: nothing can be installed without it.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Failed to reach catalog server: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Catalog server returned status {0}")]
    HttpStatus(reqwest::StatusCode),

    #[error("Failed to read catalog file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Catalog is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Where the catalog document comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogSource {
    Url(String),
    File(PathBuf),
}

impl CatalogSource {
    /// `http(s)://` is fetched over the network, `file://` and anything else
    /// is read from disk.
    pub fn parse(source: &str) -> Self {
        if source.starts_with("http://") || source.starts_with("https://") {
            CatalogSource::Url(source.to_string())
        } else if let Some(path) = source.strip_prefix("file://") {
            CatalogSource::File(PathBuf::from(path))
        } else {
            CatalogSource::File(PathBuf::from(shellexpand::tilde(source).as_ref()))
        }
    }
}

impl std::fmt::Display for CatalogSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogSource::Url(url) => write!(f, "{url}"),
            CatalogSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Fetch and parse the catalog.
pub async fn fetch_catalog(source: &CatalogSource, timeout: Duration) -> Result<Catalog, FetchError> {
    match source {
        CatalogSource::Url(url) => {
            let client = reqwest::Client::builder()
                .user_agent(format!("spaller/{}", env!("CARGO_PKG_VERSION")))
                .timeout(timeout)
                .build()?;
            fetch_remote(&client, url).await
        }
        CatalogSource::File(path) => {
            let body = tokio::fs::read_to_string(path)
                .await
                .map_err(|source| FetchError::Io {
                    path: path.clone(),
                    source,
                })?;
            Ok(Catalog::from_json(&body)?)
        }
    }
}

async fn fetch_remote(client: &reqwest::Client, url: &str) -> Result<Catalog, FetchError> {
    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        return Err(FetchError::HttpStatus(response.status()));
    }

    let body = response.text().await?;
    Ok(Catalog::from_json(&body)?)
}
