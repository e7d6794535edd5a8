use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use super::progress::scale;

const CHUNK_SIZE: usize = 8 * 1024;

/// Some installer hosts refuse requests without a browser user agent.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64)";

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Download failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Server returned status {0}")]
    HttpStatus(reqwest::StatusCode),

    #[error("Failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Download cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownloadProgress {
    /// Position on the overall scale, inside the caller's range
    pub percent: f64,
    pub downloaded: u64,
    pub total: Option<u64>,
}

/// Streams installers to disk.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: reqwest::Client,
    keep_partial: bool,
}

impl Downloader {
    pub fn new(connect_timeout: Duration) -> Result<Self, DownloadError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            keep_partial: false,
        }
    }

    /// Leave partially written files in place when a download fails.
    pub fn keep_partial_files(mut self, keep: bool) -> Self {
        self.keep_partial = keep;
        self
    }

    /// Download `url` to `destination`, reporting progress inside `range`.
    ///
    /// Without a usable content length no intermediate progress is reported;
    /// the final report always lands on the end of `range`.
    pub async fn download<F>(
        &self,
        url: &str,
        destination: &Path,
        range: (f64, f64),
        mut on_progress: F,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, DownloadError>
    where
        F: FnMut(DownloadProgress) + Send,
    {
        let response = tokio::select! {
            response = self.client.get(url).send() => response?,
            _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
        };

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::HttpStatus(status));
        }

        let total = response.content_length().filter(|&len| len > 0);
        let mut file = File::create(destination)
            .await
            .map_err(|source| io_error(destination, source))?;

        let result = stream_to_file(response, &mut file, destination, |downloaded| {
            if total.is_some() {
                on_progress(DownloadProgress {
                    percent: scale(range, downloaded, total),
                    downloaded,
                    total,
                });
            }
        }, cancel)
        .await;
        drop(file);

        match result {
            Ok(downloaded) => {
                on_progress(DownloadProgress {
                    percent: scale(range, 1, Some(1)),
                    downloaded,
                    total,
                });
                Ok(destination.to_path_buf())
            }
            Err(err) => {
                if !self.keep_partial {
                    let _ = tokio::fs::remove_file(destination).await;
                }
                Err(err)
            }
        }
    }
}

async fn stream_to_file<F>(
    response: reqwest::Response,
    file: &mut File,
    destination: &Path,
    mut on_bytes: F,
    cancel: &CancellationToken,
) -> Result<u64, DownloadError>
where
    F: FnMut(u64) + Send,
{
    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;

    loop {
        let next = tokio::select! {
            next = stream.next() => next,
            _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
        };
        let Some(chunk) = next else {
            break;
        };
        let chunk = chunk?;

        for piece in chunk.chunks(CHUNK_SIZE) {
            file.write_all(piece)
                .await
                .map_err(|source| io_error(destination, source))?;
            downloaded += piece.len() as u64;
            on_bytes(downloaded);
        }
    }

    file.flush()
        .await
        .map_err(|source| io_error(destination, source))?;
    Ok(downloaded)
}

fn io_error(path: &Path, source: std::io::Error) -> DownloadError {
    DownloadError::Io {
        path: path.to_path_buf(),
        source,
    }
}
