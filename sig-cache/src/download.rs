//! Parallel chunked downloader with integrity verification and
//! exponential-backoff retry.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use md5::{Digest, Md5};
use reqwest::Client;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Semaphore;

use crate::error::{Error, Result};

const DEFAULT_CHUNK_COUNT: u64 = 4;
const MAX_ATTEMPTS: u32 = 3;

/// One `(start, end)` inclusive byte range assigned to a chunk task.
#[derive(Debug, Clone, Copy)]
struct ChunkRange {
    start: u64,
    end: u64,
}

pub struct Downloader {
    client: Client,
    concurrency: Arc<Semaphore>,
}

impl Downloader {
    pub fn new(concurrency: usize) -> Self {
        Self {
            client: Client::new(),
            concurrency: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    /// Downloads `url` to `dest`, split into `chunk_count` parallel Range
    /// requests, verifying the full-file MD5 on completion. Retries the
    /// whole file once on integrity mismatch.
    pub async fn download_verified(
        &self,
        url: &str,
        dest: &Path,
        expected_size: u64,
        expected_md5: &str,
        chunk_count: u64,
    ) -> Result<()> {
        for attempt in 0..2 {
            self.download_once(url, dest, expected_size, chunk_count)
                .await?;

            let actual_md5 = md5_of_file(dest).await?;
            if actual_md5.eq_ignore_ascii_case(expected_md5) {
                return Ok(());
            }

            tracing::warn!(
                url,
                attempt,
                expected_md5,
                actual_md5,
                "downloaded file failed integrity check"
            );
            if attempt == 1 {
                let _ = tokio::fs::remove_file(dest).await;
                return Err(Error::IntegrityMismatch(
                    sig_types::CacheKind::Media,
                    url.to_string(),
                    expected_md5.to_string(),
                    actual_md5,
                ));
            }
        }
        unreachable!()
    }

    async fn download_once(
        &self,
        url: &str,
        dest: &Path,
        expected_size: u64,
        chunk_count: u64,
    ) -> Result<()> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = tokio::fs::File::create(dest).await?;
        file.set_len(expected_size).await?;
        drop(file);

        let ranges = split_ranges(expected_size, chunk_count.max(1));
        let mut handles = Vec::with_capacity(ranges.len());

        for range in ranges {
            let client = self.client.clone();
            let url = url.to_string();
            let dest = dest.to_path_buf();
            let permit = self.concurrency.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit.acquire_owned().await.expect("semaphore closed");
                download_chunk_with_retry(&client, &url, &dest, range).await
            }));
        }

        for handle in handles {
            handle
                .await
                .map_err(|e| Error::DownloadFailed(sig_types::CacheKind::Media, String::new(), e.to_string()))??;
        }

        Ok(())
    }
}

async fn download_chunk_with_retry(
    client: &Client,
    url: &str,
    dest: &Path,
    range: ChunkRange,
) -> Result<()> {
    let mut last_err = None;
    for attempt in 1..=MAX_ATTEMPTS {
        match download_chunk(client, url, dest, range).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                tracing::warn!(url, attempt, error = %e, "chunk download failed, retrying");
                last_err = Some(e);
                tokio::time::sleep(Duration::from_secs(2 * attempt as u64)).await;
            }
        }
    }
    Err(Error::DownloadFailed(
        sig_types::CacheKind::Media,
        url.to_string(),
        last_err.map(|e| e.to_string()).unwrap_or_default(),
    ))
}

async fn download_chunk(client: &Client, url: &str, dest: &Path, range: ChunkRange) -> Result<()> {
    let response = client
        .get(url)
        .header("Range", format!("bytes={}-{}", range.start, range.end))
        .send()
        .await?
        .error_for_status()?;

    let mut file = tokio::fs::OpenOptions::new().write(true).open(dest).await?;
    file.seek(std::io::SeekFrom::Start(range.start)).await?;

    let bytes = response.bytes().await?;
    file.write_all(&bytes).await?;
    file.flush().await?;
    Ok(())
}

fn split_ranges(total_size: u64, chunk_count: u64) -> Vec<ChunkRange> {
    if total_size == 0 {
        return vec![ChunkRange { start: 0, end: 0 }];
    }
    let chunk_count = chunk_count.min(total_size).max(1);
    let base = total_size / chunk_count;
    let mut ranges = Vec::with_capacity(chunk_count as usize);
    let mut start = 0;
    for i in 0..chunk_count {
        let end = if i == chunk_count - 1 {
            total_size - 1
        } else {
            start + base - 1
        };
        ranges.push(ChunkRange { start, end });
        start = end + 1;
    }
    ranges
}

async fn md5_of_file(path: &Path) -> Result<String> {
    let data = tokio::fs::read(path).await?;
    let mut hasher = Md5::new();
    hasher.update(&data);
    Ok(hex::encode(hasher.finalize()))
}

pub fn default_chunk_count() -> u64 {
    DEFAULT_CHUNK_COUNT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_ranges_covers_whole_file_exactly() {
        let ranges = split_ranges(1000, 4);
        assert_eq!(ranges.len(), 4);
        assert_eq!(ranges[0].start, 0);
        assert_eq!(ranges.last().unwrap().end, 999);
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].end + 1, pair[1].start);
        }
    }

    #[test]
    fn split_ranges_handles_tiny_files() {
        let ranges = split_ranges(2, 4);
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges.last().unwrap().end, 1);
    }
}
