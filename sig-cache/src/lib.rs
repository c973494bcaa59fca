//! Content cache: download manager, SQLite-backed blob store, and the
//! in-process HTTP proxy the renderer reads media from.

mod cache;
mod db;
mod download;
mod error;
mod widget_html;

pub mod proxy;

pub use cache::{CacheEvent, CacheManager, DownloadStatus, ReconcileResult, Resource};
pub use db::{CacheDb, CacheEntry};
pub use download::{default_chunk_count, Downloader};
pub use error::{Error, Result};
pub use widget_html::parse_duration_comment;
