//! Shared request/response DTOs and the [`CmsClient`] trait both the SOAP
//! ([`crate::xmds::XmdsClient`]) and REST ([`crate::rest::RestClient`])
//! transports implement, regardless of whether the wire format underneath
//! is SOAP or REST.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sig_types::RequiredFile;

use crate::error::Result;
use crate::wire::ScheduleResponse;

#[derive(Debug, Clone, Default)]
pub struct RegisterResult {
    pub status: String,
    pub display_settings: HashMap<String, String>,
    pub xmr_address: Option<String>,
    pub xmr_public_key: Option<String>,
    /// Server-reported CRC32 tokens: an unchanged
    /// token means the corresponding payload can be skipped this cycle.
    pub check_schedule: String,
    pub check_rf: String,
}

#[derive(Debug, Clone)]
pub struct StatRecord {
    pub layout_id: i64,
    pub widget_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub duration_secs: u32,
}

#[derive(Debug, Clone)]
pub struct LogRecord {
    pub fault_type: String,
    pub message: String,
    pub context: String,
    pub timestamp: DateTime<Utc>,
    pub widget_id: Option<String>,
    pub layout_id: Option<i64>,
    pub region_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MediaInventoryEntry {
    pub media_id: String,
    pub complete: bool,
    pub last_checked: DateTime<Utc>,
}

/// The conceptual operation set XMDS exposes, independent of wire
/// protocol. `sig-player` depends on this trait, never on a concrete
/// transport, so the collection cycle is wire-agnostic.
#[async_trait]
pub trait CmsClient: Send + Sync {
    async fn register_display(&self) -> Result<RegisterResult>;
    async fn required_files(&self) -> Result<Vec<RequiredFile>>;
    async fn schedule(&self) -> Result<ScheduleResponse>;
    async fn get_resource(&self, layout_id: i64, region_id: &str, media_id: &str) -> Result<String>;
    async fn submit_stats(&self, records: &[StatRecord]) -> Result<()>;
    async fn submit_log(&self, records: &[LogRecord]) -> Result<()>;
    async fn notify_status(&self, status_json: &str) -> Result<()>;
    async fn media_inventory(&self, entries: &[MediaInventoryEntry]) -> Result<()>;
    async fn submit_screen_shot(&self, png_base64: &str) -> Result<()>;
    async fn black_list(&self, media_id: &str, reason: &str) -> Result<()>;
}
