//! REST/JSON transport for the CMS client. Same method set as
//! [`crate::xmds::XmdsClient`], serialized as JSON over plain HTTP routes
//! instead of SOAP envelopes — for CMS deployments that expose the REST
//! facade rather than the legacy XMDS service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sig_types::RequiredFile;

use crate::dto::{CmsClient, LogRecord, MediaInventoryEntry, RegisterResult, StatRecord};
use crate::error::Result;
use crate::wire::ScheduleResponse;

pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    cms_key: String,
    hardware_key: String,
    display_name: String,
}

impl RestClient {
    pub fn new(base_url: String, cms_key: String, hardware_key: String, display_name: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            cms_key,
            hardware_key,
            display_name,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}

#[derive(Serialize)]
struct RegisterRequestBody<'a> {
    #[serde(rename = "serverKey")]
    server_key: &'a str,
    #[serde(rename = "hardwareKey")]
    hardware_key: &'a str,
    #[serde(rename = "displayName")]
    display_name: &'a str,
}

#[derive(Deserialize)]
struct RegisterResponseBody {
    status: String,
    #[serde(default)]
    #[serde(rename = "displaySettings")]
    display_settings: std::collections::HashMap<String, String>,
    #[serde(default)]
    #[serde(rename = "xmrAddress")]
    xmr_address: Option<String>,
    #[serde(default)]
    #[serde(rename = "xmrPublicKey")]
    xmr_public_key: Option<String>,
    #[serde(default)]
    #[serde(rename = "checkSchedule")]
    check_schedule: String,
    #[serde(default)]
    #[serde(rename = "checkRf")]
    check_rf: String,
}

#[derive(Serialize)]
struct StatRecordBody<'a> {
    #[serde(rename = "layoutId")]
    layout_id: i64,
    #[serde(rename = "widgetId")]
    widget_id: Option<&'a str>,
    #[serde(rename = "startedAt")]
    started_at: String,
    #[serde(rename = "durationSecs")]
    duration_secs: u32,
}

#[derive(Serialize)]
struct LogRecordBody<'a> {
    #[serde(rename = "faultType")]
    fault_type: &'a str,
    message: &'a str,
    context: &'a str,
    timestamp: String,
}

#[async_trait]
impl CmsClient for RestClient {
    async fn register_display(&self) -> Result<RegisterResult> {
        let body = RegisterRequestBody {
            server_key: &self.cms_key,
            hardware_key: &self.hardware_key,
            display_name: &self.display_name,
        };
        let resp: RegisterResponseBody = self
            .http
            .post(self.url("display/register"))
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(RegisterResult {
            status: resp.status,
            display_settings: resp.display_settings,
            xmr_address: resp.xmr_address,
            xmr_public_key: resp.xmr_public_key,
            check_schedule: resp.check_schedule,
            check_rf: resp.check_rf,
        })
    }

    async fn required_files(&self) -> Result<Vec<RequiredFile>> {
        let files = self
            .http
            .get(self.url("display/required-files"))
            .query(&[("hardwareKey", &self.hardware_key)])
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<RequiredFile>>()
            .await?;
        Ok(files)
    }

    async fn schedule(&self) -> Result<ScheduleResponse> {
        #[derive(Deserialize)]
        struct Body {
            events: Vec<sig_types::ScheduleEvent>,
            campaigns: Vec<sig_types::Campaign>,
            #[serde(rename = "defaultLayoutId")]
            default_layout_id: Option<i64>,
        }
        let body: Body = self
            .http
            .get(self.url("display/schedule"))
            .query(&[("hardwareKey", &self.hardware_key)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(ScheduleResponse {
            events: body.events,
            campaigns: body.campaigns,
            default_layout_id: body.default_layout_id,
        })
    }

    async fn get_resource(&self, layout_id: i64, region_id: &str, media_id: &str) -> Result<String> {
        let text = self
            .http
            .get(self.url(&format!("layout/{layout_id}/region/{region_id}/resource/{media_id}")))
            .query(&[("hardwareKey", &self.hardware_key)])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(text)
    }

    async fn submit_stats(&self, records: &[StatRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let body: Vec<StatRecordBody> = records
            .iter()
            .map(|r| StatRecordBody {
                layout_id: r.layout_id,
                widget_id: r.widget_id.as_deref(),
                started_at: r.started_at.to_rfc3339(),
                duration_secs: r.duration_secs,
            })
            .collect();
        self.http
            .post(self.url("display/stats"))
            .query(&[("hardwareKey", &self.hardware_key)])
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn submit_log(&self, records: &[LogRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let body: Vec<LogRecordBody> = records
            .iter()
            .map(|r| LogRecordBody {
                fault_type: &r.fault_type,
                message: &r.message,
                context: &r.context,
                timestamp: r.timestamp.to_rfc3339(),
            })
            .collect();
        self.http
            .post(self.url("display/log"))
            .query(&[("hardwareKey", &self.hardware_key)])
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn notify_status(&self, status_json: &str) -> Result<()> {
        self.http
            .post(self.url("display/status"))
            .query(&[("hardwareKey", &self.hardware_key)])
            .header("Content-Type", "application/json")
            .body(status_json.to_string())
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn media_inventory(&self, entries: &[MediaInventoryEntry]) -> Result<()> {
        self.http
            .post(self.url("display/media-inventory"))
            .query(&[("hardwareKey", &self.hardware_key)])
            .json(entries.iter().map(InventoryEntryBody::from).collect::<Vec<_>>().as_slice())
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn submit_screen_shot(&self, png_base64: &str) -> Result<()> {
        self.http
            .post(self.url("display/screenshot"))
            .query(&[("hardwareKey", &self.hardware_key)])
            .body(png_base64.to_string())
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn black_list(&self, media_id: &str, reason: &str) -> Result<()> {
        self.http
            .post(self.url(&format!("media/{media_id}/blacklist")))
            .query(&[("hardwareKey", &self.hardware_key), ("reason", &reason.to_string())])
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[derive(Serialize)]
struct InventoryEntryBody {
    #[serde(rename = "mediaId")]
    media_id: String,
    complete: bool,
    #[serde(rename = "lastChecked")]
    last_checked: String,
}

impl From<&MediaInventoryEntry> for InventoryEntryBody {
    fn from(e: &MediaInventoryEntry) -> Self {
        Self {
            media_id: e.media_id.clone(),
            complete: e.complete,
            last_checked: e.last_checked.to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn register_display_parses_json_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/display/register"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "ready",
                "checkSchedule": "abc",
                "checkRf": "def",
            })))
            .mount(&server)
            .await;

        let client = RestClient::new(server.uri(), "key".into(), "hw".into(), "Lobby".into());
        let result = client.register_display().await.unwrap();
        assert_eq!(result.status, "ready");
        assert_eq!(result.check_schedule, "abc");
    }
}
