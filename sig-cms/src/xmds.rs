//! XMDS SOAP client. Builds/parses envelopes through [`crate::soap`],
//! typed payloads through [`crate::wire`] — a hand-rolled request
//! builder and response parser around a service URN, one method per
//! XMDS operation.

use std::collections::HashMap;

use async_trait::async_trait;
use sig_types::RequiredFile;

use crate::dto::{CmsClient, LogRecord, MediaInventoryEntry, RegisterResult, StatRecord};
use crate::error::Result;
use crate::soap::{build_soap_request, parse_soap_response};
use crate::wire::{parse_required_files, parse_schedule, ScheduleResponse};

pub struct XmdsClient {
    http: reqwest::Client,
    base_url: String,
    cms_key: String,
    hardware_key: String,
    display_name: String,
    client_type: String,
    client_version: String,
}

impl XmdsClient {
    pub fn new(base_url: String, cms_key: String, hardware_key: String, display_name: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            cms_key,
            hardware_key,
            display_name,
            client_type: "linux".to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    async fn call(&self, action: &str, args: &[(&str, &str)]) -> Result<String> {
        let body = build_soap_request(action, args);
        let soap_action = format!(r#""urn:xmds#{action}""#);

        let response = self
            .http
            .post(&self.base_url)
            .header("Content-Type", r#"text/xml; charset="utf-8""#)
            .header("SOAPAction", soap_action)
            .body(body)
            .send()
            .await?
            .error_for_status()?;

        let text = response.text().await?;
        let parsed = parse_soap_response(&text)?;
        Ok(parsed.inner_xml)
    }

    fn tagged(inner_xml: &str, tag: &str) -> Option<String> {
        let open = format!("<{tag}>");
        let close = format!("</{tag}>");
        let start = inner_xml.find(&open)? + open.len();
        let end = inner_xml[start..].find(&close)? + start;
        Some(inner_xml[start..end].to_string())
    }
}

#[async_trait]
impl CmsClient for XmdsClient {
    async fn register_display(&self) -> Result<RegisterResult> {
        let inner = self
            .call(
                "RegisterDisplay",
                &[
                    ("serverKey", &self.cms_key),
                    ("hardwareKey", &self.hardware_key),
                    ("displayName", &self.display_name),
                    ("clientType", &self.client_type),
                    ("clientVersion", &self.client_version),
                    ("clientCode", "0"),
                    ("macAddress", ""),
                    ("operatingSystem", std::env::consts::OS),
                ],
            )
            .await?;

        let status = Self::tagged(&inner, "status").unwrap_or_else(|| "unknown".to_string());
        let check_schedule = Self::tagged(&inner, "requiredFilesDownloaded").unwrap_or_default();
        let check_rf = Self::tagged(&inner, "requiredFilesCrc").unwrap_or_default();
        let xmr_address = Self::tagged(&inner, "xmrNetworkAddress");
        let xmr_public_key = Self::tagged(&inner, "xmrPublicKey");

        let mut display_settings = HashMap::new();
        if let Some(collect) = Self::tagged(&inner, "collectInterval") {
            display_settings.insert("collectInterval".to_string(), collect);
        }

        Ok(RegisterResult {
            status,
            display_settings,
            xmr_address,
            xmr_public_key,
            check_schedule: Self::tagged(&inner, "scheduleCrc").unwrap_or_default(),
            check_rf,
        })
    }

    async fn required_files(&self) -> Result<Vec<RequiredFile>> {
        let inner = self
            .call(
                "RequiredFiles",
                &[("serverKey", &self.cms_key), ("hardwareKey", &self.hardware_key)],
            )
            .await?;
        parse_required_files(&inner)
    }

    async fn schedule(&self) -> Result<ScheduleResponse> {
        let inner = self
            .call(
                "Schedule",
                &[("serverKey", &self.cms_key), ("hardwareKey", &self.hardware_key)],
            )
            .await?;
        parse_schedule(&inner)
    }

    async fn get_resource(&self, layout_id: i64, region_id: &str, media_id: &str) -> Result<String> {
        let layout_str = layout_id.to_string();
        let inner = self
            .call(
                "GetResource",
                &[
                    ("serverKey", &self.cms_key),
                    ("hardwareKey", &self.hardware_key),
                    ("layoutId", &layout_str),
                    ("regionId", region_id),
                    ("mediaId", media_id),
                ],
            )
            .await?;
        Ok(inner)
    }

    async fn submit_stats(&self, records: &[StatRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let payload = records
            .iter()
            .map(|r| {
                format!(
                    "<stat layoutid=\"{}\" widgetid=\"{}\" starttime=\"{}\" duration=\"{}\"/>",
                    r.layout_id,
                    r.widget_id.as_deref().unwrap_or(""),
                    r.started_at.to_rfc3339(),
                    r.duration_secs
                )
            })
            .collect::<String>();
        self.call(
            "SubmitStats",
            &[
                ("serverKey", &self.cms_key),
                ("hardwareKey", &self.hardware_key),
                ("stats", &payload),
            ],
        )
        .await?;
        Ok(())
    }

    async fn submit_log(&self, records: &[LogRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let payload = records
            .iter()
            .map(|r| {
                format!(
                    "<log type=\"{}\" message=\"{}\" context=\"{}\" timestamp=\"{}\"/>",
                    r.fault_type,
                    xml_escape(&r.message),
                    xml_escape(&r.context),
                    r.timestamp.to_rfc3339()
                )
            })
            .collect::<String>();
        self.call(
            "SubmitLog",
            &[
                ("serverKey", &self.cms_key),
                ("hardwareKey", &self.hardware_key),
                ("logXml", &payload),
            ],
        )
        .await?;
        Ok(())
    }

    async fn notify_status(&self, status_json: &str) -> Result<()> {
        self.call(
            "NotifyStatus",
            &[
                ("serverKey", &self.cms_key),
                ("hardwareKey", &self.hardware_key),
                ("status", status_json),
            ],
        )
        .await?;
        Ok(())
    }

    async fn media_inventory(&self, entries: &[MediaInventoryEntry]) -> Result<()> {
        let payload = entries
            .iter()
            .map(|e| {
                format!(
                    "<file id=\"{}\" complete=\"{}\" lastChecked=\"{}\"/>",
                    e.media_id,
                    if e.complete { 1 } else { 0 },
                    e.last_checked.to_rfc3339()
                )
            })
            .collect::<String>();
        self.call(
            "MediaInventory",
            &[
                ("serverKey", &self.cms_key),
                ("hardwareKey", &self.hardware_key),
                ("mediaInventory", &payload),
            ],
        )
        .await?;
        Ok(())
    }

    async fn submit_screen_shot(&self, png_base64: &str) -> Result<()> {
        self.call(
            "SubmitScreenShot",
            &[
                ("serverKey", &self.cms_key),
                ("hardwareKey", &self.hardware_key),
                ("screenShot", png_base64),
            ],
        )
        .await?;
        Ok(())
    }

    async fn black_list(&self, media_id: &str, reason: &str) -> Result<()> {
        self.call(
            "BlackList",
            &[
                ("serverKey", &self.cms_key),
                ("hardwareKey", &self.hardware_key),
                ("mediaId", media_id),
                ("reason", reason),
            ],
        )
        .await?;
        Ok(())
    }
}

fn xml_escape(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;").replace('<', "&lt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn register_display_parses_status_and_crc_tokens() {
        let server = MockServer::start().await;
        let body = r#"<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://schemas.xmlsoap.org/soap/envelope/">
            <SOAP-ENV:Body>
                <RegisterDisplayResponse>
                    <status>ready</status>
                    <scheduleCrc>abc123</scheduleCrc>
                    <requiredFilesCrc>def456</requiredFilesCrc>
                    <xmrNetworkAddress>tcp://cms:9505</xmrNetworkAddress>
                </RegisterDisplayResponse>
            </SOAP-ENV:Body>
        </SOAP-ENV:Envelope>"#;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let client = XmdsClient::new(server.uri(), "key".into(), "hw".into(), "Lobby Display".into());
        let result = client.register_display().await.unwrap();
        assert_eq!(result.status, "ready");
        assert_eq!(result.check_schedule, "abc123");
        assert_eq!(result.check_rf, "def456");
        assert_eq!(result.xmr_address.as_deref(), Some("tcp://cms:9505"));
    }

    #[tokio::test]
    async fn required_files_parses_layout_and_media_entries() {
        let server = MockServer::start().await;
        let body = r#"<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://schemas.xmlsoap.org/soap/envelope/">
            <SOAP-ENV:Body>
                <RequiredFilesResponse>
                    <file type="L" id="7" path="7.xlf" md5="abc" size="500"/>
                    <file type="M" id="42" path="42.mp4" md5="def" size="1024"/>
                </RequiredFilesResponse>
            </SOAP-ENV:Body>
        </SOAP-ENV:Envelope>"#;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let client = XmdsClient::new(server.uri(), "key".into(), "hw".into(), "Lobby Display".into());
        let files = client.required_files().await.unwrap();
        assert_eq!(files.len(), 2);
    }
}
