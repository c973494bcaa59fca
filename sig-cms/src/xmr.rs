//! XMR push channel: commands the CMS pushes outside the collection
//! cycle. Modeled as a `trait XmrTransport` so `sig-player` never depends on
//! the concrete WebSocket wiring, only on `next_command`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::error::{Error, Result};

/// One parsed XMR message, `{action, createdDt, ttl, <action-specific>}`.
/// `Heartbeat` is the literal string `"H"`.
#[derive(Debug, Clone, PartialEq)]
pub enum XmrCommand {
    Heartbeat,
    CollectNow,
    ScreenShot,
    ChangeLayout { layout_id: i64, duration_secs: Option<u32> },
    OverlayLayout { layout_id: i64 },
    RevertToSchedule,
    PurgeAll,
    CommandAction { command_code: String },
    TriggerWebhook { trigger_code: String },
    DataUpdate { data_source_id: String },
    CriteriaUpdate,
    LicenceCheck,
}

#[derive(Debug, Clone)]
pub struct XmrMessage {
    pub command: XmrCommand,
    pub created_dt: DateTime<Utc>,
    pub ttl: u32,
}

impl XmrMessage {
    /// Whether this message is still actionable; the TTL on each message
    /// is honored.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        if self.ttl == 0 {
            return false;
        }
        (now - self.created_dt).num_seconds() > self.ttl as i64
    }
}

#[derive(Debug, Deserialize)]
struct RawXmrMessage {
    action: String,
    #[serde(rename = "createdDt", default)]
    created_dt: Option<DateTime<Utc>>,
    #[serde(default)]
    ttl: u32,
    #[serde(rename = "layoutId", default)]
    layout_id: Option<i64>,
    #[serde(rename = "duration", default)]
    duration: Option<u32>,
    #[serde(rename = "commandCode", default)]
    command_code: Option<String>,
    #[serde(rename = "triggerCode", default)]
    trigger_code: Option<String>,
    #[serde(rename = "dataSourceId", default)]
    data_source_id: Option<String>,
}

/// Parses one raw XMR payload. The literal string `"H"` is the heartbeat and
/// has no JSON structure at all, so it's checked before attempting to
/// deserialize.
pub fn parse_xmr_message(raw: &str) -> Result<XmrMessage> {
    if raw.trim() == "H" {
        return Ok(XmrMessage {
            command: XmrCommand::Heartbeat,
            created_dt: Utc::now(),
            ttl: 0,
        });
    }

    let parsed: RawXmrMessage = serde_json::from_str(raw)?;
    let created_dt = parsed.created_dt.unwrap_or_else(Utc::now);

    let command = match parsed.action.as_str() {
        "collectNow" => XmrCommand::CollectNow,
        "screenShot" => XmrCommand::ScreenShot,
        "changeLayout" => XmrCommand::ChangeLayout {
            layout_id: parsed
                .layout_id
                .ok_or_else(|| Error::Protocol("changeLayout missing layoutId".into()))?,
            duration_secs: parsed.duration,
        },
        "overlayLayout" => XmrCommand::OverlayLayout {
            layout_id: parsed
                .layout_id
                .ok_or_else(|| Error::Protocol("overlayLayout missing layoutId".into()))?,
        },
        "revertToSchedule" => XmrCommand::RevertToSchedule,
        "purgeAll" => XmrCommand::PurgeAll,
        "commandAction" => XmrCommand::CommandAction {
            command_code: parsed.command_code.unwrap_or_default(),
        },
        "triggerWebhook" => XmrCommand::TriggerWebhook {
            trigger_code: parsed.trigger_code.unwrap_or_default(),
        },
        "dataUpdate" => XmrCommand::DataUpdate {
            data_source_id: parsed.data_source_id.unwrap_or_default(),
        },
        "criteriaUpdate" => XmrCommand::CriteriaUpdate,
        "licenceCheck" => XmrCommand::LicenceCheck,
        other => return Err(Error::Protocol(format!("unrecognized XMR action: {other}"))),
    };

    Ok(XmrMessage {
        command,
        created_dt,
        ttl: parsed.ttl,
    })
}

/// Source of XMR messages, wire-agnostic so `sig-player` can drive its
/// collection-cycle `tokio::select!` against either a live socket or a fake.
#[async_trait]
pub trait XmrTransport: Send {
    async fn next_command(&mut self) -> Option<XmrMessage>;
}

/// WebSocket-backed transport for the push channel.
pub struct WebSocketXmrTransport {
    stream: tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
}

impl WebSocketXmrTransport {
    pub async fn connect(url: &str) -> Result<Self> {
        let (stream, _response) = tokio_tungstenite::connect_async(url).await?;
        Ok(Self { stream })
    }
}

#[async_trait]
impl XmrTransport for WebSocketXmrTransport {
    async fn next_command(&mut self) -> Option<XmrMessage> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => match parse_xmr_message(&text) {
                    Ok(msg) => return Some(msg),
                    Err(err) => {
                        tracing::warn!(error = %err, "dropping malformed XMR message");
                        continue;
                    }
                },
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
                Ok(Message::Close(_)) => return None,
                Ok(_) => continue,
                Err(err) => {
                    tracing::warn!(error = %err, "XMR socket error");
                    return None;
                }
            }
        }
    }
}

/// In-memory fake transport for tests: an `mpsc::Sender<XmrMessage>` feeds a
/// `next_command()` consumer without any network involved.
pub struct FakeXmrTransport {
    rx: mpsc::UnboundedReceiver<XmrMessage>,
}

impl FakeXmrTransport {
    pub fn channel() -> (mpsc::UnboundedSender<XmrMessage>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }
}

#[async_trait]
impl XmrTransport for FakeXmrTransport {
    async fn next_command(&mut self) -> Option<XmrMessage> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_heartbeat() {
        let msg = parse_xmr_message("H").unwrap();
        assert_eq!(msg.command, XmrCommand::Heartbeat);
    }

    #[test]
    fn parses_change_layout() {
        let raw = r#"{"action":"changeLayout","createdDt":"2026-01-01T00:00:00Z","ttl":60,"layoutId":42,"duration":30}"#;
        let msg = parse_xmr_message(raw).unwrap();
        assert_eq!(
            msg.command,
            XmrCommand::ChangeLayout {
                layout_id: 42,
                duration_secs: Some(30)
            }
        );
        assert_eq!(msg.ttl, 60);
    }

    #[test]
    fn rejects_unknown_action() {
        let raw = r#"{"action":"doSomethingWeird","createdDt":"2026-01-01T00:00:00Z","ttl":0}"#;
        assert!(parse_xmr_message(raw).is_err());
    }

    #[test]
    fn expired_message_detected_via_ttl() {
        let msg = XmrMessage {
            command: XmrCommand::CollectNow,
            created_dt: Utc::now() - chrono::Duration::seconds(120),
            ttl: 60,
        };
        assert!(msg.is_expired(Utc::now()));
    }

    #[tokio::test]
    async fn fake_transport_delivers_sent_messages() {
        let (tx, mut transport) = FakeXmrTransport::channel();
        tx.send(XmrMessage {
            command: XmrCommand::CollectNow,
            created_dt: Utc::now(),
            ttl: 0,
        })
        .unwrap();
        let received = transport.next_command().await.unwrap();
        assert_eq!(received.command, XmrCommand::CollectNow);
    }
}
