//! CMS client: XMDS SOAP / REST transports plus the XMR push channel.
//!
//! `sig-player` depends only on [`CmsClient`] and [`XmrTransport`] — never on
//! [`XmdsClient`], [`RestClient`], or [`WebSocketXmrTransport`] directly —
//! so swapping wire protocols never touches the collection cycle.

pub mod dto;
pub mod error;
pub mod rest;
pub mod soap;
pub mod wire;
pub mod xmds;
pub mod xmr;

pub use dto::{CmsClient, LogRecord, MediaInventoryEntry, RegisterResult, StatRecord};
pub use error::{Error, Result};
pub use rest::RestClient;
pub use wire::ScheduleResponse;
pub use xmds::XmdsClient;
pub use xmr::{FakeXmrTransport, WebSocketXmrTransport, XmrCommand, XmrMessage, XmrTransport};
