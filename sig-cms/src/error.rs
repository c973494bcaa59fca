//! Error type for the CMS client (XMDS/REST + XMR).

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::de::DeError),

    #[error("xml write error: {0}")]
    XmlWrite(#[from] quick_xml::SeError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SOAP fault: {0}")]
    SoapFault(String),

    #[error("CMS rejected the call: {0}")]
    Protocol(String),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
