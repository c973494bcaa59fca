//! Error type for the layout runtime.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("layout {0} has no regions")]
    EmptyLayout(i64),

    #[error("no layout is currently hot")]
    NoHotLayout,

    #[error("widget {0} not found in the hot layout")]
    UnknownWidget(String),

    #[error("region {0} not found in the hot layout")]
    UnknownRegion(String),
}

pub type Result<T> = std::result::Result<T, Error>;
