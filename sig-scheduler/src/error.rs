//! Error type for schedule validation.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("campaign {0} has no layouts")]
    EmptyCampaign(i64),

    #[error("event {0:?} targets unknown campaign {1}")]
    UnknownCampaign(String, i64),
}

pub type Result<T> = std::result::Result<T, Error>;
