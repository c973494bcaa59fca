//! Error type for the orchestrator. Most failures here are logged and
//! recovered from inline rather than returned;
//! this type exists for the handful that should abort a collection cycle
//! or a cold start.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cache error: {0}")]
    Cache(#[from] sig_cache::Error),

    #[error("scheduler error: {0}")]
    Scheduler(#[from] sig_scheduler::Error),

    #[error("renderer error: {0}")]
    Renderer(#[from] sig_renderer::Error),

    #[error("cms error: {0}")]
    Cms(#[from] sig_cms::Error),

    #[error("xlf error: {0}")]
    Xlf(#[from] sig_types::Error),

    #[error("no layout available anywhere")]
    NoContent,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
