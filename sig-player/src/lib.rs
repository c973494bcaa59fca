//! Orchestrator crate: wires the cache, scheduler, CMS client and renderer
//! into the single-task collection-cycle loop a running player is.
//!
//! `sig-cli` is the only expected caller: it builds the collaborators
//! (`CacheManager`, `Scheduler`, `CmsClient` transport, `Renderer`) and
//! hands them to [`PlayerCore::new`].

mod core;
mod error;
mod faults;
mod resolver;
mod stats;

pub use core::{PlayerCore, PlayerCoreConfig};
pub use error::{Error, Result};
pub use faults::FaultLog;
pub use resolver::CacheResolver;
pub use stats::StatsCollector;
