//! Layout runtime: the two-entry hot/warm layout pool, region/widget
//! cycling, transitions and resource-lifecycle discipline.
//!
//! `sig-player` owns the single [`Renderer`] instance and is the only task
//! that should ever call its `&mut self` methods or drain [`RendererEvent`]s
//! during normal operation — tests may attach extra `subscribe()`d receivers freely.

mod error;
mod event;
mod grouping;
mod instance;
mod media;
mod pool;
mod renderer;
mod transition;

pub use error::{Error, Result};
pub use event::RendererEvent;
pub use instance::{LayoutInstance, RegionRuntime, WidgetSlot, WidgetState};
pub use media::{MediaRef, MediaResolver, WidgetContent};
pub use pool::LayoutPool;
pub use renderer::Renderer;
pub use transition::sample as sample_transition;
