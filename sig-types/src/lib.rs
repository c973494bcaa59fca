//! Shared data model for the signage playback core.
//!
//! This crate has no runtime behavior of its own: it defines the immutable
//! descriptors (`Layout`, `Region`, `Widget`, `ScheduleEvent`, ...) that flow
//! between the cache, scheduler, CMS client and renderer crates, plus the
//! XLF parse/serialize layer.

pub mod action;
pub mod error;
pub mod files;
pub mod schedule;
pub mod transition;
pub mod widget;
pub mod xlf;

pub use action::{Action, ActionTrigger, ActionType};
pub use error::{Error, Result};
pub use files::{CacheKind, RequiredFile};
pub use schedule::{Campaign, DayPart, EventTarget, FilterCriteria, ScheduleEvent};
pub use transition::{Transition, TransitionDirection, TransitionKind};
pub use widget::{AudioOverlay, Command, Drawer, Layout, PlaylistGrouping, Region, Widget, WidgetType};
