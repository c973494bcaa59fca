//! Two-entry hot/warm layout pool. Capacity is fixed
//! at one hot (visible, playing) plus one warm (preloaded, hidden) entry;
//! a "configurable pool size" would be a single constant since nothing in
//! this system ever asks for a larger pool.

use crate::instance::LayoutInstance;

#[derive(Default)]
pub struct LayoutPool {
    pub hot: Option<LayoutInstance>,
    pub warm: Option<LayoutInstance>,
}

impl LayoutPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, layout_id: i64) -> bool {
        self.hot.as_ref().map(|l| l.layout_id) == Some(layout_id)
            || self.warm.as_ref().map(|l| l.layout_id) == Some(layout_id)
    }

    pub fn is_warm(&self, layout_id: i64) -> bool {
        self.warm.as_ref().map(|l| l.layout_id) == Some(layout_id)
    }

    pub fn hot_layout_id(&self) -> Option<i64> {
        self.hot.as_ref().map(|l| l.layout_id)
    }

    /// Adds a freshly built instance as warm, evicting any existing warm
    /// entry first (capacity is one warm slot at a time).
    pub fn add_warm(&mut self, instance: LayoutInstance) -> Option<LayoutInstance> {
        self.warm.replace(instance)
    }

    /// Promotes the warm entry to hot, returning the previous hot entry (if
    /// any) for the caller to tear down/evict.
    pub fn make_hot(&mut self, layout_id: i64) -> Option<LayoutInstance> {
        if self.warm.as_ref().map(|l| l.layout_id) != Some(layout_id) {
            return None;
        }
        let previous_hot = self.hot.take();
        self.hot = self.warm.take();
        previous_hot
    }

    /// Directly installs `instance` as hot (cold-render path), returning
    /// the displaced hot entry if one existed.
    pub fn set_hot(&mut self, instance: LayoutInstance) -> Option<LayoutInstance> {
        self.hot.replace(instance)
    }

    pub fn take_warm_if(&mut self, layout_id: i64) -> Option<LayoutInstance> {
        if self.warm.as_ref().map(|l| l.layout_id) == Some(layout_id) {
            self.warm.take()
        } else {
            None
        }
    }

    /// Clears the warm slot unless it's in `keep_id`.
    pub fn clear_warm_not_in(&mut self, keep_id: Option<i64>) -> Option<LayoutInstance> {
        if self.warm.as_ref().map(|l| l.layout_id) != keep_id {
            self.warm.take()
        } else {
            None
        }
    }
}
