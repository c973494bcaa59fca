//! Proof-of-play bookkeeping.
//!
//! An in-memory queue guarded by a `Mutex`, drained by a periodic flush
//! rather than on every event, so a slow/unreachable CMS never blocks the
//! render loop.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use sig_cms::{LogRecord, StatRecord};

struct OpenLayout {
    started_at: DateTime<Utc>,
}

struct OpenWidget {
    started_at: DateTime<Utc>,
    layout_id: i64,
}

/// Accumulates layout/widget proof-of-play records between CMS flushes.
pub struct StatsCollector {
    open_layouts: Mutex<HashMap<i64, OpenLayout>>,
    open_widgets: Mutex<HashMap<String, OpenWidget>>,
    queue: Mutex<Vec<StatRecord>>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self {
            open_layouts: Mutex::new(HashMap::new()),
            open_widgets: Mutex::new(HashMap::new()),
            queue: Mutex::new(Vec::new()),
        }
    }

    /// `layoutStart` -> begin.
    pub fn begin_layout(&self, layout_id: i64, now: DateTime<Utc>) {
        self.open_layouts.lock().unwrap().insert(layout_id, OpenLayout { started_at: now });
    }

    /// `layoutEnd` -> end. Returns the elapsed seconds so the caller can
    /// feed `Scheduler::record_play` with the same figure.
    pub fn end_layout(&self, layout_id: i64, now: DateTime<Utc>) -> u32 {
        let started_at = self
            .open_layouts
            .lock()
            .unwrap()
            .remove(&layout_id)
            .map(|o| o.started_at)
            .unwrap_or(now);
        let duration = (now - started_at).num_seconds().max(0) as u32;
        self.queue.lock().unwrap().push(StatRecord {
            layout_id,
            widget_id: None,
            started_at,
            duration_secs: duration,
        });
        duration
    }

    /// `widgetStart`, gated on `enableStat` by the caller before calling in.
    pub fn begin_widget(&self, widget_id: &str, layout_id: i64, now: DateTime<Utc>) {
        self.open_widgets
            .lock()
            .unwrap()
            .insert(widget_id.to_string(), OpenWidget { started_at: now, layout_id });
    }

    /// `widgetEnd`. No-op if the widget was never begun (e.g. `enableStat`
    /// was false on the widget, so no start record exists to close).
    pub fn end_widget(&self, widget_id: &str, now: DateTime<Utc>) {
        let Some(open) = self.open_widgets.lock().unwrap().remove(widget_id) else {
            return;
        };
        let duration = (now - open.started_at).num_seconds().max(0) as u32;
        self.queue.lock().unwrap().push(StatRecord {
            layout_id: open.layout_id,
            widget_id: Some(widget_id.to_string()),
            started_at: open.started_at,
            duration_secs: duration,
        });
    }

    /// Drains the queue for a flush attempt. Records are only dropped once
    /// the CMS submission actually succeeds (see [`Self::requeue`]).
    pub fn drain(&self) -> Vec<StatRecord> {
        std::mem::take(&mut self.queue.lock().unwrap())
    }

    /// Puts records back at the front of the queue after a failed submit,
    /// so a transient CMS outage doesn't lose proof-of-play.
    pub fn requeue(&self, records: Vec<StatRecord>) {
        let mut queue = self.queue.lock().unwrap();
        let mut merged = records;
        merged.append(&mut queue);
        *queue = merged;
    }
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Fault/log queue, same drain/requeue shape as [`StatsCollector`] but for
/// `submitLog`.
pub struct LogQueue {
    queue: Mutex<Vec<LogRecord>>,
}

impl LogQueue {
    pub fn new() -> Self {
        Self { queue: Mutex::new(Vec::new()) }
    }

    pub fn push(&self, record: LogRecord) {
        self.queue.lock().unwrap().push(record);
    }

    pub fn drain(&self) -> Vec<LogRecord> {
        std::mem::take(&mut self.queue.lock().unwrap())
    }

    pub fn requeue(&self, records: Vec<LogRecord>) {
        let mut queue = self.queue.lock().unwrap();
        let mut merged = records;
        merged.append(&mut queue);
        *queue = merged;
    }
}

impl Default for LogQueue {
    fn default() -> Self {
        Self::new()
    }
}
