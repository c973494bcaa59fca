//! Fault reporting with a 5-minute per-`(type, context)` dedup window, so
//! a misbehaving widget doesn't flood the CMS log endpoint with repeats
//! of the same fault.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use sig_cms::LogRecord;

use crate::stats::LogQueue;

const DEDUP_WINDOW: Duration = Duration::minutes(5);

pub struct FaultLog {
    last_seen: Mutex<HashMap<(String, String), DateTime<Utc>>>,
    queue: LogQueue,
}

impl FaultLog {
    pub fn new() -> Self {
        Self {
            last_seen: Mutex::new(HashMap::new()),
            queue: LogQueue::new(),
        }
    }

    /// Records a fault unless an identical `(fault_type, context)` pair was
    /// already reported within the dedup window. Always logs via
    /// `tracing`; only queues a fresh `LogRecord` for CMS submission when
    /// the dedup check passes.
    #[allow(clippy::too_many_arguments)]
    pub fn report(
        &self,
        fault_type: &str,
        message: &str,
        context: &str,
        now: DateTime<Utc>,
        layout_id: Option<i64>,
        region_id: Option<String>,
        widget_id: Option<String>,
    ) {
        tracing::warn!(fault_type, context, message, "fault");

        let key = (fault_type.to_string(), context.to_string());
        let mut last_seen = self.last_seen.lock().unwrap();
        if let Some(prev) = last_seen.get(&key) {
            if now - *prev < DEDUP_WINDOW {
                return;
            }
        }
        last_seen.insert(key, now);
        drop(last_seen);

        self.queue.push(LogRecord {
            fault_type: fault_type.to_string(),
            message: message.to_string(),
            context: context.to_string(),
            timestamp: now,
            widget_id,
            layout_id,
            region_id,
        });
    }

    pub fn drain(&self) -> Vec<LogRecord> {
        self.queue.drain()
    }

    pub fn requeue(&self, records: Vec<LogRecord>) {
        self.queue.requeue(records);
    }
}

impl Default for FaultLog {
    fn default() -> Self {
        Self::new()
    }
}
