//! Touched-column reports shared by every tracer descended from one read.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

#[derive(Debug, Default)]
struct ReportState {
    accessed: BTreeSet<String>,
    data: BTreeSet<String>,
    shape: BTreeSet<String>,
    zero_field: bool,
}

/// Shared, mutable record of what downstream code needed from a source.
///
/// Cloning shares the underlying state. The mutex makes the handle
/// `Send + Sync`; construction order still decides what gets recorded.
#[derive(Clone, Default)]
pub struct Report {
    state: Arc<Mutex<ReportState>>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ReportState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A field (record, list or leaf) was accessed by name.
    pub fn touch_field(&self, path: &str) {
        self.lock().accessed.insert(path.to_string());
    }

    /// A leaf column's values are needed.
    pub fn touch_data(&self, path: &str) {
        self.lock().data.insert(path.to_string());
    }

    /// A list's offsets (lengths) are needed, not necessarily its contents.
    pub fn touch_shape(&self, path: &str) {
        self.lock().shape.insert(path.to_string());
    }

    /// Only row counts are needed; reading zero columns is enough.
    pub fn request_zero_field(&self) {
        self.lock().zero_field = true;
    }

    pub fn snapshot(&self) -> ReportSnapshot {
        let s = self.lock();
        ReportSnapshot {
            accessed: s.accessed.clone(),
            data: s.data.clone(),
            shape: s.shape.clone(),
            zero_field_requested: s.zero_field,
        }
    }

    /// Identity, not content, comparison.
    pub fn same_as(&self, other: &Report) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl fmt::Debug for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Report").field(&self.snapshot()).finish()
    }
}

/// Point-in-time copy of a report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReportSnapshot {
    pub accessed: BTreeSet<String>,
    pub data: BTreeSet<String>,
    pub shape: BTreeSet<String>,
    pub zero_field_requested: bool,
}

impl ReportSnapshot {
    /// Nothing was recorded: the report carries no information.
    pub fn is_untouched(&self) -> bool {
        self.accessed.is_empty()
            && self.data.is_empty()
            && self.shape.is_empty()
            && !self.zero_field_requested
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// Primitive leaf column.
    Leaf,
    /// Offsets of a list.
    Offsets,
    /// Record, option or union node; only field access is recorded.
    Structure,
}

/// Link from a tracer node back to a source column.
#[derive(Debug, Clone)]
pub struct ColumnKey {
    pub report: Report,
    pub path: String,
    pub kind: KeyKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let r = Report::new();
        let r2 = r.clone();
        r2.touch_data("x");
        assert!(r.snapshot().data.contains("x"));
        assert!(r.same_as(&r2));
        assert!(!r.same_as(&Report::new()));
    }

    #[test]
    fn fresh_report_is_untouched() {
        let r = Report::new();
        assert!(r.snapshot().is_untouched());
        r.request_zero_field();
        assert!(!r.snapshot().is_untouched());
    }
}
