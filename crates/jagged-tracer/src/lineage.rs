//! Lineage: which source columns a tracer node was derived from.
//!
//! A lineage tree mirrors the tracer's form node for node: a list node has
//! one child, a record one child per field, an option one child, a union one
//! child per branch. Computed values have untracked lineage (no key, no
//! children); any missing child reads as untracked.

use jagged_core::form::join_path;
use jagged_core::Form;

use crate::report::{ColumnKey, KeyKind, Report};

#[derive(Debug, Clone, Default)]
pub struct Lineage {
    key: Option<ColumnKey>,
    children: Vec<Lineage>,
}

impl Lineage {
    pub fn untracked() -> Self {
        Self::default()
    }

    pub fn node(key: Option<ColumnKey>, children: Vec<Lineage>) -> Self {
        Self { key, children }
    }

    /// Full lineage of a source read with `form`, reporting into `report`.
    pub fn from_source(form: &Form, report: &Report) -> Self {
        Self::build(form, report, "")
    }

    fn build(form: &Form, report: &Report, path: &str) -> Self {
        let key = |kind| {
            Some(ColumnKey {
                report: report.clone(),
                path: path.to_string(),
                kind,
            })
        };
        match form {
            Form::Primitive { .. } => Self::node(key(KeyKind::Leaf), vec![]),
            Form::List { content } => {
                Self::node(key(KeyKind::Offsets), vec![Self::build(content, report, path)])
            }
            Form::Record { fields } => Self::node(
                key(KeyKind::Structure),
                fields
                    .iter()
                    .map(|f| Self::build(&f.form, report, &join_path(path, &f.name)))
                    .collect(),
            ),
            Form::Optional { content } => {
                Self::node(key(KeyKind::Structure), vec![Self::build(content, report, path)])
            }
            Form::Union { contents } => Self::node(
                key(KeyKind::Structure),
                contents.iter().map(|c| Self::build(c, report, path)).collect(),
            ),
        }
    }

    pub fn key(&self) -> Option<&ColumnKey> {
        self.key.as_ref()
    }

    pub fn child(&self, index: usize) -> Lineage {
        self.children.get(index).cloned().unwrap_or_default()
    }

    pub fn is_tracked(&self) -> bool {
        self.key.is_some() || self.children.iter().any(Lineage::is_tracked)
    }

    /// Record a by-name access of this node.
    pub fn touch_field(&self) {
        if let Some(k) = &self.key {
            k.report.touch_field(&k.path);
        }
    }

    /// Everything below this node will be read.
    pub fn touch_data(&self) {
        if let Some(k) = &self.key {
            match k.kind {
                KeyKind::Leaf => k.report.touch_data(&k.path),
                KeyKind::Offsets => k.report.touch_shape(&k.path),
                KeyKind::Structure => {}
            }
        }
        for c in &self.children {
            c.touch_data();
        }
    }

    /// The list lengths at this node will be read.
    pub fn touch_shape(&self) {
        if let Some(k) = &self.key {
            match k.kind {
                KeyKind::Offsets => k.report.touch_shape(&k.path),
                KeyKind::Leaf => k.report.touch_data(&k.path),
                KeyKind::Structure => {}
            }
        }
    }

    /// Distinct reports referenced anywhere below this node.
    pub fn reports(&self) -> Vec<Report> {
        let mut out: Vec<Report> = Vec::new();
        self.collect_reports(&mut out);
        out
    }

    fn collect_reports(&self, out: &mut Vec<Report>) {
        if let Some(k) = &self.key {
            if !out.iter().any(|r| r.same_as(&k.report)) {
                out.push(k.report.clone());
            }
        }
        for c in &self.children {
            c.collect_reports(out);
        }
    }

    /// Lineage of a projection of this node: `full` is the form this lineage
    /// mirrors, `projected` the narrowed form built from it.
    pub fn project(&self, full: &Form, projected: &Form) -> Lineage {
        match (full, projected) {
            (Form::Record { fields }, Form::Record { fields: kept }) => Self::node(
                self.key.clone(),
                kept.iter()
                    .map(|k| {
                        fields
                            .iter()
                            .position(|f| f.name == k.name)
                            .map(|i| self.child(i).project(&fields[i].form, &k.form))
                            .unwrap_or_default()
                    })
                    .collect(),
            ),
            (Form::List { content: a }, Form::List { content: b })
            | (Form::Optional { content: a }, Form::Optional { content: b }) => {
                Self::node(self.key.clone(), vec![self.child(0).project(a, b)])
            }
            (Form::Union { contents: a }, Form::Union { contents: b }) => Self::node(
                self.key.clone(),
                a.iter()
                    .zip(b)
                    .enumerate()
                    .map(|(i, (a, b))| self.child(i).project(a, b))
                    .collect(),
            ),
            _ => self.clone(),
        }
    }

    /// Keys below this node that belong to `report`, without touching it.
    pub fn keys_for(&self, report: &Report) -> Vec<ColumnKey> {
        let mut out = Vec::new();
        self.collect_keys(report, &mut out);
        out
    }

    fn collect_keys(&self, report: &Report, out: &mut Vec<ColumnKey>) {
        if let Some(k) = &self.key {
            if k.report.same_as(report) {
                out.push(k.clone());
            }
        }
        for c in &self.children {
            c.collect_keys(report, out);
        }
    }
}
