//! Identifiers for graph layers and the tasks they expand to.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique name of a graph layer, e.g. `field-x-3f9a0c1b22de`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerName(String);

impl LayerName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// `label` plus a random token, so equal operations on different
    /// inputs never collide.
    pub fn fresh(label: &str) -> Self {
        let token = Uuid::new_v4().simple().to_string();
        Self(format!("{label}-{}", &token[..12]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key of this layer's `index`-th output task.
    pub fn key(&self, index: usize) -> NodeKey {
        NodeKey::new(self.0.clone(), index)
    }
}

impl fmt::Display for LayerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Address of one task in the materialized graph: a task group name plus
/// an index. Output tasks of a layer use the layer's own name; helper tasks
/// (reduction partials and combines) use derived group names.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeKey {
    pub name: String,
    pub index: usize,
}

impl NodeKey {
    pub fn new(name: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            index,
        }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.name, self.index)
    }
}
