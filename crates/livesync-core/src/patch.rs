//! Stylesheet patches and backlog condensing.
//!
//! A patch describes one edit to a stylesheet node. Tabs keep a backlog of
//! patches per resource so an editor that connects late can replay them.
//! How a backlog is condensed is pluggable through [`Condense`].

use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Location of a node inside a stylesheet: `(name, position)` pairs from the root.
pub type PatchPath = Vec<(String, u32)>;

/// Shared, immutable list of patches.
pub type PatchSet = Arc<Vec<Patch>>;

/// Kind of edit a patch applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchAction {
    Add,
    Update,
    Remove,
}

/// One stylesheet edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub action: PatchAction,
    pub path: PatchPath,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

impl Patch {
    pub fn new(action: PatchAction, path: PatchPath, value: Option<serde_json::Value>) -> Self {
        Self {
            action,
            path,
            value,
        }
    }

    /// Shorthand for an `update` patch on a single-segment path.
    pub fn update(name: impl Into<String>, value: serde_json::Value) -> Self {
        Self::new(PatchAction::Update, vec![(name.into(), 1)], Some(value))
    }
}

/// Folds an ordered patch list into an equivalent, shorter one.
pub trait Condense: Send + Sync {
    fn condense(&self, patches: Vec<Patch>) -> Vec<Patch>;
}

/// Keeps the net effect per path.
///
/// The last patch for a path wins and moves to that position in the
/// output. An `add` followed by `remove` cancels out; an `add` followed by
/// `update` stays an `add` carrying the newer value.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetEffect;

impl Condense for NetEffect {
    fn condense(&self, patches: Vec<Patch>) -> Vec<Patch> {
        let mut net: IndexMap<PatchPath, Patch> = IndexMap::new();
        for mut patch in patches {
            let previous = net.shift_remove(&patch.path).map(|p| p.action);
            match (previous, patch.action) {
                (Some(PatchAction::Add), PatchAction::Remove) => continue,
                (Some(PatchAction::Add), PatchAction::Update) => patch.action = PatchAction::Add,
                _ => {}
            }
            net.insert(patch.path.clone(), patch);
        }
        net.into_values().collect()
    }
}
