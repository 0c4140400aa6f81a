//! Connected editors and the union of their files.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::immutable::{KeySet, Keyed};

/// Identifier an editor announces when it connects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EditorId(String);

impl EditorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EditorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EditorId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EditorId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// One connected editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorRecord {
    pub id: EditorId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub files: KeySet,
}

/// All connected editors plus the union of their files.
///
/// `files` is recomputed on every change to `list` and keeps its
/// previous reference when the union is set-equal to the old one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditorRegistry {
    pub list: Keyed<Arc<EditorRecord>>,
    pub files: KeySet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EditorAction {
    /// Registers an editor; ignored when the id is already known.
    Connect {
        id: EditorId,
        #[serde(default)]
        name: String,
        #[serde(default)]
        files: Vec<String>,
    },
    Disconnect {
        id: EditorId,
    },
    /// Replaces the file list of an editor, registering it if unknown.
    UpdateFiles {
        id: EditorId,
        files: Vec<String>,
    },
    Clear,
}

impl EditorAction {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "editor-connect",
            Self::Disconnect { .. } => "editor-disconnect",
            Self::UpdateFiles { .. } => "editor-update-files",
            Self::Clear => "editor-clear",
        }
    }
}

pub fn reduce(state: &Arc<EditorRegistry>, action: &EditorAction) -> Arc<EditorRegistry> {
    let list = match action {
        EditorAction::Connect { id, name, files } => {
            if id.as_str().is_empty() {
                warn!("editor connect without id ignored");
                return Arc::clone(state);
            }
            if state.list.contains_key(id.as_str()) {
                debug!(editor_id = %id, "editor already connected");
                return Arc::clone(state);
            }
            debug!(editor_id = %id, files = files.len(), "editor connected");
            let record = EditorRecord {
                id: id.clone(),
                name: name.clone(),
                files: files.iter().map(String::as_str).collect(),
            };
            state.list.set(id.as_str(), Arc::new(record))
        }
        EditorAction::Disconnect { id } => {
            debug!(editor_id = %id, "editor disconnected");
            state.list.delete(id.as_str())
        }
        EditorAction::UpdateFiles { id, files } => {
            if id.as_str().is_empty() {
                warn!("editor files without id ignored");
                return Arc::clone(state);
            }
            let files: KeySet = files.iter().map(String::as_str).collect();
            match state.list.get(id.as_str()) {
                Some(record) if record.files == files => return Arc::clone(state),
                Some(record) => {
                    let mut next = (**record).clone();
                    next.files = files;
                    state.list.set(id.as_str(), Arc::new(next))
                }
                None => state.list.set(
                    id.as_str(),
                    Arc::new(EditorRecord {
                        id: id.clone(),
                        name: String::new(),
                        files,
                    }),
                ),
            }
        }
        EditorAction::Clear => Keyed::new(),
    };

    if list.ptr_eq(&state.list) || (list.is_empty() && state.list.is_empty()) {
        return Arc::clone(state);
    }

    let union: KeySet = list
        .values()
        .flat_map(|record| record.files.iter().map(String::as_str))
        .collect();
    let files = if union == state.files {
        state.files.clone()
    } else {
        union
    };

    Arc::new(EditorRegistry { list, files })
}
