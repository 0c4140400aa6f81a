//! The application snapshot and the root reducer.
//!
//! Every event is applied as one transaction: the owning family reducer
//! runs first, then tabs are re-derived if the editor, session config or
//! remote view slices changed. The result is either the input snapshot
//! (nothing changed) or a new snapshot sharing every untouched slice.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::diff::{self, Diff, Routed};
use crate::editor::{self, EditorAction, EditorRegistry};
use crate::immutable::Draft;
use crate::patch::Condense;
use crate::remote_view::{self, RemoteViewAction, RemoteViewState};
use crate::session::{self, SessionAction, Sessions};
use crate::tab::{self, DeriveContext, TabAction, Tabs};

/// Complete application state at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub editors: Arc<EditorRegistry>,
    pub tabs: Tabs,
    pub sessions: Sessions,
    pub remote_view: Arc<RemoteViewState>,
}

impl Snapshot {
    pub fn derive_context(&self) -> DeriveContext<'_> {
        DeriveContext::new(&self.editors, &self.sessions, &self.remote_view.sessions)
    }

    pub fn diff_for_editor(&self, diff: &Diff) -> Vec<Routed> {
        diff::for_editor(self, diff)
    }

    pub fn diff_for_browser(&self, diff: &Diff) -> Vec<Routed> {
        diff::for_browser(self, diff)
    }
}

/// Any event the reducer understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", content = "action", rename_all = "kebab-case")]
pub enum Action {
    Editor(EditorAction),
    Session(SessionAction),
    Tab(TabAction),
    RemoteView(RemoteViewAction),
}

impl Action {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Editor(action) => action.kind(),
            Self::Session(action) => action.kind(),
            Self::Tab(action) => action.kind(),
            Self::RemoteView(action) => action.kind(),
        }
    }
}

impl From<EditorAction> for Action {
    fn from(action: EditorAction) -> Self {
        Self::Editor(action)
    }
}

impl From<SessionAction> for Action {
    fn from(action: SessionAction) -> Self {
        Self::Session(action)
    }
}

impl From<TabAction> for Action {
    fn from(action: TabAction) -> Self {
        Self::Tab(action)
    }
}

impl From<RemoteViewAction> for Action {
    fn from(action: RemoteViewAction) -> Self {
        Self::RemoteView(action)
    }
}

/// Applies one action to `state`.
///
/// Returns `state` itself when the action changes nothing.
pub fn reduce(state: &Arc<Snapshot>, action: &Action, condense: &dyn Condense) -> Arc<Snapshot> {
    let mut draft = Draft::new(state);

    match action {
        Action::Editor(action) => {
            let editors = editor::reduce(&state.editors, action);
            if !Arc::ptr_eq(&editors, &state.editors) {
                draft.edit().editors = editors;
            }
        }
        Action::Session(action) => {
            let sessions = session::reduce(&state.sessions, action);
            if !sessions.ptr_eq(&state.sessions) {
                draft.edit().sessions = sessions;
            }
        }
        Action::RemoteView(action) => {
            let remote_view = remote_view::reduce(&state.remote_view, action);
            if !Arc::ptr_eq(&remote_view, &state.remote_view) {
                draft.edit().remote_view = remote_view;
            }
        }
        Action::Tab(action) => {
            let tabs = tab::reduce(&state.tabs, action, &state.derive_context(), condense);
            if !tabs.ptr_eq(&state.tabs) {
                draft.edit().tabs = tabs;
            }
        }
    }

    if draft.updated() && !matches!(action, Action::Tab(_)) {
        let tabs = {
            let current = draft.get();
            tab::rederive_all(&current.tabs, &current.derive_context())
        };
        if !tabs.ptr_eq(&draft.get().tabs) {
            draft.edit().tabs = tabs;
        }
    }

    draft.finish()
}
