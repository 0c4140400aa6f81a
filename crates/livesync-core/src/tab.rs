//! Open browser tabs and their derived sync sessions.
//!
//! A tab's [`TabSession`] is never set directly: it is derived from the
//! tab's stylesheets, the editor file union and the [`SessionConfig`] for
//! the tab's page. Derivation keeps the previous session reference when
//! neither stylesheets nor mapping changed, so observers see a new
//! reference only on real change.
//!
//! [`SessionConfig`]: crate::session::SessionConfig

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::editor::EditorRegistry;
use crate::immutable::{KeySet, Keyed, Zone};
use crate::mapping;
use crate::patch::{Condense, Patch, PatchSet};
use crate::remote_view::RemoteViewSession;
use crate::session::Sessions;

/// Zone used when a browser reports stylesheets without naming a source.
pub const DEFAULT_ZONE: &str = "default";

/// Live sync state of one tab with an enabled page config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabSession {
    /// Page url; also the key of the governing session config.
    pub id: String,
    /// Union of resources over every zone of the tab.
    pub stylesheets: KeySet,
    /// Browser resource → editor file.
    pub mapping: Keyed<String>,
    /// Unsaved patch backlog per resource uri.
    pub patches: Keyed<PatchSet>,
    /// Editor files the browser asked for unsaved content of.
    pub requested_unsaved_files: KeySet,
}

impl TabSession {
    fn new(id: &str, stylesheets: KeySet, mapping: Keyed<String>) -> Self {
        Self {
            id: id.to_string(),
            stylesheets,
            mapping,
            patches: Keyed::new(),
            requested_unsaved_files: KeySet::new(),
        }
    }
}

/// One open browser tab.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserTab {
    pub id: String,
    pub origin: String,
    pub url: String,
    /// Zone name → resources seen through that zone.
    pub stylesheets: Keyed<Zone>,
    pub session: Option<Arc<TabSession>>,
    /// Origin of the remote view session exposing this tab, if any.
    pub remote_view: Option<String>,
}

impl BrowserTab {
    fn new(id: &str, origin: String, url: String) -> Self {
        Self {
            id: id.to_string(),
            origin,
            url,
            stylesheets: Keyed::new(),
            session: None,
            remote_view: None,
        }
    }

    /// Every resource over every zone, first occurrence wins ordering.
    pub fn resources(&self) -> KeySet {
        self.stylesheets
            .values()
            .flat_map(|zone| zone.resources())
            .collect()
    }
}

/// Tab as reported by the browser in a full tab list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabInfo {
    pub origin: String,
    pub url: String,
    #[serde(default)]
    pub stylesheets: Option<Keyed<Zone>>,
}

pub type Tabs = Keyed<Arc<BrowserTab>>;

/// Everything tab derivation reads from outside the tab collection.
#[derive(Debug, Clone, Copy)]
pub struct DeriveContext<'a> {
    pub editor_files: &'a KeySet,
    pub sessions: &'a Sessions,
    pub remote_sessions: &'a Keyed<Arc<RemoteViewSession>>,
}

impl<'a> DeriveContext<'a> {
    pub fn new(
        editors: &'a EditorRegistry,
        sessions: &'a Sessions,
        remote_sessions: &'a Keyed<Arc<RemoteViewSession>>,
    ) -> Self {
        Self {
            editor_files: &editors.files,
            sessions,
            remote_sessions,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TabAction {
    /// Reconciles against the complete list of open tabs.
    SyncTabs {
        tabs: Keyed<TabInfo>,
        #[serde(default)]
        force: bool,
    },
    SetStylesheetData {
        id: String,
        #[serde(default = "default_zone")]
        zone: String,
        items: Zone,
    },
    UpdateStylesheetItem {
        id: String,
        #[serde(default = "default_zone")]
        zone: String,
        item: String,
        value: String,
    },
    SavePatches {
        id: String,
        uri: String,
        patches: Vec<Patch>,
    },
    ClearPatches {
        id: String,
        uri: String,
    },
    AddRequestedUnsavedFiles {
        id: String,
        files: Vec<String>,
    },
}

fn default_zone() -> String {
    DEFAULT_ZONE.to_string()
}

impl TabAction {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SyncTabs { .. } => "tab-sync",
            Self::SetStylesheetData { .. } => "tab-set-stylesheet-data",
            Self::UpdateStylesheetItem { .. } => "tab-update-stylesheet-item",
            Self::SavePatches { .. } => "tab-save-patches",
            Self::ClearPatches { .. } => "tab-clear-patches",
            Self::AddRequestedUnsavedFiles { .. } => "tab-add-requested-unsaved-files",
        }
    }
}

pub fn reduce(
    tabs: &Tabs,
    action: &TabAction,
    ctx: &DeriveContext<'_>,
    condense: &dyn Condense,
) -> Tabs {
    match action {
        TabAction::SyncTabs { tabs: incoming, force } => sync_tabs(tabs, incoming, *force, ctx),
        TabAction::SetStylesheetData { id, zone, items } => edit_tab(tabs, id, ctx, |tab| {
            if tab.stylesheets.get(zone) == Some(items) {
                return None;
            }
            let mut next = tab.clone();
            next.stylesheets.insert(zone.as_str(), items.clone());
            Some(next)
        }),
        TabAction::UpdateStylesheetItem {
            id,
            zone,
            item,
            value,
        } => edit_tab(tabs, id, ctx, |tab| {
            let current = tab.stylesheets.get(zone).cloned().unwrap_or_default();
            if current.item(item) == Some(value.as_str()) {
                return None;
            }
            let updated = current.with_item(item, value.clone());
            if updated == current {
                return None;
            }
            let mut next = tab.clone();
            next.stylesheets.insert(zone.as_str(), updated);
            Some(next)
        }),
        TabAction::SavePatches { id, uri, patches } => edit_session(tabs, id, |session| {
            let mut backlog = session
                .patches
                .get(uri)
                .map(|saved| saved.as_ref().clone())
                .unwrap_or_default();
            backlog.extend(patches.iter().cloned());
            let condensed = condense.condense(backlog);

            let mut next = session.clone();
            if condensed.is_empty() {
                next.patches.remove(uri);
            } else if session.patches.get(uri).is_some_and(|saved| **saved == condensed) {
                return None;
            } else {
                next.patches.insert(uri.as_str(), Arc::new(condensed));
            }
            (!next.patches.ptr_eq(&session.patches)).then_some(next)
        }),
        TabAction::ClearPatches { id, uri } => edit_session(tabs, id, |session| {
            if !session.patches.contains_key(uri) {
                return None;
            }
            let mut next = session.clone();
            next.patches.remove(uri);
            Some(next)
        }),
        TabAction::AddRequestedUnsavedFiles { id, files } => edit_session(tabs, id, |session| {
            let mut next = session.clone();
            for file in files {
                next.requested_unsaved_files.insert(file);
            }
            (!next
                .requested_unsaved_files
                .ptr_eq(&session.requested_unsaved_files))
            .then_some(next)
        }),
    }
}

/// Strips a `#fragment` from a page url.
pub fn normalize_url(url: &str) -> &str {
    url.split('#').next().unwrap_or_default()
}

/// Reconciles the tab collection against the browser's complete tab list.
///
/// Tabs whose origin or url changed start over with empty stylesheets.
/// Reported zones replace the tab's zones of the same name. Tabs missing
/// from `incoming` are dropped. Unless `force` is set, a reconcile that
/// changes nothing returns `tabs` as is.
pub fn sync_tabs(tabs: &Tabs, incoming: &Keyed<TabInfo>, force: bool, ctx: &DeriveContext<'_>) -> Tabs {
    let mut changed: Vec<(&str, BrowserTab)> = Vec::new();

    for (id, info) in incoming {
        let origin = normalize_url(&info.origin).to_string();
        let url = normalize_url(&info.url).to_string();

        let mut candidate = match tabs.get(id) {
            Some(current) if current.origin == origin && current.url == url => None,
            Some(_) | None => Some(BrowserTab::new(id, origin, url)),
        };

        if let Some(zones) = &info.stylesheets {
            for (zone, items) in zones {
                let base = match (&candidate, tabs.get(id)) {
                    (Some(tab), _) => tab.stylesheets.get(zone),
                    (None, Some(current)) => current.stylesheets.get(zone),
                    (None, None) => None,
                };
                if base == Some(items) {
                    continue;
                }
                if candidate.is_none() {
                    candidate = tabs.get(id).map(|current| (**current).clone());
                }
                if let Some(tab) = candidate.as_mut() {
                    tab.stylesheets.insert(zone.as_str(), items.clone());
                }
            }
        }

        if let Some(tab) = candidate {
            changed.push((id.as_str(), tab));
        }
    }

    let removed: Vec<String> = tabs
        .keys()
        .filter(|id| !incoming.contains_key(id))
        .cloned()
        .collect();

    if !force && changed.is_empty() && removed.is_empty() {
        return tabs.clone();
    }

    let mut next = tabs.clone();
    for id in &removed {
        debug!(tab_id = %id, "tab closed");
        next.remove(id);
    }
    for (id, tab) in changed {
        next.insert(id, Arc::new(tab));
    }
    rederive_all(&next, ctx)
}

/// Re-runs session derivation for every tab, replacing only tabs whose
/// derived state changed.
pub fn rederive_all(tabs: &Tabs, ctx: &DeriveContext<'_>) -> Tabs {
    let mut next = tabs.clone();
    for (id, tab) in tabs {
        let derived = derive_tab(tab, ctx);
        if !Arc::ptr_eq(&derived, tab) {
            next.insert(id.as_str(), derived);
        }
    }
    next
}

/// Recomputes the session and remote view link of one tab.
pub fn derive_tab(tab: &Arc<BrowserTab>, ctx: &DeriveContext<'_>) -> Arc<BrowserTab> {
    let session = derive_session(tab, ctx);
    let remote_view = ctx
        .remote_sessions
        .contains_key(&tab.origin)
        .then(|| tab.origin.clone());

    let same_session = match (&tab.session, &session) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    };
    if same_session && tab.remote_view == remote_view {
        return Arc::clone(tab);
    }

    let mut next = (**tab).clone();
    next.session = session;
    next.remote_view = remote_view;
    Arc::new(next)
}

/// Derives the sync session for a tab.
///
/// Present only when a config exists for the tab's url and is enabled.
pub fn derive_session(tab: &BrowserTab, ctx: &DeriveContext<'_>) -> Option<Arc<TabSession>> {
    let config = ctx.sessions.get(&tab.url).filter(|config| config.enabled)?;

    let resources = tab.resources();
    let mapping = mapping::resolve(
        resources.iter().map(String::as_str),
        ctx.editor_files,
        Some(&config.user_mapping),
    );

    let Some(previous) = tab.session.as_ref() else {
        debug!(tab_id = %tab.id, page = %tab.url, "sync session started");
        return Some(Arc::new(TabSession::new(&tab.url, resources, mapping)));
    };

    let same_stylesheets = previous.stylesheets == resources;
    let same_mapping = previous.mapping == mapping;
    if same_stylesheets && same_mapping {
        return Some(Arc::clone(previous));
    }

    let mut next = (**previous).clone();
    if !same_stylesheets {
        next.stylesheets = resources;
    }
    if !same_mapping {
        next.mapping = mapping;
    }
    Some(Arc::new(next))
}

/// Applies `change` to one tab, then re-derives it.
fn edit_tab(
    tabs: &Tabs,
    id: &str,
    ctx: &DeriveContext<'_>,
    change: impl FnOnce(&BrowserTab) -> Option<BrowserTab>,
) -> Tabs {
    let Some(tab) = tabs.get(id) else {
        debug!(tab_id = %id, "unknown tab");
        return tabs.clone();
    };
    match change(tab) {
        Some(next) => tabs.set(id, derive_tab(&Arc::new(next), ctx)),
        None => tabs.clone(),
    }
}

/// Applies `change` to the session of one tab; no-op without a session.
fn edit_session(
    tabs: &Tabs,
    id: &str,
    change: impl FnOnce(&TabSession) -> Option<TabSession>,
) -> Tabs {
    let Some(tab) = tabs.get(id) else {
        return tabs.clone();
    };
    let Some(session) = tab.session.as_ref() else {
        debug!(tab_id = %id, "tab has no sync session");
        return tabs.clone();
    };
    match change(session) {
        Some(next) => {
            let mut tab = (**tab).clone();
            tab.session = Some(Arc::new(next));
            tabs.set(id, Arc::new(tab))
        }
        None => tabs.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::{NetEffect, PatchAction};
    use crate::session::SessionConfig;
    use chrono::Utc;
    use serde_json::json;

    const PAGE: &str = "http://localhost/index.html";

    struct Fixture {
        editors: EditorRegistry,
        sessions: Sessions,
        remote: Keyed<Arc<RemoteViewSession>>,
    }

    impl Fixture {
        fn new(files: &[&str], enabled: bool) -> Self {
            let mut config = SessionConfig::new(Utc::now());
            config.enabled = enabled;
            Self {
                editors: EditorRegistry {
                    list: Keyed::new(),
                    files: files.iter().copied().collect(),
                },
                sessions: Keyed::new().set(PAGE, Arc::new(config)),
                remote: Keyed::new(),
            }
        }

        fn ctx(&self) -> DeriveContext<'_> {
            DeriveContext::new(&self.editors, &self.sessions, &self.remote)
        }
    }

    fn info(url: &str, sheets: &[&str]) -> TabInfo {
        TabInfo {
            origin: "http://localhost".to_string(),
            url: url.to_string(),
            stylesheets: Some(
                Keyed::new().set(DEFAULT_ZONE, sheets.iter().copied().collect::<Zone>()),
            ),
        }
    }

    fn sync(tabs: &Tabs, list: &[(&str, TabInfo)], fixture: &Fixture) -> Tabs {
        let incoming: Keyed<TabInfo> = list.iter().cloned().collect();
        sync_tabs(tabs, &incoming, false, &fixture.ctx())
    }

    #[test]
    fn test_sync_creates_session_for_enabled_page() {
        let fixture = Fixture::new(&["/src/main.less"], true);
        let tabs = sync(&Tabs::new(), &[("1", info(PAGE, &["http://localhost/main.css"]))], &fixture);

        let session = tabs.get("1").unwrap().session.clone().unwrap();
        assert_eq!(session.id, PAGE);
        assert_eq!(
            session.mapping.get("http://localhost/main.css").map(String::as_str),
            Some("/src/main.less")
        );
    }

    #[test]
    fn test_sync_without_enabled_config_has_no_session() {
        let fixture = Fixture::new(&["/src/main.less"], false);
        let tabs = sync(&Tabs::new(), &[("1", info(PAGE, &["main.css"]))], &fixture);
        assert!(tabs.get("1").unwrap().session.is_none());
    }

    #[test]
    fn test_unchanged_sync_keeps_references() {
        let fixture = Fixture::new(&["/src/main.less"], true);
        let list = [("1", info(PAGE, &["main.css"]))];
        let tabs = sync(&Tabs::new(), &list, &fixture);
        let again = sync(&tabs, &list, &fixture);
        assert!(again.ptr_eq(&tabs));

        let forced = sync_tabs(
            &tabs,
            &list.iter().cloned().collect(),
            true,
            &fixture.ctx(),
        );
        assert!(Arc::ptr_eq(forced.get("1").unwrap(), tabs.get("1").unwrap()));
    }

    #[test]
    fn test_sync_strips_fragment_and_drops_closed_tabs() {
        let fixture = Fixture::new(&[], true);
        let tabs = sync(
            &Tabs::new(),
            &[
                ("1", info(&format!("{PAGE}#top"), &[])),
                ("2", info("http://localhost/other.html", &[])),
            ],
            &fixture,
        );
        assert_eq!(tabs.get("1").unwrap().url, PAGE);

        let tabs = sync(&tabs, &[("1", info(PAGE, &[]))], &fixture);
        assert_eq!(tabs.len(), 1);
        assert!(tabs.get("1").unwrap().session.is_some());
    }

    #[test]
    fn test_url_change_resets_tab() {
        let fixture = Fixture::new(&[], true);
        let tabs = sync(&Tabs::new(), &[("1", info(PAGE, &["a.css"]))], &fixture);

        let moved = TabInfo {
            stylesheets: None,
            ..info("http://localhost/about.html", &[])
        };
        let tabs = sync(&tabs, &[("1", moved)], &fixture);
        let tab = tabs.get("1").unwrap();
        assert!(tab.stylesheets.is_empty());
        assert!(tab.session.is_none());
    }

    #[test]
    fn test_stylesheet_item_updates() {
        let fixture = Fixture::new(&["/src/a.css", "/src/b.css"], true);
        let ctx = fixture.ctx();
        let tabs = sync(&Tabs::new(), &[("1", info(PAGE, &["a.css"]))], &fixture);

        let tabs = reduce(
            &tabs,
            &TabAction::UpdateStylesheetItem {
                id: "1".to_string(),
                zone: "cssom".to_string(),
                item: "b.css".to_string(),
                value: "1".to_string(),
            },
            &ctx,
            &NetEffect,
        );
        let session = tabs.get("1").unwrap().session.clone().unwrap();
        assert!(session.stylesheets.contains("a.css"));
        assert!(session.stylesheets.contains("b.css"));
        assert_eq!(session.mapping.len(), 2);

        let same = reduce(
            &tabs,
            &TabAction::UpdateStylesheetItem {
                id: "1".to_string(),
                zone: "cssom".to_string(),
                item: "b.css".to_string(),
                value: "1".to_string(),
            },
            &ctx,
            &NetEffect,
        );
        assert!(same.ptr_eq(&tabs));
    }

    #[test]
    fn test_patch_backlog() {
        let fixture = Fixture::new(&[], true);
        let ctx = fixture.ctx();
        let tabs = sync(&Tabs::new(), &[("1", info(PAGE, &["a.css"]))], &fixture);
        let save = |tabs: &Tabs, value: &str| {
            reduce(
                tabs,
                &TabAction::SavePatches {
                    id: "1".to_string(),
                    uri: "a.css".to_string(),
                    patches: vec![Patch::update("body", json!(value))],
                },
                &ctx,
                &NetEffect,
            )
        };

        let tabs = save(&tabs, "red");
        let tabs = save(&tabs, "blue");
        let backlog = tabs.get("1").unwrap().session.as_ref().unwrap().patches.clone();
        assert_eq!(backlog.get("a.css").unwrap().len(), 1);
        assert_eq!(backlog.get("a.css").unwrap()[0].value, Some(json!("blue")));

        let tabs = reduce(
            &tabs,
            &TabAction::ClearPatches {
                id: "1".to_string(),
                uri: "a.css".to_string(),
            },
            &ctx,
            &NetEffect,
        );
        assert!(tabs.get("1").unwrap().session.as_ref().unwrap().patches.is_empty());
    }

    #[test]
    fn test_cancelled_backlog_drops_resource_key() {
        let fixture = Fixture::new(&[], true);
        let ctx = fixture.ctx();
        let tabs = sync(&Tabs::new(), &[("1", info(PAGE, &["a.css", "b.css"]))], &fixture);
        let save = |tabs: &Tabs, uri: &str, patch: Patch| {
            reduce(
                tabs,
                &TabAction::SavePatches {
                    id: "1".to_string(),
                    uri: uri.to_string(),
                    patches: vec![patch],
                },
                &ctx,
                &NetEffect,
            )
        };
        let path = || vec![("color".to_string(), 1)];

        let tabs = save(&tabs, "b.css", Patch::update("body", json!("red")));
        let tabs = save(
            &tabs,
            "a.css",
            Patch::new(PatchAction::Add, path(), Some(json!("red"))),
        );
        assert!(tabs.get("1").unwrap().session.as_ref().unwrap().patches.contains_key("a.css"));

        let tabs = save(&tabs, "a.css", Patch::new(PatchAction::Remove, path(), None));
        let backlog = &tabs.get("1").unwrap().session.as_ref().unwrap().patches;
        assert!(!backlog.contains_key("a.css"));
        assert!(backlog.contains_key("b.css"));
    }

    #[test]
    fn test_session_ops_without_session_are_noops() {
        let fixture = Fixture::new(&[], false);
        let ctx = fixture.ctx();
        let tabs = sync(&Tabs::new(), &[("1", info(PAGE, &["a.css"]))], &fixture);
        let next = reduce(
            &tabs,
            &TabAction::AddRequestedUnsavedFiles {
                id: "1".to_string(),
                files: vec!["/src/a.css".to_string()],
            },
            &ctx,
            &NetEffect,
        );
        assert!(next.ptr_eq(&tabs));
    }

    #[test]
    fn test_remote_view_link() {
        let mut fixture = Fixture::new(&[], false);
        let tabs = sync(&Tabs::new(), &[("1", info(PAGE, &[]))], &fixture);
        assert!(tabs.get("1").unwrap().remote_view.is_none());

        fixture.remote = Keyed::new().set(
            "http://localhost",
            Arc::new(RemoteViewSession::pending("http://localhost")),
        );
        let tabs = rederive_all(&tabs, &fixture.ctx());
        assert_eq!(
            tabs.get("1").unwrap().remote_view.as_deref(),
            Some("http://localhost")
        );
    }
}
