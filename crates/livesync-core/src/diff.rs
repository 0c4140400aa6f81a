//! Fan-out of one resource diff to every tab that should receive it.
//!
//! Pure functions over a [`Snapshot`]; nothing here touches state.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::patch::{Patch, PatchSet};
use crate::session::Direction;
use crate::state::Snapshot;

/// Patches produced for one resource by one side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diff {
    /// Resource the patches apply to: a browser url when coming from the
    /// browser, an editor file path when coming from an editor.
    pub uri: String,
    #[serde(default)]
    pub patches: Vec<Patch>,
    /// Tabs that must not receive this diff, typically its sender.
    #[serde(default)]
    pub exclude_tab_ids: Vec<String>,
}

/// One routed delivery.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Routed {
    pub tab_id: String,
    /// Editor file (toward editor) or browser resource (toward browser).
    pub uri: String,
    pub patches: PatchSet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    TowardEditor,
    TowardBrowser,
}

impl Route {
    /// Sessions configured with this direction never take part.
    fn excluded(self) -> Direction {
        match self {
            Self::TowardEditor => Direction::ToBrowser,
            Self::TowardBrowser => Direction::ToEditor,
        }
    }
}

/// Routes a browser-side diff to editor files.
///
/// Deliveries are deduplicated by editor file: several tabs mapping the
/// same resource to one file produce a single entry.
pub fn for_editor(snapshot: &Snapshot, diff: &Diff) -> Vec<Routed> {
    route(snapshot, diff, Route::TowardEditor)
}

/// Routes an editor-side diff to every tab showing the file.
pub fn for_browser(snapshot: &Snapshot, diff: &Diff) -> Vec<Routed> {
    route(snapshot, diff, Route::TowardBrowser)
}

fn route(snapshot: &Snapshot, diff: &Diff, route: Route) -> Vec<Routed> {
    if diff.patches.is_empty() {
        return Vec::new();
    }

    let patches: PatchSet = Arc::new(diff.patches.clone());
    let excluded: HashSet<&str> = diff.exclude_tab_ids.iter().map(String::as_str).collect();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut out = Vec::new();

    for (tab_id, tab) in &snapshot.tabs {
        if excluded.contains(tab_id.as_str()) {
            continue;
        }
        let Some(session) = tab.session.as_ref() else {
            continue;
        };
        let direction = snapshot
            .sessions
            .get(&session.id)
            .map(|config| config.direction)
            .unwrap_or_default();
        if direction == route.excluded() {
            continue;
        }

        let destination = match route {
            Route::TowardEditor => session.mapping.get(&diff.uri).map(String::as_str),
            Route::TowardBrowser => session
                .mapping
                .iter()
                .find(|(_, file)| **file == diff.uri)
                .map(|(resource, _)| resource.as_str()),
        };
        let Some(destination) = destination else {
            continue;
        };

        if route == Route::TowardEditor && !seen.insert(destination) {
            continue;
        }
        out.push(Routed {
            tab_id: tab_id.clone(),
            uri: destination.to_string(),
            patches: Arc::clone(&patches),
        });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::immutable::{KeySet, Keyed};
    use crate::session::SessionConfig;
    use crate::tab::{BrowserTab, TabSession};
    use chrono::Utc;
    use serde_json::json;

    fn config(direction: Direction) -> Arc<SessionConfig> {
        let mut config = SessionConfig::new(Utc::now());
        config.enabled = true;
        config.direction = direction;
        Arc::new(config)
    }

    fn tab(id: &str, url: &str, mapping: &[(&str, &str)]) -> Arc<BrowserTab> {
        Arc::new(BrowserTab {
            id: id.to_string(),
            origin: "http://localhost".to_string(),
            url: url.to_string(),
            stylesheets: Keyed::new(),
            session: Some(Arc::new(TabSession {
                id: url.to_string(),
                stylesheets: mapping.iter().map(|(b, _)| *b).collect::<KeySet>(),
                mapping: mapping
                    .iter()
                    .map(|(b, e)| (*b, e.to_string()))
                    .collect(),
                patches: Keyed::new(),
                requested_unsaved_files: KeySet::new(),
            })),
            remote_view: None,
        })
    }

    fn diff(uri: &str) -> Diff {
        Diff {
            uri: uri.to_string(),
            patches: vec![Patch::update("body", json!("red"))],
            exclude_tab_ids: Vec::new(),
        }
    }

    fn snapshot(tabs: Vec<Arc<BrowserTab>>, sessions: &[(&str, Direction)]) -> Snapshot {
        Snapshot {
            tabs: tabs.into_iter().map(|t| (t.id.clone(), t)).collect(),
            sessions: sessions.iter().map(|(url, d)| (*url, config(*d))).collect(),
            ..Snapshot::default()
        }
    }

    #[test]
    fn test_unmapped_tab_is_skipped() {
        let state = snapshot(
            vec![
                tab("tab1", "http://localhost/a.html", &[("page.css", "m.less")]),
                tab("tab2", "http://localhost/b.html", &[]),
            ],
            &[
                ("http://localhost/a.html", Direction::Both),
                ("http://localhost/b.html", Direction::Both),
            ],
        );

        let routed = for_editor(&state, &diff("page.css"));
        assert_eq!(routed.len(), 1);
        assert_eq!(routed[0].tab_id, "tab1");
        assert_eq!(routed[0].uri, "m.less");
        assert_eq!(routed[0].patches.len(), 1);
    }

    #[test]
    fn test_editor_route_dedupes_by_file_and_honours_direction() {
        let state = snapshot(
            vec![
                tab("t1", "http://localhost/page1.html", &[("http://localhost/style.css", "/style.less")]),
                tab("t2", "http://localhost/page2.html", &[("http://localhost/style.css", "/style.less")]),
                tab("t3", "http://localhost/page3.html", &[("http://localhost/style.css", "/style.less")]),
            ],
            &[
                ("http://localhost/page1.html", Direction::Both),
                ("http://localhost/page2.html", Direction::ToBrowser),
                ("http://localhost/page3.html", Direction::Both),
            ],
        );

        let routed = for_editor(&state, &diff("http://localhost/style.css"));
        assert_eq!(routed.len(), 1);
        assert_eq!(routed[0].tab_id, "t1");

        let mut excluding = diff("http://localhost/style.css");
        excluding.exclude_tab_ids = vec!["t1".to_string()];
        let routed = for_editor(&state, &excluding);
        assert_eq!(routed.len(), 1);
        assert_eq!(routed[0].tab_id, "t3");
    }

    #[test]
    fn test_browser_route_reverse_lookup_without_dedupe() {
        let state = snapshot(
            vec![
                tab("t1", "http://localhost/page1.html", &[("http://localhost/style.css", "/style.less")]),
                tab("t2", "http://localhost/page2.html", &[("http://localhost/other.css", "/style.less")]),
                tab("t3", "http://localhost/page3.html", &[("http://localhost/style.css", "/style.less")]),
            ],
            &[
                ("http://localhost/page1.html", Direction::Both),
                ("http://localhost/page2.html", Direction::ToBrowser),
                ("http://localhost/page3.html", Direction::ToEditor),
            ],
        );

        let routed = for_browser(&state, &diff("/style.less"));
        let pairs: Vec<(&str, &str)> = routed
            .iter()
            .map(|r| (r.tab_id.as_str(), r.uri.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("t1", "http://localhost/style.css"),
                ("t2", "http://localhost/other.css"),
            ]
        );
    }

    #[test]
    fn test_empty_patches_short_circuit() {
        let state = snapshot(
            vec![tab("t1", "http://localhost/a.html", &[("a.css", "/a.css")])],
            &[("http://localhost/a.html", Direction::Both)],
        );
        let mut empty = diff("a.css");
        empty.patches.clear();
        assert!(for_editor(&state, &empty).is_empty());
        assert!(for_browser(&state, &empty).is_empty());
    }
}
