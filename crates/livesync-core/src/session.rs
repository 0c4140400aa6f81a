//! Per-page sync configuration.
//!
//! A [`SessionConfig`] is keyed by page url and outlives the tab that
//! created it: reopening a page picks up the same mapping and direction.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::DomainError;
use crate::immutable::{KeySet, Keyed};

/// Which way changes are allowed to flow for a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    #[default]
    Both,
    ToBrowser,
    ToEditor,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Both => "both",
            Self::ToBrowser => "to-browser",
            Self::ToEditor => "to-editor",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = DomainError;

    /// Accepts both `to-browser` and the legacy spaced `to browser`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().replace(' ', "-").as_str() {
            "both" => Ok(Self::Both),
            "to-browser" => Ok(Self::ToBrowser),
            "to-editor" => Ok(Self::ToEditor),
            _ => Err(DomainError::InvalidDirection {
                value: s.to_string(),
            }),
        }
    }
}

/// Persistent per-page settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default = "Utc::now")]
    pub last_used: DateTime<Utc>,
    /// Explicit browser resource → editor file overrides.
    #[serde(default)]
    pub user_mapping: Keyed<String>,
    /// Stylesheets the user created in the browser for this page.
    #[serde(default)]
    pub user_stylesheets: KeySet,
}

impl SessionConfig {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            enabled: false,
            direction: Direction::Both,
            last_used: at,
            user_mapping: Keyed::new(),
            user_stylesheets: KeySet::new(),
        }
    }
}

/// Session configs keyed by page url.
pub type Sessions = Keyed<Arc<SessionConfig>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SessionAction {
    /// Flips `enabled`, creating the config if needed.
    ToggleEnabled {
        id: String,
        #[serde(default = "Utc::now")]
        at: DateTime<Utc>,
    },
    /// Marks the config as used just now.
    Touch {
        id: String,
        #[serde(default = "Utc::now")]
        at: DateTime<Utc>,
    },
    UpdateFileMapping {
        id: String,
        browser: String,
        editor: String,
    },
    UpdateDirection {
        id: String,
        direction: Direction,
    },
    AddUserStylesheet {
        id: String,
        stylesheet: String,
    },
    RemoveUserStylesheet {
        id: String,
        stylesheet: String,
    },
    /// Replaces every config, typically from persisted storage.
    Load { sessions: Sessions },
}

impl SessionAction {
    pub fn toggle_enabled(id: impl Into<String>) -> Self {
        Self::ToggleEnabled {
            id: id.into(),
            at: Utc::now(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::ToggleEnabled { .. } => "session-toggle-enabled",
            Self::Touch { .. } => "session-touch",
            Self::UpdateFileMapping { .. } => "session-update-file-mapping",
            Self::UpdateDirection { .. } => "session-update-direction",
            Self::AddUserStylesheet { .. } => "session-add-user-stylesheet",
            Self::RemoveUserStylesheet { .. } => "session-remove-user-stylesheet",
            Self::Load { .. } => "session-load",
        }
    }
}

pub fn reduce(state: &Sessions, action: &SessionAction) -> Sessions {
    match action {
        SessionAction::ToggleEnabled { id, at } => {
            let config = match state.get(id) {
                Some(config) => {
                    let mut config = (**config).clone();
                    config.enabled = !config.enabled;
                    config
                }
                None => SessionConfig {
                    enabled: true,
                    ..SessionConfig::new(*at)
                },
            };
            debug!(page = %id, enabled = config.enabled, "session toggled");
            state.set(id.as_str(), Arc::new(config))
        }
        SessionAction::Touch { id, at } => edit(state, id, |config| config.last_used = *at),
        SessionAction::UpdateFileMapping {
            id,
            browser,
            editor,
        } => {
            if state
                .get(id)
                .is_some_and(|c| c.user_mapping.get(browser) == Some(editor))
            {
                return state.clone();
            }
            edit(state, id, |config| {
                config.user_mapping.insert(browser.as_str(), editor.clone());
            })
        }
        SessionAction::UpdateDirection { id, direction } => {
            if state.get(id).is_some_and(|c| c.direction == *direction) {
                return state.clone();
            }
            edit(state, id, |config| config.direction = *direction)
        }
        SessionAction::AddUserStylesheet { id, stylesheet } => {
            if stylesheet.is_empty() {
                warn!(page = %id, "empty user stylesheet name rejected");
                return state.clone();
            }
            if state
                .get(id)
                .is_some_and(|c| c.user_stylesheets.contains(stylesheet))
            {
                return state.clone();
            }
            edit(state, id, |config| {
                config.user_stylesheets.insert(stylesheet);
            })
        }
        SessionAction::RemoveUserStylesheet { id, stylesheet } => {
            if !state
                .get(id)
                .is_some_and(|c| c.user_stylesheets.contains(stylesheet))
            {
                return state.clone();
            }
            edit(state, id, |config| {
                config.user_stylesheets.remove(stylesheet);
            })
        }
        SessionAction::Load { sessions } => {
            if *sessions == *state {
                return state.clone();
            }
            sessions.clone()
        }
    }
}

/// Applies `change` to the config for `id`. Unknown pages are left alone;
/// only `ToggleEnabled` creates a config.
fn edit(state: &Sessions, id: &str, change: impl FnOnce(&mut SessionConfig)) -> Sessions {
    let Some(config) = state.get(id) else {
        debug!(page = %id, "no session config for page");
        return state.clone();
    };
    let mut config = (**config).clone();
    change(&mut config);
    state.set(id, Arc::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = "http://localhost/index.html";

    #[test]
    fn test_toggle_creates_and_flips() {
        let state = Sessions::new();
        let state = reduce(&state, &SessionAction::toggle_enabled(PAGE));
        assert!(state.get(PAGE).unwrap().enabled);

        let state = reduce(&state, &SessionAction::toggle_enabled(PAGE));
        assert!(!state.get(PAGE).unwrap().enabled);
    }

    #[test]
    fn test_update_mapping_and_direction() {
        let state = reduce(&Sessions::new(), &SessionAction::toggle_enabled(PAGE));
        let state = reduce(
            &state,
            &SessionAction::UpdateFileMapping {
                id: PAGE.to_string(),
                browser: "main.css".to_string(),
                editor: "/src/main.less".to_string(),
            },
        );
        let state = reduce(
            &state,
            &SessionAction::UpdateDirection {
                id: PAGE.to_string(),
                direction: Direction::ToEditor,
            },
        );

        let config = state.get(PAGE).unwrap();
        assert_eq!(
            config.user_mapping.get("main.css").map(String::as_str),
            Some("/src/main.less")
        );
        assert_eq!(config.direction, Direction::ToEditor);
        assert!(config.enabled);
    }

    #[test]
    fn test_same_direction_keeps_reference() {
        let state = reduce(&Sessions::new(), &SessionAction::toggle_enabled(PAGE));
        let next = reduce(
            &state,
            &SessionAction::UpdateDirection {
                id: PAGE.to_string(),
                direction: Direction::Both,
            },
        );
        assert!(next.ptr_eq(&state));
    }

    #[test]
    fn test_user_stylesheets() {
        let add = |name: &str| SessionAction::AddUserStylesheet {
            id: PAGE.to_string(),
            stylesheet: name.to_string(),
        };
        let state = reduce(&Sessions::new(), &SessionAction::toggle_enabled(PAGE));
        let state = reduce(&state, &add("lsxx-1"));
        let state = reduce(&state, &add("lsxx-2"));
        assert_eq!(state.get(PAGE).unwrap().user_stylesheets.len(), 2);

        let rejected = reduce(&state, &add(""));
        assert!(rejected.ptr_eq(&state));

        let state = reduce(
            &state,
            &SessionAction::RemoveUserStylesheet {
                id: PAGE.to_string(),
                stylesheet: "lsxx-1".to_string(),
            },
        );
        let sheets = &state.get(PAGE).unwrap().user_stylesheets;
        assert!(!sheets.contains("lsxx-1"));
        assert!(sheets.contains("lsxx-2"));
    }

    #[test]
    fn test_edits_on_unknown_page_are_ignored() {
        let state = Sessions::new();
        let id = || PAGE.to_string();
        let actions = [
            SessionAction::UpdateFileMapping {
                id: id(),
                browser: "main.css".to_string(),
                editor: "/src/main.less".to_string(),
            },
            SessionAction::UpdateDirection {
                id: id(),
                direction: Direction::ToEditor,
            },
            SessionAction::Touch {
                id: id(),
                at: Utc::now(),
            },
            SessionAction::AddUserStylesheet {
                id: id(),
                stylesheet: "lsxx-1".to_string(),
            },
            SessionAction::RemoveUserStylesheet {
                id: id(),
                stylesheet: "lsxx-1".to_string(),
            },
        ];

        for action in &actions {
            let next = reduce(&state, action);
            assert!(next.ptr_eq(&state), "{} created a config", action.kind());
            assert!(next.is_empty());
        }
    }

    #[test]
    fn test_remove_user_stylesheet_keeps_mapping() {
        let state = reduce(&Sessions::new(), &SessionAction::toggle_enabled(PAGE));
        let state = reduce(
            &state,
            &SessionAction::AddUserStylesheet {
                id: PAGE.to_string(),
                stylesheet: "lsxx-1".to_string(),
            },
        );
        let state = reduce(
            &state,
            &SessionAction::UpdateFileMapping {
                id: PAGE.to_string(),
                browser: "lsxx-1".to_string(),
                editor: "/src/extra.less".to_string(),
            },
        );
        let state = reduce(
            &state,
            &SessionAction::RemoveUserStylesheet {
                id: PAGE.to_string(),
                stylesheet: "lsxx-1".to_string(),
            },
        );

        let config = state.get(PAGE).unwrap();
        assert!(config.user_stylesheets.is_empty());
        assert_eq!(
            config.user_mapping.get("lsxx-1").map(String::as_str),
            Some("/src/extra.less")
        );
    }

    #[test]
    fn test_direction_parsing() {
        assert_eq!("to browser".parse::<Direction>().unwrap(), Direction::ToBrowser);
        assert_eq!("to-editor".parse::<Direction>().unwrap(), Direction::ToEditor);
        assert!("sideways".parse::<Direction>().is_err());
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: SessionConfig = serde_json::from_str(
            r#"{"enabled": true, "direction": "to-browser", "userMapping": {"a.css": "/a.less"}}"#,
        )
        .unwrap();
        assert!(config.enabled);
        assert_eq!(config.direction, Direction::ToBrowser);
        assert!(config.user_stylesheets.is_empty());
    }
}
