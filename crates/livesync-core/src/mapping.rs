//! Browser resource → editor file mapping.
//!
//! Resolution works on path segments. For every browser resource the
//! candidates are editor files with the same final segment (or the same
//! final segment once extensions are stripped, so `main.css` finds
//! `main.less`). Candidates are then narrowed by comparing parent
//! segments from the end until one remains, a comparison would leave
//! none, or segments run out. The first surviving candidate in editor
//! list order wins.
//!
//! User overrides always beat the heuristic, but only when both sides
//! still exist.

use std::collections::HashSet;

use crate::immutable::{KeySet, Keyed};

/// Maps every resolvable browser resource to an editor file.
///
/// `browser` is iterated in order and the result preserves that order.
/// `user` holds explicit browser → editor overrides; an override whose
/// browser side is not in `browser` or whose editor side is not in
/// `editor` is ignored.
pub fn resolve<'a, I>(browser: I, editor: &KeySet, user: Option<&Keyed<String>>) -> Keyed<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let browser: Vec<&str> = browser.into_iter().collect();
    let mut mapping: Keyed<String> = browser
        .iter()
        .filter_map(|resource| best_match(resource, editor).map(|file| (*resource, file)))
        .collect();

    if let Some(user) = user {
        let known: HashSet<&str> = browser.iter().copied().collect();
        for (resource, file) in user {
            if known.contains(resource.as_str()) && editor.contains(file) {
                mapping.insert(resource.as_str(), file.clone());
            }
        }
    }

    mapping
}

/// Heuristic lookup of one browser resource among editor files.
pub fn best_match(resource: &str, editor: &KeySet) -> Option<String> {
    let lookup = segments(resource);
    let name = lookup.last()?;

    let mut candidates: Vec<(&str, Vec<&str>)> = editor
        .iter()
        .map(|file| (file.as_str(), segments(file)))
        .filter(|(_, parts)| parts.last().is_some_and(|last| same_name(last, name)))
        .collect();

    let mut depth = 1;
    while candidates.len() > 1 {
        let Some(part) = lookup.iter().rev().nth(depth) else {
            break;
        };
        let narrowed: Vec<(&str, Vec<&str>)> = candidates
            .iter()
            .filter(|(_, parts)| {
                parts
                    .iter()
                    .rev()
                    .nth(depth)
                    .is_some_and(|candidate| same_name(candidate, part))
            })
            .cloned()
            .collect();

        if narrowed.is_empty() {
            break;
        }
        candidates = narrowed;
        depth += 1;
    }

    candidates.first().map(|(file, _)| (*file).to_string())
}

/// Non-empty path segments with any query string removed.
fn segments(path: &str) -> Vec<&str> {
    let path = path.split('?').next().unwrap_or_default();
    path.split('/').filter(|part| !part.is_empty()).collect()
}

fn same_name(a: &str, b: &str) -> bool {
    a == b || strip_extension(a) == strip_extension(b)
}

/// Drops a trailing `.ext` where `ext` is word characters only.
fn strip_extension(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, ext))
            if !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') =>
        {
            stem
        }
        _ => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(list: &[&str]) -> KeySet {
        list.iter().copied().collect()
    }

    #[test]
    fn test_matches_across_preprocessor_extensions() {
        let mapping = resolve(["a.css", "b.less"], &files(&["x/a.css", "y/b.scss"]), None);

        assert_eq!(mapping.get("a.css").map(String::as_str), Some("x/a.css"));
        assert_eq!(mapping.get("b.less").map(String::as_str), Some("y/b.scss"));
    }

    #[test]
    fn test_narrows_by_parent_segments() {
        let editor = files(&[
            "/home/dev/site/css/main.css",
            "/home/dev/site/admin/css/main.css",
            "/home/dev/other/main.css",
        ]);

        assert_eq!(
            best_match("http://localhost/admin/css/main.css", &editor).as_deref(),
            Some("/home/dev/site/admin/css/main.css")
        );
        assert_eq!(
            best_match("http://localhost/css/main.css?v=2", &editor).as_deref(),
            Some("/home/dev/site/css/main.css")
        );
    }

    #[test]
    fn test_failed_round_keeps_previous_candidates() {
        let editor = files(&["/a/style.css", "/b/style.css"]);
        assert_eq!(
            best_match("http://host/zzz/style.css", &editor).as_deref(),
            Some("/a/style.css")
        );
    }

    #[test]
    fn test_no_candidates() {
        let editor = files(&["/a/other.css"]);
        assert_eq!(best_match("http://host/style.css", &editor), None);
        assert_eq!(best_match("", &editor), None);
    }

    #[test]
    fn test_user_mapping_overrides_when_valid() {
        let editor = files(&["x/a.css", "z/custom.scss"]);
        let user: Keyed<String> = [
            ("a.css", "z/custom.scss".to_string()),
            ("gone.css", "x/a.css".to_string()),
            ("other.css", "missing.css".to_string()),
        ]
        .into_iter()
        .collect();

        let mapping = resolve(["a.css", "other.css"], &editor, Some(&user));

        assert_eq!(mapping.get("a.css").map(String::as_str), Some("z/custom.scss"));
        assert!(!mapping.contains_key("gone.css"));
        assert!(!mapping.contains_key("other.css"));
    }

    #[test]
    fn test_strip_extension() {
        assert_eq!(strip_extension("main.css"), "main");
        assert_eq!(strip_extension("main.min.css"), "main.min");
        assert_eq!(strip_extension("main"), "main");
        assert_eq!(strip_extension("main."), "main.");
        assert_eq!(strip_extension("file.c-ss"), "file.c-ss");
    }
}
