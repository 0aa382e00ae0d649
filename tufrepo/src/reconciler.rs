//! Walks an artifact directory and routes each file to the delegated (or top-level) targets role
//! whose path patterns match it most specifically, producing the target entries that role's
//! `targets.json` should contain.

use crate::error::{self, Result};
use crate::repository::Repository;
use crate::schema::{DelegatedRole, Target};
use snafu::ResultExt;
use std::collections::HashMap;
use std::path::Path;
use walkdir::WalkDir;

/// One artifact's routed destination: its repo-relative path, the role responsible for it, and
/// its freshly computed target entry.
#[derive(Debug, Clone)]
pub struct RoutedTarget {
    pub path: String,
    pub role: String,
    pub target: Target,
}

/// Routes `path` to the most specific matching delegated role, or `"targets"` if no delegation
/// claims it. Ties in specificity break on the delegation's position in `roles` (earlier wins),
/// mirroring how TUF clients resolve ambiguous delegations.
fn route<'a>(path: &str, delegated_roles: &'a [DelegatedRole]) -> Result<Option<&'a DelegatedRole>> {
    let mut best: Option<&DelegatedRole> = None;
    for role in delegated_roles {
        if role.matches(path)? {
            best = match best {
                Some(current) if current.specificity() >= role.specificity() => Some(current),
                _ => Some(role),
            };
        }
    }
    Ok(best)
}

/// Walks every regular file under `artifact_dir`, matches it against every delegated role reached
/// from the top-level `targets` role, and returns one [`RoutedTarget`] per file. A file matched by
/// no delegation is routed to `"targets"` itself. A file matched by no role at all — impossible
/// here since the top-level role always catches what delegations don't — is never silently
/// dropped; delegations that are meant to exclude files from publication should be `terminating`.
pub fn reconcile(repo: &Repository, artifact_dir: &Path) -> Result<Vec<RoutedTarget>> {
    let mut delegated_roles = Vec::new();
    for name in repo.delegated_role_names()? {
        let doc = repo.targets(&name)?;
        if let Some(delegations) = doc.signed.delegations {
            delegated_roles.extend(delegations.roles);
        }
    }

    let mut routed = Vec::new();
    for entry in WalkDir::new(artifact_dir) {
        let entry = entry.context(error::WalkDirectorySnafu {
            path: artifact_dir.to_path_buf(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(artifact_dir)
            .expect("walkdir entries are always under the root they were started from")
            .to_string_lossy()
            .replace(std::path::MAIN_SEPARATOR, "/");

        let role = route(&relative, &delegated_roles)?
            .map(|r| r.name.clone())
            .unwrap_or_else(|| "targets".to_string());

        let target = Target::from_path(entry.path())?;
        routed.push(RoutedTarget {
            path: relative,
            role,
            target,
        });
    }
    Ok(routed)
}

/// Groups routed targets by the role responsible for them, the shape the caller needs to update
/// one role's `targets` map per delegated role in a single pass.
pub fn group_by_role(routed: Vec<RoutedTarget>) -> HashMap<String, HashMap<String, Target>> {
    let mut by_role: HashMap<String, HashMap<String, Target>> = HashMap::new();
    for item in routed {
        by_role.entry(item.role).or_default().insert(item.path, item.target);
    }
    by_role
}

/// The deepest nesting level [`build_paths`] generates a pattern for.
pub const MAX_DEPTH: u32 = 4;

/// Generates the default delegation path patterns for a role named `name`: one glob per nesting
/// level up to `max_depth`, so a delegation created without explicit `--path` arguments still
/// claims everything under its own directory instead of nothing.
pub fn build_paths(name: &str, max_depth: u32) -> Vec<String> {
    (1..=max_depth)
        .map(|depth| format!("{name}{}", "/*".repeat(depth as usize)))
        .collect()
}

/// Diffs a role's freshly reconciled targets map against what it currently has on disk, the basis
/// for both "does this edit actually change anything" (so a no-op reconciliation doesn't bump a
/// version) and the signing-status engine's ADDED/MODIFIED/REMOVED reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetChange {
    Added,
    Modified,
    Removed,
}

pub fn diff_targets(
    current: &HashMap<String, Target>,
    reconciled: &HashMap<String, Target>,
) -> HashMap<String, TargetChange> {
    let mut changes = HashMap::new();
    for (path, target) in reconciled {
        match current.get(path) {
            None => {
                changes.insert(path.clone(), TargetChange::Added);
            }
            Some(existing) if existing.hashes != target.hashes || existing.length != target.length => {
                changes.insert(path.clone(), TargetChange::Modified);
            }
            Some(_) => {}
        }
    }
    for path in current.keys() {
        if !reconciled.contains_key(path) {
            changes.insert(path.clone(), TargetChange::Removed);
        }
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroU64;

    fn role(name: &str, paths: &[&str]) -> DelegatedRole {
        DelegatedRole {
            name: name.to_string(),
            keyids: Vec::new(),
            threshold: NonZeroU64::new(1).unwrap(),
            terminating: false,
            paths: paths.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn most_specific_delegation_wins() {
        let roles = vec![role("wide", &["**"]), role("narrow", &["bin/x86_64/*"])];
        let matched = route("bin/x86_64/tool", &roles).unwrap().unwrap();
        assert_eq!(matched.name, "narrow");
    }

    #[test]
    fn earlier_declaration_wins_on_tie() {
        let roles = vec![role("first", &["bin/*"]), role("second", &["bin/*"])];
        let matched = route("bin/tool", &roles).unwrap().unwrap();
        assert_eq!(matched.name, "first");
    }

    #[test]
    fn build_paths_generates_one_glob_per_nesting_level() {
        assert_eq!(
            build_paths("myrole", 4),
            vec!["myrole/*", "myrole/*/*", "myrole/*/*/*", "myrole/*/*/*/*"]
        );
    }

    #[test]
    fn unmatched_file_falls_through_to_top_level() {
        let roles = vec![role("bins", &["bin/**"])];
        assert!(route("docs/readme.md", &roles).unwrap().is_none());
    }

    #[test]
    fn diff_detects_added_modified_removed() {
        let mut current = HashMap::new();
        current.insert(
            "a".to_string(),
            Target {
                length: 1,
                hashes: crate::schema::Hashes { sha256: vec![1].into() },
                custom: HashMap::new(),
            },
        );
        current.insert(
            "b".to_string(),
            Target {
                length: 2,
                hashes: crate::schema::Hashes { sha256: vec![2].into() },
                custom: HashMap::new(),
            },
        );

        let mut reconciled = HashMap::new();
        reconciled.insert(
            "a".to_string(),
            Target {
                length: 1,
                hashes: crate::schema::Hashes { sha256: vec![1].into() },
                custom: HashMap::new(),
            },
        );
        reconciled.insert(
            "b".to_string(),
            Target {
                length: 99,
                hashes: crate::schema::Hashes { sha256: vec![2].into() },
                custom: HashMap::new(),
            },
        );
        reconciled.insert(
            "c".to_string(),
            Target {
                length: 3,
                hashes: crate::schema::Hashes { sha256: vec![3].into() },
                custom: HashMap::new(),
            },
        );

        let changes = diff_targets(&current, &reconciled);
        assert_eq!(changes.get("c"), Some(&TargetChange::Added));
        assert_eq!(changes.get("b"), Some(&TargetChange::Modified));
        assert!(!changes.contains_key("a"));
    }

    #[test]
    fn reconcile_routes_files_to_the_delegation_claiming_their_path() {
        use crate::schema::{DelegatedRole, Delegations, Signed, Targets};
        use std::fs;

        let metadata_dir = tempfile::tempdir().unwrap();
        let artifact_dir = tempfile::tempdir().unwrap();
        let utc = |s: &str| -> chrono::DateTime<chrono::Utc> { s.parse().unwrap() };

        for path in [
            "tfile1.txt",
            "levela/filea.txt",
            "levelb/fileb.txt",
            "level1/file1.txt",
            "level1/level2/tfile2.txt",
        ] {
            let full = artifact_dir.path().join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, b"content").unwrap();
        }

        let mut targets = Targets::new(utc("2020-01-01T00:00:00Z"));
        let mut delegations = Delegations::new();
        delegations.roles.push(role("myrole1", &["levela/*", "levelb/*"]));
        delegations.roles.push(role("myrole2", &["level1/file1.txt"]));
        targets.delegations = Some(delegations);

        let repo = Repository::open(metadata_dir.path());
        repo.write_role("targets.json", &Signed::new(targets)).unwrap();
        repo.write_role("myrole1.json", &Signed::new(Targets::new(utc("2020-01-01T00:00:00Z")))).unwrap();
        repo.write_role("myrole2.json", &Signed::new(Targets::new(utc("2020-01-01T00:00:00Z")))).unwrap();

        let routed = reconcile(&repo, artifact_dir.path()).unwrap();
        let by_role = group_by_role(routed);

        let mut targets_paths: Vec<&String> = by_role["targets"].keys().collect();
        targets_paths.sort();
        assert_eq!(targets_paths, vec!["level1/level2/tfile2.txt", "tfile1.txt"]);

        let mut myrole1_paths: Vec<&String> = by_role["myrole1"].keys().collect();
        myrole1_paths.sort();
        assert_eq!(myrole1_paths, vec!["levela/filea.txt", "levelb/fileb.txt"]);

        assert_eq!(by_role["myrole2"].keys().collect::<Vec<_>>(), vec!["level1/file1.txt"]);
    }

    #[test]
    fn changed_roles_are_the_union_of_roles_with_a_nonempty_diff() {
        let mut targets_current = HashMap::new();
        targets_current.insert(
            "tfile1.txt".to_string(),
            Target {
                length: 1,
                hashes: crate::schema::Hashes { sha256: vec![1].into() },
                custom: HashMap::new(),
            },
        );
        let mut targets_reconciled = targets_current.clone();
        targets_reconciled.insert(
            "tfile1.txt".to_string(),
            Target {
                length: 2,
                hashes: crate::schema::Hashes { sha256: vec![2].into() },
                custom: HashMap::new(),
            },
        );

        let myrole_current = HashMap::new();
        let mut myrole_reconciled = HashMap::new();
        myrole_reconciled.insert(
            "myrole/new.txt".to_string(),
            Target {
                length: 1,
                hashes: crate::schema::Hashes { sha256: vec![1].into() },
                custom: HashMap::new(),
            },
        );

        let mut oldrole_current = HashMap::new();
        oldrole_current.insert(
            "oldrole/gone.txt".to_string(),
            Target {
                length: 1,
                hashes: crate::schema::Hashes { sha256: vec![1].into() },
                custom: HashMap::new(),
            },
        );
        let oldrole_reconciled = HashMap::new();

        let untouched_current: HashMap<String, Target> = HashMap::new();
        let untouched_reconciled: HashMap<String, Target> = HashMap::new();

        let diffs = [
            ("targets", diff_targets(&targets_current, &targets_reconciled)),
            ("myrole", diff_targets(&myrole_current, &myrole_reconciled)),
            ("oldrole", diff_targets(&oldrole_current, &oldrole_reconciled)),
            ("untouched", diff_targets(&untouched_current, &untouched_reconciled)),
        ];
        let changed_roles: Vec<&str> = diffs
            .iter()
            .filter(|(_, changes)| !changes.is_empty())
            .map(|(name, _)| *name)
            .collect();

        assert_eq!(changed_roles, vec!["targets", "myrole", "oldrole"]);
    }
}
