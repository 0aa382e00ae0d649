//! Publishing a closed signing event's metadata (and, for consistent-snapshot repositories, the
//! hash-prefixed copies of changed artifacts) into the directory a TUF client actually fetches
//! from.
//!
//! This module only ever copies files already present under a metadata directory; rendering a
//! human-readable report of the outcome is a CLI concern, not this crate's.

use crate::error::{self, Result};
use crate::repository::Repository;
use crate::schema::RoleType;
use snafu::ResultExt;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// One row of the structured publish report: which role, which version, where it landed.
#[derive(Debug, Clone)]
pub struct PublishedRole {
    pub role: String,
    pub version: u64,
    pub destination: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct PublishReport {
    pub roles: Vec<PublishedRole>,
}

/// Copies every role document from `repo` into `publish_dir`. When `repo`'s root declares
/// `consistent_snapshot`, each non-root role is additionally copied under its version-prefixed
/// name (`3.snapshot.json`) alongside the unprefixed latest copy, and every target file already
/// present under `repo`'s metadata directory's sibling `targets/` is copied under its
/// hash-prefixed name. Root is always published under every historical version name plus
/// `root.json`, since clients must be able to walk the chain from any version they currently
/// trust.
pub fn publish(repo: &Repository, publish_dir: &Path) -> Result<PublishReport> {
    fs::create_dir_all(publish_dir).context(error::FileWriteSnafu {
        path: publish_dir.to_path_buf(),
    })?;

    let root = repo.root()?;
    let consistent_snapshot = root.signed.consistent_snapshot;
    let mut report = PublishReport::default();

    copy_role_file(repo.metadata_dir(), publish_dir, "root.json")?;
    report.roles.push(PublishedRole {
        role: "root".to_string(),
        version: root.signed.version.get(),
        destination: publish_dir.join("root.json"),
    });
    publish_root_history(repo, publish_dir)?;

    let timestamp = repo.timestamp()?;
    copy_role_file(repo.metadata_dir(), publish_dir, "timestamp.json")?;
    report.roles.push(PublishedRole {
        role: "timestamp".to_string(),
        version: timestamp.signed.version.get(),
        destination: publish_dir.join("timestamp.json"),
    });

    let snapshot = repo.snapshot()?;
    publish_versioned_role(repo, publish_dir, "snapshot", snapshot.signed.version.get(), consistent_snapshot, &mut report)?;

    let mut role_names = vec!["targets".to_string()];
    role_names.extend(repo.delegated_role_names()?);
    for name in role_names {
        let doc = repo.targets(&name)?;
        publish_versioned_role(repo, publish_dir, &name, doc.signed.version.get(), consistent_snapshot, &mut report)?;
    }

    if consistent_snapshot {
        publish_target_artifacts(repo, publish_dir)?;
    }

    Ok(report)
}

fn publish_versioned_role(
    repo: &Repository,
    publish_dir: &Path,
    role_name: &str,
    version: u64,
    consistent_snapshot: bool,
    report: &mut PublishReport,
) -> Result<()> {
    let file_name = format!("{role_name}.json");
    copy_role_file(repo.metadata_dir(), publish_dir, &file_name)?;
    report.roles.push(PublishedRole {
        role: role_name.to_string(),
        version,
        destination: publish_dir.join(&file_name),
    });
    if consistent_snapshot {
        let versioned = format!("{version}.{role_name}.json");
        copy_role_file(repo.metadata_dir(), publish_dir, &versioned)?;
    }
    Ok(())
}

/// Copies every archived root version (`root_history/{version}.root.json`) into `publish_dir`
/// verbatim, so a client that currently trusts an old root can still walk the chain of trust
/// forward one version at a time. Unlike the rest of publishing, this isn't gated on
/// `consistent_snapshot`: a client anchored on an old root needs the chain regardless.
fn publish_root_history(repo: &Repository, publish_dir: &Path) -> Result<()> {
    let root_history_dir = repo.metadata_dir().join("root_history");
    if !root_history_dir.is_dir() {
        return Ok(());
    }
    for entry in fs::read_dir(&root_history_dir).context(error::FileReadSnafu {
        path: root_history_dir.clone(),
    })? {
        let entry = entry.context(error::FileReadSnafu {
            path: root_history_dir.clone(),
        })?;
        let destination = publish_dir.join(entry.file_name());
        fs::copy(entry.path(), &destination).context(error::FileWriteSnafu { path: destination })?;
    }
    Ok(())
}

fn copy_role_file(metadata_dir: &Path, publish_dir: &Path, file_name: &str) -> Result<()> {
    let source = metadata_dir.join(file_name);
    let destination = publish_dir.join(file_name);
    fs::copy(&source, &destination).context(error::FileWriteSnafu { path: destination })?;
    Ok(())
}

fn publish_target_artifacts(repo: &Repository, publish_dir: &Path) -> Result<()> {
    let targets_src = repo.metadata_dir().join("targets");
    if !targets_src.is_dir() {
        return Ok(());
    }
    let targets_dst = publish_dir.join("targets");
    fs::create_dir_all(&targets_dst).context(error::FileWriteSnafu {
        path: targets_dst.clone(),
    })?;

    let mut role_names = vec!["targets".to_string()];
    role_names.extend(repo.delegated_role_names()?);
    let mut all_targets = HashMap::new();
    for name in role_names {
        let doc = repo.targets(&name)?;
        all_targets.extend(doc.signed.targets);
    }

    for (path, target) in all_targets {
        let source = targets_src.join(&path);
        if !source.is_file() {
            continue;
        }
        let hash_prefix = hex::encode(target.hashes.sha256.as_ref());
        let dest_name = match Path::new(&path).file_name().and_then(|n| n.to_str()) {
            Some(name) => format!("{hash_prefix}.{name}"),
            None => continue,
        };
        let dest_dir = targets_dst.join(Path::new(&path).parent().unwrap_or_else(|| Path::new("")));
        fs::create_dir_all(&dest_dir).context(error::FileWriteSnafu { path: dest_dir.clone() })?;
        let dest = dest_dir.join(dest_name);
        fs::copy(&source, &dest).context(error::FileWriteSnafu { path: dest })?;
    }
    Ok(())
}

/// Builds the structured rows a CLI or dashboard renders as a signing-event summary (next
/// signing deadline per role, current signer list). This stays data-only; turning it into
/// Markdown or any other presentation is out of scope for the engine.
#[derive(Debug, Clone)]
pub struct PublisherRow {
    pub role: String,
    pub next_signing: chrono::DateTime<chrono::Utc>,
    pub signers: Vec<String>,
}

pub fn publisher_rows(repo: &Repository) -> Result<Vec<PublisherRow>> {
    let root = repo.root()?;
    let mut rows = Vec::new();
    for (role_type, role_keys) in &root.signed.roles {
        let expires = match role_type {
            RoleType::Root => root.signed.expires,
            RoleType::Snapshot => repo.snapshot()?.signed.expires,
            RoleType::Timestamp => repo.timestamp()?.signed.expires,
            RoleType::Targets => repo.targets("targets")?.signed.expires,
        };
        let signers = role_keys
            .keyids
            .iter()
            .map(|id| match root.signed.keys.get(id) {
                Some(key) if key.owner().keyowner.is_some() => key.owner().keyowner.unwrap(),
                _ => id.to_string(),
            })
            .collect();
        rows.push(PublisherRow {
            role: role_type.to_string(),
            next_signing: expires - root.signed.lifecycle().signing_period(),
            signers,
        });
    }
    rows.sort_by(|a, b| a.role.cmp(&b.role));
    Ok(rows)
}
