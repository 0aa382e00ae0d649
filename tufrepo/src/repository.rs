//! A view onto one checkout of a metadata directory: the four top-level roles plus however many
//! delegated targets documents exist, loaded and cached on first access.
//!
//! The signing-status engine opens two of these for a signing event: one rooted at the proposed
//! checkout, one at the last known-good state (the merge-base), and diffs them. Neither view
//! mutates anything; mutation happens through [`crate::edit::Edit`].

use crate::error::{self, Result};
use crate::schema::{Root, Signed, Snapshot, Targets, Timestamp};
use serde::de::DeserializeOwned;
use serde::Serialize;
use snafu::ResultExt;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
struct Cache {
    root: Option<Signed<Root>>,
    snapshot: Option<Signed<Snapshot>>,
    timestamp: Option<Signed<Timestamp>>,
    targets: HashMap<String, Signed<Targets>>,
}

/// A read view of a metadata directory on disk.
#[derive(Debug)]
pub struct Repository {
    metadata_dir: PathBuf,
    cache: RefCell<Cache>,
}

/// The `expires` a freshly-bootstrapped `snapshot`/`timestamp`/empty-root document is stamped
/// with. Never observed outside of a single edit transaction: the first successful commit
/// replaces it with a real `expires` derived from the role's lifecycle period.
fn bootstrap_expires() -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from_timestamp(0, 0).expect("unix epoch is a valid timestamp")
}

impl Repository {
    pub fn open(metadata_dir: impl Into<PathBuf>) -> Self {
        Repository {
            metadata_dir: metadata_dir.into(),
            cache: RefCell::new(Cache::default()),
        }
    }

    pub fn metadata_dir(&self) -> &Path {
        &self.metadata_dir
    }

    fn role_path(&self, file_name: &str) -> PathBuf {
        self.metadata_dir.join(file_name)
    }

    fn role_exists(&self, file_name: &str) -> bool {
        self.role_path(file_name).is_file()
    }

    /// Reads and parses `file_name`, mapping a missing file to [`error::Error::RoleMissing`]
    /// rather than the generic I/O failure a bare `FileRead` would report.
    fn load<T: DeserializeOwned>(&self, file_name: &str) -> Result<Signed<T>> {
        let path = self.role_path(file_name);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                return error::RoleMissingSnafu {
                    role: file_name.to_string(),
                }
                .fail();
            }
            Err(source) => return Err(source).context(error::FileReadSnafu { path }),
        };
        serde_json::from_slice(&bytes).context(error::ParseMetadataFileSnafu { path })
    }

    pub fn root(&self) -> Result<Signed<Root>> {
        if let Some(root) = &self.cache.borrow().root {
            return Ok(root.clone());
        }
        let root: Signed<Root> = self.load("root.json")?;
        self.cache.borrow_mut().root = Some(root.clone());
        Ok(root)
    }

    /// This checkout's current root payload, or an empty default [`Root`] if `root.json` doesn't
    /// exist at all. Used as the known-good side of the root dual-quorum comparison, where "no
    /// known-good checkout yet" and "an empty root with no keys or roles" are the same thing.
    pub fn known_good_root(&self) -> Result<Root> {
        if !self.role_exists("root.json") {
            return Ok(Root::new(bootstrap_expires()));
        }
        Ok(self.root()?.signed)
    }

    /// Loads a specific historical version of root, the form used to preserve old signer key
    /// slots across a rotation.
    pub fn root_version(&self, version: std::num::NonZeroU64) -> Result<Signed<Root>> {
        self.load(&format!("root_history/{version}.root.json"))
    }

    pub fn snapshot(&self) -> Result<Signed<Snapshot>> {
        if let Some(snapshot) = &self.cache.borrow().snapshot {
            return Ok(snapshot.clone());
        }
        let snapshot: Signed<Snapshot> = if self.role_exists("snapshot.json") {
            self.load("snapshot.json")?
        } else {
            Signed::new(Snapshot::new(bootstrap_expires()))
        };
        self.cache.borrow_mut().snapshot = Some(snapshot.clone());
        Ok(snapshot)
    }

    pub fn timestamp(&self) -> Result<Signed<Timestamp>> {
        if let Some(timestamp) = &self.cache.borrow().timestamp {
            return Ok(timestamp.clone());
        }
        let timestamp: Signed<Timestamp> = if self.role_exists("timestamp.json") {
            self.load("timestamp.json")?
        } else {
            Signed::new(Timestamp::new(bootstrap_expires()))
        };
        self.cache.borrow_mut().timestamp = Some(timestamp.clone());
        Ok(timestamp)
    }

    /// Loads the top-level `targets` role, or a named delegation (`"bins"` loads `bins.json`).
    pub fn targets(&self, role_name: &str) -> Result<Signed<Targets>> {
        if let Some(targets) = self.cache.borrow().targets.get(role_name) {
            return Ok(targets.clone());
        }
        let targets: Signed<Targets> = self.load(&format!("{role_name}.json"))?;
        self.cache
            .borrow_mut()
            .targets
            .insert(role_name.to_string(), targets.clone());
        Ok(targets)
    }

    /// The version this role is stored at, or `0` if it has never been committed. Unlike
    /// [`Repository::root`]/[`Repository::snapshot`]/[`Repository::timestamp`], this never
    /// fabricates a bootstrap placeholder's version: a missing file is always `0`, which is what
    /// lets an edit transaction compute `known_good_version(role) + 1` without special-casing the
    /// very first commit.
    pub fn version_of(&self, role_name: &str) -> Result<u64> {
        let file_name = match role_name {
            "root" | "snapshot" | "timestamp" => format!("{role_name}.json"),
            other => format!("{other}.json"),
        };
        if !self.role_exists(&file_name) {
            return Ok(0);
        }
        match role_name {
            "root" => Ok(self.root()?.signed.version.get()),
            "snapshot" => Ok(self.snapshot()?.signed.version.get()),
            "timestamp" => Ok(self.timestamp()?.signed.version.get()),
            other => Ok(self.targets(other)?.signed.version.get()),
        }
    }

    /// The names of every delegated targets role reachable from the top-level `targets` role,
    /// found by walking the delegation tree breadth-first.
    pub fn delegated_role_names(&self) -> Result<Vec<String>> {
        let mut seen = Vec::new();
        let mut queue = vec!["targets".to_string()];
        while let Some(name) = queue.pop() {
            let doc = self.targets(&name)?;
            if let Some(delegations) = &doc.signed.delegations {
                for role in &delegations.roles {
                    if !seen.contains(&role.name) {
                        seen.push(role.name.clone());
                        queue.push(role.name.clone());
                    }
                }
            }
        }
        Ok(seen)
    }

    /// Invalidates every cached document, forcing the next access to re-read from disk. Called
    /// after an edit transaction commits so a single `Repository` can observe its own writes.
    pub fn invalidate(&self) {
        *self.cache.borrow_mut() = Cache::default();
    }

    pub fn write_role<T: Serialize>(&self, file_name: &str, doc: &Signed<T>) -> Result<()> {
        let path = self.role_path(file_name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context(error::FileWriteSnafu { path: path.clone() })?;
        }
        let bytes = serde_json::to_vec_pretty(doc).context(error::CanonicalSerializationSnafu {
            what: file_name.to_string(),
        })?;
        std::fs::write(&path, bytes).context(error::FileWriteSnafu { path })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> chrono::DateTime<chrono::Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn version_of_is_zero_for_a_never_committed_role() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::open(dir.path());
        assert_eq!(repo.version_of("snapshot").unwrap(), 0);
        assert_eq!(repo.version_of("root").unwrap(), 0);
        assert_eq!(repo.version_of("bins").unwrap(), 0);
    }

    #[test]
    fn version_of_reads_the_stored_version() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::open(dir.path());
        let mut snapshot = Signed::new(Snapshot::new(utc("2020-01-01T00:00:00Z")));
        snapshot.signed.version = std::num::NonZeroU64::new(4).unwrap();
        repo.write_role("snapshot.json", &snapshot).unwrap();
        repo.invalidate();
        assert_eq!(repo.version_of("snapshot").unwrap(), 4);
    }

    #[test]
    fn snapshot_and_timestamp_bootstrap_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::open(dir.path());
        assert_eq!(repo.snapshot().unwrap().signed.meta.len(), 0);
        assert_eq!(repo.timestamp().unwrap().signed.meta.len(), 0);
    }

    #[test]
    fn known_good_root_is_empty_when_root_json_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::open(dir.path());
        let root = repo.known_good_root().unwrap();
        assert!(root.keys.is_empty());
        assert!(root.roles.is_empty());
    }

    #[test]
    fn root_version_reads_from_root_history() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::open(dir.path());
        let root = Signed::new(Root::new(utc("2020-01-01T00:00:00Z")));
        repo.write_role("root_history/1.root.json", &root).unwrap();
        let loaded = repo.root_version(std::num::NonZeroU64::new(1).unwrap()).unwrap();
        assert_eq!(loaded.signed.version.get(), 1);
    }

    #[test]
    fn write_role_creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::open(dir.path());
        let root = Signed::new(Root::new(utc("2020-01-01T00:00:00Z")));
        repo.write_role("root_history/3.root.json", &root).unwrap();
        assert!(dir.path().join("root_history/3.root.json").is_file());
    }
}
