//! Scoped mutation of a role's signed payload.
//!
//! `edit.root(|root| { ...; Ok(changed) })?` loads the current document, hands the caller a
//! mutable reference to the payload, and — only if the closure reports that it actually changed
//! something — bumps the version, resets `expires` from the lifecycle period, drops every
//! existing signature, and writes the result back. A closure that returns `Ok(false)` (nothing to
//! do) leaves the on-disk document untouched, so repeated no-op edits never inflate the version.

use crate::clock::Clock;
use crate::error::{self, Result};
use crate::repository::Repository;
use crate::schema::{Role, RoleType, Root, Signed, Snapshot, Targets, Timestamp};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A handle for making one or more scoped edits against a repository view, sharing a single
/// clock so that, e.g., editing `targets` and then `snapshot` in the same signing pass stamps
/// both with the same `expires` baseline.
pub struct Edit<'r> {
    repo: &'r Repository,
    clock: &'r dyn Clock,
}

impl<'r> Edit<'r> {
    pub fn new(repo: &'r Repository, clock: &'r dyn Clock) -> Self {
        Edit { repo, clock }
    }

    /// Commits a scoped edit against `role_name`, whose on-disk form is `file_name`.
    ///
    /// Unlike [`Role::bump`], the new version is derived from [`Repository::version_of`] rather
    /// than from `doc`'s own in-memory version field: a freshly-bootstrapped `snapshot`/
    /// `timestamp` document (never yet persisted) reports `version_of == 0`, so its first real
    /// commit lands at version 1 instead of double-counting the bootstrap placeholder's already-1
    /// version field.
    fn commit<T, F>(&self, file_name: &str, role_name: &str, mut doc: Signed<T>, f: F) -> Result<bool>
    where
        T: Role + Serialize + DeserializeOwned + Clone,
        F: FnOnce(&mut T) -> Result<bool>,
    {
        let changed = f(&mut doc.signed)?;
        if changed {
            let next_version = self.repo.version_of(role_name)? + 1;
            doc.signed.set_version(
                std::num::NonZeroU64::new(next_version).expect("version_of() + 1 is never zero"),
            );
            doc.signed.set_expires(self.clock.now() + doc.signed.lifecycle().expiry_period());
            doc.clear_signatures();
            self.repo.write_role(file_name, &doc)?;
            self.repo.invalidate();
        }
        Ok(changed)
    }

    pub fn snapshot<F>(&self, f: F) -> Result<bool>
    where
        F: FnOnce(&mut Snapshot) -> Result<bool>,
    {
        let doc = self.repo.snapshot()?;
        self.commit("snapshot.json", "snapshot", doc, f)
    }

    pub fn timestamp<F>(&self, f: F) -> Result<bool>
    where
        F: FnOnce(&mut Timestamp) -> Result<bool>,
    {
        let doc = self.repo.timestamp()?;
        self.commit("timestamp.json", "timestamp", doc, f)
    }

    /// Edits the top-level `targets` role (`role_name == "targets"`) or a named delegation.
    pub fn targets<F>(&self, role_name: &str, f: F) -> Result<bool>
    where
        F: FnOnce(&mut Targets) -> Result<bool>,
    {
        let doc = self.repo.targets(role_name)?;
        self.commit(&format!("{role_name}.json"), role_name, doc, f)
    }

    /// Edits `root`. Unlike the other roles, a committed root edit also archives the pre-edit
    /// document as `root_history/<old-version>.root.json` (so clients can always walk the chain
    /// of trust back from any version) and checks that the edit didn't drop an existing root
    /// signer's key outright — a rotation may add new keys and change the threshold, but an old
    /// root key slot must still resolve to a key object even if it's no longer listed as a
    /// current signer.
    pub fn root<F>(&self, f: F) -> Result<bool>
    where
        F: FnOnce(&mut Root) -> Result<bool>,
    {
        let original = self.repo.root()?;
        let mut doc = original.clone();
        let changed = f(&mut doc.signed)?;
        if !changed {
            return Ok(false);
        }

        validate_root_key_slots_preserved(&original.signed, &doc.signed)?;

        doc.signed.bump(self.clock);
        doc.clear_signatures();

        self.repo.write_role(
            &format!("root_history/{}.root.json", original.signed.version),
            &original,
        )?;
        self.repo.write_role("root.json", &doc)?;
        self.repo.invalidate();
        Ok(true)
    }
}

fn validate_root_key_slots_preserved(old: &Root, new: &Root) -> Result<()> {
    let Some(old_root_keys) = old.roles.get(&RoleType::Root) else {
        return Ok(());
    };
    for keyid in &old_root_keys.keyids {
        if !new.keys.contains_key(keyid) {
            return error::InvariantViolationSnafu {
                invariant: "root-key-rotation",
                message: format!("root key {keyid} was removed instead of rotated out"),
            }
            .fail();
        }
    }
    Ok(())
}
