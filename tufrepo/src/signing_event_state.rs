//! The `.signing-event-state` document: an optional, purely advisory list of who's been invited
//! to sign which role for the current signing event. Nothing in the repository's trust model
//! depends on it — a role is valid once its threshold of real signatures is met regardless of
//! whether an invite was ever recorded — but the signing-status engine surfaces it so a publisher
//! can show "invited but hasn't signed yet" instead of just "missing a signature".

use crate::error::{self, Result};
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const FILE_NAME: &str = ".signing-event-state";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SigningEventState {
    /// role name -> signer identifiers invited to sign it this event.
    #[serde(default)]
    pub invites: HashMap<String, Vec<String>>,
}

impl SigningEventState {
    pub fn load(metadata_dir: &Path) -> Result<Self> {
        let path = metadata_dir.join(FILE_NAME);
        if !path.exists() {
            return Ok(Self::default());
        }
        let bytes = std::fs::read(&path).context(error::FileReadSnafu { path: path.clone() })?;
        serde_json::from_slice(&bytes).context(error::ParseMetadataFileSnafu { path })
    }

    pub fn save(&self, metadata_dir: &Path) -> Result<()> {
        let path = metadata_dir.join(FILE_NAME);
        if self.invites.is_empty() {
            if path.exists() {
                std::fs::remove_file(&path).context(error::FileRemoveSnafu { path })?;
            }
            return Ok(());
        }
        let bytes = serde_json::to_vec_pretty(self).context(error::CanonicalSerializationSnafu {
            what: FILE_NAME.to_string(),
        })?;
        std::fs::write(&path, bytes).context(error::FileWriteSnafu { path })
    }

    pub fn invited_signers_for_role(&self, role: &str) -> &[String] {
        self.invites.get(role).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn invite(&mut self, role: impl Into<String>, signer: impl Into<String>) {
        let entry = self.invites.entry(role.into()).or_default();
        let signer = signer.into();
        if !entry.contains(&signer) {
            entry.push(signer);
        }
    }

    /// Removes a signer's invite once they've actually signed, dropping the role entry entirely
    /// once it has no invites left so the file doesn't accumulate dead roles.
    pub fn accept(&mut self, role: &str, signer: &str) {
        if let Some(entry) = self.invites.get_mut(role) {
            entry.retain(|s| s != signer);
            if entry.is_empty() {
                self.invites.remove(role);
            }
        }
    }

    /// The set of *delegating* roles implied by pending invites: `root` and `targets` map to
    /// `root` (both are delegated straight from the root of trust), any other invited role name
    /// maps to `targets` (its delegating parent). Used to treat a delegating role as due for a
    /// signing pass regardless of its own signing-period timing, since a pending invite under it
    /// means a delegation is mid-rotation.
    pub fn roles_with_delegation_invites(&self) -> Vec<&str> {
        let mut roles: Vec<&str> = self
            .invites
            .keys()
            .map(|invited| match invited.as_str() {
                "root" | "targets" => "root",
                _ => "targets",
            })
            .collect();
        roles.sort_unstable();
        roles.dedup();
        roles
    }

    pub fn path(metadata_dir: &Path) -> PathBuf {
        metadata_dir.join(FILE_NAME)
    }
}
