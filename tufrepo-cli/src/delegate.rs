//! `delegate`: manage a targets role's delegated roles and their key sets. Every subcommand here
//! validates against the current on-disk state before entering the edit transaction, since the
//! engine's own error variants aren't constructible from outside its crate — once inside the
//! closure there's no way left to reject a bad request, only to say `Ok(true)`.

use crate::error::{self, Result};
use clap::{Args, Subcommand};
use std::num::NonZeroU64;
use std::path::PathBuf;
use tufrepo::clock::SystemClock;
use tufrepo::edit::Edit;
use tufrepo::schema::decoded::{Decoded, Hex};
use tufrepo::schema::key::Key;
use tufrepo::reconciler::{build_paths, MAX_DEPTH};
use tufrepo::schema::DelegatedRole;
use tufrepo::Repository;

#[derive(Debug, Args)]
pub(crate) struct DelegateArgs {
    /// Directory containing the repository's signed metadata
    #[arg(long)]
    metadata_dir: PathBuf,

    /// The targets role whose delegations are being changed
    #[arg(long, default_value = "targets")]
    parent_role: String,

    #[command(subcommand)]
    action: Action,
}

#[derive(Debug, Subcommand)]
enum Action {
    /// Add a new delegated role
    AddRole {
        name: String,
        #[arg(long)]
        threshold: NonZeroU64,
        #[arg(long = "path")]
        paths: Vec<String>,
        #[arg(long)]
        terminating: bool,
    },
    /// Remove a delegated role
    RemoveRole { name: String },
    /// Add a key to a delegated role's key set
    AddKey {
        role: String,
        #[arg(long)]
        keytype: String,
        #[arg(long)]
        scheme: String,
        #[arg(long)]
        public: String,
    },
    /// Remove a key from a delegated role's key set
    RemoveKey { role: String, keyid: String },
}

impl DelegateArgs {
    pub(crate) fn run(&self) -> Result<()> {
        let repo = Repository::open(&self.metadata_dir);
        let clock = SystemClock;
        let edit = Edit::new(&repo, &clock);

        match &self.action {
            Action::AddRole {
                name,
                threshold,
                paths,
                terminating,
            } => {
                let parent = repo.targets(&self.parent_role)?;
                let exists = parent
                    .signed
                    .delegations
                    .as_ref()
                    .is_some_and(|d| d.role(name).is_some());
                if exists {
                    return Err(error::Error::DelegationExists { name: name.clone() });
                }

                // Without an explicit `--path`, claim everything under the role's own directory
                // up to the usual nesting depth rather than leaving it with no paths at all.
                let paths = if paths.is_empty() {
                    build_paths(name, MAX_DEPTH)
                } else {
                    paths.clone()
                };
                let role = DelegatedRole {
                    name: name.clone(),
                    keyids: Vec::new(),
                    threshold: *threshold,
                    terminating: *terminating,
                    paths,
                };
                edit.targets(&self.parent_role, |targets| {
                    let delegations = targets.delegations.get_or_insert_with(Default::default);
                    delegations.roles.push(role.clone());
                    Ok(true)
                })?;
            }

            Action::RemoveRole { name } => {
                let parent = repo.targets(&self.parent_role)?;
                let exists = parent
                    .signed
                    .delegations
                    .as_ref()
                    .is_some_and(|d| d.role(name).is_some());
                if !exists {
                    return Err(error::Error::DelegationMissing { name: name.clone() });
                }

                let name = name.clone();
                edit.targets(&self.parent_role, |targets| {
                    if let Some(delegations) = &mut targets.delegations {
                        delegations.roles.retain(|r| r.name != name);
                    }
                    Ok(true)
                })?;
            }

            Action::AddKey {
                role,
                keytype,
                scheme,
                public,
            } => {
                let parent = repo.targets(&self.parent_role)?;
                let exists = parent
                    .signed
                    .delegations
                    .as_ref()
                    .is_some_and(|d| d.role(role).is_some());
                if !exists {
                    return Err(error::Error::DelegationMissing { name: role.clone() });
                }

                let key = Key::new(keytype.clone(), scheme.clone(), public.clone());
                let keyid = key.key_id()?;
                let role_name = role.clone();
                edit.targets(&self.parent_role, |targets| {
                    let delegations = targets.delegations.get_or_insert_with(Default::default);
                    delegations.keys.insert(keyid.clone(), key.clone());
                    if let Some(delegated) = delegations.role_mut(&role_name) {
                        if !delegated.keyids.contains(&keyid) {
                            delegated.keyids.push(keyid.clone());
                        }
                    }
                    Ok(true)
                })?;
            }

            Action::RemoveKey { role, keyid } => {
                let bytes = hex::decode(keyid).map_err(|_| error::Error::InvalidKeyId {
                    keyid: keyid.clone(),
                })?;
                let keyid: Decoded<Hex> = bytes.into();

                let parent = repo.targets(&self.parent_role)?;
                let delegated_has_key = parent
                    .signed
                    .delegations
                    .as_ref()
                    .and_then(|d| d.role(role))
                    .is_some_and(|r| r.keyids.contains(&keyid));
                if !delegated_has_key {
                    return Err(error::Error::DelegationMissing { name: role.clone() });
                }

                let role_name = role.clone();
                edit.targets(&self.parent_role, |targets| {
                    if let Some(delegations) = &mut targets.delegations {
                        if let Some(delegated) = delegations.role_mut(&role_name) {
                            delegated.keyids.retain(|k| k != &keyid);
                        }
                    }
                    Ok(true)
                })?;
            }
        }
        Ok(())
    }
}
