//! `sign`: add this operator's signatures to every offline-signed role that still needs them.
//! Snapshot and timestamp are online-signed (see `online-sign`) and are skipped here.

use crate::common;
use crate::error::Result;
use clap::Args;
use std::path::PathBuf;
use tufrepo::clock::{Clock, SystemClock};
use tufrepo::schema::RoleType;
use tufrepo::signing_event_state::SigningEventState;
use tufrepo::{signing_status, Repository};

#[derive(Debug, Args)]
pub(crate) struct SignArgs {
    /// Directory containing the repository's signed metadata
    #[arg(long)]
    metadata_dir: PathBuf,

    /// Signer URIs for the keys this operator holds
    #[arg(long = "signer", required = true)]
    signers: Vec<String>,
}

impl SignArgs {
    pub(crate) fn run(&self) -> Result<()> {
        let repo = Repository::open(&self.metadata_dir);
        let registry = common::signer_registry();
        let signers = self
            .signers
            .iter()
            .map(|uri| registry.load(uri))
            .collect::<tufrepo::Result<Vec<_>>>()?;

        let event_state = SigningEventState::load(&self.metadata_dir)?;
        let clock = SystemClock;
        let (status, _) = signing_status::compute(&repo, None, &event_state, clock.now())?;

        for (name, role) in &status.roles {
            if name == "snapshot" || name == "timestamp" {
                continue;
            }
            if role.valid {
                log::info!("{name} already signed to threshold");
                continue;
            }

            if name == "root" {
                let root = repo.root()?;
                let role_keys = root.signed.role_keys(RoleType::Root)?.clone();
                let mut doc = root;
                common::sign_with_retry(&mut doc, &role_keys, &signers)?;
                repo.write_role("root.json", &doc)?;
            } else {
                let Some(role_keys) = common::role_keys_for(&repo, name)? else {
                    continue;
                };
                let mut doc = repo.targets(name)?;
                common::sign_with_retry(&mut doc, &role_keys, &signers)?;
                repo.write_role(&format!("{name}.json"), &doc)?;
            }
            repo.invalidate();
            log::info!("added signature(s) to {name}");
        }
        Ok(())
    }
}
