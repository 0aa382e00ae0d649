//! `online-sign`: produce a new snapshot if its content changed, it's in its signing period, or
//! it isn't currently signed to threshold; produce a new timestamp under the same conditions, or
//! whenever a new snapshot was just produced (timestamp always points at the latest snapshot).

use crate::common;
use crate::error::Result;
use clap::Args;
use std::path::PathBuf;
use tufrepo::clock::{Clock, SystemClock};
use tufrepo::edit::Edit;
use tufrepo::schema::{Hashes, Role, RoleType, SnapshotMeta};
use tufrepo::signing_event_state::SigningEventState;
use tufrepo::{signing_status, Repository};

#[derive(Debug, Args)]
pub(crate) struct OnlineSignArgs {
    /// Directory containing the repository's signed metadata
    #[arg(long)]
    metadata_dir: PathBuf,

    /// Signer URIs for the online keys used to sign snapshot and timestamp
    #[arg(long = "signer", required = true)]
    signers: Vec<String>,
}

impl OnlineSignArgs {
    pub(crate) fn run(&self) -> Result<()> {
        let repo = Repository::open(&self.metadata_dir);
        let registry = common::signer_registry();
        let signers = self
            .signers
            .iter()
            .map(|uri| registry.load(uri))
            .collect::<tufrepo::Result<Vec<_>>>()?;

        let clock = SystemClock;
        let edit = Edit::new(&repo, &clock);
        let event_state = SigningEventState::default();

        let mut role_names = vec!["targets".to_string()];
        role_names.extend(repo.delegated_role_names()?);

        let (status, _) = signing_status::compute(&repo, None, &event_state, clock.now())?;
        let snapshot_verified = status.roles.get("snapshot").is_some_and(|r| r.valid);
        let snapshot_due = in_signing_period(&repo.snapshot()?.signed, &clock);

        let snapshot_changed = edit.snapshot(|snapshot| {
            let mut content_changed = false;
            for name in &role_names {
                let doc = repo.targets(name)?;
                let meta = SnapshotMeta::for_version(doc.signed.version);
                let file_name = format!("{name}.json");
                if snapshot.meta.get(&file_name) != Some(&meta) {
                    snapshot.meta.insert(file_name, meta);
                    content_changed = true;
                }
            }
            Ok(content_changed || !snapshot_verified || snapshot_due)
        })?;

        if snapshot_changed {
            let root = repo.root()?;
            let mut doc = repo.snapshot()?;
            common::sign_with_retry(&mut doc, root.signed.role_keys(RoleType::Snapshot)?, &signers)?;
            repo.write_role("snapshot.json", &doc)?;
            repo.invalidate();
            log::info!("snapshot updated to version {}", doc.signed.version);
        } else {
            log::info!("no snapshot update needed");
        }

        let (status, _) = signing_status::compute(&repo, None, &event_state, clock.now())?;
        let timestamp_verified = status.roles.get("timestamp").is_some_and(|r| r.valid);
        let timestamp_due = in_signing_period(&repo.timestamp()?.signed, &clock);

        let timestamp_changed = edit.timestamp(|timestamp| {
            let snapshot = repo.snapshot()?;
            let form = snapshot.signed.canonical_form()?;
            let meta = SnapshotMeta {
                version: snapshot.signed.version,
                length: Some(form.len() as u64),
                hashes: Some(Hashes::sha256_of(&form)),
            };
            let content_changed = timestamp.meta.get("snapshot.json") != Some(&meta);
            if content_changed {
                timestamp.meta.insert("snapshot.json".to_string(), meta);
            }
            Ok(content_changed || !timestamp_verified || timestamp_due)
        })?;

        if timestamp_changed {
            let root = repo.root()?;
            let mut doc = repo.timestamp()?;
            common::sign_with_retry(&mut doc, root.signed.role_keys(RoleType::Timestamp)?, &signers)?;
            repo.write_role("timestamp.json", &doc)?;
            repo.invalidate();
            log::info!("timestamp updated to version {}", doc.signed.version);
        } else {
            log::info!("no timestamp update needed");
        }

        Ok(())
    }
}

fn in_signing_period<T: Role>(doc: &T, clock: &dyn Clock) -> bool {
    clock.now() >= doc.expires() - doc.lifecycle().signing_period()
}
