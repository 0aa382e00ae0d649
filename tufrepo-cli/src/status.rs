//! `status`: compute and print the structured per-role signing status (signer counts, invites
//! still outstanding, target changes). Rendering this as Markdown is a presentation concern left
//! to whatever calls this subcommand.

use crate::error::Result;
use clap::Args;
use std::path::PathBuf;
use tufrepo::clock::{Clock, SystemClock};
use tufrepo::signing_event_state::SigningEventState;
use tufrepo::{signing_status, Repository};

#[derive(Debug, Args)]
pub(crate) struct StatusArgs {
    /// Directory containing the proposed repository's signed metadata
    #[arg(long)]
    metadata_dir: PathBuf,

    /// Metadata directory of the last known-good state, to diff target changes against
    #[arg(long)]
    known_good_dir: Option<PathBuf>,
}

impl StatusArgs {
    pub(crate) fn run(&self) -> Result<()> {
        let repo = Repository::open(&self.metadata_dir);
        let known_good = self.known_good_dir.as_ref().map(Repository::open);
        let event_state = SigningEventState::load(&self.metadata_dir)?;
        let clock = SystemClock;
        let (status, known_good_status) =
            signing_status::compute(&repo, known_good.as_ref(), &event_state, clock.now())?;

        let mut names: Vec<&String> = status.roles.keys().collect();
        names.sort();
        for name in names {
            let role = &status.roles[name];
            println!(
                "{name}\tversion={}\t{}/{}\tvalid={}",
                role.version,
                role.signed.len(),
                role.threshold,
                role.valid
            );
            for signer in &role.invited_and_missing {
                println!("  invited, not yet signed: {signer}");
            }
            for (path, change) in &role.target_changes {
                println!("  {path}: {change:?}");
            }
            if let Some(err) = &role.error {
                println!("  error: {err}");
            }
        }
        if let Some(old) = &known_good_status {
            let old_root = &old.roles["root"];
            println!(
                "root (known-good signer set)\t{}/{}\tvalid={}",
                old_root.signed.len(),
                old_root.threshold,
                old_root.valid
            );
        }
        Ok(())
    }
}
