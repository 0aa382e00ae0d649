//! `update-targets`: reconcile an artifact tree against every targets role's delegations and
//! commit whichever roles' target maps actually changed. Signing the result is a separate step
//! (`sign`), so this subcommand never touches signatures.

use crate::error::Result;
use clap::Args;
use std::path::PathBuf;
use tufrepo::clock::SystemClock;
use tufrepo::edit::Edit;
use tufrepo::{reconciler, Repository};

#[derive(Debug, Args)]
pub(crate) struct UpdateTargetsArgs {
    /// Directory containing the repository's signed metadata
    #[arg(long)]
    metadata_dir: PathBuf,

    /// Directory of artifacts to reconcile against targets delegations
    #[arg(long)]
    artifact_dir: PathBuf,
}

impl UpdateTargetsArgs {
    pub(crate) fn run(&self) -> Result<()> {
        let repo = Repository::open(&self.metadata_dir);
        let routed = reconciler::reconcile(&repo, &self.artifact_dir)?;
        let by_role = reconciler::group_by_role(routed);

        let clock = SystemClock;
        let edit = Edit::new(&repo, &clock);

        let mut role_names = vec!["targets".to_string()];
        role_names.extend(repo.delegated_role_names()?);

        for name in role_names {
            let reconciled = by_role.get(&name).cloned().unwrap_or_default();
            let changed = edit.targets(&name, |targets| {
                let changed = targets.targets != reconciled;
                if changed {
                    targets.targets = reconciled.clone();
                }
                Ok(changed)
            })?;
            if changed {
                log::info!("updated targets for {name}");
            } else {
                log::info!("no target changes for {name}");
            }
        }
        Ok(())
    }
}
