//! `build`: publish the current metadata (and, for consistent-snapshot repositories, the
//! hash-prefixed artifact copies) into a client-servable layout.

use crate::error::Result;
use clap::Args;
use std::path::PathBuf;
use tufrepo::{publisher, Repository};

#[derive(Debug, Args)]
pub(crate) struct BuildArgs {
    /// Directory containing the repository's signed metadata
    #[arg(long)]
    metadata_dir: PathBuf,

    /// Directory to publish the client-servable repository layout into
    #[arg(long)]
    publish_dir: PathBuf,
}

impl BuildArgs {
    pub(crate) fn run(&self) -> Result<()> {
        let repo = Repository::open(&self.metadata_dir);
        let report = publisher::publish(&repo, &self.publish_dir)?;
        for role in &report.roles {
            log::info!("published {} version {}", role.role, role.version);
        }
        Ok(())
    }
}
