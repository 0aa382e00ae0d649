//! `create-signing-events`: decide which offline-signed roles (root, top-level targets, and
//! every delegation) need a new signing event this cycle, bump their versions, and report the
//! role/branch-name pairs a version-control driver should act on. Creating and pushing the
//! branch itself is that driver's job, not this engine's.

use crate::error::Result;
use crate::settings::RepoSettings;
use clap::Args;
use std::path::PathBuf;
use tufrepo::clock::{Clock, SystemClock};
use tufrepo::edit::Edit;
use tufrepo::schema::Role;
use tufrepo::signing_event_state::SigningEventState;
use tufrepo::{signing_status, Repository};

#[derive(Debug, Args)]
pub(crate) struct CreateSigningEventsArgs {
    /// Directory containing the repository's signed metadata
    #[arg(long)]
    metadata_dir: PathBuf,

    /// TOML file carrying this repository's push-remote/pull-remote settings
    #[arg(long = "settings-file", default_value = ".tufrepo.toml")]
    settings_file: PathBuf,
}

impl CreateSigningEventsArgs {
    pub(crate) fn run(&self) -> Result<()> {
        let settings = RepoSettings::load(&self.settings_file)?;
        let repo = Repository::open(&self.metadata_dir);
        let clock = SystemClock;
        let edit = Edit::new(&repo, &clock);
        let event_state = SigningEventState::load(&self.metadata_dir)?;
        let (status, _) = signing_status::compute(&repo, None, &event_state, clock.now())?;
        let roles_with_invites = event_state.roles_with_delegation_invites();

        let mut role_names = vec!["root".to_string(), "targets".to_string()];
        role_names.extend(repo.delegated_role_names()?);

        for name in &role_names {
            let valid = status.roles.get(name).is_some_and(|r| r.valid);
            let due = if name == "root" {
                due_for_signing(&repo.root()?.signed, &clock)
            } else {
                due_for_signing(&repo.targets(name)?.signed, &clock)
            };
            let has_pending_invite = roles_with_invites.contains(&name.as_str());
            if valid && !due && !has_pending_invite {
                continue;
            }

            let next_version = if name == "root" {
                let mut version = 0;
                edit.root(|role| {
                    version = role.version.get() + 1;
                    Ok(true)
                })?;
                version
            } else {
                let mut version = 0;
                edit.targets(name, |role| {
                    version = role.version.get() + 1;
                    Ok(true)
                })?;
                version
            };

            let branch = format!("sign/{name}-v{next_version}");
            match (&settings.push_remote, &settings.pull_remote) {
                (Some(push), Some(pull)) => {
                    println!("{name}\t{branch}\tpush={push}\tpull={pull}");
                }
                _ => println!("{name}\t{branch}"),
            }
        }
        Ok(())
    }
}

fn due_for_signing<T: Role>(doc: &T, clock: &dyn Clock) -> bool {
    clock.now() >= doc.expires() - doc.lifecycle().signing_period()
}
