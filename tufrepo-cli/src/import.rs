//! `import`: backfill the custom lifecycle and key-ownership annotations a freshly-imported
//! repository (one that didn't originate from this engine) is missing. Values come from an
//! optional JSON file; whatever isn't covered there is reported back so an operator can supply it
//! by hand.

use crate::error::{self, Result};
use clap::Args;
use serde::Deserialize;
use snafu::ResultExt;
use std::collections::HashMap;
use std::path::PathBuf;
use tufrepo::clock::SystemClock;
use tufrepo::edit::Edit;
use tufrepo::schema::key::KeyOwnership;
use tufrepo::schema::{LifecyclePeriods, Role};
use tufrepo::Repository;

#[derive(Debug, Args)]
pub(crate) struct ImportArgs {
    /// Directory containing the repository's signed metadata
    #[arg(long)]
    metadata_dir: PathBuf,

    /// JSON file supplying lifecycle periods and key owners for roles/keys that don't have them
    #[arg(long = "import-file")]
    import_file: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct ImportData {
    #[serde(default)]
    expiry_period_days: HashMap<String, u32>,
    #[serde(default)]
    signing_period_days: HashMap<String, u32>,
    #[serde(default)]
    key_owners: HashMap<String, String>,
}

impl ImportArgs {
    pub(crate) fn run(&self) -> Result<()> {
        let data = match &self.import_file {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .context(error::ImportReadSnafu { path: path.clone() })?;
                serde_json::from_str(&text).context(error::ImportParseSnafu { path: path.clone() })?
            }
            None => ImportData::default(),
        };

        let repo = Repository::open(&self.metadata_dir);
        let clock = SystemClock;
        let edit = Edit::new(&repo, &clock);

        backfill_root_lifecycle(&edit, &data)?;

        let mut role_names = vec!["targets".to_string()];
        role_names.extend(repo.delegated_role_names()?);
        for name in &role_names {
            backfill_targets_lifecycle(&edit, name, &data)?;
        }

        backfill_root_key_owners(&edit, &data)?;
        for name in &role_names {
            backfill_delegation_key_owners(&edit, name, &data)?;
        }

        let mut still_needed_lifecycle = Vec::new();
        let root = repo.root()?;
        if incomplete(&root.signed.lifecycle()) {
            still_needed_lifecycle.push("root".to_string());
        }
        let mut still_needed_owner: Vec<String> = root
            .signed
            .keys
            .keys()
            .filter(|id| !root.signed.keys[*id].owner().is_claimed())
            .map(|id| id.to_string())
            .collect();

        for name in &role_names {
            let doc = repo.targets(name)?;
            if incomplete(&doc.signed.lifecycle()) {
                still_needed_lifecycle.push(name.clone());
            }
            if let Some(delegations) = &doc.signed.delegations {
                for (keyid, key) in &delegations.keys {
                    if !key.owner().is_claimed() {
                        still_needed_owner.push(keyid.to_string());
                    }
                }
            }
        }
        still_needed_owner.sort();
        still_needed_owner.dedup();

        let report = serde_json::json!({
            "lifecycle_periods_needed": still_needed_lifecycle,
            "key_owners_needed": still_needed_owner,
        });
        println!("{}", serde_json::to_string_pretty(&report).unwrap_or_default());
        Ok(())
    }
}

fn incomplete(lifecycle: &LifecyclePeriods) -> bool {
    lifecycle.expiry_period_days.is_none() || lifecycle.signing_period_days.is_none()
}

fn imported_lifecycle(role_name: &str, data: &ImportData) -> LifecyclePeriods {
    LifecyclePeriods {
        expiry_period_days: data.expiry_period_days.get(role_name).copied(),
        signing_period_days: data.signing_period_days.get(role_name).copied(),
    }
}

fn backfill_root_lifecycle(edit: &Edit<'_>, data: &ImportData) -> Result<()> {
    let imported = imported_lifecycle("root", data);
    edit.root(|root| {
        let current = root.lifecycle();
        if !incomplete(&current) {
            return Ok(false);
        }
        root.set_lifecycle(&LifecyclePeriods {
            expiry_period_days: current.expiry_period_days.or(imported.expiry_period_days),
            signing_period_days: current.signing_period_days.or(imported.signing_period_days),
        });
        Ok(true)
    })?;
    Ok(())
}

fn backfill_targets_lifecycle(edit: &Edit<'_>, name: &str, data: &ImportData) -> Result<()> {
    let imported = imported_lifecycle(name, data);
    edit.targets(name, |targets| {
        let current = targets.lifecycle();
        if !incomplete(&current) {
            return Ok(false);
        }
        targets.set_lifecycle(&LifecyclePeriods {
            expiry_period_days: current.expiry_period_days.or(imported.expiry_period_days),
            signing_period_days: current.signing_period_days.or(imported.signing_period_days),
        });
        Ok(true)
    })?;
    Ok(())
}

fn backfill_root_key_owners(edit: &Edit<'_>, data: &ImportData) -> Result<()> {
    edit.root(|root| {
        let mut changed = false;
        for (keyid, key) in root.keys.iter_mut() {
            if key.owner().is_claimed() {
                continue;
            }
            if let Some(owner) = data.key_owners.get(&keyid.to_string()) {
                key.set_owner(&KeyOwnership::offline(owner.clone()));
                changed = true;
            }
        }
        Ok(changed)
    })?;
    Ok(())
}

fn backfill_delegation_key_owners(edit: &Edit<'_>, name: &str, data: &ImportData) -> Result<()> {
    edit.targets(name, |targets| {
        let Some(delegations) = &mut targets.delegations else {
            return Ok(false);
        };
        let mut changed = false;
        for (keyid, key) in delegations.keys.iter_mut() {
            if key.owner().is_claimed() {
                continue;
            }
            if let Some(owner) = data.key_owners.get(&keyid.to_string()) {
                key.set_owner(&KeyOwnership::offline(owner.clone()));
                changed = true;
            }
        }
        Ok(changed)
    })?;
    Ok(())
}
