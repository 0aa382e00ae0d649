//! Helpers shared by several subcommands: building the signer registry, signing a role with an
//! interactive retry-or-cancel loop, and finding a delegated role's keyids without needing the
//! signing-status engine's full report.

use crate::error::{self, Result};
use std::collections::HashSet;
use std::io::{self, Write};
use tufrepo::schema::{Role, RoleKeys, RoleType, Signature, Signed};
use tufrepo::sign::Sign;
use tufrepo::Repository;

/// Only `file:` is wired in here, matching what this engine implements itself; an embedding
/// deployment that needs KMS/HSM signers registers its own backend before calling a subcommand
/// with those signer URIs (out of reach of this binary as shipped).
pub(crate) fn signer_registry() -> tufrepo::key_source::SignerRegistry {
    tufrepo::key_source::SignerRegistry::new()
}

/// Signs `doc`'s canonical form with every signer in `signers` whose key is among `role_keys`,
/// appending a signature for each. A signer that fails is offered a retry before being skipped,
/// per the retry-or-cancel prompt the design allows for signer failures.
pub(crate) fn sign_with_retry<T: Role>(
    doc: &mut Signed<T>,
    role_keys: &RoleKeys,
    signers: &[Box<dyn Sign>],
) -> Result<()> {
    let form = doc.signed.canonical_form()?;
    for signer in signers {
        let keyid = signer.tuf_key().key_id()?;
        if !role_keys.keyids.contains(&keyid) {
            continue;
        }
        loop {
            match signer.sign(&form) {
                Ok(sig) => {
                    doc.signatures.push(Signature {
                        keyid: keyid.clone(),
                        sig: sig.into(),
                    });
                    break;
                }
                Err(e) => {
                    eprintln!("signing failed for key {keyid}: {e}");
                    if !prompt_retry()? {
                        break;
                    }
                }
            }
        }
    }
    Ok(())
}

fn prompt_retry() -> Result<bool> {
    print!("retry signing with this key? [Y/n] ");
    io::stdout().flush().map_err(|source| error::Error::OperatorInput { source })?;
    let mut line = String::new();
    io::stdin()
        .read_line(&mut line)
        .map_err(|source| error::Error::OperatorInput { source })?;
    Ok(!line.trim().eq_ignore_ascii_case("n"))
}

/// Finds the keyids/threshold that govern `name`: the top-level keys in root for `"targets"`,
/// or the delegation entry found by walking the delegation tree from `"targets"` for anything
/// else. Returns `None` when no such role is delegated anywhere.
pub(crate) fn role_keys_for(repo: &Repository, name: &str) -> Result<Option<RoleKeys>> {
    if name == "targets" {
        let root = repo.root()?;
        return Ok(Some(root.signed.role_keys(RoleType::Targets)?.clone()));
    }

    let mut queue = vec!["targets".to_string()];
    let mut seen = HashSet::new();
    while let Some(parent_name) = queue.pop() {
        if !seen.insert(parent_name.clone()) {
            continue;
        }
        let parent = repo.targets(&parent_name)?;
        let Some(delegations) = &parent.signed.delegations else {
            continue;
        };
        if let Some(role) = delegations.role(name) {
            return Ok(Some(RoleKeys {
                keyids: role.keyids.clone(),
                threshold: role.threshold,
            }));
        }
        for role in &delegations.roles {
            queue.push(role.name.clone());
        }
    }
    Ok(None)
}
