//! The signing-status engine: for every role, who has signed, who's still needed, and — for a
//! targets role — which target files changed since the last known-good state. This is the piece
//! a publisher calls to decide whether a signing event is ready to close.

use crate::error::Result;
use crate::reconciler::{self, TargetChange};
use crate::repository::Repository;
use crate::schema::{Key, LifecyclePeriods, Role, RoleKeys, RoleType};
use crate::sign;
use crate::signing_event_state::SigningEventState;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

pub use crate::schema::decoded::{Decoded, Hex};

/// The status of a single role within the signing event.
#[derive(Debug, Clone)]
pub struct RoleStatus {
    pub role: String,
    pub version: u64,
    pub threshold: u64,
    /// Signer identity (keyowner name if known, else hex keyid) for every signature that
    /// verified against a key this role actually trusts.
    pub signed: Vec<String>,
    /// Signer identity for every trusted key that hasn't signed yet.
    pub missing: Vec<String>,
    /// Invited signers (from `.signing-event-state`) who are in `missing`.
    pub invited_and_missing: Vec<String>,
    pub valid: bool,
    pub target_changes: HashMap<String, TargetChange>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SigningStatus {
    pub roles: HashMap<String, RoleStatus>,
}

impl SigningStatus {
    pub fn all_valid(&self) -> bool {
        self.roles.values().all(|r| r.valid)
    }
}

fn identify(keyid: &Decoded<Hex>, keys: &HashMap<Decoded<Hex>, Key>) -> String {
    match keys.get(keyid) {
        Some(key) if key.owner().keyowner.is_some() => key.owner().keyowner.unwrap(),
        _ => keyid.to_string(),
    }
}

fn status_for_role(
    role_name: &str,
    role_keys: &RoleKeys,
    keys: &HashMap<Decoded<Hex>, Key>,
    signatures: &[crate::schema::Signature],
    canonical_form: &[u8],
    event_state: &SigningEventState,
    target_changes: HashMap<String, TargetChange>,
    version: u64,
) -> RoleStatus {
    let mut signed_ids = Vec::new();
    let mut error = None;

    for keyid in &role_keys.keyids {
        let Some(key) = keys.get(keyid) else {
            continue;
        };
        let has_valid_signature = signatures.iter().filter(|s| &s.keyid == keyid).any(|s| {
            match sign::verify(key, canonical_form, s.sig.as_ref()) {
                Ok(ok) => ok,
                Err(e) => {
                    error = Some(e.to_string());
                    false
                }
            }
        });
        if has_valid_signature {
            signed_ids.push(keyid.clone());
        }
    }

    let missing_ids: Vec<Decoded<Hex>> = role_keys
        .keyids
        .iter()
        .filter(|id| !signed_ids.contains(id))
        .cloned()
        .collect();

    let signed = signed_ids.iter().map(|id| identify(id, keys)).collect();
    let missing: Vec<String> = missing_ids.iter().map(|id| identify(id, keys)).collect();

    let invited = event_state.invited_signers_for_role(role_name);
    let invited_and_missing = missing.iter().filter(|m| invited.contains(m)).cloned().collect();

    RoleStatus {
        role: role_name.to_string(),
        version,
        threshold: role_keys.threshold.get(),
        signed,
        missing,
        invited_and_missing,
        valid: signed_ids.len() as u64 >= role_keys.threshold.get(),
        target_changes,
        error,
    }
}

/// Everything [`validate_role`] needs to decide a role's final `valid` bit, gathered up front so
/// the function itself reads as a flat list of checks rather than a chain of early returns mixed
/// with data lookups.
struct RoleValidityInputs {
    invited_and_missing_empty: bool,
    threshold_met: bool,
    version: u64,
    known_good_version: Option<u64>,
    expires: DateTime<Utc>,
    now: DateTime<Utc>,
    expiry_period: chrono::Duration,
    extra_invariants_ok: bool,
}

/// The validity checks common to every role: nobody still invited and missing, threshold met,
/// version advanced by exactly one from the known-good baseline (when there is one), not expiring
/// within its own expiry window, and whatever role-specific invariant the caller folded into
/// `extra_invariants_ok` (root's consistent-snapshot/timestamp-snapshot agreement, an online
/// role's signing-period sanity, or simply `true` for targets roles, whose shape is guaranteed by
/// the reconciler at write time).
fn validate_role(inputs: RoleValidityInputs) -> bool {
    if !inputs.invited_and_missing_empty || !inputs.threshold_met {
        return false;
    }
    let version_ok = match inputs.known_good_version {
        None => true,
        Some(known_good) if inputs.version == known_good => true,
        Some(known_good) => inputs.version == known_good + 1,
    };
    if !version_ok {
        return false;
    }
    if inputs.expires > inputs.now + inputs.expiry_period {
        return false;
    }
    inputs.extra_invariants_ok
}

fn keyid_sets_equal(a: &[Decoded<Hex>], b: &[Decoded<Hex>]) -> bool {
    let a: HashSet<&Decoded<Hex>> = a.iter().collect();
    let b: HashSet<&Decoded<Hex>> = b.iter().collect();
    a == b
}

/// Whether an online role's (`snapshot`/`timestamp`) own signing/expiry periods make sense: at
/// least a day to sign, and an expiry period long enough to contain that signing window.
fn online_role_periods_ok(lifecycle: LifecyclePeriods) -> bool {
    let signing = lifecycle.signing_period();
    signing >= chrono::Duration::days(1) && lifecycle.expiry_period() > signing
}

/// Computes the status of every role in `proposed`, diffing target files against `known_good`
/// when one is available (a brand-new signing event with no prior accepted state has none, and
/// every target is reported `Added`).
///
/// Returns a pair: the proposed view's status, and, only when `known_good` is present, a second
/// status containing a single `"root"` entry that checks the *known-good* root's own signer set
/// against the *proposed* root's signatures. Root rotation requires both the old and the new
/// signer quorum to be satisfied (`proposed.valid && known_good.valid`), so a caller closing out
/// a root rotation should AND the two `"root"` entries together rather than looking at either one
/// alone.
pub fn compute(
    proposed: &Repository,
    known_good: Option<&Repository>,
    event_state: &SigningEventState,
    now: DateTime<Utc>,
) -> Result<(SigningStatus, Option<SigningStatus>)> {
    let root = proposed.root()?;
    let mut roles = HashMap::new();

    let root_form = root.signed.canonical_form()?;
    let root_keys = root.signed.role_keys(RoleType::Root)?;
    let timestamp_keys_in_root = root.signed.role_keys(RoleType::Timestamp)?;
    let snapshot_keys_in_root = root.signed.role_keys(RoleType::Snapshot)?;
    let root_extra_ok = root.signed.consistent_snapshot
        && timestamp_keys_in_root.threshold == snapshot_keys_in_root.threshold
        && keyid_sets_equal(&timestamp_keys_in_root.keyids, &snapshot_keys_in_root.keyids);

    let mut root_status = status_for_role(
        "root",
        root_keys,
        &root.signed.keys,
        &root.signatures,
        &root_form,
        event_state,
        HashMap::new(),
        root.signed.version.get(),
    );
    let root_known_good_version = known_good.map(|kg| kg.version_of("root")).transpose()?;
    root_status.valid = validate_role(RoleValidityInputs {
        invited_and_missing_empty: root_status.invited_and_missing.is_empty(),
        threshold_met: root_status.signed.len() as u64 >= root_status.threshold,
        version: root_status.version,
        known_good_version: root_known_good_version,
        expires: root.signed.expires,
        now,
        expiry_period: root.signed.lifecycle().expiry_period(),
        extra_invariants_ok: root_extra_ok,
    });

    let known_good_status = match known_good {
        Some(kg) => {
            let kg_root = kg.known_good_root()?;
            let old_root_keys = kg_root.role_keys(RoleType::Root)?;
            let mut old_status = status_for_role(
                "root",
                old_root_keys,
                &kg_root.keys,
                &root.signatures,
                &root_form,
                event_state,
                HashMap::new(),
                root.signed.version.get(),
            );
            old_status.valid = old_status.signed.len() as u64 >= old_status.threshold;
            root_status.valid = root_status.valid && old_status.valid;

            let mut kg_roles = HashMap::new();
            kg_roles.insert("root".to_string(), old_status);
            Some(SigningStatus { roles: kg_roles })
        }
        None => None,
    };

    roles.insert("root".to_string(), root_status);

    let timestamp = proposed.timestamp()?;
    let timestamp_form = timestamp.signed.canonical_form()?;
    let timestamp_keys = root.signed.role_keys(RoleType::Timestamp)?;
    let mut timestamp_status = status_for_role(
        "timestamp",
        timestamp_keys,
        &root.signed.keys,
        &timestamp.signatures,
        &timestamp_form,
        event_state,
        HashMap::new(),
        timestamp.signed.version.get(),
    );
    let timestamp_known_good_version = known_good.map(|kg| kg.version_of("timestamp")).transpose()?;
    timestamp_status.valid = validate_role(RoleValidityInputs {
        invited_and_missing_empty: timestamp_status.invited_and_missing.is_empty(),
        threshold_met: timestamp_status.signed.len() as u64 >= timestamp_status.threshold,
        version: timestamp_status.version,
        known_good_version: timestamp_known_good_version,
        expires: timestamp.signed.expires,
        now,
        expiry_period: timestamp.signed.lifecycle().expiry_period(),
        extra_invariants_ok: online_role_periods_ok(timestamp.signed.lifecycle()),
    });
    roles.insert("timestamp".to_string(), timestamp_status);

    let snapshot = proposed.snapshot()?;
    let snapshot_form = snapshot.signed.canonical_form()?;
    let snapshot_keys = root.signed.role_keys(RoleType::Snapshot)?;
    let mut snapshot_status = status_for_role(
        "snapshot",
        snapshot_keys,
        &root.signed.keys,
        &snapshot.signatures,
        &snapshot_form,
        event_state,
        HashMap::new(),
        snapshot.signed.version.get(),
    );
    let snapshot_known_good_version = known_good.map(|kg| kg.version_of("snapshot")).transpose()?;
    snapshot_status.valid = validate_role(RoleValidityInputs {
        invited_and_missing_empty: snapshot_status.invited_and_missing.is_empty(),
        threshold_met: snapshot_status.signed.len() as u64 >= snapshot_status.threshold,
        version: snapshot_status.version,
        known_good_version: snapshot_known_good_version,
        expires: snapshot.signed.expires,
        now,
        expiry_period: snapshot.signed.lifecycle().expiry_period(),
        extra_invariants_ok: online_role_periods_ok(snapshot.signed.lifecycle()),
    });
    roles.insert("snapshot".to_string(), snapshot_status);

    let top_targets = proposed.targets("targets")?;
    let top_targets_form = top_targets.signed.canonical_form()?;
    let top_targets_keys = root.signed.role_keys(RoleType::Targets)?;
    let top_changes = target_changes_for("targets", proposed, known_good)?;
    let mut top_targets_status = status_for_role(
        "targets",
        top_targets_keys,
        &root.signed.keys,
        &top_targets.signatures,
        &top_targets_form,
        event_state,
        top_changes,
        top_targets.signed.version.get(),
    );
    let top_targets_known_good_version = known_good.map(|kg| kg.version_of("targets")).transpose()?;
    top_targets_status.valid = validate_role(RoleValidityInputs {
        invited_and_missing_empty: top_targets_status.invited_and_missing.is_empty(),
        threshold_met: top_targets_status.signed.len() as u64 >= top_targets_status.threshold,
        version: top_targets_status.version,
        known_good_version: top_targets_known_good_version,
        expires: top_targets.signed.expires,
        now,
        expiry_period: top_targets.signed.lifecycle().expiry_period(),
        extra_invariants_ok: true,
    });
    roles.insert("targets".to_string(), top_targets_status);

    for name in proposed.delegated_role_names()? {
        let parent_names = parent_role_names_for(proposed, &name)?;
        let Some((parent_keys, parent_all_keys)) = parent_names else {
            continue;
        };
        let doc = proposed.targets(&name)?;
        let doc_form = doc.signed.canonical_form()?;
        let changes = target_changes_for(&name, proposed, known_good)?;
        let mut status = status_for_role(
            &name,
            &parent_keys,
            &parent_all_keys,
            &doc.signatures,
            &doc_form,
            event_state,
            changes,
            doc.signed.version.get(),
        );
        let known_good_version = known_good.map(|kg| kg.version_of(&name)).transpose()?;
        status.valid = validate_role(RoleValidityInputs {
            invited_and_missing_empty: status.invited_and_missing.is_empty(),
            threshold_met: status.signed.len() as u64 >= status.threshold,
            version: status.version,
            known_good_version,
            expires: doc.signed.expires,
            now,
            expiry_period: doc.signed.lifecycle().expiry_period(),
            extra_invariants_ok: true,
        });
        roles.insert(name, status);
    }

    Ok((SigningStatus { roles }, known_good_status))
}

/// Finds the delegated role named `name` among every targets document reachable from the
/// top-level `targets` role, returning its threshold/keyids and its parent's key set.
fn parent_role_names_for(
    repo: &Repository,
    name: &str,
) -> Result<Option<(RoleKeys, HashMap<Decoded<Hex>, Key>)>> {
    let mut queue = vec!["targets".to_string()];
    let mut seen = std::collections::HashSet::new();
    while let Some(parent_name) = queue.pop() {
        if !seen.insert(parent_name.clone()) {
            continue;
        }
        let parent = repo.targets(&parent_name)?;
        if let Some(delegations) = &parent.signed.delegations {
            if let Some(role) = delegations.role(name) {
                return Ok(Some((
                    RoleKeys {
                        keyids: role.keyids.clone(),
                        threshold: role.threshold,
                    },
                    delegations.keys.clone(),
                )));
            }
            for role in &delegations.roles {
                queue.push(role.name.clone());
            }
        }
    }
    Ok(None)
}

fn target_changes_for(
    role_name: &str,
    proposed: &Repository,
    known_good: Option<&Repository>,
) -> Result<HashMap<String, TargetChange>> {
    let proposed_doc = proposed.targets(role_name)?;
    let known_good_map = match known_good {
        Some(kg) => kg.targets(role_name).map(|d| d.signed.targets).unwrap_or_default(),
        None => HashMap::new(),
    };
    Ok(reconciler::diff_targets(&known_good_map, &proposed_doc.signed.targets))
}
