//! Fixture metadata directories shared by the CLI integration tests. None of these are signed —
//! every subcommand exercised here either doesn't check signatures (`delegate`, `update-targets`,
//! `build`) or reports their absence as ordinary status output (`status`, `import`) rather than
//! erroring, so a real signing key is never needed to drive the binary end to end.

use chrono::{DateTime, Utc};
use std::num::NonZeroU64;
use std::path::Path;
use tufrepo::schema::decoded::{Decoded, Hex};
use tufrepo::schema::key::Key;
use tufrepo::schema::{LifecyclePeriods, RoleKeys, RoleType, Root, Signed, Snapshot, SnapshotMeta, Targets, Timestamp};

fn utc(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

fn write_role<T: serde::Serialize>(dir: &Path, file_name: &str, doc: &Signed<T>) {
    let bytes = serde_json::to_vec_pretty(doc).unwrap();
    std::fs::write(dir.join(file_name), bytes).unwrap();
}

/// A single ed25519-shaped (but not cryptographically real) key, just public material stable
/// enough to compute a keyid that `deserialize_keys` will accept.
pub fn placeholder_key() -> (Key, Decoded<Hex>) {
    let key = Key::new("ed25519", "ed25519", "a".repeat(64));
    let keyid = key.key_id().unwrap();
    (key, keyid)
}

/// Writes a complete, unsigned, four-role repository: one key covers every top-level role,
/// `targets` carries no delegations yet.
pub fn write_full_fixture(dir: &Path) -> Decoded<Hex> {
    let (key, keyid) = placeholder_key();

    let mut root = Root::new(utc("2030-01-01T00:00:00Z"));
    root.keys.insert(keyid.clone(), key);
    for role in [RoleType::Root, RoleType::Snapshot, RoleType::Timestamp, RoleType::Targets] {
        root.roles.insert(
            role,
            RoleKeys {
                keyids: vec![keyid.clone()],
                threshold: NonZeroU64::new(1).unwrap(),
            },
        );
    }
    write_role(dir, "root.json", &Signed::new(root));

    let targets = Targets::new(utc("2030-01-01T00:00:00Z"));
    write_role(dir, "targets.json", &Signed::new(targets));

    let mut snapshot = Snapshot::new(utc("2030-01-01T00:00:00Z"));
    snapshot
        .meta
        .insert("targets.json".to_string(), SnapshotMeta::for_version(NonZeroU64::new(1).unwrap()));
    write_role(dir, "snapshot.json", &Signed::new(snapshot));

    let mut timestamp = Timestamp::new(utc("2030-01-01T00:00:00Z"));
    timestamp
        .meta
        .insert("snapshot.json".to_string(), SnapshotMeta::for_version(NonZeroU64::new(1).unwrap()));
    write_role(dir, "timestamp.json", &Signed::new(timestamp));

    keyid
}

/// Writes a fixture with root/targets lifecycle periods already set, and the given key already
/// claimed by an owner — the "already imported" shape `import` should leave untouched.
pub fn write_fixture_with_lifecycle_and_owner(dir: &Path) -> Decoded<Hex> {
    let (mut key, _) = placeholder_key();
    key.set_owner(&tufrepo::schema::key::KeyOwnership::offline("@alice"));
    let keyid = key.key_id().unwrap();

    let mut root = Root::new(utc("2030-01-01T00:00:00Z"));
    root.set_lifecycle(&LifecyclePeriods {
        expiry_period_days: Some(30),
        signing_period_days: Some(7),
    });
    root.keys.insert(keyid.clone(), key);
    for role in [RoleType::Root, RoleType::Snapshot, RoleType::Timestamp, RoleType::Targets] {
        root.roles.insert(
            role,
            RoleKeys {
                keyids: vec![keyid.clone()],
                threshold: NonZeroU64::new(1).unwrap(),
            },
        );
    }
    write_role(dir, "root.json", &Signed::new(root));

    let mut targets = Targets::new(utc("2030-01-01T00:00:00Z"));
    targets.set_lifecycle(&LifecyclePeriods {
        expiry_period_days: Some(7),
        signing_period_days: Some(2),
    });
    write_role(dir, "targets.json", &Signed::new(targets));

    let mut snapshot = Snapshot::new(utc("2030-01-01T00:00:00Z"));
    snapshot
        .meta
        .insert("targets.json".to_string(), SnapshotMeta::for_version(NonZeroU64::new(1).unwrap()));
    write_role(dir, "snapshot.json", &Signed::new(snapshot));

    let mut timestamp = Timestamp::new(utc("2030-01-01T00:00:00Z"));
    timestamp
        .meta
        .insert("snapshot.json".to_string(), SnapshotMeta::for_version(NonZeroU64::new(1).unwrap()));
    write_role(dir, "timestamp.json", &Signed::new(timestamp));

    keyid
}

/// Writes just a bare `targets.json` with no delegations, enough to drive `delegate` subcommands
/// which never touch root/snapshot/timestamp.
pub fn write_targets_only_fixture(dir: &Path) {
    let targets = Targets::new(utc("2030-01-01T00:00:00Z"));
    write_role(dir, "targets.json", &Signed::new(targets));
}
