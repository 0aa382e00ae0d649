//! End-to-end coverage across the repository, edit, reconciler, signing-status, and publisher
//! modules together — the seams each module's own unit tests don't reach.

use aws_lc_rs::rand::SystemRandom;
use aws_lc_rs::signature::Ed25519KeyPair;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fs;
use std::num::NonZeroU64;
use std::path::Path;
use tufrepo::clock::FixedClock;
use tufrepo::edit::Edit;
use tufrepo::publisher;
use tufrepo::reconciler;
use tufrepo::schema::decoded::{Decoded, Hex};
use tufrepo::schema::key::{Key, KeyOwnership};
use tufrepo::schema::{
    DelegatedRole, Delegations, LifecyclePeriods, Role, RoleKeys, RoleType, Root, Signature,
    Signed, Snapshot, SnapshotMeta, Targets, Timestamp,
};
use tufrepo::sign::{self, Sign};
use tufrepo::signing_event_state::SigningEventState;
use tufrepo::signing_status;
use tufrepo::Repository;

fn utc(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

/// Generates a fresh ed25519 keypair, wraps it as a `Key` owned by `owner`, and returns the
/// signer alongside the key and the keyid it hashes to (computed after the owner is set, since
/// the owner annotation is part of the canonical form the keyid is derived from).
fn generate_signer(owner: &str) -> (Box<dyn Sign>, Key, Decoded<Hex>) {
    let pkcs8 = Ed25519KeyPair::generate_pkcs8(&SystemRandom::new()).unwrap();
    let pem = pem::encode(&pem::Pem::new("PRIVATE KEY".to_owned(), pkcs8.as_ref().to_vec()));
    let signer = sign::parse_keypair(pem.as_bytes()).unwrap();
    let mut key = signer.tuf_key();
    key.set_owner(&KeyOwnership::offline(owner.to_string()));
    let keyid = key.key_id().unwrap();
    (signer, key, keyid)
}

fn sign_doc<T: Role>(doc: &mut Signed<T>, signer: &dyn Sign, keyid: &Decoded<Hex>) {
    let form = doc.signed.canonical_form().unwrap();
    let sig = signer.sign(&form).unwrap();
    doc.signatures.push(Signature {
        keyid: keyid.clone(),
        sig: sig.into(),
    });
}

struct Fixture {
    repo: Repository,
    root_signer: Box<dyn Sign>,
    root_keyid: Decoded<Hex>,
    snapshot_signer: Box<dyn Sign>,
    snapshot_keyid: Decoded<Hex>,
    timestamp_signer: Box<dyn Sign>,
    timestamp_keyid: Decoded<Hex>,
    targets_signer: Box<dyn Sign>,
    targets_keyid: Decoded<Hex>,
    bins_signer: Box<dyn Sign>,
    bins_keyid: Decoded<Hex>,
}

/// Builds a small but complete signing event: root, snapshot, timestamp, a top-level targets role
/// delegating `bin/**` to a "bins" role, all fully signed to their (threshold-1) key sets.
fn build_fixture(metadata_dir: &Path) -> Fixture {
    let (root_signer, root_key, root_keyid) = generate_signer("@root-owner");
    // Timestamp and snapshot share one online key, per the invariant that their delegations must
    // declare identical keyids and threshold.
    let (online_signer, online_key, online_keyid) = generate_signer("@online");
    let snapshot_signer = online_signer.clone();
    let snapshot_keyid = online_keyid.clone();
    let timestamp_signer = online_signer.clone();
    let timestamp_keyid = online_keyid.clone();
    let (targets_signer, targets_key, targets_keyid) = generate_signer("@targets-owner");
    let (bins_signer, bins_key, bins_keyid) = generate_signer("@bins-owner");

    let mut root = Root::new(utc("2020-02-01T00:00:00Z"));
    root.set_lifecycle(&LifecyclePeriods {
        expiry_period_days: Some(30),
        signing_period_days: Some(7),
    });
    root.keys.insert(root_keyid.clone(), root_key);
    root.keys.insert(online_keyid.clone(), online_key);
    root.keys.insert(targets_keyid.clone(), targets_key);
    root.roles.insert(
        RoleType::Root,
        RoleKeys {
            keyids: vec![root_keyid.clone()],
            threshold: NonZeroU64::new(1).unwrap(),
        },
    );
    root.roles.insert(
        RoleType::Snapshot,
        RoleKeys {
            keyids: vec![online_keyid.clone()],
            threshold: NonZeroU64::new(1).unwrap(),
        },
    );
    root.roles.insert(
        RoleType::Timestamp,
        RoleKeys {
            keyids: vec![online_keyid.clone()],
            threshold: NonZeroU64::new(1).unwrap(),
        },
    );
    root.roles.insert(
        RoleType::Targets,
        RoleKeys {
            keyids: vec![targets_keyid.clone()],
            threshold: NonZeroU64::new(1).unwrap(),
        },
    );

    let mut targets = Targets::new(utc("2020-02-01T00:00:00Z"));
    targets.set_lifecycle(&LifecyclePeriods {
        expiry_period_days: Some(7),
        signing_period_days: Some(2),
    });
    let mut delegations = Delegations::new();
    delegations.keys.insert(bins_keyid.clone(), bins_key);
    delegations.roles.push(DelegatedRole {
        name: "bins".to_string(),
        keyids: vec![bins_keyid.clone()],
        threshold: NonZeroU64::new(1).unwrap(),
        terminating: false,
        paths: vec!["bin/**".to_string()],
    });
    targets.delegations = Some(delegations);

    let mut bins = Targets::new(utc("2020-02-01T00:00:00Z"));
    bins.set_lifecycle(&LifecyclePeriods {
        expiry_period_days: Some(7),
        signing_period_days: Some(2),
    });

    let mut snapshot = Snapshot::new(utc("2020-02-01T00:00:00Z"));
    snapshot.set_lifecycle(&LifecyclePeriods {
        expiry_period_days: Some(1),
        signing_period_days: None,
    });
    snapshot
        .meta
        .insert("root.json".to_string(), SnapshotMeta::for_version(root.version));
    snapshot
        .meta
        .insert("targets.json".to_string(), SnapshotMeta::for_version(targets.version));
    snapshot
        .meta
        .insert("bins.json".to_string(), SnapshotMeta::for_version(bins.version));

    let mut timestamp = Timestamp::new(utc("2020-02-01T00:00:00Z"));
    timestamp.set_lifecycle(&LifecyclePeriods {
        expiry_period_days: Some(1),
        signing_period_days: None,
    });
    timestamp
        .meta
        .insert("snapshot.json".to_string(), SnapshotMeta::for_version(snapshot.version));

    let mut root_doc = Signed::new(root);
    sign_doc(&mut root_doc, root_signer.as_ref(), &root_keyid);

    let mut targets_doc = Signed::new(targets);
    sign_doc(&mut targets_doc, targets_signer.as_ref(), &targets_keyid);

    let mut bins_doc = Signed::new(bins);
    sign_doc(&mut bins_doc, bins_signer.as_ref(), &bins_keyid);

    let mut snapshot_doc = Signed::new(snapshot);
    sign_doc(&mut snapshot_doc, snapshot_signer.as_ref(), &snapshot_keyid);

    let mut timestamp_doc = Signed::new(timestamp);
    sign_doc(&mut timestamp_doc, timestamp_signer.as_ref(), &timestamp_keyid);

    let repo = Repository::open(metadata_dir);
    repo.write_role("root.json", &root_doc).unwrap();
    repo.write_role("targets.json", &targets_doc).unwrap();
    repo.write_role("bins.json", &bins_doc).unwrap();
    repo.write_role("snapshot.json", &snapshot_doc).unwrap();
    repo.write_role("timestamp.json", &timestamp_doc).unwrap();

    Fixture {
        repo,
        root_signer,
        root_keyid,
        snapshot_signer,
        snapshot_keyid,
        timestamp_signer,
        timestamp_keyid,
        targets_signer,
        targets_keyid,
        bins_signer,
        bins_keyid,
    }
}

#[test]
fn fully_signed_repository_passes_signing_status() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = build_fixture(dir.path());
    let event_state = SigningEventState::default();

    let (status, _) = signing_status::compute(&fixture.repo, None, &event_state, utc("2020-02-02T00:00:00Z")).unwrap();
    assert!(status.all_valid(), "expected every role to be valid: {status:?}");

    let targets_status = &status.roles["targets"];
    assert!(targets_status.missing.is_empty());
    assert_eq!(targets_status.signed, vec!["@targets-owner".to_string()]);

    let bins_status = &status.roles["bins"];
    assert_eq!(bins_status.signed, vec!["@bins-owner".to_string()]);
}

#[test]
fn editing_targets_requires_resigning_before_status_is_valid() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = build_fixture(dir.path());

    let artifact_dir = dir.path().join("artifacts");
    fs::create_dir_all(artifact_dir.join("bin")).unwrap();
    fs::write(artifact_dir.join("bin/tool"), b"a binary").unwrap();
    fs::write(artifact_dir.join("readme.txt"), b"docs").unwrap();

    let routed = reconciler::reconcile(&fixture.repo, &artifact_dir).unwrap();
    let mut by_role = reconciler::group_by_role(routed);
    assert!(by_role.contains_key("bins"));
    assert!(by_role.contains_key("targets"));

    let clock = FixedClock::new(utc("2020-02-02T00:00:00Z"));
    let edit = Edit::new(&fixture.repo, &clock);

    let targets_new = by_role.remove("targets").unwrap();
    let bins_new = by_role.remove("bins").unwrap();

    let targets_changed = edit
        .targets("targets", |t| {
            if t.targets != targets_new {
                t.targets = targets_new.clone();
                Ok(true)
            } else {
                Ok(false)
            }
        })
        .unwrap();
    assert!(targets_changed);

    let bins_changed = edit
        .targets("bins", |t| {
            if t.targets != bins_new {
                t.targets = bins_new.clone();
                Ok(true)
            } else {
                Ok(false)
            }
        })
        .unwrap();
    assert!(bins_changed);

    assert_eq!(fixture.repo.targets("targets").unwrap().signed.version.get(), 2);
    assert!(fixture.repo.targets("targets").unwrap().signatures.is_empty());
    assert!(fixture.repo.targets("bins").unwrap().signatures.is_empty());

    let event_state = SigningEventState::default();
    let (status_before, _) =
        signing_status::compute(&fixture.repo, None, &event_state, utc("2020-02-02T00:00:00Z")).unwrap();
    assert!(!status_before.roles["targets"].valid);
    assert!(!status_before.roles["bins"].valid);
    assert_eq!(status_before.roles["targets"].missing, vec!["@targets-owner".to_string()]);

    let mut targets_doc = fixture.repo.targets("targets").unwrap();
    sign_doc(&mut targets_doc, fixture.targets_signer.as_ref(), &fixture.targets_keyid);
    fixture.repo.write_role("targets.json", &targets_doc).unwrap();

    let mut bins_doc = fixture.repo.targets("bins").unwrap();
    sign_doc(&mut bins_doc, fixture.bins_signer.as_ref(), &fixture.bins_keyid);
    fixture.repo.write_role("bins.json", &bins_doc).unwrap();
    fixture.repo.invalidate();

    let (status_after, _) =
        signing_status::compute(&fixture.repo, None, &event_state, utc("2020-02-02T00:00:00Z")).unwrap();
    assert!(status_after.roles["targets"].valid);
    assert!(status_after.roles["bins"].valid);
    assert_eq!(
        status_after.roles["bins"].target_changes.get("bin/tool"),
        Some(&reconciler::TargetChange::Added)
    );
}

#[test]
fn signing_status_reports_invited_but_unsigned() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = build_fixture(dir.path());

    let clock = FixedClock::new(utc("2020-02-02T00:00:00Z"));
    let edit = Edit::new(&fixture.repo, &clock);
    edit.targets("targets", |t| {
        t.targets.insert(
            "new.txt".to_string(),
            tufrepo::schema::Target {
                length: 3,
                hashes: tufrepo::schema::Hashes::sha256_of(b"abc"),
                custom: HashMap::new(),
            },
        );
        Ok(true)
    })
    .unwrap();

    let mut event_state = SigningEventState::default();
    event_state.invite("targets", "@targets-owner");
    event_state.invite("targets", "@someone-else");

    let (status, _) =
        signing_status::compute(&fixture.repo, None, &event_state, utc("2020-02-02T00:00:00Z")).unwrap();
    let targets_status = &status.roles["targets"];
    assert!(!targets_status.valid);
    assert_eq!(targets_status.invited_and_missing, vec!["@targets-owner".to_string()]);
}

#[test]
fn root_edit_rejects_dropping_an_existing_key_slot() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = build_fixture(dir.path());

    let clock = FixedClock::new(utc("2020-02-02T00:00:00Z"));
    let edit = Edit::new(&fixture.repo, &clock);
    let root_keyid = fixture.root_keyid.clone();

    let err = edit
        .root(|root| {
            root.keys.remove(&root_keyid);
            root.roles.insert(
                RoleType::Root,
                RoleKeys {
                    keyids: vec![],
                    threshold: NonZeroU64::new(1).unwrap(),
                },
            );
            Ok(true)
        })
        .unwrap_err();

    assert_eq!(err.kind(), tufrepo::ErrorKind::InvariantViolation);
    // the pre-edit document must still be intact on disk
    assert_eq!(fixture.repo.root().unwrap().signed.version.get(), 1);
}

#[test]
fn root_edit_allows_rotating_in_a_new_key_while_keeping_the_old_slot() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = build_fixture(dir.path());

    let (new_signer, new_key, new_keyid) = generate_signer("@root-owner-2");
    let clock = FixedClock::new(utc("2020-02-02T00:00:00Z"));
    let edit = Edit::new(&fixture.repo, &clock);

    edit.root(|root| {
        root.keys.insert(new_keyid.clone(), new_key.clone());
        root.roles.insert(
            RoleType::Root,
            RoleKeys {
                keyids: vec![fixture.root_keyid.clone(), new_keyid.clone()],
                threshold: NonZeroU64::new(2).unwrap(),
            },
        );
        Ok(true)
    })
    .unwrap();

    let archived = fixture.repo.root_version(NonZeroU64::new(1).unwrap()).unwrap();
    assert_eq!(archived.signed.version.get(), 1);

    let current = fixture.repo.root().unwrap();
    assert_eq!(current.signed.version.get(), 2);
    assert!(current.signed.keys.contains_key(&fixture.root_keyid));
    assert!(current.signed.keys.contains_key(&new_keyid));

    let _ = new_signer;
    let _ = fixture.root_signer;
}

#[test]
fn publish_copies_versioned_metadata_and_hash_prefixed_targets_under_consistent_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = build_fixture(dir.path());

    let targets_dir = dir.path().join("targets");
    fs::create_dir_all(targets_dir.join("bin")).unwrap();
    fs::write(targets_dir.join("bin/tool"), b"a binary").unwrap();

    let clock = FixedClock::new(utc("2020-02-02T00:00:00Z"));
    let edit = Edit::new(&fixture.repo, &clock);
    let tool_target = tufrepo::schema::Target::from_path(&targets_dir.join("bin/tool")).unwrap();
    edit.targets("bins", |t| {
        t.targets.insert("bin/tool".to_string(), tool_target);
        Ok(true)
    })
    .unwrap();

    // Rotate root once so the current version 1 gets archived to `root_history/1.root.json`
    // before publishing, giving the publisher something to republish from that directory.
    let (_new_root_signer, new_root_key, new_root_keyid) = generate_signer("@root-owner-2");
    edit.root(|root| {
        root.keys.insert(new_root_keyid.clone(), new_root_key.clone());
        let mut role_keys = root.roles.get(&RoleType::Root).unwrap().clone();
        role_keys.keyids.push(new_root_keyid.clone());
        root.roles.insert(RoleType::Root, role_keys);
        Ok(true)
    })
    .unwrap();

    let mut bins_doc = fixture.repo.targets("bins").unwrap();
    sign_doc(&mut bins_doc, fixture.bins_signer.as_ref(), &fixture.bins_keyid);
    fixture.repo.write_role("bins.json", &bins_doc).unwrap();
    fixture.repo.invalidate();

    let publish_dir = dir.path().join("publish");
    let report = publisher::publish(&fixture.repo, &publish_dir).unwrap();
    assert!(report.roles.iter().any(|r| r.role == "bins" && r.version == 2));

    assert!(publish_dir.join("root.json").is_file());
    assert!(publish_dir.join("1.root.json").is_file());
    assert!(publish_dir.join("bins.json").is_file());
    assert!(publish_dir.join("2.bins.json").is_file());

    let sha256 = hex::encode(
        aws_lc_rs::digest::digest(&aws_lc_rs::digest::SHA256, b"a binary").as_ref(),
    );
    let hashed_name = format!("{sha256}.tool");
    assert!(publish_dir.join("targets/bin").join(hashed_name).is_file());

    let _ = fixture.snapshot_signer;
    let _ = fixture.snapshot_keyid;
    let _ = fixture.timestamp_signer;
    let _ = fixture.timestamp_keyid;
}

/// Root rotation needs both the known-good signer set and the newly proposed one at quorum.
/// `compute`'s second return value carries the known-good set's own verdict on the proposed root's
/// signatures; a caller closing out the rotation should AND it with the proposed status.
#[test]
fn root_rotation_requires_both_known_good_and_proposed_quorum() {
    let known_good_dir = tempfile::tempdir().unwrap();
    let fixture = build_fixture(known_good_dir.path());
    let known_good_repo = Repository::open(known_good_dir.path());

    let proposed_dir = tempfile::tempdir().unwrap();
    for file in ["root.json", "targets.json", "bins.json", "snapshot.json", "timestamp.json"] {
        fs::copy(known_good_dir.path().join(file), proposed_dir.path().join(file)).unwrap();
    }
    let proposed_repo = Repository::open(proposed_dir.path());

    let (new_signer, new_key, new_keyid) = generate_signer("@root-owner-2");
    let clock = FixedClock::new(utc("2020-02-02T00:00:00Z"));
    let edit = Edit::new(&proposed_repo, &clock);
    edit.root(|root| {
        root.keys.insert(new_keyid.clone(), new_key.clone());
        root.roles.insert(
            RoleType::Root,
            RoleKeys {
                keyids: vec![fixture.root_keyid.clone(), new_keyid.clone()],
                threshold: NonZeroU64::new(2).unwrap(),
            },
        );
        Ok(true)
    })
    .unwrap();

    let mut root_doc = proposed_repo.root().unwrap();
    sign_doc(&mut root_doc, fixture.root_signer.as_ref(), &fixture.root_keyid);
    sign_doc(&mut root_doc, new_signer.as_ref(), &new_keyid);
    proposed_repo.write_role("root.json", &root_doc).unwrap();
    proposed_repo.invalidate();

    let event_state = SigningEventState::default();
    let (status, known_good_status) = signing_status::compute(
        &proposed_repo,
        Some(&known_good_repo),
        &event_state,
        utc("2020-02-02T00:00:00Z"),
    )
    .unwrap();

    let proposed_root = &status.roles["root"];
    assert!(proposed_root.valid, "expected quorum under the new key set: {proposed_root:?}");

    let known_good_status = known_good_status.expect("known-good root status is present");
    let old_root = &known_good_status.roles["root"];
    assert!(old_root.valid, "expected quorum under the old key set too: {old_root:?}");
}
