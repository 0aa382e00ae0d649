//! The TUF metadata object model: the four top-level roles, delegations, keys, and the envelope
//! that carries signatures around a signed payload.
//!
//! Every role payload is wrapped in [`Signed`], and every payload type implements [`Role`] so
//! generic code (the edit transaction, the signing-status engine) can bump versions, reset
//! expiry, and compute a canonical encoding without matching on role type.

pub mod de;
pub mod decoded;
pub mod key;

use crate::clock::Clock;
use crate::error::{self, Result};
use chrono::{DateTime, Utc};
use decoded::{Decoded, Hex};
use key::Key;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use snafu::ResultExt;
use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroU64;
use std::str::FromStr;

pub const SPEC_VERSION: &str = "1.0.0";

/// Which of the four top-level roles, or a named delegation, a piece of metadata belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleType {
    Root,
    Snapshot,
    Targets,
    Timestamp,
}

impl fmt::Display for RoleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RoleType::Root => "root",
            RoleType::Snapshot => "snapshot",
            RoleType::Targets => "targets",
            RoleType::Timestamp => "timestamp",
        };
        f.write_str(s)
    }
}

impl FromStr for RoleType {
    type Err = error::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "root" => Ok(RoleType::Root),
            "snapshot" => Ok(RoleType::Snapshot),
            "targets" => Ok(RoleType::Targets),
            "timestamp" => Ok(RoleType::Timestamp),
            other => error::InvalidRoleNameSnafu { name: other }.fail(),
        }
    }
}

/// The `x-tufrepo-expiry-period-days` / `x-tufrepo-signing-period-days` annotations a role payload
/// carries so the edit transaction knows how far to push `expires` on commit and the
/// signing-status engine knows when a role enters its signing window, without either being
/// hardcoded anywhere.
///
/// Read from and written to a role's `_extra` map directly (see [`key::KeyOwnership`] for why
/// this isn't itself a second `#[serde(flatten)]` field).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LifecyclePeriods {
    pub expiry_period_days: Option<u32>,
    pub signing_period_days: Option<u32>,
}

impl LifecyclePeriods {
    const EXPIRY_KEY: &'static str = "x-tufrepo-expiry-period-days";
    const SIGNING_KEY: &'static str = "x-tufrepo-signing-period-days";

    pub fn from_extra(extra: &HashMap<String, Value>) -> Self {
        LifecyclePeriods {
            expiry_period_days: extra.get(Self::EXPIRY_KEY).and_then(Value::as_u64).map(|v| v as u32),
            signing_period_days: extra.get(Self::SIGNING_KEY).and_then(Value::as_u64).map(|v| v as u32),
        }
    }

    pub fn write_into(&self, extra: &mut HashMap<String, Value>) {
        match self.expiry_period_days {
            Some(v) => {
                extra.insert(Self::EXPIRY_KEY.to_string(), Value::from(v));
            }
            None => {
                extra.remove(Self::EXPIRY_KEY);
            }
        }
        match self.signing_period_days {
            Some(v) => {
                extra.insert(Self::SIGNING_KEY.to_string(), Value::from(v));
            }
            None => {
                extra.remove(Self::SIGNING_KEY);
            }
        }
    }

    pub fn expiry_period(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.expiry_period_days.unwrap_or(365)))
    }

    pub fn signing_period(&self) -> chrono::Duration {
        let days = self
            .signing_period_days
            .unwrap_or_else(|| self.expiry_period_days.unwrap_or(365) / 2);
        chrono::Duration::days(i64::from(days))
    }
}

/// Common surface every signed payload type (`Root`, `Snapshot`, `Targets`, `Timestamp`)
/// implements, so the edit transaction and signing-status engine can operate generically.
pub trait Role: Serialize {
    const TYPE: RoleType;

    fn version(&self) -> NonZeroU64;
    fn set_version(&mut self, version: NonZeroU64);
    fn expires(&self) -> DateTime<Utc>;
    fn set_expires(&mut self, expires: DateTime<Utc>);
    fn lifecycle(&self) -> LifecyclePeriods;

    /// The bytes that get hashed and signed: this payload's canonical JSON encoding.
    fn canonical_form(&self) -> Result<Vec<u8>> {
        olpc_cjson::to_vec(self).context(error::CanonicalSerializationSnafu {
            what: Self::TYPE.to_string(),
        })
    }

    /// Advances `version` by one and resets `expires` to `clock.now() + expiry_period()`, the
    /// mutation every successful edit transaction performs on commit.
    fn bump(&mut self, clock: &dyn Clock) {
        let next = self.version().checked_add(1).unwrap_or(self.version());
        self.set_version(next);
        self.set_expires(clock.now() + self.lifecycle().expiry_period());
    }
}

/// A single signature over a role's canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub keyid: Decoded<Hex>,
    pub sig: Decoded<Hex>,
}

/// A signed payload: the payload itself plus whatever signatures have been collected for it so
/// far. A freshly-edited role starts with an empty signature list; the signing-status engine
/// reports it as invalid until enough of the right keyholders have signed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signed<T> {
    pub signed: T,
    pub signatures: Vec<Signature>,
}

impl<T> Signed<T> {
    pub fn new(signed: T) -> Self {
        Signed {
            signed,
            signatures: Vec::new(),
        }
    }

    /// Drops every existing signature, the reset every edit transaction performs before handing
    /// the role back to its signers.
    pub fn clear_signatures(&mut self) {
        self.signatures.clear();
    }

    pub fn signed_by(&self, keyid: &Decoded<Hex>) -> bool {
        self.signatures.iter().any(|s| &s.keyid == keyid)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleKeys {
    pub keyids: Vec<Decoded<Hex>>,
    pub threshold: NonZeroU64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Root {
    #[serde(rename = "_type")]
    pub _type: String,
    pub spec_version: String,
    pub consistent_snapshot: bool,
    pub version: NonZeroU64,
    pub expires: DateTime<Utc>,

    #[serde(deserialize_with = "de::deserialize_keys")]
    pub keys: HashMap<Decoded<Hex>, Key>,
    pub roles: HashMap<RoleType, RoleKeys>,

    #[serde(flatten)]
    pub _extra: HashMap<String, Value>,
}

impl Root {
    pub fn new(expires: DateTime<Utc>) -> Self {
        Root {
            _type: "root".to_string(),
            spec_version: SPEC_VERSION.to_string(),
            consistent_snapshot: true,
            version: NonZeroU64::new(1).unwrap(),
            expires,
            keys: HashMap::new(),
            roles: HashMap::new(),
            _extra: HashMap::new(),
        }
    }

    pub fn role_keys(&self, role: RoleType) -> Result<&RoleKeys> {
        self.roles
            .get(&role)
            .ok_or_else(|| error::RoleMissingSnafu { role: role.to_string() }.build())
    }

    pub fn set_lifecycle(&mut self, lifecycle: &LifecyclePeriods) {
        lifecycle.write_into(&mut self._extra);
    }
}

impl Role for Root {
    const TYPE: RoleType = RoleType::Root;

    fn version(&self) -> NonZeroU64 {
        self.version
    }
    fn set_version(&mut self, version: NonZeroU64) {
        self.version = version;
    }
    fn expires(&self) -> DateTime<Utc> {
        self.expires
    }
    fn set_expires(&mut self, expires: DateTime<Utc>) {
        self.expires = expires;
    }
    fn lifecycle(&self) -> LifecyclePeriods {
        LifecyclePeriods::from_extra(&self._extra)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hashes {
    pub sha256: Decoded<Hex>,
}

impl Hashes {
    /// Hashes an in-memory payload (a role's canonical form, typically) into its `Hashes` entry,
    /// the same digest [`Target::from_path`] computes for a file on disk.
    pub fn sha256_of(bytes: &[u8]) -> Self {
        let digest = aws_lc_rs::digest::digest(&aws_lc_rs::digest::SHA256, bytes);
        Hashes {
            sha256: Decoded::from(digest.as_ref().to_vec()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub version: NonZeroU64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashes: Option<Hashes>,
}

impl SnapshotMeta {
    pub fn for_version(version: NonZeroU64) -> Self {
        SnapshotMeta {
            version,
            length: None,
            hashes: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(rename = "_type")]
    pub _type: String,
    pub spec_version: String,
    pub version: NonZeroU64,
    pub expires: DateTime<Utc>,
    pub meta: HashMap<String, SnapshotMeta>,

    #[serde(flatten)]
    pub _extra: HashMap<String, Value>,
}

impl Snapshot {
    pub fn new(expires: DateTime<Utc>) -> Self {
        Snapshot {
            _type: "snapshot".to_string(),
            spec_version: SPEC_VERSION.to_string(),
            version: NonZeroU64::new(1).unwrap(),
            expires,
            meta: HashMap::new(),
            _extra: HashMap::new(),
        }
    }

    pub fn set_lifecycle(&mut self, lifecycle: &LifecyclePeriods) {
        lifecycle.write_into(&mut self._extra);
    }
}

impl Role for Snapshot {
    const TYPE: RoleType = RoleType::Snapshot;

    fn version(&self) -> NonZeroU64 {
        self.version
    }
    fn set_version(&mut self, version: NonZeroU64) {
        self.version = version;
    }
    fn expires(&self) -> DateTime<Utc> {
        self.expires
    }
    fn set_expires(&mut self, expires: DateTime<Utc>) {
        self.expires = expires;
    }
    fn lifecycle(&self) -> LifecyclePeriods {
        LifecyclePeriods::from_extra(&self._extra)
    }
}

pub type TimestampMeta = SnapshotMeta;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timestamp {
    #[serde(rename = "_type")]
    pub _type: String,
    pub spec_version: String,
    pub version: NonZeroU64,
    pub expires: DateTime<Utc>,
    pub meta: HashMap<String, TimestampMeta>,

    #[serde(flatten)]
    pub _extra: HashMap<String, Value>,
}

impl Timestamp {
    pub fn new(expires: DateTime<Utc>) -> Self {
        Timestamp {
            _type: "timestamp".to_string(),
            spec_version: SPEC_VERSION.to_string(),
            version: NonZeroU64::new(1).unwrap(),
            expires,
            meta: HashMap::new(),
            _extra: HashMap::new(),
        }
    }

    pub fn set_lifecycle(&mut self, lifecycle: &LifecyclePeriods) {
        lifecycle.write_into(&mut self._extra);
    }
}

impl Role for Timestamp {
    const TYPE: RoleType = RoleType::Timestamp;

    fn version(&self) -> NonZeroU64 {
        self.version
    }
    fn set_version(&mut self, version: NonZeroU64) {
        self.version = version;
    }
    fn expires(&self) -> DateTime<Utc> {
        self.expires
    }
    fn set_expires(&mut self, expires: DateTime<Utc>) {
        self.expires = expires;
    }
    fn lifecycle(&self) -> LifecyclePeriods {
        LifecyclePeriods::from_extra(&self._extra)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub length: u64,
    pub hashes: Hashes,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub custom: HashMap<String, Value>,
}

impl Target {
    /// Hashes a file on disk into a `Target` entry (length + sha256), the shape the target
    /// reconciler emits for every artifact it routes to a role.
    pub fn from_path(path: &std::path::Path) -> Result<Self> {
        use std::io::Read;

        let mut file = std::fs::File::open(path).context(error::FileReadSnafu { path })?;
        let mut ctx = aws_lc_rs::digest::Context::new(&aws_lc_rs::digest::SHA256);
        let mut buf = [0u8; 8192];
        let mut length = 0u64;
        loop {
            let n = file.read(&mut buf).context(error::FileReadSnafu { path })?;
            if n == 0 {
                break;
            }
            ctx.update(&buf[..n]);
            length += n as u64;
        }
        let digest = ctx.finish();
        Ok(Target {
            length,
            hashes: Hashes {
                sha256: Decoded::from(digest.as_ref().to_vec()),
            },
            custom: HashMap::new(),
        })
    }
}

/// A delegated role: a named signer group responsible for the artifacts matching its path
/// patterns. Patterns are ordinary glob syntax (`"bin/**"`, `"*.rpm"`), matched most-specific
/// first; ties break on declaration order in `Delegations::roles`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegatedRole {
    pub name: String,
    pub keyids: Vec<Decoded<Hex>>,
    pub threshold: NonZeroU64,
    #[serde(default)]
    pub terminating: bool,
    pub paths: Vec<String>,
}

impl DelegatedRole {
    /// Whether `target_path` matches any of this role's patterns.
    pub fn matches(&self, target_path: &str) -> Result<bool> {
        for pattern in &self.paths {
            let glob = globset::Glob::new(pattern)
                .context(error::InvalidPathPatternSnafu { pattern: pattern.clone() })?
                .compile_matcher();
            if glob.is_match(target_path) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// A rough specificity score used to rank competing delegation matches: longer, less-wildcard
    /// patterns win. Literal path segments before the first wildcard count double.
    pub fn specificity(&self) -> usize {
        self.paths
            .iter()
            .map(|p| {
                let wildcard_free: usize = p.chars().take_while(|c| *c != '*' && *c != '?').count();
                p.len() + wildcard_free
            })
            .max()
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delegations {
    #[serde(deserialize_with = "de::deserialize_keys")]
    pub keys: HashMap<Decoded<Hex>, Key>,
    pub roles: Vec<DelegatedRole>,
}

impl Delegations {
    pub fn new() -> Self {
        Delegations {
            keys: HashMap::new(),
            roles: Vec::new(),
        }
    }

    pub fn role(&self, name: &str) -> Option<&DelegatedRole> {
        self.roles.iter().find(|r| r.name == name)
    }

    pub fn role_mut(&mut self, name: &str) -> Option<&mut DelegatedRole> {
        self.roles.iter_mut().find(|r| r.name == name)
    }
}

impl Default for Delegations {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Targets {
    #[serde(rename = "_type")]
    pub _type: String,
    pub spec_version: String,
    pub version: NonZeroU64,
    pub expires: DateTime<Utc>,
    pub targets: HashMap<String, Target>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegations: Option<Delegations>,

    #[serde(flatten)]
    pub _extra: HashMap<String, Value>,
}

impl Targets {
    pub fn new(expires: DateTime<Utc>) -> Self {
        Targets {
            _type: "targets".to_string(),
            spec_version: SPEC_VERSION.to_string(),
            version: NonZeroU64::new(1).unwrap(),
            expires,
            targets: HashMap::new(),
            delegations: None,
            _extra: HashMap::new(),
        }
    }

    pub fn set_lifecycle(&mut self, lifecycle: &LifecyclePeriods) {
        lifecycle.write_into(&mut self._extra);
    }
}

impl Role for Targets {
    const TYPE: RoleType = RoleType::Targets;

    fn version(&self) -> NonZeroU64 {
        self.version
    }
    fn set_version(&mut self, version: NonZeroU64) {
        self.version = version;
    }
    fn expires(&self) -> DateTime<Utc> {
        self.expires
    }
    fn set_expires(&mut self, expires: DateTime<Utc>) {
        self.expires = expires;
    }
    fn lifecycle(&self) -> LifecyclePeriods {
        LifecyclePeriods::from_extra(&self._extra)
    }
}
