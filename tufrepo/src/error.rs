//! The crate-wide error type.
//!
//! Every failure the engine can produce belongs to one of the six kinds documented in the
//! design: malformed metadata, a missing role, a broken invariant, an unreached signature
//! threshold, a signer backend failure, or a plain I/O failure. The enum below has more than six
//! variants because each kind is built from several distinct call sites, but [`Error::kind`]
//! collapses them back down for callers that only care about the category.

use crate::schema::RoleType;
use snafu::Snafu;
use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The six error categories from the design's error handling section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MalformedMetadata,
    RoleMissing,
    InvariantViolation,
    UnsignedMetadata,
    SignerFailure,
    IoFailure,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    // ---- MalformedMetadata ----
    #[snafu(display("failed to parse {role} metadata: {source}"))]
    ParseMetadata {
        role: RoleType,
        source: serde_json::Error,
    },

    #[snafu(display("failed to parse metadata at {}: {source}", path.display()))]
    ParseMetadataFile {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[snafu(display("failed to serialize {what} to canonical JSON: {source}"))]
    CanonicalSerialization {
        what: String,
        source: serde_json::Error,
    },

    #[snafu(display("key id {keyid} does not match its contents (expected {calculated})"))]
    InvalidKeyId { keyid: String, calculated: String },

    #[snafu(display("duplicate key id {keyid}"))]
    DuplicateKeyId { keyid: String },

    #[snafu(display("unrecognized key type {scheme}"))]
    UnrecognizedKeyType { scheme: String },

    #[snafu(display("invalid delegation path pattern {pattern}: {source}"))]
    InvalidPathPattern {
        pattern: String,
        source: globset::Error,
    },

    #[snafu(display("role name {name:?} is not a valid role name"))]
    InvalidRoleName { name: String },

    // ---- RoleMissing ----
    #[snafu(display("role {role} is not present in this repository"))]
    RoleMissing { role: String },

    #[snafu(display("no delegation named {name} was found"))]
    DelegationMissing { name: String },

    // ---- InvariantViolation ----
    #[snafu(display("invariant violated ({invariant}): {message}"))]
    InvariantViolation {
        invariant: &'static str,
        message: String,
    },

    // ---- UnsignedMetadata ----
    #[snafu(display(
        "{role} did not reach its signature threshold ({signed} of {threshold} required)"
    ))]
    UnsignedMetadata {
        role: String,
        threshold: u64,
        signed: u64,
    },

    // ---- SignerFailure ----
    #[snafu(display("signer backend failed for key {keyid}: {message}"))]
    SignerFailure { keyid: String, message: String },

    #[snafu(display("no signer is registered for URI scheme {scheme:?}"))]
    UnknownSignerScheme { scheme: String },

    #[snafu(display("failed to parse key material: {source}"))]
    KeyParse { source: pem::PemError },

    #[snafu(display("failed to parse PKCS8 key material: {source}"))]
    Pkcs8Parse {
        source: pkcs8::der::Error,
    },

    #[snafu(display("failed to construct signing key: {message}"))]
    KeyRejected { message: String },

    // ---- IoFailure ----
    #[snafu(display("failed to read {}: {source}", path.display()))]
    FileRead { path: PathBuf, source: std::io::Error },

    #[snafu(display("failed to write {}: {source}", path.display()))]
    FileWrite { path: PathBuf, source: std::io::Error },

    #[snafu(display("failed to remove {}: {source}", path.display()))]
    FileRemove { path: PathBuf, source: std::io::Error },

    #[snafu(display("failed to walk directory {}: {source}", path.display()))]
    WalkDirectory {
        path: PathBuf,
        source: walkdir::Error,
    },

    #[snafu(display("{path} is not a regular file"))]
    NotAFile { path: String },
}

impl Error {
    /// Collapses the many leaf variants back down to the six documented error kinds.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ParseMetadata { .. }
            | Error::ParseMetadataFile { .. }
            | Error::CanonicalSerialization { .. }
            | Error::InvalidKeyId { .. }
            | Error::DuplicateKeyId { .. }
            | Error::UnrecognizedKeyType { .. }
            | Error::InvalidPathPattern { .. }
            | Error::InvalidRoleName { .. } => ErrorKind::MalformedMetadata,

            Error::RoleMissing { .. } | Error::DelegationMissing { .. } => ErrorKind::RoleMissing,

            Error::InvariantViolation { .. } => ErrorKind::InvariantViolation,

            Error::UnsignedMetadata { .. } => ErrorKind::UnsignedMetadata,

            Error::SignerFailure { .. }
            | Error::UnknownSignerScheme { .. }
            | Error::KeyParse { .. }
            | Error::Pkcs8Parse { .. }
            | Error::KeyRejected { .. } => ErrorKind::SignerFailure,

            Error::FileRead { .. }
            | Error::FileWrite { .. }
            | Error::FileRemove { .. }
            | Error::WalkDirectory { .. }
            | Error::NotAFile { .. } => ErrorKind::IoFailure,
        }
    }
}
