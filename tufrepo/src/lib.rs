//! A signed TUF metadata repository state engine for signing-event driven release pipelines.
//!
//! This crate models a metadata directory as two read views — the proposed state under review and
//! the last known-good state it's being compared against — plus a closure-based edit transaction
//! for mutating a role, a target reconciler for routing artifacts to the right delegation, and a
//! signing-status engine that reports, per role, who still needs to sign.
//!
//! It does not implement a TUF client: verifying and fetching metadata to install an update is a
//! different problem with a different threat model, and is explicitly out of scope.

pub mod clock;
pub mod edit;
pub mod error;
pub mod key_source;
pub mod publisher;
pub mod reconciler;
pub mod repository;
pub mod schema;
pub mod sign;
pub mod signing_event_state;
pub mod signing_status;

pub use error::{Error, ErrorKind, Result};
pub use repository::Repository;
