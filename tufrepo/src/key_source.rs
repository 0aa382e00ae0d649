//! Locating signing keys by URI.
//!
//! A signer is named on the wire by a URI such as `file:///keys/alice.pem` or
//! `awskms:///alias/release-signing`. [`SignerRegistry`] maps the scheme of that URI to a
//! [`SignerBackend`] that knows how to turn the rest of the URI into a [`Sign`]. Only the `file:`
//! backend is implemented here; the others are named so the repository's key-source URIs remain
//! meaningful even where this engine can't itself reach the key store.

use crate::error::{self, Result};
use crate::sign::{self, Sign};
use snafu::{OptionExt, ResultExt};
use std::collections::HashMap;
use std::path::Path;
use url::Url;

/// Resolves the scheme-specific part of a signer URI into signing key material.
pub trait SignerBackend: std::fmt::Debug {
    fn load(&self, url: &Url) -> Result<Box<dyn Sign>>;
}

/// Reads a PEM-encoded PKCS8 private key from the local filesystem. The only backend this engine
/// implements itself; every other scheme is a placeholder a deployment wires in.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileSignerBackend;

impl SignerBackend for FileSignerBackend {
    fn load(&self, url: &Url) -> Result<Box<dyn Sign>> {
        let path = url.to_file_path().map_err(|()| {
            error::SignerFailureSnafu {
                keyid: url.as_str(),
                message: "not a valid file:// URI",
            }
            .build()
        })?;
        let bytes = std::fs::read(&path).context(error::FileReadSnafu { path: path.clone() })?;
        sign::parse_keypair(&bytes)
    }
}

/// Maps signer URI schemes to the backend that resolves them. Deployments that need a KMS or HSM
/// backend register one here under the scheme they use in their key-source URIs; this engine
/// never hardcodes a cloud SDK itself.
#[derive(Debug)]
pub struct SignerRegistry {
    backends: HashMap<String, Box<dyn SignerBackend>>,
}

impl SignerRegistry {
    pub fn new() -> Self {
        let mut backends: HashMap<String, Box<dyn SignerBackend>> = HashMap::new();
        backends.insert("file".to_string(), Box::new(FileSignerBackend));
        SignerRegistry { backends }
    }

    pub fn register(&mut self, scheme: impl Into<String>, backend: Box<dyn SignerBackend>) {
        self.backends.insert(scheme.into(), backend);
    }

    pub fn load(&self, uri: &str) -> Result<Box<dyn Sign>> {
        let url = Url::parse(uri).map_err(|_| {
            error::SignerFailureSnafu {
                keyid: uri,
                message: "not a valid signer URI",
            }
            .build()
        })?;
        let backend = self
            .backends
            .get(url.scheme())
            .context(error::UnknownSignerSchemeSnafu {
                scheme: url.scheme().to_string(),
            })?;
        backend.load(&url)
    }
}

impl Default for SignerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds a `file://` URI for a key at `path`, the form this engine writes into
/// `x-tufrepo-online-uri` / local signer configuration when it owns the key material itself.
pub fn file_uri(path: &Path) -> Result<String> {
    let absolute = path.canonicalize().context(error::FileReadSnafu { path })?;
    Url::from_file_path(&absolute)
        .map(|u| u.to_string())
        .map_err(|()| {
            error::SignerFailureSnafu {
                keyid: absolute.display().to_string(),
                message: "path cannot be expressed as a file:// URI",
            }
            .build()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_scheme_is_reported() {
        let registry = SignerRegistry::new();
        let err = registry.load("awskms:///alias/release").unwrap_err();
        assert_eq!(err.kind(), error::ErrorKind::SignerFailure);
    }
}
