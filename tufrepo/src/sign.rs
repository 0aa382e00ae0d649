//! Signing key material and the signatures it produces.
//!
//! A [`Sign`] is anything that can produce a TUF [`Key`] describing itself and sign an arbitrary
//! message with it. Offline keys loaded from a PEM file and keys fronted by a remote signer
//! backend (see [`crate::key_source`]) both implement it, so the rest of the crate never needs to
//! know which kind it's holding.

use crate::error::{self, Result};
use crate::schema::key::Key;
use aws_lc_rs::rand::SystemRandom;
use aws_lc_rs::signature::{
    self, EcdsaKeyPair, Ed25519KeyPair, KeyPair, RsaKeyPair, ECDSA_P256_SHA256_FIXED_SIGNING,
};
use dyn_clone::DynClone;
use snafu::{OptionExt, ResultExt};
use std::fmt::Debug;

/// Something that can describe itself as a TUF public key and produce signatures with the
/// matching private key.
pub trait Sign: DynClone + Debug + Send + Sync {
    fn tuf_key(&self) -> Key;
    fn sign(&self, msg: &[u8]) -> Result<Vec<u8>>;
}

dyn_clone::clone_trait_object!(Sign);

#[derive(Debug, Clone)]
pub struct Ed25519Signer {
    public: Vec<u8>,
    pkcs8_der: Vec<u8>,
}

impl Sign for Ed25519Signer {
    fn tuf_key(&self) -> Key {
        Key::new("ed25519", "ed25519", hex::encode(&self.public))
    }

    fn sign(&self, msg: &[u8]) -> Result<Vec<u8>> {
        let pair = Ed25519KeyPair::from_pkcs8(&self.pkcs8_der)
            .ok()
            .context(error::KeyRejectedSnafu {
                message: "invalid ed25519 pkcs8 key",
            })?;
        Ok(pair.sign(msg).as_ref().to_vec())
    }
}

#[derive(Debug, Clone)]
pub struct EcdsaSigner {
    public: Vec<u8>,
    pkcs8_der: Vec<u8>,
}

impl Sign for EcdsaSigner {
    fn tuf_key(&self) -> Key {
        Key::new("ecdsa", "ecdsa-sha2-nistp256", hex::encode(&self.public))
    }

    fn sign(&self, msg: &[u8]) -> Result<Vec<u8>> {
        let rng = SystemRandom::new();
        let pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &self.pkcs8_der, &rng)
            .ok()
            .context(error::KeyRejectedSnafu {
                message: "invalid ecdsa pkcs8 key",
            })?;
        pair.sign(&rng, msg)
            .map(|sig| sig.as_ref().to_vec())
            .ok()
            .context(error::KeyRejectedSnafu {
                message: "ecdsa signing operation failed",
            })
    }
}

#[derive(Debug, Clone)]
pub struct RsaSigner {
    public: Vec<u8>,
    pkcs8_der: Vec<u8>,
}

impl Sign for RsaSigner {
    fn tuf_key(&self) -> Key {
        Key::new("rsa", "rsassa-pss-sha256", hex::encode(&self.public))
    }

    fn sign(&self, msg: &[u8]) -> Result<Vec<u8>> {
        let pair = RsaKeyPair::from_pkcs8(&self.pkcs8_der).ok().context(error::KeyRejectedSnafu {
            message: "invalid rsa pkcs8 key",
        })?;
        let rng = SystemRandom::new();
        let mut sig = vec![0u8; pair.public_modulus_len()];
        pair.sign(&signature::RSA_PSS_SHA256, &rng, msg, &mut sig)
            .ok()
            .context(error::KeyRejectedSnafu {
                message: "rsa signing operation failed",
            })?;
        Ok(sig)
    }
}

/// Parses PKCS8 PEM key material into a concrete [`Sign`] implementation, trying each supported
/// key type in turn. This is the only place in the crate that needs to know the PKCS8 encodings
/// of the three supported algorithms.
pub fn parse_keypair(pem_bytes: &[u8]) -> Result<Box<dyn Sign>> {
    let parsed = pem::parse(pem_bytes).context(error::KeyParseSnafu)?;
    let der = parsed.contents();

    if let Ok(pair) = Ed25519KeyPair::from_pkcs8(der) {
        return Ok(Box::new(Ed25519Signer {
            public: pair.public_key().as_ref().to_vec(),
            pkcs8_der: der.to_vec(),
        }));
    }
    if let Ok(pair) = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, der, &SystemRandom::new()) {
        return Ok(Box::new(EcdsaSigner {
            public: pair.public_key().as_ref().to_vec(),
            pkcs8_der: der.to_vec(),
        }));
    }
    if let Ok(pair) = RsaKeyPair::from_pkcs8(der) {
        return Ok(Box::new(RsaSigner {
            public: pair.public_key().as_ref().to_vec(),
            pkcs8_der: der.to_vec(),
        }));
    }

    error::KeyRejectedSnafu {
        message: "key material did not parse as ed25519, ecdsa, or rsa pkcs8",
    }
    .fail()
}

/// Verifies `sig` over `msg` against a key described by `tuf_key`.
pub fn verify(key: &Key, msg: &[u8], sig: &[u8]) -> Result<bool> {
    let public = hex::decode(&key.keyval.public).map_err(|_| {
        error::KeyRejectedSnafu {
            message: "key material is not valid hex",
        }
        .build()
    })?;

    let algorithm: &dyn signature::VerificationAlgorithm = match (key.keytype.as_str(), key.scheme.as_str()) {
        ("ed25519", _) => &signature::ED25519,
        (_, "ecdsa-sha2-nistp256") => &signature::ECDSA_P256_SHA256_ASN1,
        (_, "rsassa-pss-sha256") => &signature::RSA_PSS_2048_8192_SHA256,
        _ => {
            return error::UnrecognizedKeyTypeSnafu {
                scheme: key.scheme.clone(),
            }
            .fail()
        }
    };

    let public_key = signature::UnparsedPublicKey::new(algorithm, &public);
    Ok(public_key.verify(msg, sig).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecognized_scheme_is_rejected() {
        let key = Key::new("made-up", "made-up", "00");
        let err = verify(&key, b"msg", b"sig").unwrap_err();
        assert_eq!(err.kind(), error::ErrorKind::MalformedMetadata);
    }
}
