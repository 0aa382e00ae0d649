//! Public key objects.

use crate::error::{self, Result};
use crate::schema::decoded::{Decoded, Hex};
use aws_lc_rs::digest;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use snafu::ResultExt;
use std::collections::HashMap;

const KEYOWNER_FIELD: &str = "x-tufrepo-keyowner";
const ONLINE_URI_FIELD: &str = "x-tufrepo-online-uri";

/// The two custom annotations a key may carry: an offline signer's owner name, or the URI an
/// online signer backend uses to locate the private key. Exactly one is set for a key in active
/// use; a key may temporarily have neither while it is being imported (§3 "import mode").
///
/// Stored as plain entries in [`Key::_extra`] rather than as a second `#[serde(flatten)]` struct
/// field: serde hands every `flatten` field the same buffer of leftover keys, so a typed flatten
/// field and a catch-all map flatten field would both claim these two keys and the key's
/// canonical form would carry them twice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyOwnership {
    pub keyowner: Option<String>,
    pub online_uri: Option<String>,
}

impl KeyOwnership {
    pub fn offline(owner: impl Into<String>) -> Self {
        KeyOwnership {
            keyowner: Some(owner.into()),
            online_uri: None,
        }
    }

    pub fn online(uri: impl Into<String>) -> Self {
        KeyOwnership {
            keyowner: None,
            online_uri: Some(uri.into()),
        }
    }

    pub fn is_online(&self) -> bool {
        self.online_uri.is_some()
    }

    /// `true` once exactly one of `keyowner`/`online_uri` is set. A key with neither is in the
    /// bounded import window; a key with both is never valid.
    pub fn is_claimed(&self) -> bool {
        self.keyowner.is_some() ^ self.online_uri.is_some()
    }

    pub fn is_unclaimed(&self) -> bool {
        self.keyowner.is_none() && self.online_uri.is_none()
    }

    fn from_extra(extra: &HashMap<String, Value>) -> Self {
        KeyOwnership {
            keyowner: extra.get(KEYOWNER_FIELD).and_then(Value::as_str).map(str::to_string),
            online_uri: extra.get(ONLINE_URI_FIELD).and_then(Value::as_str).map(str::to_string),
        }
    }

    fn write_into(&self, extra: &mut HashMap<String, Value>) {
        match &self.keyowner {
            Some(owner) => {
                extra.insert(KEYOWNER_FIELD.to_string(), Value::String(owner.clone()));
            }
            None => {
                extra.remove(KEYOWNER_FIELD);
            }
        }
        match &self.online_uri {
            Some(uri) => {
                extra.insert(ONLINE_URI_FIELD.to_string(), Value::String(uri.clone()));
            }
            None => {
                extra.remove(ONLINE_URI_FIELD);
            }
        }
    }
}

/// The key material itself. TUF leaves the encoding of `public` up to the key scheme; this engine
/// stores it as the hex or PEM string the signer backend produced, uninterpreted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyVal {
    pub public: String,
}

/// A public key as it appears in `root.json` or a `targets` delegation's key set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Key {
    pub keytype: String,
    pub scheme: String,
    pub keyval: KeyVal,

    /// Every field not named above, including the `x-tufrepo-keyowner` / `x-tufrepo-online-uri`
    /// annotations read and written through [`Key::owner`]/[`Key::set_owner`]. Preserved
    /// wholesale so re-serializing a key (and recomputing its keyid) stays bit-exact.
    #[serde(flatten)]
    pub _extra: HashMap<String, Value>,
}

impl Key {
    pub fn new(keytype: impl Into<String>, scheme: impl Into<String>, public: impl Into<String>) -> Self {
        Key {
            keytype: keytype.into(),
            scheme: scheme.into(),
            keyval: KeyVal {
                public: public.into(),
            },
            _extra: HashMap::new(),
        }
    }

    pub fn owner(&self) -> KeyOwnership {
        KeyOwnership::from_extra(&self._extra)
    }

    pub fn set_owner(&mut self, owner: &KeyOwnership) {
        owner.write_into(&mut self._extra);
    }

    /// The keyid: SHA-256 of this key's canonical JSON encoding, custom annotations included.
    /// Changing the owner therefore changes the keyid.
    pub fn key_id(&self) -> Result<Decoded<Hex>> {
        let bytes = olpc_cjson::to_vec(self).context(error::CanonicalSerializationSnafu { what: "key" })?;
        let digest = digest::digest(&digest::SHA256, &bytes);
        Ok(Decoded::from(digest.as_ref().to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyid_changes_when_owner_is_set() {
        let mut key = Key::new("ed25519", "ed25519", "abcd");
        let before = key.key_id().unwrap();
        key.set_owner(&KeyOwnership::offline("@testuser"));
        let after = key.key_id().unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn keyid_is_stable_for_identical_keys() {
        let a = Key::new("ed25519", "ed25519", "abcd");
        let b = Key::new("ed25519", "ed25519", "abcd");
        assert_eq!(a.key_id().unwrap(), b.key_id().unwrap());
    }

    #[test]
    fn owner_round_trips_through_extra_fields() {
        let mut key = Key::new("ed25519", "ed25519", "abcd");
        key.set_owner(&KeyOwnership::offline("@alice"));
        assert_eq!(key.owner().keyowner.as_deref(), Some("@alice"));

        key.set_owner(&KeyOwnership::online("file:///keys/release.pem"));
        assert_eq!(key.owner().keyowner, None);
        assert_eq!(key.owner().online_uri.as_deref(), Some("file:///keys/release.pem"));
    }

    #[test]
    fn ownership_claimed_exclusively() {
        let mut owner = KeyOwnership::default();
        assert!(owner.is_unclaimed());
        assert!(!owner.is_claimed());
        owner = KeyOwnership::offline("@alice");
        assert!(owner.is_claimed());
        owner.online_uri = Some("kms:key".to_string());
        assert!(!owner.is_claimed());
    }
}
