//! Custom deserialization helpers shared across the schema types.

use crate::schema::decoded::{Decoded, Hex};
use crate::schema::key::Key;
use serde::de::{Deserializer, Error as _, MapAccess, Visitor};
use std::collections::HashMap;
use std::fmt;

/// Deserializes a `keyid -> Key` map, checking as it goes that every keyid actually matches the
/// SHA-256 of the key it's paired with. A root or delegation document with a keyid that doesn't
/// match its key's contents is malformed and must be rejected at parse time rather than trusted
/// until something downstream notices.
pub fn deserialize_keys<'de, D>(deserializer: D) -> Result<HashMap<Decoded<Hex>, Key>, D::Error>
where
    D: Deserializer<'de>,
{
    struct KeysVisitor;

    impl<'de> Visitor<'de> for KeysVisitor {
        type Value = HashMap<Decoded<Hex>, Key>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "a map of keyid to key")
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut keys = HashMap::new();
            while let Some((keyid, key)) = map.next_entry::<Decoded<Hex>, Key>()? {
                let calculated = key.key_id().map_err(A::Error::custom)?;
                if calculated != keyid {
                    return Err(A::Error::custom(format!(
                        "key id {keyid} does not match its contents (expected {calculated})"
                    )));
                }
                if keys.insert(keyid.clone(), key).is_some() {
                    return Err(A::Error::custom(format!("duplicate key id {keyid}")));
                }
            }
            Ok(keys)
        }
    }

    deserializer.deserialize_map(KeysVisitor)
}
