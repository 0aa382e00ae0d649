//! A byte buffer that (de)serializes through a textual encoding (currently only hex, the
//! encoding TUF uses for keyids, signatures, and digests).

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

/// A marker type identifying hex as the textual encoding for a [`Decoded`] value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hex {}

/// Describes a reversible textual encoding of a byte buffer.
pub trait Encoding {
    fn encode(bytes: &[u8]) -> String;
    fn decode(s: &str) -> Result<Vec<u8>, String>;
}

impl Encoding for Hex {
    fn encode(bytes: &[u8]) -> String {
        hex::encode(bytes)
    }

    fn decode(s: &str) -> Result<Vec<u8>, String> {
        hex::decode(s).map_err(|e| e.to_string())
    }
}

/// A byte buffer that serializes as a string via its `E: Encoding` parameter and compares/hashes
/// by its decoded bytes. Used for keyids, signatures, and hash digests so that the in-memory type
/// is a plain byte slice while the wire format stays a string.
///
/// `Clone`/`Eq`/`Hash`/`Ord` are implemented by hand rather than derived: `derive` would add a
/// spurious `E: Clone` (etc.) bound even though `PhantomData<E>` never needs one, and the marker
/// types used for `E` (e.g. [`Hex`]) deliberately implement nothing but [`Encoding`].
pub struct Decoded<E> {
    bytes: Vec<u8>,
    spooky: PhantomData<E>,
}

impl<E> Clone for Decoded<E> {
    fn clone(&self) -> Self {
        Decoded {
            bytes: self.bytes.clone(),
            spooky: PhantomData,
        }
    }
}

impl<E> PartialEq for Decoded<E> {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl<E> Eq for Decoded<E> {}

impl<E> std::hash::Hash for Decoded<E> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.bytes.hash(state);
    }
}

impl<E> PartialOrd for Decoded<E> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for Decoded<E> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.bytes.cmp(&other.bytes)
    }
}

impl<E> Decoded<E> {
    pub fn into_vec(self) -> Vec<u8> {
        self.bytes
    }
}

impl<E> From<Vec<u8>> for Decoded<E> {
    fn from(bytes: Vec<u8>) -> Self {
        Decoded {
            bytes,
            spooky: PhantomData,
        }
    }
}

impl<E> Deref for Decoded<E> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}

impl<E> DerefMut for Decoded<E> {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

impl<E> AsRef<[u8]> for Decoded<E> {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl<E> fmt::Debug for Decoded<E>
where
    E: Encoding,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Decoded").field(&E::encode(&self.bytes)).finish()
    }
}

impl<E> fmt::Display for Decoded<E>
where
    E: Encoding,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&E::encode(&self.bytes))
    }
}

impl<E> Serialize for Decoded<E>
where
    E: Encoding,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&E::encode(&self.bytes))
    }
}

impl<'de, E> Deserialize<'de> for Decoded<E>
where
    E: Encoding,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = E::decode(&s).map_err(D::Error::custom)?;
        Ok(Decoded {
            bytes,
            spooky: PhantomData,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_hex() {
        let decoded: Decoded<Hex> = vec![0xde, 0xad, 0xbe, 0xef].into();
        assert_eq!(decoded.to_string(), "deadbeef");
        let json = serde_json::to_string(&decoded).unwrap();
        assert_eq!(json, "\"deadbeef\"");
        let back: Decoded<Hex> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, decoded);
    }

    #[test]
    fn rejects_invalid_hex() {
        let err = serde_json::from_str::<Decoded<Hex>>("\"zz\"");
        assert!(err.is_err());
    }
}
