//! Identifiers and cursors.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A document etag: the store-wide sequence number assigned on write.
///
/// Etags start at 1; zero means "nothing seen yet".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Etag(pub i64);

impl Etag {
    /// The etag before any document.
    pub const ZERO: Etag = Etag(0);

    /// Creates an etag.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self.0
    }

    /// Returns the following etag.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Big-endian bytes; sorts like the number for non-negative etags.
    #[must_use]
    pub const fn to_key(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// Parses a key produced by [`to_key`](Self::to_key).
    #[must_use]
    pub fn from_key(key: &[u8]) -> Option<Self> {
        let bytes: [u8; 8] = key.try_into().ok()?;
        Some(Self(i64::from_be_bytes(bytes)))
    }
}

impl fmt::Display for Etag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Etag {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Identifier of an index. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndexId(u32);

impl IndexId {
    /// Creates an index id, rejecting zero.
    ///
    /// # Errors
    ///
    /// Returns `InvalidIndexId` for zero.
    pub fn new(id: u32) -> CoreResult<Self> {
        if id == 0 {
            return Err(CoreError::InvalidIndexId(id));
        }
        Ok(Self(id))
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for IndexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn etag_keys_sort_numerically() {
        let mut keys: Vec<_> = [300i64, 2, 70_000, 1].iter().map(|&e| Etag(e).to_key()).collect();
        keys.sort();
        let etags: Vec<_> = keys.iter().map(|k| Etag::from_key(k).unwrap().as_i64()).collect();
        assert_eq!(etags, vec![1, 2, 300, 70_000]);
        assert!(Etag::from_key(b"short").is_none());
    }

    #[test]
    fn index_id_rejects_zero() {
        assert!(matches!(IndexId::new(0), Err(CoreError::InvalidIndexId(0))));
        assert_eq!(IndexId::new(3).unwrap().to_string(), "3");
    }

    proptest! {
        #[test]
        fn key_order_matches_etag_order(a in 0i64..i64::MAX, b in 0i64..i64::MAX) {
            let (ka, kb) = (Etag(a).to_key(), Etag(b).to_key());
            prop_assert_eq!(a.cmp(&b), ka.cmp(&kb));
            prop_assert_eq!(Etag::from_key(&ka), Some(Etag(a)));
        }
    }
}
