//! CBOR encoding of stored values.

use crate::error::CoreResult;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encodes `value` as CBOR.
///
/// # Errors
///
/// Returns `Encode` if the value cannot be serialized.
pub fn to_cbor<T: Serialize + ?Sized>(value: &T) -> CoreResult<Vec<u8>> {
    let mut out = Vec::new();
    to_cbor_into(value, &mut out)?;
    Ok(out)
}

/// Appends the CBOR encoding of `value` to `out`.
///
/// # Errors
///
/// Returns `Encode` if the value cannot be serialized.
pub fn to_cbor_into<T: Serialize + ?Sized>(value: &T, out: &mut Vec<u8>) -> CoreResult<()> {
    ciborium::ser::into_writer(value, out)?;
    Ok(())
}

/// Decodes a CBOR value.
///
/// # Errors
///
/// Returns `Decode` on malformed input or a shape mismatch.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> CoreResult<T> {
    Ok(ciborium::de::from_reader(bytes)?)
}
