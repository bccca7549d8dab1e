//! The `Stats` tree: type tag, definition and progress cursors.
//!
//! | Key | Value |
//! |---|---|
//! | `Type` | LE i32 type tag |
//! | `Definition` | CBOR definition |
//! | `LastMappedEtag` | LE i64, max over the collection cursors |
//! | `LastMappedEtag/<collection>` | LE i64 |
//! | `LastReducedEtag` | LE i64 |
//!
//! Writers take the caller's write transaction and never open their own,
//! so a cursor only moves in the commit that stores the work it covers.

use crate::codec::{from_cbor, to_cbor};
use crate::error::{CoreError, CoreResult};
use crate::types::Etag;
use docdex_storage::{Readable, WriteTransaction};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Name of the metadata tree.
pub const STATS_TREE: &str = "Stats";
/// Key of the type tag.
pub const TYPE_KEY: &[u8] = b"Type";
/// Key of the serialized definition.
pub const DEFINITION_KEY: &[u8] = b"Definition";
/// Key of the map cursor.
pub const LAST_MAPPED_ETAG_KEY: &[u8] = b"LastMappedEtag";
/// Key of the reduce cursor.
pub const LAST_REDUCED_ETAG_KEY: &[u8] = b"LastReducedEtag";

/// Key of the map cursor of one collection.
pub fn collection_etag_key(collection: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(LAST_MAPPED_ETAG_KEY.len() + 1 + collection.len());
    key.extend_from_slice(LAST_MAPPED_ETAG_KEY);
    key.push(b'/');
    key.extend_from_slice(collection.as_bytes());
    key
}

/// Reads the stored type tag, if any.
///
/// # Errors
///
/// Returns `Recovery` if the value is not four bytes.
pub fn read_type(tx: &impl Readable) -> CoreResult<Option<i32>> {
    let Some(raw) = tx.get(STATS_TREE, TYPE_KEY) else {
        return Ok(None);
    };
    let bytes = <[u8; 4]>::try_from(&raw[..])
        .map_err(|_| CoreError::recovery(format!("type tag has {} bytes", raw.len())))?;
    Ok(Some(i32::from_le_bytes(bytes)))
}

/// Stores the type tag, creating the tree if needed.
///
/// # Errors
///
/// Returns storage errors.
pub fn write_type(tx: &mut WriteTransaction<'_>, tag: i32) -> CoreResult<()> {
    tx.create_tree(STATS_TREE)?;
    tx.put(STATS_TREE, TYPE_KEY, tag.to_le_bytes().to_vec())?;
    Ok(())
}

/// Reads and decodes the stored definition.
///
/// # Errors
///
/// Returns `Recovery` if it is missing or does not decode.
pub fn read_definition<D: DeserializeOwned>(tx: &impl Readable) -> CoreResult<D> {
    let raw = tx
        .get(STATS_TREE, DEFINITION_KEY)
        .ok_or_else(|| CoreError::recovery("index definition is missing"))?;
    from_cbor(&raw).map_err(|err| CoreError::recovery(format!("index definition: {err}")))
}

/// Stores the definition.
///
/// # Errors
///
/// Returns storage and encoding errors.
pub fn write_definition<D: Serialize>(
    tx: &mut WriteTransaction<'_>,
    definition: &D,
) -> CoreResult<()> {
    tx.create_tree(STATS_TREE)?;
    tx.put(STATS_TREE, DEFINITION_KEY, to_cbor(definition)?)?;
    Ok(())
}

/// Reads the map cursor; zero for a fresh index.
///
/// # Errors
///
/// Returns `Decode` on a malformed value.
pub fn read_last_mapped_etag(tx: &impl Readable) -> CoreResult<Etag> {
    read_etag(tx, LAST_MAPPED_ETAG_KEY)
}

/// Reads the map cursor of `collection`; zero if never mapped.
///
/// # Errors
///
/// Returns `Decode` on a malformed value.
pub fn read_last_mapped_etag_for(tx: &impl Readable, collection: &str) -> CoreResult<Etag> {
    read_etag(tx, &collection_etag_key(collection))
}

/// Stores the map cursor.
///
/// # Errors
///
/// Returns storage errors.
pub fn write_last_mapped_etag(tx: &mut WriteTransaction<'_>, etag: Etag) -> CoreResult<()> {
    write_etag(tx, LAST_MAPPED_ETAG_KEY.to_vec(), etag)
}

/// Advances the cursor of `collection` and raises the map cursor to match.
///
/// # Errors
///
/// Returns `EtagOutOfOrder` if `etag` is below the stored cursor of the
/// collection, and storage errors.
pub fn write_last_mapped_etag_for(
    tx: &mut WriteTransaction<'_>,
    collection: &str,
    etag: Etag,
) -> CoreResult<()> {
    let current = read_last_mapped_etag_for(&*tx, collection)?;
    if etag < current {
        return Err(CoreError::EtagOutOfOrder {
            collection: collection.to_owned(),
            cursor: current.as_i64(),
            etag: etag.as_i64(),
        });
    }
    write_etag(tx, collection_etag_key(collection), etag)?;
    if etag > read_last_mapped_etag(&*tx)? {
        write_last_mapped_etag(tx, etag)?;
    }
    Ok(())
}

/// Reads the reduce cursor; zero until a reduce phase writes it.
///
/// # Errors
///
/// Returns `Decode` on a malformed value.
pub fn read_last_reduced_etag(tx: &impl Readable) -> CoreResult<Etag> {
    read_etag(tx, LAST_REDUCED_ETAG_KEY)
}

/// Stores the reduce cursor.
///
/// # Errors
///
/// Returns storage errors.
pub fn write_last_reduced_etag(tx: &mut WriteTransaction<'_>, etag: Etag) -> CoreResult<()> {
    write_etag(tx, LAST_REDUCED_ETAG_KEY.to_vec(), etag)
}

fn read_etag(tx: &impl Readable, key: &[u8]) -> CoreResult<Etag> {
    let Some(raw) = tx.get(STATS_TREE, key) else {
        return Ok(Etag::ZERO);
    };
    let bytes = <[u8; 8]>::try_from(&raw[..]).map_err(|_| {
        CoreError::decode(format!(
            "{} holds {} bytes, expected 8",
            String::from_utf8_lossy(key),
            raw.len()
        ))
    })?;
    Ok(Etag(i64::from_le_bytes(bytes)))
}

fn write_etag(tx: &mut WriteTransaction<'_>, key: Vec<u8>, etag: Etag) -> CoreResult<()> {
    tx.create_tree(STATS_TREE)?;
    tx.put(STATS_TREE, key, etag.as_i64().to_le_bytes().to_vec())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use docdex_storage::Environment;

    #[test]
    fn fresh_index_reads_zero() {
        let env = Environment::in_memory();
        let tx = env.read_transaction().unwrap();
        assert_eq!(read_last_mapped_etag(&tx).unwrap(), Etag::ZERO);
        assert_eq!(read_last_reduced_etag(&tx).unwrap(), Etag::ZERO);
        assert_eq!(read_last_mapped_etag_for(&tx, "Users").unwrap(), Etag::ZERO);
        assert_eq!(read_type(&tx).unwrap(), None);
    }

    #[test]
    fn etags_are_little_endian_i64() {
        let env = Environment::in_memory();
        let mut tx = env.write_transaction().unwrap();
        write_last_mapped_etag(&mut tx, Etag(0x0102)).unwrap();
        write_type(&mut tx, 1).unwrap();
        tx.commit().unwrap();

        let tx = env.read_transaction().unwrap();
        let raw = tx.get(STATS_TREE, LAST_MAPPED_ETAG_KEY).unwrap();
        assert_eq!(&raw[..], &[0x02, 0x01, 0, 0, 0, 0, 0, 0]);
        assert_eq!(&tx.get(STATS_TREE, TYPE_KEY).unwrap()[..], &[1, 0, 0, 0]);
    }

    #[test]
    fn collection_cursor_raises_the_global_cursor() {
        let env = Environment::in_memory();
        let mut tx = env.write_transaction().unwrap();
        write_last_mapped_etag_for(&mut tx, "Users", Etag(7)).unwrap();
        write_last_mapped_etag_for(&mut tx, "Orders", Etag(4)).unwrap();
        tx.commit().unwrap();

        let tx = env.read_transaction().unwrap();
        assert_eq!(read_last_mapped_etag(&tx).unwrap(), Etag(7));
        assert_eq!(read_last_mapped_etag_for(&tx, "Orders").unwrap(), Etag(4));
        assert_eq!(collection_etag_key("Orders"), b"LastMappedEtag/Orders".to_vec());
    }

    #[test]
    fn collection_cursor_never_moves_back() {
        let env = Environment::in_memory();
        let mut tx = env.write_transaction().unwrap();
        write_last_mapped_etag_for(&mut tx, "Users", Etag(7)).unwrap();
        let err = write_last_mapped_etag_for(&mut tx, "Users", Etag(3)).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn uncommitted_cursor_is_invisible() {
        let env = Environment::in_memory();
        {
            let mut tx = env.write_transaction().unwrap();
            write_last_mapped_etag(&mut tx, Etag(9)).unwrap();
        }
        let tx = env.read_transaction().unwrap();
        assert_eq!(read_last_mapped_etag(&tx).unwrap(), Etag::ZERO);
    }

    #[test]
    fn malformed_type_is_a_recovery_error() {
        let env = Environment::in_memory();
        let mut tx = env.write_transaction().unwrap();
        tx.create_tree(STATS_TREE).unwrap();
        tx.put(STATS_TREE, TYPE_KEY, vec![1u8]).unwrap();
        tx.commit().unwrap();

        let tx = env.read_transaction().unwrap();
        assert!(read_type(&tx).unwrap_err().is_recovery());
        assert!(read_definition::<Vec<String>>(&tx).unwrap_err().is_recovery());
    }
}
