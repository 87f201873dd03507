//! Index metadata: schema version and connector tip tracking.
//!
//! Small fixed-width values stored under short string keys in a
//! dedicated bucket, the same way the teacher's chain state tracking
//! keeps sync height and reorg markers next to the data they describe
//! rather than inside it.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::bucket::Bucket;
use crate::error::{IndexError, Result};

/// Bumped whenever the on-disk layout of the level store or its keys
/// changes in a way that isn't forward-compatible.
pub const INDEX_VERSION: u32 = 2;

const VERSION_KEY: &[u8] = b"index_version";
const TIP_HEIGHT_KEY: &[u8] = b"tip_height";
const TIP_HASH_KEY: &[u8] = b"tip_hash";

fn read_u32(bucket: &dyn Bucket, key: &[u8]) -> Result<Option<u32>> {
    match bucket.get(key)? {
        Some(bytes) => {
            let mut r = bytes.as_slice();
            let value = r
                .read_u32::<LittleEndian>()
                .map_err(|_| IndexError::Corruption(format!("malformed metadata at {key:?}")))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

fn write_u32(bucket: &dyn Bucket, key: &[u8], value: u32) -> Result<()> {
    let mut buf = Vec::with_capacity(4);
    buf.write_u32::<LittleEndian>(value).unwrap();
    bucket.put(key, &buf)
}

/// Read the stored schema version, if the index has ever been
/// initialized.
pub fn stored_version(bucket: &dyn Bucket) -> Result<Option<u32>> {
    read_u32(bucket, VERSION_KEY)
}

/// Stamp the current schema version. Call once on first open of a fresh
/// index, or after [`crate::bucket::drop_index`] recreates the bucket.
pub fn stamp_version(bucket: &dyn Bucket) -> Result<()> {
    write_u32(bucket, VERSION_KEY, INDEX_VERSION)
}

/// Verify the on-disk version matches what this build expects.
///
/// A version mismatch is `Corruption`, not a silent migration: the
/// level store's on-disk layout isn't self-describing enough to
/// support one (§9 of the component design only ever specifies the
/// current layout).
pub fn check_version(bucket: &dyn Bucket) -> Result<()> {
    match stored_version(bucket)? {
        None => stamp_version(bucket),
        Some(v) if v == INDEX_VERSION => Ok(()),
        Some(v) => Err(IndexError::Corruption(format!(
            "index version {v} does not match expected {INDEX_VERSION}"
        ))),
    }
}

/// The last block height the connector successfully applied, used to
/// resume after a restart.
pub fn tip_height(bucket: &dyn Bucket) -> Result<Option<u32>> {
    read_u32(bucket, TIP_HEIGHT_KEY)
}

pub fn set_tip(bucket: &dyn Bucket, height: u32, hash: &[u8]) -> Result<()> {
    write_u32(bucket, TIP_HEIGHT_KEY, height)?;
    bucket.put(TIP_HASH_KEY, hash)
}

pub fn tip_hash(bucket: &dyn Bucket) -> Result<Option<Vec<u8>>> {
    bucket.get(TIP_HASH_KEY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::test_support::MemBucket;

    #[test]
    fn fresh_bucket_stamps_current_version() {
        let bucket = MemBucket::new();
        assert_eq!(stored_version(&bucket).unwrap(), None);

        check_version(&bucket).unwrap();
        assert_eq!(stored_version(&bucket).unwrap(), Some(INDEX_VERSION));
    }

    #[test]
    fn mismatched_version_is_corruption() {
        let bucket = MemBucket::new();
        write_u32(&bucket, VERSION_KEY, INDEX_VERSION + 1).unwrap();

        let err = check_version(&bucket).unwrap_err();
        assert!(matches!(err, IndexError::Corruption(_)));
    }

    #[test]
    fn tip_round_trips() {
        let bucket = MemBucket::new();
        assert_eq!(tip_height(&bucket).unwrap(), None);

        set_tip(&bucket, 12345, &[0xaa; 32]).unwrap();
        assert_eq!(tip_height(&bucket).unwrap(), Some(12345));
        assert_eq!(tip_hash(&bucket).unwrap(), Some(vec![0xaa; 32]));
    }
}
