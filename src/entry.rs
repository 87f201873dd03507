//! C1 — fixed 16-byte transaction location record.
//!
//! `blockId | txStart | txLen | indexInBlock`, all big-endian u32s, in
//! that order. This is the unit the level store packs by the thousand
//! into a handful of keys per address.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{IndexError, Result};

pub const ENTRY_SIZE: usize = 16;

/// Locates a single transaction inside a serialized block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    pub block_id: u32,
    pub tx_start: u32,
    pub tx_len: u32,
    pub index_in_block: u32,
}

impl Entry {
    pub fn new(block_id: u32, tx_start: u32, tx_len: u32, index_in_block: u32) -> Self {
        Self {
            block_id,
            tx_start,
            tx_len,
            index_in_block,
        }
    }

    pub fn encode(&self) -> [u8; ENTRY_SIZE] {
        let mut buf = [0u8; ENTRY_SIZE];
        {
            let mut w = &mut buf[..];
            w.write_u32::<BigEndian>(self.block_id).unwrap();
            w.write_u32::<BigEndian>(self.tx_start).unwrap();
            w.write_u32::<BigEndian>(self.tx_len).unwrap();
            w.write_u32::<BigEndian>(self.index_in_block).unwrap();
        }
        buf
    }

    /// Decode a raw entry, resolving the stored block id to a full block
    /// hash via the caller-supplied oracle lookup.
    pub fn decode<H, F>(bytes: &[u8], resolve_hash: F) -> Result<DecodedEntry<H>>
    where
        F: FnOnce(u32) -> H,
    {
        if bytes.len() < ENTRY_SIZE {
            return Err(IndexError::Corruption(
                "unexpected end of data".to_string(),
            ));
        }
        let mut r = &bytes[..ENTRY_SIZE];
        let block_id = r.read_u32::<BigEndian>().unwrap();
        let offset = r.read_u32::<BigEndian>().unwrap();
        let len = r.read_u32::<BigEndian>().unwrap();
        let index_in_block = r.read_u32::<BigEndian>().unwrap();

        Ok(DecodedEntry {
            hash: resolve_hash(block_id),
            offset,
            len,
            index_in_block,
        })
    }
}

/// Result of decoding an [`Entry`], with the block id already resolved to
/// a caller-meaningful hash type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedEntry<H> {
    pub hash: H,
    pub offset: u32,
    pub len: u32,
    pub index_in_block: u32,
}
