//! Error taxonomy for the address-to-transaction index.
//!
//! Mirrors the classification in the component's design doc: unsupported
//! addresses are a classification skip, corruption is a sign the index
//! should be dropped and rebuilt, assertion failures indicate a coding
//! error and never normal input.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    /// The decoded address variant has no canonical on-chain form we
    /// index (e.g. a shielded/Sapling output). Callers treat this as a
    /// skip, not a failure.
    #[error("unsupported address")]
    UnsupportedAddress,

    /// A decode found fewer bytes than required, or a level value whose
    /// length isn't a multiple of the entry size. The index is
    /// considered inconsistent once this surfaces.
    #[error("corruption: {0}")]
    Corruption(String),

    /// An invariant the caller was responsible for upholding didn't
    /// hold (e.g. removing more entries than exist for an address).
    #[error("assertion failed: {0}")]
    Assert(String),

    /// Passed through from the underlying key-value bucket.
    #[error("database error: {0}")]
    Database(#[from] rocksdb::Error),

    /// The bucket's backing column family hasn't been opened.
    #[error("column family not found: {0}")]
    MissingColumnFamily(String),

    /// Returned verbatim during init when the caller's cancellation
    /// token fires.
    #[error("interrupt requested")]
    InterruptRequested,
}

pub type Result<T> = std::result::Result<T, IndexError>;
