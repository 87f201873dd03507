//! `txaddridx` — the per-address level-based transaction index.
//!
//! This crate is the hard core described in the component design: a
//! log-structured-merge-style cascade (`level_store`) that packs a
//! growing ordered sequence of fixed-size transaction location records
//! into a small number of database keys per address, plus the
//! supporting codecs, classifier, block walker, unconfirmed mirror, and
//! connector that drive it.
//!
//! Block validation, transaction parsing, address decoding, script
//! classification, the underlying key-value database engine, and the
//! higher-level indexer subscription/notification plumbing are all
//! external collaborators with contracts named in the component design
//! (`PrevScripter`, `AddressExtractor`, the [`bucket::Bucket`] trait) —
//! this crate never implements them itself.

pub mod address;
pub mod block_indexer;
pub mod bucket;
pub mod config;
pub mod connector;
pub mod entry;
pub mod error;
pub mod index_manager;
pub mod keys;
pub mod level_store;
pub mod mempool;
pub mod metrics;
pub mod telemetry;

pub use address::{classify, Address, AsPubKeyHash};
pub use entry::{DecodedEntry, Entry, ENTRY_SIZE};
pub use error::{IndexError, Result};
pub use keys::{AddrKey, ADDR_KEY_SIZE, LEVEL_KEY_SIZE};
