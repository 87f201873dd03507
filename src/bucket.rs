//! A small, database-agnostic key-value bucket abstraction.
//!
//! The level store (§4.3 of the component design) must not be bound to a
//! specific database, so the core only ever talks to this trait. The
//! production implementation binds it to one RocksDB column family, the
//! same way the teacher's `db_utils.rs` wraps CF lookups behind small
//! typed helpers.

use rocksdb::DB;

use crate::error::{IndexError, Result};

pub trait Bucket {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;
    fn delete(&self, key: &[u8]) -> Result<()>;
}

/// The column family the durable level store owns exclusively (§6).
pub const ADDR_INDEX_CF: &str = "txbyaddridx";

/// Binds [`Bucket`] to a single RocksDB column family.
pub struct RocksBucket<'a> {
    db: &'a DB,
    cf_name: String,
}

impl<'a> RocksBucket<'a> {
    pub fn new(db: &'a DB, cf_name: impl Into<String>) -> Self {
        Self {
            db,
            cf_name: cf_name.into(),
        }
    }

    fn cf(&self) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(&self.cf_name)
            .ok_or_else(|| IndexError::MissingColumnFamily(self.cf_name.clone()))
    }
}

impl<'a> Bucket for RocksBucket<'a> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get_cf(self.cf()?, key)?)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.db.put_cf(self.cf()?, key, value)?;
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.db.delete_cf(self.cf()?, key)?;
        Ok(())
    }
}

/// Drop the entire address index bucket by recreating its column family,
/// the way `main.rs`'s CF setup recreates missing CFs on open.
pub fn drop_index(db: &DB, cf_name: &str) -> Result<()> {
    if db.cf_handle(cf_name).is_some() {
        db.drop_cf(cf_name)?;
    }
    db.create_cf(cf_name, &rocksdb::Options::default())?;
    Ok(())
}
