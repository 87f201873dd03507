//! Configuration — tunables outside the hard algorithm (§10.3).
//!
//! Kept from the teacher's `config`-crate-plus-`OnceCell` global almost
//! unchanged, trimmed to the handful of keys this component actually
//! reads: the bucket's column family name and the connector's batch
//! write threshold. Node RPC endpoints, HTTP bind addresses, and the
//! rest of the teacher's `config.toml` surface have no counterpart
//! here — indexer embedding and subscription plumbing are out of scope
//! (§1).

use std::error::Error;

pub use config::Config;
pub use once_cell::sync::OnceCell;

static GLOBAL_CONFIG: OnceCell<Config> = OnceCell::new();

/// Engine tunables, defaulted so the crate works without a config file
/// present (the teacher's `config.toml`-or-bust approach would force
/// every embedder to ship one just to get the default column family
/// name).
#[derive(Debug, Clone)]
pub struct Settings {
    /// Column family the level store's bucket binds to (§6).
    pub column_family: String,
    /// Entries the connector batches before flushing a write batch to
    /// the bucket's underlying transaction.
    pub batch_flush_threshold: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            column_family: crate::bucket::ADDR_INDEX_CF.to_string(),
            batch_flush_threshold: 10_000,
        }
    }
}

pub fn init_global_config() -> Result<(), Box<dyn Error>> {
    let config = Config::builder()
        .add_source(config::File::with_name("config.toml").required(false))
        .build()?;
    GLOBAL_CONFIG
        .set(config)
        .map_err(|_| "config already set")?;
    Ok(())
}

pub fn get_global_config() -> &'static Config {
    GLOBAL_CONFIG.get().unwrap_or_else(|| {
        eprintln!("FATAL: config not initialized - call init_global_config() first");
        std::process::exit(1);
    })
}

/// Resolve engine [`Settings`], falling back to defaults for any key
/// the loaded config doesn't set.
pub fn settings_from(config: &Config) -> Settings {
    let defaults = Settings::default();
    Settings {
        column_family: config
            .get_string("txaddridx.column_family")
            .unwrap_or(defaults.column_family),
        batch_flush_threshold: config
            .get_int("txaddridx.batch_flush_threshold")
            .map(|v| v as usize)
            .unwrap_or(defaults.batch_flush_threshold),
    }
}
