//! C6 — unconfirmed (mempool) mirror.
//!
//! An in-memory, bidirectional `addrKey <-> txHash` map for transactions
//! that haven't been mined yet. Process-wide, lifecycle bounded by
//! process uptime (§3), mutated under a single read/write lock (§4.6).
//!
//! Grounded on the teacher's `MempoolState` (a lock-guarded map with
//! `get_info`/`get_transaction` read accessors). The teacher wraps its
//! map in `tokio::sync::RwLock` because its mempool monitor is a polling
//! async task; this mirror has no internal suspension points (§5 "no
//! internal task spawning"), so it uses `parking_lot::RwLock` instead —
//! synchronous, uncontended-fast, and already part of the teacher's own
//! dependency stack (see `main.rs`'s `DB_MUTEX`).

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;

use crate::address::classify;
use crate::block_indexer::{addresses_in_transaction, AddressExtractor, PrevScripter, StakeTxKind, Transaction};
use crate::error::Result;
use crate::keys::AddrKey;

pub type TxHash = [u8; 32];

struct Inner<Tx> {
    txns_by_addr: HashMap<AddrKey, HashMap<TxHash, Tx>>,
    addrs_by_tx: HashMap<TxHash, HashSet<AddrKey>>,
}

impl<Tx> Default for Inner<Tx> {
    fn default() -> Self {
        Self {
            txns_by_addr: HashMap::new(),
            addrs_by_tx: HashMap::new(),
        }
    }
}

/// The process-wide unconfirmed mirror, generic over the caller's
/// mempool transaction representation (`Tx`, kept opaque to this
/// component — transaction parsing is out of scope, §1).
pub struct UnconfirmedMirror<Tx: Clone> {
    inner: RwLock<Inner<Tx>>,
}

impl<Tx: Clone> Default for UnconfirmedMirror<Tx> {
    fn default() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }
}

impl<Tx: Clone> UnconfirmedMirror<Tx> {
    pub fn new() -> Self {
        Self::default()
    }

    /// §4.6 `addUnconfirmed` — replay the same per-input/per-output
    /// address extraction C5 uses over a single transaction, then index
    /// `tx` under every address discovered.
    pub fn add_unconfirmed<P: PrevScripter, X: AddressExtractor>(
        &self,
        tx_hash: TxHash,
        tx: Tx,
        parsed: &Transaction,
        kind: Option<StakeTxKind>,
        prev: &P,
        extractor: &X,
        treasury_enabled: bool,
    ) -> Result<()> {
        let keys = addresses_in_transaction(parsed, kind, prev, extractor, treasury_enabled);

        let mut guard = self.inner.write();
        let mut touched = HashSet::with_capacity(keys.len());
        for key in keys {
            guard
                .txns_by_addr
                .entry(key)
                .or_default()
                .insert(tx_hash, tx.clone());
            touched.insert(key);
        }
        guard.addrs_by_tx.insert(tx_hash, touched);
        Ok(())
    }

    /// §4.6 `removeUnconfirmed` — drop `tx_hash` from every address it
    /// was indexed under, then forget the reverse mapping.
    pub fn remove_unconfirmed(&self, tx_hash: &TxHash) {
        let mut guard = self.inner.write();
        let Some(addrs) = guard.addrs_by_tx.remove(tx_hash) else {
            return;
        };
        for addr in addrs {
            if let Some(inner_map) = guard.txns_by_addr.get_mut(&addr) {
                inner_map.remove(tx_hash);
                if inner_map.is_empty() {
                    guard.txns_by_addr.remove(&addr);
                }
            }
        }
    }

    /// §4.6 `unconfirmedFor` — a fresh copy of every unconfirmed
    /// transaction indexed under `addr`'s canonical key. Iteration order
    /// of the source map is unspecified per §4.6; callers must not rely
    /// on an ordering.
    pub fn unconfirmed_for_key(&self, addr: &AddrKey) -> Vec<Tx> {
        let guard = self.inner.read();
        guard
            .txns_by_addr
            .get(addr)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Same as [`Self::unconfirmed_for_key`], but classifies a decoded
    /// address first (§4.4); unsupported addresses simply have no
    /// unconfirmed transactions.
    pub fn unconfirmed_for(
        &self,
        addr: &crate::address::Address,
        hash160: impl Fn(&[u8]) -> [u8; 20],
    ) -> Vec<Tx> {
        match classify(addr, hash160) {
            Ok(key) => self.unconfirmed_for_key(&key),
            Err(_) => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().addrs_by_tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;
    use crate::block_indexer::{OutPoint, TxOutput};
    use std::collections::HashMap as StdHashMap;

    struct FixturePrevScripter {
        scripts: StdHashMap<OutPoint, (u16, Vec<u8>)>,
    }

    impl PrevScripter for FixturePrevScripter {
        fn prev_script(&self, outpoint: &OutPoint) -> Option<(u16, Vec<u8>)> {
            self.scripts.get(outpoint).cloned()
        }
    }

    struct FixtureExtractor;

    impl AddressExtractor for FixtureExtractor {
        fn extract(&self, _sv: u16, script: &[u8], _treasury_enabled: bool) -> Vec<Address> {
            if script.is_empty() {
                return vec![];
            }
            vec![Address::EcdsaPubKeyHash(self.hash160(script))]
        }

        fn extract_ticket_commitment(&self, _script: &[u8]) -> Option<Address> {
            None
        }

        fn hash160(&self, data: &[u8]) -> [u8; 20] {
            let mut out = [0u8; 20];
            out[0] = data.first().copied().unwrap_or(0);
            out
        }
    }

    #[derive(Clone, Debug, PartialEq)]
    struct FixtureTx(u32);

    #[test]
    fn add_then_query_returns_the_indexed_transaction() {
        let mirror: UnconfirmedMirror<FixtureTx> = UnconfirmedMirror::new();
        let prev = FixturePrevScripter {
            scripts: StdHashMap::new(),
        };
        let extractor = FixtureExtractor;

        let tx = Transaction {
            inputs: vec![],
            outputs: vec![TxOutput {
                script_version: 0,
                pk_script: vec![0xaa],
            }],
        };

        mirror
            .add_unconfirmed([1; 32], FixtureTx(1), &tx, None, &prev, &extractor, false)
            .unwrap();

        let addr = Address::EcdsaPubKeyHash(extractor.hash160(&[0xaa]));
        let found = mirror.unconfirmed_for(&addr, |b| extractor.hash160(b));
        assert_eq!(found, vec![FixtureTx(1)]);
    }

    #[test]
    fn remove_unconfirmed_clears_both_directions() {
        let mirror: UnconfirmedMirror<FixtureTx> = UnconfirmedMirror::new();
        let prev = FixturePrevScripter {
            scripts: StdHashMap::new(),
        };
        let extractor = FixtureExtractor;

        let tx = Transaction {
            inputs: vec![],
            outputs: vec![TxOutput {
                script_version: 0,
                pk_script: vec![0xbb],
            }],
        };
        mirror
            .add_unconfirmed([2; 32], FixtureTx(2), &tx, None, &prev, &extractor, false)
            .unwrap();
        assert_eq!(mirror.len(), 1);

        mirror.remove_unconfirmed(&[2; 32]);
        assert_eq!(mirror.len(), 0);

        let addr = Address::EcdsaPubKeyHash(extractor.hash160(&[0xbb]));
        assert!(mirror.unconfirmed_for(&addr, |b| extractor.hash160(b)).is_empty());
    }

    #[test]
    fn two_transactions_sharing_an_address_both_survive_independent_removal() {
        let mirror: UnconfirmedMirror<FixtureTx> = UnconfirmedMirror::new();
        let prev = FixturePrevScripter {
            scripts: StdHashMap::new(),
        };
        let extractor = FixtureExtractor;

        let tx_a = Transaction {
            inputs: vec![],
            outputs: vec![TxOutput {
                script_version: 0,
                pk_script: vec![0xcc],
            }],
        };
        let tx_b = tx_a.clone();

        mirror
            .add_unconfirmed([3; 32], FixtureTx(3), &tx_a, None, &prev, &extractor, false)
            .unwrap();
        mirror
            .add_unconfirmed([4; 32], FixtureTx(4), &tx_b, None, &prev, &extractor, false)
            .unwrap();

        let addr = Address::EcdsaPubKeyHash(extractor.hash160(&[0xcc]));
        assert_eq!(mirror.unconfirmed_for(&addr, |b| extractor.hash160(b)).len(), 2);

        mirror.remove_unconfirmed(&[3; 32]);
        let remaining = mirror.unconfirmed_for(&addr, |b| extractor.hash160(b));
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0], FixtureTx(4));
    }
}
