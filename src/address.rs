//! C4 — address classifier.
//!
//! Canonicalises a *decoded* address variant into the 21-byte key the
//! level store indexes by. Script parsing and address decoding
//! themselves are out of scope (§1): this module only ever sees the
//! already-decoded variant an external address decoder hands it.
//!
//! Re-architected per §9's redesign flag as a closed sum type rather
//! than dynamic dispatch over an address trait hierarchy — the shape
//! (a fixed set of script-derived variants) stays the same, but the
//! payload is the raw `hash160` rather than a base58-encoded string,
//! since encoding is a presentation concern the level store never
//! touches.

use crate::error::{IndexError, Result};
use crate::keys::AddrKey;

/// Address type codes as laid out on disk (§3, §6).
pub const ADDR_TYPE_ECDSA: u8 = 0;
pub const ADDR_TYPE_ED25519: u8 = 1;
pub const ADDR_TYPE_SCHNORR: u8 = 2;
pub const ADDR_TYPE_SCRIPT_HASH: u8 = 3;

/// A decoded on-chain address, in the canonical form the index stores.
///
/// `Other` covers every variant the index doesn't carry a slot for
/// (shielded outputs, zerocoin mints, anything the external decoder
/// recognises but this index has no addr_type for) and always
/// classifies as [`IndexError::UnsupportedAddress`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    EcdsaPubKeyHash([u8; 20]),
    Ed25519PubKeyHash([u8; 20]),
    SchnorrPubKeyHash([u8; 20]),
    ScriptHash([u8; 20]),
    /// A raw public key rather than its hash — folded into pubkey-hash
    /// form by [`AsPubKeyHash::to_pubkey_hash`] before classification.
    EcdsaPubKey([u8; 33]),
    Other,
}

/// Capability trait for variants that carry (or can derive) a
/// pubkey-hash form. Pay-to-pubkey addresses are stored under the
/// hash160 of their key (§4.4 step 1, §6 "Pay-to-pubkey forms are
/// stored under the pubkey-hash of their key").
pub trait AsPubKeyHash {
    /// Project this variant onto its pubkey-hash form, when it has one.
    fn to_pubkey_hash(&self, hash160: impl Fn(&[u8]) -> [u8; 20]) -> Address;
}

impl AsPubKeyHash for Address {
    fn to_pubkey_hash(&self, hash160: impl Fn(&[u8]) -> [u8; 20]) -> Address {
        match self {
            Address::EcdsaPubKey(pubkey) => Address::EcdsaPubKeyHash(hash160(pubkey)),
            other => other.clone(),
        }
    }
}

/// Classify a decoded address into its canonical 21-byte key.
///
/// Raw-pubkey variants are projected to pubkey-hash form first (§4.4
/// step 1). Unsupported variants return [`IndexError::UnsupportedAddress`]
/// — callers treat that as a skip, never a hard failure (§4.4 step 3).
pub fn classify(addr: &Address, hash160: impl Fn(&[u8]) -> [u8; 20]) -> Result<AddrKey> {
    let projected = addr.to_pubkey_hash(hash160);
    match projected {
        Address::EcdsaPubKeyHash(h) => Ok(AddrKey::new(ADDR_TYPE_ECDSA, h)),
        Address::Ed25519PubKeyHash(h) => Ok(AddrKey::new(ADDR_TYPE_ED25519, h)),
        Address::SchnorrPubKeyHash(h) => Ok(AddrKey::new(ADDR_TYPE_SCHNORR, h)),
        Address::ScriptHash(h) => Ok(AddrKey::new(ADDR_TYPE_SCRIPT_HASH, h)),
        Address::EcdsaPubKey(_) | Address::Other => Err(IndexError::UnsupportedAddress),
    }
}
