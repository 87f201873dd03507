//! C2 — address and level key layout.
//!
//! Address key: `addrType:1 | hash160:20` (21 bytes).
//! Level key: address key || level (22 bytes) — level is always the last
//! byte, consistent across every caller.

pub const ADDR_KEY_SIZE: usize = 21;
pub const LEVEL_KEY_SIZE: usize = 22;

/// Canonical 21-byte address key: `addrType | hash160`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddrKey {
    pub addr_type: u8,
    pub hash160: [u8; 20],
}

impl AddrKey {
    pub fn new(addr_type: u8, hash160: [u8; 20]) -> Self {
        Self { addr_type, hash160 }
    }

    pub fn to_bytes(&self) -> [u8; ADDR_KEY_SIZE] {
        let mut out = [0u8; ADDR_KEY_SIZE];
        out[0] = self.addr_type;
        out[1..].copy_from_slice(&self.hash160);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != ADDR_KEY_SIZE {
            return None;
        }
        let mut hash160 = [0u8; 20];
        hash160.copy_from_slice(&bytes[1..]);
        Some(Self {
            addr_type: bytes[0],
            hash160,
        })
    }

    /// Build the 22-byte level key for this address at the given level.
    pub fn level_key(&self, level: u8) -> [u8; LEVEL_KEY_SIZE] {
        let mut out = [0u8; LEVEL_KEY_SIZE];
        out[..ADDR_KEY_SIZE].copy_from_slice(&self.to_bytes());
        out[ADDR_KEY_SIZE] = level;
        out
    }
}

/// Free function form, matching the component design's `levelKey(addr, level)`.
pub fn level_key(addr: &AddrKey, level: u8) -> [u8; LEVEL_KEY_SIZE] {
    addr.level_key(level)
}
