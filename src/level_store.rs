//! C3 — the level-based per-address storage engine.
//!
//! This is the hard core described in the component design: a
//! log-structured-merge-style cascade that packs a growing ordered
//! sequence of fixed-size entries into a handful of database keys per
//! address. See the module's three entry points: [`append`], [`fetch`],
//! [`remove`].
//!
//! Level `L` holds at most `8 * 2^L` entries (`max_entries_for_level`).
//! Entries within a level are stored oldest-first; across levels, the
//! logical oldest-to-newest order is the highest populated level down
//! to level 0 (§3 invariant 4). A non-empty level `L >= 1` implies every
//! level below it is completely full (§3 invariant 3) — that single
//! fact is what makes both the cascade and the rebalance below
//! tractable.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::bucket::Bucket;
use crate::entry::{DecodedEntry, Entry, ENTRY_SIZE};
use crate::error::{IndexError, Result};
use crate::keys::AddrKey;
use crate::metrics::{
    CASCADE_PROMOTIONS, CORRUPT_LEVELS_DETECTED, ENTRIES_APPENDED, ENTRIES_REMOVED,
    REBALANCE_BACKFILLS, Timer,
};

/// Capacity of level `l`: `8 * 2^l`.
pub fn max_entries_for_level(l: u32) -> u64 {
    8u64 * (1u64 << l)
}

/// Minimum total entries an address must hold before level `l` can
/// legally be non-empty: `1 + sum_{k=0}^{l-1} max_entries_for_level(k)`.
pub fn min_entries_to_reach_level(l: u32) -> u64 {
    1 + 8 * ((1u64 << l) - 1)
}

fn entries_in(bytes: &[u8]) -> u64 {
    (bytes.len() / ENTRY_SIZE) as u64
}

/// Like [`entries_in`], but rejects a level whose length isn't a whole
/// number of entries — a sign the stored value is corrupt rather than
/// merely short.
fn entries_in_checked(bytes: &[u8]) -> Result<u64> {
    if bytes.len() % ENTRY_SIZE != 0 {
        CORRUPT_LEVELS_DETECTED.inc();
        return Err(IndexError::Corruption(format!(
            "level value length {} is not a multiple of the entry size",
            bytes.len()
        )));
    }
    Ok(entries_in(bytes))
}

fn read_level(bucket: &dyn Bucket, addr: &AddrKey, level: u8) -> Result<Vec<u8>> {
    Ok(bucket.get(&addr.level_key(level))?.unwrap_or_default())
}

fn write_level(bucket: &dyn Bucket, addr: &AddrKey, level: u8, data: &[u8]) -> Result<()> {
    if data.is_empty() {
        bucket.delete(&addr.level_key(level))
    } else {
        bucket.put(&addr.level_key(level), data)
    }
}

/// C3.4.3.1 — append a single entry, cascading full levels upward.
pub fn append(bucket: &dyn Bucket, addr: &AddrKey, entry: Entry) -> Result<()> {
    let new_data = entry.encode();

    let l0 = read_level(bucket, addr, 0)?;
    let l0_capacity = (max_entries_for_level(0) * ENTRY_SIZE as u64) as usize;
    if l0.len() + ENTRY_SIZE <= l0_capacity {
        let mut merged = l0;
        merged.extend_from_slice(&new_data);
        write_level(bucket, addr, 0, &merged)?;
        ENTRIES_APPENDED.inc();
        return Ok(());
    }

    trace!(addr_type = addr.addr_type, "level 0 full, cascading");
    let cascade_timer = Timer::new();

    let mut prev = l0;
    let mut level: u32 = 1;
    loop {
        let level_u8 = level as u8;
        let cur = read_level(bucket, addr, level_u8)?;
        let capacity_entries = max_entries_for_level(level);
        if entries_in(&cur) == capacity_entries {
            // Full: absorb into `prev` and keep climbing.
            prev = cur;
            level += 1;
            continue;
        }

        // First non-full level: everything below it is full (invariant
        // 3), so `prev` here holds exactly that (level - 1)'s full
        // contents, read before any mutation took place this call.
        let mut merged = cur;
        merged.extend_from_slice(&prev);
        write_level(bucket, addr, level_u8, &merged)?;

        // Promote each intermediate full level up by one. These reads
        // must happen against the bucket's pre-mutation state; since
        // every level below `level` was already read during the climb
        // above, and nothing below `level` has been written yet, a
        // fresh read here still observes the original data (§9 open
        // question).
        for m in (1..level).rev() {
            let lower = read_level(bucket, addr, (m - 1) as u8)?;
            write_level(bucket, addr, m as u8, &lower)?;
        }

        CASCADE_PROMOTIONS.inc();
        debug!(
            addr_type = addr.addr_type,
            promoted_to = level,
            elapsed_secs = cascade_timer.elapsed_secs(),
            "cascade complete"
        );
        break;
    }

    write_level(bucket, addr, 0, &new_data)?;
    ENTRIES_APPENDED.inc();
    Ok(())
}

/// C3.4.3.2 — windowed ordered fetch.
///
/// `resolve_hash` maps a stored `blockId` to the caller's hash type (see
/// [`Entry::decode`]).
pub fn fetch<H, F>(
    bucket: &dyn Bucket,
    addr: &AddrKey,
    skip: u64,
    want: u64,
    reverse: bool,
    mut resolve_hash: F,
) -> Result<(Vec<DecodedEntry<H>>, u64)>
where
    F: FnMut(u32) -> H,
{
    let mut acc: Vec<u8> = Vec::new();
    let mut level: u8 = 0;
    loop {
        let data = read_level(bucket, addr, level)?;
        if data.is_empty() {
            break;
        }
        if data.len() % ENTRY_SIZE != 0 {
            return Err(IndexError::Corruption(format!(
                "level {level} value length {} is not a multiple of the entry size",
                data.len()
            )));
        }
        let mut merged = data;
        merged.extend_from_slice(&acc);
        acc = merged;

        if reverse {
            let loaded = entries_in(&acc);
            if loaded >= skip + want {
                break;
            }
        }

        level = match level.checked_add(1) {
            Some(l) => l,
            None => break,
        };
    }

    let n = entries_in(&acc);
    if skip >= n {
        return Ok((Vec::new(), n));
    }
    if want == 0 {
        return Ok((Vec::new(), skip));
    }

    let load = want.min(n - skip);
    let mut entries = Vec::with_capacity(load as usize);
    for i in 0..load {
        let offset = if reverse {
            ((n - skip - i - 1) * ENTRY_SIZE as u64) as usize
        } else {
            ((skip + i) * ENTRY_SIZE as u64) as usize
        };
        let raw = &acc[offset..offset + ENTRY_SIZE];
        let decoded = Entry::decode(raw, &mut resolve_hash)?;
        entries.push(decoded);
    }

    Ok((entries, skip))
}

/// C3.4.3.3 — delete the newest `count` entries and restore level
/// invariants.
pub fn remove(bucket: &dyn Bucket, addr: &AddrKey, mut count: u64) -> Result<()> {
    if count == 0 {
        return Ok(());
    }

    let total = total_entries(bucket, addr)?;
    if count > total {
        return Err(IndexError::Assert("not enough entries".to_string()));
    }
    ENTRIES_REMOVED.inc_by(count);
    let rebalance_timer = Timer::new();

    let mut scratch: HashMap<u8, Vec<u8>> = HashMap::new();
    let mut highest_loaded_level: u8 = 0;

    // Phase A: remove from the bottom up.
    let mut level: u8 = 0;
    loop {
        let data = read_level(bucket, addr, level)?;
        let n = entries_in_checked(&data)?;
        highest_loaded_level = level;

        if count >= n {
            scratch.insert(level, Vec::new());
            count -= n;
        } else {
            let keep_entries = n - count;
            let keep_bytes = (keep_entries * ENTRY_SIZE as u64) as usize;
            scratch.insert(level, data[..keep_bytes].to_vec());
            count = 0;
        }

        if count == 0 {
            break;
        }
        level = level
            .checked_add(1)
            .ok_or_else(|| IndexError::Assert("level overflow during removal".to_string()))?;
    }

    // Phase B: short-circuit if level 0 still holds data.
    let level0_len = scratch.get(&0).map(|d| d.len()).unwrap_or(0);
    if level0_len > 0 {
        return flush(bucket, addr, scratch);
    }

    // Phase C: squash the top loaded level into the levels below it.
    let mut carry: Vec<u8> = Vec::new();
    if highest_loaded_level > 0 {
        carry = scratch.get(&highest_loaded_level).cloned().unwrap_or_default();
        carry = split_down(carry, highest_loaded_level, &mut scratch);
    }
    scratch.insert(0, carry);

    // Phase D: backfill from above if the top of the squash left a gap.
    let top_is_empty = scratch
        .get(&highest_loaded_level)
        .map(|d| d.is_empty())
        .unwrap_or(true);
    if top_is_empty {
        REBALANCE_BACKFILLS.inc();
        backfill_from_above(bucket, addr, &mut scratch, highest_loaded_level)?;
    }

    debug!(
        addr_type = addr.addr_type,
        highest_loaded_level,
        elapsed_secs = rebalance_timer.elapsed_secs(),
        "remove rebalanced"
    );

    flush(bucket, addr, scratch)
}

/// Split `carry` (oldest-first bytes that need to land somewhere at or
/// below level `from`) down through levels `from, from-1, ..., 1`,
/// writing each level's new assignment into `scratch` using the
/// full/half-full/empty rule of §4.3.3 Phase C, then hand back whatever
/// remains to be placed at level 0 (guaranteed to fit, `<= M_0`).
fn split_down(carry: Vec<u8>, from: u8, scratch: &mut HashMap<u8, Vec<u8>>) -> Vec<u8> {
    let mut carry = carry;
    for l in (1..=from).rev() {
        let l_u32 = l as u32;
        let max_here = max_entries_for_level(l_u32);
        let max_prev = max_entries_for_level(l_u32 - 1);
        let min_reach_prev = min_entries_to_reach_level(l_u32 - 1);

        let n = entries_in(&carry);
        if n < max_prev + min_reach_prev {
            // Can't legally remain non-empty at this level.
            scratch.insert(l, Vec::new());
            // carry unchanged, falls further down.
        } else {
            let take = if n >= max_here + min_reach_prev {
                max_here
            } else {
                max_prev
            };
            let take_bytes = (take * ENTRY_SIZE as u64) as usize;
            scratch.insert(l, carry[..take_bytes].to_vec());
            carry = carry[take_bytes..].to_vec();
        }
    }
    carry
}

/// Restore the invariant above a level that Phase C left empty.
///
/// A level directly above `highest_loaded_level` may still hold data
/// that's now illegally floating (a non-empty level with an empty one
/// beneath it). Pull that level's content down, merge it with whatever
/// is already sitting at `highest_loaded_level` and below (undoing
/// Phase C's placement for those levels), and re-run the same
/// full/half split over the combined pool from the top down — this is
/// what keeps the fix total rather than losing the remainder after one
/// level: nothing is ever discarded, it's always re-merged into the
/// carry before the next split.
///
/// Clearing the probed level can itself open a new gap if yet another
/// level above it was floating on top of *that* one, so the whole
/// merge-and-split step repeats against the next level up until a
/// probe finds nothing there (§4.3.3 Phase D, "repeat until stable").
fn backfill_from_above(
    bucket: &dyn Bucket,
    addr: &AddrKey,
    scratch: &mut HashMap<u8, Vec<u8>>,
    highest_loaded_level: u8,
) -> Result<()> {
    let mut vacated_level = highest_loaded_level;
    loop {
        let probe = match vacated_level.checked_add(1) {
            Some(p) => p,
            None => return Ok(()),
        };

        let above = load_with_scratch(bucket, addr, probe, scratch)?;
        if above.is_empty() {
            return Ok(());
        }
        scratch.insert(probe, Vec::new());

        // Re-absorb everything currently assigned from `vacated_level`
        // down to level 0 into one oldest-first pool, with the newly
        // probed (older) data leading it.
        let mut carry = above;
        for l in (0..=vacated_level).rev() {
            let existing = scratch.remove(&l).unwrap_or_default();
            carry.extend_from_slice(&existing);
        }

        let remainder = split_down(carry, vacated_level, scratch);
        scratch.insert(0, remainder);

        vacated_level = probe;
    }
}

fn load_with_scratch(
    bucket: &dyn Bucket,
    addr: &AddrKey,
    level: u8,
    scratch: &HashMap<u8, Vec<u8>>,
) -> Result<Vec<u8>> {
    if let Some(data) = scratch.get(&level) {
        return Ok(data.clone());
    }
    let data = read_level(bucket, addr, level)?;
    entries_in_checked(&data)?;
    Ok(data)
}

fn flush(bucket: &dyn Bucket, addr: &AddrKey, scratch: HashMap<u8, Vec<u8>>) -> Result<()> {
    for (level, data) in scratch {
        write_level(bucket, addr, level, &data)?;
    }
    Ok(())
}

/// Sum of entries across every populated level, stopping at the first
/// empty one (§4.3.2's "load all levels until the first empty one").
pub fn total_entries(bucket: &dyn Bucket, addr: &AddrKey) -> Result<u64> {
    let mut total = 0u64;
    let mut level: u8 = 0;
    loop {
        let data = read_level(bucket, addr, level)?;
        if data.is_empty() {
            break;
        }
        total += entries_in_checked(&data)?;
        level = match level.checked_add(1) {
            Some(l) => l,
            None => break,
        };
    }
    Ok(total)
}

/// Entry counts per level, for invariant assertions in tests and
/// diagnostics.
pub fn level_entry_counts(bucket: &dyn Bucket, addr: &AddrKey) -> Result<Vec<u64>> {
    let mut counts = Vec::new();
    let mut level: u8 = 0;
    loop {
        let data = read_level(bucket, addr, level)?;
        if data.is_empty() {
            break;
        }
        counts.push(entries_in_checked(&data)?);
        level = match level.checked_add(1) {
            Some(l) => l,
            None => break,
        };
    }
    Ok(counts)
}
