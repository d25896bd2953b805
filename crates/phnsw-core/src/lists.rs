//! Bounded sorted lists and scan kernels
//!
//! The candidate (C) and wait (W) lists are parallel `dist`/`index` arrays
//! plus a size register. For `0..size` the distances are non-decreasing and
//! every slot at or beyond `size` is zero.

use crate::error::{PhnswError, Result};
use phnsw_chip::catalog::{CANDIDATE_CAPACITY, LOOKUP_LIST_LEN, WAIT_CAPACITY};
use phnsw_chip::isa::Opcode;

/// Which bounded list an instruction targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListId {
    /// Candidate list
    Candidate,
    /// Wait list
    Wait,
}

impl ListId {
    /// Parse the `C` / `W` target token of PUSH
    ///
    /// # Errors
    ///
    /// Returns `UnknownMode` for any other token.
    pub fn from_token(opcode: &'static str, token: &str) -> Result<Self> {
        match token {
            "C" => Ok(Self::Candidate),
            "W" => Ok(Self::Wait),
            other => Err(PhnswError::unknown_mode(opcode, other)),
        }
    }

    /// Distance array register
    pub const fn dist_reg(self) -> &'static str {
        match self {
            Self::Candidate => "C_dist",
            Self::Wait => "W_dist",
        }
    }

    /// Node-index array register
    pub const fn index_reg(self) -> &'static str {
        match self {
            Self::Candidate => "C_index",
            Self::Wait => "W_index",
        }
    }

    /// Size register
    pub const fn size_reg(self) -> &'static str {
        match self {
            Self::Candidate => "C_size",
            Self::Wait => "W_size",
        }
    }

    /// Fixed capacity
    pub const fn capacity(self) -> usize {
        match self {
            Self::Candidate => CANDIDATE_CAPACITY,
            Self::Wait => WAIT_CAPACITY,
        }
    }

    /// Opcode that removes from this list
    pub const fn remover(self) -> Opcode {
        match self {
            Self::Candidate => Opcode::Rmc,
            Self::Wait => Opcode::Rmw,
        }
    }
}

/// Size register value as a slot count, bounded by the list capacity.
///
/// # Errors
///
/// Returns `CapacityExceeded` when `size` is larger than the list can hold.
pub fn checked_size(list: ListId, size: u32) -> Result<usize> {
    match usize::try_from(size) {
        Ok(n) if n <= list.capacity() => Ok(n),
        _ => Err(PhnswError::CapacityExceeded {
            list: list.size_reg(),
            capacity: list.capacity(),
        }),
    }
}

/// How RMC/RMW interpret their `idx` operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveMode {
    /// `idx` is a slot number
    Position,
    /// `idx` is a node index to search for
    NodeIndex,
}

impl RemoveMode {
    /// Parse the mode token; `own` is the list letter (`C` or `W`)
    ///
    /// # Errors
    ///
    /// Returns `UnknownMode` for any other token.
    pub fn from_token(opcode: &'static str, own: &str, token: &str) -> Result<Self> {
        if token == own {
            Ok(Self::Position)
        } else if token == "R" {
            Ok(Self::NodeIndex)
        } else {
            Err(PhnswError::unknown_mode(opcode, token))
        }
    }
}

/// LOOK direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookMode {
    /// Largest distance
    Max,
    /// Smallest distance
    Min,
}

impl LookMode {
    /// Parse `MAX` / `MIN`
    ///
    /// # Errors
    ///
    /// Returns `UnknownMode` for any other token.
    pub fn from_token(token: &str) -> Result<Self> {
        match token {
            "MAX" => Ok(Self::Max),
            "MIN" => Ok(Self::Min),
            other => Err(PhnswError::unknown_mode("LOOK", other)),
        }
    }
}

/// Sorted insert of `(dist, index)` into the first `size` entries.
///
/// Returns the slot the pair landed in.
///
/// # Errors
///
/// Returns `CapacityExceeded` when `size` already equals the capacity.
pub fn insert_sorted(
    list: ListId,
    dists: &mut [u32],
    indices: &mut [u32],
    size: usize,
    dist: u32,
    index: u32,
) -> Result<usize> {
    let capacity = list.capacity().min(dists.len()).min(indices.len());
    if size >= capacity {
        return Err(PhnswError::CapacityExceeded {
            list: list.size_reg(),
            capacity: list.capacity(),
        });
    }

    let pos = dists[..size].iter().position(|&d| d >= dist).unwrap_or(size);
    dists.copy_within(pos..size, pos + 1);
    indices.copy_within(pos..size, pos + 1);
    dists[pos] = dist;
    indices[pos] = index;
    Ok(pos)
}

/// Slot to remove, or `None` when nothing matches.
pub fn find_removal(indices: &[u32], size: usize, mode: RemoveMode, idx: u32) -> Option<usize> {
    let size = size.min(indices.len());
    match mode {
        RemoveMode::Position => usize::try_from(idx).ok().filter(|&p| p < size),
        RemoveMode::NodeIndex => indices[..size].iter().position(|&i| i == idx),
    }
}

/// Delete slot `pos` of `size`, shifting later entries left and zeroing the
/// vacated tail slot. Returns the removed `(dist, index)` pair.
pub fn remove_at(dists: &mut [u32], indices: &mut [u32], size: usize, pos: usize) -> (u32, u32) {
    let removed = (dists[pos], indices[pos]);
    dists.copy_within(pos + 1..size, pos);
    indices.copy_within(pos + 1..size, pos);
    dists[size - 1] = 0;
    indices[size - 1] = 0;
    removed
}

/// Number of lookup entries scanned for a given `target` value.
pub fn look_span(target: u32) -> usize {
    match usize::try_from(target) {
        Ok(n) if (1..=LOOKUP_LIST_LEN).contains(&n) => n,
        _ => LOOKUP_LIST_LEN,
    }
}

/// Extremal distance over `dists`, paired with the index at its first
/// occurrence. Returns `(index, dist)`.
pub fn look(dists: &[u32], indices: &[u32], mode: LookMode) -> (u32, u32) {
    let mut best: Option<(usize, u32)> = None;
    for (pos, &d) in dists.iter().enumerate() {
        let better = match (best, mode) {
            (None, _) => true,
            (Some((_, b)), LookMode::Max) => d > b,
            (Some((_, b)), LookMode::Min) => d < b,
        };
        if better {
            best = Some((pos, d));
        }
    }
    best.map_or((0, 0), |(pos, d)| (indices.get(pos).copied().unwrap_or(0), d))
}

/// Sum of squared element differences, accumulated in `f32` and truncated.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn squared_distance(a: &[u8], b: &[u8]) -> u32 {
    let sum: f32 = a
        .iter()
        .zip(b)
        .map(|(&x, &y)| {
            let d = f32::from(x) - f32::from(y);
            d * d
        })
        .sum();
    sum as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    // xorshift so the property test is deterministic
    fn sequence(seed: u32, n: usize) -> Vec<u32> {
        let mut x = seed;
        (0..n)
            .map(|_| {
                x ^= x << 13;
                x ^= x >> 17;
                x ^= x << 5;
                x % 50
            })
            .collect()
    }

    #[test]
    fn push_keeps_prefix_sorted() {
        let mut dists = [0u32; CANDIDATE_CAPACITY];
        let mut indices = [0u32; CANDIDATE_CAPACITY];
        for (size, d) in sequence(0x9E37_79B9, CANDIDATE_CAPACITY).into_iter().enumerate() {
            insert_sorted(ListId::Candidate, &mut dists, &mut indices, size, d, d + 1000).unwrap();
            assert!(dists[..=size].windows(2).all(|w| w[0] <= w[1]));
            assert!(dists[size + 1..].iter().all(|&d| d == 0));
        }
        let err = insert_sorted(ListId::Candidate, &mut dists, &mut indices, CANDIDATE_CAPACITY, 1, 1);
        assert!(matches!(err, Err(PhnswError::CapacityExceeded { capacity: 60, .. })));
    }

    #[test]
    fn equal_distance_goes_before_existing() {
        let mut dists = [0u32; WAIT_CAPACITY];
        let mut indices = [0u32; WAIT_CAPACITY];
        insert_sorted(ListId::Wait, &mut dists, &mut indices, 0, 5, 1).unwrap();
        insert_sorted(ListId::Wait, &mut dists, &mut indices, 1, 9, 2).unwrap();
        let pos = insert_sorted(ListId::Wait, &mut dists, &mut indices, 2, 5, 3).unwrap();
        assert_eq!(pos, 0);
        assert_eq!(&dists[..3], &[5, 5, 9]);
        assert_eq!(&indices[..3], &[3, 1, 2]);
    }

    #[test]
    fn removal_compacts() {
        let mut dists = [0u32; WAIT_CAPACITY];
        let mut indices = [0u32; WAIT_CAPACITY];
        dists[..5].copy_from_slice(&[1, 2, 3, 4, 5]);
        indices[..5].copy_from_slice(&[10, 20, 30, 40, 50]);
        let before = dists;

        let pos = find_removal(&indices, 5, RemoveMode::NodeIndex, 30).unwrap();
        assert_eq!(pos, 2);
        assert_eq!(remove_at(&mut dists, &mut indices, 5, pos), (3, 30));
        assert_eq!(&dists[..5], &[1, 2, 4, 5, 0]);
        assert_eq!(&indices[..5], &[10, 20, 40, 50, 0]);
        assert_eq!(&dists[..2], &before[..2]);
        assert_eq!(&dists[2..4], &before[3..5]);
    }

    #[test]
    fn removal_misses() {
        let indices = [10u32, 20, 0, 0];
        assert_eq!(find_removal(&indices, 2, RemoveMode::NodeIndex, 99), None);
        assert_eq!(find_removal(&indices, 2, RemoveMode::Position, 2), None);
        assert_eq!(find_removal(&indices, 0, RemoveMode::NodeIndex, 0), None);
        assert_eq!(find_removal(&indices, 2, RemoveMode::Position, 1), Some(1));
    }

    #[test]
    fn remove_last_slot() {
        let mut dists = [7u32, 8, 0];
        let mut indices = [1u32, 2, 0];
        assert_eq!(remove_at(&mut dists, &mut indices, 2, 1), (8, 2));
        assert_eq!(dists, [7, 0, 0]);
        assert_eq!(indices, [1, 0, 0]);
    }

    #[test]
    fn size_register_is_bounded_by_capacity() {
        assert_eq!(checked_size(ListId::Wait, 0).unwrap(), 0);
        assert_eq!(checked_size(ListId::Wait, 40).unwrap(), 40);
        assert!(matches!(
            checked_size(ListId::Wait, 41),
            Err(PhnswError::CapacityExceeded { list: "W_size", capacity: 40 })
        ));
        assert!(checked_size(ListId::Candidate, u32::MAX).is_err());
        assert_eq!(ListId::Candidate.remover(), Opcode::Rmc);
        assert_eq!(ListId::Wait.remover(), Opcode::Rmw);
    }

    #[test]
    fn look_tie_break() {
        let dists = [5u32, 5, 3];
        let indices = [10u32, 20, 30];
        assert_eq!(look(&dists, &indices, LookMode::Min), (30, 3));
        assert_eq!(look(&dists, &indices, LookMode::Max), (10, 5));
        assert_eq!(look(&[], &[], LookMode::Max), (0, 0));
    }

    #[test]
    fn look_span_bounds() {
        assert_eq!(look_span(3), 3);
        assert_eq!(look_span(0), LOOKUP_LIST_LEN);
        assert_eq!(look_span(11), LOOKUP_LIST_LEN);
        assert_eq!(look_span(10), 10);
    }

    #[test]
    fn distance_contract() {
        let mut a = [0u8; 128];
        let b = [0u8; 128];
        a[0] = 1;
        assert_eq!(squared_distance(&a, &b), 1);
        assert_eq!(squared_distance(&a, &a), 0);
        assert_eq!(squared_distance(&[255; 128], &b), 255 * 255 * 128);
        assert_eq!(squared_distance(&[0, 3], &[4, 0]), 25);
    }

    #[test]
    fn mode_tokens() {
        assert_eq!(ListId::from_token("PUSH", "W").unwrap(), ListId::Wait);
        assert!(matches!(ListId::from_token("PUSH", "X"), Err(PhnswError::UnknownMode { .. })));
        assert_eq!(RemoveMode::from_token("RMC", "C", "C").unwrap(), RemoveMode::Position);
        assert_eq!(RemoveMode::from_token("RMW", "W", "R").unwrap(), RemoveMode::NodeIndex);
        assert!(RemoveMode::from_token("RMW", "W", "C").is_err());
        assert!(LookMode::from_token("MEAN").is_err());
    }
}
