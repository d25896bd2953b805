//! Scratchpad and backing-memory address layout.
//!
//! The accelerator sees one flat address space: the scratchpad (SPM) occupies
//! `[0, MEM_ADDR_BASE)` and backing memory starts at [`MEM_ADDR_BASE`].
//! Offsets of the memory regions are relative to that base.
//!
//! ```text
//! SPM     0x000  neighbor list of the current node   (0x80 bytes)
//!         0x080  raw vector slots                     (7 × 128 bytes)
//! MEM     0x400 + 0x000000  neighbor lists   10 000 × 128 B
//!         0x400 + 0x138800  raw vectors      10 000 × 128 B
//!         0x400 + 0x271000  visited bitmap   1 bit per node
//! ```

use crate::catalog::{NEIGHBOR_LIST_LEN, RAW_VECTOR_LEN};

// ── Scratchpad ───────────────────────────────────────────────────────────────

/// Neighbor-list region in SPM.
pub const SPM_NEIGHBOR_ADDR: u64 = 0x0;
/// Size of the SPM neighbor-list region: 32 entries × 4 bytes.
pub const SPM_NEIGHBOR_SIZE: u64 = 0x80;
/// First raw-vector slot in SPM.
pub const SPM_RAW_BASE: u64 = SPM_NEIGHBOR_SIZE;

// ── Backing memory ───────────────────────────────────────────────────────────

/// Base of backing memory in the flat address space (= scratchpad size).
pub const MEM_ADDR_BASE: u64 = 0x400;
/// Neighbor-list region offset in backing memory.
pub const MEM_NEIGHBOR_ADDR: u64 = 0x0;
/// Neighbor-list region size in backing memory.
pub const MEM_NEIGHBOR_SIZE: u64 = 1_280_000;
/// Raw-vector region offset in backing memory.
pub const MEM_RAW_BASE: u64 = 0x13_8800;
/// Visited bitmap offset in backing memory, right after the raw region.
pub const MEM_VISITED_BASE: u64 = 0x27_1000;

/// Bytes in one raw vector record.
pub const RAW_VECTOR_BYTES: u64 = RAW_VECTOR_LEN as u64;
/// Bytes in one neighbor list record.
pub const NEIGHBOR_LIST_BYTES: u64 = (NEIGHBOR_LIST_LEN * 4) as u64;
/// Nodes addressable by the memory layout.
pub const NODE_COUNT: u64 = MEM_NEIGHBOR_SIZE / NEIGHBOR_LIST_BYTES;
/// Raw-vector slots that fit in the scratchpad.
pub const SPM_RAW_SLOTS: u64 = (MEM_ADDR_BASE - SPM_RAW_BASE) / RAW_VECTOR_BYTES;
/// Smallest flat address space that holds the whole layout.
pub const LAYOUT_END: u64 = MEM_ADDR_BASE + MEM_VISITED_BASE + NODE_COUNT.div_ceil(8);

/// Flat address of a node's neighbor list in backing memory.
#[must_use]
pub const fn neighbor_list_addr(node: u32) -> u64 {
    MEM_ADDR_BASE + MEM_NEIGHBOR_ADDR + node as u64 * NEIGHBOR_LIST_BYTES
}

/// Flat address of a node's raw vector in backing memory.
#[must_use]
pub const fn raw_vector_addr(node: u32) -> u64 {
    MEM_ADDR_BASE + MEM_RAW_BASE + node as u64 * RAW_VECTOR_BYTES
}

/// SPM address of a raw-vector slot.
#[must_use]
pub const fn spm_raw_slot_addr(slot: u8) -> u64 {
    SPM_RAW_BASE + slot as u64 * RAW_VECTOR_BYTES
}

/// SPM address of entry `pos` of the staged neighbor list.
#[must_use]
pub const fn spm_neighbor_entry_addr(pos: u64) -> u64 {
    SPM_NEIGHBOR_ADDR + pos * 4
}

/// Byte address and bit offset of a node's visited flag.
#[must_use]
pub const fn visited_location(node: u32) -> (u64, u8) {
    let node = node as u64;
    (MEM_ADDR_BASE + MEM_VISITED_BASE + node / 8, (node % 8) as u8)
}
