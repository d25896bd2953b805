//! Initial register catalog.
//!
//! Every register the engine will ever hold is listed here, created once at
//! engine start and never added or removed afterwards. Names are resolved at
//! execution time, so the table is the ABI between assembly programs and the
//! engine.
//!
//! ```text
//! Sources        raw1 raw2 list list_index target cmp1 cmp2 dma_addr ...
//! Destinations   dist_res look_res_index look_res_dist cmp_res dma_res ...
//! Working vars   C_dist C_index C_size W_dist W_index W_size i i20 ...
//! ```

use std::fmt;
use RegisterGroup::{Destinations, Sources, Working};
use RegisterKind::{Array32, Array8, U128, U32, U64, U8};

/// Storage shape of a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterKind {
    /// 1-byte scalar.
    U8,
    /// 4-byte scalar.
    U32,
    /// 8-byte scalar.
    U64,
    /// 16-byte scalar.
    U128,
    /// Fixed-length array of bytes.
    Array8(usize),
    /// Fixed-length array of 32-bit words.
    Array32(usize),
}

impl RegisterKind {
    /// Width in bytes.
    #[must_use]
    pub const fn width(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U32 => 4,
            Self::U64 => 8,
            Self::U128 => 16,
            Self::Array8(len) => len,
            Self::Array32(len) => len * 4,
        }
    }

    /// True for the four scalar shapes.
    #[must_use]
    pub const fn is_scalar(self) -> bool {
        matches!(self, Self::U8 | Self::U32 | Self::U64 | Self::U128)
    }
}

impl fmt::Display for RegisterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::U8 => write!(f, "u8"),
            Self::U32 => write!(f, "u32"),
            Self::U64 => write!(f, "u64"),
            Self::U128 => write!(f, "u128"),
            Self::Array8(len) => write!(f, "u8[{len}]"),
            Self::Array32(len) => write!(f, "u32[{len}]"),
        }
    }
}

/// Semantic group a register belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterGroup {
    /// Operands read by functional units.
    Sources,
    /// Results written by functional units.
    Destinations,
    /// Search state and loop counters owned by the program.
    Working,
}

impl fmt::Display for RegisterGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sources => write!(f, "Sources"),
            Self::Destinations => write!(f, "Destinations"),
            Self::Working => write!(f, "Working variables"),
        }
    }
}

/// One catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterSpec {
    /// Unique register name used by programs.
    pub name: &'static str,
    /// Storage shape.
    pub kind: RegisterKind,
    /// Semantic group.
    pub group: RegisterGroup,
    /// Functional unit or purpose.
    pub description: &'static str,
}

const fn reg(
    name: &'static str,
    kind: RegisterKind,
    group: RegisterGroup,
    description: &'static str,
) -> RegisterSpec {
    RegisterSpec { name, kind, group, description }
}

/// Elements in a raw feature vector.
pub const RAW_VECTOR_LEN: usize = 128;
/// Entries in the LOOK scan list.
pub const LOOKUP_LIST_LEN: usize = 10;
/// Entries in one neighbor list.
pub const NEIGHBOR_LIST_LEN: usize = 32;
/// Candidate list (C) capacity.
pub const CANDIDATE_CAPACITY: usize = 60;
/// Wait list (W) capacity.
pub const WAIT_CAPACITY: usize = 40;

/// The full register catalog, in creation order.
pub const CATALOG: &[RegisterSpec] = &[
    // Sources
    reg("raw1", Array8(RAW_VECTOR_LEN), Sources, "DistCalc"),
    reg("raw2", Array8(RAW_VECTOR_LEN), Sources, "DistCalc"),
    reg("list", Array32(LOOKUP_LIST_LEN), Sources, "LookUp"),
    reg("list_index", Array32(LOOKUP_LIST_LEN), Sources, "LookUp"),
    reg("target", U32, Sources, "LookUp scan length"),
    reg("cmp1", U32, Sources, "CMP"),
    reg("cmp2", U32, Sources, "CMP"),
    reg("dma_addr", U64, Sources, "DMA start addr"),
    reg("dma_offset", U64, Sources, "DMA read length"),
    reg("num1", U8, Sources, "ALU"),
    reg("num2", U8, Sources, "ALU"),
    reg("visit_index", U32, Sources, "VISIT"),
    reg("jmp_addr", U64, Sources, "JMP"),
    reg("raw_index", U8, Sources, "fetch RAW from SPM"),
    reg("wrm_index", U32, Sources, "WRM"),
    reg("index2addr", U32, Sources, "index2addr"),
    // Destinations
    reg("dist_res", U32, Destinations, "DistCalc"),
    reg("look_res_index", U32, Destinations, "LookUp"),
    reg("look_res_dist", U32, Destinations, "LookUp"),
    reg("cmp_res", U8, Destinations, "CMP"),
    reg("dma_res", U128, Destinations, "DMA"),
    reg("alu_res", U8, Destinations, "ALU"),
    reg("visit_res", U8, Destinations, "VISIT"),
    reg("raw_res", Array8(RAW_VECTOR_LEN), Destinations, "RAW"),
    reg("addr", U32, Destinations, "index2addr"),
    reg("rm_dist", U32, Destinations, "removed entry dist"),
    reg("rm_index", U32, Destinations, "removed entry index"),
    // Working variables
    reg("C_dist", Array32(CANDIDATE_CAPACITY), Working, "Candidate Dist"),
    reg("C_index", Array32(CANDIDATE_CAPACITY), Working, "Candidate Index"),
    reg("C_size", U32, Working, "Candidate Size"),
    reg("W_dist", Array32(WAIT_CAPACITY), Working, "Wait Dist"),
    reg("W_index", Array32(WAIT_CAPACITY), Working, "Wait Index"),
    reg("W_size", U32, Working, "Wait Size"),
    reg("lowB_index", U32, Working, "lower bound index"),
    reg("lowB_dist", U32, Working, "lower bound dist"),
    reg("current_node", U32, Working, "current node"),
    reg("CN_neighbor_index", Array32(NEIGHBOR_LIST_LEN), Working, "Current Node NeighborList indexs"),
    reg("i", U32, Working, "temp var"),
    reg("i20", U32, Working, "temp var"),
    reg("dist1", U32, Working, "dist1"),
];

/// Find a catalog entry by name.
#[must_use]
pub fn find(name: &str) -> Option<&'static RegisterSpec> {
    CATALOG.iter().find(|spec| spec.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn names_are_unique() {
        let mut seen = HashSet::new();
        for spec in CATALOG {
            assert!(seen.insert(spec.name), "duplicate register {}", spec.name);
        }
    }

    #[test]
    fn list_arrays_match_capacities() {
        assert_eq!(find("C_dist").map(|s| s.kind), Some(Array32(CANDIDATE_CAPACITY)));
        assert_eq!(find("C_index").map(|s| s.kind), Some(Array32(CANDIDATE_CAPACITY)));
        assert_eq!(find("W_dist").map(|s| s.kind), Some(Array32(WAIT_CAPACITY)));
        assert_eq!(find("W_index").map(|s| s.kind), Some(Array32(WAIT_CAPACITY)));
    }

    #[test]
    fn widths() {
        assert_eq!(U8.width(), 1);
        assert_eq!(U128.width(), 16);
        assert_eq!(Array8(RAW_VECTOR_LEN).width(), 128);
        assert_eq!(Array32(CANDIDATE_CAPACITY).width(), 240);
        assert!(!Array32(1).is_scalar());
    }

    #[test]
    fn unknown_name_is_absent() {
        assert!(find("distance_res").is_none());
        assert!(find("").is_none());
    }
}
