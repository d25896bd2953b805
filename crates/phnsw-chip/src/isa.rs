//! Opcode table.
//!
//! Each mnemonic maps to the destination registers its result commits into
//! and the pipeline depth (cycles between issue and commit). Opcodes with no
//! destination either act immediately (`MOV`, `PUSH`), hand off to the DMA
//! bridge (`DMA`, `VST`, `RAW`, `NEI`) or only steer control (`END`, `JMP`).
//!
//! | Opcode | Destinations | Depth |
//! |--------|--------------|-------|
//! | `ADD` `SUB` | `alu_res` | 1 |
//! | `CMP` | `cmp_res` | 1 |
//! | `DIST` | `dist_res` | 1 |
//! | `LOOK` | `look_res_index`, `look_res_dist` | 1 |
//! | `RMC` | `C_dist`, `C_index` | 8 |
//! | `RMW` | `W_dist`, `W_index` | 8 |

use std::fmt;
use std::str::FromStr;

/// Instruction mnemonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Halt the simulation.
    End,
    /// Idle for one slot.
    Nop,
    /// Conditional jump on `cmp_res`.
    Jmp,
    /// Register copy.
    Mov,
    /// 8-bit add.
    Add,
    /// 8-bit subtract.
    Sub,
    /// Compare.
    Cmp,
    /// Squared euclidean distance of `raw1`/`raw2`.
    Dist,
    /// Min/max scan of `list`.
    Look,
    /// Sorted insert into C or W.
    Push,
    /// Remove from the candidate list.
    Rmc,
    /// Remove from the wait list.
    Rmw,
    /// DMA read / move.
    Dma,
    /// Visited-bitmap access.
    Vst,
    /// Stream a raw vector from SPM.
    Raw,
    /// Load one neighbor-list entry from SPM.
    Nei,
    /// Diagnostic dump.
    Info,
}

impl Opcode {
    /// Every opcode, in table order.
    pub const ALL: [Self; 17] = [
        Self::End,
        Self::Nop,
        Self::Jmp,
        Self::Mov,
        Self::Add,
        Self::Sub,
        Self::Cmp,
        Self::Dist,
        Self::Look,
        Self::Push,
        Self::Rmc,
        Self::Rmw,
        Self::Dma,
        Self::Vst,
        Self::Raw,
        Self::Nei,
        Self::Info,
    ];

    /// Assembly mnemonic.
    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::End => "END",
            Self::Nop => "NOP",
            Self::Jmp => "JMP",
            Self::Mov => "MOV",
            Self::Add => "ADD",
            Self::Sub => "SUB",
            Self::Cmp => "CMP",
            Self::Dist => "DIST",
            Self::Look => "LOOK",
            Self::Push => "PUSH",
            Self::Rmc => "RMC",
            Self::Rmw => "RMW",
            Self::Dma => "DMA",
            Self::Vst => "VST",
            Self::Raw => "RAW",
            Self::Nei => "NEI",
            Self::Info => "INFO",
        }
    }

    /// Static table entry for this opcode.
    #[must_use]
    pub fn spec(self) -> &'static OpcodeSpec {
        // OPCODE_TABLE is indexed in `ALL` order
        &OPCODE_TABLE[self as usize]
    }

    /// True when the opcode raises the DMA stall.
    #[must_use]
    pub const fn is_dma_class(self) -> bool {
        matches!(self, Self::Dma | Self::Vst | Self::Raw | Self::Nei)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Error returned when a mnemonic is not in the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownMnemonic(pub String);

impl fmt::Display for UnknownMnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown mnemonic `{}`", self.0)
    }
}

impl std::error::Error for UnknownMnemonic {}

impl FromStr for Opcode {
    type Err = UnknownMnemonic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.mnemonic() == s)
            .ok_or_else(|| UnknownMnemonic(s.to_string()))
    }
}

/// Static properties of one opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeSpec {
    /// The opcode described.
    pub opcode: Opcode,
    /// Up to two destination registers; `None` means "none".
    pub dests: [Option<&'static str>; 2],
    /// Cycles from issue to commit (minimum 1).
    pub depth: u32,
    /// Short description.
    pub description: &'static str,
}

impl OpcodeSpec {
    /// True if the opcode commits into at least one register.
    #[must_use]
    pub const fn has_dest(&self) -> bool {
        self.dests[0].is_some()
    }
}

const fn op(
    opcode: Opcode,
    dests: [Option<&'static str>; 2],
    depth: u32,
    description: &'static str,
) -> OpcodeSpec {
    OpcodeSpec { opcode, dests, depth, description }
}

/// Pipeline depth of the list-removal units.
pub const REMOVE_DEPTH: u32 = 8;

/// The opcode table, in [`Opcode::ALL`] order.
pub const OPCODE_TABLE: [OpcodeSpec; 17] = [
    op(Opcode::End, [None, None], 1, "end the simulation"),
    op(Opcode::Nop, [None, None], 1, "idle slot"),
    op(Opcode::Jmp, [None, None], 1, "jump if cmp_res != 0"),
    op(Opcode::Mov, [None, None], 1, "copy register"),
    op(Opcode::Add, [Some("alu_res"), None], 1, "8-bit add"),
    op(Opcode::Sub, [Some("alu_res"), None], 1, "8-bit subtract"),
    op(Opcode::Cmp, [Some("cmp_res"), None], 1, "compare"),
    op(Opcode::Dist, [Some("dist_res"), None], 1, "distance raw1/raw2"),
    op(Opcode::Look, [Some("look_res_index"), Some("look_res_dist")], 1, "min/max lookup"),
    op(Opcode::Push, [None, None], 1, "sorted insert into C/W"),
    op(Opcode::Rmc, [Some("C_dist"), Some("C_index")], REMOVE_DEPTH, "remove from C"),
    op(Opcode::Rmw, [Some("W_dist"), Some("W_index")], REMOVE_DEPTH, "remove from W"),
    op(Opcode::Dma, [None, None], 1, "DMA read / move"),
    op(Opcode::Vst, [None, None], 1, "visited bitmap access"),
    op(Opcode::Raw, [None, None], 1, "stream raw vector from SPM"),
    op(Opcode::Nei, [None, None], 1, "load neighbor entry from SPM"),
    op(Opcode::Info, [None, None], 1, "diagnostic dump"),
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;

    #[test]
    fn table_is_in_opcode_order() {
        for (i, op) in Opcode::ALL.iter().enumerate() {
            assert_eq!(OPCODE_TABLE[i].opcode, *op);
            assert_eq!(op.spec().opcode, *op);
        }
    }

    #[test]
    fn mnemonics_round_trip() {
        for op in Opcode::ALL {
            assert_eq!(op.mnemonic().parse::<Opcode>(), Ok(op));
        }
        assert!("dummy".parse::<Opcode>().is_err());
        assert!("add".parse::<Opcode>().is_err());
    }

    #[test]
    fn destinations_exist_in_catalog() {
        for spec in &OPCODE_TABLE {
            assert!(spec.depth >= 1);
            for name in spec.dests.iter().flatten() {
                assert!(catalog::find(name).is_some(), "{} -> {name}", spec.opcode);
            }
        }
    }

    #[test]
    fn removal_units_are_deep() {
        assert_eq!(Opcode::Rmc.spec().depth, 8);
        assert!(Opcode::Rmw.spec().has_dest());
        assert!(!Opcode::Mov.spec().has_dest());
        assert!(Opcode::Vst.is_dma_class());
        assert!(!Opcode::Push.is_dma_class());
    }
}
