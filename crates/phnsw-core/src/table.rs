//! Instruction table
//!
//! One [`Descriptor`] per opcode, shared by every occurrence of that opcode
//! in the program. A descriptor owns the staging buffers its handler writes
//! and the stage counter the commit phase advances. Because that state is
//! per opcode, a second instance cannot issue until the first has committed;
//! [`Descriptor::ensure_idle`] enforces this.
//!
//! List removals stage more than their two destinations: the size register
//! is written through [`ExecContext::defer_write`] so it commits in the same
//! tick as the compacted arrays. Until then the list is locked and
//! [`InstructionTable::ensure_list_idle`] rejects a PUSH to it.

use crate::bridge::DmaIssue;
use crate::error::{PhnswError, Result};
use crate::handlers;
use crate::lists::ListId;
use crate::program::{Instruction, Operand};
use crate::registers::{RegisterFile, RegisterValue};
use phnsw_chip::isa::{Opcode, OpcodeSpec};
use std::fmt;
use tracing::debug;

/// What the engine does after a handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Fall through to the next slot
    Continue,
    /// Set the next program counter
    Jump(usize),
    /// Stop the simulation
    Halt,
}

/// Engine counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Ticks executed
    pub cycles: u64,
    /// Ticks whose fetch was skipped by the DMA stall
    pub stalled_cycles: u64,
    /// Instructions dispatched
    pub dispatched: u64,
    /// Staged results committed
    pub commits: u64,
    /// RMC/RMW that found nothing to remove
    pub removal_misses: u64,
}

/// Everything a handler may touch while executing one instruction.
pub struct ExecContext<'a> {
    /// Architectural registers
    pub regs: &'a mut RegisterFile,
    /// DMA bridge
    pub dma: &'a mut dyn DmaIssue,
    /// Engine counters
    pub stats: &'a mut EngineStats,
    staging: &'a mut [Option<RegisterValue>; 2],
    deferred: &'a mut Vec<(&'static str, RegisterValue)>,
    stage: &'a mut u32,
}

impl ExecContext<'_> {
    /// Resolve an operand to a scalar; arrays yield element 0
    ///
    /// # Errors
    ///
    /// `RegisterNotFound`.
    pub fn value(&self, operand: &Operand) -> Result<u128> {
        match operand {
            Operand::Immediate(v) => Ok(u128::from(*v)),
            Operand::Register(name) => Ok(self.regs.lookup(name)?.value().first_scalar()),
        }
    }

    /// Operand `position` widened/truncated to 32 bits
    ///
    /// # Errors
    ///
    /// `MissingOperand` or `RegisterNotFound`.
    #[allow(clippy::cast_possible_truncation)]
    pub fn value_u32(&self, insn: &Instruction, position: usize) -> Result<u32> {
        Ok(self.value(insn.operand(position)?)? as u32)
    }

    /// Write the result for destination `slot` into the staging buffer
    ///
    /// # Errors
    ///
    /// `SizeMismatch` if `value` does not have the destination's shape.
    pub fn stage_result(&mut self, slot: usize, value: RegisterValue) -> Result<()> {
        let buffer = self.staging.get_mut(slot).and_then(Option::as_mut).ok_or_else(|| {
            PhnswError::size_mismatch(format!("staging[{slot}]"), value.kind(), "none")
        })?;
        if buffer.kind() != value.kind() {
            return Err(PhnswError::size_mismatch(
                format!("staging[{slot}]"),
                value.kind(),
                buffer.kind(),
            ));
        }
        *buffer = value;
        Ok(())
    }

    /// Write `value` to register `name` when the staged result commits
    pub fn defer_write(&mut self, name: &'static str, value: RegisterValue) {
        self.deferred.push((name, value));
    }

    /// Start the pipeline: the staged result commits `depth` ticks from now
    pub fn issue(&mut self) {
        *self.stage = 1;
    }
}

/// Handler signature.
pub type Handler = fn(&mut ExecContext<'_>, &Instruction) -> Result<Flow>;

/// Per-opcode execution state.
pub struct Descriptor {
    spec: &'static OpcodeSpec,
    handler: Handler,
    staging: [Option<RegisterValue>; 2],
    deferred: Vec<(&'static str, RegisterValue)>,
    stage: u32,
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("opcode", &self.spec.opcode)
            .field("dests", &self.spec.dests)
            .field("depth", &self.spec.depth)
            .field("stage", &self.stage)
            .field("deferred", &self.deferred.len())
            .finish_non_exhaustive()
    }
}

impl Descriptor {
    fn new(spec: &'static OpcodeSpec, regs: &RegisterFile) -> Result<Self> {
        let mut staging = [None, None];
        for (buffer, dest) in staging.iter_mut().zip(spec.dests) {
            if let Some(name) = dest {
                *buffer = Some(RegisterValue::zeroed(regs.lookup(name)?.kind()));
            }
        }
        Ok(Self {
            spec,
            handler: handlers::handler_for(spec.opcode),
            staging,
            deferred: Vec::new(),
            stage: 0,
        })
    }

    /// Opcode
    pub fn opcode(&self) -> Opcode {
        self.spec.opcode
    }

    /// Configured depth
    pub fn depth(&self) -> u32 {
        self.spec.depth
    }

    /// Live stage counter; 0 when idle
    pub fn stage(&self) -> u32 {
        self.stage
    }

    /// Fail if a previous instance has not committed
    ///
    /// # Errors
    ///
    /// `OpcodeBusy`.
    pub fn ensure_idle(&self) -> Result<()> {
        if self.stage == 0 {
            Ok(())
        } else {
            Err(PhnswError::OpcodeBusy { opcode: self.spec.opcode.mnemonic() })
        }
    }

    /// Run the handler
    ///
    /// # Errors
    ///
    /// Whatever the handler returns.
    pub fn dispatch(
        &mut self,
        insn: &Instruction,
        regs: &mut RegisterFile,
        dma: &mut dyn DmaIssue,
        stats: &mut EngineStats,
    ) -> Result<Flow> {
        let mut ctx = ExecContext {
            regs,
            dma,
            stats,
            staging: &mut self.staging,
            deferred: &mut self.deferred,
            stage: &mut self.stage,
        };
        (self.handler)(&mut ctx, insn)
    }

    /// Commit phase for this descriptor; returns true if it committed
    ///
    /// # Errors
    ///
    /// Register errors from the copy (not reachable with a valid table).
    pub fn advance(&mut self, regs: &mut RegisterFile) -> Result<bool> {
        if !self.spec.has_dest() || self.stage == 0 {
            return Ok(false);
        }
        if self.stage < self.spec.depth {
            self.stage += 1;
            return Ok(false);
        }

        for (dest, buffer) in self.spec.dests.iter().zip(&self.staging) {
            if let (Some(name), Some(value)) = (dest, buffer) {
                regs.set(name, value.clone())?;
            }
        }
        for (name, value) in self.deferred.drain(..) {
            regs.set(name, value)?;
        }
        self.stage = 0;
        debug!("commit {}", self.spec.opcode);
        Ok(true)
    }
}

/// Descriptors for every opcode, indexed in [`Opcode::ALL`] order.
#[derive(Debug)]
pub struct InstructionTable {
    descriptors: Vec<Descriptor>,
}

impl InstructionTable {
    /// Build the table, sizing staging buffers from the register file
    ///
    /// # Errors
    ///
    /// `RegisterNotFound` if a destination is missing from the catalog.
    pub fn new(regs: &RegisterFile) -> Result<Self> {
        let descriptors = Opcode::ALL
            .iter()
            .map(|op| Descriptor::new(op.spec(), regs))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { descriptors })
    }

    /// Descriptor for `opcode`
    pub fn get(&self, opcode: Opcode) -> &Descriptor {
        &self.descriptors[opcode as usize]
    }

    /// Descriptor for `opcode`, mutably
    pub fn get_mut(&mut self, opcode: Opcode) -> &mut Descriptor {
        &mut self.descriptors[opcode as usize]
    }

    /// Fail if `insn` is a PUSH to a list whose removal has not committed
    ///
    /// RMC/RMW on a busy list are already caught by
    /// [`Descriptor::ensure_idle`], since each list has a single remover.
    ///
    /// # Errors
    ///
    /// `ListBusy`, or `MissingOperand`/`UnknownMode` for a malformed PUSH.
    pub fn ensure_list_idle(&self, insn: &Instruction) -> Result<()> {
        if insn.opcode() != Opcode::Push {
            return Ok(());
        }
        let list = ListId::from_token("PUSH", insn.token(2)?)?;
        let remover = self.get(list.remover());
        if remover.stage == 0 {
            Ok(())
        } else {
            Err(PhnswError::ListBusy {
                list: list.size_reg(),
                remover: remover.spec.opcode.mnemonic(),
            })
        }
    }

    /// Commit phase over every descriptor; returns the number committed
    ///
    /// # Errors
    ///
    /// Register errors from a commit.
    pub fn commit(&mut self, regs: &mut RegisterFile) -> Result<u64> {
        let mut committed = 0;
        for desc in &mut self.descriptors {
            if desc.advance(regs)? {
                committed += 1;
            }
        }
        Ok(committed)
    }

    /// Return every descriptor to idle
    pub fn reset(&mut self) {
        for desc in &mut self.descriptors {
            desc.stage = 0;
            desc.deferred.clear();
            for value in desc.staging.iter_mut().flatten() {
                value.clear();
            }
        }
    }

    /// True if any staged result is still waiting to commit
    pub fn in_flight(&self) -> bool {
        self.descriptors.iter().any(|d| d.stage != 0)
    }
}
