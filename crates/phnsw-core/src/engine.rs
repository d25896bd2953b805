//! Execution engine
//!
//! Each tick runs three phases in a fixed order:
//!
//! 1. **Commit**: every descriptor with a destination advances its stage
//!    counter, committing staged results that reached their depth. This runs
//!    even while fetch is stalled.
//! 2. **Stall check**: if the DMA bridge has a request outstanding, the tick
//!    ends here and the program counter does not move.
//! 3. **Fetch + dispatch**: the slot at the program counter is dispatched in
//!    listed order, then the program counter advances by one or to the
//!    target of a taken jump. An opcode still in flight, or a PUSH to a list
//!    with a removal in flight, is a fatal hazard.

use crate::bridge::DmaIssue;
use crate::error::{PhnswError, Result};
use crate::program::Program;
use crate::registers::RegisterFile;
use crate::table::{EngineStats, Flow, InstructionTable};
use tracing::{debug, info};

/// Instruction execution engine.
#[derive(Debug)]
pub struct Engine {
    program: Program,
    table: InstructionTable,
    pc: usize,
    ordinal: usize,
    halted: bool,
    stats: EngineStats,
}

impl Engine {
    /// Create an engine at program counter 0
    ///
    /// # Errors
    ///
    /// `RegisterNotFound` if an opcode destination is missing from `regs`.
    pub fn new(program: Program, regs: &RegisterFile) -> Result<Self> {
        Ok(Self {
            program,
            table: InstructionTable::new(regs)?,
            pc: 0,
            ordinal: 0,
            halted: false,
            stats: EngineStats::default(),
        })
    }

    /// Program counter
    pub fn pc(&self) -> usize {
        self.pc
    }

    /// Position of the last dispatched instruction within its slot
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// True once END has executed
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Counters
    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    /// Loaded program
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Instruction table
    pub fn table(&self) -> &InstructionTable {
        &self.table
    }

    /// Rewind to program counter 0 with an idle pipeline
    pub fn reset(&mut self) {
        self.table.reset();
        self.pc = 0;
        self.ordinal = 0;
        self.halted = false;
        self.stats = EngineStats::default();
    }

    /// Run one clock tick; a halted engine does nothing
    ///
    /// # Errors
    ///
    /// Any fatal handler error, `OpcodeBusy`, `ListBusy` or `PcOutOfRange`.
    pub fn tick(&mut self, regs: &mut RegisterFile, dma: &mut dyn DmaIssue) -> Result<()> {
        if self.halted {
            return Ok(());
        }
        self.stats.cycles += 1;

        self.stats.commits += self.table.commit(regs)?;

        if dma.is_stalled() {
            self.stats.stalled_cycles += 1;
            return Ok(());
        }

        let slot = self.program.slot(self.pc).ok_or(PhnswError::PcOutOfRange {
            pc: self.pc,
            len: self.program.len(),
        })?;

        let mut next = self.pc + 1;
        for (ordinal, insn) in slot.iter().enumerate() {
            self.ordinal = ordinal;
            self.table.ensure_list_idle(insn)?;
            let desc = self.table.get_mut(insn.opcode());
            desc.ensure_idle()?;
            debug!("pc={} [{ordinal}] {insn}", self.pc);

            let flow = desc.dispatch(insn, regs, dma, &mut self.stats)?;
            self.stats.dispatched += 1;
            match flow {
                Flow::Continue => {}
                Flow::Jump(target) => next = target,
                Flow::Halt => {
                    self.halted = true;
                    info!("Halted at pc={} after {} cycles", self.pc, self.stats.cycles);
                    return Ok(());
                }
            }
        }

        self.pc = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::VisitMode;
    use bytes::Bytes;

    /// Bridge stand-in whose stall is set by hand.
    #[derive(Debug, Default)]
    struct ManualDma {
        stalled: bool,
    }

    impl DmaIssue for ManualDma {
        fn is_stalled(&self) -> bool {
            self.stalled
        }

        fn read(&mut self, _addr: u64, _size: usize, _dest: &str) -> Result<()> {
            self.stalled = true;
            Ok(())
        }

        fn write(&mut self, _addr: u64, _data: Bytes) -> Result<()> {
            Ok(())
        }

        fn move_block(&mut self, _src: u64, _dst: u64, _size: usize) -> Result<()> {
            self.stalled = true;
            Ok(())
        }

        fn streaming_read(&mut self, _addr: u64, _total: usize, _dest: &str) -> Result<()> {
            self.stalled = true;
            Ok(())
        }

        fn visited_access(&mut self, _a: u64, _b: u8, _m: VisitMode, _d: &str) -> Result<()> {
            self.stalled = true;
            Ok(())
        }
    }

    fn engine(text: &str) -> (Engine, RegisterFile, ManualDma) {
        let regs = RegisterFile::new();
        let engine = Engine::new(Program::parse(text).unwrap(), &regs).unwrap();
        (engine, regs, ManualDma::default())
    }

    #[test]
    fn depth_one_commits_next_tick() {
        let (mut e, mut regs, mut dma) = engine("ADD [2], [3]\n\nNOP\n\nEND\n");
        e.tick(&mut regs, &mut dma).unwrap();
        assert_eq!(regs.read_u8("alu_res").unwrap(), 0);
        e.tick(&mut regs, &mut dma).unwrap();
        assert_eq!(regs.read_u8("alu_res").unwrap(), 5);
        e.tick(&mut regs, &mut dma).unwrap();
        assert!(e.is_halted());
        assert_eq!(e.stats().dispatched, 3);
        assert_eq!(e.stats().commits, 1);
    }

    #[test]
    fn removal_commits_after_eight_ticks() {
        let (mut e, mut regs, mut dma) =
            engine("PUSH [5], [1], C\n\nRMC [0], C\nNOP\n\nNOP\n\nNOP\n\nNOP\n\nNOP\n\nNOP\n\nNOP\n\nNOP\n\nEND\n");
        e.tick(&mut regs, &mut dma).unwrap();
        assert_eq!(regs.read_array32("C_dist").unwrap()[0], 5);

        // RMC issues on tick 2
        e.tick(&mut regs, &mut dma).unwrap();
        for _ in 0..7 {
            e.tick(&mut regs, &mut dma).unwrap();
            assert_eq!(regs.read_array32("C_dist").unwrap()[0], 5);
            assert_eq!(regs.read_u32("C_size").unwrap(), 1);
        }
        e.tick(&mut regs, &mut dma).unwrap();
        assert_eq!(regs.read_array32("C_dist").unwrap()[0], 0);
        assert_eq!(regs.read_u32("C_size").unwrap(), 0);
    }

    #[test]
    fn stall_freezes_fetch_not_commit() {
        let (mut e, mut regs, mut dma) = engine("ADD [1], [1]\nDMA R\n\nEND\n");
        e.tick(&mut regs, &mut dma).unwrap();
        assert_eq!(e.pc(), 1);
        assert!(dma.stalled);

        for _ in 0..5 {
            e.tick(&mut regs, &mut dma).unwrap();
            assert_eq!(e.pc(), 1);
        }
        // ADD committed during the stall
        assert_eq!(regs.read_u8("alu_res").unwrap(), 2);
        assert_eq!(e.stats().stalled_cycles, 5);

        dma.stalled = false;
        e.tick(&mut regs, &mut dma).unwrap();
        assert!(e.is_halted());
    }

    #[test]
    fn jump_lands_on_target() {
        let text = "MOV [1], cmp_res\n\nADD alu_res, [1]\n\nNOP\n\nJMP [1]\n\nEND\n";
        let (mut e, mut regs, mut dma) = engine(text);
        for _ in 0..4 {
            e.tick(&mut regs, &mut dma).unwrap();
        }
        assert_eq!(e.pc(), 1);
        assert!(!e.is_halted());
    }

    #[test]
    fn jump_to_zero() {
        let (mut e, mut regs, mut dma) = engine("NOP\n\nMOV [1], cmp_res\nJMP [0]\n\nEND\n");
        e.tick(&mut regs, &mut dma).unwrap();
        e.tick(&mut regs, &mut dma).unwrap();
        assert_eq!(e.pc(), 0);
    }

    #[test]
    fn same_opcode_twice_in_flight_is_busy() {
        let (mut e, mut regs, mut dma) = engine("ADD [1], [1]\nADD [2], [2]\n\nEND\n");
        assert!(matches!(
            e.tick(&mut regs, &mut dma),
            Err(PhnswError::OpcodeBusy { opcode: "ADD" })
        ));

        let (mut e, mut regs, mut dma) = engine("RMC [0], C\n\nRMC [0], C\n\nEND\n");
        e.tick(&mut regs, &mut dma).unwrap();
        assert!(matches!(
            e.tick(&mut regs, &mut dma),
            Err(PhnswError::OpcodeBusy { opcode: "RMC" })
        ));
    }

    #[test]
    fn push_to_list_under_removal_is_busy() {
        let (mut e, mut regs, mut dma) =
            engine("PUSH [5], [1], C\n\nRMC [0], C\nPUSH [2], [2], W\n\nPUSH [7], [2], C\n\nEND\n");
        e.tick(&mut regs, &mut dma).unwrap();
        // a PUSH to the other list is unaffected
        e.tick(&mut regs, &mut dma).unwrap();
        assert_eq!(regs.read_u32("W_size").unwrap(), 1);

        let err = e.tick(&mut regs, &mut dma).unwrap_err();
        assert!(matches!(err, PhnswError::ListBusy { list: "C_size", remover: "RMC" }));
        assert_eq!(e.pc(), 2);
    }

    #[test]
    fn running_off_the_end_is_fatal() {
        let (mut e, mut regs, mut dma) = engine("NOP\n");
        e.tick(&mut regs, &mut dma).unwrap();
        assert!(matches!(
            e.tick(&mut regs, &mut dma),
            Err(PhnswError::PcOutOfRange { pc: 1, len: 1 })
        ));
    }

    #[test]
    fn halted_engine_is_inert() {
        let (mut e, mut regs, mut dma) = engine("END\nADD [1], [1]\n");
        e.tick(&mut regs, &mut dma).unwrap();
        e.tick(&mut regs, &mut dma).unwrap();
        assert!(e.is_halted());
        assert_eq!(e.stats().cycles, 1);
        assert_eq!(e.stats().dispatched, 1);

        e.reset();
        assert!(!e.is_halted());
        assert_eq!(e.pc(), 0);
    }
}
