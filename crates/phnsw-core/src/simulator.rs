//! Top-level simulator
//!
//! Owns the register file, the engine and the DMA bridge, and orders one
//! clock tick as:
//!
//! 1. advance the memory port and deliver every ready response,
//! 2. run the engine's commit / stall check / fetch + dispatch.

use crate::backends::SimMemory;
use crate::bridge::{BridgeStats, DmaBridge, DmaIssue};
use crate::config::SimConfig;
use crate::engine::Engine;
use crate::error::Result;
use crate::port::{Clock, MemoryPort};
use crate::program::Program;
use crate::registers::RegisterFile;
use crate::table::EngineStats;
use std::fmt;
use tracing::{info, warn};

/// Outcome of [`Simulator::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Engine cycles executed so far
    pub cycles: u64,
    /// True if END was reached
    pub halted: bool,
    /// Engine counters
    pub engine: EngineStats,
    /// Bridge counters
    pub bridge: BridgeStats,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.halted { "halted" } else { "running" };
        writeln!(f, "{state} after {} cycles", self.cycles)?;
        writeln!(
            f,
            "  engine: {} dispatched, {} commits, {} stalled cycles, {} removal misses",
            self.engine.dispatched,
            self.engine.commits,
            self.engine.stalled_cycles,
            self.engine.removal_misses
        )?;
        write!(
            f,
            "  memory: {} reads, {} writes, {} moves, {} responses",
            self.bridge.reads, self.bridge.writes, self.bridge.moves, self.bridge.responses
        )
    }
}

/// Register file + engine + bridge over a memory port.
#[derive(Debug)]
pub struct Simulator<P = SimMemory> {
    regs: RegisterFile,
    engine: Engine,
    bridge: DmaBridge<P>,
}

impl Simulator<SimMemory> {
    /// Simulator backed by a fresh [`SimMemory`]
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if `config` is rejected.
    pub fn new(program: Program, config: &SimConfig) -> Result<Self> {
        Self::with_port(program, SimMemory::new(config)?)
    }

    /// Backing memory
    pub fn memory(&self) -> &SimMemory {
        self.bridge.port()
    }

    /// Backing memory, mutably (for preloading)
    pub fn memory_mut(&mut self) -> &mut SimMemory {
        self.bridge.port_mut()
    }
}

impl<P: MemoryPort> Simulator<P> {
    /// Simulator over any memory port
    ///
    /// # Errors
    ///
    /// `RegisterNotFound` if the opcode table names a missing register.
    pub fn with_port(program: Program, port: P) -> Result<Self> {
        let regs = RegisterFile::new();
        let engine = Engine::new(program, &regs)?;
        Ok(Self {
            regs,
            engine,
            bridge: DmaBridge::new(port),
        })
    }

    /// Register file
    pub fn registers(&self) -> &RegisterFile {
        &self.regs
    }

    /// Register file, mutably (for seeding inputs)
    pub fn registers_mut(&mut self) -> &mut RegisterFile {
        &mut self.regs
    }

    /// Engine
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Bridge
    pub fn bridge(&self) -> &DmaBridge<P> {
        &self.bridge
    }

    /// Memory port
    pub fn port(&self) -> &P {
        self.bridge.port()
    }

    /// Memory port, mutably
    pub fn port_mut(&mut self) -> &mut P {
        self.bridge.port_mut()
    }

    /// True once END has executed
    pub fn is_halted(&self) -> bool {
        self.engine.is_halted()
    }

    /// True while fetch is blocked on the bridge
    pub fn is_stalled(&self) -> bool {
        self.bridge.is_stalled()
    }

    /// Run one clock tick
    ///
    /// # Errors
    ///
    /// Any fatal engine or bridge error.
    pub fn tick(&mut self) -> Result<()> {
        self.bridge.tick(&mut self.regs)?;
        self.engine.tick(&mut self.regs, &mut self.bridge)
    }

    /// Tick until END or until `clock` stops
    ///
    /// A clock that runs out while the engine is stalled is not an error;
    /// the summary reports `halted = false`.
    ///
    /// # Errors
    ///
    /// The first fatal engine or bridge error.
    pub fn run(&mut self, clock: &mut impl Clock) -> Result<RunSummary> {
        while !self.engine.is_halted() && clock.tick() {
            self.tick()?;
        }

        let summary = self.summary();
        if summary.halted {
            info!("Run complete: {} cycles", summary.cycles);
        } else if self.bridge.is_stalled() {
            warn!(
                "Clock stopped after {} cycles with request {:?} outstanding",
                summary.cycles,
                self.bridge.pending_id()
            );
        } else {
            warn!("Clock stopped after {} cycles before END", summary.cycles);
        }
        Ok(summary)
    }

    /// Counters so far
    pub fn summary(&self) -> RunSummary {
        let engine = self.engine.stats();
        RunSummary {
            cycles: engine.cycles,
            halted: self.engine.is_halted(),
            engine,
            bridge: self.bridge.stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::CycleLimit;

    fn sim(text: &str, mem_latency: u64) -> Simulator {
        let config = SimConfig { mem_latency, ..SimConfig::default() };
        Simulator::new(Program::parse(text).unwrap(), &config).unwrap()
    }

    #[test]
    fn runs_to_end() {
        let mut s = sim("ADD [1], [2]\n\nNOP\n\nEND\n", 1);
        let summary = s.run(&mut CycleLimit::new(100)).unwrap();
        assert!(summary.halted);
        assert_eq!(summary.cycles, 3);
        assert_eq!(s.registers().read_u8("alu_res").unwrap(), 3);
    }

    #[test]
    fn clock_exhaustion_is_not_an_error() {
        let mut s = sim("NOP\n\nNOP\n\nEND\n", 1);
        let summary = s.run(&mut CycleLimit::new(2)).unwrap();
        assert!(!summary.halted);
        assert_eq!(summary.cycles, 2);
        assert_eq!(s.engine().pc(), 2);
    }

    #[test]
    fn dma_read_round_trip() {
        let mut s = sim("DMA R\n\nEND\n", 4);
        s.memory_mut().load_memory(0x1000, &[0xEF, 0xBE, 0xAD, 0xDE]).unwrap();
        s.registers_mut().write_u64("dma_addr", 0x1000).unwrap();
        s.registers_mut().write_u64("dma_offset", 4).unwrap();

        let summary = s.run(&mut CycleLimit::new(50)).unwrap();
        assert!(summary.halted);
        assert_eq!(s.registers().read_u128("dma_res").unwrap(), 0xDEAD_BEEF);
        assert_eq!(summary.bridge.reads, 1);
        assert!(summary.engine.stalled_cycles >= 3);
    }

    #[test]
    fn summary_display() {
        let mut s = sim("END\n", 1);
        let text = s.run(&mut CycleLimit::new(5)).unwrap().to_string();
        assert!(text.starts_with("halted after 1 cycles"));
        assert!(text.contains("0 reads"));
    }
}
