//! Cycle-level simulator for the phnsw graph-search accelerator.
//!
//! The accelerator runs an HNSW-style nearest-neighbor traversal out of a
//! named register file, a per-opcode pipelined instruction table and a DMA
//! bridge that stalls fetch while memory requests are outstanding.
//!
//! # Architecture
//!
//! ```text
//!            ┌─────────────┐   dispatch   ┌──────────────────┐
//!  Program ─▶│   Engine    │─────────────▶│ InstructionTable │
//!            │ pc, commit  │              │ staging + stage  │
//!            └─────┬───────┘              └────────┬─────────┘
//!                  │ stall?                        │ read / write
//!            ┌─────▼───────┐  responses   ┌────────▼─────────┐
//!            │  DmaBridge  │─────────────▶│   RegisterFile   │
//!            └─────┬───────┘              └──────────────────┘
//!                  │ issue_read / issue_write / issue_move
//!            ┌─────▼───────┐
//!            │ MemoryPort  │  (SimMemory)
//!            └─────────────┘
//! ```
//!
//! # Quick start
//!
//! ```no_run
//! use phnsw_core::{CycleLimit, Program, SimConfig, Simulator};
//!
//! # fn main() -> phnsw_core::Result<()> {
//! let program = Program::load("search.asm")?;
//! let mut sim = Simulator::new(program, &SimConfig::default())?;
//! let summary = sim.run(&mut CycleLimit::new(10_000))?;
//! println!("{summary}");
//! println!("C_size = {}", sim.registers().read_u32("C_size")?);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]

pub mod backends;
mod bridge;
mod config;
mod engine;
mod error;
pub mod handlers;
pub mod lists;
mod port;
mod program;
mod registers;
mod simulator;
mod table;

pub use backends::SimMemory;
pub use bridge::{BridgeStats, DmaBridge, DmaIssue, VisitMode, STREAM_CHUNK};
pub use config::SimConfig;
pub use engine::Engine;
pub use error::{PhnswError, Result};
pub use port::{Clock, CycleLimit, MemResponse, MemoryPort, RequestId};
pub use program::{Instruction, Operand, Program};
pub use registers::{Register, RegisterFile, RegisterValue};
pub use simulator::{RunSummary, Simulator};
pub use table::{Descriptor, EngineStats, ExecContext, Flow, Handler, InstructionTable};

/// Silicon constants (re-exported from phnsw-chip).
pub use phnsw_chip::{catalog, isa, layout};

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        Clock, CycleLimit, MemoryPort, Operand, PhnswError, Program, RegisterFile, Result,
        RunSummary, SimConfig, SimMemory, Simulator,
    };
    pub use phnsw_chip::isa::Opcode;
}
