//! Memory port implementations
//!
//! - **Software**: flat in-process scratchpad + backing memory with fixed
//!   per-region latency. Used by the CLI and the test suite.

pub mod software;

pub use software::SimMemory;
