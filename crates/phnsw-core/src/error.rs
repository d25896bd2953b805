//! Error types for phnsw simulation
//!
//! Every variant except those raised by configuration loading is fatal to a
//! run: a malformed program is a build-time bug, so the engine reports the
//! offending name or value and stops instead of trying to recover.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for phnsw operations
pub type Result<T> = std::result::Result<T, PhnswError>;

/// Errors that can occur while loading or running a program
#[derive(Debug, Error)]
pub enum PhnswError {
    /// Register name absent from the catalog
    #[error("Register not found: {name}")]
    RegisterNotFound {
        /// Name that was looked up
        name: String,
    },

    /// PUSH on a full candidate or wait list
    #[error("{list} list full (capacity {capacity})")]
    CapacityExceeded {
        /// Size register of the list
        list: &'static str,
        /// Fixed capacity
        capacity: usize,
    },

    /// Register width disagrees with the access
    #[error("Size mismatch on {name}: expected {expected}, register is {actual}")]
    SizeMismatch {
        /// Register name
        name: String,
        /// Shape the operation assumed
        expected: String,
        /// Shape the register actually has
        actual: String,
    },

    /// Unrecognised sub-mode token
    #[error("Unknown mode `{mode}` for {opcode}")]
    UnknownMode {
        /// Opcode mnemonic
        opcode: &'static str,
        /// Offending token
        mode: String,
    },

    /// Mnemonic not in the opcode table
    #[error("Unknown opcode `{mnemonic}` at line {line}")]
    UnknownOpcode {
        /// Offending token
        mnemonic: String,
        /// 1-based source line
        line: usize,
    },

    /// Instruction has fewer operands than its opcode needs
    #[error("{opcode} at line {line}: missing operand {position}")]
    MissingOperand {
        /// Opcode mnemonic
        opcode: &'static str,
        /// 0-based operand position
        position: usize,
        /// 1-based source line
        line: usize,
    },

    /// Program text could not be decoded
    #[error("Parse error at line {line}: {reason}")]
    Parse {
        /// 1-based source line
        line: usize,
        /// Reason for failure
        reason: String,
    },

    /// Opcode issued while its previous instance is still in flight
    #[error("{opcode} issued while a previous {opcode} has not committed")]
    OpcodeBusy {
        /// Opcode mnemonic
        opcode: &'static str,
    },

    /// PUSH to a list whose removal has not committed
    #[error("PUSH to {list} list while {remover} has not committed")]
    ListBusy {
        /// Size register of the locked list
        list: &'static str,
        /// Removal opcode holding the lock
        remover: &'static str,
    },

    /// DMA-class operation issued while another is outstanding
    #[error("DMA bridge busy: request {pending} still outstanding")]
    BridgeBusy {
        /// Outstanding request id
        pending: u64,
    },

    /// Memory response that matches no outstanding request
    #[error("Received response but request not found: id {id}")]
    UnexpectedResponse {
        /// Response id
        id: u64,
    },

    /// Memory collaborator rejected a request
    #[error("Memory fault at {addr:#x} (+{size}): {reason}")]
    MemoryFault {
        /// Request address
        addr: u64,
        /// Request size in bytes
        size: usize,
        /// Reason for failure
        reason: String,
    },

    /// Program counter points past the last slot
    #[error("Program counter {pc} out of range (program has {len} slots)")]
    PcOutOfRange {
        /// Program counter
        pc: usize,
        /// Number of slots
        len: usize,
    },

    /// Configuration value rejected
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Reason for failure
        reason: String,
    },

    /// Configuration file is not valid TOML
    #[error("Failed to parse config {path}: {source}")]
    ConfigParse {
        /// File that was read
        path: PathBuf,
        /// Underlying parser error
        source: toml::de::Error,
    },

    /// I/O error
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },
}

impl PhnswError {
    /// Create a register not found error
    pub fn register_not_found(name: impl Into<String>) -> Self {
        Self::RegisterNotFound { name: name.into() }
    }

    /// Create a size mismatch error
    pub fn size_mismatch(
        name: impl Into<String>,
        expected: impl ToString,
        actual: impl ToString,
    ) -> Self {
        Self::SizeMismatch {
            name: name.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Create an unknown mode error
    pub fn unknown_mode(opcode: &'static str, mode: impl Into<String>) -> Self {
        Self::UnknownMode {
            opcode,
            mode: mode.into(),
        }
    }

    /// Create a parse error
    pub fn parse(line: usize, reason: impl Into<String>) -> Self {
        Self::Parse {
            line,
            reason: reason.into(),
        }
    }

    /// Create a memory fault
    pub fn memory_fault(addr: u64, size: usize, reason: impl Into<String>) -> Self {
        Self::MemoryFault {
            addr,
            size,
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}
