//! Collaborator interfaces
//!
//! The engine is driven by two injected collaborators: a [`Clock`] that
//! decides whether another cycle should run, and a [`MemoryPort`] that
//! accepts asynchronous memory requests and later yields their responses.
//! Both can be replaced by synchronous fakes in tests.

use crate::error::Result;
use bytes::Bytes;
use std::fmt::{self, Debug};

/// Opaque identifier correlating a request with its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    /// Wrap a raw identifier
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw identifier
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Completed memory request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemResponse {
    /// Data returned by `issue_read`
    ReadResp {
        /// Request identifier
        id: RequestId,
        /// Bytes read
        data: Bytes,
    },
    /// Acknowledgement of `issue_write`
    WriteAck {
        /// Request identifier
        id: RequestId,
    },
    /// Completion of `issue_move`
    MoveDone {
        /// Request identifier
        id: RequestId,
    },
}

impl MemResponse {
    /// Identifier of the request this response completes
    pub fn id(&self) -> RequestId {
        match self {
            Self::ReadResp { id, .. } | Self::WriteAck { id } | Self::MoveDone { id } => *id,
        }
    }
}

/// Asynchronous backing-memory collaborator.
///
/// Requests are accepted immediately and answered some cycles later through
/// [`poll_response`](MemoryPort::poll_response). A port that never answers
/// stalls the engine forever; nothing in the engine times requests out.
pub trait MemoryPort: Debug {
    /// Issue a read of `size` bytes at `addr`
    ///
    /// # Errors
    ///
    /// Returns `MemoryFault` if the request cannot be accepted.
    fn issue_read(&mut self, addr: u64, size: usize) -> Result<RequestId>;

    /// Issue a write of `data` at `addr`
    ///
    /// # Errors
    ///
    /// Returns `MemoryFault` if the request cannot be accepted.
    fn issue_write(&mut self, addr: u64, data: Bytes) -> Result<RequestId>;

    /// Issue a memory-to-memory transfer of `size` bytes
    ///
    /// # Errors
    ///
    /// Returns `MemoryFault` if the request cannot be accepted.
    fn issue_move(&mut self, src: u64, dst: u64, size: usize) -> Result<RequestId>;

    /// Advance the collaborator by one cycle
    fn tick(&mut self);

    /// Take the next completed response, if any
    fn poll_response(&mut self) -> Option<MemResponse>;
}

impl<P: MemoryPort + ?Sized> MemoryPort for Box<P> {
    fn issue_read(&mut self, addr: u64, size: usize) -> Result<RequestId> {
        (**self).issue_read(addr, size)
    }

    fn issue_write(&mut self, addr: u64, data: Bytes) -> Result<RequestId> {
        (**self).issue_write(addr, data)
    }

    fn issue_move(&mut self, src: u64, dst: u64, size: usize) -> Result<RequestId> {
        (**self).issue_move(src, dst, size)
    }

    fn tick(&mut self) {
        (**self).tick();
    }

    fn poll_response(&mut self) -> Option<MemResponse> {
        (**self).poll_response()
    }
}

/// Source of clock ticks.
pub trait Clock {
    /// Returns true if another cycle should run
    fn tick(&mut self) -> bool;
}

/// Clock that allows a fixed number of cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleLimit {
    remaining: u64,
}

impl CycleLimit {
    /// Allow at most `cycles` ticks
    pub const fn new(cycles: u64) -> Self {
        Self { remaining: cycles }
    }

    /// Ticks left
    pub const fn remaining(&self) -> u64 {
        self.remaining
    }
}

impl Clock for CycleLimit {
    fn tick(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }
}
