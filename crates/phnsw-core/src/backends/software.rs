//! Software memory backend
//!
//! [`SimMemory`] stands in for the host memory hierarchy: one flat byte array
//! covering `[0, max_addr)`, where `[0, scratch_size)` is the scratchpad and
//! everything above is backing memory.
//!
//! ## Timing model
//!
//! ```text
//! issue at cycle T  →  response ready at T + latency(region)
//! move              →  latency(src) + latency(dst)
//! ```
//!
//! Reads and moves take their data when they complete, writes land when
//! they complete. Requests complete in issue order within a region.

use crate::config::SimConfig;
use crate::error::{PhnswError, Result};
use crate::port::{MemResponse, MemoryPort, RequestId};
use bytes::Bytes;
use std::collections::VecDeque;
use tracing::{debug, trace};

#[derive(Debug)]
enum Op {
    Read { addr: u64, size: usize },
    Write { addr: u64, data: Bytes },
    Move { src: u64, dst: u64, size: usize },
}

#[derive(Debug)]
struct InFlight {
    id: RequestId,
    ready_at: u64,
    op: Op,
}

/// Flat scratchpad + backing memory.
#[derive(Debug)]
pub struct SimMemory {
    data: Vec<u8>,
    scratch_size: u64,
    scratch_line_size: u64,
    mem_line_size: u64,
    spm_latency: u64,
    mem_latency: u64,
    now: u64,
    next_id: u64,
    in_flight: VecDeque<InFlight>,
    ready: VecDeque<MemResponse>,
}

impl SimMemory {
    /// Create a zeroed memory sized by `config`
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if `config` fails validation or does not fit in the
    /// host address space.
    pub fn new(config: &SimConfig) -> Result<Self> {
        config.validate()?;
        let len = usize::try_from(config.max_addr)
            .map_err(|_| PhnswError::invalid_config("max_addr exceeds host address space"))?;
        debug!(
            "SimMemory: {} bytes, scratchpad {:#x}, latency spm={} mem={}",
            len, config.scratch_size, config.spm_latency, config.mem_latency
        );
        Ok(Self {
            data: vec![0; len],
            scratch_size: config.scratch_size,
            scratch_line_size: config.scratch_line_size,
            mem_line_size: config.mem_line_size,
            spm_latency: config.spm_latency,
            mem_latency: config.mem_latency,
            now: 0,
            next_id: 0,
            in_flight: VecDeque::new(),
            ready: VecDeque::new(),
        })
    }

    /// Current cycle
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Requests issued but not yet completed
    pub fn outstanding(&self) -> usize {
        self.in_flight.len()
    }

    /// Total bytes addressable
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Copy `bytes` into memory at `addr` immediately, bypassing timing
    ///
    /// # Errors
    ///
    /// `MemoryFault` if the range is out of bounds.
    pub fn load_memory(&mut self, addr: u64, bytes: &[u8]) -> Result<()> {
        let range = self.range(addr, bytes.len())?;
        self.data[range].copy_from_slice(bytes);
        Ok(())
    }

    /// Borrow `len` bytes at `addr`, bypassing timing
    ///
    /// # Errors
    ///
    /// `MemoryFault` if the range is out of bounds.
    pub fn read_memory(&self, addr: u64, len: usize) -> Result<&[u8]> {
        let range = self.range(addr, len)?;
        Ok(&self.data[range])
    }

    fn range(&self, addr: u64, len: usize) -> Result<std::ops::Range<usize>> {
        let start = usize::try_from(addr)
            .map_err(|_| PhnswError::memory_fault(addr, len, "address out of range"))?;
        let end = start
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                PhnswError::memory_fault(
                    addr,
                    len,
                    format!("beyond end of memory ({:#x})", self.data.len()),
                )
            })?;
        Ok(start..end)
    }

    fn in_scratch(&self, addr: u64) -> bool {
        addr < self.scratch_size
    }

    fn latency(&self, addr: u64) -> u64 {
        if self.in_scratch(addr) {
            self.spm_latency
        } else {
            self.mem_latency
        }
    }

    fn check_line(&self, addr: u64, size: usize) -> Result<()> {
        let line = if self.in_scratch(addr) {
            self.scratch_line_size
        } else {
            self.mem_line_size
        };
        if size as u64 > line {
            return Err(PhnswError::memory_fault(
                addr,
                size,
                format!("request larger than line size {line}"),
            ));
        }
        self.range(addr, size).map(|_| ())
    }

    fn enqueue(&mut self, latency: u64, op: Op) -> RequestId {
        self.next_id += 1;
        let id = RequestId::new(self.next_id);
        trace!("SimMemory: {id} ready at {} ({op:?})", self.now + latency);
        self.in_flight.push_back(InFlight {
            id,
            ready_at: self.now + latency,
            op,
        });
        id
    }

    fn complete(&mut self, req: InFlight) -> Result<MemResponse> {
        let id = req.id;
        Ok(match req.op {
            Op::Read { addr, size } => {
                let data = Bytes::copy_from_slice(self.read_memory(addr, size)?);
                MemResponse::ReadResp { id, data }
            }
            Op::Write { addr, data } => {
                self.load_memory(addr, &data)?;
                MemResponse::WriteAck { id }
            }
            Op::Move { src, dst, size } => {
                let src = self.range(src, size)?;
                let dst = self.range(dst, size)?;
                self.data.copy_within(src, dst.start);
                MemResponse::MoveDone { id }
            }
        })
    }
}

impl MemoryPort for SimMemory {
    fn issue_read(&mut self, addr: u64, size: usize) -> Result<RequestId> {
        self.check_line(addr, size)?;
        Ok(self.enqueue(self.latency(addr), Op::Read { addr, size }))
    }

    fn issue_write(&mut self, addr: u64, data: Bytes) -> Result<RequestId> {
        self.check_line(addr, data.len())?;
        Ok(self.enqueue(self.latency(addr), Op::Write { addr, data }))
    }

    fn issue_move(&mut self, src: u64, dst: u64, size: usize) -> Result<RequestId> {
        self.range(src, size)?;
        self.range(dst, size)?;
        let latency = self.latency(src) + self.latency(dst);
        Ok(self.enqueue(latency, Op::Move { src, dst, size }))
    }

    fn tick(&mut self) {
        self.now += 1;
        let mut waiting = VecDeque::with_capacity(self.in_flight.len());
        while let Some(req) = self.in_flight.pop_front() {
            if req.ready_at > self.now {
                waiting.push_back(req);
                continue;
            }
            // Ranges were checked at issue and memory never shrinks
            match self.complete(req) {
                Ok(resp) => self.ready.push_back(resp),
                Err(e) => debug!("SimMemory: dropped request: {e}"),
            }
        }
        self.in_flight = waiting;
    }

    fn poll_response(&mut self) -> Option<MemResponse> {
        self.ready.pop_front()
    }
}
