//! Memory/DMA bridge
//!
//! The bridge turns DMA-class instructions into [`MemoryPort`] requests and
//! routes the responses back into the register file. At most one request is
//! outstanding at a time; while it is, the bridge reports itself stalled and
//! the engine skips fetch.
//!
//! Multi-step sequences keep the stall raised until their last step:
//!
//! - streaming reads gather `total` bytes in [`STREAM_CHUNK`]-byte reads,
//! - a visited-bit write reads the byte, sets the bit and writes it back.
//!
//! Plain writes are fire-and-forget: they are not tracked and never stall.

use crate::error::{PhnswError, Result};
use crate::port::{MemResponse, MemoryPort, RequestId};
use crate::registers::RegisterFile;
use bytes::{Bytes, BytesMut};
use tracing::{debug, trace};

/// Bytes per read in a streaming sequence.
pub const STREAM_CHUNK: usize = 8;

/// Visited-bit access direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitMode {
    /// Deliver the masked bit
    Read,
    /// Set the bit in memory
    Write,
}

impl VisitMode {
    /// Parse `R` / `W`
    ///
    /// # Errors
    ///
    /// Returns `UnknownMode` for any other token.
    pub fn from_token(token: &str) -> Result<Self> {
        match token {
            "R" => Ok(Self::Read),
            "W" => Ok(Self::Write),
            other => Err(PhnswError::unknown_mode("VST", other)),
        }
    }
}

/// DMA-class operations the engine's handlers may issue.
///
/// Every operation except a plain write raises the stall until its response
/// sequence completes. Issuing while stalled fails with `BridgeBusy`.
pub trait DmaIssue {
    /// True while a request is outstanding
    fn is_stalled(&self) -> bool;

    /// Read `size` bytes at `addr` into register `dest`
    ///
    /// # Errors
    ///
    /// `BridgeBusy` or a port `MemoryFault`.
    fn read(&mut self, addr: u64, size: usize, dest: &str) -> Result<()>;

    /// Fire-and-forget write; does not stall
    ///
    /// # Errors
    ///
    /// A port `MemoryFault`.
    fn write(&mut self, addr: u64, data: Bytes) -> Result<()>;

    /// Memory-to-memory transfer
    ///
    /// # Errors
    ///
    /// `BridgeBusy` or a port `MemoryFault`.
    fn move_block(&mut self, src: u64, dst: u64, size: usize) -> Result<()>;

    /// Gather `total` bytes from `addr` into `dest` in [`STREAM_CHUNK`]-byte reads
    ///
    /// # Errors
    ///
    /// `BridgeBusy` or a port `MemoryFault`.
    fn streaming_read(&mut self, addr: u64, total: usize, dest: &str) -> Result<()>;

    /// Read or set bit `bit` of the byte at `addr`; read mode delivers
    /// `byte & (1 << bit)` to `dest`
    ///
    /// # Errors
    ///
    /// `BridgeBusy` or a port `MemoryFault`.
    fn visited_access(&mut self, addr: u64, bit: u8, mode: VisitMode, dest: &str) -> Result<()>;
}

/// Bridge counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Read requests issued (each streaming chunk counts)
    pub reads: u64,
    /// Write requests issued
    pub writes: u64,
    /// Move requests issued
    pub moves: u64,
    /// Responses received
    pub responses: u64,
}

#[derive(Debug)]
enum Pending {
    Read {
        id: RequestId,
        dest: String,
    },
    Stream {
        id: RequestId,
        next_addr: u64,
        total: usize,
        gathered: BytesMut,
        dest: String,
    },
    Visited {
        id: RequestId,
        addr: u64,
        bit: u8,
        mode: VisitMode,
        dest: String,
    },
    Move {
        id: RequestId,
    },
}

impl Pending {
    fn id(&self) -> RequestId {
        match self {
            Self::Read { id, .. }
            | Self::Stream { id, .. }
            | Self::Visited { id, .. }
            | Self::Move { id } => *id,
        }
    }
}

/// Asynchronous bridge between the engine and a memory port.
#[derive(Debug)]
pub struct DmaBridge<P> {
    port: P,
    pending: Option<Pending>,
    stats: BridgeStats,
}

impl<P: MemoryPort> DmaBridge<P> {
    /// Wrap a memory port
    pub fn new(port: P) -> Self {
        Self {
            port,
            pending: None,
            stats: BridgeStats::default(),
        }
    }

    /// Identifier of the outstanding request
    pub fn pending_id(&self) -> Option<RequestId> {
        self.pending.as_ref().map(Pending::id)
    }

    /// Counters
    pub fn stats(&self) -> BridgeStats {
        self.stats
    }

    /// The wrapped port
    pub fn port(&self) -> &P {
        &self.port
    }

    /// The wrapped port, mutably
    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    fn ensure_idle(&self) -> Result<()> {
        match self.pending_id() {
            Some(id) => Err(PhnswError::BridgeBusy { pending: id.get() }),
            None => Ok(()),
        }
    }

    fn issue_read(&mut self, addr: u64, size: usize) -> Result<RequestId> {
        let id = self.port.issue_read(addr, size)?;
        self.stats.reads += 1;
        debug!("DMA read {id} addr={addr:#x} size={size}");
        Ok(id)
    }

    fn issue_write(&mut self, addr: u64, data: Bytes) -> Result<RequestId> {
        let size = data.len();
        let id = self.port.issue_write(addr, data)?;
        self.stats.writes += 1;
        debug!("DMA write {id} addr={addr:#x} size={size}");
        Ok(id)
    }

    /// Advance the port one cycle and deliver every ready response
    ///
    /// # Errors
    ///
    /// Any error from [`handle_response`](Self::handle_response).
    pub fn tick(&mut self, regs: &mut RegisterFile) -> Result<()> {
        self.port.tick();
        while let Some(resp) = self.port.poll_response() {
            self.handle_response(resp, regs)?;
        }
        Ok(())
    }

    /// Route one response into the register file
    ///
    /// # Errors
    ///
    /// `UnexpectedResponse` if the response matches no outstanding request;
    /// register or port errors from the follow-up step.
    pub fn handle_response(&mut self, resp: MemResponse, regs: &mut RegisterFile) -> Result<()> {
        self.stats.responses += 1;
        let id = resp.id();

        if let MemResponse::WriteAck { .. } = resp {
            trace!("DMA write ack {id}");
            return Ok(());
        }

        let pending = match self.pending.take() {
            Some(p) if p.id() == id => p,
            other => {
                self.pending = other;
                return Err(PhnswError::UnexpectedResponse { id: id.get() });
            }
        };

        match (pending, resp) {
            (Pending::Move { .. }, MemResponse::MoveDone { .. }) => {
                debug!("DMA move {id} done");
            }
            (Pending::Read { dest, .. }, MemResponse::ReadResp { data, .. }) => {
                regs.store_bytes(&dest, &data)?;
                debug!("DMA read {id} -> {dest}");
            }
            (
                Pending::Stream { next_addr, total, mut gathered, dest, .. },
                MemResponse::ReadResp { data, .. },
            ) => {
                let take = data.len().min(total - gathered.len());
                gathered.extend_from_slice(&data[..take]);
                trace!("DMA stream {id}: {}/{total} bytes", gathered.len());

                if gathered.len() < total && take > 0 {
                    let chunk = (total - gathered.len()).min(STREAM_CHUNK);
                    let id = self.issue_read(next_addr, chunk)?;
                    self.pending = Some(Pending::Stream {
                        id,
                        next_addr: next_addr + chunk as u64,
                        total,
                        gathered,
                        dest,
                    });
                } else {
                    regs.store_bytes(&dest, &gathered)?;
                    debug!("DMA stream done -> {dest} ({} bytes)", gathered.len());
                }
            }
            (Pending::Visited { addr, bit, mode, dest, .. }, MemResponse::ReadResp { data, .. }) => {
                let byte = data.first().copied().unwrap_or(0);
                let mask = 1u8 << bit;
                match mode {
                    VisitMode::Read => {
                        regs.store_bytes(&dest, &[byte & mask])?;
                        debug!("VST read {addr:#x} bit {bit} -> {}", byte & mask != 0);
                    }
                    VisitMode::Write => {
                        self.issue_write(addr, Bytes::copy_from_slice(&[byte | mask]))?;
                    }
                }
            }
            (pending, resp) => {
                // wrong kind for the outstanding request; keep waiting on it
                self.pending = Some(pending);
                return Err(PhnswError::UnexpectedResponse { id: resp.id().get() });
            }
        }
        Ok(())
    }
}

impl<P: MemoryPort> DmaIssue for DmaBridge<P> {
    fn is_stalled(&self) -> bool {
        self.pending.is_some()
    }

    fn read(&mut self, addr: u64, size: usize, dest: &str) -> Result<()> {
        self.ensure_idle()?;
        let id = self.issue_read(addr, size)?;
        self.pending = Some(Pending::Read { id, dest: dest.to_string() });
        Ok(())
    }

    fn write(&mut self, addr: u64, data: Bytes) -> Result<()> {
        self.issue_write(addr, data).map(|_| ())
    }

    fn move_block(&mut self, src: u64, dst: u64, size: usize) -> Result<()> {
        self.ensure_idle()?;
        let id = self.port.issue_move(src, dst, size)?;
        self.stats.moves += 1;
        debug!("DMA move {id} {src:#x} -> {dst:#x} size={size}");
        self.pending = Some(Pending::Move { id });
        Ok(())
    }

    fn streaming_read(&mut self, addr: u64, total: usize, dest: &str) -> Result<()> {
        self.ensure_idle()?;
        let chunk = total.min(STREAM_CHUNK);
        let id = self.issue_read(addr, chunk)?;
        self.pending = Some(Pending::Stream {
            id,
            next_addr: addr + chunk as u64,
            total,
            gathered: BytesMut::with_capacity(total),
            dest: dest.to_string(),
        });
        Ok(())
    }

    fn visited_access(&mut self, addr: u64, bit: u8, mode: VisitMode, dest: &str) -> Result<()> {
        self.ensure_idle()?;
        let id = self.issue_read(addr, 1)?;
        self.pending = Some(Pending::Visited {
            id,
            addr,
            bit: bit & 7,
            mode,
            dest: dest.to_string(),
        });
        Ok(())
    }
}
