//! Integration tests for the DMA stall and memory collaborator contract
//!
//! Covers fetch blocking, the permanent-stall hazard of a silent memory
//! port, bridge misuse and the visited-bit read-modify-write.

use bytes::Bytes;
use phnsw_core::layout;
use phnsw_core::prelude::*;
use phnsw_core::{MemResponse, RequestId};

fn simulator_with_latency(text: &str, mem_latency: u64) -> Simulator {
    let config = SimConfig { mem_latency, ..SimConfig::default() };
    Simulator::new(Program::parse(text).unwrap(), &config).unwrap()
}

/// Port that accepts every request and never answers.
#[derive(Debug, Default)]
struct SilentPort {
    issued: u64,
}

impl MemoryPort for SilentPort {
    fn issue_read(&mut self, _addr: u64, _size: usize) -> Result<RequestId> {
        self.issued += 1;
        Ok(RequestId::new(self.issued))
    }

    fn issue_write(&mut self, _addr: u64, _data: Bytes) -> Result<RequestId> {
        self.issued += 1;
        Ok(RequestId::new(self.issued))
    }

    fn issue_move(&mut self, _src: u64, _dst: u64, _size: usize) -> Result<RequestId> {
        self.issued += 1;
        Ok(RequestId::new(self.issued))
    }

    fn tick(&mut self) {}

    fn poll_response(&mut self) -> Option<MemResponse> {
        None
    }
}

/// Port that answers every read on the next tick with the wrong id.
#[derive(Debug, Default)]
struct MisroutingPort {
    reply: Option<MemResponse>,
}

impl MemoryPort for MisroutingPort {
    fn issue_read(&mut self, _addr: u64, size: usize) -> Result<RequestId> {
        self.reply = Some(MemResponse::ReadResp {
            id: RequestId::new(1000),
            data: Bytes::from(vec![0; size]),
        });
        Ok(RequestId::new(1))
    }

    fn issue_write(&mut self, _addr: u64, _data: Bytes) -> Result<RequestId> {
        Ok(RequestId::new(2))
    }

    fn issue_move(&mut self, _src: u64, _dst: u64, _size: usize) -> Result<RequestId> {
        Ok(RequestId::new(3))
    }

    fn tick(&mut self) {}

    fn poll_response(&mut self) -> Option<MemResponse> {
        self.reply.take()
    }
}

/// No slot is fetched while a DMA is outstanding; commits still happen
#[test]
fn test_no_fetch_while_stalled() {
    let mut sim = simulator_with_latency("DMA R\nADD [1], [1]\n\nADD [5], [5]\n\nEND\n", 20);
    sim.registers_mut().write_u64("dma_addr", 0x2000).unwrap();
    sim.registers_mut().write_u64("dma_offset", 8).unwrap();

    sim.tick().unwrap();
    assert!(sim.is_stalled());

    for _ in 0..18 {
        sim.tick().unwrap();
        assert_eq!(sim.engine().pc(), 1, "fetch must not advance during the stall");
        assert!(sim.is_stalled());
    }
    // The co-issued ADD committed on the first stalled tick
    assert_eq!(sim.registers().read_u8("alu_res").unwrap(), 2);

    // Response arrives on tick 21 and fetch resumes in the same tick
    sim.tick().unwrap();
    assert!(sim.is_stalled());
    sim.tick().unwrap();
    assert!(!sim.is_stalled());
    assert_eq!(sim.engine().pc(), 2);

    let summary = sim.run(&mut CycleLimit::new(10)).unwrap();
    assert!(summary.halted);
    assert_eq!(sim.registers().read_u8("alu_res").unwrap(), 10);
    assert_eq!(summary.engine.stalled_cycles, 19);
}

/// A memory port that never responds stalls the engine forever
#[test]
fn test_silent_port_stalls_forever() {
    let program = Program::parse("MOV [1], num1\nDMA N\n\nEND\n").unwrap();
    let mut sim = Simulator::with_port(program, SilentPort::default()).unwrap();

    let summary = sim.run(&mut CycleLimit::new(1_000)).unwrap();
    assert!(!summary.halted);
    assert_eq!(summary.cycles, 1_000);
    assert_eq!(summary.engine.stalled_cycles, 999);
    assert_eq!(sim.engine().pc(), 1);
    assert_eq!(sim.port().issued, 1);
    assert!(sim.is_stalled());
}

/// A response for an id the bridge never issued is fatal
#[test]
fn test_misrouted_response_is_fatal() {
    let program = Program::parse("NEI [0], i\n\nEND\n").unwrap();
    let mut sim = Simulator::with_port(program, MisroutingPort::default()).unwrap();

    let err = sim.run(&mut CycleLimit::new(10)).unwrap_err();
    assert!(matches!(err, PhnswError::UnexpectedResponse { id: 1000 }));
}

/// Two DMA-class instructions in one slot collide on the bridge
#[test]
fn test_second_dma_in_slot_is_bridge_busy() {
    let mut sim = simulator_with_latency("DMA N\nVST R\n\nEND\n", 5);
    let err = sim.run(&mut CycleLimit::new(10)).unwrap_err();
    assert!(matches!(err, PhnswError::BridgeBusy { pending: 1 }));
}

/// Visited bits round-trip through memory
#[test]
fn test_visited_bit_round_trip() {
    let text = "\
MOV [13], visit_index

VST R

MOV visit_res, num1
VST W

VST R

MOV [12], visit_index

VST R

END
";
    let mut sim = simulator_with_latency(text, 3);
    let (byte, bit) = layout::visited_location(13);
    assert_eq!(bit, 5);

    // Slot 4 is fetched only once the second VST R has delivered
    while sim.engine().pc() < 5 {
        sim.tick().unwrap();
        assert!(sim.summary().cycles < 200);
    }
    assert_eq!(sim.registers().read_u8("visit_res").unwrap(), 1 << 5);

    let summary = sim.run(&mut CycleLimit::new(200)).unwrap();
    assert!(summary.halted);
    assert_eq!(sim.registers().read_u8("num1").unwrap(), 0, "unvisited before VST W");
    assert_eq!(sim.memory().read_memory(byte, 1).unwrap(), &[1 << 5]);
    // Node 12 shares the byte but not the bit
    assert_eq!(sim.registers().read_u8("visit_res").unwrap(), 0);
    assert_eq!(summary.bridge.writes, 1);
}

/// RAW gathers a whole scratchpad slot in 8-byte chunks
#[test]
fn test_streaming_read_through_memory() {
    let mut sim = simulator_with_latency("MOV [2], raw_index\n\nRAW raw1\n\nEND\n", 1);
    let vector: Vec<u8> = (0..128).collect();
    sim.memory_mut()
        .load_memory(layout::spm_raw_slot_addr(2), &vector)
        .unwrap();

    let summary = sim.run(&mut CycleLimit::new(100)).unwrap();
    assert!(summary.halted);
    assert_eq!(sim.registers().read_array8("raw1").unwrap(), vector.as_slice());
    assert_eq!(summary.bridge.reads, 16);
    assert_eq!(summary.bridge.responses, 16);
    assert_eq!(sim.registers().read_array8("raw_res").unwrap(), &[0; 128][..]);
}
