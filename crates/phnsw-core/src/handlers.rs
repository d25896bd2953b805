//! Opcode handlers
//!
//! Pipelined handlers write their result into the descriptor's staging
//! buffers and call [`ExecContext::issue`]; the commit phase copies it into
//! the destination registers `depth` ticks later. RMC/RMW also defer the
//! list size so it commits with the compacted arrays. `MOV` and `PUSH` write
//! registers directly. DMA-class handlers hand the request to the bridge,
//! which raises the stall.

use crate::bridge::VisitMode;
use crate::error::{PhnswError, Result};
use crate::lists::{self, ListId, LookMode, RemoveMode};
use crate::program::{Instruction, Operand};
use crate::registers::RegisterValue;
use crate::table::{ExecContext, Flow, Handler};
use phnsw_chip::catalog::RAW_VECTOR_LEN;
use phnsw_chip::isa::Opcode;
use phnsw_chip::layout;
use tracing::{info, warn};

/// Handler for `opcode`.
pub fn handler_for(opcode: Opcode) -> Handler {
    match opcode {
        Opcode::End => end,
        Opcode::Nop => nop,
        Opcode::Jmp => jmp,
        Opcode::Mov => mov,
        Opcode::Add => add,
        Opcode::Sub => sub,
        Opcode::Cmp => cmp,
        Opcode::Dist => dist,
        Opcode::Look => look,
        Opcode::Push => push,
        Opcode::Rmc => rmc,
        Opcode::Rmw => rmw,
        Opcode::Dma => dma,
        Opcode::Vst => vst,
        Opcode::Raw => raw,
        Opcode::Nei => nei,
        Opcode::Info => info_dump,
    }
}

fn end(_ctx: &mut ExecContext<'_>, insn: &Instruction) -> Result<Flow> {
    info!("END reached (line {})", insn.line());
    Ok(Flow::Halt)
}

fn nop(_ctx: &mut ExecContext<'_>, _insn: &Instruction) -> Result<Flow> {
    Ok(Flow::Continue)
}

fn jmp(ctx: &mut ExecContext<'_>, insn: &Instruction) -> Result<Flow> {
    let target = ctx.value(insn.operand(0)?)?;
    if ctx.regs.read_u8("cmp_res")? == 0 {
        return Ok(Flow::Continue);
    }
    let target = usize::try_from(target)
        .map_err(|_| PhnswError::parse(insn.line(), format!("jump target {target} out of range")))?;
    Ok(Flow::Jump(target))
}

fn mov(ctx: &mut ExecContext<'_>, insn: &Instruction) -> Result<Flow> {
    let dst = insn.token(1)?;
    match insn.operand(0)? {
        Operand::Immediate(v) => ctx.regs.store_bytes(dst, &v.to_le_bytes())?,
        Operand::Register(src) => ctx.regs.copy_bytes(src, dst)?,
    }
    Ok(Flow::Continue)
}

#[allow(clippy::cast_possible_truncation)]
fn alu(ctx: &mut ExecContext<'_>, insn: &Instruction, op: fn(u8, u8) -> u8) -> Result<Flow> {
    let a = ctx.value(insn.operand(0)?)? as u8;
    let b = ctx.value(insn.operand(1)?)? as u8;
    ctx.stage_result(0, RegisterValue::Scalar8(op(a, b)))?;
    ctx.issue();
    Ok(Flow::Continue)
}

fn add(ctx: &mut ExecContext<'_>, insn: &Instruction) -> Result<Flow> {
    alu(ctx, insn, u8::wrapping_add)
}

fn sub(ctx: &mut ExecContext<'_>, insn: &Instruction) -> Result<Flow> {
    alu(ctx, insn, u8::wrapping_sub)
}

fn cmp(ctx: &mut ExecContext<'_>, insn: &Instruction) -> Result<Flow> {
    let a = ctx.value_u32(insn, 1)?;
    let b = ctx.value_u32(insn, 2)?;
    let result = match insn.token(0)? {
        "EQ" => a == b,
        "NE" => a != b,
        "GT" => a > b,
        "LT" => a < b,
        "GE" => a >= b,
        "LE" => a <= b,
        other => return Err(PhnswError::unknown_mode("CMP", other)),
    };
    ctx.stage_result(0, RegisterValue::Scalar8(u8::from(result)))?;
    ctx.issue();
    Ok(Flow::Continue)
}

fn dist(ctx: &mut ExecContext<'_>, _insn: &Instruction) -> Result<Flow> {
    let d = lists::squared_distance(ctx.regs.read_array8("raw1")?, ctx.regs.read_array8("raw2")?);
    ctx.stage_result(0, RegisterValue::Scalar32(d))?;
    ctx.issue();
    Ok(Flow::Continue)
}

fn look(ctx: &mut ExecContext<'_>, insn: &Instruction) -> Result<Flow> {
    let mode = LookMode::from_token(insn.token(0)?)?;
    let span = lists::look_span(ctx.regs.read_u32("target")?);
    let dists = ctx.regs.read_array32("list")?;
    let indices = ctx.regs.read_array32("list_index")?;
    let (index, d) = lists::look(&dists[..span.min(dists.len())], indices, mode);

    ctx.stage_result(0, RegisterValue::Scalar32(index))?;
    ctx.stage_result(1, RegisterValue::Scalar32(d))?;
    ctx.issue();
    Ok(Flow::Continue)
}

fn push(ctx: &mut ExecContext<'_>, insn: &Instruction) -> Result<Flow> {
    let d = ctx.value_u32(insn, 0)?;
    let index = ctx.value_u32(insn, 1)?;
    let list = ListId::from_token("PUSH", insn.token(2)?)?;

    let mut dists = ctx.regs.read_array32(list.dist_reg())?.to_vec();
    let mut indices = ctx.regs.read_array32(list.index_reg())?.to_vec();
    let raw_size = ctx.regs.read_u32(list.size_reg())?;
    let size = lists::checked_size(list, raw_size)?;

    lists::insert_sorted(list, &mut dists, &mut indices, size, d, index)?;
    ctx.regs.write_array32(list.dist_reg(), &dists)?;
    ctx.regs.write_array32(list.index_reg(), &indices)?;
    ctx.regs.write_u32(list.size_reg(), raw_size + 1)?;
    Ok(Flow::Continue)
}

fn remove(ctx: &mut ExecContext<'_>, insn: &Instruction, list: ListId, own: &str) -> Result<Flow> {
    let opcode = insn.opcode().mnemonic();
    let idx = ctx.value_u32(insn, 0)?;
    let mode = RemoveMode::from_token(opcode, own, insn.token(1)?)?;

    let mut dists = ctx.regs.read_array32(list.dist_reg())?.to_vec();
    let mut indices = ctx.regs.read_array32(list.index_reg())?.to_vec();
    let raw_size = ctx.regs.read_u32(list.size_reg())?;
    let size = lists::checked_size(list, raw_size)?;

    match lists::find_removal(&indices, size, mode, idx) {
        Some(pos) => {
            let (rm_dist, rm_index) = lists::remove_at(&mut dists, &mut indices, size, pos);
            ctx.regs.write_u32("rm_dist", rm_dist)?;
            ctx.regs.write_u32("rm_index", rm_index)?;
            // size drops with the arrays, not before
            ctx.defer_write(list.size_reg(), RegisterValue::Scalar32(raw_size - 1));
        }
        None => {
            warn!("{opcode} {idx} ({mode:?}) at line {}: no match, list unchanged", insn.line());
            ctx.stats.removal_misses += 1;
        }
    }

    ctx.stage_result(0, RegisterValue::Array32(dists.into_boxed_slice()))?;
    ctx.stage_result(1, RegisterValue::Array32(indices.into_boxed_slice()))?;
    ctx.issue();
    Ok(Flow::Continue)
}

fn rmc(ctx: &mut ExecContext<'_>, insn: &Instruction) -> Result<Flow> {
    remove(ctx, insn, ListId::Candidate, "C")
}

fn rmw(ctx: &mut ExecContext<'_>, insn: &Instruction) -> Result<Flow> {
    remove(ctx, insn, ListId::Wait, "W")
}

#[allow(clippy::cast_possible_truncation)]
fn dma(ctx: &mut ExecContext<'_>, insn: &Instruction) -> Result<Flow> {
    match insn.token(0)? {
        "R" => {
            let addr = ctx.regs.read_u64("dma_addr")?;
            let size = ctx.regs.read_u64("dma_offset")? as usize;
            ctx.dma.read(addr, size, "dma_res")?;
        }
        "N" => {
            let node = ctx.regs.read_u32("current_node")?;
            ctx.dma.move_block(
                layout::neighbor_list_addr(node),
                layout::SPM_NEIGHBOR_ADDR,
                layout::NEIGHBOR_LIST_BYTES as usize,
            )?;
        }
        "A" => {
            let node = ctx.regs.read_u32("index2addr")?;
            let slot = ctx.regs.read_u8("raw_index")?;
            let dst = raw_slot(slot)?;
            ctx.regs.write_u32("addr", dst as u32)?;
            ctx.dma.move_block(
                layout::raw_vector_addr(node),
                dst,
                layout::RAW_VECTOR_BYTES as usize,
            )?;
        }
        other => return Err(PhnswError::unknown_mode("DMA", other)),
    }
    Ok(Flow::Continue)
}

fn raw_slot(slot: u8) -> Result<u64> {
    if u64::from(slot) >= layout::SPM_RAW_SLOTS {
        return Err(PhnswError::memory_fault(
            layout::spm_raw_slot_addr(slot),
            RAW_VECTOR_LEN,
            format!("raw slot {slot} outside the scratchpad ({} slots)", layout::SPM_RAW_SLOTS),
        ));
    }
    Ok(layout::spm_raw_slot_addr(slot))
}

fn vst(ctx: &mut ExecContext<'_>, insn: &Instruction) -> Result<Flow> {
    let mode = VisitMode::from_token(insn.token(0)?)?;
    let node = ctx.regs.read_u32("visit_index")?;
    let (addr, bit) = layout::visited_location(node);
    ctx.dma.visited_access(addr, bit, mode, "visit_res")?;
    Ok(Flow::Continue)
}

fn raw(ctx: &mut ExecContext<'_>, insn: &Instruction) -> Result<Flow> {
    let dest = match insn.operands().first() {
        Some(_) => insn.token(0)?,
        None => "raw_res",
    };
    let width = ctx.regs.lookup(dest)?.width();
    if width != RAW_VECTOR_LEN {
        return Err(PhnswError::size_mismatch(dest, format!("{RAW_VECTOR_LEN} bytes"), width));
    }
    let slot = ctx.regs.read_u8("raw_index")?;
    ctx.dma.streaming_read(raw_slot(slot)?, RAW_VECTOR_LEN, dest)?;
    Ok(Flow::Continue)
}

fn nei(ctx: &mut ExecContext<'_>, insn: &Instruction) -> Result<Flow> {
    let pos = u64::from(ctx.value_u32(insn, 0)?);
    let dest = insn.token(1)?;
    let width = ctx.regs.lookup(dest)?.width();
    if width != 4 {
        return Err(PhnswError::size_mismatch(dest, "4 bytes", width));
    }
    let addr = layout::spm_neighbor_entry_addr(pos);
    if addr + 4 > layout::SPM_NEIGHBOR_ADDR + layout::SPM_NEIGHBOR_SIZE {
        return Err(PhnswError::memory_fault(addr, 4, format!("neighbor entry {pos} out of range")));
    }
    ctx.dma.read(addr, 4, dest)?;
    Ok(Flow::Continue)
}

fn info_dump(ctx: &mut ExecContext<'_>, insn: &Instruction) -> Result<Flow> {
    let name = insn.token(0)?;
    let reg = ctx.regs.lookup(name)?;
    info!(
        "INFO {name}: {} ({} bytes, {})",
        reg.value().first_scalar(),
        reg.width(),
        reg.kind()
    );
    Ok(Flow::Continue)
}
