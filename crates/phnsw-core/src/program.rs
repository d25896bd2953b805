//! Program image and loader
//!
//! A program is a sequence of cycle-slots. Each slot holds the instructions
//! co-issued at one program-counter value, in listed order.
//!
//! ## Text format
//!
//! ```text
//! ; comment to end of line
//! MOV [3], target        ; slot 0
//! LOOK MIN               ; slot 0, co-issued
//!
//! CMP EQ, look_res_index, [30]   ; slot 1
//! ```
//!
//! Tokens are whitespace separated and a trailing `,` is stripped. A blank
//! or comment-only line closes the current slot; runs of them never produce
//! empty slots. `[N]` is a decimal immediate, anything else a name.

use crate::error::{PhnswError, Result};
use phnsw_chip::isa::Opcode;
use std::fmt;
use std::path::Path;
use tracing::info;

/// Pre-tagged instruction operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// Register name or mode token
    Register(String),
    /// Immediate literal
    Immediate(u64),
}

impl Operand {
    /// Register operand
    pub fn reg(name: impl Into<String>) -> Self {
        Self::Register(name.into())
    }

    /// Token text of a register or mode operand
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Self::Register(name) => Some(name),
            Self::Immediate(_) => None,
        }
    }

    fn parse(token: &str, line: usize) -> Result<Self> {
        if let Some(body) = token.strip_prefix('[') {
            let digits = body
                .strip_suffix(']')
                .ok_or_else(|| PhnswError::parse(line, format!("unterminated immediate `{token}`")))?;
            let value = digits
                .parse::<u64>()
                .map_err(|e| PhnswError::parse(line, format!("bad immediate `{token}`: {e}")))?;
            return Ok(Self::Immediate(value));
        }
        Ok(Self::Register(token.to_string()))
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Register(name) => f.write_str(name),
            Self::Immediate(v) => write!(f, "[{v}]"),
        }
    }
}

/// One decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    opcode: Opcode,
    operands: Vec<Operand>,
    line: usize,
}

impl Instruction {
    /// Build an instruction with no source line
    pub fn new(opcode: Opcode, operands: Vec<Operand>) -> Self {
        Self { opcode, operands, line: 0 }
    }

    /// Attach the 1-based source line
    #[must_use]
    pub fn with_line(mut self, line: usize) -> Self {
        self.line = line;
        self
    }

    /// Opcode
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// All operands
    pub fn operands(&self) -> &[Operand] {
        &self.operands
    }

    /// 1-based source line (0 when built in code)
    pub fn line(&self) -> usize {
        self.line
    }

    /// Operand at `position`
    ///
    /// # Errors
    ///
    /// Returns `MissingOperand` if the instruction is too short.
    pub fn operand(&self, position: usize) -> Result<&Operand> {
        self.operands.get(position).ok_or(PhnswError::MissingOperand {
            opcode: self.opcode.mnemonic(),
            position,
            line: self.line,
        })
    }

    /// Mode or register token at `position`
    ///
    /// # Errors
    ///
    /// `MissingOperand`, or `Parse` if the operand is an immediate.
    pub fn token(&self, position: usize) -> Result<&str> {
        match self.operand(position)? {
            Operand::Register(name) => Ok(name),
            Operand::Immediate(v) => Err(PhnswError::parse(
                self.line,
                format!("{}: operand {position} must be a name, got [{v}]", self.opcode),
            )),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.opcode.mnemonic())?;
        for (i, op) in self.operands.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{sep}{op}")?;
        }
        Ok(())
    }
}

/// Decoded program: one entry per cycle-slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    slots: Vec<Vec<Instruction>>,
}

impl Program {
    /// Build from already-decoded slots
    pub fn from_slots(slots: Vec<Vec<Instruction>>) -> Self {
        Self { slots }
    }

    /// Decode program text
    ///
    /// # Errors
    ///
    /// `UnknownOpcode` for an unknown mnemonic, `Parse` for a malformed
    /// immediate. Both carry the 1-based line number.
    pub fn parse(text: &str) -> Result<Self> {
        let mut slots = Vec::new();
        let mut current = Vec::new();

        for (idx, raw) in text.lines().enumerate() {
            let line = idx + 1;
            let code = raw.split(';').next().unwrap_or("");
            let mut tokens = code
                .split_whitespace()
                .map(|t| t.strip_suffix(',').unwrap_or(t))
                .filter(|t| !t.is_empty());

            let Some(mnemonic) = tokens.next() else {
                if !current.is_empty() {
                    slots.push(std::mem::take(&mut current));
                }
                continue;
            };

            let opcode = mnemonic.parse::<Opcode>().map_err(|_| PhnswError::UnknownOpcode {
                mnemonic: mnemonic.to_string(),
                line,
            })?;
            let operands = tokens
                .map(|t| Operand::parse(t, line))
                .collect::<Result<Vec<_>>>()?;
            current.push(Instruction { opcode, operands, line });
        }
        if !current.is_empty() {
            slots.push(current);
        }

        Ok(Self { slots })
    }

    /// Read and decode a program file
    ///
    /// # Errors
    ///
    /// `Io` if the file cannot be read, otherwise as [`Program::parse`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let program = Self::parse(&text)?;
        info!(
            "Loaded program {}: {} slots, {} instructions",
            path.display(),
            program.len(),
            program.instruction_count()
        );
        Ok(program)
    }

    /// Number of cycle-slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True if the program has no slots
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Total instructions over all slots
    pub fn instruction_count(&self) -> usize {
        self.slots.iter().map(Vec::len).sum()
    }

    /// Slot at program counter `pc`
    pub fn slot(&self, pc: usize) -> Option<&[Instruction]> {
        self.slots.get(pc).map(Vec::as_slice)
    }

    /// All slots in order
    pub fn slots(&self) -> impl Iterator<Item = &[Instruction]> {
        self.slots.iter().map(Vec::as_slice)
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (pc, slot) in self.slots.iter().enumerate() {
            for (ordinal, insn) in slot.iter().enumerate() {
                let label = if ordinal == 0 { format!("{pc:4}:") } else { "     ".to_string() };
                let text = insn.to_string();
                writeln!(f, "{label} {text:<40} ; line {}", insn.line)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_lines_split_slots() {
        let program = Program::parse(
            "MOV [3], target\nLOOK MIN\n\n\n; only a comment\nCMP EQ, look_res_index, [30]\nEND\n",
        )
        .unwrap();
        assert_eq!(program.len(), 2);
        assert_eq!(program.slot(0).unwrap().len(), 2);
        assert_eq!(program.slot(1).unwrap()[1].opcode(), Opcode::End);
        assert!(program.slot(2).is_none());
    }

    #[test]
    fn operands_are_pre_tagged() {
        let program = Program::parse("CMP GE, i, [42] ; trailing\n").unwrap();
        let insn = &program.slot(0).unwrap()[0];
        assert_eq!(
            insn.operands(),
            &[Operand::reg("GE"), Operand::reg("i"), Operand::Immediate(42)]
        );
        assert_eq!(insn.line(), 1);
        assert_eq!(insn.to_string(), "CMP GE, i, [42]");
    }

    #[test]
    fn comments_and_commas() {
        let program = Program::parse("  ; header\n\nMOV   num1 ,  num2,;x\n").unwrap();
        assert_eq!(program.len(), 1);
        let insn = &program.slot(0).unwrap()[0];
        assert_eq!(insn.operands(), &[Operand::reg("num1"), Operand::reg("num2")]);
        assert_eq!(insn.line(), 3);
    }

    #[test]
    fn unknown_opcode_reports_line() {
        let err = Program::parse("NOP\nFOO a\n").unwrap_err();
        assert!(matches!(err, PhnswError::UnknownOpcode { ref mnemonic, line: 2 } if mnemonic == "FOO"));
    }

    #[test]
    fn malformed_immediates() {
        assert!(matches!(Program::parse("JMP [12"), Err(PhnswError::Parse { line: 1, .. })));
        assert!(matches!(Program::parse("\nJMP [-1]"), Err(PhnswError::Parse { line: 2, .. })));
        assert!(matches!(Program::parse("JMP [0x10]"), Err(PhnswError::Parse { .. })));
    }

    #[test]
    fn missing_operand() {
        let insn = Instruction::new(Opcode::Mov, vec![Operand::reg("num1")]).with_line(9);
        assert!(insn.operand(0).is_ok());
        assert!(matches!(
            insn.operand(1),
            Err(PhnswError::MissingOperand { opcode: "MOV", position: 1, line: 9 })
        ));
        let imm = Instruction::new(Opcode::Look, vec![Operand::Immediate(1)]);
        assert!(imm.token(0).is_err());
    }

    #[test]
    fn empty_text_is_empty_program() {
        assert!(Program::parse("\n; nothing\n").unwrap().is_empty());
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prog.asm");
        std::fs::write(&path, "NOP\n\nEND\n").unwrap();
        let program = Program::load(&path).unwrap();
        assert_eq!(program.len(), 2);
        assert_eq!(program.instruction_count(), 2);
        assert!(matches!(
            Program::load(dir.path().join("missing.asm")),
            Err(PhnswError::Io { .. })
        ));
    }
}
