//! Named register file
//!
//! Registers are created once from [`phnsw_chip::catalog::CATALOG`] and live
//! for the lifetime of the engine. Storage is a closed tagged variant, so a
//! width disagreement is rejected at the access instead of corrupting a
//! neighbouring register.

use crate::error::{PhnswError, Result};
use phnsw_chip::catalog::{RegisterGroup, RegisterKind, RegisterSpec, CATALOG};
use std::collections::HashMap;

/// Register storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterValue {
    /// 1-byte scalar
    Scalar8(u8),
    /// 4-byte scalar
    Scalar32(u32),
    /// 8-byte scalar
    Scalar64(u64),
    /// 16-byte scalar
    Scalar128(u128),
    /// Fixed-length byte array
    Array8(Box<[u8]>),
    /// Fixed-length word array
    Array32(Box<[u32]>),
}

impl RegisterValue {
    /// All-zero value of the given shape.
    pub fn zeroed(kind: RegisterKind) -> Self {
        match kind {
            RegisterKind::U8 => Self::Scalar8(0),
            RegisterKind::U32 => Self::Scalar32(0),
            RegisterKind::U64 => Self::Scalar64(0),
            RegisterKind::U128 => Self::Scalar128(0),
            RegisterKind::Array8(len) => Self::Array8(vec![0; len].into_boxed_slice()),
            RegisterKind::Array32(len) => Self::Array32(vec![0; len].into_boxed_slice()),
        }
    }

    /// Shape of this value.
    pub fn kind(&self) -> RegisterKind {
        match self {
            Self::Scalar8(_) => RegisterKind::U8,
            Self::Scalar32(_) => RegisterKind::U32,
            Self::Scalar64(_) => RegisterKind::U64,
            Self::Scalar128(_) => RegisterKind::U128,
            Self::Array8(a) => RegisterKind::Array8(a.len()),
            Self::Array32(a) => RegisterKind::Array32(a.len()),
        }
    }

    /// Width in bytes.
    pub fn width(&self) -> usize {
        self.kind().width()
    }

    /// Scalar value widened to 128 bits; `None` for arrays.
    pub fn as_scalar(&self) -> Option<u128> {
        match *self {
            Self::Scalar8(v) => Some(u128::from(v)),
            Self::Scalar32(v) => Some(u128::from(v)),
            Self::Scalar64(v) => Some(u128::from(v)),
            Self::Scalar128(v) => Some(v),
            Self::Array8(_) | Self::Array32(_) => None,
        }
    }

    /// The scalar, or element 0 of an array.
    pub fn first_scalar(&self) -> u128 {
        match self {
            Self::Array8(a) => a.first().copied().map_or(0, u128::from),
            Self::Array32(a) => a.first().copied().map_or(0, u128::from),
            scalar => scalar.as_scalar().unwrap_or(0),
        }
    }

    /// Little-endian byte image.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        match self {
            Self::Scalar8(v) => vec![*v],
            Self::Scalar32(v) => v.to_le_bytes().to_vec(),
            Self::Scalar64(v) => v.to_le_bytes().to_vec(),
            Self::Scalar128(v) => v.to_le_bytes().to_vec(),
            Self::Array8(a) => a.to_vec(),
            Self::Array32(a) => a.iter().flat_map(|w| w.to_le_bytes()).collect(),
        }
    }

    /// Overwrite from a little-endian byte image.
    ///
    /// The value is zeroed first, then `min(bytes.len(), width)` bytes are
    /// copied in, so a short source leaves the high bytes clear.
    pub fn load_le_bytes(&mut self, bytes: &[u8]) {
        let mut image = vec![0u8; self.width()];
        let n = image.len().min(bytes.len());
        image[..n].copy_from_slice(&bytes[..n]);

        match self {
            Self::Scalar8(v) => *v = image[0],
            Self::Scalar32(v) => *v = u32::from_le_bytes(le_array(&image)),
            Self::Scalar64(v) => *v = u64::from_le_bytes(le_array(&image)),
            Self::Scalar128(v) => *v = u128::from_le_bytes(le_array(&image)),
            Self::Array8(a) => a.copy_from_slice(&image),
            Self::Array32(a) => {
                for (word, chunk) in a.iter_mut().zip(image.chunks_exact(4)) {
                    *word = u32::from_le_bytes(le_array(chunk));
                }
            }
        }
    }

    /// Reset to zero without changing the shape.
    pub fn clear(&mut self) {
        *self = Self::zeroed(self.kind());
    }
}

fn le_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

/// One architectural register.
#[derive(Debug, Clone)]
pub struct Register {
    spec: &'static RegisterSpec,
    value: RegisterValue,
}

impl Register {
    fn new(spec: &'static RegisterSpec) -> Self {
        Self {
            spec,
            value: RegisterValue::zeroed(spec.kind),
        }
    }

    /// Register name.
    pub fn name(&self) -> &'static str {
        self.spec.name
    }

    /// Storage shape (immutable).
    pub fn kind(&self) -> RegisterKind {
        self.spec.kind
    }

    /// Width in bytes.
    pub fn width(&self) -> usize {
        self.spec.kind.width()
    }

    /// Catalog group.
    pub fn group(&self) -> RegisterGroup {
        self.spec.group
    }

    /// Catalog description.
    pub fn description(&self) -> &'static str {
        self.spec.description
    }

    /// Current value.
    pub fn value(&self) -> &RegisterValue {
        &self.value
    }

    /// Replace the value; the shape must match.
    ///
    /// # Errors
    ///
    /// Returns `SizeMismatch` if `value` has a different shape.
    pub fn set(&mut self, value: RegisterValue) -> Result<()> {
        if value.kind() != self.kind() {
            return Err(PhnswError::size_mismatch(self.name(), value.kind(), self.kind()));
        }
        self.value = value;
        Ok(())
    }

    /// Byte-exact load with truncate / zero-fill.
    pub fn load_bytes(&mut self, bytes: &[u8]) {
        self.value.load_le_bytes(bytes);
    }
}

/// The register file.
#[derive(Debug, Clone)]
pub struct RegisterFile {
    regs: HashMap<&'static str, Register>,
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterFile {
    /// Create every catalog register, zeroed.
    pub fn new() -> Self {
        let regs = CATALOG
            .iter()
            .map(|spec| (spec.name, Register::new(spec)))
            .collect();
        Self { regs }
    }

    /// Number of registers.
    pub fn len(&self) -> usize {
        self.regs.len()
    }

    /// Always false: the catalog is never empty.
    pub fn is_empty(&self) -> bool {
        self.regs.is_empty()
    }

    /// Resolve a register by name.
    ///
    /// # Errors
    ///
    /// Returns `RegisterNotFound` if the name is not in the catalog.
    pub fn lookup(&self, name: &str) -> Result<&Register> {
        self.regs
            .get(name)
            .ok_or_else(|| PhnswError::register_not_found(name))
    }

    /// Resolve a register by name for writing.
    ///
    /// # Errors
    ///
    /// Returns `RegisterNotFound` if the name is not in the catalog.
    pub fn lookup_mut(&mut self, name: &str) -> Result<&mut Register> {
        self.regs
            .get_mut(name)
            .ok_or_else(|| PhnswError::register_not_found(name))
    }

    /// Registers in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = &Register> {
        CATALOG.iter().filter_map(|spec| self.regs.get(spec.name))
    }

    /// Zero every register.
    pub fn reset(&mut self) {
        for reg in self.regs.values_mut() {
            reg.value.clear();
        }
    }

    /// Read any scalar register widened to 128 bits.
    ///
    /// # Errors
    ///
    /// `RegisterNotFound`, or `SizeMismatch` for array registers.
    pub fn read_scalar(&self, name: &str) -> Result<u128> {
        let reg = self.lookup(name)?;
        reg.value
            .as_scalar()
            .ok_or_else(|| PhnswError::size_mismatch(name, "scalar", reg.kind()))
    }

    /// Read a 1-byte register.
    ///
    /// # Errors
    ///
    /// `RegisterNotFound` or `SizeMismatch`.
    pub fn read_u8(&self, name: &str) -> Result<u8> {
        match self.lookup(name)?.value {
            RegisterValue::Scalar8(v) => Ok(v),
            ref other => Err(PhnswError::size_mismatch(name, RegisterKind::U8, other.kind())),
        }
    }

    /// Read a 4-byte register.
    ///
    /// # Errors
    ///
    /// `RegisterNotFound` or `SizeMismatch`.
    pub fn read_u32(&self, name: &str) -> Result<u32> {
        match self.lookup(name)?.value {
            RegisterValue::Scalar32(v) => Ok(v),
            ref other => Err(PhnswError::size_mismatch(name, RegisterKind::U32, other.kind())),
        }
    }

    /// Read an 8-byte register.
    ///
    /// # Errors
    ///
    /// `RegisterNotFound` or `SizeMismatch`.
    pub fn read_u64(&self, name: &str) -> Result<u64> {
        match self.lookup(name)?.value {
            RegisterValue::Scalar64(v) => Ok(v),
            ref other => Err(PhnswError::size_mismatch(name, RegisterKind::U64, other.kind())),
        }
    }

    /// Read a 16-byte register.
    ///
    /// # Errors
    ///
    /// `RegisterNotFound` or `SizeMismatch`.
    pub fn read_u128(&self, name: &str) -> Result<u128> {
        match self.lookup(name)?.value {
            RegisterValue::Scalar128(v) => Ok(v),
            ref other => Err(PhnswError::size_mismatch(name, RegisterKind::U128, other.kind())),
        }
    }

    /// Borrow a byte-array register.
    ///
    /// # Errors
    ///
    /// `RegisterNotFound` or `SizeMismatch`.
    pub fn read_array8(&self, name: &str) -> Result<&[u8]> {
        match &self.lookup(name)?.value {
            RegisterValue::Array8(a) => Ok(a),
            other => Err(PhnswError::size_mismatch(name, "u8[]", other.kind())),
        }
    }

    /// Borrow a word-array register.
    ///
    /// # Errors
    ///
    /// `RegisterNotFound` or `SizeMismatch`.
    pub fn read_array32(&self, name: &str) -> Result<&[u32]> {
        match &self.lookup(name)?.value {
            RegisterValue::Array32(a) => Ok(a),
            other => Err(PhnswError::size_mismatch(name, "u32[]", other.kind())),
        }
    }

    /// Replace a register's value; the shape must match.
    ///
    /// # Errors
    ///
    /// `RegisterNotFound` or `SizeMismatch`.
    pub fn set(&mut self, name: &str, value: RegisterValue) -> Result<()> {
        self.lookup_mut(name)?.set(value)
    }

    /// Write a 1-byte register.
    ///
    /// # Errors
    ///
    /// `RegisterNotFound` or `SizeMismatch`.
    pub fn write_u8(&mut self, name: &str, v: u8) -> Result<()> {
        self.set(name, RegisterValue::Scalar8(v))
    }

    /// Write a 4-byte register.
    ///
    /// # Errors
    ///
    /// `RegisterNotFound` or `SizeMismatch`.
    pub fn write_u32(&mut self, name: &str, v: u32) -> Result<()> {
        self.set(name, RegisterValue::Scalar32(v))
    }

    /// Write an 8-byte register.
    ///
    /// # Errors
    ///
    /// `RegisterNotFound` or `SizeMismatch`.
    pub fn write_u64(&mut self, name: &str, v: u64) -> Result<()> {
        self.set(name, RegisterValue::Scalar64(v))
    }

    /// Write a 16-byte register.
    ///
    /// # Errors
    ///
    /// `RegisterNotFound` or `SizeMismatch`.
    pub fn write_u128(&mut self, name: &str, v: u128) -> Result<()> {
        self.set(name, RegisterValue::Scalar128(v))
    }

    /// Overwrite a byte-array register; lengths must match exactly.
    ///
    /// # Errors
    ///
    /// `RegisterNotFound` or `SizeMismatch`.
    pub fn write_array8(&mut self, name: &str, data: &[u8]) -> Result<()> {
        self.set(name, RegisterValue::Array8(data.into()))
    }

    /// Overwrite a word-array register; lengths must match exactly.
    ///
    /// # Errors
    ///
    /// `RegisterNotFound` or `SizeMismatch`.
    pub fn write_array32(&mut self, name: &str, data: &[u32]) -> Result<()> {
        self.set(name, RegisterValue::Array32(data.into()))
    }

    /// Byte-exact load into a register (truncate / zero-fill).
    ///
    /// # Errors
    ///
    /// `RegisterNotFound`.
    pub fn store_bytes(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        self.lookup_mut(name)?.load_bytes(bytes);
        Ok(())
    }

    /// Copy `min(src, dst)` bytes from `src` into `dst`, zero-filling a
    /// wider destination first.
    ///
    /// # Errors
    ///
    /// `RegisterNotFound` for either name.
    pub fn copy_bytes(&mut self, src: &str, dst: &str) -> Result<()> {
        let image = self.lookup(src)?.value.to_le_bytes();
        self.store_bytes(dst, &image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_is_fully_created() {
        let regs = RegisterFile::new();
        assert_eq!(regs.len(), CATALOG.len());
        assert_eq!(regs.iter().next().map(Register::name), Some("raw1"));
        assert_eq!(regs.lookup("C_dist").unwrap().width(), 240);
        assert_eq!(regs.lookup("dma_res").unwrap().width(), 16);
    }

    #[test]
    fn missing_name_is_register_not_found() {
        let mut regs = RegisterFile::new();
        assert!(matches!(
            regs.lookup("distance_res"),
            Err(PhnswError::RegisterNotFound { name }) if name == "distance_res"
        ));
        assert!(matches!(regs.read_u32("nope"), Err(PhnswError::RegisterNotFound { .. })));
        assert!(matches!(regs.write_u8("nope", 1), Err(PhnswError::RegisterNotFound { .. })));
        assert!(matches!(regs.copy_bytes("i", "nope"), Err(PhnswError::RegisterNotFound { .. })));
        // A failed write never creates the register
        assert!(regs.lookup("nope").is_err());
    }

    #[test]
    fn typed_access_rejects_wrong_width() {
        let mut regs = RegisterFile::new();
        assert!(matches!(regs.read_u32("num1"), Err(PhnswError::SizeMismatch { .. })));
        assert!(matches!(regs.write_u8("i", 3), Err(PhnswError::SizeMismatch { .. })));
        assert!(matches!(regs.read_scalar("raw1"), Err(PhnswError::SizeMismatch { .. })));
        assert!(matches!(
            regs.write_array32("C_dist", &[1, 2, 3]),
            Err(PhnswError::SizeMismatch { .. })
        ));
        assert_eq!(regs.read_u32("i").unwrap(), 0);
    }

    #[test]
    fn typed_round_trips() {
        let mut regs = RegisterFile::new();
        regs.write_u8("num1", 0xAB).unwrap();
        regs.write_u64("dma_addr", 0x1234_5678_9A).unwrap();
        regs.write_u128("dma_res", u128::MAX).unwrap();
        assert_eq!(regs.read_u8("num1").unwrap(), 0xAB);
        assert_eq!(regs.read_u64("dma_addr").unwrap(), 0x1234_5678_9A);
        assert_eq!(regs.read_scalar("dma_res").unwrap(), u128::MAX);
    }

    #[test]
    fn copy_zero_fills_wider_destination() {
        let mut regs = RegisterFile::new();
        regs.write_u64("dma_addr", u64::MAX).unwrap();
        regs.write_u8("num1", 0x7F).unwrap();
        regs.copy_bytes("num1", "dma_addr").unwrap();
        assert_eq!(regs.read_u64("dma_addr").unwrap(), 0x7F);
    }

    #[test]
    fn copy_truncates_to_narrower_destination() {
        let mut regs = RegisterFile::new();
        regs.write_u32("i", 0x0102_0304).unwrap();
        regs.copy_bytes("i", "num2").unwrap();
        assert_eq!(regs.read_u8("num2").unwrap(), 0x04);
    }

    #[test]
    fn copy_between_arrays_is_bytewise() {
        let mut regs = RegisterFile::new();
        let mut words = [0u32; 10];
        words[0] = 0xAABB_CCDD;
        regs.write_array32("list", &words).unwrap();
        regs.copy_bytes("list", "raw1").unwrap();
        let raw = regs.read_array8("raw1").unwrap();
        assert_eq!(&raw[..4], &[0xDD, 0xCC, 0xBB, 0xAA]);
        assert!(raw[40..].iter().all(|&b| b == 0));
    }

    #[test]
    fn reset_zeroes_everything() {
        let mut regs = RegisterFile::new();
        regs.write_u32("C_size", 4).unwrap();
        regs.write_array8("raw2", &[9; 128]).unwrap();
        regs.reset();
        assert_eq!(regs.read_u32("C_size").unwrap(), 0);
        assert!(regs.read_array8("raw2").unwrap().iter().all(|&b| b == 0));
    }

    #[test]
    fn first_scalar_of_array() {
        let mut value = RegisterValue::zeroed(RegisterKind::Array32(3));
        value.load_le_bytes(&[7, 0, 0, 0, 9]);
        assert_eq!(value.first_scalar(), 7);
        assert_eq!(value, RegisterValue::Array32(vec![7, 9, 0].into_boxed_slice()));
    }
}
