//! Raw accessor contracts and file-backed implementations.
//!
//! The decoders never touch hardware directly. Live platform I/O, offline
//! dump files and test fixtures all sit behind [`PhysicalMemory`] and
//! [`ModelSpecificRegisters`].

use std::collections::BTreeMap;

use thiserror::Error;

use crate::AccessError;

/// Width of a single physical-memory read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum AccessWidth {
    /// 8-bit read.
    Byte,
    /// 16-bit read.
    Word,
    /// 32-bit read.
    Dword,
    /// 64-bit read.
    Qword,
}

impl AccessWidth {
    /// Number of bytes covered by one read.
    #[must_use]
    pub const fn bytes(self) -> usize {
        match self {
            Self::Byte => 1,
            Self::Word => 2,
            Self::Dword => 4,
            Self::Qword => 8,
        }
    }

    /// Number of bits covered by one read.
    #[must_use]
    pub const fn bits(self) -> u8 {
        match self {
            Self::Byte => 8,
            Self::Word => 16,
            Self::Dword => 32,
            Self::Qword => 64,
        }
    }

    /// Converts a bit width into an access width.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            8 => Some(Self::Byte),
            16 => Some(Self::Word),
            32 => Some(Self::Dword),
            64 => Some(Self::Qword),
            _ => None,
        }
    }
}

/// Physical-memory read contract consumed by the register and heap decoders.
pub trait PhysicalMemory {
    /// Reads `width` little-endian bytes at `address`, zero-extended to 64 bits.
    ///
    /// # Errors
    ///
    /// Returns an [`AccessError`] when the address is unmapped or unreadable.
    fn read_physical(&mut self, address: u64, width: AccessWidth) -> Result<u64, AccessError>;
}

/// Model-specific register read contract consumed by the feature queries.
pub trait ModelSpecificRegisters {
    /// Reads MSR `index` on logical CPU `cpu`.
    ///
    /// # Errors
    ///
    /// Returns an [`AccessError`] when the CPU or register does not exist.
    fn read_msr(&mut self, cpu: u32, index: u32) -> Result<u64, AccessError>;
}

/// Byte buffer mapped at a fixed physical base address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryImage {
    base: u64,
    bytes: Box<[u8]>,
}

impl MemoryImage {
    /// Maps `bytes` so that `bytes[0]` lives at physical address `base`.
    #[must_use]
    pub fn new(base: u64, bytes: impl Into<Box<[u8]>>) -> Self {
        Self {
            base,
            bytes: bytes.into(),
        }
    }

    /// Allocates a zero-filled image of `len` bytes at `base`.
    #[must_use]
    pub fn zeroed(base: u64, len: usize) -> Self {
        Self::new(base, vec![0; len])
    }

    /// Physical address of the first mapped byte.
    #[must_use]
    pub const fn base(&self) -> u64 {
        self.base
    }

    /// Number of mapped bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` when nothing is mapped.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Mapped bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Stores `value` little-endian at `address`, truncated to `width`.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::Unmapped`] when the write does not fit the image.
    pub fn write(
        &mut self,
        address: u64,
        width: AccessWidth,
        value: u64,
    ) -> Result<(), AccessError> {
        let range = self.range(address, width)?;
        let le = value.to_le_bytes();
        self.bytes[range].copy_from_slice(&le[..width.bytes()]);
        Ok(())
    }

    fn range(
        &self,
        address: u64,
        width: AccessWidth,
    ) -> Result<std::ops::Range<usize>, AccessError> {
        let unmapped = AccessError::Unmapped { address };
        let start = address
            .checked_sub(self.base)
            .and_then(|offset| usize::try_from(offset).ok())
            .ok_or(unmapped)?;
        let end = start.checked_add(width.bytes()).ok_or(unmapped)?;
        if end > self.bytes.len() {
            return Err(unmapped);
        }
        Ok(start..end)
    }
}

impl PhysicalMemory for MemoryImage {
    fn read_physical(&mut self, address: u64, width: AccessWidth) -> Result<u64, AccessError> {
        let range = self.range(address, width)?;
        let mut le = [0u8; 8];
        le[..width.bytes()].copy_from_slice(&self.bytes[range]);
        Ok(u64::from_le_bytes(le))
    }
}

/// Failure while parsing a textual MSR table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {message}")]
pub struct MsrTableParseError {
    /// 1-indexed line number.
    pub line: usize,
    /// What was wrong with the line.
    pub message: String,
}

/// In-memory MSR values keyed by `(cpu, index)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MsrTable {
    values: BTreeMap<(u32, u32), u64>,
}

impl MsrTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `value` for MSR `index` on `cpu`, replacing any previous value.
    pub fn insert(&mut self, cpu: u32, index: u32, value: u64) {
        self.values.insert((cpu, index), value);
    }

    /// Builder form of [`MsrTable::insert`].
    #[must_use]
    pub fn with(mut self, cpu: u32, index: u32, value: u64) -> Self {
        self.insert(cpu, index, value);
        self
    }

    /// Number of recorded registers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` when no registers are recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Parses `<index> <value>` lines, both hex with optional `0x`.
    ///
    /// A line may start with `cpu=<n>` (decimal) to target a CPU other than 0.
    /// Text after `#` is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`MsrTableParseError`] for the first malformed line.
    pub fn parse(text: &str) -> Result<Self, MsrTableParseError> {
        let mut table = Self::new();

        for (number, raw_line) in text.lines().enumerate() {
            let line = number + 1;
            let content = raw_line.split('#').next().unwrap_or("").trim();
            if content.is_empty() {
                continue;
            }

            let mut tokens = content.split_whitespace().peekable();
            let mut cpu = 0;
            if let Some(&first) = tokens.peek() {
                if let Some(cpu_token) = first.strip_prefix("cpu=") {
                    cpu = cpu_token.parse::<u32>().map_err(|_| MsrTableParseError {
                        line,
                        message: format!("invalid cpu index `{cpu_token}`"),
                    })?;
                    tokens.next();
                }
            }

            let index_token = tokens.next().ok_or_else(|| MsrTableParseError {
                line,
                message: "missing msr index".to_string(),
            })?;
            let value_token = tokens.next().ok_or_else(|| MsrTableParseError {
                line,
                message: "missing msr value".to_string(),
            })?;
            if let Some(extra) = tokens.next() {
                return Err(MsrTableParseError {
                    line,
                    message: format!("unexpected token `{extra}`"),
                });
            }

            let index = u32::from_str_radix(strip_hex_prefix(index_token), 16).map_err(|_| {
                MsrTableParseError {
                    line,
                    message: format!("invalid msr index `{index_token}`"),
                }
            })?;
            let value = u64::from_str_radix(strip_hex_prefix(value_token), 16).map_err(|_| {
                MsrTableParseError {
                    line,
                    message: format!("invalid msr value `{value_token}`"),
                }
            })?;

            table.insert(cpu, index, value);
        }

        Ok(table)
    }
}

fn strip_hex_prefix(token: &str) -> &str {
    token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .unwrap_or(token)
}

impl ModelSpecificRegisters for MsrTable {
    fn read_msr(&mut self, cpu: u32, index: u32) -> Result<u64, AccessError> {
        if let Some(value) = self.values.get(&(cpu, index)) {
            return Ok(*value);
        }

        if self.values.keys().any(|(known_cpu, _)| *known_cpu == cpu) {
            Err(AccessError::MsrUnsupported { cpu, index })
        } else {
            Err(AccessError::InvalidCpu { cpu })
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{AccessWidth, MemoryImage, ModelSpecificRegisters, MsrTable, PhysicalMemory};
    use crate::AccessError;

    #[rstest]
    #[case(8, AccessWidth::Byte, 1)]
    #[case(16, AccessWidth::Word, 2)]
    #[case(32, AccessWidth::Dword, 4)]
    #[case(64, AccessWidth::Qword, 8)]
    fn width_conversions_agree(#[case] bits: u8, #[case] width: AccessWidth, #[case] bytes: usize) {
        assert_eq!(AccessWidth::from_bits(bits), Some(width));
        assert_eq!(width.bits(), bits);
        assert_eq!(width.bytes(), bytes);
    }

    #[test]
    fn unknown_widths_are_rejected() {
        assert_eq!(AccessWidth::from_bits(0), None);
        assert_eq!(AccessWidth::from_bits(24), None);
        assert_eq!(AccessWidth::from_bits(128), None);
    }

    #[test]
    fn image_reads_are_little_endian_and_zero_extended() {
        let mut image =
            MemoryImage::new(0x1000, vec![0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88]);
        assert_eq!(image.read_physical(0x1000, AccessWidth::Byte), Ok(0x11));
        assert_eq!(image.read_physical(0x1000, AccessWidth::Word), Ok(0x2211));
        assert_eq!(image.read_physical(0x1004, AccessWidth::Dword), Ok(0x8877_6655));
        assert_eq!(
            image.read_physical(0x1000, AccessWidth::Qword),
            Ok(0x8877_6655_4433_2211)
        );
    }

    #[test]
    fn image_rejects_reads_outside_the_mapping() {
        let mut image = MemoryImage::zeroed(0x1000, 8);
        assert_eq!(
            image.read_physical(0x0FFF, AccessWidth::Byte),
            Err(AccessError::Unmapped { address: 0x0FFF })
        );
        assert_eq!(
            image.read_physical(0x1006, AccessWidth::Dword),
            Err(AccessError::Unmapped { address: 0x1006 })
        );
        assert_eq!(
            image.read_physical(u64::MAX, AccessWidth::Qword),
            Err(AccessError::Unmapped { address: u64::MAX })
        );
    }

    #[test]
    fn image_write_truncates_to_width() {
        let mut image = MemoryImage::zeroed(0, 4);
        image
            .write(0, AccessWidth::Word, 0xAABB_CCDD)
            .expect("write fits");
        assert_eq!(image.as_bytes(), &[0xDD, 0xCC, 0x00, 0x00]);
        assert_eq!(
            image.write(3, AccessWidth::Word, 0),
            Err(AccessError::Unmapped { address: 3 })
        );
    }

    #[test]
    fn msr_table_distinguishes_missing_cpu_from_missing_register() {
        let mut table = MsrTable::new().with(0, 0x3A, 0x5);
        assert_eq!(table.read_msr(0, 0x3A), Ok(0x5));
        assert_eq!(
            table.read_msr(0, 0xFE),
            Err(AccessError::MsrUnsupported { cpu: 0, index: 0xFE })
        );
        assert_eq!(table.read_msr(3, 0x3A), Err(AccessError::InvalidCpu { cpu: 3 }));
    }

    #[test]
    fn msr_table_parses_hex_lines_comments_and_cpu_prefix() {
        let text = "\
# IA32_FEATURE_CONTROL
0x3a 0xff07
fe 0x800   # MTRRCAP with SMRR

cpu=1 0x3A 0x1
";
        let mut table = MsrTable::parse(text).expect("valid table");
        assert_eq!(table.len(), 3);
        assert_eq!(table.read_msr(0, 0x3A), Ok(0xFF07));
        assert_eq!(table.read_msr(0, 0xFE), Ok(0x800));
        assert_eq!(table.read_msr(1, 0x3A), Ok(0x1));
    }

    #[rstest]
    #[case("0x3a", 1, "missing msr value")]
    #[case("zz 0x1", 1, "invalid msr index `zz`")]
    #[case("0x3a 0x1 0x2", 1, "unexpected token `0x2`")]
    #[case("\ncpu=x 0x3a 0x1", 2, "invalid cpu index `x`")]
    fn msr_table_reports_malformed_lines(
        #[case] text: &str,
        #[case] line: usize,
        #[case] message: &str,
    ) {
        let error = MsrTable::parse(text).expect_err("malformed table");
        assert_eq!(error.line, line);
        assert_eq!(error.message, message);
    }
}
