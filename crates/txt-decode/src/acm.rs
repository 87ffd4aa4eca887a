//! ACM boot-status decoder.

use crate::layout::TXT_ACM_BOOTSTATUS;
use crate::{PhysicalMemory, RegisterReadError};

/// Module type, bits 0..=3.
pub const ACM_MODULE_TYPE_MASK: u64 = 0xF;
/// Class code, bits 4..=9.
pub const ACM_CLASS_CODE_MASK: u64 = 0x3F << 4;
/// Major error code, bits 10..=14.
pub const ACM_MAJOR_MASK: u64 = 0x1F << 10;
/// ACM started flag, bit 15.
pub const ACM_STARTED: u64 = 1 << 15;
/// Minor error code, bits 16..=27.
pub const ACM_MINOR_MASK: u64 = 0xFFF << 16;
/// Valid flag, bit 31.
pub const ACM_VALID: u64 = 1 << 31;
/// Union of every documented ACM status bit.
pub const ACM_DOCUMENTED_BITS: u64 = ACM_MODULE_TYPE_MASK
    | ACM_CLASS_CODE_MASK
    | ACM_MAJOR_MASK
    | ACM_STARTED
    | ACM_MINOR_MASK
    | ACM_VALID;

/// Decoded ACM status word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct AcmStatus {
    /// The status word is valid.
    pub valid: bool,
    /// Minor error code.
    pub minor_error_code: u16,
    /// The ACM started executing.
    pub acm_started: bool,
    /// Major error code.
    pub major_error_code: u8,
    /// Error class.
    pub class_code: u8,
    /// Module type.
    pub module_type: u8,
}

impl AcmStatus {
    /// Decodes a raw ACM status word.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn decode(raw: u64) -> Self {
        Self {
            valid: raw & ACM_VALID != 0,
            minor_error_code: ((raw & ACM_MINOR_MASK) >> 16) as u16,
            acm_started: raw & ACM_STARTED != 0,
            major_error_code: ((raw & ACM_MAJOR_MASK) >> 10) as u8,
            class_code: ((raw & ACM_CLASS_CODE_MASK) >> 4) as u8,
            module_type: (raw & ACM_MODULE_TYPE_MASK) as u8,
        }
    }

    /// Re-encodes the documented fields; out-of-range field values are masked.
    #[must_use]
    pub const fn encode(self) -> u64 {
        let mut raw = (self.module_type as u64) & ACM_MODULE_TYPE_MASK;
        raw |= ((self.class_code as u64) << 4) & ACM_CLASS_CODE_MASK;
        raw |= ((self.major_error_code as u64) << 10) & ACM_MAJOR_MASK;
        raw |= ((self.minor_error_code as u64) << 16) & ACM_MINOR_MASK;
        if self.acm_started {
            raw |= ACM_STARTED;
        }
        if self.valid {
            raw |= ACM_VALID;
        }
        raw
    }

    /// The initial boot block was measured: the word is valid and the ACM ran.
    #[must_use]
    pub const fn ibb_measured(self) -> bool {
        self.valid && self.acm_started
    }
}

/// Reads and decodes the ACM status word relative to the TXT public `base`.
///
/// Independent of any register-space snapshot; it always issues its own read.
///
/// # Errors
///
/// Returns [`RegisterReadError`] when the read fails.
pub fn read_acm_status<M: PhysicalMemory + ?Sized>(
    mem: &mut M,
    base: u64,
) -> Result<AcmStatus, RegisterReadError> {
    TXT_ACM_BOOTSTATUS.read(mem, base).map(AcmStatus::decode)
}
