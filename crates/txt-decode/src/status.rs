//! `TXT.STS`, `TXT.ERRORCODE` and `TXT.DPR` sub-decoders.
//!
//! Each record decodes from one already-fetched word by mask and shift, and
//! re-encodes only the bits it documents. Reserved bits are never modelled.

use crate::layout::{TXT_DPR, TXT_ERRORCODE, TXT_STS};
use crate::{PhysicalMemory, RegisterReadError};

/// `SENTER.DONE.STS` (bit 0).
pub const STS_SENTER_DONE: u64 = 1 << 0;
/// `SEXIT.DONE.STS` (bit 1).
pub const STS_SEXIT_DONE: u64 = 1 << 1;
/// `MEM-CONFIG-LOCK.STS` (bit 6).
pub const STS_MEM_CONFIG_LOCK: u64 = 1 << 6;
/// `PRIVATE-OPEN.STS` (bit 7).
pub const STS_PRIVATE_OPEN: u64 = 1 << 7;
/// `TXT.LOCALITY1.OPEN.STS` (bit 15).
pub const STS_LOCALITY1_OPEN: u64 = 1 << 15;
/// `TXT.LOCALITY2.OPEN.STS` (bit 16).
pub const STS_LOCALITY2_OPEN: u64 = 1 << 16;
/// Union of every documented `TXT.STS` bit.
pub const STS_DOCUMENTED_BITS: u64 = STS_SENTER_DONE
    | STS_SEXIT_DONE
    | STS_MEM_CONFIG_LOCK
    | STS_PRIVATE_OPEN
    | STS_LOCALITY1_OPEN
    | STS_LOCALITY2_OPEN;

/// Decoded `TXT.STS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct TxtStatus {
    /// `GETSEC[SENTER]` completed.
    pub senter_done: bool,
    /// `GETSEC[SEXIT]` completed.
    pub sexit_done: bool,
    /// Memory configuration is locked.
    pub mem_config_lock: bool,
    /// The TXT private space is open.
    pub private_open: bool,
    /// Locality 1 is open.
    pub locality1_open: bool,
    /// Locality 2 is open.
    pub locality2_open: bool,
}

impl TxtStatus {
    /// Decodes the documented flags of a raw `TXT.STS` word.
    #[must_use]
    pub const fn decode(raw: u64) -> Self {
        Self {
            senter_done: raw & STS_SENTER_DONE != 0,
            sexit_done: raw & STS_SEXIT_DONE != 0,
            mem_config_lock: raw & STS_MEM_CONFIG_LOCK != 0,
            private_open: raw & STS_PRIVATE_OPEN != 0,
            locality1_open: raw & STS_LOCALITY1_OPEN != 0,
            locality2_open: raw & STS_LOCALITY2_OPEN != 0,
        }
    }

    /// Re-encodes the documented flags; reserved bits are zero.
    #[must_use]
    pub const fn encode(self) -> u64 {
        let mut raw = 0;
        if self.senter_done {
            raw |= STS_SENTER_DONE;
        }
        if self.sexit_done {
            raw |= STS_SEXIT_DONE;
        }
        if self.mem_config_lock {
            raw |= STS_MEM_CONFIG_LOCK;
        }
        if self.private_open {
            raw |= STS_PRIVATE_OPEN;
        }
        if self.locality1_open {
            raw |= STS_LOCALITY1_OPEN;
        }
        if self.locality2_open {
            raw |= STS_LOCALITY2_OPEN;
        }
        raw
    }
}

/// `TXT.ERRORCODE` module type, bits 0..=2.
pub const ERRORCODE_MODULE_TYPE_MASK: u32 = 0x7;
/// `TXT.ERRORCODE` class code, bits 4..=9.
pub const ERRORCODE_CLASS_CODE_MASK: u32 = 0x3F << 4;
/// `TXT.ERRORCODE` major error code, bits 10..=14.
pub const ERRORCODE_MAJOR_MASK: u32 = 0x1F << 10;
/// `TXT.ERRORCODE` software source flag, bit 15.
pub const ERRORCODE_SOFTWARE_SOURCE: u32 = 1 << 15;
/// `TXT.ERRORCODE` minor error code, bits 16..=27.
pub const ERRORCODE_MINOR_MASK: u32 = 0xFFF << 16;
/// `TXT.ERRORCODE` type-1 reserved field, bits 28..=29.
pub const ERRORCODE_TYPE1_RESERVED_MASK: u32 = 0x3 << 28;
/// `TXT.ERRORCODE` processor/software flag, bit 30.
pub const ERRORCODE_PROCESSOR_SOFTWARE: u32 = 1 << 30;
/// `TXT.ERRORCODE` valid flag, bit 31.
pub const ERRORCODE_VALID: u32 = 1 << 31;
/// Union of every documented `TXT.ERRORCODE` bit.
pub const ERRORCODE_DOCUMENTED_BITS: u32 = ERRORCODE_MODULE_TYPE_MASK
    | ERRORCODE_CLASS_CODE_MASK
    | ERRORCODE_MAJOR_MASK
    | ERRORCODE_SOFTWARE_SOURCE
    | ERRORCODE_MINOR_MASK
    | ERRORCODE_TYPE1_RESERVED_MASK
    | ERRORCODE_PROCESSOR_SOFTWARE
    | ERRORCODE_VALID;

/// Decoded `TXT.ERRORCODE`.
///
/// The raw word is kept next to this record by its producers; it is the
/// authoritative value for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct TxtErrorCode {
    /// 0: BIOS ACM, 1: Intel TXT.
    pub module_type: u8,
    /// Error class.
    pub class_code: u8,
    /// Major error code.
    pub major_error_code: u8,
    /// `false`: ACM, `true`: MLE.
    pub software_source: bool,
    /// Minor error code.
    pub minor_error_code: u16,
    /// Type-1 reserved field.
    pub type1_reserved: u8,
    /// Error raised by processor software.
    pub processor_software: bool,
    /// The error code is valid.
    pub valid: bool,
}

impl TxtErrorCode {
    /// Decodes a raw `TXT.ERRORCODE` word.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn decode(raw: u32) -> Self {
        Self {
            module_type: (raw & ERRORCODE_MODULE_TYPE_MASK) as u8,
            class_code: ((raw & ERRORCODE_CLASS_CODE_MASK) >> 4) as u8,
            major_error_code: ((raw & ERRORCODE_MAJOR_MASK) >> 10) as u8,
            software_source: raw & ERRORCODE_SOFTWARE_SOURCE != 0,
            minor_error_code: ((raw & ERRORCODE_MINOR_MASK) >> 16) as u16,
            type1_reserved: ((raw & ERRORCODE_TYPE1_RESERVED_MASK) >> 28) as u8,
            processor_software: raw & ERRORCODE_PROCESSOR_SOFTWARE != 0,
            valid: raw & ERRORCODE_VALID != 0,
        }
    }

    /// Re-encodes the documented fields; out-of-range field values are masked.
    #[must_use]
    pub const fn encode(self) -> u32 {
        let mut raw = (self.module_type as u32) & ERRORCODE_MODULE_TYPE_MASK;
        raw |= ((self.class_code as u32) << 4) & ERRORCODE_CLASS_CODE_MASK;
        raw |= ((self.major_error_code as u32) << 10) & ERRORCODE_MAJOR_MASK;
        raw |= ((self.minor_error_code as u32) << 16) & ERRORCODE_MINOR_MASK;
        raw |= ((self.type1_reserved as u32) << 28) & ERRORCODE_TYPE1_RESERVED_MASK;
        if self.software_source {
            raw |= ERRORCODE_SOFTWARE_SOURCE;
        }
        if self.processor_software {
            raw |= ERRORCODE_PROCESSOR_SOFTWARE;
        }
        if self.valid {
            raw |= ERRORCODE_VALID;
        }
        raw
    }
}

/// `TXT.DPR` lock bit, bit 0.
pub const DPR_LOCK: u32 = 1;
/// `TXT.DPR` size in MiB, bits 4..=11.
pub const DPR_SIZE_MASK: u32 = 0xFF << 4;
/// `TXT.DPR` top address in MiB, bits 20..=31.
pub const DPR_TOP_MASK: u32 = 0xFFF << 20;
/// Union of every documented `TXT.DPR` bit.
pub const DPR_DOCUMENTED_BITS: u32 = DPR_LOCK | DPR_SIZE_MASK | DPR_TOP_MASK;

/// Decoded `TXT.DPR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct DmaProtectedRange {
    /// The range is locked.
    pub lock: bool,
    /// Size of the range in MiB.
    pub size: u8,
    /// Top of the range in MiB.
    pub top: u16,
}

impl DmaProtectedRange {
    /// Decodes a raw `TXT.DPR` word.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn decode(raw: u32) -> Self {
        Self {
            lock: raw & DPR_LOCK != 0,
            size: ((raw & DPR_SIZE_MASK) >> 4) as u8,
            top: ((raw & DPR_TOP_MASK) >> 20) as u16,
        }
    }

    /// Re-encodes the documented fields.
    #[must_use]
    pub const fn encode(self) -> u32 {
        let mut raw = ((self.size as u32) << 4) & DPR_SIZE_MASK;
        raw |= ((self.top as u32) << 20) & DPR_TOP_MASK;
        if self.lock {
            raw |= DPR_LOCK;
        }
        raw
    }
}

/// Reads and decodes `TXT.STS`, returning the record and the raw word.
///
/// # Errors
///
/// Returns [`RegisterReadError`] when the read fails.
pub fn read_txt_status<M: PhysicalMemory + ?Sized>(
    mem: &mut M,
    base: u64,
) -> Result<(TxtStatus, u64), RegisterReadError> {
    let raw = TXT_STS.read(mem, base)?;
    Ok((TxtStatus::decode(raw), raw))
}

/// Reads and decodes `TXT.ERRORCODE`, returning the record and the raw word.
///
/// # Errors
///
/// Returns [`RegisterReadError`] when the read fails.
#[allow(clippy::cast_possible_truncation)]
pub fn read_txt_error_code<M: PhysicalMemory + ?Sized>(
    mem: &mut M,
    base: u64,
) -> Result<(TxtErrorCode, u32), RegisterReadError> {
    let raw = TXT_ERRORCODE.read(mem, base)? as u32;
    Ok((TxtErrorCode::decode(raw), raw))
}

/// Reads and decodes `TXT.DPR`, returning the record and the raw word.
///
/// # Errors
///
/// Returns [`RegisterReadError`] when the read fails.
#[allow(clippy::cast_possible_truncation)]
pub fn read_dma_protected_range<M: PhysicalMemory + ?Sized>(
    mem: &mut M,
    base: u64,
) -> Result<(DmaProtectedRange, u32), RegisterReadError> {
    let raw = TXT_DPR.read(mem, base)? as u32;
    Ok((DmaProtectedRange::decode(raw), raw))
}
