//! Decoders for the Intel TXT public register space, the ACM status word,
//! the BIOS data region of the TXT heap, and MSR-backed platform features.
//!
//! Hardware access goes through [`PhysicalMemory`] and
//! [`ModelSpecificRegisters`]; the decoders never touch hardware directly.

/// Error families and context wrappers shared by every decoder.
pub mod error;
pub use error::{
    AccessError, BiosDataError, ErrorFamily, FormatError, MsrReadError, RegisterReadError,
};

/// Raw accessor contracts plus buffer- and table-backed accessors.
pub mod access;
pub use access::{
    AccessWidth, MemoryImage, ModelSpecificRegisters, MsrTable, MsrTableParseError,
    PhysicalMemory,
};

/// TXT public register offsets and the canonical read-order table.
pub mod layout;
pub use layout::{
    RegisterDescriptor, REGISTER_SPACE_READS, TXT_ACM_BOOTSTATUS_OFFSET, TXT_ACMSTATUS_OFFSET,
    TXT_DIDVID_OFFSET, TXT_DPR_OFFSET, TXT_E2STS_OFFSET, TXT_ERRORCODE_OFFSET, TXT_ESTS_OFFSET,
    TXT_HEAP_BASE_OFFSET, TXT_HEAP_SIZE_OFFSET, TXT_MLE_JOIN_OFFSET, TXT_PUBLIC_BASE,
    TXT_PUBLIC_KEY_OFFSET, TXT_PUBLIC_KEY_WORDS, TXT_PUBLIC_SPACE_BYTES, TXT_REGISTER_LAYOUT,
    TXT_SINIT_BASE_OFFSET, TXT_SINIT_SIZE_OFFSET, TXT_STS_OFFSET, TXT_VER_FSBIF_OFFSET,
    TXT_VER_QPIIF_OFFSET,
};

/// Immutable platform parameters.
pub mod config;
pub use config::PlatformConfig;

/// `TXT.STS`, `TXT.ERRORCODE` and `TXT.DPR` sub-decoders.
pub mod status;
pub use status::{
    read_dma_protected_range, read_txt_error_code, read_txt_status, DmaProtectedRange,
    TxtErrorCode, TxtStatus, DPR_DOCUMENTED_BITS, ERRORCODE_DOCUMENTED_BITS, STS_DOCUMENTED_BITS,
};

/// ACM boot-status decoder.
pub mod acm;
pub use acm::{read_acm_status, AcmStatus, ACM_DOCUMENTED_BITS};

/// Full register-space decode and the caller-owned snapshot.
pub mod registers;
pub use registers::{
    decode_register_space, RegisterSnapshot, TxtRegisterSpace, ESTS_TXT_RESET, INTEL_VENDOR_ID,
};

/// BIOS data region parser.
pub mod bios_data;
pub use bios_data::{
    parse_bios_data_region, read_bios_data, MlePlatformState, ParseStage, TxtBiosData,
    TxtBiosMleFlags, VersionBand, BIOS_DATA_DECODED_BYTES, BIOS_DATA_HEADER_BYTES,
};

/// MSR-backed platform feature queries.
pub mod msr;
pub use msr::{
    allows_vmx_in_smx, feature_control_locked, has_smrr, platform_id, smrr_info,
    txt_leaves_enabled, Msr, PlatformFeatures, SmrrInfo,
};

#[cfg(test)]
use proptest as _;
