//! Platform feature queries over model-specific registers.
//!
//! Every query performs its own reads; nothing is cached between calls.

use log::{debug, warn};

use crate::{ModelSpecificRegisters, MsrReadError};

/// Architectural MSR address paired with its SDM name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Msr {
    /// MSR index passed to `RDMSR`.
    pub index: u32,
    /// SDM name used in error reports.
    pub name: &'static str,
}

impl Msr {
    const fn new(index: u32, name: &'static str) -> Self {
        Self { index, name }
    }

    /// Reads this MSR on `cpu`, naming it in any failure.
    ///
    /// # Errors
    ///
    /// Returns [`MsrReadError`] wrapping the accessor failure.
    pub fn read<M: ModelSpecificRegisters + ?Sized>(
        self,
        msrs: &mut M,
        cpu: u32,
    ) -> Result<u64, MsrReadError> {
        match msrs.read_msr(cpu, self.index) {
            Ok(value) => {
                debug!("{} ({:#x}) on cpu {cpu} = {value:#x}", self.name, self.index);
                Ok(value)
            }
            Err(source) => {
                warn!("{} ({:#x}) unreadable on cpu {cpu}: {source}", self.name, self.index);
                Err(MsrReadError {
                    register: self.name,
                    index: self.index,
                    source,
                })
            }
        }
    }
}

/// `IA32_PLATFORM_ID`.
pub const IA32_PLATFORM_ID: Msr = Msr::new(0x17, "IA32_PLATFORM_ID");
/// `IA32_FEATURE_CONTROL`.
pub const IA32_FEATURE_CONTROL: Msr = Msr::new(0x3A, "IA32_FEATURE_CONTROL");
/// `IA32_MTRRCAP`.
pub const IA32_MTRRCAP: Msr = Msr::new(0xFE, "IA32_MTRRCAP");
/// `IA32_SMRR_PHYSBASE`.
pub const IA32_SMRR_PHYSBASE: Msr = Msr::new(0x1F2, "IA32_SMRR_PHYSBASE");
/// `IA32_SMRR_PHYSMASK`.
pub const IA32_SMRR_PHYSMASK: Msr = Msr::new(0x1F3, "IA32_SMRR_PHYSMASK");

/// `IA32_MTRRCAP` SMRR support, bit 11.
pub const MTRRCAP_SMRR: u64 = 1 << 11;
/// `IA32_SMRR_PHYSMASK` valid, bit 11.
pub const SMRR_PHYSMASK_VALID: u64 = 1 << 11;
/// SMRR base/mask field, bits 12..=31.
pub const SMRR_ADDRESS_MASK: u64 = 0xF_FFFF << 12;
/// `IA32_FEATURE_CONTROL` lock, bit 0.
pub const FEATURE_CONTROL_LOCK: u64 = 1;
/// Mask tested by [`allows_vmx_in_smx`].
///
/// The three bits are AND-combined, which leaves an empty mask, so the test
/// passes for every `IA32_FEATURE_CONTROL` value.
pub const FEATURE_CONTROL_VMX_IN_SMX_MASK: u64 = (1 << 1) & (1 << 5) & (1 << 6);
/// `IA32_FEATURE_CONTROL` local SENTER enables, bits 8..=15.
pub const FEATURE_CONTROL_SENTER_LOCAL: u64 = 0xFF << 8;
/// `IA32_FEATURE_CONTROL` global SENTER enable, bit 16.
pub const FEATURE_CONTROL_SENTER_GLOBAL: u64 = 1 << 16;

/// System-management range register configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct SmrrInfo {
    /// `IA32_SMRR_PHYSMASK` valid bit.
    pub active: bool,
    /// Base in 4 KiB pages, bits 12..=31 of `IA32_SMRR_PHYSBASE`.
    pub phys_base: u64,
    /// Mask in 4 KiB pages, bits 12..=31 of `IA32_SMRR_PHYSMASK`.
    pub phys_mask: u64,
}

/// Reports whether the CPU implements SMRR.
///
/// # Errors
///
/// Returns [`MsrReadError`] when `IA32_MTRRCAP` cannot be read.
pub fn has_smrr<M: ModelSpecificRegisters + ?Sized>(
    msrs: &mut M,
    cpu: u32,
) -> Result<bool, MsrReadError> {
    Ok(IA32_MTRRCAP.read(msrs, cpu)? & MTRRCAP_SMRR != 0)
}

/// Reads the SMRR base and mask.
///
/// # Errors
///
/// Returns [`MsrReadError`] naming whichever of the two MSRs failed.
pub fn smrr_info<M: ModelSpecificRegisters + ?Sized>(
    msrs: &mut M,
    cpu: u32,
) -> Result<SmrrInfo, MsrReadError> {
    let base = IA32_SMRR_PHYSBASE.read(msrs, cpu)?;
    let mask = IA32_SMRR_PHYSMASK.read(msrs, cpu)?;
    Ok(SmrrInfo {
        active: mask & SMRR_PHYSMASK_VALID != 0,
        phys_base: (base & SMRR_ADDRESS_MASK) >> 12,
        phys_mask: (mask & SMRR_ADDRESS_MASK) >> 12,
    })
}

/// Reports whether `IA32_FEATURE_CONTROL` is locked.
///
/// # Errors
///
/// Returns [`MsrReadError`] when `IA32_FEATURE_CONTROL` cannot be read.
pub fn feature_control_locked<M: ModelSpecificRegisters + ?Sized>(
    msrs: &mut M,
    cpu: u32,
) -> Result<bool, MsrReadError> {
    Ok(IA32_FEATURE_CONTROL.read(msrs, cpu)? & FEATURE_CONTROL_LOCK != 0)
}

/// Returns the raw `IA32_PLATFORM_ID` value.
///
/// # Errors
///
/// Returns [`MsrReadError`] when `IA32_PLATFORM_ID` cannot be read.
pub fn platform_id<M: ModelSpecificRegisters + ?Sized>(
    msrs: &mut M,
    cpu: u32,
) -> Result<u64, MsrReadError> {
    IA32_PLATFORM_ID.read(msrs, cpu)
}

/// Tests [`FEATURE_CONTROL_VMX_IN_SMX_MASK`] against `IA32_FEATURE_CONTROL`.
///
/// The read still happens, so an inaccessible MSR is reported rather than
/// answered with `true`.
///
/// # Errors
///
/// Returns [`MsrReadError`] when `IA32_FEATURE_CONTROL` cannot be read.
#[allow(clippy::bad_bit_mask)]
pub fn allows_vmx_in_smx<M: ModelSpecificRegisters + ?Sized>(
    msrs: &mut M,
    cpu: u32,
) -> Result<bool, MsrReadError> {
    let feature_control = IA32_FEATURE_CONTROL.read(msrs, cpu)?;
    Ok(feature_control & FEATURE_CONTROL_VMX_IN_SMX_MASK == FEATURE_CONTROL_VMX_IN_SMX_MASK)
}

/// Reports whether GETSEC leaves are enabled: either every local SENTER
/// enable bit or the global enable is set.
///
/// # Errors
///
/// Returns [`MsrReadError`] when `IA32_FEATURE_CONTROL` cannot be read.
pub fn txt_leaves_enabled<M: ModelSpecificRegisters + ?Sized>(
    msrs: &mut M,
    cpu: u32,
) -> Result<bool, MsrReadError> {
    let feature_control = IA32_FEATURE_CONTROL.read(msrs, cpu)?;
    Ok(feature_control & FEATURE_CONTROL_SENTER_LOCAL == FEATURE_CONTROL_SENTER_LOCAL
        || feature_control & FEATURE_CONTROL_SENTER_GLOBAL != 0)
}

/// Every feature query evaluated on one CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct PlatformFeatures {
    /// CPU the registers were read on.
    pub cpu: u32,
    /// Raw `IA32_PLATFORM_ID`.
    pub platform_id: u64,
    /// `IA32_FEATURE_CONTROL` is locked.
    pub feature_control_locked: bool,
    /// VMX may run inside SMX.
    pub allows_vmx_in_smx: bool,
    /// GETSEC leaves are enabled.
    pub txt_leaves_enabled: bool,
    /// SMRR is implemented.
    pub has_smrr: bool,
    /// SMRR configuration, read only when SMRR is implemented.
    pub smrr: Option<SmrrInfo>,
}

impl PlatformFeatures {
    /// Runs every query against `cpu`, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the [`MsrReadError`] of the first MSR that cannot be read.
    pub fn query<M: ModelSpecificRegisters + ?Sized>(
        msrs: &mut M,
        cpu: u32,
    ) -> Result<Self, MsrReadError> {
        let has_smrr = has_smrr(msrs, cpu)?;
        let smrr = if has_smrr {
            Some(smrr_info(msrs, cpu)?)
        } else {
            None
        };

        Ok(Self {
            cpu,
            platform_id: platform_id(msrs, cpu)?,
            feature_control_locked: feature_control_locked(msrs, cpu)?,
            allows_vmx_in_smx: allows_vmx_in_smx(msrs, cpu)?,
            txt_leaves_enabled: txt_leaves_enabled(msrs, cpu)?,
            has_smrr,
            smrr,
        })
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::{AccessError, MsrTable};

    #[rstest]
    #[case(0, false)]
    #[case(1 << 11, true)]
    #[case(!(1 << 11), false)]
    fn smrr_support_follows_mtrrcap_bit_11(#[case] mtrrcap: u64, #[case] expected: bool) {
        let mut msrs = MsrTable::new().with(0, 0xFE, mtrrcap);
        assert_eq!(has_smrr(&mut msrs, 0), Ok(expected));
    }

    #[test]
    fn smrr_info_extracts_page_fields() {
        let mut msrs = MsrTable::new()
            .with(0, 0x1F2, 0x7B00_0006)
            .with(0, 0x1F3, 0xFF80_0800);
        assert_eq!(
            smrr_info(&mut msrs, 0),
            Ok(SmrrInfo {
                active: true,
                phys_base: 0x7B000,
                phys_mask: 0xFF800,
            })
        );
    }

    #[test]
    fn smrr_info_names_the_missing_mask() {
        let mut msrs = MsrTable::new().with(0, 0x1F2, 0);
        let error = smrr_info(&mut msrs, 0).expect_err("mask missing");
        assert_eq!(error.register, "IA32_SMRR_PHYSMASK");
        assert_eq!(
            error.to_string(),
            format!("cannot access MSR IA32_SMRR_PHYSMASK: {}", error.source)
        );
    }

    #[rstest]
    #[case(0x0, false)]
    #[case(0x1, true)]
    #[case(0xFF05, true)]
    #[case(0xFF04, false)]
    fn feature_control_lock_bit(#[case] raw: u64, #[case] locked: bool) {
        let mut msrs = MsrTable::new().with(0, 0x3A, raw);
        assert_eq!(feature_control_locked(&mut msrs, 0), Ok(locked));
    }

    #[rstest]
    #[case(0x0)]
    #[case(0x62)]
    #[case(u64::MAX)]
    fn vmx_in_smx_mask_is_empty(#[case] raw: u64) {
        assert_eq!(FEATURE_CONTROL_VMX_IN_SMX_MASK, 0);
        let mut msrs = MsrTable::new().with(0, 0x3A, raw);
        assert_eq!(allows_vmx_in_smx(&mut msrs, 0), Ok(true));
    }

    #[test]
    fn vmx_in_smx_still_reports_unreadable_msr() {
        let mut msrs = MsrTable::new();
        let error = allows_vmx_in_smx(&mut msrs, 0).expect_err("no msrs");
        assert_eq!(error.access_error(), AccessError::InvalidCpu { cpu: 0 });
        assert_eq!(error.index, 0x3A);
    }

    #[rstest]
    #[case::none(0x0000_0005, false)]
    #[case::all_local(0x0000_FF05, true)]
    #[case::partial_local(0x0000_7F05, false)]
    #[case::global(0x0001_0005, true)]
    #[case::both(0x0001_FF05, true)]
    fn txt_leaves(#[case] raw: u64, #[case] enabled: bool) {
        let mut msrs = MsrTable::new().with(0, 0x3A, raw);
        assert_eq!(txt_leaves_enabled(&mut msrs, 0), Ok(enabled));
    }

    #[test]
    fn platform_id_is_raw() {
        let mut msrs = MsrTable::new().with(2, 0x17, 0x0010_0000_0000_0000);
        assert_eq!(platform_id(&mut msrs, 2), Ok(0x0010_0000_0000_0000));
    }

    fn platform() -> MsrTable {
        MsrTable::new()
            .with(0, 0x17, 0x0004_0000_0000_0000)
            .with(0, 0x3A, 0x0001_FF07)
            .with(0, 0xFE, 0x0D0A)
            .with(0, 0x1F2, 0x7B00_0006)
            .with(0, 0x1F3, 0xFF80_0800)
    }

    #[test]
    fn query_collects_every_feature() {
        let features = PlatformFeatures::query(&mut platform(), 0).expect("complete table");
        assert_eq!(
            features,
            PlatformFeatures {
                cpu: 0,
                platform_id: 0x0004_0000_0000_0000,
                feature_control_locked: true,
                allows_vmx_in_smx: true,
                txt_leaves_enabled: true,
                has_smrr: true,
                smrr: Some(SmrrInfo {
                    active: true,
                    phys_base: 0x7B000,
                    phys_mask: 0xFF800,
                }),
            }
        );
    }

    #[test]
    fn query_skips_smrr_registers_without_smrr() {
        let mut msrs = MsrTable::new()
            .with(0, 0x17, 0)
            .with(0, 0x3A, 0)
            .with(0, 0xFE, 0);
        let features = PlatformFeatures::query(&mut msrs, 0).expect("smrr not needed");
        assert!(!features.has_smrr);
        assert_eq!(features.smrr, None);
    }

    #[test]
    fn query_stops_at_first_missing_register() {
        let mut msrs = MsrTable::new().with(0, 0xFE, 0).with(0, 0x17, 0);
        let error = PlatformFeatures::query(&mut msrs, 0).expect_err("feature control missing");
        assert_eq!(error.register, "IA32_FEATURE_CONTROL");
        assert_eq!(
            error.access_error(),
            AccessError::MsrUnsupported { cpu: 0, index: 0x3A }
        );
    }
}
