//! BIOS data region parser for the head of the TXT heap.
//!
//! The region is a little-endian record whose tail depends on its `Version`:
//!
//! | offset | width | field             | present when |
//! |--------|-------|-------------------|--------------|
//! | 0      | 8     | heap element size | always       |
//! | 8      | 4     | `Version`         | always       |
//! | 12     | 4     | `BiosSinitSize`   | always       |
//! | 16     | 8     | reserved          | always       |
//! | 24     | 8     | reserved          | always       |
//! | 32     | 4     | `NumLogProcs`     | always       |
//! | 36     | 4     | `SinitFlags`      | 3 <= v < 5   |
//! | 36     | 4     | `MleFlags`        | v >= 5       |
//!
//! Bytes after the last understood field are ignored.

use log::{debug, warn};

use crate::{
    AccessWidth, BiosDataError, FormatError, PhysicalMemory, RegisterReadError, TxtRegisterSpace,
};

/// Oldest BIOS data version with a decodable layout.
pub const BIOS_DATA_MIN_VERSION: u32 = 2;
/// Smallest `BiosSinitSize` that covers the region's own header.
pub const BIOS_SINIT_SIZE_MIN: u32 = 8;
/// Bytes read before any version-gated field.
pub const BIOS_DATA_HEADER_BYTES: usize = 36;
/// Most bytes of a region any known version decodes: the header plus one
/// flags word.
pub const BIOS_DATA_DECODED_BYTES: u64 = BIOS_DATA_HEADER_BYTES as u64 + 4;

/// `MleFlags` ACPI PPI support, bit 0.
pub const MLE_FLAGS_ACPI_PPI: u32 = 1;
/// `MleFlags` platform type, bits 1..=2.
pub const MLE_FLAGS_PLATFORM_MASK: u32 = 0b110;
/// Platform-type value for client platforms.
pub const MLE_FLAGS_PLATFORM_CLIENT: u32 = 0b010;
/// Platform-type value for server platforms.
pub const MLE_FLAGS_PLATFORM_SERVER: u32 = 0b100;

/// Layout family selected by the region's `Version`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum VersionBand {
    /// Versions 0 and 1; rejected.
    Legacy,
    /// Version 2; header only.
    Base,
    /// Versions 3 and 4; header and `SinitFlags`.
    SinitFlags,
    /// Version 5 and later; header and `MleFlags`.
    MleFlags,
}

impl VersionBand {
    /// Classifies a BIOS data version.
    #[must_use]
    pub const fn from_version(version: u32) -> Self {
        match version {
            0 | 1 => Self::Legacy,
            2 => Self::Base,
            3 | 4 => Self::SinitFlags,
            _ => Self::MleFlags,
        }
    }
}

/// Parser progression: `Header -> (SinitFlags | MleFlags)? -> Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseStage {
    /// Size prefix and mandatory header fields.
    Header,
    /// `SinitFlags` word.
    SinitFlags,
    /// `MleFlags` word.
    MleFlags,
    /// Nothing else is understood for this version.
    Done,
}

impl ParseStage {
    /// Stage that follows `self` for a region of the given `version`.
    #[must_use]
    pub const fn next(self, version: u32) -> Self {
        match self {
            Self::Header => match VersionBand::from_version(version) {
                VersionBand::SinitFlags => Self::SinitFlags,
                VersionBand::MleFlags => Self::MleFlags,
                VersionBand::Legacy | VersionBand::Base => Self::Done,
            },
            Self::SinitFlags | Self::MleFlags | Self::Done => Self::Done,
        }
    }
}

/// Platform type carried in `MleFlags` bits 1..=2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum MlePlatformState {
    /// Neither client nor server (`flags & 0b110` is `0b000` or `0b110`).
    Neither,
    /// Client platform (`flags & 0b110 == 0b010`).
    Client,
    /// Server platform (`flags & 0b110 == 0b100`).
    Server,
}

/// Decoded `MleFlags` word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct TxtBiosMleFlags {
    /// BIOS supports the ACPI physical presence interface.
    pub supports_acpi_ppi: bool,
    /// Legacy platform state. No bit of `MleFlags` maps to it, so decoding
    /// always leaves it `false`.
    pub is_legacy_state: bool,
    /// Server platform state.
    pub is_server_state: bool,
    /// Client platform state.
    pub is_client_state: bool,
}

impl TxtBiosMleFlags {
    /// Decodes a raw `MleFlags` word.
    #[must_use]
    pub const fn decode(raw: u32) -> Self {
        let platform = raw & MLE_FLAGS_PLATFORM_MASK;
        Self {
            supports_acpi_ppi: raw & MLE_FLAGS_ACPI_PPI != 0,
            is_legacy_state: false,
            is_server_state: platform == MLE_FLAGS_PLATFORM_SERVER,
            is_client_state: platform == MLE_FLAGS_PLATFORM_CLIENT,
        }
    }

    /// Re-encodes the ACPI PPI bit and the platform type.
    #[must_use]
    pub const fn encode(self) -> u32 {
        let mut raw = 0;
        if self.supports_acpi_ppi {
            raw |= MLE_FLAGS_ACPI_PPI;
        }
        if self.is_client_state {
            raw |= MLE_FLAGS_PLATFORM_CLIENT;
        } else if self.is_server_state {
            raw |= MLE_FLAGS_PLATFORM_SERVER;
        }
        raw
    }

    /// Platform type as a single state.
    #[must_use]
    pub const fn platform_state(self) -> MlePlatformState {
        if self.is_client_state {
            MlePlatformState::Client
        } else if self.is_server_state {
            MlePlatformState::Server
        } else {
            MlePlatformState::Neither
        }
    }
}

/// Decoded BIOS data region.
///
/// `sinit_flags` and `mle_flags` are `Some` only for the versions that
/// define them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct TxtBiosData {
    /// Heap element size preceding the BIOS data, including itself.
    pub region_size: u64,
    /// `Version`.
    pub version: u32,
    /// `BiosSinitSize`.
    pub bios_sinit_size: u32,
    /// First reserved word.
    pub reserved1: u64,
    /// Second reserved word.
    pub reserved2: u64,
    /// `NumLogProcs`.
    pub num_log_procs: u32,
    /// `SinitFlags`, versions 3 and 4.
    pub sinit_flags: Option<u32>,
    /// `MleFlags`, version 5 and later.
    pub mle_flags: Option<TxtBiosMleFlags>,
}

impl TxtBiosData {
    /// Layout family of this region.
    #[must_use]
    pub const fn band(&self) -> VersionBand {
        VersionBand::from_version(self.version)
    }
}

struct ByteCursor<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> ByteCursor<'a> {
    const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    const fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.offset)
    }

    const fn truncated(&self, field: &'static str, needed: usize) -> FormatError {
        FormatError::Truncated {
            field,
            offset: self.offset,
            needed,
            available: self.remaining(),
        }
    }

    fn take<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N], FormatError> {
        let chunk = self
            .bytes
            .get(self.offset..self.offset + N)
            .ok_or_else(|| self.truncated(field, N))?;
        let mut out = [0u8; N];
        out.copy_from_slice(chunk);
        self.offset += N;
        Ok(out)
    }

    fn read_u32(&mut self, field: &'static str) -> Result<u32, FormatError> {
        self.take(field).map(u32::from_le_bytes)
    }

    fn read_u64(&mut self, field: &'static str) -> Result<u64, FormatError> {
        self.take(field).map(u64::from_le_bytes)
    }
}

fn read_header(cursor: &mut ByteCursor<'_>, data: &mut TxtBiosData) -> Result<(), FormatError> {
    data.region_size = cursor.read_u64("BiosDataSize")?;

    data.version = cursor.read_u32("Version")?;
    if data.version < BIOS_DATA_MIN_VERSION {
        return Err(FormatError::UnsupportedVersion {
            version: data.version,
        });
    }

    data.bios_sinit_size = cursor.read_u32("BiosSinitSize")?;
    if data.bios_sinit_size < BIOS_SINIT_SIZE_MIN {
        return Err(FormatError::CorruptSize {
            bios_sinit_size: data.bios_sinit_size,
        });
    }

    data.reserved1 = cursor.read_u64("Reserved1")?;
    data.reserved2 = cursor.read_u64("Reserved2")?;

    data.num_log_procs = cursor.read_u32("NumLogProcs")?;
    if data.num_log_procs == 0 {
        return Err(FormatError::CorruptProcessorCount);
    }

    Ok(())
}

/// Parses the BIOS data region from bytes starting at the TXT heap base.
///
/// # Errors
///
/// Returns [`FormatError`] when the buffer is truncated, the version is
/// below 2, `BiosSinitSize` is below 8, or `NumLogProcs` is zero. No partial
/// record is returned.
pub fn parse_bios_data_region(bytes: &[u8]) -> Result<TxtBiosData, FormatError> {
    let mut cursor = ByteCursor::new(bytes);
    let mut data = TxtBiosData::default();
    let mut stage = ParseStage::Header;

    loop {
        debug!("bios data stage {stage:?} at offset {}", cursor.offset);
        let step = match stage {
            ParseStage::Header => read_header(&mut cursor, &mut data),
            ParseStage::SinitFlags => cursor
                .read_u32("SinitFlags")
                .map(|flags| data.sinit_flags = Some(flags)),
            ParseStage::MleFlags => cursor
                .read_u32("MleFlags")
                .map(|flags| data.mle_flags = Some(TxtBiosMleFlags::decode(flags))),
            ParseStage::Done => break,
        };
        if let Err(error) = step {
            warn!("bios data region rejected: {error}");
            return Err(error);
        }
        stage = stage.next(data.version);
    }

    if cursor.remaining() > 0 {
        debug!(
            "ignoring {} trailing bytes of version {} bios data",
            cursor.remaining(),
            data.version
        );
    }

    Ok(data)
}

/// Reads the BIOS data region from the TXT heap located by `registers`.
///
/// The 64-bit element size at the heap base bounds the fetch. At most
/// [`BIOS_DATA_DECODED_BYTES`] are read through `mem`, in dword reads with a
/// byte-wise tail.
///
/// # Errors
///
/// Returns [`BiosDataError::Register`] when a heap read fails and
/// [`BiosDataError::Format`] when the region does not fit the heap or does
/// not decode.
pub fn read_bios_data<M: PhysicalMemory + ?Sized>(
    mem: &mut M,
    registers: &TxtRegisterSpace,
) -> Result<TxtBiosData, BiosDataError> {
    let heap_base = u64::from(registers.heap_base);
    let heap_read = |offset: u64, source| RegisterReadError {
        register: "TXT.HEAP",
        offset,
        source,
    };

    let region_size = mem
        .read_physical(heap_base, AccessWidth::Qword)
        .map_err(|source| heap_read(0, source))?;
    if region_size > u64::from(registers.heap_size) {
        return Err(FormatError::RegionExceedsHeap {
            region_size,
            heap_size: registers.heap_size,
        }
        .into());
    }
    debug!("bios data region at {heap_base:#x} spans {region_size:#x} bytes");

    let fetched = region_size.min(BIOS_DATA_DECODED_BYTES);
    let mut bytes = region_size.to_le_bytes().to_vec();
    let mut offset = 8;
    while offset < fetched {
        let width = if fetched - offset >= 4 {
            AccessWidth::Dword
        } else {
            AccessWidth::Byte
        };
        let value = mem
            .read_physical(heap_base + offset, width)
            .map_err(|source| heap_read(offset, source))?;
        bytes.extend_from_slice(&value.to_le_bytes()[..width.bytes()]);
        offset += u64::from(width.bits() / 8);
    }

    Ok(parse_bios_data_region(&bytes)?)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::{AccessError, MemoryImage};

    fn region(version: u32, bios_sinit_size: u32, num_log_procs: u32, tail: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        let size = (BIOS_DATA_HEADER_BYTES + tail.len()) as u64;
        bytes.extend_from_slice(&size.to_le_bytes());
        bytes.extend_from_slice(&version.to_le_bytes());
        bytes.extend_from_slice(&bios_sinit_size.to_le_bytes());
        bytes.extend_from_slice(&0u64.to_le_bytes());
        bytes.extend_from_slice(&0u64.to_le_bytes());
        bytes.extend_from_slice(&num_log_procs.to_le_bytes());
        bytes.extend_from_slice(tail);
        bytes
    }

    #[rstest]
    #[case(0, VersionBand::Legacy)]
    #[case(1, VersionBand::Legacy)]
    #[case(2, VersionBand::Base)]
    #[case(3, VersionBand::SinitFlags)]
    #[case(4, VersionBand::SinitFlags)]
    #[case(5, VersionBand::MleFlags)]
    #[case(6, VersionBand::MleFlags)]
    #[case(u32::MAX, VersionBand::MleFlags)]
    fn version_bands(#[case] version: u32, #[case] band: VersionBand) {
        assert_eq!(VersionBand::from_version(version), band);
    }

    #[rstest]
    #[case(2, ParseStage::Done)]
    #[case(3, ParseStage::SinitFlags)]
    #[case(5, ParseStage::MleFlags)]
    fn header_is_followed_by_version_gated_stage(#[case] version: u32, #[case] next: ParseStage) {
        assert_eq!(ParseStage::Header.next(version), next);
        assert_eq!(next.next(version), ParseStage::Done);
    }

    #[test]
    fn version_2_minimal_region_has_no_optional_fields() {
        let bytes = region(2, 8, 1, &[]);
        let data = parse_bios_data_region(&bytes).expect("valid region");
        assert_eq!(data.version, 2);
        assert_eq!(data.bios_sinit_size, 8);
        assert_eq!(data.num_log_procs, 1);
        assert_eq!(data.region_size, 36);
        assert_eq!(data.sinit_flags, None);
        assert_eq!(data.mle_flags, None);
    }

    #[test]
    fn version_4_reads_sinit_flags() {
        let bytes = region(4, 0x30, 8, &0xA5u32.to_le_bytes());
        let data = parse_bios_data_region(&bytes).expect("valid region");
        assert_eq!(data.sinit_flags, Some(0xA5));
        assert_eq!(data.mle_flags, None);
    }

    #[test]
    fn version_5_decodes_client_mle_flags() {
        let bytes = region(5, 0x2C, 4, &0b010u32.to_le_bytes());
        let data = parse_bios_data_region(&bytes).expect("valid region");
        let flags = data.mle_flags.expect("version 5 has mle flags");
        assert!(flags.is_client_state);
        assert!(!flags.is_server_state);
        assert!(!flags.supports_acpi_ppi);
        assert!(!flags.is_legacy_state);
        assert_eq!(data.sinit_flags, None);
    }

    #[rstest]
    #[case(0b000, false, MlePlatformState::Neither)]
    #[case(0b001, true, MlePlatformState::Neither)]
    #[case(0b011, true, MlePlatformState::Client)]
    #[case(0b100, false, MlePlatformState::Server)]
    #[case(0b110, false, MlePlatformState::Neither)]
    fn mle_flags_platform_states(
        #[case] raw: u32,
        #[case] acpi_ppi: bool,
        #[case] state: MlePlatformState,
    ) {
        let flags = TxtBiosMleFlags::decode(raw);
        assert_eq!(flags.supports_acpi_ppi, acpi_ppi);
        assert_eq!(flags.platform_state(), state);
        assert!(!flags.is_legacy_state);
    }

    #[test]
    fn version_1_is_rejected_whatever_follows() {
        let bytes = region(1, 0, 0, &[0xFF; 64]);
        assert_eq!(
            parse_bios_data_region(&bytes),
            Err(FormatError::UnsupportedVersion { version: 1 })
        );
    }

    #[test]
    fn undersized_sinit_size_is_corrupt() {
        let bytes = region(5, 4, 1, &[0; 4]);
        assert_eq!(
            parse_bios_data_region(&bytes),
            Err(FormatError::CorruptSize { bios_sinit_size: 4 })
        );
    }

    #[test]
    fn zero_processors_is_corrupt() {
        let bytes = region(2, 8, 0, &[]);
        assert_eq!(
            parse_bios_data_region(&bytes),
            Err(FormatError::CorruptProcessorCount)
        );
    }

    #[rstest]
    #[case(0, "BiosDataSize", 0, 8)]
    #[case(7, "BiosDataSize", 0, 8)]
    #[case(12, "BiosSinitSize", 12, 4)]
    #[case(20, "Reserved1", 16, 8)]
    #[case(35, "NumLogProcs", 32, 4)]
    fn short_buffers_name_the_next_field(
        #[case] len: usize,
        #[case] field: &'static str,
        #[case] offset: usize,
        #[case] needed: usize,
    ) {
        let bytes = region(2, 8, 1, &[]);
        assert_eq!(
            parse_bios_data_region(&bytes[..len]),
            Err(FormatError::Truncated {
                field,
                offset,
                needed,
                available: len - offset,
            })
        );
    }

    #[test]
    fn version_is_checked_before_the_rest_of_the_header() {
        let mut bytes = 12u64.to_le_bytes().to_vec();
        bytes.extend_from_slice(&1u32.to_le_bytes());
        assert_eq!(
            parse_bios_data_region(&bytes),
            Err(FormatError::UnsupportedVersion { version: 1 })
        );
    }

    #[test]
    fn sinit_size_is_checked_before_the_rest_of_the_header() {
        let mut bytes = 16u64.to_le_bytes().to_vec();
        bytes.extend_from_slice(&5u32.to_le_bytes());
        bytes.extend_from_slice(&4u32.to_le_bytes());
        assert_eq!(
            parse_bios_data_region(&bytes),
            Err(FormatError::CorruptSize { bios_sinit_size: 4 })
        );
    }

    #[test]
    fn missing_version_gated_field_is_truncated() {
        let bytes = region(5, 8, 1, &[0x02, 0x00]);
        assert_eq!(
            parse_bios_data_region(&bytes),
            Err(FormatError::Truncated {
                field: "MleFlags",
                offset: 36,
                needed: 4,
                available: 2,
            })
        );
    }

    #[test]
    fn newer_versions_ignore_unknown_tail() {
        let mut tail = 0b101u32.to_le_bytes().to_vec();
        tail.extend_from_slice(&[0xEE; 20]);
        let bytes = region(7, 0x40, 2, &tail);
        let data = parse_bios_data_region(&bytes).expect("valid region");
        let flags = data.mle_flags.expect("version 7 has mle flags");
        assert!(flags.supports_acpi_ppi);
        assert!(flags.is_server_state);
        assert_eq!(data.band(), VersionBand::MleFlags);
    }

    fn heap_fixture(region_bytes: &[u8], heap_size: u32) -> (MemoryImage, TxtRegisterSpace) {
        let heap_base = 0x7AF2_0000u32;
        let mut padded = region_bytes.to_vec();
        padded.resize(0x100, 0);
        let image = MemoryImage::new(u64::from(heap_base), padded);
        let registers = TxtRegisterSpace {
            heap_base,
            heap_size,
            ..TxtRegisterSpace::default()
        };
        (image, registers)
    }

    #[test]
    fn reads_region_through_the_accessor() {
        let bytes = region(5, 0x2C, 4, &0b100u32.to_le_bytes());
        let (mut image, registers) = heap_fixture(&bytes, 0x100);
        let data = read_bios_data(&mut image, &registers).expect("valid heap");
        assert_eq!(data.region_size, 40);
        assert_eq!(
            data.mle_flags.map(TxtBiosMleFlags::platform_state),
            Some(MlePlatformState::Server)
        );
    }

    #[test]
    fn odd_sized_region_is_fetched_to_its_last_byte() {
        let bytes = region(5, 8, 1, &[0x02, 0x00]);
        let (mut image, registers) = heap_fixture(&bytes, 0x100);
        assert_eq!(
            read_bios_data(&mut image, &registers),
            Err(BiosDataError::Format(FormatError::Truncated {
                field: "MleFlags",
                offset: 36,
                needed: 4,
                available: 2,
            }))
        );
    }

    #[test]
    fn region_larger_than_heap_is_rejected() {
        let bytes = region(2, 8, 1, &[]);
        let (mut image, registers) = heap_fixture(&bytes, 0x20);
        assert_eq!(
            read_bios_data(&mut image, &registers),
            Err(BiosDataError::Format(FormatError::RegionExceedsHeap {
                region_size: 36,
                heap_size: 0x20,
            }))
        );
    }

    #[test]
    fn heap_read_failure_is_reported_with_offset() {
        let registers = TxtRegisterSpace {
            heap_base: 0x1000,
            heap_size: 0x100,
            ..TxtRegisterSpace::default()
        };
        let mut image = MemoryImage::new(0x1000, 0x40u64.to_le_bytes().to_vec());
        let error = read_bios_data(&mut image, &registers).expect_err("heap too short");
        assert_eq!(
            error,
            BiosDataError::Register(RegisterReadError {
                register: "TXT.HEAP",
                offset: 8,
                source: AccessError::Unmapped { address: 0x1008 },
            })
        );
    }
}
