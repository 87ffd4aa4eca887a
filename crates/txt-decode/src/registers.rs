//! TXT public register-space decoder and the caller-owned snapshot.

use log::{debug, warn};

use crate::layout::{
    RegisterDescriptor, TXT_ACMSTATUS, TXT_DIDVID, TXT_E2STS, TXT_ESTS, TXT_HEAP_BASE,
    TXT_HEAP_SIZE, TXT_MLE_JOIN, TXT_PUBLIC_KEY, TXT_PUBLIC_KEY_WORDS, TXT_SINIT_BASE,
    TXT_SINIT_SIZE, TXT_VER_FSBIF, TXT_VER_QPIIF,
};
use crate::status::{read_dma_protected_range, read_txt_error_code, read_txt_status};
use crate::{
    DmaProtectedRange, PhysicalMemory, PlatformConfig, RegisterReadError, TxtErrorCode, TxtStatus,
};

/// PCI vendor ID reported in `TXT.DIDVID` by Intel chipsets.
pub const INTEL_VENDOR_ID: u16 = 0x8086;

/// `TXT_RESET.STS` in `TXT.ESTS`.
pub const ESTS_TXT_RESET: u64 = 1;

/// Complete snapshot of the TXT public register space.
///
/// Only ever constructed after every register read succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct TxtRegisterSpace {
    /// Decoded `TXT.STS`.
    pub sts: TxtStatus,
    /// Raw `TXT.STS`.
    pub sts_raw: u64,
    /// `TXT_RESET.STS` from `TXT.ESTS`.
    pub txt_reset: bool,
    /// Decoded `TXT.ERRORCODE`.
    pub error_code: TxtErrorCode,
    /// Raw `TXT.ERRORCODE`, authoritative for display.
    pub error_code_raw: u32,
    /// Raw legacy `TXT.ACMSTATUS`.
    pub acm_status: u64,
    /// `TXT.VER.FSBIF`.
    pub fsb_if: u32,
    /// `TXT.DIDVID` vendor ID.
    pub vid: u16,
    /// `TXT.DIDVID` device ID.
    pub did: u16,
    /// `TXT.DIDVID` revision ID.
    pub rid: u16,
    /// `TXT.DIDVID` extended ID.
    pub id_ext: u16,
    /// `TXT.VER.QPIIF`.
    pub qpi_if: u32,
    /// `TXT.SINIT.BASE`.
    pub sinit_base: u32,
    /// `TXT.SINIT.SIZE`.
    pub sinit_size: u32,
    /// `TXT.MLE.JOIN`.
    pub mle_join: u32,
    /// `TXT.HEAP.BASE`.
    pub heap_base: u32,
    /// `TXT.HEAP.SIZE`.
    pub heap_size: u32,
    /// Decoded `TXT.DPR`.
    pub dpr: DmaProtectedRange,
    /// `TXT.PUBLIC.KEY` words in address order.
    pub public_key: [u64; TXT_PUBLIC_KEY_WORDS],
    /// `TXT.E2STS`.
    pub e2sts: u64,
}

impl TxtRegisterSpace {
    /// The register space answers with Intel's vendor ID.
    #[must_use]
    pub const fn is_intel_chipset(&self) -> bool {
        self.vid == INTEL_VENDOR_ID
    }

    /// The BIOS ACM latched a valid error code.
    #[must_use]
    pub const fn bios_acm_error_reported(&self) -> bool {
        self.error_code.valid
    }
}

#[allow(clippy::cast_possible_truncation)]
fn read_dword<M: PhysicalMemory + ?Sized>(
    mem: &mut M,
    base: u64,
    register: RegisterDescriptor,
) -> Result<u32, RegisterReadError> {
    register.read(mem, base).map(|value| value as u32)
}

/// Reads every public TXT register and decodes them into one snapshot.
///
/// The first failing read aborts the decode; no partial snapshot is built.
///
/// # Errors
///
/// Returns the [`RegisterReadError`] of the first register that failed.
pub fn decode_register_space<M: PhysicalMemory + ?Sized>(
    mem: &mut M,
    config: &PlatformConfig,
) -> Result<TxtRegisterSpace, RegisterReadError> {
    let base = config.txt_public_base;
    debug!("decoding TXT register space at {base:#x}");

    decode_at(mem, base).inspect_err(|error| warn!("register space decode aborted: {error}"))
}

#[allow(clippy::cast_possible_truncation)]
fn decode_at<M: PhysicalMemory + ?Sized>(
    mem: &mut M,
    base: u64,
) -> Result<TxtRegisterSpace, RegisterReadError> {
    let (sts, sts_raw) = read_txt_status(mem, base)?;
    let (error_code, error_code_raw) = read_txt_error_code(mem, base)?;
    let (dpr, _) = read_dma_protected_range(mem, base)?;

    let txt_reset = TXT_ESTS.read(mem, base)? & ESTS_TXT_RESET != 0;
    let acm_status = TXT_ACMSTATUS.read(mem, base)?;
    let fsb_if = read_dword(mem, base, TXT_VER_FSBIF)?;

    let didvid = TXT_DIDVID.read(mem, base)?;
    let vid = (didvid & 0xFFFF) as u16;
    let did = ((didvid >> 16) & 0xFFFF) as u16;
    let rid = ((didvid >> 32) & 0xFFFF) as u16;
    let id_ext = ((didvid >> 48) & 0xFFFF) as u16;

    let qpi_if = read_dword(mem, base, TXT_VER_QPIIF)?;
    let sinit_base = read_dword(mem, base, TXT_SINIT_BASE)?;
    let sinit_size = read_dword(mem, base, TXT_SINIT_SIZE)?;
    let mle_join = read_dword(mem, base, TXT_MLE_JOIN)?;
    let heap_base = read_dword(mem, base, TXT_HEAP_BASE)?;
    let heap_size = read_dword(mem, base, TXT_HEAP_SIZE)?;

    let mut public_key = [0u64; TXT_PUBLIC_KEY_WORDS];
    for (word, register) in public_key.iter_mut().zip(TXT_PUBLIC_KEY) {
        *word = register.read(mem, base)?;
    }

    let e2sts = TXT_E2STS.read(mem, base)?;

    Ok(TxtRegisterSpace {
        sts,
        sts_raw,
        txt_reset,
        error_code,
        error_code_raw,
        acm_status,
        fsb_if,
        vid,
        did,
        rid,
        id_ext,
        qpi_if,
        sinit_base,
        sinit_size,
        mle_join,
        heap_base,
        heap_size,
        dpr,
        public_key,
        e2sts,
    })
}

/// Caller-owned memo of one register-space decode.
///
/// The snapshot is read on first use and then reused until [`refresh`] or
/// [`clear`] is called. Nothing invalidates it implicitly.
///
/// [`refresh`]: RegisterSnapshot::refresh
/// [`clear`]: RegisterSnapshot::clear
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterSnapshot {
    config: PlatformConfig,
    cached: Option<TxtRegisterSpace>,
}

impl RegisterSnapshot {
    /// Creates an empty snapshot bound to `config`.
    #[must_use]
    pub const fn new(config: PlatformConfig) -> Self {
        Self {
            config,
            cached: None,
        }
    }

    /// Configuration used for every decode.
    #[must_use]
    pub const fn config(&self) -> &PlatformConfig {
        &self.config
    }

    /// Previously decoded registers, if any.
    #[must_use]
    pub const fn cached(&self) -> Option<&TxtRegisterSpace> {
        self.cached.as_ref()
    }

    /// Returns the cached registers, decoding them on first use.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterReadError`] when the first decode fails; nothing is
    /// cached in that case.
    pub fn get<M: PhysicalMemory + ?Sized>(
        &mut self,
        mem: &mut M,
    ) -> Result<&TxtRegisterSpace, RegisterReadError> {
        let registers = match self.cached {
            Some(registers) => registers,
            None => decode_register_space(mem, &self.config)?,
        };
        Ok(self.cached.insert(registers))
    }

    /// Discards the cached registers and decodes them again.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterReadError`] when the decode fails; the previous
    /// snapshot is dropped either way.
    pub fn refresh<M: PhysicalMemory + ?Sized>(
        &mut self,
        mem: &mut M,
    ) -> Result<&TxtRegisterSpace, RegisterReadError> {
        self.cached = None;
        self.get(mem)
    }

    /// Drops the cached registers.
    pub fn clear(&mut self) {
        self.cached = None;
    }
}

#[cfg(test)]
mod tests {
    use super::{decode_register_space, RegisterSnapshot, TxtRegisterSpace};
    use crate::{AccessError, AccessWidth, MemoryImage, PlatformConfig, TXT_PUBLIC_BASE};

    fn public_space() -> MemoryImage {
        let mut image = MemoryImage::zeroed(TXT_PUBLIC_BASE, 0x1000);
        let writes: [(u64, AccessWidth, u64); 4] = [
            (0x110, AccessWidth::Qword, 0x0001_00B1_B002_8086),
            (0x008, AccessWidth::Byte, 0x01),
            (0x300, AccessWidth::Dword, 0x7AF2_0000),
            (0x308, AccessWidth::Dword, 0x000E_0000),
        ];
        for (offset, width, value) in writes {
            image
                .write(TXT_PUBLIC_BASE + offset, width, value)
                .expect("fixture fits");
        }
        image
    }

    #[test]
    fn didvid_is_split_into_16_bit_fields() {
        let mut image = public_space();
        let regs = decode_register_space(&mut image, &PlatformConfig::default()).expect("decodes");
        assert_eq!(regs.vid, 0x8086);
        assert_eq!(regs.did, 0xB002);
        assert_eq!(regs.rid, 0x00B1);
        assert_eq!(regs.id_ext, 0x0001);
        assert!(regs.is_intel_chipset());
        assert!(regs.txt_reset);
        assert_eq!(regs.heap_base, 0x7AF2_0000);
        assert_eq!(regs.heap_size, 0x000E_0000);
    }

    #[test]
    fn snapshot_reads_once_until_refreshed() {
        let mut image = public_space();
        let mut snapshot = RegisterSnapshot::new(PlatformConfig::default());
        assert!(snapshot.cached().is_none());

        let first = *snapshot.get(&mut image).expect("decodes");
        image
            .write(TXT_PUBLIC_BASE + 0x300, AccessWidth::Dword, 0x1234_0000)
            .expect("fits");

        assert_eq!(snapshot.get(&mut image).expect("cached").heap_base, first.heap_base);
        assert_eq!(
            snapshot.refresh(&mut image).expect("decodes").heap_base,
            0x1234_0000
        );
    }

    #[test]
    fn failed_refresh_drops_the_previous_snapshot() {
        let mut image = public_space();
        let mut snapshot = RegisterSnapshot::new(PlatformConfig::default());
        snapshot.get(&mut image).expect("decodes");

        let mut truncated = MemoryImage::zeroed(TXT_PUBLIC_BASE, 0x400);
        let error = snapshot.refresh(&mut truncated).expect_err("unmapped");
        assert_eq!(error.register, "TXT.PUBLIC.KEY[0]");
        assert_eq!(
            error.access_error(),
            AccessError::Unmapped {
                address: TXT_PUBLIC_BASE + 0x400
            }
        );
        assert!(snapshot.cached().is_none());
    }

    #[test]
    fn clear_forgets_the_snapshot() {
        let mut image = public_space();
        let mut snapshot = RegisterSnapshot::default();
        snapshot.get(&mut image).expect("decodes");
        snapshot.clear();
        assert_eq!(snapshot.cached(), None::<&TxtRegisterSpace>);
    }

    #[test]
    fn decoder_honours_configured_base() {
        let mut image = MemoryImage::zeroed(0x1_0000, 0x1000);
        image
            .write(0x1_0110, AccessWidth::Word, 0x8086)
            .expect("fits");
        let config = PlatformConfig {
            txt_public_base: 0x1_0000,
            ..PlatformConfig::default()
        };
        let regs = decode_register_space(&mut image, &config).expect("decodes");
        assert!(regs.is_intel_chipset());
    }
}
