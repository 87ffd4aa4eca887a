//! Fixed TXT public register layout.

use log::debug;

use crate::{AccessWidth, PhysicalMemory, RegisterReadError};

/// Physical base address of the TXT public configuration space.
pub const TXT_PUBLIC_BASE: u64 = 0xFED3_0000;
/// Size in bytes of the TXT public configuration space.
pub const TXT_PUBLIC_SPACE_BYTES: u64 = 0x1_0000;

/// `TXT.STS` offset.
pub const TXT_STS_OFFSET: u64 = 0x000;
/// `TXT.ESTS` offset.
pub const TXT_ESTS_OFFSET: u64 = 0x008;
/// `TXT.ERRORCODE` offset.
pub const TXT_ERRORCODE_OFFSET: u64 = 0x030;
/// Legacy `TXT.ACMSTATUS` offset.
pub const TXT_ACMSTATUS_OFFSET: u64 = 0x0A0;
/// `TXT.VER.FSBIF` offset.
pub const TXT_VER_FSBIF_OFFSET: u64 = 0x100;
/// `TXT.DIDVID` offset.
pub const TXT_DIDVID_OFFSET: u64 = 0x110;
/// `TXT.VER.QPIIF` offset.
pub const TXT_VER_QPIIF_OFFSET: u64 = 0x200;
/// `TXT.SINIT.BASE` offset.
pub const TXT_SINIT_BASE_OFFSET: u64 = 0x270;
/// `TXT.SINIT.SIZE` offset.
pub const TXT_SINIT_SIZE_OFFSET: u64 = 0x278;
/// `TXT.MLE.JOIN` offset.
pub const TXT_MLE_JOIN_OFFSET: u64 = 0x290;
/// `TXT.HEAP.BASE` offset.
pub const TXT_HEAP_BASE_OFFSET: u64 = 0x300;
/// `TXT.HEAP.SIZE` offset.
pub const TXT_HEAP_SIZE_OFFSET: u64 = 0x308;
/// ACM boot-status word offset (`TXT.BOOTSTATUS`).
pub const TXT_ACM_BOOTSTATUS_OFFSET: u64 = 0x328;
/// `TXT.DPR` offset.
pub const TXT_DPR_OFFSET: u64 = 0x330;
/// `TXT.PUBLIC.KEY` offset; four consecutive 64-bit words.
pub const TXT_PUBLIC_KEY_OFFSET: u64 = 0x400;
/// `TXT.E2STS` offset.
pub const TXT_E2STS_OFFSET: u64 = 0x8F0;

/// Number of 64-bit words in `TXT.PUBLIC.KEY`.
pub const TXT_PUBLIC_KEY_WORDS: usize = 4;

/// One fixed-width register in the public space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegisterDescriptor {
    /// Register mnemonic.
    pub name: &'static str,
    /// Offset from the public base.
    pub offset: u64,
    /// Read width.
    pub width: AccessWidth,
}

impl RegisterDescriptor {
    const fn new(name: &'static str, offset: u64, width: AccessWidth) -> Self {
        Self {
            name,
            offset,
            width,
        }
    }

    /// Physical address of this register for a given public base.
    #[must_use]
    pub const fn address(self, base: u64) -> u64 {
        base.wrapping_add(self.offset)
    }

    /// Reads this register through `mem`.
    ///
    /// # Errors
    ///
    /// Wraps the accessor failure with this register's name and offset.
    pub fn read<M: PhysicalMemory + ?Sized>(
        self,
        mem: &mut M,
        base: u64,
    ) -> Result<u64, RegisterReadError> {
        let address = self.address(base);
        let value = mem
            .read_physical(address, self.width)
            .map_err(|source| RegisterReadError {
                register: self.name,
                offset: self.offset,
                source,
            })?;
        debug!("{} @ {address:#x} = {value:#x}", self.name);
        Ok(value)
    }
}

/// `TXT.STS`.
pub const TXT_STS: RegisterDescriptor =
    RegisterDescriptor::new("TXT.STS", TXT_STS_OFFSET, AccessWidth::Qword);
/// `TXT.ESTS`.
pub const TXT_ESTS: RegisterDescriptor =
    RegisterDescriptor::new("TXT.ESTS", TXT_ESTS_OFFSET, AccessWidth::Byte);
/// `TXT.ERRORCODE`.
pub const TXT_ERRORCODE: RegisterDescriptor =
    RegisterDescriptor::new("TXT.ERRORCODE", TXT_ERRORCODE_OFFSET, AccessWidth::Dword);
/// Legacy `TXT.ACMSTATUS`.
pub const TXT_ACMSTATUS: RegisterDescriptor =
    RegisterDescriptor::new("TXT.ACMSTATUS", TXT_ACMSTATUS_OFFSET, AccessWidth::Qword);
/// `TXT.VER.FSBIF`.
pub const TXT_VER_FSBIF: RegisterDescriptor =
    RegisterDescriptor::new("TXT.VER.FSBIF", TXT_VER_FSBIF_OFFSET, AccessWidth::Dword);
/// `TXT.DIDVID`.
pub const TXT_DIDVID: RegisterDescriptor =
    RegisterDescriptor::new("TXT.DIDVID", TXT_DIDVID_OFFSET, AccessWidth::Qword);
/// `TXT.VER.QPIIF`.
pub const TXT_VER_QPIIF: RegisterDescriptor =
    RegisterDescriptor::new("TXT.VER.QPIIF", TXT_VER_QPIIF_OFFSET, AccessWidth::Dword);
/// `TXT.SINIT.BASE`.
pub const TXT_SINIT_BASE: RegisterDescriptor =
    RegisterDescriptor::new("TXT.SINIT.BASE", TXT_SINIT_BASE_OFFSET, AccessWidth::Dword);
/// `TXT.SINIT.SIZE`.
pub const TXT_SINIT_SIZE: RegisterDescriptor =
    RegisterDescriptor::new("TXT.SINIT.SIZE", TXT_SINIT_SIZE_OFFSET, AccessWidth::Dword);
/// `TXT.MLE.JOIN`.
pub const TXT_MLE_JOIN: RegisterDescriptor =
    RegisterDescriptor::new("TXT.MLE.JOIN", TXT_MLE_JOIN_OFFSET, AccessWidth::Dword);
/// `TXT.HEAP.BASE`.
pub const TXT_HEAP_BASE: RegisterDescriptor =
    RegisterDescriptor::new("TXT.HEAP.BASE", TXT_HEAP_BASE_OFFSET, AccessWidth::Dword);
/// `TXT.HEAP.SIZE`.
pub const TXT_HEAP_SIZE: RegisterDescriptor =
    RegisterDescriptor::new("TXT.HEAP.SIZE", TXT_HEAP_SIZE_OFFSET, AccessWidth::Dword);
/// ACM boot-status word.
pub const TXT_ACM_BOOTSTATUS: RegisterDescriptor =
    RegisterDescriptor::new("TXT.BOOTSTATUS", TXT_ACM_BOOTSTATUS_OFFSET, AccessWidth::Qword);
/// `TXT.DPR`.
pub const TXT_DPR: RegisterDescriptor =
    RegisterDescriptor::new("TXT.DPR", TXT_DPR_OFFSET, AccessWidth::Dword);
/// `TXT.PUBLIC.KEY`, one descriptor per 64-bit word.
pub const TXT_PUBLIC_KEY: [RegisterDescriptor; TXT_PUBLIC_KEY_WORDS] = [
    RegisterDescriptor::new("TXT.PUBLIC.KEY[0]", TXT_PUBLIC_KEY_OFFSET, AccessWidth::Qword),
    RegisterDescriptor::new("TXT.PUBLIC.KEY[1]", TXT_PUBLIC_KEY_OFFSET + 0x08, AccessWidth::Qword),
    RegisterDescriptor::new("TXT.PUBLIC.KEY[2]", TXT_PUBLIC_KEY_OFFSET + 0x10, AccessWidth::Qword),
    RegisterDescriptor::new("TXT.PUBLIC.KEY[3]", TXT_PUBLIC_KEY_OFFSET + 0x18, AccessWidth::Qword),
];
/// `TXT.E2STS`.
pub const TXT_E2STS: RegisterDescriptor =
    RegisterDescriptor::new("TXT.E2STS", TXT_E2STS_OFFSET, AccessWidth::Qword);

/// Every register read by the register-space decoder, in read order.
pub const TXT_REGISTER_LAYOUT: [RegisterDescriptor; 18] = [
    TXT_STS,
    TXT_ERRORCODE,
    TXT_DPR,
    TXT_ESTS,
    TXT_ACMSTATUS,
    TXT_VER_FSBIF,
    TXT_DIDVID,
    TXT_VER_QPIIF,
    TXT_SINIT_BASE,
    TXT_SINIT_SIZE,
    TXT_MLE_JOIN,
    TXT_HEAP_BASE,
    TXT_HEAP_SIZE,
    TXT_PUBLIC_KEY[0],
    TXT_PUBLIC_KEY[1],
    TXT_PUBLIC_KEY[2],
    TXT_PUBLIC_KEY[3],
    TXT_E2STS,
];

/// Number of reads issued by one register-space decode.
pub const REGISTER_SPACE_READS: usize = TXT_REGISTER_LAYOUT.len();

const _: () = assert_register_layout();

const fn assert_register_layout() {
    assert!(
        fits_public_space(TXT_ACM_BOOTSTATUS),
        "boot status must be aligned and inside the public space"
    );

    let mut index = 0;
    while index < TXT_REGISTER_LAYOUT.len() {
        assert!(
            fits_public_space(TXT_REGISTER_LAYOUT[index]),
            "register must be aligned and inside the public space"
        );
        index += 1;
    }
}

const fn fits_public_space(register: RegisterDescriptor) -> bool {
    let bytes = register.width.bytes() as u64;
    register.offset % bytes == 0 && register.offset + bytes <= TXT_PUBLIC_SPACE_BYTES
}
