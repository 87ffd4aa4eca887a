use thiserror::Error;

/// Error families used by callers to tell hardware failures from bad data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ErrorFamily {
    /// The platform I/O layer could not complete a read.
    Access,
    /// Bytes were readable but did not match the expected structure.
    Format,
}

/// Failure reported by a raw physical-memory or MSR accessor.
///
/// Decoders never reinterpret these; they are carried to the caller as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum AccessError {
    /// No backing store is mapped at the requested physical address.
    #[error("physical address {address:#x} is unmapped")]
    Unmapped {
        /// First byte of the failed access.
        address: u64,
    },
    /// The platform reported a fault while reading the address.
    #[error("read fault at physical address {address:#x}")]
    ReadFault {
        /// First byte of the failed access.
        address: u64,
    },
    /// The caller lacks the privilege to read the address.
    #[error("permission denied reading physical address {address:#x}")]
    PermissionDenied {
        /// First byte of the failed access.
        address: u64,
    },
    /// The MSR is not implemented on this CPU.
    #[error("msr {index:#x} is not supported on cpu {cpu}")]
    MsrUnsupported {
        /// Logical CPU the read was issued on.
        cpu: u32,
        /// MSR index.
        index: u32,
    },
    /// The logical CPU index does not exist.
    #[error("cpu {cpu} does not exist")]
    InvalidCpu {
        /// Requested logical CPU.
        cpu: u32,
    },
}

impl AccessError {
    /// Every accessor failure belongs to the access family.
    #[must_use]
    pub const fn family(self) -> ErrorFamily {
        ErrorFamily::Access
    }
}

/// Structural failure while decoding a byte buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum FormatError {
    /// The buffer ended before the named field.
    #[error("truncated at {field}: need {needed} bytes at offset {offset}, {available} available")]
    Truncated {
        /// Field that could not be read.
        field: &'static str,
        /// Cursor offset of the field.
        offset: usize,
        /// Width of the field in bytes.
        needed: usize,
        /// Bytes remaining from `offset`.
        available: usize,
    },
    /// BIOS data versions below 2 have no stable layout.
    #[error("bios data version {version} is not supported (minimum is 2)")]
    UnsupportedVersion {
        /// Version read from the region.
        version: u32,
    },
    /// `BiosSinitSize` is smaller than its own mandatory header.
    #[error("bios data region is too small: bios sinit size {bios_sinit_size}")]
    CorruptSize {
        /// Size read from the region.
        bios_sinit_size: u32,
    },
    /// The region reports zero logical processors.
    #[error("bios data region corrupted: zero logical processors")]
    CorruptProcessorCount,
    /// The heap element claims to be larger than the heap holding it.
    #[error("bios data region size {region_size:#x} exceeds heap size {heap_size:#x}")]
    RegionExceedsHeap {
        /// Size prefix read at the heap base.
        region_size: u64,
        /// `TXT.HEAP.SIZE` from the register space.
        heap_size: u32,
    },
}

impl FormatError {
    /// Every structural failure belongs to the format family.
    #[must_use]
    pub const fn family(self) -> ErrorFamily {
        ErrorFamily::Format
    }
}

/// A TXT public register could not be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[error("cannot read {register} at offset {offset:#x}: {source}")]
pub struct RegisterReadError {
    /// Register mnemonic, e.g. `TXT.ERRORCODE`.
    pub register: &'static str,
    /// Offset from the TXT public base.
    pub offset: u64,
    /// Accessor failure, unchanged.
    pub source: AccessError,
}

impl RegisterReadError {
    /// Returns the accessor failure that aborted the read.
    #[must_use]
    pub const fn access_error(&self) -> AccessError {
        self.source
    }

    /// Register reads only fail for access reasons.
    #[must_use]
    pub const fn family(&self) -> ErrorFamily {
        ErrorFamily::Access
    }
}

/// A model-specific register could not be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[error("cannot access MSR {register}: {source}")]
pub struct MsrReadError {
    /// Architectural MSR name, e.g. `IA32_FEATURE_CONTROL`.
    pub register: &'static str,
    /// MSR index.
    pub index: u32,
    /// Accessor failure, unchanged.
    pub source: AccessError,
}

impl MsrReadError {
    /// Returns the accessor failure that aborted the query.
    #[must_use]
    pub const fn access_error(&self) -> AccessError {
        self.source
    }

    /// MSR queries only fail for access reasons.
    #[must_use]
    pub const fn family(&self) -> ErrorFamily {
        ErrorFamily::Access
    }
}

/// Failure while locating and decoding the BIOS data region in the TXT heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum BiosDataError {
    /// A heap read failed.
    #[error(transparent)]
    Register(#[from] RegisterReadError),
    /// The heap bytes did not decode.
    #[error(transparent)]
    Format(#[from] FormatError),
}

impl BiosDataError {
    /// Returns the family of the wrapped failure.
    #[must_use]
    pub const fn family(&self) -> ErrorFamily {
        match self {
            Self::Register(_) => ErrorFamily::Access,
            Self::Format(_) => ErrorFamily::Format,
        }
    }
}
