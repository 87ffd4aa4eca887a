use crate::TXT_PUBLIC_BASE;

/// Immutable platform parameters shared by the decoders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct PlatformConfig {
    /// Physical base of the TXT public configuration space.
    pub txt_public_base: u64,
    /// Logical CPU used for MSR reads.
    pub msr_cpu: u32,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            txt_public_base: TXT_PUBLIC_BASE,
            msr_cpu: 0,
        }
    }
}
