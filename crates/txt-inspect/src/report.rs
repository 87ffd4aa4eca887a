//! Text and JSON renderings of decoded records.

use std::fmt;

use serde::Serialize;
use txt_decode::{AcmStatus, PlatformFeatures, TxtBiosData, TxtRegisterSpace};

/// Register space plus the ACM status read alongside it.
#[derive(Debug, Serialize)]
pub struct RegistersReport<'a> {
    pub base: u64,
    pub registers: &'a TxtRegisterSpace,
    pub acm_status: &'a AcmStatus,
}

/// Decoded BIOS data region.
#[derive(Debug, Serialize)]
pub struct BiosDataReport<'a> {
    pub bios_data: &'a TxtBiosData,
}

/// Platform feature query results.
#[derive(Debug, Serialize)]
pub struct FeaturesReport<'a> {
    pub features: &'a PlatformFeatures,
}

/// Renders `report` as pretty JSON or as its text form.
pub fn render<T: Serialize + fmt::Display>(report: &T, json: bool) -> Result<String, String> {
    if json {
        serde_json::to_string_pretty(report).map_err(|error| format!("cannot encode json: {error}"))
    } else {
        Ok(report.to_string())
    }
}

const fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

impl fmt::Display for RegistersReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let regs = self.registers;
        writeln!(f, "TXT public space at {:#010x}", self.base)?;

        let sts = regs.sts;
        writeln!(f, "  TXT.STS         {:#018x}", regs.sts_raw)?;
        writeln!(f, "    SENTER.DONE   {}", yes_no(sts.senter_done))?;
        writeln!(f, "    SEXIT.DONE    {}", yes_no(sts.sexit_done))?;
        writeln!(f, "    MEM-CONFIG-LOCK {}", yes_no(sts.mem_config_lock))?;
        writeln!(f, "    PRIVATE-OPEN  {}", yes_no(sts.private_open))?;
        writeln!(f, "    LOCALITY1     {}", yes_no(sts.locality1_open))?;
        writeln!(f, "    LOCALITY2     {}", yes_no(sts.locality2_open))?;
        writeln!(f, "  TXT.ESTS        TXT_RESET {}", yes_no(regs.txt_reset))?;

        let error = regs.error_code;
        writeln!(f, "  TXT.ERRORCODE   {:#010x}", regs.error_code_raw)?;
        writeln!(
            f,
            "    valid {} module {} class {:#x} major {:#x} minor {:#x} software {} processor {}",
            yes_no(error.valid),
            error.module_type,
            error.class_code,
            error.major_error_code,
            error.minor_error_code,
            yes_no(error.software_source),
            yes_no(error.processor_software),
        )?;

        writeln!(f, "  TXT.ACMSTATUS   {:#018x}", regs.acm_status)?;
        writeln!(f, "  TXT.VER.FSBIF   {:#010x}", regs.fsb_if)?;
        writeln!(
            f,
            "  TXT.DIDVID      vid {:#06x} did {:#06x} rid {:#06x} ext {:#06x}{}",
            regs.vid,
            regs.did,
            regs.rid,
            regs.id_ext,
            if regs.is_intel_chipset() { " (Intel)" } else { "" },
        )?;
        writeln!(f, "  TXT.VER.QPIIF   {:#010x}", regs.qpi_if)?;
        writeln!(
            f,
            "  TXT.SINIT       base {:#010x} size {:#x}",
            regs.sinit_base, regs.sinit_size
        )?;
        writeln!(f, "  TXT.MLE.JOIN    {:#010x}", regs.mle_join)?;
        writeln!(
            f,
            "  TXT.HEAP        base {:#010x} size {:#x}",
            regs.heap_base, regs.heap_size
        )?;
        writeln!(
            f,
            "  TXT.DPR         top {:#x} MiB size {} MiB lock {}",
            regs.dpr.top,
            regs.dpr.size,
            yes_no(regs.dpr.lock)
        )?;
        write!(f, "  TXT.PUBLIC.KEY ")?;
        for word in regs.public_key {
            write!(f, " {word:016x}")?;
        }
        writeln!(f)?;
        writeln!(f, "  TXT.E2STS       {:#018x}", regs.e2sts)?;

        let acm = self.acm_status;
        writeln!(f, "ACM status")?;
        writeln!(
            f,
            "  valid {} started {} module {} class {:#x} major {:#x} minor {:#x}",
            yes_no(acm.valid),
            yes_no(acm.acm_started),
            acm.module_type,
            acm.class_code,
            acm.major_error_code,
            acm.minor_error_code,
        )?;
        writeln!(f, "  IBB measured {}", yes_no(acm.ibb_measured()))
    }
}

impl fmt::Display for BiosDataReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.bios_data;
        writeln!(f, "BIOS data region")?;
        writeln!(f, "  size            {:#x}", data.region_size)?;
        writeln!(f, "  version         {}", data.version)?;
        writeln!(f, "  BiosSinitSize   {:#x}", data.bios_sinit_size)?;
        writeln!(f, "  NumLogProcs     {}", data.num_log_procs)?;
        if let Some(flags) = data.sinit_flags {
            writeln!(f, "  SinitFlags      {flags:#010x}")?;
        }
        if let Some(flags) = data.mle_flags {
            writeln!(f, "  MleFlags")?;
            writeln!(f, "    ACPI PPI      {}", yes_no(flags.supports_acpi_ppi))?;
            writeln!(f, "    platform      {:?}", flags.platform_state())?;
        }
        Ok(())
    }
}

impl fmt::Display for FeaturesReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let features = self.features;
        writeln!(f, "Platform features on cpu {}", features.cpu)?;
        writeln!(f, "  IA32_PLATFORM_ID          {:#018x}", features.platform_id)?;
        writeln!(
            f,
            "  feature control locked    {}",
            yes_no(features.feature_control_locked)
        )?;
        writeln!(
            f,
            "  VMX in SMX                {}",
            yes_no(features.allows_vmx_in_smx)
        )?;
        writeln!(
            f,
            "  TXT leaves enabled        {}",
            yes_no(features.txt_leaves_enabled)
        )?;
        writeln!(f, "  SMRR                      {}", yes_no(features.has_smrr))?;
        if let Some(smrr) = features.smrr {
            writeln!(
                f,
                "    active {} base {:#x} mask {:#x}",
                yes_no(smrr.active),
                smrr.phys_base,
                smrr.phys_mask
            )?;
        }
        Ok(())
    }
}
