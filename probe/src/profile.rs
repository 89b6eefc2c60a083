//! The hack profile: everything learned about one device instance.
//!
//! Fields are grouped per concern. Each group is reachable mutably only
//! while the profile is open; [`HackProfile::freeze`] closes it for good.

use bitflags::bitflags;
use core::fmt;

use bridgeprobe_hal::{CdbSize, LegacyVendor, NvmeVendor};

use crate::error::{ProbeError, ProbeResult};

// =============================================================================
// TRANSPORT CLASS
// =============================================================================

/// How ATA/NVMe commands reach the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportClass {
    /// Not negotiated yet
    #[default]
    Unknown,
    /// SCSI/ATA Translation passthrough
    Sat,
    /// Pre-SAT vendor passthrough
    LegacyVendor(LegacyVendor),
    /// Bridge vendor NVMe passthrough
    NvmeVendor(NvmeVendor),
    /// No passthrough works; SCSI only
    NonePossible,
}

impl TransportClass {
    /// ATA commands can be issued
    pub const fn is_ata(&self) -> bool {
        matches!(self, TransportClass::Sat | TransportClass::LegacyVendor(_))
    }

    /// NVMe admin commands can be issued
    pub const fn is_nvme(&self) -> bool {
        matches!(self, TransportClass::NvmeVendor(_))
    }
}

impl fmt::Display for TransportClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Sat => write!(f, "SAT"),
            Self::LegacyVendor(v) => write!(f, "legacy {}", v.name()),
            Self::NvmeVendor(v) => write!(f, "NVMe via {}", v.name()),
            Self::NonePossible => write!(f, "none"),
        }
    }
}

// =============================================================================
// ATA QUIRKS
// =============================================================================

/// ATA addressing width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Addressing {
    /// Not determined
    #[default]
    Unknown,
    /// 28-bit commands only
    Lba28,
    /// 48-bit feature set
    Lba48,
}

/// Multi-sector PIO behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PioMode {
    /// Not tested
    #[default]
    Unknown,
    /// Only single-sector PIO transfers are reliable
    Single,
    /// Multi-sector PIO works at the current multiple setting
    Multiple,
    /// Multi-sector PIO works once SET MULTIPLE MODE selects the maximum
    MultipleWithMode,
}

/// Which DMA protocols a translator passes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DmaMode {
    /// Not tested
    #[default]
    Unknown,
    /// Neither DMA protocol works
    None,
    /// Only the multiword DMA protocol works
    ForceDma,
    /// Only the UDMA protocol works
    ForceUdma,
    /// Both work
    Either,
}

/// Completeness of returned task file registers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RtfrSupport {
    /// Not tested
    #[default]
    Unknown,
    /// All registers, including 48-bit upper bytes
    Full,
    /// Upper bytes of 48-bit results are lost
    PartialOn48bit,
    /// Registers cannot be retrieved
    Unavailable,
}

/// How a translator handles CK_COND
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CheckCondition {
    /// Not tested
    #[default]
    Unknown,
    /// Registers returned for every protocol
    Always,
    /// Registers returned for non-data commands only
    NonDataOnly,
    /// Sense returned but the registers are empty
    Empty,
    /// CK_COND makes commands fail
    Disabled,
}

/// ATA passthrough quirks, meaningful for SAT and legacy vendor classes
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AtaQuirks {
    /// Addressing width
    pub addressing: Addressing,
    /// Multi-sector PIO behaviour
    pub pio: PioMode,
    /// Multiple setting that made multi-sector PIO work
    pub multiple_count: Option<u8>,
    /// DMA protocols
    pub dma: DmaMode,
    /// The returned extend bit reflects 48-bit results
    pub extend_bit_trusted: bool,
    /// Decode 48-bit upper register bytes even with the extend bit clear
    pub ignore_extend_bit: bool,
    /// Returned register completeness
    pub rtfr: RtfrSupport,
    /// Return-response-info needs T_DIR set; `None` until tested
    pub rri_tdir: Option<bool>,
    /// CK_COND behaviour
    pub check_condition: CheckCondition,
    /// Transfer length must be expressed in the TPSIU form
    pub tpsiu_required: bool,
    /// Largest passthrough transfer that worked
    pub max_transfer_bytes: Option<u32>,
    /// Use ATA PASS-THROUGH (16) even for 28-bit commands
    pub prefer_16_byte: bool,
    /// Only ATA PASS-THROUGH (12) works
    pub ata28_only: bool,
    /// ATA PASS-THROUGH (32) works
    pub sat32_capable: bool,
    /// 48-bit commands pass in a 16-byte CDB even though identify needs 12
    pub ext_commands_via_16: bool,
}

// =============================================================================
// SCSI QUIRKS
// =============================================================================

bitflags! {
    /// Read CDB sizes that work
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RwSizes: u8 {
        /// READ (6)
        const SIX = 1 << 0;
        /// READ (10)
        const TEN = 1 << 1;
        /// READ (12)
        const TWELVE = 1 << 2;
        /// READ (16)
        const SIXTEEN = 1 << 3;
    }
}

impl RwSizes {
    /// Flag for one CDB size
    pub const fn from_size(size: CdbSize) -> Self {
        match size {
            CdbSize::Six => Self::SIX,
            CdbSize::Ten => Self::TEN,
            CdbSize::Twelve => Self::TWELVE,
            CdbSize::Sixteen => Self::SIXTEEN,
        }
    }

    /// Largest working size
    pub fn largest(&self) -> Option<CdbSize> {
        CdbSize::ALL
            .iter()
            .rev()
            .copied()
            .find(|&size| self.contains(Self::from_size(size)))
    }
}

/// VPD page support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VpdSupport {
    /// Not tested
    #[default]
    Unknown,
    /// The supported-pages directory is readable
    Directory,
    /// No directory, but pages answer when asked directly
    DirectoryMissing,
    /// No VPD pages at all
    Unsupported,
}

/// MODE SENSE quirks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModeQuirks {
    /// No form of MODE SENSE works
    pub unsupported: bool,
    /// Subpage requests return the base page
    pub subpages_unsupported: bool,
    /// Only MODE SENSE (6) works
    pub six_byte_only: bool,
}

/// LOG SENSE quirks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LogQuirks {
    /// LOG SENSE is not supported
    pub unsupported: bool,
    /// Subpage requests return the base page
    pub subpages_unsupported: bool,
}

/// SECURITY PROTOCOL IN support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecuritySupport {
    /// Not tested
    #[default]
    Unknown,
    /// Not supported
    Unsupported,
    /// Supported with byte allocation lengths
    Supported,
    /// Supported only with INC_512 set
    Inc512Only,
}

/// REPORT SUPPORTED OPERATION CODES granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpCodeReporting {
    /// Not tested
    #[default]
    Unknown,
    /// Not supported
    None,
    /// Single command queries only
    SingleOnly,
    /// Full list
    All,
}

/// SCSI layer quirks, always meaningful
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScsiQuirks {
    /// Read CDB sizes that work
    pub rw_sizes: RwSizes,
    /// Zero-length transfers fail
    pub requires_nonzero_length: bool,
    /// VPD support
    pub vpd: VpdSupport,
    /// MODE SENSE quirks
    pub mode: ModeQuirks,
    /// LOG SENSE quirks
    pub log: LogQuirks,
    /// SECURITY PROTOCOL IN support
    pub security: SecuritySupport,
    /// REPORT SUPPORTED OPERATION CODES granularity
    pub opcodes: OpCodeReporting,
    /// Largest SCSI read that worked
    pub max_transfer_bytes: Option<u32>,
}

/// NVMe passthrough quirks, meaningful for the NVMe vendor class
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NvmeQuirks {
    /// Bridge family
    pub vendor: Option<NvmeVendor>,
    /// Only identify and SMART style admin commands pass
    pub limited: bool,
    /// Largest transfer the controller reports
    pub max_transfer_bytes: Option<u32>,
}

/// Error recovery quirk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecoveryQuirk {
    /// Issue TEST UNIT READY after every failed command
    pub requires_unit_ready_after_failure: bool,
    /// How bad the translator gets after a failure
    pub severity: u8,
}

// =============================================================================
// HACK PROFILE
// =============================================================================

/// Per-device capability record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HackProfile {
    transport_class: TransportClass,
    ata: AtaQuirks,
    scsi: ScsiQuirks,
    nvme: NvmeQuirks,
    recovery: RecoveryQuirk,
    frozen: bool,
}

impl HackProfile {
    /// Create an empty, open profile
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport class
    pub const fn transport_class(&self) -> TransportClass {
        self.transport_class
    }

    /// Decide the transport class. Only the first decision sticks.
    pub fn set_transport_class(&mut self, class: TransportClass) -> ProbeResult<()> {
        self.check_open()?;
        if self.transport_class != TransportClass::Unknown {
            log::warn!(
                "Rejected transport class {} (already {})",
                class,
                self.transport_class
            );
            return Err(ProbeError::TransportClassAlreadySet);
        }
        log::info!("Transport class: {}", class);
        self.transport_class = class;
        Ok(())
    }

    /// ATA quirks
    pub const fn ata(&self) -> &AtaQuirks {
        &self.ata
    }

    /// ATA quirks, while open
    pub fn ata_mut(&mut self) -> ProbeResult<&mut AtaQuirks> {
        self.check_open()?;
        Ok(&mut self.ata)
    }

    /// SCSI quirks
    pub const fn scsi(&self) -> &ScsiQuirks {
        &self.scsi
    }

    /// SCSI quirks, while open
    pub fn scsi_mut(&mut self) -> ProbeResult<&mut ScsiQuirks> {
        self.check_open()?;
        Ok(&mut self.scsi)
    }

    /// NVMe quirks
    pub const fn nvme(&self) -> &NvmeQuirks {
        &self.nvme
    }

    /// NVMe quirks, while open
    pub fn nvme_mut(&mut self) -> ProbeResult<&mut NvmeQuirks> {
        self.check_open()?;
        Ok(&mut self.nvme)
    }

    /// Recovery quirk
    pub const fn recovery(&self) -> &RecoveryQuirk {
        &self.recovery
    }

    /// Recovery quirk, while open
    pub fn recovery_mut(&mut self) -> ProbeResult<&mut RecoveryQuirk> {
        self.check_open()?;
        Ok(&mut self.recovery)
    }

    /// Close the profile against further mutation
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Check if frozen
    pub const fn is_frozen(&self) -> bool {
        self.frozen
    }

    fn check_open(&self) -> ProbeResult<()> {
        if self.frozen {
            log::warn!("Attempted to modify a frozen profile");
            return Err(ProbeError::ProfileFrozen);
        }
        Ok(())
    }
}
