//! Findings ledger, final report and recommendations.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::profile::{
    CheckCondition, DmaMode, HackProfile, PioMode, RtfrSupport, SecuritySupport, TransportClass,
    VpdSupport,
};
use crate::snapshot::ScsiDeviceSnapshot;

/// Kind of ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindingKind {
    /// A detector settled a quirk
    Quirk,
    /// A detector did not run; its prerequisite is missing
    Skip,
    /// Cross-validation note; never changes the profile
    Advisory,
}

/// One entry in the run's ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    /// Entry kind
    pub kind: FindingKind,
    /// Detector that produced it
    pub detector: &'static str,
    /// Human-readable detail
    pub message: String,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.kind {
            FindingKind::Quirk => "quirk",
            FindingKind::Skip => "skip",
            FindingKind::Advisory => "advisory",
        };
        write!(f, "[{}] {}: {}", tag, self.detector, self.message)
    }
}

/// Result of a probe run
#[derive(Debug, Clone)]
pub struct ProbeReport {
    /// Frozen capability record
    pub profile: HackProfile,
    /// SCSI reference data
    pub snapshot: ScsiDeviceSnapshot,
    /// Ledger, in the order entries were made
    pub findings: Vec<Finding>,
    /// The profile came from the store, not from probing
    pub from_store: bool,
}

impl ProbeReport {
    /// Entries from one detector
    pub fn findings_for<'a>(&'a self, detector: &'a str) -> impl Iterator<Item = &'a Finding> + 'a {
        self.findings.iter().filter(move |f| f.detector == detector)
    }

    /// Entries of one kind
    pub fn findings_of(&self, kind: FindingKind) -> impl Iterator<Item = &Finding> + '_ {
        self.findings.iter().filter(move |f| f.kind == kind)
    }

    /// What higher-level drive code should do differently for this device.
    pub fn recommendations(&self) -> Vec<String> {
        let profile = &self.profile;
        let ata = profile.ata();
        let scsi = profile.scsi();
        let mut out = Vec::new();

        match profile.transport_class() {
            TransportClass::NonePossible => {
                out.push(String::from(
                    "No passthrough works: restrict to SCSI commands",
                ));
            }
            TransportClass::LegacyVendor(v) => {
                out.push(format!("Use the {} vendor passthrough for ATA commands", v.name()));
            }
            TransportClass::NvmeVendor(v) => {
                out.push(format!("Use the {} NVMe passthrough", v.name()));
                if profile.nvme().limited {
                    out.push(String::from(
                        "Only identify and SMART admin commands pass this bridge",
                    ));
                }
            }
            TransportClass::Sat | TransportClass::Unknown => {}
        }

        if ata.ata28_only && !ata.ext_commands_via_16 {
            out.push(String::from(
                "Use ATA PASS-THROUGH (12) and 28-bit commands only",
            ));
        } else if ata.ata28_only {
            out.push(String::from(
                "Use ATA PASS-THROUGH (12) for 28-bit and (16) for 48-bit commands",
            ));
        }
        if ata.prefer_16_byte {
            out.push(String::from("Use ATA PASS-THROUGH (16) for every ATA command"));
        }
        if ata.tpsiu_required {
            out.push(String::from("Express passthrough transfer lengths in the TPSIU form"));
        }
        match ata.dma {
            DmaMode::None => out.push(String::from("Avoid DMA protocols; use PIO")),
            DmaMode::ForceDma => out.push(String::from("Use the DMA protocol, never UDMA")),
            DmaMode::ForceUdma => out.push(String::from("Use the UDMA protocol, never DMA")),
            DmaMode::Either | DmaMode::Unknown => {}
        }
        match ata.pio {
            PioMode::Single => out.push(String::from("Limit PIO transfers to one sector")),
            PioMode::MultipleWithMode => out.push(format!(
                "Set multiple mode to {} before multi-sector PIO",
                ata.multiple_count.unwrap_or(0)
            )),
            PioMode::Multiple | PioMode::Unknown => {}
        }
        match ata.rtfr {
            RtfrSupport::Unavailable => {
                out.push(String::from("Do not rely on returned ATA registers"));
            }
            RtfrSupport::PartialOn48bit => {
                out.push(String::from("Returned registers lose 48-bit upper bytes"));
            }
            RtfrSupport::Full | RtfrSupport::Unknown => {}
        }
        if ata.ignore_extend_bit {
            out.push(String::from(
                "Decode 48-bit registers even when the extend bit is clear",
            ));
        }
        match ata.check_condition {
            CheckCondition::Disabled | CheckCondition::Empty => {
                out.push(String::from("Never set CK_COND"));
            }
            CheckCondition::NonDataOnly => {
                out.push(String::from("Set CK_COND on non-data commands only"));
            }
            CheckCondition::Always | CheckCondition::Unknown => {}
        }
        if let Some(bytes) = ata.max_transfer_bytes {
            out.push(format!("Limit passthrough transfers to {} bytes", bytes));
        }
        if let Some(bytes) = profile.nvme().max_transfer_bytes {
            out.push(format!("Limit NVMe transfers to {} bytes", bytes));
        }

        if scsi.rw_sizes.is_empty() {
            out.push(String::from("No read command works"));
        } else if let Some(size) = scsi.rw_sizes.largest() {
            out.push(format!("Use {}-byte read/write CDBs", size.bytes()));
        }
        if scsi.requires_nonzero_length {
            out.push(String::from("Never issue zero-length transfers"));
        }
        if let Some(bytes) = scsi.max_transfer_bytes {
            out.push(format!("Limit SCSI transfers to {} bytes", bytes));
        }
        match scsi.vpd {
            VpdSupport::DirectoryMissing => out.push(String::from(
                "Request VPD pages directly; the directory is missing",
            )),
            VpdSupport::Unsupported => out.push(String::from("Do not request VPD pages")),
            VpdSupport::Directory | VpdSupport::Unknown => {}
        }
        if scsi.mode.unsupported {
            out.push(String::from("Do not issue MODE SENSE"));
        } else if scsi.mode.six_byte_only {
            out.push(String::from("Use MODE SENSE (6) only"));
        }
        if scsi.mode.subpages_unsupported {
            out.push(String::from("Do not request mode subpages"));
        }
        if scsi.log.unsupported {
            out.push(String::from("Do not issue LOG SENSE"));
        } else if scsi.log.subpages_unsupported {
            out.push(String::from("Do not request log subpages"));
        }
        if scsi.security == SecuritySupport::Inc512Only {
            out.push(String::from("Set INC_512 on SECURITY PROTOCOL commands"));
        }

        let recovery = profile.recovery();
        if recovery.requires_unit_ready_after_failure {
            out.push(format!(
                "Issue TEST UNIT READY after every failed command (severity {})",
                recovery.severity
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    fn report(profile: HackProfile) -> ProbeReport {
        ProbeReport {
            profile,
            snapshot: ScsiDeviceSnapshot::default(),
            findings: Vec::new(),
            from_store: false,
        }
    }

    #[test]
    fn test_recommendations_follow_quirks() {
        let mut profile = HackProfile::new();
        profile.set_transport_class(TransportClass::Sat).unwrap();
        profile.ata_mut().unwrap().prefer_16_byte = true;
        profile.scsi_mut().unwrap().requires_nonzero_length = true;
        let recovery = profile.recovery_mut().unwrap();
        recovery.requires_unit_ready_after_failure = true;
        recovery.severity = 10;
        profile.freeze();

        let recs = report(profile).recommendations();
        assert!(recs.iter().any(|r| r.contains("PASS-THROUGH (16)")));
        assert!(recs.iter().any(|r| r.contains("zero-length")));
        assert!(recs.iter().any(|r| r.contains("severity 10")));
    }

    #[test]
    fn test_finding_display() {
        let finding = Finding {
            kind: FindingKind::Skip,
            detector: "dma",
            message: String::from("no ATA passthrough"),
        };
        assert_eq!(finding.to_string(), "[skip] dma: no ATA passthrough");
    }
}
