//! The probe session threaded through every component.

use alloc::string::String;
use alloc::vec::Vec;
use core::time::Duration;

use bridgeprobe_hal::{
    AtaEncoding, AtaRequest, Command, IdentifyController, IdentifyData, PassthroughFlags,
    Transport,
};

use crate::classify::{Outcome, ProbeOutcome};
use crate::config::ProbeConfig;
use crate::error::{ProbeError, ProbeResult};
use crate::profile::{HackProfile, TransportClass};
use crate::quirks::RetestState;
use crate::report::{Finding, FindingKind};
use crate::snapshot::ScsiDeviceSnapshot;

/// Run-wide retest bookkeeping for the detectors that may retry once.
#[derive(Debug, Clone, Copy, Default)]
pub struct Retests {
    /// Multi-sector PIO multiple-mode retry
    pub pio: RetestState,
    /// Extend-bit retoggle
    pub extend: RetestState,
}

/// One probe run against one device.
///
/// Owns the profile and snapshot being built; borrows the transport.
pub struct ProbeSession<'t, T: Transport + ?Sized> {
    transport: &'t mut T,
    /// Profile under construction
    pub profile: HackProfile,
    /// SCSI reference data
    pub snapshot: ScsiDeviceSnapshot,
    /// Run configuration
    pub config: ProbeConfig,
    /// ATA IDENTIFY data from the passthrough that worked
    pub ata_identity: Option<IdentifyData>,
    /// NVMe identify data from the bridge passthrough that worked
    pub nvme_identity: Option<IdentifyController>,
    /// Retest bookkeeping
    pub retests: Retests,
    findings: Vec<Finding>,
    commands: u32,
}

impl<'t, T: Transport + ?Sized> ProbeSession<'t, T> {
    /// Start a session with an empty profile
    pub fn new(transport: &'t mut T, config: ProbeConfig) -> Self {
        Self {
            transport,
            profile: HackProfile::new(),
            snapshot: ScsiDeviceSnapshot::default(),
            config,
            ata_identity: None,
            nvme_identity: None,
            retests: Retests::default(),
            findings: Vec::new(),
            commands: 0,
        }
    }

    /// Issue one command and classify the result
    pub fn issue(&mut self, command: impl Into<Command>) -> ProbeOutcome {
        let command = command.into();
        let result = self.transport.issue(&command);
        self.commands += 1;
        let outcome = ProbeOutcome::from_result(result, self.profile.ata().ignore_extend_bit);
        log::debug!(
            "{} -> {} ({} bytes, {:?})",
            command.name(),
            outcome.outcome,
            outcome.data.len(),
            outcome.elapsed
        );
        outcome
    }

    /// Issue a command; busy or timeout aborts the caller's probe group
    pub fn issue_checked(&mut self, command: impl Into<Command>) -> ProbeResult<ProbeOutcome> {
        let outcome = self.issue(command);
        if outcome.outcome == Outcome::BusyOrTimeout {
            return Err(ProbeError::DeviceUnresponsive);
        }
        Ok(outcome)
    }

    /// Bring the device back after a failure or hang-prone command
    pub fn recover(&mut self) {
        log::debug!("Recovery command");
        self.transport.recover();
    }

    /// Wait, for operator-visible warnings before risky probes
    pub fn delay(&mut self, duration: Duration) {
        self.transport.delay(duration);
    }

    /// Commands issued so far
    pub const fn commands_issued(&self) -> u32 {
        self.commands
    }

    /// Record a settled quirk
    pub fn finding(&mut self, detector: &'static str, message: impl Into<String>) {
        let message = message.into();
        log::info!("{}: {}", detector, message);
        self.findings.push(Finding {
            kind: FindingKind::Quirk,
            detector,
            message,
        });
    }

    /// Record a detector that could not run
    pub fn skip(&mut self, detector: &'static str, missing: impl Into<String>) {
        let message = missing.into();
        log::info!("{} skipped: {}", detector, message);
        self.findings.push(Finding {
            kind: FindingKind::Skip,
            detector,
            message,
        });
    }

    /// Record an advisory
    pub fn advisory(&mut self, finding: Finding) {
        log::info!("{}", finding);
        self.findings.push(finding);
    }

    /// Ledger so far
    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    /// ATA passthrough wrapper for a command of the given width.
    ///
    /// `None` when no ATA passthrough is available.
    pub fn ata_encoding(&self, ext: bool) -> Option<AtaEncoding> {
        let ata = self.profile.ata();
        match self.profile.transport_class() {
            TransportClass::Sat => Some(if ata.ata28_only && !(ext && ata.ext_commands_via_16) {
                AtaEncoding::Sat12
            } else if ext || ata.prefer_16_byte || ata.ata28_only {
                AtaEncoding::Sat16
            } else {
                AtaEncoding::Sat12
            }),
            TransportClass::LegacyVendor(vendor) => Some(AtaEncoding::Legacy(vendor)),
            _ => None,
        }
    }

    /// The encoding for an ATA detector, or a skip note when there is none
    pub fn require_ata(&mut self, detector: &'static str, ext: bool) -> Option<AtaEncoding> {
        let encoding = self.ata_encoding(ext);
        if encoding.is_none() {
            let class = self.profile.transport_class();
            self.skip(
                detector,
                alloc::format!("no ATA passthrough (transport class {})", class),
            );
        }
        encoding
    }

    /// Passthrough bits every ATA command from this session must carry
    pub fn ata_flags(&self) -> PassthroughFlags {
        if self.profile.ata().tpsiu_required {
            PassthroughFlags::TPSIU
        } else {
            PassthroughFlags::empty()
        }
    }

    /// Issue an ATA request with the session's standing flags
    pub fn issue_ata(&mut self, request: AtaRequest) -> ProbeResult<ProbeOutcome> {
        let flags = self.ata_flags();
        self.issue_checked(request.with_flags(flags))
    }

    /// Use the 48-bit command forms
    pub fn lba48(&self) -> bool {
        self.ata_identity
            .as_ref()
            .is_some_and(IdentifyData::supports_lba48)
    }

    /// Whether the wrapper chosen for 48-bit commands has room for the
    /// upper register bytes. SAT-12 and the legacy wrappers do not.
    pub fn can_carry_48bit(&self) -> bool {
        matches!(
            self.ata_encoding(true),
            Some(AtaEncoding::Sat16 | AtaEncoding::Sat32)
        )
    }

    /// Issue 48-bit command forms: the drive has them and the wrapper
    /// carries them
    pub fn ext_commands(&self) -> bool {
        self.lba48() && self.can_carry_48bit()
    }

    /// Split into the parts a report needs
    pub fn into_parts(self) -> (HackProfile, ScsiDeviceSnapshot, Vec<Finding>) {
        (self.profile, self.snapshot, self.findings)
    }
}

impl<T: Transport + ?Sized> core::fmt::Debug for ProbeSession<'_, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProbeSession")
            .field("profile", &self.profile)
            .field("commands", &self.commands)
            .field("findings", &self.findings.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockDevice;

    #[test]
    fn test_encoding_follows_profile() {
        let mut dev = MockDevice::sat_disk();
        let mut session = ProbeSession::new(&mut dev, ProbeConfig::default());
        assert_eq!(session.ata_encoding(false), None);

        session.profile.set_transport_class(TransportClass::Sat).unwrap();
        assert_eq!(session.ata_encoding(false), Some(AtaEncoding::Sat12));
        assert_eq!(session.ata_encoding(true), Some(AtaEncoding::Sat16));

        session.profile.ata_mut().unwrap().ata28_only = true;
        assert_eq!(session.ata_encoding(true), Some(AtaEncoding::Sat12));
        session.profile.ata_mut().unwrap().ext_commands_via_16 = true;
        assert_eq!(session.ata_encoding(true), Some(AtaEncoding::Sat16));
    }

    #[test]
    fn test_ext_commands_need_a_wide_wrapper() {
        let mut dev = MockDevice::sat_disk();
        let identity = IdentifyData::from_bytes(&dev.identify);
        let mut session = ProbeSession::new(&mut dev, ProbeConfig::default());
        session.ata_identity = identity;
        session.profile.set_transport_class(TransportClass::Sat).unwrap();
        assert!(session.lba48());
        assert!(session.ext_commands());

        session.profile.ata_mut().unwrap().ata28_only = true;
        assert!(!session.can_carry_48bit());
        assert!(!session.ext_commands());

        session.profile.ata_mut().unwrap().ext_commands_via_16 = true;
        assert!(session.ext_commands());
    }

    #[test]
    fn test_legacy_wrapper_is_28bit() {
        let mut dev = MockDevice::sat_disk();
        let mut session = ProbeSession::new(&mut dev, ProbeConfig::default());
        session
            .profile
            .set_transport_class(TransportClass::LegacyVendor(
                bridgeprobe_hal::LegacyVendor::Cypress,
            ))
            .unwrap();
        assert!(!session.can_carry_48bit());
    }

    #[test]
    fn test_require_ata_records_skip() {
        let mut dev = MockDevice::sat_disk();
        let mut session = ProbeSession::new(&mut dev, ProbeConfig::default());
        session
            .profile
            .set_transport_class(TransportClass::NonePossible)
            .unwrap();
        assert!(session.require_ata("dma", false).is_none());
        assert_eq!(session.findings().len(), 1);
        assert_eq!(session.findings()[0].kind, FindingKind::Skip);
    }

    #[test]
    fn test_issue_counts_commands() {
        let mut dev = MockDevice::sat_disk();
        let mut session = ProbeSession::new(&mut dev, ProbeConfig::default());
        let outcome = session.issue(bridgeprobe_hal::ScsiRequest::TestUnitReady);
        assert!(outcome.is_ok());
        assert_eq!(session.commands_issued(), 1);
        drop(session);
        assert_eq!(dev.log.len(), 1);
    }
}
