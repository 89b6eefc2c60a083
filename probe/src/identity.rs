//! Baseline identity: standard inquiry and both capacity commands.

use alloc::format;

use bridgeprobe_hal::scsi::FULL_INQUIRY_LENGTH;
use bridgeprobe_hal::{InquiryData, ReadCapacity10, ReadCapacity16, ScsiRequest, Transport};

use crate::error::{ProbeError, ProbeResult};
use crate::session::ProbeSession;

const DETECTOR: &str = "identity";

/// Read inquiry and capacity into the snapshot.
///
/// A failed inquiry fails the group; capacity failures are only noted,
/// since some bridges implement just one of the two commands.
pub fn probe_identity<T: Transport + ?Sized>(session: &mut ProbeSession<'_, T>) -> ProbeResult<()> {
    let inquiry = session.issue_checked(ScsiRequest::Inquiry {
        evpd: false,
        page: 0,
        allocation: FULL_INQUIRY_LENGTH,
    })?;
    inquiry.outcome.into_result()?;
    let data = InquiryData::from_bytes(&inquiry.data).ok_or(ProbeError::OtherFailure)?;

    let snap = &mut session.snapshot;
    snap.vendor = data.vendor_string();
    snap.product = data.product_string();
    snap.revision = data.revision_string();
    snap.device_type = data.device_type();
    snap.scsi_version = data.scsi_version();
    snap.removable = data.is_removable();
    snap.peripheral_qualifier = data.peripheral_qualifier();
    if snap.peripheral_qualifier != 0 {
        let qualifier = snap.peripheral_qualifier;
        session.finding(
            DETECTOR,
            format!("peripheral qualifier {}: no logical unit connected", qualifier),
        );
    }

    let c10 = session.issue_checked(ScsiRequest::ReadCapacity10)?;
    session.snapshot.capacity10 = c10
        .is_ok()
        .then(|| ReadCapacity10::from_bytes(&c10.data))
        .flatten();

    let c16 = session.issue_checked(ScsiRequest::ReadCapacity16 { allocation: 32 })?;
    session.snapshot.capacity16 = c16
        .is_ok()
        .then(|| ReadCapacity16::from_bytes(&c16.data))
        .flatten();

    match (session.snapshot.capacity10, session.snapshot.capacity16) {
        (None, None) => session.finding(DETECTOR, "neither READ CAPACITY command works"),
        (Some(c10), None) if c10.is_saturated() => session.finding(
            DETECTOR,
            "READ CAPACITY (10) saturated and READ CAPACITY (16) fails",
        ),
        (Some(c10), Some(c16))
            if !c10.is_saturated() && c10.total_blocks() != c16.total_blocks() =>
        {
            session.finding(
                DETECTOR,
                format!(
                    "capacity mismatch: {} blocks (10) vs {} blocks (16)",
                    c10.total_blocks(),
                    c16.total_blocks()
                ),
            )
        }
        _ => {}
    }

    let summary = format!(
        "{} {} {} (type {:?}, SPC-{}, {:?} blocks of {}, {} physical)",
        session.snapshot.vendor,
        session.snapshot.product,
        session.snapshot.revision,
        session.snapshot.device_type,
        session.snapshot.scsi_version,
        session.snapshot.total_blocks(),
        session.snapshot.block_size(),
        session.snapshot.physical_block_size()
    );
    session.finding(DETECTOR, summary);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProbeConfig;
    use crate::report::FindingKind;
    use crate::testing::{capacity16, inquiry_data, MockDevice};
    use bridgeprobe_hal::DeviceType;

    #[test]
    fn test_identity_fills_snapshot() {
        let mut dev = MockDevice::sat_disk();
        let mut session = ProbeSession::new(&mut dev, ProbeConfig::default());
        probe_identity(&mut session).unwrap();
        assert_eq!(session.snapshot.vendor, "ATA");
        assert_eq!(session.snapshot.product, "ST2000DM008-2FR1");
        assert_eq!(session.snapshot.device_type, DeviceType::DirectAccess);
        assert_eq!(session.snapshot.scsi_version, 6);
        assert_eq!(session.snapshot.total_blocks(), Some(3_907_029_168));
        assert_eq!(session.snapshot.peripheral_qualifier, 0);
        assert_eq!(session.findings().len(), 1);
    }

    #[test]
    fn test_disconnected_unit_is_noted() {
        let mut dev = MockDevice::sat_disk();
        dev.inquiry = inquiry_data("ATA", "ST2000DM008-2FR1", "0001", 6, 0x20);
        let mut session = ProbeSession::new(&mut dev, ProbeConfig::default());
        probe_identity(&mut session).unwrap();
        assert_eq!(session.snapshot.peripheral_qualifier, 1);
        assert_eq!(session.snapshot.device_type, DeviceType::DirectAccess);
        assert!(session
            .findings()
            .iter()
            .any(|f| f.kind == FindingKind::Quirk && f.message.contains("qualifier 1")));
    }

    #[test]
    fn test_summary_reports_physical_blocks() {
        let mut dev = MockDevice::sat_disk();
        let mut c16 = capacity16(3_907_029_167, 512);
        c16[13] = 0x03;
        dev.capacity16 = Some(c16);
        let mut session = ProbeSession::new(&mut dev, ProbeConfig::default());
        probe_identity(&mut session).unwrap();
        assert_eq!(session.snapshot.physical_block_size(), 4096);
        assert!(session.findings()[0].message.contains("4096 physical"));
    }

    #[test]
    fn test_missing_capacity16_is_tolerated() {
        let mut dev = MockDevice::sat_disk();
        dev.capacity16 = None;
        let mut session = ProbeSession::new(&mut dev, ProbeConfig::default());
        probe_identity(&mut session).unwrap();
        assert!(session.snapshot.capacity16.is_none());
        assert_eq!(session.snapshot.total_blocks(), Some(3_907_029_168));
    }

    #[test]
    fn test_no_capacity_is_noted() {
        let mut dev = MockDevice::sat_disk();
        dev.capacity10 = None;
        dev.capacity16 = None;
        let mut session = ProbeSession::new(&mut dev, ProbeConfig::default());
        probe_identity(&mut session).unwrap();
        assert!(session
            .findings()
            .iter()
            .any(|f| f.kind == FindingKind::Quirk && f.message.contains("neither")));
    }
}
