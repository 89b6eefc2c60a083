//! Vital product data pages.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use bridgeprobe_hal::scsi::{ascii_field, vpd};
use bridgeprobe_hal::{IdentifyData, Transport};

use super::ends_pass;
use crate::error::{ProbeError, ProbeResult};
use crate::page_reader::{read_page, PageSelector};
use crate::profile::VpdSupport;
use crate::session::ProbeSession;
use crate::snapshot::{BlockLimits, BridgeInfo, Designator, ScsiDeviceSnapshot};

const DETECTOR: &str = "vpd";

/// SPC-3 and later define block limits and block device characteristics
const SPC3: u8 = 5;

// Offsets inside the ATA information page
const ATA_INFO_IDENTIFY: usize = 60;
const ATA_INFO_LENGTH: usize = ATA_INFO_IDENTIFY + 512;

/// Pages worth trying when the directory cannot be read.
///
/// The ATA information page is only tried for a SAT vendor string; the
/// block pages only for devices that claim SPC-3.
pub fn fallback_candidates(snapshot: &ScsiDeviceSnapshot) -> Vec<u8> {
    let mut pages = alloc::vec![
        vpd::UNIT_SERIAL_NUMBER,
        vpd::DEVICE_IDENTIFICATION,
        vpd::EXTENDED_INQUIRY,
    ];
    if snapshot.vendor == "ATA" {
        pages.push(vpd::ATA_INFO);
    }
    if snapshot.scsi_version >= SPC3 && snapshot.device_type.is_block_device() {
        pages.push(vpd::BLOCK_LIMITS);
        pages.push(vpd::BLOCK_DEVICE_CHARACTERISTICS);
    }
    pages
}

/// Enumerate and parse VPD pages.
pub fn discover_vpd<T: Transport + ?Sized>(session: &mut ProbeSession<'_, T>) -> ProbeResult<()> {
    let directory = match read_page(session, PageSelector::Vpd(vpd::SUPPORTED_PAGES)) {
        Ok(page) => Some(page),
        Err(err) if ends_pass(&err) => return Err(err),
        Err(err) => {
            log::debug!("VPD directory unreadable: {}", err);
            None
        }
    };

    let listed = directory.is_some();
    let candidates = match &directory {
        Some(page) if page.len() >= 4 => {
            let len = u16::from_be_bytes([page[2], page[3]]) as usize;
            let end = (4 + len).min(page.len());
            page[4..end].to_vec()
        }
        Some(_) => Vec::new(),
        None => fallback_candidates(&session.snapshot),
    };
    if let Some(page) = directory {
        session.snapshot.raw_vpd.insert(vpd::SUPPORTED_PAGES, page);
    }

    let mut found = Vec::new();
    for &code in &candidates {
        if code == vpd::SUPPORTED_PAGES {
            continue;
        }
        match read_page(session, PageSelector::Vpd(code)) {
            Ok(page) => {
                parse_vpd(&mut session.snapshot, code, &page);
                session.snapshot.raw_vpd.insert(code, page);
                found.push(code);
            }
            Err(err) if ends_pass(&err) => return Err(err),
            Err(err @ ProbeError::DataInconsistency { .. }) => {
                session.finding(DETECTOR, format!("page {:02X}h ignored: {}", code, err));
            }
            Err(err) => log::debug!("VPD page {:02X}h: {}", code, err),
        }
    }

    let support = match (listed, found.is_empty()) {
        (true, _) => VpdSupport::Directory,
        (false, false) => VpdSupport::DirectoryMissing,
        (false, true) => VpdSupport::Unsupported,
    };
    session.profile.scsi_mut()?.vpd = support;
    session.snapshot.vpd_pages = if listed { candidates } else { found };

    let message = match support {
        VpdSupport::Directory => format!("directory lists {:02X?}", session.snapshot.vpd_pages),
        VpdSupport::DirectoryMissing => format!(
            "directory missing; pages {:02X?} answer directly",
            session.snapshot.vpd_pages
        ),
        _ => String::from("no VPD pages"),
    };
    session.finding(DETECTOR, message);
    Ok(())
}

/// Feed one page into the snapshot; short pages are ignored.
pub fn parse_vpd(snapshot: &mut ScsiDeviceSnapshot, code: u8, page: &[u8]) {
    if page.len() < 4 {
        return;
    }
    match code {
        vpd::UNIT_SERIAL_NUMBER => {
            let serial = ascii_field(&page[4..]);
            if !serial.is_empty() {
                snapshot.serial = Some(serial);
            }
        }
        vpd::DEVICE_IDENTIFICATION => snapshot.designators = parse_designators(&page[4..]),
        vpd::EXTENDED_INQUIRY => snapshot.extended_inquiry = Some(page.to_vec()),
        vpd::ATA_INFO => {
            if page.len() >= 36 {
                snapshot.bridge = Some(BridgeInfo {
                    vendor: ascii_field(&page[8..16]),
                    product: ascii_field(&page[16..32]),
                    revision: ascii_field(&page[32..36]),
                });
            }
            if page.len() >= ATA_INFO_LENGTH {
                snapshot.embedded_identify =
                    IdentifyData::from_bytes(&page[ATA_INFO_IDENTIFY..ATA_INFO_LENGTH])
                        .filter(IdentifyData::is_plausible);
            }
        }
        vpd::BLOCK_LIMITS if page.len() >= 16 => {
            snapshot.block_limits = Some(BlockLimits {
                max_transfer_blocks: u32::from_be_bytes([page[8], page[9], page[10], page[11]]),
                optimal_transfer_blocks: u32::from_be_bytes([
                    page[12], page[13], page[14], page[15],
                ]),
            });
        }
        vpd::BLOCK_DEVICE_CHARACTERISTICS if page.len() >= 8 => {
            let rotation = u16::from_be_bytes([page[4], page[5]]);
            if rotation != 0 {
                snapshot.rotation_rate = Some(rotation);
            }
            let form_factor = page[7] & 0x0F;
            if form_factor != 0 {
                snapshot.form_factor = Some(form_factor);
            }
        }
        _ => {}
    }
}

fn parse_designators(mut body: &[u8]) -> Vec<Designator> {
    let mut out = Vec::new();
    while body.len() >= 4 {
        let len = body[3] as usize;
        let Some(value) = body.get(4..4 + len) else {
            break;
        };
        out.push(Designator {
            code_set: body[0] & 0x0F,
            association: (body[1] >> 4) & 0x03,
            kind: body[1] & 0x0F,
            value: value.to_vec(),
        });
        body = &body[4 + len..];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProbeConfig;
    use crate::identity::probe_identity;
    use crate::testing::{vpd_page, MockDevice};

    #[test]
    fn test_directory_drives_enumeration() {
        let mut dev = MockDevice::sat_disk();
        let mut session = ProbeSession::new(&mut dev, ProbeConfig::default());
        probe_identity(&mut session).unwrap();
        discover_vpd(&mut session).unwrap();

        assert_eq!(session.profile.scsi().vpd, VpdSupport::Directory);
        let snap = &session.snapshot;
        assert_eq!(snap.serial.as_deref(), Some("ZFL0ABCD"));
        assert_eq!(snap.wwn(), Some(0x5000_C500_1234_5678));
        assert_eq!(snap.rotation_rate, Some(7200));
        assert_eq!(snap.form_factor, Some(2));
        assert_eq!(snap.bridge.as_ref().unwrap().vendor, "LINUX");
        assert_eq!(
            snap.embedded_identify.as_ref().unwrap().model(),
            "ST2000DM008-2FR102"
        );
        assert_eq!(snap.block_limits.unwrap().max_transfer_blocks, 0xFFFF);
    }

    #[test]
    fn test_missing_directory_is_distinct_from_no_pages() {
        // directory fails, device identification answers
        let mut dev = MockDevice::sat_disk();
        dev.vpd_directory = false;
        let mut session = ProbeSession::new(&mut dev, ProbeConfig::default());
        probe_identity(&mut session).unwrap();
        discover_vpd(&mut session).unwrap();
        assert_eq!(session.profile.scsi().vpd, VpdSupport::DirectoryMissing);
        assert!(session.snapshot.wwn().is_some());
        assert!(session.snapshot.vpd_pages.contains(&vpd::DEVICE_IDENTIFICATION));
        drop(session);

        let mut dev = MockDevice::sat_disk();
        dev.vpd_directory = false;
        dev.vpd.clear();
        let mut session = ProbeSession::new(&mut dev, ProbeConfig::default());
        probe_identity(&mut session).unwrap();
        discover_vpd(&mut session).unwrap();
        assert_eq!(session.profile.scsi().vpd, VpdSupport::Unsupported);
    }

    #[test]
    fn test_fallback_needs_evidence_for_ata_pages() {
        let mut snap = ScsiDeviceSnapshot::default();
        snap.vendor = "Generic".into();
        snap.scsi_version = 4;
        let pages = fallback_candidates(&snap);
        assert_eq!(pages, [0x80, 0x83, 0x86]);

        snap.vendor = "ATA".into();
        snap.scsi_version = 6;
        let pages = fallback_candidates(&snap);
        assert!(pages.contains(&vpd::ATA_INFO));
        assert!(pages.contains(&vpd::BLOCK_LIMITS));
    }

    #[test]
    fn test_designator_walk_stops_on_truncation() {
        let mut snap = ScsiDeviceSnapshot::default();
        let body = [0x01, 0x03, 0x00, 0x08, 0x50, 0x00, 0xC5, 0x00, 0x12, 0x34, 0x56, 0x78, 0x02, 0x01, 0x00, 0x20, b'A'];
        parse_vpd(&mut snap, vpd::DEVICE_IDENTIFICATION, &vpd_page(0x83, &body));
        assert_eq!(snap.designators.len(), 1);
        assert_eq!(snap.wwn(), Some(0x5000_C500_1234_5678));
    }

    #[test]
    fn test_inconsistent_page_is_skipped() {
        let mut dev = MockDevice::sat_disk();
        dev.vpd.insert(0x80, vpd_page(0x81, b"WRONG"));
        let mut session = ProbeSession::new(&mut dev, ProbeConfig::default());
        discover_vpd(&mut session).unwrap();
        assert!(session.snapshot.serial.is_none());
        assert!(!session.snapshot.has_vpd(0x80));
        assert!(session.findings().iter().any(|f| f.message.contains("80h ignored")));
    }
}
