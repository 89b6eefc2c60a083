//! SECURITY PROTOCOL IN support.

use alloc::format;
use alloc::vec::Vec;

use bridgeprobe_hal::scsi::security_protocol;
use bridgeprobe_hal::{ScsiRequest, Transport};

use crate::classify::Outcome;
use crate::error::ProbeResult;
use crate::profile::SecuritySupport;
use crate::session::ProbeSession;

const DETECTOR: &str = "security";

fn request(inc512: bool) -> ScsiRequest {
    ScsiRequest::SecurityProtocolIn {
        protocol: security_protocol::INFORMATION,
        specific: 0,
        inc512,
        allocation: if inc512 { 1 } else { 512 },
    }
}

/// Protocol identifiers from a supported security protocol list
pub fn parse_protocol_list(data: &[u8]) -> Vec<u8> {
    let Some(len) = data.get(6..8) else {
        return Vec::new();
    };
    let len = u16::from_be_bytes([len[0], len[1]]) as usize;
    data.get(8..)
        .map(|list| list[..len.min(list.len())].to_vec())
        .unwrap_or_default()
}

/// Ask for protocol 00h, retrying once with INC_512 on an invalid field.
pub fn detect_security<T: Transport + ?Sized>(
    session: &mut ProbeSession<'_, T>,
) -> ProbeResult<()> {
    let mut outcome = session.issue_checked(request(false))?;
    let mut support = SecuritySupport::Supported;
    if outcome.outcome == Outcome::InvalidFieldInRequest {
        outcome = session.issue_checked(request(true))?;
        support = SecuritySupport::Inc512Only;
    }
    if !outcome.is_ok() {
        support = SecuritySupport::Unsupported;
    }

    session.profile.scsi_mut()?.security = support;
    if support != SecuritySupport::Unsupported {
        session.snapshot.security_protocols = parse_protocol_list(&outcome.data);
    }
    session.finding(
        DETECTOR,
        format!(
            "{:?}, protocols {:02X?}",
            support, session.snapshot.security_protocols
        ),
    );
    Ok(())
}
