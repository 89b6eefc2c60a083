//! Transfer length encoding (TPSIU).

use bridgeprobe_hal::{AtaRequest, PassthroughFlags, Transport};

use crate::error::ProbeResult;
use crate::profile::TransportClass;
use crate::session::ProbeSession;

const DETECTOR: &str = "tpsiu";

/// Identify once with a byte-count transfer length and once with TPSIU.
pub fn detect_tpsiu<T: Transport + ?Sized>(session: &mut ProbeSession<'_, T>) -> ProbeResult<()> {
    if session.profile.transport_class() != TransportClass::Sat {
        session.skip(DETECTOR, "only SAT passthrough carries a TPSIU bit");
        return Ok(());
    }
    let Some(encoding) = session.ata_encoding(false) else {
        return Ok(());
    };

    let bytes = session
        .issue_checked(AtaRequest::identify(encoding).with_flags(PassthroughFlags::BYTES))?
        .is_ok();
    let tpsiu = session
        .issue_checked(AtaRequest::identify(encoding).with_flags(PassthroughFlags::TPSIU))?
        .is_ok();
    if !bytes || !tpsiu {
        session.recover();
    }

    let required = tpsiu && !bytes;
    session.profile.ata_mut()?.tpsiu_required = required;
    let message = match (bytes, tpsiu) {
        (true, true) => "either transfer length form works",
        (true, false) => "TPSIU rejected, byte counts work",
        (false, true) => "TPSIU required",
        (false, false) => "neither transfer length form works",
    };
    session.finding(DETECTOR, message);
    Ok(())
}
