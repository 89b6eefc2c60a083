//! DMA versus UDMA protocol support.

use bridgeprobe_hal::{AtaRequest, Transport};

use crate::error::ProbeResult;
use crate::profile::DmaMode;
use crate::session::ProbeSession;

const DETECTOR: &str = "dma";

/// One forced-DMA and one forced-UDMA read of LBA 0.
///
/// The 28-bit READ DMA is used whenever the wrapper cannot carry 48-bit
/// commands, whatever the drive supports.
pub fn detect_dma<T: Transport + ?Sized>(session: &mut ProbeSession<'_, T>) -> ProbeResult<()> {
    let ext = session.ext_commands();
    let Some(encoding) = session.require_ata(DETECTOR, ext) else {
        return Ok(());
    };

    let dma = session
        .issue_ata(AtaRequest::read_dma(encoding, 0, 1, false, ext))?
        .is_ok();
    let udma = session
        .issue_ata(AtaRequest::read_dma(encoding, 0, 1, true, ext))?
        .is_ok();
    if !dma || !udma {
        session.recover();
    }

    let mode = match (dma, udma) {
        (true, true) => DmaMode::Either,
        (true, false) => DmaMode::ForceDma,
        (false, true) => DmaMode::ForceUdma,
        (false, false) => DmaMode::None,
    };
    session.profile.ata_mut()?.dma = mode;
    session.finding(DETECTOR, alloc::format!("{:?}", mode));
    Ok(())
}
