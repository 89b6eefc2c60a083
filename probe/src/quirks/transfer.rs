//! Maximum transfer length search.

use alloc::format;

use bridgeprobe_hal::ata::ATA_SECTOR_SIZE;
use bridgeprobe_hal::{AtaRequest, CdbSize, ScsiRequest, Transport};

use crate::config::ProbeOptions;
use crate::error::ProbeResult;
use crate::profile::DmaMode;
use crate::session::ProbeSession;

const DETECTOR: &str = "max-transfer";

/// Largest READ (6) transfer
const READ6_MAX_BLOCKS: u32 = 256;
/// Largest 28-bit sector count
const ATA28_MAX_SECTORS: u32 = 256;
/// Largest 48-bit sector count the request type carries
const ATA48_MAX_SECTORS: u32 = u16::MAX as u32;

/// Find the largest block count `attempt` accepts.
///
/// Counts double from one up to `doubling_limit`, then grow by one. The
/// search stops at the first failure or once `cap` has been tried. Every
/// count tried is larger than the last, so the result only grows.
pub fn search_max_blocks(
    cap: u32,
    doubling_limit: u32,
    mut attempt: impl FnMut(u32) -> ProbeResult<bool>,
) -> ProbeResult<u32> {
    let cap = cap.max(1);
    let doubling_limit = doubling_limit.max(1);
    let mut best = 0;
    let mut blocks = 1;
    loop {
        if !attempt(blocks)? {
            break;
        }
        best = blocks;
        if blocks >= cap {
            break;
        }
        let next = if blocks < doubling_limit {
            (blocks * 2).min(doubling_limit)
        } else {
            blocks + 1
        };
        blocks = next.min(cap);
    }
    Ok(best)
}

/// Search the SCSI read path and, when there is one, the ATA passthrough.
pub fn detect_max_transfer<T: Transport + ?Sized>(
    session: &mut ProbeSession<'_, T>,
) -> ProbeResult<()> {
    if !session.config.has(ProbeOptions::MAX_TRANSFER) {
        session.skip(DETECTOR, "max transfer search disabled");
        return Ok(());
    }
    scsi_max_transfer(session)?;
    ata_max_transfer(session)
}

fn scsi_max_transfer<T: Transport + ?Sized>(
    session: &mut ProbeSession<'_, T>,
) -> ProbeResult<()> {
    let Some(size) = session.profile.scsi().rw_sizes.largest() else {
        session.skip(DETECTOR, "no working READ command");
        return Ok(());
    };
    let block_size = session.snapshot.block_size();
    let mut cap = session.config.max_transfer_cap_blocks;
    if size == CdbSize::Six {
        cap = cap.min(READ6_MAX_BLOCKS);
    }
    let limit = session.config.doubling_limit_bytes / block_size.max(1);

    let found = search_max_blocks(cap, limit, |blocks| {
        let read = ScsiRequest::Read {
            size,
            lba: 0,
            blocks,
            block_size,
        };
        Ok(session.issue_checked(read)?.is_ok())
    });
    session.recover();
    let blocks = found?;

    let bytes = (blocks > 0).then(|| blocks.saturating_mul(block_size));
    session.profile.scsi_mut()?.max_transfer_bytes = bytes;
    session.finding(
        DETECTOR,
        format!("SCSI READ({}) moves {} blocks", size.bytes(), blocks),
    );
    Ok(())
}

fn ata_max_transfer<T: Transport + ?Sized>(session: &mut ProbeSession<'_, T>) -> ProbeResult<()> {
    if !session.profile.transport_class().is_ata() {
        return Ok(());
    }
    let ext = session.ext_commands();
    let Some(encoding) = session.ata_encoding(ext) else {
        return Ok(());
    };
    let width_cap = if ext { ATA48_MAX_SECTORS } else { ATA28_MAX_SECTORS };
    let cap = session.config.max_transfer_cap_blocks.min(width_cap);
    let limit = session.config.doubling_limit_bytes / ATA_SECTOR_SIZE as u32;
    let dma = session.profile.ata().dma;
    let flags = session.ata_flags();

    let found = search_max_blocks(cap, limit, |sectors| {
        let sectors = sectors as u16;
        let request = match dma {
            DmaMode::Either | DmaMode::ForceUdma => {
                AtaRequest::read_dma(encoding, 0, sectors, true, ext)
            }
            DmaMode::ForceDma => AtaRequest::read_dma(encoding, 0, sectors, false, ext),
            DmaMode::None | DmaMode::Unknown => AtaRequest::read_sectors(encoding, 0, sectors, ext),
        };
        Ok(session.issue_checked(request.with_flags(flags))?.is_ok())
    });
    session.recover();
    let sectors = found?;

    let bytes = (sectors > 0).then(|| sectors * ATA_SECTOR_SIZE as u32);
    session.profile.ata_mut()?.max_transfer_bytes = bytes;
    session.finding(
        DETECTOR,
        format!("ATA passthrough moves {} sectors", sectors),
    );
    Ok(())
}
