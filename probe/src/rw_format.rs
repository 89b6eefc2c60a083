//! Which READ CDB sizes the translator accepts.

use alloc::format;
use alloc::vec::Vec;

use bridgeprobe_hal::{CdbSize, ScsiRequest, Transport};

use crate::config::ProbeOptions;
use crate::error::{ProbeError, ProbeResult};
use crate::profile::RwSizes;
use crate::session::ProbeSession;

const DETECTOR: &str = "rw-format";

fn read(size: CdbSize, blocks: u32, block_size: u32) -> ScsiRequest {
    ScsiRequest::Read {
        size,
        lba: 0,
        blocks,
        block_size,
    }
}

/// Probe the four READ sizes with a one-block read of LBA 0.
///
/// Zero-length reads are tried with the 10/12/16-byte forms only, since a
/// zero length in READ (6) means 256 blocks. Running twice against the same
/// device gives the same profile.
pub fn probe_rw_format<T: Transport + ?Sized>(
    session: &mut ProbeSession<'_, T>,
) -> ProbeResult<()> {
    let block_size = session.snapshot.block_size();
    let mut sizes = RwSizes::empty();
    for size in CdbSize::ALL {
        if session.issue_checked(read(size, 1, block_size))?.is_ok() {
            sizes |= RwSizes::from_size(size);
        }
    }

    if sizes.is_empty() {
        session.recover();
        log::error!("no READ command size works");
        session.profile.scsi_mut()?.rw_sizes = sizes;
        return Err(ProbeError::NoReadWriteCommand);
    }

    let mut requires_nonzero = false;
    if session.config.has(ProbeOptions::ZERO_LENGTH_RW) {
        let mut zero_ok = Vec::new();
        for size in [CdbSize::Ten, CdbSize::Twelve, CdbSize::Sixteen] {
            if !sizes.contains(RwSizes::from_size(size)) {
                continue;
            }
            if session.issue_checked(read(size, 0, block_size))?.is_ok() {
                zero_ok.push(size);
            }
        }
        let tried = sizes.intersects(RwSizes::TEN | RwSizes::TWELVE | RwSizes::SIXTEEN);
        requires_nonzero = tried && zero_ok.is_empty();
    }

    let scsi = session.profile.scsi_mut()?;
    scsi.rw_sizes = sizes;
    scsi.requires_nonzero_length = requires_nonzero;

    let sizes_list: Vec<usize> = CdbSize::ALL
        .iter()
        .filter(|&&s| sizes.contains(RwSizes::from_size(s)))
        .map(CdbSize::bytes)
        .collect();
    session.finding(
        DETECTOR,
        format!(
            "READ sizes {:?}{}",
            sizes_list,
            if requires_nonzero {
                ", zero-length transfers rejected"
            } else {
                ""
            }
        ),
    );
    Ok(())
}
