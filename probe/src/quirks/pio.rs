//! Multi-sector PIO integrity.
//!
//! Some bridges corrupt PIO transfers longer than one DRQ block unless the
//! drive's multiple mode matches what the bridge expects. The test writes a
//! pseudo-random pattern to an unused host-specific log, reads it back and
//! compares; on a mismatch it raises multiple mode to the drive maximum and
//! tries exactly once more.

use alloc::format;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use bridgeprobe_hal::ata::{log_address, ATA_SECTOR_SIZE};
use bridgeprobe_hal::{AtaEncoding, AtaRequest, Transport};

use crate::config::ProbeOptions;
use crate::error::ProbeResult;
use crate::profile::PioMode;
use crate::session::ProbeSession;

const DETECTOR: &str = "pio";

/// Fill `sectors` sectors from a xorshift64 stream.
pub fn test_pattern(seed: u64, sectors: u16) -> Vec<u8> {
    let mut state = seed.max(1);
    let len = sectors as usize * ATA_SECTOR_SIZE;
    let mut out = Vec::with_capacity(len);
    while out.len() < len {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        out.extend_from_slice(&state.to_le_bytes());
    }
    out.truncate(len);
    out
}

/// First host-specific log whose directory entry reports zero pages
pub fn find_unused_log(directory: &[u8]) -> Option<u8> {
    (log_address::HOST_SPECIFIC_FIRST..=log_address::HOST_SPECIFIC_LAST).find(|&address| {
        let at = address as usize * 2;
        directory
            .get(at..at + 2)
            .is_some_and(|count| count == [0, 0])
    })
}

fn round_trip<T: Transport + ?Sized>(
    session: &mut ProbeSession<'_, T>,
    encoding: AtaEncoding,
    address: u8,
    pattern: &[u8],
) -> ProbeResult<bool> {
    let write = AtaRequest::write_log_ext(encoding, address, 0, pattern.to_vec());
    session.issue_ata(write)?.outcome.into_result()?;
    let sectors = (pattern.len() / ATA_SECTOR_SIZE) as u16;
    let read = session.issue_ata(AtaRequest::read_log_ext(encoding, address, 0, sectors))?;
    read.outcome.into_result()?;
    Ok(read.data == pattern)
}

/// Settle the PIO granularity.
pub fn detect_pio<T: Transport + ?Sized>(session: &mut ProbeSession<'_, T>) -> ProbeResult<()> {
    if !session.config.has(ProbeOptions::PIO_WRITE) {
        session.skip(DETECTOR, "log writes not permitted");
        return Ok(());
    }
    let Some(identity) = session.ata_identity.clone() else {
        session.skip(DETECTOR, "no IDENTIFY data");
        return Ok(());
    };
    if !identity.supports_gpl() {
        session.skip(DETECTOR, "drive has no general purpose logging");
        return Ok(());
    }
    let Some(encoding) = session.require_ata(DETECTOR, true) else {
        return Ok(());
    };
    if !session.can_carry_48bit() {
        session.skip(DETECTOR, "no 48-bit passthrough for the log commands");
        return Ok(());
    }

    let directory = session.issue_ata(AtaRequest::read_log_ext(
        encoding,
        log_address::DIRECTORY,
        0,
        1,
    ))?;
    directory.outcome.into_result()?;
    let Some(address) = find_unused_log(&directory.data) else {
        session.skip(DETECTOR, "no unused host-specific log");
        return Ok(());
    };

    let pattern = test_pattern(session.config.seed, session.config.pio_test_sectors.max(2));
    let verdict = run_test(
        session,
        encoding,
        address,
        &pattern,
        identity.max_multiple(),
        identity.current_multiple(),
    );

    // The log is zeroed on every path, failures included.
    let zero = AtaRequest::write_log_ext(encoding, address, 0, vec![0u8; pattern.len()]);
    if let Err(err) = session.issue_ata(zero).and_then(|o| o.outcome.into_result()) {
        log::warn!("host log {:02X}h not cleared: {}", address, err);
    }
    verdict
}

fn run_test<T: Transport + ?Sized>(
    session: &mut ProbeSession<'_, T>,
    encoding: AtaEncoding,
    address: u8,
    pattern: &[u8],
    max_multiple: u8,
    current_multiple: Option<u8>,
) -> ProbeResult<()> {
    session.retests.pio.advance();
    let mut mode = if round_trip(session, encoding, address, pattern)? {
        PioMode::Multiple
    } else {
        PioMode::Single
    };

    let maximized = current_multiple.is_some_and(|m| m >= max_multiple);
    if mode == PioMode::Single && max_multiple > 1 && !maximized && session.retests.pio.may_retest()
    {
        session.retests.pio.advance();
        log::info!(
            "PIO mismatch at multiple mode {:?}, retrying at {}",
            current_multiple,
            max_multiple
        );
        session
            .issue_ata(AtaRequest::set_multiple_mode(encoding, max_multiple))?
            .outcome
            .into_result()?;
        if round_trip(session, encoding, address, pattern)? {
            mode = PioMode::MultipleWithMode;
            session.profile.ata_mut()?.multiple_count = Some(max_multiple);
        }
    }
    session.retests.pio.settle();

    session.profile.ata_mut()?.pio = mode;
    let message = match mode {
        PioMode::MultipleWithMode => format!("multi-sector PIO needs multiple mode {}", max_multiple),
        PioMode::Single => String::from("multi-sector PIO corrupts data, single sector only"),
        _ => String::from("multi-sector PIO intact"),
    };
    session.finding(DETECTOR, message);
    Ok(())
}
