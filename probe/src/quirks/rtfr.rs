//! Return-response-info and the 48-bit extend bit.
//!
//! A translator may support return-response-info only with T_DIR set, only
//! with it clear, or not at all. Clearing T_DIR hangs some bridges, so that
//! variant needs [`ProbeOptions::HANG_RISK_RTFR`].
//!
//! When registers can be fetched, a second test checks that the upper bytes
//! of a 48-bit result survive. The native max address is the reference: its
//! expected value is known from IDENTIFY. A short result earns one retry
//! with [`AtaQuirks::ignore_extend_bit`](crate::profile::AtaQuirks) flipped.

use alloc::format;

use bridgeprobe_hal::{AtaEncoding, AtaRegisters, AtaRequest, PassthroughFlags, Transport};

use crate::config::ProbeOptions;
use crate::error::ProbeResult;
use crate::profile::RtfrSupport;
use crate::session::ProbeSession;

const DETECTOR: &str = "rtfr";
const EXTEND_DETECTOR: &str = "extend-bit";

/// Smallest LBA that needs the upper register bytes
const LBA28_LIMIT: u64 = 1 << 24;

fn rri_flags(tdir: bool) -> PassthroughFlags {
    if tdir {
        PassthroughFlags::TDIR_COMPAT
    } else {
        PassthroughFlags::empty()
    }
}

fn try_rri<T: Transport + ?Sized>(
    session: &mut ProbeSession<'_, T>,
    encoding: AtaEncoding,
    tdir: bool,
) -> Option<AtaRegisters> {
    let flags = session.ata_flags() | rri_flags(tdir);
    let outcome = session.issue(AtaRequest::return_response_info(encoding).with_flags(flags));
    if outcome.is_ok() {
        outcome.registers
    } else {
        None
    }
}

/// Settle return-response-info support, then run the extend-bit test.
pub fn detect_rtfr<T: Transport + ?Sized>(session: &mut ProbeSession<'_, T>) -> ProbeResult<()> {
    let Some(encoding) = session.require_ata(DETECTOR, false) else {
        return Ok(());
    };

    // Give return-response-info a clean previous command to report on.
    session.issue_ata(AtaRequest::check_power_mode(encoding))?;

    let tdir = if try_rri(session, encoding, true).is_some() {
        true
    } else if session.config.has(ProbeOptions::HANG_RISK_RTFR) {
        log::warn!("Retrying return-response-info with T_DIR clear; some bridges hang");
        session.issue_ata(AtaRequest::check_power_mode(encoding))?;
        let plain = try_rri(session, encoding, false);
        session.recover();
        if plain.is_none() {
            return unavailable(session, "return-response-info unsupported");
        }
        false
    } else {
        session.recover();
        session.skip(DETECTOR, "T_DIR-clear retry needs the hang-risk option");
        return unavailable(session, "return-response-info with T_DIR unsupported");
    };

    let ata = session.profile.ata_mut()?;
    ata.rri_tdir = Some(tdir);
    ata.rtfr = RtfrSupport::Full;
    session.finding(
        DETECTOR,
        format!(
            "return-response-info works with T_DIR {}",
            if tdir { "set" } else { "clear" }
        ),
    );

    detect_extend_bit(session)
}

fn unavailable<T: Transport + ?Sized>(
    session: &mut ProbeSession<'_, T>,
    message: &'static str,
) -> ProbeResult<()> {
    session.profile.ata_mut()?.rtfr = RtfrSupport::Unavailable;
    session.finding(DETECTOR, message);
    Ok(())
}

/// Registers of the native-max reference command, by CK_COND or, failing
/// that, by return-response-info.
fn reference_registers<T: Transport + ?Sized>(
    session: &mut ProbeSession<'_, T>,
    encoding: AtaEncoding,
    amac: bool,
) -> ProbeResult<Option<AtaRegisters>> {
    let request = || {
        if amac {
            AtaRequest::get_native_max_ext(encoding)
        } else {
            AtaRequest::read_native_max(encoding, true)
        }
    };

    let checked = session.issue_ata(request().with_flags(PassthroughFlags::CHECK_CONDITION))?;
    if let Some(registers) = checked.registers.filter(|r| checked.is_ok() && !r.is_empty()) {
        return Ok(Some(registers));
    }

    let plain = session.issue_ata(request())?;
    if !plain.is_ok() {
        session.recover();
        return Ok(None);
    }
    let tdir = session.profile.ata().rri_tdir.unwrap_or(true);
    Ok(try_rri(session, encoding, tdir))
}

/// Check the upper LBA register bytes of a 48-bit result.
pub fn detect_extend_bit<T: Transport + ?Sized>(
    session: &mut ProbeSession<'_, T>,
) -> ProbeResult<()> {
    let Some(identity) = session.ata_identity.clone() else {
        session.skip(EXTEND_DETECTOR, "no IDENTIFY data");
        return Ok(());
    };
    let expected = identity.max_lba();
    if !identity.supports_lba48() || expected < LBA28_LIMIT {
        session.skip(EXTEND_DETECTOR, "no 48-bit results to check");
        return Ok(());
    }
    if !identity.supports_amac() && !identity.supports_hpa() {
        session.skip(EXTEND_DETECTOR, "no native max address command");
        return Ok(());
    }
    let Some(encoding) = session.ata_encoding(true) else {
        return Ok(());
    };
    if !session.can_carry_48bit() {
        session.skip(EXTEND_DETECTOR, "no 48-bit passthrough");
        return Ok(());
    }

    let original = session.profile.ata().ignore_extend_bit;
    loop {
        session.retests.extend.advance();
        let Some(registers) = reference_registers(session, encoding, identity.supports_amac())?
        else {
            session.retests.extend.settle();
            session.skip(EXTEND_DETECTOR, "native max address returned no registers");
            return Ok(());
        };

        if registers.lba >= expected {
            session.retests.extend.settle();
            let ata = session.profile.ata_mut()?;
            ata.rtfr = RtfrSupport::Full;
            ata.extend_bit_trusted = registers.extend;
            let message = if registers.extend {
                "48-bit registers complete"
            } else {
                "48-bit registers complete, extend bit not reported"
            };
            session.finding(EXTEND_DETECTOR, message);
            return Ok(());
        }

        if session.retests.extend.may_retest() {
            let ata = session.profile.ata_mut()?;
            ata.ignore_extend_bit = !ata.ignore_extend_bit;
            log::info!(
                "Native max {:#x} short of {:#x}, retrying with ignore-extend {}",
                registers.lba,
                expected,
                ata.ignore_extend_bit
            );
            continue;
        }

        session.retests.extend.settle();
        let ata = session.profile.ata_mut()?;
        ata.ignore_extend_bit = original;
        ata.extend_bit_trusted = false;
        ata.rtfr = RtfrSupport::PartialOn48bit;
        session.finding(EXTEND_DETECTOR, "upper bytes of 48-bit registers are lost");
        return Ok(());
    }
}
