//! CK_COND handling.

use bridgeprobe_hal::{AtaRegisters, AtaRequest, PassthroughFlags, Transport};

use crate::classify::ProbeOutcome;
use crate::error::ProbeResult;
use crate::profile::CheckCondition;
use crate::session::ProbeSession;

const DETECTOR: &str = "check-condition";

fn clean(registers: Option<&AtaRegisters>) -> bool {
    registers.is_some_and(|r| !r.is_empty() && r.is_clean())
}

fn with_ck<T: Transport + ?Sized>(
    session: &mut ProbeSession<'_, T>,
    request: AtaRequest,
) -> ProbeResult<ProbeOutcome> {
    session.issue_ata(request.with_flags(PassthroughFlags::CHECK_CONDITION))
}

/// Find out which protocols return registers when CK_COND is set.
///
/// IDENTIFY DEVICE is the data-in probe. When it returns data, the SMART
/// reads confirm the registers look sane on a second data-in command.
/// A non-data CHECK POWER MODE then separates translators that only
/// return registers for non-data commands from those returning nothing.
pub fn detect_check_condition<T: Transport + ?Sized>(
    session: &mut ProbeSession<'_, T>,
) -> ProbeResult<()> {
    let Some(encoding) = session.require_ata(DETECTOR, false) else {
        return Ok(());
    };

    let identify = with_ck(session, AtaRequest::identify(encoding))?;
    if identify.is_ok() && !identify.data.is_empty() {
        let mut data_in_clean = clean(identify.registers.as_ref());
        let smart = session
            .ata_identity
            .as_ref()
            .is_some_and(|id| id.supports_smart());
        if data_in_clean && smart {
            let data = with_ck(session, AtaRequest::smart_read_data(encoding))?;
            let log = with_ck(session, AtaRequest::smart_read_log(encoding, 0, 1))?;
            data_in_clean = data.is_ok()
                && clean(data.registers.as_ref())
                && (!log.is_ok() || clean(log.registers.as_ref()));
        }
        if data_in_clean {
            return settle(session, CheckCondition::Always);
        }
    } else {
        session.recover();
    }

    let power = with_ck(session, AtaRequest::check_power_mode(encoding))?;
    let verdict = if !power.is_ok() {
        session.recover();
        CheckCondition::Disabled
    } else if power.registers.is_some_and(|r| !r.is_empty()) {
        CheckCondition::NonDataOnly
    } else {
        CheckCondition::Empty
    };
    settle(session, verdict)
}

fn settle<T: Transport + ?Sized>(
    session: &mut ProbeSession<'_, T>,
    verdict: CheckCondition,
) -> ProbeResult<()> {
    session.profile.ata_mut()?.check_condition = verdict;
    let message = match verdict {
        CheckCondition::Always => "registers returned for every protocol",
        CheckCondition::NonDataOnly => "registers returned for non-data commands only",
        CheckCondition::Empty => "check condition carries empty registers",
        CheckCondition::Disabled => "CK_COND makes commands fail",
        CheckCondition::Unknown => "undetermined",
    };
    session.finding(DETECTOR, message);
    Ok(())
}
