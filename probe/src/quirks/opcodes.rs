//! REPORT SUPPORTED OPERATION CODES granularity.

use bridgeprobe_hal::scsi::opcode;
use bridgeprobe_hal::{ReportOptions, ScsiRequest, Transport};

use crate::error::ProbeResult;
use crate::profile::OpCodeReporting;
use crate::session::ProbeSession;

const DETECTOR: &str = "opcodes";

/// Room for a few hundred command descriptors
const ALL_ALLOCATION: u32 = 4096;
/// One-command form: header plus a 16-byte usage map
const ONE_ALLOCATION: u32 = 20;

/// Ask for the full list, then for READ (10) alone.
pub fn detect_opcodes<T: Transport + ?Sized>(session: &mut ProbeSession<'_, T>) -> ProbeResult<()> {
    let all = ScsiRequest::ReportSupportedOperationCodes {
        options: ReportOptions::All,
        opcode: 0,
        allocation: ALL_ALLOCATION,
    };
    let reporting = if session.issue_checked(all)?.is_ok() {
        OpCodeReporting::All
    } else {
        let one = ScsiRequest::ReportSupportedOperationCodes {
            options: ReportOptions::OneCommand,
            opcode: opcode::READ_10,
            allocation: ONE_ALLOCATION,
        };
        if session.issue_checked(one)?.is_ok() {
            OpCodeReporting::SingleOnly
        } else {
            OpCodeReporting::None
        }
    };

    session.profile.scsi_mut()?.opcodes = reporting;
    let message = match reporting {
        OpCodeReporting::All => "full command list",
        OpCodeReporting::SingleOnly => "one command per request",
        _ => "not supported",
    };
    session.finding(DETECTOR, message);
    Ok(())
}
