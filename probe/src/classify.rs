//! Command outcome classification.
//!
//! Every fallback decision in the probe engine hangs off the five-way
//! [`Outcome`] computed here from a raw [`CommandResult`].

use alloc::vec::Vec;
use core::fmt;
use core::time::Duration;

use bridgeprobe_hal::scsi::asc;
use bridgeprobe_hal::{AtaRegisters, CommandResult, ReturnStatus, SenseData, SenseKey};

use crate::error::{ProbeError, ProbeResult};

/// What one command told us
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The command worked
    Ok,
    /// The command family is not supported; never retry it
    NotSupportedOperation,
    /// A field was rejected; one adjusted retry is allowed
    InvalidFieldInRequest,
    /// Busy or timed out; abort the current group
    BusyOrTimeout,
    /// Anything else
    OtherFailure,
}

impl Outcome {
    /// Check for success
    pub const fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok)
    }

    /// Map a failed classification onto the error taxonomy
    pub const fn into_error(self) -> Option<ProbeError> {
        match self {
            Outcome::Ok => None,
            Outcome::NotSupportedOperation => Some(ProbeError::CommandNotSupported),
            Outcome::InvalidFieldInRequest => Some(ProbeError::InvalidParameter),
            Outcome::BusyOrTimeout => Some(ProbeError::DeviceUnresponsive),
            Outcome::OtherFailure => Some(ProbeError::OtherFailure),
        }
    }

    /// `Ok(())` on success, the mapped error otherwise
    pub fn into_result(self) -> ProbeResult<()> {
        match self.into_error() {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::NotSupportedOperation => write!(f, "not supported"),
            Self::InvalidFieldInRequest => write!(f, "invalid field"),
            Self::BusyOrTimeout => write!(f, "busy/timeout"),
            Self::OtherFailure => write!(f, "failed"),
        }
    }
}

/// Transient, classified result of one command.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    /// Classification
    pub outcome: Outcome,
    /// Raw completion status
    pub status: ReturnStatus,
    /// Decoded sense, if any
    pub sense: Option<SenseData>,
    /// ATA registers, from sense or out of band
    pub registers: Option<AtaRegisters>,
    /// Data-in payload
    pub data: Vec<u8>,
    /// Time the command took
    pub elapsed: Duration,
}

impl ProbeOutcome {
    /// Decode and classify a raw result.
    ///
    /// `ignore_extend` trusts the 48-bit upper register bytes even when the
    /// translator left the extend bit clear.
    pub fn from_result(result: CommandResult, ignore_extend: bool) -> Self {
        let sense = SenseData::parse(&result.sense);
        let registers = result
            .registers
            .or_else(|| sense.as_ref().and_then(|s| s.ata_registers(ignore_extend)));
        let outcome = classify(result.status, sense.as_ref(), registers.as_ref());
        Self {
            outcome,
            status: result.status,
            sense,
            registers,
            data: result.data,
            elapsed: result.elapsed,
        }
    }

    /// Check for success
    pub const fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Classify a completion.
pub fn classify(
    status: ReturnStatus,
    sense: Option<&SenseData>,
    registers: Option<&AtaRegisters>,
) -> Outcome {
    let aborted = registers.is_some_and(|r| r.is_aborted());
    match status {
        ReturnStatus::Success if aborted => Outcome::NotSupportedOperation,
        ReturnStatus::Success => Outcome::Ok,
        ReturnStatus::Busy | ReturnStatus::Timeout => Outcome::BusyOrTimeout,
        ReturnStatus::OsNotSupported => Outcome::NotSupportedOperation,
        ReturnStatus::TransportFailure => Outcome::OtherFailure,
        ReturnStatus::CheckCondition => {
            let Some(sense) = sense else {
                return Outcome::OtherFailure;
            };
            if aborted {
                return Outcome::NotSupportedOperation;
            }
            if sense.has_ata_information() {
                // CK_COND style completion: the registers carry the verdict.
                return match registers {
                    Some(r) if r.has_error() => Outcome::OtherFailure,
                    _ => Outcome::Ok,
                };
            }
            match sense.key {
                SenseKey::NoSense | SenseKey::RecoveredError => Outcome::Ok,
                SenseKey::NotReady => Outcome::BusyOrTimeout,
                SenseKey::IllegalRequest => match sense.asc {
                    asc::INVALID_OPCODE | asc::LU_NOT_SUPPORTED => Outcome::NotSupportedOperation,
                    asc::INVALID_FIELD_IN_CDB | asc::INVALID_FIELD_IN_PARAM_LIST => {
                        Outcome::InvalidFieldInRequest
                    }
                    _ => Outcome::OtherFailure,
                },
                _ => Outcome::OtherFailure,
            }
        }
    }
}
