//! The transport seam.
//!
//! A transport owns an open device handle and runs one command at a time,
//! blocking until the device answers or the per-command timeout fires.
//! Retries and backoff are not its business; the probe engine decides what
//! a failure means.

use alloc::vec::Vec;
use core::time::Duration;

use crate::ata::AtaRegisters;
use crate::command::Command;

/// Generic completion status of one command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnStatus {
    /// Completed with GOOD status
    Success,
    /// CHECK CONDITION; sense data describes why
    CheckCondition,
    /// BUSY or reservation conflict
    Busy,
    /// The per-command timeout fired
    Timeout,
    /// The host OS refused to pass the command
    OsNotSupported,
    /// Any other transport level failure
    TransportFailure,
}

/// Everything a transport knows about a completed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// Completion status
    pub status: ReturnStatus,
    /// Raw sense bytes, empty if none were returned
    pub sense: Vec<u8>,
    /// Registers some transports return out of band instead of in sense
    pub registers: Option<AtaRegisters>,
    /// Data-in payload, possibly shorter than requested
    pub data: Vec<u8>,
    /// Wall-clock time the command took
    pub elapsed: Duration,
}

impl CommandResult {
    /// Successful completion with `data`
    pub fn success(data: Vec<u8>) -> Self {
        Self {
            status: ReturnStatus::Success,
            sense: Vec::new(),
            registers: None,
            data,
            elapsed: Duration::ZERO,
        }
    }

    /// CHECK CONDITION with `sense`
    pub fn check_condition(sense: Vec<u8>) -> Self {
        Self {
            status: ReturnStatus::CheckCondition,
            sense,
            registers: None,
            data: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    /// Completion with no sense and no data
    pub fn status(status: ReturnStatus) -> Self {
        Self {
            status,
            sense: Vec::new(),
            registers: None,
            data: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    /// Attach out-of-band registers
    pub fn with_registers(mut self, registers: AtaRegisters) -> Self {
        self.registers = Some(registers);
        self
    }

    /// Record how long the command took
    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }
}

/// A blocking, single-command-in-flight device transport
pub trait Transport {
    /// Run `command` to completion.
    ///
    /// Never fails: every outcome, including timeouts, is a `CommandResult`.
    fn issue(&mut self, command: &Command) -> CommandResult;

    /// Bring a device back after a failed or hang-prone command.
    ///
    /// Implementations usually issue TEST UNIT READY.
    fn recover(&mut self);

    /// Wait before a risky command so an operator can abort.
    fn delay(&mut self, _duration: Duration) {}
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn issue(&mut self, command: &Command) -> CommandResult {
        (**self).issue(command)
    }

    fn recover(&mut self) {
        (**self).recover()
    }

    fn delay(&mut self, duration: Duration) {
        (**self).delay(duration)
    }
}
