//! Error-handling latency.
//!
//! Some translators take far longer to fail a command than to complete
//! one, or wedge after a failure until they see TEST UNIT READY. A short
//! baseline of good commands is compared against a burst of commands every
//! device aborts.

use alloc::format;
use core::time::Duration;

use bridgeprobe_hal::{AtaEncoding, AtaRequest, ScsiRequest, Transport};

use crate::classify::Outcome;
use crate::config::{
    ProbeOptions, SEVERITY_RATIO_CAP, SEVERITY_TIMEOUT, SEVERITY_ZERO_RESULT,
};
use crate::error::ProbeResult;
use crate::session::ProbeSession;

const DETECTOR: &str = "latency";

/// What the unsupported-command burst showed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LatencySample {
    /// Mean latency of the known-good commands
    pub baseline: Duration,
    /// Slowest unsupported command
    pub worst: Duration,
    /// An unsupported command timed out
    pub timed_out: bool,
    /// An unsupported command claimed success with nothing to show for it
    pub zero_result: bool,
}

impl LatencySample {
    /// Worst failure latency as a multiple of the baseline
    pub fn ratio(&self) -> u32 {
        let base = self.baseline.as_micros().max(1);
        u32::try_from(self.worst.as_micros() / base).unwrap_or(u32::MAX)
    }

    /// Severity for [`RecoveryQuirk`](crate::profile::RecoveryQuirk); zero
    /// means failures are handled promptly.
    pub fn severity(&self, threshold: u32) -> u8 {
        let ratio = self.ratio();
        if self.timed_out {
            SEVERITY_TIMEOUT
        } else if ratio > threshold {
            ratio.min(SEVERITY_RATIO_CAP as u32) as u8
        } else if self.zero_result {
            SEVERITY_ZERO_RESULT
        } else {
            0
        }
    }
}

/// Measure how the translator copes with failing commands.
pub fn detect_latency<T: Transport + ?Sized>(
    session: &mut ProbeSession<'_, T>,
) -> ProbeResult<()> {
    if !session.config.has(ProbeOptions::ERROR_LATENCY) {
        session.skip(DETECTOR, "latency test disabled");
        return Ok(());
    }

    let mut sample = LatencySample::default();
    let baseline_commands = session.config.baseline_commands.max(1);
    let mut total = Duration::ZERO;
    for _ in 0..baseline_commands {
        total += session.issue_checked(ScsiRequest::TestUnitReady)?.elapsed;
    }
    sample.baseline = total / baseline_commands;

    // Without a negotiated passthrough a bare ATA PASS-THROUGH (12) is the
    // unsupported command.
    let encoding = session.ata_encoding(false).unwrap_or(AtaEncoding::Sat12);
    let flags = session.ata_flags();
    let budget = session.config.unsupported_time_budget;
    let mut spent = Duration::ZERO;
    for _ in 0..session.config.unsupported_repetitions {
        if spent >= budget {
            log::warn!("Latency test stopped at its {:?} budget", budget);
            break;
        }
        let outcome = session.issue(AtaRequest::nop(encoding).with_flags(flags));
        spent += outcome.elapsed;
        sample.worst = sample.worst.max(outcome.elapsed);
        match outcome.outcome {
            Outcome::BusyOrTimeout => {
                sample.timed_out = true;
                break;
            }
            Outcome::Ok if outcome.registers.map_or(true, |r| r.is_empty()) => {
                sample.zero_result = true;
            }
            _ => {}
        }
    }
    session.recover();

    let severity = sample.severity(session.config.latency_ratio_threshold);
    log::debug!(
        "Latency baseline {:?}, worst failure {:?}, severity {}",
        sample.baseline,
        sample.worst,
        severity
    );
    if severity == 0 {
        session.finding(DETECTOR, "failures are handled promptly");
        return Ok(());
    }

    let recovery = session.profile.recovery_mut()?;
    recovery.requires_unit_ready_after_failure = true;
    recovery.severity = severity;
    let message = if sample.timed_out {
        format!("unsupported command timed out, severity {}", severity)
    } else if sample.zero_result && sample.ratio() <= session.config.latency_ratio_threshold {
        format!("unsupported command reported success, severity {}", severity)
    } else {
        format!(
            "failures take {}x the baseline, severity {}",
            sample.ratio(),
            severity
        )
    };
    session.finding(DETECTOR, message);
    Ok(())
}
