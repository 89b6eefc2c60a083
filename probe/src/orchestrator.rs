//! Probe run orchestration.
//!
//! Groups run in dependency order against one [`ProbeSession`]. A group
//! that fails is noted in the ledger and the run moves on; only fatal
//! errors end it.

use alloc::format;
use core::fmt;

use bridgeprobe_hal::Transport;

use crate::config::ProbeConfig;
use crate::cross_validate::cross_validate;
use crate::discovery::{discover_logs, discover_mode, discover_vpd};
use crate::error::{ProbeError, ProbeResult};
use crate::identity::probe_identity;
use crate::negotiate::negotiate;
use crate::quirks::check_condition::detect_check_condition;
use crate::quirks::dma::detect_dma;
use crate::quirks::latency::detect_latency;
use crate::quirks::opcodes::detect_opcodes;
use crate::quirks::pio::detect_pio;
use crate::quirks::rtfr::detect_rtfr;
use crate::quirks::security::detect_security;
use crate::quirks::tpsiu::detect_tpsiu;
use crate::quirks::transfer::detect_max_transfer;
use crate::report::ProbeReport;
use crate::rw_format::probe_rw_format;
use crate::session::ProbeSession;
use crate::store::{DeviceKey, ProfileStore};

const STORE: &str = "store";

/// Runs every probe group against one device and emits the report.
pub struct Orchestrator<'s> {
    config: ProbeConfig,
    store: Option<&'s dyn ProfileStore>,
}

impl<'s> Orchestrator<'s> {
    /// Create an orchestrator with no profile store
    pub fn new(config: ProbeConfig) -> Self {
        Self {
            config,
            store: None,
        }
    }

    /// Consult a profile store after the identity probe
    pub fn with_store(mut self, store: &'s dyn ProfileStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Probe one device.
    ///
    /// Returns `Err` only for fatal errors: a response buffer that could
    /// not be reserved, or no READ command working at all.
    pub fn run<T: Transport + ?Sized>(&self, transport: &mut T) -> ProbeResult<ProbeReport> {
        let mut session = ProbeSession::new(transport, self.config.clone());
        log::info!("Probe run starting");

        run_group(&mut session, "identity", probe_identity)?;

        if let Some(store) = self.store {
            let key = DeviceKey::from_snapshot(&session.snapshot);
            if let Some(mut stored) = store.lookup(&key) {
                if self.config.trust_stored_profile {
                    session.finding(STORE, "stored profile trusted, probing skipped");
                    stored.freeze();
                    let (_, snapshot, findings) = session.into_parts();
                    return Ok(ProbeReport {
                        profile: stored,
                        snapshot,
                        findings,
                        from_store: true,
                    });
                }
                session.finding(STORE, "stored profile found but not trusted, probing");
            }
        }

        run_group(&mut session, "vpd", discover_vpd)?;
        run_group(&mut session, "mode", discover_mode)?;
        run_group(&mut session, "log", discover_logs)?;
        run_group(&mut session, "rw-format", probe_rw_format)?;
        run_group(&mut session, "negotiate", negotiate)?;

        // TPSIU first: every later data-carrying passthrough depends on it.
        run_group(&mut session, "tpsiu", detect_tpsiu)?;
        run_group(&mut session, "dma", detect_dma)?;
        run_group(&mut session, "pio", detect_pio)?;
        run_group(&mut session, "check-condition", detect_check_condition)?;
        run_group(&mut session, "rtfr", detect_rtfr)?;
        run_group(&mut session, "latency", detect_latency)?;
        run_group(&mut session, "max-transfer", detect_max_transfer)?;
        run_group(&mut session, "security", detect_security)?;
        run_group(&mut session, "opcodes", detect_opcodes)?;

        let identity = session
            .ata_identity
            .as_ref()
            .or(session.snapshot.embedded_identify.as_ref());
        let advisories = cross_validate(&session.snapshot, identity);
        for advisory in advisories {
            session.advisory(advisory);
        }

        session.profile.freeze();
        log::info!(
            "Probe run finished: {} after {} commands",
            session.profile.transport_class(),
            session.commands_issued()
        );
        let (profile, snapshot, findings) = session.into_parts();
        Ok(ProbeReport {
            profile,
            snapshot,
            findings,
            from_store: false,
        })
    }
}

impl fmt::Debug for Orchestrator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("store", &self.store.is_some())
            .finish()
    }
}

/// Run one group; fatal errors end the run, anything else only the group.
fn run_group<'t, T: Transport + ?Sized>(
    session: &mut ProbeSession<'t, T>,
    group: &'static str,
    step: impl FnOnce(&mut ProbeSession<'t, T>) -> ProbeResult<()>,
) -> ProbeResult<()> {
    log::debug!("Group {} starting", group);
    match step(session) {
        Ok(()) => Ok(()),
        Err(err) if err.is_fatal() => {
            log::error!("{} aborted the run: {}", group, err);
            Err(err)
        }
        Err(ProbeError::DeviceUnresponsive) => {
            log::warn!("{}: device unresponsive, group abandoned", group);
            session.recover();
            session.finding(group, "device unresponsive, group abandoned");
            Ok(())
        }
        Err(err) => {
            log::warn!("{} failed: {}", group, err);
            session.finding(group, format!("group failed: {}", err));
            Ok(())
        }
    }
}
