//! # bridgeprobe - Device Quirk Discovery
//!
//! Finds out, by experiment, what a storage device and whatever translator
//! sits in front of it actually support, and records the result in a
//! [`HackProfile`] that higher-level drive code consults before issuing
//! commands.
//!
//! ## Architecture
//!
//! ```text
//! +-------------------------------------------------------------+
//! |                        Orchestrator                          |
//! |  identity -> discovery -> rw format -> negotiate -> quirks   |
//! +-------------------------------------------------------------+
//! |                        ProbeSession                          |
//! |    profile | snapshot | findings | outcome classification    |
//! +-------------------------------------------------------------+
//! |                 Transport (bridgeprobe-hal)                  |
//! +-------------------------------------------------------------+
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use bridgeprobe::{Orchestrator, ProbeConfig, ProbeOptions};
//!
//! let config = ProbeConfig::default().enable(ProbeOptions::HANG_RISK_RTFR);
//! let report = Orchestrator::new(config).run(&mut transport)?;
//! for line in report.recommendations() {
//!     log::info!("{}", line);
//! }
//! ```

#![no_std]
#![warn(missing_docs)]

extern crate alloc;

pub mod classify;
pub mod config;
pub mod cross_validate;
pub mod discovery;
pub mod error;
pub mod identity;
pub mod negotiate;
pub mod orchestrator;
pub mod page_reader;
pub mod profile;
pub mod quirks;
pub mod report;
pub mod rw_format;
pub mod session;
pub mod snapshot;
pub mod store;

#[cfg(test)]
mod testing;

pub use classify::{Outcome, ProbeOutcome};
pub use config::{ProbeConfig, ProbeOptions};
pub use error::{ProbeError, ProbeResult};
pub use orchestrator::Orchestrator;
pub use profile::{
    AtaQuirks, CheckCondition, DmaMode, HackProfile, NvmeQuirks, OpCodeReporting, PioMode,
    RecoveryQuirk, RtfrSupport, ScsiQuirks, SecuritySupport, TransportClass, VpdSupport,
};
pub use report::{Finding, FindingKind, ProbeReport};
pub use session::ProbeSession;
pub use snapshot::ScsiDeviceSnapshot;
pub use store::{DeviceKey, MemoryProfileStore, ProfileStore};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
