//! VPD, mode and log page discovery.
//!
//! All three read through [`crate::page_reader`] and tolerate any single
//! page being absent. Only fatal errors and an unresponsive device end a
//! pass early.

pub mod logs;
pub mod mode;
pub mod vpd;

pub use logs::discover_logs;
pub use mode::{discover_mode, use_mode_sense};
pub use vpd::discover_vpd;

use crate::error::ProbeError;

// Errors that end a discovery pass rather than just one page.
fn ends_pass(err: &ProbeError) -> bool {
    err.is_fatal() || err.aborts_group()
}
