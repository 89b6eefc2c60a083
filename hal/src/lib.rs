//! # bridgeprobe HAL - Transport and Command Layer
//!
//! This crate defines the transport seam the probe engine talks through,
//! plus the typed command descriptors it issues and the parsers for what
//! comes back.
//!
//! ## Design Philosophy
//!
//! The HAL is designed to be:
//! - **Infallible to encode**: Every request produces a CDB; only the device
//!   decides whether it works
//! - **Pure to decode**: Parsers take bytes and return `Option`
//! - **Transport agnostic**: One blocking trait hides every OS specific path

#![no_std]
#![warn(missing_docs)]

extern crate alloc;

pub mod ata;
pub mod command;
pub mod nvme;
pub mod scsi;
pub mod transport;

pub use ata::{AtaProtocol, AtaRegisters, IdentifyData, PassthroughFlags, TaskFile};
pub use command::{
    AtaEncoding, AtaRequest, Cdb, CdbSize, Command, DataDirection, LegacyVendor, ModeForm,
    NvmeRequest, ReportOptions, ScsiRequest,
};
pub use nvme::{IdentifyController, NvmeVendor};
pub use scsi::{DeviceType, InquiryData, ReadCapacity10, ReadCapacity16, SenseData, SenseKey};
pub use transport::{CommandResult, ReturnStatus, Transport};
