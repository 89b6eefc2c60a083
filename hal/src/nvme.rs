//! NVMe behind a USB bridge.
//!
//! There is no standard for tunnelling NVMe admin commands through SCSI, so
//! every bridge family uses its own vendor CDB. Only the identify-controller
//! payload is parsed here.

use alloc::string::String;

use crate::scsi::ascii_field;

/// Identify controller data length
pub const IDENTIFY_CONTROLLER_LENGTH: usize = 4096;

/// NVMe admin opcodes
pub mod admin {
    /// Get Log Page
    pub const GET_LOG_PAGE: u8 = 0x02;
    /// Identify
    pub const IDENTIFY: u8 = 0x06;
}

/// Identify CNS values
pub mod cns {
    /// Identify controller
    pub const CONTROLLER: u32 = 0x01;
}

// =============================================================================
// VENDOR BRIDGES
// =============================================================================

/// Bridge families with a known NVMe passthrough CDB, in trial order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NvmeVendor {
    /// JMicron JMS58x
    JMicron,
    /// ASMedia ASM236x, full admin passthrough
    AsMedia,
    /// ASMedia, reduced command set (identify and SMART only)
    AsMediaBasic,
    /// Realtek RTL9210
    Realtek,
}

impl NvmeVendor {
    /// Every variant in the order they are tried
    pub const ALL: [NvmeVendor; 4] = [
        NvmeVendor::JMicron,
        NvmeVendor::AsMedia,
        NvmeVendor::AsMediaBasic,
        NvmeVendor::Realtek,
    ];

    /// Only identify and SMART style admin commands pass
    pub const fn is_limited(&self) -> bool {
        matches!(self, NvmeVendor::AsMediaBasic)
    }

    /// Get human-readable name
    pub const fn name(&self) -> &'static str {
        match self {
            NvmeVendor::JMicron => "JMicron",
            NvmeVendor::AsMedia => "ASMedia",
            NvmeVendor::AsMediaBasic => "ASMedia (basic)",
            NvmeVendor::Realtek => "Realtek",
        }
    }

    /// Inquiry vendor strings of bridges known to front NVMe drives
    pub fn is_known_bridge_vendor(vendor: &str) -> bool {
        const VENDORS: [&str; 4] = ["JMICRON", "ASMT", "ASMEDIA", "REALTEK"];
        VENDORS.iter().any(|v| vendor.eq_ignore_ascii_case(v))
    }
}

// =============================================================================
// IDENTIFY CONTROLLER
// =============================================================================

/// The identify-controller fields the probe cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifyController {
    /// PCI vendor id
    pub vid: u16,
    /// Serial number
    pub serial: String,
    /// Model number
    pub model: String,
    /// Firmware revision
    pub firmware: String,
    /// Maximum data transfer size, as a power of two of the minimum page size
    pub mdts: u8,
}

impl IdentifyController {
    /// Parse the first bytes of an identify-controller response.
    ///
    /// Rejects buffers that are all zero; bridges that swallow the command
    /// still report success with an empty payload.
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < 78 || data[..78].iter().all(|&b| b == 0) {
            return None;
        }
        Some(Self {
            vid: u16::from_le_bytes([data[0], data[1]]),
            serial: ascii_field(&data[4..24]),
            model: ascii_field(&data[24..64]),
            firmware: ascii_field(&data[64..72]),
            mdts: data[77],
        })
    }

    /// Maximum transfer in bytes, assuming a 4 KiB minimum page; `None` is
    /// unlimited.
    pub fn max_transfer_bytes(&self) -> Option<u32> {
        match self.mdts {
            0 => None,
            n if n >= 20 => Some(u32::MAX),
            n => Some(4096u32 << n),
        }
    }
}
