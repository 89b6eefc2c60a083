//! Reference data gathered from inquiry, capacity, VPD, mode and log pages.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use bridgeprobe_hal::{DeviceType, IdentifyData, ReadCapacity10, ReadCapacity16};
use bridgeprobe_hal::scsi::DEFAULT_BLOCK_SIZE;

/// Designator types (device identification VPD page)
pub mod designator_type {
    /// Vendor specific
    pub const VENDOR_SPECIFIC: u8 = 0x0;
    /// T10 vendor ID based
    pub const T10_VENDOR_ID: u8 = 0x1;
    /// EUI-64 based
    pub const EUI64: u8 = 0x2;
    /// NAA
    pub const NAA: u8 = 0x3;
}

/// One device identification descriptor (VPD 83h)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Designator {
    /// Code set (1 binary, 2 ASCII, 3 UTF-8)
    pub code_set: u8,
    /// Association (0 logical unit, 1 target port, 2 target device)
    pub association: u8,
    /// Designator type
    pub kind: u8,
    /// Designator bytes
    pub value: Vec<u8>,
}

impl Designator {
    /// 64-bit NAA designator of the logical unit, as a number
    pub fn naa_wwn(&self) -> Option<u64> {
        if self.kind != designator_type::NAA || self.association != 0 || self.value.len() != 8 {
            return None;
        }
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.value);
        Some(u64::from_be_bytes(bytes))
    }
}

/// Identity of the bridge itself (ATA information VPD page)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BridgeInfo {
    /// SAT vendor identification
    pub vendor: String,
    /// SAT product identification
    pub product: String,
    /// SAT product revision
    pub revision: String,
}

/// Block limits VPD page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockLimits {
    /// Maximum transfer length in blocks (0 = not reported)
    pub max_transfer_blocks: u32,
    /// Optimal transfer length in blocks
    pub optimal_transfer_blocks: u32,
}

/// Values picked out of the mode pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModeSettings {
    /// Caching page WCE
    pub write_cache_enabled: Option<bool>,
    /// Caching page RCD
    pub read_cache_disabled: Option<bool>,
    /// Informational exceptions page MRIE
    pub mrie: Option<u8>,
    /// Informational exceptions page DEXCPT
    pub exceptions_disabled: Option<bool>,
}

/// Counters picked out of the log pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LogCounters {
    /// Current temperature, Celsius
    pub temperature: Option<u8>,
    /// Reference temperature, Celsius
    pub reference_temperature: Option<u8>,
    /// Specified start-stop cycles over device lifetime
    pub specified_start_stop_cycles: Option<u32>,
    /// Accumulated start-stop cycles
    pub accumulated_start_stop_cycles: Option<u32>,
    /// Informational exception ASC/ASCQ
    pub ie_asc: Option<(u8, u8)>,
    /// Most recent temperature reading from the IE page
    pub ie_temperature: Option<u8>,
    /// Self-test log entries in use
    pub self_test_entries: Option<u32>,
}

/// Everything the SCSI side of the device reported.
#[derive(Debug, Clone, Default)]
pub struct ScsiDeviceSnapshot {
    /// T10 vendor identification
    pub vendor: String,
    /// Product identification
    pub product: String,
    /// Product revision
    pub revision: String,
    /// Peripheral device type
    pub device_type: DeviceType,
    /// Peripheral qualifier (0 when a logical unit is connected)
    pub peripheral_qualifier: u8,
    /// Claimed SCSI version
    pub scsi_version: u8,
    /// Removable medium
    pub removable: bool,
    /// READ CAPACITY (10) response
    pub capacity10: Option<ReadCapacity10>,
    /// READ CAPACITY (16) response
    pub capacity16: Option<ReadCapacity16>,
    /// Unit serial number
    pub serial: Option<String>,
    /// Device identification designators
    pub designators: Vec<Designator>,
    /// Extended inquiry page, raw
    pub extended_inquiry: Option<Vec<u8>>,
    /// Medium rotation rate (1 = non-rotating)
    pub rotation_rate: Option<u16>,
    /// Nominal form factor
    pub form_factor: Option<u8>,
    /// Bridge identity
    pub bridge: Option<BridgeInfo>,
    /// IDENTIFY data embedded in the ATA information page
    pub embedded_identify: Option<IdentifyData>,
    /// Block limits
    pub block_limits: Option<BlockLimits>,
    /// VPD pages found, directory or synthesized
    pub vpd_pages: Vec<u8>,
    /// Every VPD page read, raw, by page code
    pub raw_vpd: BTreeMap<u8, Vec<u8>>,
    /// Mode page responses by (page, subpage)
    pub mode_pages: BTreeMap<(u8, u8), Vec<u8>>,
    /// Values from the mode pages
    pub mode_settings: ModeSettings,
    /// Log pages listed by the device, as (page, subpage)
    pub log_pages: Vec<(u8, u8)>,
    /// Counters from the log pages
    pub counters: LogCounters,
    /// Security protocols listed by SECURITY PROTOCOL IN
    pub security_protocols: Vec<u8>,
}

impl ScsiDeviceSnapshot {
    /// Logical block size, preferring READ CAPACITY (16)
    pub fn block_size(&self) -> u32 {
        self.capacity16
            .map(|c| c.block_length)
            .or(self.capacity10.map(|c| c.block_length))
            .filter(|&len| len != 0)
            .unwrap_or(DEFAULT_BLOCK_SIZE)
    }

    /// Physical block size from the READ CAPACITY (16) exponent
    pub fn physical_block_size(&self) -> u32 {
        let exponent = self.capacity16.map_or(0, |c| c.lb_per_pb_exponent());
        self.block_size() << u32::from(exponent)
    }

    /// Total logical blocks, if any capacity command worked
    pub fn total_blocks(&self) -> Option<u64> {
        match (self.capacity16, self.capacity10) {
            (Some(c16), _) => Some(c16.total_blocks()),
            (None, Some(c10)) => Some(c10.total_blocks()),
            (None, None) => None,
        }
    }

    /// Logical unit WWN from an NAA designator
    pub fn wwn(&self) -> Option<u64> {
        self.designators.iter().find_map(Designator::naa_wwn)
    }

    /// Whether a VPD page has been read
    pub fn has_vpd(&self, page: u8) -> bool {
        self.raw_vpd.contains_key(&page)
    }
}
