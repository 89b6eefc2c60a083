//! SCSI primitives consumed by the probe engine.
//!
//! Operation codes, sense decoding, inquiry and capacity parsing. Everything
//! here is a pure function of the bytes a device returned; nothing issues a
//! command.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::ata::AtaRegisters;

// =============================================================================
// SCSI CONSTANTS
// =============================================================================

/// Maximum CDB length (variable-length SAT ATA PASS-THROUGH (32))
pub const MAX_CDB_LENGTH: usize = 32;

/// Standard inquiry data length
pub const STD_INQUIRY_LENGTH: usize = 36;

/// Allocation length used for the full standard inquiry
pub const FULL_INQUIRY_LENGTH: u16 = 96;

/// Default block size
pub const DEFAULT_BLOCK_SIZE: u32 = 512;

// =============================================================================
// SCSI OPERATION CODES
// =============================================================================

/// SCSI operation codes
pub mod opcode {
    /// Test Unit Ready
    pub const TEST_UNIT_READY: u8 = 0x00;
    /// Read (6)
    pub const READ_6: u8 = 0x08;
    /// Inquiry
    pub const INQUIRY: u8 = 0x12;
    /// Mode Sense (6)
    pub const MODE_SENSE_6: u8 = 0x1A;
    /// Read Capacity (10)
    pub const READ_CAPACITY_10: u8 = 0x25;
    /// Read (10)
    pub const READ_10: u8 = 0x28;
    /// Log Sense
    pub const LOG_SENSE: u8 = 0x4D;
    /// Mode Sense (10)
    pub const MODE_SENSE_10: u8 = 0x5A;
    /// Variable length CDB
    pub const VARIABLE_LENGTH_CDB: u8 = 0x7F;
    /// ATA PASS-THROUGH (16)
    pub const ATA_PASS_THROUGH_16: u8 = 0x85;
    /// Read (16)
    pub const READ_16: u8 = 0x88;
    /// Service Action In (16)
    pub const SERVICE_ACTION_IN_16: u8 = 0x9E;
    /// ATA PASS-THROUGH (12)
    pub const ATA_PASS_THROUGH_12: u8 = 0xA1;
    /// Security Protocol In
    pub const SECURITY_PROTOCOL_IN: u8 = 0xA2;
    /// Maintenance In
    pub const MAINTENANCE_IN: u8 = 0xA3;
    /// Read (12)
    pub const READ_12: u8 = 0xA8;

    /// Read Capacity (16) service action
    pub const SA_READ_CAPACITY_16: u8 = 0x10;
    /// Report Supported Operation Codes service action
    pub const SA_REPORT_SUPPORTED_OPCODES: u8 = 0x0C;
    /// ATA PASS-THROUGH (32) service action
    pub const SA_ATA_PASS_THROUGH_32: u16 = 0x1FF0;
}

// =============================================================================
// SENSE KEY AND CODES
// =============================================================================

/// SCSI sense keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SenseKey {
    /// No error or no sense information
    NoSense = 0x00,
    /// Recovered error
    RecoveredError = 0x01,
    /// Device not ready
    NotReady = 0x02,
    /// Medium error
    MediumError = 0x03,
    /// Hardware error
    HardwareError = 0x04,
    /// Illegal request
    IllegalRequest = 0x05,
    /// Unit attention
    UnitAttention = 0x06,
    /// Write protected
    DataProtect = 0x07,
    /// Blank check
    BlankCheck = 0x08,
    /// Vendor specific
    VendorSpecific = 0x09,
    /// Copy aborted
    CopyAborted = 0x0A,
    /// Aborted command
    AbortedCommand = 0x0B,
    /// Equal (obsolete)
    Equal = 0x0C,
    /// Volume overflow
    VolumeOverflow = 0x0D,
    /// Miscompare
    Miscompare = 0x0E,
    /// Completed
    Completed = 0x0F,
}

impl SenseKey {
    /// Create from sense key value
    pub fn from_byte(byte: u8) -> Self {
        match byte & 0x0F {
            0x00 => SenseKey::NoSense,
            0x01 => SenseKey::RecoveredError,
            0x02 => SenseKey::NotReady,
            0x03 => SenseKey::MediumError,
            0x04 => SenseKey::HardwareError,
            0x05 => SenseKey::IllegalRequest,
            0x06 => SenseKey::UnitAttention,
            0x07 => SenseKey::DataProtect,
            0x08 => SenseKey::BlankCheck,
            0x09 => SenseKey::VendorSpecific,
            0x0A => SenseKey::CopyAborted,
            0x0B => SenseKey::AbortedCommand,
            0x0C => SenseKey::Equal,
            0x0D => SenseKey::VolumeOverflow,
            0x0E => SenseKey::Miscompare,
            _ => SenseKey::Completed,
        }
    }

    /// Get human-readable description
    pub const fn description(&self) -> &'static str {
        match self {
            SenseKey::NoSense => "No sense",
            SenseKey::RecoveredError => "Recovered error",
            SenseKey::NotReady => "Not ready",
            SenseKey::MediumError => "Medium error",
            SenseKey::HardwareError => "Hardware error",
            SenseKey::IllegalRequest => "Illegal request",
            SenseKey::UnitAttention => "Unit attention",
            SenseKey::DataProtect => "Data protect",
            SenseKey::BlankCheck => "Blank check",
            SenseKey::VendorSpecific => "Vendor specific",
            SenseKey::CopyAborted => "Copy aborted",
            SenseKey::AbortedCommand => "Aborted command",
            SenseKey::Equal => "Equal",
            SenseKey::VolumeOverflow => "Volume overflow",
            SenseKey::Miscompare => "Miscompare",
            SenseKey::Completed => "Completed",
        }
    }
}

/// Additional Sense Code (ASC) values
pub mod asc {
    /// No additional sense (with ASCQ 1Dh: ATA passthrough information available)
    pub const NO_ADDITIONAL_SENSE: u8 = 0x00;
    /// Logical unit not ready
    pub const LU_NOT_READY: u8 = 0x04;
    /// Invalid command operation code
    pub const INVALID_OPCODE: u8 = 0x20;
    /// Invalid field in CDB
    pub const INVALID_FIELD_IN_CDB: u8 = 0x24;
    /// Logical unit not supported
    pub const LU_NOT_SUPPORTED: u8 = 0x25;
    /// Invalid field in parameter list
    pub const INVALID_FIELD_IN_PARAM_LIST: u8 = 0x26;
}

/// Additional Sense Code Qualifier (ASCQ) values
pub mod ascq {
    /// ATA pass through information available (with ASC 00h)
    pub const ATA_PASSTHROUGH_INFO_AVAILABLE: u8 = 0x1D;
}

/// Sense descriptor types
pub mod sense_descriptor {
    /// Information
    pub const INFORMATION: u8 = 0x00;
    /// ATA status return
    pub const ATA_STATUS: u8 = 0x09;
}

// =============================================================================
// SENSE DATA
// =============================================================================

/// Sense data response format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenseFormat {
    /// Fixed format sense data (70h, 71h)
    Fixed,
    /// Descriptor format sense data (72h, 73h)
    Descriptor,
}

/// Decoded sense data, either format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenseData {
    /// Response format
    pub format: SenseFormat,
    /// Deferred error (71h/73h)
    pub deferred: bool,
    /// Sense key
    pub key: SenseKey,
    /// Additional sense code
    pub asc: u8,
    /// Additional sense code qualifier
    pub ascq: u8,
    raw: Vec<u8>,
}

impl SenseData {
    /// Decode sense bytes as returned by the device.
    ///
    /// Returns `None` for an empty buffer or an unrecognised response code.
    pub fn parse(data: &[u8]) -> Option<Self> {
        let response_code = *data.first()? & 0x7F;
        match response_code {
            0x70 | 0x71 => {
                // Short fixed sense still carries the key in byte 2.
                if data.len() < 3 {
                    return None;
                }
                Some(Self {
                    format: SenseFormat::Fixed,
                    deferred: response_code == 0x71,
                    key: SenseKey::from_byte(data[2]),
                    asc: data.get(12).copied().unwrap_or(0),
                    ascq: data.get(13).copied().unwrap_or(0),
                    raw: data.to_vec(),
                })
            }
            0x72 | 0x73 => {
                if data.len() < 4 {
                    return None;
                }
                Some(Self {
                    format: SenseFormat::Descriptor,
                    deferred: response_code == 0x73,
                    key: SenseKey::from_byte(data[1]),
                    asc: data[2],
                    ascq: data[3],
                    raw: data.to_vec(),
                })
            }
            _ => None,
        }
    }

    /// Raw sense bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// Check for a specific ASC/ASCQ pair
    pub const fn is(&self, asc: u8, ascq: u8) -> bool {
        self.asc == asc && self.ascq == ascq
    }

    /// SAT "ATA pass through information available"
    pub const fn has_ata_information(&self) -> bool {
        self.is(asc::NO_ADDITIONAL_SENSE, ascq::ATA_PASSTHROUGH_INFO_AVAILABLE)
    }

    /// Iterate the descriptors of descriptor-format sense.
    pub fn descriptors(&self) -> SenseDescriptors<'_> {
        let body = match self.format {
            SenseFormat::Descriptor if self.raw.len() > 8 => {
                let additional = self.raw[7] as usize;
                let end = (8 + additional).min(self.raw.len());
                &self.raw[8..end]
            }
            _ => &[],
        };
        SenseDescriptors { body }
    }

    /// Decode the ATA registers a SAT translator returned in this sense.
    ///
    /// Descriptor format uses the ATA Status Return descriptor (09h). Fixed
    /// format packs error/status/device/count into the information field and
    /// the LBA into the command-specific field. When `ignore_extend` is set
    /// the upper 48-bit register bytes are trusted even if the translator
    /// left the extend bit clear.
    pub fn ata_registers(&self, ignore_extend: bool) -> Option<AtaRegisters> {
        match self.format {
            SenseFormat::Descriptor => self
                .descriptors()
                .find(|(code, body)| *code == sense_descriptor::ATA_STATUS && body.len() >= 12)
                .map(|(_, d)| AtaRegisters::from_status_descriptor(d, ignore_extend)),
            SenseFormat::Fixed => {
                if self.raw.len() < 12 || !self.has_ata_information() {
                    return None;
                }
                Some(AtaRegisters::from_fixed_sense(&self.raw, ignore_extend))
            }
        }
    }
}

impl fmt::Display for SenseData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (ASC={:#04X}, ASCQ={:#04X})",
            self.key.description(),
            self.asc,
            self.ascq
        )
    }
}

/// Iterator over `(descriptor type, descriptor body)` pairs.
///
/// The body excludes the two-byte descriptor header.
#[derive(Debug, Clone)]
pub struct SenseDescriptors<'a> {
    body: &'a [u8],
}

impl<'a> Iterator for SenseDescriptors<'a> {
    type Item = (u8, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.body.len() < 2 {
            return None;
        }
        let code = self.body[0];
        let len = self.body[1] as usize;
        let end = (2 + len).min(self.body.len());
        let item = (code, &self.body[2..end]);
        self.body = &self.body[end..];
        Some(item)
    }
}

// =============================================================================
// INQUIRY DATA
// =============================================================================

/// Peripheral device type codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum DeviceType {
    /// Direct access block device (disk)
    DirectAccess = 0x00,
    /// Sequential access device (tape)
    SequentialAccess = 0x01,
    /// Processor device
    Processor = 0x03,
    /// Write-once device
    WriteOnce = 0x04,
    /// CD/DVD device
    CdDvd = 0x05,
    /// Optical memory device
    OpticalMemory = 0x07,
    /// Storage array controller
    StorageArrayController = 0x0C,
    /// Enclosure services device
    EnclosureServices = 0x0D,
    /// Simplified direct access
    SimplifiedDirectAccess = 0x0E,
    /// Bridge controller
    Bridge = 0x10,
    /// Host managed zoned block
    ZonedBlock = 0x14,
    /// Well known logical unit
    WellKnown = 0x1E,
    /// Unknown or no device type
    #[default]
    Unknown = 0x1F,
}

impl DeviceType {
    /// Create from peripheral device type byte
    pub fn from_byte(byte: u8) -> Self {
        match byte & 0x1F {
            0x00 => DeviceType::DirectAccess,
            0x01 => DeviceType::SequentialAccess,
            0x03 => DeviceType::Processor,
            0x04 => DeviceType::WriteOnce,
            0x05 => DeviceType::CdDvd,
            0x07 => DeviceType::OpticalMemory,
            0x0C => DeviceType::StorageArrayController,
            0x0D => DeviceType::EnclosureServices,
            0x0E => DeviceType::SimplifiedDirectAccess,
            0x10 => DeviceType::Bridge,
            0x14 => DeviceType::ZonedBlock,
            0x1E => DeviceType::WellKnown,
            _ => DeviceType::Unknown,
        }
    }

    /// Direct-access style block device
    pub const fn is_block_device(&self) -> bool {
        matches!(
            self,
            DeviceType::DirectAccess | DeviceType::SimplifiedDirectAccess | DeviceType::ZonedBlock
        )
    }

    /// Optical (MMC or optical memory) device
    pub const fn is_optical(&self) -> bool {
        matches!(self, DeviceType::CdDvd | DeviceType::OpticalMemory)
    }
}

/// Standard Inquiry data (36 bytes minimum)
#[derive(Debug, Clone, Copy)]
pub struct InquiryData {
    /// Peripheral device type and qualifier
    pub peripheral: u8,
    /// Removable medium bit
    pub rmb: u8,
    /// Version
    pub version: u8,
    /// Response data format and other flags
    pub response_format: u8,
    /// Additional length
    pub additional_length: u8,
    /// Vendor identification (8 bytes)
    pub vendor: [u8; 8],
    /// Product identification (16 bytes)
    pub product: [u8; 16],
    /// Product revision level (4 bytes)
    pub revision: [u8; 4],
}

impl InquiryData {
    /// Create from byte slice
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < STD_INQUIRY_LENGTH {
            return None;
        }

        let mut vendor = [0u8; 8];
        let mut product = [0u8; 16];
        let mut revision = [0u8; 4];

        vendor.copy_from_slice(&data[8..16]);
        product.copy_from_slice(&data[16..32]);
        revision.copy_from_slice(&data[32..36]);

        Some(Self {
            peripheral: data[0],
            rmb: data[1],
            version: data[2],
            response_format: data[3],
            additional_length: data[4],
            vendor,
            product,
            revision,
        })
    }

    /// Get device type
    pub fn device_type(&self) -> DeviceType {
        DeviceType::from_byte(self.peripheral)
    }

    /// Get peripheral qualifier
    pub const fn peripheral_qualifier(&self) -> u8 {
        (self.peripheral >> 5) & 0x07
    }

    /// Check if removable medium
    pub const fn is_removable(&self) -> bool {
        (self.rmb & 0x80) != 0
    }

    /// SCSI version claimed (5 = SPC-3, 6 = SPC-4, 7 = SPC-5)
    pub const fn scsi_version(&self) -> u8 {
        self.version
    }

    /// Vendor identification, trimmed
    pub fn vendor_string(&self) -> String {
        ascii_field(&self.vendor)
    }

    /// Product identification, trimmed
    pub fn product_string(&self) -> String {
        ascii_field(&self.product)
    }

    /// Product revision, trimmed
    pub fn revision_string(&self) -> String {
        ascii_field(&self.revision)
    }
}

/// Decode a space/NUL padded ASCII field into a trimmed string.
///
/// Non-printable bytes become `?` so garbage from a broken bridge stays
/// visible rather than silently disappearing.
pub fn ascii_field(bytes: &[u8]) -> String {
    let end = bytes
        .iter()
        .rposition(|&c| c != b' ' && c != 0)
        .map(|i| i + 1)
        .unwrap_or(0);
    let start = bytes[..end].iter().position(|&c| c != b' ').unwrap_or(end);
    bytes[start..end]
        .iter()
        .map(|&c| if (0x20..0x7F).contains(&c) { c as char } else { '?' })
        .collect()
}

// =============================================================================
// PAGE CODES
// =============================================================================

/// VPD page codes
pub mod vpd {
    /// Supported VPD pages
    pub const SUPPORTED_PAGES: u8 = 0x00;
    /// Unit serial number
    pub const UNIT_SERIAL_NUMBER: u8 = 0x80;
    /// Device identification
    pub const DEVICE_IDENTIFICATION: u8 = 0x83;
    /// Extended inquiry data
    pub const EXTENDED_INQUIRY: u8 = 0x86;
    /// ATA information
    pub const ATA_INFO: u8 = 0x89;
    /// Block limits
    pub const BLOCK_LIMITS: u8 = 0xB0;
    /// Block device characteristics
    pub const BLOCK_DEVICE_CHARACTERISTICS: u8 = 0xB1;
}

/// Mode page codes
pub mod mode_page {
    /// Read-write error recovery
    pub const READ_WRITE_ERROR_RECOVERY: u8 = 0x01;
    /// Caching
    pub const CACHING: u8 = 0x08;
    /// Control (subpage 01h: control extension)
    pub const CONTROL: u8 = 0x0A;
    /// Control extension subpage
    pub const CONTROL_EXTENSION_SUBPAGE: u8 = 0x01;
    /// Power condition
    pub const POWER_CONDITION: u8 = 0x1A;
    /// Informational exceptions control
    pub const INFORMATIONAL_EXCEPTIONS: u8 = 0x1C;
    /// All pages
    pub const ALL_PAGES: u8 = 0x3F;
}

/// Log page codes
pub mod log_page {
    /// Supported log pages (subpage FFh: supported pages and subpages)
    pub const SUPPORTED_PAGES: u8 = 0x00;
    /// Subpage selecting "supported pages and subpages"
    pub const ALL_SUBPAGES: u8 = 0xFF;
    /// Write error counters
    pub const WRITE_ERROR_COUNTERS: u8 = 0x02;
    /// Read error counters
    pub const READ_ERROR_COUNTERS: u8 = 0x03;
    /// Temperature
    pub const TEMPERATURE: u8 = 0x0D;
    /// Start-stop cycle counter
    pub const START_STOP_CYCLE_COUNTER: u8 = 0x0E;
    /// Self-test results
    pub const SELF_TEST_RESULTS: u8 = 0x10;
    /// Solid state media
    pub const SOLID_STATE_MEDIA: u8 = 0x11;
    /// Informational exceptions
    pub const INFORMATIONAL_EXCEPTIONS: u8 = 0x2F;
}

/// Security protocol numbers
pub mod security_protocol {
    /// Security protocol information
    pub const INFORMATION: u8 = 0x00;
}

// =============================================================================
// READ CAPACITY DATA
// =============================================================================

/// Read Capacity (10) response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadCapacity10 {
    /// Returned logical block address (last LBA)
    pub last_lba: u32,
    /// Block length in bytes
    pub block_length: u32,
}

impl ReadCapacity10 {
    /// Create from byte slice
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < 8 {
            return None;
        }

        Some(Self {
            last_lba: u32::from_be_bytes([data[0], data[1], data[2], data[3]]),
            block_length: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
        })
    }

    /// A last LBA of FFFFFFFFh means "use READ CAPACITY (16)"
    pub const fn is_saturated(&self) -> bool {
        self.last_lba == u32::MAX
    }

    /// Get total number of blocks
    pub fn total_blocks(&self) -> u64 {
        self.last_lba as u64 + 1
    }
}

/// Read Capacity (16) response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadCapacity16 {
    /// Returned logical block address (last LBA)
    pub last_lba: u64,
    /// Block length in bytes
    pub block_length: u32,
    /// Protection and other flags
    pub flags: u8,
    /// Logical blocks per physical block exponent and other
    pub lb_per_pb: u8,
}

impl ReadCapacity16 {
    /// Create from byte slice
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < 14 {
            return None;
        }

        let mut lba = [0u8; 8];
        lba.copy_from_slice(&data[0..8]);

        Some(Self {
            last_lba: u64::from_be_bytes(lba),
            block_length: u32::from_be_bytes([data[8], data[9], data[10], data[11]]),
            flags: data[12],
            lb_per_pb: data[13],
        })
    }

    /// Get total number of blocks
    pub fn total_blocks(&self) -> u64 {
        self.last_lba.saturating_add(1)
    }

    /// Get logical blocks per physical block exponent
    pub const fn lb_per_pb_exponent(&self) -> u8 {
        self.lb_per_pb & 0x0F
    }
}

// =============================================================================
// TESTS
// =============================================================================
