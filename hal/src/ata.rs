//! ATA task file, returned registers and IDENTIFY data.
//!
//! The probe engine never talks to an ATA device directly; everything here
//! travels inside a SCSI passthrough CDB and comes back through sense data.

use alloc::string::String;
use bitflags::bitflags;

use crate::scsi::ascii_field;

/// ATA logical sector size used by every passthrough transfer
pub const ATA_SECTOR_SIZE: usize = 512;

/// IDENTIFY (PACKET) DEVICE data length
pub const IDENTIFY_LENGTH: usize = 512;

static_assertions::const_assert_eq!(IDENTIFY_LENGTH, ATA_SECTOR_SIZE);

// =============================================================================
// ATA COMMAND OPCODES
// =============================================================================

/// ATA command opcodes
pub mod command {
    /// NOP (always aborts)
    pub const NOP: u8 = 0x00;
    /// Read Sectors (PIO, 28-bit)
    pub const READ_SECTORS: u8 = 0x20;
    /// Read Sectors Ext (PIO, 48-bit)
    pub const READ_SECTORS_EXT: u8 = 0x24;
    /// Read DMA Ext
    pub const READ_DMA_EXT: u8 = 0x25;
    /// Read Native Max Address Ext (HPA)
    pub const READ_NATIVE_MAX_EXT: u8 = 0x27;
    /// Read Log Ext
    pub const READ_LOG_EXT: u8 = 0x2F;
    /// Write Log Ext
    pub const WRITE_LOG_EXT: u8 = 0x3F;
    /// Accessible Max Address Configuration
    pub const ACCESSIBLE_MAX_ADDRESS: u8 = 0x78;
    /// Identify Packet Device
    pub const IDENTIFY_PACKET: u8 = 0xA1;
    /// SMART
    pub const SMART: u8 = 0xB0;
    /// Set Multiple Mode
    pub const SET_MULTIPLE_MODE: u8 = 0xC6;
    /// Read DMA (28-bit)
    pub const READ_DMA: u8 = 0xC8;
    /// Check Power Mode
    pub const CHECK_POWER_MODE: u8 = 0xE5;
    /// Identify Device
    pub const IDENTIFY: u8 = 0xEC;
    /// Read Native Max Address (HPA, 28-bit)
    pub const READ_NATIVE_MAX: u8 = 0xF8;
}

/// SMART feature register values
pub mod smart {
    /// SMART Read Data
    pub const READ_DATA: u8 = 0xD0;
    /// SMART Read Log
    pub const READ_LOG: u8 = 0xD5;
    /// SMART Write Log
    pub const WRITE_LOG: u8 = 0xD6;
    /// LBA mid signature required by every SMART subcommand
    pub const LBA_MID_SIGNATURE: u8 = 0x4F;
    /// LBA high signature required by every SMART subcommand
    pub const LBA_HIGH_SIGNATURE: u8 = 0xC2;
}

/// Accessible Max Address Configuration feature values
pub mod amac {
    /// Get Native Max Address
    pub const GET_NATIVE_MAX_ADDRESS: u16 = 0x0000;
}

/// Log addresses
pub mod log_address {
    /// General purpose / SMART log directory
    pub const DIRECTORY: u8 = 0x00;
    /// First host specific log
    pub const HOST_SPECIFIC_FIRST: u8 = 0x80;
    /// Last host specific log
    pub const HOST_SPECIFIC_LAST: u8 = 0x9F;
}

/// Status register bits
pub mod status {
    /// Busy
    pub const BSY: u8 = 0x80;
    /// Device ready
    pub const DRDY: u8 = 0x40;
    /// Device fault
    pub const DF: u8 = 0x20;
    /// Data request
    pub const DRQ: u8 = 0x08;
    /// Error
    pub const ERR: u8 = 0x01;
}

/// Error register bits
pub mod error {
    /// Command aborted
    pub const ABRT: u8 = 0x04;
}

// =============================================================================
// TASK FILE
// =============================================================================

/// Input registers for one ATA command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskFile {
    /// Feature (upper byte used only by 48-bit commands)
    pub feature: u16,
    /// Sector count (upper byte used only by 48-bit commands)
    pub count: u16,
    /// LBA (bits 47:24 used only by 48-bit commands)
    pub lba: u64,
    /// Device register
    pub device: u8,
    /// Command opcode
    pub command: u8,
}

impl TaskFile {
    /// Device register value selecting LBA addressing
    pub const DEVICE_LBA: u8 = 0x40;

    /// Create a task file for `command` with every other register zeroed
    pub const fn new(command: u8) -> Self {
        Self {
            feature: 0,
            count: 0,
            lba: 0,
            device: 0,
            command,
        }
    }

    /// Set the feature register
    pub const fn feature(mut self, feature: u16) -> Self {
        self.feature = feature;
        self
    }

    /// Set the count register
    pub const fn count(mut self, count: u16) -> Self {
        self.count = count;
        self
    }

    /// Set the LBA registers and select LBA mode.
    ///
    /// For 28-bit commands bits 27:24 travel in the device register.
    pub const fn lba(mut self, lba: u64) -> Self {
        self.lba = lba;
        self.device = if self.is_48bit() {
            Self::DEVICE_LBA
        } else {
            Self::DEVICE_LBA | 0xA0 | ((lba >> 24) as u8 & 0x0F)
        };
        self
    }

    /// Whether the opcode belongs to the 48-bit feature set
    pub const fn is_48bit(&self) -> bool {
        matches!(
            self.command,
            command::READ_SECTORS_EXT
                | command::READ_DMA_EXT
                | command::READ_NATIVE_MAX_EXT
                | command::READ_LOG_EXT
                | command::WRITE_LOG_EXT
                | command::ACCESSIBLE_MAX_ADDRESS
        )
    }
}

/// ATA protocol, as encoded in the SAT PROTOCOL field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtaProtocol {
    /// Non-data
    NonData,
    /// PIO data-in
    PioIn,
    /// PIO data-out
    PioOut,
    /// Multiword DMA
    Dma,
    /// Ultra DMA data-in
    UdmaIn,
    /// Return response information (registers of the previous command)
    ReturnResponseInfo,
}

impl AtaProtocol {
    /// SAT PROTOCOL field value
    pub const fn sat_value(&self) -> u8 {
        match self {
            AtaProtocol::NonData => 3,
            AtaProtocol::PioIn => 4,
            AtaProtocol::PioOut => 5,
            AtaProtocol::Dma => 6,
            AtaProtocol::UdmaIn => 10,
            AtaProtocol::ReturnResponseInfo => 15,
        }
    }

    /// Data moves from the device to the host
    pub const fn is_data_in(&self) -> bool {
        matches!(self, AtaProtocol::PioIn | AtaProtocol::Dma | AtaProtocol::UdmaIn)
    }

    /// Data moves from the host to the device
    pub const fn is_data_out(&self) -> bool {
        matches!(self, AtaProtocol::PioOut)
    }
}

bitflags! {
    /// Passthrough bits that change how a translator handles the command
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PassthroughFlags: u8 {
        /// CK_COND: return registers in sense data even on success
        const CHECK_CONDITION = 1 << 0;
        /// Set T_DIR on commands without data (compatibility form)
        const TDIR_COMPAT = 1 << 1;
        /// Transfer length lives in the TPSIU (bytes) form
        const TPSIU = 1 << 2;
        /// Transfer length is a byte count rather than a block count
        const BYTES = 1 << 3;
    }
}

// =============================================================================
// RETURNED REGISTERS
// =============================================================================

/// Output registers a translator returned after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AtaRegisters {
    /// Error register
    pub error: u8,
    /// Count register (upper byte valid only for 48-bit results)
    pub count: u16,
    /// LBA registers (bits 47:24 valid only for 48-bit results)
    pub lba: u64,
    /// Device register
    pub device: u8,
    /// Status register
    pub status: u8,
    /// Translator set the EXTEND bit
    pub extend: bool,
}

impl AtaRegisters {
    /// Decode an ATA Status Return descriptor body (12 bytes after the header)
    pub fn from_status_descriptor(d: &[u8], ignore_extend: bool) -> Self {
        let extend = d[0] & 0x01 != 0;
        let upper = extend || ignore_extend;
        let count = if upper {
            u16::from_be_bytes([d[2], d[3]])
        } else {
            d[3] as u16
        };
        let mut lba = d[5] as u64 | (d[7] as u64) << 8 | (d[9] as u64) << 16;
        if upper {
            lba |= (d[4] as u64) << 24 | (d[6] as u64) << 32 | (d[8] as u64) << 40;
        }
        Self {
            error: d[1],
            count,
            lba,
            device: d[10],
            status: d[11],
            extend,
        }
    }

    /// Decode the SAT fixed-format packing.
    ///
    /// Fixed format only has room for the low 24 LBA bits; upper bytes are
    /// never available whatever `ignore_extend` says.
    pub fn from_fixed_sense(raw: &[u8], _ignore_extend: bool) -> Self {
        Self {
            error: raw[3],
            status: raw[4],
            device: raw[5],
            count: raw[6] as u16,
            extend: raw[8] & 0x80 != 0,
            lba: raw[11] as u64 | (raw[10] as u64) << 8 | (raw[9] as u64) << 16,
        }
    }

    /// Status reports ready with no error, fault or busy
    pub const fn is_clean(&self) -> bool {
        self.status & (status::ERR | status::DF | status::BSY) == 0
            && self.status & status::DRDY != 0
    }

    /// Every register reads zero
    pub const fn is_empty(&self) -> bool {
        self.error == 0 && self.count == 0 && self.lba == 0 && self.device == 0 && self.status == 0
    }

    /// ERR with ABRT
    pub const fn is_aborted(&self) -> bool {
        self.status & status::ERR != 0 && self.error & error::ABRT != 0
    }

    /// ERR set
    pub const fn has_error(&self) -> bool {
        self.status & status::ERR != 0
    }
}

// =============================================================================
// IDENTIFY DATA
// =============================================================================

/// IDENTIFY (PACKET) DEVICE data, kept as the raw 256 words.
#[derive(Clone, PartialEq, Eq)]
pub struct IdentifyData {
    words: [u16; 256],
}

impl IdentifyData {
    /// Decode 512 bytes of identify data (little-endian words)
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < IDENTIFY_LENGTH {
            return None;
        }
        let mut words = [0u16; 256];
        for (word, pair) in words.iter_mut().zip(data.chunks_exact(2)) {
            *word = u16::from_le_bytes([pair[0], pair[1]]);
        }
        Some(Self { words })
    }

    /// Raw word access
    pub fn word(&self, index: usize) -> u16 {
        self.words[index]
    }

    /// Rejects the all-zero and all-ones buffers some bridges hand back on
    /// "success" without ever talking to the drive.
    pub fn is_plausible(&self) -> bool {
        let all_zero = self.words.iter().all(|&w| w == 0);
        let all_ones = self.words.iter().all(|&w| w == 0xFFFF);
        !all_zero && !all_ones
    }

    /// Word 0 marks an ATAPI (packet) device
    pub fn is_atapi(&self) -> bool {
        self.words[0] >> 14 == 0b10
    }

    // A word is only meaningful when bits 15:14 read 01b.
    fn valid(&self, index: usize) -> bool {
        self.words[index] >> 14 == 0b01
    }

    fn bit(&self, index: usize, bit: u16) -> bool {
        self.words[index] & (1 << bit) != 0
    }

    fn string(&self, first: usize, last: usize) -> String {
        let mut bytes = alloc::vec::Vec::with_capacity((last - first + 1) * 2);
        for word in &self.words[first..=last] {
            // ATA strings store the first character in the high byte.
            bytes.extend_from_slice(&word.to_be_bytes());
        }
        ascii_field(&bytes)
    }

    /// Serial number (words 10-19)
    pub fn serial(&self) -> String {
        self.string(10, 19)
    }

    /// Firmware revision (words 23-26)
    pub fn firmware(&self) -> String {
        self.string(23, 26)
    }

    /// Model number (words 27-46)
    pub fn model(&self) -> String {
        self.string(27, 46)
    }

    /// Maximum sectors per DRQ block for READ/WRITE MULTIPLE (word 47)
    pub fn max_multiple(&self) -> u8 {
        (self.words[47] & 0xFF) as u8
    }

    /// Current multiple setting, if valid (word 59)
    pub fn current_multiple(&self) -> Option<u8> {
        self.bit(59, 8).then(|| (self.words[59] & 0xFF) as u8)
    }

    /// DMA supported (word 49 bit 8)
    pub fn supports_dma(&self) -> bool {
        self.bit(49, 8)
    }

    /// Supported UDMA modes bitmap (word 88)
    pub fn udma_modes(&self) -> u8 {
        (self.words[88] & 0x7F) as u8
    }

    /// SMART feature set supported (word 82 bit 0)
    pub fn supports_smart(&self) -> bool {
        self.bit(82, 0)
    }

    /// Host protected area supported (word 82 bit 10)
    pub fn supports_hpa(&self) -> bool {
        self.bit(82, 10)
    }

    /// 48-bit feature set supported (word 83 bit 10)
    pub fn supports_lba48(&self) -> bool {
        self.valid(83) && self.bit(83, 10)
    }

    /// General purpose logging supported (word 84 bit 5)
    pub fn supports_gpl(&self) -> bool {
        self.valid(84) && self.bit(84, 5)
    }

    /// World wide name supported (word 84 bit 8)
    pub fn supports_wwn(&self) -> bool {
        self.valid(84) && self.bit(84, 8)
    }

    /// Accessible Max Address Configuration supported (word 119 bit 8)
    pub fn supports_amac(&self) -> bool {
        self.valid(119) && self.bit(119, 8)
    }

    /// User addressable sectors, 28-bit (words 60-61)
    pub fn lba28_sectors(&self) -> u32 {
        self.words[60] as u32 | (self.words[61] as u32) << 16
    }

    /// User addressable sectors, 48-bit (words 100-103)
    pub fn lba48_sectors(&self) -> u64 {
        self.words[100] as u64
            | (self.words[101] as u64) << 16
            | (self.words[102] as u64) << 32
            | (self.words[103] as u64) << 48
    }

    /// Highest addressable LBA, preferring the 48-bit count
    pub fn max_lba(&self) -> u64 {
        let sectors = if self.supports_lba48() && self.lba48_sectors() != 0 {
            self.lba48_sectors()
        } else {
            self.lba28_sectors() as u64
        };
        sectors.saturating_sub(1)
    }

    /// World wide name (words 108-111)
    pub fn wwn(&self) -> u64 {
        (self.words[108] as u64) << 48
            | (self.words[109] as u64) << 32
            | (self.words[110] as u64) << 16
            | self.words[111] as u64
    }

    /// Nominal form factor (word 168 bits 3:0)
    pub fn form_factor(&self) -> u8 {
        (self.words[168] & 0x0F) as u8
    }

    /// Nominal media rotation rate (word 217)
    pub fn rotation_rate(&self) -> u16 {
        self.words[217]
    }
}

impl core::fmt::Debug for IdentifyData {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("IdentifyData")
            .field("model", &self.model())
            .field("serial", &self.serial())
            .field("firmware", &self.firmware())
            .field("max_lba", &self.max_lba())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn put_string(buf: &mut [u8; 512], first_word: usize, text: &str) {
        for (i, pair) in text.as_bytes().chunks(2).enumerate() {
            let hi = pair[0];
            let lo = pair.get(1).copied().unwrap_or(b' ');
            let at = (first_word + i) * 2;
            buf[at] = lo;
            buf[at + 1] = hi;
        }
    }

    fn put_word(buf: &mut [u8; 512], word: usize, value: u16) {
        buf[word * 2..word * 2 + 2].copy_from_slice(&value.to_le_bytes());
    }

    #[test]
    fn test_identify_strings_are_byte_swapped() {
        let mut buf = [0u8; 512];
        put_string(&mut buf, 27, "ST2000DM008-2FR102");
        put_string(&mut buf, 10, "ZFL0ABCD");
        let id = IdentifyData::from_bytes(&buf).unwrap();
        assert_eq!(id.model(), "ST2000DM008-2FR102");
        assert_eq!(id.serial(), "ZFL0ABCD");
    }

    #[test]
    fn test_identify_capacity_and_features() {
        let mut buf = [0u8; 512];
        put_word(&mut buf, 83, 0x4400);
        put_word(&mut buf, 84, 0x4120);
        put_word(&mut buf, 100, 0x0000);
        put_word(&mut buf, 101, 0x0100);
        put_word(&mut buf, 47, 0x8010);
        put_word(&mut buf, 59, 0x0101);
        put_word(&mut buf, 217, 7200);
        let id = IdentifyData::from_bytes(&buf).unwrap();
        assert!(id.supports_lba48());
        assert!(id.supports_gpl());
        assert!(id.supports_wwn());
        assert_eq!(id.max_lba(), 0x0100_0000 - 1);
        assert_eq!(id.max_multiple(), 16);
        assert_eq!(id.current_multiple(), Some(1));
        assert_eq!(id.rotation_rate(), 7200);
        assert!(id.is_plausible());
    }

    #[test]
    fn test_identify_rejects_blank_buffers() {
        let zero = IdentifyData::from_bytes(&[0u8; 512]).unwrap();
        assert!(!zero.is_plausible());
        let ones = IdentifyData::from_bytes(&[0xFFu8; 512]).unwrap();
        assert!(!ones.is_plausible());
        assert!(IdentifyData::from_bytes(&[0u8; 100]).is_none());
    }

    #[test]
    fn test_registers_ignore_extend() {
        let d = [0x00, 0x00, 0x00, 0x01, 0x12, 0xFF, 0x34, 0xFF, 0x56, 0xFF, 0x40, 0x50];
        let partial = AtaRegisters::from_status_descriptor(&d, false);
        assert_eq!(partial.lba, 0x00FF_FFFF);
        let full = AtaRegisters::from_status_descriptor(&d, true);
        assert_eq!(full.lba, 0x5634_12FF_FFFF);
        assert!(full.is_clean());
        assert!(!full.extend);
    }

    #[test]
    fn test_task_file_device_register() {
        let tf = TaskFile::new(command::READ_DMA).lba(0x0ABC_DEF0);
        assert_eq!(tf.device, 0xEA);
        let ext = TaskFile::new(command::READ_DMA_EXT).lba(0x0ABC_DEF0);
        assert_eq!(ext.device, TaskFile::DEVICE_LBA);
        assert!(ext.is_48bit());
    }
}
