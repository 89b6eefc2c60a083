//! Typed command descriptors and their CDB encoders.
//!
//! Every request here encodes infallibly; whether the device behind the
//! translator accepts it is exactly what the probe engine finds out.

use alloc::vec::Vec;

use crate::ata::{self, AtaProtocol, PassthroughFlags, TaskFile, ATA_SECTOR_SIZE};
use crate::nvme::{self, NvmeVendor};
use crate::scsi::{opcode, MAX_CDB_LENGTH};

// =============================================================================
// CDB
// =============================================================================

/// SCSI Command Descriptor Block
///
/// Length varies by command: 6, 10, 12, 16 or 32 bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cdb {
    bytes: [u8; MAX_CDB_LENGTH],
    len: usize,
}

impl Cdb {
    /// Create a zeroed CDB of `len` bytes
    pub const fn new(len: usize) -> Self {
        Self {
            bytes: [0; MAX_CDB_LENGTH],
            len,
        }
    }

    /// Encoded bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// CDB length
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Always false; a CDB has at least an opcode
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Operation code
    pub const fn opcode(&self) -> u8 {
        self.bytes[0]
    }

    fn put_u16(&mut self, at: usize, value: u16) {
        self.bytes[at..at + 2].copy_from_slice(&value.to_be_bytes());
    }

    fn put_u32(&mut self, at: usize, value: u32) {
        self.bytes[at..at + 4].copy_from_slice(&value.to_be_bytes());
    }

    fn put_u64(&mut self, at: usize, value: u64) {
        self.bytes[at..at + 8].copy_from_slice(&value.to_be_bytes());
    }
}

/// Read CDB size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CdbSize {
    /// READ (6)
    Six,
    /// READ (10)
    Ten,
    /// READ (12)
    Twelve,
    /// READ (16)
    Sixteen,
}

impl CdbSize {
    /// All sizes, smallest first
    pub const ALL: [CdbSize; 4] = [CdbSize::Six, CdbSize::Ten, CdbSize::Twelve, CdbSize::Sixteen];

    /// Size in bytes
    pub const fn bytes(&self) -> usize {
        match self {
            CdbSize::Six => 6,
            CdbSize::Ten => 10,
            CdbSize::Twelve => 12,
            CdbSize::Sixteen => 16,
        }
    }
}

/// MODE SENSE form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModeForm {
    /// MODE SENSE (6), 4-byte header
    Six,
    /// MODE SENSE (10), 8-byte header
    Ten,
}

/// Data phase direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataDirection {
    /// No data phase
    None,
    /// Device to host
    In,
    /// Host to device
    Out,
}

// =============================================================================
// SCSI REQUESTS
// =============================================================================

/// REPORT SUPPORTED OPERATION CODES reporting options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOptions {
    /// List every supported command
    All,
    /// Report a single opcode
    OneCommand,
}

/// A native SCSI command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScsiRequest {
    /// TEST UNIT READY
    TestUnitReady,
    /// INQUIRY, standard or VPD
    Inquiry {
        /// EVPD bit
        evpd: bool,
        /// VPD page code
        page: u8,
        /// Allocation length
        allocation: u16,
    },
    /// READ CAPACITY (10)
    ReadCapacity10,
    /// READ CAPACITY (16)
    ReadCapacity16 {
        /// Allocation length
        allocation: u32,
    },
    /// READ (6/10/12/16)
    Read {
        /// CDB size
        size: CdbSize,
        /// Starting LBA
        lba: u64,
        /// Transfer length in blocks; zero is legal for 10/12/16
        blocks: u32,
        /// Logical block size
        block_size: u32,
    },
    /// MODE SENSE (6/10), current values, block descriptors disabled
    ModeSense {
        /// CDB form
        form: ModeForm,
        /// Page code
        page: u8,
        /// Subpage code
        subpage: u8,
        /// Allocation length
        allocation: u16,
    },
    /// LOG SENSE, cumulative values
    LogSense {
        /// Page code
        page: u8,
        /// Subpage code
        subpage: u8,
        /// Allocation length
        allocation: u16,
    },
    /// SECURITY PROTOCOL IN
    SecurityProtocolIn {
        /// Security protocol
        protocol: u8,
        /// Protocol specific field
        specific: u16,
        /// Allocation length counts 512-byte units
        inc512: bool,
        /// Allocation length
        allocation: u32,
    },
    /// REPORT SUPPORTED OPERATION CODES
    ReportSupportedOperationCodes {
        /// Reporting options
        options: ReportOptions,
        /// Requested opcode (single command form)
        opcode: u8,
        /// Allocation length
        allocation: u32,
    },
}

impl ScsiRequest {
    fn encode(&self) -> Cdb {
        match *self {
            ScsiRequest::TestUnitReady => {
                let mut cdb = Cdb::new(6);
                cdb.bytes[0] = opcode::TEST_UNIT_READY;
                cdb
            }
            ScsiRequest::Inquiry {
                evpd,
                page,
                allocation,
            } => {
                let mut cdb = Cdb::new(6);
                cdb.bytes[0] = opcode::INQUIRY;
                cdb.bytes[1] = evpd as u8;
                cdb.bytes[2] = page;
                cdb.put_u16(3, allocation);
                cdb
            }
            ScsiRequest::ReadCapacity10 => {
                let mut cdb = Cdb::new(10);
                cdb.bytes[0] = opcode::READ_CAPACITY_10;
                cdb
            }
            ScsiRequest::ReadCapacity16 { allocation } => {
                let mut cdb = Cdb::new(16);
                cdb.bytes[0] = opcode::SERVICE_ACTION_IN_16;
                cdb.bytes[1] = opcode::SA_READ_CAPACITY_16;
                cdb.put_u32(10, allocation);
                cdb
            }
            ScsiRequest::Read {
                size, lba, blocks, ..
            } => match size {
                CdbSize::Six => {
                    let mut cdb = Cdb::new(6);
                    cdb.bytes[0] = opcode::READ_6;
                    cdb.bytes[1] = ((lba >> 16) & 0x1F) as u8;
                    cdb.bytes[2] = (lba >> 8) as u8;
                    cdb.bytes[3] = lba as u8;
                    // Zero means 256 blocks in the 6-byte form.
                    cdb.bytes[4] = blocks as u8;
                    cdb
                }
                CdbSize::Ten => {
                    let mut cdb = Cdb::new(10);
                    cdb.bytes[0] = opcode::READ_10;
                    cdb.put_u32(2, lba as u32);
                    cdb.put_u16(7, blocks as u16);
                    cdb
                }
                CdbSize::Twelve => {
                    let mut cdb = Cdb::new(12);
                    cdb.bytes[0] = opcode::READ_12;
                    cdb.put_u32(2, lba as u32);
                    cdb.put_u32(6, blocks);
                    cdb
                }
                CdbSize::Sixteen => {
                    let mut cdb = Cdb::new(16);
                    cdb.bytes[0] = opcode::READ_16;
                    cdb.put_u64(2, lba);
                    cdb.put_u32(10, blocks);
                    cdb
                }
            },
            ScsiRequest::ModeSense {
                form,
                page,
                subpage,
                allocation,
            } => match form {
                ModeForm::Six => {
                    let mut cdb = Cdb::new(6);
                    cdb.bytes[0] = opcode::MODE_SENSE_6;
                    cdb.bytes[1] = 0x08;
                    cdb.bytes[2] = page & 0x3F;
                    cdb.bytes[3] = subpage;
                    cdb.bytes[4] = allocation.min(0xFF) as u8;
                    cdb
                }
                ModeForm::Ten => {
                    let mut cdb = Cdb::new(10);
                    cdb.bytes[0] = opcode::MODE_SENSE_10;
                    cdb.bytes[1] = 0x08;
                    cdb.bytes[2] = page & 0x3F;
                    cdb.bytes[3] = subpage;
                    cdb.put_u16(7, allocation);
                    cdb
                }
            },
            ScsiRequest::LogSense {
                page,
                subpage,
                allocation,
            } => {
                let mut cdb = Cdb::new(10);
                cdb.bytes[0] = opcode::LOG_SENSE;
                cdb.bytes[2] = 0x40 | (page & 0x3F);
                cdb.bytes[3] = subpage;
                cdb.put_u16(7, allocation);
                cdb
            }
            ScsiRequest::SecurityProtocolIn {
                protocol,
                specific,
                inc512,
                allocation,
            } => {
                let mut cdb = Cdb::new(12);
                cdb.bytes[0] = opcode::SECURITY_PROTOCOL_IN;
                cdb.bytes[1] = protocol;
                cdb.put_u16(2, specific);
                cdb.bytes[4] = (inc512 as u8) << 7;
                cdb.put_u32(6, allocation);
                cdb
            }
            ScsiRequest::ReportSupportedOperationCodes {
                options,
                opcode: requested,
                allocation,
            } => {
                let mut cdb = Cdb::new(12);
                cdb.bytes[0] = opcode::MAINTENANCE_IN;
                cdb.bytes[1] = opcode::SA_REPORT_SUPPORTED_OPCODES;
                cdb.bytes[2] = match options {
                    ReportOptions::All => 0,
                    ReportOptions::OneCommand => 1,
                };
                cdb.bytes[3] = requested;
                cdb.put_u32(6, allocation);
                cdb
            }
        }
    }

    fn transfer_length(&self) -> usize {
        match *self {
            ScsiRequest::TestUnitReady => 0,
            ScsiRequest::Inquiry { allocation, .. } => allocation as usize,
            ScsiRequest::ReadCapacity10 => 8,
            ScsiRequest::ReadCapacity16 { allocation } => allocation as usize,
            ScsiRequest::Read {
                size,
                blocks,
                block_size,
                ..
            } => {
                let blocks = if size == CdbSize::Six && blocks == 0 {
                    256
                } else {
                    blocks
                };
                blocks as usize * block_size as usize
            }
            ScsiRequest::ModeSense {
                form: ModeForm::Six,
                allocation,
                ..
            } => allocation.min(0xFF) as usize,
            ScsiRequest::ModeSense { allocation, .. } => allocation as usize,
            ScsiRequest::LogSense { allocation, .. } => allocation as usize,
            ScsiRequest::SecurityProtocolIn {
                inc512, allocation, ..
            } => {
                if inc512 {
                    allocation as usize * 512
                } else {
                    allocation as usize
                }
            }
            ScsiRequest::ReportSupportedOperationCodes { allocation, .. } => allocation as usize,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            ScsiRequest::TestUnitReady => "TEST UNIT READY",
            ScsiRequest::Inquiry { evpd: false, .. } => "INQUIRY",
            ScsiRequest::Inquiry { .. } => "INQUIRY (VPD)",
            ScsiRequest::ReadCapacity10 => "READ CAPACITY (10)",
            ScsiRequest::ReadCapacity16 { .. } => "READ CAPACITY (16)",
            ScsiRequest::Read { size, .. } => match size {
                CdbSize::Six => "READ (6)",
                CdbSize::Ten => "READ (10)",
                CdbSize::Twelve => "READ (12)",
                CdbSize::Sixteen => "READ (16)",
            },
            ScsiRequest::ModeSense {
                form: ModeForm::Six,
                ..
            } => "MODE SENSE (6)",
            ScsiRequest::ModeSense { .. } => "MODE SENSE (10)",
            ScsiRequest::LogSense { .. } => "LOG SENSE",
            ScsiRequest::SecurityProtocolIn { .. } => "SECURITY PROTOCOL IN",
            ScsiRequest::ReportSupportedOperationCodes { .. } => {
                "REPORT SUPPORTED OPERATION CODES"
            }
        }
    }
}

// =============================================================================
// ATA PASSTHROUGH REQUESTS
// =============================================================================

/// Pre-SAT vendor passthrough families, in trial order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LegacyVendor {
    /// Cypress ATACB
    Cypress,
    /// Prolific PL-2506/2507
    Prolific,
    /// Texas Instruments TUSB9260 style
    Ti,
    /// NEC
    Nec,
    /// PSP (Sunplus family)
    Psp,
}

impl LegacyVendor {
    /// Every variant in the order they are tried
    pub const ALL: [LegacyVendor; 5] = [
        LegacyVendor::Cypress,
        LegacyVendor::Prolific,
        LegacyVendor::Ti,
        LegacyVendor::Nec,
        LegacyVendor::Psp,
    ];

    /// Get human-readable name
    pub const fn name(&self) -> &'static str {
        match self {
            LegacyVendor::Cypress => "Cypress",
            LegacyVendor::Prolific => "Prolific",
            LegacyVendor::Ti => "TI",
            LegacyVendor::Nec => "NEC",
            LegacyVendor::Psp => "PSP",
        }
    }

    const fn opcode(&self) -> u8 {
        match self {
            LegacyVendor::Cypress => 0x24,
            LegacyVendor::Prolific => 0xD8,
            LegacyVendor::Ti => 0x3C,
            LegacyVendor::Nec => 0xF8,
            LegacyVendor::Psp => 0xF0,
        }
    }
}

/// How an ATA task file is wrapped in a CDB
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtaEncoding {
    /// ATA PASS-THROUGH (12)
    Sat12,
    /// ATA PASS-THROUGH (16)
    Sat16,
    /// ATA PASS-THROUGH (32)
    Sat32,
    /// Vendor specific, pre-SAT
    Legacy(LegacyVendor),
}

/// An ATA command wrapped for a translator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtaRequest {
    /// Wrapper
    pub encoding: AtaEncoding,
    /// ATA protocol
    pub protocol: AtaProtocol,
    /// Input registers
    pub task_file: TaskFile,
    /// Passthrough bits
    pub flags: PassthroughFlags,
    /// Data phase length in 512-byte sectors
    pub sectors: u16,
    /// Payload for data-out commands
    pub data_out: Vec<u8>,
}

impl AtaRequest {
    const SMART_SIGNATURE: u64 =
        (ata::smart::LBA_HIGH_SIGNATURE as u64) << 16 | (ata::smart::LBA_MID_SIGNATURE as u64) << 8;

    fn new(encoding: AtaEncoding, protocol: AtaProtocol, task_file: TaskFile, sectors: u16) -> Self {
        Self {
            encoding,
            protocol,
            task_file,
            flags: PassthroughFlags::empty(),
            sectors,
            data_out: Vec::new(),
        }
    }

    /// IDENTIFY DEVICE
    pub fn identify(encoding: AtaEncoding) -> Self {
        let tf = TaskFile::new(ata::command::IDENTIFY).count(1);
        Self::new(encoding, AtaProtocol::PioIn, tf, 1)
    }

    /// IDENTIFY PACKET DEVICE
    pub fn identify_packet(encoding: AtaEncoding) -> Self {
        let tf = TaskFile::new(ata::command::IDENTIFY_PACKET).count(1);
        Self::new(encoding, AtaProtocol::PioIn, tf, 1)
    }

    /// CHECK POWER MODE
    pub fn check_power_mode(encoding: AtaEncoding) -> Self {
        let tf = TaskFile::new(ata::command::CHECK_POWER_MODE);
        Self::new(encoding, AtaProtocol::NonData, tf, 0)
    }

    /// SMART READ DATA
    pub fn smart_read_data(encoding: AtaEncoding) -> Self {
        let tf = TaskFile::new(ata::command::SMART)
            .feature(ata::smart::READ_DATA as u16)
            .count(1)
            .lba(Self::SMART_SIGNATURE);
        Self::new(encoding, AtaProtocol::PioIn, tf, 1)
    }

    /// SMART READ LOG
    pub fn smart_read_log(encoding: AtaEncoding, address: u8, sectors: u8) -> Self {
        let tf = TaskFile::new(ata::command::SMART)
            .feature(ata::smart::READ_LOG as u16)
            .count(sectors as u16)
            .lba(Self::SMART_SIGNATURE | address as u64);
        Self::new(encoding, AtaProtocol::PioIn, tf, sectors as u16)
    }

    /// READ LOG EXT
    pub fn read_log_ext(encoding: AtaEncoding, address: u8, page: u16, sectors: u16) -> Self {
        let tf = TaskFile::new(ata::command::READ_LOG_EXT)
            .count(sectors)
            .lba(address as u64 | (page as u64) << 8);
        Self::new(encoding, AtaProtocol::PioIn, tf, sectors)
    }

    /// WRITE LOG EXT; `data` is padded to whole sectors
    pub fn write_log_ext(encoding: AtaEncoding, address: u8, page: u16, mut data: Vec<u8>) -> Self {
        let sectors = data.len().div_ceil(ATA_SECTOR_SIZE);
        data.resize(sectors * ATA_SECTOR_SIZE, 0);
        let tf = TaskFile::new(ata::command::WRITE_LOG_EXT)
            .count(sectors as u16)
            .lba(address as u64 | (page as u64) << 8);
        let mut request = Self::new(encoding, AtaProtocol::PioOut, tf, sectors as u16);
        request.data_out = data;
        request
    }

    /// READ DMA (EXT), either multiword or Ultra DMA protocol
    pub fn read_dma(encoding: AtaEncoding, lba: u64, sectors: u16, ultra: bool, ext: bool) -> Self {
        let command = if ext {
            ata::command::READ_DMA_EXT
        } else {
            ata::command::READ_DMA
        };
        let protocol = if ultra {
            AtaProtocol::UdmaIn
        } else {
            AtaProtocol::Dma
        };
        let tf = TaskFile::new(command).count(sectors).lba(lba);
        Self::new(encoding, protocol, tf, sectors)
    }

    /// READ SECTORS (EXT), PIO
    pub fn read_sectors(encoding: AtaEncoding, lba: u64, sectors: u16, ext: bool) -> Self {
        let command = if ext {
            ata::command::READ_SECTORS_EXT
        } else {
            ata::command::READ_SECTORS
        };
        let tf = TaskFile::new(command).count(sectors).lba(lba);
        Self::new(encoding, AtaProtocol::PioIn, tf, sectors)
    }

    /// SET MULTIPLE MODE
    pub fn set_multiple_mode(encoding: AtaEncoding, sectors_per_block: u8) -> Self {
        let tf = TaskFile::new(ata::command::SET_MULTIPLE_MODE).count(sectors_per_block as u16);
        Self::new(encoding, AtaProtocol::NonData, tf, 0)
    }

    /// READ NATIVE MAX ADDRESS (EXT)
    pub fn read_native_max(encoding: AtaEncoding, ext: bool) -> Self {
        let command = if ext {
            ata::command::READ_NATIVE_MAX_EXT
        } else {
            ata::command::READ_NATIVE_MAX
        };
        let tf = TaskFile::new(command).lba(0);
        Self::new(encoding, AtaProtocol::NonData, tf, 0)
    }

    /// ACCESSIBLE MAX ADDRESS CONFIGURATION / GET NATIVE MAX ADDRESS EXT
    pub fn get_native_max_ext(encoding: AtaEncoding) -> Self {
        let tf = TaskFile::new(ata::command::ACCESSIBLE_MAX_ADDRESS)
            .feature(ata::amac::GET_NATIVE_MAX_ADDRESS)
            .lba(0);
        Self::new(encoding, AtaProtocol::NonData, tf, 0)
    }

    /// NOP, which every device aborts
    pub fn nop(encoding: AtaEncoding) -> Self {
        Self::new(encoding, AtaProtocol::NonData, TaskFile::new(ata::command::NOP), 0)
    }

    /// Return the registers of the previous command
    pub fn return_response_info(encoding: AtaEncoding) -> Self {
        Self::new(
            encoding,
            AtaProtocol::ReturnResponseInfo,
            TaskFile::default(),
            0,
        )
    }

    /// Add passthrough bits
    pub fn with_flags(mut self, flags: PassthroughFlags) -> Self {
        self.flags |= flags;
        self
    }

    fn transfer_length(&self) -> usize {
        if self.protocol.is_data_in() || self.protocol.is_data_out() {
            self.sectors as usize * ATA_SECTOR_SIZE
        } else {
            0
        }
    }

    // PROTOCOL/EXTEND byte shared by every SAT size.
    fn protocol_byte(&self) -> u8 {
        self.protocol.sat_value() << 1 | self.task_file.is_48bit() as u8
    }

    // CK_COND, T_DIR, BYT_BLOK and T_LENGTH.
    fn transfer_byte(&self) -> u8 {
        let has_data = self.transfer_length() > 0;
        let mut byte = 0u8;
        if self.flags.contains(PassthroughFlags::CHECK_CONDITION) {
            byte |= 1 << 5;
        }
        if self.protocol.is_data_in()
            || (!has_data && self.flags.contains(PassthroughFlags::TDIR_COMPAT))
        {
            byte |= 1 << 3;
        }
        if has_data {
            let bytes = self
                .flags
                .intersects(PassthroughFlags::BYTES | PassthroughFlags::TPSIU);
            if !bytes {
                byte |= 1 << 2;
            }
            byte |= if self.flags.contains(PassthroughFlags::TPSIU) {
                3
            } else {
                2
            };
        }
        byte
    }

    fn encode(&self) -> Cdb {
        let tf = &self.task_file;
        match self.encoding {
            AtaEncoding::Sat12 => {
                let mut cdb = Cdb::new(12);
                cdb.bytes[0] = opcode::ATA_PASS_THROUGH_12;
                cdb.bytes[1] = self.protocol.sat_value() << 1;
                cdb.bytes[2] = self.transfer_byte();
                cdb.bytes[3] = tf.feature as u8;
                cdb.bytes[4] = tf.count as u8;
                cdb.bytes[5] = tf.lba as u8;
                cdb.bytes[6] = (tf.lba >> 8) as u8;
                cdb.bytes[7] = (tf.lba >> 16) as u8;
                cdb.bytes[8] = tf.device;
                cdb.bytes[9] = tf.command;
                cdb
            }
            AtaEncoding::Sat16 => {
                let mut cdb = Cdb::new(16);
                cdb.bytes[0] = opcode::ATA_PASS_THROUGH_16;
                cdb.bytes[1] = self.protocol_byte();
                cdb.bytes[2] = self.transfer_byte();
                cdb.put_u16(3, tf.feature);
                cdb.put_u16(5, tf.count);
                cdb.bytes[7] = (tf.lba >> 24) as u8;
                cdb.bytes[8] = tf.lba as u8;
                cdb.bytes[9] = (tf.lba >> 32) as u8;
                cdb.bytes[10] = (tf.lba >> 8) as u8;
                cdb.bytes[11] = (tf.lba >> 40) as u8;
                cdb.bytes[12] = (tf.lba >> 16) as u8;
                cdb.bytes[13] = tf.device;
                cdb.bytes[14] = tf.command;
                cdb
            }
            AtaEncoding::Sat32 => {
                let mut cdb = Cdb::new(32);
                cdb.bytes[0] = opcode::VARIABLE_LENGTH_CDB;
                cdb.bytes[7] = 0x18;
                cdb.put_u16(8, opcode::SA_ATA_PASS_THROUGH_32);
                cdb.bytes[10] = self.protocol_byte();
                cdb.bytes[11] = self.transfer_byte();
                cdb.put_u16(12, 0);
                cdb.bytes[14..20].copy_from_slice(&tf.lba.to_be_bytes()[2..8]);
                cdb.put_u16(20, tf.feature);
                cdb.put_u16(22, tf.count);
                cdb.bytes[24] = tf.device;
                cdb.bytes[25] = tf.command;
                cdb
            }
            AtaEncoding::Legacy(vendor) => {
                let mut cdb = Cdb::new(16);
                cdb.bytes[0] = vendor.opcode();
                cdb.bytes[1] = match vendor {
                    LegacyVendor::Cypress => 0x24,
                    LegacyVendor::Prolific => 0x15,
                    _ => 0x00,
                };
                cdb.bytes[2] = match self.transfer_length() {
                    0 => 0x00,
                    _ if self.protocol.is_data_out() => 0x01,
                    _ => 0x02,
                };
                cdb.bytes[3] = self.sectors as u8;
                cdb.bytes[6] = tf.feature as u8;
                cdb.bytes[7] = tf.count as u8;
                cdb.bytes[8] = tf.lba as u8;
                cdb.bytes[9] = (tf.lba >> 8) as u8;
                cdb.bytes[10] = (tf.lba >> 16) as u8;
                cdb.bytes[11] = tf.device;
                cdb.bytes[12] = tf.command;
                cdb
            }
        }
    }
}

// =============================================================================
// NVME PASSTHROUGH REQUESTS
// =============================================================================

/// An NVMe admin command wrapped in a bridge vendor CDB
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NvmeRequest {
    /// Bridge family
    pub vendor: NvmeVendor,
    /// Admin opcode
    pub opcode: u8,
    /// Namespace id
    pub nsid: u32,
    /// Command dword 10
    pub cdw10: u32,
    /// Data-in length
    pub allocation: u32,
}

impl NvmeRequest {
    /// Identify controller through `vendor`'s tunnel
    pub fn identify_controller(vendor: NvmeVendor) -> Self {
        Self {
            vendor,
            opcode: nvme::admin::IDENTIFY,
            nsid: 0,
            cdw10: nvme::cns::CONTROLLER,
            allocation: nvme::IDENTIFY_CONTROLLER_LENGTH as u32,
        }
    }

    fn encode(&self) -> Cdb {
        match self.vendor {
            NvmeVendor::JMicron => {
                let mut cdb = Cdb::new(12);
                cdb.bytes[0] = 0xA1;
                cdb.bytes[1] = 0x82;
                cdb.bytes[3] = self.opcode;
                cdb.put_u32(4, self.allocation);
                cdb.put_u32(8, self.cdw10);
                cdb
            }
            NvmeVendor::AsMedia => {
                let mut cdb = Cdb::new(16);
                cdb.bytes[0] = 0xE6;
                cdb.bytes[1] = self.opcode;
                cdb.put_u32(4, self.nsid);
                cdb.put_u32(8, self.cdw10);
                cdb.put_u32(12, self.allocation);
                cdb
            }
            NvmeVendor::AsMediaBasic => {
                let mut cdb = Cdb::new(16);
                cdb.bytes[0] = 0xE6;
                cdb.bytes[1] = self.opcode;
                cdb.bytes[3] = self.cdw10 as u8;
                cdb.put_u32(7, self.nsid);
                cdb
            }
            NvmeVendor::Realtek => {
                let mut cdb = Cdb::new(16);
                cdb.bytes[0] = 0xE4;
                cdb.put_u16(1, self.allocation as u16);
                cdb.bytes[3] = self.opcode;
                cdb.bytes[4] = self.cdw10 as u8;
                cdb
            }
        }
    }
}

// =============================================================================
// COMMAND
// =============================================================================

/// Anything the probe engine can hand to a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Native SCSI
    Scsi(ScsiRequest),
    /// ATA through a passthrough wrapper
    Ata(AtaRequest),
    /// NVMe through a bridge vendor wrapper
    Nvme(NvmeRequest),
}

impl Command {
    /// Encode the CDB
    pub fn cdb(&self) -> Cdb {
        match self {
            Command::Scsi(r) => r.encode(),
            Command::Ata(r) => r.encode(),
            Command::Nvme(r) => r.encode(),
        }
    }

    /// Data phase direction
    pub fn direction(&self) -> DataDirection {
        match self {
            Command::Ata(r) if r.protocol.is_data_out() => DataDirection::Out,
            _ if self.transfer_length() == 0 => DataDirection::None,
            _ => DataDirection::In,
        }
    }

    /// Expected data phase length in bytes
    pub fn transfer_length(&self) -> usize {
        match self {
            Command::Scsi(r) => r.transfer_length(),
            Command::Ata(r) => r.transfer_length(),
            Command::Nvme(r) => r.allocation as usize,
        }
    }

    /// Payload for data-out commands
    pub fn data_out(&self) -> &[u8] {
        match self {
            Command::Ata(r) => &r.data_out,
            _ => &[],
        }
    }

    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Command::Scsi(r) => r.name(),
            Command::Ata(r) => match r.task_file.command {
                ata::command::IDENTIFY => "ATA IDENTIFY",
                ata::command::IDENTIFY_PACKET => "ATA IDENTIFY PACKET",
                ata::command::CHECK_POWER_MODE => "ATA CHECK POWER MODE",
                ata::command::SMART => "ATA SMART",
                ata::command::READ_LOG_EXT => "ATA READ LOG EXT",
                ata::command::WRITE_LOG_EXT => "ATA WRITE LOG EXT",
                ata::command::READ_DMA | ata::command::READ_DMA_EXT => "ATA READ DMA",
                ata::command::READ_SECTORS | ata::command::READ_SECTORS_EXT => "ATA READ SECTORS",
                ata::command::SET_MULTIPLE_MODE => "ATA SET MULTIPLE MODE",
                ata::command::READ_NATIVE_MAX | ata::command::READ_NATIVE_MAX_EXT => {
                    "ATA READ NATIVE MAX"
                }
                ata::command::ACCESSIBLE_MAX_ADDRESS => "ATA GET NATIVE MAX EXT",
                _ if r.protocol == AtaProtocol::ReturnResponseInfo => "ATA RETURN RESPONSE INFO",
                _ => "ATA NOP",
            },
            Command::Nvme(_) => "NVME IDENTIFY",
        }
    }
}

impl From<ScsiRequest> for Command {
    fn from(request: ScsiRequest) -> Self {
        Command::Scsi(request)
    }
}

impl From<AtaRequest> for Command {
    fn from(request: AtaRequest) -> Self {
        Command::Ata(request)
    }
}

impl From<NvmeRequest> for Command {
    fn from(request: NvmeRequest) -> Self {
        Command::Nvme(request)
    }
}

// =============================================================================
// TESTS
// =============================================================================
