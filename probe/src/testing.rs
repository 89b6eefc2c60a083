//! Scriptable device simulator for component and scenario tests.
//!
//! [`MockDevice`] answers commands the way a SCSI target behind a
//! configurable translator would. Every field is public so a test can turn
//! one behaviour off and watch the probe engine react.

use alloc::collections::BTreeMap;
use alloc::vec;
use alloc::vec::Vec;
use core::time::Duration;

use bridgeprobe_hal::ata::{self, AtaRegisters};
use bridgeprobe_hal::{
    AtaEncoding, AtaProtocol, AtaRequest, CdbSize, Command, CommandResult, LegacyVendor, ModeForm,
    NvmeVendor, PassthroughFlags, ReportOptions, ReturnStatus, ScsiRequest, Transport,
};

// =============================================================================
// BYTE BUILDERS
// =============================================================================

/// Fixed-format sense
pub fn sense_fixed(key: u8, asc: u8, ascq: u8) -> Vec<u8> {
    let mut raw = vec![0u8; 18];
    raw[0] = 0x70;
    raw[2] = key;
    raw[7] = 10;
    raw[12] = asc;
    raw[13] = ascq;
    raw
}

/// Descriptor sense carrying an ATA Status Return descriptor
pub fn sense_with_registers(key: u8, r: &AtaRegisters) -> Vec<u8> {
    vec![
        0x72,
        key,
        0x00,
        0x1D,
        0,
        0,
        0,
        14,
        0x09,
        0x0C,
        r.extend as u8,
        r.error,
        (r.count >> 8) as u8,
        r.count as u8,
        (r.lba >> 24) as u8,
        r.lba as u8,
        (r.lba >> 32) as u8,
        (r.lba >> 8) as u8,
        (r.lba >> 40) as u8,
        (r.lba >> 16) as u8,
        r.device,
        r.status,
    ]
}

/// VPD page with header
pub fn vpd_page(page: u8, body: &[u8]) -> Vec<u8> {
    let mut out = vec![0x00, page];
    out.extend_from_slice(&(body.len() as u16).to_be_bytes());
    out.extend_from_slice(body);
    out
}

/// Mode page (page_0 or sub_page format)
pub fn mode_page(page: u8, subpage: u8, body: &[u8]) -> Vec<u8> {
    let mut out = if subpage == 0 {
        vec![page, body.len() as u8]
    } else {
        let mut v = vec![0x40 | page, subpage];
        v.extend_from_slice(&(body.len() as u16).to_be_bytes());
        v
    };
    out.extend_from_slice(body);
    out
}

/// Log page built from (parameter code, value) pairs
pub fn log_page(page: u8, subpage: u8, params: &[(u16, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (code, value) in params {
        body.extend_from_slice(&code.to_be_bytes());
        body.push(0x03);
        body.push(value.len() as u8);
        body.extend_from_slice(value);
    }
    let b0 = if subpage == 0 { page } else { 0x40 | page };
    let mut out = vec![b0, subpage];
    out.extend_from_slice(&(body.len() as u16).to_be_bytes());
    out.extend_from_slice(&body);
    out
}

/// Standard inquiry data
pub fn inquiry_data(vendor: &str, product: &str, revision: &str, version: u8, kind: u8) -> Vec<u8> {
    let mut data = vec![b' '; 96];
    data[0] = kind;
    data[1] = 0;
    data[2] = version;
    data[3] = 0x02;
    data[4] = 91;
    data[5..8].copy_from_slice(&[0, 0, 0]);
    data[8..8 + vendor.len()].copy_from_slice(vendor.as_bytes());
    data[16..16 + product.len()].copy_from_slice(product.as_bytes());
    data[32..32 + revision.len()].copy_from_slice(revision.as_bytes());
    data
}

/// READ CAPACITY (10) data
pub fn capacity10(last_lba: u32, block_size: u32) -> Vec<u8> {
    let mut out = last_lba.to_be_bytes().to_vec();
    out.extend_from_slice(&block_size.to_be_bytes());
    out
}

/// READ CAPACITY (16) data
pub fn capacity16(last_lba: u64, block_size: u32) -> Vec<u8> {
    let mut out = vec![0u8; 32];
    out[0..8].copy_from_slice(&last_lba.to_be_bytes());
    out[8..12].copy_from_slice(&block_size.to_be_bytes());
    out
}

/// NVMe identify controller data
pub fn nvme_identify(model: &str, mdts: u8) -> Vec<u8> {
    let mut data = vec![0u8; 4096];
    data[0..2].copy_from_slice(&0x144Du16.to_le_bytes());
    data[4..12].copy_from_slice(b"S4EWNX0R");
    data[24..24 + model.len()].copy_from_slice(model.as_bytes());
    data[64..72].copy_from_slice(b"2B2QEXE7");
    data[77] = mdts;
    data
}

/// IDENTIFY DEVICE data builder
#[derive(Debug, Clone)]
pub struct IdentifyBuilder {
    /// Model number
    pub model: &'static str,
    /// Serial number
    pub serial: &'static str,
    /// Firmware revision
    pub firmware: &'static str,
    /// Highest LBA
    pub max_lba: u64,
    /// 48-bit feature set
    pub lba48: bool,
    /// SMART
    pub smart: bool,
    /// General purpose logging
    pub gpl: bool,
    /// HPA feature set
    pub hpa: bool,
    /// Accessible max address configuration
    pub amac: bool,
    /// DMA
    pub dma: bool,
    /// World wide name
    pub wwn: Option<u64>,
    /// Word 47 maximum
    pub max_multiple: u8,
    /// Word 59 current setting
    pub current_multiple: u8,
    /// Word 217
    pub rotation: u16,
    /// Word 168
    pub form_factor: u16,
}

impl IdentifyBuilder {
    /// A 2 TB 3.5" desktop drive
    pub fn desktop() -> Self {
        Self {
            model: "ST2000DM008-2FR102",
            serial: "ZFL0ABCD",
            firmware: "0001",
            max_lba: 3_907_029_167,
            lba48: true,
            smart: true,
            gpl: true,
            hpa: true,
            amac: false,
            dma: true,
            wwn: Some(0x5000_C500_1234_5678),
            max_multiple: 16,
            current_multiple: 16,
            rotation: 7200,
            form_factor: 2,
        }
    }

    fn put_string(words: &mut [u16; 256], first: usize, count: usize, text: &str) {
        let mut bytes = vec![b' '; count * 2];
        bytes[..text.len()].copy_from_slice(text.as_bytes());
        for i in 0..count {
            words[first + i] = (bytes[2 * i] as u16) << 8 | bytes[2 * i + 1] as u16;
        }
    }

    /// Encode 512 bytes
    pub fn build(&self) -> Vec<u8> {
        let mut w = [0u16; 256];
        w[0] = 0x0040;
        Self::put_string(&mut w, 10, 10, self.serial);
        Self::put_string(&mut w, 23, 4, self.firmware);
        Self::put_string(&mut w, 27, 20, self.model);
        w[47] = 0x8000 | self.max_multiple as u16;
        w[49] = 1 << 9 | (self.dma as u16) << 8;
        if self.current_multiple != 0 {
            w[59] = 0x0100 | self.current_multiple as u16;
        }
        let sectors = self.max_lba + 1;
        let lba28 = sectors.min(0x0FFF_FFFF) as u32;
        w[60] = lba28 as u16;
        w[61] = (lba28 >> 16) as u16;
        w[82] = self.smart as u16 | (self.hpa as u16) << 10;
        w[83] = 0x4000 | (self.lba48 as u16) << 10;
        let w84 = 0x4000 | (self.gpl as u16) << 5 | (self.wwn.is_some() as u16) << 8;
        w[84] = w84;
        w[87] = w84;
        if self.dma {
            w[88] = 0x007F;
        }
        if self.lba48 {
            for i in 0..4 {
                w[100 + i] = (sectors >> (16 * i)) as u16;
            }
        }
        if let Some(wwn) = self.wwn {
            for i in 0..4 {
                w[108 + i] = (wwn >> (48 - 16 * i)) as u16;
            }
        }
        w[119] = 0x4000 | (self.amac as u16) << 8;
        w[168] = self.form_factor;
        w[217] = self.rotation;
        w.iter().flat_map(|word| word.to_le_bytes()).collect()
    }
}

/// ATA information VPD page around an identify block
pub fn ata_information_page(vendor: &str, product: &str, revision: &str, identify: &[u8]) -> Vec<u8> {
    let mut body = vec![0u8; 568];
    body[4..12].fill(b' ');
    body[4..4 + vendor.len()].copy_from_slice(vendor.as_bytes());
    body[12..28].fill(b' ');
    body[12..12 + product.len()].copy_from_slice(product.as_bytes());
    body[28..32].fill(b' ');
    body[28..28 + revision.len()].copy_from_slice(revision.as_bytes());
    body[52] = ata::command::IDENTIFY;
    body[56..568].copy_from_slice(&identify[..512]);
    vpd_page(0x89, &body)
}

// =============================================================================
// MOCK DEVICE
// =============================================================================

/// A canned answer for commands matching a predicate; checked first
#[derive(Debug, Clone)]
pub struct Override {
    /// Predicate
    pub matches: fn(&Command) -> bool,
    /// Answer
    pub result: CommandResult,
}

/// CK_COND behaviour of the simulated translator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CkCondSim {
    /// Registers for every protocol
    Always,
    /// Registers for non-data commands only
    NonDataOnly,
    /// Check condition with zeroed registers
    Empty,
    /// CK_COND rejected
    Disabled,
}

/// SECURITY PROTOCOL IN behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecuritySim {
    /// Invalid opcode
    Unsupported,
    /// Byte allocations
    Supported,
    /// INC_512 only
    Inc512Only,
}

/// REPORT SUPPORTED OPERATION CODES behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpcodesSim {
    /// Invalid opcode
    None,
    /// One command at a time
    SingleOnly,
    /// Full list
    All,
}

/// Simulated device behind a simulated translator.
#[derive(Debug, Clone)]
pub struct MockDevice {
    /// Standard inquiry
    pub inquiry: Vec<u8>,
    /// READ CAPACITY (10), `None` = invalid opcode
    pub capacity10: Option<Vec<u8>>,
    /// READ CAPACITY (16), `None` = invalid opcode
    pub capacity16: Option<Vec<u8>>,
    /// VPD pages by code, page 00h excluded
    pub vpd: BTreeMap<u8, Vec<u8>>,
    /// Page 00h answers
    pub vpd_directory: bool,
    /// Mode pages by (page, subpage), page bytes only
    pub mode_pages: BTreeMap<(u8, u8), Vec<u8>>,
    /// MODE SENSE (6) works
    pub mode6: bool,
    /// MODE SENSE (10) works
    pub mode10: bool,
    /// Subpage codes are honoured
    pub mode_subpages: bool,
    /// LOG SENSE works
    pub log_supported: bool,
    /// Log subpage codes are honoured
    pub log_subpages: bool,
    /// Log pages by (page, subpage), full page bytes
    pub log_pages: BTreeMap<(u8, u8), Vec<u8>>,
    /// Working read CDB sizes
    pub read_sizes: Vec<CdbSize>,
    /// Zero-length reads succeed
    pub zero_length_reads: bool,
    /// Largest read, in blocks
    pub max_read_blocks: u32,
    /// SECURITY PROTOCOL IN behaviour
    pub security: SecuritySim,
    /// REPORT SUPPORTED OPERATION CODES behaviour
    pub opcodes: OpcodesSim,
    /// ATA PASS-THROUGH (12) works
    pub sat12: bool,
    /// ATA PASS-THROUGH (16) works
    pub sat16: bool,
    /// ATA PASS-THROUGH (16) works for 48-bit commands only
    pub sat16_ext_only: bool,
    /// ATA PASS-THROUGH (32) works
    pub sat32: bool,
    /// Legacy vendor passthrough
    pub legacy: Option<LegacyVendor>,
    /// NVMe bridge passthrough
    pub nvme: Option<NvmeVendor>,
    /// NVMe identify controller payload
    pub nvme_identify: Vec<u8>,
    /// IDENTIFY DEVICE payload, empty = aborts
    pub identify: Vec<u8>,
    /// IDENTIFY PACKET DEVICE payload
    pub identify_packet: Option<Vec<u8>>,
    /// DMA protocol works
    pub dma: bool,
    /// UDMA protocol works
    pub udma: bool,
    /// CK_COND behaviour
    pub ck_cond: CkCondSim,
    /// Return-response-info with T_DIR works
    pub rri_tdir: bool,
    /// Return-response-info with T_DIR clear works
    pub rri_plain: bool,
    /// Return-response-info with T_DIR clear hangs
    pub rri_plain_hangs: bool,
    /// Extend bit set on 48-bit results
    pub extend_bit_reported: bool,
    /// Upper LBA bytes returned at all
    pub upper_lba_returned: bool,
    /// Native max address
    pub native_max: u64,
    /// TPSIU transfer length form accepted
    pub tpsiu_accepted: bool,
    /// Only the TPSIU form works for data transfers
    pub tpsiu_required: bool,
    /// Largest ATA read, in sectors
    pub max_ata_sectors: u16,
    /// Multi-sector PIO corrupts unless multiple mode equals this
    pub pio_needs_multiple: Option<u8>,
    /// Current multiple mode
    pub multiple_mode: u8,
    /// General purpose log directory
    pub gpl_directory: Vec<u8>,
    /// Host specific log contents
    pub host_logs: BTreeMap<u8, Vec<u8>>,
    /// Latency of ordinary commands
    pub baseline_latency: Duration,
    /// Latency of the n-th unsupported command (last entry repeats)
    pub unsupported_latency: Vec<Duration>,
    /// Unsupported commands time out
    pub unsupported_hang: bool,
    /// Canned answers
    pub overrides: Vec<Override>,
    /// Every command received
    pub log: Vec<Command>,
    /// Recovery calls
    pub recoveries: u32,
    /// Delay calls
    pub delays: Vec<Duration>,
    /// SET MULTIPLE MODE calls
    pub set_multiple_calls: u32,
    unsupported_seen: usize,
    last_registers: AtaRegisters,
}

const KEY_RECOVERED: u8 = 0x01;
const KEY_ILLEGAL_REQUEST: u8 = 0x05;
const KEY_ABORTED_COMMAND: u8 = 0x0B;

impl MockDevice {
    /// A modern SAT bridge in front of a healthy 2 TB ATA disk
    pub fn sat_disk() -> Self {
        let identify = IdentifyBuilder::desktop().build();
        let mut vpd = BTreeMap::new();
        vpd.insert(0x80, vpd_page(0x80, b"ZFL0ABCD"));
        let mut dev_id = vec![0x02, 0x01, 0x00, 0x08];
        dev_id.extend_from_slice(b"ATA     ");
        dev_id.extend_from_slice(&[0x01, 0x03, 0x00, 0x08]);
        dev_id.extend_from_slice(&0x5000_C500_1234_5678u64.to_be_bytes());
        vpd.insert(0x83, vpd_page(0x83, &dev_id));
        vpd.insert(0x89, ata_information_page("LINUX", "libata", "3.00", &identify));
        let mut limits = vec![0u8; 60];
        limits[4..8].copy_from_slice(&0xFFFFu32.to_be_bytes());
        vpd.insert(0xB0, vpd_page(0xB0, &limits));
        let mut chars = vec![0u8; 60];
        chars[0..2].copy_from_slice(&7200u16.to_be_bytes());
        chars[3] = 0x02;
        vpd.insert(0xB1, vpd_page(0xB1, &chars));

        let mut mode_pages = BTreeMap::new();
        mode_pages.insert((0x01, 0), mode_page(0x01, 0, &[0xC0, 0, 0, 0, 0, 0, 0, 0, 0, 0]));
        mode_pages.insert(
            (0x08, 0),
            mode_page(0x08, 0, &[0x04, 0, 0xFF, 0xFF, 0, 0, 0xFF, 0xFF, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]),
        );
        mode_pages.insert((0x0A, 0), mode_page(0x0A, 0, &[0x02, 0, 0, 0, 0, 0, 0, 0, 0, 0]));
        mode_pages.insert((0x1C, 0), mode_page(0x1C, 0, &[0x00, 0x06, 0, 0, 0, 0, 0, 0, 0, 0]));

        let mut log_pages = BTreeMap::new();
        log_pages.insert((0x0D, 0), log_page(0x0D, 0, &[(0x0000, &[0, 35]), (0x0001, &[0, 60])]));
        log_pages.insert(
            (0x0E, 0),
            log_page(
                0x0E,
                0,
                &[(0x0003, &50_000u32.to_be_bytes()), (0x0004, &1_234u32.to_be_bytes())],
            ),
        );
        log_pages.insert((0x2F, 0), log_page(0x2F, 0, &[(0x0000, &[0, 0, 36])]));
        let mut entry = [0u8; 16];
        entry[0] = 0x10;
        log_pages.insert(
            (0x10, 0),
            log_page(0x10, 0, &[(0x0001, &entry), (0x0002, &entry), (0x0003, &[0u8; 16])]),
        );

        let mut gpl_directory = vec![0u8; 512];
        gpl_directory[0] = 0x01;
        gpl_directory[0x80 * 2] = 0x10;

        Self {
            inquiry: inquiry_data("ATA", "ST2000DM008-2FR1", "0001", 6, 0x00),
            capacity10: Some(capacity10(3_907_029_167, 512)),
            capacity16: Some(capacity16(3_907_029_167, 512)),
            vpd,
            vpd_directory: true,
            mode_pages,
            mode6: true,
            mode10: true,
            mode_subpages: true,
            log_supported: true,
            log_subpages: true,
            log_pages,
            read_sizes: CdbSize::ALL.to_vec(),
            zero_length_reads: true,
            max_read_blocks: 256,
            security: SecuritySim::Supported,
            opcodes: OpcodesSim::All,
            sat12: true,
            sat16: true,
            sat16_ext_only: false,
            sat32: false,
            legacy: None,
            nvme: None,
            nvme_identify: Vec::new(),
            identify,
            identify_packet: None,
            dma: true,
            udma: true,
            ck_cond: CkCondSim::Always,
            rri_tdir: true,
            rri_plain: false,
            rri_plain_hangs: false,
            extend_bit_reported: true,
            upper_lba_returned: true,
            native_max: 3_907_029_167,
            tpsiu_accepted: true,
            tpsiu_required: false,
            max_ata_sectors: 256,
            pio_needs_multiple: None,
            multiple_mode: 16,
            gpl_directory,
            host_logs: BTreeMap::new(),
            baseline_latency: Duration::from_millis(1),
            unsupported_latency: vec![Duration::from_millis(1)],
            unsupported_hang: false,
            overrides: Vec::new(),
            log: Vec::new(),
            recoveries: 0,
            delays: Vec::new(),
            set_multiple_calls: 0,
            unsupported_seen: 0,
            last_registers: AtaRegisters::default(),
        }
    }

    /// A USB bridge that only speaks plain SCSI
    pub fn scsi_only() -> Self {
        Self {
            inquiry: inquiry_data("Generic", "Flash Disk", "8.07", 4, 0x00),
            sat12: false,
            sat16: false,
            identify: Vec::new(),
            ..Self::sat_disk()
        }
    }

    /// Commands received that match a predicate
    pub fn count(&self, pred: impl Fn(&Command) -> bool) -> usize {
        self.log.iter().filter(|c| pred(c)).count()
    }

    fn illegal(asc: u8) -> CommandResult {
        CommandResult::check_condition(sense_fixed(KEY_ILLEGAL_REQUEST, asc, 0))
    }

    fn scsi(&mut self, request: &ScsiRequest) -> CommandResult {
        match *request {
            ScsiRequest::TestUnitReady => CommandResult::success(Vec::new()),
            ScsiRequest::Inquiry { evpd: false, .. } => CommandResult::success(self.inquiry.clone()),
            ScsiRequest::Inquiry { page: 0, .. } => {
                if !self.vpd_directory {
                    return Self::illegal(0x24);
                }
                let mut list = vec![0x00];
                list.extend(self.vpd.keys().copied());
                CommandResult::success(vpd_page(0x00, &list))
            }
            ScsiRequest::Inquiry { page, .. } => match self.vpd.get(&page) {
                Some(data) => CommandResult::success(data.clone()),
                None => Self::illegal(0x24),
            },
            ScsiRequest::ReadCapacity10 => match &self.capacity10 {
                Some(data) => CommandResult::success(data.clone()),
                None => Self::illegal(0x20),
            },
            ScsiRequest::ReadCapacity16 { .. } => match &self.capacity16 {
                Some(data) => CommandResult::success(data.clone()),
                None => Self::illegal(0x20),
            },
            ScsiRequest::Read {
                size,
                blocks,
                block_size,
                ..
            } => {
                if !self.read_sizes.contains(&size) {
                    return Self::illegal(0x20);
                }
                if blocks == 0 && size != CdbSize::Six && !self.zero_length_reads {
                    return Self::illegal(0x24);
                }
                if blocks > self.max_read_blocks {
                    return Self::illegal(0x24);
                }
                // One block is enough for the engine; it never inspects read data.
                let len = if blocks == 0 { 0 } else { block_size as usize };
                CommandResult::success(vec![0u8; len])
            }
            ScsiRequest::ModeSense {
                form,
                page,
                subpage,
                ..
            } => {
                let works = match form {
                    ModeForm::Six => self.mode6,
                    ModeForm::Ten => self.mode10,
                };
                if !works {
                    return Self::illegal(0x20);
                }
                let key = if subpage != 0 && !self.mode_subpages {
                    (page, 0)
                } else {
                    (page, subpage)
                };
                let Some(body) = self.mode_pages.get(&key) else {
                    return Self::illegal(0x24);
                };
                let mut out = match form {
                    ModeForm::Six => vec![(3 + body.len()) as u8, 0, 0, 0],
                    ModeForm::Ten => {
                        let mut h = vec![0u8; 8];
                        h[0..2].copy_from_slice(&((6 + body.len()) as u16).to_be_bytes());
                        h
                    }
                };
                out.extend_from_slice(body);
                CommandResult::success(out)
            }
            ScsiRequest::LogSense { page, subpage, .. } => {
                if !self.log_supported {
                    return Self::illegal(0x20);
                }
                let directory = || {
                    let mut pages = vec![0x00];
                    for (p, _) in self.log_pages.keys() {
                        if !pages.contains(p) {
                            pages.push(*p);
                        }
                    }
                    let mut out = vec![0x00, 0x00];
                    out.extend_from_slice(&(pages.len() as u16).to_be_bytes());
                    out.extend_from_slice(&pages);
                    out
                };
                match (page, subpage) {
                    (0, 0) => CommandResult::success(directory()),
                    (0, 0xFF) if !self.log_subpages => CommandResult::success(directory()),
                    (0, 0xFF) => {
                        let mut pairs = vec![0x00, 0x00, 0x00, 0xFF];
                        for (p, s) in self.log_pages.keys() {
                            pairs.push(*p);
                            pairs.push(*s);
                        }
                        let mut out = vec![0x40, 0xFF];
                        out.extend_from_slice(&(pairs.len() as u16).to_be_bytes());
                        out.extend_from_slice(&pairs);
                        CommandResult::success(out)
                    }
                    _ => {
                        let key = if self.log_subpages {
                            (page, subpage)
                        } else {
                            (page, 0)
                        };
                        match self.log_pages.get(&key) {
                            Some(data) => CommandResult::success(data.clone()),
                            None => Self::illegal(0x24),
                        }
                    }
                }
            }
            ScsiRequest::SecurityProtocolIn { inc512, .. } => {
                let list = vec![0, 0, 0, 0, 0, 0, 0, 2, 0x00, 0x01];
                match self.security {
                    SecuritySim::Unsupported => Self::illegal(0x20),
                    SecuritySim::Inc512Only if !inc512 => Self::illegal(0x24),
                    _ => CommandResult::success(list),
                }
            }
            ScsiRequest::ReportSupportedOperationCodes { options, .. } => {
                match (self.opcodes, options) {
                    (OpcodesSim::None, _) => Self::illegal(0x20),
                    (OpcodesSim::SingleOnly, ReportOptions::All) => Self::illegal(0x24),
                    (_, ReportOptions::OneCommand) => {
                        CommandResult::success(vec![0, 0x03, 0, 10, 0x28, 0xFF, 0xFF, 0xFF])
                    }
                    (_, ReportOptions::All) => {
                        let mut out = vec![0, 0, 0, 16];
                        out.extend_from_slice(&[0x28, 0, 0, 0, 0, 0, 0, 10]);
                        out.extend_from_slice(&[0x88, 0, 0, 0, 0, 0, 0, 16]);
                        CommandResult::success(out)
                    }
                }
            }
        }
    }

    fn registers(&self, r: AtaRegisters) -> AtaRegisters {
        if self.upper_lba_returned {
            r
        } else {
            AtaRegisters {
                lba: r.lba & 0x00FF_FFFF,
                ..r
            }
        }
    }

    fn aborted(&mut self, elapsed: Duration) -> CommandResult {
        let regs = AtaRegisters {
            status: ata::status::DRDY | ata::status::ERR,
            error: ata::error::ABRT,
            ..AtaRegisters::default()
        };
        self.last_registers = regs;
        CommandResult::check_condition(sense_with_registers(KEY_ABORTED_COMMAND, &regs))
            .with_elapsed(elapsed)
    }

    fn ata(&mut self, req: &AtaRequest) -> CommandResult {
        let tf = req.task_file;
        let ext = tf.is_48bit();
        let accepted = match req.encoding {
            AtaEncoding::Sat12 if ext && self.sat12 => return Self::illegal(0x24),
            AtaEncoding::Sat12 => self.sat12,
            AtaEncoding::Sat16 => self.sat16 || (self.sat16_ext_only && ext),
            AtaEncoding::Sat32 => self.sat32,
            AtaEncoding::Legacy(vendor) => self.legacy == Some(vendor),
        };
        if !accepted {
            return Self::illegal(0x20);
        }
        let has_data = req.protocol.is_data_in() || req.protocol.is_data_out();
        if req.flags.contains(PassthroughFlags::TPSIU) && !self.tpsiu_accepted {
            return Self::illegal(0x24);
        }
        if has_data && self.tpsiu_required && !req.flags.contains(PassthroughFlags::TPSIU) {
            return Self::illegal(0x24);
        }
        let ck_cond = req.flags.contains(PassthroughFlags::CHECK_CONDITION);
        if ck_cond && self.ck_cond == CkCondSim::Disabled {
            return Self::illegal(0x24);
        }

        if req.protocol == AtaProtocol::ReturnResponseInfo {
            let tdir = req.flags.contains(PassthroughFlags::TDIR_COMPAT);
            if tdir && self.rri_tdir || !tdir && self.rri_plain {
                let regs = self.last_registers;
                return CommandResult::check_condition(sense_with_registers(KEY_RECOVERED, &regs));
            }
            if !tdir && self.rri_plain_hangs {
                return CommandResult::status(ReturnStatus::Timeout);
            }
            return Self::illegal(0x24);
        }

        let sectors = match tf.count {
            0 if ext => 65536u32,
            0 => 256,
            n => n as u32,
        };
        let mut result_lba = tf.lba;
        let mut data = Vec::new();
        match tf.command {
            ata::command::IDENTIFY => {
                if self.identify.is_empty() {
                    return self.aborted(self.baseline_latency);
                }
                data = self.identify.clone();
            }
            ata::command::IDENTIFY_PACKET => match &self.identify_packet {
                Some(packet) => data = packet.clone(),
                None => return self.aborted(self.baseline_latency),
            },
            ata::command::CHECK_POWER_MODE => {}
            ata::command::SMART => match tf.feature as u8 {
                ata::smart::READ_DATA => data = vec![0x01; 512],
                ata::smart::READ_LOG => data = vec![0u8; req.sectors as usize * 512],
                _ => return self.aborted(self.baseline_latency),
            },
            ata::command::READ_LOG_EXT => {
                let address = tf.lba as u8;
                let len = req.sectors as usize * 512;
                data = if address == ata::log_address::DIRECTORY {
                    self.gpl_directory.clone()
                } else {
                    self.host_logs.get(&address).cloned().unwrap_or_default()
                };
                data.resize(len, 0);
                if let Some(needed) = self.pio_needs_multiple {
                    if self.multiple_mode != needed && req.sectors > 1 {
                        for b in &mut data[512..] {
                            *b ^= 0xFF;
                        }
                    }
                }
            }
            ata::command::WRITE_LOG_EXT => {
                self.host_logs.insert(tf.lba as u8, req.data_out.clone());
            }
            ata::command::READ_DMA | ata::command::READ_DMA_EXT => {
                let works = match req.protocol {
                    AtaProtocol::Dma => self.dma,
                    AtaProtocol::UdmaIn => self.udma,
                    _ => false,
                };
                if !works || sectors > self.max_ata_sectors as u32 {
                    return self.aborted(self.baseline_latency);
                }
                data = vec![0u8; 512];
            }
            ata::command::READ_SECTORS | ata::command::READ_SECTORS_EXT => {
                if sectors > self.max_ata_sectors as u32 {
                    return self.aborted(self.baseline_latency);
                }
                data = vec![0u8; 512];
            }
            ata::command::SET_MULTIPLE_MODE => {
                self.multiple_mode = tf.count as u8;
                self.set_multiple_calls += 1;
            }
            ata::command::READ_NATIVE_MAX => result_lba = self.native_max & 0x0FFF_FFFF,
            ata::command::READ_NATIVE_MAX_EXT | ata::command::ACCESSIBLE_MAX_ADDRESS => {
                result_lba = self.native_max
            }
            _ => {
                let n = self.unsupported_seen;
                self.unsupported_seen += 1;
                if self.unsupported_hang {
                    return CommandResult::status(ReturnStatus::Timeout);
                }
                let latency = self
                    .unsupported_latency
                    .get(n)
                    .or(self.unsupported_latency.last())
                    .copied()
                    .unwrap_or(self.baseline_latency);
                return self.aborted(latency);
            }
        }

        let regs = self.registers(AtaRegisters {
            error: 0,
            count: tf.count,
            lba: result_lba,
            device: tf.device,
            status: ata::status::DRDY | 0x10,
            extend: ext && self.extend_bit_reported,
        });
        self.last_registers = regs;

        let data_protocol = has_data;
        let result = if !ck_cond {
            CommandResult::success(data)
        } else {
            match self.ck_cond {
                CkCondSim::NonDataOnly if data_protocol => CommandResult::success(data),
                CkCondSim::Empty => CommandResult {
                    data,
                    ..CommandResult::check_condition(sense_with_registers(
                        KEY_RECOVERED,
                        &AtaRegisters::default(),
                    ))
                },
                _ => CommandResult {
                    data,
                    ..CommandResult::check_condition(sense_with_registers(KEY_RECOVERED, &regs))
                },
            }
        };
        result.with_elapsed(self.baseline_latency)
    }
}

impl Transport for MockDevice {
    fn issue(&mut self, command: &Command) -> CommandResult {
        self.log.push(command.clone());
        if let Some(o) = self.overrides.iter().find(|o| (o.matches)(command)) {
            return o.result.clone();
        }
        let mut result = match command {
            Command::Scsi(request) => {
                let r = self.scsi(request);
                r.with_elapsed(self.baseline_latency)
            }
            Command::Ata(request) => self.ata(request),
            Command::Nvme(request) => {
                if self.nvme == Some(request.vendor) {
                    CommandResult::success(self.nvme_identify.clone())
                } else {
                    Self::illegal(0x20)
                }
            }
        };
        result.data.truncate(command.transfer_length());
        result
    }

    fn recover(&mut self) {
        self.recoveries += 1;
    }

    fn delay(&mut self, duration: Duration) {
        self.delays.push(duration);
    }
}

/// Whether a command is an ATA command with this opcode
pub fn is_ata(command: &Command, opcode: u8) -> bool {
    matches!(command, Command::Ata(r) if r.task_file.command == opcode
        && r.protocol != AtaProtocol::ReturnResponseInfo)
}
