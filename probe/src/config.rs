//! Probe configuration.
//!
//! Every empirical threshold the detectors use lives here as a named
//! constant, and every risky or slow probe group is opt-in through
//! [`ProbeOptions`].

use bitflags::bitflags;
use core::time::Duration;
use static_assertions::const_assert;

// =============================================================================
// THRESHOLDS
// =============================================================================

/// Unsupported-command latency above this multiple of the baseline is slow
pub const LATENCY_RATIO_THRESHOLD: u32 = 3;

/// Known-good commands averaged for the latency baseline
pub const BASELINE_COMMANDS: u32 = 3;

/// Deliberately unsupported commands issued by the latency test
pub const UNSUPPORTED_REPETITIONS: u32 = 10;

/// Total time the latency test may spend on unsupported commands
pub const UNSUPPORTED_TIME_BUDGET: Duration = Duration::from_secs(30);

/// Severity cap for ratio-derived severities
pub const SEVERITY_RATIO_CAP: u8 = 99;

/// Severity recorded when an unsupported command times out
pub const SEVERITY_TIMEOUT: u8 = 100;

/// Severity recorded when an unsupported command "succeeds" with empty registers
pub const SEVERITY_ZERO_RESULT: u8 = 1;

/// Warning delay before legacy vendor passthrough trials
pub const LEGACY_WARNING_DELAY: Duration = Duration::from_secs(30);

/// Hard cap on the max-transfer search, in blocks
pub const MAX_TRANSFER_CAP_BLOCKS: u32 = 4096;

/// The max-transfer search doubles until this many bytes, then steps by one block
pub const DOUBLING_LIMIT_BYTES: u32 = 32 * 1024;

/// Sectors written by the multi-sector PIO test
pub const PIO_TEST_SECTORS: u16 = 8;

const_assert!(LATENCY_RATIO_THRESHOLD > 1);
const_assert!(BASELINE_COMMANDS > 0);
const_assert!(UNSUPPORTED_REPETITIONS >= BASELINE_COMMANDS);
const_assert!(SEVERITY_RATIO_CAP < SEVERITY_TIMEOUT);
const_assert!(DOUBLING_LIMIT_BYTES % 512 == 0);
const_assert!(MAX_TRANSFER_CAP_BLOCKS * 512 > DOUBLING_LIMIT_BYTES);
const_assert!(PIO_TEST_SECTORS > 1);

// =============================================================================
// OPTIONS
// =============================================================================

bitflags! {
    /// Opt-in probe groups
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ProbeOptions: u32 {
        /// Try legacy vendor passthrough CDBs (can brick or hang some bridges)
        const HIGH_RISK_LEGACY = 1 << 0;
        /// Retry return-response-info with T_DIR cleared (hangs some bridges)
        const HANG_RISK_RTFR = 1 << 1;
        /// Repeat reads with a zero transfer length
        const ZERO_LENGTH_RW = 1 << 2;
        /// Try upgrading to ATA PASS-THROUGH (32)
        const SAT_32_BYTE = 1 << 3;
        /// Measure error-handling latency
        const ERROR_LATENCY = 1 << 4;
        /// Search for the maximum transfer length
        const MAX_TRANSFER = 1 << 5;
        /// Write a host-specific log page for the multi-sector PIO test
        const PIO_WRITE = 1 << 6;
    }
}

impl ProbeOptions {
    /// Everything except the hang-prone and high-risk groups
    pub const DEFAULT: Self = Self::ZERO_LENGTH_RW
        .union(Self::SAT_32_BYTE)
        .union(Self::ERROR_LATENCY)
        .union(Self::MAX_TRANSFER)
        .union(Self::PIO_WRITE);
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self::DEFAULT
    }
}

// =============================================================================
// CONFIG
// =============================================================================

/// Probe run configuration
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Enabled probe groups
    pub options: ProbeOptions,
    /// Return a stored profile without probing
    pub trust_stored_profile: bool,
    /// Latency ratio threshold
    pub latency_ratio_threshold: u32,
    /// Baseline command count
    pub baseline_commands: u32,
    /// Unsupported command repetitions
    pub unsupported_repetitions: u32,
    /// Time budget for unsupported commands
    pub unsupported_time_budget: Duration,
    /// Delay before legacy vendor trials
    pub legacy_warning_delay: Duration,
    /// Max-transfer cap in blocks
    pub max_transfer_cap_blocks: u32,
    /// Max-transfer doubling limit in bytes
    pub doubling_limit_bytes: u32,
    /// Sectors in the PIO test pattern
    pub pio_test_sectors: u16,
    /// Seed for the PIO test pattern
    pub seed: u64,
}

impl ProbeConfig {
    /// Create default configuration
    pub fn new() -> Self {
        Self {
            options: ProbeOptions::DEFAULT,
            trust_stored_profile: false,
            latency_ratio_threshold: LATENCY_RATIO_THRESHOLD,
            baseline_commands: BASELINE_COMMANDS,
            unsupported_repetitions: UNSUPPORTED_REPETITIONS,
            unsupported_time_budget: UNSUPPORTED_TIME_BUDGET,
            legacy_warning_delay: LEGACY_WARNING_DELAY,
            max_transfer_cap_blocks: MAX_TRANSFER_CAP_BLOCKS,
            doubling_limit_bytes: DOUBLING_LIMIT_BYTES,
            pio_test_sectors: PIO_TEST_SECTORS,
            seed: 0x2545_F491_4F6C_DD1D,
        }
    }

    /// Replace the enabled probe groups
    pub fn options(mut self, options: ProbeOptions) -> Self {
        self.options = options;
        self
    }

    /// Enable extra probe groups
    pub fn enable(mut self, options: ProbeOptions) -> Self {
        self.options |= options;
        self
    }

    /// Disable probe groups
    pub fn disable(mut self, options: ProbeOptions) -> Self {
        self.options &= !options;
        self
    }

    /// Trust a stored profile when one exists
    pub fn trust_stored_profile(mut self, trust: bool) -> Self {
        self.trust_stored_profile = trust;
        self
    }

    /// Cap the max-transfer search
    pub fn max_transfer_cap_blocks(mut self, blocks: u32) -> Self {
        self.max_transfer_cap_blocks = blocks.max(1);
        self
    }

    /// Seed the PIO test pattern
    pub fn seed(mut self, seed: u64) -> Self {
        // xorshift never leaves zero
        self.seed = if seed == 0 { 1 } else { seed };
        self
    }

    /// Check whether a probe group is enabled
    pub fn has(&self, option: ProbeOptions) -> bool {
        self.options.contains(option)
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self::new()
    }
}
