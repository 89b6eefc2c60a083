//! Bit-level quirk detectors.
//!
//! Each detector runs one small experiment against the passthrough the
//! negotiator settled on and writes exactly the profile fields it owns.
//! Detectors that may retry with a flipped parameter do so through
//! [`RetestState`], never by recursion.

pub mod check_condition;
pub mod dma;
pub mod latency;
pub mod opcodes;
pub mod pio;
pub mod rtfr;
pub mod security;
pub mod tpsiu;
pub mod transfer;

/// Where a retry-capable detector is in its one permitted retest.
///
/// `Untested -> TestedDefault -> TestedAlternate -> Settled`; there is no
/// way back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetestState {
    /// Nothing run yet
    #[default]
    Untested,
    /// Ran with the default parameter
    TestedDefault,
    /// Ran again with the alternate parameter
    TestedAlternate,
    /// Verdict recorded
    Settled,
}

impl RetestState {
    /// Step forward; `Settled` stays put
    pub fn advance(&mut self) {
        *self = match self {
            RetestState::Untested => RetestState::TestedDefault,
            RetestState::TestedDefault => RetestState::TestedAlternate,
            RetestState::TestedAlternate | RetestState::Settled => RetestState::Settled,
        };
    }

    /// Only a detector that has run once with the default may retry
    pub const fn may_retest(&self) -> bool {
        matches!(self, RetestState::TestedDefault)
    }

    /// Jump to the end
    pub fn settle(&mut self) {
        *self = RetestState::Settled;
    }
}
