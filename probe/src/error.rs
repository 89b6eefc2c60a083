//! Probe error taxonomy.

use core::fmt;

/// Result type for probe operations
pub type ProbeResult<T> = Result<T, ProbeError>;

/// Errors a probe step can report
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// Command family not supported; abandon it, never retry
    CommandNotSupported,
    /// Invalid field in request; retry once with an adjusted encoding
    InvalidParameter,
    /// Timeout or busy; abort the current probe group
    DeviceUnresponsive,
    /// A response buffer could not be reserved
    AllocationFailure {
        /// Bytes requested
        requested: usize,
    },
    /// A page echoed a different code than requested
    DataInconsistency {
        /// Page code requested
        expected_page: u8,
        /// Page code returned
        found_page: u8,
        /// Subpage code requested
        expected_subpage: u8,
        /// Subpage code returned
        found_subpage: u8,
    },
    /// No read command of any size works
    NoReadWriteCommand,
    /// Any other failure
    OtherFailure,
    /// Mutation attempted on a frozen profile
    ProfileFrozen,
    /// Transport class already decided this run
    TransportClassAlreadySet,
}

impl ProbeError {
    /// Errors that end the whole run
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProbeError::AllocationFailure { .. } | ProbeError::NoReadWriteCommand
        )
    }

    /// Errors that end the current probe group only
    pub const fn aborts_group(&self) -> bool {
        matches!(self, ProbeError::DeviceUnresponsive)
    }
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CommandNotSupported => write!(f, "command not supported"),
            Self::InvalidParameter => write!(f, "invalid field in request"),
            Self::DeviceUnresponsive => write!(f, "device busy or timed out"),
            Self::AllocationFailure { requested } => {
                write!(f, "failed to allocate {} byte response buffer", requested)
            }
            Self::DataInconsistency {
                expected_page,
                found_page,
                expected_subpage,
                found_subpage,
            } => write!(
                f,
                "page {:02X}h/{:02X}h requested, {:02X}h/{:02X}h returned",
                expected_page, expected_subpage, found_page, found_subpage
            ),
            Self::NoReadWriteCommand => write!(f, "no read command works"),
            Self::OtherFailure => write!(f, "command failed"),
            Self::ProfileFrozen => write!(f, "profile is frozen"),
            Self::TransportClassAlreadySet => write!(f, "transport class already set"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_fatal_errors() {
        assert!(ProbeError::NoReadWriteCommand.is_fatal());
        assert!(ProbeError::AllocationFailure { requested: 10 }.is_fatal());
        assert!(!ProbeError::CommandNotSupported.is_fatal());
        assert!(!ProbeError::DeviceUnresponsive.is_fatal());
        assert!(ProbeError::DeviceUnresponsive.aborts_group());
    }

    #[test]
    fn test_display() {
        let err = ProbeError::DataInconsistency {
            expected_page: 0x0D,
            found_page: 0x0E,
            expected_subpage: 0,
            found_subpage: 0,
        };
        assert_eq!(err.to_string(), "page 0Dh/00h requested, 0Eh/00h returned");
    }
}
