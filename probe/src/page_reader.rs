//! Reading self-describing, length-prefixed pages.
//!
//! VPD, mode and log pages share one protocol: ask for the header, learn
//! the declared length, ask again for the whole thing, then make sure the
//! device answered the question that was asked.

use alloc::vec::Vec;

use bridgeprobe_hal::{ModeForm, ScsiRequest, Transport};

use crate::error::{ProbeError, ProbeResult};
use crate::session::ProbeSession;

/// Largest allocation the 16-bit length fields can express
pub const MAX_PAGE_LENGTH: usize = 0xFFFF;

/// Which page to read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSelector {
    /// VPD page via INQUIRY
    Vpd(u8),
    /// Mode page via MODE SENSE
    Mode {
        /// Page code
        page: u8,
        /// Subpage code
        subpage: u8,
        /// CDB form
        form: ModeForm,
    },
    /// Log page via LOG SENSE
    Log {
        /// Page code
        page: u8,
        /// Subpage code
        subpage: u8,
    },
}

impl PageSelector {
    /// Length of the response header
    pub const fn header_len(&self) -> usize {
        match self {
            PageSelector::Vpd(_) => 4,
            PageSelector::Mode {
                form: ModeForm::Six,
                ..
            } => 4,
            PageSelector::Mode {
                form: ModeForm::Ten,
                ..
            } => 8,
            PageSelector::Log { .. } => 4,
        }
    }

    fn request(&self, allocation: u16) -> ScsiRequest {
        match *self {
            PageSelector::Vpd(page) => ScsiRequest::Inquiry {
                evpd: true,
                page,
                allocation,
            },
            PageSelector::Mode {
                page,
                subpage,
                form,
            } => ScsiRequest::ModeSense {
                form,
                page,
                subpage,
                allocation,
            },
            PageSelector::Log { page, subpage } => ScsiRequest::LogSense {
                page,
                subpage,
                allocation,
            },
        }
    }

    /// Total response length a header declares, capped at what the
    /// matching CDB can request
    pub fn declared_len(&self, header: &[u8]) -> usize {
        let total = match self {
            PageSelector::Vpd(_) | PageSelector::Log { .. } => {
                4 + u16::from_be_bytes([header[2], header[3]]) as usize
            }
            PageSelector::Mode {
                form: ModeForm::Six,
                ..
            } => (1 + header[0] as usize).min(u8::MAX as usize),
            PageSelector::Mode {
                form: ModeForm::Ten,
                ..
            } => 2 + u16::from_be_bytes([header[0], header[1]]) as usize,
        };
        total.min(MAX_PAGE_LENGTH)
    }

    fn codes(&self) -> (u8, u8) {
        match *self {
            PageSelector::Vpd(page) => (page, 0),
            PageSelector::Mode { page, subpage, .. } | PageSelector::Log { page, subpage } => {
                (page, subpage)
            }
        }
    }

    /// Check the page/subpage the device echoed.
    ///
    /// Mode and log subpage codes only count when the response sets SPF;
    /// a translator that ignores the subpage returns the base page, which
    /// callers detect by comparing bytes.
    pub fn verify_echo(&self, data: &[u8]) -> ProbeResult<()> {
        let (expected_page, expected_subpage) = self.codes();
        let echoed = match self {
            PageSelector::Vpd(_) => data.get(1).map(|&page| (page, expected_subpage)),
            PageSelector::Log { .. } => data
                .first()
                .map(|&b0| (b0 & 0x3F, spf_subpage(b0, data.get(1), expected_subpage))),
            PageSelector::Mode { form, .. } => {
                let (header, bdl) = match form {
                    ModeForm::Six => (4, data.get(3).copied().unwrap_or(0) as usize),
                    ModeForm::Ten => (
                        8,
                        u16::from_be_bytes([
                            data.get(6).copied().unwrap_or(0),
                            data.get(7).copied().unwrap_or(0),
                        ]) as usize,
                    ),
                };
                let at = header + bdl;
                data.get(at)
                    .map(|&b0| (b0 & 0x3F, spf_subpage(b0, data.get(at + 1), expected_subpage)))
            }
        };
        let Some((found_page, found_subpage)) = echoed else {
            // Header only: the page itself is absent.
            return Err(ProbeError::OtherFailure);
        };
        if found_page != expected_page || found_subpage != expected_subpage {
            let err = ProbeError::DataInconsistency {
                expected_page,
                found_page,
                expected_subpage,
                found_subpage,
            };
            log::warn!("{}", err);
            return Err(err);
        }
        Ok(())
    }
}

fn spf_subpage(b0: u8, b1: Option<&u8>, expected: u8) -> u8 {
    if b0 & 0x40 != 0 {
        b1.copied().unwrap_or(0)
    } else {
        expected
    }
}

/// Read one page in full.
pub fn read_page<T: Transport + ?Sized>(
    session: &mut ProbeSession<'_, T>,
    selector: PageSelector,
) -> ProbeResult<Vec<u8>> {
    let header_len = selector.header_len();
    let header = session.issue_checked(selector.request(header_len as u16))?;
    if let Some(err) = header.outcome.into_error() {
        return Err(err);
    }
    if header.data.len() < header_len {
        log::debug!(
            "{:?}: short header ({} of {} bytes)",
            selector,
            header.data.len(),
            header_len
        );
        return Err(ProbeError::OtherFailure);
    }

    let total = selector.declared_len(&header.data).max(header_len);
    let mut page = Vec::new();
    page.try_reserve_exact(total)
        .map_err(|_| ProbeError::AllocationFailure { requested: total })?;

    if total > header_len {
        let full = session.issue_checked(selector.request(total as u16))?;
        if let Some(err) = full.outcome.into_error() {
            return Err(err);
        }
        let len = full.data.len().min(total);
        page.extend_from_slice(&full.data[..len]);
    } else {
        page.extend_from_slice(&header.data[..header_len]);
    }

    selector.verify_echo(&page)?;
    Ok(page)
}
