//! Log page discovery and counter parsers.

use alloc::format;
use alloc::vec::Vec;

use bridgeprobe_hal::scsi::log_page;
use bridgeprobe_hal::Transport;

use super::ends_pass;
use crate::error::{ProbeError, ProbeResult};
use crate::page_reader::{read_page, PageSelector};
use crate::session::ProbeSession;
use crate::snapshot::LogCounters;

const DETECTOR: &str = "log";

/// Walks the parameters of one log page
#[derive(Debug, Clone)]
pub struct LogParameters<'a> {
    body: &'a [u8],
}

impl<'a> LogParameters<'a> {
    /// Iterate the parameters of a full page, header included
    pub fn new(page: &'a [u8]) -> Self {
        let body = if page.len() >= 4 {
            let len = u16::from_be_bytes([page[2], page[3]]) as usize;
            &page[4..(4 + len).min(page.len())]
        } else {
            &[]
        };
        Self { body }
    }
}

impl<'a> Iterator for LogParameters<'a> {
    /// (parameter code, value)
    type Item = (u16, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.body.len() < 4 {
            return None;
        }
        let code = u16::from_be_bytes([self.body[0], self.body[1]]);
        let len = self.body[3] as usize;
        let value = self.body.get(4..4 + len)?;
        self.body = &self.body[4 + len..];
        Some((code, value))
    }
}

/// Enumerate log pages and parse the ones we understand.
pub fn discover_logs<T: Transport + ?Sized>(session: &mut ProbeSession<'_, T>) -> ProbeResult<()> {
    let plain = match read_page(session, directory(0)) {
        Ok(page) => page,
        Err(ProbeError::CommandNotSupported) => {
            session.profile.scsi_mut()?.log.unsupported = true;
            session.finding(DETECTOR, "LOG SENSE unsupported");
            return Ok(());
        }
        Err(err) => return Err(err),
    };
    let plain_pages: Vec<(u8, u8)> = LogDirectory(&plain)
        .body()
        .iter()
        .map(|&p| (p & 0x3F, 0))
        .collect();

    let pages = match read_page(session, directory(log_page::ALL_SUBPAGES)) {
        Ok(sub) if sub == plain => {
            session.profile.scsi_mut()?.log.subpages_unsupported = true;
            session.finding(DETECTOR, "subpage directory repeats the page directory");
            plain_pages
        }
        Ok(sub) => {
            let pairs: Vec<(u8, u8)> = LogDirectory(&sub)
                .body()
                .chunks_exact(2)
                .map(|pair| (pair[0] & 0x3F, pair[1]))
                .collect();
            if pairs.len() < plain_pages.len() {
                // Soft: the lists disagree but both are usable.
                log::warn!(
                    "log subpage directory lists {} entries, page directory {}",
                    pairs.len(),
                    plain_pages.len()
                );
                session.finding(DETECTOR, "subpage directory shorter than page directory");
            }
            pairs
        }
        Err(err) if ends_pass(&err) => return Err(err),
        Err(err) => {
            log::debug!("log subpage directory: {}", err);
            session.profile.scsi_mut()?.log.subpages_unsupported = true;
            plain_pages
        }
    };

    let subpages = !session.profile.scsi().log.subpages_unsupported;
    for &(page, subpage) in &pages {
        if page == log_page::SUPPORTED_PAGES
            || subpage == log_page::ALL_SUBPAGES
            || (subpage != 0 && !subpages)
        {
            continue;
        }
        match read_page(session, PageSelector::Log { page, subpage }) {
            Ok(data) if subpage == 0 => parse_counters(&mut session.snapshot.counters, page, &data),
            Ok(_) => {}
            Err(err) if ends_pass(&err) => return Err(err),
            Err(err) => log::debug!("log page {:02X}h/{:02X}h: {}", page, subpage, err),
        }
    }

    session.snapshot.log_pages = pages;
    let message = format!(
        "{} log pages{}",
        session.snapshot.log_pages.len(),
        if subpages { "" } else { ", no subpages" }
    );
    session.finding(DETECTOR, message);
    Ok(())
}

fn directory(subpage: u8) -> PageSelector {
    PageSelector::Log {
        page: log_page::SUPPORTED_PAGES,
        subpage,
    }
}

struct LogDirectory<'a>(&'a [u8]);

impl LogDirectory<'_> {
    fn body(&self) -> &[u8] {
        let page = self.0;
        if page.len() < 4 {
            return &[];
        }
        let len = u16::from_be_bytes([page[2], page[3]]) as usize;
        &page[4..(4 + len).min(page.len())]
    }
}

/// Pick counters out of one page.
pub fn parse_counters(counters: &mut LogCounters, page: u8, data: &[u8]) {
    let mut params = LogParameters::new(data);
    match page {
        log_page::TEMPERATURE => {
            for (code, value) in params {
                let reading = value.get(1).copied().filter(|&t| t != 0xFF);
                match code {
                    0x0000 => counters.temperature = reading,
                    0x0001 => counters.reference_temperature = reading,
                    _ => {}
                }
            }
        }
        log_page::START_STOP_CYCLE_COUNTER => {
            for (code, value) in params {
                let Some(bytes) = value.get(..4) else {
                    continue;
                };
                let count = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                match code {
                    0x0003 => counters.specified_start_stop_cycles = Some(count),
                    0x0004 => counters.accumulated_start_stop_cycles = Some(count),
                    _ => {}
                }
            }
        }
        log_page::INFORMATIONAL_EXCEPTIONS => {
            if let Some((_, value)) = params.find(|(code, _)| *code == 0) {
                if value.len() >= 3 {
                    counters.ie_asc = Some((value[0], value[1]));
                    counters.ie_temperature = Some(value[2]);
                }
            }
        }
        log_page::SELF_TEST_RESULTS => {
            let used = params.filter(|(_, value)| value.iter().any(|&b| b != 0)).count();
            counters.self_test_entries = Some(used as u32);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProbeConfig;
    use crate::testing::{log_page as build_page, MockDevice};

    #[test]
    fn test_counters_from_mock_disk() {
        let mut dev = MockDevice::sat_disk();
        let mut session = ProbeSession::new(&mut dev, ProbeConfig::default());
        discover_logs(&mut session).unwrap();
        assert!(!session.profile.scsi().log.subpages_unsupported);
        let counters = session.snapshot.counters;
        assert_eq!(counters.temperature, Some(35));
        assert_eq!(counters.reference_temperature, Some(60));
        assert_eq!(counters.specified_start_stop_cycles, Some(50_000));
        assert_eq!(counters.accumulated_start_stop_cycles, Some(1_234));
        assert_eq!(counters.ie_asc, Some((0, 0)));
        assert_eq!(counters.ie_temperature, Some(36));
        assert_eq!(counters.self_test_entries, Some(2));
    }

    #[test]
    fn test_identical_directories_mean_no_subpages() {
        let mut dev = MockDevice::sat_disk();
        dev.log_subpages = false;
        let mut session = ProbeSession::new(&mut dev, ProbeConfig::default());
        discover_logs(&mut session).unwrap();
        assert!(session.profile.scsi().log.subpages_unsupported);
        assert_eq!(session.snapshot.counters.temperature, Some(35));
    }

    #[test]
    fn test_not_supported_stops_discovery() {
        let mut dev = MockDevice::sat_disk();
        dev.log_supported = false;
        let mut session = ProbeSession::new(&mut dev, ProbeConfig::default());
        discover_logs(&mut session).unwrap();
        assert!(session.profile.scsi().log.unsupported);
        drop(session);
        assert_eq!(dev.log.len(), 1);
    }

    #[test]
    fn test_parameter_walk() {
        let page = build_page(0x0D, 0, &[(0x0000, &[0, 41]), (0x0001, &[0, 0xFF])]);
        let params: Vec<_> = LogParameters::new(&page).collect();
        assert_eq!(params.len(), 2);
        assert_eq!(params[0], (0x0000, &[0u8, 41][..]));

        let mut counters = LogCounters::default();
        parse_counters(&mut counters, 0x0D, &page);
        assert_eq!(counters.temperature, Some(41));
        assert_eq!(counters.reference_temperature, None);
    }

    #[test]
    fn test_truncated_parameter_ends_walk() {
        let mut page = build_page(0x0E, 0, &[(0x0003, &[0, 0, 0, 9])]);
        page[7] = 40;
        assert_eq!(LogParameters::new(&page).count(), 0);
    }
}
