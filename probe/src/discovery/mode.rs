//! Mode page discovery and the MODE SENSE form fallback.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use bridgeprobe_hal::scsi::mode_page;
use bridgeprobe_hal::{ModeForm, Transport};

use super::ends_pass;
use crate::error::{ProbeError, ProbeResult};
use crate::page_reader::{read_page, PageSelector};
use crate::session::ProbeSession;
use crate::snapshot::ModeSettings;

const DETECTOR: &str = "mode";

/// Pages read during discovery, as (page, subpage)
pub const CURATED_PAGES: [(u8, u8); 6] = [
    (mode_page::READ_WRITE_ERROR_RECOVERY, 0),
    (mode_page::CACHING, 0),
    (mode_page::CONTROL, 0),
    (mode_page::CONTROL, mode_page::CONTROL_EXTENSION_SUBPAGE),
    (mode_page::POWER_CONDITION, 0),
    (mode_page::INFORMATIONAL_EXCEPTIONS, 0),
];

/// Read one mode page, falling back from MODE SENSE (10) to (6).
///
/// An invalid-field rejection is disambiguated with the read-write error
/// recovery page, which every direct-access device implements: if that page
/// reads in the same form, only the requested page is missing; otherwise the
/// form itself is broken. The form switch happens at most once per run.
pub fn use_mode_sense<T: Transport + ?Sized>(
    session: &mut ProbeSession<'_, T>,
    page: u8,
    subpage: u8,
) -> ProbeResult<Vec<u8>> {
    if session.profile.scsi().mode.unsupported {
        return Err(ProbeError::CommandNotSupported);
    }
    loop {
        let form = current_form(session);
        let err = match read_page(session, PageSelector::Mode { page, subpage, form }) {
            Ok(data) => return Ok(data),
            Err(err) => err,
        };
        match err {
            ProbeError::CommandNotSupported => {}
            ProbeError::InvalidParameter if page == mode_page::READ_WRITE_ERROR_RECOVERY => {}
            ProbeError::InvalidParameter => {
                let universal = PageSelector::Mode {
                    page: mode_page::READ_WRITE_ERROR_RECOVERY,
                    subpage: 0,
                    form,
                };
                match read_page(session, universal) {
                    Ok(_) => return Err(err),
                    Err(e) if ends_pass(&e) => return Err(e),
                    Err(_) => {}
                }
            }
            other => return Err(other),
        }
        match form {
            ModeForm::Ten => {
                log::info!("MODE SENSE (10) rejected, falling back to (6)");
                session.profile.scsi_mut()?.mode.six_byte_only = true;
            }
            ModeForm::Six => {
                session.profile.scsi_mut()?.mode.unsupported = true;
                return Err(ProbeError::CommandNotSupported);
            }
        }
    }
}

fn current_form<T: Transport + ?Sized>(session: &ProbeSession<'_, T>) -> ModeForm {
    if session.profile.scsi().mode.six_byte_only {
        ModeForm::Six
    } else {
        ModeForm::Ten
    }
}

/// The page itself, without the mode parameter header and block descriptors
pub fn page_bytes(response: &[u8], form: ModeForm) -> &[u8] {
    let (header, bdl) = match form {
        ModeForm::Six if response.len() >= 4 => (4, response[3] as usize),
        ModeForm::Ten if response.len() >= 8 => {
            (8, u16::from_be_bytes([response[6], response[7]]) as usize)
        }
        _ => return &[],
    };
    response.get(header + bdl..).unwrap_or(&[])
}

/// Read the curated page set.
pub fn discover_mode<T: Transport + ?Sized>(session: &mut ProbeSession<'_, T>) -> ProbeResult<()> {
    for (page, subpage) in CURATED_PAGES {
        let quirks = session.profile.scsi().mode;
        if quirks.unsupported {
            break;
        }
        if subpage != 0 && quirks.subpages_unsupported {
            continue;
        }
        let response = match use_mode_sense(session, page, subpage) {
            Ok(response) => response,
            Err(err) if ends_pass(&err) => return Err(err),
            Err(err) => {
                log::debug!("mode page {:02X}h/{:02X}h: {}", page, subpage, err);
                continue;
            }
        };
        let bytes = page_bytes(&response, current_form(session)).to_vec();
        if subpage != 0 {
            let spf = bytes.first().is_some_and(|b0| b0 & 0x40 != 0);
            let same_as_base = session.snapshot.mode_pages.get(&(page, 0)) == Some(&bytes);
            if !spf || same_as_base {
                session.profile.scsi_mut()?.mode.subpages_unsupported = true;
                session.finding(
                    DETECTOR,
                    format!("subpage {:02X}h/{:02X}h returns the base page", page, subpage),
                );
                continue;
            }
        }
        parse_settings(&mut session.snapshot.mode_settings, page, &bytes);
        session.snapshot.mode_pages.insert((page, subpage), bytes);
    }

    let quirks = session.profile.scsi().mode;
    let message = if quirks.unsupported {
        String::from("MODE SENSE unsupported")
    } else {
        format!(
            "{} pages via MODE SENSE ({})",
            session.snapshot.mode_pages.len(),
            if quirks.six_byte_only { 6 } else { 10 }
        )
    };
    session.finding(DETECTOR, message);
    Ok(())
}

fn parse_settings(settings: &mut ModeSettings, page: u8, bytes: &[u8]) {
    let Some(&flags) = bytes.get(2) else {
        return;
    };
    match page {
        mode_page::CACHING => {
            settings.write_cache_enabled = Some(flags & 0x04 != 0);
            settings.read_cache_disabled = Some(flags & 0x01 != 0);
        }
        mode_page::INFORMATIONAL_EXCEPTIONS => {
            settings.exceptions_disabled = Some(flags & 0x08 != 0);
            settings.mrie = bytes.get(3).map(|b| b & 0x0F);
        }
        _ => {}
    }
}
