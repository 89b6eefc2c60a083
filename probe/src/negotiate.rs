//! Passthrough negotiation: which wrapper gets ATA or NVMe commands through.

use alloc::format;

use bridgeprobe_hal::ata::log_address;
use bridgeprobe_hal::{
    AtaEncoding, AtaRequest, IdentifyController, IdentifyData, LegacyVendor, NvmeRequest,
    NvmeVendor, Transport,
};

use crate::config::ProbeOptions;
use crate::error::{ProbeError, ProbeResult};
use crate::profile::{Addressing, TransportClass};
use crate::session::ProbeSession;
use crate::snapshot::ScsiDeviceSnapshot;

const DETECTOR: &str = "negotiate";

/// Inquiry or bridge strings that point at an NVMe drive behind the bridge
pub fn nvme_evidence(snapshot: &ScsiDeviceSnapshot) -> bool {
    if snapshot.vendor.eq_ignore_ascii_case("NVMe")
        || snapshot.product.to_ascii_uppercase().contains("NVME")
        || NvmeVendor::is_known_bridge_vendor(&snapshot.vendor)
    {
        return true;
    }
    snapshot
        .bridge
        .as_ref()
        .is_some_and(|bridge| NvmeVendor::is_known_bridge_vendor(&bridge.vendor))
}

fn identify_request(encoding: AtaEncoding, packet: bool) -> AtaRequest {
    if packet {
        AtaRequest::identify_packet(encoding)
    } else {
        AtaRequest::identify(encoding)
    }
}

// Identify through one wrapper; a "success" with garbage data does not count.
fn try_identify<T: Transport + ?Sized>(
    session: &mut ProbeSession<'_, T>,
    encoding: AtaEncoding,
    packet: bool,
) -> ProbeResult<Option<IdentifyData>> {
    let outcome = session.issue_checked(identify_request(encoding, packet))?;
    if !outcome.is_ok() {
        return Ok(None);
    }
    Ok(IdentifyData::from_bytes(&outcome.data).filter(IdentifyData::is_plausible))
}

/// Decide the transport class.
///
/// NVMe bridges are tried first when the strings suggest one, then SAT,
/// then (opt-in only) the legacy vendor wrappers. A class set earlier in
/// the run is left alone.
pub fn negotiate<T: Transport + ?Sized>(session: &mut ProbeSession<'_, T>) -> ProbeResult<()> {
    if session.profile.transport_class() != TransportClass::Unknown {
        log::warn!(
            "transport class already {}, not renegotiating",
            session.profile.transport_class()
        );
        return Ok(());
    }

    let mut class = None;
    if nvme_evidence(&session.snapshot) {
        class = try_nvme(session)?;
    }
    if class.is_none() {
        class = try_sat(session)?;
    }
    if class.is_none() {
        class = try_legacy(session)?;
    }
    let class = class.unwrap_or(TransportClass::NonePossible);

    match session.profile.set_transport_class(class) {
        Err(ProbeError::TransportClassAlreadySet) => {}
        other => other?,
    }
    if class == TransportClass::NonePossible {
        session.skip(DETECTOR, "no passthrough works; ATA tests disabled");
    } else {
        session.finding(DETECTOR, format!("transport class {}", class));
    }
    Ok(())
}

fn try_nvme<T: Transport + ?Sized>(
    session: &mut ProbeSession<'_, T>,
) -> ProbeResult<Option<TransportClass>> {
    for vendor in NvmeVendor::ALL {
        let outcome = session.issue_checked(NvmeRequest::identify_controller(vendor))?;
        if !outcome.is_ok() {
            continue;
        }
        let Some(identity) = IdentifyController::from_bytes(&outcome.data) else {
            log::debug!("{} NVMe identify returned no data", vendor.name());
            continue;
        };
        let nvme = session.profile.nvme_mut()?;
        nvme.vendor = Some(vendor);
        nvme.limited = vendor.is_limited();
        nvme.max_transfer_bytes = identity.max_transfer_bytes();
        session.finding(
            DETECTOR,
            format!(
                "{} NVMe passthrough: {} {}",
                vendor.name(),
                identity.model,
                identity.firmware
            ),
        );
        session.nvme_identity = Some(identity);
        return Ok(Some(TransportClass::NvmeVendor(vendor)));
    }
    session.recover();
    Ok(None)
}

fn try_sat<T: Transport + ?Sized>(
    session: &mut ProbeSession<'_, T>,
) -> ProbeResult<Option<TransportClass>> {
    let packet = session.snapshot.device_type.is_optical();
    let via12 = try_identify(session, AtaEncoding::Sat12, packet)?;
    let via16 = try_identify(session, AtaEncoding::Sat16, packet)?;

    let identity = match (via12, via16) {
        (None, None) => return Ok(None),
        (Some(identity), None) => {
            session.profile.ata_mut()?.ata28_only = true;
            session.finding(DETECTOR, "ATA PASS-THROUGH (16) rejected; 28-bit only");
            identity
        }
        (None, Some(identity)) => {
            session.profile.ata_mut()?.prefer_16_byte = true;
            session.finding(DETECTOR, "ATA PASS-THROUGH (12) rejected; prefer 16-byte");
            identity
        }
        (Some(identity), Some(_)) => identity,
    };

    if session.config.has(ProbeOptions::SAT_32_BYTE)
        && try_identify(session, AtaEncoding::Sat32, packet)?.is_some()
    {
        session.profile.ata_mut()?.sat32_capable = true;
        session.finding(DETECTOR, "ATA PASS-THROUGH (32) works");
    }

    // Some translators gate on command width, not CDB size.
    let ext_probe = if identity.supports_gpl() {
        Some(AtaRequest::read_log_ext(
            AtaEncoding::Sat16,
            log_address::DIRECTORY,
            0,
            1,
        ))
    } else if identity.supports_lba48() && identity.supports_hpa() {
        Some(AtaRequest::read_native_max(AtaEncoding::Sat16, true))
    } else {
        None
    };
    if let Some(request) = ext_probe {
        let via16 = session.issue_checked(request)?.is_ok();
        let ata = session.profile.ata_mut()?;
        ata.ext_commands_via_16 = via16;
        if via16 && ata.ata28_only {
            session.finding(DETECTOR, "48-bit commands pass in 16-byte CDBs");
        }
    }

    session.profile.ata_mut()?.addressing = if identity.supports_lba48() {
        Addressing::Lba48
    } else {
        Addressing::Lba28
    };
    log::info!(
        "SAT identify: {} {} ({} sectors)",
        identity.model(),
        identity.firmware(),
        identity.max_lba() + 1
    );
    session.ata_identity = Some(identity);
    Ok(Some(TransportClass::Sat))
}

fn try_legacy<T: Transport + ?Sized>(
    session: &mut ProbeSession<'_, T>,
) -> ProbeResult<Option<TransportClass>> {
    let device_type = session.snapshot.device_type;
    if !device_type.is_block_device() && !device_type.is_optical() {
        return Ok(None);
    }
    if !session.config.has(ProbeOptions::HIGH_RISK_LEGACY) {
        session.skip("legacy", "high-risk legacy passthrough not enabled");
        return Ok(None);
    }

    let delay = session.config.legacy_warning_delay;
    log::warn!(
        "Trying legacy vendor passthrough CDBs in {} s; these can hang or brick some bridges",
        delay.as_secs()
    );
    session.delay(delay);

    let packet = device_type.is_optical();
    for vendor in LegacyVendor::ALL {
        // Unknown vendor CDBs hang some bridges; recover after every miss.
        let outcome = session.issue(identify_request(AtaEncoding::Legacy(vendor), packet));
        let identity = outcome
            .is_ok()
            .then(|| IdentifyData::from_bytes(&outcome.data))
            .flatten()
            .filter(IdentifyData::is_plausible);
        match identity {
            Some(identity) => {
                session.profile.ata_mut()?.addressing = if identity.supports_lba48() {
                    Addressing::Lba48
                } else {
                    Addressing::Lba28
                };
                session.ata_identity = Some(identity);
                return Ok(Some(TransportClass::LegacyVendor(vendor)));
            }
            None => session.recover(),
        }
    }
    Ok(None)
}
