//! SCSI versus ATA identity comparison.
//!
//! Translators routinely mangle the SCSI view of an ATA disk: strings get
//! split across the vendor and product fields, words arrive byte-swapped,
//! designators are synthesized. Nothing found here changes the profile.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use bridgeprobe_hal::IdentifyData;

use crate::report::{Finding, FindingKind};
use crate::snapshot::ScsiDeviceSnapshot;

const DETECTOR: &str = "cross-validate";

/// ATA word holding the nominal form factor
const FORM_FACTOR_WORD: usize = 168;

fn advisory(message: String) -> Finding {
    Finding {
        kind: FindingKind::Advisory,
        detector: DETECTOR,
        message,
    }
}

/// Compare the SCSI snapshot against ATA IDENTIFY data.
///
/// Every difference becomes an advisory. When nothing differs one advisory
/// says so; without identify data the result is a single skip note.
pub fn cross_validate(
    snapshot: &ScsiDeviceSnapshot,
    identity: Option<&IdentifyData>,
) -> Vec<Finding> {
    let Some(identity) = identity else {
        return alloc::vec![Finding {
            kind: FindingKind::Skip,
            detector: DETECTOR,
            message: String::from("no ATA identify data to compare"),
        }];
    };

    let mut out = Vec::new();
    if let Some(scsi) = snapshot.rotation_rate {
        let ata = identity.rotation_rate();
        if scsi == ata.swap_bytes() && scsi != ata {
            out.push(advisory(format!(
                "rotation rate {} matches only byte-swapped",
                scsi
            )));
        } else if scsi != ata {
            out.push(advisory(format!(
                "rotation rate differs: SCSI {}, ATA {}",
                scsi, ata
            )));
        }
    }

    if let Some(scsi) = snapshot.form_factor {
        let ata = identity.form_factor();
        let swapped = (identity.word(FORM_FACTOR_WORD).swap_bytes() & 0x0F) as u8;
        if scsi != ata && scsi == swapped {
            out.push(advisory(format!("form factor {} matches only byte-swapped", scsi)));
        } else if scsi != ata {
            out.push(advisory(format!(
                "form factor differs: SCSI {}, ATA {}",
                scsi, ata
            )));
        }
    }

    if identity.supports_wwn() {
        match snapshot.wwn() {
            Some(scsi) if scsi == identity.wwn() => {}
            Some(scsi) => out.push(advisory(format!(
                "WWN differs: SCSI {:016x}, ATA {:016x}",
                scsi,
                identity.wwn()
            ))),
            None => out.push(advisory(String::from(
                "drive claims a WWN but no NAA designator was reported",
            ))),
        }
    }

    match compare_model(&snapshot.vendor, &snapshot.product, &identity.model()) {
        ModelMatch::Same => {}
        ModelMatch::Concatenated => out.push(advisory(format!(
            "model {:?} is split across vendor and product",
            identity.model()
        ))),
        ModelMatch::Different => out.push(advisory(format!(
            "SCSI {:?} {:?} does not match ATA model {:?}",
            snapshot.vendor,
            snapshot.product,
            identity.model()
        ))),
    }

    if out.is_empty() {
        out.push(advisory(String::from("SCSI and ATA identities agree")));
    }
    out
}

/// How the SCSI strings relate to the ATA model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelMatch {
    /// SAT-style: vendor "ATA", product is the model (possibly truncated)
    Same,
    /// Vendor and product together spell the model
    Concatenated,
    /// No recognizable relation
    Different,
}

/// Classify the SCSI vendor/product pair against an ATA model string
pub fn compare_model(vendor: &str, product: &str, model: &str) -> ModelMatch {
    if vendor == "ATA" && !product.is_empty() && model.starts_with(product) {
        return ModelMatch::Same;
    }
    let joined = format!("{}{}", vendor, product);
    let spaced = format!("{} {}", vendor, product);
    if !vendor.is_empty() && (model.starts_with(&joined) || model.starts_with(&spaced)) {
        return ModelMatch::Concatenated;
    }
    ModelMatch::Different
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::IdentifyBuilder;

    fn sat_snapshot() -> ScsiDeviceSnapshot {
        ScsiDeviceSnapshot {
            vendor: String::from("ATA"),
            product: String::from("ST2000DM008-2FR1"),
            rotation_rate: Some(7200),
            form_factor: Some(2),
            ..ScsiDeviceSnapshot::default()
        }
    }

    fn identity(builder: IdentifyBuilder) -> IdentifyData {
        IdentifyData::from_bytes(&builder.build()).unwrap()
    }

    #[test]
    fn test_consistent() {
        let id = identity(IdentifyBuilder {
            wwn: None,
            ..IdentifyBuilder::desktop()
        });
        let findings = cross_validate(&sat_snapshot(), Some(&id));
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.contains("agree"));
        assert_eq!(findings[0].kind, FindingKind::Advisory);
    }

    #[test]
    fn test_byte_swapped_rotation() {
        let id = identity(IdentifyBuilder {
            wwn: None,
            rotation: 7200u16.swap_bytes(),
            ..IdentifyBuilder::desktop()
        });
        let findings = cross_validate(&sat_snapshot(), Some(&id));
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.contains("byte-swapped"));
    }

    #[test]
    fn test_missing_wwn_designator() {
        let id = identity(IdentifyBuilder::desktop());
        let findings = cross_validate(&sat_snapshot(), Some(&id));
        assert!(findings.iter().any(|f| f.message.contains("WWN")));
    }

    #[test]
    fn test_model_patterns() {
        let model = "WDC WD10EZEX-08WN4A0";
        assert_eq!(compare_model("ATA", "WDC WD10EZEX-08W", model), ModelMatch::Same);
        assert_eq!(
            compare_model("WDC", "WD10EZEX-08WN4A0", model),
            ModelMatch::Concatenated
        );
        assert_eq!(
            compare_model("WDC WD1", "0EZEX-08WN4A0", model),
            ModelMatch::Concatenated
        );
        assert_eq!(compare_model("JMicron", "Generic", model), ModelMatch::Different);
    }

    #[test]
    fn test_without_identify() {
        let findings = cross_validate(&sat_snapshot(), None);
        assert_eq!(findings[0].kind, FindingKind::Skip);
    }
}
