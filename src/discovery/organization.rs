//! Compliance bitset and the keyword-based inference layered on top of a
//! platform's own compliance detection.

use serde::{Deserialize, Serialize};

bitflags::bitflags! {
    #[derive(Serialize, Deserialize, Default)]
    pub struct Compliance: u32 {
        const PCI_DSS  = 0b0000_0001;
        const HIPAA    = 0b0000_0010;
        const SOX      = 0b0000_0100;
        const ISO27001 = 0b0000_1000;
        const GDPR     = 0b0001_0000;
        const NIST     = 0b0010_0000;
    }
}

// Rust-idiom aliases for the §9 upper-camel references used elsewhere.
#[allow(non_upper_case_globals)]
impl Compliance {
    pub const PciDss: Compliance = Compliance::PCI_DSS;
    pub const Hipaa: Compliance = Compliance::HIPAA;
    pub const Sox: Compliance = Compliance::SOX;
}

/// Textually scans organization name for category keywords, per §4.1.
pub fn infer_from_name(name: &str) -> Compliance {
    let lower = name.to_lowercase();
    let mut compliance = Compliance::empty();

    if contains_any(&lower, &["hospital", "medical", "health", "clinic"]) {
        compliance |= Compliance::HIPAA;
    }
    if contains_any(&lower, &["bank", "financial", "credit", "insurance"]) {
        compliance |= Compliance::PCI_DSS | Compliance::SOX;
    }
    if contains_any(&lower, &["gov", "federal", "state", "county"]) {
        compliance |= Compliance::NIST;
    }

    compliance
}

/// Locale/timezone indicating an EU country implies GDPR applicability.
pub fn infer_from_locale(timezone: &str) -> Compliance {
    const EU_TIMEZONE_PREFIXES: &[&str] = &[
        "Europe/",
        "EU",
    ];
    if EU_TIMEZONE_PREFIXES.iter().any(|p| timezone.starts_with(p)) {
        Compliance::GDPR
    } else {
        Compliance::empty()
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Alias kept for readability at call sites (`ComplianceFramework::Hipaa`
/// reads closer to the data-model prose than the raw bitflag constant).
pub type ComplianceFramework = Compliance;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hospital_name_implies_hipaa() {
        let c = infer_from_name("Springfield Hospital");
        assert!(c.contains(Compliance::HIPAA));
        assert!(!c.contains(Compliance::PCI_DSS));
    }

    #[test]
    fn bank_implies_pci_and_sox() {
        let c = infer_from_name("First National Bank");
        assert!(c.contains(Compliance::PCI_DSS));
        assert!(c.contains(Compliance::SOX));
    }

    #[test]
    fn unrelated_name_implies_nothing() {
        let c = infer_from_name("Acme Widgets");
        assert!(c.is_empty());
    }

    #[test]
    fn eu_timezone_implies_gdpr() {
        assert!(infer_from_locale("Europe/Berlin").contains(Compliance::GDPR));
        assert!(infer_from_locale("America/New_York").is_empty());
    }
}
