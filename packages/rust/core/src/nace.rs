//! NACE v2 code to sector lookup.
//!
//! Only the two-digit division prefix is consulted.

/// Division prefix to sector label.
const NACE_CATEGORIES: &[(&str, &str)] = &[
    ("62", "Software & IT"),
    ("63", "Data & Hosting"),
    ("58", "Software Publishing"),
    ("64", "Financial Services"),
    ("66", "FinTech Support"),
    ("21", "Pharma & Biotech"),
    ("72", "R&D"),
    ("26", "Electronics & Hardware"),
    ("70", "Consulting"),
    ("73", "Marketing & Advertising"),
    ("61", "Telecommunications"),
    ("46", "Wholesale Trade"),
    ("47", "Retail Trade"),
    ("41", "Construction"),
    ("68", "Real Estate"),
    ("69", "Legal & Accounting"),
    ("74", "Professional Services"),
    ("85", "Education"),
    ("86", "Health"),
];

/// Divisions counted as technology.
const TECH_PREFIXES: &[&str] = &["62", "63", "58", "64", "66", "21", "72", "26", "61"];

/// Sectors whose companies are sent to research and website discovery.
pub const SOFTWARE_CATEGORIES: &[&str] = &["Software & IT", "Data & Hosting", "Software Publishing"];

/// Canonical string form of a code as it appears in the registry export.
///
/// The export sometimes renders codes as floats (`6201.0`).
pub fn normalize_code(code: &str) -> String {
    let code = code.trim();
    match code.parse::<f64>() {
        Ok(value) if value.fract() == 0.0 && value >= 0.0 => format!("{}", value as u64),
        _ => code.to_string(),
    }
}

/// Sector label for `code`: `Unknown` when blank, `Other` when unlisted.
pub fn nace_category(code: Option<&str>) -> &'static str {
    let code = code.map(normalize_code).unwrap_or_default();
    if code.is_empty() {
        return "Unknown";
    }
    NACE_CATEGORIES
        .iter()
        .find(|(prefix, _)| code.starts_with(prefix))
        .map(|(_, label)| *label)
        .unwrap_or("Other")
}

/// Whether `code` falls in a technology division.
pub fn is_tech(code: Option<&str>) -> bool {
    let code = code.map(normalize_code).unwrap_or_default();
    !code.is_empty() && TECH_PREFIXES.iter().any(|prefix| code.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_by_division_prefix() {
        assert_eq!(nace_category(Some("6201")), "Software & IT");
        assert_eq!(nace_category(Some("5829")), "Software Publishing");
        assert_eq!(nace_category(Some("9999")), "Other");
        assert_eq!(nace_category(Some("  ")), "Unknown");
        assert_eq!(nace_category(None), "Unknown");
    }

    #[test]
    fn float_codes_are_normalized() {
        assert_eq!(normalize_code("6201.0"), "6201");
        assert_eq!(normalize_code(" 7211 "), "7211");
        assert_eq!(nace_category(Some("6311.0")), "Data & Hosting");
    }

    #[test]
    fn tech_flag() {
        assert!(is_tech(Some("6201")));
        assert!(is_tech(Some("2110")));
        assert!(!is_tech(Some("4711")));
        assert!(!is_tech(Some("")));
        assert!(!is_tech(None));
    }
}
