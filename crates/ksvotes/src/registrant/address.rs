use std::sync::OnceLock;

use regex::Regex;

/// Residential address split out of the registry's single-line `Address` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryAddress {
    pub street: String,
    pub unit: Option<String>,
    pub city: String,
    pub state: String,
    pub zip: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressParseError {
    #[error("registry address has {found} comma-separated components, expected at least 3")]
    TooFewComponents { found: usize },
    #[error("registry address is missing a state/zip component")]
    MissingStateZip,
}

fn inline_unit_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^(.*?)\s+((?:#|apt\.?\s|apartment\s|unit\s|lot\s)\s*\S+)$")
            .expect("inline unit pattern compiles")
    })
}

fn zip_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d{5}(?:-\d{4})?$").expect("zip pattern compiles"))
}

/// Parse `STREET[, UNIT], CITY, ST ZIP`.
pub fn parse_registry_address(raw: &str) -> Result<RegistryAddress, AddressParseError> {
    let parts: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();

    if parts.len() < 3 {
        return Err(AddressParseError::TooFewComponents { found: parts.len() });
    }

    let state_zip = parts[parts.len() - 1];
    let mut tokens = state_zip.split_whitespace();
    let state = tokens
        .next()
        .ok_or(AddressParseError::MissingStateZip)?
        .to_ascii_uppercase();
    let zip = tokens
        .next()
        .filter(|zip| zip_pattern().is_match(zip))
        .map(|zip| zip[..5].to_string());

    let city = parts[parts.len() - 2].to_string();
    let street_parts = &parts[..parts.len() - 2];

    let (street, unit) = if street_parts.len() > 1 {
        (street_parts[0].to_string(), Some(street_parts[1..].join(" ")))
    } else {
        split_inline_unit(street_parts[0])
    };

    Ok(RegistryAddress {
        street,
        unit,
        city,
        state,
        zip,
    })
}

fn split_inline_unit(street: &str) -> (String, Option<String>) {
    match inline_unit_pattern().captures(street) {
        Some(captures) => (
            captures[1].trim().to_string(),
            Some(captures[2].trim().to_string()),
        ),
        None => (street.to_string(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_inline_units() {
        let address = parse_registry_address("915 SW Harrison St #12, Topeka, ks 66612-1504")
            .expect("parses");
        assert_eq!(address.street, "915 SW Harrison St");
        assert_eq!(address.unit.as_deref(), Some("#12"));
        assert_eq!(address.city, "Topeka");
        assert_eq!(address.state, "KS");
        assert_eq!(address.zip.as_deref(), Some("66612"));
    }

    #[test]
    fn tolerates_missing_zip() {
        let address = parse_registry_address("101 Main St, Hays, KS").expect("parses");
        assert_eq!(address.street, "101 Main St");
        assert!(address.unit.is_none());
        assert!(address.zip.is_none());
    }

    #[test]
    fn rejects_short_addresses() {
        assert_eq!(
            parse_registry_address("101 Main St, Hays"),
            Err(AddressParseError::TooFewComponents { found: 2 })
        );
    }
}
