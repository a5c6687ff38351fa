use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use chrono_tz::{Tz, US::Central};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::address::{parse_registry_address, AddressParseError};

/// Free-form form values collected across the steps, keyed by field name.
pub type RegistrationValues = Map<String, Value>;

/// Identifier of the browser session a registrant belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(raw: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(raw.trim()).map(Self)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A registry match as it is kept on the registrant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SosRecord {
    pub tree: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_ballot: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub districts: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elections: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polling: Option<Value>,
}

impl SosRecord {
    pub fn tree_str(&self, key: &str) -> Option<&str> {
        self.tree
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    pub fn county(&self) -> Option<&str> {
        self.tree_str("County")
    }

    pub fn status(&self) -> Option<&str> {
        self.tree_str("Status")
    }
}

/// The in-progress registration or advance ballot session of one visitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registrant {
    pub session_id: SessionId,
    pub lang: String,
    pub county: Option<String>,
    pub ref_code: Option<String>,
    pub registration_value: RegistrationValues,
    pub reg_lookup_complete: bool,
    pub reg_found: bool,
    pub dob_year: Option<i32>,
    pub party: Option<String>,
    pub is_citizen: bool,
    pub is_eighteen: bool,
    pub ab_permanent: bool,
    pub signed_at: Option<DateTime<Utc>>,
    pub vr_completed_at: Option<DateTime<Utc>>,
    pub ab_completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Registrant {
    pub fn new(session_id: SessionId, lang: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            session_id,
            lang: lang.into(),
            county: None,
            ref_code: None,
            registration_value: RegistrationValues::new(),
            reg_lookup_complete: false,
            reg_found: false,
            dob_year: None,
            party: None,
            is_citizen: false,
            is_eighteen: false,
            ab_permanent: false,
            signed_at: None,
            vr_completed_at: None,
            ab_completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn value(&self, key: &str) -> Option<&Value> {
        self.registration_value.get(key)
    }

    /// Stored value rendered as text, or an empty string when absent.
    pub fn try_value(&self, key: &str) -> String {
        match self.registration_value.get(key) {
            Some(Value::String(text)) => text.clone(),
            Some(Value::Number(number)) => number.to_string(),
            Some(Value::Bool(flag)) => flag.to_string(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }

    pub fn has_value(&self, key: &str) -> bool {
        !self.try_value(key).trim().is_empty()
    }

    /// Checkbox-style values: booleans or the usual truthy strings.
    pub fn flag(&self, key: &str) -> bool {
        self.registration_value.get(key).map(is_truthy).unwrap_or(false)
    }

    pub fn set_value(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.registration_value.insert(key.into(), value.into());
    }

    pub fn remove_value(&mut self, key: &str) -> Option<Value> {
        self.registration_value.remove(key)
    }

    /// Merge submitted values over the stored ones.
    pub fn update(&mut self, values: RegistrationValues) {
        for (key, value) in values {
            self.registration_value.insert(key, value);
        }
    }

    pub fn get_dob_year(&self) -> Option<i32> {
        let dob = self.try_value("dob");
        let dob = dob.trim();
        NaiveDate::parse_from_str(dob, "%m/%d/%Y")
            .or_else(|_| NaiveDate::parse_from_str(dob, "%Y-%m-%d"))
            .map(|date| date.year())
            .ok()
    }

    pub fn middle_initial(&self) -> String {
        self.try_value("name_middle")
            .trim()
            .chars()
            .next()
            .map(|initial| initial.to_uppercase().collect())
            .unwrap_or_default()
    }

    pub fn signed_at_central_tz(&self) -> Option<DateTime<Tz>> {
        self.signed_at.map(|signed| signed.with_timezone(&Central))
    }

    pub fn party_label(&self) -> String {
        self.party.clone().unwrap_or_default()
    }

    /// Prefill address, party and county from a registry match without clobbering
    /// anything the visitor already entered.
    pub fn populate_address(&mut self, tree: &Map<String, Value>) -> Result<(), AddressParseError> {
        if let Some(party) = tree.get("Party").and_then(Value::as_str) {
            let party = party.trim();
            if !party.is_empty() && self.party.is_none() {
                self.party = Some(party.to_string());
                if !self.has_value("party") {
                    self.set_value("party", party);
                }
            }
        }

        if self.county.is_none() {
            if let Some(county) = tree.get("County").and_then(Value::as_str) {
                let county = county.trim();
                if !county.is_empty() {
                    self.county = Some(county.to_string());
                }
            }
        }

        let Some(raw) = tree.get("Address").and_then(Value::as_str) else {
            return Ok(());
        };

        let address = parse_registry_address(raw)?;
        for (key, value) in [
            ("addr", Some(address.street)),
            ("unit", address.unit),
            ("city", Some(address.city)),
            ("state", Some(address.state)),
            ("zip", address.zip),
        ] {
            if let Some(value) = value {
                if !self.has_value(key) {
                    self.set_value(key, value);
                }
            }
        }

        Ok(())
    }

    pub fn sos_reg(&self) -> Option<Vec<SosRecord>> {
        match self.registration_value.get("sos_reg") {
            Some(value @ Value::Array(_)) => serde_json::from_value(value.clone()).ok(),
            _ => None,
        }
    }

    pub fn sos_failure(&self) -> Option<String> {
        match self.registration_value.get("sos_failure") {
            Some(Value::String(reason)) if !reason.is_empty() => Some(reason.clone()),
            _ => None,
        }
    }

    pub fn skip_sos(&self) -> bool {
        self.flag("skip_sos")
    }

    /// Elections picked on the advance ballot path.
    pub fn elections(&self) -> Vec<String> {
        match self.registration_value.get("elections") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect(),
            Some(Value::String(item)) if !item.trim().is_empty() => vec![item.trim().to_string()],
            _ => Vec::new(),
        }
    }

    pub fn has_ab_forms(&self) -> bool {
        matches!(self.registration_value.get("ab_forms"), Some(Value::Array(items)) if !items.is_empty())
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => self.updated_at + ttl < now,
            Err(_) => false,
        }
    }
}

pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::String(text) => matches!(
            text.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "y" | "yes" | "on"
        ),
        Value::Number(number) => number.as_i64().map(|n| n != 0).unwrap_or(false),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn registrant() -> Registrant {
        let now = Utc.with_ymd_and_hms(2020, 10, 1, 17, 30, 0).unwrap();
        Registrant::new(SessionId::generate(), "en", now)
    }

    fn tree(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("object")
    }

    #[test]
    fn try_value_defaults_to_empty_string() {
        let mut registrant = registrant();
        assert_eq!(registrant.try_value("name_first"), "");
        registrant.set_value("name_first", "Dorothy");
        registrant.set_value("has_prev_name", true);
        assert_eq!(registrant.try_value("name_first"), "Dorothy");
        assert_eq!(registrant.try_value("has_prev_name"), "true");
    }

    #[test]
    fn update_merges_over_existing_values() {
        let mut registrant = registrant();
        registrant.set_value("zip", "66044");
        registrant.set_value("email", "old@example.org");
        registrant.update(tree(json!({"email": "new@example.org", "phone": "555-1212"})));
        assert_eq!(registrant.try_value("zip"), "66044");
        assert_eq!(registrant.try_value("email"), "new@example.org");
        assert_eq!(registrant.try_value("phone"), "555-1212");
    }

    #[test]
    fn dob_year_accepts_both_date_layouts() {
        let mut registrant = registrant();
        registrant.set_value("dob", "01/02/1980");
        assert_eq!(registrant.get_dob_year(), Some(1980));
        registrant.set_value("dob", "1975-07-04");
        assert_eq!(registrant.get_dob_year(), Some(1975));
        registrant.set_value("dob", "sometime");
        assert_eq!(registrant.get_dob_year(), None);
    }

    #[test]
    fn middle_initial_is_uppercased() {
        let mut registrant = registrant();
        assert_eq!(registrant.middle_initial(), "");
        registrant.set_value("name_middle", "  gale");
        assert_eq!(registrant.middle_initial(), "G");
    }

    #[test]
    fn signature_time_is_reported_in_central_time() {
        let mut registrant = registrant();
        registrant.signed_at = Some(Utc.with_ymd_and_hms(2020, 11, 1, 3, 0, 0).unwrap());
        let central = registrant.signed_at_central_tz().expect("signed");
        assert_eq!(central.format("%m/%d/%Y").to_string(), "10/31/2020");
    }

    #[test]
    fn populate_address_prefills_without_overwriting() {
        let mut registrant = registrant();
        registrant.set_value("zip", "66046");
        registrant
            .populate_address(&tree(json!({
                "Address": "1200 Oread Ave, Apt 4, Lawrence, KS 66044",
                "Party": "Democratic",
                "County": "Douglas"
            })))
            .expect("address parses");

        assert_eq!(registrant.try_value("addr"), "1200 Oread Ave");
        assert_eq!(registrant.try_value("unit"), "Apt 4");
        assert_eq!(registrant.try_value("city"), "Lawrence");
        assert_eq!(registrant.try_value("state"), "KS");
        assert_eq!(registrant.try_value("zip"), "66046");
        assert_eq!(registrant.party.as_deref(), Some("Democratic"));
        assert_eq!(registrant.county.as_deref(), Some("Douglas"));
    }

    #[test]
    fn populate_address_keeps_existing_county() {
        let mut registrant = registrant();
        registrant.county = Some("Johnson".to_string());
        registrant
            .populate_address(&tree(json!({"County": "Douglas"})))
            .expect("no address is fine");
        assert_eq!(registrant.county.as_deref(), Some("Johnson"));
    }

    #[test]
    fn populate_address_reports_malformed_addresses() {
        let mut registrant = registrant();
        let err = registrant
            .populate_address(&tree(json!({"Address": "somewhere"})))
            .expect_err("malformed");
        assert!(matches!(err, AddressParseError::TooFewComponents { .. }));
    }

    #[test]
    fn sos_values_round_trip_through_registration_values() {
        let mut registrant = registrant();
        assert!(registrant.sos_reg().is_none());
        registrant.set_value(
            "sos_reg",
            json!([{"tree": {"County": "Shawnee"}, "polling": {"name": "Library"}}]),
        );
        registrant.set_value("sos_failure", "timeout");
        registrant.set_value("skip_sos", "y");

        let records = registrant.sos_reg().expect("records stored");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].county(), Some("Shawnee"));
        assert!(records[0].polling.is_some());
        assert_eq!(registrant.sos_failure().as_deref(), Some("timeout"));
        assert!(registrant.skip_sos());
    }

    #[test]
    fn expiry_follows_last_update() {
        let registrant = registrant();
        let ttl = Duration::from_secs(600);
        let soon = registrant.updated_at + chrono::Duration::minutes(5);
        let later = registrant.updated_at + chrono::Duration::minutes(11);
        assert!(!registrant.is_expired(ttl, soon));
        assert!(registrant.is_expired(ttl, later));
    }

    #[test]
    fn elections_accepts_list_or_single_value() {
        let mut registrant = registrant();
        registrant.set_value("elections", json!(["General (11/3/2020)", "permanent"]));
        assert_eq!(registrant.elections().len(), 2);
        registrant.set_value("elections", "permanent");
        assert_eq!(registrant.elections(), vec!["permanent".to_string()]);
    }
}
