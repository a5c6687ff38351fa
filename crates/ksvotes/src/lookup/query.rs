use serde::{Deserialize, Serialize};

use super::client::LookupError;
use crate::registrant::RegistrationValues;

/// Identity fields sent to the SOS registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupQuery {
    pub name_first: String,
    pub name_last: String,
    pub dob: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub county: Option<String>,
}

impl LookupQuery {
    pub fn from_values(values: &RegistrationValues) -> Self {
        let text = |key: &str| {
            values
                .get(key)
                .and_then(serde_json::Value::as_str)
                .map(|value| value.trim().to_string())
                .unwrap_or_default()
        };
        let optional = |key: &str| Some(text(key)).filter(|value| !value.is_empty());

        Self {
            name_first: text("name_first"),
            name_last: text("name_last"),
            dob: text("dob"),
            zip: optional("zip"),
            county: optional("county"),
        }
    }

    /// First name, last name and date of birth are the minimum the registry accepts.
    pub fn validate(&self) -> Result<(), LookupError> {
        for (field, value) in [
            ("name_first", &self.name_first),
            ("name_last", &self.name_last),
            ("dob", &self.dob),
        ] {
            if value.trim().is_empty() {
                return Err(LookupError::MissingField(field));
            }
        }
        Ok(())
    }
}
