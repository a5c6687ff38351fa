use serde_json::{Map, Value};
use tracing::warn;

use crate::registrant::SosRecord;

/// Registry answer after the divergent response shapes have been folded together.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    NoMatch,
    Matches(Vec<SosRecord>),
    /// The registry answered with a bare status and no voter record.
    Status(String),
}

impl LookupOutcome {
    pub fn matches(&self) -> &[SosRecord] {
        match self {
            LookupOutcome::Matches(records) => records,
            _ => &[],
        }
    }

    pub fn into_matches(self) -> Vec<SosRecord> {
        match self {
            LookupOutcome::Matches(records) => records,
            _ => Vec::new(),
        }
    }

    /// True when a record is active, or carries no status at all.
    pub fn is_registered(&self) -> bool {
        match self {
            LookupOutcome::NoMatch => false,
            LookupOutcome::Status(status) => status.eq_ignore_ascii_case("active"),
            LookupOutcome::Matches(records) => records.iter().any(|record| {
                record
                    .status()
                    .map(|status| status.eq_ignore_ascii_case("active"))
                    .unwrap_or(true)
            }),
        }
    }
}

/// Fold a registry response body into a [`LookupOutcome`].
pub fn normalize_response(body: Value) -> LookupOutcome {
    let items = match body {
        Value::Null => return LookupOutcome::NoMatch,
        Value::Array(items) => items,
        Value::Object(mut object) => {
            if let Some(Value::Array(items)) = object.remove("matches") {
                items
            } else if object.contains_key("tree") {
                vec![Value::Object(object)]
            } else if let Some(status) = object.get("status").and_then(Value::as_str) {
                return LookupOutcome::Status(status.trim().to_string());
            } else {
                return LookupOutcome::NoMatch;
            }
        }
        other => {
            warn!(kind = value_kind(&other), "unexpected registry response shape");
            return LookupOutcome::NoMatch;
        }
    };

    let mut records: Vec<SosRecord> = Vec::new();
    for (index, item) in items.into_iter().enumerate() {
        match record_from_value(item) {
            Some(record) => {
                if !records.iter().any(|existing| existing.tree == record.tree) {
                    records.push(record);
                }
            }
            None => warn!(index, "skipping registry match without a record tree"),
        }
    }

    if records.is_empty() {
        LookupOutcome::NoMatch
    } else {
        LookupOutcome::Matches(records)
    }
}

fn record_from_value(item: Value) -> Option<SosRecord> {
    let Value::Object(mut object) = item else {
        return None;
    };

    let mut tree: Map<String, Value> = match object.remove("tree") {
        Some(Value::Object(tree)) => tree,
        _ => return None,
    };

    if let Some(Value::String(status)) = object.remove("status") {
        tree.entry("Status".to_string())
            .or_insert(Value::String(status));
    }

    let sample_ballot = object
        .remove("sample_ballots")
        .or_else(|| object.remove("sample_ballot"))
        .filter(|value| !value.is_null());

    Some(SosRecord {
        tree,
        sample_ballot,
        districts: object.remove("districts").filter(|value| !value.is_null()),
        elections: object.remove("elections").filter(|value| !value.is_null()),
        polling: object.remove("polling").filter(|value| !value.is_null()),
    })
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
