use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::error;

use crate::registrant::Registrant;
use crate::workflow::{effective_county, BallotFlavor};

/// Field/value document posted to the form filler.
pub type FormPayload = Map<String, Value>;

const STATE_NAME: &str = "Kansas";
const PREFIXES: &[&str] = &["mr", "mrs", "miss", "ms"];
const SUFFIXES: &[&str] = &["jr", "sr", "ii", "iii", "iv"];

/// Which government form to marshal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormKind {
    VoterRegistration,
    AdvanceBallot {
        flavor: BallotFlavor,
        election: String,
    },
}

fn unit_prefix() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^(#|apt\.?\s|apartment\s)").expect("unit prefix pattern compiles")
    })
}

fn election_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(Prim\w+|General) \((.+)\)").expect("election pattern compiles")
    })
}

/// Drop the `#`, `apt`, or `apartment` lead-in so the form can print its own `#`.
pub fn normalize_unit(unit: &str) -> String {
    unit_prefix().replace(unit.trim(), "").trim().to_string()
}

pub fn format_street_address(street: &str, unit: &str) -> String {
    let unit = normalize_unit(unit);
    if unit.is_empty() {
        street.to_string()
    } else {
        format!("{street} #{unit}")
    }
}

/// Date inside `Primary (DATE)` / `General (DATE)` election labels.
pub fn parse_election_date(election: &str) -> Option<String> {
    election_pattern()
        .captures(election.trim())
        .map(|captures| captures[2].to_string())
}

pub fn marshall_payload(registrant: &Registrant, kind: &FormKind) -> FormPayload {
    let mut payload = match kind {
        FormKind::VoterRegistration => vr_payload(registrant),
        FormKind::AdvanceBallot { flavor, election } => ab_payload(registrant, *flavor, election),
    };

    let unsigned = match payload.get("signature") {
        Some(Value::String(signature)) => signature.is_empty(),
        _ => true,
    };
    if unsigned {
        payload.remove("signature");
    }

    payload
}

fn text(value: String) -> Value {
    Value::String(value)
}

fn signature(registrant: &Registrant) -> Option<String> {
    Some(registrant.try_value("signature_string")).filter(|sig| !sig.is_empty())
}

/// Formatted signing date, or `false` when unsigned.
fn signed_on(registrant: &Registrant, signed: bool, format: &str) -> Value {
    match (signed, registrant.signed_at_central_tz()) {
        (true, Some(at)) => text(at.format(format).to_string()),
        _ => Value::Bool(false),
    }
}

fn ab_payload(registrant: &Registrant, flavor: BallotFlavor, election: &str) -> FormPayload {
    let r = registrant;
    let sig = signature(r);
    let county = effective_county(r).map(Value::String).unwrap_or(Value::Null);
    let party = r.party_label().to_lowercase();

    let mut payload = FormPayload::new();
    payload.insert("state".into(), text(STATE_NAME.to_string()));
    payload.insert("county_1".into(), county.clone());
    payload.insert("county_2".into(), county);
    payload.insert("id_number".into(), text(r.try_value("ab_identification")));
    payload.insert("last_name".into(), text(r.try_value("name_last")));
    payload.insert("first_name".into(), text(r.try_value("name_first")));
    payload.insert("middle_initial".into(), text(r.middle_initial()));
    payload.insert("dob".into(), text(r.try_value("dob")));
    payload.insert(
        "residential_address".into(),
        text(format_street_address(&r.try_value("addr"), &r.try_value("unit"))),
    );
    payload.insert("residential_city".into(), text(r.try_value("city")));
    payload.insert("residential_state".into(), text(r.try_value("state")));
    payload.insert("residential_zip".into(), text(r.try_value("zip")));
    payload.insert(
        "mailing_address".into(),
        text(format_street_address(
            &r.try_value("mail_addr"),
            &r.try_value("mail_unit"),
        )),
    );
    payload.insert("mailing_state".into(), text(r.try_value("mail_state")));
    payload.insert("mailing_zip".into(), text(r.try_value("mail_zip")));

    match flavor {
        BallotFlavor::Ksav1 => {
            payload.insert("mailing_city".into(), text(r.try_value("mail_city")));
            let date = parse_election_date(election).unwrap_or_else(|| {
                error!(session_id = %r.session_id, "no date in election label");
                "(none)".to_string()
            });
            payload.insert("election_date".into(), text(date));
        }
        BallotFlavor::Ksav2 => {
            payload.insert("reason_for_perm".into(), text(r.try_value("perm_reason")));
        }
    }

    payload.insert(
        "signature_date".into(),
        signed_on(r, sig.is_some(), "%m/%d/%Y"),
    );
    payload.insert("phone_number".into(), text(r.try_value("phone")));
    payload.insert("democratic".into(), Value::Bool(party == "democratic"));
    payload.insert("republican".into(), Value::Bool(party == "republican"));
    payload.insert(
        "signature".into(),
        sig.map(Value::String).unwrap_or(Value::Null),
    );
    payload
}

fn vr_payload(registrant: &Registrant) -> FormPayload {
    let r = registrant;
    let sig = signature(r);
    let mut payload = FormPayload::new();

    payload.insert("00_citizen_yes".into(), Value::Bool(r.is_citizen));
    payload.insert("00_citizen_no".into(), Value::Bool(!r.is_citizen));
    payload.insert("00_eighteenPlus_yes".into(), Value::Bool(r.is_eighteen));

    let prefix = r.try_value("prefix");
    for option in PREFIXES {
        payload.insert(format!("01_prefix_{option}"), Value::Bool(prefix == *option));
    }
    let suffix = r.try_value("suffix");
    for option in SUFFIXES {
        payload.insert(format!("01_suffix_{option}"), Value::Bool(suffix == *option));
    }

    payload.insert("01_firstName".into(), text(r.try_value("name_first")));
    payload.insert("01_lastName".into(), text(r.try_value("name_last")));
    payload.insert("01_middleName".into(), text(r.try_value("name_middle")));
    payload.insert("02_homeAddress".into(), text(r.try_value("addr")));
    payload.insert("02_aptLot".into(), text(normalize_unit(&r.try_value("unit"))));
    payload.insert("02_cityTown".into(), text(r.try_value("city")));
    payload.insert("02_state".into(), text(r.try_value("state")));
    payload.insert("02_zipCode".into(), text(r.try_value("zip")));
    payload.insert(
        "03_mailAddress".into(),
        text(format_street_address(
            &r.try_value("mail_addr"),
            &r.try_value("mail_unit"),
        )),
    );
    payload.insert("03_cityTown".into(), text(r.try_value("mail_city")));
    payload.insert("03_state".into(), text(r.try_value("mail_state")));
    payload.insert("03_zipCode".into(), text(r.try_value("mail_zip")));
    payload.insert("04_dob".into(), text(r.try_value("dob")));
    payload.insert("05_telephone".into(), text(r.try_value("phone")));
    payload.insert("06_idNumber".into(), text(r.try_value("identification")));
    payload.insert("07_party".into(), text(r.party_label()));
    payload.insert("08_raceEthnic".into(), text(String::new()));
    payload.insert("09_month".into(), signed_on(r, sig.is_some(), "%m"));
    payload.insert("09_day".into(), signed_on(r, sig.is_some(), "%d"));
    payload.insert("09_year".into(), signed_on(r, sig.is_some(), "%Y"));

    let prev_prefix = r.try_value("prev_prefix");
    for option in PREFIXES {
        payload.insert(format!("A_prefix_{option}"), Value::Bool(prev_prefix == *option));
    }
    let prev_suffix = r.try_value("prev_suffix");
    for option in SUFFIXES {
        payload.insert(format!("A_suffix_{option}"), Value::Bool(prev_suffix == *option));
    }

    payload.insert("A_firstName".into(), text(r.try_value("prev_name_first")));
    payload.insert("A_lastName".into(), text(r.try_value("prev_name_last")));
    payload.insert("A_middleName".into(), text(r.try_value("prev_name_middle")));
    payload.insert("B_homeAddress".into(), text(r.try_value("prev_addr")));
    payload.insert("B_aptLot".into(), text(r.try_value("prev_unit")));
    payload.insert("B_cityTown".into(), text(r.try_value("prev_city")));
    payload.insert("B_state".into(), text(r.try_value("prev_state")));
    payload.insert("B_zipCode".into(), text(r.try_value("prev_zip")));
    payload.insert("D_helper".into(), text(r.try_value("helper")));
    payload.insert(
        "signature".into(),
        sig.map(Value::String).unwrap_or(Value::Null),
    );
    payload
}
