//! Filled government forms: payload marshalling and the form-filler client.

pub mod filler;
pub mod payload;
pub mod service;

pub use filler::{
    filler_for_url, CannedFormFiller, FormFiller, FormFillerError, HttpFormFiller,
    UnconfiguredFormFiller, SIGNATURE_IMG_STRING, TESTING_URL,
};
pub use payload::{
    format_street_address, marshall_payload, normalize_unit, parse_election_date, FormKind,
    FormPayload,
};
pub use service::{AbFormImage, FormService};
