//! Secretary of State registry lookup and normalization of its answers.

pub mod client;
pub mod query;
pub mod records;
pub mod step;

pub use client::{HttpVoterLookup, LookupError, UnconfiguredLookup, VoterLookup};
pub use query::LookupQuery;
pub use records::{normalize_response, LookupOutcome};
pub use step::{run_step0, Step0Outcome};
