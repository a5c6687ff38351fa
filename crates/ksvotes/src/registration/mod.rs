//! Registration sessions: step 0 lookup, step submissions, county changes and filled forms
//! exposed over a JSON router.

pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use router::registration_router;
pub use service::{
    ChangeOrApplyView, CountyChange, CountyDetails, RegistrationError, RegistrationService, RegistrationSettings,
    SessionStarted, SessionView, StartSession, Step0Result, StepResult,
};
