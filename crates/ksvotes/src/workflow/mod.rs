//! Step requirements, session routing, and paperwork selection.

pub mod paperwork;
pub mod session;
pub mod steps;

pub use paperwork::{
    effective_county, plan_paperwork, recommended_path, BallotFlavor, Paperwork,
};
pub use session::{is_satisfied, resolve, SessionManager, AB_SIGNED_KEY};
pub use steps::{missing_requirements, FlowPath, StepId, StepOutcome, INELIGIBLE};
