use crate::registrant::domain::is_truthy;
use crate::registrant::Registrant;

use super::steps::{FlowPath, StepId, StepOutcome};

/// Decides where a visitor goes after submitting a step, and which step a visitor may see.
pub struct SessionManager<'a> {
    registrant: &'a Registrant,
    current: &'a StepOutcome,
    enable_ab: bool,
}

impl<'a> SessionManager<'a> {
    pub fn new(registrant: &'a Registrant, current: &'a StepOutcome, enable_ab: bool) -> Self {
        Self {
            registrant,
            current,
            enable_ab,
        }
    }

    pub fn next_step(&self) -> StepId {
        if !self.current.is_complete {
            return self.current.step;
        }

        match self.current.step {
            StepId::Step0 if self.registrant.skip_sos() && !self.enable_ab => StepId::VrCitizenship,
            StepId::Step0 => StepId::ChangeOrApply,
            step => step.next().unwrap_or(step),
        }
    }

    pub fn get_redirect_url(&self) -> &'static str {
        self.next_step().endpoint()
    }
}

/// Set once the ballot application itself was signed; the registration signature shares its key.
pub const AB_SIGNED_KEY: &str = "ab_signed";

/// Whether the stored registrant already satisfies a step.
pub fn is_satisfied(registrant: &Registrant, step: StepId) -> bool {
    let outcome = StepOutcome::evaluate(step, &registrant.registration_value);
    if !outcome.is_complete {
        return false;
    }
    match step {
        StepId::AbPreview => registrant.value(AB_SIGNED_KEY).map(is_truthy).unwrap_or(false),
        StepId::VrAffirmation => registrant.vr_completed_at.is_some(),
        StepId::AbAffirmation => registrant.ab_completed_at.is_some(),
        _ => true,
    }
}

/// The step a visitor asking for `requested` is allowed to see: the request itself once
/// everything before it is satisfied, otherwise the earliest unsatisfied step.
pub fn resolve(registrant: Option<&Registrant>, requested: StepId, enable_ab: bool) -> StepId {
    if requested.path() == Some(FlowPath::AdvanceBallot) && !enable_ab {
        return resolve(registrant, StepId::ChangeOrApply, enable_ab);
    }

    let Some(registrant) = registrant else {
        return StepId::Step0;
    };

    requested
        .prerequisites()
        .iter()
        .copied()
        .find(|step| !is_satisfied(registrant, *step))
        .unwrap_or(requested)
}
