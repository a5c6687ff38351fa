use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::registrant::domain::is_truthy;
use crate::registrant::RegistrationValues;

/// Every page of the registration and advance ballot flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepId {
    Step0,
    ChangeOrApply,
    VrCitizenship,
    VrName,
    VrAddress,
    VrParty,
    VrIdentification,
    VrPreview,
    VrAffirmation,
    VrSubmission,
    AbElectionPicker,
    AbAddress,
    AbIdentification,
    AbPreview,
    AbAffirmation,
    AbSubmission,
}

/// Which paperwork a step belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowPath {
    VoterRegistration,
    AdvanceBallot,
}

const VR_STEPS: &[StepId] = &[
    StepId::Step0,
    StepId::VrCitizenship,
    StepId::VrName,
    StepId::VrAddress,
    StepId::VrParty,
    StepId::VrIdentification,
    StepId::VrPreview,
    StepId::VrAffirmation,
    StepId::VrSubmission,
];

const AB_STEPS: &[StepId] = &[
    StepId::Step0,
    StepId::AbElectionPicker,
    StepId::AbAddress,
    StepId::AbIdentification,
    StepId::AbPreview,
    StepId::AbAffirmation,
    StepId::AbSubmission,
];

const ALL_STEPS: &[StepId] = &[
    StepId::Step0,
    StepId::ChangeOrApply,
    StepId::VrCitizenship,
    StepId::VrName,
    StepId::VrAddress,
    StepId::VrParty,
    StepId::VrIdentification,
    StepId::VrPreview,
    StepId::VrAffirmation,
    StepId::VrSubmission,
    StepId::AbElectionPicker,
    StepId::AbAddress,
    StepId::AbIdentification,
    StepId::AbPreview,
    StepId::AbAffirmation,
    StepId::AbSubmission,
];

impl FlowPath {
    /// Steps in order, starting with the shared lookup step.
    pub fn steps(self) -> &'static [StepId] {
        match self {
            FlowPath::VoterRegistration => VR_STEPS,
            FlowPath::AdvanceBallot => AB_STEPS,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            FlowPath::VoterRegistration => "voter_registration",
            FlowPath::AdvanceBallot => "advance_ballot",
        }
    }
}

impl StepId {
    pub const fn endpoint(self) -> &'static str {
        match self {
            StepId::Step0 => "/",
            StepId::ChangeOrApply => "/change-or-apply/",
            StepId::VrCitizenship => "/vr/citizenship",
            StepId::VrName => "/vr/name",
            StepId::VrAddress => "/vr/address",
            StepId::VrParty => "/vr/party",
            StepId::VrIdentification => "/vr/identification",
            StepId::VrPreview => "/vr/preview",
            StepId::VrAffirmation => "/vr/affirmation",
            StepId::VrSubmission => "/vr/submission",
            StepId::AbElectionPicker => "/ab/election_picker",
            StepId::AbAddress => "/ab/address",
            StepId::AbIdentification => "/ab/identification",
            StepId::AbPreview => "/ab/preview",
            StepId::AbAffirmation => "/ab/affirmation",
            StepId::AbSubmission => "/ab/submission",
        }
    }

    /// URL segment used by the JSON API.
    pub const fn slug(self) -> &'static str {
        match self {
            StepId::Step0 => "step0",
            StepId::ChangeOrApply => "change_or_apply",
            StepId::VrCitizenship => "vr_citizenship",
            StepId::VrName => "vr_name",
            StepId::VrAddress => "vr_address",
            StepId::VrParty => "vr_party",
            StepId::VrIdentification => "vr_identification",
            StepId::VrPreview => "vr_preview",
            StepId::VrAffirmation => "vr_affirmation",
            StepId::VrSubmission => "vr_submission",
            StepId::AbElectionPicker => "ab_election_picker",
            StepId::AbAddress => "ab_address",
            StepId::AbIdentification => "ab_identification",
            StepId::AbPreview => "ab_preview",
            StepId::AbAffirmation => "ab_affirmation",
            StepId::AbSubmission => "ab_submission",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        ALL_STEPS.iter().copied().find(|step| step.slug() == slug)
    }

    pub fn path(self) -> Option<FlowPath> {
        if VR_STEPS[1..].contains(&self) {
            Some(FlowPath::VoterRegistration)
        } else if AB_STEPS[1..].contains(&self) {
            Some(FlowPath::AdvanceBallot)
        } else {
            None
        }
    }

    /// The following step on the same path; the session manager decides what comes after
    /// step 0.
    pub fn next(self) -> Option<StepId> {
        let steps = self.path()?.steps();
        let index = steps.iter().position(|step| *step == self)?;
        steps.get(index + 1).copied()
    }

    /// Steps that must be satisfied before this one may be shown.
    pub fn prerequisites(self) -> &'static [StepId] {
        match self.path() {
            Some(path) => {
                let steps = path.steps();
                let index = steps.iter().position(|step| *step == self).unwrap_or(0);
                &steps[..index]
            }
            None if self == StepId::ChangeOrApply => &VR_STEPS[..1],
            None => &[],
        }
    }

    /// Terminal submission pages take no input.
    pub const fn accepts_input(self) -> bool {
        !matches!(
            self,
            StepId::ChangeOrApply | StepId::VrSubmission | StepId::AbSubmission
        )
    }
}

/// Result of checking a set of values against one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    pub step: StepId,
    pub is_complete: bool,
    pub missing: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

/// Reason given when the visitor is not a citizen or not yet eighteen.
pub const INELIGIBLE: &str = "ineligible";

impl StepOutcome {
    pub fn evaluate(step: StepId, values: &RegistrationValues) -> Self {
        let missing = missing_requirements(step, values);
        let reason = (step == StepId::VrCitizenship && !missing.is_empty()).then_some(INELIGIBLE);
        Self {
            step,
            is_complete: missing.is_empty(),
            missing,
            reason,
        }
    }

    pub fn complete(step: StepId) -> Self {
        Self {
            step,
            is_complete: true,
            missing: Vec::new(),
            reason: None,
        }
    }
}

fn text_present(values: &RegistrationValues, key: &str) -> bool {
    match values.get(key) {
        Some(Value::String(text)) => !text.trim().is_empty(),
        Some(Value::Number(_)) => true,
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Array(items)) => !items.is_empty(),
        _ => false,
    }
}

fn flag_set(values: &RegistrationValues, key: &str) -> bool {
    values.get(key).map(is_truthy).unwrap_or(false)
}

fn require_all(values: &RegistrationValues, keys: &[&'static str], missing: &mut Vec<&'static str>) {
    missing.extend(keys.iter().copied().filter(|key| !text_present(values, key)));
}

fn elections(values: &RegistrationValues) -> Vec<String> {
    match values.get("elections") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect(),
        Some(Value::String(item)) if !item.trim().is_empty() => vec![item.trim().to_string()],
        _ => Vec::new(),
    }
}

const RESIDENCE: &[&str] = &["addr", "city", "state", "zip"];
const PREVIOUS_RESIDENCE: &[&str] = &["prev_addr", "prev_city", "prev_state", "prev_zip"];
const MAILING: &[&str] = &["mail_addr", "mail_city", "mail_state", "mail_zip"];

/// Fields a step still needs, in declaration order.
pub fn missing_requirements(step: StepId, values: &RegistrationValues) -> Vec<&'static str> {
    let mut missing = Vec::new();
    match step {
        StepId::Step0 => require_all(
            values,
            &["name_first", "name_last", "dob", "zip", "email"],
            &mut missing,
        ),
        StepId::VrCitizenship => {
            for key in ["is_citizen", "is_eighteen"] {
                if !flag_set(values, key) {
                    missing.push(key);
                }
            }
        }
        StepId::VrName => {
            require_all(values, &["name_first", "name_last"], &mut missing);
            if flag_set(values, "has_prev_name") {
                require_all(values, &["prev_name_first", "prev_name_last"], &mut missing);
            }
        }
        StepId::VrAddress | StepId::AbAddress => {
            require_all(values, RESIDENCE, &mut missing);
            if step == StepId::VrAddress && flag_set(values, "has_prev_addr") {
                require_all(values, PREVIOUS_RESIDENCE, &mut missing);
            }
            if flag_set(values, "has_mail_addr") {
                require_all(values, MAILING, &mut missing);
            }
        }
        StepId::VrParty => require_all(values, &["party"], &mut missing),
        StepId::VrIdentification => require_all(values, &["identification"], &mut missing),
        StepId::AbIdentification => require_all(values, &["ab_identification"], &mut missing),
        StepId::AbElectionPicker => {
            let picked = elections(values);
            if picked.is_empty() {
                missing.push("elections");
            } else if picked.iter().any(|election| election == "permanent") {
                require_all(values, &["perm_reason"], &mut missing);
            }
        }
        StepId::VrPreview | StepId::AbPreview => {
            require_all(values, &["signature_string"], &mut missing)
        }
        StepId::VrAffirmation | StepId::AbAffirmation => {
            if !flag_set(values, "affirmation") {
                missing.push("affirmation");
            }
        }
        StepId::ChangeOrApply | StepId::VrSubmission | StepId::AbSubmission => {}
    }
    missing
}
