use tracing::{info, warn};

use super::client::VoterLookup;
use super::query::LookupQuery;
use crate::registrant::{RegistrationValues, SessionId, SosRecord};
use crate::workflow::{StepId, StepOutcome};

/// What step 0 learned about the visitor.
#[derive(Debug, Clone, PartialEq)]
pub struct Step0Outcome {
    pub step: StepOutcome,
    pub reg_lookup_complete: bool,
    pub reg_found: Option<Vec<SosRecord>>,
    pub voter_view_fail: Option<String>,
}

/// Validate the step 0 form and, unless skipped, look the visitor up in the registry.
///
/// Registry failures are recorded on the outcome and never fail the step; the visitor
/// continues as if no record had been found.
pub async fn run_step0(
    lookup: &dyn VoterLookup,
    session_id: &SessionId,
    form: &RegistrationValues,
    skip_sos: bool,
) -> Step0Outcome {
    let step = StepOutcome::evaluate(StepId::Step0, form);
    let mut outcome = Step0Outcome {
        step,
        reg_lookup_complete: false,
        reg_found: None,
        voter_view_fail: None,
    };

    if !outcome.step.is_complete || skip_sos {
        return outcome;
    }

    let query = LookupQuery::from_values(form);
    match lookup.lookup(&query).await {
        Ok(result) => {
            outcome.reg_lookup_complete = true;
            let matches = result.into_matches();
            info!(%session_id, matches = matches.len(), "registry lookup complete");
            if !matches.is_empty() {
                outcome.reg_found = Some(matches);
            }
        }
        Err(err) => {
            warn!(%session_id, error = %err, "registry lookup failed");
            outcome.voter_view_fail = Some(err.failure_reason());
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::{LookupError, LookupOutcome};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedLookup {
        fail: bool,
        calls: AtomicUsize,
    }

    impl ScriptedLookup {
        fn new(fail: bool) -> Self {
            Self {
                fail,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl VoterLookup for ScriptedLookup {
        async fn lookup(&self, _query: &LookupQuery) -> Result<LookupOutcome, LookupError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(LookupError::Status(503));
            }
            Ok(LookupOutcome::Matches(vec![SosRecord {
                tree: json!({"County": "Douglas"})
                    .as_object()
                    .cloned()
                    .unwrap_or_default(),
                sample_ballot: None,
                districts: None,
                elections: None,
                polling: None,
            }]))
        }
    }

    fn form() -> RegistrationValues {
        json!({
            "name_first": "Ada",
            "name_last": "Lovelace",
            "dob": "12/10/1990",
            "zip": "66044",
            "email": "ada@example.org",
        })
        .as_object()
        .cloned()
        .expect("object")
    }

    #[tokio::test]
    async fn complete_form_records_matches() {
        let lookup = ScriptedLookup::new(false);
        let outcome = run_step0(&lookup, &SessionId::generate(), &form(), false).await;

        assert!(outcome.step.is_complete);
        assert!(outcome.reg_lookup_complete);
        assert_eq!(outcome.reg_found.map(|found| found.len()), Some(1));
        assert!(outcome.voter_view_fail.is_none());
    }

    #[tokio::test]
    async fn registry_failure_is_recorded_not_raised() {
        let lookup = ScriptedLookup::new(true);
        let outcome = run_step0(&lookup, &SessionId::generate(), &form(), false).await;

        assert!(outcome.step.is_complete);
        assert!(!outcome.reg_lookup_complete);
        assert!(outcome.reg_found.is_none());
        assert_eq!(outcome.voter_view_fail.as_deref(), Some("http_503"));
    }

    #[tokio::test]
    async fn skipped_or_incomplete_forms_never_call_the_registry() {
        let lookup = ScriptedLookup::new(false);
        let skipped = run_step0(&lookup, &SessionId::generate(), &form(), true).await;
        assert!(skipped.step.is_complete);
        assert!(!skipped.reg_lookup_complete);

        let mut partial = form();
        partial.remove("email");
        let incomplete = run_step0(&lookup, &SessionId::generate(), &partial, false).await;
        assert!(!incomplete.step.is_complete);
        assert!(incomplete.step.missing.contains(&"email"));

        assert_eq!(lookup.calls.load(Ordering::SeqCst), 0);
    }
}
