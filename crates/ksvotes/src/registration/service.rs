use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::cache::TtlCache;
use crate::config::{is_supported_language, AppConfig};
use crate::directory::{Clerk, CountyDirectory, VotingSite};
use crate::forms::{AbFormImage, FormFillerError, FormService};
use crate::lookup::{run_step0, LookupError, LookupQuery, VoterLookup};
use crate::registrant::{
    CompletedCounts, Registrant, RegistrantRepository, RegistrationValues, RepositoryError,
    SessionId, SosRecord,
};
use crate::workflow::{
    effective_county, plan_paperwork, recommended_path, resolve, FlowPath, Paperwork,
    SessionManager, StepId, StepOutcome, AB_SIGNED_KEY,
};

const TOTALS_CACHE_KEY: &str = "total-processed";
const TOTALS_TTL: Duration = Duration::from_secs(60 * 60);

/// Flow switches and session policy the service runs under.
#[derive(Debug, Clone)]
pub struct RegistrationSettings {
    pub enable_ab: bool,
    pub session_ttl: Duration,
    pub demo_uuid: Option<Uuid>,
    pub default_locale: String,
}

impl RegistrationSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            enable_ab: config.features.enable_ab,
            session_ttl: config.session.ttl,
            demo_uuid: config.session.demo_uuid,
            default_locale: config.locale.default_locale.clone(),
        }
    }
}

impl Default for RegistrationSettings {
    fn default() -> Self {
        Self {
            enable_ab: false,
            session_ttl: Duration::from_secs(10 * 60),
            demo_uuid: None,
            default_locale: "en".to_string(),
        }
    }
}

/// Referral or landing request opening a new session.
#[derive(Debug, Clone, Default)]
pub struct StartSession {
    pub ref_code: Option<String>,
    pub lang: Option<String>,
    pub prefill: Option<RegistrationValues>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStarted {
    pub session_id: SessionId,
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    pub ref_code: Option<String>,
    pub redirect: &'static str,
}

/// Public summary of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub session_id: SessionId,
    pub lang: String,
    pub county: Option<String>,
    pub reg_lookup_complete: bool,
    pub reg_found: bool,
    pub vr_step: StepId,
    pub ab_step: Option<StepId>,
    pub vr_completed: bool,
    pub ab_completed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Step0Result {
    pub session_id: SessionId,
    pub redirect: &'static str,
    pub reg_lookup_complete: bool,
    pub reg_found: bool,
    pub matches: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sos_failure: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangeOrApplyView {
    pub skip_sos: bool,
    pub sos_reg: Option<Vec<SosRecord>>,
    pub sos_failure: Option<String>,
    pub county: Option<String>,
    pub clerk: Option<Clerk>,
    pub early_voting_locations: Vec<VotingSite>,
    pub dropboxes: Vec<VotingSite>,
    pub recommended_path: FlowPath,
    pub ab_enabled: bool,
}

/// Where a county's voters send paperwork and cast ballots early.
#[derive(Debug, Clone, Serialize)]
pub struct CountyDetails {
    pub clerk: Clerk,
    pub early_voting_locations: Vec<VotingSite>,
    pub dropboxes: Vec<VotingSite>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CountyChange {
    pub county: Option<String>,
    pub changed: bool,
    pub ab_forms_resigned: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub step: StepId,
    pub accepted: bool,
    pub is_complete: bool,
    pub missing: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    pub redirect: &'static str,
}

/// Error raised by the registration service.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("session {0} not found")]
    SessionNotFound(SessionId),
    #[error("session {0} expired")]
    SessionExpired(SessionId),
    #[error("unknown step '{0}'")]
    UnknownStep(String),
    #[error("step {} does not accept submissions", .0.slug())]
    StepClosed(StepId),
    #[error("step {} is missing {}", .step.slug(), .missing.join(", "))]
    Validation {
        step: StepId,
        missing: Vec<&'static str>,
    },
    #[error("advance ballot applications are disabled")]
    AdvanceBallotDisabled,
    #[error(transparent)]
    InvalidQuery(LookupError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    FormFiller(#[from] FormFillerError),
    #[error("registrant data could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Service composing the registry lookup, registrant storage, step routing and form filling.
pub struct RegistrationService<R> {
    repository: Arc<R>,
    lookup: Arc<dyn VoterLookup>,
    forms: FormService,
    directory: Arc<CountyDirectory>,
    totals: TtlCache<CompletedCounts>,
    settings: RegistrationSettings,
}

impl<R> RegistrationService<R>
where
    R: RegistrantRepository + 'static,
{
    pub fn new(
        repository: Arc<R>,
        lookup: Arc<dyn VoterLookup>,
        forms: FormService,
        directory: Arc<CountyDirectory>,
        settings: RegistrationSettings,
    ) -> Self {
        Self {
            repository,
            lookup,
            forms,
            directory,
            totals: TtlCache::default(),
            settings,
        }
    }

    pub fn settings(&self) -> &RegistrationSettings {
        &self.settings
    }

    fn lang_or_default(&self, lang: Option<&str>) -> String {
        lang.map(|lang| lang.trim().to_ascii_lowercase())
            .filter(|lang| is_supported_language(lang))
            .unwrap_or_else(|| self.settings.default_locale.clone())
    }

    fn save(&self, mut registrant: Registrant, is_new: bool) -> Result<Registrant, RepositoryError> {
        registrant.touch(Utc::now());
        if is_new {
            self.repository.insert(registrant)
        } else {
            self.repository.update(registrant.clone())?;
            Ok(registrant)
        }
    }

    /// Fetch a live registrant; expired sessions count as missing.
    pub fn load(&self, session_id: &SessionId) -> Result<Registrant, RegistrationError> {
        let registrant = self
            .repository
            .fetch(session_id)?
            .ok_or(RegistrationError::SessionNotFound(*session_id))?;
        if registrant.is_expired(self.settings.session_ttl, Utc::now()) {
            info!(%session_id, "session expired");
            return Err(RegistrationError::SessionExpired(*session_id));
        }
        Ok(registrant)
    }

    /// Open a session. The `demo` referral attaches to the shared demo session when one is
    /// configured.
    pub fn start_session(&self, request: StartSession) -> Result<SessionStarted, RegistrationError> {
        let ref_code = request
            .ref_code
            .map(|code| code.trim().to_string())
            .filter(|code| !code.is_empty());

        let session_id = match (ref_code.as_deref(), self.settings.demo_uuid) {
            (Some("demo"), Some(demo)) => SessionId(demo),
            _ => SessionId::generate(),
        };

        let existing = self.repository.fetch(&session_id)?;
        let is_new = existing.is_none();
        let lang = self.lang_or_default(request.lang.as_deref());
        let mut registrant =
            existing.unwrap_or_else(|| Registrant::new(session_id, lang.clone(), Utc::now()));
        registrant.lang = lang;
        if ref_code.is_some() {
            registrant.ref_code = ref_code.clone();
        }
        if let Some(prefill) = request.prefill {
            registrant.update(prefill);
        }

        self.save(registrant, is_new)?;
        info!(%session_id, referral = ref_code.as_deref().unwrap_or("-"), "session started");

        Ok(SessionStarted {
            session_id,
            ref_code,
            redirect: StepId::Step0.endpoint(),
        })
    }

    pub fn session_view(&self, session_id: &SessionId) -> Result<SessionView, RegistrationError> {
        let registrant = self.load(session_id)?;
        let enable_ab = self.settings.enable_ab;
        Ok(SessionView {
            session_id: registrant.session_id,
            lang: registrant.lang.clone(),
            county: effective_county(&registrant),
            reg_lookup_complete: registrant.reg_lookup_complete,
            reg_found: registrant.reg_found,
            vr_step: resolve(Some(&registrant), StepId::VrSubmission, enable_ab),
            ab_step: enable_ab.then(|| resolve(Some(&registrant), StepId::AbSubmission, true)),
            vr_completed: registrant.vr_completed_at.is_some(),
            ab_completed: registrant.ab_completed_at.is_some(),
        })
    }

    /// Step 0: record identity, look the visitor up in the registry, merge what it knows.
    pub async fn submit_step0(
        &self,
        session_id: &SessionId,
        form: RegistrationValues,
        skip_sos: bool,
    ) -> Result<Step0Result, RegistrationError> {
        let (mut registrant, is_new) = match self.load(session_id) {
            Ok(registrant) => (registrant, false),
            Err(RegistrationError::SessionNotFound(_)) => {
                let lang = self.lang_or_default(form.get("lang").and_then(Value::as_str));
                (Registrant::new(*session_id, lang, Utc::now()), true)
            }
            Err(RegistrationError::SessionExpired(_)) => {
                let lang = self.lang_or_default(form.get("lang").and_then(Value::as_str));
                (Registrant::new(*session_id, lang, Utc::now()), false)
            }
            Err(other) => return Err(other),
        };

        let step = run_step0(self.lookup.as_ref(), session_id, &form, skip_sos).await;
        if !step.step.is_complete {
            return Err(RegistrationError::Validation {
                step: StepId::Step0,
                missing: step.step.missing,
            });
        }

        if registrant.ref_code.is_none() {
            registrant.ref_code = form
                .get("ref")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|code| !code.is_empty())
                .map(str::to_string);
        }
        registrant.update(form);
        if registrant.county.is_none() {
            registrant.county = self.directory.guess_county(&registrant.try_value("zip"));
        }

        registrant.reg_lookup_complete = step.reg_lookup_complete;
        registrant.reg_found = step.reg_found.is_some();
        registrant.dob_year = registrant.get_dob_year();

        let matches = step.reg_found.as_ref().map(Vec::len).unwrap_or(0);
        let sos_reg = match step.reg_found {
            Some(records) => {
                for record in &records {
                    if let Err(err) = registrant.populate_address(&record.tree) {
                        error!(%session_id, error = %err, "unable to prefill from registry record");
                    }
                }
                serde_json::to_value(&records)?
            }
            None => Value::Null,
        };

        registrant.set_value("sos_reg", sos_reg);
        registrant.set_value("skip_sos", skip_sos);
        registrant.set_value(
            "sos_failure",
            step.voter_view_fail
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null),
        );

        let registrant = self.save(registrant, is_new)?;
        let redirect = SessionManager::new(&registrant, &step.step, self.settings.enable_ab)
            .get_redirect_url();

        Ok(Step0Result {
            session_id: *session_id,
            redirect,
            reg_lookup_complete: registrant.reg_lookup_complete,
            reg_found: registrant.reg_found,
            matches,
            sos_failure: step.voter_view_fail,
        })
    }

    pub fn change_or_apply(
        &self,
        session_id: &SessionId,
    ) -> Result<ChangeOrApplyView, RegistrationError> {
        let registrant = self.load(session_id)?;
        let county = effective_county(&registrant);
        let clerk = county
            .as_deref()
            .and_then(|county| self.directory.find_by_county(county))
            .cloned();
        let (early_voting_locations, dropboxes) = match county.as_deref() {
            Some(county) => (
                self.directory.early_voting_locations(county).to_vec(),
                self.directory.dropboxes(county).to_vec(),
            ),
            None => (Vec::new(), Vec::new()),
        };

        Ok(ChangeOrApplyView {
            skip_sos: registrant.skip_sos(),
            sos_reg: registrant.sos_reg(),
            sos_failure: registrant.sos_failure(),
            county,
            clerk,
            early_voting_locations,
            dropboxes,
            recommended_path: recommended_path(&registrant, self.settings.enable_ab),
            ab_enabled: self.settings.enable_ab,
        })
    }

    /// Move the registrant to another county. Cached ballot applications print the county,
    /// so they are regenerated.
    pub async fn change_county(
        &self,
        session_id: &SessionId,
        new_county: Option<String>,
    ) -> Result<CountyChange, RegistrationError> {
        let mut registrant = self.load(session_id)?;
        let new_county = new_county
            .map(|county| county.trim().to_string())
            .filter(|county| !county.is_empty());

        let Some(new_county) = new_county.filter(|county| Some(county) != registrant.county.as_ref())
        else {
            error!(%session_id, "unable to change county");
            return Ok(CountyChange {
                county: registrant.county,
                changed: false,
                ab_forms_resigned: false,
            });
        };

        info!(%session_id, "county changed");
        registrant.county = Some(new_county);

        let resign = registrant.has_ab_forms();
        if resign {
            self.forms.sign_ab_forms(&mut registrant).await?;
        }

        let registrant = self.save(registrant, false)?;
        Ok(CountyChange {
            county: registrant.county,
            changed: true,
            ab_forms_resigned: resign,
        })
    }

    /// Validate and store one step of the registration or ballot flow.
    pub fn submit_step(
        &self,
        session_id: &SessionId,
        slug: &str,
        form: RegistrationValues,
    ) -> Result<StepResult, RegistrationError> {
        let step =
            StepId::from_slug(slug).ok_or_else(|| RegistrationError::UnknownStep(slug.to_string()))?;
        if step == StepId::Step0 || !step.accepts_input() {
            return Err(RegistrationError::StepClosed(step));
        }
        if step.path() == Some(FlowPath::AdvanceBallot) && !self.settings.enable_ab {
            return Err(RegistrationError::AdvanceBallotDisabled);
        }

        let mut registrant = self.load(session_id)?;
        let allowed = resolve(Some(&registrant), step, self.settings.enable_ab);
        if allowed != step {
            warn!(%session_id, requested = step.slug(), allowed = allowed.slug(), "step out of order");
            return Ok(StepResult {
                step,
                accepted: false,
                is_complete: false,
                missing: Vec::new(),
                reason: None,
                redirect: allowed.endpoint(),
            });
        }

        // Only the posted form counts; stored answers from another path never satisfy a step.
        let outcome = StepOutcome::evaluate(step, &form);

        if outcome.is_complete {
            registrant.update(form);
            apply_step_effects(&mut registrant, step);
            registrant = self.save(registrant, false)?;
        }

        let redirect =
            SessionManager::new(&registrant, &outcome, self.settings.enable_ab).get_redirect_url();

        Ok(StepResult {
            step,
            accepted: true,
            is_complete: outcome.is_complete,
            missing: outcome.missing,
            reason: outcome.reason,
            redirect,
        })
    }

    pub fn paperwork(
        &self,
        session_id: &SessionId,
        path: Option<FlowPath>,
    ) -> Result<Vec<Paperwork>, RegistrationError> {
        if path == Some(FlowPath::AdvanceBallot) && !self.settings.enable_ab {
            return Err(RegistrationError::AdvanceBallotDisabled);
        }
        let registrant = self.load(session_id)?;
        let path = path.unwrap_or_else(|| recommended_path(&registrant, self.settings.enable_ab));
        Ok(plan_paperwork(&registrant, path))
    }

    pub async fn vr_form(&self, session_id: &SessionId) -> Result<String, RegistrationError> {
        let registrant = self.load(session_id)?;
        Ok(self.forms.vr_form(&registrant).await?)
    }

    pub async fn ab_forms(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<AbFormImage>, RegistrationError> {
        if !self.settings.enable_ab {
            return Err(RegistrationError::AdvanceBallotDisabled);
        }
        let mut registrant = self.load(session_id)?;
        if registrant.elections().is_empty() {
            return Err(RegistrationError::Validation {
                step: StepId::AbElectionPicker,
                missing: vec!["elections"],
            });
        }

        let forms = self.forms.sign_ab_forms(&mut registrant).await?;
        self.save(registrant, false)?;
        Ok(forms)
    }

    /// Whether the registry knows an active voter for the given identity. Registry
    /// failures read as "not registered".
    pub async fn registration_check(&self, query: &LookupQuery) -> Result<bool, RegistrationError> {
        query.validate().map_err(RegistrationError::InvalidQuery)?;
        match self.lookup.lookup(query).await {
            Ok(outcome) => Ok(outcome.is_registered()),
            Err(err) => {
                warn!(error = %err, "registration check lookup failed");
                Ok(false)
            }
        }
    }

    pub async fn total_processed(&self) -> Result<CompletedCounts, RegistrationError> {
        let repository = Arc::clone(&self.repository);
        let counts = self
            .totals
            .get_or_set(TOTALS_CACHE_KEY, TOTALS_TTL, || async move {
                repository.completed_counts()
            })
            .await?;
        Ok(counts)
    }

    /// Clerk contact plus voting sites; `None` for counties without a clerk on file.
    pub fn county_details(&self, county: &str) -> Option<CountyDetails> {
        let clerk = self.directory.find_by_county(county)?.clone();
        Some(CountyDetails {
            clerk,
            early_voting_locations: self.directory.early_voting_locations(county).to_vec(),
            dropboxes: self.directory.dropboxes(county).to_vec(),
        })
    }
}

fn apply_step_effects(registrant: &mut Registrant, step: StepId) {
    let now = Utc::now();
    match step {
        StepId::VrCitizenship => {
            registrant.is_citizen = true;
            registrant.is_eighteen = true;
        }
        StepId::VrParty => {
            let party = registrant.try_value("party");
            registrant.party = Some(party.trim().to_string()).filter(|party| !party.is_empty());
        }
        StepId::AbElectionPicker => {
            registrant.ab_permanent = registrant
                .elections()
                .iter()
                .any(|election| election == "permanent");
        }
        StepId::VrPreview => registrant.signed_at = Some(now),
        StepId::AbPreview => {
            registrant.signed_at = Some(now);
            registrant.set_value(AB_SIGNED_KEY, true);
        }
        StepId::VrAffirmation => registrant.vr_completed_at = Some(now),
        StepId::AbAffirmation => registrant.ab_completed_at = Some(now),
        _ => {}
    }
}
