use ksvotes::config::AppConfig;
use ksvotes::directory::CountyDirectory;
use ksvotes::error::AppError;
use ksvotes::forms::{filler_for_url, FormService};
use ksvotes::lookup::{HttpVoterLookup, UnconfiguredLookup, VoterLookup};
use ksvotes::registrant::{
    CompletedCounts, Registrant, RegistrantRepository, RepositoryError, SessionId,
};
use ksvotes::registration::{RegistrationService, RegistrationSettings};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryRegistrantRepository {
    records: Arc<Mutex<HashMap<SessionId, Registrant>>>,
}

impl RegistrantRepository for InMemoryRegistrantRepository {
    fn insert(&self, registrant: Registrant) -> Result<Registrant, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(&registrant.session_id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(registrant.session_id, registrant.clone());
        Ok(registrant)
    }

    fn update(&self, registrant: Registrant) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(&registrant.session_id) {
            guard.insert(registrant.session_id, registrant);
            Ok(())
        } else {
            Err(RepositoryError::NotFound)
        }
    }

    fn fetch(&self, session_id: &SessionId) -> Result<Option<Registrant>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.get(session_id).cloned())
    }

    fn completed_counts(&self) -> Result<CompletedCounts, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        let registrations = guard
            .values()
            .filter(|registrant| registrant.vr_completed_at.is_some())
            .count();
        let advance_ballots = guard
            .values()
            .filter(|registrant| registrant.ab_completed_at.is_some())
            .count();
        Ok(CompletedCounts {
            registrations: registrations as u64,
            advance_ballots: advance_ballots as u64,
        })
    }
}

pub(crate) fn voter_lookup(config: &AppConfig) -> Result<Arc<dyn VoterLookup>, AppError> {
    match config.services.sos_lookup_url.as_deref() {
        Some(url) => Ok(Arc::new(HttpVoterLookup::new(
            url,
            config.services.request_timeout,
        )?)),
        None => {
            warn!("SOS_LOOKUP_URL not set; registry lookups will be skipped");
            Ok(Arc::new(UnconfiguredLookup))
        }
    }
}

/// Wire the registration service from configuration.
pub(crate) fn build_registration_service<R>(
    config: &AppConfig,
    repository: Arc<R>,
) -> Result<RegistrationService<R>, AppError>
where
    R: RegistrantRepository + 'static,
{
    let directory = CountyDirectory::from_config(&config.directory)?;
    let filler = filler_for_url(
        config.services.form_filler_url.as_deref(),
        config.services.request_timeout,
    )?;
    let forms = FormService::new(filler, config.locale.default_locale.clone());
    let settings = RegistrationSettings::from_config(config);
    info!(
        enable_ab = settings.enable_ab,
        session_ttl_secs = settings.session_ttl.as_secs(),
        "registration service configured"
    );

    Ok(RegistrationService::new(
        repository,
        voter_lookup(config)?,
        forms,
        Arc::new(directory),
        settings,
    ))
}
