use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::response::Response;
use axum::Router;
use serde_json::{json, Value};

use crate::directory::CountyDirectory;
use crate::forms::{FormFiller, FormFillerError, FormPayload, FormService};
use crate::lookup::{LookupError, LookupOutcome, LookupQuery, VoterLookup};
use crate::registrant::{
    CompletedCounts, Registrant, RegistrantRepository, RegistrationValues, RepositoryError,
    SessionId, SosRecord,
};
use crate::registration::{registration_router, RegistrationService, RegistrationSettings};

pub(super) const CLERKS: &str = "county,officer,email,phone,fax,address1,address2,city,state,zip\n\
Douglas,Jamie Shew,elections@douglascountyks.org,785-832-5267,,711 W 23rd St,Unit 1,Lawrence,KS,66046\n\
Sedgwick,Angela Caudillo,election@sedgwick.gov,316-660-7100,,510 N Main,Suite 101,Wichita,KS,67203\n";

pub(super) const ZIPS: &str = "zip,county\n66044,Douglas\n67203,Sedgwick\n";

pub(super) const EARLY_VOTING: &str = "county,name,address,city,zip,hours\n\
Douglas,Douglas County Courthouse,1100 Massachusetts St,Lawrence,66044,8am-5pm weekdays\n";

pub(super) const DROPBOXES: &str = "county,name,address,city,zip,hours\n\
Douglas,Lawrence Public Library,707 Vermont St,Lawrence,66044,24 hours\n\
Douglas,Eudora City Hall,4 E 7th St,Eudora,66025,24 hours\n";

pub(super) fn directory() -> CountyDirectory {
    let mut directory = CountyDirectory::default();
    directory.load_clerks(CLERKS.as_bytes()).expect("clerks load");
    directory.load_zip_codes(ZIPS.as_bytes()).expect("zips load");
    directory
        .load_early_voting(EARLY_VOTING.as_bytes())
        .expect("early voting loads");
    directory.load_dropboxes(DROPBOXES.as_bytes()).expect("dropboxes load");
    directory
}

pub(super) fn values(value: Value) -> RegistrationValues {
    value.as_object().cloned().expect("object")
}

pub(super) fn step0_form() -> RegistrationValues {
    values(json!({
        "name_first": "Kris",
        "name_last": "Kobach",
        "dob": "03/26/1966",
        "zip": "66044",
        "email": "kris@example.com",
        "phone": "785-555-1212",
    }))
}

pub(super) fn record(county: &str, status: &str) -> SosRecord {
    SosRecord {
        tree: values(json!({
            "Address": "123 Main St #2, Lawrence, KS 66044",
            "County": county,
            "Party": "Republican",
            "Status": status,
        })),
        sample_ballot: None,
        districts: None,
        elections: None,
        polling: None,
    }
}

pub(super) fn settings(enable_ab: bool) -> RegistrationSettings {
    RegistrationSettings {
        enable_ab,
        ..RegistrationSettings::default()
    }
}

pub(super) fn build_service(
    lookup: FakeLookup,
    enable_ab: bool,
) -> (
    RegistrationService<MemoryRepository>,
    Arc<MemoryRepository>,
    Arc<RecordingFiller>,
) {
    let repository = Arc::new(MemoryRepository::default());
    let filler = Arc::new(RecordingFiller::default());
    let service = RegistrationService::new(
        repository.clone(),
        Arc::new(lookup),
        FormService::new(filler.clone(), "en"),
        Arc::new(directory()),
        settings(enable_ab),
    );
    (service, repository, filler)
}

pub(super) fn registration_router_with_service(
    service: RegistrationService<MemoryRepository>,
) -> Router {
    registration_router(Arc::new(service))
}

#[derive(Default, Clone)]
pub(super) struct MemoryRepository {
    pub(super) records: Arc<Mutex<HashMap<SessionId, Registrant>>>,
    pub(super) count_queries: Arc<AtomicUsize>,
}

impl MemoryRepository {
    pub(super) fn get(&self, session_id: &SessionId) -> Registrant {
        self.records
            .lock()
            .expect("repository mutex poisoned")
            .get(session_id)
            .cloned()
            .expect("registrant stored")
    }
}

impl RegistrantRepository for MemoryRepository {
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
        guard.insert(registrant.session_id, registrant);
        Ok(())
    }

    fn fetch(&self, session_id: &SessionId) -> Result<Option<Registrant>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.get(session_id).cloned())
    }

    fn completed_counts(&self) -> Result<CompletedCounts, RepositoryError> {
        self.count_queries.fetch_add(1, Ordering::SeqCst);
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(CompletedCounts {
            registrations: guard.values().filter(|r| r.vr_completed_at.is_some()).count() as u64,
            advance_ballots: guard.values().filter(|r| r.ab_completed_at.is_some()).count() as u64,
        })
    }
}

pub(super) struct UnavailableRepository;

impl RegistrantRepository for UnavailableRepository {
    fn insert(&self, _registrant: Registrant) -> Result<Registrant, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn update(&self, _registrant: Registrant) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _session_id: &SessionId) -> Result<Option<Registrant>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn completed_counts(&self) -> Result<CompletedCounts, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

/// Registry fake answering every query the same way.
pub(super) struct FakeLookup {
    answer: Result<LookupOutcome, u16>,
    pub(super) calls: Arc<AtomicUsize>,
}

impl FakeLookup {
    pub(super) fn matching(records: Vec<SosRecord>) -> Self {
        Self {
            answer: Ok(LookupOutcome::Matches(records)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(super) fn no_match() -> Self {
        Self {
            answer: Ok(LookupOutcome::NoMatch),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(super) fn failing(status: u16) -> Self {
        Self {
            answer: Err(status),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl VoterLookup for FakeLookup {
    async fn lookup(&self, _query: &LookupQuery) -> Result<LookupOutcome, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.answer {
            Ok(outcome) => Ok(outcome.clone()),
            Err(status) => Err(LookupError::Status(*status)),
        }
    }
}

/// Filler fake remembering which forms were requested and with what payload.
#[derive(Default)]
pub(super) struct RecordingFiller {
    requests: Mutex<Vec<(String, FormPayload)>>,
    pub(super) fail: bool,
}

impl RecordingFiller {
    pub(super) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(super) fn requests(&self) -> Vec<(String, FormPayload)> {
        self.requests.lock().expect("filler mutex poisoned").clone()
    }
}

#[async_trait]
impl FormFiller for RecordingFiller {
    async fn fill(&self, form_name: &str, payload: &FormPayload) -> Result<String, FormFillerError> {
        if self.fail {
            return Err(FormFillerError::AttemptsExhausted {
                attempts: 3,
                last: "status 503".to_string(),
            });
        }
        self.requests
            .lock()
            .expect("filler mutex poisoned")
            .push((form_name.to_string(), payload.clone()));
        Ok(format!("data:image/png;base64,{}", form_name.replace('/', "_")))
    }
}

pub(super) fn service_with_filler(
    filler: Arc<RecordingFiller>,
    enable_ab: bool,
) -> (RegistrationService<MemoryRepository>, Arc<MemoryRepository>) {
    let repository = Arc::new(MemoryRepository::default());
    let service = RegistrationService::new(
        repository.clone(),
        Arc::new(FakeLookup::matching(vec![record("Douglas", "Active")])),
        FormService::new(filler, "en"),
        Arc::new(directory()),
        settings(enable_ab),
    );
    (service, repository)
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
