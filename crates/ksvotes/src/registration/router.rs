use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::service::{RegistrationError, RegistrationService, StartSession};
use crate::forms::FormFillerError;
use crate::lookup::LookupQuery;
use crate::registrant::{RegistrantRepository, RegistrationValues, RepositoryError, SessionId};
use crate::workflow::FlowPath;

/// Router builder exposing the registration session endpoints.
pub fn registration_router<R>(service: Arc<RegistrationService<R>>) -> Router
where
    R: RegistrantRepository + 'static,
{
    Router::new()
        .route("/api/v1/sessions", post(start_handler::<R>))
        .route("/api/v1/sessions/:session_id", get(session_handler::<R>))
        .route("/api/v1/sessions/:session_id/step0", post(step0_handler::<R>))
        .route(
            "/api/v1/sessions/:session_id/change-or-apply",
            get(change_or_apply_handler::<R>),
        )
        .route(
            "/api/v1/sessions/:session_id/county",
            post(change_county_handler::<R>),
        )
        .route(
            "/api/v1/sessions/:session_id/steps/:step",
            post(step_handler::<R>),
        )
        .route(
            "/api/v1/sessions/:session_id/paperwork",
            get(paperwork_handler::<R>),
        )
        .route("/api/v1/sessions/:session_id/forms/vr", post(vr_form_handler::<R>))
        .route("/api/v1/sessions/:session_id/forms/ab", post(ab_forms_handler::<R>))
        .route(
            "/api/v1/registration-check",
            post(registration_check_handler::<R>),
        )
        .route("/api/v1/total-processed", get(total_processed_handler::<R>))
        .route("/api/v1/counties/:county", get(county_handler::<R>))
        .with_state(service)
}

#[derive(Debug, Default, Deserialize)]
pub struct StartSessionRequest {
    #[serde(default, rename = "ref")]
    pub ref_code: Option<String>,
    #[serde(default)]
    pub lang: Option<String>,
    #[serde(default)]
    pub prefill: Option<RegistrationValues>,
}

/// Step 0 form fields, plus the switch for skipping the registry lookup.
#[derive(Debug, Default, Deserialize)]
pub struct Step0Request {
    #[serde(default)]
    pub skip_sos: bool,
    #[serde(flatten)]
    pub form: RegistrationValues,
}

#[derive(Debug, Default, Deserialize)]
pub struct CountyRequest {
    #[serde(default)]
    pub county: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PaperworkParams {
    #[serde(default)]
    pub path: Option<FlowPath>,
}

impl IntoResponse for RegistrationError {
    fn into_response(self) -> Response {
        let status = match &self {
            RegistrationError::SessionNotFound(_)
            | RegistrationError::SessionExpired(_)
            | RegistrationError::UnknownStep(_)
            | RegistrationError::AdvanceBallotDisabled => StatusCode::NOT_FOUND,
            RegistrationError::StepClosed(_) => StatusCode::CONFLICT,
            RegistrationError::Validation { step, missing } => {
                let payload = json!({
                    "error": self.to_string(),
                    "step": step,
                    "missing": missing,
                });
                return (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response();
            }
            RegistrationError::InvalidQuery(_) => StatusCode::UNPROCESSABLE_ENTITY,
            RegistrationError::FormFiller(FormFillerError::Encode(_))
            | RegistrationError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RegistrationError::FormFiller(_) => StatusCode::BAD_GATEWAY,
            RegistrationError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
            RegistrationError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = json!({
            "error": self.to_string(),
        });
        (status, axum::Json(payload)).into_response()
    }
}

fn parse_session(raw: &str) -> Result<SessionId, Response> {
    SessionId::parse(raw).map_err(|_| {
        let payload = json!({
            "error": format!("unknown session '{raw}'"),
        });
        (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
    })
}

pub(crate) async fn start_handler<R>(
    State(service): State<Arc<RegistrationService<R>>>,
    axum::Json(request): axum::Json<StartSessionRequest>,
) -> Response
where
    R: RegistrantRepository + 'static,
{
    let request = StartSession {
        ref_code: request.ref_code,
        lang: request.lang,
        prefill: request.prefill,
    };
    match service.start_session(request) {
        Ok(started) => (StatusCode::CREATED, axum::Json(started)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn session_handler<R>(
    State(service): State<Arc<RegistrationService<R>>>,
    Path(session_id): Path<String>,
) -> Response
where
    R: RegistrantRepository + 'static,
{
    let session_id = match parse_session(&session_id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match service.session_view(&session_id) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn step0_handler<R>(
    State(service): State<Arc<RegistrationService<R>>>,
    Path(session_id): Path<String>,
    axum::Json(request): axum::Json<Step0Request>,
) -> Response
where
    R: RegistrantRepository + 'static,
{
    let session_id = match parse_session(&session_id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match service
        .submit_step0(&session_id, request.form, request.skip_sos)
        .await
    {
        Ok(result) => (StatusCode::OK, axum::Json(result)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn change_or_apply_handler<R>(
    State(service): State<Arc<RegistrationService<R>>>,
    Path(session_id): Path<String>,
) -> Response
where
    R: RegistrantRepository + 'static,
{
    let session_id = match parse_session(&session_id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match service.change_or_apply(&session_id) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn change_county_handler<R>(
    State(service): State<Arc<RegistrationService<R>>>,
    Path(session_id): Path<String>,
    axum::Json(request): axum::Json<CountyRequest>,
) -> Response
where
    R: RegistrantRepository + 'static,
{
    let session_id = match parse_session(&session_id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match service.change_county(&session_id, request.county).await {
        Ok(change) => (StatusCode::OK, axum::Json(change)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn step_handler<R>(
    State(service): State<Arc<RegistrationService<R>>>,
    Path((session_id, step)): Path<(String, String)>,
    axum::Json(form): axum::Json<RegistrationValues>,
) -> Response
where
    R: RegistrantRepository + 'static,
{
    let session_id = match parse_session(&session_id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match service.submit_step(&session_id, &step, form) {
        Ok(result) if !result.accepted => (StatusCode::CONFLICT, axum::Json(result)).into_response(),
        Ok(result) if !result.is_complete => {
            (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(result)).into_response()
        }
        Ok(result) => (StatusCode::OK, axum::Json(result)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn paperwork_handler<R>(
    State(service): State<Arc<RegistrationService<R>>>,
    Path(session_id): Path<String>,
    Query(params): Query<PaperworkParams>,
) -> Response
where
    R: RegistrantRepository + 'static,
{
    let session_id = match parse_session(&session_id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match service.paperwork(&session_id, params.path) {
        Ok(paperwork) => (StatusCode::OK, axum::Json(json!({ "paperwork": paperwork }))).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn vr_form_handler<R>(
    State(service): State<Arc<RegistrationService<R>>>,
    Path(session_id): Path<String>,
) -> Response
where
    R: RegistrantRepository + 'static,
{
    let session_id = match parse_session(&session_id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match service.vr_form(&session_id).await {
        Ok(image) => (StatusCode::OK, axum::Json(json!({ "vr_form": image }))).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn ab_forms_handler<R>(
    State(service): State<Arc<RegistrationService<R>>>,
    Path(session_id): Path<String>,
) -> Response
where
    R: RegistrantRepository + 'static,
{
    let session_id = match parse_session(&session_id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match service.ab_forms(&session_id).await {
        Ok(forms) => (StatusCode::OK, axum::Json(json!({ "ab_forms": forms }))).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn registration_check_handler<R>(
    State(service): State<Arc<RegistrationService<R>>>,
    axum::Json(query): axum::Json<LookupQuery>,
) -> Response
where
    R: RegistrantRepository + 'static,
{
    match service.registration_check(&query).await {
        Ok(registered) => {
            (StatusCode::OK, axum::Json(json!({ "registered": registered }))).into_response()
        }
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn total_processed_handler<R>(
    State(service): State<Arc<RegistrationService<R>>>,
) -> Response
where
    R: RegistrantRepository + 'static,
{
    match service.total_processed().await {
        Ok(counts) => (StatusCode::OK, axum::Json(counts)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn county_handler<R>(
    State(service): State<Arc<RegistrationService<R>>>,
    Path(county): Path<String>,
) -> Response
where
    R: RegistrantRepository + 'static,
{
    match service.county_details(&county) {
        Some(details) => (StatusCode::OK, axum::Json(details)).into_response(),
        None => {
            let payload = json!({
                "error": format!("no clerk on file for county '{county}'"),
            });
            (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
        }
    }
}
