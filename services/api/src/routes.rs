use crate::infra::AppState;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Extension, Json, Router};
use ksvotes::registrant::{RegistrantRepository, RegistrationValues};
use ksvotes::registration::{registration_router, RegistrationService, StartSession};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Step 0 fields a referring organisation may prefill.
const REFERRAL_FIELDS: &[&str] = &[
    "state",
    "city",
    "street",
    "name_last",
    "name_first",
    "dob",
    "email",
    "phone",
    "zip",
];

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ReferralParams {
    #[serde(default, rename = "ref")]
    pub(crate) ref_code: Option<String>,
    #[serde(default)]
    pub(crate) lang: Option<String>,
}

pub(crate) fn with_registration_routes<R>(service: Arc<RegistrationService<R>>) -> Router
where
    R: RegistrantRepository + 'static,
{
    let referrals = Router::new()
        .route(
            "/ref",
            get(referral_start::<R>).post(referral_prefill::<R>),
        )
        .with_state(service.clone());

    registration_router(service)
        .merge(referrals)
        .route("/demo", get(demo_redirect))
        .route("/r/:refcode", get(refcode_redirect))
        .route("/registration", get(old_registration_redirect))
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

fn referral_redirect(ref_code: &str) -> Response {
    let valid = !ref_code.is_empty()
        && ref_code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return StatusCode::NOT_FOUND.into_response();
    }
    Redirect::to(&format!("/ref?ref={ref_code}")).into_response()
}

pub(crate) async fn demo_redirect() -> Response {
    referral_redirect("demo")
}

pub(crate) async fn refcode_redirect(Path(refcode): Path<String>) -> Response {
    referral_redirect(refcode.trim())
}

pub(crate) async fn old_registration_redirect() -> Response {
    referral_redirect("old-reg")
}

fn start_referral<R>(service: &RegistrationService<R>, request: StartSession) -> Response
where
    R: RegistrantRepository + 'static,
{
    let has_ref = request
        .ref_code
        .as_deref()
        .map(|code| !code.trim().is_empty())
        .unwrap_or(false);
    if !has_ref {
        let payload = json!({ "error": "referral code required" });
        return (StatusCode::NOT_FOUND, Json(payload)).into_response();
    }

    match service.start_session(request) {
        Ok(started) => (StatusCode::CREATED, Json(started)).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Start a fresh session for a referral link.
pub(crate) async fn referral_start<R>(
    State(service): State<Arc<RegistrationService<R>>>,
    Query(params): Query<ReferralParams>,
) -> Response
where
    R: RegistrantRepository + 'static,
{
    let request = StartSession {
        ref_code: params.ref_code,
        lang: params.lang,
        prefill: None,
    };
    start_referral(&service, request)
}

/// Start a session with whatever subset of step 0 fields the referrer posted.
pub(crate) async fn referral_prefill<R>(
    State(service): State<Arc<RegistrationService<R>>>,
    Json(body): Json<RegistrationValues>,
) -> Response
where
    R: RegistrantRepository + 'static,
{
    let text = |key: &str| body.get(key).and_then(Value::as_str).map(str::to_string);
    let prefill: RegistrationValues = REFERRAL_FIELDS
        .iter()
        .map(|field| {
            let value = text(field).unwrap_or_default();
            (field.to_string(), Value::String(value))
        })
        .collect();

    let request = StartSession {
        ref_code: text("ref"),
        lang: text("lang"),
        prefill: Some(prefill),
    };
    start_referral(&service, request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::{build_registration_service, InMemoryRegistrantRepository};
    use ksvotes::config::AppConfig;
    use ksvotes::registrant::SessionId;
    use tower::ServiceExt;

    fn router() -> (Router, Arc<InMemoryRegistrantRepository>) {
        let repository = Arc::new(InMemoryRegistrantRepository::default());
        let mut config = AppConfig::default();
        config.services.form_filler_url = Some("TESTING".to_string());
        let service = build_registration_service(&config, repository.clone())
            .expect("service builds");
        (with_registration_routes(Arc::new(service)), repository)
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .expect("read body");
        serde_json::from_slice(&bytes).expect("json payload")
    }

    fn get_request(uri: &str) -> axum::http::Request<axum::body::Body> {
        axum::http::Request::get(uri)
            .body(axum::body::Body::empty())
            .expect("request")
    }

    #[tokio::test]
    async fn shortcuts_redirect_to_referral_start() {
        let (router, _) = router();

        for (uri, target) in [
            ("/demo", "/ref?ref=demo"),
            ("/r/kvp", "/ref?ref=kvp"),
            ("/registration", "/ref?ref=old-reg"),
        ] {
            let response = router
                .clone()
                .oneshot(get_request(uri))
                .await
                .expect("route executes");
            assert_eq!(response.status(), StatusCode::SEE_OTHER, "{uri}");
            assert_eq!(
                response.headers()[header::LOCATION].to_str().expect("location"),
                target
            );
        }
    }

    #[tokio::test]
    async fn referral_start_requires_a_code() {
        let (router, repository) = router();

        let response = router
            .clone()
            .oneshot(get_request("/ref"))
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = router
            .oneshot(get_request("/ref?ref=kvp&lang=es"))
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::CREATED);
        let payload = body_json(response).await;
        let session_id =
            SessionId::parse(payload["session_id"].as_str().expect("id")).expect("uuid");
        let registrant = repository
            .fetch(&session_id)
            .expect("fetch")
            .expect("registrant stored");
        assert_eq!(registrant.ref_code.as_deref(), Some("kvp"));
        assert_eq!(registrant.lang, "es");
    }

    #[tokio::test]
    async fn referral_posts_prefill_step0_fields() {
        let (router, repository) = router();

        let body = json!({"ref": "ksleg", "name_first": "Laura", "zip": "66044", "ssn": "nope"});
        let response = router
            .oneshot(
                axum::http::Request::post("/ref")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(axum::body::Body::from(body.to_string()))
                    .expect("request"),
            )
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::CREATED);

        let payload = body_json(response).await;
        let session_id =
            SessionId::parse(payload["session_id"].as_str().expect("id")).expect("uuid");
        let registrant = repository
            .fetch(&session_id)
            .expect("fetch")
            .expect("registrant stored");
        assert_eq!(registrant.try_value("name_first"), "Laura");
        assert_eq!(registrant.try_value("zip"), "66044");
        assert!(registrant.value("ssn").is_none());
    }

    #[tokio::test]
    async fn healthcheck_reports_ok() {
        let Json(payload) = healthcheck().await;
        assert_eq!(payload, json!({ "status": "ok" }));
    }
}
