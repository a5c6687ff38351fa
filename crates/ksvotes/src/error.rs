use crate::config::ConfigError;
use crate::directory::DirectoryError;
use crate::forms::FormFillerError;
use crate::lookup::LookupError;
use crate::registration::RegistrationError;
use crate::telemetry::TelemetryError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Directory(DirectoryError),
    Lookup(LookupError),
    FormFiller(FormFillerError),
    Registration(RegistrationError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Directory(err) => write!(f, "county directory error: {}", err),
            AppError::Lookup(err) => write!(f, "registry lookup error: {}", err),
            AppError::FormFiller(err) => write!(f, "form filler error: {}", err),
            AppError::Registration(err) => write!(f, "registration error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Directory(err) => Some(err),
            AppError::Lookup(err) => Some(err),
            AppError::FormFiller(err) => Some(err),
            AppError::Registration(err) => Some(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::Registration(err) => return err.into_response(),
            AppError::Lookup(LookupError::MissingField(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::FormFiller(FormFillerError::Encode(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Lookup(_) | AppError::FormFiller(_) => StatusCode::BAD_GATEWAY,
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Directory(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<DirectoryError> for AppError {
    fn from(value: DirectoryError) -> Self {
        Self::Directory(value)
    }
}

impl From<LookupError> for AppError {
    fn from(value: LookupError) -> Self {
        Self::Lookup(value)
    }
}

impl From<FormFillerError> for AppError {
    fn from(value: FormFillerError) -> Self {
        Self::FormFiller(value)
    }
}

impl From<RegistrationError> for AppError {
    fn from(value: RegistrationError) -> Self {
        Self::Registration(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_failures_map_to_bad_gateway() {
        let response = AppError::from(LookupError::Status(503)).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let response = AppError::from(LookupError::MissingField("dob")).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn registration_errors_keep_their_own_status() {
        let response = AppError::from(RegistrationError::AdvanceBallotDisabled).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn encoding_failures_are_internal_errors() {
        let broken = || serde_json::from_str::<serde_json::Value>("{").expect_err("truncated json");

        let response = AppError::from(FormFillerError::from(broken())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = AppError::from(RegistrationError::from(broken())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response =
            AppError::from(RegistrationError::from(FormFillerError::from(broken()))).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
