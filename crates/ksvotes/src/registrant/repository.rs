use serde::Serialize;

use super::domain::{Registrant, SessionId};

/// Number of registrants that finished each paperwork path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CompletedCounts {
    pub registrations: u64,
    pub advance_ballots: u64,
}

/// Storage abstraction so the registration service can be exercised in isolation.
pub trait RegistrantRepository: Send + Sync {
    fn insert(&self, registrant: Registrant) -> Result<Registrant, RepositoryError>;
    fn update(&self, registrant: Registrant) -> Result<(), RepositoryError>;
    fn fetch(&self, session_id: &SessionId) -> Result<Option<Registrant>, RepositoryError>;
    fn completed_counts(&self) -> Result<CompletedCounts, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("registrant already exists")]
    Conflict,
    #[error("registrant not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
