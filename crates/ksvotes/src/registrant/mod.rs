//! Session-scoped registrant record and its storage seam.

mod address;
pub mod domain;
pub mod repository;

pub use address::{parse_registry_address, AddressParseError, RegistryAddress};
pub use domain::{Registrant, RegistrationValues, SessionId, SosRecord};
pub use repository::{CompletedCounts, RegistrantRepository, RepositoryError};
