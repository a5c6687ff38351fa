//! Voter registration and advance ballot workflow for KSVotes.
//!
//! The crate resolves a visitor's registration status against the Secretary of State
//! registry, merges the result into a session-scoped registrant, routes the visitor through
//! the registration or advance ballot steps, and marshals the filled forms for signature.

pub mod cache;
pub mod config;
pub mod directory;
pub mod error;
pub mod forms;
pub mod lookup;
pub mod registrant;
pub mod registration;
pub mod telemetry;
pub mod workflow;
