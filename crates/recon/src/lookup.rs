//! Knowledge-base collaborator interface.
//!
//! The engine never talks to the network itself. Implementations own
//! transport, retries, and request pacing; "no results" is always an `Ok`
//! value, never an error.

use thiserror::Error;

use crate::model::{Coordinate, EntityKind, ExternalCandidate, Facts, TextHit};

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("network error: {0}")]
    Network(String),

    #[error("upstream error ({status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("malformed response: {0}")]
    Malformed(String),
}

pub trait ExternalLookup {
    /// Entities of `kind` whose label in `language` is exactly `name`.
    fn search_by_name(
        &self,
        kind: EntityKind,
        name: &str,
        language: &str,
    ) -> Result<Vec<ExternalCandidate>, LookupError>;

    /// Best-known properties of one entity, labels in `language`; empty when
    /// unknown.
    fn search_by_identifier(
        &self,
        kind: EntityKind,
        id: &str,
        language: &str,
    ) -> Result<Facts, LookupError>;

    /// Top-ranked entity for a free-text query, if any.
    fn search_by_text(&self, text: &str, language: &str) -> Result<Option<TextHit>, LookupError>;

    /// Address text for a coordinate, if the geocoder knows one.
    fn reverse_geocode(&self, coordinate: Coordinate) -> Result<Option<String>, LookupError>;

    /// Coordinates recorded for an entity.
    fn coordinates_of(&self, id: &str) -> Result<Vec<Coordinate>, LookupError>;
}

/// Lookup that never finds anything. Reduces a run to catalog-only checks.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineLookup;

impl ExternalLookup for OfflineLookup {
    fn search_by_name(
        &self,
        _kind: EntityKind,
        _name: &str,
        _language: &str,
    ) -> Result<Vec<ExternalCandidate>, LookupError> {
        Ok(Vec::new())
    }

    fn search_by_identifier(
        &self,
        _kind: EntityKind,
        _id: &str,
        _language: &str,
    ) -> Result<Facts, LookupError> {
        Ok(Facts::default())
    }

    fn search_by_text(&self, _text: &str, _language: &str) -> Result<Option<TextHit>, LookupError> {
        Ok(None)
    }

    fn reverse_geocode(&self, _coordinate: Coordinate) -> Result<Option<String>, LookupError> {
        Ok(None)
    }

    fn coordinates_of(&self, _id: &str) -> Result<Vec<Coordinate>, LookupError> {
        Ok(Vec::new())
    }
}
