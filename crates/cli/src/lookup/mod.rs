//! `ExternalLookup` over HTTP: Wikidata for identity and properties,
//! Nominatim for reverse geocoding.

pub mod common;
pub mod nominatim;
pub mod wikidata;

use catalink_recon::model::{ExternalCandidate, TextHit};
use catalink_recon::{Coordinate, EntityKind, ExternalLookup, Facts, LookupError};

use crate::settings::LookupSettings;
use common::{HttpClient, Pacer};
use nominatim::NominatimClient;
use wikidata::WikidataClient;

pub struct HttpLookup {
    wikidata: WikidataClient,
    geocoder: NominatimClient,
}

impl HttpLookup {
    /// Each service gets its own pacer; both follow the same settings.
    /// `language` is the default for identifier labels and addresses.
    pub fn from_settings(settings: &LookupSettings, language: &str) -> Result<Self, LookupError> {
        let pacer = || {
            Pacer::new(settings.request_interval(), settings.batch_size, settings.batch_pause())
        };
        let wikidata = WikidataClient::new(
            HttpClient::new("Wikidata", settings.timeout(), pacer())?,
            settings.sparql_endpoint.clone(),
            settings.api_endpoint.clone(),
            language,
        );
        let geocoder = NominatimClient::new(
            HttpClient::new("Nominatim", settings.timeout(), pacer())?,
            settings.geocoder_endpoint.clone(),
            language,
        );
        Ok(Self { wikidata, geocoder })
    }

    pub fn log_usage(&self) {
        tracing::debug!(
            wikidata = self.wikidata.requests_sent(),
            nominatim = self.geocoder.requests_sent(),
            "requests sent"
        );
    }
}

impl ExternalLookup for HttpLookup {
    fn search_by_name(
        &self,
        kind: EntityKind,
        name: &str,
        language: &str,
    ) -> Result<Vec<ExternalCandidate>, LookupError> {
        self.wikidata.search_by_name(kind, name, language)
    }

    fn search_by_identifier(
        &self,
        kind: EntityKind,
        id: &str,
        language: &str,
    ) -> Result<Facts, LookupError> {
        self.wikidata.facts(kind, id, language)
    }

    fn search_by_text(&self, text: &str, language: &str) -> Result<Option<TextHit>, LookupError> {
        self.wikidata.search_entities(text, language)
    }

    fn reverse_geocode(&self, coordinate: Coordinate) -> Result<Option<String>, LookupError> {
        self.geocoder.reverse(coordinate)
    }

    fn coordinates_of(&self, id: &str) -> Result<Vec<Coordinate>, LookupError> {
        self.wikidata.coordinates(id)
    }
}
