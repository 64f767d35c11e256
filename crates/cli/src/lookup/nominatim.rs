//! OpenStreetMap Nominatim reverse geocoder.
//!
//! `GET /reverse?format=jsonv2&lat=…&lon=…` → `display_name`. A location
//! Nominatim cannot resolve comes back as `200 {"error": "Unable to geocode"}`.

use catalink_recon::{Coordinate, LookupError};

use super::common::HttpClient;

pub const GEOCODER_ENDPOINT: &str = "https://nominatim.openstreetmap.org";

pub struct NominatimClient {
    client: HttpClient,
    base_url: String,
    language: String,
}

impl NominatimClient {
    pub(crate) fn new(client: HttpClient, base_url: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            language: language.into(),
        }
    }

    pub(crate) fn requests_sent(&self) -> u32 {
        self.client.requests_sent()
    }

    pub fn reverse(&self, coordinate: Coordinate) -> Result<Option<String>, LookupError> {
        let url = format!("{}/reverse", self.base_url);
        let lat = coordinate.lat.to_string();
        let lon = coordinate.lon.to_string();
        let body = self.client.get_json(|http| {
            http.get(&url)
                .header("Accept-Language", self.language.as_str())
                .query(&[
                    ("format", "jsonv2"),
                    ("lat", lat.as_str()),
                    ("lon", lon.as_str()),
                ])
        })?;

        if let Some(error) = body.get("error") {
            tracing::debug!(lat = coordinate.lat, lon = coordinate.lon, %error, "no address");
            return Ok(None);
        }

        let address = body
            .get("display_name")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        tracing::debug!(lat = coordinate.lat, lon = coordinate.lon, address = ?address, "reverse geocode");
        Ok(address)
    }
}
