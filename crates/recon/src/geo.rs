//! Coordinate-based matching for Space records.
//!
//! Stage 1 asks the geocoder for the address at the local coordinate and
//! accepts when the place name appears in it; no knowledge-base call is made.
//! Stage 2 text-searches the knowledge base for the name and accepts the hit
//! when any of its coordinates lies within tolerance on both axes.

use serde::Serialize;

use crate::lookup::{ExternalLookup, LookupError};
use crate::model::{Coordinate, TextHit};

/// Loose tolerance for exploratory, one-off place lookups.
pub const EXPLORATORY_TOLERANCE: f64 = 0.9;
/// Default tolerance for catalog reconciliation.
pub const RECONCILE_TOLERANCE: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum GeoMatch {
    /// The reverse-geocoded address mentions the place name.
    ConfirmedByAddress { address: String },
    /// A knowledge-base entity with a nearby coordinate.
    Identified { hit: TextHit, coordinate: Coordinate },
    NoMatch,
}

/// Case-insensitive substring test of `name` within `address`.
pub fn address_mentions(address: &str, name: &str) -> bool {
    let name = name.trim();
    !name.is_empty() && address.to_lowercase().contains(&name.to_lowercase())
}

pub fn match_place<L: ExternalLookup + ?Sized>(
    lookup: &L,
    name: &str,
    coordinate: Coordinate,
    language: &str,
    tolerance: f64,
) -> Result<GeoMatch, LookupError> {
    if let Some(address) = lookup.reverse_geocode(coordinate)? {
        if address_mentions(&address, name) {
            return Ok(GeoMatch::ConfirmedByAddress { address });
        }
    }

    let Some(hit) = lookup.search_by_text(name, language)? else {
        return Ok(GeoMatch::NoMatch);
    };

    let nearby = lookup
        .coordinates_of(&hit.id)?
        .into_iter()
        .find(|c| c.within(&coordinate, tolerance));

    Ok(match nearby {
        Some(coordinate) => GeoMatch::Identified { hit, coordinate },
        None => GeoMatch::NoMatch,
    })
}
