use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize, Serializer};

use crate::years::{normalize_year, year_of_date};

// ---------------------------------------------------------------------------
// Entity kinds + fields
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Person,
    Institution,
    Space,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Person => write!(f, "person"),
            Self::Institution => write!(f, "institution"),
            Self::Space => write!(f, "space"),
        }
    }
}

/// A catalog column the engine reads or writes. Serializes as its column name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    ExternalId,
    FamilyName,
    GivenName,
    InstName,
    SpaceName,
    Language,
    Gender,
    BirthYear,
    DeathYear,
    Birthplace,
    AdminPlace,
    InceptionYear,
    DissolutionYear,
    SpaceType,
    Latitude,
    Longitude,
}

impl Field {
    pub fn column(self) -> &'static str {
        match self {
            Self::ExternalId => "wikidata_id",
            Self::FamilyName => "family_name",
            Self::GivenName => "given_name",
            Self::InstName => "inst_name",
            Self::SpaceName => "space_name",
            Self::Language => "language",
            Self::Gender => "sex",
            Self::BirthYear => "birth_year",
            Self::DeathYear => "death_year",
            Self::Birthplace => "birthplace",
            Self::AdminPlace => "admin_place",
            Self::InceptionYear => "inception_year",
            Self::DissolutionYear => "dissolution_year",
            Self::SpaceType => "space_type",
            Self::Latitude => "latitude",
            Self::Longitude => "longitude",
        }
    }

    /// Year-valued fields are compared by set membership after normalization.
    pub fn is_year(self) -> bool {
        matches!(
            self,
            Self::BirthYear | Self::DeathYear | Self::InceptionYear | Self::DissolutionYear
        )
    }

    pub fn is_coordinate(self) -> bool {
        matches!(self, Self::Latitude | Self::Longitude)
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.column())
    }
}

impl Serialize for Field {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.column())
    }
}

/// Comma-separated column names, for notes and log lines.
pub fn field_list(fields: &[Field]) -> String {
    fields.iter().map(|f| f.column()).collect::<Vec<_>>().join(", ")
}

// ---------------------------------------------------------------------------
// Knowledge-base values
// ---------------------------------------------------------------------------

/// WGS84 coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Parse latitude/longitude cells. Out-of-range values are rejected.
    pub fn parse(lat: &str, lon: &str) -> Option<Self> {
        let lat: f64 = lat.trim().parse().ok()?;
        let lon: f64 = lon.trim().parse().ok()?;
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return None;
        }
        Some(Self { lat, lon })
    }

    /// Parse a WKT literal such as `Point(116.3913 39.9066)` (lon first).
    pub fn from_wkt(value: &str) -> Option<Self> {
        let inner = value
            .trim()
            .strip_prefix("Point(")
            .and_then(|rest| rest.strip_suffix(')'))?;
        let mut parts = inner.split_whitespace();
        let lon = parts.next()?;
        let lat = parts.next()?;
        if parts.next().is_some() {
            return None;
        }
        Self::parse(lat, lon)
    }

    /// Both axes within `tolerance` degrees.
    pub fn within(&self, other: &Coordinate, tolerance: f64) -> bool {
        (self.lat - other.lat).abs() <= tolerance && (self.lon - other.lon).abs() <= tolerance
    }
}

/// Sparse property bag returned by the knowledge base. Any value may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Facts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth_year: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub death_year: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birthplace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_place: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inception_year: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dissolution_year: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub coordinates: Vec<Coordinate>,
}

impl Facts {
    pub fn is_empty(&self) -> bool {
        *self == Facts::default()
    }

    /// Authoritative value for a catalog field, normalized the way the
    /// catalog stores it. Coordinates are handled separately.
    pub fn value(&self, field: Field) -> Option<String> {
        let raw = match field {
            Field::Gender => self.gender.as_deref(),
            Field::BirthYear => self.birth_year.as_deref(),
            Field::DeathYear => self.death_year.as_deref(),
            Field::Birthplace => self.birthplace.as_deref(),
            Field::AdminPlace => self.admin_place.as_deref(),
            Field::InceptionYear => self.inception_year.as_deref(),
            Field::DissolutionYear => self.dissolution_year.as_deref(),
            _ => None,
        }?;
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if field.is_year() {
            Some(year_of_date(raw).unwrap_or_else(|| normalize_year(raw)))
        } else {
            Some(raw.to_string())
        }
    }
}

/// One knowledge-base search hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExternalCandidate {
    pub external_id: String,
    pub label: String,
    pub facts: Facts,
}

/// Top hit of a free-text entity search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextHit {
    pub id: String,
    pub label: String,
}

// ---------------------------------------------------------------------------
// Catalog rows
// ---------------------------------------------------------------------------

/// Trimmed, non-empty view of an optional cell.
pub fn cell(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// What the engine searches with when a row has no external ID.
#[derive(Debug, Clone, PartialEq)]
pub enum Discovery<'a> {
    /// Person: name parts searched per language and name order.
    Names {
        family: Option<&'a str>,
        given: Option<&'a str>,
    },
    /// Institution: single ranked free-text search.
    Text { name: &'a str },
    /// Space: reverse geocoding, then text search + coordinate check.
    Place {
        name: &'a str,
        coordinate: Option<Coordinate>,
    },
    /// Nothing to search with.
    Unsearchable,
}

/// Row provenance stamp: date + editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    pub date: String,
    pub editor: String,
}

impl Provenance {
    pub fn new(date: impl Into<String>, editor: impl Into<String>) -> Self {
        Self { date: date.into(), editor: editor.into() }
    }

    /// Stamp dated today (local time).
    pub fn today(editor: impl Into<String>) -> Self {
        Self::new(chrono::Local::now().date_naive().to_string(), editor)
    }
}

/// Shared shape of Person / Institution / Space rows.
pub trait CatalogRecord: Clone + std::fmt::Debug + PartialEq + Serialize + DeserializeOwned {
    const KIND: EntityKind;
    /// Header of the local ID column.
    const ID_COLUMN: &'static str;
    /// Every column, in output order.
    const COLUMNS: &'static [&'static str];
    /// Fields compared against the authoritative catalog row (besides the external ID).
    const CATALOG_FIELDS: &'static [Field];
    /// Subset of `CATALOG_FIELDS` that holds regardless of the row's language.
    const LANGUAGE_NEUTRAL_FIELDS: &'static [Field];
    /// Fields scored against search candidates.
    const SCORING_FIELDS: &'static [Field];
    /// Fields filled in from the knowledge base.
    const AUTHORITY_FIELDS: &'static [Field];

    fn local_id(&self) -> Option<&str>;
    fn set_local_id(&mut self, id: String);

    fn field(&self, field: Field) -> Option<&str>;
    fn set_field(&mut self, field: Field, value: Option<String>);

    fn note(&self) -> Option<&str>;
    fn note_slot(&mut self) -> &mut Option<String>;
    fn provenance_slots(&mut self) -> (&mut Option<String>, &mut Option<String>);

    fn discovery(&self) -> Discovery<'_>;

    /// Human-readable label for diagnostics.
    fn display_name(&self) -> String;

    fn external_id(&self) -> Option<&str> {
        self.field(Field::ExternalId)
    }

    fn language(&self) -> Option<&str> {
        self.field(Field::Language)
    }

    /// `note == "skip"` (case-insensitive) freezes the row.
    fn is_skipped(&self) -> bool {
        self.note().is_some_and(|n| n.eq_ignore_ascii_case("skip"))
    }

    fn append_note(&mut self, text: &str) {
        let slot = self.note_slot();
        match slot.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(existing) => *slot = Some(format!("{existing}; {text}")),
            None => *slot = Some(text.to_string()),
        }
    }

    fn stamp(&mut self, provenance: &Provenance) {
        let (date, editor) = self.provenance_slots();
        *date = Some(provenance.date.clone());
        *editor = Some(provenance.editor.clone());
    }

    fn coordinate(&self) -> Option<Coordinate> {
        Coordinate::parse(self.field(Field::Latitude)?, self.field(Field::Longitude)?)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonRecord {
    #[serde(rename = "person_id")]
    pub local_id: Option<String>,
    #[serde(rename = "wikidata_id")]
    pub external_id: Option<String>,
    pub family_name: Option<String>,
    pub given_name: Option<String>,
    pub language: Option<String>,
    pub sex: Option<String>,
    pub birth_year: Option<String>,
    pub death_year: Option<String>,
    pub birthplace: Option<String>,
    pub note: Option<String>,
    pub last_modified: Option<String>,
    pub last_modified_by: Option<String>,
}

impl CatalogRecord for PersonRecord {
    const KIND: EntityKind = EntityKind::Person;
    const ID_COLUMN: &'static str = "person_id";
    const COLUMNS: &'static [&'static str] = &[
        "person_id",
        "wikidata_id",
        "family_name",
        "given_name",
        "language",
        "sex",
        "birth_year",
        "death_year",
        "birthplace",
        "note",
        "last_modified",
        "last_modified_by",
    ];
    const CATALOG_FIELDS: &'static [Field] = &[
        Field::FamilyName,
        Field::GivenName,
        Field::Gender,
        Field::BirthYear,
        Field::DeathYear,
        Field::Birthplace,
    ];
    const LANGUAGE_NEUTRAL_FIELDS: &'static [Field] = &[Field::BirthYear, Field::DeathYear];
    const SCORING_FIELDS: &'static [Field] =
        &[Field::Gender, Field::BirthYear, Field::DeathYear, Field::Birthplace];
    const AUTHORITY_FIELDS: &'static [Field] =
        &[Field::Gender, Field::BirthYear, Field::DeathYear, Field::Birthplace];

    fn local_id(&self) -> Option<&str> {
        cell(&self.local_id)
    }

    fn set_local_id(&mut self, id: String) {
        self.local_id = Some(id);
    }

    fn field(&self, field: Field) -> Option<&str> {
        match field {
            Field::ExternalId => cell(&self.external_id),
            Field::FamilyName => cell(&self.family_name),
            Field::GivenName => cell(&self.given_name),
            Field::Language => cell(&self.language),
            Field::Gender => cell(&self.sex),
            Field::BirthYear => cell(&self.birth_year),
            Field::DeathYear => cell(&self.death_year),
            Field::Birthplace => cell(&self.birthplace),
            _ => None,
        }
    }

    fn set_field(&mut self, field: Field, value: Option<String>) {
        let slot = match field {
            Field::ExternalId => &mut self.external_id,
            Field::FamilyName => &mut self.family_name,
            Field::GivenName => &mut self.given_name,
            Field::Language => &mut self.language,
            Field::Gender => &mut self.sex,
            Field::BirthYear => &mut self.birth_year,
            Field::DeathYear => &mut self.death_year,
            Field::Birthplace => &mut self.birthplace,
            _ => return,
        };
        *slot = value;
    }

    fn note(&self) -> Option<&str> {
        cell(&self.note)
    }

    fn note_slot(&mut self) -> &mut Option<String> {
        &mut self.note
    }

    fn provenance_slots(&mut self) -> (&mut Option<String>, &mut Option<String>) {
        (&mut self.last_modified, &mut self.last_modified_by)
    }

    fn discovery(&self) -> Discovery<'_> {
        let family = cell(&self.family_name);
        let given = cell(&self.given_name);
        if family.is_none() && given.is_none() {
            return Discovery::Unsearchable;
        }
        Discovery::Names { family, given }
    }

    fn display_name(&self) -> String {
        match (cell(&self.family_name), cell(&self.given_name)) {
            (Some(f), Some(g)) => format!("{g} {f}"),
            (Some(one), None) | (None, Some(one)) => one.to_string(),
            (None, None) => "(unnamed person)".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstitutionRecord {
    #[serde(rename = "inst_id")]
    pub local_id: Option<String>,
    #[serde(rename = "wikidata_id")]
    pub external_id: Option<String>,
    pub inst_name: Option<String>,
    pub language: Option<String>,
    pub admin_place: Option<String>,
    pub inception_year: Option<String>,
    pub dissolution_year: Option<String>,
    pub note: Option<String>,
    pub last_modified: Option<String>,
    pub last_modified_by: Option<String>,
}

impl CatalogRecord for InstitutionRecord {
    const KIND: EntityKind = EntityKind::Institution;
    const ID_COLUMN: &'static str = "inst_id";
    const COLUMNS: &'static [&'static str] = &[
        "inst_id",
        "wikidata_id",
        "inst_name",
        "language",
        "admin_place",
        "inception_year",
        "dissolution_year",
        "note",
        "last_modified",
        "last_modified_by",
    ];
    const CATALOG_FIELDS: &'static [Field] = &[
        Field::InstName,
        Field::AdminPlace,
        Field::InceptionYear,
        Field::DissolutionYear,
    ];
    const LANGUAGE_NEUTRAL_FIELDS: &'static [Field] =
        &[Field::InceptionYear, Field::DissolutionYear];
    const SCORING_FIELDS: &'static [Field] =
        &[Field::AdminPlace, Field::InceptionYear, Field::DissolutionYear];
    const AUTHORITY_FIELDS: &'static [Field] =
        &[Field::AdminPlace, Field::InceptionYear, Field::DissolutionYear];

    fn local_id(&self) -> Option<&str> {
        cell(&self.local_id)
    }

    fn set_local_id(&mut self, id: String) {
        self.local_id = Some(id);
    }

    fn field(&self, field: Field) -> Option<&str> {
        match field {
            Field::ExternalId => cell(&self.external_id),
            Field::InstName => cell(&self.inst_name),
            Field::Language => cell(&self.language),
            Field::AdminPlace => cell(&self.admin_place),
            Field::InceptionYear => cell(&self.inception_year),
            Field::DissolutionYear => cell(&self.dissolution_year),
            _ => None,
        }
    }

    fn set_field(&mut self, field: Field, value: Option<String>) {
        let slot = match field {
            Field::ExternalId => &mut self.external_id,
            Field::InstName => &mut self.inst_name,
            Field::Language => &mut self.language,
            Field::AdminPlace => &mut self.admin_place,
            Field::InceptionYear => &mut self.inception_year,
            Field::DissolutionYear => &mut self.dissolution_year,
            _ => return,
        };
        *slot = value;
    }

    fn note(&self) -> Option<&str> {
        cell(&self.note)
    }

    fn note_slot(&mut self) -> &mut Option<String> {
        &mut self.note
    }

    fn provenance_slots(&mut self) -> (&mut Option<String>, &mut Option<String>) {
        (&mut self.last_modified, &mut self.last_modified_by)
    }

    fn discovery(&self) -> Discovery<'_> {
        match cell(&self.inst_name) {
            Some(name) => Discovery::Text { name },
            None => Discovery::Unsearchable,
        }
    }

    fn display_name(&self) -> String {
        cell(&self.inst_name).unwrap_or("(unnamed institution)").to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpaceRecord {
    #[serde(rename = "space_id")]
    pub local_id: Option<String>,
    #[serde(rename = "wikidata_id")]
    pub external_id: Option<String>,
    pub space_name: Option<String>,
    pub space_type: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub note: Option<String>,
    pub last_modified: Option<String>,
    pub last_modified_by: Option<String>,
}

impl CatalogRecord for SpaceRecord {
    const KIND: EntityKind = EntityKind::Space;
    const ID_COLUMN: &'static str = "space_id";
    const COLUMNS: &'static [&'static str] = &[
        "space_id",
        "wikidata_id",
        "space_name",
        "space_type",
        "latitude",
        "longitude",
        "note",
        "last_modified",
        "last_modified_by",
    ];
    const CATALOG_FIELDS: &'static [Field] = &[
        Field::SpaceName,
        Field::SpaceType,
        Field::Latitude,
        Field::Longitude,
    ];
    const LANGUAGE_NEUTRAL_FIELDS: &'static [Field] = &[
        Field::SpaceName,
        Field::SpaceType,
        Field::Latitude,
        Field::Longitude,
    ];
    const SCORING_FIELDS: &'static [Field] = &[];
    const AUTHORITY_FIELDS: &'static [Field] = &[Field::Latitude, Field::Longitude];

    fn local_id(&self) -> Option<&str> {
        cell(&self.local_id)
    }

    fn set_local_id(&mut self, id: String) {
        self.local_id = Some(id);
    }

    fn field(&self, field: Field) -> Option<&str> {
        match field {
            Field::ExternalId => cell(&self.external_id),
            Field::SpaceName => cell(&self.space_name),
            Field::SpaceType => cell(&self.space_type),
            Field::Latitude => cell(&self.latitude),
            Field::Longitude => cell(&self.longitude),
            _ => None,
        }
    }

    fn set_field(&mut self, field: Field, value: Option<String>) {
        let slot = match field {
            Field::ExternalId => &mut self.external_id,
            Field::SpaceName => &mut self.space_name,
            Field::SpaceType => &mut self.space_type,
            Field::Latitude => &mut self.latitude,
            Field::Longitude => &mut self.longitude,
            _ => return,
        };
        *slot = value;
    }

    fn note(&self) -> Option<&str> {
        cell(&self.note)
    }

    fn note_slot(&mut self) -> &mut Option<String> {
        &mut self.note
    }

    fn provenance_slots(&mut self) -> (&mut Option<String>, &mut Option<String>) {
        (&mut self.last_modified, &mut self.last_modified_by)
    }

    fn discovery(&self) -> Discovery<'_> {
        match cell(&self.space_name) {
            Some(name) => Discovery::Place { name, coordinate: self.coordinate() },
            None => Discovery::Unsearchable,
        }
    }

    fn display_name(&self) -> String {
        cell(&self.space_name).unwrap_or("(unnamed space)").to_string()
    }
}
