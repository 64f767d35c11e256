//! Wikidata adapter: SPARQL for label and property queries,
//! `wbsearchentities` for ranked free-text search.
//!
//! API docs: https://www.wikidata.org/wiki/Wikidata:SPARQL_query_service
//!
//! # Properties read
//!
//! | Kind        | Variable      | Property | Value            |
//! |-------------|---------------|----------|------------------|
//! | Person      | `gender`      | P21      | label            |
//! | Person      | `birth`       | P569     | date             |
//! | Person      | `death`       | P570     | date             |
//! | Person      | `birthplace`  | P19      | label            |
//! | Institution | `admin`       | P131     | label            |
//! | Institution | `inception`   | P571     | date             |
//! | Institution | `dissolution` | P576     | date             |
//! | Space       | `coord`       | P625     | WKT `Point(lon lat)` |
//!
//! Labels are requested in the query language, falling back to English.
//! When an entity has several values for one property, the first row
//! returned wins.

use std::collections::BTreeMap;

use catalink_recon::model::{ExternalCandidate, TextHit};
use catalink_recon::{Coordinate, EntityKind, Facts, LookupError};

use super::common::HttpClient;

pub const SPARQL_ENDPOINT: &str = "https://query.wikidata.org/sparql";
pub const API_ENDPOINT: &str = "https://www.wikidata.org/w/api.php";

const ENTITY_PREFIX: &str = "http://www.wikidata.org/entity/";

// ── Property table ──────────────────────────────────────────────────

struct Property {
    var: &'static str,
    pid: &'static str,
    /// Read the value's label rather than the value itself.
    labelled: bool,
}

const PERSON: &[Property] = &[
    Property { var: "gender", pid: "P21", labelled: true },
    Property { var: "birth", pid: "P569", labelled: false },
    Property { var: "death", pid: "P570", labelled: false },
    Property { var: "birthplace", pid: "P19", labelled: true },
];

const INSTITUTION: &[Property] = &[
    Property { var: "admin", pid: "P131", labelled: true },
    Property { var: "inception", pid: "P571", labelled: false },
    Property { var: "dissolution", pid: "P576", labelled: false },
];

const SPACE: &[Property] = &[Property { var: "coord", pid: "P625", labelled: false }];

fn properties(kind: EntityKind) -> &'static [Property] {
    match kind {
        EntityKind::Person => PERSON,
        EntityKind::Institution => INSTITUTION,
        EntityKind::Space => SPACE,
    }
}

fn set_fact(facts: &mut Facts, var: &str, value: &str) {
    let slot = match var {
        "gender" => &mut facts.gender,
        "birth" => &mut facts.birth_year,
        "death" => &mut facts.death_year,
        "birthplace" => &mut facts.birthplace,
        "admin" => &mut facts.admin_place,
        "inception" => &mut facts.inception_year,
        "dissolution" => &mut facts.dissolution_year,
        "coord" => {
            if let Some(c) = Coordinate::from_wkt(value) {
                if !facts.coordinates.contains(&c) {
                    facts.coordinates.push(c);
                }
            }
            return;
        }
        _ => return,
    };
    if slot.is_none() {
        *slot = Some(value.to_string());
    }
}

// ── Query building ──────────────────────────────────────────────────

/// `Q` followed by digits.
pub fn is_item_id(id: &str) -> bool {
    id.strip_prefix('Q')
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

/// Escape a string for use inside a double-quoted SPARQL literal.
fn escape_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}

/// Language tag restricted to what a SPARQL language tag may hold.
fn language_tag(language: &str) -> String {
    let tag: String = language
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect();
    if tag.is_empty() {
        "en".to_string()
    } else {
        tag.to_ascii_lowercase()
    }
}

fn select_clause(kind: EntityKind) -> String {
    let mut vars = String::from("?item ?itemLabel");
    for p in properties(kind) {
        vars.push_str(" ?");
        vars.push_str(p.var);
    }
    format!("SELECT {vars} WHERE {{")
}

fn optional_clauses(kind: EntityKind, lang: &str) -> String {
    let mut out = String::new();
    for p in properties(kind) {
        if p.labelled {
            out.push_str(&format!(
                "\n  OPTIONAL {{ ?item wdt:{pid} ?{var}_ . ?{var}_ rdfs:label ?{var} . \
                 FILTER(LANG(?{var}) = \"{lang}\") }}",
                pid = p.pid,
                var = p.var,
            ));
        } else {
            out.push_str(&format!(
                "\n  OPTIONAL {{ ?item wdt:{pid} ?{var} . }}",
                pid = p.pid,
                var = p.var,
            ));
        }
    }
    out
}

fn label_service(lang: &str) -> String {
    format!("\n  SERVICE wikibase:label {{ bd:serviceParam wikibase:language \"{lang},en\". }}\n}}")
}

/// Entities whose label in `language` is exactly `name`, with properties.
pub fn name_query(kind: EntityKind, name: &str, language: &str) -> String {
    let lang = language_tag(language);
    let mut q = select_clause(kind);
    q.push_str(&format!("\n  ?item rdfs:label \"{}\"@{lang} .", escape_literal(name)));
    if kind == EntityKind::Person {
        // instance of human
        q.push_str("\n  ?item wdt:P31 wd:Q5 .");
    }
    q.push_str(&optional_clauses(kind, &lang));
    q.push_str(&label_service(&lang));
    q
}

/// Properties of one entity.
pub fn identifier_query(kind: EntityKind, id: &str, language: &str) -> String {
    let lang = language_tag(language);
    let mut q = select_clause(kind);
    q.push_str(&format!("\n  VALUES ?item {{ wd:{id} }}"));
    q.push_str(&optional_clauses(kind, &lang));
    q.push_str(&label_service(&lang));
    q
}

pub fn coordinates_query(id: &str) -> String {
    format!("SELECT ?coord WHERE {{\n  wd:{id} wdt:P625 ?coord .\n}}")
}

// ── Response parsing ────────────────────────────────────────────────

fn bindings(body: &serde_json::Value) -> Result<&Vec<serde_json::Value>, LookupError> {
    body.pointer("/results/bindings")
        .and_then(|b| b.as_array())
        .ok_or_else(|| LookupError::Malformed("SPARQL response has no results.bindings".into()))
}

fn binding_value<'a>(row: &'a serde_json::Value, var: &str) -> Option<&'a str> {
    row.get(var)?.get("value")?.as_str().filter(|v| !v.is_empty())
}

/// Group SPARQL rows by entity, keeping first-seen order.
fn candidates_from(kind: EntityKind, body: &serde_json::Value) -> Result<Vec<ExternalCandidate>, LookupError> {
    let mut order: Vec<String> = Vec::new();
    let mut by_id: BTreeMap<String, ExternalCandidate> = BTreeMap::new();

    for row in bindings(body)? {
        let Some(uri) = binding_value(row, "item") else { continue };
        let id = uri.strip_prefix(ENTITY_PREFIX).unwrap_or(uri).to_string();

        let candidate = by_id.entry(id.clone()).or_insert_with(|| {
            order.push(id.clone());
            ExternalCandidate {
                external_id: id.clone(),
                label: binding_value(row, "itemLabel").unwrap_or(&id).to_string(),
                facts: Facts::default(),
            }
        });

        for p in properties(kind) {
            if let Some(value) = binding_value(row, p.var) {
                set_fact(&mut candidate.facts, p.var, value);
            }
        }
    }

    Ok(order.into_iter().filter_map(|id| by_id.remove(&id)).collect())
}

// ── Client ──────────────────────────────────────────────────────────

pub struct WikidataClient {
    client: HttpClient,
    sparql_url: String,
    api_url: String,
    /// Label language for identifier lookups that name none.
    label_language: String,
}

impl WikidataClient {
    pub(crate) fn new(
        client: HttpClient,
        sparql_url: impl Into<String>,
        api_url: impl Into<String>,
        label_language: impl Into<String>,
    ) -> Self {
        Self {
            client,
            sparql_url: sparql_url.into(),
            api_url: api_url.into(),
            label_language: label_language.into(),
        }
    }

    pub(crate) fn requests_sent(&self) -> u32 {
        self.client.requests_sent()
    }

    fn sparql(&self, query: &str) -> Result<serde_json::Value, LookupError> {
        tracing::debug!(source = self.client.source_name(), "SPARQL query:\n{query}");
        self.client.get_json(|http| {
            http.get(&self.sparql_url)
                .header("Accept", "application/sparql-results+json")
                .query(&[("query", query), ("format", "json")])
        })
    }

    pub fn search_by_name(
        &self,
        kind: EntityKind,
        name: &str,
        language: &str,
    ) -> Result<Vec<ExternalCandidate>, LookupError> {
        let body = self.sparql(&name_query(kind, name, language))?;
        let candidates = candidates_from(kind, &body)?;
        tracing::debug!(name, language, hits = candidates.len(), "name search");
        Ok(candidates)
    }

    /// Properties of one item, labels in `language` (the client default when
    /// blank).
    pub fn facts(&self, kind: EntityKind, id: &str, language: &str) -> Result<Facts, LookupError> {
        if !is_item_id(id) {
            tracing::warn!(id, "not a Wikidata item ID; no properties fetched");
            return Ok(Facts::default());
        }
        let language = if language.trim().is_empty() { self.label_language.as_str() } else { language };
        let body = self.sparql(&identifier_query(kind, id, language))?;
        Ok(candidates_from(kind, &body)?
            .into_iter()
            .next()
            .map(|c| c.facts)
            .unwrap_or_default())
    }

    pub fn coordinates(&self, id: &str) -> Result<Vec<Coordinate>, LookupError> {
        if !is_item_id(id) {
            return Ok(Vec::new());
        }
        let body = self.sparql(&coordinates_query(id))?;
        let mut coordinates = Vec::new();
        for row in bindings(&body)? {
            if let Some(c) = binding_value(row, "coord").and_then(Coordinate::from_wkt) {
                coordinates.push(c);
            }
        }
        Ok(coordinates)
    }

    /// Top `wbsearchentities` hit.
    pub fn search_entities(&self, text: &str, language: &str) -> Result<Option<TextHit>, LookupError> {
        let lang = language_tag(language);
        let body = self.client.get_json(|http| {
            http.get(&self.api_url).query(&[
                ("action", "wbsearchentities"),
                ("search", text),
                ("language", lang.as_str()),
                ("uselang", lang.as_str()),
                ("type", "item"),
                ("limit", "1"),
                ("format", "json"),
            ])
        })?;

        if let Some(error) = body.get("error") {
            let info = error.get("info").and_then(|v| v.as_str()).unwrap_or("unknown error");
            return Err(LookupError::Malformed(format!("wbsearchentities: {info}")));
        }

        let hit = body
            .get("search")
            .and_then(|s| s.as_array())
            .and_then(|s| s.first())
            .and_then(|first| {
                let id = first.get("id")?.as_str()?.to_string();
                let label = first
                    .get("label")
                    .and_then(|l| l.as_str())
                    .unwrap_or(&id)
                    .to_string();
                Some(TextHit { id, label })
            });
        tracing::debug!(text, language = %lang, hit = ?hit, "text search");
        Ok(hit)
    }
}
