//! Weighted candidate matching.
//!
//! A candidate's weight is the number of scoring fields on which it agrees
//! with the local row. Candidates come in slates, one per (language, name
//! variant) query that returned hits. Slates are ordered by language
//! priority, then name-variant order; the earliest slate wins ties.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::model::{CatalogRecord, ExternalCandidate, Facts, Field};
use crate::years::year_constraint;

// ---------------------------------------------------------------------------
// Match profile
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Expectation {
    Exact(String),
    YearIn(BTreeSet<String>),
}

#[derive(Debug, Clone, PartialEq)]
struct Criterion {
    field: Field,
    expect: Expectation,
}

/// The local row's known values for its kind's scoring fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchProfile {
    criteria: Vec<Criterion>,
}

impl MatchProfile {
    pub fn from_record<R: CatalogRecord>(record: &R) -> Self {
        let criteria = R::SCORING_FIELDS
            .iter()
            .filter_map(|&field| {
                let value = record.field(field)?;
                let expect = if field.is_year() {
                    let years = year_constraint(value);
                    if years.is_empty() {
                        return None;
                    }
                    Expectation::YearIn(years)
                } else {
                    Expectation::Exact(value.to_string())
                };
                Some(Criterion { field, expect })
            })
            .collect();
        Self { criteria }
    }

    /// Number of constraints the local row contributes.
    pub fn len(&self) -> usize {
        self.criteria.len()
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    /// Count agreeing fields. A value absent on the candidate never counts.
    pub fn weigh(&self, facts: &Facts) -> u32 {
        self.criteria
            .iter()
            .filter(|c| {
                let Some(theirs) = facts.value(c.field) else { return false };
                match &c.expect {
                    Expectation::Exact(ours) => *ours == theirs,
                    Expectation::YearIn(years) => years.contains(&theirs),
                }
            })
            .count() as u32
    }
}

// ---------------------------------------------------------------------------
// Slates
// ---------------------------------------------------------------------------

/// Candidates returned by one name query.
#[derive(Debug, Clone)]
pub struct Slate {
    pub language: String,
    pub query: String,
    pub candidates: Vec<ExternalCandidate>,
}

/// The chosen candidate and where it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Selection {
    pub candidate: ExternalCandidate,
    pub weight: u32,
    pub language: String,
    pub query: String,
    /// Number of non-empty slates considered.
    pub slates: usize,
}

/// Languages to query, in priority order: the row's own language, then the
/// configured list, without repeats.
pub fn slate_languages(row_language: Option<&str>, configured: &[String]) -> Vec<String> {
    let mut languages: Vec<String> = Vec::new();
    for lang in row_language.into_iter().chain(configured.iter().map(String::as_str)) {
        let lang = lang.trim();
        if !lang.is_empty() && !languages.iter().any(|l| l.eq_ignore_ascii_case(lang)) {
            languages.push(lang.to_string());
        }
    }
    languages
}

/// Best candidate of one slate: highest weight, earliest on ties.
pub fn best_in_slate<'a>(
    profile: &MatchProfile,
    slate: &'a Slate,
) -> Option<(&'a ExternalCandidate, u32)> {
    let mut best: Option<(&ExternalCandidate, u32)> = None;
    for candidate in &slate.candidates {
        let weight = profile.weigh(&candidate.facts);
        if best.map_or(true, |(_, w)| weight > w) {
            best = Some((candidate, weight));
        }
    }
    best
}

/// Pick the winning candidate across slates.
///
/// A lone slate is accepted whatever its weight: without a second opinion a
/// zero weight is not evidence of a mismatch. Across slates the strictly
/// higher weight wins and ties keep the earlier slate. Empty slates are
/// ignored; no candidates at all means no match.
pub fn select(profile: &MatchProfile, slates: &[Slate]) -> Option<Selection> {
    let mut best: Option<(&Slate, &ExternalCandidate, u32)> = None;
    let mut considered = 0;

    for slate in slates {
        let Some((candidate, weight)) = best_in_slate(profile, slate) else { continue };
        considered += 1;
        if best.map_or(true, |(_, _, w)| weight > w) {
            best = Some((slate, candidate, weight));
        }
    }

    best.map(|(slate, candidate, weight)| Selection {
        candidate: candidate.clone(),
        weight,
        language: slate.language.clone(),
        query: slate.query.clone(),
        slates: considered,
    })
}
