//! Per-row reconciliation state machine.
//!
//! Branches, first match wins:
//!
//! 1. `note` is "skip": untouched, but its IDs are reserved for the whole run.
//! 2. Local ID known to the catalog: the catalog row wins field by field; an
//!    external ID that disagrees with the catalog aborts the run.
//! 3. New row with an external ID: the ID must not be bound to another local
//!    ID; fields are filled from the knowledge base.
//! 4. New row without an external ID: search (names, text, or coordinates);
//!    a hit bound to another local ID aborts the run; otherwise the row gets a
//!    local ID whether or not anything was found.

use serde::Serialize;

use crate::config::ReconConfig;
use crate::error::ReconError;
use crate::evidence::{compute_summary, Diagnostic, RowOutcome, RowReport, RunSummary, Severity};
use crate::geo::{match_place, GeoMatch};
use crate::index::CatalogIndex;
use crate::lookup::{ExternalLookup, LookupError};
use crate::matcher::{select, slate_languages, MatchProfile, Selection, Slate};
use crate::model::{field_list, CatalogRecord, Discovery, EntityKind, ExternalCandidate, Facts, Field, Provenance};
use crate::names::order_names;

pub const NO_MATCH_NOTE: &str = "no match in external knowledge base";

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct RunMeta {
    pub kind: EntityKind,
    pub editor: String,
    pub stamp_date: String,
    pub catalog_rows: usize,
    pub engine_version: String,
    pub run_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport<R> {
    pub meta: RunMeta,
    pub summary: RunSummary,
    pub reports: Vec<RowReport>,
    pub diagnostics: Vec<Diagnostic>,
    /// Reconciled rows, in input order.
    #[serde(skip)]
    pub rows: Vec<R>,
}

/// Reconcile `rows` against `catalog`. Either every row is processed or the
/// run aborts with the first fatal error.
pub fn run<R, L>(
    config: &ReconConfig,
    catalog: &[R],
    mut rows: Vec<R>,
    lookup: &L,
    provenance: &Provenance,
) -> Result<RunReport<R>, ReconError>
where
    R: CatalogRecord,
    L: ExternalLookup + ?Sized,
{
    let mut reconciler = Reconciler::new(config, catalog, lookup, provenance.clone());
    for row in rows.iter().filter(|r| r.is_skipped()) {
        reconciler.reserve(row);
    }
    let mut reports = Vec::with_capacity(rows.len());

    for (index, row) in rows.iter_mut().enumerate() {
        reports.push(reconciler.reconcile_row(index, row)?);
    }

    Ok(RunReport {
        meta: RunMeta {
            kind: R::KIND,
            editor: provenance.editor.clone(),
            stamp_date: provenance.date.clone(),
            catalog_rows: catalog.len(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
        },
        summary: compute_summary(&reports),
        reports,
        diagnostics: reconciler.into_diagnostics(),
        rows,
    })
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// What a search turned up for a row without an external ID.
enum Found {
    Candidate { candidate: ExternalCandidate, weight: u32 },
    ConfirmedByAddress,
    Nothing,
}

pub struct Reconciler<'a, R, L: ?Sized> {
    config: &'a ReconConfig,
    catalog: &'a [R],
    lookup: &'a L,
    index: CatalogIndex,
    provenance: Provenance,
    diagnostics: Vec<Diagnostic>,
}

impl<'a, R, L> Reconciler<'a, R, L>
where
    R: CatalogRecord,
    L: ExternalLookup + ?Sized,
{
    pub fn new(
        config: &'a ReconConfig,
        catalog: &'a [R],
        lookup: &'a L,
        provenance: Provenance,
    ) -> Self {
        Self {
            config,
            catalog,
            lookup,
            index: CatalogIndex::build(catalog),
            provenance,
            diagnostics: Vec::new(),
        }
    }

    pub fn index(&self) -> &CatalogIndex {
        &self.index
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    /// Hold the IDs of a row the run will not touch, so no other row is
    /// allocated its local ID or bound to its external ID.
    pub fn reserve(&mut self, row: &R) {
        let Some(local_id) = row.local_id() else { return };
        self.index.register(local_id);
        if let Some(external_id) = row.external_id() {
            if self.index.bound_to(external_id).is_none() {
                self.index.bind(external_id, local_id);
            }
        }
    }

    /// Reconcile one row in place.
    pub fn reconcile_row(&mut self, row_index: usize, row: &mut R) -> Result<RowReport, ReconError> {
        if row.is_skipped() {
            self.reserve(row);
            self.log(row_index, Severity::Debug, "skipped (note = skip)".to_string());
            return Ok(RowReport {
                row: row_index,
                outcome: RowOutcome::Skipped,
                allocated_id: None,
                stamped: false,
            });
        }

        if let Some(local_id) = row.local_id().map(str::to_string) {
            if self.index.contains(&local_id) {
                if let Some((catalog_row, same_language)) = self.catalog_row(&local_id, row.language()) {
                    return self.sync_known(row_index, row, &local_id, catalog_row, same_language);
                }
            }
        }

        match row.external_id().map(str::to_string) {
            Some(external_id) => self.fill_from_identifier(row_index, row, &external_id),
            None => self.discover(row_index, row),
        }
    }

    // -- branch 2 ----------------------------------------------------------

    /// Catalog row for a local ID, preferring the same language tag. The flag
    /// says whether the language matched.
    fn catalog_row(&self, local_id: &str, language: Option<&str>) -> Option<(&'a R, bool)> {
        let catalog: &'a [R] = self.catalog;
        let mut fallback = None;
        for candidate in catalog.iter().filter(|r| r.local_id() == Some(local_id)) {
            if candidate.language() == language {
                return Some((candidate, true));
            }
            fallback.get_or_insert(candidate);
        }
        fallback.map(|r| (r, false))
    }

    fn sync_known(
        &mut self,
        row_index: usize,
        row: &mut R,
        local_id: &str,
        catalog_row: &R,
        same_language: bool,
    ) -> Result<RowReport, ReconError> {
        match (row.external_id(), catalog_row.external_id()) {
            (Some(local), Some(catalog)) if local != catalog => {
                return Err(ReconError::KnownRecordConflict {
                    row: row_index,
                    local_id: local_id.to_string(),
                    local: local.to_string(),
                    catalog: catalog.to_string(),
                });
            }
            (Some(local), None) => {
                return Err(ReconError::KnownRecordConflict {
                    row: row_index,
                    local_id: local_id.to_string(),
                    local: local.to_string(),
                    catalog: String::new(),
                });
            }
            _ => {}
        }

        let shared = if same_language { R::CATALOG_FIELDS } else { R::LANGUAGE_NEUTRAL_FIELDS };
        let mut changed = Vec::new();
        for &field in std::iter::once(&Field::ExternalId).chain(shared) {
            let theirs = catalog_row.field(field);
            if row.field(field) != theirs {
                row.set_field(field, theirs.map(str::to_string));
                changed.push(field);
            }
        }

        if changed.is_empty() {
            self.log(row_index, Severity::Info, format!("'{local_id}' matches the catalog"));
            return Ok(RowReport {
                row: row_index,
                outcome: RowOutcome::Unchanged,
                allocated_id: None,
                stamped: false,
            });
        }

        let list = field_list(&changed);
        row.append_note(&format!("updated from catalog: {list}"));
        row.stamp(&self.provenance);
        self.log(
            row_index,
            Severity::Info,
            format!("'{local_id}' synchronized from catalog: {list}"),
        );

        Ok(RowReport {
            row: row_index,
            outcome: RowOutcome::SyncedFromCatalog { fields: changed },
            allocated_id: None,
            stamped: true,
        })
    }

    // -- branch 3 ----------------------------------------------------------

    fn fill_from_identifier(
        &mut self,
        row_index: usize,
        row: &mut R,
        external_id: &str,
    ) -> Result<RowReport, ReconError> {
        self.ensure_unbound(row_index, row, external_id)?;

        let language = self.facts_language(row);
        let facts = self
            .lookup
            .search_by_identifier(R::KIND, external_id, &language)
            .map_err(|e| lookup_failed(row_index, e))?;
        if facts.is_empty() {
            self.log(
                row_index,
                Severity::Warning,
                format!("no properties found for {external_id}"),
            );
        }

        let changed = self.apply_facts(row, &facts);
        let allocated_id = self.ensure_local_id(row_index, row)?;
        self.bind(row, external_id);

        if !changed.is_empty() {
            let list = field_list(&changed);
            row.append_note(&format!("updated from {external_id}: {list}"));
            self.log(row_index, Severity::Info, format!("filled from {external_id}: {list}"));
        }

        let stamped = !changed.is_empty() || allocated_id.is_some();
        if stamped {
            row.stamp(&self.provenance);
        }

        Ok(RowReport {
            row: row_index,
            outcome: if stamped {
                RowOutcome::FilledFromAuthority { external_id: external_id.to_string(), fields: changed }
            } else {
                RowOutcome::Unchanged
            },
            allocated_id,
            stamped,
        })
    }

    // -- branch 4 ----------------------------------------------------------

    fn discover(&mut self, row_index: usize, row: &mut R) -> Result<RowReport, ReconError> {
        let found = self.search(row_index, row).map_err(|e| lookup_failed(row_index, e))?;

        match found {
            Found::Candidate { candidate, weight } => {
                let external_id = candidate.external_id.clone();
                self.ensure_unbound(row_index, row, &external_id)?;

                let allocated_id = self.ensure_local_id(row_index, row)?;
                row.set_field(Field::ExternalId, Some(external_id.clone()));
                self.bind(row, &external_id);
                let fields = self.apply_facts(row, &candidate.facts);
                row.stamp(&self.provenance);

                self.log(
                    row_index,
                    Severity::Info,
                    format!(
                        "{} matched {} ({}, weight {weight})",
                        row.display_name(),
                        external_id,
                        candidate.label
                    ),
                );

                Ok(RowReport {
                    row: row_index,
                    outcome: RowOutcome::Matched { external_id, weight, fields },
                    allocated_id,
                    stamped: true,
                })
            }
            Found::ConfirmedByAddress => {
                let allocated_id = self.ensure_local_id(row_index, row)?;
                let stamped = allocated_id.is_some();
                if stamped {
                    row.stamp(&self.provenance);
                }
                Ok(RowReport {
                    row: row_index,
                    outcome: RowOutcome::ConfirmedByAddress,
                    allocated_id,
                    stamped,
                })
            }
            Found::Nothing => {
                let allocated_id = self.ensure_local_id(row_index, row)?;
                row.append_note(NO_MATCH_NOTE);
                row.stamp(&self.provenance);
                self.log(
                    row_index,
                    Severity::Warning,
                    format!("{}: {NO_MATCH_NOTE}", row.display_name()),
                );
                Ok(RowReport {
                    row: row_index,
                    outcome: RowOutcome::Unmatched,
                    allocated_id,
                    stamped: true,
                })
            }
        }
    }

    fn search(&mut self, row_index: usize, row: &R) -> Result<Found, LookupError> {
        let languages = slate_languages(row.language(), &self.config.languages);
        let primary = languages.first().map(String::as_str).unwrap_or("en");

        match row.discovery() {
            Discovery::Names { family, given } => {
                let mut slates = Vec::new();
                for language in &languages {
                    for query in order_names(family, given, language) {
                        let candidates = self.lookup.search_by_name(R::KIND, &query, language)?;
                        self.log(
                            row_index,
                            Severity::Debug,
                            format!("'{query}'@{language}: {} candidate(s)", candidates.len()),
                        );
                        slates.push(Slate { language: language.clone(), query, candidates });
                    }
                }
                let profile = MatchProfile::from_record(row);
                Ok(found_from(select(&profile, &slates)))
            }
            Discovery::Text { name } => {
                let Some(hit) = self.lookup.search_by_text(name, primary)? else {
                    return Ok(Found::Nothing);
                };
                let facts = self.lookup.search_by_identifier(R::KIND, &hit.id, primary)?;
                let slates = vec![Slate {
                    language: primary.to_string(),
                    query: name.to_string(),
                    candidates: vec![ExternalCandidate {
                        external_id: hit.id,
                        label: hit.label,
                        facts,
                    }],
                }];
                let profile = MatchProfile::from_record(row);
                Ok(found_from(select(&profile, &slates)))
            }
            Discovery::Place { name, coordinate } => {
                let Some(coordinate) = coordinate else {
                    self.log(row_index, Severity::Warning, format!("{name}: no usable coordinate"));
                    return Ok(Found::Nothing);
                };
                let tolerance = self.config.geo.tolerance_degrees;
                Ok(match match_place(self.lookup, name, coordinate, primary, tolerance)? {
                    GeoMatch::ConfirmedByAddress { address } => {
                        self.log(row_index, Severity::Info, format!("{name}: confirmed by address '{address}'"));
                        Found::ConfirmedByAddress
                    }
                    GeoMatch::Identified { hit, coordinate } => Found::Candidate {
                        candidate: ExternalCandidate {
                            external_id: hit.id,
                            label: hit.label,
                            facts: Facts { coordinates: vec![coordinate], ..Facts::default() },
                        },
                        weight: 0,
                    },
                    GeoMatch::NoMatch => Found::Nothing,
                })
            }
            Discovery::Unsearchable => {
                self.log(row_index, Severity::Warning, "nothing to search with".to_string());
                Ok(Found::Nothing)
            }
        }
    }

    // -- shared steps --------------------------------------------------------

    /// Label language for identifier facts: the row's own, then the
    /// configured priority list.
    fn facts_language(&self, row: &R) -> String {
        slate_languages(row.language(), &self.config.languages)
            .into_iter()
            .next()
            .unwrap_or_else(|| "en".to_string())
    }

    /// Abort when `external_id` already belongs to a different local ID.
    fn ensure_unbound(&self, row_index: usize, row: &R, external_id: &str) -> Result<(), ReconError> {
        match self.index.bound_to(external_id) {
            Some(bound_to) if Some(bound_to) != row.local_id() => Err(ReconError::ExternalIdConflict {
                row: row_index,
                external_id: external_id.to_string(),
                bound_to: bound_to.to_string(),
                local_id: row.local_id().unwrap_or_default().to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Give the row a local ID if it has none. Returns the allocated ID.
    fn ensure_local_id(&mut self, row_index: usize, row: &mut R) -> Result<Option<String>, ReconError> {
        if let Some(existing) = row.local_id() {
            self.index.register(existing);
            return Ok(None);
        }
        let id = self
            .index
            .allocate()
            .map_err(|source| ReconError::MissingPrerequisite { row: row_index, source })?;
        row.set_local_id(id.clone());
        self.log(row_index, Severity::Info, format!("allocated local ID {id}"));
        Ok(Some(id))
    }

    fn bind(&mut self, row: &R, external_id: &str) {
        if let Some(local_id) = row.local_id() {
            self.index.bind(external_id, local_id);
        }
    }

    /// Overwrite fields that are empty or disagree with the knowledge base.
    /// Values the knowledge base lacks are left alone.
    fn apply_facts(&self, row: &mut R, facts: &Facts) -> Vec<Field> {
        let mut changed = Vec::new();

        for &field in R::AUTHORITY_FIELDS.iter().filter(|f| !f.is_coordinate()) {
            let Some(value) = facts.value(field) else { continue };
            if row.field(field) != Some(value.as_str()) {
                row.set_field(field, Some(value));
                changed.push(field);
            }
        }

        if R::AUTHORITY_FIELDS.contains(&Field::Latitude) {
            if let Some(authoritative) = facts.coordinates.first() {
                let close_enough = row
                    .coordinate()
                    .is_some_and(|c| c.within(authoritative, self.config.geo.tolerance_degrees));
                if !close_enough {
                    row.set_field(Field::Latitude, Some(authoritative.lat.to_string()));
                    row.set_field(Field::Longitude, Some(authoritative.lon.to_string()));
                    changed.extend([Field::Latitude, Field::Longitude]);
                }
            }
        }

        changed
    }

    fn log(&mut self, row: usize, severity: Severity, message: String) {
        self.diagnostics.push(Diagnostic { row, severity, message });
    }
}

fn found_from(selection: Option<Selection>) -> Found {
    match selection {
        Some(s) => Found::Candidate { candidate: s.candidate, weight: s.weight },
        None => Found::Nothing,
    }
}

fn lookup_failed(row: usize, source: LookupError) -> ReconError {
    ReconError::Lookup { row, source }
}
