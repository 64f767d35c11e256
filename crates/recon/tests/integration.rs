use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;

use catalink_recon::engine::{run, Reconciler, NO_MATCH_NOTE};
use catalink_recon::evidence::RowOutcome;
use catalink_recon::index::{audit, AllocationError};
use catalink_recon::model::{ExternalCandidate, Field, TextHit};
use catalink_recon::table::read_table_path;
use catalink_recon::{
    CatalogRecord, Coordinate, EntityKind, ExternalLookup, Facts, InstitutionRecord, LookupError,
    OfflineLookup, PersonRecord, Provenance, ReconConfig, ReconError, SpaceRecord,
};
use proptest::prelude::*;

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn load<R: CatalogRecord>(name: &str) -> Vec<R> {
    read_table_path(&fixtures_dir().join(name))
        .unwrap_or_else(|e| panic!("cannot read {name}: {e}"))
}

fn stamp() -> Provenance {
    Provenance::new("2026-10-18", "tester")
}

// -------------------------------------------------------------------------
// Scripted lookup
// -------------------------------------------------------------------------

/// In-memory knowledge base that records every call it receives.
#[derive(Default)]
struct ScriptedLookup {
    names: HashMap<(String, String), Vec<ExternalCandidate>>,
    facts: HashMap<String, Facts>,
    text: HashMap<String, TextHit>,
    addresses: Vec<(Coordinate, String)>,
    coordinates: HashMap<String, Vec<Coordinate>>,
    fail: bool,
    calls: RefCell<Vec<String>>,
}

impl ScriptedLookup {
    fn with_name(mut self, name: &str, language: &str, candidates: Vec<ExternalCandidate>) -> Self {
        self.names.insert((name.into(), language.into()), candidates);
        self
    }

    fn with_facts(mut self, id: &str, facts: Facts) -> Self {
        self.facts.insert(id.into(), facts);
        self
    }

    fn with_text(mut self, text: &str, id: &str) -> Self {
        self.text.insert(text.into(), TextHit { id: id.into(), label: text.into() });
        self
    }

    fn with_address(mut self, at: Coordinate, address: &str) -> Self {
        self.addresses.push((at, address.into()));
        self
    }

    fn with_coordinates(mut self, id: &str, coordinates: Vec<Coordinate>) -> Self {
        self.coordinates.insert(id.into(), coordinates);
        self
    }

    fn record(&self, call: String) -> Result<(), LookupError> {
        self.calls.borrow_mut().push(call);
        if self.fail {
            return Err(LookupError::Network("connection refused".into()));
        }
        Ok(())
    }

    fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn knowledge_base_calls(&self) -> usize {
        self.calls.borrow().iter().filter(|c| !c.starts_with("reverse")).count()
    }
}

impl ExternalLookup for ScriptedLookup {
    fn search_by_name(
        &self,
        _kind: EntityKind,
        name: &str,
        language: &str,
    ) -> Result<Vec<ExternalCandidate>, LookupError> {
        self.record(format!("name {name}@{language}"))?;
        Ok(self
            .names
            .get(&(name.to_string(), language.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    fn search_by_identifier(
        &self,
        _kind: EntityKind,
        id: &str,
        language: &str,
    ) -> Result<Facts, LookupError> {
        self.record(format!("id {id}@{language}"))?;
        Ok(self.facts.get(id).cloned().unwrap_or_default())
    }

    fn search_by_text(&self, text: &str, language: &str) -> Result<Option<TextHit>, LookupError> {
        self.record(format!("text {text}@{language}"))?;
        Ok(self.text.get(text).cloned())
    }

    fn reverse_geocode(&self, coordinate: Coordinate) -> Result<Option<String>, LookupError> {
        self.record(format!("reverse {} {}", coordinate.lat, coordinate.lon))?;
        Ok(self
            .addresses
            .iter()
            .find(|(at, _)| at.within(&coordinate, 1e-6))
            .map(|(_, address)| address.clone()))
    }

    fn coordinates_of(&self, id: &str) -> Result<Vec<Coordinate>, LookupError> {
        self.record(format!("coords {id}"))?;
        Ok(self.coordinates.get(id).cloned().unwrap_or_default())
    }
}

fn monet() -> ExternalCandidate {
    ExternalCandidate {
        external_id: "Q296".into(),
        label: "Claude Monet".into(),
        facts: Facts {
            gender: Some("male".into()),
            birth_year: Some("1840-11-14T00:00:00Z".into()),
            death_year: Some("1926-12-05T00:00:00Z".into()),
            birthplace: Some("Paris".into()),
            ..Default::default()
        },
    }
}

fn person(local_id: &str, external_id: &str, family: &str, given: &str, language: &str) -> PersonRecord {
    let cell = |s: &str| Some(s.to_string()).filter(|s| !s.is_empty());
    PersonRecord {
        local_id: cell(local_id),
        external_id: cell(external_id),
        family_name: cell(family),
        given_name: cell(given),
        language: cell(language),
        ..Default::default()
    }
}

fn person_catalog() -> Vec<PersonRecord> {
    load("person_catalog.csv")
}

// -------------------------------------------------------------------------
// Person: fixture end-to-end
// -------------------------------------------------------------------------

#[test]
fn person_fixture_end_to_end() {
    let catalog = person_catalog();
    let local: Vec<PersonRecord> = load("person_local.csv");
    let lookup = ScriptedLookup::default().with_name("Claude Monet", "en", vec![monet()]);

    let report = run(&ReconConfig::default(), &catalog, local.clone(), &lookup, &stamp()).unwrap();
    let rows = &report.rows;

    // identical known row
    assert_eq!(report.reports[0].outcome, RowOutcome::Unchanged);
    assert_eq!(rows[0], local[0]);

    // known row missing its external ID
    assert_eq!(
        report.reports[1].outcome,
        RowOutcome::SyncedFromCatalog { fields: vec![Field::ExternalId] }
    );
    assert_eq!(rows[1].external_id.as_deref(), Some("Q23114"));
    assert_eq!(rows[1].note.as_deref(), Some("updated from catalog: wikidata_id"));
    assert_eq!(rows[1].last_modified.as_deref(), Some("2026-10-18"));
    assert_eq!(rows[1].last_modified_by.as_deref(), Some("tester"));

    // discovered by name
    assert_eq!(rows[2].local_id.as_deref(), Some("AG0006"));
    assert_eq!(rows[2].external_id.as_deref(), Some("Q296"));
    assert_eq!(rows[2].birth_year.as_deref(), Some("1840"));
    assert_eq!(rows[2].death_year.as_deref(), Some("1926"));
    assert_eq!(rows[2].birthplace.as_deref(), Some("Paris"));

    // skipped
    assert_eq!(report.reports[3].outcome, RowOutcome::Skipped);
    assert_eq!(rows[3], local[3]);

    // nothing found
    assert_eq!(report.reports[4].outcome, RowOutcome::Unmatched);
    assert_eq!(rows[4].local_id.as_deref(), Some("AG0007"));
    assert_eq!(rows[4].note.as_deref(), Some(NO_MATCH_NOTE));
    assert_eq!(rows[4].last_modified.as_deref(), Some("2026-10-18"));

    assert_eq!(report.summary.total_rows, 5);
    assert_eq!(report.summary.skipped, 1);
    assert_eq!(report.summary.unchanged, 1);
    assert_eq!(report.summary.matched, 1);
    assert_eq!(report.summary.unmatched, 1);
    assert_eq!(report.summary.allocated, 2);
    assert_eq!(report.summary.modified, 3);
    assert_eq!(report.meta.kind, EntityKind::Person);
    assert_eq!(report.meta.catalog_rows, 4);

    assert!(audit(rows).is_empty(), "{:?}", audit(rows));
}

#[test]
fn skipped_rows_make_no_lookups() {
    let catalog = person_catalog();
    let mut row = person("", "", "Monet", "Claude", "en");
    row.note = Some("Skip".into());
    let lookup = ScriptedLookup::default().with_name("Claude Monet", "en", vec![monet()]);

    let report = run(&ReconConfig::default(), &catalog, vec![row.clone()], &lookup, &stamp()).unwrap();
    assert_eq!(report.rows, vec![row]);
    assert!(lookup.calls().is_empty());
}

// -------------------------------------------------------------------------
// Scenarios
// -------------------------------------------------------------------------

#[test]
fn scenario_a_identical_known_row_is_unchanged() {
    let catalog = vec![PersonRecord {
        birth_year: Some("1881".into()),
        ..person("AG0001", "Q23114", "鲁", "迅", "zh")
    }];
    let row = catalog[0].clone();

    let report = run(&ReconConfig::default(), &catalog, vec![row.clone()], &OfflineLookup, &stamp())
        .unwrap();
    assert_eq!(report.rows, vec![row]);
    assert!(!report.reports[0].stamped);
    assert_eq!(report.reports[0].outcome, RowOutcome::Unchanged);
}

#[test]
fn scenario_b_catalog_supplies_missing_external_id() {
    let catalog = vec![person("AG0001", "Q23114", "鲁", "迅", "zh")];
    let row = person("AG0001", "", "鲁", "迅", "zh");

    let report = run(&ReconConfig::default(), &catalog, vec![row], &OfflineLookup, &stamp()).unwrap();
    let out = &report.rows[0];
    assert_eq!(out.external_id.as_deref(), Some("Q23114"));
    assert!(out.note.as_deref().unwrap().contains("wikidata_id"));
    assert_eq!(out.last_modified_by.as_deref(), Some("tester"));
}

#[test]
fn scenario_c_bound_external_id_aborts_the_run() {
    let catalog = vec![
        person("AG0001", "Q1", "周", "作人", "zh"),
        person("AG0005", "Q23114", "鲁", "迅", "zh"),
    ];
    let rows = vec![
        person("AG0001", "Q1", "周", "作人", "zh"),
        person("", "Q23114", "鲁", "迅", "zh"),
    ];

    let err = run(&ReconConfig::default(), &catalog, rows, &OfflineLookup, &stamp()).unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(err.row(), Some(1));
    match err {
        ReconError::ExternalIdConflict { external_id, bound_to, .. } => {
            assert_eq!(external_id, "Q23114");
            assert_eq!(bound_to, "AG0005");
        }
        other => panic!("expected ExternalIdConflict, got {other:?}"),
    }
}

#[test]
fn scenario_d_single_zero_weight_slate_is_accepted() {
    let catalog = person_catalog();
    let lookup = ScriptedLookup::default().with_name("Claude Monet", "en", vec![monet()]);
    let row = person("", "", "Monet", "Claude", "en");

    let report = run(&ReconConfig::default(), &catalog, vec![row], &lookup, &stamp()).unwrap();
    let out = &report.rows[0];
    assert_eq!(out.local_id.as_deref(), Some("AG0006"));
    assert_eq!(out.external_id.as_deref(), Some("Q296"));
    assert_eq!(out.sex.as_deref(), Some("male"));
    assert_eq!(out.birth_year.as_deref(), Some("1840"));
    assert_eq!(out.death_year.as_deref(), Some("1926"));
    assert_eq!(out.birthplace.as_deref(), Some("Paris"));
    assert_eq!(out.note, None);
    match &report.reports[0].outcome {
        RowOutcome::Matched { external_id, weight, .. } => {
            assert_eq!(external_id, "Q296");
            assert_eq!(*weight, 0);
        }
        other => panic!("expected Matched, got {other:?}"),
    }
    assert_eq!(report.reports[0].allocated_id.as_deref(), Some("AG0006"));
    assert_eq!(
        lookup.calls(),
        vec!["name Claude Monet@en", "name Monet Claude@en"]
    );
}

#[test]
fn scenario_e_address_confirmation_skips_knowledge_base() {
    let catalog: Vec<SpaceRecord> = load("space_catalog.csv");
    let here = Coordinate::new(39.9042, 116.4074);
    let lookup = ScriptedLookup::default()
        .with_address(here, "东城区, Beijing, 100010, China")
        .with_text("Beijing", "Q956");
    let row = SpaceRecord {
        local_id: Some("SP0100".into()),
        space_name: Some("Beijing".into()),
        space_type: Some("city".into()),
        latitude: Some("39.9042".into()),
        longitude: Some("116.4074".into()),
        ..Default::default()
    };

    let report = run(&ReconConfig::default(), &catalog, vec![row.clone()], &lookup, &stamp()).unwrap();
    assert_eq!(report.rows, vec![row]);
    assert_eq!(report.reports[0].outcome, RowOutcome::ConfirmedByAddress);
    assert!(!report.reports[0].stamped);
    assert_eq!(lookup.knowledge_base_calls(), 0);
}

// -------------------------------------------------------------------------
// Known-record and discovery conflicts
// -------------------------------------------------------------------------

#[test]
fn known_row_with_different_external_id_aborts() {
    let catalog = person_catalog();
    let row = person("AG0001", "Q999", "鲁", "迅", "zh");
    let err = run(&ReconConfig::default(), &catalog, vec![row], &OfflineLookup, &stamp()).unwrap_err();
    assert!(matches!(
        err,
        ReconError::KnownRecordConflict { row: 0, ref local, ref catalog, .. }
            if local == "Q999" && catalog == "Q23114"
    ));
}

#[test]
fn known_row_claiming_external_id_the_catalog_lacks_aborts() {
    let catalog = person_catalog();
    let row = person("AG0002", "Q853", "周", "作人", "zh");
    let err = run(&ReconConfig::default(), &catalog, vec![row], &OfflineLookup, &stamp()).unwrap_err();
    assert!(matches!(err, ReconError::KnownRecordConflict { .. }));
}

#[test]
fn discovered_external_id_bound_elsewhere_aborts() {
    let catalog = person_catalog();
    let lookup = ScriptedLookup::default().with_name(
        "鲁迅",
        "zh",
        vec![ExternalCandidate {
            external_id: "Q23114".into(),
            label: "鲁迅".into(),
            facts: Facts::default(),
        }],
    );
    let rows = vec![person("", "", "鲁", "迅", "zh")];
    let err = run(&ReconConfig::default(), &catalog, rows, &lookup, &stamp()).unwrap_err();
    assert!(matches!(
        err,
        ReconError::ExternalIdConflict { row: 0, ref bound_to, .. } if bound_to == "AG0001"
    ));
}

#[test]
fn bindings_made_during_the_run_are_visible_to_later_rows() {
    let catalog = person_catalog();
    let lookup = ScriptedLookup::default().with_name("Claude Monet", "en", vec![monet()]);
    let rows = vec![
        person("", "", "Monet", "Claude", "en"),
        person("", "", "Monet", "Claude", "en"),
    ];
    let err = run(&ReconConfig::default(), &catalog, rows, &lookup, &stamp()).unwrap_err();
    assert!(matches!(
        err,
        ReconError::ExternalIdConflict { row: 1, ref bound_to, .. } if bound_to == "AG0006"
    ));
}

#[test]
fn skipped_rows_hold_their_ids() {
    let catalog = person_catalog();
    let skipped = PersonRecord { note: Some("skip".into()), ..person("AG0006", "Q777", "Ba", "Ren", "en") };

    let rows = vec![person("", "", "Nemo", "Nobody", "en"), skipped.clone()];
    let report = run(&ReconConfig::default(), &catalog, rows, &OfflineLookup, &stamp()).unwrap();
    assert_eq!(report.rows[0].local_id.as_deref(), Some("AG0007"));
    assert_eq!(report.rows[1], skipped);
    assert!(audit(&report.rows).is_empty());

    let rows = vec![
        skipped,
        person("", "", "Nemo", "Nobody", "en"),
        person("", "Q777", "Li", "Fei", "en"),
    ];
    let err = run(&ReconConfig::default(), &catalog, rows, &OfflineLookup, &stamp()).unwrap_err();
    assert!(matches!(
        err,
        ReconError::ExternalIdConflict { row: 2, ref bound_to, .. } if bound_to == "AG0006"
    ));
}

#[test]
fn uncatalogued_local_ids_do_not_steer_allocation() {
    let catalog = person_catalog();
    let rows = vec![
        person("TMP-a", "", "Nemo", "Nobody", "en"),
        person("ZZ0001", "", "Nemo", "Somebody", "en"),
        person("AG9999", "", "Nemo", "Anybody", "en"),
        person("", "", "Nemo", "Everybody", "en"),
        person("AG0007", "", "Nemo", "Nobody", "zh"),
        person("", "", "Nemo", "Someone", "en"),
    ];
    let report = run(&ReconConfig::default(), &catalog, rows, &OfflineLookup, &stamp()).unwrap();
    let ids: Vec<_> = report.rows.iter().map(|r| r.local_id.as_deref().unwrap()).collect();
    assert_eq!(ids, ["TMP-a", "ZZ0001", "AG9999", "AG0006", "AG0007", "AG0008"]);
    assert_eq!(report.summary.allocated, 2);
    assert!(audit(&report.rows).is_empty());
}

#[test]
fn empty_catalog_cannot_allocate() {
    let rows = vec![person("", "", "Monet", "Claude", "en")];
    let err = run::<PersonRecord, _>(&ReconConfig::default(), &[], rows, &OfflineLookup, &stamp())
        .unwrap_err();
    assert!(matches!(
        err,
        ReconError::MissingPrerequisite { row: 0, source: AllocationError::NoCursor }
    ));
}

#[test]
fn lookup_failure_aborts_with_row() {
    let catalog = person_catalog();
    let lookup = ScriptedLookup { fail: true, ..Default::default() };
    let rows = vec![
        person("AG0001", "Q23114", "鲁", "迅", "zh"),
        person("", "", "Monet", "Claude", "en"),
    ];
    let err = run(&ReconConfig::default(), &catalog, rows, &lookup, &stamp()).unwrap_err();
    assert!(matches!(err, ReconError::Lookup { row: 1, .. }), "{err:?}");
}

// -------------------------------------------------------------------------
// Supplied external ID
// -------------------------------------------------------------------------

#[test]
fn supplied_external_id_fills_from_identifier() {
    let catalog = person_catalog();
    let lookup = ScriptedLookup::default().with_facts(
        "Q2004",
        Facts {
            gender: Some("男".into()),
            birth_year: Some("+1899-02-03T00:00:00Z".into()),
            death_year: Some("+1966-08-24T00:00:00Z".into()),
            ..Default::default()
        },
    );
    let row = PersonRecord {
        birth_year: Some("1898".into()),
        ..person("", "Q2004", "舒", "庆春", "zh")
    };

    let report = run(&ReconConfig::default(), &catalog, vec![row], &lookup, &stamp()).unwrap();
    let out = &report.rows[0];
    assert_eq!(out.local_id.as_deref(), Some("AG0006"));
    assert_eq!(out.sex.as_deref(), Some("男"));
    assert_eq!(out.birth_year.as_deref(), Some("1899"));
    assert_eq!(out.death_year.as_deref(), Some("1966"));
    assert_eq!(out.birthplace, None, "absent facts leave the field alone");
    assert_eq!(
        out.note.as_deref(),
        Some("updated from Q2004: sex, birth_year, death_year")
    );
    assert!(report.reports[0].stamped);
}

#[test]
fn supplied_external_id_with_nothing_to_change_is_unchanged() {
    let catalog = person_catalog();
    let lookup = ScriptedLookup::default()
        .with_facts("Q2004", Facts { gender: Some("男".into()), ..Default::default() });
    let row = PersonRecord {
        sex: Some("男".into()),
        ..person("AG0042", "Q2004", "舒", "庆春", "zh")
    };

    let report = run(&ReconConfig::default(), &catalog, vec![row.clone()], &lookup, &stamp()).unwrap();
    assert_eq!(report.rows, vec![row]);
    assert_eq!(report.reports[0].outcome, RowOutcome::Unchanged);
    assert!(!report.reports[0].stamped);
}

#[test]
fn identifier_facts_are_fetched_in_the_row_language() {
    let catalog = person_catalog();
    let config = ReconConfig { languages: vec!["fr".into(), "en".into()], ..Default::default() };
    let lookup = ScriptedLookup::default()
        .with_facts("Q2004", Facts { gender: Some("男".into()), ..Default::default() });
    let rows = vec![
        PersonRecord { sex: Some("男".into()), ..person("", "Q2004", "舒", "庆春", "zh") },
        person("", "Q5", "Nemo", "Nobody", ""),
    ];

    let report = run(&config, &catalog, rows, &lookup, &stamp()).unwrap();
    assert_eq!(lookup.calls(), vec!["id Q2004@zh", "id Q5@fr"]);
    assert_eq!(report.rows[0].sex.as_deref(), Some("男"));
    assert_eq!(report.rows[0].note, None);
}

// -------------------------------------------------------------------------
// Multi-language slates
// -------------------------------------------------------------------------

#[test]
fn configured_language_slate_with_higher_weight_wins() {
    let catalog = person_catalog();
    let config = ReconConfig { languages: vec!["zh".into(), "en".into()], ..Default::default() };
    let lookup = ScriptedLookup::default()
        .with_name(
            "鲁迅",
            "zh",
            vec![ExternalCandidate {
                external_id: "Q111".into(),
                label: "鲁迅 (disambiguation)".into(),
                facts: Facts::default(),
            }],
        )
        .with_name(
            "迅 鲁",
            "en",
            vec![ExternalCandidate {
                external_id: "Q222".into(),
                label: "Lu Xun".into(),
                facts: Facts { birth_year: Some("1881".into()), ..Default::default() },
            }],
        );
    let row = PersonRecord {
        birth_year: Some("1881".into()),
        ..person("", "", "鲁", "迅", "zh")
    };

    let report = run(&config, &catalog, vec![row], &lookup, &stamp()).unwrap();
    assert_eq!(report.rows[0].external_id.as_deref(), Some("Q222"));
    assert_eq!(
        lookup.calls(),
        vec!["name 鲁迅@zh", "name 迅 鲁@en", "name 鲁 迅@en"]
    );
}

#[test]
fn equal_weight_keeps_row_language_slate() {
    let catalog = person_catalog();
    let config = ReconConfig { languages: vec!["en".into()], ..Default::default() };
    let candidate = |id: &str| ExternalCandidate {
        external_id: id.into(),
        label: id.into(),
        facts: Facts::default(),
    };
    let lookup = ScriptedLookup::default()
        .with_name("鲁迅", "zh", vec![candidate("Q111")])
        .with_name("迅 鲁", "en", vec![candidate("Q222")]);

    let report = run(&config, &catalog, vec![person("", "", "鲁", "迅", "zh")], &lookup, &stamp())
        .unwrap();
    assert_eq!(report.rows[0].external_id.as_deref(), Some("Q111"));
}

// -------------------------------------------------------------------------
// Institutions
// -------------------------------------------------------------------------

#[test]
fn institution_text_search_then_identifier_facts() {
    let catalog = vec![InstitutionRecord {
        local_id: Some("IN0001".into()),
        external_id: Some("Q16952".into()),
        inst_name: Some("北京大学".into()),
        language: Some("zh".into()),
        ..Default::default()
    }];
    let lookup = ScriptedLookup::default()
        .with_text("清华大学", "Q16955")
        .with_facts(
            "Q16955",
            Facts {
                admin_place: Some("北京".into()),
                inception_year: Some("+1911-04-29T00:00:00Z".into()),
                ..Default::default()
            },
        );
    let row = InstitutionRecord {
        inst_name: Some("清华大学".into()),
        language: Some("zh".into()),
        admin_place: Some("北京".into()),
        ..Default::default()
    };

    let report = run(&ReconConfig::default(), &catalog, vec![row], &lookup, &stamp()).unwrap();
    let out = &report.rows[0];
    assert_eq!(out.local_id.as_deref(), Some("IN0002"));
    assert_eq!(out.external_id.as_deref(), Some("Q16955"));
    assert_eq!(out.inception_year.as_deref(), Some("1911"));
    match &report.reports[0].outcome {
        RowOutcome::Matched { weight, fields, .. } => {
            assert_eq!(*weight, 1);
            assert_eq!(fields, &vec![Field::InceptionYear]);
        }
        other => panic!("expected Matched, got {other:?}"),
    }
    assert_eq!(lookup.calls(), vec!["text 清华大学@zh", "id Q16955@zh"]);
}

// -------------------------------------------------------------------------
// Spaces
// -------------------------------------------------------------------------

#[test]
fn space_fixture_end_to_end() {
    let catalog: Vec<SpaceRecord> = load("space_catalog.csv");
    let local: Vec<SpaceRecord> = load("space_local.csv");
    let lookup = ScriptedLookup::default()
        .with_address(Coordinate::new(39.9042, 116.4074), "东城区, Beijing, 100010, China")
        .with_address(Coordinate::new(31.2304, 121.4737), "黄浦区, 上海市, 中国")
        .with_text("Shanghai", "Q8686")
        .with_coordinates("Q8686", vec![Coordinate::new(31.2222, 121.4581)]);

    let report = run(&ReconConfig::default(), &catalog, local, &lookup, &stamp()).unwrap();
    let rows = &report.rows;

    assert_eq!(report.reports[0].outcome, RowOutcome::ConfirmedByAddress);
    assert_eq!(rows[0].local_id.as_deref(), Some("SP0003"));
    assert_eq!(rows[0].external_id, None);
    assert_eq!(rows[0].note, None);

    assert_eq!(rows[1].local_id.as_deref(), Some("SP0004"));
    assert_eq!(rows[1].external_id.as_deref(), Some("Q8686"));
    // within tolerance: local coordinate kept
    assert_eq!(rows[1].latitude.as_deref(), Some("31.2304"));

    assert_eq!(report.reports[2].outcome, RowOutcome::Unmatched);
    assert_eq!(rows[2].local_id.as_deref(), Some("SP0005"));
    assert_eq!(rows[2].note.as_deref(), Some(NO_MATCH_NOTE));
}

#[test]
fn discovered_space_keeps_coordinate_within_tolerance() {
    let catalog: Vec<SpaceRecord> = load("space_catalog.csv");
    let lookup = ScriptedLookup::default()
        .with_text("Tianjin", "Q11736")
        .with_coordinates("Q11736", vec![Coordinate::new(39.1336, 117.2054)]);
    let config = ReconConfig::from_toml("[geo]\ntolerance_degrees = 0.9").unwrap();
    let row = SpaceRecord {
        space_name: Some("Tianjin".into()),
        latitude: Some("39.5".into()),
        longitude: Some("117.5".into()),
        ..Default::default()
    };

    let report = run(&config, &catalog, vec![row], &lookup, &stamp()).unwrap();
    let out = &report.rows[0];
    assert_eq!(out.external_id.as_deref(), Some("Q11736"));
    assert_eq!(out.latitude.as_deref(), Some("39.5"));
    assert_eq!(out.longitude.as_deref(), Some("117.5"));

    // same place, stricter tolerance: no longer close enough
    let mut strict = config.clone();
    strict.geo.tolerance_degrees = 0.1;
    let row = SpaceRecord {
        space_name: Some("Tianjin".into()),
        latitude: Some("39.5".into()),
        longitude: Some("117.5".into()),
        ..Default::default()
    };
    let report = run(&strict, &catalog, vec![row], &lookup, &stamp()).unwrap();
    assert_eq!(report.reports[0].outcome, RowOutcome::Unmatched);
}

#[test]
fn supplied_space_identifier_replaces_distant_or_missing_coordinates() {
    let catalog: Vec<SpaceRecord> = load("space_catalog.csv");
    let lookup = ScriptedLookup::default().with_facts(
        "Q11736",
        Facts { coordinates: vec![Coordinate::new(39.1336, 117.2054)], ..Default::default() },
    );
    let far = SpaceRecord {
        external_id: Some("Q11736".into()),
        space_name: Some("Tianjin".into()),
        latitude: Some("40.5".into()),
        longitude: Some("117.2".into()),
        ..Default::default()
    };
    let near = SpaceRecord {
        local_id: Some("SP0050".into()),
        latitude: Some("39.14".into()),
        longitude: Some("117.21".into()),
        ..far.clone()
    };

    let report = run(&ReconConfig::default(), &catalog, vec![far], &lookup, &stamp()).unwrap();
    let out = &report.rows[0];
    assert_eq!(out.latitude.as_deref(), Some("39.1336"));
    assert_eq!(out.longitude.as_deref(), Some("117.2054"));
    assert_eq!(out.note.as_deref(), Some("updated from Q11736: latitude, longitude"));

    let report = run(&ReconConfig::default(), &catalog, vec![near.clone()], &lookup, &stamp()).unwrap();
    assert_eq!(report.rows, vec![near]);
}

#[test]
fn known_space_syncs_from_catalog() {
    let catalog: Vec<SpaceRecord> = load("space_catalog.csv");
    let row = SpaceRecord {
        local_id: Some("SP0001".into()),
        space_name: Some("故宫".into()),
        space_type: Some("museum".into()),
        latitude: Some("39.9163".into()),
        longitude: Some("116.3972".into()),
        ..Default::default()
    };
    let report = run(&ReconConfig::default(), &catalog, vec![row], &OfflineLookup, &stamp()).unwrap();
    assert_eq!(
        report.reports[0].outcome,
        RowOutcome::SyncedFromCatalog { fields: vec![Field::ExternalId, Field::SpaceType] }
    );
    assert_eq!(report.rows[0].space_type.as_deref(), Some("palace"));
}

// -------------------------------------------------------------------------
// Properties
// -------------------------------------------------------------------------

#[test]
fn reconciling_the_catalog_against_itself_changes_nothing() {
    let catalog = person_catalog();
    let report =
        run(&ReconConfig::default(), &catalog, catalog.clone(), &OfflineLookup, &stamp()).unwrap();
    assert_eq!(report.rows, catalog);
    assert_eq!(report.summary.modified, 0);
}

#[test]
fn second_run_over_first_output_is_idempotent() {
    let catalog = person_catalog();
    let local: Vec<PersonRecord> = load("person_local.csv");
    let lookup = ScriptedLookup::default().with_name("Claude Monet", "en", vec![monet()]);

    let first = run(&ReconConfig::default(), &catalog, local, &lookup, &stamp()).unwrap();
    let second = run(
        &ReconConfig::default(),
        &first.rows,
        first.rows.clone(),
        &lookup,
        &Provenance::new("2026-10-19", "someone-else"),
    )
    .unwrap();
    assert_eq!(second.rows, first.rows);
    assert_eq!(second.summary.modified, 0);
}

#[test]
fn reconciler_exposes_diagnostics_per_row() {
    let catalog = person_catalog();
    let config = ReconConfig::default();
    let mut reconciler = Reconciler::new(&config, &catalog, &OfflineLookup, stamp());
    let mut row = person("", "", "Nemo", "Nobody", "en");
    let report = reconciler.reconcile_row(7, &mut row).unwrap();
    assert_eq!(report.row, 7);
    assert!(reconciler.index().contains("AG0006"));
    assert!(reconciler.diagnostics().iter().all(|d| d.row == 7));
    assert!(reconciler
        .diagnostics()
        .iter()
        .any(|d| d.message.contains(NO_MATCH_NOTE)));
}

proptest! {
    #[test]
    fn skip_rows_are_invariant(
        local_id in "(AG000[1-5])?",
        external_id in "(Q[0-9]{1,5})?",
        family in "[a-z]{0,6}",
        note in prop::sample::select(vec!["skip", "SKIP", "Skip"]),
    ) {
        let catalog = person_catalog();
        let mut row = person(&local_id, &external_id, &family, "x", "en");
        row.note = Some(note.to_string());
        let report = run(&ReconConfig::default(), &catalog, vec![row.clone()], &OfflineLookup, &stamp())
            .unwrap();
        prop_assert_eq!(&report.rows[0], &row);
    }

    #[test]
    fn output_ids_stay_unique(shape in prop::collection::vec((0u8..5, any::<bool>()), 1..12)) {
        let catalog = person_catalog();
        let mut used_catalog_rows = Vec::new();
        let rows: Vec<PersonRecord> = shape
            .iter()
            .enumerate()
            .map(|(i, &(kind, flag))| {
                let given = format!("Nobody{i}");
                match kind {
                    0 => {
                        let external_id = if flag { String::new() } else { format!("Q{}", 800 + i) };
                        PersonRecord {
                            note: Some("skip".into()),
                            ..person(&format!("AG{:04}", 6 + i), &external_id, "Nemo", &given, "en")
                        }
                    }
                    1 if !used_catalog_rows.contains(&(i % catalog.len())) => {
                        used_catalog_rows.push(i % catalog.len());
                        catalog[i % catalog.len()].clone()
                    }
                    2 if flag => person(&format!("ZZ{i:04}"), "", "Nemo", &given, "en"),
                    2 => person(&format!("AG{:04}", 6 + i), "", "Nemo", &given, "en"),
                    4 => person("", &format!("Q{}", 800 + i % 4), "Nemo", &given, "en"),
                    _ => person("", "", "Nemo", &given, "en"),
                }
            })
            .collect();

        match run(&ReconConfig::default(), &catalog, rows.clone(), &OfflineLookup, &stamp()) {
            Ok(report) => {
                prop_assert!(audit(&report.rows).is_empty(), "{:?}", audit(&report.rows));
                for (input, output) in rows.iter().zip(&report.rows) {
                    if input.is_skipped() {
                        prop_assert_eq!(input, output);
                    }
                }
            }
            Err(err) => prop_assert!(matches!(err, ReconError::ExternalIdConflict { .. }), "{err:?}"),
        }
    }

    #[test]
    fn allocations_strictly_increase(count in 1usize..30) {
        let catalog = person_catalog();
        let rows: Vec<PersonRecord> = (0..count)
            .map(|i| person("", "", &format!("Nemo{i}"), "Nobody", "en"))
            .collect();
        let report = run(&ReconConfig::default(), &catalog, rows, &OfflineLookup, &stamp()).unwrap();
        let ids: Vec<u32> = report
            .rows
            .iter()
            .map(|r| {
                let id = r.local_id.as_deref().unwrap();
                prop_assert!(id.starts_with("AG"));
                prop_assert_eq!(id.len(), 6);
                Ok(id[2..].parse().unwrap())
            })
            .collect::<Result<_, TestCaseError>>()?;
        for pair in ids.windows(2) {
            prop_assert!(pair[1] > pair[0]);
        }
        prop_assert_eq!(ids[0], 6);
        prop_assert!(audit(&report.rows).is_empty());
    }
}
