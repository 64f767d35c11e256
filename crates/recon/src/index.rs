//! Catalog ID index: local ID membership, external ID bindings, and the
//! allocation cursor.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use thiserror::Error;

use crate::model::CatalogRecord;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocationError {
    #[error("the catalog has no local IDs to continue from")]
    NoCursor,

    #[error("local ID '{0}' has no numeric suffix")]
    NoNumericSuffix(String),

    #[error("local ID '{0}' is the last one its width allows")]
    Exhausted(String),
}

/// Next ID after `current`: numeric suffix + 1, same prefix, same width.
///
/// `AG0009` → `AG0010`. A suffix that would need an extra digit is an error
/// rather than a silently wider ID.
pub fn next_local_id(current: &str) -> Result<String, AllocationError> {
    let split = current
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)
        .ok_or_else(|| AllocationError::NoNumericSuffix(current.to_string()))?;

    let (prefix, digits) = current.split_at(split);
    let width = digits.len();
    let value: u64 = digits
        .parse()
        .map_err(|_| AllocationError::NoNumericSuffix(current.to_string()))?;
    let next = value
        .checked_add(1)
        .ok_or_else(|| AllocationError::Exhausted(current.to_string()))?;
    let formatted = format!("{next:0width$}");
    if formatted.len() > width {
        return Err(AllocationError::Exhausted(current.to_string()));
    }
    Ok(format!("{prefix}{formatted}"))
}

/// ID sets of the authoritative catalog, advanced as rows are reconciled.
///
/// Membership and the allocation cursor are kept apart: IDs a row merely
/// carries (skipped rows, uncatalogued IDs) are reserved but never move the
/// cursor, so one stray `ZZ0001` cannot reroute allocation.
#[derive(Debug, Clone, Default)]
pub struct CatalogIndex {
    local_ids: BTreeSet<String>,
    /// Largest catalog ID, then the last allocated one.
    cursor: Option<String>,
    /// external ID → local ID
    bindings: BTreeMap<String, String>,
}

impl CatalogIndex {
    pub fn build<R: CatalogRecord>(catalog: &[R]) -> Self {
        let local_ids: BTreeSet<String> =
            catalog.iter().filter_map(|r| r.local_id()).map(str::to_string).collect();
        let cursor = local_ids.last().cloned();

        let mut bindings = BTreeMap::new();
        for row in catalog {
            if let (Some(external), Some(local)) = (row.external_id(), row.local_id()) {
                // First binding wins; `audit` reports the rest.
                bindings.entry(external.to_string()).or_insert_with(|| local.to_string());
            }
        }

        Self { local_ids, cursor, bindings }
    }

    pub fn contains(&self, local_id: &str) -> bool {
        self.local_ids.contains(local_id)
    }

    pub fn len(&self) -> usize {
        self.local_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.local_ids.is_empty()
    }

    /// Local ID an external ID is bound to.
    pub fn bound_to(&self, external_id: &str) -> Option<&str> {
        self.bindings.get(external_id).map(String::as_str)
    }

    pub fn bind(&mut self, external_id: &str, local_id: &str) {
        self.bindings.insert(external_id.to_string(), local_id.to_string());
    }

    /// Reserve a local ID a row already carries. The cursor does not move.
    pub fn register(&mut self, local_id: &str) {
        self.local_ids.insert(local_id.to_string());
    }

    /// Largest catalog ID, or the last ID handed out by [`allocate`](Self::allocate).
    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    /// Allocate the first free ID after the cursor and reserve it.
    pub fn allocate(&mut self) -> Result<String, AllocationError> {
        let mut next = next_local_id(self.cursor().ok_or(AllocationError::NoCursor)?)?;
        while self.local_ids.contains(&next) {
            next = next_local_id(&next)?;
        }
        self.local_ids.insert(next.clone());
        self.cursor = Some(next.clone());
        Ok(next)
    }
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "violation", rename_all = "snake_case")]
pub enum Violation {
    /// Same local ID twice for the same language.
    DuplicateLocalId {
        row: usize,
        first_row: usize,
        local_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        language: Option<String>,
    },
    /// One external ID bound to two local IDs.
    ExternalIdRebound {
        row: usize,
        first_row: usize,
        external_id: String,
        local_id: String,
        bound_to: String,
    },
    /// Rows of one local ID disagree on the external ID.
    SplitExternalId {
        row: usize,
        first_row: usize,
        local_id: String,
        external_id: String,
        expected: String,
    },
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateLocalId { row, first_row, local_id, language } => match language {
                Some(lang) => write!(
                    f,
                    "row {row}: local ID '{local_id}' ({lang}) already used by row {first_row}"
                ),
                None => write!(f, "row {row}: local ID '{local_id}' already used by row {first_row}"),
            },
            Self::ExternalIdRebound { row, first_row, external_id, local_id, bound_to } => write!(
                f,
                "row {row}: external ID '{external_id}' on '{local_id}' is already bound to \
                 '{bound_to}' (row {first_row})"
            ),
            Self::SplitExternalId { row, first_row, local_id, external_id, expected } => write!(
                f,
                "row {row}: local ID '{local_id}' has external ID '{external_id}' but row \
                 {first_row} has '{expected}'"
            ),
        }
    }
}

/// Check the uniqueness invariants of a table without any network access.
pub fn audit<R: CatalogRecord>(rows: &[R]) -> Vec<Violation> {
    let mut violations = Vec::new();
    let mut seen_local: BTreeMap<(String, Option<String>), usize> = BTreeMap::new();
    let mut seen_external: BTreeMap<String, (String, usize)> = BTreeMap::new();
    let mut external_of_local: BTreeMap<String, (String, usize)> = BTreeMap::new();

    for (row, record) in rows.iter().enumerate() {
        let Some(local_id) = record.local_id() else { continue };
        let language = record.language().map(str::to_string);

        let key = (local_id.to_string(), language.clone());
        if let Some(&first_row) = seen_local.get(&key) {
            violations.push(Violation::DuplicateLocalId {
                row,
                first_row,
                local_id: local_id.to_string(),
                language,
            });
        } else {
            seen_local.insert(key, row);
        }

        let Some(external_id) = record.external_id() else { continue };

        match seen_external.get(external_id) {
            Some((bound_to, first_row)) if bound_to != local_id => {
                violations.push(Violation::ExternalIdRebound {
                    row,
                    first_row: *first_row,
                    external_id: external_id.to_string(),
                    local_id: local_id.to_string(),
                    bound_to: bound_to.clone(),
                });
            }
            Some(_) => {}
            None => {
                seen_external.insert(external_id.to_string(), (local_id.to_string(), row));
            }
        }

        match external_of_local.get(local_id) {
            Some((expected, first_row)) if expected != external_id => {
                violations.push(Violation::SplitExternalId {
                    row,
                    first_row: *first_row,
                    local_id: local_id.to_string(),
                    external_id: external_id.to_string(),
                    expected: expected.clone(),
                });
            }
            Some(_) => {}
            None => {
                external_of_local.insert(local_id.to_string(), (external_id.to_string(), row));
            }
        }
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PersonRecord;
    use proptest::prelude::*;

    fn person(id: &str, qid: &str, lang: &str) -> PersonRecord {
        PersonRecord {
            local_id: Some(id.into()).filter(|s: &String| !s.is_empty()),
            external_id: Some(qid.into()).filter(|s: &String| !s.is_empty()),
            language: Some(lang.into()),
            ..Default::default()
        }
    }

    #[test]
    fn next_id_keeps_prefix_and_width() {
        assert_eq!(next_local_id("AG0001").unwrap(), "AG0002");
        assert_eq!(next_local_id("AG0009").unwrap(), "AG0010");
        assert_eq!(next_local_id("AG0999").unwrap(), "AG1000");
        assert_eq!(next_local_id("0041").unwrap(), "0042");
        assert_eq!(next_local_id("SP-07").unwrap(), "SP-08");
    }

    #[test]
    fn next_id_errors() {
        assert_eq!(
            next_local_id("AG9999"),
            Err(AllocationError::Exhausted("AG9999".into()))
        );
        assert_eq!(
            next_local_id("AGXX"),
            Err(AllocationError::NoNumericSuffix("AGXX".into()))
        );
    }

    #[test]
    fn build_sorts_and_binds() {
        let catalog = vec![
            person("AG0003", "Q3", "zh"),
            person("AG0001", "Q1", "zh"),
            person("AG0001", "Q1", "en"),
            person("AG0002", "", "zh"),
        ];
        let index = CatalogIndex::build(&catalog);
        assert_eq!(index.len(), 3);
        assert_eq!(index.cursor(), Some("AG0003"));
        assert!(index.contains("AG0002"));
        assert!(!index.contains("AG0004"));
        assert_eq!(index.bound_to("Q1"), Some("AG0001"));
        assert_eq!(index.bound_to("Q2"), None);
    }

    #[test]
    fn allocation_advances_cursor() {
        let mut index = CatalogIndex::build(&[person("AG0009", "", "en")]);
        assert_eq!(index.allocate().unwrap(), "AG0010");
        assert_eq!(index.allocate().unwrap(), "AG0011");
        assert_eq!(index.cursor(), Some("AG0011"));
        assert!(index.contains("AG0010"));
    }

    #[test]
    fn registered_ids_are_reserved_but_do_not_move_the_cursor() {
        let mut index = CatalogIndex::build(&[person("AG0005", "", "en")]);
        index.register("ZZ0001");
        index.register("AG9999");
        assert_eq!(index.cursor(), Some("AG0005"));
        assert!(index.contains("ZZ0001"));
        assert_eq!(index.allocate().unwrap(), "AG0006");
    }

    #[test]
    fn allocation_steps_over_reserved_ids() {
        let mut index = CatalogIndex::build(&[person("AG0005", "", "en")]);
        index.register("AG0006");
        index.register("AG0007");
        assert_eq!(index.allocate().unwrap(), "AG0008");
        assert_eq!(index.allocate().unwrap(), "AG0009");
        assert_eq!(index.cursor(), Some("AG0009"));
    }

    #[test]
    fn empty_catalog_has_no_cursor() {
        let mut index = CatalogIndex::build::<PersonRecord>(&[]);
        assert!(index.is_empty());
        assert_eq!(index.allocate(), Err(AllocationError::NoCursor));
    }

    #[test]
    fn audit_reports_duplicates_and_rebinding() {
        let rows = vec![
            person("AG0001", "Q1", "zh"),
            person("AG0001", "Q1", "en"),
            person("AG0001", "Q1", "en"),
            person("AG0002", "Q1", "zh"),
            person("AG0003", "Q3", "zh"),
            person("AG0003", "Q4", "en"),
        ];
        let violations = audit(&rows);
        assert_eq!(violations.len(), 3, "{violations:?}");
        assert!(matches!(
            &violations[0],
            Violation::DuplicateLocalId { row: 2, first_row: 1, .. }
        ));
        assert!(matches!(
            &violations[1],
            Violation::ExternalIdRebound { row: 3, first_row: 0, bound_to, .. } if bound_to == "AG0001"
        ));
        assert!(matches!(
            &violations[2],
            Violation::SplitExternalId { row: 5, first_row: 4, .. }
        ));
        assert!(violations[1].to_string().contains("Q1"));
    }

    #[test]
    fn audit_accepts_clean_multilanguage_table() {
        let rows = vec![
            person("AG0001", "Q1", "zh"),
            person("AG0001", "Q1", "en"),
            person("AG0002", "", "zh"),
            person("", "", "zh"),
        ];
        assert!(audit(&rows).is_empty());
    }

    proptest! {
        #[test]
        fn allocation_is_strictly_increasing(start in 0u32..9_000, count in 1usize..50) {
            let mut index = CatalogIndex::build(&[person(&format!("AG{start:04}"), "", "en")]);
            let mut previous = start;
            for _ in 0..count {
                let id = index.allocate().unwrap();
                prop_assert!(id.starts_with("AG"));
                prop_assert_eq!(id.len(), 6);
                let value: u32 = id[2..].parse().unwrap();
                prop_assert_eq!(value, previous + 1);
                previous = value;
            }
        }
    }
}
