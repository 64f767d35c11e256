//! CSV tables of catalog rows.

use std::io::{Read, Write};
use std::path::Path;

use crate::error::ReconError;
use crate::model::CatalogRecord;

const BOM: &str = "\u{feff}";

/// Parse a table. The local ID column is required; other known columns may
/// be missing and unknown columns are ignored.
pub fn read_table<R: CatalogRecord>(input: &str) -> Result<Vec<R>, ReconError> {
    let input = input.strip_prefix(BOM).unwrap_or(input);
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(input.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| ReconError::Csv(format!("header: {e}")))?;
    if !headers.iter().any(|h| h.trim() == R::ID_COLUMN) {
        return Err(ReconError::Csv(format!(
            "missing required column '{}' for {} table",
            R::ID_COLUMN,
            R::KIND
        )));
    }

    let mut rows = Vec::new();
    for (row_idx, result) in reader.deserialize::<R>().enumerate() {
        // +2: 1-based, after the header line
        let row = result.map_err(|e| ReconError::Csv(format!("line {}: {e}", row_idx + 2)))?;
        rows.push(row);
    }
    Ok(rows)
}

pub fn read_table_from<R: CatalogRecord, S: Read>(mut source: S) -> Result<Vec<R>, ReconError> {
    let mut input = String::new();
    source
        .read_to_string(&mut input)
        .map_err(|e| ReconError::Csv(e.to_string()))?;
    read_table(&input)
}

pub fn read_table_path<R: CatalogRecord>(path: &Path) -> Result<Vec<R>, ReconError> {
    let input = std::fs::read_to_string(path)
        .map_err(|e| ReconError::Csv(format!("{}: {e}", path.display())))?;
    read_table(&input)
}

/// Write rows with the full header, even when there are none.
pub fn write_table<R: CatalogRecord, W: Write>(rows: &[R], sink: W) -> Result<(), ReconError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(sink);

    writer
        .write_record(R::COLUMNS)
        .map_err(|e| ReconError::Csv(format!("CSV write error: {e}")))?;
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| ReconError::Csv(format!("CSV write error: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| ReconError::Csv(format!("CSV write error: {e}")))
}

pub fn table_to_string<R: CatalogRecord>(rows: &[R]) -> Result<String, ReconError> {
    let mut buf = Vec::new();
    write_table(rows, &mut buf)?;
    String::from_utf8(buf).map_err(|e| ReconError::Csv(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{InstitutionRecord, PersonRecord, SpaceRecord};

    #[test]
    fn reads_empty_cells_as_absent() {
        let input = "\u{feff}person_id,wikidata_id,family_name,given_name,language,note\n\
                     AG0001,,鲁,迅,zh,\n";
        let rows: Vec<PersonRecord> = read_table(input).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].local_id.as_deref(), Some("AG0001"));
        assert_eq!(rows[0].external_id, None);
        assert_eq!(rows[0].birth_year, None);
    }

    #[test]
    fn unknown_columns_are_ignored() {
        let input = "inst_id,inst_name,remarks\nIN0001,北京大学,founded as 京师大学堂\n";
        let rows: Vec<InstitutionRecord> = read_table(input).unwrap();
        assert_eq!(rows[0].inst_name.as_deref(), Some("北京大学"));
    }

    #[test]
    fn id_column_is_required() {
        let err = read_table::<SpaceRecord>("space_name,latitude\nX,1\n").unwrap_err();
        assert!(err.to_string().contains("space_id"), "{err}");
    }

    #[test]
    fn header_matches_serialized_fields() {
        let row = PersonRecord {
            local_id: Some("AG0001".into()),
            sex: Some("男".into()),
            ..Default::default()
        };
        let text = table_to_string(&[row.clone()]).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some(PersonRecord::COLUMNS.join(",").as_str()));
        let back: Vec<PersonRecord> = read_table(&text).unwrap();
        assert_eq!(back, vec![row]);
    }

    #[test]
    fn empty_table_still_has_header() {
        let text = table_to_string::<SpaceRecord>(&[]).unwrap();
        assert_eq!(text, format!("{}\n", SpaceRecord::COLUMNS.join(",")));
    }

    #[test]
    fn reads_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spaces.csv");
        std::fs::write(&path, "space_id,space_name\nSP0001,故宫\n").unwrap();
        let rows: Vec<SpaceRecord> = read_table_path(&path).unwrap();
        assert_eq!(rows[0].space_name.as_deref(), Some("故宫"));
        assert!(read_table_path::<SpaceRecord>(&dir.path().join("missing.csv")).is_err());
    }
}
