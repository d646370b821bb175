//! Per-patient feature table read from CSV

use crate::error::{Result, VoxkanError};
use std::path::Path;
use tracing::debug;

const SESSION_ID: &str = "session_id";
const SEX: &str = "sex";
const PATHOLOGY: &str = "pathology";

/// One patient row with its raw feature cells
#[derive(Debug, Clone, PartialEq)]
pub struct PatientRecord {
    pub session_id: String,
    pub sex: i64,
    pub pathology: i64,
    /// Raw cells aligned with `FeatureTable::feature_names`
    pub cells: Vec<String>,
}

/// Patient rows with `session_id`, `sex` and `pathology` split off; every
/// other column is a feature column, in file order.
#[derive(Debug, Clone)]
pub struct FeatureTable {
    feature_names: Vec<String>,
    records: Vec<PatientRecord>,
}

impl FeatureTable {
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let reader = csv::Reader::from_path(path).map_err(|e| {
            VoxkanError::DataError(format!("cannot open {}: {}", path.display(), e))
        })?;
        let table = Self::from_reader(reader)?;
        debug!(
            path = %path.display(),
            rows = table.len(),
            columns = table.feature_names.len(),
            "feature table loaded"
        );
        Ok(table)
    }

    pub fn from_reader<R: std::io::Read>(mut reader: csv::Reader<R>) -> Result<Self> {
        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let position = |name: &str| {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| VoxkanError::DataError(format!("CSV missing '{}' column", name)))
        };
        let session_idx = position(SESSION_ID)?;
        let sex_idx = position(SEX)?;
        let pathology_idx = position(PATHOLOGY)?;
        let reserved = [session_idx, sex_idx, pathology_idx];

        let feature_names = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| !reserved.contains(i))
            .map(|(_, h)| h.clone())
            .collect();

        let mut records = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let record = record?;
            let field = |idx: usize| record.get(idx).unwrap_or("").trim();
            let parse_code = |idx: usize, column: &str| {
                field(idx).parse::<i64>().map_err(|_| {
                    VoxkanError::DataError(format!(
                        "row {}, column '{}': '{}' is not an integer",
                        row + 1,
                        column,
                        field(idx)
                    ))
                })
            };

            records.push(PatientRecord {
                session_id: field(session_idx).to_string(),
                sex: parse_code(sex_idx, SEX)?,
                pathology: parse_code(pathology_idx, PATHOLOGY)?,
                cells: record
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| !reserved.contains(i))
                    .map(|(_, v)| v.to_string())
                    .collect(),
            });
        }

        Ok(Self {
            feature_names,
            records,
        })
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn records(&self) -> &[PatientRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Parse one cell into feature values. List cells (`[1.0, 2.5]`) expand
/// to one value per element; `nan` literals parse as NaN.
pub fn parse_cell(cell: &str, row: usize, column: &str) -> Result<Vec<f64>> {
    let cell = cell.trim();
    let parse = |token: &str| {
        token.trim().parse::<f64>().map_err(|_| {
            VoxkanError::DataError(format!(
                "row {}, column '{}': '{}' is not a number",
                row, column, token
            ))
        })
    };

    match cell.strip_prefix('[') {
        Some(rest) => {
            let inner = rest.strip_suffix(']').ok_or_else(|| {
                VoxkanError::DataError(format!(
                    "row {}, column '{}': unterminated list",
                    row, column
                ))
            })?;
            if inner.trim().is_empty() {
                return Ok(Vec::new());
            }
            inner.split(',').map(parse).collect()
        }
        None => Ok(vec![parse(cell)?]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "\
session_id,sex,f0_mean,pathology,spectral_contrast
s1,0,120.5,1,\"[1.0, 2.0, 3.0]\"
s2,1,210.0,0,\"[0.5, NaN, 1.5]\"
";

    fn table() -> FeatureTable {
        FeatureTable::from_reader(csv::Reader::from_reader(CSV.as_bytes())).unwrap()
    }

    #[test]
    fn test_reserved_columns_split_off() {
        let t = table();
        assert_eq!(t.feature_names(), ["f0_mean", "spectral_contrast"]);
        assert_eq!(t.len(), 2);
        let first = &t.records()[0];
        assert_eq!(first.session_id, "s1");
        assert_eq!((first.sex, first.pathology), (0, 1));
        assert_eq!(first.cells[0], "120.5");
    }

    #[test]
    fn test_missing_label_column() {
        let csv = "session_id,sex,f0\ns1,0,1.0\n";
        let err = FeatureTable::from_reader(csv::Reader::from_reader(csv.as_bytes())).unwrap_err();
        assert!(err.to_string().contains("pathology"));
    }

    #[test]
    fn test_non_integer_sex() {
        let csv = "session_id,sex,pathology,f0\ns1,x,0,1.0\n";
        assert!(FeatureTable::from_reader(csv::Reader::from_reader(csv.as_bytes())).is_err());
    }

    #[test]
    fn test_parse_cells() {
        assert_eq!(parse_cell("1.5", 1, "a").unwrap(), vec![1.5]);
        assert_eq!(parse_cell("[1, 2.5]", 1, "a").unwrap(), vec![1.0, 2.5]);
        assert!(parse_cell("[]", 1, "a").unwrap().is_empty());
        assert!(parse_cell("nan", 1, "a").unwrap()[0].is_nan());
        assert!(parse_cell("[1.0, NaN]", 1, "a").unwrap()[1].is_nan());
        assert!(parse_cell("abc", 1, "a").is_err());
        assert!(parse_cell("[1.0, 2.0", 1, "a").is_err());
    }
}
