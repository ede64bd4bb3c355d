// SPDX-License-Identifier: Apache-2.0

use log::info;
use serde::Deserialize;
use std::{fmt, fs, io, path::Path};

/// Millimeter disagreement beyond which the position-distance table wins
/// over the error-corrected value.
const TABLE_PREFERENCE_MM: f64 = 2.0;

/// Errors raised while loading a correction table.
#[derive(Debug)]
pub enum TableError {
    /// I/O error reading the table resource.
    Io(io::Error),
    /// Malformed JSON in the table resource.
    Json(serde_json::Error),
    /// Table has no entries.
    Empty,
    /// Positions are not strictly increasing at the given index.
    NotIncreasing(usize),
}

impl std::error::Error for TableError {}

impl From<io::Error> for TableError {
    fn from(err: io::Error) -> TableError {
        TableError::Io(err)
    }
}

impl From<serde_json::Error> for TableError {
    fn from(err: serde_json::Error) -> TableError {
        TableError::Json(err)
    }
}

impl fmt::Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TableError::Io(err) => write!(f, "io error: {}", err),
            TableError::Json(err) => write!(f, "json error: {}", err),
            TableError::Empty => write!(f, "table has no entries"),
            TableError::NotIncreasing(index) => {
                write!(f, "positions not strictly increasing at entry {}", index)
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct TableFile {
    entries: Vec<(f64, f64)>,
}

/// Static calibration mapping from reference position to measured distance,
/// both in millimeters.
///
/// Positions are validated strictly increasing at load time; lookups rely on
/// that ordering for binary search. The data comes from a generated JSON
/// resource so tables can be regenerated without touching the lookup code.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionTable {
    positions: Vec<f64>,
    distances: Vec<f64>,
}

impl CorrectionTable {
    /// Builds a table from `(position, distance)` pairs.
    pub fn new(entries: Vec<(f64, f64)>) -> Result<CorrectionTable, TableError> {
        if entries.is_empty() {
            return Err(TableError::Empty);
        }

        for (index, pair) in entries.windows(2).enumerate() {
            if pair[0].0 >= pair[1].0 {
                return Err(TableError::NotIncreasing(index + 1));
            }
        }

        let (positions, distances) = entries.into_iter().unzip();
        Ok(CorrectionTable {
            positions,
            distances,
        })
    }

    /// Loads a table from a JSON resource file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<CorrectionTable, TableError> {
        let raw = fs::read_to_string(&path)?;
        let file: TableFile = serde_json::from_str(&raw)?;
        let table = CorrectionTable::new(file.entries)?;
        info!(
            "loaded correction table {} with {} entries",
            path.as_ref().display(),
            table.positions.len()
        );
        Ok(table)
    }

    /// Number of entries in the table.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Whether the table is empty. Never true for a constructed table.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Interpolated lookup with boundary clamping.
    ///
    /// Exact matches return the stored value, queries outside the table
    /// clamp to the boundary entries, and anything in between is linearly
    /// interpolated from the two bracketing entries. Pure and deterministic.
    pub fn lookup(&self, query: f64) -> f64 {
        let upper = self.positions.partition_point(|&p| p < query);

        if upper < self.positions.len() && self.positions[upper] == query {
            return self.distances[upper];
        }
        if upper == 0 {
            return self.distances[0];
        }
        if upper == self.positions.len() {
            return self.distances[self.positions.len() - 1];
        }

        let x0 = self.positions[upper - 1];
        let y0 = self.distances[upper - 1];
        let x1 = self.positions[upper];
        let y1 = self.distances[upper];

        y0 + (y1 - y0) * (query - x0) / (x1 - x0)
    }
}

/// Two-stage distance correction applied to the raw estimate.
///
/// With no tables the corrector is a passthrough. The error-correction table
/// is applied first; when a position-distance table also exists and its
/// estimate disagrees with the error-corrected value by more than 2 mm, the
/// position table's value is preferred.
#[derive(Debug, Clone, Default)]
pub struct DistanceCorrector {
    error_table: Option<CorrectionTable>,
    position_table: Option<CorrectionTable>,
}

impl DistanceCorrector {
    /// Builds a corrector from optional tables.
    pub fn new(
        error_table: Option<CorrectionTable>,
        position_table: Option<CorrectionTable>,
    ) -> DistanceCorrector {
        DistanceCorrector {
            error_table,
            position_table,
        }
    }

    /// Passthrough corrector with no tables.
    pub fn disabled() -> DistanceCorrector {
        DistanceCorrector::default()
    }

    /// Corrects a raw distance in millimeters.
    pub fn correct(&self, raw_mm: f64) -> f64 {
        let corrected = match &self.error_table {
            Some(table) => table.lookup(raw_mm),
            None => raw_mm,
        };

        match &self.position_table {
            Some(table) => {
                let estimate = table.lookup(corrected);
                if (estimate - corrected).abs() > TABLE_PREFERENCE_MM {
                    estimate
                } else {
                    corrected
                }
            }
            None => corrected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> CorrectionTable {
        CorrectionTable::new(vec![
            (10.50, 10.45),
            (20.75, 20.78),
            (30.25, 30.22),
            (40.00, 40.03),
            (50.15, 50.12),
        ])
        .unwrap()
    }

    #[test]
    fn exact_match_returns_stored_value() {
        assert_eq!(table().lookup(20.75), 20.78);
        assert_eq!(table().lookup(50.15), 50.12);
    }

    #[test]
    fn out_of_range_clamps_to_boundaries() {
        assert_eq!(table().lookup(1.0), 10.45);
        assert_eq!(table().lookup(99.0), 50.12);
    }

    #[test]
    fn interpolation_is_linear_and_exact_at_endpoints() {
        let t = CorrectionTable::new(vec![(10.0, 100.0), (20.0, 200.0)]).unwrap();

        assert_eq!(t.lookup(10.0), 100.0);
        assert_eq!(t.lookup(20.0), 200.0);
        assert!((t.lookup(15.0) - 150.0).abs() < 1e-9);
        assert!((t.lookup(12.5) - 125.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_non_increasing_positions() {
        let err = CorrectionTable::new(vec![(10.0, 1.0), (10.0, 2.0)]).unwrap_err();
        match err {
            TableError::NotIncreasing(index) => assert_eq!(index, 1),
            other => panic!("unexpected error: {}", other),
        }

        assert!(matches!(
            CorrectionTable::new(vec![]),
            Err(TableError::Empty)
        ));
    }

    #[test]
    fn passthrough_without_tables() {
        assert_eq!(DistanceCorrector::disabled().correct(123.4), 123.4);
    }

    #[test]
    fn error_table_applies_first() {
        let error = CorrectionTable::new(vec![(0.0, 1.0), (100.0, 101.0)]).unwrap();
        let corrector = DistanceCorrector::new(Some(error), None);

        // 50 -> interpolated 51 from the error table alone
        assert!((corrector.correct(50.0) - 51.0).abs() < 1e-9);
    }

    #[test]
    fn position_table_wins_beyond_two_millimeters() {
        let error = CorrectionTable::new(vec![(0.0, 0.0), (100.0, 100.0)]).unwrap();
        // Position table disagrees by 5 mm everywhere.
        let position = CorrectionTable::new(vec![(0.0, 5.0), (100.0, 105.0)]).unwrap();
        let corrector = DistanceCorrector::new(Some(error), Some(position));

        assert!((corrector.correct(50.0) - 55.0).abs() < 1e-9);
    }

    #[test]
    fn small_disagreement_keeps_error_corrected_value() {
        let error = CorrectionTable::new(vec![(0.0, 0.0), (100.0, 100.0)]).unwrap();
        // Position table disagrees by only 1 mm.
        let position = CorrectionTable::new(vec![(0.0, 1.0), (100.0, 101.0)]).unwrap();
        let corrector = DistanceCorrector::new(Some(error), Some(position));

        assert!((corrector.correct(50.0) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn loads_table_from_json_resource() {
        let path = std::env::temp_dir().join(format!(
            "rangepub_table_{}.json",
            std::process::id()
        ));
        fs::write(
            &path,
            r#"{"entries": [[10.5, 10.45], [20.75, 20.78], [30.25, 30.22]]}"#,
        )
        .unwrap();

        let table = CorrectionTable::from_json_file(&path).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(table.len(), 3);
        assert_eq!(table.lookup(20.75), 20.78);
    }

    #[test]
    fn correction_is_deterministic() {
        let corrector = DistanceCorrector::new(Some(table()), None);
        assert_eq!(corrector.correct(25.0), corrector.correct(25.0));
    }
}
