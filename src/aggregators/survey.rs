//! Inventory of direction names and leg labels across downloaded reports.

use crate::spreadsheet::{open_sheet, read_table};
use crate::table::Table;
use anyhow::{Result, anyhow};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{error, warn};

pub const BREAKDOWN_SHEET: &str = "Total Volume Class Breakdown";
const LEG_COLUMN: &str = "Leg";
const TOTAL_MARKER: &str = "% Total";
const START_TIME: &str = "Start Time";
const COMPASS: [&str; 4] = ["North", "East", "South", "West"];

#[derive(Debug, Default)]
pub struct ReportSurvey {
    pub directions: BTreeSet<String>,
    pub legs: BTreeSet<String>,
    /// Reports whose breakdown header names none of the compass directions.
    pub anomalies: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
}

/// Direction names from the first data row, ignoring blanks and the
/// `Start Time` column.
pub fn direction_names(table: &Table) -> Vec<String> {
    table
        .rows()
        .first()
        .map(|row| {
            row.iter()
                .map(|c| c.to_string().trim().to_string())
                .filter(|s| !s.is_empty() && s != START_TIME)
                .collect()
        })
        .unwrap_or_default()
}

/// Leg labels: every other row of the `Leg` column after the `% Total` row.
pub fn leg_labels(table: &Table) -> Result<Vec<String>> {
    let leg_idx = table.column_index(LEG_COLUMN)?;
    let start = table
        .rows()
        .iter()
        .position(|row| row[leg_idx].to_string().trim() == TOTAL_MARKER)
        .ok_or_else(|| anyhow!("no '{TOTAL_MARKER}' row in the {LEG_COLUMN} column"))?;

    Ok(table.rows()[start + 1..]
        .iter()
        .step_by(2)
        .map(|row| row[leg_idx].to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

pub fn has_compass_header(table: &Table) -> bool {
    table.columns().iter().any(|c| COMPASS.contains(&c.as_str()))
}

impl ReportSurvey {
    /// Adds one report to the survey. Failures are recorded rather than
    /// returned so one broken workbook does not hide the rest.
    pub fn add(&mut self, path: &Path) {
        let table = match open_sheet(path, Some(BREAKDOWN_SHEET)) {
            Ok(range) => read_table(&range),
            Err(e) => {
                error!(path = %path.display(), error = ?e, "Report could not be read");
                self.failed.push(path.to_path_buf());
                return;
            }
        };

        if !has_compass_header(&table) {
            warn!(path = %path.display(), "Report breakdown has no compass columns");
            self.anomalies.push(path.to_path_buf());
        }

        self.directions.extend(direction_names(&table));

        match leg_labels(&table) {
            Ok(legs) => self.legs.extend(legs),
            Err(e) => {
                error!(path = %path.display(), error = ?e, "Leg labels could not be read");
                self.failed.push(path.to_path_buf());
            }
        }
    }

    pub fn from_files(files: &[PathBuf]) -> Self {
        let mut survey = Self::default();
        for path in files.iter().filter(|p| is_workbook(p)) {
            survey.add(path);
        }
        survey
    }
}

fn is_workbook(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("xlsx"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Cell;

    fn breakdown() -> Table {
        let mut t = Table::new(["Leg", "North", "South"]);
        let rows: [[&str; 3]; 7] = [
            ["Start Time", "Northbound", "Southbound"],
            ["Lights", "10", "12"],
            ["% Total", "90", "91"],
            ["Lights", "10", "12"],
            ["%", "50", "50"],
            ["Buses", "1", "1"],
            ["%", "5", "5"],
        ];
        for row in rows {
            t.push_row(row.iter().map(|s| Cell::text(*s)).collect());
        }
        t
    }

    #[test]
    fn test_direction_names_skip_start_time() {
        assert_eq!(direction_names(&breakdown()), ["Northbound", "Southbound"]);
    }

    #[test]
    fn test_leg_labels_take_every_other_row() {
        assert_eq!(leg_labels(&breakdown()).unwrap(), ["Lights", "Buses"]);
    }

    #[test]
    fn test_leg_labels_need_total_row() {
        let mut t = Table::new(["Leg"]);
        t.push_row(vec!["Lights".into()]);
        assert!(leg_labels(&t).is_err());
    }

    #[test]
    fn test_compass_header() {
        assert!(has_compass_header(&breakdown()));
        assert!(!has_compass_header(&Table::new(["Leg", "Approach 1"])));
    }

    #[test]
    fn test_unreadable_report_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ATR-1.xlsx");
        std::fs::write(&path, b"not a workbook").unwrap();

        let survey = ReportSurvey::from_files(&[path.clone(), dir.path().join("notes.txt")]);
        assert_eq!(survey.failed, [path]);
        assert!(survey.directions.is_empty());
    }
}
