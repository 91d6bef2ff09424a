//! Geocode lookup for spreadsheet studies.
//!
//! Study names are free text typed by the counting crew, so they are matched
//! to the reference workbook by Jaccard similarity over whitespace tokens.

use crate::spreadsheet::{open_sheet, read_table, timestamp_of};
use crate::table::{Cell, Table};
use anyhow::{Context, Result, anyhow, bail};
use calamine::{Data, DataType};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::debug;

pub const LOCATION_NAME_COLUMN: &str = "LocationName";
pub const LATITUDE_COLUMN: &str = "NC_Latitude";
pub const LONGITUDE_COLUMN: &str = "NC_Longitude";

/// Label that marks the row carrying the study's street name.
pub const STREET_LABEL: &str = "Street:";
const LABEL_COL: usize = 1;
const VALUE_COL: usize = 4;
const TIMESTAMP_COL: usize = 0;

#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// |a ∩ b| / |a ∪ b|, taken as 0.0 when both sets are empty.
pub fn jaccard(a: &HashSet<&str>, b: &HashSet<&str>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

#[derive(Debug, Clone, Default)]
pub struct LocationTable {
    locations: Vec<Location>,
}

impl LocationTable {
    pub fn new(locations: Vec<Location>) -> Self {
        Self { locations }
    }

    /// Loads the reference workbook (first sheet, header row of names).
    pub fn load(path: &Path) -> Result<Self> {
        let table = read_table(&open_sheet(path, None)?);
        let name_idx = table.column_index(LOCATION_NAME_COLUMN)?;
        let lat_idx = table.column_index(LATITUDE_COLUMN)?;
        let long_idx = table.column_index(LONGITUDE_COLUMN)?;

        let mut locations = Vec::with_capacity(table.len());
        for (i, row) in table.rows().iter().enumerate() {
            if row[name_idx].is_empty() {
                continue;
            }
            let coord = |idx: usize, column: &str| {
                row[idx].as_f64().ok_or_else(|| {
                    anyhow!("row {} of {}: '{}' is not a number", i + 2, path.display(), column)
                })
            };
            locations.push(Location {
                name: row[name_idx].to_string(),
                latitude: coord(lat_idx, LATITUDE_COLUMN)?,
                longitude: coord(long_idx, LONGITUDE_COLUMN)?,
            });
        }

        debug!(count = locations.len(), path = %path.display(), "Locations loaded");
        Ok(Self { locations })
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Returns the location whose name best matches `study_name`.
    ///
    /// Candidate names are lower-cased before tokenising; the study name is
    /// used as given. Ties go to the earliest candidate.
    pub fn closest(&self, study_name: &str) -> Result<&Location> {
        if self.locations.is_empty() {
            bail!("no candidate locations to match '{study_name}' against");
        }

        let study_tokens: HashSet<&str> = study_name.split_whitespace().collect();

        let mut best: Option<(usize, f64)> = None;
        for (i, location) in self.locations.iter().enumerate() {
            let lowered = location.name.to_lowercase();
            let tokens: HashSet<&str> = lowered.split_whitespace().collect();
            let score = jaccard(&study_tokens, &tokens);
            if best.is_none_or(|(_, top)| score > top) {
                best = Some((i, score));
            }
        }

        let (idx, score) = best.ok_or_else(|| anyhow!("no location matched '{study_name}'"))?;
        debug!(study_name, matched = %self.locations[idx].name, score, "Location matched");
        Ok(&self.locations[idx])
    }
}

/// Extracts the study name, its coordinates and any per-day counts from one
/// spreadsheet study file.
///
/// Output columns are `Name, Latitude, Longitude`, plus `Date, Traffic Count`
/// (one row per date) when the sheet holds timestamped counts.
#[tracing::instrument(skip_all, fields(path = %path.display()))]
pub fn scrape_location_study(path: &Path, locations: &LocationTable) -> Result<Table> {
    let range = open_sheet(path, None)?;
    // Ranges start at the first used cell; layout columns are sheet columns.
    let first_col = range.start().map_or(0, |(_, col)| col as usize);

    let study_name = range
        .rows()
        .find(|row| {
            cell_at(row, LABEL_COL, first_col)
                .is_some_and(|d| d.to_string().trim() == STREET_LABEL)
        })
        .and_then(|row| cell_at(row, VALUE_COL, first_col))
        .map(|d| d.to_string().trim().to_string())
        .filter(|name| !name.is_empty())
        .with_context(|| format!("no '{}' label in {}", STREET_LABEL, path.display()))?;

    let location = locations.closest(&study_name)?;

    let mut daily: BTreeMap<String, f64> = BTreeMap::new();
    for row in range.rows() {
        let Some(ts) = cell_at(row, TIMESTAMP_COL, first_col).and_then(timestamp_of) else {
            continue;
        };
        let Some(count) = cell_at(row, VALUE_COL, first_col).and_then(count_of) else {
            continue;
        };
        *daily.entry(ts.date().format("%Y-%m-%d").to_string()).or_default() += count;
    }

    let mut out = if daily.is_empty() {
        let mut t = Table::new(["Name"]);
        t.push_row(vec![study_name.as_str().into()]);
        t
    } else {
        let mut t = Table::new(["Name", "Date", "Traffic Count"]);
        for (date, count) in daily {
            t.push_row(vec![study_name.as_str().into(), date.into(), count.into()]);
        }
        t
    };
    out.broadcast("Latitude", Cell::Number(location.latitude));
    out.broadcast("Longitude", Cell::Number(location.longitude));

    Ok(reorder_location_columns(out))
}

fn cell_at(row: &[Data], col: usize, first_col: usize) -> Option<&Data> {
    row.get(col.checked_sub(first_col)?)
}

fn count_of(data: &Data) -> Option<f64> {
    match data {
        Data::Int(_) | Data::Float(_) => data.as_f64(),
        _ => None,
    }
}

fn reorder_location_columns(table: Table) -> Table {
    let order: Vec<&str> = ["Name", "Latitude", "Longitude", "Date", "Traffic Count"]
        .into_iter()
        .filter(|c| table.columns().iter().any(|t| t == c))
        .collect();

    let mut out = Table::new(order.iter().copied());
    for i in 0..table.len() {
        out.push_row(
            order
                .iter()
                .map(|c| table.get(i, c).cloned().unwrap_or_default())
                .collect(),
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(names: &[&str]) -> LocationTable {
        LocationTable::new(
            names
                .iter()
                .enumerate()
                .map(|(i, n)| Location {
                    name: n.to_string(),
                    latitude: 35.0 + i as f64,
                    longitude: -78.0 - i as f64,
                })
                .collect(),
        )
    }

    fn set(s: &str) -> HashSet<&str> {
        s.split_whitespace().collect()
    }

    #[test]
    fn test_jaccard() {
        assert_eq!(jaccard(&set("a b"), &set("a b")), 1.0);
        assert_eq!(jaccard(&set("a b"), &set("c")), 0.0);
        assert_eq!(jaccard(&set("a b c"), &set("b c d")), 0.5);
        assert_eq!(jaccard(&set(""), &set("")), 0.0);
    }

    #[test]
    fn test_closest_prefers_overlap() {
        let t = table(&["Main Street North Plaza", "Elm Avenue"]);
        let hit = t.closest("main street north").unwrap();
        assert_eq!(hit.name, "Main Street North Plaza");
        assert_eq!(hit.latitude, 35.0);
    }

    #[test]
    fn test_closest_study_name_case_is_kept() {
        let t = table(&["main street north plaza", "elm avenue"]);
        let hit = t.closest("Main Street North").unwrap();
        assert_eq!(hit.name, "main street north plaza");

        let t = table(&["Oak Road", "ELM avenue"]);
        assert_eq!(t.closest("elm avenue").unwrap().name, "ELM avenue");
    }

    #[test]
    fn test_closest_ties_go_to_first() {
        let t = table(&["park road", "park lane"]);
        assert_eq!(t.closest("park").unwrap().name, "park road");
    }

    #[test]
    fn test_closest_on_empty_table_fails() {
        assert!(LocationTable::default().closest("anything").is_err());
    }

    #[test]
    fn test_reorder_location_columns() {
        let mut t = Table::new(["Name", "Date", "Traffic Count"]);
        t.push_row(vec!["Elm".into(), "2025-01-01".into(), 4usize.into()]);
        t.broadcast("Latitude", Cell::Number(1.0));
        t.broadcast("Longitude", Cell::Number(2.0));

        let out = reorder_location_columns(t);
        assert_eq!(out.columns(), ["Name", "Latitude", "Longitude", "Date", "Traffic Count"]);
        assert_eq!(out.get(0, "Longitude"), Some(&Cell::Number(2.0)));
    }
}
