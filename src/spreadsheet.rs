//! Workbook input helpers built on `calamine`.

use crate::table::{Cell, Table};
use anyhow::{Context, Result, anyhow};
use calamine::{Data, DataType, Range, Reader, open_workbook_auto};
use chrono::{NaiveDate, NaiveDateTime};
use std::path::Path;

/// Opens `sheet` (or the first sheet when `None`) of the workbook at `path`.
pub fn open_sheet(path: &Path, sheet: Option<&str>) -> Result<Range<Data>> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("failed to open workbook {}", path.display()))?;

    let range = match sheet {
        Some(name) => workbook
            .worksheet_range(name)
            .with_context(|| format!("sheet '{}' missing in {}", name, path.display()))?,
        None => workbook
            .worksheet_range_at(0)
            .ok_or_else(|| anyhow!("workbook {} has no sheets", path.display()))?
            .with_context(|| format!("failed to read first sheet of {}", path.display()))?,
    };

    Ok(range)
}

pub fn to_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Float(f) => Cell::Number(*f),
        Data::String(s) => Cell::Text(s.clone()),
        Data::DateTime(_) | Data::DateTimeIso(_) => match data.as_datetime() {
            Some(dt) => Cell::Text(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
            None => Cell::Text(data.to_string()),
        },
        other => Cell::Text(other.to_string()),
    }
}

/// Reads a sheet whose first row holds column names into a [`Table`].
pub fn read_table(range: &Range<Data>) -> Table {
    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Table::default();
    };

    let mut table = Table::new(header.iter().map(|d| d.to_string().trim().to_string()));
    for row in rows {
        table.push_row(row.iter().map(to_cell).collect());
    }
    table
}

/// Interprets a cell as a timestamp: native spreadsheet date-times or the
/// common textual layouts exported by counters.
pub fn timestamp_of(data: &Data) -> Option<NaiveDateTime> {
    match data {
        Data::DateTime(_) | Data::DateTimeIso(_) => data.as_datetime(),
        Data::String(s) => parse_timestamp(s),
        _ => None,
    }
}

pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    const FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%m/%d/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M",
    ];
    let text = text.trim();
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_layouts() {
        let expected = NaiveDate::from_ymd_opt(2025, 4, 2)
            .unwrap()
            .and_hms_opt(7, 15, 0)
            .unwrap();
        assert_eq!(parse_timestamp("2025-04-02 07:15:00"), Some(expected));
        assert_eq!(parse_timestamp("2025-04-02 07:15"), Some(expected));
        assert_eq!(parse_timestamp("04/02/2025 07:15"), Some(expected));
        assert_eq!(parse_timestamp("Street:"), None);
    }

    #[test]
    fn test_to_cell() {
        assert_eq!(to_cell(&Data::Int(3)), Cell::Number(3.0));
        assert_eq!(to_cell(&Data::String("Elm".into())), Cell::text("Elm"));
        assert_eq!(to_cell(&Data::Empty), Cell::Empty);
    }
}
