//! Reduction of raw count rows into per-date, per-direction totals.

use crate::aggregators::metadata::{Dialect, LaneMap, StudyMetadata, parse_metadata};
use crate::table::{Cell, Table};
use anyhow::{Context, Result, bail};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

pub const DATE_COLUMN: &str = "Date";
pub const DIRECTION_COLUMN: &str = "Direction";
pub const COUNT_COLUMN: &str = "Traffic Count";

/// Loads the data table of a count file.
///
/// `skip` lines are dropped from the top of `text`; the next line is the
/// header. Whitespace dialects split on runs of blanks, comma dialects go
/// through the CSV reader.
pub fn read_count_table(text: &str, dialect: Dialect, skip: usize) -> Result<Table> {
    let body: String = text
        .lines()
        .skip(skip)
        .filter(|l| !l.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    match dialect.delimiter() {
        Some(delimiter) => {
            let mut rdr = csv::ReaderBuilder::new()
                .delimiter(delimiter)
                .trim(csv::Trim::All)
                .flexible(true)
                .from_reader(body.as_bytes());

            let mut table = Table::new(rdr.headers()?.iter());
            for record in rdr.records() {
                let record = record?;
                table.push_row(record.iter().map(Cell::from).collect());
            }
            Ok(table)
        }
        None => {
            let mut lines = body.lines();
            let Some(header) = lines.next() else {
                bail!("no table header after skipping {skip} rows");
            };
            let mut table = Table::new(header.split_whitespace());
            for line in lines {
                table.push_row(line.split_whitespace().map(Cell::from).collect());
            }
            Ok(table)
        }
    }
}

/// Groups rows by date and mapped direction and counts them.
///
/// Every metadata field is broadcast as a constant column. Rows whose lane
/// has no direction are dropped.
pub fn reduce_counts(
    table: &Table,
    lane_column: &str,
    lanes: &LaneMap,
    metadata: &[(String, String)],
) -> Result<Table> {
    let date_idx = table.column_index(DATE_COLUMN)?;
    let lane_idx = table.column_index(lane_column)?;

    let mut groups: BTreeMap<(String, String), usize> = BTreeMap::new();
    let mut unmapped = 0usize;

    for row in table.rows() {
        let lane = row[lane_idx].to_string();
        let Some(direction) = lanes.get(&lane) else {
            unmapped += 1;
            continue;
        };
        let date = row[date_idx].to_string();
        *groups.entry((date, direction.clone())).or_default() += 1;
    }

    if unmapped > 0 {
        debug!(unmapped, "Rows without a mapped direction dropped");
    }

    let mut out = Table::new([DATE_COLUMN, DIRECTION_COLUMN, COUNT_COLUMN]);
    for ((date, direction), count) in groups {
        out.push_row(vec![date.into(), direction.into(), count.into()]);
    }
    for (key, value) in metadata {
        out.broadcast(key, Cell::text(value.as_str()));
    }

    Ok(out)
}

/// Parses one count file into its aggregate rows.
///
/// `skip_override` replaces the dialect's default number of skipped lines.
#[tracing::instrument(skip_all, fields(path = %path.display()))]
pub fn scrape_study(path: &Path, skip_override: Option<usize>) -> Result<Table> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let dialect = Dialect::detect(path);

    let StudyMetadata { fields, lanes } = parse_metadata(&text, dialect)
        .with_context(|| format!("bad metadata in {}", path.display()))?;

    let skip = skip_override.unwrap_or(dialect.skip_rows());
    let table = read_count_table(&text, dialect, skip)
        .with_context(|| format!("failed to read table in {}", path.display()))?;

    let reduced = reduce_counts(&table, dialect.lane_column(), &lanes, &fields)
        .with_context(|| format!("failed to reduce counts in {}", path.display()))?;

    debug!(
        dialect = ?dialect,
        raw_rows = table.len(),
        rows = reduced.len(),
        "Study reduced"
    );
    Ok(reduced)
}
