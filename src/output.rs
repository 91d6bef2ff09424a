//! Output formatting and persistence for aggregated tables.
//!
//! Supports a log preview of the first rows and export to CSV or XLSX,
//! chosen by the output file extension.

use anyhow::{Context, Result, bail};
use csv::WriterBuilder;
use rust_xlsxwriter::Workbook;
use std::path::Path;
use tracing::{debug, info};

use crate::table::{Cell, Table};

/// Logs the header and the first `n` rows of a table.
pub fn print_preview(table: &Table, n: usize) {
    info!("{}", table.columns().join(" | "));
    for row in table.rows().iter().take(n) {
        let line: Vec<String> = row.iter().map(Cell::to_string).collect();
        info!("{}", line.join(" | "));
    }
    debug!(rows = table.len(), "Preview printed");
}

/// Writes a table as CSV with a header row. An existing file is overwritten.
pub fn write_csv(path: &Path, table: &Table) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;

    writer.write_record(table.columns())?;
    for row in table.rows() {
        writer.write_record(row.iter().map(Cell::to_string))?;
    }
    writer.flush()?;

    Ok(())
}

/// Writes a table to the first worksheet of a new workbook.
pub fn write_xlsx(path: &Path, table: &Table) -> Result<()> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();

    for (col, name) in table.columns().iter().enumerate() {
        sheet.write_string(0, col as u16, name)?;
    }
    for (r, row) in table.rows().iter().enumerate() {
        let r = r as u32 + 1;
        for (col, cell) in row.iter().enumerate() {
            let col = col as u16;
            match cell {
                Cell::Empty => {}
                Cell::Text(s) => {
                    sheet.write_string(r, col, s)?;
                }
                Cell::Number(n) => {
                    sheet.write_number(r, col, *n)?;
                }
            }
        }
    }

    workbook
        .save(path)
        .with_context(|| format!("failed to save {}", path.display()))?;
    Ok(())
}

/// Exports a table to `path`, picking the format from its extension.
pub fn export_table(path: &Path, table: &Table) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match ext.as_deref() {
        Some("csv") => write_csv(path, table)?,
        Some("xlsx") => write_xlsx(path, table)?,
        _ => bail!(
            "unsupported output format for {} (use .csv or .xlsx)",
            path.display()
        ),
    }

    info!(path = %path.display(), rows = table.len(), "Table exported");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn sample() -> Table {
        let mut t = Table::new(["Date", "Direction", "Traffic Count", "Site"]);
        t.push_row(vec!["2025-03-01".into(), "NB".into(), 12usize.into(), "Main, North".into()]);
        t.push_row(vec!["2025-03-01".into(), "SB".into(), 9usize.into(), Cell::Empty]);
        t
    }

    #[test]
    fn test_print_preview_does_not_panic() {
        print_preview(&sample(), 5);
        print_preview(&Table::default(), 5);
    }

    #[test]
    fn test_export_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/counts.csv");

        export_table(&path, &sample()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "Date,Direction,Traffic Count,Site");
        assert_eq!(lines[1], "2025-03-01,NB,12,\"Main, North\"");
        assert_eq!(lines[2], "2025-03-01,SB,9,");
    }

    #[test]
    fn test_export_csv_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counts.csv");

        export_table(&path, &sample()).unwrap();
        export_table(&path, &sample()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 3);
    }

    #[test]
    fn test_export_xlsx_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counts.xlsx");

        export_table(&path, &sample()).unwrap();
        assert!(path.exists());
        assert!(fs::metadata(&path).unwrap().len() > 0);
    }

    #[test]
    fn test_unknown_extension_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(export_table(&dir.path().join("counts.parquet"), &sample()).is_err());
    }
}
