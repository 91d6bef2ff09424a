//! In-memory tabular values shared by the aggregation pipelines.
//!
//! A [`Table`] is a list of named columns and rows of [`Cell`]s. Tables coming
//! from different input files are merged with [`Table::concat`], which keeps
//! the union of their columns and leaves gaps as [`Cell::Empty`].

use anyhow::{Result, bail};
use std::collections::HashMap;
use std::fmt;

/// A single value in a [`Table`].
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Cell {
    #[default]
    Empty,
    Text(String),
    Number(f64),
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    /// Returns the numeric value, parsing text cells when they hold a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            Cell::Text(s) => s.trim().parse().ok(),
            Cell::Empty => None,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Text(s) => f.write_str(s),
            Cell::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

impl From<usize> for Cell {
    fn from(value: usize) -> Self {
        Cell::Number(value as f64)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of the column called `name`.
    ///
    /// # Errors
    ///
    /// Fails with the list of available columns when `name` is absent.
    pub fn column_index(&self, name: &str) -> Result<usize> {
        match self.columns.iter().position(|c| c == name) {
            Some(idx) => Ok(idx),
            None => bail!(
                "column '{}' not found (available: {})",
                name,
                self.columns.join(", ")
            ),
        }
    }

    /// Appends a row, padding or truncating it to the table width.
    pub fn push_row(&mut self, mut row: Vec<Cell>) {
        row.resize(self.columns.len(), Cell::Empty);
        self.rows.push(row);
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&Cell> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// Adds `name` as a column holding `value` on every row. An existing
    /// column of the same name is overwritten.
    pub fn broadcast(&mut self, name: &str, value: Cell) {
        match self.columns.iter().position(|c| c == name) {
            Some(idx) => {
                for row in &mut self.rows {
                    row[idx] = value.clone();
                }
            }
            None => {
                self.columns.push(name.to_string());
                for row in &mut self.rows {
                    row.push(value.clone());
                }
            }
        }
    }

    /// Row-wise concatenation keeping the superset of columns in first-seen
    /// order. Cells for columns a table lacks are left empty.
    pub fn concat(tables: impl IntoIterator<Item = Table>) -> Table {
        let mut combined = Table::default();
        let mut positions: HashMap<String, usize> = HashMap::new();

        for table in tables {
            let mapping: Vec<usize> = table
                .columns
                .iter()
                .map(|name| {
                    *positions.entry(name.clone()).or_insert_with(|| {
                        combined.columns.push(name.clone());
                        combined.columns.len() - 1
                    })
                })
                .collect();

            let width = combined.columns.len();
            for row in &mut combined.rows {
                row.resize(width, Cell::Empty);
            }

            for row in table.rows {
                let mut out = vec![Cell::Empty; width];
                for (cell, &target) in row.into_iter().zip(&mapping) {
                    out[target] = cell;
                }
                combined.rows.push(out);
            }
        }

        combined
    }
}
