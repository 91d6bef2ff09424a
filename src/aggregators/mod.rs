//! Aggregation of downloaded traffic-count files.
//!
//! Count text files are parsed into a metadata header and a raw event table,
//! reduced to per-date, per-direction totals, and concatenated across a
//! directory. Spreadsheet studies are joined to a geocode reference workbook
//! by fuzzy name matching.

pub mod counts;
pub mod locations;
pub mod metadata;
pub mod survey;
pub mod walker;
