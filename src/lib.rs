pub mod aggregators;
pub mod bucket;
pub mod config;
pub mod fetch;
pub mod output;
pub mod portal;
pub mod spreadsheet;
pub mod table;
