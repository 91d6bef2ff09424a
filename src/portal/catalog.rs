//! Enumeration of published studies, one month at a time.

use crate::fetch::{HttpClient, fetch_text};
use anyhow::{Context, Result, anyhow, bail};
use chrono::{Datelike, NaiveDate};
use reqwest::Url;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::{Instrument, error, info, warn};

/// Page-load timeout for study listing pages.
pub const CATALOG_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(90);

const STUDY_ENTRY_SELECTOR: &str = r#"tr[class="marker_hover"] div.miogrey"#;
const STUDY_TOTAL_SELECTOR: &str = "div.text-center";

/// A study as listed by the portal, e.g. `ATR#1226458`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StudyRef {
    pub study_type: String,
    pub id: String,
}

impl StudyRef {
    pub fn new(study_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            study_type: study_type.into(),
            id: id.into(),
        }
    }
}

/// `[first of month, first of next month)` for every month of every year in
/// `start_year..=end_year`.
pub fn month_windows(start_year: i32, end_year: i32) -> Vec<(NaiveDate, NaiveDate)> {
    (start_year..=end_year)
        .flat_map(|year| (1..=12).map(move |month| (year, month)))
        .filter_map(|(year, month)| {
            let start = NaiveDate::from_ymd_opt(year, month, 1)?;
            let end = if month == 12 {
                NaiveDate::from_ymd_opt(year + 1, 1, 1)?
            } else {
                NaiveDate::from_ymd_opt(year, month + 1, 1)?
            };
            Some((start, end))
        })
        .collect()
}

pub fn studies_page_url(base: &Url, start: NaiveDate, end: NaiveDate) -> Result<Url> {
    let path = format!(
        "studies/?end_date={}&start_date={}&state=Published",
        end.format("%Y-%m-%d"),
        start.format("%Y-%m-%d")
    );
    Ok(base.join(&path)?)
}

pub fn study_url(base: &Url, study_id: &str) -> Result<Url> {
    Ok(base.join(&format!("studies/{study_id}"))?)
}

/// Parses listing text such as `"24 h 30 m ATR#1226458 "`.
///
/// The type and id follow the last `m` or `h` of the duration prefix.
pub fn parse_study_entry(text: &str) -> Option<StudyRef> {
    let tail = text.rsplit(['m', 'h']).next()?;
    let study_type = tail.split('#').next()?.trim();
    let id = tail.rsplit('#').next()?.trim();
    if id.is_empty() {
        return None;
    }
    Some(StudyRef::new(study_type, id))
}

/// Parses the page's `"<N> Studies"` banner.
pub fn parse_study_total(text: &str) -> Result<usize> {
    let count = text
        .split("Studies")
        .next()
        .unwrap_or_default()
        .trim();
    count
        .parse()
        .with_context(|| format!("study total {text:?} is not in the form '<Count> Studies'"))
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("invalid selector {css:?}: {e}"))
}

/// Extracts every listed study and checks the number against the banner.
pub fn extract_studies(html: &str) -> Result<Vec<StudyRef>> {
    let document = Html::parse_document(html);

    let banner = document
        .select(&selector(STUDY_TOTAL_SELECTOR)?)
        .next()
        .map(|el| el.text().collect::<String>())
        .ok_or_else(|| anyhow!("study total banner not found"))?;
    let expected = parse_study_total(&banner)?;

    let entries: Vec<String> = document
        .select(&selector(STUDY_ENTRY_SELECTOR)?)
        .map(|el| el.text().collect::<String>())
        .collect();

    // Every listed cell counts toward the banner, even one without an id.
    if entries.len() != expected {
        bail!(
            "Mismatch between extracted studies ({}) and expected number of studies ({})",
            entries.len(),
            expected
        );
    }

    let mut studies = Vec::with_capacity(entries.len());
    for entry in &entries {
        match parse_study_entry(entry) {
            Some(study) => studies.push(study),
            None => warn!(entry = %entry.trim(), "Listed study has no id, skipping"),
        }
    }
    Ok(studies)
}

/// Lists studies through an authenticated client.
pub struct StudyCatalog<C> {
    client: C,
    base_url: Url,
}

impl<C: HttpClient> StudyCatalog<C> {
    pub fn new(client: C, base_url: Url) -> Self {
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Studies published in `[start, end)`.
    pub async fn studies_between(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<StudyRef>> {
        let url = studies_page_url(&self.base_url, start, end)?;
        info!(url = %url, "Navigating to study listing");

        let (_, html) = fetch_text(&self.client, url.as_str()).await?;
        let studies = extract_studies(&html)?;

        info!(count = studies.len(), "Returning studies");
        Ok(studies)
    }

    /// Studies for every month of `start_year..=end_year`. A month that fails
    /// is logged and left out.
    pub async fn studies_in_years(&self, start_year: i32, end_year: i32) -> Vec<StudyRef> {
        let mut studies = Vec::new();
        let mut failed_months = 0usize;

        for (start, end) in month_windows(start_year, end_year) {
            let span = tracing::info_span!(
                "study_month",
                year = start.year(),
                month = start.month(),
            );
            match self.studies_between(start, end).instrument(span).await {
                Ok(monthly) => studies.extend(monthly),
                Err(e) => {
                    failed_months += 1;
                    error!(start_date = %start, end_date = %end, error = ?e, "Study listing failed");
                }
            }
        }

        info!(total = studies.len(), failed_months, "Study enumeration finished");
        studies
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::mock::MockClient;

    fn listing(total: &str, entries: &[&str]) -> String {
        let rows: String = entries
            .iter()
            .map(|e| format!(r#"<tr class="marker_hover"><td><div class="miogrey">{e}</div></td></tr>"#))
            .collect();
        format!(
            r#"<html><body><div class="text-center">{total}</div>
               <table><tr class="header"><td><div class="miogrey">24 h TMC#999</div></td></tr>{rows}</table>
               </body></html>"#
        )
    }

    #[test]
    fn test_month_windows_cover_year_boundary() {
        let windows = month_windows(2023, 2024);
        assert_eq!(windows.len(), 24);
        assert_eq!(windows[0].0, NaiveDate::from_ymd_opt(2023, 1, 1).unwrap());
        assert_eq!(windows[11].1, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(windows[23].1, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
        assert!(month_windows(2025, 2024).is_empty());
    }

    #[test]
    fn test_studies_page_url() {
        let base: Url = "https://portal.test/".parse().unwrap();
        let (start, end) = month_windows(2024, 2024)[2];
        let url = studies_page_url(&base, start, end).unwrap();
        assert_eq!(
            url.as_str(),
            "https://portal.test/studies/?end_date=2024-04-01&start_date=2024-03-01&state=Published"
        );
    }

    #[test]
    fn test_parse_study_entry() {
        assert_eq!(
            parse_study_entry("24 h 30 m ATR#1226458 "),
            Some(StudyRef::new("ATR", "1226458"))
        );
        assert_eq!(parse_study_entry(" TMC#42"), Some(StudyRef::new("TMC", "42")));
        assert_eq!(parse_study_entry("12 h "), None);
    }

    #[test]
    fn test_parse_study_total() {
        assert_eq!(parse_study_total("17 Studies").unwrap(), 17);
        assert_eq!(parse_study_total(" 3 Studies found").unwrap(), 3);
        assert!(parse_study_total("No results").is_err());
    }

    #[test]
    fn test_extract_studies_checks_total() {
        let html = listing("2 Studies", &["24 h ATR#1", "1 h 30 m TMC#2"]);
        let studies = extract_studies(&html).unwrap();
        assert_eq!(studies, [StudyRef::new("ATR", "1"), StudyRef::new("TMC", "2")]);

        let html = listing("3 Studies", &["24 h ATR#1", "1 h 30 m TMC#2"]);
        let err = extract_studies(&html).unwrap_err().to_string();
        assert!(err.contains("(2)") && err.contains("(3)"));
    }

    #[test]
    fn test_entry_without_id_counts_but_is_not_returned() {
        let html = listing("2 Studies", &["24 h ATR#1", "12 h "]);
        let studies = extract_studies(&html).unwrap();
        assert_eq!(studies, [StudyRef::new("ATR", "1")]);
    }

    #[tokio::test]
    async fn test_failed_months_are_skipped() {
        let good = listing("1 Studies", &["24 h ATR#7"]);
        let mut responses: Vec<(u16, &str)> = vec![(500, ""); 11];
        responses.insert(4, (200, good.as_str()));
        let client = MockClient::new(responses);

        let catalog = StudyCatalog::new(client, "https://portal.test/".parse().unwrap());
        let studies = catalog.studies_in_years(2024, 2024).await;

        assert_eq!(studies, [StudyRef::new("ATR", "7")]);
        assert_eq!(catalog.client.requests().len(), 12);
    }
}
