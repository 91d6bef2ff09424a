//! Validated settings for the scrape pipeline.

use crate::portal::downloads::TimeInterval;
use anyhow::{Context, Result, bail};
use reqwest::Url;
use std::path::PathBuf;

pub const USERNAME_ENV: &str = "PORTAL_USERNAME";
pub const PASSWORD_ENV: &str = "PORTAL_PASSWORD";
pub const BASE_URL_ENV: &str = "PORTAL_BASE_URL";

/// Scrape settings after validation of the raw command-line strings.
#[derive(Clone)]
pub struct ScrapeSettings {
    pub username: String,
    pub password: String,
    pub session_file: PathBuf,
    pub base_folder: PathBuf,
    pub start_year: i32,
    pub end_year: i32,
    pub time_interval: TimeInterval,
}

impl std::fmt::Debug for ScrapeSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScrapeSettings")
            .field("username", &self.username)
            .field("session_file", &self.session_file)
            .field("base_folder", &self.base_folder)
            .field("start_year", &self.start_year)
            .field("end_year", &self.end_year)
            .field("time_interval", &self.time_interval)
            .finish_non_exhaustive()
    }
}

/// A credential given as `-` is read from `env_key` instead.
pub fn resolve_credential(value: &str, env_key: &str) -> Result<String> {
    if value == "-" {
        std::env::var(env_key).with_context(|| format!("{env_key} must be set when '-' is given"))
    } else {
        Ok(value.to_string())
    }
}

/// Checks the year range: both all digits and `end >= start`.
pub fn parse_year_range(start_year: &str, end_year: &str) -> Result<(i32, i32)> {
    let is_digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
    if !is_digits(start_year) || !is_digits(end_year) {
        bail!("Start Year and End Year must both be digits");
    }

    let start: i32 = start_year.parse()?;
    let end: i32 = end_year.parse()?;
    if end < start {
        bail!("Start year must be before end year");
    }
    Ok((start, end))
}

pub fn check_session_path(path: &str) -> Result<PathBuf> {
    if !path.contains(".json") {
        bail!("auth_session_file_path must be in the following format '[path].json'");
    }
    Ok(PathBuf::from(path))
}

/// Portal base link, from `override_url`, then the environment, then the
/// default. A trailing slash is enforced so relative joins keep the path.
pub fn base_url(override_url: Option<&str>) -> Result<Url> {
    let raw = match override_url {
        Some(url) => url.to_string(),
        None => std::env::var(BASE_URL_ENV)
            .unwrap_or_else(|_| crate::portal::DEFAULT_BASE_URL.to_string()),
    };
    let raw = if raw.ends_with('/') { raw } else { format!("{raw}/") };
    raw.parse()
        .with_context(|| format!("invalid portal base url {raw:?}"))
}

impl ScrapeSettings {
    #[allow(clippy::too_many_arguments)]
    pub fn from_args(
        username: &str,
        password: &str,
        session_file: &str,
        base_folder: &str,
        start_year: &str,
        end_year: &str,
        time_interval: &str,
    ) -> Result<Self> {
        let (start_year, end_year) = parse_year_range(start_year, end_year)?;
        Ok(Self {
            username: resolve_credential(username, USERNAME_ENV)?,
            password: resolve_credential(password, PASSWORD_ENV)?,
            session_file: check_session_path(session_file)?,
            base_folder: PathBuf::from(base_folder),
            start_year,
            end_year,
            time_interval: time_interval.parse()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_year_range() {
        assert_eq!(parse_year_range("2023", "2024").unwrap(), (2023, 2024));
        assert_eq!(parse_year_range("2024", "2024").unwrap(), (2024, 2024));
        assert!(parse_year_range("2024", "2023").is_err());
        assert!(parse_year_range("20x4", "2024").is_err());
        assert!(parse_year_range("-2024", "2024").is_err());
        assert!(parse_year_range("", "2024").is_err());
    }

    #[test]
    fn test_session_path_needs_json() {
        assert!(check_session_path("auth/session.json").is_ok());
        assert!(check_session_path("auth/session.txt").is_err());
    }

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let url = base_url(Some("https://portal.test/app")).unwrap();
        assert_eq!(url.as_str(), "https://portal.test/app/");
        assert_eq!(url.join("studies/1").unwrap().as_str(), "https://portal.test/app/studies/1");
    }

    #[test]
    fn test_from_args() {
        let settings = ScrapeSettings::from_args(
            "user", "pw", "s.json", "reports", "2023", "2024", "5 minutes",
        )
        .unwrap();
        assert_eq!(settings.time_interval, TimeInterval::FiveMinutes);
        assert_eq!(settings.start_year, 2023);
        assert!(!format!("{settings:?}").contains("pw"));

        assert!(ScrapeSettings::from_args("u", "p", "s.json", "r", "2023", "2024", "2 minutes").is_err());
    }
}
