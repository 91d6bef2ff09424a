//! Client for the traffic-study portal.
//!
//! The scrape runs strictly forward: [`auth::AuthProvider`] logs in and
//! writes a session file, [`catalog::StudyCatalog`] lists the published
//! studies month by month, and [`downloads::ValidatingDownloader`] fetches one
//! report workbook per study that is not already on disk.

pub mod auth;
pub mod catalog;
pub mod downloads;
pub mod session;
pub mod validation;

use crate::fetch::{BasicClient, SessionCookie};
use anyhow::{Result, anyhow};
use session::{SESSION_COOKIE, StorageState};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://datalink.miovision.com/";

/// Builds a client replaying every cookie of the saved session.
pub fn session_client(session_file: &Path, timeout: Duration) -> Result<SessionCookie<BasicClient>> {
    with_session_cookies(BasicClient::with_timeout(timeout)?, session_file)
}

/// Builds a client carrying only the login session cookie, as the report
/// endpoint expects.
pub fn report_client(session_file: &Path) -> Result<SessionCookie<BasicClient>> {
    with_report_cookie(BasicClient::new(), session_file)
}

fn with_session_cookies<C>(inner: C, session_file: &Path) -> Result<SessionCookie<C>> {
    let state = StorageState::load(session_file)?;
    SessionCookie::new(inner, state.pairs())
}

fn with_report_cookie<C>(inner: C, session_file: &Path) -> Result<SessionCookie<C>> {
    let state = StorageState::load(session_file)?;
    let value = state.session_cookie().ok_or_else(|| {
        anyhow!("session file {} holds no cookies", session_file.display())
    })?;
    SessionCookie::new(inner, [(SESSION_COOKIE, value)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::fetch_bytes;
    use crate::fetch::mock::MockClient;
    use super::session::parse_cookie_header;

    fn saved_session(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("session.json");
        StorageState {
            cookies: parse_cookie_header(
                "return_to=home; central_production_session_id=s3cr3t; locale=en",
                "portal.test",
            ),
            origins: Vec::new(),
        }
        .save(&path)
        .unwrap();
        path
    }

    #[tokio::test]
    async fn test_report_client_sends_only_session_cookie() {
        let dir = tempfile::tempdir().unwrap();
        let client =
            with_report_cookie(MockClient::with_body(200, "xlsx"), &saved_session(dir.path()))
                .unwrap();

        fetch_bytes(&client, "https://portal.test/studies/1/report").await.unwrap();

        assert_eq!(
            client.inner.cookie_headers(),
            ["central_production_session_id=s3cr3t"]
        );
    }

    #[tokio::test]
    async fn test_session_client_replays_every_cookie() {
        let dir = tempfile::tempdir().unwrap();
        let client =
            with_session_cookies(MockClient::with_body(200, ""), &saved_session(dir.path()))
                .unwrap();

        fetch_bytes(&client, "https://portal.test/studies").await.unwrap();

        assert_eq!(
            client.inner.cookie_headers(),
            ["return_to=home; central_production_session_id=s3cr3t; locale=en"]
        );
    }

    #[test]
    fn test_report_client_needs_a_cookie() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.json");
        StorageState::default().save(&path).unwrap();
        assert!(with_report_cookie(MockClient::with_body(200, ""), &path).is_err());
    }
}
