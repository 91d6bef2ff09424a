//! CLI entry point for the traffic study tools.
//!
//! Provides subcommands for scraping study reports from the portal, listing
//! study URLs, aggregating downloaded count files, and surveying reports.

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};
use traffic_study_tools::aggregators::counts::scrape_study;
use traffic_study_tools::aggregators::locations::{LocationTable, scrape_location_study};
use traffic_study_tools::aggregators::survey::ReportSurvey;
use traffic_study_tools::aggregators::walker::{
    OnError, aggregate_directory, aggregate_files, collect_files, take_reference_file,
};
use traffic_study_tools::config::{self, PASSWORD_ENV, ScrapeSettings, USERNAME_ENV};
use traffic_study_tools::portal::auth::{AUTH_NAVIGATION_TIMEOUT, AuthConfig, AuthProvider};
use traffic_study_tools::portal::catalog::{CATALOG_NAVIGATION_TIMEOUT, StudyCatalog, study_url};
use traffic_study_tools::portal::downloads::{DownloadsProvider, ValidatingDownloader};
use traffic_study_tools::portal::validation::LocalStorageValidator;
use traffic_study_tools::portal::{report_client, session_client};
use traffic_study_tools::table::Table;
use traffic_study_tools::{bucket, output};

#[derive(Parser)]
#[command(name = "traffic_study_tools")]
#[command(about = "Scrape traffic-count studies and aggregate their reports", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download every published study report in a year range
    Scrape {
        /// Portal username ('-' reads PORTAL_USERNAME)
        username: String,
        /// Portal password ('-' reads PORTAL_PASSWORD)
        password: String,
        /// Where to store the login session ('[path].json')
        auth_session_file_path: String,
        /// Folder receiving one workbook per study
        base_folder: String,
        start_year: String,
        end_year: String,
        /// Report bin size: '1 minute', '5 minutes', '10 minutes', '30 minutes' or '1 hour'
        time_interval: String,

        /// Maximum number of concurrent report downloads
        #[arg(short, long, default_value_t = 4)]
        concurrency: usize,

        /// Portal base link (defaults to PORTAL_BASE_URL or the public portal)
        #[arg(long)]
        base_url: Option<String>,
    },
    /// List the portal URL of every published study in a year range
    ListUrls {
        username: String,
        password: String,
        auth_session_file_path: String,
        start_year: String,
        end_year: String,

        /// Optional: S3 bucket to upload the URL list to
        #[arg(long)]
        s3_bucket: Option<String>,

        /// Object key for the uploaded list
        #[arg(long, default_value = "miovision_urls.txt")]
        key: String,

        #[arg(long)]
        base_url: Option<String>,
    },
    /// Aggregate count text files into per-date, per-direction totals
    AggregateCounts {
        /// Directory containing the count files
        folder: PathBuf,

        /// Output file (.csv or .xlsx)
        #[arg(short, long, default_value = "Aggregate Counts.xlsx")]
        output: PathBuf,

        /// Skip the first file whose path contains this text
        #[arg(long)]
        exclude: Option<String>,

        /// Override the number of lines skipped before the table header
        #[arg(long)]
        skip_rows: Option<usize>,

        /// Log and skip files that fail instead of aborting
        #[arg(long, default_value_t = false)]
        keep_going: bool,

        /// Optional: S3 bucket to upload the output to
        #[arg(long)]
        s3_bucket: Option<String>,

        /// Optional: gzip the output before uploading
        #[arg(long, default_value_t = false)]
        gzip: bool,
    },
    /// Aggregate spreadsheet studies and attach geocodes from a reference workbook
    AggregateLocations {
        /// Directory containing the studies and the reference workbook
        folder: PathBuf,

        /// Text identifying the reference workbook's path
        #[arg(short, long, default_value = "Location Coordinates")]
        location_file: String,

        #[arg(short, long, default_value = "Aggregate Locations.xlsx")]
        output: PathBuf,

        #[arg(long, default_value_t = false)]
        keep_going: bool,

        #[arg(long)]
        s3_bucket: Option<String>,

        #[arg(long, default_value_t = false)]
        gzip: bool,
    },
    /// Summarise direction names and leg labels across downloaded reports
    SurveyReports {
        folder: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/traffic_study_tools.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("traffic_study_tools.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(env_filter("RUST_LOG", "info")?);

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(env_filter("RUST_LOG_JSON", "debug")?);

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Scrape {
            username,
            password,
            auth_session_file_path,
            base_folder,
            start_year,
            end_year,
            time_interval,
            concurrency,
            base_url,
        } => {
            let settings = ScrapeSettings::from_args(
                &username,
                &password,
                &auth_session_file_path,
                &base_folder,
                &start_year,
                &end_year,
                &time_interval,
            )?;
            let base_url = config::base_url(base_url.as_deref())?;
            scrape(settings, base_url, concurrency).await?;
        }
        Commands::ListUrls {
            username,
            password,
            auth_session_file_path,
            start_year,
            end_year,
            s3_bucket,
            key,
            base_url,
        } => {
            let (start_year, end_year) = config::parse_year_range(&start_year, &end_year)?;
            let auth = AuthConfig {
                base_url: config::base_url(base_url.as_deref())?,
                username: config::resolve_credential(&username, USERNAME_ENV)?,
                password: config::resolve_credential(&password, PASSWORD_ENV)?,
                session_file: config::check_session_path(&auth_session_file_path)?,
                navigation_timeout: AUTH_NAVIGATION_TIMEOUT,
            };
            list_urls(auth, start_year, end_year, s3_bucket, &key).await?;
        }
        Commands::AggregateCounts {
            folder,
            output,
            exclude,
            skip_rows,
            keep_going,
            s3_bucket,
            gzip,
        } => {
            let on_error = if keep_going { OnError::Skip } else { OnError::Abort };
            let table = aggregate_directory(&folder, exclude.as_deref(), on_error, |path| {
                scrape_study(path, skip_rows)
            })?;
            finish_table(&table, &output, s3_bucket, gzip).await?;
        }
        Commands::AggregateLocations {
            folder,
            location_file,
            output,
            keep_going,
            s3_bucket,
            gzip,
        } => {
            let on_error = if keep_going { OnError::Skip } else { OnError::Abort };
            let mut files = collect_files(&folder)?;
            let reference = take_reference_file(&mut files, &location_file)?;
            let locations = LocationTable::load(&reference)?;
            info!(reference = %reference.display(), locations = locations.len(), "Geocodes loaded");

            let table = aggregate_files(&files, on_error, |path| {
                scrape_location_study(path, &locations)
            })?;
            finish_table(&table, &output, s3_bucket, gzip).await?;
        }
        Commands::SurveyReports { folder } => {
            let files = collect_files(&folder)?;
            let survey = ReportSurvey::from_files(&files);

            info!(
                directions = ?survey.directions,
                legs = ?survey.legs,
                anomalies = survey.anomalies.len(),
                failed = survey.failed.len(),
                "Report survey"
            );
            for path in &survey.anomalies {
                info!(path = %path.display(), "Report is anomaly");
            }
        }
    }

    Ok(())
}

fn env_filter(var: &str, default_directive: &str) -> Result<EnvFilter> {
    Ok(EnvFilter::from_env(var).add_directive(default_directive.parse()?))
}

/// Logs a preview, exports the table, and optionally uploads the export.
async fn finish_table(
    table: &Table,
    path: &Path,
    s3_bucket: Option<String>,
    gzip: bool,
) -> Result<()> {
    output::print_preview(table, 5);
    output::export_table(path, table)?;

    if let Some(bucket_name) = s3_bucket {
        let client = bucket::client_from_env().await;
        let key = bucket::upload_file(&client, &bucket_name, path, None, gzip).await?;
        info!(bucket = %bucket_name, key = %key, "Output uploaded");
    }
    Ok(())
}

/// Authenticates, enumerates studies, and downloads every missing report.
#[tracing::instrument(skip_all, fields(start_year = settings.start_year, end_year = settings.end_year))]
async fn scrape(settings: ScrapeSettings, base_url: reqwest::Url, concurrency: usize) -> Result<()> {
    let auth = AuthProvider::new(AuthConfig {
        base_url: base_url.clone(),
        username: settings.username.clone(),
        password: settings.password.clone(),
        session_file: settings.session_file.clone(),
        navigation_timeout: AUTH_NAVIGATION_TIMEOUT,
    });
    let session_file = auth.create_authentication_session().await?;

    let catalog = StudyCatalog::new(
        session_client(&session_file, CATALOG_NAVIGATION_TIMEOUT)?,
        base_url.clone(),
    );
    let studies = catalog
        .studies_in_years(settings.start_year, settings.end_year)
        .await;

    std::fs::create_dir_all(&settings.base_folder)?;
    let validator = LocalStorageValidator::new(&settings.base_folder)?;
    info!(existing = validator.len(), "Existing reports indexed");

    let provider = DownloadsProvider::new(
        report_client(&session_file)?,
        base_url,
        settings.base_folder.clone(),
        settings.time_interval,
    );
    let downloader = ValidatingDownloader::new(provider, validator, concurrency);
    let summary = downloader.download_all(&studies).await;

    info!(
        studies = studies.len(),
        downloaded = summary.downloaded,
        skipped = summary.skipped,
        failed = summary.failed.len(),
        folder = %settings.base_folder.display(),
        "Scrape finished"
    );
    Ok(())
}

/// Authenticates, enumerates studies, and prints (and optionally uploads)
/// their portal URLs.
async fn list_urls(
    auth: AuthConfig,
    start_year: i32,
    end_year: i32,
    s3_bucket: Option<String>,
    key: &str,
) -> Result<()> {
    let base_url = auth.base_url.clone();
    let session_file = AuthProvider::new(auth).create_authentication_session().await?;

    let catalog = StudyCatalog::new(
        session_client(&session_file, CATALOG_NAVIGATION_TIMEOUT)?,
        base_url.clone(),
    );
    let studies = catalog.studies_in_years(start_year, end_year).await;

    let mut urls: Vec<String> = studies
        .iter()
        .map(|s| study_url(&base_url, &s.id).map(String::from))
        .collect::<Result<_>>()?;
    urls.sort();
    urls.dedup();

    for url in &urls {
        println!("{url}");
    }

    if let Some(bucket_name) = s3_bucket {
        let client = bucket::client_from_env().await;
        info!(bucket = %bucket_name, "Starting transfer to bucket");
        bucket::put_bytes(&client, &bucket_name, key, bucket::lines_body(&urls), "text/plain")
            .await
            .map_err(|e| anyhow!("failed to upload URL list: {e:#}"))?;
    }

    info!(urls = urls.len(), "Study URLs listed");
    Ok(())
}
