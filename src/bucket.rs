//! Uploads of exported files and URL lists to an S3 bucket.

use anyhow::{Context, Result};
use aws_sdk_s3::primitives::ByteStream;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Body and key for an upload, gzip-compressed (with a `.gz` suffix) when
/// requested.
pub fn prepare_body(key: &str, contents: Vec<u8>, gzip: bool) -> Result<(Vec<u8>, String)> {
    if gzip {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&contents)?;
        Ok((encoder.finish()?, format!("{key}.gz")))
    } else {
        Ok((contents, key.to_string()))
    }
}

/// Newline-terminated lines, as written for study URL lists.
pub fn lines_body<S: AsRef<str>>(lines: &[S]) -> Vec<u8> {
    let mut body = Vec::new();
    for line in lines {
        body.extend_from_slice(line.as_ref().as_bytes());
        body.push(b'\n');
    }
    body
}

pub async fn put_bytes(
    client: &aws_sdk_s3::Client,
    bucket: &str,
    key: &str,
    body: Vec<u8>,
    content_type: &str,
) -> Result<()> {
    let size = body.len();
    client
        .put_object()
        .bucket(bucket)
        .key(key)
        .body(ByteStream::from(body))
        .content_type(content_type)
        .send()
        .await
        .with_context(|| format!("failed to upload s3://{bucket}/{key}"))?;

    info!(bucket, key, bytes = size, "Uploaded to bucket");
    Ok(())
}

/// Uploads a local file under `key` (its file name when `None`).
pub async fn upload_file(
    client: &aws_sdk_s3::Client,
    bucket: &str,
    path: &Path,
    key: Option<&str>,
    gzip: bool,
) -> Result<String> {
    let contents = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let default_key = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    let (body, key) = prepare_body(key.unwrap_or(&default_key), contents, gzip)?;

    let content_type = if gzip {
        "application/gzip"
    } else {
        "application/octet-stream"
    };
    put_bytes(client, bucket, &key, body, content_type).await?;
    Ok(key)
}

pub async fn client_from_env() -> aws_sdk_s3::Client {
    let config = aws_config::load_from_env().await;
    aws_sdk_s3::Client::new(&config)
}
