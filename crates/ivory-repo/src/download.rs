//! HTTP transfers with retries.

use std::time::Duration;

use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::{Client, StatusCode};

use ivory_util::errors::{IvoryError, IvoryResult};

const MAX_RETRIES: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_millis(500);
const PROGRESS_THRESHOLD: u64 = 100_000;

/// A fetched body plus the server's `Last-Modified` time.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub bytes: Vec<u8>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Build the HTTP client shared by every Maven resolver.
pub fn build_client(timeout: Duration) -> IvoryResult<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("ivory/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| {
            IvoryError::Network {
                message: format!("Failed to create HTTP client: {e}"),
            }
            .into()
        })
}

/// GET `url`, retrying server errors and connection failures.
///
/// `Ok(None)` means 404. A progress bar is shown for large bodies when
/// `label` is given.
pub async fn fetch(client: &Client, url: &str, label: Option<&str>) -> IvoryResult<Option<Fetched>> {
    let mut last_err = String::new();

    for attempt in 0..MAX_RETRIES {
        if attempt > 0 {
            tokio::time::sleep(RETRY_DELAY * attempt).await;
        }

        let resp = match client.get(url).send().await {
            Ok(resp) => resp,
            Err(e) if e.is_timeout() || e.is_connect() => {
                last_err = e.to_string();
                continue;
            }
            Err(e) => return Err(network(format!("Request to {url} failed: {e}"))),
        };

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status.is_server_error() {
            last_err = format!("HTTP {status}");
            continue;
        }
        if !status.is_success() {
            return Err(network(format!("HTTP {status} fetching {url}")));
        }

        let last_modified = resp
            .headers()
            .get(reqwest::header::LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| DateTime::parse_from_rfc2822(v).ok())
            .map(|d| d.with_timezone(&Utc));
        let bar = label.and_then(|l| progress_bar(resp.content_length(), l));

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| network(format!("Failed to read {url}: {e}")))?;
        if let Some(pb) = bar {
            pb.set_position(bytes.len() as u64);
            pb.finish_and_clear();
        }
        return Ok(Some(Fetched {
            bytes: bytes.to_vec(),
            last_modified,
        }));
    }

    Err(network(format!(
        "Failed after {MAX_RETRIES} attempts for {url}: {last_err}"
    )))
}

/// GET a text resource (descriptor, metadata, checksum sidecar).
pub async fn fetch_text(client: &Client, url: &str) -> IvoryResult<Option<String>> {
    Ok(fetch(client, url, None)
        .await?
        .map(|f| String::from_utf8_lossy(&f.bytes).into_owned()))
}

/// HEAD request: whether `url` answers with a success status.
pub async fn head(client: &Client, url: &str) -> bool {
    match client.head(url).send().await {
        Ok(resp) => resp.status().is_success(),
        Err(e) => {
            tracing::debug!("HEAD {url} failed: {e}");
            false
        }
    }
}

fn progress_bar(len: Option<u64>, label: &str) -> Option<ProgressBar> {
    let total = len.filter(|&l| l > PROGRESS_THRESHOLD)?;
    if !console::Term::stderr().is_term() {
        return None;
    }
    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::with_template("  {msg} {bar:30.cyan/dim} {bytes}/{total_bytes}") {
        pb.set_style(style.progress_chars("##-"));
    }
    pb.set_message(label.to_string());
    Some(pb)
}

fn network(message: String) -> miette::Report {
    IvoryError::Network { message }.into()
}
