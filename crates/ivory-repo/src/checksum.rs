//! Checksum sidecar verification (`.sha1`, `.md5`).

use std::path::Path;

use reqwest::Client;

use ivory_util::errors::{IvoryError, IvoryResult};
use ivory_util::hash::{md5_bytes, sha1_bytes};

use crate::download;

/// Supported sidecar algorithms, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Sha1,
    Md5,
}

impl Algorithm {
    pub const ALL: [Algorithm; 2] = [Algorithm::Sha1, Algorithm::Md5];

    pub fn extension(self) -> &'static str {
        match self {
            Algorithm::Sha1 => "sha1",
            Algorithm::Md5 => "md5",
        }
    }

    pub fn digest(self, data: &[u8]) -> String {
        match self {
            Algorithm::Sha1 => sha1_bytes(data),
            Algorithm::Md5 => md5_bytes(data),
        }
    }
}

/// Verify `data` against the first sidecar published next to `file_url`.
/// A file without any sidecar passes with a warning.
pub async fn verify_remote(client: &Client, file_url: &str, data: &[u8]) -> IvoryResult<()> {
    for algo in Algorithm::ALL {
        let url = format!("{file_url}.{}", algo.extension());
        if let Some(expected) = download::fetch_text(client, &url).await? {
            return check(algo, data, &expected, file_url);
        }
    }
    tracing::warn!("no checksum sidecar for {file_url}");
    Ok(())
}

/// Verify `data` against a sidecar next to a local file, if one exists.
pub fn verify_local(file: &Path, data: &[u8]) -> IvoryResult<()> {
    for algo in Algorithm::ALL {
        let sidecar = file.with_file_name(format!(
            "{}.{}",
            file.file_name().unwrap_or_default().to_string_lossy(),
            algo.extension()
        ));
        if let Ok(expected) = std::fs::read_to_string(&sidecar) {
            return check(algo, data, &expected, &file.display().to_string());
        }
    }
    Ok(())
}

fn check(algo: Algorithm, data: &[u8], sidecar: &str, what: &str) -> IvoryResult<()> {
    let expected = extract_hash(sidecar);
    let actual = algo.digest(data);
    if actual.eq_ignore_ascii_case(expected) {
        tracing::debug!("{} ok for {what}", algo.extension());
        return Ok(());
    }
    Err(IvoryError::Download {
        message: format!(
            "{} mismatch for {what}: expected {expected}, got {actual}",
            algo.extension()
        ),
    }
    .into())
}

/// Sidecars hold either the bare hash or `hash  filename`.
fn extract_hash(content: &str) -> &str {
    content.split_whitespace().next().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_hash_ignores_file_name() {
        assert_eq!(extract_hash("abc123\n"), "abc123");
        assert_eq!(extract_hash("abc123  lib-1.0.jar\n"), "abc123");
        assert_eq!(extract_hash(""), "");
    }

    #[test]
    fn local_sidecar_is_checked() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("lib-1.0.jar");
        std::fs::write(&file, b"hello world").unwrap();
        assert!(verify_local(&file, b"hello world").is_ok());

        std::fs::write(
            tmp.path().join("lib-1.0.jar.sha1"),
            "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed",
        )
        .unwrap();
        assert!(verify_local(&file, b"hello world").is_ok());
        assert!(verify_local(&file, b"tampered").is_err());
    }

    #[test]
    fn md5_sidecar_is_used_without_sha1() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("a.jar");
        std::fs::write(tmp.path().join("a.jar.md5"), "5eb63bbbe01eeed093cb22bb8f5acdc3").unwrap();
        assert!(verify_local(&file, b"hello world").is_ok());
        assert!(verify_local(&file, b"nope").is_err());
    }
}
