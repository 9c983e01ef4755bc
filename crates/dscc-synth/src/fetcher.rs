//! Sample fetching seam
//!
//! Fetching real rows needs the execution platform. The default
//! `UnavailableFetcher` always reports it unreachable; synthesis then
//! falls back to an empty stub when configured to.

use crate::error::FetchError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Sample file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    /// JSON lines
    #[default]
    Json,
    /// CSV with header row
    Csv,
    /// Parquet
    Parquet,
}

impl SampleFormat {
    /// File extension (without dot)
    #[inline]
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Parquet => "parquet",
        }
    }

    /// Empty stub contents; `None` when the format has no text stub
    #[must_use]
    pub fn empty_stub(&self, columns: &[String]) -> Option<String> {
        match self {
            Self::Json => Some(String::new()),
            Self::Csv if columns.is_empty() => Some(String::new()),
            Self::Csv => Some(format!("{}\n", columns.join(","))),
            Self::Parquet => None,
        }
    }
}

/// One fetch request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleRequest {
    /// Table to read
    pub table: String,
    /// Optional row filter expression
    pub filter: Option<String>,
    /// Maximum rows
    pub limit: usize,
    /// Destination file
    pub destination: PathBuf,
    /// Destination format
    pub format: SampleFormat,
}

/// Writes sample rows for a table
#[async_trait::async_trait]
pub trait SampleFetcher: Send + Sync {
    /// Fetch rows into `request.destination`, returning the row count
    async fn fetch(&self, request: &SampleRequest) -> Result<usize, FetchError>;
}

/// Fetcher for environments without the execution platform
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableFetcher;

#[async_trait::async_trait]
impl SampleFetcher for UnavailableFetcher {
    async fn fetch(&self, request: &SampleRequest) -> Result<usize, FetchError> {
        tracing::debug!(table = %request.table, "no platform session for sample fetch");
        Err(FetchError::Unavailable(
            "execution platform is not reachable".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions() {
        assert_eq!(SampleFormat::Json.extension(), "json");
        assert_eq!(SampleFormat::Parquet.extension(), "parquet");
    }

    #[test]
    fn csv_stub_has_header() {
        let cols = vec!["a".to_string(), "b".to_string()];
        assert_eq!(SampleFormat::Csv.empty_stub(&cols).as_deref(), Some("a,b\n"));
        assert_eq!(SampleFormat::Parquet.empty_stub(&cols), None);
    }

    #[tokio::test]
    async fn unavailable_fetcher_errors() {
        let request = SampleRequest {
            table: "t".into(),
            filter: None,
            limit: 10,
            destination: PathBuf::from("tests/t_sample.json"),
            format: SampleFormat::Json,
        };
        let err = UnavailableFetcher.fetch(&request).await.unwrap_err();
        assert!(matches!(err, FetchError::Unavailable(_)));
    }
}
