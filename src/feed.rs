//! Upstream detection feeds.
//!
//! [`DetectionFeed`] is the seam the pipeline fetches through. [`FirmsFeed`] talks to
//! the NASA FIRMS area API, [`FileFeed`] replays a CSV saved on disk.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::NaiveDate;
use std::fmt;
use std::path::PathBuf;
use tracing::info;

use crate::error::{ConfigError, Result, fetch_error, invalid_config};
use crate::fetch::{HttpClient, fetch_bytes};

pub const FIRMS_BASE_URL: &str = "https://firms.modaps.eosdis.nasa.gov/api/area/csv";
pub const DEFAULT_SOURCE: &str = "VIIRS_NOAA20_NRT";
pub const DEFAULT_AREA: &str = "world";

/// Abstraction over a provider of raw detection CSV.
#[async_trait]
pub trait DetectionFeed: Send + Sync {
    /// Short name used in logs and archive keys.
    fn name(&self) -> &str;

    /// Returns the complete CSV payload, or fails without partial data.
    async fn fetch(&self) -> Result<Bytes>;
}

/// Parameters of one FIRMS area request.
#[derive(Clone)]
pub struct FirmsQuery {
    pub base_url: String,
    pub map_key: String,
    /// Dataset, e.g. `VIIRS_NOAA20_NRT` or `VIIRS_SNPP_SP`.
    pub source: String,
    /// `world` or a `west,south,east,north` box.
    pub area: String,
    /// Number of days covered, 1..=10.
    pub day_range: u8,
    /// First day of the window. `None` asks for the most recent days.
    pub date: Option<NaiveDate>,
}

impl FirmsQuery {
    pub fn new(map_key: impl Into<String>) -> Self {
        Self {
            base_url: FIRMS_BASE_URL.to_string(),
            map_key: map_key.into(),
            source: DEFAULT_SOURCE.to_string(),
            area: DEFAULT_AREA.to_string(),
            day_range: 1,
            date: None,
        }
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.map_key.trim().is_empty() {
            return Err(invalid_config("FIRMS map key is empty"));
        }
        if !(1..=10).contains(&self.day_range) {
            return Err(invalid_config(format!(
                "FIRMS day range {} not in 1..=10",
                self.day_range
            )));
        }
        Ok(())
    }

    pub fn url(&self) -> String {
        self.build_url(&self.map_key)
    }

    /// The request URL with the map key masked, safe to log.
    pub fn redacted_url(&self) -> String {
        self.build_url("***")
    }

    fn build_url(&self, key: &str) -> String {
        let mut url = format!(
            "{}/{}/{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            key,
            self.source,
            self.area,
            self.day_range
        );
        if let Some(date) = self.date {
            url.push('/');
            url.push_str(&date.format("%Y-%m-%d").to_string());
        }
        url
    }
}

impl fmt::Debug for FirmsQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FirmsQuery")
            .field("url", &self.redacted_url())
            .finish()
    }
}

pub struct FirmsFeed<C> {
    client: C,
    query: FirmsQuery,
}

impl<C: HttpClient> FirmsFeed<C> {
    pub fn new(client: C, query: FirmsQuery) -> std::result::Result<Self, ConfigError> {
        query.validate()?;
        Ok(Self { client, query })
    }
}

#[async_trait]
impl<C: HttpClient> DetectionFeed for FirmsFeed<C> {
    fn name(&self) -> &str {
        &self.query.source
    }

    #[tracing::instrument(skip(self), fields(url = %self.query.redacted_url()))]
    async fn fetch(&self) -> Result<Bytes> {
        let bytes = fetch_bytes(&self.client, &self.query.url()).await?;
        info!(bytes = bytes.len(), "FIRMS feed fetched");
        Ok(bytes)
    }
}

/// Reads a previously saved feed CSV from disk.
pub struct FileFeed {
    path: PathBuf,
    name: String,
}

impl FileFeed {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("file")
            .to_string();
        Self { path, name }
    }
}

#[async_trait]
impl DetectionFeed for FileFeed {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<Bytes> {
        let data = tokio::fs::read(&self.path)
            .await
            .map_err(|e| fetch_error(format!("{}: {e}", self.path.display())))?;
        Ok(Bytes::from(data))
    }
}
