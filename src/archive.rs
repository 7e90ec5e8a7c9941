//! Raw feed snapshots.
//!
//! Each fetched payload can be kept as `date=YYYY-MM-DD/<feed>_<HHMMSS>.csv` under a
//! local directory, optionally gzip-compressed, and optionally uploaded to S3 under
//! the same key. Snapshots are a side channel: the pipeline logs archive failures
//! and carries on.

use aws_sdk_s3::primitives::ByteStream;
use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{PipelineError, Result};

pub struct Archiver {
    dir: PathBuf,
    gzip: bool,
    s3: Option<(aws_sdk_s3::Client, String)>,
}

impl Archiver {
    pub fn new(dir: impl Into<PathBuf>, gzip: bool) -> Self {
        Self {
            dir: dir.into(),
            gzip,
            s3: None,
        }
    }

    /// Also upload every snapshot to `bucket`.
    pub fn with_s3(mut self, client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        self.s3 = Some((client, bucket.into()));
        self
    }

    /// Snapshot key relative to the archive root.
    pub fn key(feed: &str, at: DateTime<Utc>, gzip: bool) -> String {
        let ext = if gzip { "csv.gz" } else { "csv" };
        format!(
            "date={}/{}_{}.{}",
            at.format("%Y-%m-%d"),
            feed,
            at.format("%H%M%S"),
            ext
        )
    }

    /// Writes the snapshot and uploads it when S3 is configured. Returns the local path.
    #[tracing::instrument(skip(self, payload), fields(bytes = payload.len(), gzip = self.gzip))]
    pub async fn archive(&self, feed: &str, payload: &[u8], at: DateTime<Utc>) -> Result<PathBuf> {
        let key = Self::key(feed, at, self.gzip);
        let body = if self.gzip {
            gzip(payload)?
        } else {
            payload.to_vec()
        };

        let path = self.dir.join(&key);
        write_atomically(&path, &body).await?;
        info!(path = %path.display(), "Feed snapshot written");

        if let Some((client, bucket)) = &self.s3 {
            client
                .put_object()
                .bucket(bucket)
                .key(&key)
                .content_type("text/csv")
                .body(ByteStream::from(body))
                .send()
                .await
                .map_err(|e| PipelineError::Archive(format!("S3 upload of {key} failed: {e}")))?;
            info!(bucket = %bucket, key = %key, "Feed snapshot uploaded");
        }

        Ok(path)
    }
}

fn gzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Writes to a sibling `.part` file first so a partial snapshot is never visible
/// under its final name.
async fn write_atomically(path: &Path, body: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".part");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, body).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 8, 1, 1, 42, 7).unwrap()
    }

    #[test]
    fn test_key_layout() {
        assert_eq!(
            Archiver::key("VIIRS_NOAA20_NRT", at(), false),
            "date=2024-08-01/VIIRS_NOAA20_NRT_014207.csv"
        );
        assert!(Archiver::key("x", at(), true).ends_with(".csv.gz"));
    }

    #[tokio::test]
    async fn test_archive_plain_and_gzip() {
        let dir = std::env::temp_dir().join("hotspot_etl_test_archive");
        let _ = std::fs::remove_dir_all(&dir);
        let payload = b"latitude,longitude\n1,2\n";

        let plain = Archiver::new(&dir, false).archive("feed", payload, at()).await.unwrap();
        assert_eq!(std::fs::read(&plain).unwrap(), payload);

        let zipped = Archiver::new(&dir, true).archive("feed", payload, at()).await.unwrap();
        let mut decoded = Vec::new();
        GzDecoder::new(std::fs::File::open(&zipped).unwrap())
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, payload);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
