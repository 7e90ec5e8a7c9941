use chrono::Utc;
use tracing::{info, warn};

use crate::archive::Archiver;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::feed::DetectionFeed;
use crate::parser::{ParsedFeed, parse_feed};
use crate::pipeline::aggregate::aggregate;
use crate::pipeline::normalize::normalize_batch;
use crate::pipeline::types::{AggregateRecord, SkippedRecord};
use crate::stats::RunReport;
use crate::store::AggregateStore;

/// Aggregates computed from one feed payload, before anything is written.
#[derive(Debug)]
pub struct Prepared {
    pub aggregates: Vec<AggregateRecord>,
    /// Parser rejects and normalizer skips, in feed row order.
    pub skipped: Vec<SkippedRecord>,
    pub report: RunReport,
}

/// Normalizes and aggregates parsed rows. Pure; never touches the store.
pub fn prepare(parsed: ParsedFeed, config: &PipelineConfig) -> Prepared {
    let batch = normalize_batch(&parsed.rows, config);
    let aggregates = aggregate(&batch.records);

    let mut report = RunReport::new();
    report.record_batch(&parsed, &batch);
    report.aggregates = aggregates.len();

    let mut skipped = parsed.rejected;
    skipped.extend(batch.skipped);
    skipped.sort_by_key(|s| s.seq);

    Prepared {
        aggregates,
        skipped,
        report,
    }
}

/// Writes `aggregates` in one transaction bounded by the configured store timeout.
/// On timeout the in-flight transaction is dropped and rolled back.
pub async fn write<S: AggregateStore + ?Sized>(
    store: &S,
    aggregates: &[AggregateRecord],
    config: &PipelineConfig,
) -> Result<usize> {
    match tokio::time::timeout(config.store_timeout, store.upsert(aggregates)).await {
        Ok(written) => Ok(written?),
        Err(_) => Err(PipelineError::StoreTimeout(config.store_timeout)),
    }
}

/// Parses, aggregates and writes one already-fetched payload.
pub async fn process<S: AggregateStore + ?Sized>(
    payload: &[u8],
    store: &S,
    config: &PipelineConfig,
) -> Result<Prepared> {
    let parsed = parse_feed(payload)?;
    let mut prepared = prepare(parsed, config);
    prepared.report.fetched_bytes = payload.len();

    if prepared.report.skipped() > 0 {
        warn!(
            skipped = prepared.report.skipped(),
            skipped_pct = prepared.report.skipped_pct(),
            "Some detections were skipped"
        );
    }

    prepared.report.written = write(store, &prepared.aggregates, config).await?;
    Ok(prepared)
}

/// Runs one batch: fetch, optional snapshot, parse, normalize, aggregate, write.
///
/// A fetch failure ends the run before anything is parsed. A write failure leaves
/// the store as it was before the run.
#[tracing::instrument(skip_all, fields(feed = feed.name()))]
pub async fn run<F, S>(
    feed: &F,
    store: &S,
    config: &PipelineConfig,
    archiver: Option<&Archiver>,
) -> Result<Prepared>
where
    F: DetectionFeed + ?Sized,
    S: AggregateStore + ?Sized,
{
    let payload = feed.fetch().await?;

    if let Some(archiver) = archiver {
        if let Err(e) = archiver.archive(feed.name(), &payload, Utc::now()).await {
            warn!(error = %e, "Feed snapshot failed, continuing");
        }
    }

    let mut prepared = process(&payload, store, config).await?;
    prepared.report.feed = Some(feed.name().to_string());

    info!(
        rows = prepared.report.rows,
        normalized = prepared.report.normalized,
        skipped = prepared.report.skipped(),
        aggregates = prepared.report.aggregates,
        written = prepared.report.written,
        "Run complete"
    );
    Ok(prepared)
}
