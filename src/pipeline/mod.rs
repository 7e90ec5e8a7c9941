//! The aggregation pipeline.
//!
//! Raw detections are mapped onto an H3 cell and a fixed-width time bucket,
//! reduced to one aggregate per `(cell, bucket)`, and upserted into the store.
//! The leaf stages ([`spatial`], [`bucket`], [`confidence`]) are pure functions;
//! [`runner`] wires them to a feed and a store.

pub mod aggregate;
pub mod bucket;
pub mod confidence;
pub mod normalize;
pub mod runner;
pub mod spatial;
pub mod types;
pub mod utility;
