use chrono::{DateTime, Utc};
use h3o::CellIndex;
use std::collections::BTreeMap;

use crate::pipeline::types::{AggregateRecord, NormalizedRecord};
use crate::pipeline::utility::{mean_ordinal, ordered_sum};

/// Per-group accumulator. Only known values are collected.
#[derive(Default)]
struct Group {
    confidences: Vec<u32>,
    powers: Vec<f64>,
    /// `(seq, flag)` of the earliest contributor seen so far.
    first: Option<(usize, Option<char>)>,
}

impl Group {
    fn push(&mut self, r: &NormalizedRecord) {
        if let Some(c) = r.confidence {
            self.confidences.push(c);
        }
        if let Some(p) = r.frp {
            self.powers.push(p);
        }
        match self.first {
            Some((seq, _)) if seq <= r.seq => {}
            _ => self.first = Some((r.seq, r.daynight)),
        }
    }
}

/// Reduces normalized records to one [`AggregateRecord`] per `(cell, bucket)`.
///
/// - `confidence`: mean of the known ordinals, Unknown if there are none
/// - `frp_total`: sum of the known powers, Unknown if there are none
/// - `daynight`: flag of the contributor with the smallest `seq`, even if that flag
///   is itself Unknown. This is the one field that depends on arrival order.
///
/// Output is ordered by `(bucket, cell)`.
pub fn aggregate(records: &[NormalizedRecord]) -> Vec<AggregateRecord> {
    let mut groups: BTreeMap<(DateTime<Utc>, CellIndex), Group> = BTreeMap::new();

    for r in records {
        groups.entry((r.bucket, r.cell)).or_default().push(r);
    }

    groups
        .into_iter()
        .map(|((bucket, cell), mut g)| AggregateRecord {
            cell,
            bucket,
            confidence: mean_ordinal(&g.confidences),
            frp_total: ordered_sum(&mut g.powers),
            daynight: g.first.and_then(|(_, flag)| flag),
        })
        .collect()
}
