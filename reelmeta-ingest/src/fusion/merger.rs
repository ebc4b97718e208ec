//! Field-wise merge of partial records
//!
//! For each field the value from the highest-priority strategy that supplied
//! it wins, and provenance records that strategy. The result depends only on
//! the set of partial records, never on the order they settled in.

use super::priority::FieldPriorityTable;
use crate::types::{CanonicalRecord, PartialRecord, StrategyFailure};
use reelmeta_common::Platform;
use tracing::{debug, info};

/// Completeness under which a merged record is logged as sparse
const SPARSE_COMPLETENESS: f32 = 0.5;

/// Merge settled strategy outputs into one record
pub fn merge(
    key: &str,
    platform: Platform,
    url: &str,
    partials: &[PartialRecord],
    failures: Vec<StrategyFailure>,
    table: &FieldPriorityTable,
) -> CanonicalRecord {
    let mut record = CanonicalRecord::new(key, platform, url);

    for partial in partials {
        for (field, value) in partial.fields() {
            record.offer(field, value.clone(), partial.strategy_id(), |candidate, holder| {
                table.outranks(field, candidate, holder)
            });
        }
    }

    for failure in failures {
        record.record_failure(failure);
    }

    let completeness = record.completeness();
    let sources: Vec<&str> = partials.iter().map(PartialRecord::strategy_id).collect();

    if completeness < SPARSE_COMPLETENESS {
        info!(
            key,
            completeness = completeness as f64,
            sources = ?sources,
            failed = record.strategy_failures().len(),
            "Merged record is sparse"
        );
    } else {
        debug!(
            key,
            completeness = completeness as f64,
            sources = ?sources,
            "Merged record"
        );
    }

    record
}
