/// End-to-end conversion of one Manatee file
///
/// alignments -> interval file -> intersected records -> analyzed lines ->
/// deduplicated store. Every stage runs to completion before the next one.
use crate::alignment::open_input;
use crate::analyze::{analyze_record, DiscardReason};
use crate::bed::{interval_path, write_interval_file};
use crate::context::RunContext;
use crate::intersect::Intersector;
use crate::store::{Aggregator, ResultStore};
use anyhow::{Context, Result};
use log::{debug, info};
use std::path::Path;

/// Convert `input` into grouped isomiR annotations
pub fn read_file<I: Intersector + ?Sized>(input: &Path, ctx: &RunContext, intersector: &I) -> Result<ResultStore> {
    let bed_path = interval_path(&ctx.config.out_dir, input);

    let (written, skipped) = {
        let reader = open_input(input)?;
        write_interval_file(reader, &bed_path)
            .with_context(|| format!("Failed to export intervals from {}", input.display()))?
    };
    debug!(
        "{}: {} intervals written, {} reads with ambiguous bases",
        ctx.sample, written, skipped
    );

    let records = intersector
        .intersect(&bed_path)
        .with_context(|| format!("Failed to intersect {}", bed_path.display()))?;

    let mut aggregator = Aggregator::new();
    for record in &records {
        let analysis = analyze_record(record, ctx)
            .with_context(|| format!("Failed to analyze read {}", record.query_name))?;
        aggregator.push_analysis(analysis);
    }

    info!(
        "{}: {} annotations from {} overlaps ({} duplicates, {} non-primary, {} ambiguous, {} without start)",
        ctx.sample,
        aggregator.len(),
        records.len(),
        aggregator.duplicates(),
        aggregator.discarded(DiscardReason::NotPrimaryTranscript),
        aggregator.discarded(DiscardReason::AmbiguousBase),
        aggregator.discarded(DiscardReason::MissingStart),
    );

    Ok(aggregator.into_store())
}
