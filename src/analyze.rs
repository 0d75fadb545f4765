use crate::context::RunContext;
use crate::gff::{AttrFormat, Attributes, Feature};
use crate::intersect::IntersectedRecord;
use crate::isomir::{tune, variant_with_nt, Isomir};
use crate::sequence::{has_ambiguous_base, make_id};
use crate::store::IsomirEntry;
use anyhow::{anyhow, Result};
use log::debug;

/// Value of the `Filter` attribute; no filtering policy is applied here
pub const FILTER_PASS: &str = "Pass";

/// Why an intersected record produced no annotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiscardReason {
    /// Overlapped feature is not a miRNA primary transcript
    NotPrimaryTranscript,
    /// Read sequence has an ambiguous base
    AmbiguousBase,
    /// Interval start field was empty
    MissingStart,
}

/// An annotation line ready for aggregation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzedRecord {
    pub chrom: String,
    pub start: i64,
    pub entry: IsomirEntry,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Analysis {
    Kept(AnalyzedRecord),
    Discarded(DiscardReason),
}

impl Analysis {
    pub fn kept(self) -> Option<AnalyzedRecord> {
        match self {
            Analysis::Kept(record) => Some(record),
            Analysis::Discarded(_) => None,
        }
    }
}

/// Read start relative to the overlapped annotation block.
///
/// Forward reads count from the block start (1-based); reverse reads count
/// back from the block end.
pub fn corrected_start(strand: char, start: i64, end: i64, block_start: i64, block_end: i64) -> i64 {
    if strand == '+' {
        start - block_start + 1
    } else {
        block_end - end
    }
}

/// Turn one intersected record into an isomiR annotation line.
///
/// Filtering outcomes are returned as [`Analysis::Discarded`]; an error means
/// the inputs are inconsistent (unknown precursor, unusable sequence).
pub fn analyze_record(record: &IntersectedRecord, ctx: &RunContext) -> Result<Analysis> {
    if !record.is_primary_transcript() {
        return Ok(Analysis::Discarded(DiscardReason::NotPrimaryTranscript));
    }

    let sequence = record.sequence.as_str();
    debug!("READ::line name:{}", record.query_name);
    if has_ambiguous_base(sequence) {
        return Ok(Analysis::Discarded(DiscardReason::AmbiguousBase));
    }

    let chrom = record.precursor_name();
    let Some(raw_start) = record.start else {
        return Ok(Analysis::Discarded(DiscardReason::MissingStart));
    };

    let start = corrected_start(
        record.strand,
        raw_start,
        record.end,
        record.ann_start,
        record.ann_end,
    );

    let mut iso = Isomir::default();
    iso.set_pos(start, sequence.len());
    debug!("READ::From BAM start {} end {} at chrom {}", iso.start, iso.end, chrom);

    let precursor = ctx
        .precursors
        .get(&chrom)
        .ok_or_else(|| anyhow!("Precursor {} is not in the precursor sequences", chrom))?;
    if (precursor.len() as i64) < start + sequence.len() as i64 {
        debug!(
            "READ::{} start + {} sequence size are bigger than size precursor {}",
            chrom,
            sequence.len(),
            precursor.len()
        );
    }

    iso.apply(tune(sequence, precursor, start));
    iso.annotate(sequence.len(), ctx.matures.get(&chrom));
    debug!("READ::iso add {} iso subs {:?}", iso.add, iso.subs);

    let uid = make_id(sequence)?;
    let variant = iso.format_variant();
    let source = if variant != "NA" { "isomiR" } else { "ref_miRNA" };
    let read = if ctx.config.keep_name {
        record.query_name.as_str()
    } else {
        sequence
    };

    let attributes = Attributes::new()
        .with("Read", read)
        .with("UID", &uid)
        .with("Name", iso.mirna.as_deref().unwrap_or("NA"))
        .with("Parent", &chrom)
        .with("Variant", &variant)
        .with("Cigar", &iso.cigar)
        .with("Expression", record.count)
        .with("Filter", FILTER_PASS);

    let mut feature = Feature {
        seqid: chrom.clone(),
        source: ctx.database().to_string(),
        feature_type: source.to_string(),
        start,
        end: iso.end,
        score: ".".to_string(),
        strand: record.strand,
        phase: ".".to_string(),
        attributes,
    };

    let mut draft = feature.render(AttrFormat::Gff);
    debug!("READ::line:{}", draft);
    if ctx.config.add_extra {
        let parsed = Feature::parse(&draft)?;
        let changes = variant_with_nt(&parsed, ctx.precursors, ctx.matures)?;
        feature.attributes.push("Changes", changes);
        draft = feature.render(AttrFormat::Gff);
    }

    let line = Feature::normalize(&draft, ctx.config.format)?;
    Ok(Analysis::Kept(AnalyzedRecord {
        chrom: chrom.clone(),
        start,
        entry: IsomirEntry {
            uid,
            chrom,
            counts: record.count,
            sample: ctx.sample.clone(),
            line,
        },
    }))
}
