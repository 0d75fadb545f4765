/// Overlap of exported read intervals with the reference annotation
///
/// The output mirrors `bedtools intersect -wo -s`: the 7 interval columns,
/// the 9 annotation columns and the overlap length.
use crate::bed::{read_interval_file, IntervalRecord, INTERVAL_FIELDS};
use crate::error::RecordError;
use crate::gff::unescape;
use crate::reference::{AnnotationFeature, ReferenceAnnotation, PRIMARY_TRANSCRIPT};
use anyhow::{anyhow, bail, Context, Result};
use coitrees::{BasicCOITree, Interval, IntervalTree};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Interval columns plus the nine annotation columns
pub const MIN_INTERSECT_FIELDS: usize = INTERVAL_FIELDS + 9;

/// One read interval joined with one overlapping annotation feature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntersectedRecord {
    pub chrom: String,
    /// Interval start; `None` when the field is empty
    pub start: Option<i64>,
    pub end: i64,
    pub query_name: String,
    pub sequence: String,
    pub strand: char,
    pub count: u64,
    pub ann_chrom: String,
    pub ann_source: String,
    pub ann_type: String,
    /// Annotation block start (field 10)
    pub ann_start: i64,
    /// Annotation block end (field 11)
    pub ann_end: i64,
    pub ann_score: String,
    pub ann_strand: String,
    pub ann_phase: String,
    /// Annotation attributes (field 15)
    pub attributes: String,
    pub overlap: Option<i64>,
}

impl IntersectedRecord {
    /// Validate a positional field list
    pub fn from_fields(fields: &[&str], line_no: usize) -> Result<Self, RecordError> {
        if fields.len() < MIN_INTERSECT_FIELDS {
            return Err(RecordError::TooFewFields {
                line: line_no,
                expected: MIN_INTERSECT_FIELDS,
                found: fields.len(),
            });
        }
        let int = |field: &'static str, value: &str| {
            value.trim().parse::<i64>().map_err(|_| RecordError::InvalidInteger {
                line: line_no,
                field,
                value: value.to_string(),
            })
        };

        let start = match fields[1].trim() {
            "" => None,
            value => Some(int("start", value)?),
        };
        let strand = match fields[5] {
            "+" => '+',
            "-" => '-',
            other => {
                return Err(RecordError::InvalidStrand {
                    line: line_no,
                    value: other.to_string(),
                })
            }
        };
        let count = fields[6]
            .trim()
            .parse::<u64>()
            .map_err(|_| RecordError::InvalidInteger {
                line: line_no,
                field: "count",
                value: fields[6].to_string(),
            })?;
        let overlap = match fields.get(16) {
            Some(v) => Some(int("overlap", v)?),
            None => None,
        };

        Ok(IntersectedRecord {
            chrom: fields[0].to_string(),
            start,
            end: int("end", fields[2])?,
            query_name: fields[3].to_string(),
            sequence: fields[4].to_string(),
            strand,
            count,
            ann_chrom: fields[7].to_string(),
            ann_source: fields[8].to_string(),
            ann_type: fields[9].to_string(),
            ann_start: int("annotation start", fields[10])?,
            ann_end: int("annotation end", fields[11])?,
            ann_score: fields[12].to_string(),
            ann_strand: fields[13].to_string(),
            ann_phase: fields[14].to_string(),
            attributes: fields[15].to_string(),
            overlap,
        })
    }

    pub fn parse(line: &str, line_no: usize) -> Result<Self, RecordError> {
        let fields: Vec<&str> = line.trim_end_matches(['\n', '\r']).split('\t').collect();
        Self::from_fields(&fields, line_no)
    }

    /// True if the overlapped feature is a primary miRNA transcript
    pub fn is_primary_transcript(&self) -> bool {
        self.ann_type == PRIMARY_TRANSCRIPT || self.attributes.contains(PRIMARY_TRANSCRIPT)
    }

    /// Precursor name: text after the last `Name=` up to the next `;`,
    /// percent-decoded
    pub fn precursor_name(&self) -> String {
        let tail = self
            .attributes
            .trim()
            .rsplit("Name=")
            .next()
            .unwrap_or("");
        unescape(tail.split(';').next().unwrap_or("").trim())
    }

    /// Join an interval with an overlapping feature. `line_no` is the
    /// interval's 1-based line, used for error reporting.
    pub fn from_overlap(
        interval: &IntervalRecord,
        feature: &AnnotationFeature,
        overlap: i64,
        line_no: usize,
    ) -> Result<Self, RecordError> {
        let count = interval
            .count
            .trim()
            .parse::<u64>()
            .map_err(|_| RecordError::InvalidInteger {
                line: line_no,
                field: "count",
                value: interval.count.clone(),
            })?;

        Ok(IntersectedRecord {
            chrom: interval.chrom.clone(),
            start: Some(interval.start),
            end: interval.end,
            query_name: interval.name.clone(),
            sequence: interval.sequence.clone(),
            strand: interval.strand,
            count,
            ann_chrom: feature.chrom.clone(),
            ann_source: feature.source.clone(),
            ann_type: feature.feature_type.clone(),
            ann_start: feature.start,
            ann_end: feature.end,
            ann_score: feature.score.clone(),
            ann_strand: feature.strand.to_string(),
            ann_phase: feature.phase.clone(),
            attributes: feature.attribute_column(),
            overlap: Some(overlap),
        })
    }
}

impl fmt::Display for IntersectedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let start = self.start.map(|s| s.to_string()).unwrap_or_default();
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.chrom,
            start,
            self.end,
            self.query_name,
            self.sequence,
            self.strand,
            self.count,
            self.ann_chrom,
            self.ann_source,
            self.ann_type,
            self.ann_start,
            self.ann_end,
            self.ann_score,
            self.ann_strand,
            self.ann_phase,
            self.attributes
        )?;
        if let Some(overlap) = self.overlap {
            write!(f, "\t{overlap}")?;
        }
        Ok(())
    }
}

/// Produces intersected records for an interval file
pub trait Intersector {
    fn intersect(&self, intervals: &Path) -> Result<Vec<IntersectedRecord>>;
}

/// Overlap length using BED (0-based, half-open) interval coordinates against
/// a 1-based inclusive GFF feature.
pub fn overlap_len(interval: &IntervalRecord, feature: &AnnotationFeature) -> i64 {
    interval.end.min(feature.end) - interval.start.max(feature.start - 1)
}

/// Interval-tree coordinate; trees are indexed with `i32`
fn tree_coord(pos: i64) -> Result<i32> {
    i32::try_from(pos).map_err(|_| anyhow!("Coordinate {} is out of range for the interval index", pos))
}

/// In-process intersection against a loaded annotation
pub struct AnnotationIntersector<'a> {
    annotation: &'a ReferenceAnnotation,
    /// Per chromosome; node metadata is the feature's index in
    /// [`ReferenceAnnotation::on_chrom`]
    trees: HashMap<String, BasicCOITree<usize, u32>>,
    same_strand: bool,
}

impl<'a> AnnotationIntersector<'a> {
    /// Index the annotation, one tree per chromosome
    pub fn new(annotation: &'a ReferenceAnnotation) -> Result<Self> {
        let mut trees = HashMap::new();
        for chrom in annotation.chroms() {
            let mut nodes = Vec::new();
            for (idx, feature) in annotation.on_chrom(chrom).iter().enumerate() {
                // 1-based [start, end] as 0-based end-inclusive [start - 1, end - 1]
                let first = tree_coord(feature.start - 1)?;
                let last = tree_coord(feature.end - 1)?;
                if last >= first {
                    nodes.push(Interval::new(first, last, idx));
                }
            }
            trees.insert(chrom.to_string(), BasicCOITree::new(&nodes));
        }

        Ok(AnnotationIntersector {
            annotation,
            trees,
            same_strand: true,
        })
    }

    pub fn with_same_strand(mut self, same_strand: bool) -> Self {
        self.same_strand = same_strand;
        self
    }

    /// Intersect intervals already in memory. Hits for each interval come
    /// out in annotation file order.
    pub fn intersect_records(&self, intervals: &[IntervalRecord]) -> Result<Vec<IntersectedRecord>> {
        let mut out = Vec::new();
        let mut hits: Vec<usize> = Vec::new();
        for (idx, interval) in intervals.iter().enumerate() {
            let Some(tree) = self.trees.get(&interval.chrom) else {
                continue;
            };
            // BED half-open [start, end) as end-inclusive [start, end - 1]
            let first = tree_coord(interval.start)?;
            let last = tree_coord(interval.end - 1)?;
            if last < first {
                continue;
            }

            hits.clear();
            tree.query(first, last, |node| hits.push(node.metadata.clone()));
            hits.sort_unstable();

            let features = self.annotation.on_chrom(&interval.chrom);
            for &hit in &hits {
                let feature = &features[hit];
                if self.same_strand && feature.strand != interval.strand {
                    continue;
                }
                let overlap = overlap_len(interval, feature);
                if overlap <= 0 {
                    continue;
                }
                out.push(IntersectedRecord::from_overlap(interval, feature, overlap, idx + 1)?);
            }
        }
        Ok(out)
    }
}

impl Intersector for AnnotationIntersector<'_> {
    fn intersect(&self, intervals: &Path) -> Result<Vec<IntersectedRecord>> {
        let records = read_interval_file(intervals)?;
        let out = self.intersect_records(&records)?;
        log::debug!(
            "{} intervals produced {} overlaps in memory",
            records.len(),
            out.len()
        );
        Ok(out)
    }
}

/// Locate the `bedtools` executable: `$BEDTOOLS`, then PATH
pub fn find_bedtools() -> Result<PathBuf> {
    if let Ok(path) = env::var("BEDTOOLS") {
        let path = PathBuf::from(path);
        if path.exists() {
            return Ok(path);
        }
    }

    if let Ok(output) = Command::new("which").arg("bedtools").output() {
        if output.status.success() {
            let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !path.is_empty() {
                return Ok(PathBuf::from(path));
            }
        }
    }

    Err(anyhow!(
        "bedtools not found. Install it or set BEDTOOLS to its path"
    ))
}

/// Runs `bedtools intersect -wo -s` as a subprocess
pub struct BedtoolsIntersector {
    binary: PathBuf,
    annotation: PathBuf,
}

impl BedtoolsIntersector {
    pub fn new(binary: PathBuf, annotation: PathBuf) -> Self {
        BedtoolsIntersector { binary, annotation }
    }
}

impl Intersector for BedtoolsIntersector {
    fn intersect(&self, intervals: &Path) -> Result<Vec<IntersectedRecord>> {
        let output = Command::new(&self.binary)
            .arg("intersect")
            .arg("-a")
            .arg(intervals)
            .arg("-b")
            .arg(&self.annotation)
            .args(["-wo", "-s"])
            .output()
            .with_context(|| format!("Failed to run {}", self.binary.display()))?;

        if !output.status.success() {
            bail!(
                "bedtools intersect failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let stdout = String::from_utf8(output.stdout)?;
        let mut out = Vec::new();
        for (idx, line) in stdout.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            out.push(IntersectedRecord::parse(line, idx + 1)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const GFF: &str = "chr1\t.\tmiRNA_primary_transcript\t100\t180\t.\t+\t.\tID=MI1;Alias=MI1;Name=mir-21\n\
chr1\t.\tmiRNA\t105\t126\t.\t+\t.\tID=MIMAT1;Name=mir-21-5p;Derives_from=MI1\n\
chr1\t.\tmiRNA_primary_transcript\t500\t580\t.\t-\t.\tID=MI2;Name=mir-rev\n";

    fn interval(start: i64, seq: &str, strand: char) -> IntervalRecord {
        IntervalRecord {
            chrom: "chr1".into(),
            start,
            end: start + seq.len() as i64 - 1,
            name: "r".into(),
            sequence: seq.into(),
            strand,
            count: "3".into(),
        }
    }

    #[test]
    fn test_record_from_fields() {
        let line = "chr1\t101\t108\tr1\tACGTACGT\t+\t7\tchr1\t.\tmiRNA_primary_transcript\t100\t180\t.\t+\t.\tID=MI1;Name=mir-21\t8";
        let rec = IntersectedRecord::parse(line, 1).unwrap();
        assert_eq!(rec.start, Some(101));
        assert_eq!(rec.count, 7);
        assert_eq!((rec.ann_start, rec.ann_end), (100, 180));
        assert_eq!(rec.precursor_name(), "mir-21");
        assert!(rec.is_primary_transcript());
        assert_eq!(rec.overlap, Some(8));
        assert_eq!(rec.to_string(), line);
    }

    #[test]
    fn test_record_too_short() {
        let err = IntersectedRecord::parse("chr1\t1\t2\tr\tAC\t+\t1", 3).unwrap_err();
        assert_eq!(
            err,
            RecordError::TooFewFields {
                line: 3,
                expected: 16,
                found: 7
            }
        );
    }

    #[test]
    fn test_record_empty_start() {
        let line = "chr1\t\t108\tr1\tACGT\t+\t7\tchr1\t.\tmiRNA_primary_transcript\t100\t180\t.\t+\t.\tName=mir-21";
        assert_eq!(IntersectedRecord::parse(line, 1).unwrap().start, None);
    }

    #[test]
    fn test_record_bad_count() {
        let line = "chr1\t1\t8\tr1\tACGT\t+\tmany\tchr1\t.\tmiRNA\t1\t9\t.\t+\t.\tName=x";
        assert!(matches!(
            IntersectedRecord::parse(line, 5),
            Err(RecordError::InvalidInteger { field: "count", .. })
        ));
    }

    #[test]
    fn test_precursor_name_not_last() {
        let line = "chr1\t1\t8\tr1\tACGT\t+\t1\tchr1\t.\tmiRNA_primary_transcript\t1\t9\t.\t+\t.\tID=MI1;Name=mir-9;Note=x";
        assert_eq!(IntersectedRecord::parse(line, 1).unwrap().precursor_name(), "mir-9");
    }

    #[test]
    fn test_in_memory_intersection() {
        let annotation = ReferenceAnnotation::from_reader(Cursor::new(GFF)).unwrap();
        let intersector = AnnotationIntersector::new(&annotation).unwrap();
        let records = intersector
            .intersect_records(&[
                interval(101, "ACGTACGT", '+'),
                interval(101, "ACGTACGT", '-'),
                interval(300, "ACGT", '+'),
                interval(520, "ACGT", '-'),
            ])
            .unwrap();

        // the forward read hits the primary transcript and the mature,
        // the minus-strand read at 101 matches nothing on its strand
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].ann_type, "miRNA_primary_transcript");
        assert_eq!(records[1].ann_type, "miRNA");
        assert_eq!(records[0].overlap, Some(7));
        assert_eq!(records[2].precursor_name(), "mir-rev");
    }

    #[test]
    fn test_ignore_strand() {
        let annotation = ReferenceAnnotation::from_reader(Cursor::new(GFF)).unwrap();
        let intersector = AnnotationIntersector::new(&annotation).unwrap().with_same_strand(false);
        let records = intersector
            .intersect_records(&[interval(101, "ACGTACGT", '-')])
            .unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_bed_edge_is_half_open() {
        let annotation = ReferenceAnnotation::from_reader(Cursor::new(GFF)).unwrap();
        let feature = &annotation.on_chrom("chr1")[0];
        // 0-based start 180 begins after the 1-based feature end 180
        assert_eq!(overlap_len(&interval(180, "ACGT", '+'), feature), 0);
        assert_eq!(overlap_len(&interval(179, "ACGT", '+'), feature), 1);
    }

    #[test]
    fn test_indexed_hits_match_full_scan() {
        // nested and adjacent features on both strands, some zero-overlap edges
        let mut gff = String::new();
        for i in 0..60i64 {
            let start = 1 + (i * 37) % 900;
            let end = start + 5 + (i * 13) % 120;
            let strand = if i % 3 == 0 { '-' } else { '+' };
            gff.push_str(&format!(
                "chr1\t.\tmiRNA_primary_transcript\t{start}\t{end}\t.\t{strand}\t.\tID=MI{i};Name=mir-{i}\n"
            ));
        }
        let annotation = ReferenceAnnotation::from_reader(Cursor::new(gff)).unwrap();
        let intervals: Vec<IntervalRecord> = (0..80i64)
            .map(|i| interval((i * 53) % 1000, "ACGTACGTACGTACGTACGT", if i % 2 == 0 { '+' } else { '-' }))
            .collect();

        let intersector = AnnotationIntersector::new(&annotation).unwrap();
        let indexed = intersector.intersect_records(&intervals).unwrap();

        let mut scanned = Vec::new();
        for (idx, iv) in intervals.iter().enumerate() {
            for feature in annotation.on_chrom("chr1") {
                let overlap = overlap_len(iv, feature);
                if feature.strand == iv.strand && overlap > 0 {
                    scanned.push(IntersectedRecord::from_overlap(iv, feature, overlap, idx + 1).unwrap());
                }
            }
        }
        assert!(!scanned.is_empty());
        assert_eq!(indexed, scanned);
    }

    #[test]
    fn test_encoded_precursor_name_decoded() {
        let gff = "chr1\t.\tmiRNA_primary_transcript\t100\t180\t.\t+\t.\tID=MI1;Name=mir%2C21\n";
        let annotation = ReferenceAnnotation::from_reader(Cursor::new(gff)).unwrap();
        let intersector = AnnotationIntersector::new(&annotation).unwrap();
        let records = intersector
            .intersect_records(&[interval(101, "ACGTACGT", '+')])
            .unwrap();
        assert_eq!(records[0].attributes, "ID=MI1;Name=mir%2C21");
        assert_eq!(records[0].precursor_name(), "mir,21");
    }
}
