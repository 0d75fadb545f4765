/// Interval export: Manatee alignments to a 7-column BED-like file
///
/// Columns: chrom, start, end, name, sequence, strand, count. Sequences are
/// always written in reference (+) orientation.
use crate::alignment::{AlignmentLine, AlignmentReader};
use crate::error::RecordError;
use crate::sequence::{has_ambiguous_base, reverse_complement};
use anyhow::{Context, Result};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const INTERVAL_FIELDS: usize = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalRecord {
    pub chrom: String,
    pub start: i64,
    pub end: i64,
    pub name: String,
    pub sequence: String,
    pub strand: char,
    pub count: String,
}

impl IntervalRecord {
    /// Build an interval from an alignment, or `None` if the read carries an
    /// ambiguous base.
    pub fn from_alignment(aln: &AlignmentLine) -> Option<Self> {
        let sequence = if aln.is_reverse() {
            reverse_complement(&aln.sequence)
        } else {
            aln.sequence.clone()
        };

        if has_ambiguous_base(&sequence) {
            return None;
        }

        let end = aln.position + sequence.len() as i64 - 1;
        Some(IntervalRecord {
            chrom: aln.chrom.clone(),
            start: aln.position,
            end,
            name: aln.query_name.clone(),
            sequence,
            strand: aln.strand,
            count: aln.count.clone(),
        })
    }

    /// Parse one line of an interval file
    pub fn parse(line: &str, line_no: usize) -> Result<Self, RecordError> {
        let fields: Vec<&str> = line.trim_end().split('\t').collect();
        if fields.len() < INTERVAL_FIELDS {
            return Err(RecordError::TooFewFields {
                line: line_no,
                expected: INTERVAL_FIELDS,
                found: fields.len(),
            });
        }
        let int = |field: &'static str, value: &str| {
            value.parse::<i64>().map_err(|_| RecordError::InvalidInteger {
                line: line_no,
                field,
                value: value.to_string(),
            })
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

        Ok(IntervalRecord {
            chrom: fields[0].to_string(),
            start: int("start", fields[1])?,
            end: int("end", fields[2])?,
            name: fields[3].to_string(),
            sequence: fields[4].to_string(),
            strand,
            count: fields[6].to_string(),
        })
    }
}

impl fmt::Display for IntervalRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.chrom, self.start, self.end, self.name, self.sequence, self.strand, self.count
        )
    }
}

/// Path of the interim interval file for an input: `<out_dir>/<basename>.bed`
pub fn interval_path(out_dir: &Path, input: &Path) -> PathBuf {
    let base = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "reads".to_string());
    out_dir.join(format!("{base}.bed"))
}

/// Stream alignments into `writer`, one interval line per kept read.
/// Returns (written, skipped).
pub fn export_intervals<R: BufRead, W: Write>(input: R, writer: &mut W) -> Result<(usize, usize)> {
    let mut written = 0usize;
    let mut skipped = 0usize;

    for aln in AlignmentReader::new(input) {
        let aln = aln?;
        match IntervalRecord::from_alignment(&aln) {
            Some(interval) => {
                writeln!(writer, "{interval}")?;
                written += 1;
            }
            None => skipped += 1,
        }
    }

    Ok((written, skipped))
}

/// Write the interval file for `input` at `bed_path`. The file is flushed
/// and closed before returning.
pub fn write_interval_file<R: BufRead>(input: R, bed_path: &Path) -> Result<(usize, usize)> {
    let file = File::create(bed_path)
        .with_context(|| format!("Failed to create interval file {}", bed_path.display()))?;
    let mut writer = BufWriter::new(file);
    let counts = export_intervals(input, &mut writer)?;
    writer.flush()?;

    log::debug!(
        "Wrote {} intervals to {} ({} reads with ambiguous bases skipped)",
        counts.0,
        bed_path.display(),
        counts.1
    );
    Ok(counts)
}

/// Read an interval file back into memory
pub fn read_interval_file(path: &Path) -> Result<Vec<IntervalRecord>> {
    let reader = crate::alignment::open_input(path)?;
    let mut records = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(IntervalRecord::parse(&line, idx + 1)?);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn manatee(name: &str, strand: &str, pos: i64, seq: &str) -> String {
        format!("{name}\t{strand}\tchr1\t{pos}\t255\t*\t*\t0\t0\t{seq}\t*\t0\t0\t0\t5\n")
    }

    #[test]
    fn test_forward_interval() {
        let mut out = Vec::new();
        let input = manatee("r1", "+", 101, "ACGTACGT");
        let (written, skipped) = export_intervals(Cursor::new(input), &mut out).unwrap();
        assert_eq!((written, skipped), (1, 0));
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "chr1\t101\t108\tr1\tACGTACGT\t+\t5\n"
        );
    }

    #[test]
    fn test_reverse_interval_is_complemented() {
        let mut out = Vec::new();
        export_intervals(Cursor::new(manatee("r2", "-", 10, "AACG")), &mut out).unwrap();
        let rec = IntervalRecord::parse(String::from_utf8(out).unwrap().trim_end(), 1).unwrap();
        assert_eq!(rec.sequence, "CGTT");
        assert_eq!(rec.strand, '-');
        assert_eq!(rec.end, 13);
    }

    #[test]
    fn test_ambiguous_reads_never_exported() {
        let input = format!(
            "@header\n{}{}{}",
            manatee("bad1", "+", 1, "ACNGT"),
            manatee("bad2", "-", 1, "NNNN"),
            manatee("ok", "+", 1, "ACGT")
        );
        let mut out = Vec::new();
        let (written, skipped) = export_intervals(Cursor::new(input), &mut out).unwrap();
        assert_eq!((written, skipped), (1, 2));
        let text = String::from_utf8(out).unwrap();
        assert!(!text.contains('N'));
        assert!(text.starts_with("chr1\t1\t4\tok"));
    }

    #[test]
    fn test_interval_path_uses_basename() {
        let p = interval_path(Path::new("/tmp/out"), Path::new("/data/sample1.sam"));
        assert_eq!(p, PathBuf::from("/tmp/out/sample1.sam.bed"));
    }

    #[test]
    fn test_parse_rejects_bad_strand() {
        let err = IntervalRecord::parse("chr1\t1\t4\tr\tACGT\t.\t3", 4).unwrap_err();
        assert!(matches!(err, RecordError::InvalidStrand { line: 4, .. }));
    }
}
