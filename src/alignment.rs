use crate::error::RecordError;
use anyhow::{Context, Result};
use noodles::bgzf;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Column layout of a Manatee alignment line
const NAME_COL: usize = 0;
const STRAND_COL: usize = 1;
const CHROM_COL: usize = 2;
const POS_COL: usize = 3;
const SEQ_COL: usize = 9;
const COUNT_COL: usize = 14;
const MIN_FIELDS: usize = COUNT_COL + 1;

/// Open a file and auto-detect bgzip/gzip compression, returning a boxed BufRead
pub fn open_input<P: AsRef<Path>>(path: P) -> Result<Box<dyn BufRead>> {
    let path = path.as_ref();
    let file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;

    let is_compressed = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext == "gz" || ext == "bgz")
        .unwrap_or(false);

    if is_compressed {
        Ok(Box::new(BufReader::new(bgzf::io::reader::Reader::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// One aligned read from a Manatee output file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentLine {
    pub query_name: String,
    pub strand: char,
    pub chrom: String,
    /// 1-based leftmost position
    pub position: i64,
    /// Read sequence as reported by the aligner
    pub sequence: String,
    /// Raw count column, carried through untouched
    pub count: String,
}

impl AlignmentLine {
    /// True for header lines (`@...`)
    pub fn is_header(line: &str) -> bool {
        line.starts_with('@')
    }

    /// Parse a whitespace-delimited data line. `line_no` is 1-based and only
    /// used for error reporting.
    pub fn parse(line: &str, line_no: usize) -> Result<Self, RecordError> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < MIN_FIELDS {
            return Err(RecordError::TooFewFields {
                line: line_no,
                expected: MIN_FIELDS,
                found: fields.len(),
            });
        }

        let position = fields[POS_COL]
            .parse()
            .map_err(|_| RecordError::InvalidInteger {
                line: line_no,
                field: "position",
                value: fields[POS_COL].to_string(),
            })?;

        let strand = match fields[STRAND_COL] {
            "+" => '+',
            "-" => '-',
            other => {
                return Err(RecordError::InvalidStrand {
                    line: line_no,
                    value: other.to_string(),
                })
            }
        };

        Ok(AlignmentLine {
            query_name: fields[NAME_COL].to_string(),
            strand,
            chrom: fields[CHROM_COL].to_string(),
            position,
            sequence: fields[SEQ_COL].to_string(),
            count: fields[COUNT_COL].to_string(),
        })
    }

    pub fn is_reverse(&self) -> bool {
        self.strand == '-'
    }
}

/// Streaming reader over the data lines of a Manatee file
pub struct AlignmentReader<R: BufRead> {
    reader: R,
    line_no: usize,
    buf: String,
}

impl<R: BufRead> AlignmentReader<R> {
    pub fn new(reader: R) -> Self {
        AlignmentReader {
            reader,
            line_no: 0,
            buf: String::new(),
        }
    }

    /// Next data line, skipping headers and blank lines
    pub fn read_record(&mut self) -> Result<Option<AlignmentLine>> {
        loop {
            self.buf.clear();
            if self.reader.read_line(&mut self.buf)? == 0 {
                return Ok(None);
            }
            self.line_no += 1;

            let line = self.buf.trim_end();
            if AlignmentLine::is_header(line) || line.trim().is_empty() {
                continue;
            }
            return Ok(Some(AlignmentLine::parse(line, self.line_no)?));
        }
    }
}

impl<R: BufRead> Iterator for AlignmentReader<R> {
    type Item = Result<AlignmentLine>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_record().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn manatee_line(name: &str, strand: &str, chrom: &str, pos: i64, seq: &str, count: u32) -> String {
        format!("{name}\t{strand}\t{chrom}\t{pos}\t255\t22M\t*\t0\t0\t{seq}\t*\t0\t0\t0\t{count}")
    }

    #[test]
    fn test_parse_fixed_columns() {
        let line = manatee_line("read1", "-", "chr9", 94175962, "ACGTACGT", 12);
        let rec = AlignmentLine::parse(&line, 1).unwrap();
        assert_eq!(rec.query_name, "read1");
        assert!(rec.is_reverse());
        assert_eq!(rec.chrom, "chr9");
        assert_eq!(rec.position, 94175962);
        assert_eq!(rec.sequence, "ACGTACGT");
        assert_eq!(rec.count, "12");
    }

    #[test]
    fn test_too_few_fields() {
        let err = AlignmentLine::parse("read1\t+\tchr1\t10", 7).unwrap_err();
        assert_eq!(
            err,
            RecordError::TooFewFields {
                line: 7,
                expected: 15,
                found: 4
            }
        );
    }

    #[test]
    fn test_bad_position() {
        let line = manatee_line("r", "+", "chr1", 0, "ACGT", 1).replace("\t0\t255", "\tabc\t255");
        assert!(matches!(
            AlignmentLine::parse(&line, 2),
            Err(RecordError::InvalidInteger { line: 2, .. })
        ));
    }

    #[test]
    fn test_unknown_strand_rejected() {
        let line = manatee_line("r", ".", "chr1", 10, "ACGT", 1);
        assert_eq!(
            AlignmentLine::parse(&line, 4).unwrap_err(),
            RecordError::InvalidStrand {
                line: 4,
                value: ".".to_string()
            }
        );
    }

    #[test]
    fn test_reader_skips_headers_and_blank_lines() {
        let text = format!(
            "@HD\tVN:1.0\n{}\n\n{}\n",
            manatee_line("a", "+", "chr1", 5, "ACGT", 1),
            manatee_line("b", "-", "chr2", 9, "TTGCA", 3)
        );
        let records: Vec<AlignmentLine> = AlignmentReader::new(Cursor::new(text))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].query_name, "a");
        assert_eq!(records[1].chrom, "chr2");
    }
}
