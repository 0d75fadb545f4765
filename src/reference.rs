/// Reference data: precursor sequences and the miRBase-style GFF3
/// annotation of primary transcripts and mature miRNAs.
use crate::alignment::open_input;
use crate::gff::{escape, AttrFormat, Attributes};
use anyhow::{anyhow, bail, Context, Result};
use noodles::gff::feature::record::{Phase, Strand};
use noodles::gff::feature::RecordBuf;
use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

pub const PRIMARY_TRANSCRIPT: &str = "miRNA_primary_transcript";
pub const MATURE: &str = "miRNA";

/// Precursor (hairpin) name to sequence
#[derive(Debug, Default, Clone)]
pub struct PrecursorMap {
    seqs: HashMap<String, String>,
}

impl PrecursorMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a precursor, normalizing to uppercase DNA
    pub fn insert(&mut self, name: impl Into<String>, seq: &str) {
        let seq = seq.to_ascii_uppercase().replace('U', "T");
        self.seqs.insert(name.into(), seq);
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.seqs.get(name).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.seqs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seqs.is_empty()
    }

    /// Load a FASTA file (plain or gzip/bgzip). When `species` is set only
    /// records whose name starts with that prefix are kept.
    pub fn from_fasta<P: AsRef<Path>>(path: P, species: Option<&str>) -> Result<Self> {
        let path = path.as_ref();
        let reader = open_input(path)?;
        Self::from_reader(reader, species)
            .with_context(|| format!("Failed to read precursors from {}", path.display()))
    }

    pub fn from_reader<R: BufRead>(reader: R, species: Option<&str>) -> Result<Self> {
        let mut map = PrecursorMap::new();
        let mut current: Option<(String, String)> = None;

        let keep = |name: &str| species.map_or(true, |sps| name.starts_with(sps));

        for line in reader.lines() {
            let line = line?;
            let trimmed = line.trim();

            if let Some(header) = trimmed.strip_prefix('>') {
                if let Some((name, seq)) = current.take() {
                    if keep(&name) {
                        map.insert(name, &seq);
                    }
                }
                let name = header.split_whitespace().next().unwrap_or("").to_string();
                if name.is_empty() {
                    bail!("FASTA record with empty name");
                }
                current = Some((name, String::new()));
            } else if !trimmed.is_empty() {
                match current.as_mut() {
                    Some((_, seq)) => seq.push_str(trimmed),
                    None => bail!("FASTA sequence data before first header"),
                }
            }
        }

        if let Some((name, seq)) = current {
            if keep(&name) {
                map.insert(name, &seq);
            }
        }

        Ok(map)
    }
}

/// Attribute tags carried from miRBase GFF3 features
const ANNOTATION_TAGS: [&str; 4] = ["ID", "Alias", "Name", "Derives_from"];

/// One feature of the reference annotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationFeature {
    pub chrom: String,
    pub source: String,
    pub feature_type: String,
    /// 1-based inclusive
    pub start: i64,
    pub end: i64,
    pub score: String,
    pub strand: char,
    pub phase: String,
    /// Decoded attribute values, in tag order
    pub attributes: Attributes,
}

impl AnnotationFeature {
    pub fn from_record_buf(record: &RecordBuf) -> Result<Self> {
        let start = i64::try_from(record.start().get()).map_err(|_| anyhow!("GFF3 start out of range"))?;
        let end = i64::try_from(record.end().get()).map_err(|_| anyhow!("GFF3 end out of range"))?;

        let attrs = record.attributes();
        let mut attributes = Attributes::new();
        for tag in ANNOTATION_TAGS {
            if let Some(value) = get_record_buf_attribute(attrs, tag.as_bytes()) {
                attributes.push(tag, value);
            }
        }

        Ok(AnnotationFeature {
            chrom: record.reference_sequence_name().to_string(),
            source: record.source().to_string(),
            feature_type: record.ty().to_string(),
            start,
            end,
            score: record
                .score()
                .map(|s| s.to_string())
                .unwrap_or_else(|| ".".to_string()),
            strand: strand_to_char(record.strand()),
            phase: phase_to_str(record.phase()).to_string(),
            attributes,
        })
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key)
    }

    /// Attributes re-encoded as a GFF3 column (`ID=..;Name=..`)
    pub fn attribute_column(&self) -> String {
        self.attributes
            .keys()
            .filter_map(|key| {
                self.attributes
                    .get(key)
                    .map(|value| format!("{key}={}", escape(value, AttrFormat::Gff).replace(',', "%2C")))
            })
            .collect::<Vec<_>>()
            .join(";")
    }
}

fn get_record_buf_attribute(attrs: &noodles::gff::feature::record_buf::Attributes, key: &[u8]) -> Option<String> {
    let value = attrs.get(key)?;
    value.iter().next().map(|v| v.to_string())
}

fn strand_to_char(strand: Strand) -> char {
    match strand {
        Strand::Forward => '+',
        Strand::Reverse => '-',
        Strand::None => '.',
        Strand::Unknown => '?',
    }
}

fn phase_to_str(phase: Option<Phase>) -> &'static str {
    match phase {
        Some(Phase::Zero) => "0",
        Some(Phase::One) => "1",
        Some(Phase::Two) => "2",
        None => ".",
    }
}

/// Reference annotation grouped by chromosome, file order preserved
#[derive(Debug, Default, Clone)]
pub struct ReferenceAnnotation {
    by_chrom: HashMap<String, Vec<AnnotationFeature>>,
    order: Vec<(String, usize)>,
}

impl ReferenceAnnotation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, feature: AnnotationFeature) {
        let bucket = self.by_chrom.entry(feature.chrom.clone()).or_default();
        self.order.push((feature.chrom.clone(), bucket.len()));
        bucket.push(feature);
    }

    pub fn from_gff<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let reader = open_input(path)?;
        Self::from_reader(reader)
            .with_context(|| format!("Failed to read annotation from {}", path.display()))
    }

    /// Read GFF3 records; directives and comments are skipped by the reader
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut reader = noodles::gff::io::Reader::new(reader);
        let mut annotation = ReferenceAnnotation::new();
        for result in reader.record_bufs() {
            let record = result?;
            annotation.push(AnnotationFeature::from_record_buf(&record)?);
        }
        Ok(annotation)
    }

    /// Chromosomes with at least one feature, in no particular order
    pub fn chroms(&self) -> impl Iterator<Item = &str> {
        self.by_chrom.keys().map(|k| k.as_str())
    }

    /// Features on a chromosome, in file order
    pub fn on_chrom(&self, chrom: &str) -> &[AnnotationFeature] {
        self.by_chrom.get(chrom).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// All features in file order
    pub fn iter(&self) -> impl Iterator<Item = &AnnotationFeature> {
        self.order
            .iter()
            .map(move |(chrom, idx)| &self.by_chrom[chrom][*idx])
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Mature miRNA position inside its precursor, 1-based inclusive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatureCoord {
    pub name: String,
    pub start: i64,
    pub end: i64,
}

/// Precursor name to its mature miRNAs, in annotation order
#[derive(Debug, Default, Clone)]
pub struct MatureMap {
    by_precursor: HashMap<String, Vec<MatureCoord>>,
}

impl MatureMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, precursor: impl Into<String>, mature: MatureCoord) {
        self.by_precursor
            .entry(precursor.into())
            .or_default()
            .push(mature);
    }

    pub fn get(&self, precursor: &str) -> &[MatureCoord] {
        self.by_precursor
            .get(precursor)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn find(&self, precursor: &str, mature: &str) -> Option<&MatureCoord> {
        self.get(precursor).iter().find(|m| m.name == mature)
    }

    /// Project `miRNA` features onto the primary transcript they derive from.
    /// Minus-strand coordinates are mirrored so positions read 5' to 3'.
    pub fn from_annotation(annotation: &ReferenceAnnotation) -> Self {
        let primaries: HashMap<&str, &AnnotationFeature> = annotation
            .iter()
            .filter(|f| f.feature_type == PRIMARY_TRANSCRIPT)
            .filter_map(|f| f.attribute("ID").map(|id| (id, f)))
            .collect();

        let mut map = MatureMap::new();
        for feature in annotation.iter().filter(|f| f.feature_type == MATURE) {
            let Some(parent_id) = feature.attribute("Derives_from") else {
                continue;
            };
            let Some(primary) = primaries.get(parent_id) else {
                log::warn!(
                    "Mature feature derives from unknown primary transcript {}",
                    parent_id
                );
                continue;
            };
            let Some(precursor) = primary.attribute("Name") else {
                continue;
            };
            let name = feature
                .attribute("Name")
                .or_else(|| feature.attribute("ID"))
                .unwrap_or("NA")
                .to_string();

            let (start, end) = if primary.strand == '-' {
                (primary.end - feature.end + 1, primary.end - feature.start + 1)
            } else {
                (feature.start - primary.start + 1, feature.end - primary.start + 1)
            };
            map.insert(precursor, MatureCoord { name, start, end });
        }
        map
    }
}
