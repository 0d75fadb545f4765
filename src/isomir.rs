/// isomiR descriptor and the read-versus-precursor comparison that
/// produces substitutions, 3' additions and the CIGAR string.
use crate::gff::Feature;
use crate::reference::{MatureCoord, MatureMap, PrecursorMap};
use crate::sequence::read_uid;
use anyhow::{anyhow, Result};

/// Largest 5'/3' offset from a mature end still called an isomiR of it
pub const MAX_END_SHIFT: i64 = 4;

/// A mismatch between read and precursor, position 1-based within the read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    pub position: usize,
    pub read: char,
    pub reference: char,
}

impl Substitution {
    /// SNV class by position in the read
    pub fn class(&self) -> &'static str {
        match self.position {
            2..=7 => "iso_snv_seed",
            8 => "iso_snv_central_offset",
            9..=12 => "iso_snv_central",
            13..=17 => "iso_snv_central_supp",
            _ => "iso_snv",
        }
    }
}

/// Output of [`tune`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Variants {
    pub subs: Vec<Substitution>,
    pub add: String,
    pub cigar: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Match,
    Mismatch { read: u8, reference: u8 },
    /// Read base beyond either end of the precursor
    Insertion(u8),
}

/// Pair each read base with the precursor base at `start + i`
fn align_columns(seq: &[u8], precursor: &[u8], start: i64) -> Vec<Column> {
    seq.iter()
        .enumerate()
        .map(|(i, &read)| {
            let pos = start + i as i64;
            let reference = if pos < 0 {
                None
            } else {
                precursor.get(pos as usize).copied()
            };
            match reference {
                Some(r) if r.eq_ignore_ascii_case(&read) => Column::Match,
                Some(r) => Column::Mismatch {
                    read: read.to_ascii_uppercase(),
                    reference: r.to_ascii_uppercase(),
                },
                None => Column::Insertion(read.to_ascii_uppercase()),
            }
        })
        .collect()
}

fn push_run(cigar: &mut String, op: char, run: usize) {
    if run > 0 {
        cigar.push_str(&run.to_string());
        cigar.push(op);
    }
}

/// Compare a read with its precursor starting at 0-based offset `start`.
///
/// The longest 3' run of mismatched or unaligned read bases is the
/// non-templated addition; other mismatches are substitutions. In the
/// CIGAR, matches and insertions are run-length encoded and each mismatch
/// is written as the read base.
pub fn tune(seq: &str, precursor: &str, start: i64) -> Variants {
    let columns = align_columns(seq.as_bytes(), precursor.as_bytes(), start);

    let add_from = columns
        .iter()
        .rposition(|c| matches!(c, Column::Match))
        .map_or(0, |i| i + 1);

    let mut variants = Variants::default();
    let mut read_pos = 0usize;
    let mut run: (char, usize) = ('M', 0);

    for (i, col) in columns.iter().enumerate() {
        let op = match *col {
            Column::Match => 'M',
            Column::Insertion(_) => 'I',
            Column::Mismatch { read, .. } => read as char,
        };
        read_pos += 1;

        match *col {
            Column::Mismatch { read: b, .. } | Column::Insertion(b) if i >= add_from => {
                variants.add.push(b as char)
            }
            Column::Mismatch { read, reference } => variants.subs.push(Substitution {
                position: read_pos,
                read: read as char,
                reference: reference as char,
            }),
            _ => {}
        }

        if matches!(op, 'M' | 'I') && op == run.0 {
            run.1 += 1;
            continue;
        }
        push_run(&mut variants.cigar, run.0, run.1);
        if matches!(op, 'M' | 'I') {
            run = (op, 1);
        } else {
            variants.cigar.push(op);
            run = ('M', 0);
        }
    }
    push_run(&mut variants.cigar, run.0, run.1);

    variants
}

/// An isomiR: a read placed on its precursor plus its variation
#[derive(Debug, Clone, Default)]
pub struct Isomir {
    /// 0-based offset of the read on the precursor
    pub start: i64,
    pub end: i64,
    pub subs: Vec<Substitution>,
    pub add: String,
    pub cigar: String,
    /// Mature miRNA this read was assigned to
    pub mirna: Option<String>,
    /// Read start minus mature start (negative: extends upstream)
    pub t5: i64,
    /// Template end minus mature end (positive: extends downstream)
    pub t3: i64,
}

impl Isomir {
    pub fn set_pos(&mut self, start: i64, len: usize) {
        self.start = start;
        self.end = start + len as i64 - 1;
    }

    pub fn apply(&mut self, variants: Variants) {
        self.subs = variants.subs;
        self.add = variants.add;
        self.cigar = variants.cigar;
    }

    /// Assign the first mature whose ends lie within [`MAX_END_SHIFT`] of
    /// the read's. Returns whether one matched.
    pub fn annotate(&mut self, read_len: usize, matures: &[MatureCoord]) -> bool {
        let (rs, re) = template_span(self.start, read_len, self.add.len());
        for mature in matures {
            let t5 = rs - mature.start;
            let t3 = re - mature.end;
            if t5.abs() <= MAX_END_SHIFT && t3.abs() <= MAX_END_SHIFT {
                self.mirna = Some(mature.name.clone());
                self.t5 = t5;
                self.t3 = t3;
                return true;
            }
        }
        false
    }

    /// Comma-separated isomiR type, `NA` for a canonical read
    pub fn format_variant(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if self.t5 != 0 {
            parts.push(format!("iso_5p:{:+}", self.t5));
        }
        if self.t3 != 0 {
            parts.push(format!("iso_3p:{:+}", self.t3));
        }
        if !self.add.is_empty() {
            parts.push(format!("iso_add3p:{}", self.add.len()));
        }
        for class in [
            "iso_snv_seed",
            "iso_snv_central_offset",
            "iso_snv_central",
            "iso_snv_central_supp",
            "iso_snv",
        ] {
            if self.subs.iter().any(|s| s.class() == class) {
                parts.push(class.to_string());
            }
        }

        if parts.is_empty() {
            "NA".to_string()
        } else {
            parts.join(",")
        }
    }
}

/// 1-based read start and templated end on the precursor
fn template_span(start: i64, read_len: usize, add_len: usize) -> (i64, i64) {
    let rs = start + 1;
    let re = rs + read_len.saturating_sub(add_len) as i64 - 1;
    (rs, re)
}

fn slice_upper(seq: &str, from: i64, to: i64) -> String {
    if from < 0 || to < from {
        return String::new();
    }
    seq.get(from as usize..(to as usize).min(seq.len()))
        .unwrap_or("")
        .to_ascii_uppercase()
}

fn or_zero(s: String) -> String {
    if s.is_empty() {
        "0".to_string()
    } else {
        s
    }
}

/// Nucleotide-level description of how a read differs from its mature
/// miRNA: `iso_5p:<nt>,iso_3p:<nt>,iso_add3p:<nt>,iso_snv:<pos><ref>><alt>`.
/// Bases present in the read but not the mature are uppercase; bases of the
/// mature missing from the read are lowercase.
pub fn nucleotide_changes(seq: &str, precursor: &str, start: i64, mature: Option<&MatureCoord>) -> Result<String> {
    let variants = tune(seq, precursor, start);
    let template_len = seq.len().saturating_sub(variants.add.len()) as i64;
    let (rs, re) = template_span(start, seq.len(), variants.add.len());

    let (t5, t3) = match mature {
        Some(m) => {
            let d5 = rs - m.start;
            let t5 = if d5 < 0 {
                slice_upper(seq, 0, -d5)
            } else {
                slice_upper(precursor, m.start - 1, m.start - 1 + d5).to_ascii_lowercase()
            };
            let d3 = re - m.end;
            let t3 = if d3 > 0 {
                slice_upper(seq, template_len - d3, template_len)
            } else {
                slice_upper(precursor, re, re - d3).to_ascii_lowercase()
            };
            (t5, t3)
        }
        None => (String::new(), String::new()),
    };

    let snv = variants
        .subs
        .iter()
        .map(|s| format!("{}{}>{}", s.position, s.reference, s.read))
        .collect::<Vec<_>>()
        .join("-");

    Ok(format!(
        "iso_5p:{},iso_3p:{},iso_add3p:{},iso_snv:{}",
        or_zero(t5),
        or_zero(t3),
        or_zero(variants.add),
        or_zero(snv)
    ))
}

/// Compute the `Changes` value for an assembled feature. The read is
/// recovered from its UID so this works when `Read` holds a query name.
pub fn variant_with_nt(feature: &Feature, precursors: &PrecursorMap, matures: &MatureMap) -> Result<String> {
    let attrs = &feature.attributes;
    let uid = attrs
        .get("UID")
        .ok_or_else(|| anyhow!("Feature has no UID attribute"))?;
    let parent = attrs
        .get("Parent")
        .ok_or_else(|| anyhow!("Feature has no Parent attribute"))?;
    let seq = read_uid(uid)?;
    let precursor = precursors
        .get(parent)
        .ok_or_else(|| anyhow!("Unknown precursor {}", parent))?;
    let mature = attrs.get("Name").and_then(|name| matures.find(parent, name));

    nucleotide_changes(&seq, precursor, feature.start, mature)
}
