/// mirGFF3 feature lines and their ordered attribute column
use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use std::fmt;

/// Key/value separator used in the attribute column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttrFormat {
    /// `key=value`
    #[default]
    Gff,
    /// `key value`
    Gtf,
}

impl AttrFormat {
    /// `gtf` selects space-separated attributes, anything else `=`
    pub fn from_out_format(format: &str) -> Self {
        if format.eq_ignore_ascii_case("gtf") {
            AttrFormat::Gtf
        } else {
            AttrFormat::Gff
        }
    }

    pub fn separator(self) -> char {
        match self {
            AttrFormat::Gff => '=',
            AttrFormat::Gtf => ' ',
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            AttrFormat::Gff => "gff",
            AttrFormat::Gtf => "gtf",
        }
    }
}

pub(crate) fn escape(value: &str, format: AttrFormat) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '%' => out.push_str("%25"),
            ';' => out.push_str("%3B"),
            '\t' => out.push_str("%09"),
            '\n' => out.push_str("%0A"),
            '\r' => out.push_str("%0D"),
            '=' if format == AttrFormat::Gff => out.push_str("%3D"),
            _ => out.push(c),
        }
    }
    out
}

pub(crate) fn unescape(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let decoded = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            if let Some(b) = decoded {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Ordered attribute builder. Keys keep insertion order; setting an existing
/// key replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    pairs: IndexMap<String, String>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: &str, value: impl ToString) -> &mut Self {
        self.pairs.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.push(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs.get(key).map(|s| s.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.pairs.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Serialize as `k<sep>v; k<sep>v;`
    pub fn render(&self, format: AttrFormat) -> String {
        let sep = format.separator();
        let mut out = String::new();
        for (i, (key, value)) in self.pairs.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            out.push_str(key);
            out.push(sep);
            out.push_str(&escape(value, format));
            out.push(';');
        }
        out
    }

    /// Parse either separator style; each pair is split at whichever of
    /// `=` or space comes first.
    pub fn parse(column: &str) -> Result<Self> {
        let mut attrs = Attributes::new();
        for pair in column.split(';') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }
            let split_at = match (pair.find('='), pair.find(' ')) {
                (Some(e), Some(s)) => e.min(s),
                (Some(e), None) => e,
                (None, Some(s)) => s,
                (None, None) => bail!("Attribute without value: {}", pair),
            };
            let key = &pair[..split_at];
            let value = pair[split_at + 1..].trim_start();
            attrs.push(key, unescape(value));
        }
        Ok(attrs)
    }
}

/// A 9-column annotation line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feature {
    pub seqid: String,
    /// Column 2: the miRNA database name
    pub source: String,
    /// Column 3: `isomiR` or `ref_miRNA`
    pub feature_type: String,
    pub start: i64,
    pub end: i64,
    pub score: String,
    pub strand: char,
    pub phase: String,
    pub attributes: Attributes,
}

impl Feature {
    pub fn parse(line: &str) -> Result<Self> {
        let cols: Vec<&str> = line.trim_end_matches(['\n', '\r']).splitn(9, '\t').collect();
        if cols.len() < 9 {
            bail!("Feature line has {} columns, expected 9: {}", cols.len(), line);
        }
        Ok(Feature {
            seqid: cols[0].to_string(),
            source: cols[1].to_string(),
            feature_type: cols[2].to_string(),
            start: cols[3]
                .parse()
                .with_context(|| format!("Invalid feature start: {}", cols[3]))?,
            end: cols[4]
                .parse()
                .with_context(|| format!("Invalid feature end: {}", cols[4]))?,
            score: cols[5].to_string(),
            strand: cols[6].chars().next().unwrap_or('.'),
            phase: cols[7].to_string(),
            attributes: Attributes::parse(cols[8])?,
        })
    }

    pub fn render(&self, format: AttrFormat) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.seqid,
            self.source,
            self.feature_type,
            self.start,
            self.end,
            self.score,
            self.strand,
            self.phase,
            self.attributes.render(format)
        )
    }

    /// Parse and re-render, giving canonical spacing and escaping
    pub fn normalize(line: &str, format: AttrFormat) -> Result<String> {
        Ok(Feature::parse(line)?.render(format))
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(AttrFormat::Gff))
    }
}
