/// Run configuration and the context handed to each pipeline stage
use crate::gff::AttrFormat;
use crate::reference::{MatureMap, PrecursorMap};
use std::path::{Path, PathBuf};

/// Options that shape the produced annotation
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory for the interim interval file and the output
    pub out_dir: PathBuf,
    /// Attribute key/value separator (`gtf` -> space, otherwise `=`)
    pub format: AttrFormat,
    /// Append the nucleotide-level `Changes` attribute
    pub add_extra: bool,
    /// Report the query name in `Read` instead of the sequence
    pub keep_name: bool,
    /// Database name written to column 2
    pub database: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            out_dir: PathBuf::from("."),
            format: AttrFormat::Gff,
            add_extra: false,
            keep_name: false,
            database: "miRBase".to_string(),
        }
    }
}

/// Everything a stage needs for one input file
pub struct RunContext<'a> {
    pub config: &'a Config,
    pub precursors: &'a PrecursorMap,
    pub matures: &'a MatureMap,
    /// Sample name, the input's file stem
    pub sample: String,
}

impl<'a> RunContext<'a> {
    pub fn new(config: &'a Config, precursors: &'a PrecursorMap, matures: &'a MatureMap, sample: impl Into<String>) -> Self {
        RunContext {
            config,
            precursors,
            matures,
            sample: sample.into(),
        }
    }

    pub fn database(&self) -> &str {
        &self.config.database
    }
}

/// Sample name for an input file: its base name without the last extension
pub fn sample_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "sample".to_string())
}
