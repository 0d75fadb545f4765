/// Typed failures for fixed-schema records
///
/// Alignment lines and intersected records are positional; these errors
/// replace out-of-range field access with something a caller can report.
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("line {line}: expected at least {expected} fields, found {found}")]
    TooFewFields {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("line {line}: field '{field}' is not an integer: {value:?}")]
    InvalidInteger {
        line: usize,
        field: &'static str,
        value: String,
    },

    #[error("line {line}: invalid strand {value:?}")]
    InvalidStrand { line: usize, value: String },
}
