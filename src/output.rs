/// mirGFF3 writer for a [`ResultStore`]
use crate::gff::AttrFormat;
use crate::store::ResultStore;
use anyhow::{Context, Result};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub const MIRGFF_VERSION: &str = "1.2";

/// Write the header and all lines, ordered by chrom then start
pub fn write_gff<W: Write>(writer: &mut W, store: &ResultStore, database: &str, samples: &[&str]) -> Result<usize> {
    writeln!(writer, "##gff-version 3")?;
    writeln!(writer, "## mirGFF3. VERSION {MIRGFF_VERSION}")?;
    writeln!(writer, "## source-ontology: {database}")?;
    writeln!(writer, "## COLDATA: {}", samples.join(","))?;

    let mut lines = 0usize;
    for by_start in store.values() {
        for entries in by_start.values() {
            for entry in entries {
                writeln!(writer, "{}", entry.line)?;
                lines += 1;
            }
        }
    }
    Ok(lines)
}

/// Output path for a sample: `<out_dir>/<sample>.gff` (or `.gtf`)
pub fn output_path(out_dir: &Path, sample: &str, format: AttrFormat) -> PathBuf {
    out_dir.join(format!("{sample}.{}", format.extension()))
}

/// Write to a temp file in the destination directory, then move it in place
pub fn write_gff_file(path: &Path, store: &ResultStore, database: &str, sample: &str) -> Result<usize> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let temp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;

    let lines = {
        let mut writer = BufWriter::new(temp.as_file());
        let lines = write_gff(&mut writer, store, database, &[sample])?;
        writer.flush()?;
        lines
    };

    temp.persist(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::IsomirEntry;

    fn entry(line: &str) -> IsomirEntry {
        IsomirEntry {
            uid: line.into(),
            chrom: "c".into(),
            counts: 1,
            sample: "s1".into(),
            line: line.into(),
        }
    }

    #[test]
    fn test_lines_sorted_by_chrom_and_start() {
        let mut store = ResultStore::new();
        store.entry("mir-b".into()).or_default().insert(3, vec![entry("b3")]);
        let a = store.entry("mir-a".into()).or_default();
        a.insert(9, vec![entry("a9")]);
        a.insert(2, vec![entry("a2-x"), entry("a2-y")]);

        let mut out = Vec::new();
        let n = write_gff(&mut out, &store, "miRBasev22", &["s1"]).unwrap();
        assert_eq!(n, 4);

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "##gff-version 3");
        assert_eq!(lines[2], "## source-ontology: miRBasev22");
        assert_eq!(lines[3], "## COLDATA: s1");
        assert_eq!(&lines[4..], &["a2-x", "a2-y", "a9", "b3"]);
    }

    #[test]
    fn test_write_file_in_place() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = output_path(dir.path(), "s1", AttrFormat::Gtf);
        assert!(path.ends_with("s1.gtf"));
        let n = write_gff_file(&path, &ResultStore::new(), "db", "s1").unwrap();
        assert_eq!(n, 0);
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("##gff-version 3\n"));
    }
}
