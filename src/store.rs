/// Deduplicated isomiR annotations grouped by precursor and start
use crate::analyze::{Analysis, AnalyzedRecord, DiscardReason};
use std::collections::{BTreeMap, HashMap, HashSet};

/// One annotation: (uid, chrom, counts, sample, line)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsomirEntry {
    pub uid: String,
    pub chrom: String,
    pub counts: u64,
    pub sample: String,
    pub line: String,
}

/// chrom -> start -> entries in arrival order
pub type ResultStore = BTreeMap<String, BTreeMap<i64, Vec<IsomirEntry>>>;

/// Builds a [`ResultStore`], keeping the first entry per (chrom, start, uid)
#[derive(Debug, Default)]
pub struct Aggregator {
    store: ResultStore,
    seen: HashSet<(String, i64, String)>,
    duplicates: usize,
    discarded: HashMap<DiscardReason, usize>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one analyzed record. Returns false if it was a duplicate.
    pub fn push(&mut self, record: AnalyzedRecord) -> bool {
        let key = (record.chrom, record.start, record.entry.uid.clone());
        if self.seen.contains(&key) {
            self.duplicates += 1;
            return false;
        }
        let (chrom, start, _) = &key;
        self.store
            .entry(chrom.clone())
            .or_default()
            .entry(*start)
            .or_default()
            .push(record.entry);
        self.seen.insert(key);
        true
    }

    /// Add an analysis outcome; discards are only tallied
    pub fn push_analysis(&mut self, analysis: Analysis) -> bool {
        match analysis {
            Analysis::Kept(record) => self.push(record),
            Analysis::Discarded(reason) => {
                *self.discarded.entry(reason).or_default() += 1;
                false
            }
        }
    }

    pub fn extend<I: IntoIterator<Item = AnalyzedRecord>>(&mut self, records: I) {
        for record in records {
            self.push(record);
        }
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    pub fn discarded(&self, reason: DiscardReason) -> usize {
        self.discarded.get(&reason).copied().unwrap_or(0)
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn into_store(self) -> ResultStore {
        self.store
    }
}
