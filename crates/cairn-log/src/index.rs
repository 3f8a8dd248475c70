//! In-memory position index.

use std::collections::hash_map::{self, HashMap};
use std::io::{self, Read};

use cairn_types::{Addr, Score};

use crate::scan::FrameScanner;

/// Mapping from score to payload address, plus the append cursor.
///
/// The cursor is the offset where the next frame goes. It only moves when
/// a new score is recorded (or when a scan finishes), never on a duplicate.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Index {
    entries: HashMap<Score, Addr>,
    cursor: u64,
}

impl Index {
    /// Create an empty index with cursor 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild an index by scanning a whole data file.
    ///
    /// A torn trailing frame is ignored; the cursor ends after the last
    /// complete frame.
    pub fn rebuild_from<R: Read>(reader: R) -> io::Result<Self> {
        let mut index = Self::new();
        index.scan_into(&mut FrameScanner::new(reader))?;
        Ok(index)
    }

    pub(crate) fn from_parts(entries: HashMap<Score, Addr>, cursor: u64) -> Self {
        Self { entries, cursor }
    }

    /// Record every frame `scanner` yields and move the cursor to the end of
    /// the scanned region. Returns the number of newly indexed scores.
    pub fn scan_into<R: Read>(&mut self, scanner: &mut FrameScanner<R>) -> io::Result<usize> {
        let mut added = 0;
        for frame in scanner.by_ref() {
            let frame = frame?;
            if self.record(frame.score, frame.addr) {
                added += 1;
            }
        }
        // Duplicate frames in the log still occupy bytes.
        self.cursor = self.cursor.max(scanner.valid_len());
        Ok(added)
    }

    /// Look up the payload address for `score`.
    pub fn lookup(&self, score: &Score) -> Option<Addr> {
        self.entries.get(score).copied()
    }

    /// Register `score` at `addr`.
    ///
    /// Returns `false` and changes nothing if the score is already present.
    pub fn record(&mut self, score: Score, addr: Addr) -> bool {
        match self.entries.entry(score) {
            hash_map::Entry::Occupied(_) => false,
            hash_map::Entry::Vacant(slot) => {
                slot.insert(addr);
                self.cursor = self.cursor.max(addr.end());
                true
            }
        }
    }

    pub fn contains(&self, score: &Score) -> bool {
        self.entries.contains_key(score)
    }

    /// Number of distinct scores indexed.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Offset where the next frame will be appended.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Iterate over `(score, addr)` pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&Score, &Addr)> {
        self.entries.iter()
    }
}
