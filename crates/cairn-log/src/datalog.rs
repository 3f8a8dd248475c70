use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use cairn_types::{Addr, Score};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{IoContext, LogError, LogResult};
use crate::frame::encode_frame;
use crate::index::Index;
use crate::scan::FrameScanner;

/// How an append reaches stable storage before `write` returns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// `fsync` data and metadata after every append.
    #[default]
    Full,
    /// `fdatasync` after every append; file metadata may lag.
    Data,
}

/// Open file handles plus the index describing them.
struct OpenLog {
    writer: File,
    reader: File,
    index: Index,
}

/// Append-only data file of length-prefixed, score-tagged frames.
///
/// Appends go through an append-mode handle; reads use positional I/O on a
/// separate read handle, so they only need `&self`. Callers that share a
/// `Datalog` across threads must serialize `&mut self` operations.
pub struct Datalog {
    path: PathBuf,
    sync_mode: SyncMode,
    state: Option<OpenLog>,
}

impl Datalog {
    /// Create an empty data file. Fails if the file already exists.
    pub fn create(path: &Path) -> LogResult<()> {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => {
                file.sync_all().io_context("sync", path)?;
                debug!(path = %path.display(), "created data file");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(LogError::AlreadyExists(path.to_path_buf()))
            }
            Err(e) => Err(e).io_context("create", path),
        }
    }

    /// Remove a data file. Returns `false` if there was none.
    pub fn remove(path: &Path) -> LogResult<bool> {
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).io_context("remove", path),
        }
    }

    /// Open an existing data file, reconciling `index` with its contents.
    ///
    /// An empty `index` triggers a full scan. A non-empty one (typically
    /// loaded from a snapshot) is caught up by scanning from its cursor, or
    /// discarded and rebuilt if its cursor lies past the end of the file.
    /// Any torn tail left by an interrupted append is cut off.
    pub fn open(path: &Path, index: Index, sync_mode: SyncMode) -> LogResult<Self> {
        let writer = match OpenOptions::new().append(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(LogError::FileNotFound(path.to_path_buf()));
            }
            Err(e) => return Err(e).io_context("open", path),
        };
        let reader = File::open(path).io_context("open", path)?;

        let mut log = Self {
            path: path.to_path_buf(),
            sync_mode,
            state: Some(OpenLog {
                writer,
                reader,
                index,
            }),
        };
        log.recover()?;

        info!(
            path = %log.path.display(),
            records = log.len(),
            cursor = log.cursor(),
            "datalog opened"
        );
        Ok(log)
    }

    fn recover(&mut self) -> LogResult<()> {
        if self.index()?.is_empty() {
            self.rebuild_index()?;
            return Ok(());
        }
        self.resync()
    }

    /// Reconcile the index with the file when the file no longer ends at
    /// the cursor: rebuild if the file is shorter, otherwise index whatever
    /// complete frames follow the cursor and cut off the rest.
    fn resync(&mut self) -> LogResult<()> {
        let file_len = self.file_len()?;
        let cursor = self.cursor();

        if cursor > file_len {
            warn!(
                path = %self.path.display(),
                cursor,
                file_len,
                "index extends past end of data file; rebuilding"
            );
            self.rebuild_index()?;
        } else if cursor < file_len {
            let index = self.index()?.clone();
            let added = self.scan_from(index, cursor)?;
            debug!(path = %self.path.display(), from = cursor, added, "caught up index");
        }
        Ok(())
    }

    /// Discard the index and rebuild it by scanning the whole file.
    ///
    /// Returns the number of distinct records indexed. On error the
    /// previous index stays in place.
    pub fn rebuild_index(&mut self) -> LogResult<usize> {
        let records = self.scan_from(Index::new(), 0)?;
        info!(path = %self.path.display(), records, "rebuilt index");
        Ok(records)
    }

    /// Extend `index` with every complete frame from `base` onward, trim a
    /// torn tail, then install `index` as the live index.
    fn scan_from(&mut self, mut index: Index, base: u64) -> LogResult<usize> {
        let path = &self.path;
        let state = self.state.as_mut().ok_or(LogError::Closed)?;

        let mut file: &File = &state.reader;
        file.seek(SeekFrom::Start(base)).io_context("seek", path)?;
        let mut scanner = FrameScanner::starting_at(BufReader::new(file), base);
        let added = index.scan_into(&mut scanner).io_context("scan", path)?;
        let valid_len = scanner.valid_len();

        let file_len = state.writer.metadata().io_context("stat", path)?.len();
        if valid_len < file_len {
            warn!(
                path = %path.display(),
                valid_len,
                discarded = file_len - valid_len,
                "discarding torn tail"
            );
            state.writer.set_len(valid_len).io_context("truncate", path)?;
            state.writer.sync_all().io_context("sync", path)?;
        }
        state.index = index;
        Ok(added)
    }

    /// Append `payload` and return its score.
    ///
    /// Content that is already indexed is not written again. The frame is
    /// on stable storage before the index learns about it, and a failed
    /// append leaves the index untouched.
    pub fn write(&mut self, payload: &[u8]) -> LogResult<Score> {
        let score = Score::of(payload);
        let frame = encode_frame(&score, payload)?;

        // Leftovers of an append whose rollback failed.
        self.resync()?;

        if self.index()?.contains(&score) {
            debug!(score = %score.short_hex(), "duplicate content; skipping append");
            return Ok(score);
        }

        let path = &self.path;
        let sync_mode = self.sync_mode;
        let state = self.state.as_mut().ok_or(LogError::Closed)?;
        let start = state.index.cursor();

        if let Err(e) = append_durably(&mut state.writer, &frame, sync_mode).io_context("append", path) {
            if let Err(undo) = state.writer.set_len(start) {
                warn!(path = %path.display(), error = %undo, "cannot roll back partial append");
            }
            return Err(e);
        }

        let addr = Addr::for_frame(start, payload.len() as u64);
        state.index.record(score, addr);
        debug!(
            score = %score.short_hex(),
            offset = addr.frame_start(),
            len = frame.len(),
            "appended frame"
        );
        Ok(score)
    }

    /// Read the payload stored under `score`.
    ///
    /// The bytes are returned as found on disk; verifying them against the
    /// score is up to the caller.
    pub fn read(&self, score: &Score) -> LogResult<Vec<u8>> {
        let state = self.state.as_ref().ok_or(LogError::Closed)?;
        let addr = state.index.lookup(score).ok_or(LogError::NotFound(*score))?;
        let len = usize::try_from(addr.length)
            .map_err(|_| LogError::FrameTooLarge { len: addr.length })?;

        let mut buf = vec![0u8; len];
        read_exact_at(&state.reader, &mut buf, addr.offset).io_context("read", &self.path)?;
        Ok(buf)
    }

    /// Release the file handles and drop the index.
    ///
    /// Closing twice is an error.
    pub fn close(&mut self) -> LogResult<()> {
        let state = self.state.take().ok_or(LogError::Closed)?;
        info!(
            path = %self.path.display(),
            records = state.index.len(),
            "datalog closed"
        );
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.state.is_some()
    }

    /// The index of an open datalog.
    pub fn index(&self) -> LogResult<&Index> {
        self.state.as_ref().map(|s| &s.index).ok_or(LogError::Closed)
    }

    /// Offset of the next append; 0 once closed.
    pub fn cursor(&self) -> u64 {
        self.state.as_ref().map_or(0, |s| s.index.cursor())
    }

    /// Number of distinct records; 0 once closed.
    pub fn len(&self) -> usize {
        self.state.as_ref().map_or(0, |s| s.index.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, score: &Score) -> LogResult<bool> {
        Ok(self.index()?.contains(score))
    }

    /// Current size of the data file on disk.
    pub fn file_len(&self) -> LogResult<u64> {
        let state = self.state.as_ref().ok_or(LogError::Closed)?;
        Ok(state.reader.metadata().io_context("stat", &self.path)?.len())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for Datalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Datalog")
            .field("path", &self.path)
            .field("open", &self.is_open())
            .field("records", &self.len())
            .field("cursor", &self.cursor())
            .finish()
    }
}

fn append_durably(writer: &mut File, frame: &[u8], sync_mode: SyncMode) -> io::Result<()> {
    writer.write_all(frame)?;
    match sync_mode {
        SyncMode::Full => writer.sync_all(),
        SyncMode::Data => writer.sync_data(),
    }
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(n) => {
                let rest = buf;
                buf = &mut rest[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot;

    const WORDS: &str = "The quick brown fox jumps over the lazy dog";

    fn fresh_log(dir: &Path) -> PathBuf {
        let path = dir.join("words.data");
        Datalog::create(&path).unwrap();
        path
    }

    fn open(path: &Path) -> Datalog {
        Datalog::open(path, Index::new(), SyncMode::Full).unwrap()
    }

    fn write_words(log: &mut Datalog) {
        for word in WORDS.split_whitespace() {
            log.write(word.as_bytes()).unwrap();
        }
    }

    #[test]
    fn open_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = Datalog::open(&dir.path().join("nope.data"), Index::new(), SyncMode::Full)
            .unwrap_err();
        assert!(matches!(err, LogError::FileNotFound(_)));
    }

    #[test]
    fn create_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let path = fresh_log(dir.path());
        assert!(matches!(
            Datalog::create(&path).unwrap_err(),
            LogError::AlreadyExists(_)
        ));
    }

    #[test]
    fn open_empty_file_has_cursor_zero() {
        let dir = tempfile::tempdir().unwrap();
        let log = open(&fresh_log(dir.path()));
        assert_eq!(log.cursor(), 0);
        assert!(log.is_empty());
    }

    #[test]
    fn write_moves_cursor_to_end_of_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = open(&fresh_log(dir.path()));

        let mut prev = log.cursor();
        for word in WORDS.split_whitespace() {
            let score = log.write(word.as_bytes()).unwrap();
            assert_eq!(score, Score::of(word.as_bytes()));
            assert!(log.cursor() > prev, "cursor should move");
            assert_eq!(log.cursor(), log.file_len().unwrap());
            prev = log.cursor();
        }
    }

    #[test]
    fn read_returns_payload_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = open(&fresh_log(dir.path()));
        write_words(&mut log);

        for word in WORDS.split_whitespace() {
            let data = log.read(&Score::of(word.as_bytes())).unwrap();
            assert_eq!(data, word.as_bytes());
        }
    }

    #[test]
    fn empty_payload_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = open(&fresh_log(dir.path()));
        let score = log.write(b"").unwrap();
        assert_eq!(log.read(&score).unwrap(), b"");
        assert_eq!(log.cursor(), 20);
    }

    #[test]
    fn duplicate_write_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = open(&fresh_log(dir.path()));

        let first = log.write(b"witchwork").unwrap();
        let size = log.file_len().unwrap();
        let second = log.write(b"witchwork").unwrap();

        assert_eq!(first, second);
        assert_eq!(log.file_len().unwrap(), size);
        assert_eq!(log.cursor(), size);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn unknown_score_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let log = open(&fresh_log(dir.path()));
        let missing = Score::of(b"never written");
        assert!(matches!(log.read(&missing), Err(LogError::NotFound(s)) if s == missing));
    }

    #[test]
    fn reopen_rebuilds_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = fresh_log(dir.path());
        let mut log = open(&path);
        write_words(&mut log);
        let cursor = log.cursor();
        log.close().unwrap();

        let log = open(&path);
        assert_eq!(log.cursor(), cursor);
        assert_eq!(log.len(), 9);
        assert_eq!(log.read(&Score::of(b"lazy")).unwrap(), b"lazy");
    }

    #[test]
    fn explicit_rebuild_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = open(&fresh_log(dir.path()));
        write_words(&mut log);
        let before = log.index().unwrap().clone();

        assert_eq!(log.rebuild_index().unwrap(), 9);
        assert_eq!(log.index().unwrap(), &before);
        assert_eq!(log.rebuild_index().unwrap(), 9);
        assert_eq!(log.index().unwrap(), &before);
    }

    #[test]
    fn stale_snapshot_is_caught_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = fresh_log(dir.path());
        let mut log = open(&path);
        log.write(b"quick").unwrap();
        let stale = log.index().unwrap().clone();
        log.write(b"brown").unwrap();
        let full = log.index().unwrap().clone();
        log.close().unwrap();

        let log = Datalog::open(&path, stale, SyncMode::Full).unwrap();
        assert_eq!(log.index().unwrap(), &full);
        assert_eq!(log.read(&Score::of(b"brown")).unwrap(), b"brown");
    }

    #[test]
    fn snapshot_past_eof_is_rebuilt() {
        let dir = tempfile::tempdir().unwrap();
        let path = fresh_log(dir.path());
        let mut log = open(&path);
        log.write(b"quick").unwrap();
        log.write(b"brown").unwrap();
        let ahead = log.index().unwrap().clone();
        log.close().unwrap();

        // Data file loses its last record behind the snapshot's back.
        let short = encode_frame(&Score::of(b"quick"), b"quick").unwrap().len() as u64;
        OpenOptions::new().write(true).open(&path).unwrap().set_len(short).unwrap();

        let log = Datalog::open(&path, ahead, SyncMode::Full).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log.cursor(), short);
        assert!(matches!(log.read(&Score::of(b"brown")), Err(LogError::NotFound(_))));
    }

    #[test]
    fn torn_tail_is_trimmed_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = fresh_log(dir.path());
        let mut log = open(&path);
        log.write(b"over").unwrap();
        let complete = log.cursor();
        log.write(b"the lazy dog").unwrap();
        let total = log.cursor();
        log.close().unwrap();

        OpenOptions::new().write(true).open(&path).unwrap().set_len(total - 4).unwrap();

        let mut log = open(&path);
        assert_eq!(log.len(), 1);
        assert_eq!(log.cursor(), complete);
        assert_eq!(log.file_len().unwrap(), complete);

        // Appends continue at the trimmed position.
        let score = log.write(b"jumps").unwrap();
        assert_eq!(log.read(&score).unwrap(), b"jumps");
        assert_eq!(log.cursor(), log.file_len().unwrap());
    }

    #[test]
    fn snapshot_roundtrip_through_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = fresh_log(dir.path());
        let idx_path = dir.path().join("words.idx");
        let mut log = open(&path);
        write_words(&mut log);
        snapshot::write(&idx_path, log.index().unwrap()).unwrap();
        let expected = log.index().unwrap().clone();
        log.close().unwrap();

        let loaded = snapshot::load(&idx_path).unwrap();
        let log = Datalog::open(&path, loaded, SyncMode::Data).unwrap();
        assert_eq!(log.index().unwrap(), &expected);
    }

    #[test]
    fn close_twice_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = open(&fresh_log(dir.path()));
        write_words(&mut log);
        assert!(log.cursor() > 0);

        log.close().unwrap();
        assert_eq!(log.cursor(), 0, "cursor should reset");
        assert!(!log.is_open());
        assert!(matches!(log.close(), Err(LogError::Closed)));
    }

    #[test]
    fn use_after_close_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = open(&fresh_log(dir.path()));
        let score = log.write(b"fox").unwrap();
        log.close().unwrap();

        assert!(matches!(log.read(&score), Err(LogError::Closed)));
        assert!(matches!(log.write(b"dog"), Err(LogError::Closed)));
        assert!(matches!(log.rebuild_index(), Err(LogError::Closed)));
        assert!(matches!(log.index(), Err(LogError::Closed)));
    }

    #[test]
    fn remove_reports_presence() {
        let dir = tempfile::tempdir().unwrap();
        let path = fresh_log(dir.path());
        assert!(Datalog::remove(&path).unwrap());
        assert!(!Datalog::remove(&path).unwrap());
    }

    // -----------------------------------------------------------------------
    // Failed I/O

    #[test]
    fn leftover_bytes_past_cursor_are_discarded_before_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = fresh_log(dir.path());
        let mut log = open(&path);
        log.write(b"quick").unwrap();
        let cursor = log.cursor();

        // Part of a frame whose rollback never happened.
        let mut extra = OpenOptions::new().append(true).open(&path).unwrap();
        extra.write_all(&[0, 0, 0, 30, 7, 7]).unwrap();
        assert_eq!(log.file_len().unwrap(), cursor + 6);

        let score = log.write(b"brown").unwrap();
        assert_eq!(log.read(&score).unwrap(), b"brown");
        assert_eq!(log.cursor(), log.file_len().unwrap());
        assert_eq!(log.cursor(), cursor + 20 + 5);
    }

    #[test]
    fn complete_frame_past_cursor_is_indexed_before_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = fresh_log(dir.path());
        let mut log = open(&path);
        log.write(b"quick").unwrap();

        // A frame that reached the disk although its append reported failure.
        let mut extra = OpenOptions::new().append(true).open(&path).unwrap();
        extra.write_all(&encode_frame(&Score::of(b"fox"), b"fox").unwrap()).unwrap();

        let size = log.file_len().unwrap();
        log.write(b"fox").unwrap();
        assert_eq!(log.file_len().unwrap(), size, "fox is already on disk");

        log.write(b"brown").unwrap();
        assert_eq!(log.len(), 3);
        assert_eq!(log.read(&Score::of(b"fox")).unwrap(), b"fox");
        assert_eq!(log.read(&Score::of(b"brown")).unwrap(), b"brown");
        assert_eq!(log.cursor(), log.file_len().unwrap());
    }

    #[test]
    fn failed_append_leaves_index_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = fresh_log(dir.path());
        let mut log = open(&path);
        log.write(b"quick").unwrap();
        let before = log.index().unwrap().clone();
        let size = log.file_len().unwrap();

        // A read-only handle makes every append fail.
        log.state.as_mut().unwrap().writer = File::open(&path).unwrap();
        let err = log.write(b"brown").unwrap_err();
        assert!(matches!(err, LogError::Io { op: "append", .. }));

        assert!(log.is_open());
        assert_eq!(log.index().unwrap(), &before);
        assert_eq!(log.len(), 1);
        assert_eq!(log.file_len().unwrap(), size);
        assert!(!log.contains(&Score::of(b"brown")).unwrap());

        log.state.as_mut().unwrap().writer = OpenOptions::new().append(true).open(&path).unwrap();
        let score = log.write(b"brown").unwrap();
        assert_eq!(log.read(&score).unwrap(), b"brown");
        assert_eq!(log.cursor(), log.file_len().unwrap());
    }

    #[test]
    fn failed_rebuild_keeps_previous_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = fresh_log(dir.path());
        let mut log = open(&path);
        write_words(&mut log);
        let before = log.index().unwrap().clone();

        // A write-only handle makes the scan fail on its first read.
        log.state.as_mut().unwrap().reader = OpenOptions::new().append(true).open(&path).unwrap();
        let err = log.rebuild_index().unwrap_err();
        assert!(matches!(err, LogError::Io { op: "scan", .. }));
        assert_eq!(log.index().unwrap(), &before);

        log.state.as_mut().unwrap().reader = File::open(&path).unwrap();
        let score = log.write(b"witchwork").unwrap();
        assert_eq!(log.read(&score).unwrap(), b"witchwork");
        assert_eq!(log.cursor(), log.file_len().unwrap());
    }
}
