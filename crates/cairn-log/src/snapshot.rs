//! Persisted index snapshots.
//!
//! A snapshot is a startup cache for an [`Index`]. It is written next to the
//! data file and is never authoritative: anything wrong with it means the
//! caller falls back to scanning the data file.
//!
//! Layout (all integers big-endian):
//!
//! ```text
//! [4 bytes: magic "CIDX"]
//! [4 bytes: version]
//! [8 bytes: covered data-file length]
//! [8 bytes: entry count]
//! [count * (16-byte score, 8-byte offset, 8-byte length)], sorted by score
//! [32 bytes: BLAKE3 of everything above]
//! ```

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use cairn_types::{Addr, Score};
use tracing::{debug, warn};

use crate::error::{IoContext, LogResult, SnapshotError};
use crate::index::Index;

pub const MAGIC: [u8; 4] = *b"CIDX";
pub const VERSION: u32 = 1;

const PREAMBLE_SIZE: usize = 4 + 4 + 8 + 8;
const ENTRY_SIZE: usize = Score::SIZE + 8 + 8;
const CHECKSUM_SIZE: usize = 32;

/// Serialize `index`; its cursor becomes the covered length.
pub fn encode(index: &Index) -> Vec<u8> {
    let mut entries: Vec<(&Score, &Addr)> = index.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    let mut buf = Vec::with_capacity(PREAMBLE_SIZE + entries.len() * ENTRY_SIZE + CHECKSUM_SIZE);
    buf.extend_from_slice(&MAGIC);
    buf.extend_from_slice(&VERSION.to_be_bytes());
    buf.extend_from_slice(&index.cursor().to_be_bytes());
    buf.extend_from_slice(&(entries.len() as u64).to_be_bytes());
    for (score, addr) in entries {
        buf.extend_from_slice(score.as_bytes());
        buf.extend_from_slice(&addr.offset.to_be_bytes());
        buf.extend_from_slice(&addr.length.to_be_bytes());
    }
    let checksum = blake3::hash(&buf);
    buf.extend_from_slice(checksum.as_bytes());
    buf
}

/// Deserialize a snapshot, verifying its checksum and internal consistency.
pub fn decode(data: &[u8]) -> Result<Index, SnapshotError> {
    if data.len() < 8 {
        return Err(SnapshotError::Truncated {
            needed: PREAMBLE_SIZE + CHECKSUM_SIZE,
            actual: data.len(),
        });
    }
    let mut magic = [0u8; 4];
    magic.copy_from_slice(&data[0..4]);
    if magic != MAGIC {
        return Err(SnapshotError::InvalidMagic(magic));
    }
    let version = be_u32(&data[4..8]);
    if version != VERSION {
        return Err(SnapshotError::UnsupportedVersion(version));
    }
    if data.len() < PREAMBLE_SIZE + CHECKSUM_SIZE {
        return Err(SnapshotError::Truncated {
            needed: PREAMBLE_SIZE + CHECKSUM_SIZE,
            actual: data.len(),
        });
    }

    let covered_len = be_u64(&data[8..16]);
    let count = usize::try_from(be_u64(&data[16..24]))
        .map_err(|_| SnapshotError::Inconsistent("entry count overflows".into()))?;
    let needed = count
        .checked_mul(ENTRY_SIZE)
        .and_then(|n| n.checked_add(PREAMBLE_SIZE + CHECKSUM_SIZE))
        .ok_or_else(|| SnapshotError::Inconsistent("entry count overflows".into()))?;
    if data.len() < needed {
        return Err(SnapshotError::Truncated {
            needed,
            actual: data.len(),
        });
    }
    if data.len() > needed {
        return Err(SnapshotError::Inconsistent(format!(
            "{} trailing bytes",
            data.len() - needed
        )));
    }

    let (body, checksum) = data.split_at(needed - CHECKSUM_SIZE);
    if blake3::hash(body).as_bytes()[..] != checksum[..] {
        return Err(SnapshotError::ChecksumMismatch);
    }

    let mut entries = HashMap::with_capacity(count);
    for chunk in body[PREAMBLE_SIZE..].chunks_exact(ENTRY_SIZE) {
        let mut raw = [0u8; Score::SIZE];
        raw.copy_from_slice(&chunk[..Score::SIZE]);
        let score = Score::from_raw(raw);
        let addr = Addr {
            offset: be_u64(&chunk[Score::SIZE..Score::SIZE + 8]),
            length: be_u64(&chunk[Score::SIZE + 8..]),
        };
        let in_bounds = addr.offset >= Addr::HEADER_SIZE
            && addr
                .offset
                .checked_add(addr.length)
                .is_some_and(|end| end <= covered_len);
        if !in_bounds {
            return Err(SnapshotError::Inconsistent(format!(
                "address of {score} outside covered length {covered_len}"
            )));
        }
        if entries.insert(score, addr).is_some() {
            return Err(SnapshotError::Inconsistent(format!("duplicate score {score}")));
        }
    }

    Ok(Index::from_parts(entries, covered_len))
}

/// Load a snapshot from `path`.
///
/// Returns `None` when the file is missing or unusable; problems other than
/// absence are logged.
pub fn load(path: &Path) -> Option<Index> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no index snapshot");
            return None;
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read index snapshot");
            return None;
        }
    };
    match decode(&data) {
        Ok(index) => {
            debug!(
                path = %path.display(),
                records = index.len(),
                covered = index.cursor(),
                "loaded index snapshot"
            );
            Some(index)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "discarding index snapshot");
            None
        }
    }
}

/// Atomically replace the snapshot at `path` with one describing `index`.
pub fn write(path: &Path, index: &Index) -> LogResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir).io_context("create snapshot", path)?;
    tmp.write_all(&encode(index))
        .io_context("write snapshot", path)?;
    tmp.as_file().sync_all().io_context("sync snapshot", path)?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .io_context("persist snapshot", path)?;

    debug!(path = %path.display(), records = index.len(), "wrote index snapshot");
    Ok(())
}

/// Remove the snapshot at `path`. Returns `false` if there was none.
pub fn remove(path: &Path) -> LogResult<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).io_context("remove snapshot", path),
    }
}

fn be_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_be_bytes(buf)
}

fn be_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_be_bytes(buf)
}
