use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use cairn_log::{snapshot, Datalog, Index, LogError};
use cairn_types::Score;
use tracing::{info, warn};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::naming::{NameGenerator, RandomNames};

/// A named, content-addressed store backed by one data file.
///
/// All mutation (`write`, `rebuild_index`, `close`, `delete`) happens under
/// the write half of an `RwLock`; `read` and the other queries share the
/// read half. Deduplication and append happen under the same write lock,
/// so concurrent writers of identical bytes append them once.
pub struct Store {
    name: String,
    data_path: PathBuf,
    index_path: PathBuf,
    persist_index: bool,
    log: RwLock<Datalog>,
}

impl Store {
    /// Create a new, empty store with a random name.
    pub fn new(config: &StoreConfig) -> StoreResult<Self> {
        Self::with_names(config, &RandomNames)
    }

    /// Create a new, empty store named by `names`.
    ///
    /// Fails with [`StoreError::AlreadyExists`] if a data file with the
    /// generated name is already present.
    pub fn with_names(config: &StoreConfig, names: &dyn NameGenerator) -> StoreResult<Self> {
        let name = names.generate();
        validate_name(&name)?;
        Datalog::create(&config.data_path(&name)).map_err(|e| match e {
            LogError::AlreadyExists(_) => StoreError::AlreadyExists(name.clone()),
            other => other.into(),
        })?;
        info!(name = %name, root = %config.root.display(), "created store");
        Self::open(&name, config)
    }

    /// Open an existing store.
    ///
    /// Uses the index snapshot when it is present and consistent with the
    /// data file; otherwise the index is rebuilt by scanning the data file
    /// and, if persistence is enabled, a fresh snapshot is written.
    pub fn open(name: &str, config: &StoreConfig) -> StoreResult<Self> {
        validate_name(name)?;
        let data_path = config.data_path(name);
        let index_path = config.index_path(name);

        let cached = if config.persist_index {
            snapshot::load(&index_path)
        } else {
            None
        };
        let cached_cursor = cached.as_ref().map(Index::cursor);

        let log = Datalog::open(&data_path, cached.unwrap_or_default(), config.sync_mode)
            .map_err(|e| match e {
                LogError::FileNotFound(_) => StoreError::StoreNotFound(name.to_string()),
                other => other.into(),
            })?;

        if config.persist_index && cached_cursor != Some(log.cursor()) {
            if let Ok(index) = log.index() {
                persist_best_effort(&index_path, index);
            }
        }

        info!(name, records = log.len(), "opened store");
        Ok(Self {
            name: name.to_string(),
            data_path,
            index_path,
            persist_index: config.persist_index,
            log: RwLock::new(log),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// The score `data` would be stored under.
    pub fn make_score(data: &[u8]) -> Score {
        Score::of(data)
    }

    /// Read the value stored under `score`, verifying it on the way out.
    pub fn read(&self, score: &Score) -> StoreResult<Vec<u8>> {
        let data = self.read_log()?.read(score)?;
        if !score.matches(&data) {
            let computed = Score::of(&data);
            warn!(
                store = %self.name,
                score = %score,
                computed = %computed,
                "checksum failure"
            );
            return Err(StoreError::ChecksumFailure {
                score: *score,
                computed,
            });
        }
        Ok(data)
    }

    /// Store `data` and return its score. Known content is not rewritten.
    pub fn write(&self, data: &[u8]) -> StoreResult<Score> {
        let score = Score::of(data);
        if self.read_log()?.contains(&score)? {
            return Ok(score);
        }
        Ok(self.write_log()?.write(data)?)
    }

    pub fn contains(&self, score: &Score) -> StoreResult<bool> {
        Ok(self.read_log()?.contains(score)?)
    }

    /// Number of distinct values stored.
    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.read_log()?.index()?.len())
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Size of the data file in bytes.
    pub fn data_size(&self) -> StoreResult<u64> {
        Ok(self.read_log()?.file_len()?)
    }

    /// Rebuild the index by scanning the data file. Returns the record count.
    pub fn rebuild_index(&self) -> StoreResult<usize> {
        Ok(self.write_log()?.rebuild_index()?)
    }

    /// Close the store, persisting the index snapshot if configured.
    ///
    /// A failed snapshot write is logged and does not keep the data file
    /// open. Closing an already closed store fails with
    /// [`StoreError::Closed`].
    pub fn close(&self) -> StoreResult<()> {
        let mut log = self.write_log()?;
        if self.persist_index {
            if let Ok(index) = log.index() {
                persist_best_effort(&self.index_path, index);
            }
        }
        log.close()?;
        info!(name = %self.name, "closed store");
        Ok(())
    }

    /// Close the store if needed and remove its data file and snapshot.
    ///
    /// Files that are already gone are skipped, so this also cleans up
    /// after a store that was closed or half-deleted earlier.
    pub fn delete(&self) -> StoreResult<()> {
        let mut log = self.log.write().unwrap_or_else(PoisonError::into_inner);
        if log.is_open() {
            log.close()?;
        }

        let data = Datalog::remove(&self.data_path);
        let index = snapshot::remove(&self.index_path);
        data?;
        index?;
        info!(name = %self.name, "deleted store");
        Ok(())
    }

    fn read_log(&self) -> StoreResult<RwLockReadGuard<'_, Datalog>> {
        self.log.read().map_err(|_| StoreError::Poisoned)
    }

    fn write_log(&self) -> StoreResult<RwLockWriteGuard<'_, Datalog>> {
        self.log.write().map_err(|_| StoreError::Poisoned)
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        let open = self.log.get_mut().map(|log| log.is_open()).unwrap_or(false);
        if open {
            if let Err(e) = self.close() {
                warn!(name = %self.name, error = %e, "failed to close store on drop");
            }
        }
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.name)
            .field("data_path", &self.data_path)
            .field("persist_index", &self.persist_index)
            .finish()
    }
}

fn persist_best_effort(path: &Path, index: &Index) {
    if let Err(e) = snapshot::write(path, index) {
        warn!(path = %path.display(), error = %e, "failed to persist index snapshot");
    }
}

fn validate_name(name: &str) -> StoreResult<()> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if bad {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(())
}
