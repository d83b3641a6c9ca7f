//! File-based storage backend for persistent storage.

use crate::backend::{StorageBackend, StorageTransaction};
use crate::command::{ReadQuery, WriteCommand};
use crate::error::{StorageError, StorageResult};
use crate::journal::Journal;
use crate::memory::{InMemoryBackend, InMemoryTransaction};
use crate::record::Row;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A file-based storage backend.
///
/// Committed rows are held in memory and written to a single CBOR document
/// after every successful commit. Transactions behave exactly like those of
/// [`InMemoryBackend`]; only commit touches the disk.
///
/// # Durability
///
/// The document is written to `<path>.tmp`, synced, then renamed over
/// `<path>`, so a crash leaves either the old or the new state.
///
/// # Locking
///
/// An exclusive advisory lock on `<path>.lock` is held for the backend's
/// lifetime. A second `open` on the same path fails with
/// [`StorageError::Locked`].
///
/// # Example
///
/// ```no_run
/// use unitwork_storage::{FileBackend, StorageBackend};
/// use std::path::Path;
///
/// let backend = FileBackend::open(Path::new("members.cbor")).unwrap();
/// let txn = backend.begin().unwrap();
/// txn.commit().unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    memory: InMemoryBackend,
    _lock: File,
}

impl FileBackend {
    /// Opens or creates a file backend at the given path.
    ///
    /// Parent directories are created if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is locked by another process, the
    /// existing document cannot be decoded, or an I/O error occurs.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let lock = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(sibling(path, "lock"))?;
        if lock.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked);
        }

        let rows = load(path)?;
        debug!(path = %path.display(), rows = rows.len(), "opened file store");

        Ok(Self {
            path: path.to_path_buf(),
            memory: InMemoryBackend::with_rows(rows),
            _lock: lock,
        })
    }

    /// Returns the path of the document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns all committed rows in key order.
    #[must_use]
    pub fn rows(&self) -> Vec<Row> {
        self.memory.rows()
    }

    /// Turns on statement journaling for this backend.
    #[must_use]
    pub fn with_journal(mut self) -> Self {
        self.memory = self.memory.with_journal();
        self
    }

    /// Returns a handle to the statement journal.
    ///
    /// The handle is inert unless [`with_journal`](Self::with_journal) was
    /// called.
    #[must_use]
    pub fn journal(&self) -> Journal {
        self.memory.journal()
    }

    /// Replaces every committed row and persists the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be written.
    pub fn replace_rows(&self, rows: impl IntoIterator<Item = Row>) -> StorageResult<()> {
        self.memory.replace_rows(rows);
        persist(&self.path, &self.memory.rows())
    }
}

impl StorageBackend for FileBackend {
    fn begin(&self) -> StorageResult<Box<dyn StorageTransaction>> {
        Ok(Box::new(FileTransaction {
            inner: self.memory.open_transaction(),
            path: self.path.clone(),
        }))
    }
}

/// A transaction against a [`FileBackend`].
#[derive(Debug)]
struct FileTransaction {
    inner: InMemoryTransaction,
    path: PathBuf,
}

impl StorageTransaction for FileTransaction {
    fn execute_write(&mut self, command: &WriteCommand) -> StorageResult<()> {
        self.inner.execute_write(command)
    }

    fn execute_read(&mut self, query: &ReadQuery) -> StorageResult<Vec<Row>> {
        self.inner.execute_read(query)
    }

    fn commit(self: Box<Self>) -> StorageResult<()> {
        let FileTransaction { inner, path } = *self;
        // The document is written before the new table becomes visible.
        inner.commit_with(|next| persist(&path, &next.rows()))
    }

    fn rollback(self: Box<Self>) -> StorageResult<()> {
        let FileTransaction { inner, .. } = *self;
        Box::new(inner).rollback()
    }
}

fn sibling(path: &Path, extension: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

fn load(path: &Path) -> StorageResult<Vec<Row>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    if file.metadata()?.len() == 0 {
        return Ok(Vec::new());
    }
    ciborium::from_reader(BufReader::new(file))
        .map_err(|e| StorageError::Corrupted(format!("{}: {e}", path.display())))
}

fn persist(path: &Path, rows: &[Row]) -> StorageResult<()> {
    let temp = sibling(path, "tmp");
    {
        let file = File::create(&temp)?;
        let mut writer = BufWriter::new(file);
        ciborium::into_writer(rows, &mut writer).map_err(StorageError::codec)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }
    fs::rename(&temp, path)?;
    debug!(path = %path.display(), rows = rows.len(), "persisted file store");
    Ok(())
}
