//! Full-store snapshot persistence.
//!
//! A snapshot is a sequence of JSON task records, one per line, in id order.
//! Writes go to a sibling `.tmp` file that is flushed, synced and renamed
//! over the target, so the canonical path only ever holds a complete file.
//! Reads are all-or-nothing: any undecodable record aborts the restore.

use crate::task::{
    domain::Task,
    ports::{TaskStore, TaskStoreError},
};
use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use thiserror::Error;
use tracing::{info, warn};

const TEMP_SUFFIX: &str = ".tmp";

/// Errors returned while writing or restoring a snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The snapshot path does not name a file.
    #[error("snapshot path '{0}' must include a file name")]
    InvalidPath(Utf8PathBuf),

    /// Filesystem access failed.
    #[error("snapshot io error at '{path}': {source}")]
    Io {
        /// Path being accessed.
        path: Utf8PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A task could not be serialized.
    #[error("failed to encode snapshot record: {0}")]
    Encode(#[source] serde_json::Error),

    /// A stored record could not be decoded.
    #[error("failed to decode snapshot record {record}: {source}")]
    Decode {
        /// Zero-based position of the failing record.
        record: usize,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// The store could not produce its point-in-time copy.
    #[error("failed to export tasks: {0}")]
    Export(#[source] TaskStoreError),

    /// The store rejected the decoded records.
    #[error("failed to restore tasks: {0}")]
    Restore(#[source] TaskStoreError),
}

/// Snapshot file at a fixed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotFile {
    path: Utf8PathBuf,
}

impl SnapshotFile {
    /// Creates a handle for the snapshot at `path`.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the canonical snapshot path.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Writes every task in `store` and returns how many were written.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError`] when the store cannot be read or the file
    /// cannot be written. The live store is never modified.
    pub async fn write(&self, store: &impl TaskStore) -> Result<usize, SnapshotError> {
        let tasks = store.export().await.map_err(SnapshotError::Export)?;
        info!(path = %self.path, count = tasks.len(), "writing snapshot");
        self.save(&tasks)?;
        info!(path = %self.path, "snapshot written");
        Ok(tasks.len())
    }

    /// Loads the snapshot into `store` and returns how many tasks it held.
    ///
    /// A missing file yields `Ok(0)`.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError`] when the file cannot be read, any record
    /// fails to decode, or the store rejects the records.
    pub async fn read_into(&self, store: &impl TaskStore) -> Result<usize, SnapshotError> {
        let tasks = self.load()?;
        if tasks.is_empty() {
            return Ok(0);
        }
        let count = store.restore(tasks).await.map_err(SnapshotError::Restore)?;
        info!(path = %self.path, count, "snapshot restored");
        Ok(count)
    }

    /// Encodes `tasks` to the snapshot path atomically, creating missing
    /// parent directories first.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError`] when encoding or any filesystem step fails.
    /// On failure the previous snapshot, if any, is left in place.
    pub fn save(&self, tasks: &[Task]) -> Result<(), SnapshotError> {
        Dir::create_ambient_dir_all(self.parent(), ambient_authority())
            .map_err(|source| self.io_error(source))?;
        let (dir, file_name) = self.open_parent()?;
        let temp_name = format!("{file_name}{TEMP_SUFFIX}");
        let result = self.write_temp(&dir, &temp_name, tasks).and_then(|()| {
            dir.rename(&temp_name, &dir, file_name)
                .map_err(|source| self.io_error(source))
        });
        if result.is_err() {
            match dir.remove_file(&temp_name) {
                Err(err) if err.kind() != ErrorKind::NotFound => {
                    warn!(path = %self.path, error = %err, "failed to remove temporary snapshot");
                }
                _ => {}
            }
        }
        result
    }

    /// Decodes every record in the snapshot file.
    ///
    /// A missing file or parent directory yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError`] when the file cannot be opened or a record
    /// fails to decode.
    pub fn load(&self) -> Result<Vec<Task>, SnapshotError> {
        let (dir, file_name) = match self.open_parent() {
            Ok(opened) => opened,
            Err(SnapshotError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => {
                info!(path = %self.path, "snapshot directory missing, starting empty");
                return Ok(Vec::new());
            }
            Err(err) => return Err(err),
        };
        let file = match dir.open(file_name) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(path = %self.path, "no snapshot found, starting empty");
                return Ok(Vec::new());
            }
            Err(source) => return Err(self.io_error(source)),
        };
        serde_json::Deserializer::from_reader(BufReader::new(file))
            .into_iter::<Task>()
            .enumerate()
            .map(|(record, decoded)| {
                decoded.map_err(|source| SnapshotError::Decode { record, source })
            })
            .collect()
    }

    fn write_temp(&self, dir: &Dir, temp_name: &str, tasks: &[Task]) -> Result<(), SnapshotError> {
        let file = dir
            .create(temp_name)
            .map_err(|source| self.io_error(source))?;
        let mut writer = BufWriter::new(file);
        for task in tasks {
            serde_json::to_writer(&mut writer, task).map_err(SnapshotError::Encode)?;
            writer
                .write_all(b"\n")
                .map_err(|source| self.io_error(source))?;
        }
        writer
            .into_inner()
            .map_err(|err| self.io_error(err.into_error()))?
            .sync_all()
            .map_err(|source| self.io_error(source))
    }

    fn open_parent(&self) -> Result<(Dir, &str), SnapshotError> {
        let file_name = self
            .path
            .file_name()
            .ok_or_else(|| SnapshotError::InvalidPath(self.path.clone()))?;
        let dir = Dir::open_ambient_dir(self.parent(), ambient_authority())
            .map_err(|source| self.io_error(source))?;
        Ok((dir, file_name))
    }

    fn parent(&self) -> &Utf8Path {
        self.path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .unwrap_or_else(|| Utf8Path::new("."))
    }

    fn io_error(&self, source: std::io::Error) -> SnapshotError {
        SnapshotError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
