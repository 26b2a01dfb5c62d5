//! Content-addressed blob store with temp-upload spooling
//!
//! ## Layout
//!
//! ```text
//! <root>/
//!   index.db                  object metadata and project associations
//!   tmp/                      spooled uploads awaiting commit
//!   objects/aa/bb/aabb...     blob bytes, fanned out by oid prefix
//! ```
//!
//! ## Commit semantics
//!
//! An upload arrives as a [`TempUpload`]: a named temp file under `tmp/`
//! whose sha256 was computed while spooling. Commit verifies the declared
//! `(oid, size)` against the spooled bytes, then moves the file into the
//! fan-out with a no-clobber rename and records it in the index. Once an oid
//! is stored its bytes are never rewritten: content addressing means a
//! second committer of the same oid is writing identical bytes, so a
//! pre-existing blob or a lost rename race both count as success.
//!
//! The temp file is removed on every exit path. `NamedTempFile` deletes
//! itself on drop, and a successful rename consumes it, so neither early
//! returns nor rejected commits leave anything behind in `tmp/`.

use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::storage::{ObjectIndex, StoredObject};
use crate::types::{GatehouseError, Result};

/// A spooled upload awaiting commit. Dropping it deletes the temp file.
pub struct TempUpload {
    file: NamedTempFile,
    oid: String,
    len: u64,
}

impl TempUpload {
    /// Content hash of the spooled bytes
    pub fn oid(&self) -> &str {
        &self.oid
    }

    /// Byte count of the spooled bytes
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// The content store: blob fan-out plus metadata index
pub struct LfsStore {
    root: PathBuf,
    index: ObjectIndex,
}

impl LfsStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(root.join("tmp"))?;
        std::fs::create_dir_all(root.join("objects"))?;
        let index = ObjectIndex::open(&root.join("index.db"))?;

        Ok(Self { root, index })
    }

    /// On-disk path for a blob, fanned out by the first two byte pairs.
    pub fn blob_path(&self, oid: &str) -> PathBuf {
        self.root
            .join("objects")
            .join(&oid[0..2])
            .join(&oid[2..4])
            .join(oid)
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    /// Spool upload bytes into a temp file, hashing as they are written.
    pub fn spool(&self, bytes: &[u8]) -> Result<TempUpload> {
        let mut file = NamedTempFile::new_in(self.tmp_dir())?;
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        file.write_all(bytes)?;
        file.flush()?;

        Ok(TempUpload {
            file,
            oid: hex::encode(hasher.finalize()),
            len: bytes.len() as u64,
        })
    }

    /// Whether an object with this exact `(oid, size)` has been committed.
    pub fn exists(&self, oid: &str, size: u64) -> Result<bool> {
        Ok(self
            .index
            .find(oid)?
            .map(|object| object.size == size)
            .unwrap_or(false))
    }

    /// Look up an object among the given project's associations.
    pub fn find_for_project(&self, project_id: i64, oid: &str) -> Result<Option<StoredObject>> {
        self.index.find_for_project(project_id, oid)
    }

    /// Commit a spooled upload under the declared `(oid, size)`.
    ///
    /// The spooled hash and length must match the declaration. A concurrent
    /// commit of the same oid that lands first is success, not conflict; an
    /// oid already recorded under a different size is rejected.
    pub fn commit(&self, oid: &str, size: u64, upload: TempUpload) -> Result<StoredObject> {
        let TempUpload {
            file,
            oid: spooled_oid,
            len,
        } = upload;

        if spooled_oid != oid {
            return Err(GatehouseError::UploadRejected(format!(
                "spooled content hashes to {} but {} was declared",
                spooled_oid, oid
            )));
        }
        if len != size {
            return Err(GatehouseError::UploadRejected(format!(
                "spooled {} bytes but {} were declared",
                len, size
            )));
        }

        if let Some(existing) = self.index.find(oid)? {
            if existing.size == size {
                // Already stored; the temp file is dropped and cleaned here.
                debug!(oid = %oid, "Object already committed, skipping store");
                return Ok(existing);
            }
            return Err(GatehouseError::UploadRejected(format!(
                "oid {} already recorded with size {}",
                oid, existing.size
            )));
        }

        let dest = self.blob_path(oid);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }

        match file.persist_noclobber(&dest) {
            Ok(_) => {
                info!(oid = %oid, size = size, "Blob committed");
            }
            Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
                // A concurrent committer landed the identical bytes first.
                // The returned temp file is dropped and cleaned here.
                debug!(oid = %oid, "Lost commit race, blob already on disk");
            }
            Err(e) => return Err(GatehouseError::Io(e.error)),
        }

        self.index.insert(oid, size)
    }

    /// Idempotently link an object to a project.
    pub fn associate(&self, object: &StoredObject, project_id: i64) -> Result<()> {
        self.index.associate(object.id, project_id)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
