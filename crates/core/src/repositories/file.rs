use super::{version_conflict, Repository};
use crate::constants::{REQUESTS_DIR_NAME, REQUEST_JSON_FILENAME, REQUEST_LOCK_FILENAME};
use crate::error::{RegulationError, RegulationResult};
use crate::request::Request;
use async_trait::async_trait;
use fs2::FileExt;
use regulacao_uuid::RequestId;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Stores each request as `<data_dir>/requests/<s1>/<s2>/<id>/request.json`.
///
/// Several processes may share the directory (the server and the CLI). Every write holds an
/// exclusive advisory lock on the sibling `request.lock` from the version check through the
/// final `rename`, and `get` takes the shared lock, so at most one writer commits per version
/// and a reader waits for a write already in progress. Each write goes to its own temporary
/// file which is renamed over the document.
#[derive(Clone, Debug)]
pub struct FileRepository {
    requests_dir: PathBuf,
}

/// Flags a pending write as abandoned when the awaiting future is dropped.
struct AbandonOnDrop(Arc<AtomicBool>);

impl Drop for AbandonOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl FileRepository {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            requests_dir: data_dir.join(REQUESTS_DIR_NAME),
        }
    }

    pub fn requests_dir(&self) -> &Path {
        &self.requests_dir
    }

    fn request_dir(&self, id: RequestId) -> PathBuf {
        id.sharded_dir(&self.requests_dir)
    }

    async fn blocking<T, F>(work: F) -> RegulationResult<T>
    where
        F: FnOnce() -> RegulationResult<T> + Send + 'static,
        T: Send + 'static,
    {
        tokio::task::spawn_blocking(work)
            .await
            .map_err(|e| RegulationError::Repository(format!("file task failed: {e}")))?
    }

    /// Runs `work` under the exclusive lock of `dir`. `None` if the directory does not exist
    /// and `create_dir` is false.
    ///
    /// If the caller stops waiting before the lock is acquired, nothing is written.
    async fn exclusive<T, F>(dir: PathBuf, create_dir: bool, work: F) -> RegulationResult<Option<T>>
    where
        F: FnOnce(&Path) -> RegulationResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let abandoned = Arc::new(AtomicBool::new(false));
        let _armed = AbandonOnDrop(abandoned.clone());
        Self::blocking(move || {
            let Some(_lock) = lock_exclusive(&dir, create_dir)? else {
                return Ok(None);
            };
            if abandoned.load(Ordering::SeqCst) {
                tracing::debug!(dir = %dir.display(), "skipping write abandoned by caller");
                return Err(RegulationError::Cancelled(
                    "file write abandoned by caller".into(),
                ));
            }
            work(&dir).map(Some)
        })
        .await
    }
}

fn lock_exclusive(dir: &Path, create_dir: bool) -> RegulationResult<Option<File>> {
    if create_dir {
        fs::create_dir_all(dir).map_err(RegulationError::StorageDirCreation)?;
    }
    let file = match OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(dir.join(REQUEST_LOCK_FILENAME))
    {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(RegulationError::FileWrite(e)),
    };
    FileExt::lock_exclusive(&file).map_err(RegulationError::FileWrite)?;
    Ok(Some(file))
}

/// Shared lock on `dir`, or `None` when no lock file exists yet.
fn lock_shared(dir: &Path) -> RegulationResult<Option<File>> {
    match File::open(dir.join(REQUEST_LOCK_FILENAME)) {
        Ok(file) => {
            FileExt::lock_shared(&file).map_err(RegulationError::FileRead)?;
            Ok(Some(file))
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(RegulationError::FileRead(e)),
    }
}

fn read_document(path: &Path) -> RegulationResult<Option<Request>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(RegulationError::FileRead(e)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(RegulationError::Deserialization)
}

/// Writes a uniquely named temporary file and renames it over the document.
fn write_document(dir: &Path, request: &Request) -> RegulationResult<()> {
    let json = serde_json::to_vec_pretty(request).map_err(RegulationError::Serialization)?;
    let path = dir.join(REQUEST_JSON_FILENAME);
    let tmp = dir.join(format!("{REQUEST_JSON_FILENAME}.{}.tmp", RequestId::new()));

    let written = (|| -> std::io::Result<()> {
        let mut file = File::create(&tmp)?;
        file.write_all(&json)?;
        file.sync_all()?;
        fs::rename(&tmp, &path)
    })();
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(RegulationError::FileWrite(e));
    }
    Ok(())
}

/// Subdirectories of `dir`, or nothing if `dir` does not exist yet.
fn subdirs(dir: &Path) -> RegulationResult<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(RegulationError::FileRead(e)),
    };
    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(RegulationError::FileRead)?;
        if entry.file_type().map_err(RegulationError::FileRead)?.is_dir() {
            dirs.push(entry.path());
        }
    }
    Ok(dirs)
}

fn list_documents(requests_dir: &Path) -> RegulationResult<Vec<Request>> {
    let mut requests = Vec::new();
    for s1 in subdirs(requests_dir)? {
        for s2 in subdirs(&s1)? {
            for dir in subdirs(&s2)? {
                let Some(name) = dir.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                if !RequestId::is_canonical(name) {
                    continue;
                }
                if let Some(request) = read_document(&dir.join(REQUEST_JSON_FILENAME))? {
                    requests.push(request);
                }
            }
        }
    }
    // Directory order is arbitrary; creation order is the contract.
    requests.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    Ok(requests)
}

#[async_trait]
impl Repository for FileRepository {
    async fn get(&self, id: RequestId) -> RegulationResult<Option<Request>> {
        let dir = self.request_dir(id);
        Self::blocking(move || {
            let _lock = lock_shared(&dir)?;
            read_document(&dir.join(REQUEST_JSON_FILENAME))
        })
        .await
    }

    async fn list(&self) -> RegulationResult<Vec<Request>> {
        let requests_dir = self.requests_dir.clone();
        let requests = Self::blocking(move || list_documents(&requests_dir)).await?;
        tracing::debug!(count = requests.len(), dir = %self.requests_dir.display(), "listed requests");
        Ok(requests)
    }

    async fn insert(&self, mut request: Request) -> RegulationResult<Request> {
        let id = request.id;
        request.version = 1;
        let stored = Self::exclusive(self.request_dir(id), true, move |dir| {
            let exists = dir
                .join(REQUEST_JSON_FILENAME)
                .try_exists()
                .map_err(RegulationError::FileRead)?;
            if exists {
                return Err(RegulationError::Conflict(format!(
                    "request {id} already exists"
                )));
            }
            write_document(dir, &request)?;
            Ok(request)
        })
        .await?
        .ok_or_else(|| {
            RegulationError::Repository(format!("directory for request {id} vanished"))
        })?;
        tracing::debug!(%id, "inserted request on disk");
        Ok(stored)
    }

    async fn update(&self, request: Request, expected_version: u64) -> RegulationResult<Request> {
        let id = request.id;
        let stored = Self::exclusive(self.request_dir(id), false, move |dir| {
            let mut request = request;
            let current = read_document(&dir.join(REQUEST_JSON_FILENAME))?
                .ok_or(RegulationError::NotFound(id))?;
            if current.version != expected_version {
                return Err(version_conflict(id, expected_version, current.version));
            }
            request.version = expected_version + 1;
            write_document(dir, &request)?;
            Ok(request)
        })
        .await?
        .ok_or(RegulationError::NotFound(id))?;
        tracing::debug!(%id, version = stored.version, "updated request on disk");
        Ok(stored)
    }

    async fn delete(&self, id: RequestId) -> RegulationResult<()> {
        Self::exclusive(self.request_dir(id), false, move |dir| {
            let exists = dir
                .join(REQUEST_JSON_FILENAME)
                .try_exists()
                .map_err(RegulationError::FileRead)?;
            if !exists {
                return Err(RegulationError::NotFound(id));
            }
            fs::remove_dir_all(dir).map_err(RegulationError::FileRemove)
        })
        .await?
        .ok_or(RegulationError::NotFound(id))
    }
}
