use super::KvStore;
use crate::error::StoreError;
use crate::lock::CycleLock;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// JSON document on disk holding every entry as a string value.
///
/// Writes go to a sibling temp file that is renamed over the document, so a
/// reader never sees a half-written file. A sidecar `.lock` file serializes
/// load-assign-save cycles across processes.
#[derive(Debug, Clone)]
pub struct FileKv {
    path: PathBuf,
    lock_path: PathBuf,
    lock_timeout: Duration,
}

impl FileKv {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, lock_timeout: Duration) -> Self {
        let path = path.into();
        let lock_path = path.with_extension("lock");
        Self {
            path,
            lock_path,
            lock_timeout,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<Option<BTreeMap<String, String>>, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|err| StoreError::Read {
                path: self.path.clone(),
                source: io::Error::new(io::ErrorKind::InvalidData, err),
            })
    }

    fn write_entries(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }

        let body = serde_json::to_vec_pretty(entries)?;
        let tmp_path = tmp_sibling(&self.path);
        let mut file = fs::File::create(&tmp_path).map_err(write_err)?;
        file.write_all(&body).map_err(write_err)?;
        file.sync_all().map_err(write_err)?;
        drop(file);
        fs::rename(&tmp_path, &self.path).map_err(write_err)
    }
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut raw = OsString::from(path.as_os_str());
    raw.push(".tmp");
    PathBuf::from(raw)
}

impl KvStore for FileKv {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .read_entries()?
            .and_then(|mut entries| entries.remove(key)))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = match self.read_entries() {
            Ok(entries) => entries.unwrap_or_default(),
            Err(StoreError::Read { source, .. })
                if source.kind() == io::ErrorKind::InvalidData =>
            {
                warn!(path = %self.path.display(), "replacing unparsable state file");
                BTreeMap::new()
            }
            Err(err) => return Err(err),
        };
        entries.insert(key.to_string(), value.to_string());
        self.write_entries(&entries)
    }

    fn lock_cycle(&self) -> Result<Option<CycleLock>, StoreError> {
        CycleLock::acquire(&self.lock_path, self.lock_timeout).map(Some)
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}
