// Copyright (C) 2025 Matías Salinas (support@fenden.com)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Directory-backed persistent key-value store. One subdirectory per
//! bucket, one JSON file per key. An advisory lock file guards against a
//! second process opening the same store directory concurrently.

use crate::error::EdgeError;
use fs2::FileExt;
use serde::{Serialize, de::DeserializeOwned};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

pub const BUCKET_GOMODULES: &str = "gomodules";
pub const BUCKET_GOVANITIES: &str = "govanities";
pub const BUCKET_PROXIES: &str = "proxies";
pub const BUCKET_USERS: &str = "users";

const LOCK_TIMEOUT: Duration = Duration::from_millis(100);

pub struct Store {
    root: PathBuf,
    _lock_file: File,
}

impl Store {
    /// Opens (creating if absent) the store rooted at `dir`, acquiring an
    /// exclusive advisory lock on `<dir>/.lock`. Fails fast if another
    /// process is already holding it.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, EdgeError> {
        let root = dir.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .map_err(|e| EdgeError::Internal(format!("creating store dir: {e}")))?;

        for bucket in [
            BUCKET_GOMODULES,
            BUCKET_GOVANITIES,
            BUCKET_PROXIES,
            BUCKET_USERS,
        ] {
            fs::create_dir_all(root.join(bucket))
                .map_err(|e| EdgeError::Internal(format!("creating bucket {bucket}: {e}")))?;
        }

        let lock_path = root.join(".lock");
        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&lock_path)
            .map_err(|e| EdgeError::Internal(format!("opening lock file: {e}")))?;

        let deadline = Instant::now() + LOCK_TIMEOUT;
        loop {
            match lock_file.try_lock_exclusive() {
                Ok(()) => break,
                Err(_) if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(5));
                }
                Err(_) => {
                    return Err(EdgeError::Unavailable(
                        "store directory is locked by another process".to_string(),
                    ));
                }
            }
        }

        Ok(Self {
            root,
            _lock_file: lock_file,
        })
    }

    fn key_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.root.join(bucket).join(format!("{key}.json"))
    }

    pub fn put<T: Serialize>(&self, bucket: &str, key: &str, value: &T) -> Result<(), EdgeError> {
        let path = self.key_path(bucket, key);
        let body = serde_json::to_vec_pretty(value)
            .map_err(|e| EdgeError::Internal(format!("serializing {bucket}/{key}: {e}")))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, body)
            .map_err(|e| EdgeError::Internal(format!("writing {bucket}/{key}: {e}")))?;
        fs::rename(&tmp, &path)
            .map_err(|e| EdgeError::Internal(format!("committing {bucket}/{key}: {e}")))?;
        Ok(())
    }

    /// Returns `Ok(None)` when the key is absent, distinct from any error.
    /// This is the intentional fix for the original store's conflation of
    /// "cursor landed past the key" with "key not found": here, presence is
    /// a plain filesystem check.
    pub fn get<T: DeserializeOwned>(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Option<T>, EdgeError> {
        let path = self.key_path(bucket, key);
        match fs::read(&path) {
            Ok(body) => {
                let value = serde_json::from_slice(&body)
                    .map_err(|e| EdgeError::Internal(format!("decoding {bucket}/{key}: {e}")))?;
                Ok(Some(value))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(EdgeError::Internal(format!("reading {bucket}/{key}: {e}"))),
        }
    }

    pub fn exists(&self, bucket: &str, key: &str) -> bool {
        self.key_path(bucket, key).is_file()
    }

    pub fn del(&self, bucket: &str, key: &str) -> Result<(), EdgeError> {
        let path = self.key_path(bucket, key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(EdgeError::NotFound(format!("{bucket}/{key}")))
            }
            Err(e) => Err(EdgeError::Internal(format!("deleting {bucket}/{key}: {e}"))),
        }
    }

    pub fn keys(&self, bucket: &str) -> Result<Vec<String>, EdgeError> {
        let dir = self.root.join(bucket);
        let mut out = Vec::new();
        let entries = fs::read_dir(&dir)
            .map_err(|e| EdgeError::Internal(format!("listing bucket {bucket}: {e}")))?;
        for entry in entries {
            let entry = entry.map_err(|e| EdgeError::Internal(format!("reading entry: {e}")))?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(stripped) = name.strip_suffix(".json") {
                out.push(stripped.to_string());
            }
        }
        out.sort();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Widget {
        name: String,
        count: u32,
    }

    fn temp_store() -> (Store, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        (store, dir)
    }

    #[test]
    fn put_then_get_round_trips() {
        let (store, _dir) = temp_store();
        let w = Widget {
            name: "sprocket".into(),
            count: 3,
        };
        store.put(BUCKET_PROXIES, "a", &w).unwrap();
        let got: Option<Widget> = store.get(BUCKET_PROXIES, "a").unwrap();
        assert_eq!(got, Some(w));
    }

    #[test]
    fn get_missing_key_is_none_not_error() {
        let (store, _dir) = temp_store();
        let got: Option<Widget> = store.get(BUCKET_PROXIES, "missing").unwrap();
        assert_eq!(got, None);
    }

    #[test]
    fn exists_matches_presence() {
        let (store, _dir) = temp_store();
        assert!(!store.exists(BUCKET_PROXIES, "a"));
        store
            .put(BUCKET_PROXIES, "a", &Widget { name: "x".into(), count: 1 })
            .unwrap();
        assert!(store.exists(BUCKET_PROXIES, "a"));
    }

    #[test]
    fn del_missing_key_returns_not_found() {
        let (store, _dir) = temp_store();
        let err = store.del(BUCKET_PROXIES, "never-existed");
        assert!(matches!(err, Err(EdgeError::NotFound(_))));
    }

    #[test]
    fn del_removes_existing_key() {
        let (store, _dir) = temp_store();
        store
            .put(BUCKET_PROXIES, "a", &Widget { name: "x".into(), count: 1 })
            .unwrap();
        store.del(BUCKET_PROXIES, "a").unwrap();
        assert!(!store.exists(BUCKET_PROXIES, "a"));
    }

    #[test]
    fn keys_lists_all_entries_sorted() {
        let (store, _dir) = temp_store();
        for k in ["c", "a", "b"] {
            store
                .put(BUCKET_GOVANITIES, k, &Widget { name: k.into(), count: 0 })
                .unwrap();
        }
        assert_eq!(store.keys(BUCKET_GOVANITIES).unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn second_open_on_same_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let _first = Store::open(dir.path()).unwrap();
        let second = Store::open(dir.path());
        assert!(second.is_err());
    }
}
