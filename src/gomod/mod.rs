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

//! Go module proxy cache: serves `/@v/{list,info,mod,zip}` requests out of
//! a disk cache, downloading on demand through the external `go`
//! toolchain with single-flight coalescing of concurrent requests for the
//! same module@version.

pub mod path;
pub mod toolchain;

use crate::error::EdgeError;
use crate::models::ModuleSettings;
use crate::store::{BUCKET_GOMODULES, Store};
use chrono::{DateTime, Utc};
use dashmap::DashSet;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use toolchain::ToolchainRunner;

pub const FS_PATH_DELIMITER: &str = "/@v/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModAction {
    List,
    Info,
    Mod,
    Zip,
}

#[derive(Debug, Clone)]
pub struct ModRequest {
    pub module: String,
    pub version: Option<String>,
    pub action: ModAction,
}

fn bad_request(reason: &str) -> EdgeError {
    EdgeError::Validation(vec![crate::error::FieldError::new("module_request", reason)])
}

/// Splits a module-proxy request path of the form
/// `<encoded-module>/@v/<version>.<ext>` or `<encoded-module>/@v/list`.
pub fn parse_request(request_path: &str) -> Result<ModRequest, EdgeError> {
    let parts: Vec<&str> = request_path.splitn(2, FS_PATH_DELIMITER).collect();
    if parts.len() != 2 {
        return Err(bad_request("missing /@v/ delimiter"));
    }
    let module = path::decode_path(parts[0])?;
    let rest = parts[1];

    if rest == "list" {
        return Ok(ModRequest {
            module,
            version: None,
            action: ModAction::List,
        });
    }

    let dot = rest.rfind('.').ok_or_else(|| bad_request("missing version extension"))?;
    let version = rest[..dot].to_string();
    let action = match &rest[dot + 1..] {
        "info" => ModAction::Info,
        "mod" => ModAction::Mod,
        "zip" => ModAction::Zip,
        other => return Err(bad_request(&format!("unsupported action '{other}'"))),
    };

    Ok(ModRequest {
        module,
        version: Some(version),
        action,
    })
}

pub fn go_get_required(version: &str) -> bool {
    version == "latest" || version == "master"
}

/// Synthesizes a pseudo-version for a commit with no matching tag:
/// `vX.Y.Z-YYYYMMDDhhmmss-hash` with the hash truncated to 12 hex chars.
pub fn pseudo_version(base_version: &str, timestamp: DateTime<Utc>, commit_hash: &str) -> String {
    let short_hash: String = commit_hash.chars().take(12).collect();
    format!(
        "{base_version}-{ts}-{short_hash}",
        ts = timestamp.format("%Y%m%d%H%M%S")
    )
}

static PSEUDO_VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(v[0-9]+\.[0-9]+\.[0-9]+)-([0-9]{14})-([0-9a-fA-F]+)$").unwrap());

/// Parses `version`'s timestamp iff it has the exact pseudo-version shape
/// `pseudo_version` produces (validated by reconstructing it and comparing).
fn pseudo_version_timestamp(version: &str) -> Option<DateTime<Utc>> {
    let caps = PSEUDO_VERSION_RE.captures(version)?;
    let base = caps.get(1)?.as_str();
    let ts_raw = caps.get(2)?.as_str();
    let hash = caps.get(3)?.as_str();
    let naive = chrono::NaiveDateTime::parse_from_str(ts_raw, "%Y%m%d%H%M%S").ok()?;
    let time = DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc);
    if pseudo_version(base, time, hash) != version {
        return None;
    }
    Some(time)
}

/// Synthesizes the `.info` JSON body locally when the file is missing but
/// the `.mod` file is present and `version` has the pseudo-version shape,
/// per the module proxy cache's step-4 fallback.
fn synthesize_pseudo_info(mod_file_path: &Path, version: &str) -> Option<Vec<u8>> {
    if !mod_file_path.is_file() {
        return None;
    }
    let time = pseudo_version_timestamp(version)?;
    let info = serde_json::json!({
        "Version": version,
        "Time": time.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
    });
    serde_json::to_vec(&info).ok()
}

pub struct ModuleCache {
    settings: ModuleSettings,
    runner: Arc<dyn ToolchainRunner>,
    store: Arc<Store>,
    in_flight: DashSet<String>,
}

impl ModuleCache {
    pub fn new(settings: ModuleSettings, runner: Arc<dyn ToolchainRunner>, store: Arc<Store>) -> Self {
        Self {
            settings,
            runner,
            store,
            in_flight: DashSet::new(),
        }
    }

    fn mod_cache_dir(&self) -> PathBuf {
        PathBuf::from(&self.settings.go_path)
            .join("pkg")
            .join("mod")
            .join("cache")
            .join("download")
    }

    /// The module proxy is available only when a toolchain binary is
    /// configured, it reports a module-capable version, and the admin
    /// kill switch has not disabled it. `disabled` is read from
    /// `admin.disable.gomod_repo` by the caller.
    pub fn check_availability(&self, disabled: bool) -> Result<(), EdgeError> {
        if disabled {
            return Err(EdgeError::Unavailable("module proxy disabled by admin".to_string()));
        }
        if self.settings.go_binary.is_empty() {
            return Err(EdgeError::Unavailable("no go toolchain configured".to_string()));
        }
        let output = self
            .runner
            .run(&self.settings.go_binary, &["version".to_string()], &[], PathBuf::from(".").as_path())
            .map_err(|e| EdgeError::Unavailable(format!("go toolchain unreachable: {e}")))?;
        let banner = String::from_utf8_lossy(&output.stdout);
        if !toolchain::supports_modules(&banner) {
            return Err(EdgeError::Unavailable(
                "go toolchain predates module support (1.11)".to_string(),
            ));
        }
        Ok(())
    }

    /// Reads the response body and content type for one module-proxy
    /// request, downloading through the toolchain on a cache miss (or
    /// synthesizing `.info` locally per step 4) as needed.
    pub fn serve(&self, req: &ModRequest) -> Result<(&'static str, Vec<u8>), EdgeError> {
        let encoded = path::encode_path(&req.module)?;
        match req.action {
            ModAction::List => {
                let list_path = self.list_file_path(&encoded);
                if !list_path.is_file() {
                    self.ensure_downloaded(&req.module, "latest")?;
                }
                let body = std::fs::read(&list_path)
                    .map_err(|e| EdgeError::Internal(format!("reading version list: {e}")))?;
                Ok(("text/plain; charset=utf-8", body))
            }
            ModAction::Info | ModAction::Mod | ModAction::Zip => {
                let version = req
                    .version
                    .as_deref()
                    .ok_or_else(|| EdgeError::NotFound("missing module version".to_string()))?;
                let ext = match req.action {
                    ModAction::Info => "info",
                    ModAction::Mod => "mod",
                    ModAction::Zip => "zip",
                    ModAction::List => unreachable!(),
                };
                let file_path = self.version_file_path(&encoded, version, ext);
                if !file_path.is_file() {
                    if req.action == ModAction::Info {
                        let mod_path = self.version_file_path(&encoded, version, "mod");
                        if let Some(body) = synthesize_pseudo_info(&mod_path, version) {
                            return Ok(("application/json", body));
                        }
                    }
                    self.ensure_downloaded(&req.module, version)?;
                }
                let content_type = match req.action {
                    ModAction::Info => "application/json",
                    ModAction::Mod => "text/plain; charset=utf-8",
                    ModAction::Zip => "application/zip",
                    ModAction::List => unreachable!(),
                };
                let body = std::fs::read(&file_path)
                    .map_err(|e| EdgeError::Internal(format!("reading {ext} file: {e}")))?;
                Ok((content_type, body))
            }
        }
    }

    /// Ensures `module@version` is present in the disk cache, downloading
    /// it through the toolchain if necessary. Concurrent callers for the
    /// same key coalesce onto a single download.
    pub fn ensure_downloaded(&self, module: &str, version: &str) -> Result<(), EdgeError> {
        let key = format!("{module}@{version}");
        let encoded = path::encode_path(module).unwrap_or_else(|_| module.to_string());
        let zip_path = self.version_file_path(&encoded, version, "zip");
        if zip_path.is_file() {
            return Ok(());
        }

        if !self.in_flight.insert(key.clone()) {
            while self.in_flight.contains(&key) {
                std::thread::sleep(std::time::Duration::from_millis(20));
            }
            return if zip_path.is_file() {
                Ok(())
            } else {
                Err(EdgeError::Upstream(format!("download of {key} did not produce a cache entry")))
            };
        }

        let result = self.download(module, version);
        self.in_flight.remove(&key);
        result?;
        self.save_stats()?;
        Ok(())
    }

    fn download(&self, module: &str, version: &str) -> Result<(), EdgeError> {
        let workdir = tempfile_dir()?;
        let args = if go_get_required(version) {
            vec!["get".to_string(), "-v".to_string(), format!("{module}@{version}")]
        } else {
            vec!["mod".to_string(), "download".to_string(), format!("{module}@{version}")]
        };
        let env = vec![("GOPATH".to_string(), self.settings.go_path.clone())];
        let output = self
            .runner
            .run(&self.settings.go_binary, &args, &env, &workdir)
            .map_err(|e| EdgeError::Upstream(format!("running go toolchain: {e}")))?;
        let _ = std::fs::remove_dir_all(&workdir);
        if output.status != 0 {
            return Err(EdgeError::Upstream(format!(
                "go toolchain exited {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(())
    }

    fn version_file_path(&self, encoded: &str, version: &str, ext: &str) -> PathBuf {
        self.mod_cache_dir()
            .join(encoded)
            .join("@v")
            .join(format!("{version}.{ext}"))
    }

    fn list_file_path(&self, encoded: &str) -> PathBuf {
        self.mod_cache_dir().join(encoded).join("@v").join("list")
    }

    /// Counts `.mod` files under the cache directory, the original
    /// system's module-count statistic.
    pub fn count_mod_files(&self) -> usize {
        fn walk(dir: &std::path::Path, count: &mut usize) {
            let Ok(entries) = std::fs::read_dir(dir) else { return };
            for entry in entries.flatten() {
                let p = entry.path();
                if p.is_dir() {
                    walk(&p, count);
                } else if p.extension().and_then(|e| e.to_str()) == Some("mod") {
                    *count += 1;
                }
            }
        }
        let mut count = 0;
        walk(&self.mod_cache_dir(), &mut count);
        count
    }

    fn save_stats(&self) -> Result<(), EdgeError> {
        let stats = crate::models::ModuleStats {
            total_count: self.count_mod_files() as i64,
        };
        self.store.put(BUCKET_GOMODULES, "stats", &stats)
    }
}

fn tempfile_dir() -> Result<PathBuf, EdgeError> {
    let mut dir = std::env::temp_dir();
    dir.push(format!("edgevanity-gomod-{}", std::process::id()));
    std::fs::create_dir_all(&dir).map_err(|e| EdgeError::Internal(format!("creating workdir: {e}")))?;
    Ok(dir)
}
