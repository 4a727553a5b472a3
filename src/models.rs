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

//! Persisted and in-flight data shapes. These mirror the store's JSON
//! documents; `#[serde(default)]` on every optional field lets older
//! documents load cleanly as fields are added.

use serde::{Deserialize, Serialize};

/// Request/response header mutation: an add-map plus a remove-list.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct HeaderMutation {
    #[serde(default)]
    pub add: std::collections::HashMap<String, String>,
    #[serde(default)]
    pub remove: Vec<String>,
}

/// Extension + regex based file restriction.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct RestrictFiles {
    #[serde(default)]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub regexes: Vec<String>,
}

/// A single static-directory mount.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyStatic {
    pub target_path: String,
    #[serde(default)]
    pub strip_prefix: String,
}

/// A single redirect declared on a proxy rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyRedirect {
    #[serde(rename = "match")]
    pub match_path: String,
    pub target: String,
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub is_abs: bool,
}

/// `ProxyRule` descriptor as persisted in the `proxies` bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyRule {
    pub target_url: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub query_params: std::collections::HashMap<String, String>,
    #[serde(default)]
    pub headers: std::collections::HashMap<String, String>,
    #[serde(default)]
    pub request_headers: Option<HeaderMutation>,
    #[serde(default)]
    pub response_headers: Option<HeaderMutation>,
    #[serde(default)]
    pub restrict_files: Option<RestrictFiles>,
    #[serde(default)]
    pub redirects: Vec<ProxyRedirect>,
    #[serde(default)]
    pub statics: Vec<ProxyStatic>,
    #[serde(default)]
    pub skip_tls_verify: bool,
    #[serde(default)]
    pub last: bool,
}

/// Vanity package descriptor as persisted in the `govanities` bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VanityPackage {
    #[serde(default)]
    pub host: String,
    pub path: String,
    pub repo: String,
    #[serde(default)]
    pub vcs: String,
    #[serde(default)]
    pub src: String,
    /// Comma-separated list of extra sub-paths that should resolve to this
    /// package when it is the host's root vanity (`path == ROOT_SENTINEL`).
    /// Ignored on non-root packages.
    #[serde(default)]
    pub root_sub_pkgs: String,
}

impl VanityPackage {
    pub fn vcs_or_default(&self) -> &str {
        if self.vcs.is_empty() { "git" } else { &self.vcs }
    }
}

/// External toolchain / workspace settings for the module proxy cache.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ModuleSettings {
    #[serde(default)]
    pub go_binary: String,
    #[serde(default)]
    pub go_path: String,
    #[serde(default)]
    pub go_proxy: String,
}

/// Running statistics about the module cache.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ModuleStats {
    #[serde(default)]
    pub total_count: i64,
}

/// An admin user record (shape only; auth/session handling is external).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub password_hash: Vec<u8>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub expired: bool,
}
