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

//! Go vanity-import discovery: a per-host radix tree of import paths plus
//! an optional root package served at the bare host name.

pub mod tree;

use crate::error::{EdgeError, FieldError};
use crate::models::VanityPackage;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tree::Node;

/// Path value meaning "this package is the host's own bare import path",
/// as opposed to a path under it.
pub const ROOT_SENTINEL: &str = "@";

pub struct VanityHost {
    tree: Node,
    root: Option<Arc<VanityPackage>>,
    root_sub_pkgs: HashSet<String>,
}

impl VanityHost {
    /// True when the host has a root package and `path` is either the bare
    /// host path or one of the root's admin-declared `rootSubPkgs`. Only
    /// meaningful on a tree-lookup miss: a sub-package registered in the
    /// tree always takes precedence over the root.
    pub fn is_root_vanity(&self, path: &str) -> bool {
        if self.root.is_none() {
            return false;
        }
        let trimmed = path.trim_start_matches('/');
        if trimmed.is_empty() {
            return true;
        }
        let first_seg = trimmed.split('/').next().unwrap_or("");
        self.root_sub_pkgs.contains(first_seg)
    }

    pub fn lookup(&self, path: &str) -> Option<Arc<VanityPackage>> {
        let lowered = path.to_lowercase();
        if let Some(found) = self.tree.lookup(&lowered) {
            return Some(found);
        }
        if self.is_root_vanity(&lowered) {
            return self.root.clone();
        }
        None
    }
}

/// Parses a root package's comma-separated `rootSubPkgs` field into the
/// normalized set consulted by [`VanityHost::is_root_vanity`].
fn parse_root_sub_pkgs(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(|s| s.trim().trim_start_matches('/').to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Registry of vanity hosts, keyed by lowercased hostname.
#[derive(Default)]
pub struct Vanities {
    hosts: DashMap<String, Arc<VanityHost>>,
}

impl Vanities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, host: &str, path: &str) -> Option<Arc<VanityPackage>> {
        self.hosts
            .get(&host.to_lowercase())
            .and_then(|h| h.lookup(path))
    }

    /// Rebuilds a single host's tree from its full package list. Packages
    /// are processed (validated + normalized) before insertion; the first
    /// validation failure aborts the whole rebuild.
    pub fn rebuild_host(&self, host: &str, packages: Vec<VanityPackage>) -> Result<(), EdgeError> {
        let mut root: Option<Arc<VanityPackage>> = None;
        let mut node = Node::new_root();

        for raw in packages {
            let processed = process_vanity_package(raw)?;
            if processed.path == ROOT_SENTINEL {
                root = Some(Arc::new(processed));
                continue;
            }
            let key = processed.path.to_lowercase();
            let arc = Arc::new(processed);
            node.insert(&key, arc)?;
        }

        let root_sub_pkgs = root
            .as_ref()
            .map(|r| parse_root_sub_pkgs(&r.root_sub_pkgs))
            .unwrap_or_default();

        self.hosts.insert(
            host.to_lowercase(),
            Arc::new(VanityHost {
                tree: node,
                root,
                root_sub_pkgs,
            }),
        );
        Ok(())
    }

    pub fn remove_host(&self, host: &str) {
        self.hosts.remove(&host.to_lowercase());
    }
}

/// Validates and normalizes a vanity package exactly as the original
/// system's load-time processing does: rejects the bare `/` path, trims a
/// trailing slash, derives browse-source links for github.com/bitbucket.org
/// repos, defaults the VCS to `git`, and requires a `.git` repo suffix
/// when the VCS is `git`.
pub fn process_vanity_package(mut pkg: VanityPackage) -> Result<VanityPackage, EdgeError> {
    if pkg.path == "/" {
        return Err(EdgeError::validation(vec![FieldError::new(
            "path",
            "path cannot be the bare root \"/\"; use the root sentinel instead",
        )]));
    }
    if pkg.path != ROOT_SENTINEL {
        if let Some(stripped) = pkg.path.strip_suffix('/') {
            pkg.path = stripped.to_string();
        }
    }

    if pkg.vcs.is_empty() {
        pkg.vcs = "git".to_string();
    }

    if pkg.vcs == "git" && !pkg.repo.ends_with(".git") {
        return Err(EdgeError::validation(vec![FieldError::new(
            "repo",
            "git-backed vanity packages must reference a repo URL ending in .git",
        )]));
    }

    if pkg.src.is_empty() {
        let repo = pkg.repo.trim_end_matches('/');
        if let Some(base) = repo.strip_prefix("https://github.com/") {
            let base = base.strip_suffix(".git").unwrap_or(base);
            pkg.src = format!(
                "https://github.com/{base} https://github.com/{base}/tree/master{{/dir}} https://github.com/{base}/blob/master{{/dir}}/{{file}}#L{{line}}"
            );
        } else if let Some(base) = repo.strip_prefix("https://bitbucket.org/") {
            let base = base.strip_suffix(".git").unwrap_or(base);
            pkg.src = format!(
                "https://bitbucket.org/{base} https://bitbucket.org/{base}/src/default{{/dir}} https://bitbucket.org/{base}/src/default{{/dir}}/{{file}}#{{file}}-{{line}}"
            );
        }
    }

    Ok(pkg)
}

/// Renders the standard `go-import`/`go-source` discovery page for a
/// resolved package at `import_path` (host + vanity path).
pub fn render_discovery_html(import_path: &str, pkg: &VanityPackage) -> String {
    let vcs = pkg.vcs_or_default();
    let go_source = if pkg.src.is_empty() {
        String::new()
    } else {
        format!(
            "\n    <meta name=\"go-source\" content=\"{import_path} {src}\">",
            import_path = import_path,
            src = pkg.src
        )
    };
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n    <meta charset=\"utf-8\">\n    \
         <meta name=\"go-import\" content=\"{import_path} {vcs} {repo}\">{go_source}\n</head>\n\
         <body>\n    go get {import_path}\n</body>\n</html>\n",
        import_path = import_path,
        vcs = vcs,
        repo = pkg.repo,
        go_source = go_source,
    )
}
