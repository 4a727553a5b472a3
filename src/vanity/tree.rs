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

//! Radix tree mapping lowercased import paths to vanity packages, with
//! longest-prefix lookup: a request for `/foo/bar/baz` resolves to the
//! package registered at `/foo/bar` if no exact node covers the rest.

use crate::error::EdgeError;
use crate::models::VanityPackage;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct Node {
    idx: u8,
    label: String,
    value: Option<Arc<VanityPackage>>,
    edges: Vec<Node>,
}

fn common_prefix_len(a: &str, b: &str) -> usize {
    a.bytes().zip(b.bytes()).take_while(|(x, y)| x == y).count()
}

impl Node {
    pub fn new_root() -> Self {
        Node::default()
    }

    /// Inserts `path` (already lowercased by the caller). Returns an error
    /// if a package is already registered at exactly this path.
    pub fn insert(&mut self, path: &str, value: Arc<VanityPackage>) -> Result<(), EdgeError> {
        if path.is_empty() {
            if self.value.is_some() {
                return Err(EdgeError::AlreadyExists(
                    "a vanity package is already registered at this path".to_string(),
                ));
            }
            self.value = Some(value);
            return Ok(());
        }

        let idx = path.as_bytes()[0];
        if let Some(pos) = self.edges.iter().position(|e| e.idx == idx) {
            let cp = common_prefix_len(&self.edges[pos].label, path);
            let child_label_len = self.edges[pos].label.len();

            if cp == child_label_len {
                return self.edges[pos].insert(&path[cp..], value);
            }

            let mut old_child = self.edges.remove(pos);
            let mid_label = old_child.label[..cp].to_string();
            old_child.label = old_child.label[cp..].to_string();
            old_child.idx = old_child.label.as_bytes()[0];

            let mut mid = Node {
                idx,
                label: mid_label,
                value: None,
                edges: vec![old_child],
            };

            if cp == path.len() {
                mid.value = Some(value);
            } else {
                let rest = path[cp..].to_string();
                mid.edges.push(Node {
                    idx: rest.as_bytes()[0],
                    label: rest,
                    value: Some(value),
                    edges: vec![],
                });
            }

            self.edges.push(mid);
            Ok(())
        } else {
            self.edges.push(Node {
                idx,
                label: path.to_string(),
                value: Some(value),
                edges: vec![],
            });
            Ok(())
        }
    }

    /// Longest-prefix lookup: descends while edges match, remembering the
    /// most recent node carrying a value.
    pub fn lookup(&self, path: &str) -> Option<Arc<VanityPackage>> {
        let mut node = self;
        let mut remaining = path;
        let mut last = node.value.clone();

        loop {
            if remaining.is_empty() {
                break;
            }
            let idx = remaining.as_bytes()[0];
            match node.edges.iter().find(|e| e.idx == idx) {
                Some(child) if remaining.starts_with(child.label.as_str()) => {
                    remaining = &remaining[child.label.len()..];
                    node = child;
                    if node.value.is_some() {
                        last = node.value.clone();
                    }
                }
                _ => break,
            }
        }

        last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg(path: &str) -> Arc<VanityPackage> {
        Arc::new(VanityPackage {
            host: String::new(),
            path: path.to_string(),
            repo: "https://example.com/repo.git".to_string(),
            vcs: "git".to_string(),
            src: String::new(),
            root_sub_pkgs: String::new(),
        })
    }

    #[test]
    fn exact_match_returns_value() {
        let mut root = Node::new_root();
        root.insert("/foo", pkg("/foo")).unwrap();
        let found = root.lookup("/foo").unwrap();
        assert_eq!(found.path, "/foo");
    }

    #[test]
    fn longest_prefix_wins_for_subpaths() {
        let mut root = Node::new_root();
        root.insert("/foo", pkg("/foo")).unwrap();
        let found = root.lookup("/foo/bar/baz").unwrap();
        assert_eq!(found.path, "/foo");
    }

    #[test]
    fn sibling_branches_do_not_collide() {
        let mut root = Node::new_root();
        root.insert("/foo", pkg("/foo")).unwrap();
        root.insert("/foobar", pkg("/foobar")).unwrap();
        assert_eq!(root.lookup("/foobar/x").unwrap().path, "/foobar");
        assert_eq!(root.lookup("/foo/x").unwrap().path, "/foo");
    }

    #[test]
    fn unregistered_path_returns_none() {
        let mut root = Node::new_root();
        root.insert("/foo", pkg("/foo")).unwrap();
        assert!(root.lookup("/bar").is_none());
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let mut root = Node::new_root();
        root.insert("/foo", pkg("/foo")).unwrap();
        assert!(root.insert("/foo", pkg("/foo")).is_err());
    }

    #[test]
    fn node_splitting_preserves_both_branches() {
        let mut root = Node::new_root();
        root.insert("/team/alpha", pkg("/team/alpha")).unwrap();
        root.insert("/team/beta", pkg("/team/beta")).unwrap();
        assert_eq!(root.lookup("/team/alpha").unwrap().path, "/team/alpha");
        assert_eq!(root.lookup("/team/beta").unwrap().path, "/team/beta");
        assert!(root.lookup("/team/gamma").is_none());
    }
}
