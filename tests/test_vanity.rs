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

#[cfg(test)]
mod tests {
    use edgevanity::models::VanityPackage;
    use edgevanity::vanity::{Vanities, render_discovery_html};

    fn pkg(path: &str, repo: &str) -> VanityPackage {
        VanityPackage {
            host: "example.org".to_string(),
            path: path.to_string(),
            repo: repo.to_string(),
            vcs: String::new(),
            src: String::new(),
            root_sub_pkgs: String::new(),
        }
    }

    #[test]
    fn host_lookup_is_case_insensitive() {
        let registry = Vanities::new();
        registry
            .rebuild_host("Example.ORG", vec![pkg("/tool", "https://github.com/acme/tool.git")])
            .unwrap();
        assert!(registry.lookup("example.org", "/tool").is_some());
        assert!(registry.lookup("EXAMPLE.ORG", "/tool").is_some());
    }

    #[test]
    fn unregistered_host_returns_none() {
        let registry = Vanities::new();
        assert!(registry.lookup("nope.example.org", "/tool").is_none());
    }

    #[test]
    fn rebuild_host_replaces_previous_tree_entirely() {
        let registry = Vanities::new();
        registry
            .rebuild_host("example.org", vec![pkg("/old", "https://github.com/acme/old.git")])
            .unwrap();
        registry
            .rebuild_host("example.org", vec![pkg("/new", "https://github.com/acme/new.git")])
            .unwrap();
        assert!(registry.lookup("example.org", "/old").is_none());
        assert!(registry.lookup("example.org", "/new").is_some());
    }

    #[test]
    fn discovery_html_embeds_go_source_links_for_github_repos() {
        let registry = Vanities::new();
        registry
            .rebuild_host("example.org", vec![pkg("/tool", "https://github.com/acme/tool.git")])
            .unwrap();
        let found = registry.lookup("example.org", "/tool").unwrap();
        let html = render_discovery_html("example.org/tool", &found);
        assert!(html.contains("go-source"));
        assert!(html.contains("tree/master"));
    }
}
