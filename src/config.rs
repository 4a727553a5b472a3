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

use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::{collections::HashMap, error::Error, fs};

/// Admin virtual host + IP allow-list + go-module kill switch.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AdminConfig {
    pub host: String,
    #[serde(default)]
    pub allow_only: Vec<String>,
    #[serde(default)]
    pub contact_email: String,
    #[serde(default)]
    pub disable: DisableConfig,
    #[serde(default)]
    pub data_store: DataStoreConfig,
    #[serde(default = "default_admin_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DisableConfig {
    #[serde(default)]
    pub gomod_repo: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataStoreConfig {
    #[serde(default = "default_data_dir")]
    pub directory: String,
}

impl Default for DataStoreConfig {
    fn default() -> Self {
        Self {
            directory: default_data_dir(),
        }
    }
}

fn default_data_dir() -> String {
    "data".to_string()
}

/// Session / anti-CSRF signing and encryption keys (hex strings).
#[derive(Debug, Deserialize, Clone, Default)]
pub struct SecurityConfig {
    #[serde(default)]
    pub session: KeyPair,
    #[serde(default)]
    pub anti_csrf: KeyPair,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct KeyPair {
    #[serde(default)]
    pub sign_key: String,
    #[serde(default)]
    pub enc_key: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ServerConfig {
    #[serde(default = "default_edge_port")]
    pub port: u16,
    #[serde(default)]
    pub header: String,
}

fn default_edge_port() -> u16 {
    8080
}

fn default_admin_port() -> u16 {
    8081
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct UserEntry {
    pub password: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub expired: bool,
}

/// Top-level configuration document, loaded from a single hierarchical
/// YAML file with `admin`, `security`, `server`, `log`, and
/// `user_datastore` sections.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub env: EnvConfig,
    pub admin: AdminConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub user_datastore: HashMap<String, UserEntry>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct EnvConfig {
    #[serde(default)]
    pub active: String,
}

/// Global, lazily-initialized config object shared across the application.
pub static CONFIG: OnceCell<Config> = OnceCell::new();

impl Config {
    /// Parses configuration from a YAML file and applies the active
    /// environment's override block, if the document defines one under
    /// `environments.<active>`.
    pub fn from_file(path: &str) -> Result<Self, Box<dyn Error>> {
        let contents = fs::read_to_string(path)?;
        let mut root: serde_yaml::Value = serde_yaml::from_str(&contents)?;

        if let Some(active) = root
            .get("env")
            .and_then(|e| e.get("active"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
        {
            if let Some(envs) = root.get("environments").cloned() {
                if let Some(overlay) = envs.get(&active) {
                    merge_yaml(&mut root, overlay);
                }
            }
        }

        let parsed: Config = serde_yaml::from_value(root)?;

        if parsed.admin.host.trim().is_empty() {
            return Err("admin.host is required and cannot be empty.".into());
        }

        Ok(parsed)
    }

    /// Returns the admin IP allow-list, with loopback entries guaranteed
    /// present whenever the list is non-empty.
    pub fn admin_allow_list(&self) -> Vec<String> {
        let mut list = self.admin.allow_only.clone();
        if !list.is_empty() {
            for loopback in ["127.0.0.1", "::1"] {
                if !list.iter().any(|ip| ip == loopback) {
                    list.push(loopback.to_string());
                }
            }
        }
        list
    }
}

fn merge_yaml(base: &mut serde_yaml::Value, overlay: &serde_yaml::Value) {
    match (base, overlay) {
        (serde_yaml::Value::Mapping(base_map), serde_yaml::Value::Mapping(overlay_map)) => {
            for (k, v) in overlay_map {
                match base_map.get_mut(k) {
                    Some(existing) => merge_yaml(existing, v),
                    None => {
                        base_map.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (base_slot, overlay_value) => {
            *base_slot = overlay_value.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_config(yaml: &str, suffix: &str) -> String {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "edgevanity-test-{}-{}.yaml",
            std::process::id(),
            suffix
        ));
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(yaml.as_bytes()).unwrap();
        path.to_string_lossy().to_string()
    }

    #[test]
    fn loads_minimal_config() {
        let path = temp_config("admin:\n  host: admin.example.org\n", "minimal");
        let cfg = Config::from_file(&path).unwrap();
        assert_eq!(cfg.admin.host, "admin.example.org");
        assert_eq!(cfg.server.port, 8080);
        fs::remove_file(path).ok();
    }

    #[test]
    fn rejects_missing_admin_host() {
        let path = temp_config("admin:\n  host: \"\"\n", "missing-host");
        let err = Config::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("admin.host"));
        fs::remove_file(path).ok();
    }

    #[test]
    fn allow_list_always_includes_loopback() {
        let mut cfg = Config::default();
        cfg.admin.allow_only = vec!["10.0.0.5".to_string()];
        let list = cfg.admin_allow_list();
        assert!(list.contains(&"127.0.0.1".to_string()));
        assert!(list.contains(&"::1".to_string()));
    }

    #[test]
    fn empty_allow_list_stays_empty() {
        let cfg = Config::default();
        assert!(cfg.admin_allow_list().is_empty());
    }

    #[test]
    fn environment_overlay_merges_nested_keys() {
        let path = temp_config(
            r#"
admin:
  host: admin.example.org
server:
  port: 8080
env:
  active: prod
environments:
  prod:
    server:
      port: 9090
"#,
            "overlay",
        );
        let cfg = Config::from_file(&path).unwrap();
        assert_eq!(cfg.server.port, 9090);
        fs::remove_file(path).ok();
    }
}
