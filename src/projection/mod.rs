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

//! In-memory configuration projection over the persistent store: the
//! source of truth for every request-serving decision, rebuilt from disk
//! at startup and mutated only through the write-through methods below
//! (store first, in-memory swap second, never partially).

use crate::error::EdgeError;
use crate::models::{ModuleSettings, ProxyRule, VanityPackage};
use crate::proxy::{ProxyHost, ProxyHosts};
use crate::store::{BUCKET_GOMODULES, BUCKET_GOVANITIES, BUCKET_PROXIES, Store};
use crate::vanity::Vanities;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct HostRules {
    rules: Vec<ProxyRule>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct HostVanities {
    packages: Vec<VanityPackage>,
}

pub struct Projection {
    store: Arc<Store>,
    proxy_hosts: ProxyHosts,
    vanities: Vanities,
    module_settings: RwLock<ModuleSettings>,
    server_header: Option<String>,
}

impl Projection {
    /// Loads every persisted host's rules and vanity packages, compiling
    /// each into the live in-memory projection. A host whose rules fail
    /// to compile is skipped with its error surfaced to the caller for
    /// logging, so one bad host cannot prevent the rest from serving.
    pub fn load(store: Arc<Store>, server_header: Option<String>) -> Result<(Self, Vec<(String, EdgeError)>), EdgeError> {
        let proxy_hosts = ProxyHosts::new();
        let vanities = Vanities::new();
        let mut load_errors = Vec::new();

        for key in store.keys(BUCKET_PROXIES)? {
            let Some(hr): Option<HostRules> = store.get(BUCKET_PROXIES, &key)? else {
                continue;
            };
            match ProxyHost::compile(&hr.rules, server_header.clone()) {
                Ok(host) => proxy_hosts.insert(&key, host),
                Err(e) => load_errors.push((key, e)),
            }
        }

        for key in store.keys(BUCKET_GOVANITIES)? {
            let Some(hv): Option<HostVanities> = store.get(BUCKET_GOVANITIES, &key)? else {
                continue;
            };
            if let Err(e) = vanities.rebuild_host(&key, hv.packages) {
                load_errors.push((key, e));
            }
        }

        let module_settings = store
            .get(BUCKET_GOMODULES, "settings")?
            .unwrap_or_default();

        Ok((
            Self {
                store,
                proxy_hosts,
                vanities,
                module_settings: RwLock::new(module_settings),
                server_header,
            },
            load_errors,
        ))
    }

    pub fn proxy_host(&self, host: &str) -> Option<Arc<ProxyHost>> {
        self.proxy_hosts.get(host)
    }

    pub fn vanity_lookup(&self, host: &str, path: &str) -> Option<Arc<VanityPackage>> {
        self.vanities.lookup(host, path)
    }

    pub fn module_settings(&self) -> ModuleSettings {
        self.module_settings.read().unwrap().clone()
    }

    /// Replaces a host's full rule list, compiling before committing to
    /// disk so an invalid rule set never reaches the store.
    pub fn import_host(&self, host: &str, rules: Vec<ProxyRule>) -> Result<(), EdgeError> {
        let compiled = ProxyHost::compile(&rules, self.server_header.clone())?;
        self.store
            .put(BUCKET_PROXIES, host, &HostRules { rules })?;
        self.proxy_hosts.insert(host, compiled);
        Ok(())
    }

    pub fn add_rule(&self, host: &str, rule: ProxyRule) -> Result<(), EdgeError> {
        let mut rules = self.current_rules(host)?;
        rules.push(rule);
        self.import_host(host, rules)
    }

    pub fn update_rule(&self, host: &str, index: usize, rule: ProxyRule) -> Result<(), EdgeError> {
        let mut rules = self.current_rules(host)?;
        if index >= rules.len() {
            return Err(EdgeError::NotFound(format!("rule index {index} on host {host}")));
        }
        rules[index] = rule;
        self.import_host(host, rules)
    }

    pub fn del_rule(&self, host: &str, index: usize) -> Result<(), EdgeError> {
        let mut rules = self.current_rules(host)?;
        if index >= rules.len() {
            return Err(EdgeError::NotFound(format!("rule index {index} on host {host}")));
        }
        rules.remove(index);
        if rules.is_empty() {
            self.store.del(BUCKET_PROXIES, host)?;
            self.proxy_hosts.remove(host);
            return Ok(());
        }
        self.import_host(host, rules)
    }

    fn current_rules(&self, host: &str) -> Result<Vec<ProxyRule>, EdgeError> {
        let hr: Option<HostRules> = self.store.get(BUCKET_PROXIES, host)?;
        Ok(hr.map(|h| h.rules).unwrap_or_default())
    }

    pub fn add_package(&self, host: &str, package: VanityPackage) -> Result<(), EdgeError> {
        let mut packages = self.current_packages(host)?;
        packages.push(package);
        self.rebuild_vanity_host(host, packages)
    }

    pub fn del_package(&self, host: &str, path: &str) -> Result<(), EdgeError> {
        let mut packages = self.current_packages(host)?;
        let before = packages.len();
        packages.retain(|p| p.path != path);
        if packages.len() == before {
            return Err(EdgeError::NotFound(format!("vanity package {path} on host {host}")));
        }
        self.rebuild_vanity_host(host, packages)
    }

    fn current_packages(&self, host: &str) -> Result<Vec<VanityPackage>, EdgeError> {
        let hv: Option<HostVanities> = self.store.get(BUCKET_GOVANITIES, host)?;
        Ok(hv.map(|h| h.packages).unwrap_or_default())
    }

    fn rebuild_vanity_host(&self, host: &str, packages: Vec<VanityPackage>) -> Result<(), EdgeError> {
        // Validate first so an invalid package never reaches the store.
        let probe = Vanities::new();
        probe.rebuild_host(host, packages.clone())?;

        if packages.is_empty() {
            self.store.del(BUCKET_GOVANITIES, host)?;
            self.vanities.remove_host(host);
            return Ok(());
        }

        self.store
            .put(BUCKET_GOVANITIES, host, &HostVanities { packages: packages.clone() })?;
        self.vanities.rebuild_host(host, packages)
    }

    pub fn save_module_settings(&self, settings: ModuleSettings) -> Result<(), EdgeError> {
        self.store.put(BUCKET_GOMODULES, "settings", &settings)?;
        *self.module_settings.write().unwrap() = settings;
        Ok(())
    }
}
