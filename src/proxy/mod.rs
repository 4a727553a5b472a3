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

//! Proxy engine: per-host ordered rule lists compiled from persisted
//! [`ProxyRule`]s, matched path -> query-params -> headers with
//! first-full-match-wins semantics and an optional terminal (`last`)
//! fallback rule, executed as restriction check -> redirect -> static
//! file -> reverse proxy.

pub mod redirect;
pub mod reverse;

use crate::error::{EdgeError, FieldError};
use crate::models::ProxyRule;
use dashmap::DashMap;
use http::{HeaderMap, Method, Request, Response, StatusCode, Uri};
use hyper::Body;
use regex::Regex;
use redirect::CompiledRedirect;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

enum PathMatch {
    Exact(String),
    Regex(Regex),
}

impl PathMatch {
    fn matches(&self, path: &str) -> bool {
        match self {
            PathMatch::Exact(p) => p == path,
            PathMatch::Regex(re) => re.is_match(path),
        }
    }
}

struct RestrictCompiled {
    extensions: HashSet<String>,
    regexes: Vec<Regex>,
}

/// Returns the filename extension the way Go's `path.Ext` does: everything
/// from the last `.` in the filename onward, including the leading dot, with
/// no special-casing for dotfiles (so `.env`'s extension is `.env`).
fn filename_extension(filename: &str) -> Option<&str> {
    filename.rfind('.').map(|i| &filename[i..])
}

impl RestrictCompiled {
    fn blocks(&self, path: &str) -> bool {
        let filename = Path::new(path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(path);

        if let Some(ext) = filename_extension(filename) {
            let normalized = ext.trim_start_matches('.').to_ascii_lowercase();
            if self.extensions.contains(&normalized) {
                return true;
            }
        }
        self.regexes.iter().any(|re| re.is_match(filename))
    }
}

pub struct CompiledStatic {
    target_path: String,
    strip_prefix: String,
}

pub struct CompiledRule {
    path: PathMatch,
    query_params: HashMap<String, String>,
    headers: HashMap<String, String>,
    request_headers: Option<crate::models::HeaderMutation>,
    response_headers: Option<crate::models::HeaderMutation>,
    restrict: Option<RestrictCompiled>,
    redirects: Vec<CompiledRedirect>,
    statics: Vec<CompiledStatic>,
    target_url: Uri,
    skip_tls_verify: bool,
    server_header: Option<String>,
    last: bool,
}

fn brace_delimited(s: &str) -> Option<&str> {
    if s.starts_with('{') && s.ends_with('}') && s.len() >= 2 {
        Some(&s[1..s.len() - 1])
    } else {
        None
    }
}

impl CompiledRule {
    pub fn compile(raw: &ProxyRule, server_header: Option<String>) -> Result<Self, EdgeError> {
        let path = if let Some(inner) = brace_delimited(&raw.path) {
            let pattern = format!("^{inner}$");
            let re = Regex::new(&pattern).map_err(|e| {
                EdgeError::validation(vec![FieldError::new("path", &format!("invalid regex: {e}"))])
            })?;
            PathMatch::Regex(re)
        } else {
            PathMatch::Exact(raw.path.clone())
        };

        let restrict = match &raw.restrict_files {
            None => None,
            Some(rf) => {
                let extensions = rf
                    .extensions
                    .iter()
                    .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                    .collect();
                let mut regexes = Vec::new();
                for pattern in &rf.regexes {
                    let inner = brace_delimited(pattern).unwrap_or(pattern.as_str());
                    let re = Regex::new(&format!("^{inner}$")).map_err(|e| {
                        EdgeError::validation(vec![FieldError::new(
                            "restrict_files.regexes",
                            &format!("invalid regex: {e}"),
                        )])
                    })?;
                    regexes.push(re);
                }
                Some(RestrictCompiled { extensions, regexes })
            }
        };

        let redirects = raw
            .redirects
            .iter()
            .map(CompiledRedirect::compile)
            .collect::<Result<Vec<_>, _>>()?;

        let statics = raw
            .statics
            .iter()
            .map(|s| CompiledStatic {
                target_path: s.target_path.clone(),
                strip_prefix: s.strip_prefix.clone(),
            })
            .collect();

        let target_url: Uri = raw.target_url.parse().map_err(|_| {
            EdgeError::validation(vec![FieldError::new("target_url", "not a valid URL")])
        })?;

        Ok(Self {
            path,
            query_params: raw.query_params.clone(),
            headers: raw.headers.clone(),
            request_headers: raw.request_headers.clone(),
            response_headers: raw.response_headers.clone(),
            restrict,
            redirects,
            statics,
            target_url,
            skip_tls_verify: raw.skip_tls_verify,
            server_header,
            last: raw.last,
        })
    }

    pub fn is_last(&self) -> bool {
        self.last
    }

    fn matches(&self, path: &str, query: &HashMap<String, String>, headers: &HeaderMap) -> bool {
        if !self.path.matches(path) {
            return false;
        }
        for (k, v) in &self.query_params {
            if query.get(k) != Some(v) {
                return false;
            }
        }
        for (k, v) in &self.headers {
            match headers.get(k.as_str()) {
                Some(hv) if hv.to_str().unwrap_or("") == v => {}
                _ => return false,
            }
        }
        true
    }
}

/// A virtual host's ordered proxy rules plus an optional terminal rule.
pub struct ProxyHost {
    rules: Vec<CompiledRule>,
    last_rule: Option<CompiledRule>,
}

impl ProxyHost {
    pub fn compile(rules: &[ProxyRule], server_header: Option<String>) -> Result<Self, EdgeError> {
        let terminal_count = rules.iter().filter(|r| r.last).count();
        if terminal_count > 1 {
            return Err(EdgeError::validation(vec![FieldError::new(
                "rules",
                "at most one rule may be marked as the terminal (last) rule",
            )]));
        }

        let mut ordered = Vec::new();
        let mut last_rule = None;
        for raw in rules {
            let compiled = CompiledRule::compile(raw, server_header.clone())?;
            if compiled.is_last() {
                last_rule = Some(compiled);
            } else {
                ordered.push(compiled);
            }
        }

        // A host with exactly one rule and no explicit terminal rule is
        // rejected rather than silently coerced into a terminal rule: an
        // unmarked single rule is ambiguous configuration, not a default.
        if last_rule.is_none() && ordered.len() == 1 {
            return Err(EdgeError::validation(vec![FieldError::new(
                "rules",
                "a host with exactly one rule must mark it as the terminal (last) rule explicitly",
            )]));
        }

        Ok(Self {
            rules: ordered,
            last_rule,
        })
    }

    fn dispatch(&self, path: &str, query: &HashMap<String, String>, headers: &HeaderMap) -> Option<&CompiledRule> {
        self.rules
            .iter()
            .find(|r| r.matches(path, query, headers))
            .or(self.last_rule.as_ref())
    }
}

/// Registry of compiled proxy hosts, keyed by lowercased hostname.
#[derive(Default)]
pub struct ProxyHosts {
    hosts: DashMap<String, Arc<ProxyHost>>,
}

impl ProxyHosts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, host: &str, proxy_host: ProxyHost) {
        self.hosts.insert(host.to_lowercase(), Arc::new(proxy_host));
    }

    pub fn remove(&self, host: &str) {
        self.hosts.remove(&host.to_lowercase());
    }

    pub fn get(&self, host: &str) -> Option<Arc<ProxyHost>> {
        self.hosts.get(&host.to_lowercase()).map(|e| e.clone())
    }
}

fn guess_content_type(path: &str) -> &'static str {
    match Path::new(path).extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()) {
        Some(ext) if ext == "html" || ext == "htm" => "text/html; charset=utf-8",
        Some(ext) if ext == "css" => "text/css; charset=utf-8",
        Some(ext) if ext == "js" => "application/javascript; charset=utf-8",
        Some(ext) if ext == "json" => "application/json",
        Some(ext) if ext == "svg" => "image/svg+xml",
        Some(ext) if ext == "png" => "image/png",
        Some(ext) if ext == "jpg" || ext == "jpeg" => "image/jpeg",
        Some(ext) if ext == "txt" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

/// Executes a matched rule against an incoming request. `scheme`/`host`
/// are the externally-observed request scheme/host, used for redirect
/// target absolutization.
pub async fn execute(
    rule: &CompiledRule,
    req: Request<Body>,
    scheme: &str,
    host: &str,
) -> Result<Response<Body>, EdgeError> {
    let path = req.uri().path().to_string();
    let request_uri = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| path.clone());

    if let Some(restrict) = &rule.restrict {
        if restrict.blocks(&path) {
            return Err(EdgeError::Restriction);
        }
    }

    if let Some((target, code)) = redirect::resolve(&rule.redirects, &request_uri, scheme, host) {
        let status = StatusCode::from_u16(code).unwrap_or(StatusCode::FOUND);
        let response = Response::builder()
            .status(status)
            .header(http::header::LOCATION, target)
            .body(Body::empty())
            .map_err(|e| EdgeError::Internal(e.to_string()))?;
        return Ok(response);
    }

    if path != "/" {
        for s in &rule.statics {
            if let Some(local_path) = resolve_static_path(s, &path) {
                if local_path.is_file() {
                    let body = std::fs::read(&local_path)
                        .map_err(|e| EdgeError::Internal(format!("reading static file: {e}")))?;
                    let content_type = guess_content_type(&local_path.to_string_lossy());
                    let response = Response::builder()
                        .status(StatusCode::OK)
                        .header(http::header::CONTENT_TYPE, content_type)
                        .body(Body::from(body))
                        .map_err(|e| EdgeError::Internal(e.to_string()))?;
                    return Ok(response);
                }
            }
        }
    }

    proxy_upstream(rule, req, &request_uri).await
}

fn resolve_static_path(s: &CompiledStatic, path: &str) -> Option<PathBuf> {
    let stripped = path.strip_prefix(&s.strip_prefix).unwrap_or(path);
    let stripped = stripped.trim_start_matches('/');
    Some(Path::new(&s.target_path).join(stripped))
}

async fn proxy_upstream(
    rule: &CompiledRule,
    req: Request<Body>,
    request_uri: &str,
) -> Result<Response<Body>, EdgeError> {
    let incoming_uri: Uri = request_uri.parse().unwrap_or_else(|_| req.uri().clone());
    let upstream_uri = reverse::build_upstream_uri(&rule.target_url, &incoming_uri);

    let (mut parts, body) = req.into_parts();
    parts.uri = upstream_uri;
    parts.method = parts.method.clone();
    if let Some(mutation) = &rule.request_headers {
        reverse::apply_header_mutation(&mut parts.headers, mutation);
    }
    reverse::ensure_user_agent(&mut parts.headers);

    let upstream_req = Request::from_parts(parts, body);
    let client = reverse::client_for(rule.skip_tls_verify);
    let mut upstream_resp = client
        .request(upstream_req)
        .await
        .map_err(|e| EdgeError::Upstream(e.to_string()))?;

    if let Some(mutation) = &rule.response_headers {
        reverse::apply_header_mutation(upstream_resp.headers_mut(), mutation);
    }
    if let Some(server) = &rule.server_header {
        if let Ok(value) = http::HeaderValue::from_str(server) {
            upstream_resp.headers_mut().insert(http::header::SERVER, value);
        }
    }

    Ok(upstream_resp)
}

/// Builds a query-parameter map from a request's URI, used by
/// [`ProxyHost::dispatch`] callers to avoid re-parsing per rule.
pub fn query_map(uri: &Uri) -> HashMap<String, String> {
    uri.query()
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .into_owned()
                .collect()
        })
        .unwrap_or_default()
}

pub fn dispatch<'a>(host: &'a ProxyHost, method: &Method, uri: &Uri, headers: &HeaderMap) -> Option<&'a CompiledRule> {
    let _ = method;
    host.dispatch(uri.path(), &query_map(uri), headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProxyRedirect, ProxyRule, RestrictFiles};

    fn base_rule(target: &str) -> ProxyRule {
        ProxyRule {
            target_url: target.to_string(),
            path: String::new(),
            query_params: HashMap::new(),
            headers: HashMap::new(),
            request_headers: None,
            response_headers: None,
            restrict_files: None,
            redirects: vec![],
            statics: vec![],
            skip_tls_verify: false,
            last: false,
        }
    }

    #[test]
    fn single_unmarked_rule_is_rejected() {
        let rule = base_rule("https://upstream.internal");
        let err = ProxyHost::compile(&[rule], None);
        assert!(err.is_err());
    }

    #[test]
    fn single_rule_marked_last_is_accepted() {
        let mut rule = base_rule("https://upstream.internal");
        rule.last = true;
        let host = ProxyHost::compile(&[rule], None).unwrap();
        assert!(host.last_rule.is_some());
    }

    #[test]
    fn multiple_terminal_rules_are_rejected() {
        let mut a = base_rule("https://a.internal");
        a.last = true;
        let mut b = base_rule("https://b.internal");
        b.last = true;
        assert!(ProxyHost::compile(&[a, b], None).is_err());
    }

    #[test]
    fn first_full_match_wins_over_later_rules() {
        let mut specific = base_rule("https://specific.internal");
        specific.path = "/api/widgets".to_string();
        let mut fallback = base_rule("https://fallback.internal");
        fallback.last = true;
        let host = ProxyHost::compile(&[specific, fallback], None).unwrap();
        let uri: Uri = "/api/widgets".parse().unwrap();
        let rule = host.dispatch(uri.path(), &HashMap::new(), &HeaderMap::new()).unwrap();
        assert_eq!(rule.target_url, "https://specific.internal".parse::<Uri>().unwrap());
    }

    #[test]
    fn regex_path_requires_full_match_not_substring() {
        let mut rule = base_rule("https://upstream.internal");
        rule.path = "{/api/v[0-9]+}".to_string();
        rule.last = true;
        let host = ProxyHost::compile(&[rule], None).unwrap();
        assert!(host.dispatch("/api/v1", &HashMap::new(), &HeaderMap::new()).is_some());
        assert!(host.dispatch("/api/v1/extra", &HashMap::new(), &HeaderMap::new()).is_none());
    }

    #[test]
    fn restriction_blocks_by_extension() {
        let mut rule = base_rule("https://upstream.internal");
        rule.restrict_files = Some(RestrictFiles {
            extensions: vec!["exe".to_string()],
            regexes: vec![],
        });
        let compiled = CompiledRule::compile(&rule, None).unwrap();
        assert!(compiled.restrict.as_ref().unwrap().blocks("/download/app.exe"));
        assert!(!compiled.restrict.as_ref().unwrap().blocks("/download/app.zip"));
    }

    #[test]
    fn restriction_blocks_dotfile_with_no_other_extension() {
        let mut rule = base_rule("https://upstream.internal");
        rule.restrict_files = Some(RestrictFiles {
            extensions: vec![".env".to_string()],
            regexes: vec![],
        });
        let compiled = CompiledRule::compile(&rule, None).unwrap();
        assert!(compiled.restrict.as_ref().unwrap().blocks("/config/.env"));
    }

    #[test]
    fn restriction_matches_filename_not_full_path() {
        let mut rule = base_rule("https://upstream.internal");
        rule.restrict_files = Some(RestrictFiles {
            extensions: vec![],
            regexes: vec!["{app\\.exe}".to_string()],
        });
        let compiled = CompiledRule::compile(&rule, None).unwrap();
        assert!(compiled.restrict.as_ref().unwrap().blocks("/download/app.exe"));
        assert!(!compiled.restrict.as_ref().unwrap().blocks("/download/other.exe"));
    }

    #[test]
    fn fallthrough_to_last_rule_when_nothing_else_matches() {
        let mut specific = base_rule("https://specific.internal");
        specific.path = "/api/widgets".to_string();
        let mut fallback = base_rule("https://fallback.internal");
        fallback.last = true;
        let host = ProxyHost::compile(&[specific, fallback], None).unwrap();
        let rule = host.dispatch("/anything/else", &HashMap::new(), &HeaderMap::new()).unwrap();
        assert_eq!(rule.target_url, "https://fallback.internal".parse::<Uri>().unwrap());
    }

    #[test]
    fn redirects_field_compiles_through_proxy_rule() {
        let mut rule = base_rule("https://upstream.internal");
        rule.last = true;
        rule.redirects = vec![ProxyRedirect {
            match_path: "/old".to_string(),
            target: "/new".to_string(),
            code: 301,
            is_abs: true,
        }];
        let compiled = CompiledRule::compile(&rule, None).unwrap();
        let (target, code) = redirect::resolve(&compiled.redirects, "/old", "https", "example.org").unwrap();
        assert_eq!(target, "/new");
        assert_eq!(code, 301);
    }
}
