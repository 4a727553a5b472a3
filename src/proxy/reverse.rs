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

//! Reverse-proxy request/response rewriting. Rust's `hyper` has no
//! built-in equivalent of Go's `httputil.ReverseProxy`, so the
//! director/response-modifier pair is expressed as plain functions
//! operating on `http::request::Parts` / `http::response::Parts`,
//! executed by the dispatcher around a shared HTTP(S) client.

use crate::models::HeaderMutation;
use http::{HeaderName, HeaderValue, Uri};
use hyper::client::HttpConnector;
use hyper::Client;
use hyper_rustls::HttpsConnector;
use once_cell::sync::Lazy;
use std::str::FromStr;

/// Joins a target base path and a request path the way Go's
/// `singleJoiningSlash` does: collapse a doubled slash at the seam,
/// insert one if neither side has it, otherwise concatenate directly.
pub fn single_joining_slash(a: &str, b: &str) -> String {
    let a_slash = a.ends_with('/');
    let b_slash = b.starts_with('/');
    match (a_slash, b_slash) {
        (true, true) => format!("{a}{}", &b[1..]),
        (false, false) => format!("{a}/{b}"),
        _ => format!("{a}{b}"),
    }
}

/// Builds the upstream URI for a reverse-proxied request: target scheme
/// and authority, joined path, and query strings merged with `&` when
/// both the target and the incoming request carry one.
pub fn build_upstream_uri(target: &Uri, incoming_path_and_query: &Uri) -> Uri {
    let joined_path = single_joining_slash(target.path(), incoming_path_and_query.path());

    let target_query = target.query().unwrap_or("");
    let incoming_query = incoming_path_and_query.query().unwrap_or("");
    let merged_query = match (target_query.is_empty(), incoming_query.is_empty()) {
        (true, true) => String::new(),
        (true, false) => incoming_query.to_string(),
        (false, true) => target_query.to_string(),
        (false, false) => format!("{target_query}&{incoming_query}"),
    };

    let mut path_and_query = joined_path;
    if !merged_query.is_empty() {
        path_and_query.push('?');
        path_and_query.push_str(&merged_query);
    }

    Uri::builder()
        .scheme(target.scheme_str().unwrap_or("http"))
        .authority(target.authority().map(|a| a.as_str()).unwrap_or(""))
        .path_and_query(path_and_query)
        .build()
        .unwrap_or_else(|_| target.clone())
}

/// Applies an add/remove header mutation list in place.
pub fn apply_header_mutation(headers: &mut http::HeaderMap, mutation: &HeaderMutation) {
    for name in &mutation.remove {
        if let Ok(name) = HeaderName::from_str(name) {
            headers.remove(name);
        }
    }
    for (name, value) in &mutation.add {
        if let (Ok(name), Ok(value)) = (HeaderName::from_str(name), HeaderValue::from_str(value)) {
            headers.insert(name, value);
        }
    }
}

/// Sets `User-Agent` to empty only if the caller did not already send
/// one, matching the original director's guard against Go's transport
/// defaulting a User-Agent string of its own.
pub fn ensure_user_agent(headers: &mut http::HeaderMap) {
    if !headers.contains_key(http::header::USER_AGENT) {
        headers.insert(http::header::USER_AGENT, HeaderValue::from_static(""));
    }
}

pub type HttpsClient = Client<HttpsConnector<HttpConnector>>;

/// Shared client used for rules with certificate verification enabled.
pub static VERIFIED_CLIENT: Lazy<HttpsClient> = Lazy::new(|| {
    let connector = hyper_rustls::HttpsConnectorBuilder::new()
        .with_native_roots()
        .https_or_http()
        .enable_http1()
        .build();
    Client::builder().build(connector)
});

/// Shared client used for rules with `skip_tls_verify: true`.
pub static INSECURE_CLIENT: Lazy<HttpsClient> = Lazy::new(|| {
    let connector = hyper_rustls::HttpsConnectorBuilder::new()
        .with_tls_config(insecure_tls_config())
        .https_or_http()
        .enable_http1()
        .build();
    Client::builder().build(connector)
});

fn insecure_tls_config() -> rustls::ClientConfig {
    struct NoVerifier;
    impl rustls::client::ServerCertVerifier for NoVerifier {
        fn verify_server_cert(
            &self,
            _end_entity: &rustls::Certificate,
            _intermediates: &[rustls::Certificate],
            _server_name: &rustls::ServerName,
            _scts: &mut dyn Iterator<Item = &[u8]>,
            _ocsp_response: &[u8],
            _now: std::time::SystemTime,
        ) -> Result<rustls::client::ServerCertVerified, rustls::Error> {
            Ok(rustls::client::ServerCertVerified::assertion())
        }
    }

    rustls::ClientConfig::builder()
        .with_safe_defaults()
        .with_custom_certificate_verifier(std::sync::Arc::new(NoVerifier))
        .with_no_client_auth()
}

pub fn client_for(skip_tls_verify: bool) -> &'static HttpsClient {
    if skip_tls_verify {
        &INSECURE_CLIENT
    } else {
        &VERIFIED_CLIENT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_without_duplicating_slash() {
        assert_eq!(single_joining_slash("/api/", "/v1/widgets"), "/api/v1/widgets");
    }

    #[test]
    fn inserts_slash_when_missing_on_both_sides() {
        assert_eq!(single_joining_slash("/api", "v1/widgets"), "/api/v1/widgets");
    }

    #[test]
    fn leaves_single_slash_alone() {
        assert_eq!(single_joining_slash("/api", "/v1/widgets"), "/api/v1/widgets");
    }

    #[test]
    fn merges_queries_with_ampersand() {
        let target: Uri = "https://upstream.internal/base?a=1".parse().unwrap();
        let incoming: Uri = "/path?b=2".parse().unwrap();
        let merged = build_upstream_uri(&target, &incoming);
        assert_eq!(merged.query(), Some("a=1&b=2"));
    }

    #[test]
    fn header_mutation_adds_and_removes() {
        let mut headers = http::HeaderMap::new();
        headers.insert("x-drop", HeaderValue::from_static("gone"));
        let mutation = HeaderMutation {
            add: [("x-add".to_string(), "v".to_string())].into_iter().collect(),
            remove: vec!["x-drop".to_string()],
        };
        apply_header_mutation(&mut headers, &mutation);
        assert!(!headers.contains_key("x-drop"));
        assert_eq!(headers.get("x-add").unwrap(), "v");
    }

    #[test]
    fn ensure_user_agent_only_sets_when_absent() {
        let mut headers = http::HeaderMap::new();
        ensure_user_agent(&mut headers);
        assert_eq!(headers.get(http::header::USER_AGENT).unwrap(), "");

        let mut headers = http::HeaderMap::new();
        headers.insert(http::header::USER_AGENT, HeaderValue::from_static("custom"));
        ensure_user_agent(&mut headers);
        assert_eq!(headers.get(http::header::USER_AGENT).unwrap(), "custom");
    }
}
