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
    use edgevanity::models::{ProxyRedirect, ProxyRule, ProxyStatic, RestrictFiles};
    use edgevanity::proxy::{CompiledRule, execute};
    use hyper::{Body, Request};
    use std::collections::HashMap;
    use std::io::Write;

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
            last: true,
        }
    }

    fn get(path: &str) -> Request<Body> {
        Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn restriction_rejects_before_redirect_or_proxy_is_reached() {
        let mut raw = base_rule("https://upstream.internal");
        raw.restrict_files = Some(RestrictFiles {
            extensions: vec!["exe".to_string()],
            regexes: vec![],
        });
        raw.redirects = vec![ProxyRedirect {
            match_path: "/download/app.exe".to_string(),
            target: "/blocked".to_string(),
            code: 301,
            is_abs: true,
        }];
        let rule = CompiledRule::compile(&raw, None).unwrap();

        let err = execute(&rule, get("/download/app.exe"), "https", "example.org")
            .await
            .unwrap_err();
        assert!(matches!(err, edgevanity::error::EdgeError::Restriction));
    }

    #[tokio::test]
    async fn redirect_wins_over_static_and_proxy_when_both_would_match() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.exe"), b"binary").unwrap();

        let mut raw = base_rule("https://upstream.internal");
        raw.statics = vec![ProxyStatic {
            target_path: dir.path().to_string_lossy().to_string(),
            strip_prefix: "/download".to_string(),
        }];
        raw.redirects = vec![ProxyRedirect {
            match_path: "/download/app.exe".to_string(),
            target: "/new-location".to_string(),
            code: 301,
            is_abs: true,
        }];
        let rule = CompiledRule::compile(&raw, None).unwrap();

        let resp = execute(&rule, get("/download/app.exe"), "https", "example.org")
            .await
            .unwrap();
        assert_eq!(resp.status(), 301);
        assert_eq!(resp.headers().get("location").unwrap(), "/new-location");
    }

    #[tokio::test]
    async fn static_file_is_served_with_prefix_stripped() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("index.html")).unwrap();
        file.write_all(b"<html>hi</html>").unwrap();

        let mut raw = base_rule("https://upstream.internal");
        raw.statics = vec![ProxyStatic {
            target_path: dir.path().to_string_lossy().to_string(),
            strip_prefix: "/assets".to_string(),
        }];
        let rule = CompiledRule::compile(&raw, None).unwrap();

        let resp = execute(&rule, get("/assets/index.html"), "https", "example.org")
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(
            resp.headers().get("content-type").unwrap(),
            "text/html; charset=utf-8"
        );
    }

    #[tokio::test]
    async fn root_path_never_resolves_to_a_static_mount() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("placeholder"), b"nope").unwrap();

        // A closed local port so the fallthrough to the reverse proxy
        // fails fast (connection refused) instead of hanging on DNS.
        let mut raw = base_rule("http://127.0.0.1:1");
        raw.statics = vec![ProxyStatic {
            target_path: dir.path().to_string_lossy().to_string(),
            strip_prefix: String::new(),
        }];
        let rule = CompiledRule::compile(&raw, None).unwrap();

        // "/" is excluded from static resolution, so this falls through to
        // the reverse proxy path and fails against the unreachable upstream
        // rather than serving a static file.
        let err = execute(&rule, get("/"), "https", "example.org").await;
        assert!(err.is_err());
    }
}
