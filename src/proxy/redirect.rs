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

//! Per-rule redirects: an exact-path map is tried first, then an ordered
//! list of brace-delimited regex patterns whose capture groups can be
//! interpolated back into the target with `{1}`, `{2}`, ... tokens.

use crate::error::{EdgeError, FieldError};
use crate::models::ProxyRedirect;
use regex::Regex;

/// Redirect status codes permitted by the spec; any other non-zero value
/// is rejected at compile/admin-save time rather than forwarded verbatim.
const ALLOWED_REDIRECT_CODES: [u16; 5] = [301, 302, 305, 307, 308];

pub struct CompiledRedirect {
    is_regex: bool,
    exact: String,
    regex: Option<Regex>,
    target: String,
    code: u16,
    is_abs: bool,
}

impl CompiledRedirect {
    pub fn compile(raw: &ProxyRedirect) -> Result<Self, EdgeError> {
        if raw.code != 0 && !ALLOWED_REDIRECT_CODES.contains(&raw.code) {
            return Err(EdgeError::validation(vec![FieldError::new(
                "redirects[].code",
                &format!(
                    "redirect code {} is not permitted; must be one of 301, 302, 305, 307, 308",
                    raw.code
                ),
            )]));
        }

        let (is_regex, exact, regex) = if raw.match_path.starts_with('{') && raw.match_path.ends_with('}') {
            let inner = &raw.match_path[1..raw.match_path.len() - 1];
            let pattern = format!("^{inner}$");
            let re = Regex::new(&pattern).map_err(|e| {
                EdgeError::validation(vec![FieldError::new(
                    "redirects[].match",
                    &format!("invalid regex: {e}"),
                )])
            })?;
            (true, String::new(), Some(re))
        } else {
            (false, raw.match_path.clone(), None)
        };

        Ok(Self {
            is_regex,
            exact,
            regex,
            target: raw.target.clone(),
            code: raw.code,
            is_abs: raw.is_abs,
        })
    }

    pub fn is_regex(&self) -> bool {
        self.is_regex
    }

    pub fn exact_key(&self) -> Option<&str> {
        (!self.is_regex).then_some(self.exact.as_str())
    }

    /// Tries to match and render this redirect against `request_uri`.
    /// Target construction mirrors the original order exactly: numeric
    /// capture-group tokens are substituted first, then the target is
    /// made absolute (scheme + host) unless it already is, and only then
    /// is `{request_uri}` substituted.
    pub fn apply(&self, request_uri: &str, scheme: &str, host: &str) -> Option<(String, u16)> {
        let mut target = self.target.clone();

        if self.is_regex {
            let caps = self.regex.as_ref()?.captures(request_uri)?;
            for i in 1..caps.len() {
                if let Some(m) = caps.get(i) {
                    target = target.replace(&format!("{{{i}}}"), m.as_str());
                }
            }
        } else if self.exact != request_uri {
            return None;
        }

        if !self.is_abs {
            target = format!("{scheme}://{host}{target}");
        }
        target = target.replace("{request_uri}", request_uri);

        let code = if self.code == 0 { 301 } else { self.code };
        Some((target, code))
    }
}

/// First-match-wins across an exact-path map then an ordered regex list.
pub fn resolve<'a>(
    redirects: &'a [CompiledRedirect],
    request_uri: &str,
    scheme: &str,
    host: &str,
) -> Option<(String, u16)> {
    for r in redirects.iter().filter(|r| !r.is_regex()) {
        if let Some(hit) = r.apply(request_uri, scheme, host) {
            return Some(hit);
        }
    }
    for r in redirects.iter().filter(|r| r.is_regex()) {
        if let Some(hit) = r.apply(request_uri, scheme, host) {
            return Some(hit);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(match_path: &str, target: &str, code: u16, is_abs: bool) -> ProxyRedirect {
        ProxyRedirect {
            match_path: match_path.to_string(),
            target: target.to_string(),
            code,
            is_abs,
        }
    }

    #[test]
    fn exact_match_redirects() {
        let r = CompiledRedirect::compile(&raw("/old", "/new", 301, true)).unwrap();
        let (target, code) = r.apply("/old", "https", "example.org").unwrap();
        assert_eq!(target, "/new");
        assert_eq!(code, 301);
    }

    #[test]
    fn exact_mismatch_returns_none() {
        let r = CompiledRedirect::compile(&raw("/old", "/new", 301, true)).unwrap();
        assert!(r.apply("/other", "https", "example.org").is_none());
    }

    #[test]
    fn regex_capture_group_is_interpolated() {
        let r = CompiledRedirect::compile(&raw("{/articles/(\\d+)}", "/posts/{1}", 301, true)).unwrap();
        let (target, _) = r.apply("/articles/42", "https", "example.org").unwrap();
        assert_eq!(target, "/posts/42");
    }

    #[test]
    fn relative_target_is_prefixed_with_scheme_and_host() {
        let r = CompiledRedirect::compile(&raw("/old", "/new", 301, false)).unwrap();
        let (target, _) = r.apply("/old", "https", "example.org").unwrap();
        assert_eq!(target, "https://example.org/new");
    }

    #[test]
    fn request_uri_token_is_substituted_after_prefixing() {
        let r = CompiledRedirect::compile(&raw("/old", "/landing?from={request_uri}", 302, false)).unwrap();
        let (target, _) = r.apply("/old", "https", "example.org").unwrap();
        assert_eq!(target, "https://example.org/landing?from=/old");
    }

    #[test]
    fn default_code_is_301() {
        let r = CompiledRedirect::compile(&raw("/old", "/new", 0, true)).unwrap();
        let (_, code) = r.apply("/old", "https", "example.org").unwrap();
        assert_eq!(code, 301);
    }

    #[test]
    fn disallowed_code_is_rejected_at_compile_time() {
        let err = CompiledRedirect::compile(&raw("/old", "/new", 418, true));
        assert!(err.is_err());
    }

    #[test]
    fn every_permitted_code_is_accepted() {
        for code in [301, 302, 305, 307, 308] {
            assert!(CompiledRedirect::compile(&raw("/old", "/new", code, true)).is_ok());
        }
    }

    #[test]
    fn exact_rules_are_tried_before_regex_rules() {
        let exact = CompiledRedirect::compile(&raw("/articles/42", "/exact-hit", 301, true)).unwrap();
        let regex = CompiledRedirect::compile(&raw("{/articles/(\\d+)}", "/regex-hit", 301, true)).unwrap();
        let rules = vec![regex, exact];
        let (target, _) = resolve(&rules, "/articles/42", "https", "example.org").unwrap();
        assert_eq!(target, "/exact-hit");
    }
}
