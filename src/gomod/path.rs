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

//! Module-path escaping: Go module paths are case-sensitive but the
//! underlying cache is case-folding-hostile on some filesystems, so
//! uppercase letters are escaped as `!`+lowercase in the on-disk/URL form.

use crate::error::EdgeError;

fn invalid(reason: &str) -> EdgeError {
    EdgeError::Validation(vec![crate::error::FieldError::new("module_path", reason)])
}

/// Decodes an escaped module path back to its canonical form.
pub fn decode_path(encoded: &str) -> Result<String, EdgeError> {
    let mut out = String::with_capacity(encoded.len());
    let mut chars = encoded.chars();
    while let Some(c) = chars.next() {
        if c as u32 >= 128 {
            return Err(invalid("non-ASCII byte in encoded module path"));
        }
        if c == '!' {
            match chars.next() {
                Some(next) if next.is_ascii_lowercase() => out.push(next.to_ascii_uppercase()),
                _ => return Err(invalid("'!' escape not followed by a lowercase letter")),
            }
        } else if c.is_ascii_uppercase() {
            return Err(invalid("unescaped uppercase letter in encoded module path"));
        } else {
            out.push(c);
        }
    }
    Ok(out)
}

/// Encodes a canonical module path for on-disk/URL storage.
pub fn encode_path(decoded: &str) -> Result<String, EdgeError> {
    let mut out = String::with_capacity(decoded.len());
    for c in decoded.chars() {
        if c as u32 >= 128 {
            return Err(invalid("non-ASCII byte in module path"));
        }
        if c == '!' {
            return Err(invalid("module path may not contain a literal '!'"));
        }
        if c.is_ascii_uppercase() {
            out.push('!');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_escaped_uppercase() {
        assert_eq!(decode_path("!github.com/!a!c!m!e/widget").unwrap(), "Github.com/ACME/widget");
    }

    #[test]
    fn rejects_raw_uppercase() {
        assert!(decode_path("Github.com/acme/widget").is_err());
    }

    #[test]
    fn rejects_trailing_bang() {
        assert!(decode_path("github.com/acme!").is_err());
    }

    #[test]
    fn encode_then_decode_round_trips() {
        let original = "github.com/ACME/Widget-Tool";
        let encoded = encode_path(original).unwrap();
        assert_eq!(decode_path(&encoded).unwrap(), original);
    }

    #[test]
    fn decode_then_encode_round_trips() {
        let encoded = "github.com/!a!c!m!e/widget";
        let decoded = decode_path(encoded).unwrap();
        assert_eq!(encode_path(&decoded).unwrap(), encoded);
    }

    #[test]
    fn encode_rejects_literal_bang() {
        assert!(encode_path("github.com/a!b").is_err());
    }
}
