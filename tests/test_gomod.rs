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
    use edgevanity::gomod::path::{decode_path, encode_path};
    use edgevanity::gomod::{ModAction, parse_request};

    #[test]
    fn module_path_encode_decode_round_trips_on_fixed_inputs() {
        let samples = [
            "github.com/acme/widget",
            "github.com/ACME/Widget-Tool",
            "golang.org/x/tools",
            "",
            "a/b/c-d_e.f",
        ];
        for s in samples {
            let encoded = encode_path(s).unwrap();
            assert_eq!(decode_path(&encoded).unwrap(), s);
        }
    }

    #[test]
    fn parse_request_rejects_unsupported_extension() {
        assert!(parse_request("github.com/acme/widget/@v/v1.0.0.tar").is_err());
    }

    #[test]
    fn parse_request_round_trips_module_and_version() {
        let req = parse_request("golang.org/x/tools/@v/v0.15.0.zip").unwrap();
        assert_eq!(req.module, "golang.org/x/tools");
        assert_eq!(req.version.unwrap(), "v0.15.0");
        assert_eq!(req.action, ModAction::Zip);
    }
}
