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

//! Abstraction over invoking the external `go` toolchain, so the module
//! cache's download/version-probe logic can be exercised without a real
//! `go` binary on the test machine.

use std::io;
use std::path::Path;
use std::process::Command;

pub struct ToolchainOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub status: i32,
}

pub trait ToolchainRunner: Send + Sync {
    fn run(
        &self,
        binary: &str,
        args: &[String],
        env: &[(String, String)],
        cwd: &Path,
    ) -> io::Result<ToolchainOutput>;
}

/// Runs the real `go` binary via `std::process::Command`.
pub struct ProcessToolchainRunner;

impl ToolchainRunner for ProcessToolchainRunner {
    fn run(
        &self,
        binary: &str,
        args: &[String],
        env: &[(String, String)],
        cwd: &Path,
    ) -> io::Result<ToolchainOutput> {
        let output = Command::new(binary)
            .args(args)
            .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .current_dir(cwd)
            .output()?;
        Ok(ToolchainOutput {
            stdout: output.stdout,
            stderr: output.stderr,
            status: output.status.code().unwrap_or(-1),
        })
    }
}

/// Parses the `major.minor` pair out of a `go version` banner such as
/// `go version go1.21.4 linux/amd64` and reports whether it is at least
/// 1.11 (the minimum version that understands Go modules).
pub fn supports_modules(version_banner: &str) -> bool {
    parse_major_minor(version_banner)
        .map(|(major, minor)| major > 1 || (major == 1 && minor >= 11))
        .unwrap_or(false)
}

fn parse_major_minor(banner: &str) -> Option<(u32, u32)> {
    let token = banner.split_whitespace().find(|t| t.starts_with("go1") || t.starts_with("go2"))?;
    let digits = token.strip_prefix("go")?;
    let mut parts = digits.split('.');
    let major: u32 = parts.next()?.parse().ok()?;
    let minor_raw = parts.next()?;
    let minor: u32 = minor_raw
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect::<String>()
        .parse()
        .ok()?;
    Some((major, minor))
}
