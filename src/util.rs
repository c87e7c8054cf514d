use std::path::PathBuf;

use crate::errors::{GopinError, Result};

#[cfg(target_os = "windows")]
pub const PATH_LIST_SEPARATOR: &str = ";";

#[cfg(not(target_os = "windows"))]
pub const PATH_LIST_SEPARATOR: &str = ":";

/// Default module directory, relative to the project root.
pub const MOD_DIR_NAME: &str = ".gopin";

/// Command name of the underlying toolchain. Pinning a tool under this name
/// is rejected so generated variables never shadow the toolchain binary.
pub const GO_CMD: &str = "go";

/// Version sentinel that removes a pinned tool instead of updating it.
pub const NONE_VERSION: &str = "none";

/// Checks whether a tool name sticks to the safe character set
/// (letters, digits, `.`, `-`, `_`).
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
}

/// Splits a `get` target expression into its package-or-name part and the
/// comma-separated version list after `@`. Empty version tokens are dropped.
pub fn parse_target(raw: &str) -> (String, Vec<String>) {
    match raw.split_once('@') {
        Some((head, versions)) => (
            head.to_string(),
            versions
                .split(',')
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .collect(),
        ),
        None => (raw.to_string(), Vec::new()),
    }
}

/// Derives a tool name from a package path: the last path segment, skipping
/// Go major-version segments (`.../tool/v2` still yields `tool`).
pub fn name_from_package_path(path: &str) -> String {
    for segment in path.trim_end_matches('/').rsplit('/') {
        if is_major_version_segment(segment) {
            continue;
        }
        return segment.to_string();
    }
    path.to_string()
}

fn is_major_version_segment(segment: &str) -> bool {
    segment.len() >= 2
        && segment.starts_with('v')
        && segment[1..].chars().all(|c| c.is_ascii_digit())
}

/// Resolves the directory the toolchain installs binaries into: `$GOBIN`,
/// else the first `$GOPATH` element plus `/bin`, else `$HOME/go/bin`.
/// gopin only reads this location, it never sets it.
pub fn gobin_dir() -> Result<PathBuf> {
    if let Ok(gobin) = std::env::var("GOBIN") {
        if !gobin.is_empty() {
            return Ok(PathBuf::from(gobin));
        }
    }
    if let Ok(gopath) = std::env::var("GOPATH") {
        if !gopath.is_empty() {
            let first = gopath
                .split(PATH_LIST_SEPARATOR)
                .next()
                .unwrap_or(gopath.as_str());
            return Ok(PathBuf::from(first).join("bin"));
        }
    }
    #[cfg(target_os = "windows")]
    let home = std::env::var("USERPROFILE");
    #[cfg(not(target_os = "windows"))]
    let home = std::env::var("HOME");

    match home {
        Ok(home) if !home.is_empty() => Ok(PathBuf::from(home).join("go").join("bin")),
        _ => Err(GopinError::Toolchain {
            op: "env".to_string(),
            detail: "none of GOBIN, GOPATH or HOME are set".to_string(),
        }),
    }
}

/// Name of the installed binary for one pinned version: `<name>-<version>`.
pub fn binary_name(name: &str, version: &str) -> String {
    format!("{}-{}", name, version)
}

/// Uppercases a tool name into a Makefile/env variable name
/// (`golangci-lint` becomes `GOLANGCI_LINT`).
pub fn variable_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_name_accepts_safe_charset() {
        assert!(is_valid_name("faillint"));
        assert!(is_valid_name("golangci-lint"));
        assert!(is_valid_name("protoc_gen.go2"));
    }

    #[test]
    fn test_is_valid_name_rejects_unsafe_input() {
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("bad name!"));
        assert!(!is_valid_name("bad;name"));
        assert!(!is_valid_name("a/b"));
    }

    #[test]
    fn test_parse_target_without_version() {
        let (head, versions) = parse_target("github.com/acme/tool");
        assert_eq!(head, "github.com/acme/tool");
        assert!(versions.is_empty());
    }

    #[test]
    fn test_parse_target_with_versions() {
        let (head, versions) = parse_target("tool@v1.0.0,v1.1.0");
        assert_eq!(head, "tool");
        assert_eq!(versions, vec!["v1.0.0", "v1.1.0"]);
    }

    #[test]
    fn test_parse_target_drops_empty_tokens() {
        let (head, versions) = parse_target("tool@");
        assert_eq!(head, "tool");
        assert!(versions.is_empty());

        let (_, versions) = parse_target("tool@v1.0.0,");
        assert_eq!(versions, vec!["v1.0.0"]);
    }

    #[test]
    fn test_name_from_package_path() {
        assert_eq!(name_from_package_path("github.com/acme/tool"), "tool");
        assert_eq!(
            name_from_package_path("github.com/fatih/faillint/cmd/faillint"),
            "faillint"
        );
    }

    #[test]
    fn test_name_from_package_path_skips_major_version() {
        assert_eq!(name_from_package_path("github.com/acme/tool/v2"), "tool");
        assert_eq!(name_from_package_path("github.com/acme/v8"), "acme");
    }

    #[test]
    fn test_binary_name_embeds_version() {
        assert_eq!(binary_name("tool", "v1.0.0"), "tool-v1.0.0");
    }

    #[test]
    fn test_variable_name_uppercases() {
        assert_eq!(variable_name("faillint"), "FAILLINT");
        assert_eq!(variable_name("golangci-lint"), "GOLANGCI_LINT");
        assert_eq!(variable_name("protoc.gen"), "PROTOC_GEN");
    }
}
