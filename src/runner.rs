use std::path::{Path, PathBuf};
use std::process::Command;

use regex::Regex;
use semver::Version;
use serde::Deserialize;
use tracing::debug;

use crate::errors::{GopinError, Result};

/// How far `go get` may move past the requested version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdatePolicy {
    #[default]
    None,
    /// `-u`: latest available minor/patch.
    Minor,
    /// `-u=patch`: latest available patch only.
    Patch,
}

/// Module metadata as printed by `go list -m -json`.
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleInfo {
    #[serde(rename = "Path")]
    pub path: String,
    #[serde(rename = "Version", default)]
    pub version: String,
    #[serde(rename = "Dir", default)]
    pub dir: Option<PathBuf>,
    #[serde(rename = "GoMod", default)]
    pub go_mod: Option<PathBuf>,
}

/// The narrow seam to the external Go toolchain. Every call runs against an
/// isolated per-tool module file, never the caller's own module.
pub trait Toolchain {
    /// Probed toolchain version.
    fn version(&self) -> &Version;

    /// Resolves and downloads packages into the module cache
    /// (`go get -d -modfile=...`).
    fn download(&self, mod_file: &Path, update: UpdatePolicy, packages: &[String]) -> Result<()>;

    /// Queries resolved metadata for one module (`go list -m -json`).
    fn list_module(&self, mod_file: &Path, module: &str) -> Result<ModuleInfo>;

    /// Builds a resolved main package to a fully qualified output path.
    /// Fails with [`GopinError::NotBuildable`] for non-main packages.
    fn build(&self, mod_file: &Path, package: &str, output: &Path) -> Result<()>;

    /// Normalizes the module file's indirect requirements
    /// (`go mod tidy -modfile=...`).
    fn tidy(&self, mod_file: &Path) -> Result<()>;
}

/// Blocking subprocess implementation of [`Toolchain`].
#[derive(Debug)]
pub struct GoRunner {
    go: PathBuf,
    insecure: bool,
    verbose: bool,
    version: Version,
}

impl GoRunner {
    /// Probes `go version` and gates on compatibility: `-modfile` support
    /// arrived in go 1.14, so anything older is rejected.
    pub fn new<P: Into<PathBuf>>(go: P, insecure: bool, verbose: bool) -> Result<GoRunner> {
        let go = go.into();
        let out = Command::new(&go)
            .arg("version")
            .output()
            .map_err(|e| GopinError::Toolchain {
                op: "version".to_string(),
                detail: format!("failed to execute {}: {}", go.display(), e),
            })?;
        if !out.status.success() {
            return Err(GopinError::Toolchain {
                op: "version".to_string(),
                detail: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            });
        }
        let stdout = String::from_utf8_lossy(&out.stdout);
        let version = parse_go_version(&stdout)?;
        if !version_supported(&version) {
            return Err(GopinError::UnsupportedVersion(version.to_string()));
        }
        Ok(GoRunner {
            go,
            insecure,
            verbose,
            version,
        })
    }

    fn exec(&self, op: &str, mod_file: &Path, args: Vec<String>) -> Result<String> {
        let mod_dir = mod_file.parent().unwrap_or_else(|| Path::new("."));
        debug!(go = %self.go.display(), ?args, "running toolchain");
        let out = Command::new(&self.go)
            .args(&args)
            .current_dir(mod_dir)
            .env("GO111MODULE", "on")
            .env("GOWORK", "off")
            .output()
            .map_err(|e| GopinError::Toolchain {
                op: op.to_string(),
                detail: format!("failed to execute {}: {}", self.go.display(), e),
            })?;
        let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
        if !out.status.success() {
            debug!(%op, %stderr, "toolchain call failed");
            let detail = if self.verbose {
                stderr
            } else {
                "exited with a non-zero status (re-run with -v for toolchain output)".to_string()
            };
            return Err(GopinError::Toolchain {
                op: op.to_string(),
                detail,
            });
        }
        Ok(String::from_utf8_lossy(&out.stdout).into_owned())
    }

    fn modfile_arg(mod_file: &Path) -> String {
        let name = mod_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("-modfile={}", name)
    }
}

impl Toolchain for GoRunner {
    fn version(&self) -> &Version {
        &self.version
    }

    fn download(&self, mod_file: &Path, update: UpdatePolicy, packages: &[String]) -> Result<()> {
        let mut args = vec![
            "get".to_string(),
            "-d".to_string(),
            "-mod=mod".to_string(),
            Self::modfile_arg(mod_file),
        ];
        if self.insecure {
            args.push("-insecure".to_string());
        }
        match update {
            UpdatePolicy::None => {}
            UpdatePolicy::Minor => args.push("-u".to_string()),
            UpdatePolicy::Patch => args.push("-u=patch".to_string()),
        }
        args.extend(packages.iter().cloned());
        self.exec("get", mod_file, args)?;
        Ok(())
    }

    fn list_module(&self, mod_file: &Path, module: &str) -> Result<ModuleInfo> {
        let out = self.exec(
            "list",
            mod_file,
            vec![
                "list".to_string(),
                "-mod=mod".to_string(),
                Self::modfile_arg(mod_file),
                "-m".to_string(),
                "-json".to_string(),
                module.to_string(),
            ],
        )?;
        serde_json::from_str(&out).map_err(|e| GopinError::Toolchain {
            op: "list".to_string(),
            detail: format!("unexpected go list output: {}", e),
        })
    }

    fn build(&self, mod_file: &Path, package: &str, output: &Path) -> Result<()> {
        let name = self.exec(
            "list",
            mod_file,
            vec![
                "list".to_string(),
                "-mod=mod".to_string(),
                Self::modfile_arg(mod_file),
                "-f".to_string(),
                "{{.Name}}".to_string(),
                package.to_string(),
            ],
        )?;
        if name.trim() != "main" {
            return Err(GopinError::NotBuildable(package.to_string()));
        }
        self.exec(
            "build",
            mod_file,
            vec![
                "build".to_string(),
                "-mod=mod".to_string(),
                Self::modfile_arg(mod_file),
                "-o".to_string(),
                output.display().to_string(),
                package.to_string(),
            ],
        )?;
        Ok(())
    }

    fn tidy(&self, mod_file: &Path) -> Result<()> {
        self.exec(
            "mod tidy",
            mod_file,
            vec![
                "mod".to_string(),
                "tidy".to_string(),
                Self::modfile_arg(mod_file),
            ],
        )?;
        Ok(())
    }
}

/// Parses the version out of `go version` output, e.g.
/// `go version go1.21.3 linux/amd64`.
fn parse_go_version(output: &str) -> Result<Version> {
    let re = Regex::new(r"go(\d+)(?:\.(\d+))?(?:\.(\d+))?").map_err(|e| GopinError::Toolchain {
        op: "version".to_string(),
        detail: e.to_string(),
    })?;
    let caps = re
        .captures(output)
        .ok_or_else(|| GopinError::UnsupportedVersion(output.trim().to_string()))?;
    let number = |i: usize| -> u64 {
        caps.get(i)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0)
    };
    Ok(Version::new(number(1), number(2), number(3)))
}

/// gopin drives the toolchain through `-modfile`, so major >= 2 or
/// 1.14+ is required.
fn version_supported(version: &Version) -> bool {
    version.major >= 2 || (version.major == 1 && version.minor >= 14)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_go_version_full() {
        let v = parse_go_version("go version go1.21.3 linux/amd64").unwrap();
        assert_eq!(v, Version::new(1, 21, 3));
    }

    #[test]
    fn test_parse_go_version_short() {
        let v = parse_go_version("go version go1.14 darwin/amd64").unwrap();
        assert_eq!(v, Version::new(1, 14, 0));
    }

    #[test]
    fn test_parse_go_version_garbage() {
        assert!(parse_go_version("not a go binary").is_err());
    }

    #[test]
    fn test_version_gate() {
        assert!(version_supported(&Version::new(1, 14, 0)));
        assert!(version_supported(&Version::new(1, 22, 1)));
        assert!(version_supported(&Version::new(2, 0, 0)));
        assert!(!version_supported(&Version::new(1, 13, 15)));
        assert!(!version_supported(&Version::new(0, 9, 0)));
    }
}
