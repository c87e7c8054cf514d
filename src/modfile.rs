use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{GopinError, Result};

/// Trailing comment every gopin-managed descriptor carries on its `module`
/// line. A descriptor without it was hand-edited or corrupted and is
/// rejected on open.
pub const AUTO_GENERATED: &str = "Auto generated by gopin. DO NOT EDIT";

/// Standalone comment that disables automatic replace-directive syncing
/// for one descriptor.
pub const NO_REPLACE_SENTINEL: &str = "gopin:no_replace_fetch";

/// One resolvable unit: a module, an optional subpackage path inside it and
/// a version. An empty version is only valid for a not-yet-resolved request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub module: String,
    pub sub_path: String,
    pub version: String,
}

impl Package {
    pub fn new(module: &str, sub_path: &str, version: &str) -> Self {
        Package {
            module: module.to_string(),
            sub_path: sub_path.to_string(),
            version: version.to_string(),
        }
    }

    /// Full import path of the package (module root plus subpackage).
    pub fn path(&self) -> String {
        if self.sub_path.is_empty() {
            self.module.clone()
        } else {
            format!("{}/{}", self.module, self.sub_path)
        }
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.version.is_empty() {
            write!(f, "{}", self.path())
        } else {
            write!(f, "{}@{}", self.path(), self.version)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Require {
    pub module: String,
    pub version: String,
    /// Relative package path inside the module, kept as the trailing
    /// comment of the require line.
    pub rel_path: String,
    pub indirect: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replace {
    pub old_module: String,
    pub old_version: Option<String>,
    pub new_module: String,
    /// None when the replacement is a filesystem path.
    pub new_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exclude {
    pub module: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retract {
    /// Single version or a `[low, high]` range, kept verbatim.
    pub version: String,
    pub rationale: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DirectiveKind {
    Require,
    Replace,
    Exclude,
    Retract,
    Unknown,
}

/// One synthetic Go module descriptor file pinning a single tool.
///
/// Strictly opened descriptors must carry the [`AUTO_GENERATED`] sentinel;
/// [`ModFile::open_foreign`] relaxes that for third-party `go.mod` files,
/// which are only read to recompute replace directives.
#[derive(Debug, Clone)]
pub struct ModFile {
    path: PathBuf,
    module: String,
    go_directive: Option<String>,
    requires: Vec<Require>,
    replaces: Vec<Replace>,
    excludes: Vec<Exclude>,
    retracts: Vec<Retract>,
    comments: Vec<String>,
    auto_replace_disabled: bool,
    managed: bool,
}

impl ModFile {
    /// Creates a fresh managed descriptor in memory. Nothing is written
    /// until [`ModFile::flush`].
    pub fn create<P: AsRef<Path>>(path: P, go_directive: &str) -> ModFile {
        ModFile {
            path: path.as_ref().to_path_buf(),
            module: "_".to_string(),
            go_directive: Some(go_directive.to_string()),
            requires: Vec::new(),
            replaces: Vec::new(),
            excludes: Vec::new(),
            retracts: Vec::new(),
            comments: Vec::new(),
            auto_replace_disabled: false,
            managed: true,
        }
    }

    /// Opens a gopin-managed descriptor. Fails with
    /// [`GopinError::MalformedDescriptor`] when the sentinel comment is
    /// missing from the module line.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<ModFile> {
        Self::open_inner(path.as_ref(), true)
    }

    /// Opens a third-party module file without requiring the sentinel.
    pub fn open_foreign<P: AsRef<Path>>(path: P) -> Result<ModFile> {
        Self::open_inner(path.as_ref(), false)
    }

    fn open_inner(path: &Path, strict: bool) -> Result<ModFile> {
        let content = fs::read_to_string(path).map_err(|e| GopinError::io(path, e))?;
        Self::parse(path, &content, strict)
    }

    fn parse(path: &Path, content: &str, strict: bool) -> Result<ModFile> {
        let mut mf = ModFile {
            path: path.to_path_buf(),
            module: String::new(),
            go_directive: None,
            requires: Vec::new(),
            replaces: Vec::new(),
            excludes: Vec::new(),
            retracts: Vec::new(),
            comments: Vec::new(),
            auto_replace_disabled: false,
            managed: false,
        };

        let parse_err = |line: usize, msg: String| GopinError::Parse {
            path: path.to_path_buf(),
            line,
            msg,
        };

        let mut block: Option<DirectiveKind> = None;
        for (idx, raw) in content.lines().enumerate() {
            let lineno = idx + 1;
            let (code, comment) = split_comment(raw.trim());

            if code.is_empty() {
                if comment.contains(NO_REPLACE_SENTINEL) {
                    mf.auto_replace_disabled = true;
                } else if !comment.is_empty() && block.is_none() {
                    mf.comments.push(comment.to_string());
                }
                continue;
            }

            if let Some(kind) = block {
                if code == ")" {
                    block = None;
                } else {
                    mf.parse_body(kind, code, comment)
                        .map_err(|msg| parse_err(lineno, msg))?;
                }
                continue;
            }

            let keyword = code.split_whitespace().next().unwrap_or_default();
            let rest = code[keyword.len()..].trim();
            match keyword {
                "module" => {
                    if rest.is_empty() {
                        return Err(parse_err(lineno, "module directive without a path".into()));
                    }
                    mf.module = rest.to_string();
                    mf.managed = comment.contains("Auto generated by gopin");
                }
                "go" => mf.go_directive = Some(rest.to_string()),
                // Written by newer toolchains; carries no pinning state.
                "toolchain" | "godebug" => {}
                "require" | "replace" | "exclude" | "retract" => {
                    let kind = match keyword {
                        "require" => DirectiveKind::Require,
                        "replace" => DirectiveKind::Replace,
                        "exclude" => DirectiveKind::Exclude,
                        _ => DirectiveKind::Retract,
                    };
                    if rest == "(" {
                        block = Some(kind);
                    } else {
                        mf.parse_body(kind, rest, comment)
                            .map_err(|msg| parse_err(lineno, msg))?;
                    }
                }
                other => {
                    if strict {
                        return Err(parse_err(lineno, format!("unknown directive {:?}", other)));
                    }
                    if rest == "(" {
                        block = Some(DirectiveKind::Unknown);
                    }
                }
            }
        }

        if mf.module.is_empty() {
            return Err(parse_err(0, "missing module directive".into()));
        }
        if strict && !mf.managed {
            return Err(GopinError::MalformedDescriptor(path.to_path_buf()));
        }
        Ok(mf)
    }

    fn parse_body(
        &mut self,
        kind: DirectiveKind,
        body: &str,
        comment: &str,
    ) -> std::result::Result<(), String> {
        match kind {
            DirectiveKind::Require => {
                let mut parts = body.split_whitespace();
                let module = parts.next().ok_or("require without a module")?;
                let version = parts.next().ok_or("require without a version")?;
                if parts.next().is_some() {
                    return Err(format!("malformed require {:?}", body));
                }
                let indirect = comment.starts_with("indirect");
                self.requires.push(Require {
                    module: module.to_string(),
                    version: version.to_string(),
                    rel_path: if indirect {
                        String::new()
                    } else {
                        comment.to_string()
                    },
                    indirect,
                });
            }
            DirectiveKind::Replace => {
                let (old, new) = body
                    .split_once("=>")
                    .ok_or_else(|| format!("replace without '=>': {:?}", body))?;
                let (old_module, old_version) = parse_module_version(old)?;
                let (new_module, new_version) = parse_module_version(new)?;
                self.replaces.push(Replace {
                    old_module,
                    old_version,
                    new_module,
                    new_version,
                });
            }
            DirectiveKind::Exclude => {
                let mut parts = body.split_whitespace();
                let module = parts.next().ok_or("exclude without a module")?;
                let version = parts.next().ok_or("exclude without a version")?;
                if parts.next().is_some() {
                    return Err(format!("malformed exclude {:?}", body));
                }
                self.excludes.push(Exclude {
                    module: module.to_string(),
                    version: version.to_string(),
                });
            }
            DirectiveKind::Retract => {
                self.retracts.push(Retract {
                    version: body.to_string(),
                    rationale: comment.to_string(),
                });
            }
            DirectiveKind::Unknown => {}
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn go_directive(&self) -> Option<&str> {
        self.go_directive.as_deref()
    }

    pub fn requires(&self) -> &[Require] {
        &self.requires
    }

    pub fn replaces(&self) -> &[Replace] {
        &self.replaces
    }

    pub fn excludes(&self) -> &[Exclude] {
        &self.excludes
    }

    pub fn retracts(&self) -> &[Retract] {
        &self.retracts
    }

    pub fn auto_replace_disabled(&self) -> bool {
        self.auto_replace_disabled
    }

    /// The single non-indirect requirement this descriptor pins.
    pub fn direct_package(&self) -> Result<Package> {
        self.requires
            .iter()
            .find(|r| !r.indirect)
            .map(|r| Package::new(&r.module, &r.rel_path, &r.version))
            .ok_or_else(|| GopinError::MalformedDescriptor(self.path.clone()))
    }

    /// Replaces the direct requirement with exactly one package, recording
    /// its subpackage path as the trailing comment token. Indirect
    /// requirements written by the toolchain are preserved.
    pub fn set_direct_requirement(&mut self, pkg: &Package) {
        self.requires.retain(|r| r.indirect);
        self.requires.insert(
            0,
            Require {
                module: pkg.module.clone(),
                version: pkg.version.clone(),
                rel_path: pkg.sub_path.clone(),
                indirect: false,
            },
        );
    }

    /// Fully replaces the replace directive set, written in input order.
    pub fn set_replace(&mut self, directives: Vec<Replace>) {
        self.replaces = directives;
    }

    /// Fully replaces the exclude directive set.
    pub fn set_exclude(&mut self, directives: Vec<Exclude>) {
        self.excludes = directives;
    }

    /// Fully replaces the retract directive set.
    pub fn set_retract(&mut self, directives: Vec<Retract>) {
        self.retracts = directives;
    }

    /// Serializes the descriptor, truncate-rewrites it to disk and reloads
    /// the in-memory state from the canonical form. A reader sees either the
    /// old or the new complete content, never a torn directive.
    pub fn flush(&mut self) -> Result<()> {
        let content = self.serialize();
        fs::write(&self.path, &content).map_err(|e| GopinError::io(&self.path, e))?;
        *self = Self::parse(&self.path, &content, self.managed)?;
        Ok(())
    }

    fn serialize(&self) -> String {
        let mut out = String::new();
        if self.managed {
            out.push_str(&format!("module {} // {}\n", self.module, AUTO_GENERATED));
        } else {
            out.push_str(&format!("module {}\n", self.module));
        }
        if let Some(go) = &self.go_directive {
            out.push_str(&format!("\ngo {}\n", go));
        }
        if !self.comments.is_empty() {
            out.push('\n');
            for c in &self.comments {
                out.push_str(&format!("// {}\n", c));
            }
        }
        if self.auto_replace_disabled {
            out.push_str(&format!("\n// {}\n", NO_REPLACE_SENTINEL));
        }
        if !self.requires.is_empty() {
            out.push('\n');
            for r in &self.requires {
                out.push_str(&format!("require {} {}", r.module, r.version));
                if r.indirect {
                    out.push_str(" // indirect");
                } else if !r.rel_path.is_empty() {
                    out.push_str(&format!(" // {}", r.rel_path));
                }
                out.push('\n');
            }
        }
        if !self.excludes.is_empty() {
            out.push('\n');
            for e in &self.excludes {
                out.push_str(&format!("exclude {} {}\n", e.module, e.version));
            }
        }
        if !self.replaces.is_empty() {
            out.push('\n');
            for r in &self.replaces {
                out.push_str("replace ");
                out.push_str(&r.old_module);
                if let Some(v) = &r.old_version {
                    out.push_str(&format!(" {}", v));
                }
                out.push_str(&format!(" => {}", r.new_module));
                if let Some(v) = &r.new_version {
                    out.push_str(&format!(" {}", v));
                }
                out.push('\n');
            }
        }
        if !self.retracts.is_empty() {
            out.push('\n');
            for r in &self.retracts {
                out.push_str(&format!("retract {}", r.version));
                if !r.rationale.is_empty() {
                    out.push_str(&format!(" // {}", r.rationale));
                }
                out.push('\n');
            }
        }
        out
    }
}

/// Splits a line into its code part and the text after `//`.
fn split_comment(line: &str) -> (&str, &str) {
    match line.split_once("//") {
        Some((code, comment)) => (code.trim(), comment.trim()),
        None => (line, ""),
    }
}

fn parse_module_version(side: &str) -> std::result::Result<(String, Option<String>), String> {
    let mut parts = side.split_whitespace();
    let module = parts
        .next()
        .ok_or_else(|| "replace side without a module".to_string())?;
    let version = parts.next().map(|v| v.to_string());
    if parts.next().is_some() {
        return Err(format!("malformed replace side {:?}", side));
    }
    Ok((module.to_string(), version))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_descriptor(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_open_parses_managed_descriptor() {
        let dir = tempdir().unwrap();
        let path = write_descriptor(
            dir.path(),
            "faillint.mod",
            "module _ // Auto generated by gopin. DO NOT EDIT\n\
             \n\
             go 1.21\n\
             \n\
             require github.com/fatih/faillint v1.5.0\n",
        );

        let mf = ModFile::open(&path).unwrap();
        assert_eq!(mf.module(), "_");
        assert_eq!(mf.go_directive(), Some("1.21"));
        let pkg = mf.direct_package().unwrap();
        assert_eq!(pkg.module, "github.com/fatih/faillint");
        assert_eq!(pkg.version, "v1.5.0");
        assert_eq!(pkg.sub_path, "");
    }

    #[test]
    fn test_open_rejects_missing_sentinel() {
        let dir = tempdir().unwrap();
        let path = write_descriptor(
            dir.path(),
            "tool.mod",
            "module _\n\nrequire github.com/acme/tool v1.0.0\n",
        );

        let err = ModFile::open(&path).unwrap_err();
        assert!(matches!(err, GopinError::MalformedDescriptor(_)));
        assert!(ModFile::open_foreign(&path).is_ok());
    }

    #[test]
    fn test_subpath_round_trips_through_comment() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("protoc.mod");

        let mut mf = ModFile::create(&path, "1.21");
        mf.set_direct_requirement(&Package::new(
            "github.com/acme/proto",
            "cmd/protoc-gen",
            "v0.3.1",
        ));
        mf.flush().unwrap();

        let reloaded = ModFile::open(&path).unwrap();
        let pkg = reloaded.direct_package().unwrap();
        assert_eq!(pkg.sub_path, "cmd/protoc-gen");
        assert_eq!(pkg.path(), "github.com/acme/proto/cmd/protoc-gen");
        assert_eq!(pkg.to_string(), "github.com/acme/proto/cmd/protoc-gen@v0.3.1");
    }

    #[test]
    fn test_set_direct_requirement_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tool.mod");
        let pkg = Package::new("github.com/acme/tool", "", "v1.0.0");

        let mut mf = ModFile::create(&path, "1.21");
        mf.set_direct_requirement(&pkg);
        mf.flush().unwrap();

        assert_eq!(ModFile::open(&path).unwrap().direct_package().unwrap(), pkg);
    }

    #[test]
    fn test_set_direct_requirement_keeps_indirect() {
        let dir = tempdir().unwrap();
        let path = write_descriptor(
            dir.path(),
            "tool.mod",
            "module _ // Auto generated by gopin. DO NOT EDIT\n\
             \n\
             require github.com/acme/tool v1.0.0\n\
             require github.com/pkg/errors v0.9.1 // indirect\n",
        );

        let mut mf = ModFile::open(&path).unwrap();
        mf.set_direct_requirement(&Package::new("github.com/acme/tool", "", "v2.0.0"));
        mf.flush().unwrap();

        let reloaded = ModFile::open(&path).unwrap();
        assert_eq!(reloaded.requires().len(), 2);
        assert_eq!(reloaded.direct_package().unwrap().version, "v2.0.0");
        assert!(reloaded.requires().iter().any(|r| r.indirect));
    }

    #[test]
    fn test_parse_block_directives() {
        let dir = tempdir().unwrap();
        let path = write_descriptor(
            dir.path(),
            "go.mod",
            "module github.com/acme/tool\n\
             \n\
             go 1.20\n\
             \n\
             require (\n\
             \tgithub.com/pkg/errors v0.9.1 // indirect\n\
             \tgithub.com/spf13/cobra v1.8.0\n\
             )\n\
             \n\
             replace (\n\
             \tgithub.com/old/mod v1.0.0 => github.com/new/mod v1.1.0\n\
             \tgithub.com/local/mod => ../local\n\
             )\n\
             \n\
             exclude github.com/bad/mod v0.1.0\n\
             \n\
             retract v0.9.0 // published by accident\n",
        );

        let mf = ModFile::open_foreign(&path).unwrap();
        assert_eq!(mf.requires().len(), 2);
        assert_eq!(mf.replaces().len(), 2);
        assert_eq!(mf.replaces()[0].new_version.as_deref(), Some("v1.1.0"));
        assert_eq!(mf.replaces()[1].new_module, "../local");
        assert_eq!(mf.replaces()[1].new_version, None);
        assert_eq!(mf.excludes().len(), 1);
        assert_eq!(mf.retracts()[0].version, "v0.9.0");
        assert_eq!(mf.retracts()[0].rationale, "published by accident");
    }

    #[test]
    fn test_directives_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tool.mod");

        let mut mf = ModFile::create(&path, "1.21");
        mf.set_direct_requirement(&Package::new("github.com/acme/tool", "", "v1.0.0"));
        mf.set_replace(vec![Replace {
            old_module: "github.com/old/mod".to_string(),
            old_version: Some("v1.0.0".to_string()),
            new_module: "github.com/new/mod".to_string(),
            new_version: Some("v1.1.0".to_string()),
        }]);
        mf.set_exclude(vec![Exclude {
            module: "github.com/bad/mod".to_string(),
            version: "v0.1.0".to_string(),
        }]);
        mf.set_retract(vec![Retract {
            version: "v0.9.0".to_string(),
            rationale: "broken".to_string(),
        }]);
        mf.flush().unwrap();

        let reloaded = ModFile::open(&path).unwrap();
        assert_eq!(reloaded.replaces(), mf.replaces());
        assert_eq!(reloaded.excludes(), mf.excludes());
        assert_eq!(reloaded.retracts(), mf.retracts());
    }

    #[test]
    fn test_flush_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tool.mod");

        let mut mf = ModFile::create(&path, "1.21");
        mf.set_direct_requirement(&Package::new("github.com/acme/tool", "cmd/tool", "v1.0.0"));
        mf.flush().unwrap();
        let first = fs::read_to_string(&path).unwrap();
        mf.flush().unwrap();
        let second = fs::read_to_string(&path).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_no_replace_sentinel_detected_and_kept() {
        let dir = tempdir().unwrap();
        let path = write_descriptor(
            dir.path(),
            "tool.mod",
            "module _ // Auto generated by gopin. DO NOT EDIT\n\
             \n\
             // gopin:no_replace_fetch\n\
             \n\
             require github.com/acme/tool v1.0.0\n",
        );

        let mut mf = ModFile::open(&path).unwrap();
        assert!(mf.auto_replace_disabled());
        mf.flush().unwrap();
        assert!(ModFile::open(&path).unwrap().auto_replace_disabled());
    }
}
