use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::errors::{GopinError, Result};
use crate::modfile::{ModFile, Package, AUTO_GENERATED};
use crate::util::binary_name;

/// Extension shared by every descriptor file.
pub const MOD_EXT: &str = "mod";

/// Stem of the meta descriptor that only exists so the toolchain accepts
/// `-modfile` invocations inside the module directory. Never a tool.
const META_STEM: &str = "go";

/// Stem suffix of staging files; excluded from every scan.
const TMP_STEM_SUFFIX: &str = ".tmp";

/// One pinned version of a tool and the descriptor file backing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolVariant {
    pub package: Package,
    pub mod_file: PathBuf,
}

/// The logical, possibly multi-versioned grouping of descriptor files
/// sharing one tool name. Variant order is the declaration order the user
/// issued `get` commands in, not alphabetical order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolEntry {
    pub name: String,
    pub variants: Vec<ToolVariant>,
}

impl ToolEntry {
    /// Pinned versions in render order.
    pub fn versions(&self) -> Vec<String> {
        self.variants
            .iter()
            .map(|v| v.package.version.clone())
            .collect()
    }

    /// Installed binary names in render order (`<name>-<version>`).
    pub fn binary_names(&self) -> Vec<String> {
        self.variants
            .iter()
            .map(|v| binary_name(&self.name, &v.package.version))
            .collect()
    }
}

/// The descriptor directory, modeled as an explicit store so the resolution
/// policy never touches the filesystem on its own.
#[derive(Debug, Clone)]
pub struct ModDir {
    dir: PathBuf,
}

impl ModDir {
    pub fn new<P: Into<PathBuf>>(dir: P) -> ModDir {
        ModDir { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Creates the directory and its fake `go.mod` meta descriptor, which
    /// the toolchain requires to accept `-modfile` in this directory.
    pub fn ensure(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| GopinError::io(&self.dir, e))?;
        let meta = self.dir.join("go.mod");
        if !meta.exists() {
            let content = format!(
                "module _ // Fake module file of the gopin directory. {}\n",
                AUTO_GENERATED
            );
            fs::write(&meta, content).map_err(|e| GopinError::io(&meta, e))?;
        }
        Ok(())
    }

    /// Path of the descriptor file for variant `idx` of a tool:
    /// `<name>.mod` for the bare file, `<name>.<idx>.mod` for siblings.
    pub fn mod_file_path(&self, name: &str, idx: usize) -> PathBuf {
        if idx == 0 {
            self.dir.join(format!("{}.{}", name, MOD_EXT))
        } else {
            self.dir.join(format!("{}.{}.{}", name, idx, MOD_EXT))
        }
    }

    /// Path of the staging file for variant `idx`. Staging files live next
    /// to their final descriptor so the commit is a plain rename, and are
    /// left behind on failure for debugging.
    pub fn tmp_file_path(&self, name: &str, idx: usize) -> PathBuf {
        if idx == 0 {
            self.dir.join(format!("{}{}.{}", name, TMP_STEM_SUFFIX, MOD_EXT))
        } else {
            self.dir
                .join(format!("{}.{}{}.{}", name, idx, TMP_STEM_SUFFIX, MOD_EXT))
        }
    }

    /// All descriptor files in sorted filename order, excluding the meta
    /// descriptor and staging files.
    pub fn descriptor_files(&self) -> Result<Vec<PathBuf>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| {
                let path = e
                    .path()
                    .map(|p| p.to_path_buf())
                    .unwrap_or_else(|| self.dir.clone());
                GopinError::io(path, e.into())
            })?;
            let path = entry.path();
            if !entry.file_type().is_file() {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some(MOD_EXT) {
                continue;
            }
            let stem = match path.file_stem().and_then(|s| s.to_str()) {
                Some(stem) => stem,
                None => continue,
            };
            if stem == META_STEM || stem.ends_with(TMP_STEM_SUFFIX) {
                continue;
            }
            files.push(path.to_path_buf());
        }
        Ok(files)
    }

    /// Scans the directory and folds descriptor files into named tool
    /// entries.
    ///
    /// Ordering contract: files are visited in sorted filename order, where
    /// numbered siblings (`tool.1.mod`) sort before the bare file
    /// (`tool.mod`). A bare-stem file joining an existing entry is
    /// prepended, every other variant appends in scan order. The bare file
    /// holds the first version of the most recent array request, so
    /// prepending restores declaration order; a pre-existing pin pushed
    /// into the highest-numbered sibling renders last.
    pub fn list_pinned_tools(&self, remove_malformed: bool) -> Result<Vec<ToolEntry>> {
        let mut entries: Vec<ToolEntry> = Vec::new();
        let mut evicted: HashSet<String> = HashSet::new();

        for file in self.descriptor_files()? {
            let stem = file
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
            let (name, variant) = split_stem(&stem);
            if evicted.contains(&name) {
                continue;
            }

            let package = match ModFile::open(&file).and_then(|mf| mf.direct_package()) {
                Ok(pkg) => pkg,
                Err(err) if err.is_malformed_descriptor() => {
                    if remove_malformed {
                        warn!(file = %file.display(), %err, "removing malformed descriptor family");
                        self.remove_stem_family(&name)?;
                        // A valid numbered sibling may have created the
                        // entry before the malformed file was reached.
                        entries.retain(|e| e.name != name);
                        evicted.insert(name);
                    } else {
                        debug!(file = %file.display(), %err, "skipping malformed descriptor");
                    }
                    continue;
                }
                Err(err) => return Err(err),
            };

            let tool_variant = ToolVariant {
                package,
                mod_file: file,
            };
            match entries.iter_mut().find(|e| e.name == name) {
                Some(entry) => {
                    if variant.is_none() {
                        entry.variants.insert(0, tool_variant);
                    } else {
                        entry.variants.push(tool_variant);
                    }
                }
                None => entries.push(ToolEntry {
                    name,
                    variants: vec![tool_variant],
                }),
            }
        }
        Ok(entries)
    }

    /// Looks up a single tool entry by name.
    pub fn find(&self, name: &str) -> Result<Option<ToolEntry>> {
        Ok(self
            .list_pinned_tools(false)?
            .into_iter()
            .find(|e| e.name == name))
    }

    /// Deletes every descriptor file of an entry. Installed binaries are
    /// never touched.
    pub fn delete_entry(&self, entry: &ToolEntry) -> Result<()> {
        for variant in &entry.variants {
            fs::remove_file(&variant.mod_file)
                .map_err(|e| GopinError::io(&variant.mod_file, e))?;
        }
        Ok(())
    }

    /// Deletes descriptor files whose variant index is `keep` or higher,
    /// after an entry shrank.
    pub fn delete_stale_variants(&self, name: &str, keep: usize) -> Result<()> {
        for file in self.descriptor_files()? {
            let stem = file
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default();
            let (file_name, variant) = split_stem(stem);
            if file_name != name {
                continue;
            }
            let idx = variant.unwrap_or(0) as usize;
            if idx >= keep {
                fs::remove_file(&file).map_err(|e| GopinError::io(&file, e))?;
            }
        }
        Ok(())
    }

    fn remove_stem_family(&self, name: &str) -> Result<()> {
        for file in self.descriptor_files()? {
            let stem = file
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default();
            let (file_name, _) = split_stem(stem);
            if file_name == name && file.exists() {
                fs::remove_file(&file).map_err(|e| GopinError::io(&file, e))?;
            }
        }
        Ok(())
    }
}

/// Splits a filename stem into the tool name and an optional numeric
/// variant suffix (`tool.2` yields `("tool", Some(2))`). A non-numeric
/// suffix belongs to the name itself, since names may contain dots.
fn split_stem(stem: &str) -> (String, Option<u32>) {
    if let Some((head, tail)) = stem.rsplit_once('.') {
        if !head.is_empty() && !tail.is_empty() && tail.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(n) = tail.parse() {
                return (head.to_string(), Some(n));
            }
        }
    }
    (stem.to_string(), None)
}
