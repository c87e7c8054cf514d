use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::envs;
use crate::errors::{GopinError, Result};
use crate::index::{ModDir, ToolEntry, ToolVariant};
use crate::link::create_link;
use crate::modfile::{ModFile, Package};
use crate::runner::{Toolchain, UpdatePolicy};
use crate::util::{
    binary_name, gobin_dir, is_valid_name, name_from_package_path, parse_target, GO_CMD,
    NONE_VERSION,
};

/// A raw `get` request as it arrives from the CLI.
#[derive(Debug, Default, Clone)]
pub struct GetRequest {
    /// Package path or pinned tool name, optionally with `@version`,
    /// `@v1,v2,...` or `@none`. Absent means "reinstall everything pinned".
    pub target: Option<String>,
    /// Name for a brand-new pin, or clone target for an existing one.
    pub name: Option<String>,
    /// New name for an existing tool's descriptor set.
    pub rename: Option<String>,
    pub update: UpdatePolicy,
    /// Additionally create an unversioned link to the resolved binary.
    pub link: bool,
    /// Overrides the binary output directory; defaults to the
    /// `GOBIN`/`GOPATH` resolution from the environment.
    pub gobin: Option<PathBuf>,
}

#[derive(Debug, Clone)]
struct Target {
    head: String,
    /// Package path (contains `/`) versus pinned tool name.
    is_path: bool,
    versions: Vec<String>,
    remove: bool,
}

/// A `get` request that passed every pre-flight check. Constructing one
/// performs no filesystem or toolchain access, so validation failures are
/// guaranteed side-effect free.
#[derive(Debug, Clone)]
pub struct ValidatedRequest {
    target: Option<Target>,
    name: Option<String>,
    rename: Option<String>,
    update: UpdatePolicy,
    link: bool,
    gobin: Option<PathBuf>,
}

impl ValidatedRequest {
    pub fn parse(req: &GetRequest) -> Result<ValidatedRequest> {
        if req.name.is_some() && req.rename.is_some() {
            return Err(GopinError::ConflictingFlags);
        }
        for flag in [&req.name, &req.rename].into_iter().flatten() {
            if !is_valid_name(flag) {
                return Err(GopinError::InvalidName(flag.clone()));
            }
        }

        let target = match &req.target {
            None => None,
            Some(raw) => {
                let (head, versions) = parse_target(raw);
                if head.is_empty() {
                    return Err(GopinError::UnknownTarget(raw.clone()));
                }
                for (i, v) in versions.iter().enumerate() {
                    if versions[..i].contains(v) {
                        return Err(GopinError::DuplicateVersionInRequest(v.clone()));
                    }
                }
                let remove = versions.iter().any(|v| v == NONE_VERSION);
                if remove && versions.len() > 1 {
                    return Err(GopinError::InvalidNoneInArray);
                }
                Some(Target {
                    is_path: head.contains('/'),
                    versions: if remove { Vec::new() } else { versions },
                    head,
                    remove,
                })
            }
        };

        if target.is_none() {
            if let Some(flag) = req.rename.as_ref().or(req.name.as_ref()) {
                return Err(GopinError::UnknownTarget(flag.clone()));
            }
        }

        // The name this request would pin under is known before any I/O,
        // so the reserved-name guard fires here.
        let final_name = match (&req.rename, &req.name, &target) {
            (Some(rename), _, _) => Some(rename.clone()),
            (_, Some(name), _) => Some(name.clone()),
            (_, _, Some(t)) if t.is_path => Some(name_from_package_path(&t.head)),
            (_, _, Some(t)) => Some(t.head.clone()),
            _ => None,
        };
        if let Some(name) = &final_name {
            if !is_valid_name(name) {
                return Err(GopinError::InvalidName(name.clone()));
            }
            if name == GO_CMD {
                return Err(GopinError::ReservedName(name.clone()));
            }
        }

        Ok(ValidatedRequest {
            target,
            name: req.name.clone(),
            rename: req.rename.clone(),
            update: req.update,
            link: req.link,
            gobin: req.gobin.clone(),
        })
    }
}

/// Applies one validated `get` request: decides which descriptor files to
/// create, overwrite or delete, invokes the toolchain, and persists
/// descriptor changes only after every toolchain step succeeded.
pub fn run(moddir: &ModDir, runner: &dyn Toolchain, req: &ValidatedRequest) -> Result<()> {
    let Some(target) = &req.target else {
        return reinstall_all(moddir, runner, req);
    };

    if target.remove {
        return remove_entry(moddir, target);
    }

    let source_entry = if target.is_path {
        None
    } else {
        match moddir.find(&target.head)? {
            Some(entry) => Some(entry),
            None => return Err(GopinError::UnknownTarget(target.head.clone())),
        }
    };
    let final_name = req
        .rename
        .clone()
        .or_else(|| req.name.clone())
        .unwrap_or_else(|| {
            if target.is_path {
                name_from_package_path(&target.head)
            } else {
                target.head.clone()
            }
        });
    let existing_final = moddir.find(&final_name)?;

    let effective = effective_versions(
        &target.versions,
        source_entry.as_ref(),
        existing_final.as_ref(),
    );

    moddir.ensure()?;
    let gobin = resolve_gobin(req)?;

    let source_pkg: Option<Package> = source_entry
        .as_ref()
        .map(|entry| entry.variants[0].package.clone());
    let base_file: Option<PathBuf> = source_entry
        .as_ref()
        .or(existing_final.as_ref())
        .map(|entry| entry.variants[0].mod_file.clone());
    let reuse_pool: Vec<ToolVariant> = source_entry
        .iter()
        .chain(existing_final.iter())
        .flat_map(|entry| entry.variants.clone())
        .collect();
    let go_directive = format!("{}.{}", runner.version().major, runner.version().minor);
    let requested_path = source_pkg
        .as_ref()
        .map(|pkg| pkg.path())
        .unwrap_or_else(|| target.head.clone());

    struct Staged {
        package: Package,
        tmp: PathBuf,
        final_path: PathBuf,
    }
    let mut staged: Vec<Staged> = Vec::new();

    for (idx, version) in effective.iter().enumerate() {
        let tmp = moddir.tmp_file_path(&final_name, idx);
        let final_path = moddir.mod_file_path(&final_name, idx);

        // An exactly matching pin is reused byte-for-byte: no resolver
        // call, identical descriptor content on re-runs. Version equality
        // alone is not enough, the package path must match too.
        let reuse = if req.update == UpdatePolicy::None && !version.is_empty() {
            reuse_pool.iter().find(|variant| {
                variant.package.version == *version && variant.package.path() == requested_path
            })
        } else {
            None
        };

        let package = match reuse {
            Some(hit) => {
                debug!(tool = %final_name, version = %version, "reusing resolved pin");
                fs::copy(&hit.mod_file, &tmp).map_err(|e| GopinError::io(&tmp, e))?;
                hit.package.clone()
            }
            None => resolve_version(
                runner,
                &tmp,
                base_file.as_deref(),
                &go_directive,
                target,
                source_pkg.as_ref(),
                version,
                req.update,
            )?,
        };

        // Binaries are addressed by name and version, so an existing one is
        // already the right artifact.
        let binary = gobin.join(binary_name(&final_name, &package.version));
        if binary.exists() {
            debug!(binary = %binary.display(), "binary already installed");
        } else {
            runner.build(&tmp, &package.path(), &binary)?;
        }

        staged.push(Staged {
            package,
            tmp,
            final_path,
        });
    }

    // Commit only after every version resolved and built.
    for stage in &staged {
        fs::rename(&stage.tmp, &stage.final_path)
            .map_err(|e| GopinError::io(&stage.final_path, e))?;
    }
    moddir.delete_stale_variants(&final_name, staged.len())?;

    if req.rename.is_some() {
        if let Some(source) = &source_entry {
            if source.name != final_name {
                moddir.delete_entry(source)?;
            }
        }
    }

    if req.link {
        if let Some(first) = staged.first() {
            let binary = gobin.join(binary_name(&final_name, &first.package.version));
            create_link(binary, gobin.join(&final_name))?;
        }
    }

    envs::write_artifacts(moddir)?;
    for stage in &staged {
        info!(tool = %final_name, package = %stage.package, "pinned");
    }
    Ok(())
}

/// Resolves one requested version against a staged descriptor copy and
/// returns the concrete package. The staged file is left behind on failure.
#[allow(clippy::too_many_arguments)]
fn resolve_version(
    runner: &dyn Toolchain,
    tmp: &Path,
    base_file: Option<&Path>,
    go_directive: &str,
    target: &Target,
    source_pkg: Option<&Package>,
    version: &str,
    update: UpdatePolicy,
) -> Result<Package> {
    match base_file {
        // Updating an existing pin keeps its comment block and sentinel.
        Some(base) => {
            fs::copy(base, tmp).map_err(|e| GopinError::io(tmp, e))?;
        }
        None => {
            ModFile::create(tmp, go_directive).flush()?;
        }
    }

    let full_path = match source_pkg {
        Some(pkg) => pkg.path(),
        None => target.head.clone(),
    };
    let spec = if version.is_empty() {
        full_path.clone()
    } else {
        format!("{}@{}", full_path, version)
    };
    runner.download(tmp, update, &[spec])?;

    // The toolchain wrote the resolved requirement into the staged file;
    // the module owning the requested path is the longest matching prefix.
    let mut mf = ModFile::open(tmp)?;
    let (module, resolved_version) = {
        let owner = mf
            .requires()
            .iter()
            .filter(|r| !r.indirect)
            .filter(|r| {
                full_path == r.module || full_path.starts_with(&format!("{}/", r.module))
            })
            .max_by_key(|r| r.module.len())
            .ok_or_else(|| GopinError::Toolchain {
                op: "get".to_string(),
                detail: format!(
                    "module of {} not present in staged descriptor {}",
                    full_path,
                    tmp.display()
                ),
            })?;
        (owner.module.clone(), owner.version.clone())
    };
    let sub_path = full_path
        .strip_prefix(&module)
        .map(|rest| rest.trim_start_matches('/').to_string())
        .unwrap_or_default();
    let package = Package {
        module,
        sub_path,
        version: resolved_version,
    };

    // Replace directives are recomputed from the resolved module's own
    // module file for this exact version, never inherited from the
    // previous pin.
    if !mf.auto_replace_disabled() {
        let info = runner.list_module(tmp, &package.module)?;
        if let Some(go_mod) = info.go_mod.filter(|p| p.exists()) {
            let foreign = ModFile::open_foreign(&go_mod)?;
            mf.set_replace(foreign.replaces().to_vec());
            mf.set_exclude(foreign.excludes().to_vec());
        }
    }

    mf.set_direct_requirement(&package);
    mf.flush()?;
    runner.tidy(tmp)?;
    Ok(package)
}

/// The effective version list of a request: a single version replaces
/// the entry, an array keeps the requested order and retains already-pinned
/// versions that were not re-listed, and an empty list reuses the source's
/// pinned set (or resolves the latest version for a fresh package path).
fn effective_versions(
    requested: &[String],
    source: Option<&ToolEntry>,
    existing_final: Option<&ToolEntry>,
) -> Vec<String> {
    if requested.is_empty() {
        if let Some(entry) = source.or(existing_final) {
            return entry.versions();
        }
        return vec![String::new()];
    }
    if requested.len() == 1 {
        return requested.to_vec();
    }
    let mut versions = requested.to_vec();
    if let Some(entry) = existing_final {
        for version in entry.versions() {
            if !versions.contains(&version) {
                versions.push(version);
            }
        }
    }
    versions
}

fn remove_entry(moddir: &ModDir, target: &Target) -> Result<()> {
    let name = if target.is_path {
        name_from_package_path(&target.head)
    } else {
        target.head.clone()
    };
    let entry = moddir
        .find(&name)?
        .ok_or_else(|| GopinError::UnknownTarget(name.clone()))?;
    moddir.delete_entry(&entry)?;
    envs::write_artifacts(moddir)?;
    info!(tool = %name, "unpinned; installed binaries stay in place");
    Ok(())
}

/// `get` without a target: rebuild every pinned binary that is missing and
/// regenerate the helper files. Malformed descriptors are evicted here, the
/// natural regeneration moment.
fn reinstall_all(moddir: &ModDir, runner: &dyn Toolchain, req: &ValidatedRequest) -> Result<()> {
    moddir.ensure()?;
    let entries = moddir.list_pinned_tools(true)?;
    let gobin = resolve_gobin(req)?;

    for entry in &entries {
        for variant in &entry.variants {
            let binary = gobin.join(binary_name(&entry.name, &variant.package.version));
            if binary.exists() {
                debug!(binary = %binary.display(), "binary already installed");
                continue;
            }
            runner.build(&variant.mod_file, &variant.package.path(), &binary)?;
        }
        if req.link {
            if let Some(first) = entry.variants.first() {
                let binary = gobin.join(binary_name(&entry.name, &first.package.version));
                create_link(binary, gobin.join(&entry.name))?;
            }
        }
    }
    envs::write_artifacts(moddir)?;
    Ok(())
}

fn resolve_gobin(req: &ValidatedRequest) -> Result<PathBuf> {
    let gobin = match &req.gobin {
        Some(dir) => dir.clone(),
        None => gobin_dir()?,
    };
    fs::create_dir_all(&gobin).map_err(|e| GopinError::io(&gobin, e))?;
    Ok(gobin)
}
