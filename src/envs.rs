use std::fs;
use std::path::Path;

use crate::errors::{GopinError, Result};
use crate::index::{ModDir, ToolEntry};
use crate::util::{binary_name, variable_name};

/// Makefile variable include, consumed via `include .gopin/Variables.mk`.
pub const MAKEFILE_NAME: &str = "Variables.mk";

/// Shell-sourceable variant of the same variables.
pub const ENV_FILE_NAME: &str = "variables.env";

const GITIGNORE_NAME: &str = ".gitignore";

const HEADER: &str = "Auto generated binary variables helper managed by gopin. DO NOT EDIT.";

const GITIGNORE: &str = "\
# Managed by gopin. Descriptors and helper files stay tracked,
# toolchain residue does not.
go.mod
go.sum
*.tmp.mod
";

/// Renders the Makefile include: one uppercased variable per tool holding
/// all pinned binary paths, and one rule per binary that rebuilds it from
/// its descriptor.
pub fn render_makefile(entries: &[ToolEntry]) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {}\n", HEADER));
    out.push_str("# Every variable holds the versioned binary path(s) of one pinned tool;\n");
    out.push_str("# depending on a variable reinstalls the binary when its descriptor changed.\n");
    out.push_str("GOPATH ?= $(shell go env GOPATH)\n");
    out.push_str("GOBIN  ?= $(firstword $(subst :, ,${GOPATH}))/bin\n");
    out.push_str("GO     ?= $(shell which go)\n");
    out.push_str("GOPIN_DIR := $(abspath $(dir $(lastword $(MAKEFILE_LIST))))\n");

    for entry in entries {
        out.push('\n');
        let paths: Vec<String> = entry
            .binary_names()
            .iter()
            .map(|b| format!("$(GOBIN)/{}", b))
            .collect();
        out.push_str(&format!("{} := {}\n", variable_name(&entry.name), paths.join(" ")));
        for variant in &entry.variants {
            let bin = binary_name(&entry.name, &variant.package.version);
            let mod_name = variant
                .mod_file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            out.push_str(&format!("$(GOBIN)/{}: $(GOPIN_DIR)/{}\n", bin, mod_name));
            out.push_str(&format!("\t@echo \"(re)installing $(GOBIN)/{}\"\n", bin));
            out.push_str(&format!(
                "\t@cd $(GOPIN_DIR) && GOWORK=off $(GO) build -mod=mod -modfile={} -o=$(GOBIN)/{} \"{}\"\n",
                mod_name,
                bin,
                variant.package.path()
            ));
        }
    }
    out
}

/// Renders the POSIX-sourceable env file with the same variables.
pub fn render_env(entries: &[ToolEntry]) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {}\n", HEADER));
    out.push_str("# Source this file to address pinned binaries by variable.\n");
    out.push_str("GOBIN=${GOBIN:=$(go env GOBIN)}\n");
    out.push('\n');
    out.push_str("if [ -z \"$GOBIN\" ]; then\n");
    out.push_str("\tGOBIN=\"$(go env GOPATH)/bin\"\n");
    out.push_str("fi\n");

    for entry in entries {
        let paths: Vec<String> = entry
            .binary_names()
            .iter()
            .map(|b| format!("${{GOBIN}}/{}", b))
            .collect();
        out.push_str(&format!(
            "\n{}=\"{}\"\n",
            variable_name(&entry.name),
            paths.join(" ")
        ));
    }
    out
}

/// Regenerates every derived helper file from the current pinned set.
pub fn write_artifacts(moddir: &ModDir) -> Result<()> {
    let entries = moddir.list_pinned_tools(false)?;
    write(&moddir.dir().join(MAKEFILE_NAME), &render_makefile(&entries))?;
    write(&moddir.dir().join(ENV_FILE_NAME), &render_env(&entries))?;
    let gitignore = moddir.dir().join(GITIGNORE_NAME);
    if !gitignore.exists() {
        write(&gitignore, GITIGNORE)?;
    }
    Ok(())
}

fn write(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content).map_err(|e| GopinError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::ToolVariant;
    use crate::modfile::Package;
    use std::path::PathBuf;

    fn entry(name: &str, pins: &[(&str, &str)]) -> ToolEntry {
        ToolEntry {
            name: name.to_string(),
            variants: pins
                .iter()
                .enumerate()
                .map(|(i, (module, version))| ToolVariant {
                    package: Package::new(module, "", version),
                    mod_file: if i == 0 {
                        PathBuf::from(format!("{}.mod", name))
                    } else {
                        PathBuf::from(format!("{}.{}.mod", name, i))
                    },
                })
                .collect(),
        }
    }

    #[test]
    fn test_render_makefile_single_tool() {
        let entries = vec![entry("faillint", &[("github.com/fatih/faillint", "v1.5.0")])];
        let out = render_makefile(&entries);
        assert!(out.contains("FAILLINT := $(GOBIN)/faillint-v1.5.0\n"));
        assert!(out.contains("$(GOBIN)/faillint-v1.5.0: $(GOPIN_DIR)/faillint.mod\n"));
        assert!(out.contains("-modfile=faillint.mod -o=$(GOBIN)/faillint-v1.5.0 \"github.com/fatih/faillint\""));
    }

    #[test]
    fn test_render_makefile_array_tool_keeps_order() {
        let entries = vec![entry(
            "tool",
            &[
                ("github.com/acme/tool", "v3.0.0"),
                ("github.com/acme/tool", "v4.0.0"),
                ("github.com/acme/tool", "v1.0.0"),
            ],
        )];
        let out = render_makefile(&entries);
        assert!(out.contains(
            "TOOL := $(GOBIN)/tool-v3.0.0 $(GOBIN)/tool-v4.0.0 $(GOBIN)/tool-v1.0.0\n"
        ));
    }

    #[test]
    fn test_render_env_lists_variables() {
        let entries = vec![
            entry("faillint", &[("github.com/fatih/faillint", "v1.5.0")]),
            entry("goimports", &[("golang.org/x/tools", "v0.27.0")]),
        ];
        let out = render_env(&entries);
        assert!(out.contains("FAILLINT=\"${GOBIN}/faillint-v1.5.0\"\n"));
        assert!(out.contains("GOIMPORTS=\"${GOBIN}/goimports-v0.27.0\"\n"));
    }
}
