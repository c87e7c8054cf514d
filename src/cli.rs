use std::path::PathBuf;

use clap::{Parser, Subcommand};

use gopin::util::MOD_DIR_NAME;

#[derive(Debug, Parser, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct CLI {
    /// Module directory holding the per-tool descriptor files
    #[clap(short, long, global = true, default_value = MOD_DIR_NAME)]
    pub(crate) moddir: PathBuf,
    /// Print toolchain invocations and surface their stderr on failure
    #[clap(short, long, global = true)]
    pub(crate) verbose: bool,
    #[command(subcommand)]
    pub(crate) command: GopinCommand,
}

#[derive(Debug, Subcommand, Clone, PartialEq)]
pub enum GopinCommand {
    /// Pins, updates, renames or removes a tool. Without a target,
    /// reinstalls everything already pinned
    Get {
        /// Package path or pinned tool name, with optional `@version`,
        /// `@v1,v2,...` for multiple versions, or `@none` to remove
        target: Option<String>,
        /// Name for a brand-new pin (or clone of an existing one)
        #[clap(short, long)]
        name: Option<String>,
        /// Rename an existing tool's descriptor set
        #[clap(short, long)]
        rename: Option<String>,
        /// Path to the go binary
        #[clap(long, default_value = "go")]
        go: PathBuf,
        /// Pass -insecure to the toolchain dependency resolution
        #[clap(long)]
        insecure: bool,
        /// Additionally create an unversioned link to the resolved binary
        #[clap(short, long)]
        link: bool,
        /// Resolve the latest available minor version instead of the pinned one
        #[clap(short, long)]
        update: bool,
        /// Resolve the latest available patch version instead of the pinned one
        #[clap(long, conflicts_with = "update")]
        update_patch: bool,
    },
    /// Lists pinned tools with their binary names and package versions
    List {
        /// Restrict the listing to one tool
        name: Option<String>,
    },
    /// Prints the gopin version
    Version,
}
