//! # Gopin Core Library
//!
//! This crate contains the core logic and building blocks of the `gopin` tool – a per-project pinner
//! for versioned Go binary tools with a `cargo`-like UX.
//!
//! `gopin` keeps one synthetic Go module file per tool under a module directory (`.gopin/` by default),
//! shells out to the Go toolchain to resolve and build the pinned versions, and regenerates Makefile and
//! shell helper files so a build system can always invoke the exact pinned binary.
//!
//! This library is built for the `gopin` CLI, but you can also reuse it as a backend in other tools.
//!
//! ## Modules Overview
//! - [`modfile`] – Parsing and mutation of single-tool module descriptor files
//! - [`index`] – Scanning the module directory into named, multi-versioned tool entries
//! - [`get`] – The resolution policy deciding which descriptors to create, update or delete
//! - [`runner`] – Shelling out to the Go toolchain behind a narrow, fakeable seam
//! - [`envs`] – Rendering the Makefile and env helper files from the pinned set
//! - [`link`] – Unversioned forwarding links to pinned binaries
//! - [`util`] – Shared helpers (names, target expressions, GOBIN resolution)
//! - [`errors`] – The error taxonomy shared by all of the above


pub mod errors;
pub mod modfile;
pub mod index;
pub mod get;
pub mod runner;
pub mod envs;
pub mod link;
pub mod util;

pub use errors::*;
pub use modfile::*;
pub use index::*;
pub use runner::*;
pub use envs::*;
pub use link::*;
pub use util::*;
