//! The thin command-line shell over the core engine. Five subcommands, each translating
//! its flags into one or two calls against `crate::ocfl`.

use clap::{Args, Parser, Subcommand};

use crate::ocfl::{DigestAlgorithm, SpecVersion};

/// A CLI for managing OCFL (Oxford Common File Layout) repositories.
///
/// ocfl is a thin shell over an object-version engine: it initializes storage roots,
/// commits new object versions, lists and exports object state, and validates objects
/// against their own inventories. Repository location and default commit user can be
/// configured via the `OCFL_ROOT`, `OCFL_USER_NAME`, and `OCFL_USER_EMAIL` environment
/// variables, or in a per-user TOML config file, in addition to the flags below.
#[derive(Debug, Parser)]
#[command(name = "ocfl", author = "Peter Winckles <pwinckles@pm.me>", version)]
pub struct OcflArgs {
    /// Name of a configuration profile to load defaults from
    #[arg(short, long, value_name = "NAME", global = true)]
    pub name: Option<String>,

    /// Suppress error messages
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Increase log verbosity (repeatable)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Initializes a new, empty OCFL storage root
    #[command(name = "init-root")]
    InitRoot(InitRootCmd),
    /// Stages a directory's contents and commits them as a new object version
    #[command(name = "commit")]
    Commit(CommitCmd),
    /// Lists objects in a repository, or the files within one
    #[command(name = "ls")]
    List(ListCmd),
    /// Exports an object's logical state to a directory, or a single file to a path or stdout
    #[command(name = "export")]
    Export(ExportCmd),
    /// Replay-validates one object, or every object reachable under a storage root
    #[command(name = "validate")]
    Validate(ValidateCmd),
}

/// Initializes a new, empty OCFL storage root at `path`.
#[derive(Debug, Args)]
pub struct InitRootCmd {
    /// Path at which to create the storage root. Must not already exist, or must be empty.
    pub path: String,

    /// Storage layout extension new objects are placed under
    #[arg(long, value_name = "NAME", default_value = "0004-hashed-n-tuple-storage-layout")]
    pub layout: String,

    /// OCFL specification version the root declares conformance to
    #[arg(long = "ocflv", value_name = "VERSION", default_value = "1.1")]
    pub ocfl_version: SpecVersion,

    /// Human-readable description written into ocfl_layout.json
    #[arg(long, value_name = "TEXT")]
    pub description: Option<String>,
}

/// Stages the contents of `path` and commits them as a new version of an object.
#[derive(Debug, Args)]
pub struct CommitCmd {
    /// Directory whose contents are staged as the new version's complete logical state
    pub path: String,

    /// ID of the object to commit to. Created if it does not already exist.
    #[arg(long, value_name = "ID")]
    pub id: String,

    /// Path to the OCFL storage root
    #[arg(long, value_name = "ROOT_PATH")]
    pub root: Option<String>,

    /// Commit message
    #[arg(long = "message", short = 'm', value_name = "MESSAGE")]
    pub message: Option<String>,

    /// Name of the user performing the commit
    #[arg(long = "name", value_name = "NAME")]
    pub user_name: Option<String>,

    /// Address (e.g. mailto: URI) of the user performing the commit
    #[arg(long = "email", value_name = "ADDRESS")]
    pub user_address: Option<String>,

    /// OCFL specification version to use if this commit creates a new object
    #[arg(long = "ocflv", value_name = "VERSION", default_value = "1.1")]
    pub ocfl_version: SpecVersion,

    /// Digest algorithm to use if this commit creates a new object
    #[arg(long = "alg", value_name = "ALGORITHM", default_value = "sha512")]
    pub digest_algorithm: DigestAlgorithm,

    /// Number of worker threads used to hash the staged directory
    #[arg(long, value_name = "NUM", default_value_t = 4)]
    pub workers: usize,
}

/// Lists objects in a repository, or the files within a single object.
#[derive(Debug, Args)]
pub struct ListCmd {
    /// Path to the OCFL storage root
    #[arg(long, value_name = "ROOT_PATH")]
    pub root: Option<String>,

    /// ID of the object to list the contents of. Lists every object in the root if omitted.
    #[arg(long, value_name = "ID")]
    pub id: Option<String>,

    /// Version to list the contents of. Defaults to the object's head version.
    #[arg(long, value_name = "VERSION")]
    pub version: Option<crate::ocfl::VersionNum>,

    /// Include each file's digest algorithm and digest in the output
    #[arg(long)]
    pub digests: bool,
}

/// Exports an object's logical state to a directory, or a single file to a path or stdout.
#[derive(Debug, Args)]
pub struct ExportCmd {
    /// Destination directory, or destination file path when `--src` is a single file.
    /// `-` streams a single file to standard output.
    pub dst: String,

    /// Path to the OCFL storage root
    #[arg(long, value_name = "ROOT_PATH")]
    pub root: Option<String>,

    /// ID of the object to export
    #[arg(long, value_name = "ID")]
    pub id: String,

    /// Version to export. Defaults to the object's head version.
    #[arg(long, value_name = "VERSION")]
    pub version: Option<crate::ocfl::VersionNum>,

    /// Logical path of a single file to export, rather than the whole object state
    #[arg(long, value_name = "PATH")]
    pub src: Option<String>,

    /// Overwrite existing files at the destination
    #[arg(long)]
    pub replace: bool,
}

/// Replay-validates one object, or every object reachable under a storage root.
#[derive(Debug, Args)]
pub struct ValidateCmd {
    /// Path to the OCFL storage root
    #[arg(long, value_name = "ROOT_PATH")]
    pub root: Option<String>,

    /// ID of a single object to validate. Validates every object under the root if omitted.
    #[arg(long, value_name = "ID")]
    pub id: Option<String>,

    /// Number of worker threads used to re-verify content digests
    #[arg(long, value_name = "NUM", default_value_t = 4)]
    pub workers: usize,
}
