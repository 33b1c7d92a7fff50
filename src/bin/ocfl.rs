//! `ocfl` is a command line utility for managing [OCFL](https://ocfl.io/) repositories.
//!
//! It is a thin shell over the `ocfl_engine::ocfl` object-version engine: it initializes
//! storage roots, commits new object versions, lists and exports object state, and
//! validates objects against their own inventories.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;
use std::process::exit;

use chrono::Utc;
use clap::Parser;
use log::LevelFilter;

use ocfl_engine::cli::{CommitCmd, ExportCmd, InitRootCmd, ListCmd, OcflArgs, ValidateCmd};
use ocfl_engine::cli::Command;
use ocfl_engine::config::{self, Config};
use ocfl_engine::ocfl::fs_capability::CancellationToken;
use ocfl_engine::ocfl::layout::StorageLayout;
use ocfl_engine::ocfl::lock::LockManager;
use ocfl_engine::ocfl::object::Object;
use ocfl_engine::ocfl::root::Root;
use ocfl_engine::ocfl::stage::Stage;
use ocfl_engine::ocfl::types::{CommitMeta, VersionRef};
use ocfl_engine::ocfl::{scan_object_ids, InventoryPath, LogicalPath, OcflError, Result};

fn main() {
    let args = OcflArgs::parse();
    init_logging(args.verbose);

    let cancel = CancellationToken::new();
    let cancel_for_handler = cancel.clone();
    let _ = ctrlc::set_handler(move || cancel_for_handler.cancel());

    match run(&args, &cancel) {
        Ok(code) => exit(code),
        Err(e) => {
            print_err(&e, args.quiet);
            exit(1);
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();
}

fn print_err(error: &OcflError, quiet: bool) {
    if !quiet {
        eprintln!("Error: {}", error);
    }
}

fn run(args: &OcflArgs, cancel: &CancellationToken) -> Result<i32> {
    let config = config::load_config(&args.name)?;

    match &args.command {
        Command::InitRoot(cmd) => {
            init_root_command(cmd)?;
            Ok(0)
        }
        Command::Commit(cmd) => {
            commit_command(cmd, &config, cancel)?;
            Ok(0)
        }
        Command::List(cmd) => {
            list_command(cmd, &config, cancel)?;
            Ok(0)
        }
        Command::Export(cmd) => {
            export_command(cmd, &config, cancel)?;
            Ok(0)
        }
        Command::Validate(cmd) => validate_command(cmd, &config, cancel),
    }
}

fn init_root_command(cmd: &InitRootCmd) -> Result<()> {
    let layout = StorageLayout::by_name(&cmd.layout, None)?;
    Root::init_local(
        &cmd.path,
        cmd.ocfl_version,
        Some(layout),
        cmd.description.as_deref(),
    )?;
    println!("Initialized OCFL storage root at {}", cmd.path);
    Ok(())
}

fn resolve_root(root: &Option<String>, config: &Config) -> Result<String> {
    root.clone()
        .or_else(|| config.root.clone())
        .ok_or_else(|| {
            OcflError::IllegalArgument(
                "no storage root given: pass --root, set OCFL_ROOT, or configure one".to_string(),
            )
        })
}

fn commit_command(cmd: &CommitCmd, config: &Config, cancel: &CancellationToken) -> Result<()> {
    let root_path = resolve_root(&cmd.root, config)?;
    let root = Root::open_local(&root_path)?;

    let locks_dir = Path::new(&root_path).join("extensions").join(".locks");
    fs::create_dir_all(&locks_dir)?;
    let lock_manager = LockManager::new(&locks_dir);
    let _lock = lock_manager.acquire(&cmd.id)?;

    let stage = Stage::from_directory(&cmd.path, cmd.digest_algorithm, cmd.workers, cancel.clone())?;

    let user_name = cmd.user_name.clone().or_else(|| config.author_name.clone());
    let user_address = cmd
        .user_address
        .clone()
        .or_else(|| config.author_address.clone());
    let meta = CommitMeta::new()
        .with_user(user_name, user_address)?
        .with_message(cmd.message.clone());

    let mut object = Object::open(&root, &cmd.id, cancel)?;
    object.set_spec_version_for_new_object(cmd.ocfl_version);
    let inventory = object.commit(stage, meta, Utc::now(), cancel)?;
    println!("Committed {} as version {}", cmd.id, inventory.head);
    Ok(())
}

fn list_command(cmd: &ListCmd, config: &Config, cancel: &CancellationToken) -> Result<()> {
    let root_path = resolve_root(&cmd.root, config)?;
    let root = Root::open_local(&root_path)?;

    match &cmd.id {
        None => {
            for id in scan_object_ids(root.fs(), cancel)? {
                println!("{}", id);
            }
        }
        Some(id) => {
            let object = Object::open(&root, id, cancel)?;
            if !object.exists() {
                return Err(ocfl_engine::ocfl::error::not_found(id, None));
            }
            let version_ref: VersionRef = cmd.version.into();
            let state = object.version_state(version_ref)?;

            let mut paths: Vec<_> = state.state.keys().cloned().collect();
            paths.sort();

            for path in paths {
                let details = &state.state[&path];
                if cmd.digests {
                    println!("{}:{}\t{}", details.digest_algorithm, details.digest, path);
                } else {
                    println!("{}", path);
                }
            }
        }
    }

    Ok(())
}

fn export_command(cmd: &ExportCmd, config: &Config, cancel: &CancellationToken) -> Result<()> {
    let root_path = resolve_root(&cmd.root, config)?;
    let root = Root::open_local(&root_path)?;
    let object = Object::open(&root, &cmd.id, cancel)?;
    if !object.exists() {
        return Err(ocfl_engine::ocfl::error::not_found(&cmd.id, None));
    }

    let version_ref: VersionRef = cmd.version.into();

    match &cmd.src {
        Some(src) => {
            let logical_path: LogicalPath = src.as_str().try_into()?;
            let mut reader = object.open_logical_path(version_ref, &logical_path, cancel)?;

            if cmd.dst == "-" {
                io::copy(&mut reader, &mut io::stdout())?;
            } else {
                write_export_file(Path::new(&cmd.dst), &mut reader, cmd.replace)?;
            }
        }
        None => {
            let state = object.version_state(version_ref)?;
            let dst_root = Path::new(&cmd.dst);

            for (path, _details) in &state.state {
                let mut reader =
                    object.open_logical_path(version_ref, path, cancel)?;
                let dst_file = dst_root.join(path.as_str());
                write_export_file(&dst_file, &mut reader, cmd.replace)?;
            }
        }
    }

    Ok(())
}

fn write_export_file(dst: &Path, reader: &mut dyn io::Read, replace: bool) -> Result<()> {
    if dst.exists() && !replace {
        return Err(OcflError::Conflict {
            path: dst.to_string_lossy().to_string(),
            message: "destination already exists; pass --replace to overwrite".to_string(),
        });
    }

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut file = File::create(dst)?;
    io::copy(reader, &mut file)?;
    Ok(())
}

fn validate_command(cmd: &ValidateCmd, config: &Config, cancel: &CancellationToken) -> Result<i32> {
    let root_path = resolve_root(&cmd.root, config)?;
    let root = Root::open_local(&root_path)?;

    let ids = match &cmd.id {
        Some(id) => vec![id.clone()],
        None => scan_object_ids(root.fs(), cancel)?,
    };

    let mut any_defects = false;

    for id in &ids {
        let object = Object::open(&root, id, cancel)?;
        let result = object.validate(cmd.workers, cancel)?;

        for error in &result.errors {
            println!("{}\t{}\t{}", id, error.code, error.message);
        }
        for warning in &result.warnings {
            println!("{}\t{}\t{}", id, warning.code, warning.message);
        }

        if !result.errors.is_empty() || !result.warnings.is_empty() {
            any_defects = true;
        } else {
            println!("{}\tvalid", id);
        }
    }

    io::stdout().flush().ok();
    Ok(if any_defects { 2 } else { 0 })
}
