#![allow(dead_code)]

use assert_cmd::Command;
use assert_fs::fixture::ChildPath;
use assert_fs::prelude::*;
use assert_fs::TempDir;

/// A fresh `assert_cmd::Command` for the `ocfl` binary, isolated from the invoking
/// environment's `OCFL_*` variables so tests never pick up a developer's own config.
pub fn ocfl() -> Command {
    let mut cmd = Command::cargo_bin("ocfl").unwrap();
    cmd.env_remove("OCFL_ROOT")
        .env_remove("OCFL_USER_NAME")
        .env_remove("OCFL_USER_EMAIL");
    cmd
}

pub fn create_dirs(temp: &TempDir, path: &str) -> ChildPath {
    let child = resolve_child(temp, path);
    child.create_dir_all().unwrap();
    child
}

pub fn create_file(temp: &TempDir, path: &str, content: &str) -> ChildPath {
    let child = resolve_child(temp, path);
    child.write_str(content).unwrap();
    child
}

pub fn resolve_child(temp: &TempDir, path: &str) -> ChildPath {
    let mut child: Option<ChildPath> = None;
    for part in path.split('/') {
        child = match child {
            Some(child) => Some(child.child(part)),
            None => Some(temp.child(part)),
        };
    }
    child.unwrap()
}
