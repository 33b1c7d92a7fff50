use std::fs;

use assert_fs::prelude::*;
use assert_fs::TempDir;
use common::*;
use predicates::prelude::*;

mod common;

fn init_and_commit(root: &TempDir, content: &TempDir, object_id: &str) {
    ocfl()
        .arg("init-root")
        .arg(root.path())
        .arg("--layout")
        .arg("0002-flat-direct-storage-layout")
        .assert()
        .success();
    ocfl()
        .arg("commit")
        .arg(content.path())
        .arg("--root")
        .arg(root.path())
        .arg("--id")
        .arg(object_id)
        .assert()
        .success();
}

#[test]
fn valid_object_reports_no_defects() {
    let root = TempDir::new().unwrap();
    let content = TempDir::new().unwrap();
    create_file(&content, "a.txt", "hello");
    init_and_commit(&root, &content, "obj-1");

    ocfl()
        .arg("validate")
        .arg("--root")
        .arg(root.path())
        .assert()
        .success()
        .code(0)
        .stdout(predicate::str::contains("obj-1\tvalid"));
}

#[test]
fn validate_single_object_by_id() {
    let root = TempDir::new().unwrap();
    let content = TempDir::new().unwrap();
    create_file(&content, "a.txt", "hello");
    init_and_commit(&root, &content, "obj-1");

    let other = TempDir::new().unwrap();
    create_file(&other, "b.txt", "other");
    ocfl()
        .arg("commit")
        .arg(other.path())
        .arg("--root")
        .arg(root.path())
        .arg("--id")
        .arg("obj-2")
        .assert()
        .success();

    ocfl()
        .arg("validate")
        .arg("--root")
        .arg(root.path())
        .arg("--id")
        .arg("obj-1")
        .assert()
        .success()
        .code(0)
        .stdout(
            predicate::str::contains("obj-1\tvalid")
                .and(predicate::str::contains("obj-2").not()),
        );
}

#[test]
fn tampered_content_is_flagged_as_a_digest_mismatch() {
    let root = TempDir::new().unwrap();
    let content = TempDir::new().unwrap();
    create_file(&content, "a.txt", "hello");
    init_and_commit(&root, &content, "obj-1");

    let inventory_path = root.child("obj-1");
    let inventory_bytes = fs::read(inventory_path.child("inventory.json").path()).unwrap();
    let inventory: serde_json::Value = serde_json::from_slice(&inventory_bytes).unwrap();
    let manifest = inventory["manifest"].as_object().unwrap();
    let content_path = manifest.values().next().unwrap().as_array().unwrap()[0]
        .as_str()
        .unwrap();

    fs::write(inventory_path.path().join(content_path), b"tampered").unwrap();

    ocfl()
        .arg("validate")
        .arg("--root")
        .arg(root.path())
        .assert()
        .code(2)
        .stdout(predicate::str::contains("E-"));
}

#[test]
fn corrupt_object_missing_inventory_fails_cleanly() {
    let root = TempDir::new().unwrap();
    let content = TempDir::new().unwrap();
    create_file(&content, "a.txt", "hello");
    init_and_commit(&root, &content, "obj-1");

    fs::remove_file(root.child("obj-1/inventory.json").path()).unwrap();

    ocfl()
        .arg("validate")
        .arg("--root")
        .arg(root.path())
        .arg("--id")
        .arg("obj-1")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("inventory.json is missing"));
}
