use assert_fs::prelude::*;
use assert_fs::TempDir;
use common::*;
use predicates::prelude::*;

mod common;

#[test]
fn init_root_creates_empty_root() {
    let root = TempDir::new().unwrap();
    let root_path = root.child("storage").path().to_path_buf();

    ocfl()
        .arg("init-root")
        .arg(&root_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized OCFL storage root"));

    root.child("storage/ocfl_layout.json").assert(predicate::path::exists());
    root.child("storage/0=ocfl_1.1").assert(predicate::path::exists());
}

#[test]
fn commit_then_list_and_export_round_trip() {
    let root = TempDir::new().unwrap();
    let root_path = root.child("storage").path().to_path_buf();
    let content = TempDir::new().unwrap();
    let object_id = "info:fedora/obj-1";

    ocfl().arg("init-root").arg(&root_path).assert().success();

    create_file(&content, "a.txt", "hello world");
    create_dirs(&content, "sub");
    create_file(&content, "sub/b.txt", "nested");

    ocfl()
        .arg("commit")
        .arg(content.path())
        .arg("--root")
        .arg(&root_path)
        .arg("--id")
        .arg(object_id)
        .arg("--name")
        .arg("Test User")
        .arg("--email")
        .arg("mailto:test@example.com")
        .arg("--message")
        .arg("first version")
        .assert()
        .success()
        .stdout(predicate::str::contains("Committed").and(predicate::str::contains("version 1")));

    ocfl()
        .arg("ls")
        .arg("--root")
        .arg(&root_path)
        .assert()
        .success()
        .stdout(predicate::str::contains(object_id));

    ocfl()
        .arg("ls")
        .arg("--root")
        .arg(&root_path)
        .arg("--id")
        .arg(object_id)
        .assert()
        .success()
        .stdout(predicate::str::contains("a.txt").and(predicate::str::contains("sub/b.txt")));

    ocfl()
        .arg("ls")
        .arg("--root")
        .arg(&root_path)
        .arg("--id")
        .arg(object_id)
        .arg("--digests")
        .assert()
        .success()
        .stdout(predicate::str::contains("sha512:"));

    let export_dir = TempDir::new().unwrap();
    ocfl()
        .arg("export")
        .arg(export_dir.path())
        .arg("--root")
        .arg(&root_path)
        .arg("--id")
        .arg(object_id)
        .assert()
        .success();
    export_dir.child("a.txt").assert("hello world");
    export_dir.child("sub/b.txt").assert("nested");

    ocfl()
        .arg("export")
        .arg("-")
        .arg("--root")
        .arg(&root_path)
        .arg("--id")
        .arg(object_id)
        .arg("--src")
        .arg("a.txt")
        .assert()
        .success()
        .stdout("hello world");
}

#[test]
fn second_commit_produces_version_two() {
    let root = TempDir::new().unwrap();
    let root_path = root.child("storage").path().to_path_buf();
    let object_id = "obj-2";

    ocfl().arg("init-root").arg(&root_path).assert().success();

    let v1 = TempDir::new().unwrap();
    create_file(&v1, "a.txt", "v1");
    ocfl()
        .arg("commit")
        .arg(v1.path())
        .arg("--root")
        .arg(&root_path)
        .arg("--id")
        .arg(object_id)
        .assert()
        .success();

    let v2 = TempDir::new().unwrap();
    create_file(&v2, "a.txt", "v2");
    create_file(&v2, "b.txt", "new in v2");
    ocfl()
        .arg("commit")
        .arg(v2.path())
        .arg("--root")
        .arg(&root_path)
        .arg("--id")
        .arg(object_id)
        .assert()
        .success()
        .stdout(predicate::str::contains("version 2"));

    ocfl()
        .arg("ls")
        .arg("--root")
        .arg(&root_path)
        .arg("--id")
        .arg(object_id)
        .arg("--version")
        .arg("1")
        .assert()
        .success()
        .stdout(predicate::str::contains("a.txt").and(predicate::str::contains("b.txt").not()));
}

#[test]
fn ls_unknown_object_fails() {
    let root = TempDir::new().unwrap();
    let root_path = root.child("storage").path().to_path_buf();
    ocfl().arg("init-root").arg(&root_path).assert().success();

    ocfl()
        .arg("ls")
        .arg("--root")
        .arg(&root_path)
        .arg("--id")
        .arg("does-not-exist")
        .assert()
        .failure()
        .code(1);
}

#[test]
fn root_resolves_from_environment_variable() {
    let root = TempDir::new().unwrap();
    let root_path = root.child("storage").path().to_path_buf();
    ocfl().arg("init-root").arg(&root_path).assert().success();

    ocfl()
        .env("OCFL_ROOT", &root_path)
        .arg("ls")
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn missing_root_is_an_illegal_argument() {
    ocfl().arg("ls").assert().failure().code(1).stderr(
        predicate::str::contains("no storage root given"),
    );
}
